//! Registration, attendance and email campaigns for a recurring online class.
pub mod attendance;
pub mod campaign;
pub mod class_time;
pub mod clock;
pub mod config;
pub mod db;
pub mod error;
pub mod identity;
pub mod model;
pub mod notify;
pub mod reminder;
pub mod schedule;
pub mod settings;
pub mod submission;
pub mod worker;
pub mod zoom;
