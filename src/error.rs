use thiserror::Error;

/// Bad input for a single item. The item is skipped and logged; a batch
/// never stops because of one.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("invalid email: '{0}'")]
    InvalidEmail(String),
    #[error("unparseable class time: '{0}'")]
    ClassTime(String),
}
