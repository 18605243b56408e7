//! The four message kinds and their rendering. Rendering is pure; delivery
//! errors come back to the caller, which decides whether to record them
//! against a row or just log them.
use std::sync::Arc;
use tracing::instrument;

use crate::class_time::TimeRemaining;
use crate::settings::ClassInfo;

pub mod mailer;

pub use mailer::{DeliveryError, Mailer, OutgoingEmail};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Notification {
    Confirmation {
        name: String,
        join_url: String,
        suffix: String,
    },
    RateLimitNotice {
        name: String,
    },
    ClassReminder {
        name: String,
        join_url: Option<String>,
        remaining: TimeRemaining,
    },
    Invitation {
        name: String,
    },
}

impl Notification {
    pub fn kind(&self) -> &'static str {
        match self {
            Notification::Confirmation { .. } => "confirmation",
            Notification::RateLimitNotice { .. } => "rate_limit_notice",
            Notification::ClassReminder { .. } => "class_reminder",
            Notification::Invitation { .. } => "invitation",
        }
    }
}

fn escape_html(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

fn greeting(name: &str) -> String {
    if name.is_empty() {
        "Chào bạn".to_string()
    } else {
        format!("Chào {}", name)
    }
}

fn class_title(class: &ClassInfo) -> &str {
    if class.name.is_empty() {
        "lớp học online"
    } else {
        &class.name
    }
}

fn class_details(class: &ClassInfo) -> Vec<String> {
    let mut lines = Vec::new();
    if !class.time.is_empty() {
        lines.push(format!("Thời gian: {}", class.time));
    }
    if !class.format.is_empty() {
        lines.push(format!("Hình thức: {}", class.format));
    }
    if !class.instructor.is_empty() {
        lines.push(format!("Giảng viên: {}", class.instructor));
    }
    lines
}

fn html_page(paragraphs: &[String], button: Option<(&str, &str)>) -> String {
    let mut body = String::new();
    for p in paragraphs {
        body.push_str(&format!("<p>{}</p>\n", escape_html(p)));
    }
    if let Some((label, url)) = button {
        body.push_str(&format!(
            r#"<p style="text-align:center;margin:24px 0;"><a href="{url}" style="background:#2563eb;color:#fff;padding:12px 24px;border-radius:6px;text-decoration:none;font-weight:bold;">{label}</a></p>
<p style="color:#666;font-size:13px;">Nếu nút không bấm được, hãy dán link này vào trình duyệt: {url}</p>
"#,
            url = escape_html(url),
            label = escape_html(label),
        ));
    }
    format!(
        r#"<!DOCTYPE html>
<html>
<head><meta charset="utf-8"></head>
<body style="font-family:Arial,Helvetica,sans-serif;line-height:1.6;color:#333;max-width:600px;margin:0 auto;padding:20px;">
{body}</body>
</html>"#
    )
}

/// Turn a notification into subject, plain-text and HTML bodies.
pub fn render(to: &str, notification: &Notification, class: &ClassInfo) -> OutgoingEmail {
    let title = class_title(class);
    let (subject, mut paragraphs, button) = match notification {
        Notification::Confirmation {
            name,
            join_url,
            suffix,
        } => (
            format!("[Vé tham dự] {}", title),
            vec![
                format!("{},", greeting(name)),
                format!("Bạn đã đăng ký thành công \"{}\".", title),
                format!(
                    "Tên hiển thị của bạn trong phòng học sẽ bắt đầu bằng mã {} để ban tổ chức điểm danh.",
                    suffix
                ),
                format!("Link tham gia dành riêng cho bạn: {}", join_url),
            ],
            Some(("Vào lớp học", join_url.as_str())),
        ),
        Notification::RateLimitNotice { name } => {
            let mut paragraphs = vec![
                format!("{},", greeting(name)),
                format!(
                    "Email của bạn đã đăng ký \"{}\" quá nhiều lần trong hôm nay nên hệ thống tạm thời chưa cấp được link mới.",
                    title
                ),
                "Bạn vui lòng dùng lại link trong email xác nhận trước đó, hoặc đăng ký lại bằng một email khác.".to_string(),
            ];
            if !class.contact.is_empty() {
                paragraphs.push(format!("Cần hỗ trợ, bạn liên hệ: {}", class.contact));
            }
            (format!("[Lưu ý] Đăng ký {}", title), paragraphs, None)
        }
        Notification::ClassReminder {
            name,
            join_url,
            remaining,
        } => {
            let mut paragraphs = vec![
                format!("{},", greeting(name)),
                format!("Lớp \"{}\" {}.", title, remaining.phrase()),
            ];
            if let Some(url) = join_url {
                paragraphs.push(format!("Link tham gia của bạn: {}", url));
            }
            (
                format!("[Nhắc lịch] {} {}", title, remaining.phrase()),
                paragraphs,
                join_url.as_deref().map(|url| ("Vào lớp học", url)),
            )
        }
        Notification::Invitation { name } => (
            format!("[Thư mời] {}", title),
            vec![
                format!("{},", greeting(name)),
                format!("Trân trọng mời bạn tham dự \"{}\".", title),
            ],
            None,
        ),
    };

    let details = class_details(class);
    paragraphs.extend(details);
    paragraphs.push("Hẹn gặp bạn trong lớp!".to_string());

    let mut text = paragraphs.join("\n");
    if let Some((_, url)) = button {
        if !text.contains(url) {
            text.push_str(&format!("\n{}", url));
        }
    }

    OutgoingEmail {
        to: to.to_string(),
        subject,
        text,
        html: html_page(&paragraphs, button),
    }
}

/// Renders and sends notifications for one class.
#[derive(Clone)]
pub struct Notifier {
    mailer: Arc<dyn Mailer>,
    class: ClassInfo,
}

impl Notifier {
    pub fn new(mailer: Arc<dyn Mailer>, class: ClassInfo) -> Self {
        Self { mailer, class }
    }

    pub fn class(&self) -> &ClassInfo {
        &self.class
    }

    /// Same mailer, fresh class details.
    pub fn with_class(&self, class: ClassInfo) -> Self {
        Self {
            mailer: self.mailer.clone(),
            class,
        }
    }

    #[instrument(skip_all, fields(to = %to, kind = notification.kind()))]
    pub async fn send(&self, to: &str, notification: &Notification) -> Result<(), DeliveryError> {
        let email = render(to, notification, &self.class);
        self.mailer.send(&email).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn class() -> ClassInfo {
        ClassInfo {
            name: "Vận hành lớp học online".into(),
            time: "19:30 - 21:30 | Thứ Tư, ngày 22/10/2025".into(),
            format: "Zoom".into(),
            instructor: "Hồ Văn Trọng".into(),
            contact: "Zalo 0900000000".into(),
        }
    }

    #[test]
    fn confirmation_has_link_and_suffix() {
        let n = Notification::Confirmation {
            name: "Nguyễn Văn Minh".into(),
            join_url: "https://zoom.us/w/1?tk=abc".into(),
            suffix: "26".into(),
        };
        let email = render("minh@x.co", &n, &class());
        assert_eq!(email.to, "minh@x.co");
        assert!(email.subject.contains("Vận hành lớp học online"));
        assert!(email.text.contains("https://zoom.us/w/1?tk=abc"));
        assert!(email.text.contains("mã 26"));
        assert!(email.html.contains("href=\"https://zoom.us/w/1?tk=abc\""));
    }

    #[test]
    fn rate_limit_notice_has_contact() {
        let n = Notification::RateLimitNotice { name: "Minh".into() };
        let email = render("minh@x.co", &n, &class());
        assert!(email.text.contains("Zalo 0900000000"));
        assert!(email.text.contains("email khác"));
    }

    #[test]
    fn reminder_includes_phrase() {
        let n = Notification::ClassReminder {
            name: "".into(),
            join_url: None,
            remaining: TimeRemaining::Days(2),
        };
        let email = render("a@x.co", &n, &class());
        assert!(email.text.starts_with("Chào bạn,"));
        assert!(email.text.contains("còn 2 ngày nữa"));
        assert!(!email.html.contains("href"));
    }

    #[test]
    fn html_escapes_names() {
        let n = Notification::Invitation {
            name: "<b>x</b>".into(),
        };
        let email = render("a@x.co", &n, &ClassInfo::default());
        assert!(email.html.contains("&lt;b&gt;x&lt;/b&gt;"));
        assert!(email.subject.contains("lớp học online"));
    }
}
