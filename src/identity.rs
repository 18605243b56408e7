//! Cleaning of raw form text into the canonical registrant identity.
use once_cell::sync::Lazy;
use regex::Regex;

/// Fallback suffix when the phone field is missing or too short.
pub const DEFAULT_SUFFIX: &str = "00";

static EMAIL_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[^\s@]+@[^\s@]+\.[^\s@]+$").expect("valid email regex"));

/// Trim and lowercase. Garbage in stays garbage out; callers check with
/// [`is_valid_email`].
pub fn normalize_email(raw: &str) -> String {
    raw.trim().to_lowercase()
}

pub fn is_valid_email(email: &str) -> bool {
    !email.is_empty() && EMAIL_RE.is_match(email)
}

/// Title-case a person's name: whitespace runs collapse to one space, every
/// word gets an uppercase first character and a lowercase tail. A first
/// character whose uppercase form is several characters (`ß`) is kept as is,
/// so applying this twice changes nothing.
pub fn standardize_name(raw: &str) -> String {
    raw.split_whitespace()
        .map(|word| {
            let lower = word.to_lowercase();
            let mut chars = lower.chars();
            let Some(first) = chars.next() else {
                return String::new();
            };
            let mut upper = first.to_uppercase();
            let head = match (upper.next(), upper.next()) {
                (Some(single), None) => single,
                _ => first,
            };
            std::iter::once(head).chain(chars).collect::<String>()
        })
        .collect::<Vec<_>>()
        .join(" ")
}

/// Last two characters of the trimmed phone field, or [`DEFAULT_SUFFIX`].
pub fn suffix_from_phone(raw: Option<&str>) -> String {
    let trimmed = raw.map(str::trim).unwrap_or_default();
    let chars: Vec<char> = trimmed.chars().collect();
    if chars.len() >= 2 {
        chars[chars.len() - 2..].iter().collect()
    } else {
        DEFAULT_SUFFIX.to_string()
    }
}

/// Meeting display name parts: the suffix goes first so hosts can match a
/// participant to a phone number at a glance.
pub fn display_name_parts(suffix: &str, clean_name: &str) -> (String, String) {
    (suffix.to_string(), format!("- {}", clean_name))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn standardize_keeps_expanding_initials() {
        let once = standardize_name("ßTRASSE  ǆ");
        assert_eq!(once, "ßtrasse Ǆ");
        assert_eq!(standardize_name(&once), once);
    }

    #[test]
    fn standardize_collapses_and_title_cases() {
        assert_eq!(standardize_name("  nguyễn   văn A "), "Nguyễn Văn A");
        assert_eq!(
            standardize_name("  nguyễn   văn A "),
            standardize_name("nguyễn văn a")
        );
        assert_eq!(standardize_name("ĐỖ thị HOA"), "Đỗ Thị Hoa");
    }

    #[test]
    fn standardize_is_idempotent() {
        for raw in ["", "   ", "a", "  trần\tthị   BÌNH ", "o'neil mcDonald"] {
            let once = standardize_name(raw);
            assert_eq!(standardize_name(&once), once, "input {raw:?}");
        }
        assert_eq!(standardize_name("   "), "");
    }

    #[test]
    fn suffix_takes_last_two_chars() {
        assert_eq!(suffix_from_phone(Some("0912345626")), "26");
        assert_eq!(suffix_from_phone(Some("  0912 ")), "12");
        assert_eq!(suffix_from_phone(Some("42")), "42");
        assert_eq!(suffix_from_phone(Some("7")), DEFAULT_SUFFIX);
        assert_eq!(suffix_from_phone(Some("   ")), DEFAULT_SUFFIX);
        assert_eq!(suffix_from_phone(None), DEFAULT_SUFFIX);
    }

    #[test]
    fn email_validity() {
        assert!(is_valid_email("a@b.co"));
        assert!(is_valid_email(&normalize_email("  Minh.Nguyen@Example.COM ")));
        assert!(!is_valid_email(""));
        assert!(!is_valid_email("ab.co"));
        assert!(!is_valid_email("a@bco"));
        assert!(!is_valid_email("a b@c.co"));
        assert!(!is_valid_email("@b.co"));
        assert!(!is_valid_email("a@.co"));
        assert!(!is_valid_email("a@b."));
    }

    #[test]
    fn display_name_layout() {
        let (first, last) = display_name_parts("26", "Nguyễn Văn Minh");
        assert_eq!(first, "26");
        assert_eq!(last, "- Nguyễn Văn Minh");
    }
}
