use crate::errors::{AppError, AppResult};
use once_cell::sync::Lazy;
use regex::Regex;

pub const DEFAULT_PROJECT_COLOR: &str = "#6366f1";
pub const DEFAULT_TAG_COLOR: &str = "#6b7280";
pub const MAX_TAG_NAME_LEN: usize = 50;
pub const WORDS_PER_MINUTE: i64 = 200;

static TAG_NAME: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[a-z0-9-]+$").expect("valid regex"));
static HEX_COLOR: Lazy<Regex> = Lazy::new(|| Regex::new(r"^#[0-9a-fA-F]{6}$").expect("valid regex"));
static EMAIL: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").expect("valid regex"));

/// Lowercase, trim, and collapse every internal whitespace run into one `-`.
pub fn normalize_tag_name(raw: &str) -> String {
    raw.to_lowercase().split_whitespace().collect::<Vec<_>>().join("-")
}

/// Checks an already normalized tag name.
pub fn validate_tag_name(name: &str) -> AppResult<()> {
    if name.is_empty() {
        return Err(AppError::Validation("Tag name is required".to_string()));
    }
    if name.chars().count() > MAX_TAG_NAME_LEN {
        return Err(AppError::Validation(format!(
            "Tag name must be {} characters or less",
            MAX_TAG_NAME_LEN
        )));
    }
    if !TAG_NAME.is_match(name) {
        return Err(AppError::Validation(
            "Tag name can only contain lowercase letters, numbers, and hyphens".to_string(),
        ));
    }
    Ok(())
}

pub fn validate_color(raw: &str) -> AppResult<String> {
    let color = raw.trim();
    if !HEX_COLOR.is_match(color) {
        return Err(AppError::Validation(
            "Color must be a hex value like #3b82f6".to_string(),
        ));
    }
    Ok(color.to_lowercase())
}

pub fn normalize_email(raw: &str) -> AppResult<String> {
    let email = raw.trim().to_lowercase();
    if !EMAIL.is_match(&email) {
        return Err(AppError::Validation("A valid email address is required".to_string()));
    }
    Ok(email)
}

/// Returns the trimmed value, or a validation error carrying `message` when blank.
pub fn require_text(raw: &str, message: &str) -> AppResult<String> {
    let value = raw.trim();
    if value.is_empty() {
        return Err(AppError::Validation(message.to_string()));
    }
    Ok(value.to_string())
}

pub fn count_words(content: &str) -> i64 {
    content.split_whitespace().count() as i64
}

pub fn reading_time_minutes(word_count: i64) -> i64 {
    if word_count <= 0 {
        return 0;
    }
    (word_count + WORDS_PER_MINUTE - 1) / WORDS_PER_MINUTE
}

/// Ratings are optional but must fall in 1..=10 when present.
pub fn validate_rating(value: Option<i64>, label: &str) -> AppResult<Option<u8>> {
    match value {
        None => Ok(None),
        Some(rating) if (1..=10).contains(&rating) => Ok(Some(rating as u8)),
        Some(_) => Err(AppError::Validation(format!("{} must be between 1 and 10", label))),
    }
}

/// Percentage rounded to two decimals, `0.0` when nothing was counted.
pub fn completion_rate(completed: i64, total: i64) -> f64 {
    if total <= 0 {
        return 0.0;
    }
    round2(completed as f64 * 100.0 / total as f64)
}

pub fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalizes_padded_mixed_case_names() {
        assert_eq!(normalize_tag_name("  Urgent Work  "), "urgent-work");
        assert_eq!(normalize_tag_name("Deep\t\tFocus  Time"), "deep-focus-time");
        assert_eq!(normalize_tag_name("   "), "");
    }

    #[test]
    fn normalization_is_idempotent() {
        let samples = [
            "  Urgent Work  ",
            "a  b\nc",
            "ALL-CAPS",
            "already-normal",
            "",
            " \t ",
            "Mixed - Dash",
            "Ünïcode Tag",
        ];
        for sample in samples {
            let once = normalize_tag_name(sample);
            assert_eq!(normalize_tag_name(&once), once, "input {:?}", sample);
        }
    }

    #[test]
    fn tag_name_validation_rules() {
        assert!(validate_tag_name("work-2024").is_ok());
        assert!(matches!(validate_tag_name(""), Err(AppError::Validation(_))));
        assert!(matches!(validate_tag_name("c++"), Err(AppError::Validation(_))));
        assert!(matches!(
            validate_tag_name(&"a".repeat(MAX_TAG_NAME_LEN + 1)),
            Err(AppError::Validation(_))
        ));
        assert!(validate_tag_name(&"a".repeat(MAX_TAG_NAME_LEN)).is_ok());
    }

    #[test]
    fn colors_must_be_six_digit_hex() {
        assert_eq!(validate_color("#3B82F6").expect("color"), "#3b82f6");
        assert!(validate_color("blue").is_err());
        assert!(validate_color("#fff").is_err());
    }

    #[test]
    fn emails_are_case_folded() {
        assert_eq!(
            normalize_email("  Ada@Example.COM ").expect("email"),
            "ada@example.com"
        );
        assert!(normalize_email("not-an-email").is_err());
    }

    #[test]
    fn word_count_and_reading_time() {
        let content = vec!["word"; 400].join(" ");
        assert_eq!(count_words(&content), 400);
        assert_eq!(reading_time_minutes(400), 2);
        assert_eq!(reading_time_minutes(401), 3);
        assert_eq!(reading_time_minutes(1), 1);
        assert_eq!(reading_time_minutes(0), 0);
        assert_eq!(count_words("  spaced \n\n out\ttext  "), 3);
    }

    #[test]
    fn ratings_outside_range_are_rejected() {
        assert_eq!(validate_rating(Some(1), "Mood rating").expect("rating"), Some(1));
        assert_eq!(validate_rating(Some(10), "Mood rating").expect("rating"), Some(10));
        assert_eq!(validate_rating(None, "Mood rating").expect("rating"), None);
        let error = validate_rating(Some(11), "Energy level").expect_err("out of range");
        assert_eq!(
            error.to_string(),
            "VALIDATION_ERROR: Energy level must be between 1 and 10"
        );
        assert!(validate_rating(Some(0), "Mood rating").is_err());
    }

    #[test]
    fn completion_rate_is_division_safe() {
        assert_eq!(completion_rate(0, 0), 0.0);
        assert_eq!(completion_rate(5, 10), 50.0);
        assert_eq!(completion_rate(1, 3), 33.33);
        assert_eq!(completion_rate(2, 3), 66.67);
    }

    #[test]
    fn blank_text_is_rejected() {
        assert!(require_text("   ", "Task title is required and cannot be empty").is_err());
        assert_eq!(require_text("  Ship it ", "x").expect("text"), "Ship it");
    }
}
