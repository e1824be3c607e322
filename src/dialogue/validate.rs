//! Input validation. Only the full name has a format.

use std::sync::LazyLock;

use regex::Regex;

/// Surname, given name, patronymic: each a capital Cyrillic letter followed
/// by lowercase Cyrillic letters, separated by single spaces.
static FULL_NAME: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[А-ЯЁ][а-яё]+ [А-ЯЁ][а-яё]+ [А-ЯЁ][а-яё]+$").unwrap()
});

/// Whether `input` looks like "Иванов Иван Иванович".
pub fn validate_name(input: &str) -> bool {
    FULL_NAME.is_match(input)
}
