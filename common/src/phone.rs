// Phone number normalization for SMS delivery

use regex::Regex;
use std::sync::OnceLock;

fn formatting_chars() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"[\s().\-/]").expect("valid formatting regex"))
}

/// Normalize a user-entered phone number to E.164.
///
/// Ten digit numbers are assumed to be North American. Returns `None` for
/// anything that cannot be a dialable number.
pub fn normalize_phone(input: &str) -> Option<String> {
    let stripped = formatting_chars().replace_all(input.trim(), "");
    if stripped.is_empty() {
        return None;
    }

    if let Some(rest) = stripped.strip_prefix('+') {
        if (8..=15).contains(&rest.len()) && rest.chars().all(|c| c.is_ascii_digit()) {
            return Some(format!("+{}", rest));
        }
        return None;
    }

    if !stripped.chars().all(|c| c.is_ascii_digit()) {
        return None;
    }

    match stripped.len() {
        10 => Some(format!("+1{}", stripped)),
        11 if stripped.starts_with('1') => Some(format!("+{}", stripped)),
        _ => None,
    }
}

/// Two numbers are the same line if they normalize identically
pub fn same_number(a: &str, b: &str) -> bool {
    match (normalize_phone(a), normalize_phone(b)) {
        (Some(a), Some(b)) => a == b,
        _ => false,
    }
}

/// Mask all but the last four characters, for logs
pub fn redact(number: &str) -> String {
    let count = number.chars().count();
    let masked = count.saturating_sub(4);
    number
        .chars()
        .enumerate()
        .map(|(i, c)| if i < masked || count <= 4 { '*' } else { c })
        .collect()
}
