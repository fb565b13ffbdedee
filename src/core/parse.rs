use crate::domain::model::{DateValue, DATE_FORMAT};
use chrono::NaiveDateTime;
use regex::Regex;
use rust_decimal::Decimal;
use std::str::FromStr;
use std::sync::OnceLock;

const FALSE_VALUES: [&str; 6] = ["", "no", "n", "false", "f", "0"];

pub fn parse_bool(value: Option<&str>) -> bool {
    match value {
        None => false,
        Some(v) => !FALSE_VALUES.contains(&v.trim().to_lowercase().as_str()),
    }
}

pub fn parse_date(value: &str) -> DateValue {
    match NaiveDateTime::parse_from_str(value, DATE_FORMAT) {
        Ok(dt) => DateValue::Parsed(dt),
        Err(_) => DateValue::Raw(value.to_string()),
    }
}

/// Comma-separated list; items are trimmed and empty items dropped.
pub fn parse_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .map(str::to_string)
        .collect()
}

pub fn parse_phone(value: &str) -> String {
    let mut digits: String = value
        .chars()
        .filter(|c| !matches!(c, '(' | ')' | '-' | '.'))
        .collect();
    // 由右往左插入分隔符: xxx-xxx-xxxx
    for split in [4, 8] {
        let len = digits.chars().count();
        if len > split {
            let at = digits
                .char_indices()
                .nth(len - split)
                .map(|(i, _)| i)
                .unwrap_or(digits.len());
            digits.insert(at, '-');
        }
    }
    digits
}

fn currency_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"^ *\$? *(\d+(?:[.]\d{2})?) *$").expect("currency pattern is valid")
    })
}

/// Accepts `12`, `12.50`, `$12.50`, `$ 12.50`; anything else is `None`.
pub fn validate_currency(value: Option<&str>) -> Option<Decimal> {
    let caps = currency_pattern().captures(value?)?;
    let mut fee = Decimal::from_str(&caps[1]).ok()?;
    fee.rescale(2);
    Some(fee)
}
