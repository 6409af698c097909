//! Value conversions shared by the sync protocols.

use chrono::{Duration, NaiveDate};
use regex::Regex;
use rust_decimal::Decimal;
use std::sync::OnceLock;

/// Payment-term offset used when the customer's terms don't parse.
pub const DEFAULT_PAYMENT_DAYS: u32 = 30;

/// Longest payment term accepted, ten years.
pub const MAX_PAYMENT_DAYS: u32 = 3650;

fn first_integer() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\d+").expect("static regex"))
}

/// Day count from free-text terms: the first integer found.
///
/// "Net 30" → 30, "14 days" → 14, "COD" → None. Counts above
/// [`MAX_PAYMENT_DAYS`] are treated as unparseable.
pub fn parse_payment_terms(terms: &str) -> Option<u32> {
    first_integer()
        .find(terms)
        .and_then(|m| m.as_str().parse().ok())
        .filter(|days| *days <= MAX_PAYMENT_DAYS)
}

/// Days until due, falling back to [`DEFAULT_PAYMENT_DAYS`].
pub fn payment_days(terms: Option<&str>) -> u32 {
    terms
        .and_then(parse_payment_terms)
        .unwrap_or(DEFAULT_PAYMENT_DAYS)
}

pub fn due_date(invoice_date: NaiveDate, terms: Option<&str>) -> NaiveDate {
    let offset = |days: u32| invoice_date.checked_add_signed(Duration::days(i64::from(days)));
    offset(payment_days(terms))
        .or_else(|| offset(DEFAULT_PAYMENT_DAYS))
        .unwrap_or(invoice_date)
}

/// Minor currency units to an exact two-place decimal (1050 → 10.50).
pub fn minor_to_major(cents: i64) -> Decimal {
    Decimal::new(cents, 2)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_payment_terms() {
        assert_eq!(parse_payment_terms("Net 30"), Some(30));
        assert_eq!(parse_payment_terms("30 days"), Some(30));
        assert_eq!(parse_payment_terms("net14"), Some(14));
        assert_eq!(parse_payment_terms("2/10 net 30"), Some(2));
        assert_eq!(parse_payment_terms("COD"), None);
        assert_eq!(parse_payment_terms(""), None);
    }

    #[test]
    fn test_oversized_number_does_not_parse() {
        assert_eq!(parse_payment_terms("Net 99999999999"), None);
        assert_eq!(payment_days(Some("Net 99999999999")), DEFAULT_PAYMENT_DAYS);
        // Fits in u32 but is far past any calendar
        assert_eq!(parse_payment_terms("Net 4000000000"), None);
        assert_eq!(parse_payment_terms("Net 3651"), None);
        assert_eq!(parse_payment_terms("Net 3650"), Some(3650));

        let date = NaiveDate::from_ymd_opt(2026, 1, 15).unwrap();
        assert_eq!(
            due_date(date, Some("Net 4000000000")),
            NaiveDate::from_ymd_opt(2026, 2, 14).unwrap()
        );
    }

    #[test]
    fn test_due_date_near_calendar_end() {
        assert_eq!(due_date(NaiveDate::MAX, Some("Net 30")), NaiveDate::MAX);
    }

    #[test]
    fn test_payment_days_default() {
        assert_eq!(payment_days(Some("Net 45")), 45);
        assert_eq!(payment_days(Some("on receipt")), 30);
        assert_eq!(payment_days(None), 30);
    }

    #[test]
    fn test_due_date() {
        let date = NaiveDate::from_ymd_opt(2026, 1, 15).unwrap();
        assert_eq!(
            due_date(date, Some("Net 30")),
            NaiveDate::from_ymd_opt(2026, 2, 14).unwrap()
        );
        assert_eq!(
            due_date(date, Some("7 days")),
            NaiveDate::from_ymd_opt(2026, 1, 22).unwrap()
        );
        assert_eq!(
            due_date(date, None),
            NaiveDate::from_ymd_opt(2026, 2, 14).unwrap()
        );
    }

    #[test]
    fn test_minor_to_major_is_exact() {
        assert_eq!(minor_to_major(1050).to_string(), "10.50");
        assert_eq!(minor_to_major(999).to_string(), "9.99");
        assert_eq!(minor_to_major(100000).to_string(), "1000.00");
        assert_eq!(minor_to_major(1).to_string(), "0.01");
        assert_eq!(minor_to_major(0).to_string(), "0.00");
        assert_eq!(minor_to_major(-250).to_string(), "-2.50");
        assert_eq!(minor_to_major(999), Decimal::new(999, 2));
    }
}
