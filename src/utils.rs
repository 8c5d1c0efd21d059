use chrono::{Datelike, NaiveDate, Utc};
use std::collections::BTreeSet;

/// Three-letter month tokens, January first. Index + 1 is the calendar month.
pub const MONTH_TOKENS: [&str; 12] = [
    "JAN", "FEB", "MAR", "APR", "MAY", "JUN", "JUL", "AUG", "SEP", "OCT", "NOV", "DEC",
];

/// Strict formats tried before the token scan. Separators are folded to `-`
/// first, so `%B-%Y` also covers labels written as "January 2024".
const STRICT_MONTH_FORMATS: [&str; 5] = ["%b-%Y", "%b-%y", "%B-%Y", "%m/%Y", "%Y-%m"];

/// Canonical form of a column header: trimmed, inner whitespace runs replaced by `_`.
pub fn normalize_header(header: &str) -> String {
    header.split_whitespace().collect::<Vec<_>>().join("_")
}

/// Case-insensitive comparison of two headers after normalization.
pub fn headers_match(a: &str, b: &str) -> bool {
    normalize_header(a).eq_ignore_ascii_case(&normalize_header(b))
}

/// True when the header contains any month token, ignoring case.
pub fn is_month_header(header: &str) -> bool {
    let upper = header.to_uppercase();
    MONTH_TOKENS.iter().any(|token| upper.contains(token))
}

pub fn first_of_month(date: NaiveDate) -> NaiveDate {
    date.with_day(1).unwrap_or(date)
}

/// Parses a spreadsheet month header ("Jan-24", "JAN 2024", "01/2024", "jan_24")
/// into the first day of that month. Never fails: unrecognisable labels resolve
/// to the current month.
pub fn parse_month_label(label: &str) -> NaiveDate {
    parse_month_label_at(label, Utc::now().date_naive())
}

/// Same as [`parse_month_label`] with an explicit "today" for the fallbacks.
pub fn parse_month_label_at(label: &str, today: NaiveDate) -> NaiveDate {
    let canonical = fold_separators(&label.trim().to_uppercase());
    let fallback = first_of_month(today);

    if canonical.is_empty() {
        return fallback;
    }

    for fmt in STRICT_MONTH_FORMATS {
        if !year_width_matches(fmt, &canonical) {
            continue;
        }
        let candidate = format!("{}-01", canonical);
        let pattern = format!("{}-%d", fmt);
        if let Ok(date) = NaiveDate::parse_from_str(&candidate, &pattern) {
            return date;
        }
    }

    for (idx, token) in MONTH_TOKENS.iter().enumerate() {
        if !canonical.contains(token) {
            continue;
        }

        let remainder: String = canonical
            .replace(token, "")
            .chars()
            .filter(|c| !matches!(c, '-' | ' ' | '_'))
            .collect();

        let year = if !remainder.is_empty() && remainder.chars().all(|c| c.is_ascii_digit()) {
            match remainder.len() {
                2 => remainder.parse::<i32>().map(|y| 2000 + y).unwrap_or(today.year()),
                4 => remainder.parse::<i32>().unwrap_or(today.year()),
                _ => today.year(),
            }
        } else {
            today.year()
        };

        return NaiveDate::from_ymd_opt(year, idx as u32 + 1, 1).unwrap_or(fallback);
    }

    fallback
}

/// chrono reads any digit count for `%Y` and one or two for `%y`; the
/// spreadsheet formats require exactly four and two.
fn year_width_matches(fmt: &str, label: &str) -> bool {
    let trailing = label.chars().rev().take_while(|c| c.is_ascii_digit()).count();
    let leading = label.chars().take_while(|c| c.is_ascii_digit()).count();

    if fmt.starts_with("%Y") {
        leading == 4
    } else if fmt.ends_with("%Y") {
        trailing == 4
    } else if fmt.ends_with("%y") {
        trailing == 2
    } else {
        true
    }
}

/// Collapses `_`, `-` and whitespace runs into a single `-`.
fn fold_separators(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    let mut pending_separator = false;

    for c in input.chars() {
        if c == '_' || c == '-' || c.is_whitespace() {
            pending_separator = true;
            continue;
        }
        if pending_separator && !out.is_empty() {
            out.push('-');
        }
        pending_separator = false;
        out.push(c);
    }

    out
}

/// Spreadsheet cell to quantity. Blank, non-numeric and non-finite cells become 0.
pub fn coerce_quantity(cell: &str) -> f64 {
    match cell.trim().parse::<f64>() {
        Ok(value) if value.is_finite() => value,
        _ => 0.0,
    }
}

/// The most recent `n` distinct months, ascending. No gap filling.
pub fn last_n_months<I>(months: I, n: usize) -> Vec<NaiveDate>
where
    I: IntoIterator<Item = NaiveDate>,
{
    let distinct: BTreeSet<NaiveDate> = months.into_iter().collect();
    let skip = distinct.len().saturating_sub(n);
    distinct.into_iter().skip(skip).collect()
}

pub fn mean(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        None
    } else {
        Some(values.iter().sum::<f64>() / values.len() as f64)
    }
}

/// `numerator / denominator * 100`, or 0 when the denominator is not positive.
pub fn percentage_of(numerator: f64, denominator: f64) -> f64 {
    if denominator > 0.0 {
        numerator / denominator * 100.0
    } else {
        0.0
    }
}
