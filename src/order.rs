//! Client-side ordering of result records.
//!
//! Codes that are all digits compare numerically with each other; other
//! codes compare as strings. Numeric codes are compared through a key
//! left-padded with zeros to the longest numeric code in the list, so the
//! combined ordering stays a total order even when codes differ in length.
//!
//! The padded key is also what a non-numeric code is compared against. A
//! mixed pair therefore does not always order the way the raw strings
//! would: next to `"1000"`, `"999"` becomes `"0999"` and sorts before
//! `"1A"`, while a plain string comparison would put `"1A"` first.

use std::cmp::Ordering;

use crate::types::{ResultRecord, SortDirection, SortKey, SortSpec};

/// Return `results` sorted according to `spec`. The input is not modified.
///
/// The sort is stable: records with equal keys keep their input order in
/// both directions.
pub fn order(results: &[ResultRecord], spec: SortSpec) -> Vec<ResultRecord> {
    let mut keyed: Vec<(SortValue, &ResultRecord)> = match spec.key {
        SortKey::Code => {
            let width = numeric_width(results);
            results
                .iter()
                .map(|r| (SortValue::Text(code_key(&r.code, width)), r))
                .collect()
        }
        SortKey::Price => results.iter().map(|r| (SortValue::Number(r.price), r)).collect(),
    };

    keyed.sort_by(|(a, _), (b, _)| {
        let ord = a.compare(b);
        match spec.direction {
            SortDirection::Ascending => ord,
            SortDirection::Descending => ord.reverse(),
        }
    });

    keyed.into_iter().map(|(_, r)| r.clone()).collect()
}

enum SortValue {
    Text(String),
    Number(f64),
}

impl SortValue {
    fn compare(&self, other: &Self) -> Ordering {
        match (self, other) {
            (SortValue::Text(a), SortValue::Text(b)) => a.cmp(b),
            (SortValue::Number(a), SortValue::Number(b)) => a.total_cmp(b),
            // One sort never mixes key kinds.
            (SortValue::Text(_), SortValue::Number(_)) => Ordering::Greater,
            (SortValue::Number(_), SortValue::Text(_)) => Ordering::Less,
        }
    }
}

fn is_numeric(code: &str) -> bool {
    !code.is_empty() && code.bytes().all(|b| b.is_ascii_digit())
}

/// Digit count of the longest numeric code, ignoring leading zeros.
fn numeric_width(results: &[ResultRecord]) -> usize {
    results
        .iter()
        .filter(|r| is_numeric(&r.code))
        .map(|r| r.code.trim_start_matches('0').len())
        .max()
        .unwrap_or(0)
}

/// Numeric codes are left-padded to a common width so that string order
/// matches numeric order; other codes are used as-is.
fn code_key(code: &str, width: usize) -> String {
    if is_numeric(code) {
        let digits = code.trim_start_matches('0');
        format!("{digits:0>width$}")
    } else {
        code.to_string()
    }
}
