//! Domain logic for gpdload.
//!
//! This crate is intentionally I/O-free: it builds payload documents and
//! interprets upload-job state. Randomness and wall-clock time come in
//! through the [`IdSource`] and [`Clock`] traits.

mod payload;
mod poll;

pub use payload::{
    Clock, FixedClock, IdSource, SystemClock, UuidIdSource, due_date, generate_batch,
    generate_iupd_document, FIXTURE_CATEGORY, FIXTURE_IBAN, IUPD_PREFIX, IUV_PREFIX,
};
pub use poll::{
    PollState, extract_upload_uid, report_url, status_url, substitute_uid, upload_path,
};

use gpdload_types::DurationSummary;

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum DomainError {
    #[error("no durations to summarize")]
    NoSamples,

    #[error("url {0:?} does not reference an upload status resource")]
    NotAStatusUrl(String),
}

/// Summarize iteration durations (milliseconds).
pub fn summarize_durations(values: &[u64]) -> Result<DurationSummary, DomainError> {
    if values.is_empty() {
        return Err(DomainError::NoSamples);
    }
    let mut v = values.to_vec();
    v.sort_unstable();
    let min_ms = v[0];
    let max_ms = v[v.len() - 1];
    let median_ms = median_sorted(&v);
    Ok(DurationSummary {
        median_ms,
        min_ms,
        max_ms,
    })
}

fn median_sorted(sorted: &[u64]) -> u64 {
    debug_assert!(!sorted.is_empty());
    let n = sorted.len();
    let mid = n / 2;
    if n % 2 == 1 {
        sorted[mid]
    } else {
        // average, rounding down
        (sorted[mid - 1] / 2) + (sorted[mid] / 2) + ((sorted[mid - 1] % 2 + sorted[mid] % 2) / 2)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn summarize_rejects_empty() {
        assert_eq!(summarize_durations(&[]), Err(DomainError::NoSamples));
    }

    #[test]
    fn summarize_odd_and_even() {
        let odd = summarize_durations(&[30, 10, 20]).unwrap();
        assert_eq!((odd.min_ms, odd.median_ms, odd.max_ms), (10, 20, 30));

        let even = summarize_durations(&[4, 1, 3, 2]).unwrap();
        assert_eq!(even.median_ms, 2);
    }

    #[test]
    fn median_does_not_overflow() {
        let s = summarize_durations(&[u64::MAX, u64::MAX]).unwrap();
        assert_eq!(s.median_ms, u64::MAX);
    }

    proptest! {
        #[test]
        fn median_lies_between_min_and_max(values in proptest::collection::vec(0u64..1_000_000, 1..50)) {
            let s = summarize_durations(&values).unwrap();
            prop_assert!(s.min_ms <= s.median_ms);
            prop_assert!(s.median_ms <= s.max_ms);
        }
    }
}
