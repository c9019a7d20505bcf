//! pollbooth-wait — Queue wait-time estimation.
//!
//! A linear placeholder heuristic: queue length times the average time spent
//! processing one voter, rounded to whole minutes. There is no trained model
//! behind it, and every result says so through [`CALCULATION_BASIS`].

use serde::Serialize;
use thiserror::Error;

/// Label attached to every successful estimate.
pub const CALCULATION_BASIS: &str = "Heuristic placeholder: queue length x average processing time";

/// 2^64, the first f64 that no longer fits in a `u64`.
const U64_LIMIT: f64 = 18_446_744_073_709_551_616.0;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum EstimateError {
    #[error("Invalid input: queue_length and avg_processing_time_minutes must be numbers.")]
    InvalidNumber,
    #[error("Inputs must be non-negative.")]
    Negative,
    #[error("An unexpected error occurred while estimating wait time: {0}")]
    Unexpected(String),
}

/// Outcome of [`estimate`]: either an estimate or an error, never both.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum WaitTimeResult {
    #[serde(rename_all = "camelCase")]
    Estimate {
        estimated_wait_time_minutes: u64,
        calculation_basis: &'static str,
    },
    Error { error: String },
}

impl WaitTimeResult {
    pub fn error(message: impl Into<String>) -> Self {
        Self::Error {
            error: message.into(),
        }
    }

    /// Estimated minutes, if this is a successful result.
    pub fn minutes(&self) -> Option<u64> {
        match self {
            Self::Estimate {
                estimated_wait_time_minutes,
                ..
            } => Some(*estimated_wait_time_minutes),
            Self::Error { .. } => None,
        }
    }
}

impl From<Result<u64, EstimateError>> for WaitTimeResult {
    fn from(result: Result<u64, EstimateError>) -> Self {
        match result {
            Ok(minutes) => Self::Estimate {
                estimated_wait_time_minutes: minutes,
                calculation_basis: CALCULATION_BASIS,
            },
            Err(e) => Self::error(e.to_string()),
        }
    }
}

/// Estimate the wait for a queue from the raw text of both inputs.
///
/// Always returns a well-formed result; failures are reported in the
/// `error` shape rather than propagated.
pub fn estimate(queue_length_raw: &str, avg_processing_time_raw: &str) -> WaitTimeResult {
    let result = try_estimate(queue_length_raw, avg_processing_time_raw);
    if let Err(e) = &result {
        tracing::debug!(
            queue_length = queue_length_raw,
            avg_processing_time = avg_processing_time_raw,
            error = %e,
            "wait-time estimate rejected"
        );
    }
    result.into()
}

/// Fallible core of [`estimate`].
///
/// Both inputs are parsed before either is range-checked, so a non-numeric
/// value always wins over a negative one.
pub fn try_estimate(
    queue_length_raw: &str,
    avg_processing_time_raw: &str,
) -> Result<u64, EstimateError> {
    let queue_length = parse_queue_length(queue_length_raw)?;
    let avg_minutes = parse_processing_time(avg_processing_time_raw)?;

    if queue_length < 0 || avg_minutes < 0.0 {
        return Err(EstimateError::Negative);
    }

    let predicted = queue_length as f64 * avg_minutes;
    // 0 x inf: there is no number to round
    if predicted.is_nan() {
        return Err(EstimateError::InvalidNumber);
    }

    round_minutes(predicted)
}

fn parse_queue_length(raw: &str) -> Result<i64, EstimateError> {
    strip_digit_separators(raw.trim())?
        .parse::<i64>()
        .map_err(|_| EstimateError::InvalidNumber)
}

fn parse_processing_time(raw: &str) -> Result<f64, EstimateError> {
    let value = strip_digit_separators(raw.trim())?
        .parse::<f64>()
        .map_err(|_| EstimateError::InvalidNumber)?;
    if value.is_nan() {
        return Err(EstimateError::InvalidNumber);
    }
    Ok(value)
}

/// Drop `_` digit separators (`1_000`). Each one must sit between two digits.
fn strip_digit_separators(raw: &str) -> Result<String, EstimateError> {
    let bytes = raw.as_bytes();
    let mut digits = String::with_capacity(raw.len());
    for (i, c) in raw.char_indices() {
        if c != '_' {
            digits.push(c);
            continue;
        }
        let before = i.checked_sub(1).and_then(|j| bytes.get(j));
        let after = bytes.get(i + 1);
        match (before, after) {
            (Some(b), Some(a)) if b.is_ascii_digit() && a.is_ascii_digit() => {}
            _ => return Err(EstimateError::InvalidNumber),
        }
    }
    Ok(digits)
}

/// Round to the nearest whole minute, ties to even (12.5 -> 12, 7.5 -> 8).
fn round_minutes(predicted: f64) -> Result<u64, EstimateError> {
    let rounded = predicted.round_ties_even();
    if !(0.0..U64_LIMIT).contains(&rounded) {
        return Err(EstimateError::Unexpected(format!(
            "estimated wait of {predicted} minutes is out of range"
        )));
    }
    Ok(rounded as u64)
}

#[cfg(test)]
mod tests {
    use super::*;

    const INVALID: &str =
        "Invalid input: queue_length and avg_processing_time_minutes must be numbers.";
    const NEGATIVE: &str = "Inputs must be non-negative.";

    #[test]
    fn test_estimate_basic() {
        let result = estimate("4", "3");
        assert_eq!(result.minutes(), Some(12));
    }

    #[test]
    fn test_estimate_half_ties_to_even() {
        // 5 x 2.5 = 12.5 -> 12, 3 x 2.5 = 7.5 -> 8
        assert_eq!(estimate("5", "2.5").minutes(), Some(12));
        assert_eq!(estimate("3", "2.5").minutes(), Some(8));
        assert_eq!(estimate("1", "0.5").minutes(), Some(0));
        assert_eq!(estimate("1", "1.5").minutes(), Some(2));
    }

    #[test]
    fn test_estimate_non_tie_rounds_to_nearest() {
        assert_eq!(estimate("3", "1.4").minutes(), Some(4)); // 4.2
        assert_eq!(estimate("3", "1.6").minutes(), Some(5)); // 4.8
    }

    #[test]
    fn test_estimate_matches_product_for_non_negative_inputs() {
        for q in [0i64, 1, 2, 7, 13, 250, 10_000] {
            for t in [0.0f64, 0.1, 0.25, 1.0, 2.75, 4.333, 15.9] {
                let result = estimate(&q.to_string(), &t.to_string());
                let expected = (q as f64 * t).round_ties_even() as u64;
                assert_eq!(result.minutes(), Some(expected), "q={q} t={t}");
            }
        }
    }

    #[test]
    fn test_estimate_zero_queue() {
        assert_eq!(estimate("0", "12.5").minutes(), Some(0));
    }

    #[test]
    fn test_estimate_negative_inputs() {
        assert_eq!(estimate("-1", "3"), WaitTimeResult::error(NEGATIVE));
        assert_eq!(estimate("3", "-0.5"), WaitTimeResult::error(NEGATIVE));
        assert_eq!(estimate("-2", "-2"), WaitTimeResult::error(NEGATIVE));
    }

    #[test]
    fn test_estimate_negative_zero_is_allowed() {
        assert_eq!(estimate("4", "-0.0").minutes(), Some(0));
    }

    #[test]
    fn test_estimate_non_numeric() {
        for (q, t) in [
            ("abc", "3"),
            ("3", "abc"),
            ("", "3"),
            ("3", ""),
            ("2.5", "3"),
            ("3", "NaN"),
            ("0x10", "1"),
        ] {
            assert_eq!(estimate(q, t), WaitTimeResult::error(INVALID), "q={q:?} t={t:?}");
        }
    }

    #[test]
    fn test_estimate_parse_error_wins_over_negative() {
        assert_eq!(estimate("-1", "abc"), WaitTimeResult::error(INVALID));
    }

    #[test]
    fn test_estimate_queue_overflow_is_invalid() {
        assert_eq!(
            estimate("99999999999999999999", "1"),
            WaitTimeResult::error(INVALID)
        );
    }

    #[test]
    fn test_estimate_trims_whitespace_and_plus() {
        assert_eq!(estimate(" 6 ", "\t2\n").minutes(), Some(12));
        assert_eq!(estimate("+6", "+2").minutes(), Some(12));
    }

    #[test]
    fn test_estimate_infinite_time_is_unexpected() {
        let result = estimate("2", "inf");
        match result {
            WaitTimeResult::Error { error } => {
                assert!(error.starts_with("An unexpected error occurred"), "{error}");
            }
            other => panic!("expected error, got {other:?}"),
        }
    }

    #[test]
    fn test_estimate_zero_times_infinity_is_invalid() {
        assert_eq!(estimate("0", "inf"), WaitTimeResult::error(INVALID));
    }

    #[test]
    fn test_estimate_digit_separators() {
        assert_eq!(estimate("1_000", "0.5").minutes(), Some(500));
        assert_eq!(estimate("4", "1_0.2_5").minutes(), Some(41));
        for (q, t) in [("_10", "1"), ("10_", "1"), ("1__0", "1"), ("1", "1_.5"), ("1", "in_f")] {
            assert_eq!(estimate(q, t), WaitTimeResult::error(INVALID), "q={q:?} t={t:?}");
        }
    }

    #[test]
    fn test_estimate_out_of_range_product_is_unexpected() {
        let result = estimate("9223372036854775807", "1e10");
        assert!(matches!(result, WaitTimeResult::Error { ref error } if error.contains("out of range")));
    }

    #[test]
    fn test_estimate_is_idempotent() {
        assert_eq!(estimate("5", "2.5"), estimate("5", "2.5"));
        assert_eq!(estimate("x", "2.5"), estimate("x", "2.5"));
    }

    #[test]
    fn test_estimate_json_shape() {
        let json = serde_json::to_value(estimate("5", "2.5")).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "estimatedWaitTimeMinutes": 12,
                "calculationBasis": CALCULATION_BASIS,
            })
        );
    }

    #[test]
    fn test_error_json_shape() {
        let json = serde_json::to_value(estimate("-1", "3")).unwrap();
        assert_eq!(json, serde_json::json!({ "error": NEGATIVE }));
    }
}
