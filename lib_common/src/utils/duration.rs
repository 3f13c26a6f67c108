use serde::Serialize;

const MINUTE: u64 = 60;
const HOUR: u64 = 60 * MINUTE;
const DAY: u64 = 24 * HOUR;
const WEEK: u64 = 7 * DAY;
const YEAR: u64 = 365 * DAY;

/// # Duration Parts
///
/// A number of seconds split into the components a UI shows ("2w 3d", "5m 12s").
/// Zero components other than `seconds` are omitted from the JSON form.
/// `cum_seconds` always carries the exact, unsplit input.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct DurationParts {
    /// Whole 365-day years.
    #[serde(skip_serializing_if = "is_zero")]
    pub years: u64,
    /// Whole weeks after removing years.
    #[serde(skip_serializing_if = "is_zero")]
    pub weeks: u64,
    /// Whole days after removing weeks.
    #[serde(skip_serializing_if = "is_zero")]
    pub days: u64,
    /// Whole hours after removing days.
    #[serde(skip_serializing_if = "is_zero")]
    pub hours: u64,
    /// Whole minutes after removing hours.
    #[serde(skip_serializing_if = "is_zero")]
    pub minutes: u64,
    /// Remaining whole seconds.
    pub seconds: u64,
    /// The total duration in seconds, unrounded.
    pub cum_seconds: f64,
}

fn is_zero(value: &u64) -> bool {
    *value == 0
}

/// Splits `cum_seconds` into [`DurationParts`].
///
/// Negative and non-finite inputs collapse to zero components; `cum_seconds`
/// is still reported as given so callers can tell what they passed in.
pub fn seconds_to_duration(cum_seconds: f64) -> DurationParts {
    let mut remaining = if cum_seconds.is_finite() && cum_seconds > 0.0 {
        cum_seconds.floor() as u64
    } else {
        0
    };

    let mut take = |unit: u64| {
        let whole = remaining / unit;
        remaining %= unit;
        whole
    };

    let years = take(YEAR);
    let weeks = take(WEEK);
    let days = take(DAY);
    let hours = take(HOUR);
    let minutes = take(MINUTE);

    DurationParts {
        years,
        weeks,
        days,
        hours,
        minutes,
        seconds: remaining,
        cum_seconds,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_splits_mixed_duration() {
        let parts = seconds_to_duration((WEEK + 2 * DAY + 3 * HOUR + 4 * MINUTE + 5) as f64);
        assert_eq!(parts.years, 0);
        assert_eq!(parts.weeks, 1);
        assert_eq!(parts.days, 2);
        assert_eq!(parts.hours, 3);
        assert_eq!(parts.minutes, 4);
        assert_eq!(parts.seconds, 5);
    }

    #[test]
    fn test_fractional_seconds_are_floored_but_kept_in_total() {
        let parts = seconds_to_duration(90.75);
        assert_eq!(parts.minutes, 1);
        assert_eq!(parts.seconds, 30);
        assert!((parts.cum_seconds - 90.75).abs() < f64::EPSILON);
    }

    #[test]
    fn test_negative_and_infinite_collapse_to_zero() {
        assert_eq!(seconds_to_duration(-5.0).seconds, 0);
        assert_eq!(seconds_to_duration(f64::INFINITY).years, 0);
    }

    #[test]
    fn test_json_omits_leading_zero_components() {
        let json = serde_json::to_value(seconds_to_duration(125.0)).unwrap();
        assert_eq!(json, serde_json::json!({"minutes": 2, "seconds": 5, "cumSeconds": 125.0}));
    }
}
