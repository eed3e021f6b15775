//! CF-convention time decoding (`<unit> since <reference>`).

use chrono::{DateTime, Duration, NaiveDate, NaiveDateTime, TimeZone, Utc};

use crate::error::{NetCdfError, NetCdfResult};

/// Decode raw time-axis values using a CF `units` string such as
/// `hours since 2012-10-29 00:00:00`. Only the standard (proleptic
/// Gregorian) calendar is supported. Values are rounded to the millisecond.
pub fn decode_cf_time(values: &[f64], units: &str) -> NetCdfResult<Vec<DateTime<Utc>>> {
    let (unit, reference) = units
        .split_once(" since ")
        .ok_or_else(|| NetCdfError::InvalidTime(format!("unrecognised units '{}'", units)))?;

    let seconds_per_unit = match unit.trim().to_ascii_lowercase().as_str() {
        "seconds" | "second" | "secs" | "sec" | "s" => 1.0,
        "minutes" | "minute" | "mins" | "min" => 60.0,
        "hours" | "hour" | "hrs" | "hr" | "h" => 3600.0,
        "days" | "day" | "d" => 86400.0,
        other => {
            return Err(NetCdfError::InvalidTime(format!(
                "unsupported time unit '{}'",
                other
            )))
        }
    };

    let base = parse_reference(reference.trim())?;

    values
        .iter()
        .map(|v| {
            if !v.is_finite() {
                return Err(NetCdfError::InvalidTime(format!("non-finite time value {}", v)));
            }
            let millis = (v * seconds_per_unit * 1000.0).round() as i64;
            Ok(base + Duration::milliseconds(millis))
        })
        .collect()
}

fn parse_reference(s: &str) -> NetCdfResult<DateTime<Utc>> {
    let trimmed = s
        .trim_end_matches(" UTC")
        .trim_end_matches("+00:00")
        .trim_end_matches('Z')
        .trim();

    const FORMATS: [&str; 6] = [
        "%Y-%m-%d %H:%M:%S%.f",
        "%Y-%m-%dT%H:%M:%S%.f",
        "%Y-%m-%d %H:%M:%S",
        "%Y-%m-%dT%H:%M:%S",
        "%Y-%m-%d %H:%M",
        "%Y-%m-%dT%H:%M",
    ];
    for fmt in FORMATS {
        if let Ok(dt) = NaiveDateTime::parse_from_str(trimmed, fmt) {
            return Ok(Utc.from_utc_datetime(&dt));
        }
    }

    NaiveDate::parse_from_str(trimmed, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|dt| Utc.from_utc_datetime(&dt))
        .ok_or_else(|| NetCdfError::InvalidTime(format!("unparseable reference time '{}'", s)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hours_since() {
        let times = decode_cf_time(&[0.0, 1.5, 24.0], "hours since 2012-10-29 00:00:00").unwrap();
        assert_eq!(times[0], Utc.with_ymd_and_hms(2012, 10, 29, 0, 0, 0).unwrap());
        assert_eq!(times[1], Utc.with_ymd_and_hms(2012, 10, 29, 1, 30, 0).unwrap());
        assert_eq!(times[2], Utc.with_ymd_and_hms(2012, 10, 30, 0, 0, 0).unwrap());
    }

    #[test]
    fn test_seconds_since_iso_reference() {
        let times = decode_cf_time(&[3600.0], "seconds since 2012-10-22T12:00:00Z").unwrap();
        assert_eq!(times[0], Utc.with_ymd_and_hms(2012, 10, 22, 13, 0, 0).unwrap());
    }

    #[test]
    fn test_days_since_date_only() {
        let times = decode_cf_time(&[1.0], "days since 2000-01-01").unwrap();
        assert_eq!(times[0], Utc.with_ymd_and_hms(2000, 1, 2, 0, 0, 0).unwrap());
    }

    #[test]
    fn test_rejects_bad_units() {
        assert!(decode_cf_time(&[1.0], "fortnights since 2000-01-01").is_err());
        assert!(decode_cf_time(&[1.0], "hours").is_err());
        assert!(decode_cf_time(&[f64::NAN], "hours since 2000-01-01").is_err());
    }
}
