//! Keystroke and page-visibility reports sent by the chat page.

use crate::core::commands::KeystrokeReport;
use crate::core::error::{ServiceError, ServiceResult, optional, required};
use crate::core::traits::TelemetryService;
use crate::infrastructure::entities::{Keystroke, NewKeystroke};
use crate::infrastructure::traits::KeystrokeRepository;
use async_trait::async_trait;
use chrono::{DateTime, NaiveDateTime, Utc};
use di::{Ref, injectable};

const NAIVE_FORMATS: [&str; 2] = ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"];

#[injectable(TelemetryService)]
pub struct KeystrokeTelemetry {
    keystrokes: Ref<dyn KeystrokeRepository>,
}

/// RFC 3339, or an ISO-8601 timestamp without offset taken as UTC.
pub fn parse_timestamp(value: &str) -> Option<DateTime<Utc>> {
    if let Ok(timestamp) = DateTime::parse_from_rfc3339(value) {
        return Some(timestamp.with_timezone(&Utc));
    }
    NAIVE_FORMATS
        .iter()
        .find_map(|format| NaiveDateTime::parse_from_str(value, format).ok())
        .map(|naive| naive.and_utc())
}

fn duration(value: Option<f64>, field: &str) -> ServiceResult<f64> {
    match value {
        Some(seconds) if seconds.is_finite() && seconds >= 0.0 => Ok(seconds),
        Some(_) => Err(ServiceError::validation(format!(
            "'{field}' must be a non-negative number."
        ))),
        None => Err(ServiceError::validation(format!("'{field}' is required."))),
    }
}

#[async_trait]
impl TelemetryService for KeystrokeTelemetry {
    async fn record_keystrokes(&self, report: KeystrokeReport) -> ServiceResult<Keystroke> {
        let conversation_id = required(report.conversation_id, "conversation_id")?;
        let total_time_on_page = duration(report.total_time_on_page, "total_time_on_page")?;
        let total_time_away_from_page =
            duration(report.total_time_away_from_page, "total_time_away_from_page")?;
        let keystroke_count = match report.keystroke_count {
            Some(count) if count >= 0 => count,
            Some(_) => {
                return Err(ServiceError::validation(
                    "'keystroke_count' must not be negative.",
                ));
            }
            None => return Err(ServiceError::validation("'keystroke_count' is required.")),
        };

        let timestamp = match optional(report.timestamp) {
            Some(raw) => parse_timestamp(&raw).ok_or_else(|| {
                ServiceError::validation(format!("'{raw}' is not a valid timestamp."))
            })?,
            None => Utc::now(),
        };

        Ok(self
            .keystrokes
            .create_keystroke(NewKeystroke {
                conversation_id,
                total_time_on_page,
                total_time_away_from_page,
                keystroke_count,
                timestamp,
            })
            .await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_parse_timestamp_accepts_supported_formats() {
        let expected = Utc.with_ymd_and_hms(2025, 3, 1, 10, 15, 0).unwrap();

        assert_eq!(parse_timestamp("2025-03-01T10:15:00Z"), Some(expected));
        assert_eq!(parse_timestamp("2025-03-01T12:15:00+02:00"), Some(expected));
        assert_eq!(parse_timestamp("2025-03-01T10:15:00"), Some(expected));
        assert_eq!(parse_timestamp("2025-03-01 10:15:00"), Some(expected));
        assert!(parse_timestamp("2025-03-01T10:15:00.250").is_some());
    }

    #[test]
    fn test_parse_timestamp_rejects_garbage() {
        assert_eq!(parse_timestamp("yesterday"), None);
        assert_eq!(parse_timestamp("2025-13-01T10:15:00"), None);
        assert_eq!(parse_timestamp("1700000000"), None);
    }

    #[test]
    fn test_duration_requires_finite_non_negative_values() {
        assert_eq!(duration(Some(1.5), "t").unwrap(), 1.5);
        assert!(duration(Some(-1.0), "t").is_err());
        assert!(duration(Some(f64::NAN), "t").is_err());
        assert!(duration(None, "t").is_err());
    }
}
