//! Per-event-type projections. Each submodule adds `process_*` methods to
//! [`crate::handler::IngestHandler`] and owns the derivations for its rows.

use serde::Serialize;
use time::OffsetDateTime;

mod api_usage;
mod artifact;
mod billing;
mod client;
mod federation;
mod node;
mod routing;
mod service;
mod storage;
mod stream;
mod viewer;

/// Country code stored when the client could not be geolocated.
pub(crate) const UNKNOWN_COUNTRY: &str = "--";

/// Moves the expected variant out of a decoded trigger, or returns
/// [`crate::error::IngestError::UnexpectedPayload`] from the caller.
macro_rules! expect_payload {
    ($trigger:expr, $variant:ident, $expected:literal) => {
        match $trigger.payload.take() {
            Some($crate::trigger::TriggerPayload::$variant(payload)) => payload,
            other => {
                return Err($crate::error::IngestError::UnexpectedPayload {
                    expected: $expected,
                    found: other
                        .as_ref()
                        .map_or("none", $crate::trigger::TriggerPayload::kind),
                })
            }
        }
    };
}

pub(crate) use expect_payload;

pub(crate) fn non_zero<T: Default + PartialEq>(value: T) -> Option<T> {
    (value != T::default()).then_some(value)
}

pub(crate) fn non_empty(value: &str) -> Option<String> {
    (!value.is_empty()).then(|| value.to_string())
}

pub(crate) fn non_empty_opt(value: Option<&str>) -> Option<String> {
    value.and_then(non_empty)
}

/// ClickHouse booleans are `UInt8`; `false` is stored as null.
pub(crate) fn flag(value: bool) -> Option<u8> {
    value.then_some(1)
}

pub(crate) fn saturating_u16(value: u32) -> u16 {
    u16::try_from(value).unwrap_or(u16::MAX)
}

pub(crate) fn saturating_u8(value: u32) -> u8 {
    u8::try_from(value).unwrap_or(u8::MAX)
}

pub(crate) fn positive_u16(value: i32) -> Option<u16> {
    (value > 0).then(|| u16::try_from(value).unwrap_or(u16::MAX))
}

pub(crate) fn positive_u32(value: i32) -> Option<u32> {
    u32::try_from(value).ok().filter(|v| *v > 0)
}

/// Seconds since the epoch; zero and out-of-range values are treated as unset.
pub(crate) fn unix_seconds(value: Option<i64>) -> Option<OffsetDateTime> {
    value
        .filter(|v| *v > 0)
        .and_then(|v| OffsetDateTime::from_unix_timestamp(v).ok())
}

/// JSON rendering of a payload for `event_data` columns.
pub(crate) fn event_data<T: Serialize + ?Sized>(payload: &T) -> String {
    serde_json::to_string(payload).unwrap_or_else(|_| String::from("{}"))
}

/// `1 - lost/sent`, clamped to `[0, 1]`. Absent when nothing was sent.
pub fn connection_quality(packets_sent: Option<u64>, packets_lost: Option<u64>) -> Option<f32> {
    let sent = packets_sent.filter(|s| *s > 0)?;
    let lost = packets_lost.unwrap_or(0);
    let quality = 1.0 - (lost as f64 / sent as f64);
    Some(quality.clamp(0.0, 1.0) as f32)
}

/// `buffer_ms / max_keepaway_ms`, capped at 1.0. Absent without a keepaway window.
pub fn buffer_health(buffer_ms: Option<u32>, max_keepaway_ms: u32) -> Option<f32> {
    let buffer = buffer_ms?;
    if max_keepaway_ms == 0 {
        return None;
    }
    let health = buffer as f32 / max_keepaway_ms as f32;
    Some(health.min(1.0))
}

/// Reported buffer state, or `FULL` when only a positive buffer size is known.
pub fn derive_buffer_state(buffer_state: &str, buffer_ms: u32) -> Option<String> {
    if !buffer_state.is_empty() {
        Some(buffer_state.to_string())
    } else if buffer_ms > 0 {
        Some(String::from("FULL"))
    } else {
        None
    }
}

/// Floor of `bytes * 8 / 1000`.
pub fn bitrate_kbps(bytes_per_second: u64) -> u64 {
    bytes_per_second.saturating_mul(8) / 1000
}

/// Normalises producer track details into a JSON object: objects pass
/// through, arrays are wrapped as `{"tracks": [...]}`, anything else is `{}`.
pub fn track_metadata_json(raw: &str) -> String {
    let trimmed = raw.trim();
    if trimmed.starts_with('{') {
        trimmed.to_string()
    } else if trimmed.starts_with('[') {
        format!(r#"{{"tracks":{trimmed}}}"#)
    } else {
        String::from("{}")
    }
}

/// `STAGE_DONE` with prefix `STAGE_` becomes `done`.
pub(crate) fn stage_name(wire_name: &str, prefix: &str) -> String {
    wire_name
        .strip_prefix(prefix)
        .unwrap_or(wire_name)
        .to_ascii_lowercase()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn connection_quality_rules() {
        assert_eq!(connection_quality(Some(100), Some(10)), Some(0.9));
        assert_eq!(connection_quality(Some(100), None), Some(1.0));
        assert_eq!(connection_quality(Some(10), Some(50)), Some(0.0));
        assert_eq!(connection_quality(Some(0), Some(7)), None);
        assert_eq!(connection_quality(None, Some(7)), None);
    }

    #[test]
    fn buffer_health_clamps() {
        assert_eq!(buffer_health(Some(8000), 10_000), Some(0.8));
        assert_eq!(buffer_health(Some(12_000), 10_000), Some(1.0));
        assert_eq!(buffer_health(Some(0), 10_000), Some(0.0));
        assert_eq!(buffer_health(Some(8000), 0), None);
        assert_eq!(buffer_health(None, 10_000), None);
    }

    #[test]
    fn buffer_state_defaults_to_full() {
        assert_eq!(derive_buffer_state("DRY", 500).as_deref(), Some("DRY"));
        assert_eq!(derive_buffer_state("", 500).as_deref(), Some("FULL"));
        assert_eq!(derive_buffer_state("", 0), None);
    }

    #[test]
    fn bitrate_is_floored() {
        assert_eq!(bitrate_kbps(0), 0);
        assert_eq!(bitrate_kbps(124), 0);
        assert_eq!(bitrate_kbps(125), 1);
        assert_eq!(bitrate_kbps(312_499), 2499);
        assert_eq!(bitrate_kbps(u64::MAX), u64::MAX / 1000);
    }

    #[test]
    fn track_metadata_shapes() {
        assert_eq!(track_metadata_json(r#" {"a":1} "#), r#"{"a":1}"#);
        assert_eq!(track_metadata_json(r#"[{"a":1}]"#), r#"{"tracks":[{"a":1}]}"#);
        assert_eq!(track_metadata_json("garbage"), "{}");
        assert_eq!(track_metadata_json(""), "{}");
    }

    #[test]
    fn stage_names_are_lowercased() {
        assert_eq!(stage_name("STAGE_DONE", "STAGE_"), "done");
        assert_eq!(stage_name("ACTION_CACHE_STARTED", "ACTION_"), "cache_started");
        assert_eq!(stage_name("weird", "STAGE_"), "weird");
    }

    #[test]
    fn zero_helpers() {
        assert_eq!(non_zero(0u32), None);
        assert_eq!(non_zero(3u32), Some(3));
        assert_eq!(non_empty(""), None);
        assert_eq!(flag(false), None);
        assert_eq!(flag(true), Some(1));
        assert_eq!(positive_u16(-4), None);
        assert_eq!(positive_u16(70_000), Some(u16::MAX));
        assert!(unix_seconds(Some(0)).is_none());
        assert_eq!(
            unix_seconds(Some(1_704_067_200)).map(|t| t.unix_timestamp()),
            Some(1_704_067_200)
        );
    }
}
