//! Correlation ids
//!
//! Every delivery request carries an `X-ADP-CorrelationId` binding it to a
//! device, a title and a point in time:
//!
//! ```text
//! Device:{deviceType}:{deviceSerial};kindle.EBOK:{contentId}:{timestampMillis}
//! ```
//!
//! The voucher request must reuse the manifest's `manifestTime` here. A
//! voucher signed with any other timestamp is rejected by the server.

use chrono::Utc;

/// Build a correlation id.
///
/// With `timestamp_millis` set the result depends only on the arguments.
/// Without it the current UTC time, truncated to whole seconds and
/// expressed in milliseconds, is used.
pub fn build_correlation_id(
    device_type: &str,
    device_serial: &str,
    content_id: &str,
    timestamp_millis: Option<i64>,
) -> String {
    let timestamp = timestamp_millis.unwrap_or_else(current_timestamp_millis);
    format!(
        "Device:{}:{};kindle.EBOK:{}:{}",
        device_type, device_serial, content_id, timestamp
    )
}

fn current_timestamp_millis() -> i64 {
    Utc::now().timestamp() * 1000
}
