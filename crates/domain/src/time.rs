//! Time and timestamp helpers.

use chrono::{DateTime, Utc};

/// UTC timestamp used for transaction records.
pub type Timestamp = DateTime<Utc>;

/// Return the current UTC time.
#[must_use]
pub fn now() -> Timestamp {
    Utc::now()
}

/// Render a timestamp the way receipts show it (`2025-02-05 11:20 AM`).
#[must_use]
pub fn format_receipt(ts: Timestamp) -> String {
    ts.format("%Y-%m-%d %I:%M %p").to_string()
}
