// src/utils/time.rs
//! Wall-clock helpers for statement validity windows.

use chrono::Utc;

/// Current time in epoch seconds (UTC).
pub fn now_epoch_seconds() -> i64 {
    Utc::now().timestamp()
}
