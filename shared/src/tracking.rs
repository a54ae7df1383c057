//! Tracking identifiers of the form `ZP-YYYYMMDD-XXXXXXXX`.
//!
//! The hex part comes from four random bytes, so two parcels paid on the same
//! day collide with probability about 1 in 2^32. The identifier is a display
//! and lookup convenience; the gateway transaction id is the uniqueness key.

use chrono::{NaiveDate, Utc};
use rand::rngs::OsRng;
use rand::RngCore;

pub const TRACKING_PREFIX: &str = "ZP";

pub fn generate_tracking_id() -> String {
    let mut bytes = [0u8; 4];
    OsRng.fill_bytes(&mut bytes);
    format_tracking_id(Utc::now().date_naive(), bytes)
}

pub fn format_tracking_id(date: NaiveDate, bytes: [u8; 4]) -> String {
    let hex: String = bytes.iter().map(|b| format!("{:02X}", b)).collect();
    format!("{}-{}-{}", TRACKING_PREFIX, date.format("%Y%m%d"), hex)
}

pub fn is_tracking_id(value: &str) -> bool {
    let mut parts = value.split('-');
    let (Some(prefix), Some(date), Some(hex), None) =
        (parts.next(), parts.next(), parts.next(), parts.next())
    else {
        return false;
    };

    prefix == TRACKING_PREFIX
        && date.len() == 8
        && date.bytes().all(|b| b.is_ascii_digit())
        && hex.len() == 8
        && hex.bytes().all(|b| b.is_ascii_digit() || (b'A'..=b'F').contains(&b))
}
