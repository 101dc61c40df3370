// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

//! Epoch conversions for the two date representations used on the wire.
//!
//! Bookmark dates count seconds since 2001-01-01 UTC (the Darwin epoch)
//! as an IEEE-754 double. Alias record dates count seconds since
//! 1904-01-01 UTC (the HFS+ epoch) as u32, with the high resolution
//! extension tags carrying the same count as 16.16 fixed point.

use chrono::{DateTime, Duration, TimeZone, Utc};

/// 2001-01-01T00:00:00Z in Unix seconds.
const DARWIN_EPOCH_UNIX: i64 = 978_307_200;

/// 1904-01-01T00:00:00Z in Unix seconds.
const HFS_EPOCH_UNIX: i64 = -2_082_844_800;

pub(crate) fn darwin_epoch() -> DateTime<Utc> {
    Utc.timestamp_opt(DARWIN_EPOCH_UNIX, 0).unwrap()
}

pub(crate) fn hfs_epoch() -> DateTime<Utc> {
    Utc.timestamp_opt(HFS_EPOCH_UNIX, 0).unwrap()
}

/// Whole seconds since the Darwin epoch. Sub-second precision is dropped.
pub(crate) fn darwin_seconds(t: DateTime<Utc>) -> f64 {
    t.signed_duration_since(darwin_epoch()).num_seconds() as f64
}

/// Largest second count either direction that keeps a converted instant
/// inside chrono's representable range.
const MAX_EPOCH_SECONDS: i64 = 8_000_000_000_000;

pub(crate) fn from_darwin_seconds(secs: f64) -> DateTime<Utc> {
    // Absurd on-disk values are clamped rather than allowed to overflow.
    let secs = (secs as i64).clamp(-MAX_EPOCH_SECONDS, MAX_EPOCH_SECONDS);
    darwin_epoch() + Duration::seconds(secs)
}

/// Whole seconds since the HFS+ epoch, wrapping like the 32-bit field it
/// feeds.
pub(crate) fn hfs_seconds(t: DateTime<Utc>) -> u32 {
    t.signed_duration_since(hfs_epoch()).num_seconds() as u32
}

pub(crate) fn from_hfs_seconds(secs: u32) -> DateTime<Utc> {
    hfs_epoch() + Duration::seconds(i64::from(secs))
}

/// Seconds since the HFS+ epoch as 16.16 fixed point with a zero fraction.
pub(crate) fn hfs_fixed(t: DateTime<Utc>) -> u64 {
    u64::from(hfs_seconds(t)) * 65536
}

pub(crate) fn from_hfs_fixed(v: u64) -> DateTime<Utc> {
    let secs = ((v / 65536) as i64).min(MAX_EPOCH_SECONDS);
    hfs_epoch() + Duration::seconds(secs)
}
