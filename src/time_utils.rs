// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Shared helpers for date/time formatting.

use chrono::{DateTime, NaiveDateTime, SecondsFormat, Utc};

/// Timestamp layout embedded in snapshot file names. Sorts lexically.
const SNAPSHOT_STAMP_FORMAT: &str = "%Y%m%dT%H%M%S%.3fZ";

const SNAPSHOT_PREFIX: &str = "tiles-";
const SNAPSHOT_SUFFIX: &str = ".mbtiles";

/// Format a UTC timestamp as RFC3339 using a `Z` suffix.
pub fn format_utc_rfc3339(date: DateTime<Utc>) -> String {
    date.to_rfc3339_opts(SecondsFormat::Secs, true)
}

/// File name of the snapshot taken at `at`, e.g. `tiles-20260301T080000.000Z.mbtiles`.
pub fn snapshot_file_name(at: DateTime<Utc>) -> String {
    format!(
        "{}{}{}",
        SNAPSHOT_PREFIX,
        at.format(SNAPSHOT_STAMP_FORMAT),
        SNAPSHOT_SUFFIX
    )
}

/// Recover the timestamp from a snapshot file name; `None` for other files.
pub fn parse_snapshot_file_name(name: &str) -> Option<DateTime<Utc>> {
    let stamp = name
        .strip_prefix(SNAPSHOT_PREFIX)?
        .strip_suffix(SNAPSHOT_SUFFIX)?;
    NaiveDateTime::parse_from_str(stamp, SNAPSHOT_STAMP_FORMAT)
        .ok()
        .map(|naive| naive.and_utc())
}
