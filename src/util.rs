use chrono::{DateTime, Utc};

/// Convert a repository disk usage figure from kilobytes to whole megabytes,
/// rounding down. GitHub reports `diskUsage` in KB; the report columns carry MB.
pub fn kb_to_mb(kb: i64) -> i64 {
    kb / 1024
}

/// Timestamp suffix used in every output file name (`yyyymmddhhmm`).
///
/// A run computes this once so that the statistics files and the conflict
/// reports of the same invocation share a suffix.
pub fn timestamp(now: DateTime<Utc>) -> String {
    now.format("%Y%m%d%H%M").to_string()
}
