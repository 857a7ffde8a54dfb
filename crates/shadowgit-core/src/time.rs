use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;

/// Current UTC time as RFC 3339.
pub fn now_iso8601() -> String {
    format_rfc3339(OffsetDateTime::now_utc())
}

pub fn format_rfc3339(ts: OffsetDateTime) -> String {
    ts.format(&Rfc3339)
        .unwrap_or_else(|_| ts.unix_timestamp().to_string())
}

/// Parse an RFC 3339 timestamp; `None` when malformed.
pub fn parse_rfc3339(raw: &str) -> Option<OffsetDateTime> {
    OffsetDateTime::parse(raw, &Rfc3339).ok()
}

/// RFC 3339 for a commit time in seconds since the epoch.
pub fn format_unix_seconds(secs: i64) -> String {
    OffsetDateTime::from_unix_timestamp(secs)
        .map(format_rfc3339)
        .unwrap_or_else(|_| secs.to_string())
}

/// Timestamp stamp used in branch names: `YYYY-MM-DD-HH-MM-SS`.
pub fn branch_stamp(ts: OffsetDateTime) -> String {
    format!(
        "{:04}-{:02}-{:02}-{:02}-{:02}-{:02}",
        ts.year(),
        u8::from(ts.month()),
        ts.day(),
        ts.hour(),
        ts.minute(),
        ts.second()
    )
}

pub fn now_branch_stamp() -> String {
    branch_stamp(OffsetDateTime::now_utc())
}

/// True when `raw` lies more than `age` in the past. Malformed stamps are
/// never considered old.
pub fn is_older_than(raw: &str, age: std::time::Duration) -> bool {
    parse_rfc3339(raw).is_some_and(|ts| OffsetDateTime::now_utc() - ts > age)
}
