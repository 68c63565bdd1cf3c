use time::{OffsetDateTime, UtcOffset, format_description::well_known::Rfc3339};

/// Wall clock used for session timestamps, fixed to one UTC offset.
#[derive(Debug, Clone, Copy)]
pub struct Clock {
    offset: UtcOffset,
}

impl Default for Clock {
    fn default() -> Self {
        Self::new(UtcOffset::UTC)
    }
}

impl Clock {
    pub fn new(offset: UtcOffset) -> Self {
        Self { offset }
    }

    /// A configured offset wins over the host's `local` one; UTC is the last
    /// resort.
    pub fn resolve(hours: Option<i8>, local: Option<UtcOffset>) -> Self {
        let configured = hours.and_then(|h| UtcOffset::from_hms(h, 0, 0).ok());
        Self::new(configured.or(local).unwrap_or(UtcOffset::UTC))
    }

    pub fn offset(&self) -> UtcOffset {
        self.offset
    }

    pub fn now(&self) -> OffsetDateTime {
        OffsetDateTime::now_utc().to_offset(self.offset)
    }
}

/// The host's UTC offset. `time` can only determine it while the process is
/// single-threaded, so call this before the async runtime starts.
pub fn local_offset() -> Option<UtcOffset> {
    UtcOffset::current_local_offset().ok()
}

/// Renders a timestamp as RFC 3339, the format stored in the ledger.
pub fn format_timestamp(ts: OffsetDateTime) -> String {
    ts.format(&Rfc3339).unwrap_or_else(|_| ts.unix_timestamp().to_string())
}

pub fn parse_timestamp(raw: &str) -> Option<OffsetDateTime> {
    OffsetDateTime::parse(raw.trim(), &Rfc3339).ok()
}
