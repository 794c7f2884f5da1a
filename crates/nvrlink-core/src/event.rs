// ── Signal and alarm domain types ──

use std::error::Error as StdError;
use std::fmt;

use nvrlink_api::EventRecord;
use nvrlink_api::record::NO_INDEX;
use strum::{AsRefStr, Display, EnumString};

/// What the NVR reported happening to an event.
#[derive(Debug, Clone, PartialEq, Eq, Hash, EnumString)]
pub enum AlarmAction {
    Start,
    Stop,
    /// Instantaneous events without a start/stop pair.
    Pulse,
    /// Anything else, verbatim.
    #[strum(default)]
    Unknown(String),
}

impl fmt::Display for AlarmAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Start => f.write_str("Start"),
            Self::Stop => f.write_str("Stop"),
            Self::Pulse => f.write_str("Pulse"),
            Self::Unknown(raw) => f.write_str(raw),
        }
    }
}

/// One alarm record, stamped with the host it came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AlarmEvent {
    pub event_type: String,
    pub action: AlarmAction,
    /// Camera/channel index; [`NO_INDEX`] when the record carried none.
    pub index: i64,
    pub host: String,
}

impl AlarmEvent {
    /// `None` for the parser's sentinel (no record in the chunk).
    pub fn from_record(record: EventRecord, host: &str) -> Option<Self> {
        if record.is_sentinel() {
            return None;
        }
        Some(Self {
            action: record
                .action
                .parse()
                .unwrap_or_else(|_| AlarmAction::Unknown(record.action.clone())),
            event_type: record.event_type,
            index: record.index,
            host: host.to_string(),
        })
    }

    /// The channel index, if the record carried a usable one.
    pub fn channel(&self) -> Option<u32> {
        if self.index == NO_INDEX {
            return None;
        }
        u32::try_from(self.index).ok()
    }
}

impl fmt::Display for AlarmEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {} on {} (index {})",
            self.event_type, self.action, self.host, self.index
        )
    }
}

/// Payload of an error signal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ErrorReport {
    pub summary: String,
    pub details: String,
}

impl ErrorReport {
    pub fn new(summary: impl Into<String>, details: impl Into<String>) -> Self {
        Self {
            summary: summary.into(),
            details: details.into(),
        }
    }

    /// `details` is the error and its source chain joined with `: `.
    ///
    /// A cause whose message the chain already ends with is skipped, so
    /// wrappers that print their source are not repeated.
    pub fn from_error(summary: impl Into<String>, err: &(dyn StdError + 'static)) -> Self {
        let mut details = err.to_string();
        let mut source = err.source();
        while let Some(cause) = source {
            let message = cause.to_string();
            if !details.ends_with(&message) {
                details.push_str(": ");
                details.push_str(&message);
            }
            source = cause.source();
        }
        Self::new(summary, details)
    }
}

impl fmt::Display for ErrorReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.summary, self.details)
    }
}

// ── Signals ──────────────────────────────────────────────────────────

/// Named signal categories a subscriber can filter on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, AsRefStr)]
#[strum(serialize_all = "lowercase")]
pub enum SignalKind {
    Alarm,
    Error,
    Debug,
    Reconnecting,
}

/// Everything a connection manager publishes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Signal {
    Alarm(AlarmEvent),
    Error(ErrorReport),
    /// Informational and developer-facing diagnostics; filter by your own level.
    Debug(String),
    /// Human-readable notice naming the target and the delay.
    Reconnecting(String),
}

impl Signal {
    pub fn kind(&self) -> SignalKind {
        match self {
            Self::Alarm(_) => SignalKind::Alarm,
            Self::Error(_) => SignalKind::Error,
            Self::Debug(_) => SignalKind::Debug,
            Self::Reconnecting(_) => SignalKind::Reconnecting,
        }
    }

    pub fn as_alarm(&self) -> Option<&AlarmEvent> {
        match self {
            Self::Alarm(alarm) => Some(alarm),
            _ => None,
        }
    }
}
