// ── Event record parsing ──
//
// The event stream is a loose multipart text format:
//
//   --myboundary
//   Content-Type: text/plain
//   Content-Length: 39
//
//   Code=VideoMotion;action=Start;index=0
//
// Only lines containing `;` are candidate records. Within a buffer the last
// candidate wins; earlier ones are overwritten, not queued.

use tracing::{debug, trace};

use crate::error::RecordError;

/// Index value used when a record carries none (or failed to parse).
pub const NO_INDEX: i64 = -999;

const RECORD_DELIMITER: char = ';';

/// Raw fields of one alarm record.
///
/// The sentinel (empty event type and action, index [`NO_INDEX`]) means
/// "no record in this buffer".
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventRecord {
    pub event_type: String,
    pub action: String,
    pub index: i64,
}

impl EventRecord {
    pub fn sentinel() -> Self {
        Self {
            event_type: String::new(),
            action: String::new(),
            index: NO_INDEX,
        }
    }

    pub fn is_sentinel(&self) -> bool {
        self.event_type.is_empty() && self.action.is_empty()
    }
}

impl Default for EventRecord {
    fn default() -> Self {
        Self::sentinel()
    }
}

/// Extract the record from one streamed buffer, never failing.
///
/// Malformed input (including binary garbage) is logged at debug and
/// yields the sentinel.
pub fn parse_chunk(buf: &[u8]) -> EventRecord {
    try_parse_chunk(buf).unwrap_or_else(|e| {
        debug!(error = %e, "discarding malformed event record");
        EventRecord::sentinel()
    })
}

/// Extract the record from one streamed buffer.
///
/// Returns the sentinel when the buffer has no candidate lines and an
/// error when the last candidate line is malformed.
pub fn try_parse_chunk(buf: &[u8]) -> Result<EventRecord, RecordError> {
    let text = String::from_utf8_lossy(buf);
    trace!(bytes = buf.len(), "parsing event chunk");

    let mut record = EventRecord::sentinel();
    for line in text.lines().filter(|l| l.contains(RECORD_DELIMITER)) {
        record = parse_line(line)?;
    }
    Ok(record)
}

/// Parse `Code=<type>;action=<action>;index=<n>[;data=...]` by key.
fn parse_line(line: &str) -> Result<EventRecord, RecordError> {
    let mut event_type = None;
    let mut action = None;
    let mut index = None;

    for field in line.split(RECORD_DELIMITER) {
        let Some((key, value)) = field.split_once('=') else {
            continue;
        };
        let value = value.trim();
        match key.trim() {
            "Code" if event_type.is_none() => event_type = Some(value),
            "action" if action.is_none() => action = Some(value),
            "index" if index.is_none() => index = Some(value),
            // `data=` carries a JSON-ish trailer that may itself contain
            // `=`; everything after it belongs to the trailer.
            "data" => break,
            _ => {}
        }
    }

    let missing = |key| RecordError::MissingField {
        key,
        line: line.to_string(),
    };
    let event_type = event_type.filter(|v| !v.is_empty()).ok_or_else(|| missing("Code"))?;
    let action = action.filter(|v| !v.is_empty()).ok_or_else(|| missing("action"))?;
    let index = match index {
        Some(raw) => raw.parse::<i64>().map_err(|_| RecordError::InvalidIndex {
            value: raw.to_string(),
        })?,
        None => NO_INDEX,
    };

    Ok(EventRecord {
        event_type: event_type.to_string(),
        action: action.to_string(),
        index,
    })
}
