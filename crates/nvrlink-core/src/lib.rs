// nvrlink-core: per-target connection lifecycle and typed event fan-out.

pub mod channel;
pub mod error;
pub mod event;
pub mod manager;
pub mod source;
pub mod target;

// ── Primary re-exports ──────────────────────────────────────────────
pub use channel::{EventChannel, SignalReceiver};
pub use error::CoreError;
pub use event::{AlarmAction, AlarmEvent, ErrorReport, Signal, SignalKind};
pub use manager::{ConnectionManager, ConnectionState, ManagerConfig, ManagerHandle};
pub use source::EventSource;
pub use target::ConnectionTarget;
