// nvrlink-api: wire-level client for NVR event streams (Digest auth, records, sessions)

pub mod digest;
pub mod error;
pub mod record;
pub mod session;
pub mod transport;

pub use digest::{DigestChallenge, DigestCredentials};
pub use error::{Error, RecordError};
pub use record::EventRecord;
pub use session::{AttachRequest, EventSession, EventStream, Handshake, SessionSignal};
pub use transport::{TlsMode, TransportConfig};
