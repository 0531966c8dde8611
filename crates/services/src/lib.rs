//! Host-side persistence and configuration: the key-value store backing it
//! all, login session lifecycle, the ingestion freshness log, and per-site
//! suggestion buttons.

pub mod ingest_log;
pub mod session;
pub mod store;
pub mod suggestions;

pub use ingest_log::{IngestionLog, SourceKind};
pub use session::{SessionRecord, SessionService};
pub use store::{FileStore, KvStore, MemoryStore};
pub use suggestions::{SuggestionButton, SuggestionConfig};
