pub mod domain;
pub mod ports;
pub mod rw_lock;
pub mod sync;

pub use domain::{MediaSyncStatus, SessionAuth, SyncOutcome, SyncOutcomeKind, SyncRequired, TokenType};
pub use ports::{
    IntervalPacer, PollPacer, PortError, PortResult, SessionRepository, SyncService,
};
pub use rw_lock::{ReaderWriterGate, RwLock};
pub use sync::{CollectionGate, SyncError, SyncOrchestrator, DEFAULT_MEDIA_SYNC_TIMEOUT};
