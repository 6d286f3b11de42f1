//! Offline synchronization engine
//!
//! Clients queue task mutations while offline and replay them here. One
//! sync exchange ingests the client's batch and collects the server-side
//! delta past the client's watermark, inside a single transaction.

mod collect;
mod coordinator;
mod ingest;
mod types;

pub use collect::ChangeCollector;
pub use coordinator::SyncCoordinator;
pub use ingest::ChangeIngestor;
pub use types::{
    ClientChange, MissingTargetPolicy, ServerChange, SyncRequest, SyncResponse, TargetRef,
};
