//! Report Contextualizer Core
//!
//! Session model for loading a report package, collecting per-visual
//! contexts and exporting the package with the contexts embedded.

pub mod error;
pub mod export;
pub mod service;
pub mod session;

pub use error::{SessionError, SessionResult};
pub use export::{read_embedded_contexts, write_export, ExportRequest, CONTEXTS_ENTRY_PATH};
pub use service::{ContextualizerService, PendingExport};
pub use session::{
    ExportJob, LoadSource, PreparedReport, Session, SessionConfig, DEFAULT_USER,
};
