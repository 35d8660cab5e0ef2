//! Report package engine: opens `.pbix` containers, decodes their layout
//! into a [`ReportDocument`](report_model::ReportDocument) and writes the
//! container back out with extra entries.

pub mod container;
pub mod encoding;
pub mod layout;
#[cfg(any(test, feature = "test-support"))]
pub mod testing;

pub use container::Container;
pub use encoding::{decode_text, encode_utf16le, TextEncoding};
pub use layout::{decode_layout, read_layout, LAYOUT_ENTRY_PATH};

use zip::result::ZipError;

#[derive(Debug, thiserror::Error)]
pub enum PbixError {
    #[error("not a valid report package: {0}")]
    InvalidArchive(#[source] ZipError),
    #[error("entry not found in package: {path}")]
    EntryNotFound { path: String },
    #[error("report package has no Report/Layout entry")]
    MissingLayoutEntry,
    #[error("report layout is not valid JSON: {0}")]
    MalformedLayout(#[source] serde_json::Error),
    #[error("failed to write package: {0}")]
    Write(#[source] ZipError),
}
