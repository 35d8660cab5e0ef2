//! Writing contexts back into a report package.
//!
//! The contexts document is stored as pretty-printed UTF-8 JSON under
//! [`CONTEXTS_ENTRY_PATH`]. Everything else in the package is copied
//! through untouched.

use crate::error::{SessionError, SessionResult};
use pbix_engine::{Container, PbixError, TextEncoding};
use report_model::{ExportArtifact, ExportMetadata, EXPORT_MIME_TYPE};

pub const CONTEXTS_ENTRY_PATH: &str = "contextualizer/contexts.json";

const CREATED_DATE_FORMAT: &str = "%Y-%m-%d";

/// Caller-supplied parts of the export metadata. Unset fields fall back to
/// the document name and the configured user.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExportRequest {
    pub name: Option<String>,
    pub user: Option<String>,
}

impl ExportRequest {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn with_user(mut self, user: impl Into<String>) -> Self {
        self.user = Some(user.into());
        self
    }
}

pub fn created_date_today() -> String {
    chrono::Local::now().format(CREATED_DATE_FORMAT).to_string()
}

pub fn write_export(
    container: &mut Container,
    metadata: &ExportMetadata,
    file_name: &str,
) -> SessionResult<ExportArtifact> {
    let json = serde_json::to_vec_pretty(metadata).map_err(SessionError::ContextsJson)?;
    let contexts_size = json.len();

    container.insert_entry(CONTEXTS_ENTRY_PATH, json);
    let bytes = container.to_bytes()?;

    tracing::info!(
        name = %metadata.name,
        contexts = metadata.contexts.len(),
        contexts_size,
        size = bytes.len(),
        "exported report package"
    );

    Ok(ExportArtifact {
        file_name: file_name.to_owned(),
        mime_type: EXPORT_MIME_TYPE.to_owned(),
        bytes,
    })
}

/// Reads a contexts document written by an earlier export, if there is one.
pub fn read_embedded_contexts(container: &mut Container) -> SessionResult<Option<ExportMetadata>> {
    let text = match container.read_text(CONTEXTS_ENTRY_PATH, TextEncoding::Utf8) {
        Ok(text) => text,
        Err(PbixError::EntryNotFound { .. }) => return Ok(None),
        Err(err) => return Err(err.into()),
    };

    serde_json::from_str(&text).map(Some).map_err(SessionError::ContextsJson)
}
