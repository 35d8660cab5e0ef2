//! Session state: the open package, its decoded document and the contexts
//! the user has saved for it.
//!
//! A session owns at most one container. Loading parses a complete new
//! container/document pair before anything in the session changes, so a
//! failed load leaves the previous document and its contexts in place.

use crate::error::{SessionError, SessionResult};
use crate::export::{created_date_today, read_embedded_contexts, write_export, ExportRequest};
use pbix_engine::{read_layout, Container};
use report_model::{
    AnnotationSet, ExportArtifact, ExportMetadata, LifecycleState, Preferences, ReportDocument,
    DEFAULT_EXPORT_FILE_NAME, DEFAULT_USER_NAME,
};
use std::fs;
use std::path::PathBuf;
use uuid::Uuid;

const PACKAGE_EXTENSION: &str = ".pbix";

pub const DEFAULT_USER: &str = DEFAULT_USER_NAME;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionConfig {
    /// Author written into exports when the request does not name one.
    pub default_user: String,
    /// File name offered for the exported package.
    pub output_file_name: String,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            default_user: DEFAULT_USER.to_owned(),
            output_file_name: DEFAULT_EXPORT_FILE_NAME.to_owned(),
        }
    }
}

impl From<&Preferences> for SessionConfig {
    fn from(prefs: &Preferences) -> Self {
        Self {
            default_user: prefs.user_name.clone(),
            output_file_name: prefs.output_file_name.clone(),
        }
    }
}

#[derive(Debug, Clone)]
pub enum LoadSource {
    Path(PathBuf),
    Bytes { file_name: String, bytes: Vec<u8> },
}

impl LoadSource {
    pub fn file_name(&self) -> String {
        match self {
            Self::Path(path) => path
                .file_name()
                .map(|name| name.to_string_lossy().into_owned())
                .unwrap_or_else(|| path.display().to_string()),
            Self::Bytes { file_name, .. } => file_name.clone(),
        }
    }
}

impl From<PathBuf> for LoadSource {
    fn from(value: PathBuf) -> Self {
        Self::Path(value)
    }
}

impl From<&std::path::Path> for LoadSource {
    fn from(value: &std::path::Path) -> Self {
        Self::Path(value.to_path_buf())
    }
}

/// A fully decoded package that has not been installed in a session yet.
#[derive(Debug)]
pub struct PreparedReport {
    container: Container,
    document: ReportDocument,
}

impl PreparedReport {
    pub fn document(&self) -> &ReportDocument {
        &self.document
    }

    /// Contexts written into the package by an earlier export.
    pub fn embedded_contexts(&mut self) -> SessionResult<Option<ExportMetadata>> {
        read_embedded_contexts(&mut self.container)
    }
}

/// Work item for serializing an export off the session. Holds the container
/// while the session sits in [`LifecycleState::Exporting`].
#[derive(Debug)]
pub struct ExportJob {
    container: Container,
    metadata: ExportMetadata,
    file_name: String,
}

impl ExportJob {
    pub fn metadata(&self) -> &ExportMetadata {
        &self.metadata
    }

    pub fn into_container(self) -> Container {
        self.container
    }

    /// Returns the container alongside the outcome so the session can take it back.
    pub fn run(mut self) -> (Container, SessionResult<ExportArtifact>) {
        let result = write_export(&mut self.container, &self.metadata, &self.file_name);
        (self.container, result)
    }
}

#[derive(Debug)]
enum Lifecycle {
    Unloaded,
    Loaded { container: Container, document: ReportDocument },
    Exporting { document: ReportDocument },
}

#[derive(Debug)]
pub struct Session {
    guid: Uuid,
    config: SessionConfig,
    lifecycle: Lifecycle,
    contexts: AnnotationSet,
    load_pending: bool,
}

impl Default for Session {
    fn default() -> Self {
        Self::new(SessionConfig::default())
    }
}

impl Session {
    pub fn new(config: SessionConfig) -> Self {
        Self {
            guid: Uuid::new_v4(),
            config,
            lifecycle: Lifecycle::Unloaded,
            contexts: AnnotationSet::new(),
            load_pending: false,
        }
    }

    pub fn guid(&self) -> Uuid {
        self.guid
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub fn state(&self) -> LifecycleState {
        match self.lifecycle {
            Lifecycle::Unloaded => LifecycleState::Unloaded,
            Lifecycle::Loaded { .. } => LifecycleState::Loaded,
            Lifecycle::Exporting { .. } => LifecycleState::Exporting,
        }
    }

    pub fn document(&self) -> Option<&ReportDocument> {
        match &self.lifecycle {
            Lifecycle::Unloaded => None,
            Lifecycle::Loaded { document, .. } | Lifecycle::Exporting { document } => Some(document),
        }
    }

    /// Reads and decodes a package without touching any session.
    pub fn prepare(source: LoadSource) -> SessionResult<PreparedReport> {
        let file_name = source.file_name();
        if !file_name.to_ascii_lowercase().ends_with(PACKAGE_EXTENSION) {
            return Err(SessionError::UnsupportedFileType { file_name });
        }

        let bytes = match source {
            LoadSource::Path(path) => fs::read(path)?,
            LoadSource::Bytes { bytes, .. } => bytes,
        };

        let mut container = Container::open(bytes)?;
        let document = read_layout(&mut container, &file_name)?;

        Ok(PreparedReport { container, document })
    }

    /// Swaps in a prepared package and clears all saved contexts.
    pub fn install(&mut self, prepared: PreparedReport) -> SessionResult<&ReportDocument> {
        if matches!(self.lifecycle, Lifecycle::Exporting { .. }) {
            return Err(SessionError::ExportInProgress);
        }

        let PreparedReport { container, document } = prepared;
        tracing::info!(
            file_name = %document.file_name,
            pages = document.pages.len(),
            visuals = document.visual_count(),
            "loaded report package"
        );

        self.contexts.reset();
        self.lifecycle = Lifecycle::Loaded { container, document };

        self.document().ok_or(SessionError::NoOpenContainer)
    }

    pub fn load_document(&mut self, source: LoadSource) -> SessionResult<&ReportDocument> {
        if matches!(self.lifecycle, Lifecycle::Exporting { .. }) {
            return Err(SessionError::ExportInProgress);
        }

        let prepared = Self::prepare(source)?;
        self.install(prepared)
    }

    /// Marks a load as in flight while its package is prepared elsewhere.
    /// Only one load may be pending, and none while an export is pending.
    pub fn begin_load(&mut self) -> SessionResult<()> {
        if matches!(self.lifecycle, Lifecycle::Exporting { .. }) {
            return Err(SessionError::ExportInProgress);
        }
        if self.load_pending {
            return Err(SessionError::LoadInProgress);
        }

        self.load_pending = true;
        Ok(())
    }

    pub fn end_load(&mut self) {
        self.load_pending = false;
    }

    pub fn is_loading(&self) -> bool {
        self.load_pending
    }

    /// Drops the loaded package and every saved context.
    pub fn unload(&mut self) -> SessionResult<()> {
        if matches!(self.lifecycle, Lifecycle::Exporting { .. }) {
            return Err(SessionError::ExportInProgress);
        }

        self.lifecycle = Lifecycle::Unloaded;
        self.contexts.reset();
        Ok(())
    }

    pub fn set_annotation(&mut self, visual_id: impl Into<String>, text: impl Into<String>) {
        let visual_id = visual_id.into();

        if self.document().is_some_and(|document| document.visual(&visual_id).is_none()) {
            tracing::warn!(visual_id = %visual_id, "saving context for a visual not in the document");
        }

        self.contexts.set_context(visual_id, text);
    }

    pub fn annotation(&self, visual_id: &str) -> Option<&str> {
        self.contexts.context(visual_id)
    }

    pub fn clear_annotation(&mut self, visual_id: &str) -> Option<String> {
        self.contexts.clear_context(visual_id)
    }

    pub fn annotations(&self) -> &AnnotationSet {
        &self.contexts
    }

    /// Snapshots the metadata and moves the container into an [`ExportJob`].
    /// The session stays in [`LifecycleState::Exporting`] until
    /// [`Session::finish_export`] or [`Session::abort_export`].
    pub fn begin_export(&mut self, request: ExportRequest) -> SessionResult<ExportJob> {
        let (container, document) = match std::mem::replace(&mut self.lifecycle, Lifecycle::Unloaded) {
            Lifecycle::Loaded { container, document } => (container, document),
            Lifecycle::Unloaded => return Err(SessionError::NoOpenContainer),
            exporting @ Lifecycle::Exporting { .. } => {
                self.lifecycle = exporting;
                return Err(SessionError::ExportInProgress);
            }
        };

        let metadata = ExportMetadata {
            guid: self.guid,
            created_date: created_date_today(),
            name: request.name.unwrap_or_else(|| document.default_export_name()),
            user: request.user.unwrap_or_else(|| self.config.default_user.clone()),
            contexts: self.contexts.clone(),
        };

        tracing::debug!(name = %metadata.name, contexts = metadata.contexts.len(), "export started");

        self.lifecycle = Lifecycle::Exporting { document };

        Ok(ExportJob { container, metadata, file_name: self.config.output_file_name.clone() })
    }

    /// Hands the container back after an export job ran.
    pub fn finish_export(&mut self, container: Container) {
        match std::mem::replace(&mut self.lifecycle, Lifecycle::Unloaded) {
            Lifecycle::Exporting { document } => {
                self.lifecycle = Lifecycle::Loaded { container, document };
            }
            other => {
                tracing::warn!("export finished without a pending export");
                self.lifecycle = other;
            }
        }
    }

    /// Discards the document when an export job lost its container.
    pub fn abort_export(&mut self) {
        if matches!(self.lifecycle, Lifecycle::Exporting { .. }) {
            tracing::warn!("export aborted, discarding loaded package");
            self.lifecycle = Lifecycle::Unloaded;
            self.contexts.reset();
        }
    }

    pub fn export_document(&mut self, request: ExportRequest) -> SessionResult<ExportArtifact> {
        let job = self.begin_export(request)?;
        let (container, result) = job.run();
        self.finish_export(container);
        result
    }
}
