//! Async facade over a [`Session`].
//!
//! Package decoding and re-serialization run on the blocking pool; the
//! session itself is only locked for the short install/snapshot steps.
//! While an export is pending the session reports
//! [`LifecycleState::Exporting`] and refuses new loads.

use crate::error::{SessionError, SessionResult};
use crate::export::ExportRequest;
use crate::session::{ExportJob, LoadSource, Session, SessionConfig};
use report_model::{AnnotationSet, ExportArtifact, LifecycleState, ReportDocument};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use uuid::Uuid;

#[derive(Debug, Clone, Default)]
pub struct ContextualizerService {
    session: Arc<Mutex<Session>>,
}

impl ContextualizerService {
    pub fn new(config: SessionConfig) -> Self {
        Self { session: Arc::new(Mutex::new(Session::new(config))) }
    }

    pub fn guid(&self) -> Uuid {
        self.lock().guid()
    }

    pub fn state(&self) -> LifecycleState {
        self.lock().state()
    }

    pub fn document(&self) -> Option<ReportDocument> {
        self.lock().document().cloned()
    }

    /// Loads a package, rejecting the call while another load or an export
    /// is pending.
    pub async fn load_document(&self, source: LoadSource) -> SessionResult<ReportDocument> {
        self.lock().begin_load()?;
        let mut pending = PendingLoad { session: &self.session, armed: true };

        let outcome = tokio::task::spawn_blocking(move || Session::prepare(source)).await;

        pending.armed = false;
        let mut session = self.lock();
        session.end_load();

        let prepared = outcome.map_err(|err| SessionError::TaskFailed(err.to_string()))??;
        session.install(prepared).cloned()
    }

    pub fn is_loading(&self) -> bool {
        self.lock().is_loading()
    }

    pub fn unload(&self) -> SessionResult<()> {
        self.lock().unload()
    }

    pub fn set_annotation(&self, visual_id: impl Into<String>, text: impl Into<String>) {
        self.lock().set_annotation(visual_id, text);
    }

    pub fn annotation(&self, visual_id: &str) -> Option<String> {
        self.lock().annotation(visual_id).map(str::to_owned)
    }

    pub fn clear_annotation(&self, visual_id: &str) -> Option<String> {
        self.lock().clear_annotation(visual_id)
    }

    pub fn annotations(&self) -> AnnotationSet {
        self.lock().annotations().clone()
    }

    /// Snapshots the export metadata and marks the session as exporting.
    /// The package is serialized when the returned handle is finished.
    pub fn start_export(&self, request: ExportRequest) -> SessionResult<PendingExport> {
        let job = self.lock().begin_export(request)?;
        Ok(PendingExport { session: Arc::clone(&self.session), job: Some(job) })
    }

    pub async fn export_document(&self, request: ExportRequest) -> SessionResult<ExportArtifact> {
        self.start_export(request)?.finish().await
    }

    fn lock(&self) -> MutexGuard<'_, Session> {
        lock_session(&self.session)
    }
}

fn lock_session(session: &Mutex<Session>) -> MutexGuard<'_, Session> {
    session.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Clears the pending-load mark if a load future is dropped mid-flight.
struct PendingLoad<'a> {
    session: &'a Mutex<Session>,
    armed: bool,
}

impl Drop for PendingLoad<'_> {
    fn drop(&mut self) {
        if self.armed {
            lock_session(self.session).end_load();
        }
    }
}

/// An export whose metadata is fixed but whose package is not written yet.
///
/// Dropping it unfinished hands the container back to the session untouched.
#[derive(Debug)]
pub struct PendingExport {
    session: Arc<Mutex<Session>>,
    job: Option<ExportJob>,
}

impl PendingExport {
    pub fn metadata(&self) -> Option<&report_model::ExportMetadata> {
        self.job.as_ref().map(ExportJob::metadata)
    }

    pub async fn finish(mut self) -> SessionResult<ExportArtifact> {
        let job = self.job.take().ok_or(SessionError::NoOpenContainer)?;
        let session = Arc::clone(&self.session);

        // The blocking task returns the container itself, so the session is
        // restored even if this future is dropped before the task completes.
        let outcome = tokio::task::spawn_blocking(move || {
            let (container, result) = job.run();
            lock_session(&session).finish_export(container);
            result
        })
        .await;

        match outcome {
            Ok(result) => result,
            Err(err) => {
                lock_session(&self.session).abort_export();
                Err(SessionError::TaskFailed(err.to_string()))
            }
        }
    }
}

impl Drop for PendingExport {
    fn drop(&mut self) {
        if let Some(job) = self.job.take() {
            lock_session(&self.session).finish_export(job.into_container());
        }
    }
}
