use pbix_engine::PbixError;

#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error(transparent)]
    Engine(#[from] PbixError),
    #[error("no report package is loaded")]
    NoOpenContainer,
    #[error("not a report package (expected a .pbix file): {file_name}")]
    UnsupportedFileType { file_name: String },
    #[error("an export is in progress")]
    ExportInProgress,
    #[error("another report package is being loaded")]
    LoadInProgress,
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("invalid contexts document: {0}")]
    ContextsJson(#[source] serde_json::Error),
    #[error("background task failed: {0}")]
    TaskFailed(String),
}

pub type SessionResult<T> = Result<T, SessionError>;
