use thiserror::Error;

/// Failure classes of a sync run.
#[derive(Debug, Error)]
pub enum SyncError {
    /// Missing setting or unusable mapping policy. Aborts the run.
    #[error("configuration error: {0}")]
    Config(String),

    /// The linked work item could not be fetched.
    #[error("work item {id} could not be loaded: {reason}")]
    LinkResolution { id: u64, reason: String },

    /// A create/update call was rejected by the remote side.
    #[error("{target} update rejected: {reason}")]
    RemoteMutation { target: &'static str, reason: String },

    /// The link comment does not carry a usable work item id.
    #[error("malformed work item link '{0}'")]
    MalformedLink(String),

    /// Any other failure talking to a remote service.
    #[error(transparent)]
    Remote(#[from] anyhow::Error),
}

impl SyncError {
    pub fn is_config(&self) -> bool {
        matches!(self, SyncError::Config(_))
    }
}

/// Error returned by a work item store call.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("work item {0} not found")]
    NotFound(u64),
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

pub type SyncResult<T> = Result<T, SyncError>;
