//! Error types for the storage backend contract.
//!
//! Every backend reports failures through [`StorageError`]. The first four
//! variants are the declared condition kinds of the contract; callers can
//! branch on [`StorageError::kind`] without knowing which backend served the
//! request.

use std::collections::BTreeMap;
use std::future::Future;

use thiserror::Error;

/// Errors that can occur during storage backend operations.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StorageError {
    /// The named volume, snapshot or policy does not exist.
    #[error("{0}")]
    NotFound(String),

    /// Caller-supplied data is malformed, incomplete or targets a read-only field.
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// An entity with the requested identity already exists.
    #[error("Already exists: {0}")]
    AlreadyExists(String),

    /// The entity is held by someone else (e.g. a lock owned by another host).
    #[error("Conflict: {0}")]
    Conflict(String),

    /// A record returned by a backend failed schema validation.
    #[error("Record does not match schema '{schema}': {fields:?}")]
    SchemaViolation {
        /// Schema the record was validated against
        schema: String,
        /// Violated fields mapped to the reason
        fields: BTreeMap<String, String>,
    },

    /// The backend has no way of performing the operation.
    #[error("Unsupported operation: {0}")]
    Unsupported(String),

    /// Internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Discriminant of a [`StorageError`], used to match and re-annotate errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    NotFound,
    InvalidInput,
    AlreadyExists,
    Conflict,
    SchemaViolation,
    Unsupported,
    Internal,
}

impl StorageError {
    /// Get the kind of this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::NotFound(_) => ErrorKind::NotFound,
            Self::InvalidInput(_) => ErrorKind::InvalidInput,
            Self::AlreadyExists(_) => ErrorKind::AlreadyExists,
            Self::Conflict(_) => ErrorKind::Conflict,
            Self::SchemaViolation { .. } => ErrorKind::SchemaViolation,
            Self::Unsupported(_) => ErrorKind::Unsupported,
            Self::Internal(_) => ErrorKind::Internal,
        }
    }

    /// Build an error of `kind` carrying `message`.
    ///
    /// A schema violation built this way records the message under the
    /// pseudo-field `_record`.
    pub fn with_kind(kind: ErrorKind, message: impl Into<String>) -> Self {
        let message = message.into();
        match kind {
            ErrorKind::NotFound => Self::NotFound(message),
            ErrorKind::InvalidInput => Self::InvalidInput(message),
            ErrorKind::AlreadyExists => Self::AlreadyExists(message),
            ErrorKind::Conflict => Self::Conflict(message),
            ErrorKind::SchemaViolation => Self::SchemaViolation {
                schema: String::new(),
                fields: BTreeMap::from([("_record".to_string(), message)]),
            },
            ErrorKind::Unsupported => Self::Unsupported(message),
            ErrorKind::Internal => Self::Internal(message),
        }
    }

    /// Whether this is a "does not exist" condition.
    pub fn is_not_found(&self) -> bool {
        self.kind() == ErrorKind::NotFound
    }
}

/// Result type alias for storage operations.
pub type Result<T> = std::result::Result<T, StorageError>;

/// The uniform message for a missing volume.
pub fn vol_404(volume_name: &str) -> String {
    format!("No such volume: {}", volume_name)
}

/// The uniform message for a missing export policy.
pub fn policy_404(volume_name: &str, policy_name: &str) -> String {
    format!(
        "No such policy exists for volume '{}': '{}'",
        volume_name, policy_name
    )
}

/// The uniform message for a missing snapshot.
pub fn snapshot_404(volume_name: &str, snapshot_name: &str) -> String {
    format!(
        "No such snapshot exists for volume '{}': '{}'",
        volume_name, snapshot_name
    )
}

/// Re-annotation of a declared error kind with a descriptive message.
///
/// Errors of any other kind pass through untouched.
///
/// ```
/// use unistore_backend::error::{vol_404, Annotate, ErrorKind, StorageError};
///
/// let lookup: Result<(), StorageError> = Err(StorageError::NotFound("vol-7".into()));
/// let err = lookup.annotate(ErrorKind::NotFound, vol_404("/data/vol7")).unwrap_err();
/// assert_eq!(err.to_string(), "No such volume: /data/vol7");
/// ```
pub trait Annotate<T> {
    /// Replace the message of an error of `kind` with `annotation`.
    fn annotate(self, kind: ErrorKind, annotation: impl Into<String>) -> Result<T>;
}

impl<T> Annotate<T> for Result<T> {
    fn annotate(self, kind: ErrorKind, annotation: impl Into<String>) -> Result<T> {
        match self {
            Err(e) if e.kind() == kind => Err(StorageError::with_kind(kind, annotation)),
            other => other,
        }
    }
}

/// Run `scope` and re-annotate a failure of `kind` with `annotation`.
///
/// This is the scoped form of [`Annotate`], for wrapping a block of backend
/// logic that performs several fallible steps.
pub async fn annotate<T, F>(kind: ErrorKind, annotation: impl Into<String>, scope: F) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    scope.await.annotate(kind, annotation)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_annotate_replaces_matching_kind() {
        let res: Result<()> = Err(StorageError::NotFound("key".to_string()));
        let err = res.annotate(ErrorKind::NotFound, vol_404("vol1")).unwrap_err();
        assert_eq!(err, StorageError::NotFound("No such volume: vol1".to_string()));
    }

    #[test]
    fn test_annotate_leaves_other_kinds() {
        let res: Result<()> = Err(StorageError::Internal("boom".to_string()));
        let err = res.annotate(ErrorKind::NotFound, vol_404("vol1")).unwrap_err();
        assert_eq!(err, StorageError::Internal("boom".to_string()));
    }

    #[test]
    fn test_annotate_passes_success() {
        let res: Result<u32> = Ok(7);
        assert_eq!(res.annotate(ErrorKind::NotFound, "unused").unwrap(), 7);
    }

    #[tokio::test]
    async fn test_scoped_annotate() {
        let err = annotate(ErrorKind::AlreadyExists, "Volume vol1 already exists!", async {
            Err::<(), _>(StorageError::AlreadyExists("dup".to_string()))
        })
        .await
        .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::AlreadyExists);
        assert_eq!(err.to_string(), "Already exists: Volume vol1 already exists!");
    }

    #[test]
    fn test_not_found_message_is_bare() {
        let err = StorageError::NotFound(vol_404("/ORA/dbs00/TOTO"));
        assert_eq!(err.to_string(), "No such volume: /ORA/dbs00/TOTO");
        assert!(err.is_not_found());
    }
}
