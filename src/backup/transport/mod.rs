//! The version-control capability the engine drives.
//!
//! Implementations report failures as a closed [`TransportErrorKind`] so the
//! retry logic never has to inspect library error messages.

pub mod libgit;

use crate::backup::auth::AuthMethod;
use derive_more::Display;
use std::path::Path;
use thiserror::Error;

pub use libgit::Git2Transport;

#[derive(Clone, Copy, Debug, Display, PartialEq, Eq, Hash)]
pub enum TransportErrorKind {
    #[display("repository not found")]
    RepositoryNotFound,
    #[display("access denied or repository not exported")]
    AccessDenied,
    #[display("remote repository is empty")]
    EmptyRepository,
    #[display("local repository unusable")]
    LocalRepository,
    #[display("transport failure")]
    Other,
}

/// What the retry driver does with a failed clone
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CloneDisposition {
    /// Give up on the pair without retrying; the pair still counts as handled
    Abort,
    /// Nothing to back up, not a failure
    Skip,
    Retry,
}

impl TransportErrorKind {
    pub fn clone_disposition(&self) -> CloneDisposition {
        match self {
            TransportErrorKind::RepositoryNotFound => CloneDisposition::Abort,
            TransportErrorKind::AccessDenied | TransportErrorKind::EmptyRepository => {
                CloneDisposition::Skip
            }
            TransportErrorKind::LocalRepository | TransportErrorKind::Other => {
                CloneDisposition::Retry
            }
        }
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{kind}: {message}")]
pub struct TransportError {
    kind: TransportErrorKind,
    message: String,
}

impl TransportError {
    pub fn new<S: Into<String>>(kind: TransportErrorKind, message: S) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn kind(&self) -> TransportErrorKind {
        self.kind
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

pub type TransportResult<T> = std::result::Result<T, TransportError>;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum UpdateOutcome {
    Updated,
    AlreadyUpToDate,
}

/// Clone, update and discard operations on one local repository path
///
/// All paths are absolute.
pub trait GitTransport {
    /// Connects to `url` and lists its refs without downloading anything
    ///
    /// An empty ref list is reported as [`TransportErrorKind::EmptyRepository`].
    fn list_remote(&self, url: &str, auth: &AuthMethod) -> TransportResult<usize>;

    /// Full-history clone of every branch into `path`
    fn clone_repository(
        &self,
        url: &str,
        path: &Path,
        bare: bool,
        auth: &AuthMethod,
    ) -> TransportResult<()>;

    /// Fetches every ref of `origin` into a bare repository
    fn fetch_all(&self, path: &Path, auth: &AuthMethod) -> TransportResult<UpdateOutcome>;

    /// Fetches every branch of `origin` and fast-forwards the checked out branch
    fn pull(&self, path: &Path, auth: &AuthMethod) -> TransportResult<UpdateOutcome>;

    /// Checks that `path` holds a repository without touching the network
    fn open(&self, path: &Path) -> TransportResult<()>;

    /// Removes a broken local copy so the next attempt clones from scratch
    fn discard(&self, path: &Path) -> std::io::Result<()> {
        std::fs::remove_dir_all(path)
    }
}
