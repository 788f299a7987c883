//! Error taxonomy shared by every joint backend.

use thiserror::Error;

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, JointError>;

/// Errors produced by joints, the chain builder and the caches.
///
/// Backend client errors (`Io`, `Ftp`, `Ssh`, `Http`, `Url`) are surfaced
/// verbatim; the remaining variants are sentinel conditions of the joint
/// contract itself.
#[derive(Debug, Error)]
pub enum JointError {
    /// The requested path does not exist on the backend.
    #[error("file or directory not found")]
    NotFound,

    /// `open` was called while the joint already has an open inner file.
    #[error("joint already has an open file")]
    AlreadyOpen,

    /// No inner file is open for the requested operation.
    #[error("no file is open on this joint")]
    NotOpen,

    /// The current inner file is not a directory.
    #[error("not a directory")]
    NotDirectory,

    /// A seek or positional read resolved to a negative offset.
    #[error("negative seek position")]
    NegativeSeek,

    /// A bounded `read_dir` request found no remaining entries.
    #[error("end of directory listing")]
    EndOfList,

    /// The supplied slash-separated path is not in canonical form.
    #[error("invalid path")]
    InvalidPath,

    /// No WebDAV collection answered at any candidate root under the
    /// given authority.
    #[error("no WebDAV root found under {0}")]
    DavRootNotFound(String),

    /// The opened byte range is not a readable ISO-9660 image.
    #[error("not an ISO-9660 image: {0}")]
    BadImage(String),

    #[error("invalid URL: {0}")]
    Url(#[from] url::ParseError),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("FTP error: {0}")]
    Ftp(#[from] suppaftp::FtpError),

    #[error("SSH error: {0}")]
    Ssh(#[from] ssh2::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Protocol-level failure that has no dedicated client error type,
    /// e.g. an unexpected WebDAV status line.
    #[error("{0}")]
    Protocol(String),

    /// Several teardown steps failed; all sub-errors are retained.
    #[error("{}", fmt_error_list(.0))]
    Closes(Vec<JointError>),
}

impl JointError {
    /// Whether this error means "the path is absent" rather than "the
    /// backend is broken". The joint caches use this to decide between
    /// returning a joint to the pool and discarding it.
    pub fn is_not_found(&self) -> bool {
        match self {
            JointError::NotFound | JointError::DavRootNotFound(_) => true,
            JointError::Io(e) => e.kind() == std::io::ErrorKind::NotFound,
            JointError::Ftp(suppaftp::FtpError::UnexpectedResponse(r)) => {
                r.status == suppaftp::Status::FileUnavailable
            }
            JointError::Ssh(e) => {
                // libssh2 SFTP status 2 (no such file) and 10 (no such path).
                matches!(e.code(), ssh2::ErrorCode::SFTP(2) | ssh2::ErrorCode::SFTP(10))
            }
            JointError::Http(e) => e.status() == Some(reqwest::StatusCode::NOT_FOUND),
            _ => false,
        }
    }
}

fn fmt_error_list(errs: &[JointError]) -> String {
    let parts: Vec<String> = errs.iter().map(|e| e.to_string()).collect();
    parts.join("; ")
}

/// Collapse the outcome of several teardown steps into one result,
/// keeping every failure.
pub(crate) fn join_errors(errs: Vec<JointError>) -> Result<()> {
    let mut errs = errs;
    match errs.len() {
        0 => Ok(()),
        1 => Err(errs.remove(0)),
        _ => Err(JointError::Closes(errs)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_join_errors_empty_is_ok() {
        assert!(join_errors(Vec::new()).is_ok());
    }

    #[test]
    fn test_join_errors_single_passes_through() {
        let err = join_errors(vec![JointError::NotFound]).unwrap_err();
        assert!(matches!(err, JointError::NotFound));
    }

    #[test]
    fn test_join_errors_many_aggregates() {
        let err = join_errors(vec![JointError::NotFound, JointError::AlreadyOpen]).unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("not found"), "message was: {}", msg);
        assert!(msg.contains("already has"), "message was: {}", msg);
    }

    #[test]
    fn test_io_not_found_is_classified() {
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "gone");
        assert!(JointError::from(io).is_not_found());
        assert!(!JointError::AlreadyOpen.is_not_found());
    }
}
