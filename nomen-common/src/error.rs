//! Common error types for NomenAudio

use thiserror::Error;

/// Common result type for NomenAudio operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error type shared across the NomenAudio core.
///
/// The first group of variants is the closed set of caller-visible error
/// codes; [`Error::code`] returns the stable machine string for each. The
/// remaining variants carry infrastructure failures (database, I/O,
/// configuration) that never cross the API boundary unmapped.
#[derive(Error, Debug)]
pub enum Error {
    #[error("File not found: {0}")]
    FileNotFound(String),

    #[error("Invalid WAV file: {0}")]
    InvalidWav(String),

    #[error("File modified externally: {0}")]
    FileChanged(String),

    #[error("File is locked: {0}")]
    FileLocked(String),

    #[error("File is read-only: {0}")]
    FileReadOnly(String),

    #[error("Rename conflict: {0}")]
    RenameConflict(String),

    #[error("Not enough disk space: {0}")]
    DiskFull(String),

    #[error("Write verification failed: {0}")]
    WriteFailed(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Models not ready: {0}")]
    ModelNotReady(String),

    #[error("Analysis failed: {0}")]
    AnalysisFailed(String),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Stable machine-readable code for this error.
    pub fn code(&self) -> &'static str {
        match self {
            Error::FileNotFound(_) => "FILE_NOT_FOUND",
            Error::InvalidWav(_) => "INVALID_WAV",
            Error::FileChanged(_) => "FILE_CHANGED",
            Error::FileLocked(_) => "FILE_LOCKED",
            Error::FileReadOnly(_) => "FILE_READ_ONLY",
            Error::RenameConflict(_) => "RENAME_CONFLICT",
            Error::DiskFull(_) => "DISK_FULL",
            Error::WriteFailed(_) => "WRITE_FAILED",
            Error::Validation(_) => "VALIDATION_ERROR",
            Error::ModelNotReady(_) => "MODEL_NOT_READY",
            Error::AnalysisFailed(_) => "ANALYSIS_FAILED",
            Error::Database(_) => "DATABASE_ERROR",
            Error::Io(_) => "IO_ERROR",
            Error::Config(_) => "CONFIG_ERROR",
            Error::Internal(_) => "INTERNAL_ERROR",
        }
    }

    /// Map an I/O error from a write path into the caller-visible code set.
    ///
    /// `NotFound` and `PermissionDenied` have direct mappings; out-of-space
    /// is detected via the raw OS error (ENOSPC = 28 on Unix, 112 on
    /// Windows). Everything else stays an `Io` carrier.
    pub fn from_write_io(err: std::io::Error, path: &std::path::Path) -> Error {
        let display = path.display().to_string();
        match err.kind() {
            std::io::ErrorKind::NotFound => Error::FileNotFound(display),
            std::io::ErrorKind::PermissionDenied => Error::FileLocked(display),
            _ => match err.raw_os_error() {
                Some(28) | Some(112) => Error::DiskFull(display),
                _ => Error::Io(err),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codes_are_stable() {
        assert_eq!(Error::FileNotFound("x".into()).code(), "FILE_NOT_FOUND");
        assert_eq!(Error::InvalidWav("x".into()).code(), "INVALID_WAV");
        assert_eq!(Error::FileChanged("x".into()).code(), "FILE_CHANGED");
        assert_eq!(Error::RenameConflict("x".into()).code(), "RENAME_CONFLICT");
        assert_eq!(Error::Validation("x".into()).code(), "VALIDATION_ERROR");
        assert_eq!(Error::ModelNotReady("x".into()).code(), "MODEL_NOT_READY");
    }

    #[test]
    fn write_io_mapping() {
        let path = std::path::Path::new("/tmp/a.wav");

        let nf = std::io::Error::new(std::io::ErrorKind::NotFound, "gone");
        assert_eq!(Error::from_write_io(nf, path).code(), "FILE_NOT_FOUND");

        let denied = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "locked");
        assert_eq!(Error::from_write_io(denied, path).code(), "FILE_LOCKED");

        let enospc = std::io::Error::from_raw_os_error(28);
        assert_eq!(Error::from_write_io(enospc, path).code(), "DISK_FULL");
    }
}
