use std::path::PathBuf;
use thiserror::Error;

pub type Result<T, E = AppError> = std::result::Result<T, E>;

#[derive(Error, Debug)]
#[non_exhaustive]
pub enum AppError {
    #[error("Failed to fetch repository: HTTP {status}")]
    Fetch { status: u16 },

    #[error("HTTP Error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Archive Format Error: {0}")]
    ArchiveFormat(String),

    #[error("Decode Error: '{path}' {reason}")]
    Decode { path: String, reason: String },

    #[error("Filesystem Access Error: Path '{path}', Error: {source}")]
    FilesystemAccess {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Configuration Error: {0}")]
    Config(String),

    #[error("TOML Parsing Error: {0}")]
    TomlParse(String),

    #[error("XML Serialization Error: {0}")]
    XmlSerialize(String),

    #[error("XML Parsing Error: {0}")]
    XmlParse(String),

    #[error("Invalid Argument: {0}")]
    InvalidArgument(String),

    #[error("Filesystem Error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<zip::result::ZipError> for AppError {
    fn from(err: zip::result::ZipError) -> Self {
        AppError::ArchiveFormat(err.to_string())
    }
}

impl From<walkdir::Error> for AppError {
    fn from(err: walkdir::Error) -> Self {
        let path = err.path().map(PathBuf::from).unwrap_or_default();
        let source = err
            .into_io_error()
            .unwrap_or_else(|| std::io::Error::other("filesystem loop detected"));
        AppError::FilesystemAccess { path, source }
    }
}

impl From<quick_xml::Error> for AppError {
    fn from(err: quick_xml::Error) -> Self {
        AppError::XmlParse(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fetch_error_reports_status_code() {
        let err = AppError::Fetch { status: 404 };
        assert_eq!(err.to_string(), "Failed to fetch repository: HTTP 404");
    }

    #[test]
    fn zip_errors_become_archive_format_errors() {
        let err = AppError::from(zip::result::ZipError::InvalidArchive("no end header".into()));
        assert!(matches!(err, AppError::ArchiveFormat(_)));
    }

    #[test]
    fn filesystem_error_names_the_path() {
        let err = AppError::FilesystemAccess {
            path: PathBuf::from("locked.py"),
            source: std::io::Error::from(std::io::ErrorKind::PermissionDenied),
        };
        assert!(err.to_string().contains("'locked.py'"));
    }
}
