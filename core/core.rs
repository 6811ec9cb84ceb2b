pub mod archive;
pub mod config;
pub mod document;
pub mod error;
pub mod fetch;
pub mod policy;
pub mod walker;

pub use archive::{ArchiveEntry, ArchiveReport, extract_archive, render_archive_report};
pub use config::{Config, GeneralConfig, OutputConfig, RemoteConfig, RepositoryConfig};
pub use document::{FileContextInfo, PackagedDocument, build_document, package_project};
pub use error::{AppError, Result};
pub use fetch::{ArchiveFetcher, RepoRef};
pub use policy::{
    ARCHIVE_EXTENSIONS, CONTENT_EXTENSIONS, ExclusionPattern, ExclusionPolicy, TREE_EXTENSIONS,
};
pub use walker::{DirectoryNode, FileRef, ProjectWalk, walk_project, walk_project_with};
