use crate::error::{AppError, Result};
use crate::policy::{
    CONTENT_EXTENSIONS, ExclusionPolicy, TREE_EXTENSIONS, has_accepted_extension,
};
use std::cmp::Ordering;
use std::io;
use std::path::{Component, Path, PathBuf};
use walkdir::{DirEntry, WalkDir};

/// An included file, identified by its name and its `/`-separated path
/// relative to the walk root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileRef {
    pub name: String,
    pub path: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct DirectoryNode {
    pub name: String,
    pub directories: Vec<DirectoryNode>,
    pub files: Vec<FileRef>,
}

impl DirectoryNode {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            directories: Vec::new(),
            files: Vec::new(),
        }
    }

    /// Every file reference in this subtree, depth-first.
    pub fn file_refs(&self) -> Vec<&FileRef> {
        let mut refs: Vec<&FileRef> = Vec::new();
        for dir in &self.directories {
            refs.extend(dir.file_refs());
        }
        refs.extend(self.files.iter());
        refs
    }

    pub fn contains_path(&self, path: &str) -> bool {
        self.files.iter().any(|f| f.path == path)
            || self.directories.iter().any(|d| d.contains_path(path))
    }

    fn child_dir_mut(&mut self, name: &str) -> &mut DirectoryNode {
        let index = match self.directories.iter().position(|d| d.name == name) {
            Some(index) => index,
            None => {
                self.directories.push(DirectoryNode::new(name));
                self.directories.len() - 1
            }
        };
        &mut self.directories[index]
    }
}

/// Result of a pruned walk: the preview tree and the files whose contents get packaged.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProjectWalk {
    pub root_path: PathBuf,
    pub root: DirectoryNode,
    pub files: Vec<FileRef>,
}

enum WalkedEntry {
    Directory,
    File(FileRef),
}

pub fn walk_project(root: &Path) -> Result<ProjectWalk> {
    walk_project_with(root, ExclusionPolicy::builtin())
}

/// Walks `root` depth-first, never descending into directories the policy excludes.
///
/// Within a directory, subdirectories are visited before files and each group
/// is ordered by file name, so `src/main.py` is discovered before a root-level
/// `README.md`. Unreadable entries are logged and skipped.
pub fn walk_project_with(root: &Path, policy: &ExclusionPolicy) -> Result<ProjectWalk> {
    let root_path = root.canonicalize().map_err(|e| AppError::FilesystemAccess {
        path: root.to_path_buf(),
        source: e,
    })?;
    if !root_path.is_dir() {
        return Err(AppError::FilesystemAccess {
            path: root_path,
            source: io::Error::new(io::ErrorKind::InvalidInput, "not a directory"),
        });
    }

    let root_name = root_path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "project".to_string());
    let mut root_node = DirectoryNode::new(root_name.clone());
    let mut content_files = Vec::<FileRef>::new();

    if policy.should_exclude(&root_name, "") {
        log::warn!(
            "Project root '{}' is excluded by the built-in policy; nothing to package.",
            root_path.display()
        );
        return Ok(ProjectWalk {
            root_path,
            root: root_node,
            files: content_files,
        });
    }

    log::info!("Walking project directory: {}", root_path.display());
    let walker = WalkDir::new(&root_path)
        .follow_links(false)
        .sort_by(directories_first)
        .into_iter()
        .filter_entry(|entry| keep_entry(entry, &root_path, policy));

    for entry_result in walker {
        let entry = match entry_result {
            Ok(entry) => entry,
            Err(e) => {
                log::warn!("Skipping unreadable entry: {}", AppError::from(e));
                continue;
            }
        };
        if entry.depth() == 0 {
            continue;
        }
        let Some(components) = relative_components(entry.path(), &root_path) else {
            log::warn!("Could not get relative path for: {}", entry.path().display());
            continue;
        };

        let walked = if entry.file_type().is_dir() {
            WalkedEntry::Directory
        } else {
            let file_ref = FileRef {
                name: components.last().cloned().unwrap_or_default(),
                path: components.join("/"),
            };
            if has_accepted_extension(&file_ref.name, CONTENT_EXTENSIONS) {
                log::trace!("Including content: {}", file_ref.path);
                content_files.push(file_ref.clone());
            } else {
                log::trace!("Preview only: {}", file_ref.path);
            }
            WalkedEntry::File(file_ref)
        };
        insert_entry(&mut root_node, &components, walked);
    }

    log::info!(
        "Directory walk complete. {} files selected for packaging.",
        content_files.len()
    );
    Ok(ProjectWalk {
        root_path,
        root: root_node,
        files: content_files,
    })
}

fn directories_first(a: &DirEntry, b: &DirEntry) -> Ordering {
    let a_is_dir = a.file_type().is_dir();
    let b_is_dir = b.file_type().is_dir();
    b_is_dir
        .cmp(&a_is_dir)
        .then_with(|| a.file_name().cmp(b.file_name()))
}

// Decides before descent: a rejected directory is never read.
fn keep_entry(entry: &DirEntry, root: &Path, policy: &ExclusionPolicy) -> bool {
    if entry.depth() == 0 {
        return true;
    }
    let file_type = entry.file_type();
    if file_type.is_symlink() {
        log::trace!("Skipping symlink: {}", entry.path().display());
        return false;
    }
    let name = entry.file_name().to_string_lossy();
    let Some(components) = relative_components(entry.path(), root) else {
        return false;
    };

    if file_type.is_dir() {
        let context = components.join("/");
        if policy.should_exclude(&name, &context) {
            log::debug!("Pruning directory: {}", context);
            return false;
        }
        true
    } else {
        let parent_context = components[..components.len().saturating_sub(1)].join("/");
        !policy.should_exclude(&name, &parent_context)
            && has_accepted_extension(&name, TREE_EXTENSIONS)
    }
}

fn relative_components(path: &Path, root: &Path) -> Option<Vec<String>> {
    let relative = pathdiff::diff_paths(path, root)?;
    let components: Vec<String> = relative
        .components()
        .filter_map(|c| match c {
            Component::Normal(name) => Some(name.to_string_lossy().into_owned()),
            _ => None,
        })
        .collect();
    if components.is_empty() {
        None
    } else {
        Some(components)
    }
}

fn insert_entry(node: &mut DirectoryNode, components: &[String], walked: WalkedEntry) {
    match components {
        [] => {}
        [last] => match walked {
            WalkedEntry::Directory => {
                node.child_dir_mut(last);
            }
            WalkedEntry::File(file_ref) => node.files.push(file_ref),
        },
        [first, rest @ ..] => insert_entry(node.child_dir_mut(first), rest, walked),
    }
}
