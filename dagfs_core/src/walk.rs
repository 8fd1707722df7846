//! Filesystem ingestion: turn a path into a [`Node`] tree.

use crate::error::{Error, Result};
use crate::source::{DirNode, FileNode, Node};
use std::fs;
use std::path::Path;
use tracing::debug;

impl Node {
    /// Read a file or directory tree from the filesystem.
    ///
    /// Directory entries are ordered by file name. Hidden files are kept;
    /// `.gitignore` matches are skipped. Symlinks fail with
    /// [`Error::UnsupportedSource`].
    pub fn from_path(path: &Path) -> Result<Node> {
        let metadata = fs::symlink_metadata(path)?;

        if metadata.is_file() {
            return Ok(Node::File(FileNode::from_path(path)?));
        }
        if !metadata.is_dir() {
            return Err(Error::UnsupportedSource {
                path: path.to_path_buf(),
            });
        }

        let walker = ignore::WalkBuilder::new(path)
            .hidden(false) // Include hidden files
            .git_ignore(true) // Respect .gitignore
            .require_git(false)
            .follow_links(false)
            .sort_by_file_name(|a, b| a.cmp(b))
            .build();

        // Open directories from the root down to the entry being visited.
        let mut open: Vec<DirNode> = Vec::new();
        let mut files = 0usize;

        for entry in walker {
            let entry = entry?;
            let depth = entry.depth();

            // The walk is depth-first, so leaving a subtree means closing
            // every directory deeper than the new entry's parent.
            while open.len() > depth {
                close_dir(&mut open);
            }

            let file_type = entry.file_type().ok_or_else(|| Error::UnsupportedSource {
                path: entry.path().to_path_buf(),
            })?;

            if depth == 0 || file_type.is_dir() {
                open.push(DirNode::new(entry_name(entry.path())?));
            } else if file_type.is_file() {
                let file = FileNode::from_path(entry.path())?;
                if let Some(parent) = open.last_mut() {
                    parent.push(file);
                }
                files += 1;
            } else {
                // Symlinks and special files are not supported
                return Err(Error::UnsupportedSource {
                    path: entry.path().to_path_buf(),
                });
            }
        }

        while open.len() > 1 {
            close_dir(&mut open);
        }

        let root = open.pop().ok_or_else(|| Error::UnsupportedSource {
            path: path.to_path_buf(),
        })?;

        debug!(path = %path.display(), files, size = root.size(), "read directory tree");
        Ok(Node::Dir(root))
    }
}

/// Pop the innermost open directory into its parent.
fn close_dir(open: &mut Vec<DirNode>) {
    if let Some(dir) = open.pop() {
        match open.last_mut() {
            Some(parent) => parent.push(dir),
            None => open.push(dir),
        }
    }
}

fn entry_name(path: &Path) -> Result<String> {
    match path.file_name() {
        None => Ok(String::new()),
        Some(name) => name.to_str().map(str::to_string).ok_or_else(|| {
            Error::invalid_link(format!("Invalid filename: {}", path.display()))
        }),
    }
}
