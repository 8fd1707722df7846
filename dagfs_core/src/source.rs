//! Source nodes fed to the tree builder.
//!
//! A [`Node`] is either a file (name, declared size, readable content) or a
//! directory (name and an ordered list of children). Directory order is the
//! order entries were added; the builder never re-sorts it.

use crate::error::Result;
use std::fs;
use std::io::{self, Cursor, Read};
use std::path::{Path, PathBuf};

/// A file or a directory to encode.
#[derive(Debug, Clone)]
pub enum Node {
    /// A file.
    File(FileNode),
    /// A directory.
    Dir(DirNode),
}

impl Node {
    /// Entry name of the node.
    pub fn name(&self) -> &str {
        match self {
            Node::File(file) => file.name(),
            Node::Dir(dir) => dir.name(),
        }
    }

    /// Content size in bytes (for directories, the sum over all files beneath).
    pub fn size(&self) -> u64 {
        match self {
            Node::File(file) => file.size(),
            Node::Dir(dir) => dir.size(),
        }
    }
}

impl From<FileNode> for Node {
    fn from(file: FileNode) -> Self {
        Node::File(file)
    }
}

impl From<DirNode> for Node {
    fn from(dir: DirNode) -> Self {
        Node::Dir(dir)
    }
}

#[derive(Debug, Clone)]
enum FileContent {
    Bytes(Vec<u8>),
    Path(PathBuf),
}

/// A file: a name, a declared size, and content read front to back.
#[derive(Debug, Clone)]
pub struct FileNode {
    name: String,
    size: u64,
    content: FileContent,
}

impl FileNode {
    /// A file held in memory.
    pub fn from_bytes(name: impl Into<String>, data: impl Into<Vec<u8>>) -> Self {
        let data = data.into();
        Self {
            name: name.into(),
            size: data.len() as u64,
            content: FileContent::Bytes(data),
        }
    }

    /// A file on disk. The size is taken from its metadata now; content is
    /// read when the file is encoded.
    pub fn from_path(path: &Path) -> Result<Self> {
        let metadata = fs::metadata(path)?;
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();

        Ok(Self {
            name,
            size: metadata.len(),
            content: FileContent::Path(path.to_path_buf()),
        })
    }

    /// Entry name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Declared size in bytes.
    pub fn size(&self) -> u64 {
        self.size
    }

    /// Open the content for sequential reading.
    pub fn open(&self) -> io::Result<Box<dyn Read + '_>> {
        match &self.content {
            FileContent::Bytes(data) => Ok(Box::new(Cursor::new(data.as_slice()))),
            FileContent::Path(path) => Ok(Box::new(fs::File::open(path)?)),
        }
    }
}

/// A directory: a name and ordered children.
#[derive(Debug, Clone)]
pub struct DirNode {
    name: String,
    entries: Vec<Node>,
}

impl DirNode {
    /// An empty directory.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            entries: Vec::new(),
        }
    }

    /// Append a child, keeping insertion order.
    pub fn push(&mut self, node: impl Into<Node>) {
        self.entries.push(node.into());
    }

    /// Builder-style [`push`](Self::push).
    pub fn with(mut self, node: impl Into<Node>) -> Self {
        self.push(node);
        self
    }

    /// Entry name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Children in iteration order.
    pub fn entries(&self) -> &[Node] {
        &self.entries
    }

    /// Total size of all files beneath this directory.
    pub fn size(&self) -> u64 {
        let mut total = 0;
        let mut stack: Vec<&Node> = self.entries.iter().collect();
        while let Some(node) = stack.pop() {
            match node {
                Node::File(file) => total += file.size(),
                Node::Dir(dir) => stack.extend(dir.entries.iter()),
            }
        }
        total
    }
}
