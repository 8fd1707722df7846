//! # dagfs core
//!
//! A content-addressed Merkle DAG for files and directories.
//!
//! Files are cut into fixed-size chunks and folded into a bounded fan-out
//! hash tree; directories become ordered lists of named links. Every object
//! is addressed by the digest of its canonical encoding, so identical
//! content deduplicates at chunk granularity and any root digest verifies
//! everything beneath it.
//!
//! ## Features
//!
//! - Chunk trees of 256 KiB leaves with up to 4096 links per node
//! - Directory trees with named file and subdirectory entries
//! - Path resolution from a root digest back to file bytes
//! - Pluggable hashing (BLAKE3, SHA-256) and storage (memory, filesystem)
//!
//! ## Example
//!
//! ```no_run
//! use dagfs_core::{Algorithm, FsStore, Node};
//! use std::path::Path;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! // Initialize a new store
//! let store = FsStore::init("./my-store", Algorithm::Blake3)?;
//!
//! // Encode a directory tree
//! let node = Node::from_path(Path::new("./my-data"))?;
//! let root = dagfs_core::add_root(&node, &store, &Algorithm::Blake3)?;
//!
//! // Read one file back by path
//! let bytes = dagfs_core::resolve(&store, &root, "docs/readme.txt")?;
//! println!("{} bytes", bytes.len());
//! # Ok(())
//! # }
//! ```

mod builder;
mod error;
mod fs_store;
mod hash;
mod link;
mod materialize;
mod object;
mod resolver;
mod source;
mod store;
mod walk;

pub use builder::{BuildStats, BuilderConfig, CHUNK_SIZE, DagBuilder, FAN_OUT};
pub use error::{Error, Result};
pub use fs_store::FsStore;
pub use hash::{Algorithm, HASH_SIZE, Hash, Hasher};
pub use link::{Link, LinkKind, MAX_NAME_LEN, validate_name};
pub use object::{Object, ObjectHeader, ObjectType};
pub use resolver::Resolver;
pub use source::{DirNode, FileNode, Node};
pub use store::{ContentStore, MemoryStore};

/// Encode a file or directory into `store` with the default chunking and
/// return its root digest.
pub fn add_root<S, H>(node: &Node, store: &S, hasher: &H) -> Result<Hash>
where
    S: ContentStore + ?Sized,
    H: Hasher + ?Sized,
{
    DagBuilder::new(store, hasher).add_root(node)
}

/// Return the content of the file at `path` below `root`.
pub fn resolve<S: ContentStore + ?Sized>(store: &S, root: &Hash, path: &str) -> Result<Vec<u8>> {
    Resolver::new(store).resolve(root, path)
}
