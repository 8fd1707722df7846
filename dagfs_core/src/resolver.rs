//! Path resolver: walks a DAG from a root digest to a file's content.

use crate::error::{Error, Result};
use crate::hash::{Hash, Hasher};
use crate::link::{Link, LinkKind};
use crate::object::Object;
use crate::store::ContentStore;
use std::io::Write;
use tracing::{debug, trace};

/// Reads objects out of a content store and reassembles files by path.
pub struct Resolver<'a, S: ContentStore + ?Sized> {
    store: &'a S,
    verifier: Option<&'a dyn Hasher>,
}

/// The object a path names, with the size its entry link declared.
pub(crate) struct Located {
    pub(crate) object: Object,
    pub(crate) size: Option<u64>,
}

impl<'a, S: ContentStore + ?Sized> Resolver<'a, S> {
    /// Resolver that trusts the store's bytes.
    pub fn new(store: &'a S) -> Self {
        Self {
            store,
            verifier: None,
        }
    }

    /// Recompute the digest of every fetched object and fail with
    /// [`Error::DigestMismatch`] when it disagrees with the requested one.
    pub fn with_verification(mut self, hasher: &'a dyn Hasher) -> Self {
        self.verifier = Some(hasher);
        self
    }

    /// Fetch and decode one object.
    pub fn fetch(&self, hash: &Hash) -> Result<Object> {
        let bytes = self.store.get(hash)?;

        if let Some(hasher) = self.verifier {
            let actual = hasher.digest(&bytes);
            if actual != *hash {
                return Err(Error::digest_mismatch(hash.to_hex(), actual.to_hex()));
            }
        }

        trace!(%hash, len = bytes.len(), "fetched object");
        Object::decode(&bytes)
    }

    /// Return the full content of the file at `path` under `root`.
    ///
    /// Empty segments are ignored, so `"a//b/"` equals `"a/b"`. An empty
    /// path names the root itself, which must then be a file.
    pub fn resolve(&self, root: &Hash, path: &str) -> Result<Vec<u8>> {
        let mut content = Vec::new();
        self.resolve_to_writer(root, path, &mut content)?;
        Ok(content)
    }

    /// Stream the content of the file at `path` to `writer`, returning the
    /// number of bytes written.
    pub fn resolve_to_writer<W: Write>(&self, root: &Hash, path: &str, writer: W) -> Result<u64> {
        let located = self.locate(root, path)?;
        if located.object.is_directory() {
            return Err(Error::invalid_path(path, "names a directory"));
        }

        let written = self.write_file_tree(located.object, located.size, writer)?;
        debug!(%root, path, bytes = written, "resolved file");
        Ok(written)
    }

    /// Return the content of the file whose chunk tree is rooted at `hash`.
    pub fn read_file(&self, hash: &Hash) -> Result<Vec<u8>> {
        let object = self.fetch(hash)?;
        if !object.is_file_tree() {
            return Err(Error::decode(format!("{} is not a file", hash)));
        }

        let mut content = Vec::new();
        self.write_file_tree(object, None, &mut content)?;
        Ok(content)
    }

    /// Return the entry links of the directory at `path`.
    pub fn list(&self, root: &Hash, path: &str) -> Result<Vec<Link>> {
        match self.locate(root, path)?.object {
            Object::Node(links) if links.first().is_none_or(|l| l.kind.is_entry()) => Ok(links),
            _ => Err(Error::invalid_path(path, "names a file")),
        }
    }

    /// Walk the directory links named by `path`.
    pub(crate) fn locate(&self, root: &Hash, path: &str) -> Result<Located> {
        let mut current = self.fetch(root)?;
        let mut size = None;

        for segment in path.split('/').filter(|s| !s.is_empty()) {
            // Leaves and chunk nodes have no named children.
            if !current.is_directory() {
                return Err(Error::path_not_found(path, segment));
            }

            let link = current
                .links()
                .iter()
                .find(|l| l.name.as_deref() == Some(segment))
                .ok_or_else(|| Error::path_not_found(path, segment))?;

            let (hash, kind, link_size) = (link.hash, link.kind, link.size);
            let child = self.fetch(&hash)?;
            match kind {
                LinkKind::FileEntry if !child.is_file_tree() => {
                    return Err(Error::decode(format!(
                        "file entry {:?} points at a directory ({})",
                        segment, hash
                    )));
                }
                LinkKind::DirEntry if !child.is_directory() => {
                    return Err(Error::decode(format!(
                        "directory entry {:?} points at file content ({})",
                        segment, hash
                    )));
                }
                _ => {}
            }

            current = child;
            size = Some(link_size);
        }

        Ok(Located {
            object: current,
            size,
        })
    }

    /// Concatenate the leaves of a chunk tree depth-first, left to right.
    ///
    /// Every link's declared size is checked against what it points at, and
    /// the total against `expected` when the entry link supplied one.
    pub(crate) fn write_file_tree<W: Write>(
        &self,
        root: Object,
        expected: Option<u64>,
        mut writer: W,
    ) -> Result<u64> {
        let mut written = 0u64;
        let mut pending: Vec<Link> = match root {
            Object::Leaf(data) => {
                writer.write_all(&data)?;
                written = data.len() as u64;
                Vec::new()
            }
            Object::Node(links) => {
                check_chunk_links(&links)?;
                links.into_iter().rev().collect()
            }
        };

        while let Some(link) = pending.pop() {
            match (link.kind, self.fetch(&link.hash)?) {
                (LinkKind::LeafData, Object::Leaf(data)) => {
                    if data.len() as u64 != link.size {
                        return Err(Error::decode(format!(
                            "leaf {} holds {} bytes, link says {}",
                            link.hash,
                            data.len(),
                            link.size
                        )));
                    }
                    writer.write_all(&data)?;
                    written += link.size;
                }
                (LinkKind::Subtree, Object::Node(links)) => {
                    check_chunk_links(&links)?;
                    let total = sum_sizes(&links)?;
                    if links.is_empty() || total != link.size {
                        return Err(Error::decode(format!(
                            "subtree {} covers {} bytes, link says {}",
                            link.hash, total, link.size
                        )));
                    }
                    pending.extend(links.into_iter().rev());
                }
                (kind, object) => {
                    return Err(Error::decode(format!(
                        "{} link {} points at a {} object",
                        kind.as_str(),
                        link.hash,
                        object.object_type().as_str()
                    )));
                }
            }
        }

        if let Some(expected) = expected {
            if written != expected {
                return Err(Error::decode(format!(
                    "file content is {} bytes, entry says {}",
                    written, expected
                )));
            }
        }

        writer.flush()?;
        Ok(written)
    }
}

fn check_chunk_links(links: &[Link]) -> Result<()> {
    match links.iter().find(|l| !l.kind.is_chunk()) {
        Some(link) => Err(Error::decode(format!(
            "entry link {:?} inside a file's chunk tree",
            link.name_str()
        ))),
        None => Ok(()),
    }
}

fn sum_sizes(links: &[Link]) -> Result<u64> {
    links
        .iter()
        .try_fold(0u64, |acc, l| acc.checked_add(l.size))
        .ok_or_else(|| Error::decode("link sizes overflow"))
}
