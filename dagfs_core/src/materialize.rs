//! Recreate a stored file or directory tree on the filesystem.

use crate::error::{Error, Result};
use crate::hash::Hash;
use crate::link::LinkKind;
use crate::object::Object;
use crate::resolver::Resolver;
use crate::store::ContentStore;
use std::fs;
use std::io::BufWriter;
use std::path::{Path, PathBuf};
use tracing::debug;

impl<S: ContentStore + ?Sized> Resolver<'_, S> {
    /// Write the file or directory rooted at `root` to `dest`.
    ///
    /// `dest` must not exist. Directories are created with their entries in
    /// link order; nothing is written for objects after the first error.
    pub fn materialize(&self, root: &Hash, dest: &Path) -> Result<()> {
        if fs::symlink_metadata(dest).is_ok() {
            return Err(Error::path_exists(dest));
        }

        let object = self.fetch(root)?;
        if !object.is_directory() {
            write_parent(dest)?;
            return self.write_file(object, None, dest);
        }

        let mut files = 0usize;
        let mut pending: Vec<(Object, PathBuf)> = vec![(object, dest.to_path_buf())];

        while let Some((dir, path)) = pending.pop() {
            fs::create_dir_all(&path)?;

            for link in dir.links() {
                // Decoding already rejected names with '/', '.' and '..'.
                let name = link.name_str();
                let child = self.fetch(&link.hash)?;
                let child_path = path.join(name);
                match link.kind {
                    LinkKind::FileEntry if child.is_file_tree() => {
                        self.write_file(child, Some(link.size), &child_path)?;
                        files += 1;
                    }
                    LinkKind::DirEntry if child.is_directory() => pending.push((child, child_path)),
                    kind => {
                        return Err(Error::decode(format!(
                            "{} entry {:?} points at a {} object",
                            kind.as_str(),
                            name,
                            child.object_type().as_str()
                        )));
                    }
                }
            }
        }

        debug!(%root, dest = %dest.display(), files, "materialized tree");
        Ok(())
    }

    fn write_file(&self, object: Object, size: Option<u64>, dest: &Path) -> Result<()> {
        let file = fs::File::create(dest)?;
        self.write_file_tree(object, size, BufWriter::new(file))?;
        Ok(())
    }
}

fn write_parent(dest: &Path) -> Result<()> {
    if let Some(parent) = dest.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }
    Ok(())
}
