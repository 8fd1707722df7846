//! Links between DAG objects.

use crate::error::{Error, Result};
use crate::hash::{HASH_SIZE, Hash};
use std::io::Read;

/// Maximum length of an entry name in bytes.
pub const MAX_NAME_LEN: usize = 255;

/// What a link points at.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkKind {
    /// A raw chunk of file content (a leaf object).
    LeafData = 1,
    /// An internal node of the same file's chunk tree.
    Subtree = 2,
    /// A named file inside a directory.
    FileEntry = 3,
    /// A named subdirectory inside a directory.
    DirEntry = 4,
}

impl LinkKind {
    /// Convert to byte representation.
    pub fn to_u8(self) -> u8 {
        self as u8
    }

    /// Parse from byte representation.
    pub fn from_u8(value: u8) -> Result<Self> {
        match value {
            1 => Ok(LinkKind::LeafData),
            2 => Ok(LinkKind::Subtree),
            3 => Ok(LinkKind::FileEntry),
            4 => Ok(LinkKind::DirEntry),
            _ => Err(Error::decode(format!("Invalid link kind: {}", value))),
        }
    }

    /// Links that make up a file's chunk tree.
    pub fn is_chunk(self) -> bool {
        matches!(self, LinkKind::LeafData | LinkKind::Subtree)
    }

    /// Named links of a directory.
    pub fn is_entry(self) -> bool {
        matches!(self, LinkKind::FileEntry | LinkKind::DirEntry)
    }

    /// Get the string name of this link kind.
    pub fn as_str(&self) -> &'static str {
        match self {
            LinkKind::LeafData => "leaf",
            LinkKind::Subtree => "subtree",
            LinkKind::FileEntry => "file",
            LinkKind::DirEntry => "dir",
        }
    }
}

/// A reference from one object to another.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Link {
    /// Entry name; present exactly on `FileEntry` and `DirEntry` links.
    pub name: Option<String>,
    /// Digest of the target object.
    pub hash: Hash,
    /// Content bytes reachable through this link.
    pub size: u64,
    /// Kind of target.
    pub kind: LinkKind,
}

impl Link {
    /// Create a link, checking that the name matches the kind.
    pub fn new(kind: LinkKind, name: Option<String>, hash: Hash, size: u64) -> Result<Self> {
        match (&name, kind.is_entry()) {
            (Some(name), true) => validate_name(name)?,
            (None, false) => {}
            (Some(name), false) => {
                return Err(Error::invalid_link(format!(
                    "{} link cannot carry a name ({:?})",
                    kind.as_str(),
                    name
                )));
            }
            (None, true) => {
                return Err(Error::invalid_link(format!(
                    "{} link requires a name",
                    kind.as_str()
                )));
            }
        }

        Ok(Self {
            name,
            hash,
            size,
            kind,
        })
    }

    /// Link to a leaf chunk.
    pub fn leaf(hash: Hash, size: u64) -> Self {
        Self {
            name: None,
            hash,
            size,
            kind: LinkKind::LeafData,
        }
    }

    /// Link to an internal chunk-tree node.
    pub fn subtree(hash: Hash, size: u64) -> Self {
        Self {
            name: None,
            hash,
            size,
            kind: LinkKind::Subtree,
        }
    }

    /// Named file entry.
    pub fn file(name: impl Into<String>, hash: Hash, size: u64) -> Result<Self> {
        Self::new(LinkKind::FileEntry, Some(name.into()), hash, size)
    }

    /// Named directory entry.
    pub fn dir(name: impl Into<String>, hash: Hash, size: u64) -> Result<Self> {
        Self::new(LinkKind::DirEntry, Some(name.into()), hash, size)
    }

    /// Entry name, or the empty string for chunk links.
    pub fn name_str(&self) -> &str {
        self.name.as_deref().unwrap_or("")
    }

    /// Encode the link to bytes.
    ///
    /// Format:
    /// - 1 byte: kind
    /// - 8 bytes: size (u64 LE)
    /// - 32 bytes: hash
    /// - 2 bytes: name_len (u16 LE), 0 for unnamed links
    /// - N bytes: name (UTF-8)
    pub fn encode_into(&self, buf: &mut Vec<u8>) {
        buf.push(self.kind.to_u8());
        buf.extend_from_slice(&self.size.to_le_bytes());
        buf.extend_from_slice(self.hash.as_bytes());

        let name = self.name_str().as_bytes();
        buf.extend_from_slice(&(name.len() as u16).to_le_bytes());
        buf.extend_from_slice(name);
    }

    /// Decode a link from a reader.
    pub fn decode<R: Read>(reader: &mut R) -> Result<Self> {
        let [kind] = read_array::<_, 1>(reader, "kind")?;
        let kind = LinkKind::from_u8(kind)?;

        let size = u64::from_le_bytes(read_array(reader, "size")?);
        let hash = Hash::from_bytes(read_array::<_, HASH_SIZE>(reader, "hash")?);

        let name_len = u16::from_le_bytes(read_array(reader, "name length")?) as usize;
        let name = if name_len == 0 {
            None
        } else {
            let mut name_buf = vec![0u8; name_len];
            reader
                .read_exact(&mut name_buf)
                .map_err(|_| Error::decode("Truncated link entry: name"))?;
            let name = String::from_utf8(name_buf)
                .map_err(|e| Error::decode(format!("Invalid UTF-8 in link name: {}", e)))?;
            Some(name)
        };

        Self::new(kind, name, hash, size).map_err(|e| Error::decode(e.to_string()))
    }
}

/// Check that a string is usable as a directory entry name.
pub fn validate_name(name: &str) -> Result<()> {
    if name.is_empty() {
        return Err(Error::invalid_link("Name cannot be empty"));
    }

    if name.len() > MAX_NAME_LEN {
        return Err(Error::invalid_link(format!(
            "Name too long: {} bytes (max {})",
            name.len(),
            MAX_NAME_LEN
        )));
    }

    if name == "." || name == ".." {
        return Err(Error::invalid_link(format!("Name cannot be {:?}", name)));
    }

    if name.contains('\0') {
        return Err(Error::invalid_link("Name cannot contain null bytes"));
    }

    if name.contains('/') {
        return Err(Error::invalid_link(format!(
            "Name cannot contain '/': {:?}",
            name
        )));
    }

    Ok(())
}

fn read_array<R: Read, const N: usize>(reader: &mut R, field: &str) -> Result<[u8; N]> {
    let mut buf = [0u8; N];
    reader
        .read_exact(&mut buf)
        .map_err(|_| Error::decode(format!("Truncated link entry: {}", field)))?;
    Ok(buf)
}
