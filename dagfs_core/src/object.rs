//! Canonical binary encoding of DAG objects.
//!
//! Every object is a 16-byte header followed by the body:
//!
//! ```text
//! 0x00  4   "MDAG" magic
//! 0x04  1   version (u8) = 1
//! 0x05  1   type: 1=leaf, 2=node
//! 0x06  2   reserved (must be 0)
//! 0x08  8   body_len (u64 LE)
//! 0x10  ... body
//! ```
//!
//! A leaf body is the raw chunk payload. A node body is the concatenation of
//! its encoded [`Link`]s, in order. The digest of an object is the hash of
//! exactly these bytes.

use crate::error::{Error, Result};
use crate::hash::{Hash, Hasher};
use crate::link::Link;

/// Magic bytes at the start of every object.
pub const MAGIC: &[u8; 4] = b"MDAG";

/// Current object format version.
pub const VERSION: u8 = 1;

/// Size of the object header in bytes.
pub const HEADER_SIZE: usize = 16;

/// Object types.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ObjectType {
    /// Raw chunk payload.
    Leaf = 1,
    /// Ordered links (chunk-tree node or directory).
    Node = 2,
}

impl ObjectType {
    /// Convert to byte representation.
    pub fn to_u8(self) -> u8 {
        self as u8
    }

    /// Parse from byte representation.
    pub fn from_u8(value: u8) -> Result<Self> {
        match value {
            1 => Ok(ObjectType::Leaf),
            2 => Ok(ObjectType::Node),
            _ => Err(Error::decode(format!("Invalid object type: {}", value))),
        }
    }

    /// Get the string name of this object type.
    pub fn as_str(&self) -> &'static str {
        match self {
            ObjectType::Leaf => "leaf",
            ObjectType::Node => "node",
        }
    }
}

/// A 16-byte object header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectHeader {
    /// Object format version.
    pub version: u8,
    /// Leaf or node.
    pub object_type: ObjectType,
    /// Length of the body in bytes.
    pub body_len: u64,
}

impl ObjectHeader {
    /// Create a new object header.
    pub fn new(object_type: ObjectType, body_len: u64) -> Self {
        Self {
            version: VERSION,
            object_type,
            body_len,
        }
    }

    /// Encode the header to a 16-byte array.
    pub fn encode(&self) -> [u8; HEADER_SIZE] {
        let mut buf = [0u8; HEADER_SIZE];
        buf[0..4].copy_from_slice(MAGIC);
        buf[4] = self.version;
        buf[5] = self.object_type.to_u8();
        // buf[6..8] reserved
        buf[8..16].copy_from_slice(&self.body_len.to_le_bytes());
        buf
    }

    /// Decode a header from the start of a buffer.
    pub fn decode(buf: &[u8]) -> Result<Self> {
        if buf.len() < HEADER_SIZE {
            return Err(Error::decode(format!(
                "Header too short: {} bytes (expected {})",
                buf.len(),
                HEADER_SIZE
            )));
        }

        if &buf[0..4] != MAGIC {
            return Err(Error::decode(format!(
                "Invalid magic: expected {:?}, got {:?}",
                MAGIC,
                &buf[0..4]
            )));
        }

        let version = buf[4];
        if version != VERSION {
            return Err(Error::decode(format!(
                "Unsupported version: {} (expected {})",
                version, VERSION
            )));
        }

        let object_type = ObjectType::from_u8(buf[5])?;

        if buf[6] != 0 || buf[7] != 0 {
            return Err(Error::decode(format!(
                "Reserved bytes must be 0, got {:?}",
                &buf[6..8]
            )));
        }

        let mut len_bytes = [0u8; 8];
        len_bytes.copy_from_slice(&buf[8..16]);
        let body_len = u64::from_le_bytes(len_bytes);

        Ok(Self {
            version,
            object_type,
            body_len,
        })
    }
}

/// A node of the Merkle DAG.
///
/// Exactly one of: a leaf carrying a chunk of file bytes, or an internal
/// node carrying ordered links. A 0-byte file is an empty leaf; an empty
/// directory is a node with no links.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Object {
    /// Raw file bytes.
    Leaf(Vec<u8>),
    /// Chunk-tree node or directory.
    Node(Vec<Link>),
}

impl Object {
    /// Leaf or node.
    pub fn object_type(&self) -> ObjectType {
        match self {
            Object::Leaf(_) => ObjectType::Leaf,
            Object::Node(_) => ObjectType::Node,
        }
    }

    /// Links of a node; empty for leaves.
    pub fn links(&self) -> &[Link] {
        match self {
            Object::Leaf(_) => &[],
            Object::Node(links) => links,
        }
    }

    /// Payload of a leaf.
    pub fn payload(&self) -> Option<&[u8]> {
        match self {
            Object::Leaf(data) => Some(data),
            Object::Node(_) => None,
        }
    }

    /// True if this object is the root of a file's content: a leaf, or a
    /// node whose links are chunk links.
    pub fn is_file_tree(&self) -> bool {
        match self {
            Object::Leaf(_) => true,
            Object::Node(links) => links.first().is_some_and(|l| l.kind.is_chunk()),
        }
    }

    /// True if this object is a directory (a node of entry links, possibly empty).
    pub fn is_directory(&self) -> bool {
        match self {
            Object::Leaf(_) => false,
            Object::Node(links) => links.first().is_none_or(|l| l.kind.is_entry()),
        }
    }

    /// Encode to canonical bytes.
    pub fn encode(&self) -> Vec<u8> {
        let mut buf = vec![0u8; HEADER_SIZE];
        match self {
            Object::Leaf(data) => buf.extend_from_slice(data),
            Object::Node(links) => {
                for link in links {
                    link.encode_into(&mut buf);
                }
            }
        }

        let body_len = (buf.len() - HEADER_SIZE) as u64;
        let header = ObjectHeader::new(self.object_type(), body_len);
        buf[..HEADER_SIZE].copy_from_slice(&header.encode());
        buf
    }

    /// Encode and compute the digest of the encoded bytes.
    pub fn encode_and_hash<H: Hasher + ?Sized>(&self, hasher: &H) -> (Hash, Vec<u8>) {
        let bytes = self.encode();
        (hasher.digest(&bytes), bytes)
    }

    /// Decode from canonical bytes.
    pub fn decode(bytes: &[u8]) -> Result<Self> {
        let header = ObjectHeader::decode(bytes)?;
        let body = &bytes[HEADER_SIZE..];

        if body.len() as u64 != header.body_len {
            return Err(Error::decode(format!(
                "Body length mismatch: header says {}, got {}",
                header.body_len,
                body.len()
            )));
        }

        match header.object_type {
            ObjectType::Leaf => Ok(Object::Leaf(body.to_vec())),
            ObjectType::Node => decode_links(body).map(Object::Node),
        }
    }
}

fn decode_links(body: &[u8]) -> Result<Vec<Link>> {
    let mut reader = std::io::Cursor::new(body);
    let mut links = Vec::new();

    while reader.position() < body.len() as u64 {
        links.push(Link::decode(&mut reader)?);
    }

    if let Some(first) = links.first() {
        let chunk = first.kind.is_chunk();
        if links.iter().any(|l| l.kind.is_chunk() != chunk) {
            return Err(Error::decode("Node mixes chunk links and entry links"));
        }
    }

    Ok(links)
}
