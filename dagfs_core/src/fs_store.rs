//! Filesystem-backed content store.
//!
//! Layout:
//!
//! ```text
//! <root>/config                          version + hash algorithm
//! <root>/objects/<algo>/<xx>/<62 hex>    one record per object
//! ```
//!
//! Each record is a 16-byte header followed by the stored bytes:
//!
//! ```text
//! 0x00  4   "DAGS" magic
//! 0x04  1   version (u8) = 1
//! 0x05  1   compression: 0=none, 1=zstd
//! 0x06  2   reserved (must be 0)
//! 0x08  8   stored_len (u64 LE) - compressed size
//! 0x10  ... stored bytes
//! ```
//!
//! Compression is transparent: `get` returns exactly the bytes given to
//! `put`, so digests are never affected by it.

use crate::error::{Error, Result};
use crate::hash::{Algorithm, Hash};
use crate::store::ContentStore;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::{debug, trace};

/// Magic bytes at the start of every record.
pub const RECORD_MAGIC: &[u8; 4] = b"DAGS";

/// Current record format version.
pub const RECORD_VERSION: u8 = 1;

/// Size of the record header in bytes.
pub const RECORD_HEADER_SIZE: usize = 16;

/// Compression threshold: values >= 4KB are compressed.
const COMPRESSION_THRESHOLD: usize = 4096;

/// Compression types.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompressionType {
    /// No compression.
    None = 0,
    /// Zstandard compression.
    Zstd = 1,
}

impl CompressionType {
    /// Convert to byte representation.
    pub fn to_u8(self) -> u8 {
        self as u8
    }

    /// Parse from byte representation.
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0 => Some(CompressionType::None),
            1 => Some(CompressionType::Zstd),
            _ => None,
        }
    }
}

/// A content store rooted at a directory.
#[derive(Debug)]
pub struct FsStore {
    root: PathBuf,
    algorithm: Algorithm,
}

impl FsStore {
    /// Initialize a new store at the given path.
    ///
    /// Creates `objects/<algo>/` and writes the `config` file recording the
    /// hash algorithm every object in this store is addressed by.
    pub fn init<P: AsRef<Path>>(root: P, algorithm: Algorithm) -> Result<Self> {
        let root = root.as_ref().to_path_buf();

        fs::create_dir_all(root.join("objects").join(algorithm.as_str()))?;

        let config_content = format!("version=1\nalgo={}\n", algorithm.as_str());
        fs::write(root.join("config"), config_content)?;

        debug!(root = %root.display(), algo = algorithm.as_str(), "initialized store");

        Ok(Self { root, algorithm })
    }

    /// Open an existing store at the given path.
    pub fn open<P: AsRef<Path>>(root: P) -> Result<Self> {
        let root = root.as_ref().to_path_buf();

        if !root.exists() {
            return Err(Error::invalid_store(&root, "directory does not exist"));
        }

        let config_path = root.join("config");
        if !config_path.exists() {
            return Err(Error::invalid_store(&root, "config file not found"));
        }

        let config_content = fs::read_to_string(&config_path)?;
        let algorithm = Self::parse_config(&config_content)
            .map_err(|e| Error::invalid_store(&root, e.to_string()))?;

        if !root.join("objects").join(algorithm.as_str()).exists() {
            return Err(Error::invalid_store(
                &root,
                "objects directory structure missing",
            ));
        }

        Ok(Self { root, algorithm })
    }

    /// Parse the config file to extract the algorithm.
    fn parse_config(content: &str) -> Result<Algorithm> {
        let mut version = None;
        let mut algo = None;

        for line in content.lines() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }

            if let Some((key, value)) = line.split_once('=') {
                match key.trim() {
                    "version" => version = Some(value.trim()),
                    "algo" => algo = Some(value.trim()),
                    _ => {}
                }
            }
        }

        if version != Some("1") {
            return Err(Error::store(format!(
                "Unsupported config version: {:?}",
                version
            )));
        }

        let algo_str = algo.ok_or_else(|| Error::store("Missing algo in config"))?;
        Algorithm::parse(algo_str)
    }

    /// Get the path to an object file given its hash.
    ///
    /// Returns: `objects/{algorithm}/{prefix}/{suffix}`
    pub fn object_path(&self, hash: &Hash) -> PathBuf {
        self.root
            .join("objects")
            .join(self.algorithm.as_str())
            .join(hash.prefix())
            .join(hash.suffix())
    }

    /// Get the root directory of the store.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Get the algorithm this store's digests are computed with.
    pub fn algorithm(&self) -> Algorithm {
        self.algorithm
    }

    /// Size of an object's record on disk.
    pub fn size_on_disk(&self, hash: &Hash) -> Result<u64> {
        let obj_path = self.object_path(hash);
        if !obj_path.exists() {
            return Err(Error::object_not_found(hash.to_hex()));
        }
        Ok(fs::metadata(&obj_path)?.len())
    }

    /// Write a record atomically using tempfile.
    fn write_record_atomic(&self, obj_path: &Path, header: &[u8], stored: &[u8]) -> Result<()> {
        let parent = obj_path
            .parent()
            .ok_or_else(|| Error::store(format!("No parent for {}", obj_path.display())))?;
        fs::create_dir_all(parent)?;

        let mut temp_file = tempfile::NamedTempFile::new_in(parent)?;
        temp_file.write_all(header)?;
        temp_file.write_all(stored)?;
        temp_file.flush()?;

        // Persist atomically
        temp_file.persist(obj_path)?;

        Ok(())
    }
}

impl ContentStore for FsStore {
    fn put(&self, hash: &Hash, bytes: &[u8]) -> Result<()> {
        let obj_path = self.object_path(hash);
        if obj_path.exists() {
            trace!(%hash, "object already stored");
            return Ok(());
        }

        let (stored, compression) = if bytes.len() >= COMPRESSION_THRESHOLD {
            (compress_zstd(bytes)?, CompressionType::Zstd)
        } else {
            (bytes.to_vec(), CompressionType::None)
        };

        let header = encode_record_header(compression, stored.len() as u64);
        self.write_record_atomic(&obj_path, &header, &stored)?;

        trace!(%hash, size = bytes.len(), stored = stored.len(), "wrote object");
        Ok(())
    }

    fn get(&self, hash: &Hash) -> Result<Vec<u8>> {
        let obj_path = self.object_path(hash);
        if !obj_path.exists() {
            return Err(Error::object_not_found(hash.to_hex()));
        }

        let record = fs::read(&obj_path)?;
        let (compression, stored_len) = decode_record_header(&record)
            .map_err(|reason| Error::corrupted_object(&obj_path, reason))?;

        let stored = &record[RECORD_HEADER_SIZE..];
        if stored.len() as u64 != stored_len {
            return Err(Error::corrupted_object(
                &obj_path,
                format!(
                    "Payload length mismatch: expected {}, got {}",
                    stored_len,
                    stored.len()
                ),
            ));
        }

        match compression {
            CompressionType::None => Ok(stored.to_vec()),
            CompressionType::Zstd => decompress_zstd(stored)
                .map_err(|e| Error::corrupted_object(&obj_path, e.to_string())),
        }
    }

    fn contains(&self, hash: &Hash) -> Result<bool> {
        Ok(self.object_path(hash).exists())
    }
}

fn encode_record_header(compression: CompressionType, stored_len: u64) -> [u8; RECORD_HEADER_SIZE] {
    let mut buf = [0u8; RECORD_HEADER_SIZE];
    buf[0..4].copy_from_slice(RECORD_MAGIC);
    buf[4] = RECORD_VERSION;
    buf[5] = compression.to_u8();
    buf[8..16].copy_from_slice(&stored_len.to_le_bytes());
    buf
}

fn decode_record_header(buf: &[u8]) -> std::result::Result<(CompressionType, u64), String> {
    if buf.len() < RECORD_HEADER_SIZE {
        return Err(format!(
            "Header too short: {} bytes (expected {})",
            buf.len(),
            RECORD_HEADER_SIZE
        ));
    }

    if &buf[0..4] != RECORD_MAGIC {
        return Err(format!("Invalid magic: {:?}", &buf[0..4]));
    }

    if buf[4] != RECORD_VERSION {
        return Err(format!("Unsupported record version: {}", buf[4]));
    }

    let compression = CompressionType::from_u8(buf[5])
        .ok_or_else(|| format!("Invalid compression type: {}", buf[5]))?;

    if buf[6] != 0 || buf[7] != 0 {
        return Err("Reserved bytes must be 0".to_string());
    }

    let mut len_bytes = [0u8; 8];
    len_bytes.copy_from_slice(&buf[8..16]);
    Ok((compression, u64::from_le_bytes(len_bytes)))
}

/// Compress data using zstd.
fn compress_zstd(data: &[u8]) -> Result<Vec<u8>> {
    zstd::encode_all(data, 3) // Level 3 = fast compression
        .map_err(|e| Error::store(format!("zstd compression failed: {}", e)))
}

/// Decompress data using zstd.
fn decompress_zstd(data: &[u8]) -> Result<Vec<u8>> {
    zstd::decode_all(data).map_err(|e| Error::store(format!("zstd decompression failed: {}", e)))
}
