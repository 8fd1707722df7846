//! Output formatting for CLI commands.
//!
//! Provides abstraction layer for outputting results in text or JSON format.

use anyhow::Result;
use dagfs_core::{Hash, Link};
use serde::Serialize;
use std::io::{self, Write};

/// Output format selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    Text,
    Json,
}

/// Writer for command output with format abstraction.
pub struct OutputWriter {
    format: OutputFormat,
    stdout: io::Stdout,
}

impl OutputWriter {
    /// Create a new OutputWriter.
    pub fn new(json: bool) -> Self {
        Self {
            format: if json {
                OutputFormat::Json
            } else {
                OutputFormat::Text
            },
            stdout: io::stdout(),
        }
    }

    /// Write output using the configured format.
    ///
    /// The `text_fn` closure is called only in text mode to generate the
    /// human-readable output.
    pub fn write<T: Serialize>(&self, data: &T, text_fn: impl FnOnce() -> String) -> Result<()> {
        match self.format {
            OutputFormat::Json => {
                let json = serde_json::to_string_pretty(data)?;
                writeln!(&self.stdout, "{}", json)?;
            }
            OutputFormat::Text => {
                let text = text_fn();
                if !text.is_empty() {
                    write!(&self.stdout, "{}", text)?;
                }
            }
        }
        Ok(())
    }

    /// Write an error message to stderr.
    ///
    /// In JSON mode, writes a JSON error object with success=false.
    pub fn write_error(&self, error: &anyhow::Error, result_code: u8) {
        match self.format {
            OutputFormat::Json => {
                let error_output = ErrorOutput {
                    success: false,
                    result_code,
                    error: format!("{:#}", error),
                };
                if let Ok(json) = serde_json::to_string_pretty(&error_output) {
                    let _ = writeln!(io::stderr(), "{}", json);
                }
            }
            OutputFormat::Text => {
                let _ = writeln!(io::stderr(), "Error: {:#}", error);
            }
        }
    }
}

// ============================================================================
// Data Transfer Objects (DTOs) for JSON output
// ============================================================================

/// Error output structure.
#[derive(Debug, Serialize)]
pub struct ErrorOutput {
    pub success: bool,
    pub result_code: u8,
    pub error: String,
}

/// Output for `init` command.
#[derive(Debug, Serialize)]
pub struct InitOutput {
    pub success: bool,
    pub result_code: u8,
    pub root: String,
    pub algorithm: String,
}

/// Root encoded during `add` command.
#[derive(Debug, Clone, Serialize)]
pub struct AddedRoot {
    pub hash: Hash,
    pub path: String,
    pub size: u64,
}

/// Output for `add` command.
#[derive(Debug, Serialize)]
pub struct AddOutput {
    pub success: bool,
    pub result_code: u8,
    pub roots: Vec<AddedRoot>,
    pub objects_written: u64,
}

/// Output for `materialize` command.
#[derive(Debug, Serialize)]
pub struct MaterializeOutput {
    pub success: bool,
    pub result_code: u8,
    pub hash: Hash,
    pub destination: String,
}

/// Directory entry information for `ls` command.
#[derive(Debug, Clone, Serialize)]
pub struct EntryInfo {
    pub name: String,
    pub kind: String,
    pub size: u64,
    pub hash: Hash,
}

impl From<&Link> for EntryInfo {
    fn from(link: &Link) -> Self {
        Self {
            name: link.name_str().to_string(),
            kind: link.kind.as_str().to_string(),
            size: link.size,
            hash: link.hash,
        }
    }
}

/// Output for `ls` command.
#[derive(Debug, Serialize)]
pub struct LsOutput {
    pub success: bool,
    pub result_code: u8,
    pub root: Hash,
    pub path: String,
    pub entries: Vec<EntryInfo>,
}

/// Leaf statistics for `stat` command.
#[derive(Debug, Serialize)]
pub struct LeafStatInfo {
    pub hash: Hash,
    pub payload_size: u64,
    pub size_on_disk: u64,
    pub path: String,
}

/// Node statistics for `stat` command.
#[derive(Debug, Serialize)]
pub struct NodeStatInfo {
    pub hash: Hash,
    /// "file" for chunk-tree nodes, "directory" otherwise.
    pub role: String,
    pub link_count: usize,
    pub content_size: u64,
    pub size_on_disk: u64,
    pub path: String,
}

/// Data variants for `stat` command.
#[derive(Debug, Serialize)]
#[serde(tag = "type")]
pub enum StatData {
    Leaf(LeafStatInfo),
    Node(NodeStatInfo),
}

/// Output for `stat` command.
#[derive(Debug, Serialize)]
pub struct StatOutput {
    pub success: bool,
    pub result_code: u8,
    #[serde(flatten)]
    pub data: StatData,
}
