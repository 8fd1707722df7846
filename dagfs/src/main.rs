mod output;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use dagfs_core::{Algorithm, DagBuilder, FsStore, Hash, Node, Object, Resolver};
use output::{
    AddOutput, AddedRoot, EntryInfo, InitOutput, LeafStatInfo, LsOutput, MaterializeOutput,
    NodeStatInfo, OutputWriter, StatData, StatOutput,
};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use tracing::debug;
use tracing_subscriber::EnvFilter;

/// dagfs - files and directories as a content-addressed Merkle DAG
#[derive(Parser)]
#[command(name = "dagfs")]
#[command(about = "Content-addressed Merkle DAG store for files and directories", long_about = None)]
#[command(version)]
struct Cli {
    /// Store root directory (defaults to DAGFS_ROOT env var or ./dagfs-store)
    #[arg(short, long, global = true)]
    root: Option<PathBuf>,

    /// Print results as JSON
    #[arg(long, global = true)]
    json: bool,

    /// Log at debug level unless RUST_LOG says otherwise
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, ValueEnum)]
enum AlgoArg {
    Blake3,
    Sha256,
}

impl From<AlgoArg> for Algorithm {
    fn from(arg: AlgoArg) -> Self {
        match arg {
            AlgoArg::Blake3 => Algorithm::Blake3,
            AlgoArg::Sha256 => Algorithm::Sha256,
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize a new store
    Init {
        /// Hash algorithm to use
        #[arg(long, value_enum, default_value = "blake3")]
        algo: AlgoArg,
    },

    /// Add files or directories to the store
    Add {
        /// Paths to add
        #[arg(required = true)]
        paths: Vec<PathBuf>,
    },

    /// Write a file's content to stdout
    Cat {
        /// Root digest
        hash: String,

        /// Slash-separated path below the root (empty if the root is a file)
        #[arg(default_value = "")]
        path: String,

        /// Re-hash every object read and fail on mismatch
        #[arg(long)]
        verify: bool,
    },

    /// List a directory's entries
    Ls {
        /// Root digest
        hash: String,

        /// Slash-separated path below the root
        #[arg(default_value = "")]
        path: String,

        /// Show kind, size and digest of each entry
        #[arg(short, long)]
        long: bool,
    },

    /// Show object metadata
    Stat {
        /// Hash of the object
        hash: String,
    },

    /// Recreate a stored file or directory on the filesystem
    Materialize {
        /// Root digest
        hash: String,

        /// Destination path (must not exist)
        dest: PathBuf,
    },
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    setup_tracing(cli.verbose);

    let output = OutputWriter::new(cli.json);

    // Determine store root: CLI arg > DAGFS_ROOT env var > ./dagfs-store default
    let root = cli
        .root
        .or_else(|| std::env::var("DAGFS_ROOT").ok().map(PathBuf::from))
        .unwrap_or_else(|| PathBuf::from("./dagfs-store"));

    let result = match cli.command {
        Commands::Init { algo } => cmd_init(&output, &root, algo.into()),
        Commands::Add { paths } => cmd_add(&output, &root, paths),
        Commands::Cat { hash, path, verify } => cmd_cat(&root, &hash, &path, verify),
        Commands::Ls { hash, path, long } => cmd_ls(&output, &root, &hash, &path, long),
        Commands::Stat { hash } => cmd_stat(&output, &root, &hash),
        Commands::Materialize { hash, dest } => cmd_materialize(&output, &root, &hash, &dest),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            output.write_error(&e, 1);
            ExitCode::FAILURE
        }
    }
}

/// Logs go to stderr so `cat` output stays clean.
fn setup_tracing(verbose: bool) {
    let default = if verbose { "debug" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .init();
}

fn open_store(root: &Path) -> Result<FsStore> {
    FsStore::open(root).with_context(|| format!("Failed to open store at {}", root.display()))
}

fn parse_hash(hash_str: &str) -> Result<Hash> {
    Hash::from_hex(hash_str).with_context(|| format!("Invalid hash: {}", hash_str))
}

fn cmd_init(output: &OutputWriter, root: &Path, algorithm: Algorithm) -> Result<()> {
    FsStore::init(root, algorithm)
        .with_context(|| format!("Failed to initialize store at {}", root.display()))?;

    let data = InitOutput {
        success: true,
        result_code: 0,
        root: root.display().to_string(),
        algorithm: algorithm.as_str().to_string(),
    };
    output.write(&data, || {
        format!(
            "Initialized dagfs store at {}\nAlgorithm: {}\n",
            root.display(),
            algorithm.as_str()
        )
    })
}

fn cmd_add(output: &OutputWriter, root: &Path, paths: Vec<PathBuf>) -> Result<()> {
    let store = open_store(root)?;
    let algorithm = store.algorithm();
    let builder = DagBuilder::new(&store, &algorithm);

    let mut roots = Vec::with_capacity(paths.len());
    for path in paths {
        let node = Node::from_path(&path)
            .with_context(|| format!("Failed to read path: {}", path.display()))?;
        let hash = builder
            .add_root(&node)
            .with_context(|| format!("Failed to add path: {}", path.display()))?;

        roots.push(AddedRoot {
            hash,
            path: path.display().to_string(),
            size: node.size(),
        });
    }

    let stats = builder.stats();
    debug!(objects = stats.objects, leaves = stats.leaves, "add finished");

    let data = AddOutput {
        success: true,
        result_code: 0,
        roots,
        objects_written: stats.objects,
    };
    output.write(&data, || {
        data.roots
            .iter()
            .map(|r| format!("{} {}\n", r.hash, r.path))
            .collect()
    })
}

/// Content goes to stdout raw; `--json` does not apply.
fn cmd_cat(root: &Path, hash_str: &str, path: &str, verify: bool) -> Result<()> {
    let store = open_store(root)?;
    let hash = parse_hash(hash_str)?;
    let algorithm = store.algorithm();

    let mut resolver = Resolver::new(&store);
    if verify {
        resolver = resolver.with_verification(&algorithm);
    }

    let stdout = io::stdout();
    let mut handle = stdout.lock();
    resolver
        .resolve_to_writer(&hash, path, &mut handle)
        .with_context(|| format!("Failed to read {:?} under {}", path, hash))?;
    handle.flush()?;

    Ok(())
}

fn cmd_ls(output: &OutputWriter, root: &Path, hash_str: &str, path: &str, long: bool) -> Result<()> {
    let store = open_store(root)?;
    let hash = parse_hash(hash_str)?;

    let links = Resolver::new(&store)
        .list(&hash, path)
        .with_context(|| format!("Failed to list {:?} under {}", path, hash))?;

    let data = LsOutput {
        success: true,
        result_code: 0,
        root: hash,
        path: path.to_string(),
        entries: links.iter().map(EntryInfo::from).collect(),
    };
    output.write(&data, || {
        data.entries
            .iter()
            .map(|e| {
                if long {
                    format!("{:<4} {:>12} {} {}\n", e.kind, e.size, e.hash, e.name)
                } else {
                    format!("{}\n", e.name)
                }
            })
            .collect()
    })
}

fn cmd_stat(output: &OutputWriter, root: &Path, hash_str: &str) -> Result<()> {
    let store = open_store(root)?;
    let hash = parse_hash(hash_str)?;

    let object = Resolver::new(&store)
        .fetch(&hash)
        .with_context(|| format!("Failed to read object {}", hash))?;
    let size_on_disk = store.size_on_disk(&hash)?;
    let path = store.object_path(&hash).display().to_string();

    let content_size = content_size(&object).with_context(|| format!("Failed to stat {}", hash))?;

    let data = match &object {
        Object::Leaf(payload) => StatData::Leaf(LeafStatInfo {
            hash,
            payload_size: payload.len() as u64,
            size_on_disk,
            path,
        }),
        Object::Node(links) => StatData::Node(NodeStatInfo {
            hash,
            role: if object.is_directory() { "directory" } else { "file" }.to_string(),
            link_count: links.len(),
            content_size,
            size_on_disk,
            path,
        }),
    };

    let text = match &data {
        StatData::Leaf(info) => format!(
            "Hash: {}\nType: leaf\nSize: {} bytes\nSize (on disk): {} bytes\nPath: {}\n",
            info.hash, info.payload_size, info.size_on_disk, info.path
        ),
        StatData::Node(info) => format!(
            "Hash: {}\nType: node ({})\nLinks: {}\nContent size: {} bytes\nSize (on disk): {} bytes\nPath: {}\n",
            info.hash, info.role, info.link_count, info.content_size, info.size_on_disk, info.path
        ),
    };

    let result = StatOutput {
        success: true,
        result_code: 0,
        data,
    };
    output.write(&result, || text)
}

/// Bytes reachable through a node's links; stored sizes are untrusted.
fn content_size(object: &Object) -> Result<u64> {
    object
        .links()
        .iter()
        .try_fold(0u64, |acc, l| acc.checked_add(l.size))
        .context("link sizes overflow")
}

fn cmd_materialize(output: &OutputWriter, root: &Path, hash_str: &str, dest: &Path) -> Result<()> {
    let store = open_store(root)?;
    let hash = parse_hash(hash_str)?;

    Resolver::new(&store)
        .materialize(&hash, dest)
        .with_context(|| format!("Failed to materialize {} to {}", hash, dest.display()))?;

    let data = MaterializeOutput {
        success: true,
        result_code: 0,
        hash,
        destination: dest.display().to_string(),
    };
    output.write(&data, || {
        format!("Materialized {} to {}\n", hash, dest.display())
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;
    use dagfs_core::Hasher;
    use tempfile::TempDir;

    #[test]
    fn test_cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_cat_path_defaults_to_root() {
        let cli = Cli::try_parse_from(["dagfs", "cat", "abcd"]).unwrap();
        match cli.command {
            Commands::Cat { path, verify, .. } => {
                assert_eq!(path, "");
                assert!(!verify);
            }
            _ => panic!("expected cat"),
        }
    }

    #[test]
    fn test_unknown_algorithm_rejected() {
        assert!(Cli::try_parse_from(["dagfs", "init", "--algo", "md5"]).is_err());
        assert!(Cli::try_parse_from(["dagfs", "init", "--algo", "sha256"]).is_ok());
    }

    #[test]
    fn test_commands_against_a_store() {
        let temp_dir = TempDir::new().unwrap();
        let store_root = temp_dir.path().join("store");
        let src = temp_dir.path().join("src");
        std::fs::create_dir_all(src.join("sub")).unwrap();
        std::fs::write(src.join("a.txt"), b"hi").unwrap();
        std::fs::write(src.join("sub/b.txt"), b"world").unwrap();

        let output = OutputWriter::new(true);
        cmd_init(&output, &store_root, Algorithm::Sha256).unwrap();
        cmd_add(&output, &store_root, vec![src.clone()]).unwrap();

        let store = FsStore::open(&store_root).unwrap();
        let algorithm = store.algorithm();
        let root = DagBuilder::new(&store, &algorithm)
            .add_root(&Node::from_path(&src).unwrap())
            .unwrap();

        cmd_ls(&output, &store_root, &root.to_hex(), "sub", true).unwrap();
        cmd_stat(&output, &store_root, &root.to_hex()).unwrap();
        assert!(cmd_ls(&output, &store_root, &root.to_hex(), "a.txt", false).is_err());

        let dest = temp_dir.path().join("out");
        cmd_materialize(&output, &store_root, &root.to_hex(), &dest).unwrap();
        assert_eq!(std::fs::read(dest.join("sub/b.txt")).unwrap(), b"world");
    }

    #[test]
    fn test_content_size_overflow_is_an_error() {
        let hash = Algorithm::Blake3.digest(b"x");
        let huge = Object::Node(vec![
            dagfs_core::Link::leaf(hash, u64::MAX),
            dagfs_core::Link::leaf(hash, 1),
        ]);
        assert!(content_size(&huge).is_err());

        let fine = Object::Node(vec![
            dagfs_core::Link::leaf(hash, 3),
            dagfs_core::Link::leaf(hash, 4),
        ]);
        assert_eq!(content_size(&fine).unwrap(), 7);
        assert_eq!(content_size(&Object::Leaf(b"abc".to_vec())).unwrap(), 0);
    }

    #[test]
    fn test_open_missing_store_fails() {
        let temp_dir = TempDir::new().unwrap();
        assert!(open_store(&temp_dir.path().join("nope")).is_err());
        assert!(parse_hash("not-hex").is_err());
    }
}
