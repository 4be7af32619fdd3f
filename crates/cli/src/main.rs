use clap::{Parser, Subcommand};
use depot_files::{
    ContentStore, HashAlgorithm, Namespacing, OwnerId, StoreConfig, DEFAULT_STORAGE_ROOT,
    STALE_STAGING_AGE,
};
use std::path::PathBuf;
use std::time::Duration;
use tokio::io::AsyncWriteExt;

#[derive(Parser)]
#[command(name = "depot")]
#[command(about = "Depot content store CLI")]
struct Cli {
    /// Storage root directory
    #[arg(long, default_value = DEFAULT_STORAGE_ROOT)]
    root: PathBuf,

    /// Digest algorithm (sha256 or sha512)
    #[arg(long, default_value = "sha256")]
    algorithm: HashAlgorithm,

    /// Object grouping (per-owner or global)
    #[arg(long, default_value = "per-owner")]
    namespacing: Namespacing,

    /// Per-operation timeout in milliseconds
    #[arg(long)]
    timeout_ms: Option<u64>,

    /// Re-hash objects when reading them by fingerprint
    #[arg(long)]
    verify_on_read: bool,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Store a file and print its fingerprint
    Put {
        /// Owner id
        owner: String,
        /// Version number
        version: u32,
        /// File to store
        file: PathBuf,
        /// Store only if the content hashes to this fingerprint
        #[arg(long)]
        expect: Option<String>,
    },
    /// Read an object by fingerprint
    Get {
        /// Owner id
        owner: String,
        /// Version number
        version: u32,
        /// Fingerprint printed by `put`
        fingerprint: String,
        /// Write to this file instead of stdout
        #[arg(long)]
        out: Option<PathBuf>,
    },
    /// Read a file by its path under the storage root
    GetPath {
        /// Path relative to the storage root
        path: PathBuf,
        /// Write to this file instead of stdout
        #[arg(long)]
        out: Option<PathBuf>,
    },
    /// Print object metadata as JSON
    Stat {
        /// Owner id
        owner: String,
        /// Version number
        version: u32,
        /// Fingerprint printed by `put`
        fingerprint: String,
    },
    /// Remove abandoned staging files
    Sweep {
        /// Minimum age in seconds of files to remove
        #[arg(long, default_value_t = STALE_STAGING_AGE.as_secs())]
        older_than_secs: u64,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let Some(command) = cli.command else {
        println!("Use 'depot --help' for commands");
        return Ok(());
    };

    let config = StoreConfig::new(cli.root)
        .with_hash_algorithm(cli.algorithm)
        .with_namespacing(cli.namespacing)
        .with_verify_on_read(cli.verify_on_read)
        .with_operation_timeout(cli.timeout_ms.filter(|ms| *ms > 0).map(Duration::from_millis));
    let store = ContentStore::open(&config).await?;

    match command {
        Commands::Put {
            owner,
            version,
            file,
            expect,
        } => {
            let owner = OwnerId::parse(&owner)?;
            let content = tokio::fs::read(&file).await?;
            let fingerprint = match expect {
                Some(expected) => {
                    let expected = store.parse_fingerprint(&expected)?;
                    store
                        .put_verified(&content, &owner, version, &expected)
                        .await?
                }
                None => store.put(&content, &owner, version).await?,
            };
            println!("{}", fingerprint);
            println!(
                "{}",
                store
                    .relative_path(&owner, &fingerprint, version)
                    .display()
            );
        }
        Commands::Get {
            owner,
            version,
            fingerprint,
            out,
        } => {
            let owner = OwnerId::parse(&owner)?;
            let fingerprint = store.parse_fingerprint(&fingerprint)?;
            let content = store
                .get_by_fingerprint(&owner, &fingerprint, version)
                .await?;
            emit(&content, out).await?;
        }
        Commands::GetPath { path, out } => {
            let content = store.get_by_path(&path).await?;
            emit(&content, out).await?;
        }
        Commands::Stat {
            owner,
            version,
            fingerprint,
        } => {
            let owner = OwnerId::parse(&owner)?;
            let fingerprint = store.parse_fingerprint(&fingerprint)?;
            let metadata = store.stat(&owner, &fingerprint, version).await?;
            println!("{}", serde_json::to_string_pretty(&metadata)?);
        }
        Commands::Sweep { older_than_secs } => {
            let removed = store
                .sweep_staging(Duration::from_secs(older_than_secs))
                .await?;
            println!("Removed {} staging file(s)", removed);
        }
    }

    Ok(())
}

async fn emit(content: &[u8], out: Option<PathBuf>) -> std::io::Result<()> {
    match out {
        Some(path) => tokio::fs::write(path, content).await,
        None => {
            let mut stdout = tokio::io::stdout();
            stdout.write_all(content).await?;
            stdout.flush().await
        }
    }
}
