use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use std::{env, fmt};

const DEFAULT_MAX_UPLOAD_BYTES: usize = 100 * 1024 * 1024;

/// Which `ObjectStore` implementation backs the server.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum BackendKind {
    /// SQLite metadata plus payloads on local disk.
    Disk,
    /// Process-local map; contents vanish on exit.
    Memory,
}

impl BackendKind {
    fn parse_env(value: &str) -> Result<Self> {
        match value.to_ascii_lowercase().as_str() {
            "disk" => Ok(Self::Disk),
            "memory" => Ok(Self::Memory),
            other => anyhow::bail!("unknown backend `{}` (expected `disk` or `memory`)", other),
        }
    }
}

/// Centralized application configuration.
/// Combines environment variables and CLI arguments.
#[derive(Clone)]
pub struct AppConfig {
    pub host: String,
    pub port: u16,
    pub backend: BackendKind,
    pub storage_dir: String,
    pub database_url: String,
    pub token: Option<String>,
    pub max_upload_bytes: usize,
}

// Hand-written so the shared secret never reaches the logs.
impl fmt::Debug for AppConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AppConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("backend", &self.backend)
            .field("storage_dir", &self.storage_dir)
            .field("database_url", &self.database_url)
            .field("token", &self.token.as_ref().map(|_| "<redacted>"))
            .field("max_upload_bytes", &self.max_upload_bytes)
            .finish()
    }
}

/// Command-line + environment configuration.
#[derive(Parser, Debug)]
#[command(author, version, about = "Token-gated web front end for an object bucket")]
pub struct Args {
    /// Host to bind to (overrides OBJECT_GATE_HOST)
    #[arg(long)]
    pub host: Option<String>,

    /// Port to bind to (overrides OBJECT_GATE_PORT)
    #[arg(long)]
    pub port: Option<u16>,

    /// Storage backend (overrides OBJECT_GATE_BACKEND)
    #[arg(long, value_enum)]
    pub backend: Option<BackendKind>,

    /// Directory where object payloads are stored (overrides OBJECT_GATE_STORAGE_DIR)
    #[arg(long)]
    pub storage_dir: Option<String>,

    /// Database URL (overrides OBJECT_GATE_DATABASE_URL)
    #[arg(long)]
    pub database_url: Option<String>,

    /// Shared-secret token required by every page except the favicon (overrides OBJECT_GATE_TOKEN)
    #[arg(long)]
    pub token: Option<String>,

    /// Largest accepted POST body in bytes (overrides OBJECT_GATE_MAX_UPLOAD_BYTES)
    #[arg(long)]
    pub max_upload_bytes: Option<usize>,

    /// Apply the database schema and exit
    #[arg(long)]
    pub migrate: bool,
}

impl AppConfig {
    /// Parse environment variables + CLI args into AppConfig and migrate flag.
    pub fn from_env_and_args() -> Result<(Self, bool)> {
        let args = Args::parse();
        let migrate = args.migrate;
        Ok((Self::merge(args)?, migrate))
    }

    fn merge(args: Args) -> Result<Self> {
        // --- Environment fallback ---
        let env_host = env::var("OBJECT_GATE_HOST").unwrap_or_else(|_| "0.0.0.0".into());
        let env_port = parse_env_var("OBJECT_GATE_PORT", 3000u16, |v| Ok(v.parse()?))?;
        let env_backend =
            parse_env_var("OBJECT_GATE_BACKEND", BackendKind::Disk, BackendKind::parse_env)?;
        let env_storage =
            env::var("OBJECT_GATE_STORAGE_DIR").unwrap_or_else(|_| "./data/objects".into());
        let env_db = env::var("OBJECT_GATE_DATABASE_URL")
            .unwrap_or_else(|_| "sqlite://./data/meta/object_gate.db".into());
        let env_token = env::var("OBJECT_GATE_TOKEN").ok();
        let env_max_upload = parse_env_var(
            "OBJECT_GATE_MAX_UPLOAD_BYTES",
            DEFAULT_MAX_UPLOAD_BYTES,
            |v| Ok(v.parse()?),
        )?;

        // --- Merge ---
        Ok(Self {
            host: args.host.unwrap_or(env_host),
            port: args.port.unwrap_or(env_port),
            backend: args.backend.unwrap_or(env_backend),
            storage_dir: args.storage_dir.unwrap_or(env_storage),
            database_url: args.database_url.unwrap_or(env_db),
            token: normalize_token(args.token.or(env_token)),
            max_upload_bytes: args.max_upload_bytes.unwrap_or(env_max_upload),
        })
    }

    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// An empty token configures nothing.
pub fn normalize_token(token: Option<String>) -> Option<String> {
    token.filter(|t| !t.is_empty())
}

fn parse_env_var<T>(
    name: &str,
    default: T,
    parse: impl FnOnce(&str) -> Result<T>,
) -> Result<T> {
    match env::var(name) {
        Ok(value) => parse(&value).with_context(|| format!("parsing {} value `{}`", name, value)),
        Err(env::VarError::NotPresent) => Ok(default),
        Err(err) => Err(err).with_context(|| format!("reading {}", name)),
    }
}
