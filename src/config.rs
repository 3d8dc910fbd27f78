use anyhow::{Context, Result};
use clap::Parser;
use std::env;

use crate::services::thumbnails::ThumbSize;

/// Default cache-control metadata stamped onto every primary upload.
pub const DEFAULT_CACHE_CONTROL: &str = "public, max-age=3600";

/// Adapter-facing configuration, resolved once at startup and immutable for
/// the adapter's entire lifetime.
#[derive(Debug, Clone)]
pub struct AdapterConfig {
    /// Target bucket identifier.
    pub bucket_name: String,

    /// Cache-control value stored on primary objects.
    pub cache_control: String,

    /// When true, objects are written publicly readable and locations are
    /// direct bucket URLs instead of proxied host URLs.
    pub direct_access: bool,

    /// Thumbnail targets; empty disables the pipeline entirely.
    pub thumbnail_sizes: Vec<ThumbSize>,
}

/// Centralized application configuration.
/// Combines environment variables and CLI arguments.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub host: String,
    pub port: u16,

    /// Raw service-account secret: inline JSON or a key-file path. Only
    /// required when no local directory overrides the backend.
    pub service_account: Option<String>,

    /// When set, objects are stored under this directory instead of GCS.
    pub local_dir: Option<String>,

    /// Mount path handed to the adapter as host context for proxied URLs.
    pub mount: String,

    pub adapter: AdapterConfig,
}

/// Command-line + environment configuration.
#[derive(Parser, Debug)]
#[command(author, version, about = "Bucket-backed file storage adapter")]
pub struct Args {
    /// Host to bind to (overrides FILE_STORE_HOST)
    #[arg(long)]
    pub host: Option<String>,

    /// Port to bind to (overrides FILE_STORE_PORT)
    #[arg(long)]
    pub port: Option<u16>,

    /// Store objects under a local directory instead of GCS
    /// (overrides FILE_STORE_LOCAL_DIR)
    #[arg(long)]
    pub local_dir: Option<String>,
}

impl AppConfig {
    /// Parse environment variables + CLI args into an AppConfig.
    pub fn from_env_and_args() -> Result<Self> {
        Self::build(Args::parse())
    }

    fn build(args: Args) -> Result<Self> {
        let env_host = optional("FILE_STORE_HOST", "0.0.0.0");
        let env_port = match env::var("FILE_STORE_PORT") {
            Ok(value) => value
                .parse::<u16>()
                .with_context(|| format!("parsing FILE_STORE_PORT value `{}`", value))?,
            Err(env::VarError::NotPresent) => 3000,
            Err(err) => return Err(err).context("reading FILE_STORE_PORT"),
        };

        let local_dir = args
            .local_dir
            .or_else(|| env::var("FILE_STORE_LOCAL_DIR").ok())
            .filter(|dir| !dir.is_empty());

        // The credential secret is a startup precondition for the GCS
        // backend; a local backend lifts it.
        let service_account = if local_dir.is_some() {
            env::var("FILE_STORE_SERVICE_ACCOUNT").ok()
        } else {
            Some(required("FILE_STORE_SERVICE_ACCOUNT")?)
        };

        let thumbnail_sizes = ThumbSize::parse_list(&optional("FILE_STORE_THUMBNAIL_SIZES", ""))
            .map_err(|reason| anyhow::anyhow!("parsing FILE_STORE_THUMBNAIL_SIZES: {}", reason))?;

        let adapter = AdapterConfig {
            bucket_name: required("FILE_STORE_BUCKET")?,
            cache_control: optional("FILE_STORE_CACHE_CONTROL", DEFAULT_CACHE_CONTROL),
            direct_access: parse_flag(&optional("FILE_STORE_DIRECT_ACCESS", "false"))
                .context("parsing FILE_STORE_DIRECT_ACCESS")?,
            thumbnail_sizes,
        };

        Ok(Self {
            host: args.host.unwrap_or(env_host),
            port: args.port.unwrap_or(env_port),
            service_account,
            local_dir,
            mount: optional("FILE_STORE_MOUNT", ""),
            adapter,
        })
    }

    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Read an env var, falling back when it is unset or empty.
fn optional(name: &str, fallback: &str) -> String {
    match env::var(name) {
        Ok(value) if !value.is_empty() => value,
        _ => fallback.to_string(),
    }
}

/// Read an env var that must be present and non-empty.
fn required(name: &str) -> Result<String> {
    match env::var(name) {
        Ok(value) if !value.is_empty() => Ok(value),
        _ => anyhow::bail!("missing required env var: {}", name),
    }
}

fn parse_flag(raw: &str) -> Result<bool> {
    match raw.to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" => Ok(true),
        "false" | "0" | "no" => Ok(false),
        other => anyhow::bail!("`{}` is not a boolean", other),
    }
}
