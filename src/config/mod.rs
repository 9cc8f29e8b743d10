//! Configuration layer: typed settings with layered precedence (file → env → CLI).

use std::{
    net::{Ipv4Addr, SocketAddr},
    num::NonZeroUsize,
    path::PathBuf,
    str::FromStr,
    time::Duration,
};

use clap::Parser;
use config::{Config, Environment, File};
use serde::Deserialize;
use thiserror::Error;
use tracing::level_filters::LevelFilter;

use crate::application::render::PoolConfig;

mod cli;

pub use cli::{CliArgs, Command, RendererOverrides, ServeArgs, ServeOverrides};

const DEFAULT_CONFIG_BASENAME: &str = "config/default";
const LOCAL_CONFIG_BASENAME: &str = "pressroom";
const ENV_PREFIX: &str = "PRESSROOM";
const DEFAULT_HOST: &str = "0.0.0.0";
const DEFAULT_PUBLIC_PORT: u16 = 8000;
const DEFAULT_LOOPBACK_PORT: u16 = 8001;
const DEFAULT_GRACEFUL_SHUTDOWN_SECS: u64 = 10;
const DEFAULT_MAX_BODY_MB: u64 = 32;
const DEFAULT_RENDER_TIMEOUT_SECS: u64 = 30;
const DEFAULT_WORKERS: usize = 30;
const DEFAULT_QUEUE_FACTOR: usize = 4;
const DEFAULT_RESTART_ATTEMPTS: u32 = 3;
const DEFAULT_RESTART_BACKOFF_MS: u64 = 500;
const DEFAULT_STORE_BUCKET: &str = "pressroom";
const DEFAULT_STORE_REGION: &str = "us-east-1";
const BYTES_PER_MB: u64 = 1024 * 1024;

/// Fully-resolved deployment settings after precedence resolution and validation.
#[derive(Debug, Clone)]
pub struct Settings {
    pub server: ServerSettings,
    pub logging: LoggingSettings,
    pub renderer: RendererSettings,
    pub store: StoreSettings,
    pub assets: AssetsSettings,
}

#[derive(Debug, Clone)]
pub struct ServerSettings {
    pub public_addr: SocketAddr,
    /// Always on 127.0.0.1; only the local browser workers talk to it.
    pub loopback_addr: SocketAddr,
    pub graceful_shutdown: Duration,
    pub max_body_bytes: usize,
    pub secret: Option<String>,
}

#[derive(Debug, Clone)]
pub struct LoggingSettings {
    pub level: LevelFilter,
    pub format: LogFormat,
}

#[derive(Debug, Clone, Copy)]
pub enum LogFormat {
    Json,
    Compact,
}

#[derive(Debug, Clone)]
pub struct RendererSettings {
    pub timeout: Duration,
    pub workers: NonZeroUsize,
    pub queue_capacity: NonZeroUsize,
    pub restart_attempts: u32,
    pub restart_backoff: Duration,
    pub chrome_path: Option<PathBuf>,
    pub no_sandbox: bool,
}

impl RendererSettings {
    pub fn pool_config(&self, graceful_shutdown: Duration) -> PoolConfig {
        PoolConfig {
            workers: self.workers,
            queue_capacity: self.queue_capacity,
            restart_attempts: self.restart_attempts,
            restart_backoff: self.restart_backoff,
            graceful_shutdown,
        }
    }
}

#[derive(Debug, Clone)]
pub struct StoreSettings {
    /// `host:port` of an S3-compatible endpoint; without it persistence is disabled.
    pub endpoint: Option<String>,
    pub access_key: String,
    pub secret_key: String,
    pub bucket: String,
    pub region: String,
    pub secure: bool,
}

#[derive(Debug, Clone, Default)]
pub struct AssetsSettings {
    pub preload: Vec<String>,
}

#[derive(Debug, Error)]
pub enum LoadError {
    #[error("failed to build configuration: {0}")]
    Build(#[from] config::ConfigError),
    #[error("invalid configuration for `{key}`: {reason}")]
    Invalid { key: &'static str, reason: String },
}

impl LoadError {
    fn invalid(key: &'static str, reason: impl Into<String>) -> Self {
        Self::Invalid {
            key,
            reason: reason.into(),
        }
    }
}

/// Load settings using the configured precedence (file → environment → CLI).
pub fn load(cli: &CliArgs) -> Result<Settings, LoadError> {
    let mut builder = Config::builder()
        .add_source(File::with_name(DEFAULT_CONFIG_BASENAME).required(false))
        .add_source(File::with_name(LOCAL_CONFIG_BASENAME).required(false));

    if let Some(path) = cli.config_file.as_ref() {
        builder = builder.add_source(File::from(path.as_path()).required(true));
    }

    builder = builder.add_source(
        Environment::with_prefix(ENV_PREFIX)
            .separator("__")
            .list_separator(",")
            .with_list_parse_key("assets.preload")
            .try_parsing(true),
    );

    let mut raw: RawSettings = builder.build()?.try_deserialize()?;

    match cli.command.as_ref() {
        Some(Command::Serve(args)) => raw.apply_serve_overrides(&args.overrides),
        None => raw.apply_serve_overrides(&ServeOverrides::default()),
    }

    Settings::from_raw(raw)
}

/// Resolve configuration using the supplied CLI arguments, returning both for downstream use.
pub fn load_with_cli() -> Result<(CliArgs, Settings), LoadError> {
    let args = CliArgs::parse();
    let settings = load(&args)?;
    Ok((args, settings))
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawSettings {
    server: RawServerSettings,
    logging: RawLoggingSettings,
    renderer: RawRendererSettings,
    store: RawStoreSettings,
    assets: RawAssetsSettings,
}

impl RawSettings {
    fn apply_serve_overrides(&mut self, overrides: &ServeOverrides) {
        if let Some(host) = overrides.server_host.as_ref() {
            self.server.host = Some(host.clone());
        }
        if let Some(port) = overrides.public_port {
            self.server.public_port = Some(port);
        }
        if let Some(port) = overrides.loopback_port {
            self.server.loopback_port = Some(port);
        }
        if let Some(seconds) = overrides.server_graceful_shutdown_seconds {
            self.server.graceful_shutdown_seconds = Some(seconds);
        }
        if let Some(mb) = overrides.max_body_mb {
            self.server.max_body_mb = Some(mb);
        }
        if let Some(secret) = overrides.secret.as_ref() {
            self.server.secret = Some(secret.clone());
        }
        if let Some(level) = overrides.log_level.as_ref() {
            self.logging.level = Some(level.clone());
        }
        if let Some(json) = overrides.log_json {
            self.logging.json = Some(json);
        }
        if let Some(endpoint) = overrides.store_endpoint.as_ref() {
            self.store.endpoint = Some(endpoint.clone());
        }
        if let Some(bucket) = overrides.store_bucket.as_ref() {
            self.store.bucket = Some(bucket.clone());
        }
        if !overrides.assets_preload.is_empty() {
            self.assets.preload = Some(overrides.assets_preload.clone());
        }

        self.apply_renderer_overrides(&overrides.renderer);
    }

    fn apply_renderer_overrides(&mut self, overrides: &RendererOverrides) {
        if let Some(seconds) = overrides.timeout_seconds {
            self.renderer.timeout_seconds = Some(seconds);
        }
        if let Some(workers) = overrides.workers {
            self.renderer.workers = Some(workers);
        }
        if let Some(capacity) = overrides.queue_capacity {
            self.renderer.queue_capacity = Some(capacity);
        }
        if let Some(attempts) = overrides.restart_attempts {
            self.renderer.restart_attempts = Some(attempts);
        }
        if let Some(path) = overrides.chrome_path.as_ref() {
            self.renderer.chrome_path = Some(path.clone());
        }
        if let Some(no_sandbox) = overrides.no_sandbox {
            self.renderer.no_sandbox = Some(no_sandbox);
        }
    }
}

impl Settings {
    fn from_raw(raw: RawSettings) -> Result<Self, LoadError> {
        let RawSettings {
            server,
            logging,
            renderer,
            store,
            assets,
        } = raw;

        Ok(Self {
            server: build_server_settings(server)?,
            logging: build_logging_settings(logging)?,
            renderer: build_renderer_settings(renderer)?,
            store: build_store_settings(store)?,
            assets: AssetsSettings {
                preload: assets.preload.unwrap_or_default(),
            },
        })
    }
}

fn build_server_settings(server: RawServerSettings) -> Result<ServerSettings, LoadError> {
    let host = server.host.unwrap_or_else(|| DEFAULT_HOST.to_string());

    let public_port = server.public_port.unwrap_or(DEFAULT_PUBLIC_PORT);
    if public_port == 0 {
        return Err(LoadError::invalid(
            "server.public_port",
            "port must be greater than zero",
        ));
    }
    let loopback_port = server.loopback_port.unwrap_or(DEFAULT_LOOPBACK_PORT);
    if loopback_port == 0 {
        return Err(LoadError::invalid(
            "server.loopback_port",
            "port must be greater than zero",
        ));
    }

    let public_addr = parse_socket_addr(&host, public_port)
        .map_err(|reason| LoadError::invalid("server.public_addr", reason))?;
    let loopback_addr = SocketAddr::from((Ipv4Addr::LOCALHOST, loopback_port));
    if public_addr.port() == loopback_addr.port()
        && (public_addr.ip().is_unspecified() || public_addr.ip().is_loopback())
    {
        return Err(LoadError::invalid(
            "server.loopback_port",
            "must differ from the public port",
        ));
    }

    let graceful_secs = server
        .graceful_shutdown_seconds
        .unwrap_or(DEFAULT_GRACEFUL_SHUTDOWN_SECS);
    if graceful_secs == 0 {
        return Err(LoadError::invalid(
            "server.graceful_shutdown_seconds",
            "must be greater than zero",
        ));
    }

    let max_body_mb = server.max_body_mb.unwrap_or(DEFAULT_MAX_BODY_MB);
    if max_body_mb == 0 {
        return Err(LoadError::invalid(
            "server.max_body_mb",
            "must be greater than zero",
        ));
    }
    let max_body_bytes = max_body_mb
        .checked_mul(BYTES_PER_MB)
        .and_then(|bytes| usize::try_from(bytes).ok())
        .ok_or_else(|| {
            LoadError::invalid(
                "server.max_body_mb",
                "value exceeds supported range for usize",
            )
        })?;

    let secret = server.secret.and_then(|value| {
        let trimmed = value.trim();
        (!trimmed.is_empty()).then(|| trimmed.to_string())
    });

    Ok(ServerSettings {
        public_addr,
        loopback_addr,
        graceful_shutdown: Duration::from_secs(graceful_secs),
        max_body_bytes,
        secret,
    })
}

fn build_logging_settings(logging: RawLoggingSettings) -> Result<LoggingSettings, LoadError> {
    let level = match logging.level {
        Some(level) => LevelFilter::from_str(level.as_str()).map_err(|err| {
            LoadError::invalid("logging.level", format!("failed to parse: {err}"))
        })?,
        None => LevelFilter::INFO,
    };

    let format = if logging.json.unwrap_or(false) {
        LogFormat::Json
    } else {
        LogFormat::Compact
    };

    Ok(LoggingSettings { level, format })
}

fn build_renderer_settings(renderer: RawRendererSettings) -> Result<RendererSettings, LoadError> {
    let timeout_secs = renderer
        .timeout_seconds
        .unwrap_or(DEFAULT_RENDER_TIMEOUT_SECS);
    if timeout_secs == 0 {
        return Err(LoadError::invalid(
            "renderer.timeout_seconds",
            "must be greater than zero",
        ));
    }

    let workers = non_zero_usize(
        renderer.workers.unwrap_or(DEFAULT_WORKERS),
        "renderer.workers",
    )?;
    let queue_capacity = non_zero_usize(
        renderer
            .queue_capacity
            .unwrap_or_else(|| workers.get().saturating_mul(DEFAULT_QUEUE_FACTOR)),
        "renderer.queue_capacity",
    )?;

    let chrome_path = renderer.chrome_path.filter(|path| !path.as_os_str().is_empty());

    Ok(RendererSettings {
        timeout: Duration::from_secs(timeout_secs),
        workers,
        queue_capacity,
        restart_attempts: renderer
            .restart_attempts
            .unwrap_or(DEFAULT_RESTART_ATTEMPTS),
        restart_backoff: Duration::from_millis(
            renderer
                .restart_backoff_ms
                .unwrap_or(DEFAULT_RESTART_BACKOFF_MS),
        ),
        chrome_path,
        no_sandbox: renderer.no_sandbox.unwrap_or(false),
    })
}

fn build_store_settings(store: RawStoreSettings) -> Result<StoreSettings, LoadError> {
    let endpoint = store.endpoint.and_then(|value| {
        let trimmed = value.trim();
        (!trimmed.is_empty()).then(|| trimmed.to_string())
    });

    let bucket = store
        .bucket
        .unwrap_or_else(|| DEFAULT_STORE_BUCKET.to_string());
    if endpoint.is_some() && bucket.trim().is_empty() {
        return Err(LoadError::invalid(
            "store.bucket",
            "bucket must not be empty when an endpoint is configured",
        ));
    }

    Ok(StoreSettings {
        endpoint,
        access_key: store.access_key.unwrap_or_default(),
        secret_key: store.secret_key.unwrap_or_default(),
        bucket,
        region: store
            .region
            .unwrap_or_else(|| DEFAULT_STORE_REGION.to_string()),
        secure: store.secure.unwrap_or(true),
    })
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawServerSettings {
    host: Option<String>,
    public_port: Option<u16>,
    loopback_port: Option<u16>,
    graceful_shutdown_seconds: Option<u64>,
    max_body_mb: Option<u64>,
    secret: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawLoggingSettings {
    level: Option<String>,
    json: Option<bool>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawRendererSettings {
    timeout_seconds: Option<u64>,
    workers: Option<usize>,
    queue_capacity: Option<usize>,
    restart_attempts: Option<u32>,
    restart_backoff_ms: Option<u64>,
    chrome_path: Option<PathBuf>,
    no_sandbox: Option<bool>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawStoreSettings {
    endpoint: Option<String>,
    access_key: Option<String>,
    secret_key: Option<String>,
    bucket: Option<String>,
    region: Option<String>,
    secure: Option<bool>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawAssetsSettings {
    preload: Option<Vec<String>>,
}

fn parse_socket_addr(host: &str, port: u16) -> Result<SocketAddr, String> {
    let candidate = format!("{host}:{port}");
    candidate
        .parse()
        .map_err(|err| format!("invalid address `{candidate}`: {err}"))
}

fn non_zero_usize(value: usize, key: &'static str) -> Result<NonZeroUsize, LoadError> {
    NonZeroUsize::new(value).ok_or_else(|| LoadError::invalid(key, "must be greater than zero"))
}

#[cfg(test)]
mod tests;
