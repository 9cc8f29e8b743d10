use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, builder::BoolishValueParser};

/// Command-line arguments for the pressroom binary.
#[derive(Debug, Parser)]
#[command(name = "pressroom", version, about = "HTML bundle to PDF rendering service")]
pub struct CliArgs {
    /// Optional path to a configuration file.
    #[arg(long = "config-file", env = "PRESSROOM_CONFIG_FILE", value_name = "PATH")]
    pub config_file: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Debug, Subcommand, Clone)]
pub enum Command {
    /// Run the public API, the loopback bridge and the renderer pool.
    Serve(Box<ServeArgs>),
}

#[derive(Debug, Args, Default, Clone)]
pub struct ServeArgs {
    #[command(flatten)]
    pub overrides: ServeOverrides,
}

#[derive(Debug, Args, Default, Clone)]
pub struct RendererOverrides {
    /// Override the per-render timeout.
    #[arg(long = "renderer-timeout-seconds", value_name = "SECONDS")]
    pub timeout_seconds: Option<u64>,

    /// Override the number of browser workers.
    #[arg(long = "renderer-workers", value_name = "COUNT")]
    pub workers: Option<usize>,

    /// Override the number of jobs allowed to wait for a worker.
    #[arg(long = "renderer-queue-capacity", value_name = "COUNT")]
    pub queue_capacity: Option<usize>,

    /// Override how often a crashed worker is relaunched before its slot is stopped.
    #[arg(long = "renderer-restart-attempts", value_name = "COUNT")]
    pub restart_attempts: Option<u32>,

    /// Override the Chrome executable path.
    #[arg(long = "renderer-chrome-path", value_name = "PATH")]
    pub chrome_path: Option<PathBuf>,

    /// Launch Chrome without its sandbox (needed in most containers).
    #[arg(
        long = "renderer-no-sandbox",
        value_name = "BOOL",
        value_parser = BoolishValueParser::new()
    )]
    pub no_sandbox: Option<bool>,
}

#[derive(Debug, Args, Default, Clone)]
pub struct ServeOverrides {
    #[command(flatten)]
    pub renderer: RendererOverrides,

    /// Override the public listener host.
    #[arg(long = "server-host", value_name = "HOST")]
    pub server_host: Option<String>,

    /// Override the public listener port.
    #[arg(long = "server-public-port", value_name = "PORT")]
    pub public_port: Option<u16>,

    /// Override the loopback bridge port. The bridge always binds 127.0.0.1.
    #[arg(long = "server-loopback-port", value_name = "PORT")]
    pub loopback_port: Option<u16>,

    /// Override the graceful shutdown timeout.
    #[arg(long = "server-graceful-shutdown-seconds", value_name = "SECONDS")]
    pub server_graceful_shutdown_seconds: Option<u64>,

    /// Override the maximum request body size in megabytes.
    #[arg(long = "server-max-body-mb", value_name = "MB")]
    pub max_body_mb: Option<u64>,

    /// Require `Authorization: Bearer <SECRET>` on every API route.
    #[arg(long = "server-secret", env = "PRESSROOM_SECRET", value_name = "SECRET")]
    pub secret: Option<String>,

    /// Override the base log level (trace|debug|info|warn|error).
    #[arg(long = "log-level", value_name = "LEVEL")]
    pub log_level: Option<String>,

    /// Toggle JSON logging.
    #[arg(
        long = "log-json",
        value_name = "BOOL",
        value_parser = BoolishValueParser::new()
    )]
    pub log_json: Option<bool>,

    /// Override the object store endpoint (`host:port`).
    #[arg(long = "store-endpoint", value_name = "HOST:PORT")]
    pub store_endpoint: Option<String>,

    /// Override the object store bucket.
    #[arg(long = "store-bucket", value_name = "BUCKET")]
    pub store_bucket: Option<String>,

    /// Stylesheet to preload as `key:url` or `key:path`; repeatable.
    #[arg(long = "assets-preload", value_name = "KEY:LOCATION")]
    pub assets_preload: Vec<String>,
}
