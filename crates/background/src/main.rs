//! Vault extension background - hosts workers, retrieves secrets and
//! verifies the server during login.

use std::path::PathBuf;
use std::sync::Arc;

use background::collaborators::{BrowserBridge, FileKeyring, HttpApiClient};
use background::{BackgroundContext, BackgroundHost, UserSession};
use clap::{Parser, Subcommand};
use extension_config_and_utils::{init_logging, Config, Paths};
use extension_port::{RequestPolicy, WorkerRegistry};
use gpgauth::ServerVerifier;
use tracing::info;

/// Background command-line interface.
#[derive(Parser)]
#[command(name = "vault-background")]
#[command(about = "Password manager extension background")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Log level (trace, debug, info, warn, error); overrides the config file
    #[arg(short, long, global = true, env = "VAULT_EXT_LOG_LEVEL")]
    log_level: Option<String>,

    /// Base directory for runtime files (socket, logs, config). Defaults to ~/.vault-extension
    #[arg(long, global = true)]
    base_dir: Option<PathBuf>,

    /// Socket path, defaults to <base-dir>/background.sock
    #[arg(long, global = true)]
    socket: Option<PathBuf>,

    /// API base URL
    #[arg(long, global = true, env = "VAULT_EXT_API_URL")]
    api_url: Option<String>,

    /// Request timeout in milliseconds, 0 waits forever
    #[arg(long, global = true, env = "VAULT_EXT_REQUEST_TIMEOUT_MS")]
    request_timeout_ms: Option<u64>,

    /// Only log to the log file
    #[arg(long, global = true)]
    no_stderr: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the background host (default)
    Start,
    /// Check whether a background host is listening
    Status,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let paths = match &cli.base_dir {
        Some(base) => Paths::with_base_dir(base.clone()),
        None => Paths::new()?,
    };
    let mut config = Config::load(&paths)?;
    if let Some(level) = &cli.log_level {
        config.log_level = level.clone();
    }
    if let Some(api_url) = &cli.api_url {
        config.api_url = api_url.clone();
    }
    if let Some(timeout) = cli.request_timeout_ms {
        config.request_timeout_ms = timeout;
    }
    let socket_path = cli.socket.clone().unwrap_or_else(|| paths.socket_file());

    match cli.command {
        Some(Commands::Status) => {
            match tokio::net::UnixStream::connect(&socket_path).await {
                Ok(_) => println!("Background is running at {}", socket_path.display()),
                Err(_) => println!("Background is not running"),
            }
        }
        Some(Commands::Start) | None => {
            paths.ensure_dirs()?;
            init_logging(&config.log_level, &paths, !cli.no_stderr)?;
            run(config, paths, socket_path).await?;
        }
    }

    Ok(())
}

async fn run(
    config: Config,
    paths: Paths,
    socket_path: PathBuf,
) -> Result<(), Box<dyn std::error::Error>> {
    let api_url = config.api_url()?;
    let policy = RequestPolicy {
        timeout: config.request_timeout(),
    };

    let registry = WorkerRegistry::new();
    let keyring = Arc::new(FileKeyring::load(&paths.keyring_file())?);
    let http = Arc::new(HttpApiClient::new(api_url.clone()));
    let bridge = Arc::new(BrowserBridge::new(registry.clone()));
    let verifier = ServerVerifier::new(http.clone(), keyring.clone(), bridge.clone());

    let ctx = BackgroundContext::new(
        UserSession::new(api_url.clone()),
        registry,
        http,
        bridge.clone(),
        bridge,
        keyring,
        verifier,
        policy,
    );

    info!(
        api_url = %api_url,
        socket = %socket_path.display(),
        timeout_ms = config.request_timeout_ms,
        "Starting background"
    );

    let host = BackgroundHost::new(ctx, socket_path);
    let serving = host.run();
    tokio::pin!(serving);
    tokio::select! {
        result = &mut serving => result?,
        _ = tokio::signal::ctrl_c() => {
            info!("Interrupted, shutting down");
            host.shutdown();
            serving.await?;
        }
    }

    Ok(())
}
