//! # hrpc CLI Entry Point
//!
//! ## Usage
//!
//! ```bash
//! # Host the Echo service
//! hrpc serve -b 0.0.0.0:9000
//!
//! # Call it (prints the raw string result)
//! hrpc call Echo say -r Echo=127.0.0.1:9000 -p hello
//! hrpc call Echo concat -r Echo=127.0.0.1:9000 -p foo -p bar
//!
//! # Meet through a shared route file instead of explicit routes
//! hrpc serve --registry /tmp/hrpc.routes
//! hrpc call Echo upper --registry /tmp/hrpc.routes -p loud
//! ```

use anyhow::{Context, Result};
use argh::FromArgs;
use hrpc_client::HrpcClient;
use hrpc_common::config::{ClientConfig, ServerConfig};
use hrpc_common::registry::{FileRegistry, ServiceRegistry, StaticRegistry};
use hrpc_common::transport::{PayloadCodec, DEFAULT_MAX_FRAME_SIZE};
use hrpc_common::Request;
use hrpc_server::{Dispatcher, RpcServer};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

/// Main CLI structure parsed from command-line arguments.
#[derive(FromArgs)]
/// hrpc - remote procedure calls over multiplexed TCP connections
struct Cli {
    #[argh(subcommand)]
    command: Commands,
}

#[derive(FromArgs)]
#[argh(subcommand)]
enum Commands {
    Serve(ServeArgs),
    Call(CallArgs),
}

/// Arguments for hosting the built-in Echo service.
///
/// # Example
///
/// ```bash
/// hrpc serve -b 0.0.0.0:9000 --advertise 10.0.0.5:9000 --format json
/// ```
#[derive(FromArgs)]
#[argh(subcommand, name = "serve")]
/// host the built-in Echo service
struct ServeArgs {
    /// address to listen on
    ///
    /// Defaults to "127.0.0.1:0" which assigns a random available port.
    /// The actual bound address is logged at startup.
    #[argh(option, short = 'b', default = "\"127.0.0.1:0\".into()")]
    bind: String,

    /// address to advertise for this server (defaults to the bound address)
    #[argh(option, long = "advertise")]
    advertise: Option<String>,

    /// payload format: postcard (default) or json; clients must match
    #[argh(option, long = "format", default = "PayloadCodec::default()")]
    format: PayloadCodec,

    /// largest accepted frame in bytes (default 16 MB)
    #[argh(option, long = "max-frame-size", default = "DEFAULT_MAX_FRAME_SIZE")]
    max_frame_size: usize,

    /// number of runtime worker threads (defaults to the number of cores)
    #[argh(option, long = "worker-threads")]
    worker_threads: Option<usize>,

    /// route file to publish the served services into
    ///
    /// Without it the server is only reachable through explicit routes.
    #[argh(option, long = "registry")]
    registry: Option<PathBuf>,
}

/// Arguments for making a single call.
///
/// Every parameter is sent as a string and the result is expected to be a
/// string, which is printed to stdout. Errors go to stderr with a non-zero
/// exit code.
///
/// # Examples
///
/// ```bash
/// hrpc call Echo ping -r Echo=127.0.0.1:9000
/// hrpc call Echo upper -r Echo=127.0.0.1:9000 -p shout | tr A-Z a-z
/// ```
#[derive(FromArgs)]
#[argh(subcommand, name = "call")]
/// call a method on a service
struct CallArgs {
    /// name of the service
    #[argh(positional)]
    service: String,

    /// name of the method
    #[argh(positional)]
    method: String,

    /// where a service lives, as Service=host:port (repeatable)
    #[argh(option, short = 'r', long = "route")]
    routes: Vec<String>,

    /// route file written by `hrpc serve --registry`, used instead of --route
    #[argh(option, long = "registry")]
    registry: Option<PathBuf>,

    /// string parameter, in order (repeatable)
    #[argh(option, short = 'p', long = "param")]
    params: Vec<String>,

    /// call timeout in milliseconds
    #[argh(option, long = "timeout-ms", default = "30000")]
    timeout_ms: u64,

    /// payload format: postcard (default) or json
    #[argh(option, long = "format", default = "PayloadCodec::default()")]
    format: PayloadCodec,
}

fn main() -> Result<()> {
    let cli: Cli = argh::from_env();

    // Keep `call` output clean for piping.
    if !matches!(cli.command, Commands::Call(_)) {
        let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
        tracing_subscriber::fmt().with_env_filter(env_filter).init();
    }

    let mut runtime = tokio::runtime::Builder::new_multi_thread();
    runtime.enable_all();
    if let Commands::Serve(ServeArgs {
        worker_threads: Some(threads),
        ..
    }) = &cli.command
    {
        runtime.worker_threads((*threads).max(1));
    }
    let runtime = runtime.build().context("Failed to start the tokio runtime")?;

    runtime.block_on(async move {
        match cli.command {
            Commands::Serve(args) => run_serve(args).await,
            Commands::Call(args) => run_call(args).await,
        }
    })
}

fn server_config(args: &ServeArgs) -> ServerConfig {
    let mut config = ServerConfig::new(&args.bind)
        .with_format(args.format)
        .with_max_frame_size(args.max_frame_size);
    if let Some(advertise) = &args.advertise {
        config = config.with_advertised_addr(advertise);
    }
    config
}

/// Executes the `serve` subcommand until Ctrl-C.
async fn run_serve(args: ServeArgs) -> Result<()> {
    let dispatcher = Dispatcher::builder()
        .service(hrpc_cli::echo::binding())
        .build();
    let server = RpcServer::bind(server_config(&args), dispatcher).await?;

    if let Some(path) = &args.registry {
        server
            .publish(&FileRegistry::new(path))
            .await
            .with_context(|| format!("Failed to publish services to {}", path.display()))?;
    }

    tracing::info!(
        advertised = %server.advertised_addr(),
        services = ?server.dispatcher().service_names(),
        "Serving"
    );

    server
        .run_until(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!(error = %e, "Failed to listen for Ctrl-C");
                std::future::pending::<()>().await;
            }
            tracing::info!("Shutting down");
        })
        .await?;

    Ok(())
}

fn client_config(args: &CallArgs) -> ClientConfig {
    ClientConfig::default()
        .with_call_timeout(Duration::from_millis(args.timeout_ms))
        .with_format(args.format)
        .with_registry_ttl(None)
}

/// Picks where `call` looks services up: a route file or explicit routes.
fn call_registry(args: &CallArgs) -> Result<Arc<dyn ServiceRegistry>> {
    match &args.registry {
        Some(_) if !args.routes.is_empty() => {
            anyhow::bail!("--route and --registry cannot be combined")
        }
        Some(path) => Ok(Arc::new(FileRegistry::new(path))),
        None => Ok(Arc::new(StaticRegistry::from_routes(&args.routes)?)),
    }
}

/// Executes the `call` subcommand.
///
/// No tracing is initialized for this command; the result alone goes to
/// stdout.
async fn run_call(args: CallArgs) -> Result<()> {
    let registry = call_registry(&args)?;
    let config = client_config(&args);
    let codec = config.format;
    let client = HrpcClient::new(registry, config);

    let mut request = Request::new(&args.service, &args.method);
    for param in &args.params {
        request = request.push_parameter("string", codec.serialize(param)?);
    }

    let result = client
        .call(request)
        .await
        .with_context(|| format!("{}.{} failed", args.service, args.method))?;
    let text: String = codec
        .deserialize(&result)
        .context("Result is not a string")?;
    println!("{}", text);

    Ok(())
}
