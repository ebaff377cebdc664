//! Registry Rewriter - Pod image registry mutating webhook

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::{Args, Parser, Subcommand};
use kube::Client;
use tokio_util::sync::CancellationToken;

use registry_rewriter::manifest::WebhookManifestConfig;
use registry_rewriter::namespace::KubeNamespaceLookup;
use registry_rewriter::policy::MutationPolicy;
use registry_rewriter::server::{start_server, ServerConfig};
use registry_rewriter::telemetry::{init_telemetry, LogFormat, TelemetryConfig};
use registry_rewriter::webhook::WebhookState;

/// Registry Rewriter - redirect Pod images to a per-namespace registry
#[derive(Parser, Debug)]
#[command(name = "registry-rewriter", version, about, long_about = None)]
struct Cli {
    /// Log output format
    #[arg(
        long,
        env = "REWRITER_LOG_FORMAT",
        value_enum,
        default_value_t = LogFormat::Json,
        global = true
    )]
    log_format: LogFormat,

    #[command(flatten)]
    serve: ServeArgs,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Serve the admission webhook (default mode)
    Serve,

    /// Print the Service and webhook configuration manifests
    WebhookConfig(WebhookConfigArgs),
}

/// Serve mode arguments
#[derive(Args, Debug)]
struct ServeArgs {
    /// Address the HTTPS server binds to
    #[arg(long, env = "REWRITER_LISTEN_ADDR", default_value = "0.0.0.0:9443", global = true)]
    listen_addr: SocketAddr,

    /// Serving certificate (PEM)
    #[arg(
        long,
        env = "REWRITER_TLS_CERT_FILE",
        default_value = "/tmp/k8s-webhook-server/serving-certs/tls.crt",
        global = true
    )]
    tls_cert_file: PathBuf,

    /// Serving certificate private key (PEM)
    #[arg(
        long,
        env = "REWRITER_TLS_KEY_FILE",
        default_value = "/tmp/k8s-webhook-server/serving-certs/tls.key",
        global = true
    )]
    tls_key_file: PathBuf,

    /// Seconds to wait for a namespace lookup before admitting unchanged
    #[arg(
        long,
        env = "REWRITER_LOOKUP_TIMEOUT_SECS",
        default_value = "5",
        global = true
    )]
    lookup_timeout_secs: u64,
}

/// Manifest generation arguments
#[derive(Parser, Debug)]
struct WebhookConfigArgs {
    /// Name of the Service fronting the webhook
    #[arg(long, default_value = "registry-rewriter-webhook")]
    service_name: String,

    /// Namespace the webhook is deployed in
    #[arg(long, default_value = "registry-rewriter-system")]
    service_namespace: String,

    /// Port the webhook container listens on
    #[arg(long, default_value_t = registry_rewriter::DEFAULT_WEBHOOK_PORT)]
    target_port: u16,

    /// CA bundle (PEM) used by the API server to verify the webhook
    #[arg(long)]
    ca_bundle_file: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    if let Err(e) = rustls::crypto::aws_lc_rs::default_provider().install_default() {
        eprintln!("CRITICAL: Failed to install crypto provider: {:?}", e);
        std::process::exit(1);
    }

    let cli = Cli::parse();

    init_telemetry(&TelemetryConfig {
        format: cli.log_format,
        filter: None,
    })?;

    match cli.command {
        Some(Commands::WebhookConfig(args)) => print_webhook_config(args).await,
        Some(Commands::Serve) | None => run_webhook(cli.serve).await,
    }
}

/// Serve the webhook until SIGINT/SIGTERM
async fn run_webhook(args: ServeArgs) -> anyhow::Result<()> {
    let client = Client::try_default()
        .await
        .map_err(|e| anyhow::anyhow!("Failed to create Kubernetes client: {}", e))?;

    let policy = MutationPolicy::new(Duration::from_secs(args.lookup_timeout_secs));
    let state = WebhookState::new(Arc::new(KubeNamespaceLookup::new(client)), policy);

    let config = ServerConfig {
        addr: args.listen_addr,
        cert_path: args.tls_cert_file,
        key_path: args.tls_key_file,
    };

    let shutdown = CancellationToken::new();
    tokio::spawn(cancel_on_signal(shutdown.clone()));

    start_server(config, state, shutdown).await?;
    tracing::info!("Webhook server stopped");
    Ok(())
}

/// Print manifests registering this webhook with the API server
async fn print_webhook_config(args: WebhookConfigArgs) -> anyhow::Result<()> {
    let ca_bundle = match &args.ca_bundle_file {
        Some(path) => Some(
            tokio::fs::read(path)
                .await
                .map_err(|e| anyhow::anyhow!("Failed to read CA bundle {:?}: {}", path, e))?,
        ),
        None => None,
    };

    let config = WebhookManifestConfig {
        service_name: args.service_name,
        service_namespace: args.service_namespace,
        target_port: args.target_port,
        ca_bundle,
    };
    println!("{}", config.render_yaml()?);
    Ok(())
}

async fn cancel_on_signal(shutdown: CancellationToken) {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for SIGINT");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
    shutdown.cancel();
}
