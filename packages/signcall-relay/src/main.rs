//! `signcall-relay` binary: parse flags, set up logging, serve.

use clap::Parser;

use signcall_relay::{router, RelayConfig, RelayState};

// ── CLI Arguments ─────────────────────────────────────────────────────────────

#[derive(Parser, Debug)]
#[command(name = "signcall-relay", version, about = "SignCall signaling relay server")]
struct Args {
    /// Port to listen on
    #[arg(short, long, default_value_t = 4000, env = "RELAY_PORT")]
    port: u16,

    /// Address to bind
    #[arg(long, default_value = "0.0.0.0", env = "RELAY_HOST")]
    host: String,

    /// Emit logs as JSON lines
    #[arg(long, env = "RELAY_LOG_JSON")]
    log_json: bool,
}

impl Args {
    fn config(&self) -> RelayConfig {
        RelayConfig {
            host: self.host.clone(),
            port: self.port,
        }
    }
}

// ── Entry Point ───────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() {
    let args = Args::parse();
    init_tracing(args.log_json);

    let config = args.config();
    let addr = config.bind_addr();
    let app = router(RelayState::new(config));

    tracing::info!("SignCall relay server starting on {}", addr);

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .expect("Failed to bind address");

    axum::serve(listener, app).await.expect("Server error");
}

fn init_tracing(json: bool) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "signcall_relay=info,tower_http=info".into());

    if json {
        tracing_subscriber::fmt().json().with_env_filter(filter).init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
