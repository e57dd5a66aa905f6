//! clawlink - device-side gateway link
//!
//! Keeps this device connected to a gateway, answers basic invocations and
//! logs incoming user messages.

use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::Context;
use clap::{Parser, Subcommand};
use clawlink::{
    AuthMode, ClientProfile, ConnectionStatus, Endpoint, GatewayEngine, IdentityStore,
    InvokeRequest, JsonFilePersistence, LinkFileConfig, Transport, WsTransport,
};
use serde_json::{json, Value};
use tokio::sync::mpsc;
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

const TICK_INTERVAL: Duration = Duration::from_millis(50);
const COMMAND_PING: &str = "system.ping";
const COMMAND_INFO: &str = "system.info";

#[derive(Parser)]
#[command(name = "clawlink")]
#[command(about = "Device-side gateway link")]
#[command(version)]
struct Cli {
    /// Directory holding the device identity and the saved gateway config
    #[arg(long, global = true, env = "CLAWLINK_STATE_DIR")]
    state_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Connect to the gateway and stay connected
    Run {
        /// Path to config file
        #[arg(short, long, env = "CLAWLINK_CONFIG")]
        config: Option<PathBuf>,

        /// Gateway WebSocket URL (overrides the config file)
        #[arg(long, env = "CLAWLINK_GATEWAY_URL")]
        url: Option<String>,

        /// Shared gateway token
        #[arg(long, env = "CLAWLINK_GATEWAY_TOKEN", hide_env_values = true)]
        token: Option<String>,

        /// Shared gateway password (selects password auth)
        #[arg(long, env = "CLAWLINK_GATEWAY_PASSWORD", hide_env_values = true)]
        password: Option<String>,

        /// Authenticate with the shared credential before trying the device token
        #[arg(long)]
        prefer_shared: bool,

        /// Discard the stored device identity and create a new one
        #[arg(long)]
        reset_identity: bool,
    },

    /// Generate a sample config file
    InitConfig {
        /// Path to write config
        #[arg(short, long, default_value = "clawlink.json")]
        output: PathBuf,

        /// Gateway URL
        #[arg(long, default_value = "wss://localhost:18789")]
        gateway: String,
    },

    /// Print the device id, creating the identity if needed
    Identity,

    /// Check a gateway URL and show how it resolves
    ParseUrl {
        /// URL to parse
        url: String,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(EnvFilter::from_default_env().add_directive("clawlink=info".parse()?))
        .init();

    let cli = Cli::parse();
    let state_dir = cli.state_dir.unwrap_or_else(default_state_dir);

    match cli.command {
        Commands::Run {
            config,
            url,
            token,
            password,
            prefer_shared,
            reset_identity,
        } => {
            let overrides = Overrides {
                url,
                token,
                password,
                prefer_shared,
                reset_identity,
            };
            run_link(&state_dir, config.as_deref(), overrides).await?;
        }

        Commands::InitConfig { output, gateway } => {
            init_config(&output, gateway)?;
        }

        Commands::Identity => {
            show_identity(&state_dir)?;
        }

        Commands::ParseUrl { url } => {
            parse_url(&url)?;
        }
    }

    Ok(())
}

fn default_state_dir() -> PathBuf {
    dirs::data_local_dir()
        .map(|d| d.join("clawlink"))
        .unwrap_or_else(|| PathBuf::from(".clawlink"))
}

fn host_name() -> String {
    hostname::get()
        .map(|h| h.to_string_lossy().to_string())
        .unwrap_or_else(|_| "unknown".to_string())
}

struct Overrides {
    url: Option<String>,
    token: Option<String>,
    password: Option<String>,
    prefer_shared: bool,
    reset_identity: bool,
}

impl Overrides {
    fn apply(self, file: &mut LinkFileConfig) -> bool {
        let gateway = &mut file.gateway;
        let mut touched = false;
        if let Some(url) = self.url {
            gateway.url = url;
            touched = true;
        }
        if let Some(token) = self.token {
            gateway.token = token;
            gateway.auth_mode = AuthMode::Token;
            touched = true;
        }
        if let Some(password) = self.password {
            gateway.password = password;
            gateway.auth_mode = AuthMode::Password;
            touched = true;
        }
        if self.prefer_shared {
            gateway.prefer_shared_credential = true;
            touched = true;
        }
        if self.reset_identity {
            gateway.reset_device_identity = true;
            touched = true;
        }
        touched
    }
}

async fn run_link(
    state_dir: &Path,
    config_path: Option<&Path>,
    overrides: Overrides,
) -> anyhow::Result<()> {
    let mut file = match config_path {
        Some(path) => LinkFileConfig::from_file(path)?,
        None => LinkFileConfig::default(),
    };
    let from_file = file.gateway.has_url();
    let overridden = overrides.apply(&mut file);
    file.validate()?;

    let display_name = file.display_name.clone().unwrap_or_else(host_name);
    let profile = ClientProfile {
        display_name: display_name.clone(),
        caps: vec!["system".to_string()],
        commands: vec![COMMAND_PING.to_string(), COMMAND_INFO.to_string()],
        ..ClientProfile::default()
    };
    let settings = file.engine_settings(profile);

    info!(
        state_dir = %state_dir.display(),
        display_name = %display_name,
        "starting clawlink"
    );

    let persistence = JsonFilePersistence::new(state_dir);
    let transport = WsTransport::current()?;
    let mut engine = GatewayEngine::new(transport, persistence, settings);

    if from_file || overridden {
        engine.configure(file.gateway.clone());
    }
    engine
        .connect_now()
        .context("no usable gateway url; pass --url or a config file")?;

    let (invoke_tx, mut invoke_rx) = mpsc::unbounded_channel::<InvokeRequest>();
    engine.set_invoke_request_handler(move |request| {
        let _ = invoke_tx.send(request.clone());
    });

    let started = Instant::now();
    let received = Arc::new(AtomicU64::new(0));
    let received_for_telemetry = Arc::clone(&received);
    engine.set_telemetry_builder(move |payload| {
        payload.insert(
            "uptimeMs".to_string(),
            json!(started.elapsed().as_millis() as u64),
        );
        payload.insert(
            "messagesReceived".to_string(),
            json!(received_for_telemetry.load(Ordering::Relaxed)),
        );
        payload.insert("platform".to_string(), json!(std::env::consts::OS));
    });

    drive_link(
        &mut engine,
        &mut invoke_rx,
        &received,
        started,
        tokio::signal::ctrl_c(),
    )
    .await;

    engine.disconnect_now();
    Ok(())
}

/// Tick the engine until `shutdown` resolves.
///
/// `shutdown` is created once and polled across iterations, so a signal that
/// lands while the engine is busy is still seen on the next pass.
async fn drive_link<T, F>(
    engine: &mut GatewayEngine<T, JsonFilePersistence>,
    invoke_rx: &mut mpsc::UnboundedReceiver<InvokeRequest>,
    received: &AtomicU64,
    started: Instant,
    shutdown: F,
) where
    T: Transport,
    F: Future,
{
    let mut ticker = tokio::time::interval(TICK_INTERVAL);
    let mut last_status = engine.status();
    log_status(&last_status);

    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            _ = ticker.tick() => {}
            _ = &mut shutdown => {
                info!("shutting down");
                break;
            }
        }

        engine.tick();

        while let Ok(request) = invoke_rx.try_recv() {
            answer_invocation(engine, &request, started);
        }

        for message in engine.inbox().iter() {
            info!(
                event = %message.event,
                id = %message.id,
                from = %message.from,
                kind = %message.kind,
                text = %message.text,
                "message received"
            );
        }
        if engine.inbox_count() > 0 {
            received.fetch_add(engine.inbox_count() as u64, Ordering::Relaxed);
            engine.clear_inbox();
        }

        let status = engine.status();
        if status.state != last_status.state || status.last_error != last_status.last_error {
            log_status(&status);
            last_status = status;
        }
    }
}

fn log_status(status: &ConnectionStatus) {
    if status.last_error.is_empty() {
        info!(state = %status.state, ready = status.gateway_ready, "link status");
    } else {
        warn!(
            state = %status.state,
            ready = status.gateway_ready,
            tls_fail_streak = status.tls_fail_streak,
            last_error = %status.last_error,
            "link status"
        );
    }
}

fn answer_invocation<T: Transport>(
    engine: &mut GatewayEngine<T, JsonFilePersistence>,
    request: &InvokeRequest,
    started: Instant,
) {
    info!(invoke_id = %request.invoke_id, command = %request.command, "invocation");

    let payload: Option<Value> = match request.command.as_str() {
        COMMAND_PING => Some(json!({
            "pong": true,
            "echo": request.params,
        })),
        COMMAND_INFO => Some(json!({
            "hostname": host_name(),
            "platform": std::env::consts::OS,
            "arch": std::env::consts::ARCH,
            "version": env!("CARGO_PKG_VERSION"),
            "uptimeMs": started.elapsed().as_millis() as u64,
            "deviceId": engine.identity().map(|i| i.device_id.clone()),
        })),
        _ => None,
    };

    let result = match payload {
        Some(payload) => engine.send_invoke_ok(&request.invoke_id, &request.node_id, payload),
        None => engine.send_invoke_error(
            &request.invoke_id,
            &request.node_id,
            "UNSUPPORTED_COMMAND",
            &format!("unknown command: {}", request.command),
        ),
    };
    if let Err(e) = result {
        error!(invoke_id = %request.invoke_id, error = %e, "failed to answer invocation");
    }
}

fn init_config(output: &Path, gateway: String) -> anyhow::Result<()> {
    let mut config = LinkFileConfig {
        display_name: Some(host_name()),
        ..LinkFileConfig::default()
    };
    config.gateway.url = gateway;
    config.validate()?;
    config.write_to(output)?;

    println!("Config written to {}", output.display());
    println!();
    println!("Edit the file to add your gateway token, then run:");
    println!("  clawlink run --config {}", output.display());

    Ok(())
}

fn show_identity(state_dir: &Path) -> anyhow::Result<()> {
    let mut persistence = JsonFilePersistence::new(state_dir);
    let mut store = IdentityStore::restore(&persistence);
    let identity = store.ensure(&mut persistence)?;

    println!("Device id: {}", identity.device_id);
    println!("State dir: {}", state_dir.display());

    Ok(())
}

fn parse_url(raw: &str) -> anyhow::Result<()> {
    let endpoint = Endpoint::parse(raw)?;

    println!("Scheme: {}", endpoint.scheme());
    println!("Secure: {}", endpoint.secure);
    println!("Host:   {}", endpoint.host);
    println!("Port:   {}", endpoint.port);
    println!("Path:   {}", endpoint.path);
    println!("URL:    {}", endpoint.to_url());

    Ok(())
}
