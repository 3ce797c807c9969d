use anyhow::Result;
use clap::Parser;
use dotenv::dotenv;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use application::DeviceManager;
use domain::DeviceEvent;
use domain::event::EventPublisher;
use infrastructure::config::AgentConfig;
use infrastructure::messaging::{
    BroadcastEventPublisher, CompositeEventPublisher, LogEventPublisher,
};
use infrastructure::{ConnectorRegistry, EmulatorServer, MewtocolEmulator};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to config directory
    #[arg(long, default_value = "config")]
    config_dir: String,

    /// Override Agent ID
    #[arg(long)]
    agent_id: Option<String>,

    /// Start the Mewtocol emulator on this address (overrides config)
    #[arg(long)]
    emulator_bind: Option<String>,
}

async fn run() -> Result<()> {
    dotenv().ok();

    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG")
                .unwrap_or_else(|_| "info,device_agent=debug,application=debug".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("🤖 Device Agent Starting...");
    info!("🆔 Process ID: {}", std::process::id());

    let args = Args::parse();

    // 1. Load Configuration
    info!(config_dir = %args.config_dir, "Loading configuration...");
    let mut config = AgentConfig::load(&args.config_dir)?;

    if let Some(id) = args.agent_id {
        config.agent_id = id;
    }
    if let Some(bind) = args.emulator_bind {
        let mut emulator = config.emulator.take().unwrap_or_default();
        emulator.bind = bind;
        config.emulator = Some(emulator);
    }

    info!(
        "✅ Loaded configuration for Agent: {} ({} device(s))",
        config.agent_id,
        config.devices.len()
    );

    // 2. Optional local emulator, up before any device dials it
    let emulator = match &config.emulator {
        Some(emulator_config) => {
            let server = EmulatorServer::bind(
                &emulator_config.bind,
                MewtocolEmulator::new(emulator_config.register_words),
            )
            .await?;
            info!(addr = %server.local_addr(), "🧪 Mewtocol emulator listening");
            Some(server)
        }
        None => None,
    };

    // 3. Event fan-out: log every event, broadcast for in-process consumers
    let broadcast = Arc::new(BroadcastEventPublisher::new(256));
    let sinks: Vec<Arc<dyn EventPublisher>> = vec![Arc::new(LogEventPublisher), broadcast.clone()];
    let publisher: Arc<dyn EventPublisher> = Arc::new(CompositeEventPublisher::new(sinks));

    let mut scans = broadcast.subscribe();
    let scan_handle = tokio::spawn(async move {
        while let Ok(event) = scans.recv().await {
            if let DeviceEvent::SnReceived {
                device_id,
                serial_number,
                ..
            } = event
            {
                info!(device_id = %device_id, "📦 Serial number {}", serial_number);
            }
        }
    });

    // 4. Devices
    let manager = Arc::new(DeviceManager::new(
        ConnectorRegistry::with_defaults(),
        publisher,
    ));
    let started = manager
        .start_devices(config.enabled_devices().cloned().collect())
        .await;
    info!("📋 Started {} device(s)", started.len());

    // 5. Status Loop
    let status_manager = manager.clone();
    let status_interval = config.status_interval_secs.max(1);
    let status_handle = tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_secs(status_interval));
        loop {
            interval.tick().await;
            let summary = status_manager.connection_summary();
            let online = summary.iter().filter(|(_, connected)| *connected).count();
            info!("💓 {}/{} device(s) connected", online, summary.len());
            for (device_id, _) in summary.iter().filter(|(_, connected)| !connected) {
                warn!(device_id = %device_id, "Device offline");
            }
        }
    });

    // 6. Shutdown Signal
    match tokio::signal::ctrl_c().await {
        Ok(()) => info!("🛑 Shutting down..."),
        Err(err) => warn!(error = %err, "Unable to listen for shutdown signal"),
    }

    status_handle.abort();
    manager.stop_all().await;
    scan_handle.abort();
    if let Some(server) = emulator {
        server.shutdown().await;
    }

    info!("👋 Good bye!");
    Ok(())
}

fn main() {
    let rt = match tokio::runtime::Runtime::new() {
        Ok(rt) => rt,
        Err(e) => {
            eprintln!("❌ Failed to start runtime: {}", e);
            std::process::exit(1);
        }
    };
    if let Err(e) = rt.block_on(run()) {
        eprintln!("\n❌ CRITICAL ERROR: {:?}", e);
        std::process::exit(1);
    }
}
