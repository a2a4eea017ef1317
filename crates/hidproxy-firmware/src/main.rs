//! `hid-proxy`: runs the keystroke pipeline on a workstation.
//!
//! Lines typed on stdin play the physical keyboard; the reports that would
//! reach the host computer are logged.  Flash lives in an image file so the
//! password and macros survive restarts.
//!
//! # Architecture
//!
//! ```text
//! main()
//!  └─ load_config()           -- hid-proxy.toml, defaults if absent
//!  └─ FileDevice -> LogStore -> KvStore -> MacroStore
//!  └─ spawn
//!       ├─ UpstreamExecutor   (executor U: StdinHost)
//!       ├─ Pipeline           (executor D: ConsoleDevice, NFC, MQTT)
//!       └─ run_server         (bulk macro HTTP service, if enabled)
//! ```
//!
//! # Environment variable overrides
//!
//! | Variable          | Default               |
//! |-------------------|-----------------------|
//! | `HIDPROXY_CONFIG` | `hid-proxy.toml`      |
//! | `HIDPROXY_IMAGE`  | `[storage].image_path`|
//! | `RUST_LOG`        | `[device].log_level`  |

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};
use std::time::Instant;

use anyhow::Context;
use clap::Parser;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use hidproxy_firmware::application::diagnostics::Counters;
use hidproxy_firmware::application::macro_store::MacroStore;
use hidproxy_firmware::application::pipeline::{Pipeline, PipelineConfig};
use hidproxy_firmware::application::upstream::UpstreamExecutor;
use hidproxy_firmware::infrastructure::kvstore::{FileDevice, KvStore, LogStore};
use hidproxy_firmware::infrastructure::mqtt::LoggingPublisher;
use hidproxy_firmware::infrastructure::queues::Queues;
use hidproxy_firmware::infrastructure::storage::config::{load_config, AppConfig};
use hidproxy_firmware::infrastructure::usb::sim::{ConsoleDevice, StdinHost};
use hidproxy_web::application::DeviceHandle;
use hidproxy_web::domain::WebConfig;
use hidproxy_web::infrastructure::run_server;

// ── CLI argument definitions ──────────────────────────────────────────────────

#[derive(Debug, Parser)]
#[command(
    name = "hid-proxy",
    about = "USB keyboard proxy with encrypted keystroke macros (workstation simulation)",
    version
)]
struct Cli {
    /// Path to the TOML configuration file.  A missing file means defaults.
    #[arg(long, default_value = "hid-proxy.toml", env = "HIDPROXY_CONFIG")]
    config: PathBuf,

    /// Flash image file; overrides `[storage].image_path`.
    #[arg(long, env = "HIDPROXY_IMAGE")]
    image: Option<PathBuf>,

    /// Serve the bulk macro HTTP service even if `[web].enabled` is false.
    #[arg(long)]
    web: bool,
}

impl Cli {
    /// Loads the configuration file and applies the command-line overrides.
    fn into_app_config(self) -> anyhow::Result<AppConfig> {
        let mut config = load_config(&self.config)
            .with_context(|| format!("loading {}", self.config.display()))?;
        if let Some(image) = self.image {
            config.storage.image_path = image;
        }
        if self.web {
            config.web.enabled = true;
        }
        Ok(config)
    }
}

fn web_config(config: &AppConfig) -> anyhow::Result<WebConfig> {
    let bind_addr: SocketAddr = config
        .web
        .bind_address
        .parse()
        .with_context(|| format!("invalid web bind address: '{}'", config.web.bind_address))?;
    Ok(WebConfig {
        bind_addr,
        ..WebConfig::default()
    })
}

// ── Entry point ───────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Cli::parse().into_app_config()?;

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(&config.device.log_level)),
        )
        .init();

    info!(
        id = %config.device.id,
        image = %config.storage.image_path.display(),
        "hid-proxy starting"
    );

    let device = FileDevice::open(
        &config.storage.image_path,
        config.storage.region_size,
        config.storage.block_size,
    )
    .with_context(|| format!("opening {}", config.storage.image_path.display()))?;
    let log = LogStore::mount(Box::new(device)).context("mounting key/value store")?;
    let store = MacroStore::new(KvStore::new(log));

    let running = Arc::new(AtomicBool::new(true));
    let queues = Arc::new(Queues::new());
    let counters = Counters::new();

    let mut pipeline = Pipeline::new(
        Box::new(ConsoleDevice::new()),
        Arc::clone(&queues),
        store,
        Arc::clone(&counters),
        PipelineConfig::from_config(&config)?,
        Instant::now(),
    );
    if config.mqtt.enabled {
        pipeline = pipeline.with_mqtt(Arc::new(LoggingPublisher));
    }

    // ── Web service ───────────────────────────────────────────────────────────
    let web = if config.web.enabled {
        let web_config = web_config(&config)?;
        let (handle, rx) = DeviceHandle::channel(web_config.request_queue);
        pipeline = pipeline.with_web(rx);
        let running = Arc::clone(&running);
        Some(tokio::spawn(async move {
            if let Err(e) = run_server(web_config, Arc::new(handle), running).await {
                error!("web service failed: {e:#}");
            }
        }))
    } else {
        None
    };

    // ── Executors ─────────────────────────────────────────────────────────────
    let upstream = UpstreamExecutor::new(StdinHost::spawn(), Arc::clone(&queues), counters);
    let exec_u = tokio::spawn(upstream.run(Arc::clone(&running)));
    let exec_d = tokio::spawn(pipeline.run(Arc::clone(&running)));

    // ── Ctrl-C handler ────────────────────────────────────────────────────────
    let running_clone = Arc::clone(&running);
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                info!("shutdown signal received");
                running_clone.store(false, Ordering::Relaxed);
            }
            Err(e) => error!("failed to listen for Ctrl+C signal: {e}"),
        }
    });

    info!("hid-proxy ready; type reports on stdin, Ctrl-C to exit");

    exec_u.await.context("executor U panicked")?;
    exec_d.await.context("executor D panicked")?;
    if let Some(web) = web {
        web.await.context("web service panicked")?;
    }

    info!("hid-proxy stopped");
    Ok(())
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_defaults() {
        // Arrange / Act
        let cli = Cli::parse_from(["hid-proxy"]);

        // Assert
        assert_eq!(cli.config, PathBuf::from("hid-proxy.toml"));
        assert!(cli.image.is_none());
        assert!(!cli.web);
    }

    #[test]
    fn test_cli_overrides_reach_the_config() {
        // Arrange
        let dir = tempfile::tempdir().unwrap();
        let config_path = dir.path().join("absent.toml");
        let cli = Cli::parse_from([
            "hid-proxy",
            "--config",
            config_path.to_str().unwrap(),
            "--image",
            "/tmp/other.img",
            "--web",
        ]);

        // Act
        let config = cli.into_app_config().unwrap();

        // Assert
        assert_eq!(config.storage.image_path, PathBuf::from("/tmp/other.img"));
        assert!(config.web.enabled);
        assert_eq!(config.device.id, AppConfig::default().device.id);
    }

    #[test]
    fn test_web_config_rejects_bad_bind_address() {
        let mut config = AppConfig::default();
        config.web.bind_address = "not-an-address".to_string();
        assert!(web_config(&config).is_err());
    }

    #[test]
    fn test_web_config_uses_configured_port() {
        let mut config = AppConfig::default();
        config.web.bind_address = "127.0.0.1:9090".to_string();
        assert_eq!(web_config(&config).unwrap().bind_addr.port(), 9090);
    }
}
