//! Command-line and environment configuration, plus logging setup.

use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;

use clap::Parser;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

const DEFAULT_FILTER: &str = "pushgate=info";
const DEV_FILTER: &str = "pushgate=debug";

#[derive(Debug, Clone, Parser)]
#[command(name = "pushgate", version, about = "Web Push relay for browser clients")]
pub struct Config {
    /// Interface to listen on.
    #[arg(long, env = "PUSHGATE_HOST", default_value = "0.0.0.0")]
    pub host: IpAddr,

    /// Port to listen on.
    #[arg(long, short, env = "PUSHGATE_PORT", default_value_t = 8000)]
    pub port: u16,

    /// Tokio worker threads. Defaults to one per core.
    #[arg(long, env = "PUSHGATE_WORKERS")]
    pub workers: Option<usize>,

    /// Human-readable debug logs instead of JSON lines.
    #[arg(long, env = "PUSHGATE_DEV")]
    pub dev: bool,

    /// Directory holding one file per registered subscription.
    #[arg(long, env = "PUSHGATE_DB_PATH", default_value = "./tokens")]
    pub db_path: PathBuf,

    /// VAPID private key (PKCS#8 PEM). Generated if missing.
    #[arg(long, env = "PUSHGATE_KEY_PATH", default_value = "./private_key.pem")]
    pub key_path: PathBuf,

    /// Static client files served for unrouted GET requests.
    #[arg(long, env = "PUSHGATE_PUBLIC_DIR", default_value = "./public")]
    pub public_dir: PathBuf,

    /// Contact URI sent to push services in the VAPID `sub` claim.
    #[arg(long, env = "PUSHGATE_VAPID_SUBJECT", default_value = "mailto:admin@localhost")]
    pub vapid_subject: String,

    /// Path prefix whose responses use the JSON envelope.
    #[arg(long, env = "PUSHGATE_API_PREFIX", default_value = "/api")]
    pub api_prefix: String,
}

impl Config {
    pub fn socket_addr(&self) -> SocketAddr {
        SocketAddr::new(self.host, self.port)
    }
}

/// Installs the global subscriber. `RUST_LOG` wins over the defaults.
pub fn init_tracing(dev: bool) {
    let default = if dev { DEV_FILTER } else { DEFAULT_FILTER };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));

    // An already-installed subscriber (tests, embedding) is kept.
    let registry = tracing_subscriber::registry().with(filter);
    if dev {
        registry.with(fmt::layer().pretty()).try_init().ok();
    } else {
        registry.with(fmt::layer().json().with_current_span(false)).try_init().ok();
    }
}
