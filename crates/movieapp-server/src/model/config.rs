//! Configuration management for movieapp
//!
//! Values come from `conf/application.yml` (optional), `MOVIEAPP_*`
//! environment variables and command line overrides, in increasing order of
//! precedence.

use std::path::PathBuf;
use std::time::Duration;

use clap::{Parser, ValueEnum};
use config::{Config, Environment, File};

use movieapp_common::{AUTH_SERVICE, METADATA_SERVICE, MOVIE_SERVICE, RATING_SERVICE};
use movieapp_core::{AdmissionConfig, RetryPolicy};

use crate::startup::logging::LoggingConfig;

pub const DEFAULT_CONFIG_FILE: &str = "conf/application.yml";
pub const DEFAULT_SERVER_ADDRESS: &str = "127.0.0.1";
pub const DEFAULT_TOKEN_EXPIRE_SECONDS: i64 = 18000;
pub const DEFAULT_HEARTBEAT_INTERVAL_MS: u64 = 1000;
pub const DEFAULT_REGISTRY_TTL_MS: u64 = 5000;

/// One of the four services
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ServiceKind {
    Metadata,
    Rating,
    Auth,
    Movie,
}

impl ServiceKind {
    /// Startup order: dependencies of `Movie` come first
    pub const ALL: [ServiceKind; 4] = [
        ServiceKind::Metadata,
        ServiceKind::Rating,
        ServiceKind::Auth,
        ServiceKind::Movie,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            ServiceKind::Metadata => METADATA_SERVICE,
            ServiceKind::Rating => RATING_SERVICE,
            ServiceKind::Auth => AUTH_SERVICE,
            ServiceKind::Movie => MOVIE_SERVICE,
        }
    }

    pub fn default_port(&self) -> u16 {
        match self {
            ServiceKind::Metadata => 8081,
            ServiceKind::Rating => 8082,
            ServiceKind::Movie => 8083,
            ServiceKind::Auth => 8084,
        }
    }
}

/// Which services this process runs
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ServiceTarget {
    Metadata,
    Rating,
    Movie,
    Auth,
    /// All four services in one process, sharing one registry
    All,
}

impl ServiceTarget {
    pub fn kinds(&self) -> Vec<ServiceKind> {
        match self {
            ServiceTarget::Metadata => vec![ServiceKind::Metadata],
            ServiceTarget::Rating => vec![ServiceKind::Rating],
            ServiceTarget::Movie => vec![ServiceKind::Movie],
            ServiceTarget::Auth => vec![ServiceKind::Auth],
            ServiceTarget::All => ServiceKind::ALL.to_vec(),
        }
    }
}

/// Command line arguments
#[derive(Debug, Parser)]
#[command(name = "movieapp", version, about = "movieapp gRPC services")]
pub struct Cli {
    #[arg(value_enum)]
    pub service: ServiceTarget,

    #[arg(short = 'c', long = "config", env = "MOVIEAPP_CONFIG", default_value = DEFAULT_CONFIG_FILE)]
    pub config: PathBuf,

    #[arg(short = 'a', long = "address")]
    pub address: Option<String>,

    /// Listen port; ignored with `all`
    #[arg(short = 'p', long = "port")]
    pub port: Option<u16>,
}

/// Application configuration loaded from config files and environment
#[derive(Clone, Debug, Default)]
pub struct Configuration {
    pub config: Config,
}

impl Configuration {
    pub fn from_cli(cli: &Cli) -> anyhow::Result<Self> {
        let mut builder = Config::builder()
            .add_source(File::from(cli.config.as_path()).required(false))
            .add_source(
                Environment::with_prefix("MOVIEAPP")
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            );

        if let Some(address) = &cli.address {
            builder = builder.set_override("server.address", address.as_str())?;
        }
        if let (Some(port), [kind]) = (cli.port, cli.service.kinds().as_slice()) {
            builder = builder.set_override(format!("{}.port", kind.name()), i64::from(port))?;
        }

        Ok(Configuration {
            config: builder.build()?,
        })
    }

    pub fn from_config(config: Config) -> Self {
        Configuration { config }
    }

    // ========================================================================
    // Server Configuration
    // ========================================================================

    pub fn server_address(&self) -> String {
        self.config
            .get_string("server.address")
            .unwrap_or(DEFAULT_SERVER_ADDRESS.to_string())
    }

    pub fn service_port(&self, kind: ServiceKind) -> u16 {
        self.config
            .get_int(&format!("{}.port", kind.name()))
            .ok()
            .and_then(|port| u16::try_from(port).ok())
            .unwrap_or(kind.default_port())
    }

    /// Per-service `<service>.admission.*` falls back to `admission.*`
    pub fn admission_config(&self, kind: ServiceKind) -> AdmissionConfig {
        let defaults = AdmissionConfig::default();
        let scoped = |key: &str| format!("{}.admission.{}", kind.name(), key);

        let capacity = self
            .config
            .get_int(&scoped("capacity"))
            .or_else(|_| self.config.get_int("admission.capacity"))
            .ok()
            .and_then(|v| u64::try_from(v).ok())
            .unwrap_or(defaults.capacity);
        let refill_per_second = self
            .config
            .get_int(&scoped("refill_per_second"))
            .or_else(|_| self.config.get_int("admission.refill_per_second"))
            .ok()
            .and_then(|v| u64::try_from(v).ok())
            .unwrap_or(defaults.refill_per_second);

        AdmissionConfig {
            capacity,
            refill_per_second,
        }
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        self.config
            .get_int("retry.max_attempts")
            .ok()
            .and_then(|v| u32::try_from(v).ok())
            .map(RetryPolicy::with_max_attempts)
            .unwrap_or_default()
    }

    // ========================================================================
    // Discovery Configuration
    // ========================================================================

    /// Never shorter than 1 ms; negative values fall back to the default
    pub fn heartbeat_interval(&self) -> Duration {
        let millis = self
            .config
            .get_int("discovery.heartbeat_interval_ms")
            .ok()
            .and_then(|v| u64::try_from(v).ok())
            .unwrap_or(DEFAULT_HEARTBEAT_INTERVAL_MS);
        Duration::from_millis(millis.max(1))
    }

    pub fn registry_ttl(&self) -> Duration {
        Duration::from_millis(
            self.config
                .get_int("discovery.ttl_ms")
                .ok()
                .and_then(|v| u64::try_from(v).ok())
                .unwrap_or(DEFAULT_REGISTRY_TTL_MS),
        )
    }

    /// Statically known addresses of a service, as a YAML list or a
    /// comma-separated string
    pub fn peers(&self, kind: ServiceKind) -> Vec<String> {
        let key = format!("discovery.peers.{}", kind.name());
        if let Ok(values) = self.config.get_array(&key) {
            return values
                .into_iter()
                .filter_map(|v| v.into_string().ok())
                .collect();
        }
        self.config
            .get_string(&key)
            .map(|s| {
                s.split(',')
                    .map(str::trim)
                    .filter(|s| !s.is_empty())
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default()
    }

    // ========================================================================
    // TLS Configuration
    // ========================================================================

    pub fn tls_enabled(&self) -> bool {
        self.config.get_bool("tls.enabled").unwrap_or(false)
    }

    pub fn tls_dir(&self) -> PathBuf {
        PathBuf::from(
            self.config
                .get_string("tls.dir")
                .unwrap_or("configs".to_string()),
        )
    }

    pub fn tls_domain(&self) -> String {
        self.config
            .get_string("tls.domain")
            .unwrap_or("localhost".to_string())
    }

    // ========================================================================
    // Auth Configuration
    // ========================================================================

    pub fn auth_secret(&self) -> Option<String> {
        self.config
            .get_string("auth.secret")
            .ok()
            .filter(|s| !s.is_empty())
    }

    pub fn auth_token_expire_seconds(&self) -> i64 {
        self.config
            .get_int("auth.token_expire_seconds")
            .unwrap_or(DEFAULT_TOKEN_EXPIRE_SECONDS)
    }

    pub fn movie_auth_required(&self) -> bool {
        self.config.get_bool("movie.auth_required").unwrap_or(false)
    }

    // ========================================================================
    // Logging Configuration
    // ========================================================================

    pub fn logging_config(&self) -> LoggingConfig {
        LoggingConfig {
            level: self
                .config
                .get_string("logging.level")
                .unwrap_or("info".to_string()),
            dir: self.config.get_string("logging.dir").ok().map(PathBuf::from),
        }
    }
}
