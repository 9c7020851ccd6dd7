//! Connection factory
//!
//! Resolves a service name through the [`Registry`], picks one address and
//! dials a single `Channel` to it. Channels are owned by the caller and are
//! never pooled; dropping one closes it.
//!
//! Resolution failures keep the registry's classification so callers can fail
//! fast on them. Only dial failures count as `Unavailable`.

use std::sync::Arc;
use std::time::Duration;

use rand::Rng;
use tonic::transport::{Certificate, Channel, ClientTlsConfig, Endpoint, Identity};
use tracing::debug;

use movieapp_common::MovieAppError;

use crate::discovery::Registry;

/// Credentials used when dialing a remote instance
#[derive(Debug, Clone, Default)]
pub enum TransportCredentials {
    /// Plaintext HTTP/2
    #[default]
    Insecure,
    /// TLS with a client certificate, verified against a shared CA
    MutualTls(ClientTlsConfig),
}

impl TransportCredentials {
    /// Build mutual TLS credentials from PEM material
    pub fn mutual_tls(
        ca_pem: impl AsRef<[u8]>,
        cert_pem: impl AsRef<[u8]>,
        key_pem: impl AsRef<[u8]>,
        domain: impl Into<String>,
    ) -> Self {
        let config = ClientTlsConfig::new()
            .ca_certificate(Certificate::from_pem(ca_pem))
            .identity(Identity::from_pem(cert_pem, key_pem))
            .domain_name(domain);
        TransportCredentials::MutualTls(config)
    }

    fn scheme(&self) -> &'static str {
        match self {
            TransportCredentials::Insecure => "http",
            TransportCredentials::MutualTls(_) => "https",
        }
    }
}

/// Picks one address out of a resolved set
pub trait AddressSelector: Send + Sync {
    fn select<'a>(&self, addresses: &'a [String]) -> Option<&'a str>;
}

/// Uniform random choice, no weighting or affinity
#[derive(Debug, Clone, Copy, Default)]
pub struct UniformRandomSelector;

impl AddressSelector for UniformRandomSelector {
    fn select<'a>(&self, addresses: &'a [String]) -> Option<&'a str> {
        if addresses.is_empty() {
            return None;
        }
        let index = rand::rng().random_range(0..addresses.len());
        Some(addresses[index].as_str())
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConnectionError {
    #[error("failed to resolve service '{service}': {source}")]
    Resolution {
        service: String,
        #[source]
        source: MovieAppError,
    },

    #[error("no addresses for service '{0}'")]
    NoAddresses(String),

    #[error("failed to connect to {address}: {source}")]
    Connect {
        address: String,
        #[source]
        source: tonic::transport::Error,
    },
}

impl From<ConnectionError> for MovieAppError {
    fn from(err: ConnectionError) -> Self {
        match err {
            ConnectionError::Resolution { source, .. } => source,
            err @ (ConnectionError::NoAddresses(_) | ConnectionError::Connect { .. }) => {
                MovieAppError::Unavailable(err.to_string())
            }
        }
    }
}

/// Builds one connection per call to an instance of a named service
#[derive(Clone)]
pub struct ConnectionFactory {
    registry: Arc<dyn Registry>,
    credentials: TransportCredentials,
    selector: Arc<dyn AddressSelector>,
    connect_timeout: Duration,
}

impl ConnectionFactory {
    pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

    pub fn new(registry: Arc<dyn Registry>, credentials: TransportCredentials) -> Self {
        Self {
            registry,
            credentials,
            selector: Arc::new(UniformRandomSelector),
            connect_timeout: Self::DEFAULT_CONNECT_TIMEOUT,
        }
    }

    pub fn with_selector(mut self, selector: Arc<dyn AddressSelector>) -> Self {
        self.selector = selector;
        self
    }

    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Resolve the service and pick one address without dialing
    pub async fn resolve(&self, service_name: &str) -> Result<String, ConnectionError> {
        let addresses = self
            .registry
            .addresses(service_name)
            .await
            .map_err(|source| ConnectionError::Resolution {
                service: service_name.to_string(),
                source,
            })?;

        self.selector
            .select(&addresses)
            .map(str::to_string)
            .ok_or_else(|| ConnectionError::NoAddresses(service_name.to_string()))
    }

    /// Resolve the service and open a connection to one of its instances
    pub async fn connect(&self, service_name: &str) -> Result<Channel, ConnectionError> {
        let address = self.resolve(service_name).await?;
        self.dial(&address).await
    }

    /// Open a connection to an already resolved address
    pub async fn dial(&self, address: &str) -> Result<Channel, ConnectionError> {
        debug!("Connecting to {}", address);
        self.endpoint(address)?
            .connect()
            .await
            .map_err(|source| ConnectionError::Connect {
                address: address.to_string(),
                source,
            })
    }

    fn endpoint(&self, address: &str) -> Result<Endpoint, ConnectionError> {
        let uri = format!("{}://{}", self.credentials.scheme(), address);
        let connect_error = |source| ConnectionError::Connect {
            address: address.to_string(),
            source,
        };

        let endpoint = Endpoint::from_shared(uri)
            .map_err(connect_error)?
            .connect_timeout(self.connect_timeout);

        match &self.credentials {
            TransportCredentials::Insecure => Ok(endpoint),
            TransportCredentials::MutualTls(tls) => {
                endpoint.tls_config(tls.clone()).map_err(connect_error)
            }
        }
    }
}
