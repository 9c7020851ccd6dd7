//! TLS material for mutually authenticated gRPC
//!
//! Every service owns `<service>-cert.pem` / `<service>-key.pem` and all of
//! them trust the same `ca-cert.pem`, all in one directory. The same pair is
//! used as server identity and as client identity when calling peers.

use std::path::{Path, PathBuf};

use tonic::transport::{Certificate, Identity, ServerTlsConfig};

use movieapp_core::TransportCredentials;

use super::config::Configuration;

pub const CA_CERT_FILE: &str = "ca-cert.pem";

#[derive(Debug, Clone)]
pub struct TlsMaterial {
    pub dir: PathBuf,
    /// Name the server certificates are issued for
    pub domain: String,
}

impl TlsMaterial {
    /// `None` unless `tls.enabled` is set
    pub fn from_configuration(configuration: &Configuration) -> Option<Self> {
        configuration.tls_enabled().then(|| TlsMaterial {
            dir: configuration.tls_dir(),
            domain: configuration.tls_domain(),
        })
    }

    pub fn cert_path(&self, service: &str) -> PathBuf {
        self.dir.join(format!("{}-cert.pem", service))
    }

    pub fn key_path(&self, service: &str) -> PathBuf {
        self.dir.join(format!("{}-key.pem", service))
    }

    pub fn ca_cert_path(&self) -> PathBuf {
        self.dir.join(CA_CERT_FILE)
    }

    /// Missing files for `service`, one message each
    pub fn validate(&self, service: &str) -> Vec<String> {
        [
            self.cert_path(service),
            self.key_path(service),
            self.ca_cert_path(),
        ]
        .into_iter()
        .filter(|path| !path.exists())
        .map(|path| format!("TLS file not found: {}", path.display()))
        .collect()
    }

    /// Server identity plus required client certificates signed by the CA
    pub async fn server_tls_config(&self, service: &str) -> anyhow::Result<ServerTlsConfig> {
        let (cert, key, ca_cert) = self.load(service).await?;
        Ok(ServerTlsConfig::new()
            .identity(Identity::from_pem(cert, key))
            .client_ca_root(Certificate::from_pem(ca_cert)))
    }

    /// Credentials for `service` when it calls other services
    pub async fn client_credentials(&self, service: &str) -> anyhow::Result<TransportCredentials> {
        let (cert, key, ca_cert) = self.load(service).await?;
        Ok(TransportCredentials::mutual_tls(
            ca_cert,
            cert,
            key,
            self.domain.clone(),
        ))
    }

    async fn load(&self, service: &str) -> anyhow::Result<(Vec<u8>, Vec<u8>, Vec<u8>)> {
        let errors = self.validate(service);
        if !errors.is_empty() {
            anyhow::bail!("TLS configuration for {} is incomplete: {:?}", service, errors);
        }

        Ok((
            read(&self.cert_path(service)).await?,
            read(&self.key_path(service)).await?,
            read(&self.ca_cert_path()).await?,
        ))
    }
}

async fn read(path: &Path) -> anyhow::Result<Vec<u8>> {
    tokio::fs::read(path)
        .await
        .map_err(|e| anyhow::anyhow!("failed to read {}: {}", path.display(), e))
}
