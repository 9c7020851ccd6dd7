//! Process bootstrap
//!
//! [`Application`] owns the registry, the running servers and their
//! registrations for one process, whether it hosts one service or all four.

pub mod grpc;
pub mod logging;
pub mod registration;
pub mod shutdown;

use std::net::SocketAddr;
use std::sync::Arc;

use futures::future::join_all;
use tracing::{info, warn};

use movieapp_common::CancelSignal;
use movieapp_core::{MemoryRegistry, Registry};

use crate::model::config::{Configuration, ServiceKind};
use crate::model::tls::TlsMaterial;

use self::grpc::{RunningService, ServiceContext, start_service};
use self::registration::Registration;

pub struct Application {
    registry: Arc<MemoryRegistry>,
    services: Vec<(RunningService, Registration)>,
    shutdown: CancelSignal,
}

impl Application {
    /// Start `kinds` in order and register each with the shared registry
    pub async fn start(
        kinds: &[ServiceKind],
        configuration: Configuration,
        shutdown: CancelSignal,
    ) -> anyhow::Result<Self> {
        let registry = Arc::new(MemoryRegistry::with_ttl(configuration.registry_ttl()));
        for kind in ServiceKind::ALL {
            for peer in configuration.peers(kind) {
                registry.pin(kind.name(), &peer);
            }
        }

        let tls = TlsMaterial::from_configuration(&configuration);
        let heartbeat_interval = configuration.heartbeat_interval();
        let context = ServiceContext {
            configuration,
            registry: registry.clone(),
            tls,
            shutdown: shutdown.clone(),
        };

        let mut services = Vec::with_capacity(kinds.len());
        for &kind in kinds {
            let service = start_service(kind, &context).await?;
            let shared: Arc<dyn Registry> = registry.clone();
            let registration = Registration::register(
                shared,
                kind.name(),
                &service.address.to_string(),
                heartbeat_interval,
                shutdown.clone(),
            )
            .await?;
            info!(
                "{} registered as {} at {}",
                kind.name(),
                registration.instance_id(),
                service.address
            );
            services.push((service, registration));
        }

        Ok(Self {
            registry,
            services,
            shutdown,
        })
    }

    pub fn address(&self, kind: ServiceKind) -> Option<SocketAddr> {
        self.services
            .iter()
            .find(|(service, _)| service.kind == kind)
            .map(|(service, _)| service.address)
    }

    pub fn registry(&self) -> Arc<MemoryRegistry> {
        self.registry.clone()
    }

    /// Block until the shutdown signal fires, then stop
    pub async fn run_until_shutdown(self) -> anyhow::Result<()> {
        self.shutdown.cancelled().await;
        self.stop().await
    }

    /// Fire shutdown, deregister every instance and wait for the servers
    pub async fn stop(self) -> anyhow::Result<()> {
        self.shutdown.cancel();

        let mut handles = Vec::with_capacity(self.services.len());
        for (service, registration) in self.services {
            if let Err(e) = registration.deregister().await {
                warn!("Failed to deregister {}: {}", service.kind.name(), e);
            }
            handles.push(service.handle);
        }

        for result in join_all(handles).await {
            if let Err(e) = result {
                warn!("Server task ended abnormally: {}", e);
            }
        }
        info!("Shutdown complete");
        Ok(())
    }
}
