//! Registry membership for a running service instance

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tracing::{info, warn};

use movieapp_common::{CancelSignal, run_until_cancelled};
use movieapp_core::{Registry, generate_instance_id};

const MIN_HEARTBEAT_INTERVAL: Duration = Duration::from_millis(1);

/// A registered instance with its heartbeat task
pub struct Registration {
    registry: Arc<dyn Registry>,
    instance_id: String,
    service_name: String,
    heartbeat: JoinHandle<()>,
}

impl Registration {
    /// Register `address` under `service_name` and keep reporting it healthy
    /// every `interval` (at least 1 ms) until `shutdown` fires
    pub async fn register(
        registry: Arc<dyn Registry>,
        service_name: &str,
        address: &str,
        interval: Duration,
        shutdown: CancelSignal,
    ) -> anyhow::Result<Self> {
        let instance_id = generate_instance_id(service_name);
        registry
            .register(&instance_id, service_name, address)
            .await?;

        let heartbeat = tokio::spawn(heartbeat_loop(
            registry.clone(),
            instance_id.clone(),
            service_name.to_string(),
            interval.max(MIN_HEARTBEAT_INTERVAL),
            shutdown,
        ));

        Ok(Self {
            registry,
            instance_id,
            service_name: service_name.to_string(),
            heartbeat,
        })
    }

    pub fn instance_id(&self) -> &str {
        &self.instance_id
    }

    /// Stop heartbeats and remove the instance
    pub async fn deregister(self) -> anyhow::Result<()> {
        self.heartbeat.abort();
        self.registry
            .deregister(&self.instance_id, &self.service_name)
            .await?;
        Ok(())
    }
}

async fn heartbeat_loop(
    registry: Arc<dyn Registry>,
    instance_id: String,
    service_name: String,
    interval: Duration,
    shutdown: CancelSignal,
) {
    let mut ticker = tokio::time::interval(interval);
    // The first tick completes immediately.
    ticker.tick().await;

    while run_until_cancelled(ticker.tick(), &shutdown).await.is_some() {
        if let Err(e) = registry.report_healthy(&instance_id, &service_name).await {
            warn!(
                "Failed to report {} ({}) healthy: {}",
                instance_id, service_name, e
            );
        }
    }
    info!("Heartbeat for {} stopped", instance_id);
}
