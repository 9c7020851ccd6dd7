//! Service discovery
//!
//! `Registry` maps a logical service name to the addresses of its currently
//! healthy instances. `MemoryRegistry` keeps instances in memory and treats an
//! instance as healthy while its last heartbeat is younger than the TTL.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use dashmap::DashMap;
use tokio::time::Instant;
use tracing::{debug, info};

use movieapp_common::{MovieAppError, Result};

/// Health of a registered instance at snapshot time
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InstanceHealth {
    Healthy,
    Unhealthy,
}

/// A registered instance of a service
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceInstance {
    pub id: String,
    pub service_name: String,
    pub address: String,
    pub health: InstanceHealth,
}

/// Directory of service instances.
///
/// Resolution (`addresses`) is what gateways consume; registration and
/// heartbeats are driven by the bootstrap layer.
#[async_trait]
pub trait Registry: Send + Sync {
    /// Register an instance under a service name
    async fn register(&self, instance_id: &str, service_name: &str, address: &str) -> Result<()>;

    /// Remove an instance
    async fn deregister(&self, instance_id: &str, service_name: &str) -> Result<()>;

    /// Addresses of all healthy instances of a service
    ///
    /// Fails with `NotFound` or `Unavailable` when no healthy instance is known.
    async fn addresses(&self, service_name: &str) -> Result<Vec<String>>;

    /// Record a heartbeat for an instance
    async fn report_healthy(&self, instance_id: &str, service_name: &str) -> Result<()>;
}

/// Generate a process-unique instance id for a service
pub fn generate_instance_id(service_name: &str) -> String {
    format!("{}-{}", service_name, rand::random::<u32>())
}

#[derive(Debug, Clone)]
struct InstanceRecord {
    address: String,
    last_heartbeat: Instant,
    /// Statically configured peers never expire
    pinned: bool,
}

/// In-memory registry with heartbeat expiry
pub struct MemoryRegistry {
    ttl: Duration,
    services: DashMap<String, HashMap<String, InstanceRecord>>,
}

impl MemoryRegistry {
    pub const DEFAULT_TTL: Duration = Duration::from_secs(5);

    pub fn new() -> Self {
        Self::with_ttl(Self::DEFAULT_TTL)
    }

    pub fn with_ttl(ttl: Duration) -> Self {
        Self {
            ttl,
            services: DashMap::new(),
        }
    }

    /// Add a statically known peer that is always considered healthy
    pub fn pin(&self, service_name: &str, address: &str) {
        let instance_id = format!("{}-static-{}", service_name, address);
        self.services
            .entry(service_name.to_string())
            .or_default()
            .insert(
                instance_id,
                InstanceRecord {
                    address: address.to_string(),
                    last_heartbeat: Instant::now(),
                    pinned: true,
                },
            );
        info!("Pinned static peer {} for service {}", address, service_name);
    }

    /// Snapshot of every instance of a service, healthy or not
    pub fn snapshot(&self, service_name: &str) -> Vec<ServiceInstance> {
        let now = Instant::now();
        self.services
            .get(service_name)
            .map(|instances| {
                instances
                    .iter()
                    .map(|(id, record)| ServiceInstance {
                        id: id.clone(),
                        service_name: service_name.to_string(),
                        address: record.address.clone(),
                        health: if self.is_healthy(record, now) {
                            InstanceHealth::Healthy
                        } else {
                            InstanceHealth::Unhealthy
                        },
                    })
                    .collect()
            })
            .unwrap_or_default()
    }

    fn is_healthy(&self, record: &InstanceRecord, now: Instant) -> bool {
        record.pinned || now.saturating_duration_since(record.last_heartbeat) <= self.ttl
    }
}

impl Default for MemoryRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Registry for MemoryRegistry {
    async fn register(&self, instance_id: &str, service_name: &str, address: &str) -> Result<()> {
        self.services
            .entry(service_name.to_string())
            .or_default()
            .insert(
                instance_id.to_string(),
                InstanceRecord {
                    address: address.to_string(),
                    last_heartbeat: Instant::now(),
                    pinned: false,
                },
            );
        info!(
            "Registered instance {} of service {} at {}",
            instance_id, service_name, address
        );
        Ok(())
    }

    async fn deregister(&self, instance_id: &str, service_name: &str) -> Result<()> {
        {
            if let Some(mut instances) = self.services.get_mut(service_name) {
                instances.remove(instance_id);
            }
        }
        self.services
            .remove_if(service_name, |_, instances| instances.is_empty());
        info!(
            "Deregistered instance {} of service {}",
            instance_id, service_name
        );
        Ok(())
    }

    async fn addresses(&self, service_name: &str) -> Result<Vec<String>> {
        let Some(instances) = self.services.get(service_name) else {
            return Err(MovieAppError::NotFound(format!(
                "service '{}' is not registered",
                service_name
            )));
        };

        let now = Instant::now();
        let addresses: Vec<String> = instances
            .values()
            .filter(|record| self.is_healthy(record, now))
            .map(|record| record.address.clone())
            .collect();

        if addresses.is_empty() {
            return Err(MovieAppError::Unavailable(format!(
                "no healthy instance of service '{}'",
                service_name
            )));
        }

        Ok(addresses)
    }

    async fn report_healthy(&self, instance_id: &str, service_name: &str) -> Result<()> {
        let mut instances = self.services.get_mut(service_name).ok_or_else(|| {
            MovieAppError::NotFound(format!("service '{}' is not registered", service_name))
        })?;
        let record = instances.get_mut(instance_id).ok_or_else(|| {
            MovieAppError::NotFound(format!(
                "instance '{}' of service '{}' is not registered",
                instance_id, service_name
            ))
        })?;
        record.last_heartbeat = Instant::now();
        debug!("Heartbeat from {} ({})", instance_id, service_name);
        Ok(())
    }
}
