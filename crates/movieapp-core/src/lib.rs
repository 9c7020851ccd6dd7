//! movieapp Core - service-to-service communication and resilience
//!
//! This crate provides:
//! - Service discovery (`Registry`) with an in-memory, heartbeat-driven implementation
//! - A connection factory that resolves and dials one instance per call
//! - A bounded, data-driven retry policy for transient failures
//! - Gateways wrapping each downstream service
//! - A cache-aside read path in front of a backing repository
//! - Token-bucket admission control for inbound RPCs

pub mod admission;
pub mod cache;
pub mod connection;
pub mod discovery;
pub mod gateway;
pub mod retry;

pub use admission::{AdmissionConfig, AdmissionController, TokenBucket};
pub use cache::{Cache, CacheAside, Keyed, MemoryCache, MemoryRepository, Repository};
pub use connection::{
    AddressSelector, ConnectionError, ConnectionFactory, TransportCredentials,
    UniformRandomSelector,
};
pub use discovery::{
    InstanceHealth, MemoryRegistry, Registry, ServiceInstance, generate_instance_id,
};
pub use gateway::{AuthGateway, MetadataGateway, RatingGateway};
pub use retry::RetryPolicy;
