//! Gateways to downstream services
//!
//! Each gateway turns a domain call into a remote RPC. A call resolves the
//! target once through the [`ConnectionFactory`](crate::connection::ConnectionFactory);
//! a resolution failure returns immediately with the registry's
//! classification. The RPC then runs under a [`RetryPolicy`](crate::retry::RetryPolicy),
//! each attempt dialing its own connection to the resolved address.

mod auth;
mod metadata;
mod rating;

pub use auth::AuthGateway;
pub use metadata::MetadataGateway;
pub use rating::RatingGateway;
