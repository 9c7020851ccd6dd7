//! movieapp server - metadata, rating, auth and movie services
//!
//! Each service is a tonic server guarded by admission control. The movie
//! service aggregates metadata and ratings through gateways resolved via the
//! shared registry.

pub mod metrics;
pub mod model;
pub mod service;
pub mod startup;
