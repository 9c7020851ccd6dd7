//! Admission control for inbound RPCs
//!
//! A single token bucket is shared by every caller of a server. Each request
//! takes one token or is rejected with `ResourceExhausted` straight away;
//! nothing is queued.

use std::sync::Arc;

use metrics::counter;
use parking_lot::Mutex;
use tokio::time::Instant;
use tonic::service::{Interceptor, InterceptorLayer};
use tonic::{Request, Status};
use tracing::debug;

/// Token bucket parameters
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AdmissionConfig {
    pub capacity: u64,
    /// Tokens added per second. Zero disables refill.
    pub refill_per_second: u64,
}

impl Default for AdmissionConfig {
    fn default() -> Self {
        Self {
            capacity: 100,
            refill_per_second: 100,
        }
    }
}

#[derive(Debug)]
struct BucketState {
    tokens: f64,
    last_refill: Instant,
}

/// Token bucket. Refill and consume happen under one lock.
#[derive(Debug)]
pub struct TokenBucket {
    capacity: f64,
    refill_per_second: f64,
    state: Mutex<BucketState>,
}

impl TokenBucket {
    /// Create a full bucket
    pub fn new(config: AdmissionConfig) -> Self {
        let capacity = config.capacity as f64;
        Self {
            capacity,
            refill_per_second: config.refill_per_second as f64,
            state: Mutex::new(BucketState {
                tokens: capacity,
                last_refill: Instant::now(),
            }),
        }
    }

    /// Take one token if available
    pub fn try_acquire(&self) -> bool {
        let mut state = self.state.lock();
        let now = Instant::now();

        if self.refill_per_second > 0.0 {
            let elapsed = now.saturating_duration_since(state.last_refill);
            let refill = elapsed.as_secs_f64() * self.refill_per_second;
            state.tokens = (state.tokens + refill).min(self.capacity);
        }
        state.last_refill = now;

        if state.tokens >= 1.0 {
            state.tokens -= 1.0;
            true
        } else {
            false
        }
    }

    /// Whole tokens currently available, without refilling
    pub fn available(&self) -> u64 {
        self.state.lock().tokens.floor() as u64
    }

    pub fn capacity(&self) -> u64 {
        self.capacity as u64
    }
}

/// Server-side gate applied before any handler runs
#[derive(Debug, Clone)]
pub struct AdmissionController {
    service: &'static str,
    bucket: Arc<TokenBucket>,
}

impl AdmissionController {
    pub fn new(service: &'static str, config: AdmissionConfig) -> Self {
        Self {
            service,
            bucket: Arc::new(TokenBucket::new(config)),
        }
    }

    /// Admit or reject one request
    pub fn admit(&self) -> Result<(), Status> {
        if self.bucket.try_acquire() {
            return Ok(());
        }

        debug!("Admission rejected for {}", self.service);
        counter!("admission_rejected_total", "service" => self.service).increment(1);
        Err(Status::resource_exhausted(format!(
            "{} is over its admission limit",
            self.service
        )))
    }

    /// Tower layer for `Server::builder().layer(..)`
    pub fn layer(&self) -> InterceptorLayer<Self> {
        InterceptorLayer::new(self.clone())
    }

    pub fn bucket(&self) -> &TokenBucket {
        &self.bucket
    }
}

impl Interceptor for AdmissionController {
    fn call(&mut self, request: Request<()>) -> Result<Request<()>, Status> {
        self.admit()?;
        Ok(request)
    }
}
