//! Database Connection Proxy
//!
//! Multiplexes logical query and transaction requests over a fixed set of
//! independent per-connection workers, with least-used load balancing and a
//! process-wide pool registry.

pub mod config;
pub mod handle;
pub mod pool;
pub mod registry;
pub mod worker;

pub use config::ProxyConfig;
pub use handle::WorkerHandle;
pub use pool::{Pool, WorkerKind};
pub use registry::Registry;
pub use worker::{ConnectionWorker, DEFAULT_LIVENESS_INTERVAL};
