//! Production runner with async I/O.
//!
//! This crate wraps the deterministic node state machine with real I/O:
//!
//! - Inter-node transport over persistent framed-JSON TCP streams
//! - HTTP ingress for attestation submission and status queries
//! - Timers via tokio tasks
//! - Prometheus metrics and tracing telemetry
//!
//! # Architecture
//!
//! Uses the event aggregator pattern: a single task owns the state machine
//! and receives events via an mpsc channel. Ingress handlers, the transport
//! reader tasks and timers all feed that channel, so the node state needs
//! no locking.
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                       Committee Node                         │
//! │                                                              │
//! │  HTTP ingress ─┐                                             │
//! │  Transport ────┼──▶ mpsc ──▶ ProductionRunner                │
//! │  Timers ───────┘             └─ actions ──▶ transport/timers │
//! │                                     └──▶ status caches ──▶ HTTP
//! └──────────────────────────────────────────────────────────────┘
//! ```

pub mod config;
pub mod metrics;
pub mod network;
pub mod rpc;
mod runner;
mod telemetry;
mod timers;

pub use config::{ConfigError, NodeConfig, PeerConfig};
pub use runner::ProductionRunner;
pub use telemetry::init_telemetry;
pub use timers::TimerManager;
