//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! All subsystems produce:
//!     → logging.rs (structured log events via `tracing`)
//!     → metrics.rs (counters, gauges, histograms via `metrics`)
//!
//! Consumers:
//!     → whatever subscriber the embedding application installs
//!     → Prometheus endpoint when the CLI enables it
//! ```
//!
//! # Design Decisions
//! - The library only emits; it never installs a subscriber or recorder itself
//! - Metrics are cheap no-ops until a recorder is installed

pub mod logging;
pub mod metrics;
