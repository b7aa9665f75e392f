//! Chord vs. Pastry Comparison Core
//!
//! This library crate holds the core of the structured-overlay study: two
//! peer-to-peer protocols over the same identifier space, a per-node
//! ordered index, and a message fabric that accounts routing hops exactly.
//! The binary driver (`main.rs`) replays seeded workloads against both
//! protocols and reports the hop statistics.
//!
//! ## Architecture Modules
//!
//! - **`ident`**: the m-bit circular identifier space: distances, interval
//!   tests, digit decomposition, and the SHA-1 key hashing.
//! - **`index`**: the per-node B+ tree index mapping normalized keys to
//!   value lists.
//! - **`network`**: in-process synchronous delivery between registered
//!   node endpoints, with thread-local per-operation hop counting.
//! - **`chord`**: successor ring, finger tables, and ring membership with
//!   key redistribution.
//! - **`pastry`**: prefix routing matrix plus leaf sets, closest-id
//!   ownership, and the cycle-guarded route resolution.
//! - **`api`**: the uniform operation surface dispatched over both
//!   overlays, configuration, per-operation reports and the observer hook.
//! - **`dataset`**: the movie record shape and the synthetic dataset.
//! - **`experiments`**: workload generation, the comparison runner, and
//!   hop aggregation.

pub mod api;
pub mod chord;
pub mod dataset;
pub mod error;
pub mod experiments;
pub mod ident;
pub mod index;
pub mod network;
pub mod pastry;

pub use api::{OpKind, OpObserver, OpOutcome, OpReport, Overlay, OverlayConfig, Protocol};
pub use error::{Error, Result};
