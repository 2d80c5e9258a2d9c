//! Live windowed store of transaction-risk events and the views derived
//! from it on every refresh cycle.
//!
//! Layering, leaf first:
//!   event, store, snapshot     the window itself
//!   aggregate, graph, filter   pure views over a snapshot
//!   generator                  where batches come from
//!   coordinator, bundle        one ingest-evict-derive-publish cycle

pub mod aggregate;
pub mod bundle;
pub mod config;
pub mod coordinator;
pub mod error;
pub mod event;
pub mod filter;
pub mod generator;
pub mod graph;
pub mod rng;
pub mod snapshot;
pub mod store;
pub mod types;

pub use bundle::ViewBundle;
pub use config::WindowConfig;
pub use coordinator::{CyclePhase, RefreshCoordinator};
pub use error::{ViewError, WindowError, WindowResult};
pub use event::{FraudType, TxEvent, TxStatus};
pub use snapshot::WindowSnapshot;
pub use store::WindowStore;
