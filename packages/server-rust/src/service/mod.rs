//! Operation dispatch.
//!
//! 1. **Dispatcher** (`dispatcher`): local ledger or peer delegation per call
//! 2. **Configuration** (`config`): remote switch, static URL, discovery
//! 3. **Background workers** (`worker`): periodic endpoint refresh

pub mod config;
pub mod dispatcher;
pub mod worker;

pub use config::{DiscoveryConfig, DispatchConfig};
pub use dispatcher::{OperationDispatcher, Route};
pub use worker::{BackgroundRunnable, BackgroundWorker, EndpointRefresher, RefreshTask};
