//! Supply-chain dispatch server: ledger client seam, peer delegation with
//! service discovery, the operation dispatcher and its HTTP boundary.

pub mod ledger;
pub mod network;
pub mod remote;
pub mod service;

pub use ledger::{LedgerClient, LedgerError, MemoryLedger};
pub use network::{NetworkConfig, NetworkModule};
pub use remote::{HttpPeerTransport, PeerTransport, RemoteEndpointResolver};
pub use service::{DispatchConfig, OperationDispatcher};
