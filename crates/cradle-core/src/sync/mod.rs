//! Outbox synchronization: delivery capability, driver, and status.

mod connectivity;
mod delivery;
mod driver;
mod scripted;
mod spool;
mod status;

pub use connectivity::{Connectivity, ManualConnectivity, TcpProbe};
pub use delivery::{Ack, DeliveryError, RemoteDelivery};
pub use driver::{SyncDriver, SyncOutcome, SyncSummary};
pub use scripted::{DeliveryCall, ScriptedDelivery};
pub use spool::SpoolDelivery;
pub use status::StatusObserver;
