//! Remote write path
//!
//! Mutations bound for the backend are described as [`SyncOperation`]s. The
//! sync queue persists and replays them; cloud-first writes and the upload pass
//! execute them immediately. Both go through [`RemoteGateway`].

pub mod gateway;
pub mod operation;
pub mod rows;

pub use gateway::{timed, RemoteGateway};
pub use operation::{OperationKind, RowLink, SyncOperation};
pub use rows::{PendingUpload, RowError, RowPlan, VesselPath};
