//! Holding status reconciliation.
//!
//! A purchased collectible's state is not stored as one flag upstream; it is
//! derived here by joining three independently fetched record streams:
//! - `resolver`: canonical holding id via an ordered fallback chain
//! - `normalize`: raw status representations into closed enums
//! - `engine`: the pure join that produces one `Holding` per resolved id

pub mod engine;
pub mod normalize;
pub mod resolver;
pub mod snapshot;

pub use engine::{
    reconcile, Diagnostic, HoldingEntry, ReconcileOptions, Reconciliation, StatusField,
    UnresolvedRecord,
};
pub use normalize::{
    delivery_from_stage, normalize_consignment, normalize_delivery, ConsignmentReading,
};
pub use resolver::{resolve_holding_id, HoldingIdCandidates};
pub use snapshot::{SourceFeed, SourceHealth, SourceSnapshot, Stream};
