//! Core domain types for the collectible holdings client.
//!
//! This crate provides the types shared by every other crate:
//! - `PurchaseRecord`, `DeliveryOrder`, `ConsignmentRecord`: upstream records
//!   as they arrive on the wire
//! - `RawId`, `RawStatus`, `RawTimestamp`: tolerant ingestion-boundary values
//! - `Holding`: the reconciled, derived view of one owned collectible
//! - `Price`: precision-safe money type
//! - `Clock`: injectable time source

pub mod clock;
pub mod decimal;
pub mod error;
pub mod holding;
pub mod raw;
pub mod records;

pub use clock::{Clock, ManualClock, SystemClock};
pub use decimal::Price;
pub use error::{CoreError, Result};
pub use holding::{
    ConsignmentState, DeliveryState, DisplayStatus, Holding, HoldingId, SourceGaps, SourceRefs,
};
pub use raw::{RawId, RawStatus, RawTimestamp};
pub use records::{ConsignmentRecord, DeliveryOrder, PurchaseRecord};
