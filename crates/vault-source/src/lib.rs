//! External interfaces for the holdings client.
//!
//! - `AssetApi`: the read/write endpoints the client consumes
//! - `HttpAssetApi`: reqwest implementation with token auth
//! - `MemoryAssetApi`: fixture-backed implementation for offline runs
//! - `fetch_snapshot`: issues the three list fetches concurrently and
//!   settles them into a `SourceSnapshot`

pub mod api;
pub mod client;
pub mod error;
pub mod fetch;
pub mod memory;
pub mod wire;

pub use api::{
    AssetApi, ConsignmentRequest, ConsignmentScope, DeliveryRequest, DeliveryStageFilter,
    MutationReply, Page, PageRequest, PurchasePage,
};
pub use client::{ApiConfig, Endpoints, HttpAssetApi};
pub use error::{SourceError, SourceResult};
pub use fetch::{fetch_snapshot, FetchLimits, FetchedPage};
pub use memory::{Endpoint, Fixture, MemoryAssetApi, RecordedMutation};
