//! Holdings view orchestration.
//!
//! - `Portfolio`: fetch → reconcile → gate annotation for one page
//! - `ActionController`: deliver/consign with call-time re-checks and a
//!   full reload after each accepted mutation

pub mod controller;
pub mod error;
pub mod portfolio;

pub use controller::{ActionController, ActionOutcome, DeliverCommand};
pub use error::{ActionError, ActionResult};
pub use portfolio::{LoadOutcome, Portfolio, PortfolioPage, PortfolioRow};
