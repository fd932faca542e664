//! Action error types.

use thiserror::Error;

use vault_core::HoldingId;
use vault_gate::DenyReason;
use vault_source::SourceError;

#[derive(Debug, Error)]
pub enum ActionError {
    /// Rejected locally before any request was sent.
    #[error("{0}")]
    Ineligible(DenyReason),

    #[error("Holding {0} was consigned before; delivering it is a forced pull-back and must be confirmed")]
    ForcedDeliveryNotAcknowledged(HoldingId),

    #[error("Consignment price must be greater than zero")]
    InvalidPrice,

    /// Failure reported by the service, message unmodified.
    #[error(transparent)]
    Source(#[from] SourceError),
}

impl ActionError {
    /// True when no request reached the service.
    pub fn is_local(&self) -> bool {
        !matches!(self, Self::Source(_))
    }
}

pub type ActionResult<T> = Result<T, ActionError>;
