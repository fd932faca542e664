//! Deliver/consign actions.
//!
//! Preconditions are re-checked at call time with the current clock; the
//! eligibility shown on the page is advisory. Each action sends exactly one
//! mutation and, on success, reloads the portfolio instead of patching any
//! local state. Nothing is retried.

use std::sync::Arc;

use tracing::{info, warn};

use vault_core::{Clock, Holding, Price};
use vault_gate::{DeliveryMode, GateAction, Verdict};
use vault_source::{
    AssetApi, ConsignmentRequest, DeliveryRequest, MutationReply, SourceError, SourceResult,
};
use vault_telemetry::Metrics;

use crate::error::{ActionError, ActionResult};
use crate::portfolio::{LoadOutcome, Portfolio};

/// User input for a delivery.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeliverCommand {
    pub address_id: Option<String>,
    /// Confirmation of a forced pull-back. Required when the gate reports
    /// `DeliveryMode::Forced`, ignored otherwise.
    pub acknowledge_forced: bool,
}

/// A completed action.
#[derive(Debug, Clone, PartialEq)]
pub struct ActionOutcome {
    /// Server message.
    pub message: String,
    pub mode: Option<DeliveryMode>,
    /// Portfolio state after the mutation.
    pub reload: LoadOutcome,
}

pub struct ActionController<A: AssetApi, C: Clock> {
    portfolio: Arc<Portfolio<A, C>>,
}

impl<A: AssetApi, C: Clock> ActionController<A, C> {
    pub fn new(portfolio: Arc<Portfolio<A, C>>) -> Self {
        Self { portfolio }
    }

    pub fn portfolio(&self) -> &Arc<Portfolio<A, C>> {
        &self.portfolio
    }

    pub async fn deliver(
        &self,
        holding: &Holding,
        command: DeliverCommand,
    ) -> ActionResult<ActionOutcome> {
        let gate = self.portfolio.gate();
        let now = self.portfolio.clock().now();
        admit(GateAction::Deliver, gate.check_deliver(holding, now))?;

        let mode = gate.delivery_mode(holding);
        if mode == DeliveryMode::Forced && !command.acknowledge_forced {
            Metrics::gate_denied(GateAction::Deliver.as_str(), "forced_not_acknowledged");
            return Err(ActionError::ForcedDeliveryNotAcknowledged(holding.id.clone()));
        }

        let request = DeliveryRequest {
            holding_id: holding.id.clone(),
            address_id: command.address_id,
            force: mode == DeliveryMode::Forced,
        };
        info!(holding = %holding.id, ?mode, "Submitting delivery");

        let reply = self.portfolio.api().submit_delivery(&request).await;
        let message = settle(GateAction::Deliver, reply)?;

        Ok(ActionOutcome {
            message,
            mode: Some(mode),
            reload: self.portfolio.reload().await,
        })
    }

    pub async fn consign(
        &self,
        holding: &Holding,
        price: Price,
        coupons: u32,
    ) -> ActionResult<ActionOutcome> {
        let now = self.portfolio.clock().now();
        admit(
            GateAction::Consign,
            self.portfolio.gate().check_consign(holding, now, coupons),
        )?;

        if !price.is_positive() {
            Metrics::gate_denied(GateAction::Consign.as_str(), "invalid_price");
            return Err(ActionError::InvalidPrice);
        }

        let request = ConsignmentRequest {
            holding_id: holding.id.clone(),
            price,
        };
        info!(holding = %holding.id, %price, "Submitting consignment");

        let reply = self.portfolio.api().submit_consignment(&request).await;
        let message = settle(GateAction::Consign, reply)?;

        Ok(ActionOutcome {
            message,
            mode: None,
            reload: self.portfolio.reload().await,
        })
    }
}

fn admit(action: GateAction, verdict: Verdict) -> ActionResult<()> {
    match verdict {
        Verdict::Allowed => Ok(()),
        Verdict::Denied(reason) => {
            info!(action = action.as_str(), reason = reason.code(), "Action denied by gate");
            Metrics::gate_denied(action.as_str(), reason.code());
            Err(ActionError::Ineligible(reason))
        }
    }
}

fn settle(
    action: GateAction,
    reply: SourceResult<MutationReply>,
) -> ActionResult<String> {
    match reply {
        Ok(reply) => {
            Metrics::action_submitted(action.as_str(), "ok");
            info!(action = action.as_str(), message = %reply.message, "Action accepted");
            Ok(reply.message)
        }
        Err(e) => {
            let outcome = match e {
                SourceError::Rejected { .. } => "rejected",
                _ => "transport",
            };
            Metrics::action_submitted(action.as_str(), outcome);
            warn!(action = action.as_str(), error = %e, "Action failed");
            Err(ActionError::Source(e))
        }
    }
}
