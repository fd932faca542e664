//! Reconciliation engine.
//!
//! Joins purchase records with delivery orders and consignment records into
//! one `Holding` per resolved id. Pure: no I/O, no hidden state, no clock.
//! Each pass builds a fresh list from immutable inputs.
//!
//! # Display priority
//! 1. Sold (money has moved, terminal)
//! 2. Listed ("寄售中"; hides every delivery badge)
//! 3. Delivery stage text
//! 4. Awaiting forced delivery ("待提货")
//! 5. Idle dual badge

use std::collections::HashMap;

use chrono::{DateTime, FixedOffset, Offset, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use vault_core::{
    ConsignmentRecord, ConsignmentState, DeliveryOrder, DeliveryState, DisplayStatus, Holding,
    HoldingId, PurchaseRecord, RawId, SourceGaps, SourceRefs,
};

use crate::normalize::{delivery_from_stage, normalize_consignment, normalize_delivery};
use crate::resolver::resolve_holding_id;
use crate::snapshot::{SourceHealth, SourceSnapshot, Stream};

/// Upstream servers format naive timestamps in UTC+8.
const DEFAULT_SOURCE_OFFSET_SECS: i32 = 8 * 3600;

/// Reconciliation options.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReconcileOptions {
    /// Offset applied to timestamps sent without one.
    pub source_offset: FixedOffset,
}

impl ReconcileOptions {
    /// Options with a whole-hour source offset. `None` if out of range.
    pub fn with_offset_hours(hours: i32) -> Option<Self> {
        FixedOffset::east_opt(hours * 3600).map(|source_offset| Self { source_offset })
    }
}

impl Default for ReconcileOptions {
    fn default() -> Self {
        Self {
            source_offset: FixedOffset::east_opt(DEFAULT_SOURCE_OFFSET_SECS)
                .unwrap_or_else(|| Utc.fix()),
        }
    }
}

/// Which field carried an unrecognized status value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StatusField {
    PurchaseConsignment,
    ConsignmentRecord,
}

impl StatusField {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::PurchaseConsignment => "purchase_consignment",
            Self::ConsignmentRecord => "consignment_record",
        }
    }
}

/// Non-fatal findings of one pass.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Diagnostic {
    /// Purchase record with no usable id; surfaced as an unresolved entry.
    UnresolvedPurchase { purchase_index: usize },
    /// Delivery order or consignment record that cannot be joined.
    UnresolvedSourceRecord { stream: Stream, index: usize },
    /// Two purchase records resolved to the same holding.
    DuplicateHolding {
        holding: HoldingId,
        kept_index: usize,
        dropped_index: usize,
    },
    /// Status value outside the label table, read as `Active`.
    UnrecognizedStatus {
        holding: HoldingId,
        field: StatusField,
        raw: String,
    },
    SourceUnavailable { stream: Stream, reason: String },
}

impl Diagnostic {
    /// Stable snake_case name, used as a metric label.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::UnresolvedPurchase { .. } => "unresolved_purchase",
            Self::UnresolvedSourceRecord { .. } => "unresolved_source_record",
            Self::DuplicateHolding { .. } => "duplicate_holding",
            Self::UnrecognizedStatus { .. } => "unrecognized_status",
            Self::SourceUnavailable { .. } => "source_unavailable",
        }
    }
}

/// Purchase record that could not be given a holding id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnresolvedRecord {
    pub purchase_index: usize,
    pub title: Option<String>,
    pub order_id: Option<String>,
}

/// One row of reconciliation output, in purchase-list order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "entry", rename_all = "snake_case")]
pub enum HoldingEntry {
    Resolved(Holding),
    /// Data-integrity error: an owned asset the client cannot correlate.
    Unresolved(UnresolvedRecord),
}

/// Output of one reconciliation pass.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Reconciliation {
    pub entries: Vec<HoldingEntry>,
    pub diagnostics: Vec<Diagnostic>,
    pub health: SourceHealth,
}

impl Reconciliation {
    pub fn holdings(&self) -> impl Iterator<Item = &Holding> {
        self.entries.iter().filter_map(|entry| match entry {
            HoldingEntry::Resolved(holding) => Some(holding),
            HoldingEntry::Unresolved(_) => None,
        })
    }

    pub fn unresolved(&self) -> impl Iterator<Item = &UnresolvedRecord> {
        self.entries.iter().filter_map(|entry| match entry {
            HoldingEntry::Unresolved(record) => Some(record),
            HoldingEntry::Resolved(_) => None,
        })
    }

    pub fn get(&self, id: &HoldingId) -> Option<&Holding> {
        self.holdings().find(|holding| &holding.id == id)
    }

    /// Emit diagnostics through `tracing`.
    pub fn log_diagnostics(&self) {
        for diagnostic in &self.diagnostics {
            match diagnostic {
                Diagnostic::UnresolvedPurchase { purchase_index } => {
                    warn!(purchase_index, "Purchase record has no resolvable holding id");
                }
                Diagnostic::UnresolvedSourceRecord { stream, index } => {
                    debug!(%stream, index, "Source record has no holding id, not joined");
                }
                Diagnostic::DuplicateHolding {
                    holding,
                    kept_index,
                    dropped_index,
                } => {
                    debug!(
                        %holding,
                        kept_index,
                        dropped_index,
                        "Duplicate purchase record collapsed"
                    );
                }
                Diagnostic::UnrecognizedStatus {
                    holding,
                    field,
                    raw,
                } => {
                    warn!(
                        %holding,
                        field = field.as_str(),
                        raw = %raw,
                        "Unrecognized consignment status, treating as active"
                    );
                }
                Diagnostic::SourceUnavailable { stream, reason } => {
                    warn!(%stream, reason = %reason, "Reconciling without source");
                }
            }
        }
    }
}

/// Join the three streams of `snapshot` into holdings.
pub fn reconcile(snapshot: &SourceSnapshot, options: &ReconcileOptions) -> Reconciliation {
    let health = snapshot.health();
    let mut diagnostics: Vec<Diagnostic> = health
        .unavailable
        .iter()
        .map(|(stream, reason)| Diagnostic::SourceUnavailable {
            stream: *stream,
            reason: reason.clone(),
        })
        .collect();

    let joiner = Joiner {
        deliveries: index_delivery_orders(
            snapshot.delivery_orders.records(),
            options,
            &mut diagnostics,
        ),
        consignments: index_consignments(snapshot.consignments.records(), &mut diagnostics),
        gaps: SourceGaps {
            delivery: !snapshot.delivery_orders.is_available(),
            consignment: !snapshot.consignments.is_available(),
        },
        options,
    };

    let mut entries: Vec<HoldingEntry> = Vec::new();
    let mut slots: HashMap<HoldingId, usize> = HashMap::new();

    for (index, record) in snapshot.purchases.records().iter().enumerate() {
        let Some(id) = resolve_holding_id(record) else {
            diagnostics.push(Diagnostic::UnresolvedPurchase {
                purchase_index: index,
            });
            entries.push(HoldingEntry::Unresolved(UnresolvedRecord {
                purchase_index: index,
                title: record.title.clone(),
                order_id: record.order_id.as_ref().and_then(RawId::as_key),
            }));
            continue;
        };

        let holding = joiner.build(id.clone(), index, record, &mut diagnostics);

        let Some(&slot) = slots.get(&id) else {
            slots.insert(id, entries.len());
            entries.push(HoldingEntry::Resolved(holding));
            continue;
        };

        if let HoldingEntry::Resolved(existing) = &mut entries[slot] {
            // Latest pay time wins; ties keep the first record.
            if holding.buy_time > existing.buy_time {
                diagnostics.push(Diagnostic::DuplicateHolding {
                    holding: id,
                    kept_index: index,
                    dropped_index: existing.refs.purchase_index,
                });
                *existing = holding;
            } else {
                diagnostics.push(Diagnostic::DuplicateHolding {
                    holding: id,
                    kept_index: existing.refs.purchase_index,
                    dropped_index: index,
                });
            }
        }
    }

    Reconciliation {
        entries,
        diagnostics,
        health,
    }
}

type Indexed<'a, T> = (usize, &'a T);

/// Latest delivery order per holding (by creation time, then list position).
fn index_delivery_orders<'a>(
    orders: &'a [DeliveryOrder],
    options: &ReconcileOptions,
    diagnostics: &mut Vec<Diagnostic>,
) -> HashMap<HoldingId, Indexed<'a, DeliveryOrder>> {
    let mut index: HashMap<HoldingId, Indexed<'a, DeliveryOrder>> = HashMap::new();
    for (pos, order) in orders.iter().enumerate() {
        let Some(id) = resolve_holding_id(order) else {
            diagnostics.push(Diagnostic::UnresolvedSourceRecord {
                stream: Stream::DeliveryOrders,
                index: pos,
            });
            continue;
        };
        let created = |o: &DeliveryOrder| {
            o.created_at
                .as_ref()
                .and_then(|ts| ts.to_utc(options.source_offset))
        };
        let replace = index
            .get(&id)
            .map_or(true, |(_, current)| created(order) >= created(*current));
        if replace {
            index.insert(id, (pos, order));
        }
    }
    index
}

/// Full listing history per holding, in list order.
fn index_consignments<'a>(
    records: &'a [ConsignmentRecord],
    diagnostics: &mut Vec<Diagnostic>,
) -> HashMap<HoldingId, Vec<Indexed<'a, ConsignmentRecord>>> {
    let mut index: HashMap<HoldingId, Vec<Indexed<'a, ConsignmentRecord>>> = HashMap::new();
    for (pos, record) in records.iter().enumerate() {
        match resolve_holding_id(record) {
            Some(id) => index.entry(id).or_default().push((pos, record)),
            None => diagnostics.push(Diagnostic::UnresolvedSourceRecord {
                stream: Stream::Consignments,
                index: pos,
            }),
        }
    }
    index
}

struct Joiner<'a> {
    deliveries: HashMap<HoldingId, Indexed<'a, DeliveryOrder>>,
    consignments: HashMap<HoldingId, Vec<Indexed<'a, ConsignmentRecord>>>,
    gaps: SourceGaps,
    options: &'a ReconcileOptions,
}

/// Consignment state after merging the record field with listing history.
struct ConsignmentView {
    state: ConsignmentState,
    ever_consigned: bool,
    record_id: Option<String>,
}

impl<'a> Joiner<'a> {
    fn build(
        &self,
        id: HoldingId,
        index: usize,
        record: &PurchaseRecord,
        diagnostics: &mut Vec<Diagnostic>,
    ) -> Holding {
        let order = self.deliveries.get(&id).map(|(_, order)| *order);
        let (delivery_state, delivery_text) = match order {
            Some(order) => {
                let state = delivery_from_stage(order.stage.as_ref());
                let text = order
                    .status_text
                    .as_deref()
                    .map(str::trim)
                    .filter(|t| !t.is_empty())
                    .map_or_else(|| state.label().to_string(), str::to_string);
                (state, text)
            }
            None => {
                let state = normalize_delivery(record.delivery_status.as_ref());
                (state, state.label().to_string())
            }
        };

        let consignment = self.consignment_view(&id, record, diagnostics);
        let display = display_status(
            delivery_state,
            delivery_text,
            consignment.state,
            consignment.ever_consigned,
        );

        Holding {
            item_id: record.item_id.as_ref().and_then(RawId::as_key),
            title: record.title.clone().unwrap_or_default(),
            image: record.image.clone(),
            price: record.price,
            buy_time: record
                .pay_time
                .as_ref()
                .and_then(|ts| ts.to_utc(self.options.source_offset)),
            delivery_state,
            consignment_state: consignment.state,
            ever_consigned: consignment.ever_consigned,
            display,
            gaps: self.gaps,
            refs: SourceRefs {
                purchase_index: index,
                purchase_id: record.id.as_ref().and_then(RawId::as_key),
                order_id: record.order_id.as_ref().and_then(RawId::as_key),
                delivery_order_id: order.and_then(|o| o.id.as_ref()).and_then(RawId::as_key),
                consignment_record_id: consignment.record_id,
            },
            id,
        }
    }

    fn consignment_view(
        &self,
        id: &HoldingId,
        record: &PurchaseRecord,
        diagnostics: &mut Vec<Diagnostic>,
    ) -> ConsignmentView {
        let reading = normalize_consignment(record.consignment_status.as_ref());
        if let Some(raw) = reading.unrecognized {
            diagnostics.push(Diagnostic::UnrecognizedStatus {
                holding: id.clone(),
                field: StatusField::PurchaseConsignment,
                raw,
            });
        }

        let mut view = ConsignmentView {
            state: reading.state,
            ever_consigned: reading.state != ConsignmentState::None,
            record_id: None,
        };

        let Some(history) = self.consignments.get(id) else {
            return view;
        };

        type Key = (Option<DateTime<Utc>>, usize);
        let mut latest: Option<(Key, ConsignmentState, &ConsignmentRecord)> = None;
        for &(pos, listing) in history {
            let listing_reading = normalize_consignment(listing.status.as_ref());
            if let Some(raw) = listing_reading.unrecognized {
                diagnostics.push(Diagnostic::UnrecognizedStatus {
                    holding: id.clone(),
                    field: StatusField::ConsignmentRecord,
                    raw,
                });
            }
            view.ever_consigned |= listing_reading.state != ConsignmentState::None;

            let key = (
                listing
                    .last_touched()
                    .and_then(|ts| ts.to_utc(self.options.source_offset)),
                pos,
            );
            if latest.as_ref().map_or(true, |(k, _, _)| key >= *k) {
                latest = Some((key, listing_reading.state, listing));
            }
        }

        if let Some((_, latest_state, listing)) = latest {
            view.record_id = listing.id.as_ref().and_then(RawId::as_key);
            // The record field lags behind the listing service: a newer
            // listing can only escalate it to Active or Sold.
            let escalates = match latest_state {
                ConsignmentState::Sold => true,
                ConsignmentState::Active => view.state != ConsignmentState::Sold,
                _ => false,
            };
            if escalates {
                view.state = latest_state;
            }
        }

        view
    }
}

fn display_status(
    delivery: DeliveryState,
    delivery_text: String,
    consignment: ConsignmentState,
    ever_consigned: bool,
) -> DisplayStatus {
    match consignment {
        ConsignmentState::Sold => DisplayStatus::Sold,
        ConsignmentState::Active => DisplayStatus::Listed,
        _ if delivery.is_delivered() => DisplayStatus::Delivery {
            state: delivery,
            text: delivery_text,
        },
        _ if ever_consigned => DisplayStatus::AwaitingForcedDelivery,
        _ => DisplayStatus::Idle,
    }
}
