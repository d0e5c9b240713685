//! Read-only order listings, statistics and artifact reports.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::{current_stage, Order, OrderProgress};
use crate::core::{OrderId, StageId};
use crate::errors::WorkflowError;
use crate::graph::StageGraph;
use crate::identity::Actor;
use crate::store::Transaction;

/// Number of orders sitting at one top-level stage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageCount {
    /// The stage id.
    pub stage_id: StageId,
    /// The stage name.
    pub name: String,
    /// Orders whose first pending top-level stage is this one.
    pub orders: usize,
}

/// Order counts across the system.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderStatistics {
    /// All orders.
    pub total: usize,
    /// Orders with every stage complete.
    pub completed: usize,
    /// Per top-level stage, in ordinal order.
    pub at_stage: Vec<StageCount>,
}

/// An artifact with its review status.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArtifactStatus {
    /// Original file name.
    pub file_name: String,
    /// Artifact store path.
    pub path: String,
    /// Name of the stage the file was attached at.
    pub stage: String,
    /// When the file was attached.
    pub uploaded_at: DateTime<Utc>,
    /// `needs_rework + gate approved`: 0, 1 or 2.
    pub status: u8,
}

/// The artifacts of one order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderArtifacts {
    /// The order's KKS.
    pub kks: String,
    /// Files in attach order.
    pub files: Vec<ArtifactStatus>,
}

/// Returns an id to KKS map of every order.
#[must_use]
pub fn list_orders(tx: &Transaction) -> BTreeMap<OrderId, String> {
    tx.orders().map(|o| (o.id, o.kks.clone())).collect()
}

/// Returns the orders `actor` may see: all of them for administrators,
/// otherwise those with a stage assigned to the actor.
pub fn visible_orders<'t>(tx: &'t Transaction, actor: &'t Actor) -> impl Iterator<Item = &'t Order> + 't {
    tx.orders().filter(move |order| {
        actor.admin || tx.instances_of(order.id).any(|i| i.is_assigned_to(&actor.user))
    })
}

/// Returns one page of the orders visible to `actor`, ordered by current
/// stage. Finished orders come last.
///
/// # Errors
///
/// Returns [`WorkflowError::InvalidArgument`] for page 0 or a zero page size.
pub fn orders_page(
    graph: &StageGraph,
    tx: &Transaction,
    actor: &Actor,
    page: usize,
    page_size: usize,
) -> Result<Vec<OrderProgress>, WorkflowError> {
    if page == 0 {
        return Err(WorkflowError::invalid_argument("pages are numbered from 1"));
    }
    if page_size == 0 {
        return Err(WorkflowError::invalid_argument("page size must be positive"));
    }

    let mut orders: Vec<(StageId, OrderId, &Order)> = visible_orders(tx, actor)
        .map(|o| {
            let current = current_stage(graph, tx, o.id).unwrap_or(StageId(u32::MAX));
            (current, o.id, o)
        })
        .collect();
    orders.sort_by_key(|(stage, id, _)| (*stage, *id));

    Ok(orders
        .into_iter()
        .skip((page - 1) * page_size)
        .take(page_size)
        .map(|(_, _, order)| OrderProgress::build(graph, tx, order))
        .collect())
}

/// Returns the number of pages for `actor`, as `visible / page_size + 1`.
#[must_use]
pub fn page_count(tx: &Transaction, actor: &Actor, page_size: usize) -> usize {
    visible_orders(tx, actor).count() / page_size.max(1) + 1
}

/// Returns every artifact of the listed orders with its review status.
///
/// Unknown KKS entries are skipped.
#[must_use]
pub fn artifact_report(graph: &StageGraph, tx: &Transaction, kks_list: &[String]) -> Vec<OrderArtifacts> {
    kks_list
        .iter()
        .filter_map(|kks| tx.order_by_kks(kks))
        .map(|order| {
            let approved = graph
                .gate()
                .and_then(|gate| tx.instance(order.id, gate))
                .is_some_and(|i| i.completed);

            let files = tx
                .artifacts_of(order.id)
                .map(|a| ArtifactStatus {
                    file_name: a.file_name.clone(),
                    path: a.path.clone(),
                    stage: graph.name_of(a.stage_id),
                    uploaded_at: a.uploaded_at,
                    status: u8::from(a.needs_rework) + u8::from(approved),
                })
                .collect();

            OrderArtifacts {
                kks: order.kks.clone(),
                files,
            }
        })
        .collect()
}

/// Counts orders in total, finished, and per current top-level stage.
#[must_use]
pub fn statistics(graph: &StageGraph, tx: &Transaction) -> OrderStatistics {
    let mut at_stage: BTreeMap<StageId, usize> = graph.roots().map(|s| (s.id, 0)).collect();
    let mut total = 0;
    let mut completed = 0;

    for order in tx.orders() {
        total += 1;
        if tx.instances_of(order.id).all(|i| i.completed) {
            completed += 1;
        }
        if let Some(stage) = current_stage(graph, tx, order.id) {
            *at_stage.entry(stage).or_default() += 1;
        }
    }

    OrderStatistics {
        total,
        completed,
        at_stage: at_stage
            .into_iter()
            .map(|(stage_id, orders)| StageCount {
                stage_id,
                name: graph.name_of(stage_id),
                orders,
            })
            .collect(),
    }
}
