//! Bulk actions over a selection of records.
//!
//! A bulk run issues one mutation per selected id; the backend never sees a
//! batch. Each mutation succeeds or fails on its own: a failure does not stop
//! the run, nothing is retried, and earlier successes are never rolled back.
//! The outcome of every id is collected into a [`BulkReport`] so callers can
//! show partial failures.
//!
//! Mutations run on a small worker pool. A concurrency of `1` reproduces a
//! plain sequential loop.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::{sync::Semaphore, task::JoinSet};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::{
  Error, Result,
  audit::{ActivityType, NewActivity},
  entity::{
    CategoryFields, Entity, EntityKind, EstadoFields, ReporteFields, ReportePatch,
    RoleFields, UserFields,
  },
  store::{Actor, GeoStore},
};

/// Worker pool size when the caller does not choose one.
pub const DEFAULT_BULK_CONCURRENCY: usize = 4;

/// Upper bound on workers for a single run, whatever the caller asks for.
pub const MAX_BULK_CONCURRENCY: usize = 32;

// ─── Actions ─────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum BulkAction {
  /// Soft delete every selected record.
  Delete,
  /// Flip each record's own `activo` flag.
  ToggleStatus,
  /// Reportes only.
  ChangeCategory(Uuid),
  /// Reportes only.
  ChangeEstado(Uuid),
  /// Reportes only; `None` unassigns.
  Assign(Option<Uuid>),
}

impl BulkAction {
  pub fn name(&self) -> &'static str {
    match self {
      Self::Delete => "delete",
      Self::ToggleStatus => "toggle_status",
      Self::ChangeCategory(_) => "change_category",
      Self::ChangeEstado(_) => "change_estado",
      Self::Assign(_) => "assign",
    }
  }

  pub fn applies_to(&self, kind: EntityKind) -> bool {
    match self {
      Self::Delete | Self::ToggleStatus => true,
      Self::ChangeCategory(_) | Self::ChangeEstado(_) | Self::Assign(_) => {
        kind == EntityKind::Reporte
      }
    }
  }
}

// ─── Results ─────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ItemOutcome {
  Succeeded,
  Failed { error: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BulkItemResult {
  pub id:      Uuid,
  #[serde(flatten)]
  pub outcome: ItemOutcome,
}

impl BulkItemResult {
  pub fn is_success(&self) -> bool { self.outcome == ItemOutcome::Succeeded }
}

/// One entry per requested id, in request order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BulkReport {
  pub kind:    EntityKind,
  pub action:  BulkAction,
  pub results: Vec<BulkItemResult>,
}

impl BulkReport {
  pub fn succeeded(&self) -> usize {
    self.results.iter().filter(|r| r.is_success()).count()
  }

  pub fn failed(&self) -> usize { self.results.len() - self.succeeded() }

  pub fn failures(&self) -> impl Iterator<Item = &BulkItemResult> {
    self.results.iter().filter(|r| !r.is_success())
  }

  /// One-line summary suitable for a toast.
  pub fn summary(&self) -> String {
    let total = self.results.len();
    match self.failed() {
      0 => format!("{} {}: {total} ok", self.kind, self.action.name()),
      n => format!(
        "{} {}: {} ok, {n} failed",
        self.kind,
        self.action.name(),
        self.succeeded()
      ),
    }
  }
}

// ─── Confirmation flow ───────────────────────────────────────────────────────

/// `Idle → Confirming → Processing → Idle`. There is no terminal
/// partial-failure state; the report carries that.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum BulkFlow {
  #[default]
  Idle,
  Confirming { action: BulkAction, ids: Vec<Uuid> },
  Processing { action: BulkAction, total: usize },
}

impl BulkFlow {
  /// Open the confirmation dialog. Ignored unless idle or when nothing is
  /// selected.
  pub fn request(&mut self, action: BulkAction, ids: Vec<Uuid>) -> bool {
    if *self != BulkFlow::Idle || ids.is_empty() {
      return false;
    }
    *self = BulkFlow::Confirming { action, ids };
    true
  }

  pub fn cancel(&mut self) {
    if matches!(self, BulkFlow::Confirming { .. }) {
      *self = BulkFlow::Idle;
    }
  }

  /// Leave the dialog and start processing. Returns the work to run.
  pub fn confirm(&mut self) -> Option<(BulkAction, Vec<Uuid>)> {
    match std::mem::take(self) {
      BulkFlow::Confirming { action, ids } => {
        *self = BulkFlow::Processing {
          action: action.clone(),
          total:  ids.len(),
        };
        Some((action, ids))
      }
      other => {
        *self = other;
        None
      }
    }
  }

  pub fn finish(&mut self) {
    if matches!(self, BulkFlow::Processing { .. }) {
      *self = BulkFlow::Idle;
    }
  }

  pub fn is_busy(&self) -> bool { *self != BulkFlow::Idle }
}

// ─── Orchestrator ────────────────────────────────────────────────────────────

/// Permits for a run over `items` ids: at least one, never more than there
/// are ids or than [`MAX_BULK_CONCURRENCY`].
fn effective_concurrency(requested: usize, items: usize) -> usize {
  requested.clamp(1, items.clamp(1, MAX_BULK_CONCURRENCY))
}

/// Apply `action` to every id in `ids`, at most `concurrency` at a time.
///
/// Errors only when `action` does not apply to `kind`; per-record failures
/// land in the report. A `bulk_action` activity summarising the run is
/// recorded afterwards; failing to record it is logged, not returned.
pub async fn run_bulk<S>(
  store: Arc<S>,
  kind: EntityKind,
  action: BulkAction,
  ids: Vec<Uuid>,
  actor: Actor,
  concurrency: usize,
) -> Result<BulkReport>
where
  S: GeoStore + 'static,
{
  if !action.applies_to(kind) {
    return Err(Error::UnsupportedAction { action: action.name(), kind });
  }

  let permits = Arc::new(Semaphore::new(effective_concurrency(concurrency, ids.len())));
  let mut tasks = JoinSet::new();

  for (idx, id) in ids.iter().copied().enumerate() {
    let store = store.clone();
    let permits = permits.clone();
    let action = action.clone();
    tasks.spawn(async move {
      let _permit = permits.acquire_owned().await;
      let outcome = apply_one(store.as_ref(), kind, &action, id, actor).await;
      (idx, outcome)
    });
  }

  let mut results: Vec<BulkItemResult> = ids
    .iter()
    .map(|&id| BulkItemResult {
      id,
      outcome: ItemOutcome::Failed {
        error: "mutation did not complete".to_string(),
      },
    })
    .collect();

  while let Some(joined) = tasks.join_next().await {
    match joined {
      Ok((idx, Ok(()))) => {
        debug!(id = %results[idx].id, action = action.name(), "bulk item applied");
        results[idx].outcome = ItemOutcome::Succeeded;
      }
      Ok((idx, Err(error))) => {
        warn!(id = %results[idx].id, action = action.name(), %error, "bulk item failed");
        results[idx].outcome = ItemOutcome::Failed { error };
      }
      Err(e) => warn!(error = %e, "bulk worker did not finish"),
    }
  }

  let report = BulkReport { kind, action, results };

  let activity = NewActivity::new(ActivityType::BulkAction, report.summary())
    .by(actor)
    .on(kind.table(), None)
    .with_metadata(serde_json::json!({
      "action": report.action,
      "requested": report.results.len(),
      "succeeded": report.succeeded(),
      "failed": report.failed(),
    }));
  if let Err(e) = store.registrar_actividad(activity).await {
    warn!(error = %e, "could not record bulk activity");
  }

  Ok(report)
}

async fn apply_one<S: GeoStore>(
  store: &S,
  kind: EntityKind,
  action: &BulkAction,
  id: Uuid,
  actor: Actor,
) -> std::result::Result<(), String> {
  match kind {
    EntityKind::Category => apply_common::<S, CategoryFields>(store, action, id, actor).await,
    EntityKind::Estado => apply_common::<S, EstadoFields>(store, action, id, actor).await,
    EntityKind::Role => apply_common::<S, RoleFields>(store, action, id, actor).await,
    EntityKind::User => apply_common::<S, UserFields>(store, action, id, actor).await,
    EntityKind::Reporte => {
      let patch = match action {
        BulkAction::ChangeCategory(c) => ReportePatch {
          category_id: Some(*c),
          ..Default::default()
        },
        BulkAction::ChangeEstado(e) => ReportePatch {
          estado_id: Some(*e),
          ..Default::default()
        },
        BulkAction::Assign(a) => ReportePatch {
          assigned_to: Some(*a),
          ..Default::default()
        },
        BulkAction::Delete | BulkAction::ToggleStatus => {
          return apply_common::<S, ReporteFields>(store, action, id, actor).await;
        }
      };
      store
        .update::<ReporteFields>(id, patch, actor)
        .await
        .map(drop)
        .map_err(|e| e.to_string())
    }
  }
}

async fn apply_common<S: GeoStore, E: Entity>(
  store: &S,
  action: &BulkAction,
  id: Uuid,
  actor: Actor,
) -> std::result::Result<(), String> {
  let result = match action {
    BulkAction::Delete => store.soft_delete::<E>(id, actor).await,
    BulkAction::ToggleStatus => store.toggle_active::<E>(id, actor).await,
    other => {
      return Err(format!("{} does not apply to {}", other.name(), E::KIND));
    }
  };
  result.map(drop).map_err(|e| e.to_string())
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::testing::MemoryStore;

  #[test]
  fn flow_walks_through_states() {
    let mut flow = BulkFlow::default();
    assert!(!flow.request(BulkAction::Delete, vec![]));
    assert!(flow.request(BulkAction::Delete, vec![Uuid::nil()]));
    assert!(flow.is_busy());
    assert!(!flow.request(BulkAction::ToggleStatus, vec![Uuid::nil()]));

    let (action, ids) = flow.confirm().unwrap();
    assert_eq!(action, BulkAction::Delete);
    assert_eq!(ids.len(), 1);
    assert!(matches!(flow, BulkFlow::Processing { total: 1, .. }));
    assert!(flow.confirm().is_none());

    flow.finish();
    assert_eq!(flow, BulkFlow::Idle);
  }

  #[test]
  fn cancel_only_leaves_confirming() {
    let mut flow = BulkFlow::default();
    flow.request(BulkAction::Delete, vec![Uuid::nil()]);
    flow.cancel();
    assert_eq!(flow, BulkFlow::Idle);

    flow.request(BulkAction::Delete, vec![Uuid::nil()]);
    flow.confirm();
    flow.cancel();
    assert!(matches!(flow, BulkFlow::Processing { .. }));
  }

  #[test]
  fn action_serialises_tagged() {
    let json = serde_json::to_value(BulkAction::Assign(None)).unwrap();
    assert_eq!(json, serde_json::json!({"kind": "assign", "value": null}));
    let back: BulkAction =
      serde_json::from_value(serde_json::json!({"kind": "delete"})).unwrap();
    assert_eq!(back, BulkAction::Delete);
  }

  #[tokio::test]
  async fn delete_issues_one_update_per_id() {
    let store = Arc::new(MemoryStore::default());
    let mut ids = Vec::new();
    for n in 0..5 {
      ids.push(store.seed_category(&format!("cat {n}")));
    }

    let report = run_bulk(
      store.clone(),
      EntityKind::Category,
      BulkAction::Delete,
      ids.clone(),
      None,
      2,
    )
    .await
    .unwrap();

    assert_eq!(report.succeeded(), 5);
    assert_eq!(store.soft_delete_calls(), 5);
    for id in &ids {
      assert!(store.deleted_at(*id).is_some());
    }
    assert_eq!(store.activities(), 1);
  }

  #[tokio::test]
  async fn failures_are_isolated_and_ordered() {
    let store = Arc::new(MemoryStore::default());
    let a = store.seed_category("a");
    let missing = Uuid::new_v4();
    let c = store.seed_category("c");

    let report = run_bulk(
      store.clone(),
      EntityKind::Category,
      BulkAction::Delete,
      vec![a, missing, c],
      None,
      1,
    )
    .await
    .unwrap();

    assert_eq!(report.results.iter().map(|r| r.id).collect::<Vec<_>>(), vec![
      a, missing, c
    ]);
    assert!(report.results[0].is_success());
    assert!(!report.results[1].is_success());
    assert!(report.results[2].is_success());
    assert_eq!(report.failed(), 1);
    assert!(report.summary().contains("1 failed"));
  }

  #[test]
  fn concurrency_is_bounded() {
    assert_eq!(effective_concurrency(0, 5), 1);
    assert_eq!(effective_concurrency(4, 0), 1);
    assert_eq!(effective_concurrency(4, 2), 2);
    assert_eq!(effective_concurrency(usize::MAX, 1000), MAX_BULK_CONCURRENCY);
  }

  #[tokio::test]
  async fn oversized_concurrency_still_runs() {
    let store = Arc::new(MemoryStore::default());
    let ids = vec![store.seed_category("a"), store.seed_category("b")];

    let report = run_bulk(
      store.clone(),
      EntityKind::Category,
      BulkAction::Delete,
      ids,
      None,
      usize::MAX,
    )
    .await
    .unwrap();
    assert_eq!(report.succeeded(), 2);
  }

  #[tokio::test]
  async fn reporte_only_actions_rejected_elsewhere() {
    let store = Arc::new(MemoryStore::default());
    let err = run_bulk(
      store.clone(),
      EntityKind::Estado,
      BulkAction::ChangeEstado(Uuid::new_v4()),
      vec![Uuid::new_v4()],
      None,
      DEFAULT_BULK_CONCURRENCY,
    )
    .await
    .unwrap_err();
    assert!(matches!(err, Error::UnsupportedAction { .. }));
    assert_eq!(store.soft_delete_calls(), 0);
  }
}
