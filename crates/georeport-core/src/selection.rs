//! Multi-row selection for list views.
//!
//! A [`SelectionSet`] only remembers ids. Every query takes the live item
//! collection as an argument and recomputes against it, so the answers always
//! describe what is on screen now, not what was loaded when rows were
//! selected.
//!
//! The set never prunes itself. If a filter hides selected rows, their ids
//! stay selected: [`SelectionSet::selected_data`] silently skips them while
//! [`SelectionSet::selected_count`] keeps counting them. Callers that want the
//! two to agree call [`SelectionSet::reconcile`] explicitly.

use std::collections::HashSet;

use uuid::Uuid;

use crate::{entity::Record, notification::Notification};

/// Anything with a stable row id.
pub trait Selectable {
  fn selection_id(&self) -> Uuid;
}

impl<F> Selectable for Record<F> {
  fn selection_id(&self) -> Uuid { self.id }
}

impl Selectable for Notification {
  fn selection_id(&self) -> Uuid { self.id }
}

impl<T: Selectable + ?Sized> Selectable for &T {
  fn selection_id(&self) -> Uuid { (**self).selection_id() }
}

/// Header checkbox state for a list.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SelectionState {
  None,
  Partial,
  All,
}

#[derive(Debug, Clone, Default)]
pub struct SelectionSet {
  selected: HashSet<Uuid>,
}

impl SelectionSet {
  pub fn new() -> Self { Self::default() }

  /// Clear when everything in `items` is already selected; otherwise replace
  /// the selection with exactly the ids of `items`.
  pub fn select_all<T: Selectable>(&mut self, items: &[T]) {
    if self.is_all_selected(items) {
      self.selected.clear();
    } else {
      self.selected = items.iter().map(Selectable::selection_id).collect();
    }
  }

  /// Flip membership of `id`. Returns whether `id` is selected afterwards.
  pub fn toggle(&mut self, id: Uuid) -> bool {
    if self.selected.remove(&id) {
      false
    } else {
      self.selected.insert(id);
      true
    }
  }

  pub fn clear(&mut self) { self.selected.clear(); }

  pub fn contains(&self, id: Uuid) -> bool { self.selected.contains(&id) }

  /// Raw number of selected ids, visible or not.
  pub fn selected_count(&self) -> usize { self.selected.len() }

  pub fn is_empty(&self) -> bool { self.selected.is_empty() }

  pub fn is_all_selected<T: Selectable>(&self, items: &[T]) -> bool {
    !items.is_empty() && self.selected.len() == items.len()
  }

  pub fn is_indeterminate<T: Selectable>(&self, items: &[T]) -> bool {
    !self.selected.is_empty() && self.selected.len() < items.len()
  }

  pub fn state<T: Selectable>(&self, items: &[T]) -> SelectionState {
    if self.is_all_selected(items) {
      SelectionState::All
    } else if self.is_indeterminate(items) {
      SelectionState::Partial
    } else {
      SelectionState::None
    }
  }

  /// The items of `items` whose id is selected, in collection order.
  pub fn selected_data<'a, T: Selectable>(&self, items: &'a [T]) -> Vec<&'a T> {
    items
      .iter()
      .filter(|i| self.selected.contains(&i.selection_id()))
      .collect()
  }

  /// Selected ids that are not present in `items`.
  pub fn hidden_count<T: Selectable>(&self, items: &[T]) -> usize {
    self.selected_count() - self.selected_data(items).len()
  }

  /// Drop selected ids that are not present in `items`. Returns how many
  /// were dropped.
  pub fn reconcile<T: Selectable>(&mut self, items: &[T]) -> usize {
    let present: HashSet<Uuid> =
      items.iter().map(Selectable::selection_id).collect();
    let before = self.selected.len();
    self.selected.retain(|id| present.contains(id));
    before - self.selected.len()
  }

  /// All selected ids, sorted for stable iteration.
  pub fn ids(&self) -> Vec<Uuid> {
    let mut ids: Vec<Uuid> = self.selected.iter().copied().collect();
    ids.sort();
    ids
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[derive(Debug, Clone, PartialEq)]
  struct Row(Uuid);

  impl Selectable for Row {
    fn selection_id(&self) -> Uuid { self.0 }
  }

  fn rows(n: usize) -> Vec<Row> { (0..n).map(|_| Row(Uuid::new_v4())).collect() }

  fn assert_consistent(sel: &SelectionSet, items: &[Row]) {
    let all = sel.is_all_selected(items);
    let partial = sel.is_indeterminate(items);
    assert!(!(all && partial), "all and indeterminate are exclusive");
    if all {
      assert_eq!(sel.selected_count(), items.len());
    }
    if partial {
      assert!(sel.selected_count() > 0 && sel.selected_count() < items.len());
    }
  }

  #[test]
  fn state_flags_hold_for_every_prefix() {
    for n in 0..6 {
      let items = rows(n);
      let mut sel = SelectionSet::new();
      assert_consistent(&sel, &items);
      for item in &items {
        sel.toggle(item.0);
        assert_consistent(&sel, &items);
      }
      assert_eq!(sel.is_all_selected(&items), n > 0);
    }
  }

  #[test]
  fn empty_collection_is_never_all_selected() {
    let sel = SelectionSet::new();
    let items: Vec<Row> = vec![];
    assert!(!sel.is_all_selected(&items));
    assert_eq!(sel.state(&items), SelectionState::None);
  }

  #[test]
  fn toggle_twice_restores() {
    let items = rows(3);
    let mut sel = SelectionSet::new();
    sel.toggle(items[0].0);
    let before = sel.ids();

    assert!(sel.toggle(items[1].0));
    assert!(!sel.toggle(items[1].0));
    assert_eq!(sel.ids(), before);

    assert!(!sel.toggle(items[0].0));
    assert!(sel.toggle(items[0].0));
    assert_eq!(sel.ids(), before);
  }

  #[test]
  fn select_all_selects_then_clears() {
    let items = rows(4);
    let mut sel = SelectionSet::new();
    sel.toggle(items[2].0);
    assert_eq!(sel.state(&items), SelectionState::Partial);

    sel.select_all(&items);
    assert_eq!(sel.selected_count(), 4);
    assert_eq!(sel.state(&items), SelectionState::All);

    sel.select_all(&items);
    assert!(sel.is_empty());
  }

  #[test]
  fn select_all_is_not_cumulative() {
    let first = rows(3);
    let second = rows(2);
    let mut sel = SelectionSet::new();
    sel.select_all(&first);
    sel.select_all(&second);
    assert_eq!(sel.selected_count(), 2);
    assert!(second.iter().all(|r| sel.contains(r.0)));
    assert!(first.iter().all(|r| !sel.contains(r.0)));
  }

  #[test]
  fn filtered_list_drops_stale_rows_but_keeps_count() {
    let all = rows(5);
    let (a, b, c, d) = (&all[0], &all[1], &all[2], &all[3]);
    let mut sel = SelectionSet::new();
    sel.toggle(a.0);
    sel.toggle(b.0);
    sel.toggle(c.0);

    let filtered = vec![a.clone(), d.clone()];
    let data = sel.selected_data(&filtered);
    assert_eq!(data, vec![a]);
    assert_eq!(sel.selected_count(), 3);
    assert_eq!(sel.hidden_count(&filtered), 2);
  }

  #[test]
  fn reconcile_prunes_hidden_ids() {
    let all = rows(5);
    let mut sel = SelectionSet::new();
    sel.select_all(&all);

    let visible = &all[..2];
    assert_eq!(sel.reconcile(visible), 3);
    assert_eq!(sel.selected_count(), 2);
    assert!(sel.is_all_selected(visible));
  }

  #[test]
  fn works_over_borrowed_rows() {
    let items = rows(3);
    let view: Vec<&Row> = items.iter().skip(1).collect();
    let mut sel = SelectionSet::new();
    sel.select_all(&view);
    assert_eq!(sel.selected_data(&items).len(), 2);
  }
}
