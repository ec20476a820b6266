//! Purpose: Hold one collection's observable state and its merge rules.
//! Exports: `CollectionState`.
//! Role: Value published to subscribers; mutated only by the engine.
//! Invariants: `items` never holds two entries with the same id.
//! Invariants: `skip` only moves through `apply_page` and `reset`.

use super::error::FetchError;
use super::fetch::{Identified, Page};
use std::sync::Arc;

#[derive(Debug)]
pub struct CollectionState<T> {
    items: Vec<T>,
    skip: usize,
    has_more: bool,
    is_loading: bool,
    error: Option<Arc<FetchError>>,
    total: Option<usize>,
    selected: Option<T>,
}

impl<T> CollectionState<T> {
    pub fn items(&self) -> &[T] {
        &self.items
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Offset the next list fetch will request.
    pub fn skip(&self) -> usize {
        self.skip
    }

    pub fn has_more(&self) -> bool {
        self.has_more
    }

    pub fn is_loading(&self) -> bool {
        self.is_loading
    }

    /// Last list-fetch failure; cleared when the next list fetch starts.
    pub fn error(&self) -> Option<&Arc<FetchError>> {
        self.error.as_ref()
    }

    /// Collection size last reported by the fetcher, if it reports one.
    pub fn total(&self) -> Option<usize> {
        self.total
    }

    /// Item most recently loaded through `get_detail`.
    pub fn selected(&self) -> Option<&T> {
        self.selected.as_ref()
    }
}

impl<T: Identified> CollectionState<T> {
    pub fn get(&self, id: &T::Id) -> Option<&T> {
        self.items.iter().find(|item| item.id() == id)
    }

    pub fn contains(&self, id: &T::Id) -> bool {
        self.position(id).is_some()
    }

    fn position(&self, id: &T::Id) -> Option<usize> {
        self.items.iter().position(|item| item.id() == id)
    }

    pub(crate) fn begin_fetch(&mut self) {
        self.is_loading = true;
        self.error = None;
    }

    pub(crate) fn reset(&mut self) {
        self.items.clear();
        self.skip = 0;
        self.has_more = true;
        self.total = None;
        self.error = None;
    }

    pub(crate) fn fail(&mut self, error: FetchError) {
        self.is_loading = false;
        self.error = Some(Arc::new(error));
    }

    /// Merge a list page: replace known ids in place, append new ones in order.
    pub(crate) fn apply_page(&mut self, page: Page<T>, page_size: usize) {
        let received = page.items.len();
        for item in page.items {
            match self.position(item.id()) {
                Some(index) => self.items[index] = item,
                None => self.items.push(item),
            }
        }
        self.skip += received;
        if page.total.is_some() {
            self.total = page.total;
        }
        self.has_more = received == page_size && self.total.is_none_or(|total| self.skip < total);
        self.is_loading = false;
    }

    /// Replace the list copy if the id is already listed; never inserts.
    pub(crate) fn refresh_in_place(&mut self, item: T) -> bool {
        match self.position(item.id()) {
            Some(index) => {
                self.items[index] = item;
                true
            }
            None => false,
        }
    }

    /// Replace in place, or insert at the head for newly created items.
    pub(crate) fn upsert_front(&mut self, item: T) {
        match self.position(item.id()) {
            Some(index) => self.items[index] = item,
            None => self.items.insert(0, item),
        }
    }

    pub(crate) fn remove(&mut self, id: &T::Id) -> Option<T> {
        if self.selected.as_ref().is_some_and(|item| item.id() == id) {
            self.selected = None;
        }
        self.position(id).map(|index| self.items.remove(index))
    }

    pub(crate) fn select(&mut self, item: Option<T>) {
        self.selected = item;
    }
}

impl<T> Default for CollectionState<T> {
    fn default() -> Self {
        Self {
            items: Vec::new(),
            skip: 0,
            has_more: true,
            is_loading: false,
            error: None,
            total: None,
            selected: None,
        }
    }
}

impl<T: Clone> Clone for CollectionState<T> {
    fn clone(&self) -> Self {
        Self {
            items: self.items.clone(),
            skip: self.skip,
            has_more: self.has_more,
            is_loading: self.is_loading,
            error: self.error.clone(),
            total: self.total,
            selected: self.selected.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::CollectionState;
    use crate::core::error::{ErrorKind, FetchError};
    use crate::core::fetch::{Identified, Page};

    #[derive(Clone, Debug, PartialEq)]
    struct Note {
        id: u32,
        body: &'static str,
    }

    impl Identified for Note {
        type Id = u32;

        fn id(&self) -> &u32 {
            &self.id
        }
    }

    fn note(id: u32, body: &'static str) -> Note {
        Note { id, body }
    }

    fn ids(state: &CollectionState<Note>) -> Vec<u32> {
        state.items().iter().map(|item| item.id).collect()
    }

    #[test]
    fn apply_page_replaces_known_ids_in_place() {
        let mut state = CollectionState::default();
        state.apply_page(Page::new(vec![note(1, "a"), note(2, "b"), note(3, "c")]), 3);
        state.apply_page(Page::new(vec![note(2, "b2"), note(4, "d")]), 3);

        assert_eq!(ids(&state), vec![1, 2, 3, 4]);
        assert_eq!(state.get(&2).map(|item| item.body), Some("b2"));
        assert_eq!(state.skip(), 5);
        assert!(!state.has_more());
    }

    #[test]
    fn total_bounds_has_more() {
        let mut state = CollectionState::default();
        state.apply_page(Page::new(vec![note(1, "a"), note(2, "b")]).with_total(2), 2);
        assert!(!state.has_more());
        assert_eq!(state.total(), Some(2));

        let mut state = CollectionState::default();
        state.apply_page(Page::new(vec![note(1, "a"), note(2, "b")]).with_total(5), 2);
        assert!(state.has_more());
    }

    #[test]
    fn upsert_front_inserts_new_ids_at_head() {
        let mut state = CollectionState::default();
        state.apply_page(Page::new(vec![note(1, "a"), note(2, "b")]), 10);
        state.upsert_front(note(9, "new"));
        state.upsert_front(note(2, "edited"));

        assert_eq!(ids(&state), vec![9, 1, 2]);
        assert_eq!(state.get(&2).map(|item| item.body), Some("edited"));
        assert_eq!(state.skip(), 2);
    }

    #[test]
    fn refresh_in_place_never_inserts() {
        let mut state = CollectionState::default();
        state.apply_page(Page::new(vec![note(1, "a")]), 10);
        assert!(!state.refresh_in_place(note(7, "x")));
        assert!(state.refresh_in_place(note(1, "a2")));
        assert_eq!(ids(&state), vec![1]);
        assert_eq!(state.get(&1).map(|item| item.body), Some("a2"));
    }

    #[test]
    fn remove_clears_matching_selection() {
        let mut state = CollectionState::default();
        state.apply_page(Page::new(vec![note(1, "a"), note(2, "b")]), 10);
        state.select(Some(note(2, "b")));

        let removed = state.remove(&2).expect("removed");
        assert_eq!(removed.id, 2);
        assert!(state.selected().is_none());
        assert_eq!(ids(&state), vec![1]);
        assert_eq!(state.skip(), 2);
    }

    #[test]
    fn fail_keeps_items_and_paging() {
        let mut state = CollectionState::default();
        state.apply_page(Page::new(vec![note(1, "a"), note(2, "b")]), 2);
        state.begin_fetch();
        state.fail(FetchError::new(ErrorKind::Io));

        assert!(!state.is_loading());
        assert!(state.has_more());
        assert_eq!(state.skip(), 2);
        assert_eq!(state.error().map(|err| err.kind()), Some(ErrorKind::Io));

        state.begin_fetch();
        assert!(state.error().is_none());
    }
}
