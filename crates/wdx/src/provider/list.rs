// SPDX-License-Identifier: MPL-2.0

//! Registry list for providers of one kind.
//!
//! Entries pair a provider handle (identified by `Arc` pointer) with
//! registration data. `for_each` iterates over a snapshot, so callbacks may
//! call providers or re-enter the list without holding its lock; concurrent
//! add/remove is tolerated.

use parking_lot::Mutex;
use std::sync::Arc;

pub struct ProviderList<P: ?Sized, D> {
    entries: Mutex<Vec<(Arc<P>, D)>>,
}

impl<P: ?Sized, D: Clone> ProviderList<P, D> {
    pub fn new() -> Self {
        ProviderList {
            entries: Mutex::new(Vec::new()),
        }
    }

    fn position(entries: &[(Arc<P>, D)], provider: &Arc<P>) -> Option<usize> {
        entries
            .iter()
            .position(|(p, _)| Arc::ptr_eq(p, provider))
    }

    /// Adds a provider. Returns false when the same handle is already
    /// registered.
    pub fn add(&self, provider: Arc<P>, data: D) -> bool {
        let mut entries = self.entries.lock();
        if Self::position(&entries, &provider).is_some() {
            return false;
        }
        entries.push((provider, data));
        true
    }

    /// Removes a provider by handle identity.
    pub fn remove(&self, provider: &Arc<P>) -> bool {
        let mut entries = self.entries.lock();
        match Self::position(&entries, provider) {
            Some(idx) => {
                entries.remove(idx);
                true
            }
            None => false,
        }
    }

    /// Replaces the registration data of a known provider.
    pub fn update_data(&self, provider: &Arc<P>, data: D) -> bool {
        let mut entries = self.entries.lock();
        match Self::position(&entries, provider) {
            Some(idx) => {
                entries[idx].1 = data;
                true
            }
            None => false,
        }
    }

    /// First provider whose entry satisfies the predicate.
    pub fn find(&self, mut predicate: impl FnMut(&Arc<P>, &D) -> bool) -> Option<Arc<P>> {
        let entries = self.entries.lock();
        entries
            .iter()
            .find(|(p, d)| predicate(p, d))
            .map(|(p, _)| Arc::clone(p))
    }

    /// Registration data of the first matching entry.
    pub fn find_data(&self, mut predicate: impl FnMut(&Arc<P>, &D) -> bool) -> Option<D> {
        let entries = self.entries.lock();
        entries
            .iter()
            .find(|(p, d)| predicate(p, d))
            .map(|(_, d)| d.clone())
    }

    /// Calls `f` for every entry of a snapshot taken at entry.
    pub fn for_each(&self, mut f: impl FnMut(&Arc<P>, &D)) {
        let snapshot: Vec<(Arc<P>, D)> = self.entries.lock().clone();
        for (provider, data) in &snapshot {
            f(provider, data);
        }
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }
}

impl<P: ?Sized, D: Clone> Default for ProviderList<P, D> {
    fn default() -> Self {
        ProviderList::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_add_rejects_duplicate_handle() {
        let list: ProviderList<str, u32> = ProviderList::new();
        let provider: Arc<str> = Arc::from("p1");
        assert!(list.add(Arc::clone(&provider), 1));
        assert!(!list.add(Arc::clone(&provider), 2));
        assert_eq!(list.len(), 1);
    }

    #[test]
    fn test_identity_is_pointer_not_value() {
        let list: ProviderList<str, u32> = ProviderList::new();
        let first: Arc<str> = Arc::from("same");
        let second: Arc<str> = Arc::from("same");
        assert!(list.add(first, 1));
        assert!(list.add(second, 2));
        assert_eq!(list.len(), 2);
    }

    #[test]
    fn test_update_and_find_data() {
        let list: ProviderList<str, u32> = ProviderList::new();
        let provider: Arc<str> = Arc::from("p");
        list.add(Arc::clone(&provider), 1);
        assert!(list.update_data(&provider, 9));
        assert_eq!(list.find_data(|_, d| *d == 9), Some(9));
        let unknown: Arc<str> = Arc::from("other");
        assert!(!list.update_data(&unknown, 5));
    }

    #[test]
    fn test_remove() {
        let list: ProviderList<str, u32> = ProviderList::new();
        let provider: Arc<str> = Arc::from("p");
        list.add(Arc::clone(&provider), 1);
        assert!(list.remove(&provider));
        assert!(!list.remove(&provider));
        assert!(list.is_empty());
    }

    #[test]
    fn test_for_each_snapshot_allows_reentry() {
        let list: Arc<ProviderList<str, u32>> = Arc::new(ProviderList::new());
        let provider: Arc<str> = Arc::from("p");
        list.add(Arc::clone(&provider), 1);
        let list2 = Arc::clone(&list);
        let mut seen = 0;
        list.for_each(|_, _| {
            // re-entering the list from the callback must not deadlock
            let extra: Arc<str> = Arc::from("extra");
            list2.add(extra, 2);
            seen += 1;
        });
        assert_eq!(seen, 1);
        assert_eq!(list.len(), 2);
    }
}
