#![forbid(unsafe_code)]

//! Dependency registry: tag → observers, partitioned by [`ConditionKind`].
//!
//! Observers are held weakly; the registry never keeps a row or section
//! alive. Ownership stays with the form tree and entries are removed
//! explicitly when an observer's condition is cleared or it leaves the form.
//!
//! # Invariants
//!
//! 1. Each `(tag, kind)` list holds a given observer at most once.
//! 2. Observer lists are kept in registration order.
//! 3. Empty tag entries are pruned, so `tags()` only yields live dependencies.

use std::rc::Weak;
use std::sync::atomic::{AtomicU64, Ordering};

use ahash::AHashMap;

use crate::condition::ConditionKind;

static NEXT_NODE_ID: AtomicU64 = AtomicU64::new(1);

/// Process-unique identity of a row or section.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(u64);

impl NodeId {
    pub(crate) fn next() -> Self {
        Self(NEXT_NODE_ID.fetch_add(1, Ordering::Relaxed))
    }

    #[must_use]
    pub const fn get(self) -> u64 {
        self.0
    }
}

/// Something whose cached flags can be recomputed from its conditions.
pub(crate) trait Observer {
    fn evaluate_hidden(&self);
    fn evaluate_disabled(&self);
}

#[derive(Clone)]
struct ObserverEntry {
    id: NodeId,
    observer: Weak<dyn Observer>,
}

#[derive(Default)]
struct Observers {
    hidden: Vec<ObserverEntry>,
    disabled: Vec<ObserverEntry>,
}

impl Observers {
    fn list(&self, kind: ConditionKind) -> &Vec<ObserverEntry> {
        match kind {
            ConditionKind::Hidden => &self.hidden,
            ConditionKind::Disabled => &self.disabled,
        }
    }

    fn list_mut(&mut self, kind: ConditionKind) -> &mut Vec<ObserverEntry> {
        match kind {
            ConditionKind::Hidden => &mut self.hidden,
            ConditionKind::Disabled => &mut self.disabled,
        }
    }

    fn is_empty(&self) -> bool {
        self.hidden.is_empty() && self.disabled.is_empty()
    }
}

#[derive(Default)]
pub(crate) struct DependencyRegistry {
    entries: AHashMap<String, Observers>,
}

impl DependencyRegistry {
    /// Register `observer` under `tag`. Returns `false` if it already was.
    pub(crate) fn add(
        &mut self,
        tag: &str,
        kind: ConditionKind,
        id: NodeId,
        observer: Weak<dyn Observer>,
    ) -> bool {
        let list = self
            .entries
            .entry(tag.to_owned())
            .or_default()
            .list_mut(kind);
        if list.iter().any(|entry| entry.id == id) {
            return false;
        }
        list.push(ObserverEntry { id, observer });
        true
    }

    pub(crate) fn remove(&mut self, tag: &str, kind: ConditionKind, id: NodeId) -> bool {
        let Some(observers) = self.entries.get_mut(tag) else {
            return false;
        };
        let list = observers.list_mut(kind);
        let before = list.len();
        list.retain(|entry| entry.id != id);
        let removed = list.len() != before;
        if observers.is_empty() {
            self.entries.remove(tag);
        }
        removed
    }

    /// Drop `id` from every tag and kind.
    pub(crate) fn remove_observer(&mut self, id: NodeId) {
        self.entries.retain(|_, observers| {
            observers.hidden.retain(|entry| entry.id != id);
            observers.disabled.retain(|entry| entry.id != id);
            !observers.is_empty()
        });
    }

    /// Snapshot of the observers registered under `tag`, in registration order.
    pub(crate) fn observers(&self, tag: &str, kind: ConditionKind) -> Vec<Weak<dyn Observer>> {
        self.entries
            .get(tag)
            .map(|observers| {
                observers
                    .list(kind)
                    .iter()
                    .map(|entry| entry.observer.clone())
                    .collect()
            })
            .unwrap_or_default()
    }

    pub(crate) fn count(&self, tag: &str, kind: ConditionKind) -> usize {
        self.entries
            .get(tag)
            .map_or(0, |observers| observers.list(kind).len())
    }

    pub(crate) fn contains(&self, tag: &str, kind: ConditionKind, id: NodeId) -> bool {
        self.entries
            .get(tag)
            .is_some_and(|observers| observers.list(kind).iter().any(|entry| entry.id == id))
    }

    /// Whether any entry references `id`.
    pub(crate) fn references(&self, id: NodeId) -> bool {
        self.entries.values().any(|observers| {
            observers
                .hidden
                .iter()
                .chain(&observers.disabled)
                .any(|entry| entry.id == id)
        })
    }

    pub(crate) fn tags(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;
    use std::rc::Rc;

    struct Spy {
        id: NodeId,
        hidden_calls: Cell<u32>,
        disabled_calls: Cell<u32>,
    }

    impl Spy {
        fn new() -> Rc<Self> {
            Rc::new(Self {
                id: NodeId::next(),
                hidden_calls: Cell::new(0),
                disabled_calls: Cell::new(0),
            })
        }
    }

    impl Observer for Spy {
        fn evaluate_hidden(&self) {
            self.hidden_calls.set(self.hidden_calls.get() + 1);
        }

        fn evaluate_disabled(&self) {
            self.disabled_calls.set(self.disabled_calls.get() + 1);
        }
    }

    fn weak(spy: &Rc<Spy>) -> Weak<dyn Observer> {
        let weak: Weak<Spy> = Rc::downgrade(spy);
        weak
    }

    #[test]
    fn node_ids_are_unique() {
        assert_ne!(NodeId::next(), NodeId::next());
    }

    #[test]
    fn add_is_idempotent() {
        let spy = Spy::new();
        let mut registry = DependencyRegistry::default();
        assert!(registry.add("a", ConditionKind::Hidden, spy.id, weak(&spy)));
        assert!(!registry.add("a", ConditionKind::Hidden, spy.id, weak(&spy)));
        assert_eq!(registry.count("a", ConditionKind::Hidden), 1);
        assert_eq!(registry.count("a", ConditionKind::Disabled), 0);
    }

    #[test]
    fn kinds_are_partitioned() {
        let spy = Spy::new();
        let mut registry = DependencyRegistry::default();
        registry.add("a", ConditionKind::Disabled, spy.id, weak(&spy));
        for observer in registry.observers("a", ConditionKind::Disabled) {
            observer.upgrade().unwrap().evaluate_disabled();
        }
        assert!(registry.observers("a", ConditionKind::Hidden).is_empty());
        assert_eq!(spy.disabled_calls.get(), 1);
        assert_eq!(spy.hidden_calls.get(), 0);
    }

    #[test]
    fn remove_prunes_empty_tags() {
        let spy = Spy::new();
        let mut registry = DependencyRegistry::default();
        registry.add("a", ConditionKind::Hidden, spy.id, weak(&spy));
        assert!(registry.remove("a", ConditionKind::Hidden, spy.id));
        assert!(!registry.remove("a", ConditionKind::Hidden, spy.id));
        assert_eq!(registry.tags().count(), 0);
    }

    #[test]
    fn remove_observer_clears_every_entry() {
        let first = Spy::new();
        let second = Spy::new();
        let mut registry = DependencyRegistry::default();
        registry.add("a", ConditionKind::Hidden, first.id, weak(&first));
        registry.add("b", ConditionKind::Disabled, first.id, weak(&first));
        registry.add("b", ConditionKind::Disabled, second.id, weak(&second));

        registry.remove_observer(first.id);

        assert!(!registry.references(first.id));
        assert!(registry.contains("b", ConditionKind::Disabled, second.id));
        assert_eq!(registry.tags().collect::<Vec<_>>(), vec!["b"]);
    }

    #[test]
    fn observers_preserve_registration_order() {
        let spies: Vec<_> = (0..3).map(|_| Spy::new()).collect();
        let mut registry = DependencyRegistry::default();
        for spy in spies.iter().rev() {
            registry.add("t", ConditionKind::Hidden, spy.id, weak(spy));
        }
        let order: Vec<*const ()> = registry
            .observers("t", ConditionKind::Hidden)
            .iter()
            .map(|w| Rc::as_ptr(&w.upgrade().unwrap()).cast::<()>())
            .collect();
        let expected: Vec<*const ()> = spies.iter().rev().map(|p| Rc::as_ptr(p).cast::<()>()).collect();
        assert_eq!(order, expected);
    }
}
