use std::sync::Arc;

use crate::{
    ir::instr::CallType,
    runtime::{Method, RModule},
    value::Value,
};

// Small polymorphic call-site caches (4-way). Entries remember the method
// generation they were resolved under and go stale when it moves. A scope
// copied by the pass manager keeps its id, so a site key can outlive the
// instruction it was created for; the name check keeps such entries inert.
#[derive(Clone)]
pub(super) struct CallEntry {
    pub(super) name: Arc<str>,
    pub(super) receiver_key: u64,
    pub(super) call_type: CallType,
    pub(super) generation: u64,
    pub(super) method: Arc<Method>,
    pub(super) owner: Arc<RModule>,
}

impl CallEntry {
    fn matches(&self, name: &str, receiver_key: u64, call_type: CallType) -> bool {
        self.receiver_key == receiver_key && self.call_type == call_type && self.name.as_ref() == name
    }
}

pub(super) enum CacheCheck {
    Hit(Arc<Method>, Arc<RModule>),
    /// Same receiver shape, resolved under an older generation
    Stale,
    Miss,
}

#[derive(Clone, Default)]
pub(super) struct CallSiteCache {
    entries: [Option<CallEntry>; 4],
    next: usize,
}

impl CallSiteCache {
    pub(super) fn check(&self, name: &str, receiver_key: u64, call_type: CallType, generation: u64) -> CacheCheck {
        for entry in self.entries.iter().flatten() {
            if entry.matches(name, receiver_key, call_type) {
                if entry.generation == generation {
                    return CacheCheck::Hit(entry.method.clone(), entry.owner.clone());
                }
                return CacheCheck::Stale;
            }
        }
        CacheCheck::Miss
    }

    pub(super) fn store(&mut self, entry: CallEntry) {
        let slot = self
            .entries
            .iter()
            .position(|e| {
                e.as_ref()
                    .is_some_and(|e| e.matches(&entry.name, entry.receiver_key, entry.call_type))
            })
            .or_else(|| self.entries.iter().position(Option::is_none))
            .unwrap_or_else(|| {
                let victim = self.next;
                self.next = (self.next + 1) % self.entries.len();
                victim
            });
        self.entries[slot] = Some(entry);
    }

    pub(super) fn len(&self) -> usize {
        self.entries.iter().flatten().count()
    }
}

/// Constant lookup result pinned to the constant name and generation.
#[derive(Clone)]
pub(super) struct ConstEntry {
    pub(super) name: Arc<str>,
    pub(super) value: Value,
    pub(super) generation: u64,
}

impl ConstEntry {
    pub(super) fn get(&self, name: &str, generation: u64) -> Option<Value> {
        (self.generation == generation && self.name.as_ref() == name).then(|| self.value.clone())
    }
}

/// Counters exposed for tests and `irx run --stats`.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    /// Entries found but resolved under an older method generation
    pub invalidations: u64,
    /// Lookups that skipped the cache (refined sites, caches disabled)
    pub bypassed: u64,
    pub deopts: u64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::MethodBody;

    fn entry(key: u64, generation: u64) -> CallEntry {
        CallEntry {
            name: "m".into(),
            receiver_key: key,
            call_type: CallType::Normal,
            generation,
            method: Arc::new(Method {
                name: "m".into(),
                body: MethodBody::Native(|_, _, _, _| Ok(Value::Nil)),
                visibility: crate::runtime::Visibility::Public,
            }),
            owner: RModule::new_class("C", None),
        }
    }

    #[test]
    fn stale_entries_are_reported_then_replaced() {
        let mut cache = CallSiteCache::default();
        cache.store(entry(1, 1));
        assert!(matches!(cache.check("m", 1, CallType::Normal, 1), CacheCheck::Hit(..)));
        assert!(matches!(cache.check("m", 1, CallType::Normal, 2), CacheCheck::Stale));
        assert!(matches!(cache.check("m", 1, CallType::Functional, 1), CacheCheck::Miss));
        cache.store(entry(1, 2));
        assert_eq!(cache.len(), 1);
        assert!(matches!(cache.check("m", 1, CallType::Normal, 2), CacheCheck::Hit(..)));
    }

    #[test]
    fn fifth_shape_evicts_round_robin() {
        let mut cache = CallSiteCache::default();
        for key in 1..=5 {
            cache.store(entry(key, 1));
        }
        assert_eq!(cache.len(), 4);
        assert!(matches!(cache.check("m", 1, CallType::Normal, 1), CacheCheck::Miss));
        assert!(matches!(cache.check("m", 5, CallType::Normal, 1), CacheCheck::Hit(..)));
    }

    #[test]
    fn entries_only_answer_for_their_own_name() {
        let mut cache = CallSiteCache::default();
        cache.store(entry(1, 1));
        assert!(matches!(cache.check("other", 1, CallType::Normal, 1), CacheCheck::Miss));

        let consts = ConstEntry {
            name: "A".into(),
            value: Value::Int(1),
            generation: 3,
        };
        assert_eq!(consts.get("A", 3), Some(Value::Int(1)));
        assert_eq!(consts.get("B", 3), None);
        assert_eq!(consts.get("A", 4), None);
    }
}
