use std::collections::{BTreeSet, HashMap};
use std::fmt;

/// Stable handle for a scheduled trust point
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ProbeHandle(u64);

impl ProbeHandle {
    pub fn as_u64(self) -> u64 {
        self.0
    }
}

impl fmt::Display for ProbeHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Sort key: probe time first, zone name to break ties, handle last so
/// keys stay unique even for equal zones.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
struct ProbeKey {
    next_probe_time: i64,
    zone: String,
    handle: ProbeHandle,
}

/// Trust points ordered by next probe time.
///
/// Every operation is O(log n). A handle is present at most once.
#[derive(Debug, Default)]
pub struct ProbeScheduler {
    order: BTreeSet<ProbeKey>,
    entries: HashMap<ProbeHandle, ProbeKey>,
    next_handle: u64,
}

impl ProbeScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Schedule a new point and return its handle.
    pub fn insert(&mut self, zone: &str, next_probe_time: i64) -> ProbeHandle {
        let handle = ProbeHandle(self.next_handle);
        self.next_handle += 1;

        let key = ProbeKey {
            next_probe_time,
            zone: zone.to_string(),
            handle,
        };
        self.order.insert(key.clone());
        self.entries.insert(handle, key);
        handle
    }

    /// Move a scheduled point to a new probe time. Returns false for
    /// handles that are not scheduled.
    pub fn reschedule(&mut self, handle: ProbeHandle, next_probe_time: i64) -> bool {
        let Some(key) = self.entries.get_mut(&handle) else {
            return false;
        };
        if key.next_probe_time == next_probe_time {
            return true;
        }

        self.order.remove(&*key);
        key.next_probe_time = next_probe_time;
        self.order.insert(key.clone());
        true
    }

    pub fn remove(&mut self, handle: ProbeHandle) -> bool {
        match self.entries.remove(&handle) {
            Some(key) => {
                self.order.remove(&key);
                true
            }
            None => false,
        }
    }

    pub fn contains(&self, handle: ProbeHandle) -> bool {
        self.entries.contains_key(&handle)
    }

    /// The point with the smallest probe time
    pub fn peek(&self) -> Option<(ProbeHandle, i64)> {
        self.order
            .first()
            .map(|key| (key.handle, key.next_probe_time))
    }

    /// Remove and return the earliest point if it is due at `now`.
    pub fn pop_due(&mut self, now: i64) -> Option<ProbeHandle> {
        let (handle, when) = self.peek()?;
        if when > now {
            return None;
        }
        self.remove(handle);
        Some(handle)
    }

    pub fn next_probe_time(&self, handle: ProbeHandle) -> Option<i64> {
        self.entries.get(&handle).map(|key| key.next_probe_time)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Scheduled handles in probe order
    pub fn iter(&self) -> impl Iterator<Item = (ProbeHandle, i64)> + '_ {
        self.order.iter().map(|key| (key.handle, key.next_probe_time))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_orders_by_time_then_zone() {
        let mut scheduler = ProbeScheduler::new();
        let b = scheduler.insert("b.example.", 100);
        let a = scheduler.insert("a.example.", 100);
        let early = scheduler.insert("z.example.", 50);

        let order: Vec<_> = scheduler.iter().map(|(h, _)| h).collect();
        assert_eq!(order, vec![early, a, b]);
        assert_eq!(scheduler.peek(), Some((early, 50)));
    }

    #[test]
    fn test_reschedule_keeps_single_entry() {
        let mut scheduler = ProbeScheduler::new();
        let a = scheduler.insert("a.", 10);
        let b = scheduler.insert("b.", 20);

        assert!(scheduler.reschedule(a, 30));
        assert!(scheduler.reschedule(a, 40));
        assert_eq!(scheduler.len(), 2);
        assert_eq!(scheduler.iter().count(), 2);
        assert_eq!(scheduler.peek(), Some((b, 20)));
        assert_eq!(scheduler.next_probe_time(a), Some(40));
    }

    #[test]
    fn test_pop_due() {
        let mut scheduler = ProbeScheduler::new();
        let a = scheduler.insert("a.", 10);
        scheduler.insert("b.", 20);

        assert_eq!(scheduler.pop_due(5), None);
        assert_eq!(scheduler.pop_due(10), Some(a));
        assert!(!scheduler.contains(a));
        assert_eq!(scheduler.pop_due(15), None);
        assert_eq!(scheduler.len(), 1);
    }

    #[test]
    fn test_removed_handle_is_gone() {
        let mut scheduler = ProbeScheduler::new();
        let a = scheduler.insert("a.", 10);

        assert!(scheduler.remove(a));
        assert!(!scheduler.remove(a));
        assert!(!scheduler.reschedule(a, 50));
        assert!(scheduler.is_empty());
        assert_eq!(scheduler.peek(), None);
    }

    #[test]
    fn test_handles_are_not_reused() {
        let mut scheduler = ProbeScheduler::new();
        let a = scheduler.insert("a.", 10);
        scheduler.remove(a);
        let b = scheduler.insert("a.", 10);
        assert_ne!(a, b);
    }
}
