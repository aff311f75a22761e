use std::collections::BTreeMap;

use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TaskId(pub u64);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DueTask<K, T> {
    pub id: TaskId,
    pub key: K,
    pub payload: T,
    pub due_at: u64,
}

#[derive(Debug, Clone)]
struct ScheduledTask<K, T> {
    key: K,
    due_at: u64,
    interval: Option<u64>,
    payload: T,
}

/// Deterministic delayed-effect queue keyed by task slot.
///
/// At most one task exists per key; scheduling onto an occupied key cancels
/// the pending task first. Nothing fires unless the owner polls.
#[derive(Debug, Clone)]
pub struct Scheduler<K, T> {
    tasks: BTreeMap<TaskId, ScheduledTask<K, T>>,
    by_key: BTreeMap<K, TaskId>,
    next_id: u64,
}

impl<K: Ord + Clone, T: Clone> Default for Scheduler<K, T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<K: Ord + Clone, T: Clone> Scheduler<K, T> {
    pub fn new() -> Self {
        Self {
            tasks: BTreeMap::new(),
            by_key: BTreeMap::new(),
            next_id: 0,
        }
    }

    pub fn schedule_once(&mut self, key: K, now: u64, delay: u64, payload: T) -> TaskId {
        self.insert(key, now.saturating_add(delay), None, payload)
    }

    pub fn schedule_repeating(&mut self, key: K, now: u64, interval: u64, payload: T) -> TaskId {
        let interval = interval.max(1);
        self.insert(key, now.saturating_add(interval), Some(interval), payload)
    }

    pub fn cancel(&mut self, id: TaskId) -> bool {
        let Some(task) = self.tasks.remove(&id) else {
            return false;
        };
        if self.by_key.get(&task.key) == Some(&id) {
            self.by_key.remove(&task.key);
        }
        true
    }

    pub fn cancel_key(&mut self, key: &K) -> bool {
        match self.by_key.get(key).copied() {
            Some(id) => self.cancel(id),
            None => false,
        }
    }

    pub fn cancel_where(&mut self, mut predicate: impl FnMut(&K) -> bool) -> usize {
        let ids: Vec<TaskId> = self
            .by_key
            .iter()
            .filter(|(key, _)| predicate(key))
            .map(|(_, id)| *id)
            .collect();
        ids.into_iter().filter(|id| self.cancel(*id)).count()
    }

    pub fn is_scheduled(&self, key: &K) -> bool {
        self.by_key.contains_key(key)
    }

    pub fn due_at(&self, key: &K) -> Option<u64> {
        let id = self.by_key.get(key)?;
        self.tasks.get(id).map(|task| task.due_at)
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    /// Returns every task due at `now`, ordered by due time then creation.
    /// Repeating tasks fire at most once per poll and are rearmed.
    pub fn poll_due(&mut self, now: u64) -> Vec<DueTask<K, T>> {
        let mut due: Vec<(u64, TaskId)> = self
            .tasks
            .iter()
            .filter(|(_, task)| task.due_at <= now)
            .map(|(id, task)| (task.due_at, *id))
            .collect();
        due.sort_unstable();

        let mut fired = Vec::with_capacity(due.len());
        for (due_at, id) in due {
            let Some(task) = self.tasks.get_mut(&id) else {
                continue;
            };
            fired.push(DueTask {
                id,
                key: task.key.clone(),
                payload: task.payload.clone(),
                due_at,
            });
            match task.interval {
                Some(interval) => {
                    task.due_at = task.due_at.saturating_add(interval).max(now.saturating_add(1));
                }
                None => {
                    self.cancel(id);
                }
            }
        }
        fired
    }

    fn insert(&mut self, key: K, due_at: u64, interval: Option<u64>, payload: T) -> TaskId {
        if let Some(previous) = self.by_key.get(&key).copied() {
            self.cancel(previous);
            debug!(task_id = previous.0, "scheduled_task_superseded");
        }
        let id = TaskId(self.next_id);
        self.next_id = self.next_id.saturating_add(1);
        self.by_key.insert(key.clone(), id);
        self.tasks.insert(
            id,
            ScheduledTask {
                key,
                due_at,
                interval,
                payload,
            },
        );
        id
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn once_task_fires_once_when_due() {
        let mut scheduler = Scheduler::new();
        scheduler.schedule_once("expiry", 100, 50, 7u32);

        assert!(scheduler.poll_due(149).is_empty());
        let fired = scheduler.poll_due(150);
        assert_eq!(fired.len(), 1);
        assert_eq!(fired[0].payload, 7);
        assert!(scheduler.poll_due(1_000).is_empty());
        assert!(scheduler.is_empty());
    }

    #[test]
    fn same_key_supersedes_pending_task() {
        let mut scheduler = Scheduler::new();
        let first = scheduler.schedule_once("expiry", 0, 100, 1u32);
        scheduler.schedule_once("expiry", 80, 100, 2u32);

        assert!(!scheduler.cancel(first));
        assert!(scheduler.poll_due(120).is_empty());
        let fired = scheduler.poll_due(180);
        assert_eq!(fired.len(), 1);
        assert_eq!(fired[0].payload, 2);
    }

    #[test]
    fn repeating_task_rearms_until_cancelled() {
        let mut scheduler = Scheduler::new();
        scheduler.schedule_repeating("blink", 0, 90, ());

        assert_eq!(scheduler.poll_due(90).len(), 1);
        assert_eq!(scheduler.due_at(&"blink"), Some(180));
        assert_eq!(scheduler.poll_due(180).len(), 1);
        assert!(scheduler.cancel_key(&"blink"));
        assert!(scheduler.poll_due(270).is_empty());
    }

    #[test]
    fn due_tasks_are_ordered_by_due_time() {
        let mut scheduler = Scheduler::new();
        scheduler.schedule_once("late", 0, 30, "late");
        scheduler.schedule_once("early", 0, 10, "early");

        let payloads: Vec<_> = scheduler
            .poll_due(40)
            .into_iter()
            .map(|task| task.payload)
            .collect();

        assert_eq!(payloads, vec!["early", "late"]);
    }

    #[test]
    fn cancel_where_drops_matching_keys() {
        let mut scheduler = Scheduler::new();
        scheduler.schedule_once((1u64, 'a'), 0, 10, ());
        scheduler.schedule_once((1u64, 'b'), 0, 10, ());
        scheduler.schedule_once((2u64, 'a'), 0, 10, ());

        assert_eq!(scheduler.cancel_where(|(owner, _)| *owner == 1), 2);
        assert_eq!(scheduler.len(), 1);
        assert!(scheduler.is_scheduled(&(2, 'a')));
    }
}
