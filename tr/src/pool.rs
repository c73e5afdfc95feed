//! Task pool for one round
//!
//! Unassigned tasks wait in a FIFO queue so they surface in creation order.
//! Assigned tasks live in the active set together with their assignee, and
//! multiplayer tasks additionally record the players helping with them.

use std::collections::{BTreeMap, HashMap, VecDeque};

use rand::Rng;
use tracing::debug;

use crate::catalog::Catalog;
use crate::domain::{PlayerId, Task, TaskId};

/// A task bound to its assignee
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActiveTask {
    pub task: Task,
    pub assignee: PlayerId,
}

#[derive(Debug, Default)]
pub struct TaskPool {
    next_id: TaskId,
    unassigned: VecDeque<Task>,
    active: BTreeMap<TaskId, ActiveTask>,
    helpers: HashMap<TaskId, Vec<PlayerId>>,
}

impl TaskPool {
    pub fn new() -> Self {
        Self {
            next_id: 1,
            ..Default::default()
        }
    }

    fn fresh_id(&mut self) -> TaskId {
        let id = self.next_id;
        self.next_id += 1;
        id
    }

    /// Sample `count` tasks uniformly from the catalog and queue them
    ///
    /// Returns the ids of the new tasks in queue order.
    pub fn generate_batch<R: Rng + ?Sized>(&mut self, catalog: &Catalog, count: usize, rng: &mut R) -> Vec<TaskId> {
        debug!(count, "TaskPool::generate_batch: called");
        (0..count).map(|_| self.generate_one(catalog, rng)).collect()
    }

    /// Sample a single task and queue it at the back
    pub fn generate_one<R: Rng + ?Sized>(&mut self, catalog: &Catalog, rng: &mut R) -> TaskId {
        let id = self.fresh_id();
        let task = Task::new(id, catalog.sample(rng));
        debug!(task_id = id, kind = %task.kind, "TaskPool::generate_one: queued");
        self.unassigned.push_back(task);
        id
    }

    /// Claim the oldest unassigned task for a control token
    pub fn resolve_by_control(&mut self, control: &str) -> Option<Task> {
        let index = self.unassigned.iter().position(|t| t.control == control)?;
        self.unassigned.remove(index)
    }

    /// Claim the oldest unassigned task
    pub fn next_unassigned(&mut self) -> Option<Task> {
        self.unassigned.pop_front()
    }

    /// Put back a task whose assignment failed, keeping creation order
    pub fn return_task(&mut self, task: Task) {
        debug!(task_id = task.id, "TaskPool::return_task: called");
        let index = self
            .unassigned
            .iter()
            .position(|t| t.id > task.id)
            .unwrap_or(self.unassigned.len());
        self.unassigned.insert(index, task);
    }

    /// Move a claimed task into the active set
    pub fn activate(&mut self, task: Task, assignee: PlayerId) {
        self.active.insert(task.id, ActiveTask { task, assignee });
    }

    pub fn active(&self, id: TaskId) -> Option<&ActiveTask> {
        self.active.get(&id)
    }

    pub fn active_mut(&mut self, id: TaskId) -> Option<&mut ActiveTask> {
        self.active.get_mut(&id)
    }

    /// Remove a task from the active set, dropping its helper record
    pub fn take_active(&mut self, id: TaskId) -> Option<ActiveTask> {
        self.helpers.remove(&id);
        self.active.remove(&id)
    }

    /// Active tasks ordered by id
    pub fn active_tasks(&self) -> impl Iterator<Item = &ActiveTask> {
        self.active.values()
    }

    pub fn unassigned(&self) -> impl Iterator<Item = &Task> {
        self.unassigned.iter()
    }

    pub fn unassigned_len(&self) -> usize {
        self.unassigned.len()
    }

    pub fn active_len(&self) -> usize {
        self.active.len()
    }

    pub fn record_helpers(&mut self, id: TaskId, players: Vec<PlayerId>) {
        self.helpers.insert(id, players);
    }

    pub fn helpers(&self, id: TaskId) -> Option<&[PlayerId]> {
        self.helpers.get(&id).map(Vec::as_slice)
    }

    /// Number of multiplayer tasks a player is currently helping with
    pub fn co_assigned_count(&self, player: &str) -> usize {
        self.helpers.values().filter(|set| set.iter().any(|p| p == player)).count()
    }

    /// Empty the queue, the active set and the helper records
    ///
    /// Ids keep counting so a task id is never reused within a session.
    pub fn clear(&mut self) {
        debug!(
            unassigned = self.unassigned.len(),
            active = self.active.len(),
            "TaskPool::clear: called"
        );
        self.unassigned.clear();
        self.active.clear();
        self.helpers.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    fn pool_with(count: usize) -> TaskPool {
        let mut pool = TaskPool::new();
        let mut rng = StdRng::seed_from_u64(5);
        pool.generate_batch(&Catalog::builtin(), count, &mut rng);
        pool
    }

    #[test]
    fn test_generate_batch_assigns_fresh_ids() {
        let pool = pool_with(15);
        let ids: Vec<TaskId> = pool.unassigned().map(|t| t.id).collect();
        assert_eq!(ids, (1..=15).collect::<Vec<_>>());
    }

    #[test]
    fn test_generated_tasks_carry_their_control() {
        let catalog = Catalog::builtin();
        let pool = pool_with(30);
        for task in pool.unassigned() {
            assert_eq!(catalog.get(&task.kind).unwrap().control, task.control);
        }
    }

    #[test]
    fn test_resolve_by_control_returns_oldest_match() {
        let mut pool = pool_with(40);
        let control = pool.unassigned().nth(10).unwrap().control.clone();
        let expected = pool.unassigned().find(|t| t.control == control).unwrap().id;

        let task = pool.resolve_by_control(&control).unwrap();
        assert_eq!(task.id, expected);
        assert_eq!(pool.unassigned_len(), 39);
    }

    #[test]
    fn test_resolve_by_control_not_found() {
        let mut pool = pool_with(5);
        assert!(pool.resolve_by_control("NO_SUCH_CONTROL").is_none());
        assert_eq!(pool.unassigned_len(), 5);
    }

    #[test]
    fn test_return_task_keeps_creation_order() {
        let mut pool = pool_with(5);
        let third = {
            let control = pool.unassigned().nth(2).unwrap().control.clone();
            // Claim whichever task with that control comes first
            pool.resolve_by_control(&control).unwrap()
        };
        pool.return_task(third);

        let ids: Vec<TaskId> = pool.unassigned().map(|t| t.id).collect();
        assert_eq!(ids, vec![1, 2, 3, 4, 5]);
    }

    #[test]
    fn test_activate_and_take() {
        let mut pool = pool_with(2);
        let task = pool.next_unassigned().unwrap();
        pool.activate(task.clone(), "p1".to_string());
        pool.record_helpers(task.id, vec!["p1".to_string(), "p2".to_string()]);

        assert_eq!(pool.active(task.id).unwrap().assignee, "p1");
        assert_eq!(pool.co_assigned_count("p2"), 1);

        let taken = pool.take_active(task.id).unwrap();
        assert_eq!(taken.task, task);
        assert!(pool.helpers(task.id).is_none());
        assert_eq!(pool.co_assigned_count("p2"), 0);
    }

    #[test]
    fn test_clear_never_reuses_ids() {
        let mut pool = pool_with(3);
        pool.clear();
        assert_eq!(pool.unassigned_len(), 0);

        let mut rng = StdRng::seed_from_u64(9);
        let ids = pool.generate_batch(&Catalog::builtin(), 2, &mut rng);
        assert_eq!(ids, vec![4, 5]);
    }
}
