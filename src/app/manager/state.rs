//! Internal state of the download manager
//!
//! Every task lives in exactly one of three places: the pending queue (with its
//! task kept in `queued`), the active set, or the history. All moves between
//! them go through this type while the manager holds its state lock.

use std::collections::{BTreeMap, VecDeque};
use std::sync::Arc;

use tracing::debug;

use crate::app::task::{DownloadTask, TaskId};

/// Pending queue, active set and history
#[derive(Debug)]
pub struct ManagerState {
    /// Queued task ids in submission order
    pending: VecDeque<TaskId>,
    /// Tasks waiting in the pending queue
    queued: BTreeMap<TaskId, Arc<DownloadTask>>,
    /// Tasks holding a slot
    active: BTreeMap<TaskId, Arc<DownloadTask>>,
    /// Terminal tasks
    history: BTreeMap<TaskId, Arc<DownloadTask>>,
    max_concurrent: usize,
    next_task_id: u64,
    shutting_down: bool,
}

impl ManagerState {
    /// Create empty state with a concurrency cap
    pub fn new(max_concurrent: usize) -> Self {
        Self {
            pending: VecDeque::new(),
            queued: BTreeMap::new(),
            active: BTreeMap::new(),
            history: BTreeMap::new(),
            max_concurrent,
            next_task_id: 1,
            shutting_down: false,
        }
    }

    /// Allocate the next task id; ids are never reused
    pub fn next_task_id(&mut self) -> TaskId {
        let id = TaskId::new(self.next_task_id);
        self.next_task_id += 1;
        id
    }

    pub fn max_concurrent(&self) -> usize {
        self.max_concurrent
    }

    pub fn set_max_concurrent(&mut self, max: usize) {
        self.max_concurrent = max;
    }

    pub fn is_shutting_down(&self) -> bool {
        self.shutting_down
    }

    pub fn begin_shutdown(&mut self) {
        self.shutting_down = true;
    }

    pub fn has_free_slot(&self) -> bool {
        self.active.len() < self.max_concurrent
    }

    /// Append a new task to the pending queue
    pub fn enqueue(&mut self, task: Arc<DownloadTask>) {
        let id = task.id();
        self.queued.insert(id, task);
        self.pending.push_back(id);
        debug!("Queued task {} ({} pending)", id, self.pending.len());
    }

    /// Move the head of the pending queue into the active set if a slot is free
    pub fn pop_ready(&mut self) -> Option<Arc<DownloadTask>> {
        while self.has_free_slot() {
            let id = self.pending.pop_front()?;
            if let Some(task) = self.queued.remove(&id) {
                self.active.insert(id, task.clone());
                debug!("Promoted task {} ({} active)", id, self.active.len());
                return Some(task);
            }
        }
        None
    }

    /// Take a task out of the pending queue and into the history
    pub fn remove_queued(&mut self, id: TaskId) -> Option<Arc<DownloadTask>> {
        let task = self.queued.remove(&id)?;
        self.pending.retain(|pending| *pending != id);
        self.history.insert(id, task.clone());
        Some(task)
    }

    /// Move a task from the active set into the history
    pub fn complete(&mut self, id: TaskId) -> Option<Arc<DownloadTask>> {
        let task = self.active.remove(&id)?;
        self.history.insert(id, task.clone());
        debug!(
            "Task {} left the active set ({} active, {} pending)",
            id,
            self.active.len(),
            self.pending.len()
        );
        Some(task)
    }

    /// Find a task wherever it lives
    pub fn get(&self, id: TaskId) -> Option<&Arc<DownloadTask>> {
        self.active
            .get(&id)
            .or_else(|| self.queued.get(&id))
            .or_else(|| self.history.get(&id))
    }

    /// Position of a queued task in the pending queue, 0 for the head
    pub fn queue_position(&self, id: TaskId) -> Option<usize> {
        self.pending.iter().position(|pending| *pending == id)
    }

    pub fn active_tasks(&self) -> Vec<Arc<DownloadTask>> {
        self.active.values().cloned().collect()
    }

    /// Queued tasks in FIFO order
    pub fn queued_tasks(&self) -> Vec<Arc<DownloadTask>> {
        self.pending
            .iter()
            .filter_map(|id| self.queued.get(id).cloned())
            .collect()
    }

    /// Every task in submission order
    pub fn all_tasks(&self) -> Vec<Arc<DownloadTask>> {
        let mut tasks: Vec<Arc<DownloadTask>> = self
            .queued
            .values()
            .chain(self.active.values())
            .chain(self.history.values())
            .cloned()
            .collect();
        tasks.sort_by_key(|task| task.id());
        tasks
    }

    pub fn active_count(&self) -> usize {
        self.active.len()
    }

    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    pub fn history_count(&self) -> usize {
        self.history.len()
    }

    /// Tasks that have not reached the history yet
    pub fn outstanding(&self) -> usize {
        self.pending.len() + self.active.len()
    }

    pub fn is_idle(&self) -> bool {
        self.outstanding() == 0
    }
}
