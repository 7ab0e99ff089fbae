//! Priority work queue for the sync engine.
//!
//! Lower numeric priority is served first. Equal priorities are served in
//! insertion order, tracked with a monotonically increasing sequence number.

use std::cmp::Ordering;
use std::collections::BinaryHeap;

/// Task urgency; lower is more urgent
pub type Priority = u8;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Task {
    /// Fetch the block at `height` from a peer and store it
    Fetch { height: u64 },
    /// Reduce the copies stored at `height` to `keep`
    Prune { height: u64, keep: u32 },
}

impl Task {
    pub fn height(&self) -> u64 {
        match self {
            Task::Fetch { height } | Task::Prune { height, .. } => *height,
        }
    }

    pub fn is_fetch(&self) -> bool {
        matches!(self, Task::Fetch { .. })
    }
}

/// A task as admitted to the queue
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueuedTask {
    pub priority: Priority,
    pub task: Task,
}

#[derive(Debug)]
struct QueueEntry {
    priority: Priority,
    seq: u64,
    task: Task,
}

impl PartialEq for QueueEntry {
    fn eq(&self, other: &Self) -> bool {
        self.priority == other.priority && self.seq == other.seq
    }
}

impl Eq for QueueEntry {}

impl PartialOrd for QueueEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for QueueEntry {
    fn cmp(&self, other: &Self) -> Ordering {
        // BinaryHeap is a max-heap: the smallest (priority, seq) must compare greatest
        other
            .priority
            .cmp(&self.priority)
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

#[derive(Debug, Default)]
pub struct TaskQueue {
    heap: BinaryHeap<QueueEntry>,
    next_seq: u64,
}

impl TaskQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, task: Task, priority: Priority) {
        let seq = self.next_seq;
        self.next_seq += 1;
        self.heap.push(QueueEntry {
            priority,
            seq,
            task,
        });
    }

    /// Remove the most urgent task
    pub fn pop(&mut self) -> Option<QueuedTask> {
        self.heap.pop().map(|entry| QueuedTask {
            priority: entry.priority,
            task: entry.task,
        })
    }

    pub fn len(&self) -> usize {
        self.heap.len()
    }

    pub fn is_empty(&self) -> bool {
        self.heap.is_empty()
    }

    /// All queued tasks in the order they would be served
    pub fn snapshot(&self) -> Vec<QueuedTask> {
        let mut entries: Vec<&QueueEntry> = self.heap.iter().collect();
        entries.sort_by(|a, b| b.cmp(a));
        entries
            .into_iter()
            .map(|entry| QueuedTask {
                priority: entry.priority,
                task: entry.task,
            })
            .collect()
    }

    pub fn clear(&mut self) {
        self.heap.clear();
    }
}
