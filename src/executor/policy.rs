//! Pop-order disciplines behind the task queue.
//!
//! Every variant exposes the same three operations on a single-threaded
//! instance; [`TaskQueue`](crate::executor::queue::TaskQueue) serialises
//! all access.

use crate::config::QueuePolicy;
use crate::executor::task::Task;
use rand::{Rng, SeedableRng};
use rand_pcg::Pcg64;
use std::cmp::Ordering as CmpOrdering;
use std::collections::{BinaryHeap, VecDeque};
use std::fmt;

pub(crate) enum PolicyQueue {
    Fifo(VecDeque<Task>),
    Lifo(VecDeque<Task>),
    Prio(PrioQueue),
    Rand(RandQueue),
}

impl PolicyQueue {
    pub(crate) fn new(policy: QueuePolicy) -> Self {
        match policy {
            QueuePolicy::Fifo => PolicyQueue::Fifo(VecDeque::new()),
            QueuePolicy::Lifo => PolicyQueue::Lifo(VecDeque::new()),
            QueuePolicy::Prio => PolicyQueue::Prio(PrioQueue::new()),
            QueuePolicy::Rand => PolicyQueue::Rand(RandQueue::new()),
        }
    }

    pub(crate) fn push(&mut self, task: Task) {
        match self {
            PolicyQueue::Fifo(queue) | PolicyQueue::Lifo(queue) => queue.push_back(task),
            PolicyQueue::Prio(queue) => queue.push(task),
            PolicyQueue::Rand(queue) => queue.push(task),
        }
    }

    pub(crate) fn pop(&mut self) -> Option<Task> {
        match self {
            PolicyQueue::Fifo(queue) => queue.pop_front(),
            PolicyQueue::Lifo(queue) => queue.pop_back(),
            PolicyQueue::Prio(queue) => queue.pop(),
            PolicyQueue::Rand(queue) => queue.inner.pop(),
        }
    }

    pub(crate) fn len(&self) -> usize {
        match self {
            PolicyQueue::Fifo(queue) | PolicyQueue::Lifo(queue) => queue.len(),
            PolicyQueue::Prio(queue) => queue.len(),
            PolicyQueue::Rand(queue) => queue.inner.len(),
        }
    }
}

impl fmt::Debug for PolicyQueue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let (name, len) = match self {
            PolicyQueue::Fifo(queue) => ("Fifo", queue.len()),
            PolicyQueue::Lifo(queue) => ("Lifo", queue.len()),
            PolicyQueue::Prio(queue) => ("Prio", queue.len()),
            PolicyQueue::Rand(queue) => ("Rand", queue.inner.len()),
        };
        f.debug_struct("PolicyQueue")
            .field("policy", &name)
            .field("len", &len)
            .finish()
    }
}

/// Heap entry carrying a submission sequence number so that equal
/// priorities pop in push order.
struct PrioEntry {
    priority: i8,
    seq: u64,
    task: Task,
}

impl PartialEq for PrioEntry {
    fn eq(&self, other: &Self) -> bool {
        self.priority == other.priority && self.seq == other.seq
    }
}

impl Eq for PrioEntry {}

impl PartialOrd for PrioEntry {
    fn partial_cmp(&self, other: &Self) -> Option<CmpOrdering> {
        Some(self.cmp(other))
    }
}

impl Ord for PrioEntry {
    fn cmp(&self, other: &Self) -> CmpOrdering {
        // Max-heap: highest priority wins, earlier submission breaks ties.
        self.priority
            .cmp(&other.priority)
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

/// `BinaryHeap::pop` hands back an owned task, so one heap is enough where
/// the non-movable top of other priority containers would force an
/// index-plus-storage pair.
pub(crate) struct PrioQueue {
    heap: BinaryHeap<PrioEntry>,
    next_seq: u64,
}

impl PrioQueue {
    fn new() -> Self {
        Self {
            heap: BinaryHeap::new(),
            next_seq: 0,
        }
    }

    fn push(&mut self, task: Task) {
        let entry = PrioEntry {
            priority: task.priority(),
            seq: self.next_seq,
            task,
        };
        self.next_seq += 1;
        self.heap.push(entry);
    }

    fn pop(&mut self) -> Option<Task> {
        self.heap.pop().map(|entry| entry.task)
    }

    fn len(&self) -> usize {
        self.heap.len()
    }
}

pub(crate) struct RandQueue {
    inner: PrioQueue,
    rng: Pcg64,
}

impl RandQueue {
    fn new() -> Self {
        Self {
            inner: PrioQueue::new(),
            rng: Pcg64::from_entropy(),
        }
    }

    fn push(&mut self, mut task: Task) {
        task.set_priority(self.rng.gen::<i8>());
        self.inner.push(task);
    }
}
