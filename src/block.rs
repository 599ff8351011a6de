//! Fixed-size columnar blocks cycling through a bounded blocking queue
//! between the producer and the inserter workers (spec §4.6).
//!
//! Directly grounded on the original collector's `Block`/`SyncQueue`: a
//! `Mutex` + `Condvar` blocking queue with an atomic size snapshot. The
//! original's `nullptr`-means-stop convention is replaced with a tagged
//! [`QueueItem::Stop`] variant (spec §9 redesign note).

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Condvar, Mutex};

use crate::record::ParsedRecord;

/// A fixed-capacity batch of parsed records awaiting insertion.
///
/// Exactly one owner holds a `Block` at a time: either the producer
/// (filling it), an `avail`/`filled` queue (in transit), or an inserter
/// worker (draining it) — never two at once (spec §4.6 invariant).
#[derive(Debug, Default)]
pub struct Block {
    pub rows: Vec<ParsedRecord>,
    capacity: usize,
}

impl Block {
    pub fn new(capacity: usize) -> Self {
        Self {
            rows: Vec::with_capacity(capacity),
            capacity,
        }
    }

    pub fn push(&mut self, row: ParsedRecord) {
        self.rows.push(row);
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.rows.len() >= self.capacity
    }

    /// Empties the block's rows while keeping its allocated capacity, so
    /// it can be handed back to the `avail` queue and reused.
    pub fn reset(&mut self) {
        self.rows.clear();
    }
}

/// Either a real item or the shutdown signal. A blocked `get()` can be
/// woken for shutdown without an ambiguous null sentinel.
#[derive(Debug)]
pub enum QueueItem<T> {
    Item(T),
    Stop,
}

/// A bounded blocking queue, grounded on the original's `SyncQueue`.
pub struct SyncQueue<T> {
    items: Mutex<VecDeque<QueueItem<T>>>,
    not_empty: Condvar,
    size: AtomicUsize,
}

impl<T> SyncQueue<T> {
    pub fn new() -> Self {
        Self {
            items: Mutex::new(VecDeque::new()),
            not_empty: Condvar::new(),
            size: AtomicUsize::new(0),
        }
    }

    /// Pushes an item, waking one waiter.
    pub fn put(&self, item: T) {
        self.push(QueueItem::Item(item));
    }

    /// Pushes the shutdown sentinel, waking one waiter. Call once per
    /// worker expected to observe it.
    pub fn put_stop(&self) {
        self.push(QueueItem::Stop);
    }

    fn push(&self, item: QueueItem<T>) {
        let mut guard = self.items.lock().expect("queue mutex poisoned");
        guard.push_back(item);
        self.size.store(guard.len(), Ordering::Relaxed);
        self.not_empty.notify_one();
    }

    /// Blocks until an item (or the stop sentinel) is available.
    pub fn get(&self) -> QueueItem<T> {
        let mut guard = self.items.lock().expect("queue mutex poisoned");
        loop {
            if let Some(item) = guard.pop_front() {
                self.size.store(guard.len(), Ordering::Relaxed);
                return item;
            }
            guard = self.not_empty.wait(guard).expect("queue mutex poisoned");
        }
    }

    /// Non-blocking pop, for the `nonblocking` config mode (spec §6.1,
    /// §9 redesign note).
    pub fn try_get(&self) -> Option<QueueItem<T>> {
        let mut guard = self.items.lock().expect("queue mutex poisoned");
        let item = guard.pop_front();
        if item.is_some() {
            self.size.store(guard.len(), Ordering::Relaxed);
        }
        item
    }

    pub fn len(&self) -> usize {
        self.size.load(Ordering::Relaxed)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<T> Default for SyncQueue<T> {
    fn default() -> Self {
        Self::new()
    }
}

/// Cycles a fixed set of `Block`s between the producer (via `avail`) and
/// the inserter workers (via `filled`).
pub struct BlockPool {
    pub avail: Arc<SyncQueue<Block>>,
    pub filled: Arc<SyncQueue<Block>>,
}

impl BlockPool {
    /// Creates `count` blocks of `capacity` rows each and seeds them all
    /// into `avail`.
    pub fn new(count: usize, capacity: usize) -> Self {
        let avail = Arc::new(SyncQueue::new());
        for _ in 0..count {
            avail.put(Block::new(capacity));
        }
        Self {
            avail,
            filled: Arc::new(SyncQueue::new()),
        }
    }
}
