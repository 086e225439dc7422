#![forbid(unsafe_code)]

//! Snapshot history for undo/redo.
//!
//! The editor holds one "current" snapshot and retains prior snapshots for
//! undo. Snapshots are immutable, so history is just a bounded stack of
//! `Arc`s; committing a new snapshot clears the redo stack.

use std::sync::Arc;

use crate::tree::AppDom;

/// Default number of undo steps retained.
pub const DEFAULT_CAPACITY: usize = 100;

/// Bounded undo/redo history over document snapshots.
#[derive(Debug, Clone)]
pub struct DomHistory {
    past: Vec<Arc<AppDom>>,
    current: Arc<AppDom>,
    future: Vec<Arc<AppDom>>,
    capacity: usize,
}

impl DomHistory {
    /// Start a history at an initial snapshot.
    pub fn new(initial: AppDom) -> Self {
        Self::with_capacity(initial, DEFAULT_CAPACITY)
    }

    /// Start a history with an explicit undo depth.
    pub fn with_capacity(initial: AppDom, capacity: usize) -> Self {
        Self {
            past: Vec::new(),
            current: Arc::new(initial),
            future: Vec::new(),
            capacity: capacity.max(1),
        }
    }

    /// The current snapshot.
    pub fn current(&self) -> &Arc<AppDom> {
        &self.current
    }

    /// Record a new snapshot as current. Clears the redo stack.
    pub fn commit(&mut self, dom: AppDom) {
        self.past.push(Arc::clone(&self.current));
        if self.past.len() > self.capacity {
            self.past.remove(0);
        }
        self.current = Arc::new(dom);
        self.future.clear();
    }

    /// Whether an undo step is available.
    pub fn can_undo(&self) -> bool {
        !self.past.is_empty()
    }

    /// Whether a redo step is available.
    pub fn can_redo(&self) -> bool {
        !self.future.is_empty()
    }

    /// Step back to the previous snapshot, returning the new current.
    pub fn undo(&mut self) -> Option<&Arc<AppDom>> {
        let previous = self.past.pop()?;
        self.future.push(Arc::clone(&self.current));
        self.current = previous;
        Some(&self.current)
    }

    /// Step forward again, returning the new current.
    pub fn redo(&mut self) -> Option<&Arc<AppDom>> {
        let next = self.future.pop()?;
        self.past.push(Arc::clone(&self.current));
        self.current = next;
        Some(&self.current)
    }
}
