//! Append-only arena for canonical pattern boards.
//!
//! Provides `BoardId` (a dense, total-orderable handle) and `BoardArena`
//! (contiguous storage). Boards are immutable once registered and the board
//! universe is finite, so slots are never freed.
//!
//! # Determinism
//! - `BoardId` ordering is by its inner `u32`, which is registration order.
//! - Iteration order over slots is by index.

use std::fmt;

/// Dense handle of a registered board.
#[repr(transparent)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct BoardId(u32);

impl BoardId {
    /// Creates a new `BoardId` from a raw `u32`.
    #[inline]
    pub const fn new(raw: u32) -> Self {
        Self(raw)
    }

    /// Returns the raw `u32` index.
    #[inline]
    pub const fn as_u32(&self) -> u32 {
        self.0
    }

    #[inline]
    pub const fn index(&self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for BoardId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "BoardId({})", self.0)
    }
}

/// Contiguous append-only storage indexed by `BoardId`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BoardArena<T> {
    slots: Vec<T>,
}

impl<T> BoardArena<T> {
    /// Creates a new empty arena.
    pub fn new() -> Self {
        Self { slots: Vec::new() }
    }

    /// Stores `data` and returns its handle.
    pub fn allocate(&mut self, data: T) -> BoardId {
        let id = BoardId(self.slots.len() as u32);
        self.slots.push(data);
        id
    }

    /// Returns a reference to the data stored at `id`, if present.
    pub fn get(&self, id: BoardId) -> Option<&T> {
        self.slots.get(id.index())
    }

    /// Returns the number of stored entries.
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Iterates over all entries in registration order.
    pub fn iter(&self) -> impl Iterator<Item = (BoardId, &T)> {
        self.slots
            .iter()
            .enumerate()
            .map(|(idx, data)| (BoardId(idx as u32), data))
    }
}

impl<T> Default for BoardArena<T> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn arena_basic() {
        let mut arena: BoardArena<&'static str> = BoardArena::new();
        assert!(arena.is_empty());

        let id1 = arena.allocate("square-1");
        assert_eq!(id1.as_u32(), 0);
        let id2 = arena.allocate("square-2");
        assert_eq!(id2.as_u32(), 1);
        assert_eq!(arena.len(), 2);
        assert_eq!(arena.get(id1), Some(&"square-1"));
        assert_eq!(arena.get(BoardId::new(7)), None);
    }

    #[test]
    fn deterministic_iteration() {
        let mut arena: BoardArena<i32> = BoardArena::new();
        for value in [30, 10, 20] {
            arena.allocate(value);
        }
        let collected: Vec<_> = arena.iter().map(|(id, &v)| (id.as_u32(), v)).collect();
        assert_eq!(collected, vec![(0, 30), (1, 10), (2, 20)]);
    }
}
