//! Registry of canonical pattern boards.
//!
//! The registry is the explicit context object of the engine. It owns every
//! canonical board and the per-board caches (embeddings, automorphisms,
//! feature mappings, solutions). Boards are immutable once registered and the
//! board universe is small, so nothing is ever evicted.
//!
//! Lookups go through the shape fingerprint first; only boards in the same
//! bucket are compared with a full isomorphism search.

use super::{standard, BoardError, BoardFamily, PatternBoard, PatternBoardDescriptor};
use crate::arena::{BoardArena, BoardId};
use crate::codec::{BinaryFeatureMapping, CodecError};
use crate::embedding::{compute_automorphisms, compute_embeddings, Embedding};
use crate::fingerprint::HashValue;
use crate::solve::{self, Solution, SolveError};
use std::cell::RefCell;
use std::collections::HashMap;
use std::sync::Arc;

type Cache<K, V> = RefCell<HashMap<K, Arc<V>>>;

/// Canonical boards plus every derived per-board cache.
///
/// Besides canonical boards the registry remembers every board exactly as it
/// was described. Names and serialised forms refer to those exact boards, so
/// feature indices written against a name keep their meaning even when the
/// board is an isomorphic twin of a canonical one.
#[derive(Debug, Default)]
pub struct BoardRegistry {
    /// Canonical boards, one per isomorphism class.
    boards: BoardArena<Arc<PatternBoard>>,
    /// Every board seen, by representation fingerprint.
    exact: HashMap<HashValue, Arc<PatternBoard>>,
    /// Name to the fingerprint of the board registered under it.
    names: HashMap<String, HashValue>,
    /// First name given to each exact board.
    primary_names: HashMap<HashValue, String>,
    by_shape: HashMap<HashValue, Vec<BoardId>>,
    /// Canonical board of every fingerprint seen.
    by_fingerprint: HashMap<HashValue, BoardId>,
    embeddings: Cache<(HashValue, HashValue), Vec<Embedding>>,
    automorphisms: Cache<HashValue, Vec<Embedding>>,
    mappings: Cache<HashValue, BinaryFeatureMapping>,
    solutions: Cache<HashValue, Vec<Solution>>,
}

impl BoardRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// A registry holding every standard board under its standard name.
    pub fn with_standard_boards() -> Result<Self, BoardError> {
        let mut registry = Self::new();
        for board in standard::all_standard_boards() {
            registry.register_descriptor(&board.name, board.descriptor)?;
        }
        Ok(registry)
    }

    /// Number of canonical boards.
    pub fn len(&self) -> usize {
        self.boards.len()
    }

    pub fn is_empty(&self) -> bool {
        self.boards.is_empty()
    }

    /// Canonical boards in registration order.
    pub fn boards(&self) -> impl Iterator<Item = (BoardId, &Arc<PatternBoard>)> {
        self.boards.iter()
    }

    pub fn get(&self, id: BoardId) -> Option<&Arc<PatternBoard>> {
        self.boards.get(id)
    }

    /// Returns the canonical board isomorphic to `board`, registering `board`
    /// itself when none exists.
    pub fn register(&mut self, board: PatternBoard) -> Arc<PatternBoard> {
        self.register_exact(board).1
    }

    /// Registers `board`, returning it as given (shared with an earlier
    /// identical board) together with its canonical board.
    fn register_exact(&mut self, board: PatternBoard) -> (Arc<PatternBoard>, Arc<PatternBoard>) {
        let fingerprint = board.fingerprint();
        let known = self.exact.get(&fingerprint).and_then(|exact| {
            let canonical = self.by_fingerprint.get(&fingerprint).and_then(|&id| self.boards.get(id))?;
            Some((Arc::clone(exact), Arc::clone(canonical)))
        });
        if let Some(found) = known {
            return found;
        }

        let existing = self
            .by_shape
            .get(&board.shape_fingerprint())
            .into_iter()
            .flatten()
            .filter_map(|&id| Some((id, self.boards.get(id)?)))
            .find(|(_, candidate)| Self::is_isomorphic(candidate, &board))
            .map(|(id, candidate)| (id, Arc::clone(candidate)));
        if let Some((id, canonical)) = existing {
            let exact = Arc::new(board);
            self.exact.insert(fingerprint, Arc::clone(&exact));
            self.by_fingerprint.insert(fingerprint, id);
            tracing::debug!(board = %id, %fingerprint, "registered isomorphic twin");
            return (exact, canonical);
        }

        let shape = board.shape_fingerprint();
        let canonical = Arc::new(board);
        let id = self.boards.allocate(Arc::clone(&canonical));
        self.exact.insert(fingerprint, Arc::clone(&canonical));
        self.by_fingerprint.insert(fingerprint, id);
        self.by_shape.entry(shape).or_default().push(id);
        tracing::debug!(board = %id, %shape, "registered canonical board");
        (Arc::clone(&canonical), canonical)
    }

    /// Registers a board under a name and returns its canonical board. The
    /// first name given to a board becomes its primary name.
    pub fn register_named(&mut self, name: &str, board: PatternBoard) -> Arc<PatternBoard> {
        if let Some(existing) = self.board_by_name(name) {
            return existing;
        }
        let (exact, canonical) = self.register_exact(board);
        self.names.insert(name.to_string(), exact.fingerprint());
        self.primary_names.entry(exact.fingerprint()).or_insert_with(|| name.to_string());
        canonical
    }

    pub fn register_descriptor(
        &mut self,
        name: &str,
        descriptor: PatternBoardDescriptor,
    ) -> Result<Arc<PatternBoard>, BoardError> {
        Ok(self.register_named(name, PatternBoard::from_descriptor(descriptor)?))
    }

    /// Canonical board registered under `name`.
    pub fn board_by_name(&self, name: &str) -> Option<Arc<PatternBoard>> {
        self.names.get(name).and_then(|fingerprint| self.canonical_of(*fingerprint))
    }

    /// Canonical board for any board with the same descriptor or shape.
    pub fn canonical(&self, board: &PatternBoard) -> Option<Arc<PatternBoard>> {
        self.canonical_of(board.fingerprint())
    }

    fn canonical_of(&self, fingerprint: HashValue) -> Option<Arc<PatternBoard>> {
        self.by_fingerprint
            .get(&fingerprint)
            .and_then(|&id| self.boards.get(id))
            .cloned()
    }

    /// Serialised name of a board: its registered name, its derived name, or
    /// its JSON descriptor. Never the name of an isomorphic twin.
    pub fn name_of(&self, board: &PatternBoard) -> String {
        self.primary_names
            .get(&board.fingerprint())
            .cloned()
            .or_else(|| board.descriptor().derived_name())
            .unwrap_or_else(|| board.descriptor().to_json_string())
    }

    /// Resolves a serialised board to its canonical board.
    pub fn deserialize_board(&mut self, text: &str) -> Result<Arc<PatternBoard>, BoardError> {
        let exact = self.deserialize_exact_board(text)?;
        self.canonical(&exact)
            .ok_or_else(|| BoardError::UnknownBoard(text.to_string()))
    }

    /// Resolves a serialised board (a registered or derived name, or a JSON
    /// descriptor array) to the board exactly as it describes it.
    ///
    /// Feature indices stored next to `text` refer to this board; use
    /// [`isomorphism`](Self::isomorphism) to carry them onto the canonical one.
    pub fn deserialize_exact_board(&mut self, text: &str) -> Result<Arc<PatternBoard>, BoardError> {
        if let Some(exact) = self.names.get(text).and_then(|fingerprint| self.exact.get(fingerprint)) {
            return Ok(Arc::clone(exact));
        }
        if let Some(descriptor) = PatternBoardDescriptor::from_derived_name(text) {
            let board = PatternBoard::from_descriptor(descriptor)?;
            self.register_named(text, board);
            return self
                .names
                .get(text)
                .and_then(|fingerprint| self.exact.get(fingerprint))
                .cloned()
                .ok_or_else(|| BoardError::UnknownBoard(text.to_string()));
        }
        if text.trim_start().starts_with('[') {
            let descriptor = PatternBoardDescriptor::from_json_str(text)?;
            return Ok(self.register_exact(PatternBoard::from_descriptor(descriptor)?).0);
        }
        Err(BoardError::UnknownBoard(text.to_string()))
    }

    /// An isomorphism from `source` onto `target`, if the boards are isomorphic.
    pub fn isomorphism(&self, source: &PatternBoard, target: &PatternBoard) -> Option<Embedding> {
        if source.fingerprint() == target.fingerprint() {
            return Some(Embedding::identity(source));
        }
        self.embeddings(source, target)
            .iter()
            .find(|embedding| embedding.is_isomorphism(source, target))
            .cloned()
    }

    /// Returns true if some embedding of `a` into `b` is an isomorphism.
    pub fn is_isomorphic(a: &PatternBoard, b: &PatternBoard) -> bool {
        a.shape_fingerprint() == b.shape_fingerprint()
            && a.kind_counts() == b.kind_counts()
            && a.edges().len() == b.edges().len()
            && a.faces().len() == b.faces().len()
            && a.sectors().len() == b.sectors().len()
            && compute_embeddings(a, b).iter().any(|e| e.is_isomorphism(a, b))
    }

    /// Cached embeddings of `source` into `target`.
    pub fn embeddings(&self, source: &PatternBoard, target: &PatternBoard) -> Arc<Vec<Embedding>> {
        let key = (source.fingerprint(), target.fingerprint());
        if let Some(found) = self.embeddings.borrow().get(&key) {
            return Arc::clone(found);
        }
        let computed = Arc::new(compute_embeddings(source, target));
        self.embeddings.borrow_mut().insert(key, Arc::clone(&computed));
        computed
    }

    /// Cached automorphisms of a board.
    pub fn automorphisms(&self, board: &PatternBoard) -> Arc<Vec<Embedding>> {
        let key = board.fingerprint();
        if let Some(found) = self.automorphisms.borrow().get(&key) {
            return Arc::clone(found);
        }
        let computed = Arc::new(compute_automorphisms(board));
        self.automorphisms.borrow_mut().insert(key, Arc::clone(&computed));
        computed
    }

    /// Cached binary feature mapping of a board.
    pub fn feature_mapping(&self, board: &PatternBoard) -> Result<Arc<BinaryFeatureMapping>, CodecError> {
        let key = board.fingerprint();
        if let Some(found) = self.mappings.borrow().get(&key) {
            return Ok(Arc::clone(found));
        }
        let computed = Arc::new(BinaryFeatureMapping::new(board)?);
        self.mappings.borrow_mut().insert(key, Arc::clone(&computed));
        Ok(computed)
    }

    /// Cached unconstrained solutions of a board.
    ///
    /// Boards too large to solve are an error and nothing is cached for them.
    pub fn solutions(&self, board: &PatternBoard) -> Result<Arc<Vec<Solution>>, SolveError> {
        let key = board.fingerprint();
        if let Some(found) = self.solutions.borrow().get(&key) {
            return Ok(Arc::clone(found));
        }
        let computed = Arc::new(solve::enumerate_solutions(board)?);
        tracing::debug!(solutions = computed.len(), "enumerated board solutions");
        self.solutions.borrow_mut().insert(key, Arc::clone(&computed));
        Ok(computed)
    }

    /// Registers and returns the standard generations of a family, keeping
    /// boards whose vertex order is within `vertex_order_limit`.
    pub fn family_generations(
        &mut self,
        family: BoardFamily,
        vertex_order_limit: Option<usize>,
    ) -> Result<Vec<Vec<Arc<PatternBoard>>>, BoardError> {
        let mut generations = Vec::new();
        for generation in standard::generations(family) {
            let mut boards: Vec<Arc<PatternBoard>> = Vec::new();
            for entry in generation {
                let board = self.register_descriptor(&entry.name, entry.descriptor)?;
                let within = vertex_order_limit.map_or(true, |limit| board.max_vertex_order() <= limit);
                if within && !boards.iter().any(|b| Arc::ptr_eq(b, &board)) {
                    boards.push(board);
                }
            }
            if !boards.is_empty() {
                generations.push(boards);
            }
        }
        Ok(generations)
    }
}
