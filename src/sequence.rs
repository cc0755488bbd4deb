//! Resumable, generation-ordered rule generation.
//!
//! A sequence walks the boards of one family generation by generation. A
//! board is handed out only after every unprocessed board of its generation
//! with fewer edges that embeds into it is done, so simpler patterns are
//! always mined first. Workers claim boards, mine them, and submit results;
//! the sequence merges submitted collections and can be checkpointed at any
//! point.

use crate::board::{BoardError, BoardFamily, BoardRegistry, PatternBoard};
use crate::codec::CodecError;
use crate::collection::{BinaryRuleCollection, CollectionError, SerializedBinaryRuleCollection};
use crate::generate::{generate_rules_for_board, GenerationError, GenerationOptions};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Error raised by sequence operations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SequenceError {
    Board(BoardError),
    Collection(CollectionError),
    Generation(GenerationError),
    /// A board named in a checkpoint is not part of the sequence.
    UnknownBoard(String),
}

impl std::fmt::Display for SequenceError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SequenceError::Board(e) => write!(f, "{}", e),
            SequenceError::Collection(e) => write!(f, "{}", e),
            SequenceError::Generation(e) => write!(f, "{}", e),
            SequenceError::UnknownBoard(name) => write!(f, "board {} is not part of this sequence", name),
        }
    }
}

impl std::error::Error for SequenceError {}

impl From<BoardError> for SequenceError {
    fn from(e: BoardError) -> Self {
        SequenceError::Board(e)
    }
}

impl From<CollectionError> for SequenceError {
    fn from(e: CollectionError) -> Self {
        SequenceError::Collection(e)
    }
}

impl From<GenerationError> for SequenceError {
    fn from(e: GenerationError) -> Self {
        SequenceError::Generation(e)
    }
}

impl From<CodecError> for SequenceError {
    fn from(e: CodecError) -> Self {
        SequenceError::Collection(CollectionError::Codec(e))
    }
}

/// Which boards to walk and what to solve for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SequenceSpecifier {
    pub board_type: BoardFamily,
    pub solve_edges: bool,
    pub solve_sectors: bool,
    pub solve_face_colors: bool,
    pub highlander: bool,
    #[serde(default)]
    pub vertex_order_limit: Option<usize>,
}

impl SequenceSpecifier {
    /// Stable name, e.g. `square-edge` or `general-edge-sector-unrestricted-3`.
    pub fn get_name(&self) -> String {
        let mut name = self.board_type.as_str().to_string();
        for (enabled, part) in [
            (self.solve_edges, "edge"),
            (self.solve_sectors, "sector"),
            (self.solve_face_colors, "color"),
        ] {
            if enabled {
                name.push('-');
                name.push_str(part);
            }
        }
        if !self.highlander {
            name.push_str("-unrestricted");
        }
        if let Some(limit) = self.vertex_order_limit {
            name.push_str(&format!("-{}", limit));
        }
        name
    }

    pub fn generation_options(&self) -> GenerationOptions {
        GenerationOptions {
            solve_edges: self.solve_edges,
            solve_sectors: self.solve_sectors,
            solve_face_colors: self.solve_face_colors,
            highlander: self.highlander,
            ..GenerationOptions::default()
        }
    }
}

fn contains(boards: &[Arc<PatternBoard>], board: &PatternBoard) -> bool {
    boards.iter().any(|b| b.fingerprint() == board.fingerprint())
}

#[derive(Debug, Clone)]
pub struct BinaryRuleSequence {
    specifier: SequenceSpecifier,
    generations: Vec<Vec<Arc<PatternBoard>>>,
    collection: BinaryRuleCollection,
    processed_boards: Vec<Arc<PatternBoard>>,
    current_boards: Vec<Arc<PatternBoard>>,
}

impl BinaryRuleSequence {
    pub fn new(registry: &mut BoardRegistry, specifier: SequenceSpecifier) -> Result<Self, SequenceError> {
        let generations = registry.family_generations(specifier.board_type, specifier.vertex_order_limit)?;
        Ok(Self {
            specifier,
            generations,
            collection: BinaryRuleCollection::empty(specifier.highlander),
            processed_boards: Vec::new(),
            current_boards: Vec::new(),
        })
    }

    pub fn get_name(&self) -> String {
        self.specifier.get_name()
    }

    pub fn specifier(&self) -> &SequenceSpecifier {
        &self.specifier
    }

    pub fn generations(&self) -> &[Vec<Arc<PatternBoard>>] {
        &self.generations
    }

    pub fn collection(&self) -> &BinaryRuleCollection {
        &self.collection
    }

    pub fn processed_boards(&self) -> &[Arc<PatternBoard>] {
        &self.processed_boards
    }

    pub fn current_boards(&self) -> &[Arc<PatternBoard>] {
        &self.current_boards
    }

    pub fn is_complete(&self) -> bool {
        self.generations
            .iter()
            .flatten()
            .all(|b| contains(&self.processed_boards, b))
    }

    fn active_generation(&self) -> Option<usize> {
        self.generations
            .iter()
            .position(|generation| generation.iter().any(|b| !contains(&self.processed_boards, b)))
    }

    /// First unprocessed, unclaimed board that is ready for work.
    ///
    /// Only the earliest generation with unprocessed boards is considered.
    /// Returns `None` when everything is processed, or when every remaining
    /// board of that generation is claimed or waits on a claimed one.
    pub fn get_next_board(&self, registry: &BoardRegistry) -> Option<Arc<PatternBoard>> {
        let generation = &self.generations[self.active_generation()?];
        let unprocessed: Vec<&Arc<PatternBoard>> = generation
            .iter()
            .filter(|b| !contains(&self.processed_boards, b))
            .collect();
        unprocessed
            .iter()
            .filter(|board| !contains(&self.current_boards, board))
            .find(|board| {
                !unprocessed.iter().any(|other| {
                    other.edges().len() < board.edges().len() && !registry.embeddings(other, board).is_empty()
                })
            })
            .map(|board| Arc::clone(*board))
    }

    /// Claims a board for a worker.
    pub fn add_processing_board(&mut self, board: &Arc<PatternBoard>) {
        if !contains(&self.current_boards, board) {
            self.current_boards.push(Arc::clone(board));
        }
    }

    /// Releases a claim without submitting results.
    pub fn remove_processing_board(&mut self, board: &PatternBoard) {
        self.current_boards.retain(|b| b.fingerprint() != board.fingerprint());
    }

    /// Merges a worker's rules and marks its board done.
    ///
    /// A collection mined under the other highlander setting is rejected and
    /// the board stays claimed.
    pub fn add_processed_board_collection(
        &mut self,
        registry: &BoardRegistry,
        board: &Arc<PatternBoard>,
        collection: &BinaryRuleCollection,
    ) -> Result<(), SequenceError> {
        self.collection = self.collection.with_collection_nonequal(collection)?;
        self.remove_processing_board(board);
        if !contains(&self.processed_boards, board) {
            self.processed_boards.push(Arc::clone(board));
        }
        tracing::info!(
            board = %registry.name_of(board),
            added = collection.size(),
            total = self.collection.size(),
            "board processed"
        );
        Ok(())
    }

    /// Mines the rules `board` adds beyond everything collected so far.
    pub fn get_collection_for_board(
        &self,
        registry: &BoardRegistry,
        board: &Arc<PatternBoard>,
    ) -> Result<BinaryRuleCollection, SequenceError> {
        let prior: Vec<_> = self
            .collection
            .rules(registry)?
            .into_iter()
            .filter(|rule| !registry.embeddings(rule.board(), board).is_empty())
            .collect();
        let rules = generate_rules_for_board(registry, board, &prior, &self.specifier.generation_options())?;
        Ok(BinaryRuleCollection::from_rules(registry, &rules, self.specifier.highlander)?)
    }

    /// Claims, mines and submits the next ready board in one step.
    pub fn process_next_board(&mut self, registry: &BoardRegistry) -> Result<Option<Arc<PatternBoard>>, SequenceError> {
        let Some(board) = self.get_next_board(registry) else {
            return Ok(None);
        };
        self.add_processing_board(&board);
        let collection = match self.get_collection_for_board(registry, &board) {
            Ok(collection) => collection,
            Err(e) => {
                self.remove_processing_board(&board);
                return Err(e);
            }
        };
        self.add_processed_board_collection(registry, &board, &collection)?;
        Ok(Some(board))
    }

    pub fn get_status_string(&self, registry: &BoardRegistry) -> String {
        let total: usize = self.generations.iter().map(Vec::len).sum();
        let generation = match self.active_generation() {
            Some(index) => format!("generation {}/{}", index + 1, self.generations.len()),
            None => "complete".to_string(),
        };
        let mut status = format!(
            "{}: {}, {}/{} boards processed, {} rules",
            self.get_name(),
            generation,
            self.processed_boards.len(),
            total,
            self.collection.size()
        );
        if !self.current_boards.is_empty() {
            let names: Vec<String> = self.current_boards.iter().map(|b| registry.name_of(b)).collect();
            status.push_str(&format!(", processing {}", names.join(", ")));
        }
        status
    }

    pub fn serialize(&self, registry: &BoardRegistry) -> Result<SerializedBinaryRuleSequence, SequenceError> {
        Ok(SerializedBinaryRuleSequence {
            specifier: self.specifier,
            collection: self.collection.serialize(registry)?,
            processed_boards: self.processed_boards.iter().map(|b| registry.name_of(b)).collect(),
            current_boards: self.current_boards.iter().map(|b| registry.name_of(b)).collect(),
        })
    }

    pub fn deserialize(
        registry: &mut BoardRegistry,
        serialized: &SerializedBinaryRuleSequence,
    ) -> Result<Self, SequenceError> {
        let mut sequence = Self::new(registry, serialized.specifier)?;
        sequence.collection = BinaryRuleCollection::deserialize(registry, &serialized.collection)?;
        for (names, target) in [
            (&serialized.processed_boards, &mut sequence.processed_boards),
            (&serialized.current_boards, &mut sequence.current_boards),
        ] {
            for name in names {
                let board = registry.deserialize_board(name)?;
                if !sequence.generations.iter().any(|g| contains(g, &board)) {
                    return Err(SequenceError::UnknownBoard(name.clone()));
                }
                target.push(board);
            }
        }
        Ok(sequence)
    }

    /// Serializes the sequence to CBOR bytes.
    pub fn to_cbor(&self, registry: &BoardRegistry) -> Result<Vec<u8>, Box<dyn std::error::Error>> {
        let bytes = serde_cbor::to_vec(&self.serialize(registry)?)?;
        Ok(bytes)
    }

    /// Deserializes a sequence from CBOR bytes.
    pub fn from_cbor(registry: &mut BoardRegistry, bytes: &[u8]) -> Result<Self, Box<dyn std::error::Error>> {
        let serialized: SerializedBinaryRuleSequence = serde_cbor::from_slice(bytes)?;
        Ok(Self::deserialize(registry, &serialized)?)
    }

    /// Saves a checkpoint. Uses CBOR format.
    pub fn save_to_file(&self, registry: &BoardRegistry, path: &std::path::Path) -> Result<(), Box<dyn std::error::Error>> {
        std::fs::write(path, self.to_cbor(registry)?)?;
        Ok(())
    }

    /// Loads a checkpoint. Uses CBOR format.
    pub fn load_from_file(registry: &mut BoardRegistry, path: &std::path::Path) -> Result<Self, Box<dyn std::error::Error>> {
        let bytes = std::fs::read(path)?;
        Self::from_cbor(registry, &bytes)
    }
}

/// External form: the specifier fields plus
/// `{collection, processedBoards, currentBoards}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SerializedBinaryRuleSequence {
    #[serde(flatten)]
    pub specifier: SequenceSpecifier,
    pub collection: SerializedBinaryRuleCollection,
    pub processed_boards: Vec<String>,
    pub current_boards: Vec<String>,
}
