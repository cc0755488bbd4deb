//! Collections of binary-encoded rules.
//!
//! A collection holds a small palette of boards and one byte buffer with the
//! rules back to back; each rule starts with its palette index. Set
//! operations rebuild the buffer; everything else only appends.
//!
//! Equality of rules is byte equality on the same board: the encoding of a
//! feature set is canonical, so equal bytes and equal feature sets coincide.

use crate::board::{BoardRegistry, PatternBoard};
use crate::codec::matcher::{is_actionable_embedding_from_data, is_actionable_embedding_from_feature_set, RawBoardState};
use crate::codec::{decode_rule, encode_rule, split_rule, CodecError};
use crate::compress::{compress_bytes, decompress_bytes};
use crate::feature::{FeatureSet, IncompatibleFeature};
use crate::fingerprint::HashValue;
use crate::rule::{embedded_rules, PatternRule};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::Arc;

/// Most boards one palette can index.
pub const MAX_PALETTE_SIZE: usize = 256;

/// Error raised by collection operations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CollectionError {
    /// The palette cannot take another board.
    PaletteFull,
    /// A rule's highlander flag differs from the collection's.
    HighlanderMismatch,
    /// Serialized rule data could not be decompressed.
    Corrupt(String),
    /// A rule index past the end of the collection.
    IndexOutOfRange(usize),
    Codec(CodecError),
    Incompatible(IncompatibleFeature),
}

impl std::fmt::Display for CollectionError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CollectionError::PaletteFull => write!(f, "board palette is full ({} boards)", MAX_PALETTE_SIZE),
            CollectionError::HighlanderMismatch => write!(f, "rule highlander flag does not match collection"),
            CollectionError::Corrupt(reason) => write!(f, "corrupt rule collection: {}", reason),
            CollectionError::IndexOutOfRange(index) => write!(f, "no rule at index {}", index),
            CollectionError::Codec(e) => write!(f, "{}", e),
            CollectionError::Incompatible(e) => write!(f, "{}", e),
        }
    }
}

impl std::error::Error for CollectionError {}

impl From<CodecError> for CollectionError {
    fn from(e: CodecError) -> Self {
        CollectionError::Codec(e)
    }
}

impl From<IncompatibleFeature> for CollectionError {
    fn from(e: IncompatibleFeature) -> Self {
        CollectionError::Incompatible(e)
    }
}

impl From<crate::board::BoardError> for CollectionError {
    fn from(e: crate::board::BoardError) -> Self {
        CollectionError::Codec(CodecError::Board(e))
    }
}

/// One actionable rule instance found against raw state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActionableRuleMatch {
    pub rule_index: usize,
    pub embedding_index: usize,
    /// The rule re-expressed on the target board.
    pub embedded: PatternRule,
}

#[derive(Debug, Clone, Default)]
pub struct BinaryRuleCollection {
    pattern_boards: Vec<Arc<PatternBoard>>,
    data: Vec<u8>,
    rule_indices: Vec<usize>,
    highlander: bool,
}

impl BinaryRuleCollection {
    pub fn empty(highlander: bool) -> Self {
        Self {
            highlander,
            ..Self::default()
        }
    }

    pub fn from_rules(registry: &BoardRegistry, rules: &[PatternRule], highlander: bool) -> Result<Self, CollectionError> {
        let mut collection = Self::empty(highlander);
        for rule in rules {
            collection.add_rule(registry, rule)?;
        }
        Ok(collection)
    }

    pub fn is_highlander(&self) -> bool {
        self.highlander
    }

    pub fn pattern_boards(&self) -> &[Arc<PatternBoard>] {
        &self.pattern_boards
    }

    /// Number of rules.
    pub fn size(&self) -> usize {
        self.rule_indices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rule_indices.is_empty()
    }

    fn palette_index(&mut self, board: &Arc<PatternBoard>) -> Result<u8, CollectionError> {
        let fingerprint = board.fingerprint();
        if let Some(index) = self.pattern_boards.iter().position(|b| b.fingerprint() == fingerprint) {
            return Ok(index as u8);
        }
        if self.pattern_boards.len() >= MAX_PALETTE_SIZE {
            return Err(CollectionError::PaletteFull);
        }
        self.pattern_boards.push(Arc::clone(board));
        Ok((self.pattern_boards.len() - 1) as u8)
    }

    pub fn add_rule(&mut self, registry: &BoardRegistry, rule: &PatternRule) -> Result<(), CollectionError> {
        if rule.is_highlander() != self.highlander {
            return Err(CollectionError::HighlanderMismatch);
        }
        let mapping = registry.feature_mapping(rule.board())?;
        let bytes = encode_rule(&mapping, 0, rule.input(), rule.output())?;
        debug_assert!(
            decode_rule(&mapping, &bytes)
                .map(|(_, input, output, _)| &input == rule.input() && &output == rule.output())
                .unwrap_or(false),
            "binary rule round trip"
        );
        self.add_rule_suffix_bytes(rule.board(), &bytes[1..])
    }

    /// Appends an encoded rule given its bytes after the palette index.
    pub fn add_rule_suffix_bytes(&mut self, board: &Arc<PatternBoard>, suffix: &[u8]) -> Result<(), CollectionError> {
        let index = self.palette_index(board)?;
        self.rule_indices.push(self.data.len());
        self.data.push(index);
        self.data.extend_from_slice(suffix);
        Ok(())
    }

    /// Raw bytes of one rule, starting at its palette index.
    pub fn rule_bytes(&self, index: usize) -> Option<&[u8]> {
        let start = *self.rule_indices.get(index)?;
        let end = self.rule_indices.get(index + 1).copied().unwrap_or(self.data.len());
        self.data.get(start..end)
    }

    fn bytes_at(&self, index: usize) -> Result<&[u8], CollectionError> {
        self.rule_bytes(index).ok_or(CollectionError::IndexOutOfRange(index))
    }

    /// Rule bytes after the palette index.
    fn suffix_at(&self, index: usize) -> Result<&[u8], CollectionError> {
        Ok(self.bytes_at(index)?.get(1..).unwrap_or_default())
    }

    fn rule_board(&self, index: usize) -> Result<&Arc<PatternBoard>, CollectionError> {
        let palette = *self
            .bytes_at(index)?
            .first()
            .ok_or(CollectionError::Codec(CodecError::Truncated))?;
        self.pattern_boards
            .get(usize::from(palette))
            .ok_or(CollectionError::Codec(CodecError::InvalidPaletteIndex(palette)))
    }

    fn rule_key(&self, index: usize) -> Result<(HashValue, &[u8]), CollectionError> {
        Ok((self.rule_board(index)?.fingerprint(), self.suffix_at(index)?))
    }

    fn check_highlander(&self, other: &Self) -> Result<(), CollectionError> {
        if self.highlander != other.highlander {
            return Err(CollectionError::HighlanderMismatch);
        }
        Ok(())
    }

    /// Decodes one rule. Fails with [`CollectionError::IndexOutOfRange`]
    /// past the last rule.
    pub fn get_rule(&self, registry: &BoardRegistry, index: usize) -> Result<PatternRule, CollectionError> {
        let board = self.rule_board(index)?;
        let mapping = registry.feature_mapping(board)?;
        let (_, input, output, _) = decode_rule(&mapping, self.bytes_at(index)?)?;
        Ok(PatternRule::new(Arc::clone(board), input, output, self.highlander)?)
    }

    pub fn for_each_rule(
        &self,
        registry: &BoardRegistry,
        mut f: impl FnMut(usize, PatternRule),
    ) -> Result<(), CollectionError> {
        for index in 0..self.size() {
            f(index, self.get_rule(registry, index)?);
        }
        Ok(())
    }

    pub fn rules(&self, registry: &BoardRegistry) -> Result<Vec<PatternRule>, CollectionError> {
        (0..self.size()).map(|index| self.get_rule(registry, index)).collect()
    }

    /// Keeps rules whose board passes `predicate`, compacting the palette.
    pub fn with_pattern_board_filter(&self, predicate: impl Fn(&PatternBoard) -> bool) -> Result<Self, CollectionError> {
        let mut result = Self::empty(self.highlander);
        for index in 0..self.size() {
            let board = self.rule_board(index)?;
            if predicate(board) {
                result.add_rule_suffix_bytes(board, self.suffix_at(index)?)?;
            }
        }
        Ok(result)
    }

    /// Concatenation; duplicates stay. Both collections must agree on the
    /// highlander flag.
    pub fn with_collection(&self, other: &Self) -> Result<Self, CollectionError> {
        self.check_highlander(other)?;
        let mut result = self.clone();
        for index in 0..other.size() {
            result.add_rule_suffix_bytes(other.rule_board(index)?, other.suffix_at(index)?)?;
        }
        Ok(result)
    }

    /// Concatenation skipping rules equal to one already present. Both
    /// collections must agree on the highlander flag.
    pub fn with_collection_nonequal(&self, other: &Self) -> Result<Self, CollectionError> {
        self.check_highlander(other)?;
        let mut result = self.clone();
        let mut seen: HashSet<(HashValue, Vec<u8>)> = HashSet::new();
        for index in 0..self.size() {
            let (board, suffix) = self.rule_key(index)?;
            seen.insert((board, suffix.to_vec()));
        }
        for index in 0..other.size() {
            let (board, suffix) = other.rule_key(index)?;
            if seen.insert((board, suffix.to_vec())) {
                result.add_rule_suffix_bytes(other.rule_board(index)?, suffix)?;
            }
        }
        Ok(result)
    }

    /// Concatenation skipping rules redundant against everything kept so far.
    pub fn with_collection_nonredundant(&self, registry: &BoardRegistry, other: &Self) -> Result<Self, CollectionError> {
        let mut result = self.clone();
        for rule in other.rules(registry)? {
            if !result.is_rule_redundant(registry, &rule)? {
                result.add_rule(registry, &rule)?;
            }
        }
        Ok(result)
    }

    /// Rules of this collection not equal to any rule of `other`. Rules only
    /// compare equal under the same highlander flag, so the flags must agree.
    pub fn without_collection_nonequal(&self, other: &Self) -> Result<Self, CollectionError> {
        self.check_highlander(other)?;
        let mut excluded: HashSet<(HashValue, Vec<u8>)> = HashSet::new();
        for index in 0..other.size() {
            let (board, suffix) = other.rule_key(index)?;
            excluded.insert((board, suffix.to_vec()));
        }
        let mut result = Self::empty(self.highlander);
        for index in 0..self.size() {
            let (board, suffix) = self.rule_key(index)?;
            if !excluded.contains(&(board, suffix.to_vec())) {
                result.add_rule_suffix_bytes(self.rule_board(index)?, suffix)?;
            }
        }
        Ok(result)
    }

    /// Rules of this collection that `other` does not already derive.
    pub fn without_collection_nonredundant(&self, registry: &BoardRegistry, other: &Self) -> Result<Self, CollectionError> {
        let mut result = Self::empty(self.highlander);
        for rule in self.rules(registry)? {
            if !other.is_rule_redundant(registry, &rule)? {
                result.add_rule(registry, &rule)?;
            }
        }
        Ok(result)
    }

    /// Returns true if the rules of this collection derive `rule`.
    ///
    /// Unlike [`PatternRule::is_redundant`], every embedded rule takes part.
    pub fn is_rule_redundant(&self, registry: &BoardRegistry, rule: &PatternRule) -> Result<bool, CollectionError> {
        if rule.is_trivial() {
            return Ok(true);
        }
        let rules = self.rules(registry)?;
        let embedded = embedded_rules(registry, &rules, rule.board());
        Ok(rule.is_derived_by(&embedded))
    }

    /// Every rule of the collection embedded into `board`.
    pub fn embedded_rules_for(
        &self,
        registry: &BoardRegistry,
        board: &Arc<PatternBoard>,
    ) -> Result<Vec<PatternRule>, CollectionError> {
        Ok(embedded_rules(registry, &self.rules(registry)?, board))
    }

    /// Applies every actionable rule instance to `initial` until nothing is
    /// actionable or `stop` holds.
    ///
    /// Each pass scans rules in collection order and, per rule, its
    /// embeddings in order; all actionable instances of a pass are applied.
    pub fn with_rules_applied(
        &self,
        registry: &BoardRegistry,
        board: &Arc<PatternBoard>,
        initial: FeatureSet,
        stop: impl Fn(&FeatureSet) -> bool,
    ) -> Result<FeatureSet, CollectionError> {
        let mut prepared = Vec::with_capacity(self.size());
        for index in 0..self.size() {
            let rule_board = self.rule_board(index)?;
            prepared.push((
                index,
                registry.feature_mapping(rule_board)?,
                registry.embeddings(rule_board, board),
            ));
        }

        let mut state = initial;
        let mut passes = 0usize;
        loop {
            if stop(&state) {
                return Ok(state);
            }
            passes += 1;
            let mut applied = false;
            for (index, mapping, embeddings) in &prepared {
                let bytes = self.bytes_at(*index)?;
                let mut rule: Option<PatternRule> = None;
                for embedding in embeddings.iter() {
                    if !is_actionable_embedding_from_feature_set(mapping, bytes, embedding, &state) {
                        continue;
                    }
                    let decoded = match rule.take() {
                        Some(decoded) => decoded,
                        None => self.get_rule(registry, *index)?,
                    };
                    match decoded.embedded(board, embedding) {
                        Some(image) => {
                            state.union_in(image.output())?;
                            applied = true;
                        }
                        None => tracing::warn!(rule = *index, "actionable rule did not embed"),
                    }
                    rule = Some(decoded);
                    if stop(&state) {
                        return Ok(state);
                    }
                }
            }
            if !applied {
                tracing::debug!(passes, "rule application reached fixed point");
                return Ok(state);
            }
        }
    }

    /// Next actionable rule instance against raw state, scanning from
    /// `(initial_rule_index, initial_embedding_index)` inclusive.
    pub fn find_next_actionable_embedded_rule_from_data(
        &self,
        registry: &BoardRegistry,
        board: &Arc<PatternBoard>,
        state: &RawBoardState,
        initial_rule_index: usize,
        initial_embedding_index: usize,
    ) -> Result<Option<ActionableRuleMatch>, CollectionError> {
        for rule_index in initial_rule_index..self.size() {
            let rule_board = self.rule_board(rule_index)?;
            let mapping = registry.feature_mapping(rule_board)?;
            let embeddings = registry.embeddings(rule_board, board);
            let bytes = self.bytes_at(rule_index)?;
            let skip = if rule_index == initial_rule_index { initial_embedding_index } else { 0 };
            for (embedding_index, embedding) in embeddings.iter().enumerate().skip(skip) {
                if !is_actionable_embedding_from_data(&mapping, bytes, embedding, state) {
                    continue;
                }
                if let Some(embedded) = self.get_rule(registry, rule_index)?.embedded(board, embedding) {
                    return Ok(Some(ActionableRuleMatch {
                        rule_index,
                        embedding_index,
                        embedded,
                    }));
                }
            }
        }
        Ok(None)
    }

    /// Every actionable rule instance against raw state.
    pub fn get_actionable_embeddings_from_data(
        &self,
        registry: &BoardRegistry,
        board: &Arc<PatternBoard>,
        state: &RawBoardState,
    ) -> Result<Vec<ActionableRuleMatch>, CollectionError> {
        let mut found = Vec::new();
        let (mut rule_index, mut embedding_index) = (0, 0);
        while let Some(next) =
            self.find_next_actionable_embedded_rule_from_data(registry, board, state, rule_index, embedding_index)?
        {
            rule_index = next.rule_index;
            embedding_index = next.embedding_index + 1;
            found.push(next);
        }
        Ok(found)
    }

    pub fn serialize(&self, registry: &BoardRegistry) -> Result<SerializedBinaryRuleCollection, CollectionError> {
        Ok(SerializedBinaryRuleCollection {
            pattern_boards: self.pattern_boards.iter().map(|b| registry.name_of(b)).collect(),
            rules: compress_bytes(&self.data).map_err(|e| CollectionError::Corrupt(e.to_string()))?,
            highlander: self.highlander,
        })
    }

    /// Rebuilds a collection. Any undecodable rule aborts the whole load.
    ///
    /// Rule bytes are decoded against each palette board exactly as named;
    /// rules on a board that is an isomorphic twin of a canonical board are
    /// carried onto the canonical board.
    pub fn deserialize(
        registry: &mut BoardRegistry,
        serialized: &SerializedBinaryRuleCollection,
    ) -> Result<Self, CollectionError> {
        let pattern_boards = serialized
            .pattern_boards
            .iter()
            .map(|name| registry.deserialize_exact_board(name))
            .collect::<Result<Vec<_>, _>>()?;
        let all_canonical = pattern_boards.iter().all(|board| {
            registry
                .canonical(board)
                .map_or(false, |canonical| canonical.fingerprint() == board.fingerprint())
        });
        let data = decompress_bytes(&serialized.rules)
            .ok_or_else(|| CollectionError::Corrupt("rules do not decompress".to_string()))?;

        let mut rule_indices = Vec::new();
        let mut offset = 0;
        while offset < data.len() {
            let (palette, _, _, len) = split_rule(&data[offset..])?;
            if usize::from(palette) >= pattern_boards.len() {
                return Err(CodecError::InvalidPaletteIndex(palette).into());
            }
            rule_indices.push(offset);
            offset += len;
        }
        let collection = Self {
            pattern_boards,
            data,
            rule_indices,
            highlander: serialized.highlander,
        };
        let rules = collection.rules(registry)?;
        if all_canonical {
            return Ok(collection);
        }

        let mut canonical = Self::empty(collection.highlander);
        for rule in &rules {
            canonical.add_rule(registry, &rule.on_canonical_board(registry)?)?;
        }
        Ok(canonical)
    }

    /// Serializes the collection to CBOR bytes.
    pub fn to_cbor(&self, registry: &BoardRegistry) -> Result<Vec<u8>, Box<dyn std::error::Error>> {
        let bytes = serde_cbor::to_vec(&self.serialize(registry)?)?;
        Ok(bytes)
    }

    /// Deserializes a collection from CBOR bytes.
    pub fn from_cbor(registry: &mut BoardRegistry, bytes: &[u8]) -> Result<Self, Box<dyn std::error::Error>> {
        let serialized: SerializedBinaryRuleCollection = serde_cbor::from_slice(bytes)?;
        Ok(Self::deserialize(registry, &serialized)?)
    }

    pub fn save_to_file(&self, registry: &BoardRegistry, path: &std::path::Path) -> Result<(), Box<dyn std::error::Error>> {
        std::fs::write(path, self.to_cbor(registry)?)?;
        Ok(())
    }

    pub fn load_from_file(registry: &mut BoardRegistry, path: &std::path::Path) -> Result<Self, Box<dyn std::error::Error>> {
        let bytes = std::fs::read(path)?;
        Self::from_cbor(registry, &bytes)
    }
}

/// External form: `{patternBoards, rules, highlander}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SerializedBinaryRuleCollection {
    pub pattern_boards: Vec<String>,
    /// Compressed rule bytes.
    pub rules: String,
    #[serde(default)]
    pub highlander: bool,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::feature::{EdgeState, Feature};

    const CORNER_RULE: &str = r#"{"patternBoard":"vertex-2-exit-none","input":{"blackEdges":[0,1]},"output":{"blackEdges":[0,1],"redEdges":[2]}}"#;

    fn registry() -> BoardRegistry {
        BoardRegistry::with_standard_boards().unwrap()
    }

    fn corner_rule(registry: &mut BoardRegistry) -> PatternRule {
        PatternRule::from_json_str(registry, CORNER_RULE).unwrap()
    }

    /// Red exits on both ends leave the lone edge nowhere to go.
    fn edge_rule(registry: &mut BoardRegistry) -> PatternRule {
        let edge = registry.deserialize_board("edge").unwrap();
        PatternRule::new(
            edge,
            FeatureSet::from_features(&[Feature::RedEdge(1), Feature::RedEdge(2)]).unwrap(),
            FeatureSet::from_features(&[Feature::RedEdge(0)]).unwrap(),
            false,
        )
        .unwrap()
    }

    #[test]
    fn rules_round_trip_through_bytes() {
        let mut registry = registry();
        let corner = corner_rule(&mut registry);
        let edge = edge_rule(&mut registry);
        let collection = BinaryRuleCollection::from_rules(&registry, &[corner.clone(), edge.clone()], false).unwrap();
        assert_eq!(collection.size(), 2);
        assert_eq!(collection.pattern_boards().len(), 2);
        assert_eq!(collection.get_rule(&registry, 0).unwrap(), corner);
        assert_eq!(collection.rules(&registry).unwrap(), vec![corner, edge]);

        let mut seen = Vec::new();
        collection.for_each_rule(&registry, |i, _| seen.push(i)).unwrap();
        assert_eq!(seen, vec![0, 1]);
    }

    #[test]
    fn curated_rule_is_redundant_against_itself() {
        let mut registry = registry();
        let rule = corner_rule(&mut registry);
        let collection = BinaryRuleCollection::from_rules(&registry, &[rule.clone()], false).unwrap();
        assert!(collection.is_rule_redundant(&registry, &rule).unwrap());
        assert!(!BinaryRuleCollection::empty(false).is_rule_redundant(&registry, &rule).unwrap());
    }

    #[test]
    fn highlander_flag_must_match() {
        let mut registry = registry();
        let rule = corner_rule(&mut registry);
        let mut collection = BinaryRuleCollection::empty(true);
        assert_eq!(collection.add_rule(&registry, &rule), Err(CollectionError::HighlanderMismatch));
    }

    #[test]
    fn set_algebra_sizes() {
        let mut registry = registry();
        let corner = corner_rule(&mut registry);
        let edge = edge_rule(&mut registry);
        let x = BinaryRuleCollection::from_rules(&registry, &[corner.clone(), edge.clone()], false).unwrap();
        let y = BinaryRuleCollection::from_rules(&registry, &[corner.clone()], false).unwrap();

        assert_eq!(x.with_collection(&y).unwrap().size(), 3);
        assert_eq!(x.with_collection_nonequal(&y).unwrap().size(), 2);

        let difference = x.without_collection_nonequal(&y).unwrap();
        assert_eq!(difference.rules(&registry).unwrap(), vec![edge.clone()]);
        let rebuilt = difference.with_collection_nonequal(&y).unwrap();
        let mut rebuilt_rules = rebuilt.rules(&registry).unwrap();
        let mut original = x.rules(&registry).unwrap();
        rebuilt_rules.sort_by_key(|r| r.to_json_string(&registry).unwrap());
        original.sort_by_key(|r| r.to_json_string(&registry).unwrap());
        assert_eq!(rebuilt_rules, original);
    }

    #[test]
    fn merging_requires_matching_highlander_flags() {
        let mut registry = registry();
        let corner = corner_rule(&mut registry);
        let plain = BinaryRuleCollection::from_rules(&registry, &[corner], false).unwrap();
        let highlander = BinaryRuleCollection::empty(true);

        assert_eq!(plain.with_collection(&highlander).unwrap_err(), CollectionError::HighlanderMismatch);
        assert_eq!(highlander.with_collection_nonequal(&plain).unwrap_err(), CollectionError::HighlanderMismatch);
        assert_eq!(plain.without_collection_nonequal(&highlander).unwrap_err(), CollectionError::HighlanderMismatch);
        assert!(plain.with_collection(&BinaryRuleCollection::empty(false)).is_ok());
    }

    #[test]
    fn rule_index_past_the_end() {
        let mut registry = registry();
        let corner = corner_rule(&mut registry);
        let collection = BinaryRuleCollection::from_rules(&registry, &[corner], false).unwrap();
        assert!(collection.rule_bytes(0).is_some());
        assert_eq!(collection.rule_bytes(1), None);
        assert_eq!(collection.get_rule(&registry, 1), Err(CollectionError::IndexOutOfRange(1)));
    }

    #[test]
    fn nonredundant_union_skips_derivable_rules() {
        let mut registry = registry();
        let corner = corner_rule(&mut registry);
        let x = BinaryRuleCollection::from_rules(&registry, &[corner.clone()], false).unwrap();
        let merged = x.with_collection_nonredundant(&registry, &x).unwrap();
        assert_eq!(merged.size(), 1);
        let remaining = x.without_collection_nonredundant(&registry, &x).unwrap();
        assert!(remaining.is_empty());
    }

    #[test]
    fn board_filter_compacts_palette() {
        let mut registry = registry();
        let corner = corner_rule(&mut registry);
        let edge = edge_rule(&mut registry);
        let x = BinaryRuleCollection::from_rules(&registry, &[edge, corner.clone()], false).unwrap();
        let filtered = x
            .with_pattern_board_filter(|b| b.descriptor().derived_name().as_deref() == Some("vertex-2-exit-none"))
            .unwrap();
        assert_eq!(filtered.pattern_boards().len(), 1);
        assert_eq!(filtered.rule_bytes(0).unwrap()[0], 0);
        assert_eq!(filtered.rules(&registry).unwrap(), vec![corner]);
    }

    #[test]
    fn rules_applied_on_square() {
        let mut registry = registry();
        let rule = corner_rule(&mut registry);
        let collection = BinaryRuleCollection::from_rules(&registry, &[rule], false).unwrap();
        let square = registry.board_by_name("square-1").unwrap();
        let v0 = square.vertex(0).clone();
        let initial = FeatureSet::from_features(&[Feature::BlackEdge(v0.edges[0]), Feature::BlackEdge(v0.edges[1])]).unwrap();

        let state = collection.with_rules_applied(&registry, &square, initial.clone(), |_| false).unwrap();
        assert_eq!(state.edge_state(v0.exit_edge.unwrap()), EdgeState::Red);

        let stopped = collection.with_rules_applied(&registry, &square, initial.clone(), |_| true).unwrap();
        assert_eq!(stopped, initial);
    }

    #[test]
    fn raw_search_resumes() {
        let mut registry = registry();
        let rule = corner_rule(&mut registry);
        let collection = BinaryRuleCollection::from_rules(&registry, &[rule], false).unwrap();
        let square = registry.board_by_name("square-1").unwrap();
        let v0 = square.vertex(0).clone();
        let fs = FeatureSet::from_features(&[Feature::BlackEdge(v0.edges[0]), Feature::BlackEdge(v0.edges[1])]).unwrap();
        let raw = RawBoardState::from_feature_set(&fs, square.edges().len(), square.sectors().len(), square.faces().len());

        let all = collection.get_actionable_embeddings_from_data(&registry, &square, &raw).unwrap();
        assert_eq!(all.len(), 2);
        let first = collection
            .find_next_actionable_embedded_rule_from_data(&registry, &square, &raw, 0, 0)
            .unwrap()
            .unwrap();
        assert_eq!(first, all[0]);
        let second = collection
            .find_next_actionable_embedded_rule_from_data(&registry, &square, &raw, 0, first.embedding_index + 1)
            .unwrap()
            .unwrap();
        assert_eq!(second, all[1]);
        assert!(second.embedded.output().red_edges().any(|e| Some(e) == v0.exit_edge));
    }

    #[test]
    fn serialized_form_round_trips() {
        let mut registry = registry();
        let corner = corner_rule(&mut registry);
        let edge = edge_rule(&mut registry);
        let x = BinaryRuleCollection::from_rules(&registry, &[corner, edge], false).unwrap();
        let serialized = x.serialize(&registry).unwrap();
        assert_eq!(serialized.pattern_boards, vec!["vertex-2-exit-none".to_string(), "edge".to_string()]);
        let json = serde_json::to_string(&serialized).unwrap();
        assert!(json.starts_with("{\"patternBoards\":"));

        let restored = BinaryRuleCollection::deserialize(&mut registry, &serialized).unwrap();
        assert_eq!(restored.rules(&registry).unwrap(), x.rules(&registry).unwrap());

        let corrupt = SerializedBinaryRuleCollection {
            rules: "%%%".to_string(),
            ..serialized
        };
        assert!(matches!(
            BinaryRuleCollection::deserialize(&mut registry, &corrupt),
            Err(CollectionError::Corrupt(_))
        ));
    }

    #[test]
    fn twin_palette_board_is_read_with_its_own_numbering() {
        let mut registry = registry();
        let horizontal = registry.board_by_name("square-2").unwrap();
        let text = crate::board::standard::square_cells(&[(0, 0), (0, 1)]).to_json_string();
        let vertical = registry.deserialize_exact_board(&text).unwrap();

        // Two black edges at a corner turn its exit red.
        let rules: Vec<PatternRule> = vertical
            .vertices()
            .iter()
            .filter(|v| v.order() == 2)
            .map(|v| {
                let input = FeatureSet::from_features(&[Feature::BlackEdge(v.edges[0]), Feature::BlackEdge(v.edges[1])]).unwrap();
                let output = FeatureSet::from_features(&[Feature::RedEdge(v.exit_edge.unwrap())]).unwrap();
                PatternRule::new(Arc::clone(&vertical), input, output, false).unwrap()
            })
            .collect();
        assert_eq!(rules.len(), 4);
        let serialized = BinaryRuleCollection::from_rules(&registry, &rules, false)
            .unwrap()
            .serialize(&registry)
            .unwrap();
        assert_eq!(serialized.pattern_boards, vec![text]);

        let restored = BinaryRuleCollection::deserialize(&mut registry, &serialized).unwrap();
        assert_eq!(restored.pattern_boards().len(), 1);
        assert!(Arc::ptr_eq(&restored.pattern_boards()[0], &horizontal));
        let expected: Vec<PatternRule> = rules.iter().map(|r| r.on_canonical_board(&registry).unwrap()).collect();
        let restored_rules = restored.rules(&registry).unwrap();
        assert_eq!(restored_rules, expected);
        assert!(restored_rules.iter().all(|r| r.is_valid(&registry) == Ok(true)));
    }

    #[test]
    fn cbor_file_round_trip() {
        let mut registry = registry();
        let corner = corner_rule(&mut registry);
        let x = BinaryRuleCollection::from_rules(&registry, &[corner], false).unwrap();
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("rules.cbor");
        x.save_to_file(&registry, &path).unwrap();
        let loaded = BinaryRuleCollection::load_from_file(&mut registry, &path).unwrap();
        assert_eq!(loaded.rules(&registry).unwrap(), x.rules(&registry).unwrap());
    }
}
