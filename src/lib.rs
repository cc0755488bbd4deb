//! Pattern rules: local inference rules for loop puzzles.
//!
//! A loop puzzle asks for one closed loop along the edges of a planar graph.
//! This crate discovers and applies *pattern rules*: small local facts of the
//! form "whenever this neighbourhood looks like the input, the output holds".
//!
//! - Rules live on *pattern boards*, small abstract graphs whose periphery is
//!   summarised by exit edges.
//! - A rule found on one board applies wherever that board *embeds*, so rules
//!   mined on small boards generalise to every larger board.
//! - Rules are mined by exhaustive solving, deduplicated up to automorphism
//!   and stored in a compact byte format that can be matched without decoding.
//! - Generation walks a family of boards (square, hexagonal, general) in
//!   dependency order and can be resumed from a checkpoint.
//!
//! # Example
//!
//! ```
//! use pattern_rules::prelude::*;
//!
//! let mut registry = BoardRegistry::with_standard_boards().unwrap();
//! let rule = PatternRule::from_json_str(
//!     &mut registry,
//!     r#"{"patternBoard":"vertex-2-exit-none","input":{"blackEdges":[0,1]},"output":{"blackEdges":[0,1],"redEdges":[2]}}"#,
//! )
//! .unwrap();
//! assert_eq!(rule.is_valid(&registry), Ok(true));
//!
//! let collection = BinaryRuleCollection::from_rules(&registry, &[rule.clone()], false).unwrap();
//! assert!(collection.is_rule_redundant(&registry, &rule).unwrap());
//! ```

pub mod arena;
pub mod board;
pub mod codec;
pub mod collection;
pub mod compress;
pub mod embedding;
pub mod feature;
pub mod fingerprint;
pub mod generate;
pub mod rule;
pub mod sequence;
pub mod solve;

pub use board::{BoardFamily, BoardRegistry, PatternBoard, PatternBoardDescriptor};
pub use collection::BinaryRuleCollection;
pub use feature::{Feature, FeatureSet, IncompatibleFeature};
pub use rule::{MatchState, PatternRule};
pub use sequence::{BinaryRuleSequence, SequenceSpecifier};

/// Prelude for convenient usage.
pub mod prelude {
    pub use crate::arena::{BoardArena, BoardId};
    pub use crate::board::{
        BoardError, BoardFamily, BoardRegistry, PatternBoard, PatternBoardDescriptor, VertexKind,
    };
    pub use crate::codec::matcher::{
        is_actionable_embedding_from_data, is_actionable_embedding_from_feature_set, MatchTarget, RawBoardState,
    };
    pub use crate::codec::{BinaryFeatureMapping, CodecError};
    pub use crate::collection::{ActionableRuleMatch, BinaryRuleCollection, CollectionError};
    pub use crate::embedding::{compute_automorphisms, compute_embeddings, EdgeImage, Embedding};
    pub use crate::feature::{
        ColorRelation, EdgeState, FaceColorDualFeature, Feature, FeatureSet, IncompatibleFeature,
        QuickCompatibility, SectorState,
    };
    pub use crate::fingerprint::HashValue;
    pub use crate::generate::{generate_rules_for_board, GenerationError, GenerationOptions};
    pub use crate::rule::{MatchState, PatternRule, SerializedPatternRule};
    pub use crate::sequence::{BinaryRuleSequence, SequenceError, SequenceSpecifier};
    pub use crate::solve::{Solution, SolveError, SolveKinds};
}

#[cfg(test)]
mod tests {
    use super::prelude::*;
    use std::sync::Arc;

    const CURATED_RULE: &str = r#"{"patternBoard":"vertex-2-exit-none","input":{"blackEdges":[0,1]},"output":{"blackEdges":[0,1],"redEdges":[2]}}"#;

    /// The curated corner rule is derivable from a collection holding only itself.
    #[test]
    fn curated_rule_redundant_against_itself() {
        let mut registry = BoardRegistry::with_standard_boards().unwrap();
        let rule = PatternRule::from_json_str(&mut registry, CURATED_RULE).unwrap();
        let collection = BinaryRuleCollection::from_rules(&registry, &[rule.clone()], false).unwrap();
        assert!(collection.is_rule_redundant(&registry, &rule).unwrap());
    }

    #[test]
    fn square_edge_sequence_name() {
        let specifier: SequenceSpecifier = serde_json::from_str(
            r#"{"boardType":"square","solveEdges":true,"solveSectors":false,"solveFaceColors":false,"highlander":true,"vertexOrderLimit":null}"#,
        )
        .unwrap();
        assert_eq!(specifier.get_name(), "square-edge");
    }

    /// Mined rules stay valid once embedded into a bigger board.
    #[test]
    fn mined_rules_generalise() {
        let mut registry = BoardRegistry::with_standard_boards().unwrap();
        let corner = registry.deserialize_board("vertex-2-exit-none").unwrap();
        let square = registry.deserialize_board("square-1").unwrap();
        let rules = generate_rules_for_board(&registry, &corner, &[], &GenerationOptions::default()).unwrap();
        assert!(!rules.is_empty());

        let mut checked = 0;
        for rule in &rules {
            for embedding in registry.embeddings(&corner, &square).iter() {
                if let Some(image) = rule.embedded(&square, embedding) {
                    assert_eq!(image.is_valid(&registry), Ok(true));
                    checked += 1;
                }
            }
        }
        assert!(checked > 0);
    }

    /// Redundancy against a set implies redundancy against any superset.
    #[test]
    fn redundancy_is_monotone() {
        let mut registry = BoardRegistry::with_standard_boards().unwrap();
        let corner = registry.deserialize_board("vertex-2-exit-none").unwrap();
        let rules = generate_rules_for_board(&registry, &corner, &[], &GenerationOptions::default()).unwrap();
        let (first, rest) = rules.split_first().unwrap();
        let small = vec![first.clone()];
        for rule in rest {
            if rule.is_redundant(&registry, &small) {
                assert!(rule.is_redundant(&registry, &rules));
            }
        }
        assert!(first.is_redundant(&registry, &rules));
    }

    #[test]
    fn descriptors_round_trip_for_registered_boards() {
        let registry = BoardRegistry::with_standard_boards().unwrap();
        for (_, board) in registry.boards() {
            let descriptor = PatternBoardDescriptor::from_json_str(&board.descriptor().to_json_string()).unwrap();
            assert_eq!(PatternBoard::from_descriptor(descriptor).unwrap(), **board);
        }
    }

    #[test]
    fn live_state_matching_agrees_with_feature_sets() {
        let mut registry = BoardRegistry::with_standard_boards().unwrap();
        let rule = PatternRule::from_json_str(&mut registry, CURATED_RULE).unwrap();
        let collection = BinaryRuleCollection::from_rules(&registry, &[rule], false).unwrap();
        let square: Arc<PatternBoard> = registry.board_by_name("square-2").unwrap();

        let mut fs = FeatureSet::new();
        let corner = square
            .vertices()
            .iter()
            .find(|v| v.kind == VertexKind::Exit && v.order() == 2)
            .unwrap();
        for &edge in &corner.edges {
            fs.add_feature(&Feature::BlackEdge(edge)).unwrap();
        }
        let raw = RawBoardState::from_feature_set(&fs, square.edges().len(), square.sectors().len(), square.faces().len());
        let mapping = registry.feature_mapping(collection.pattern_boards()[0].as_ref()).unwrap();
        let embeddings = registry.embeddings(&collection.pattern_boards()[0], &square);
        let bytes = collection.rule_bytes(0).unwrap();
        for embedding in embeddings.iter() {
            assert_eq!(
                is_actionable_embedding_from_data(&mapping, bytes, embedding, &raw),
                is_actionable_embedding_from_feature_set(&mapping, bytes, embedding, &fs)
            );
        }
        let found = collection.get_actionable_embeddings_from_data(&registry, &square, &raw).unwrap();
        assert!(!found.is_empty());
        let applied = collection.with_rules_applied(&registry, &square, fs.clone(), |_| false).unwrap();
        for instance in &found {
            assert!(instance.embedded.output().is_subset_of(&applied));
        }
    }
}
