//! Pattern rules: "if the input holds on this board, so does the output".
//!
//! A rule owns its board and two feature sets; the output always contains
//! the input. Rules are values: embedding or canonicalising a rule produces a
//! new one.

pub mod propagate;

use crate::board::{BoardRegistry, PatternBoard};
use crate::codec::{decode_rule, encode_rule, CodecError};
use crate::embedding::Embedding;
use crate::feature::{FeatureSet, IncompatibleFeature, QuickCompatibility};
use crate::solve::{self, SolveError};
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

pub use propagate::{apply_to_fixed_point, embedded_rules};

/// How a rule relates to a feature set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MatchState {
    /// The input can never hold.
    Incompatible,
    /// The output already holds.
    Inconsequential,
    /// The input is compatible but not yet satisfied.
    Dormant,
    /// The input holds and the output would add something.
    Actionable,
}

#[derive(Debug, Clone)]
pub struct PatternRule {
    board: Arc<PatternBoard>,
    input: FeatureSet,
    output: FeatureSet,
    highlander: bool,
}

impl PartialEq for PatternRule {
    fn eq(&self, other: &Self) -> bool {
        self.board.fingerprint() == other.board.fingerprint()
            && self.highlander == other.highlander
            && self.input == other.input
            && self.output == other.output
    }
}

impl Eq for PatternRule {}

impl PatternRule {
    /// Builds a rule. The stored output is the union of `input` and `output`.
    ///
    /// Every feature must name an element of `board`; untrusted feature sets
    /// go through [`from_serialized`](Self::from_serialized) instead.
    pub fn new(
        board: Arc<PatternBoard>,
        input: FeatureSet,
        output: FeatureSet,
        highlander: bool,
    ) -> Result<Self, IncompatibleFeature> {
        let output = input.union(&output)?;
        debug_assert!(output.feature_outside(&board).is_none(), "rule feature outside its board");
        Ok(Self {
            board,
            input,
            output,
            highlander,
        })
    }

    pub fn board(&self) -> &Arc<PatternBoard> {
        &self.board
    }

    pub fn input(&self) -> &FeatureSet {
        &self.input
    }

    /// The output, always a superset of the input.
    pub fn output(&self) -> &FeatureSet {
        &self.output
    }

    /// Whether the rule relies on the puzzle having a unique solution.
    pub fn is_highlander(&self) -> bool {
        self.highlander
    }

    /// Returns true if the input holds on `fs`.
    pub fn matches(&self, fs: &FeatureSet) -> bool {
        self.input.is_subset_of(fs)
    }

    /// Classifies `fs`. An output that already holds wins over every other
    /// state.
    pub fn get_match_state(&self, fs: &FeatureSet) -> MatchState {
        if self.output.is_subset_of(fs) {
            MatchState::Inconsequential
        } else if self.input.get_quick_compatibility_with(fs) == QuickCompatibility::Incompatible {
            MatchState::Incompatible
        } else if self.input.is_subset_of(fs) {
            MatchState::Actionable
        } else if self.input.is_compatible_with(fs) {
            MatchState::Dormant
        } else {
            MatchState::Incompatible
        }
    }

    pub fn has_application(&self, fs: &FeatureSet) -> bool {
        self.get_match_state(fs) == MatchState::Actionable
    }

    /// Unions the output into `fs`. Must only be called when
    /// [`has_application`](Self::has_application) holds.
    pub fn apply(&self, fs: &mut FeatureSet) -> Result<(), IncompatibleFeature> {
        debug_assert!(self.has_application(fs), "rule applied without application");
        fs.union_in(&self.output)
    }

    /// Returns true if the output adds nothing to the input.
    pub fn is_trivial(&self) -> bool {
        self.output.is_subset_of(&self.input)
    }

    /// Returns true if `rules`, embedded into this board, derive the output
    /// from the input.
    ///
    /// Only images whose output lies within this rule's output take part. An
    /// input the rules prove contradictory counts as redundant.
    pub fn is_redundant(&self, registry: &BoardRegistry, rules: &[PatternRule]) -> bool {
        if self.is_trivial() {
            return true;
        }
        let candidates: Vec<PatternRule> = embedded_rules(registry, rules, &self.board)
            .into_iter()
            .filter(|r| r.output.is_subset_of(&self.output))
            .collect();
        self.is_derived_by(&candidates)
    }

    /// Fixed-point check against rules already embedded into this board.
    pub(crate) fn is_derived_by(&self, embedded: &[PatternRule]) -> bool {
        match apply_to_fixed_point(embedded, self.input.clone(), |state| self.output.is_subset_of(state)) {
            Ok(state) => self.output.is_subset_of(&state),
            Err(_) => true,
        }
    }

    /// Ground-truth validity against every solution of the board.
    ///
    /// Fails when the board is too large to enumerate.
    pub fn is_valid(&self, registry: &BoardRegistry) -> Result<bool, SolveError> {
        let solutions = registry.solutions(&self.board)?;
        Ok(solve::is_pattern_rule_valid(&self.board, &solutions, &self.input, &self.output, self.highlander))
    }

    /// The rule re-expressed on `target` through `embedding`, if it carries.
    pub fn embedded(&self, target: &Arc<PatternBoard>, embedding: &Embedding) -> Option<PatternRule> {
        let input = self.input.embedded(embedding)?;
        let output = self.output.embedded(embedding)?;
        PatternRule::new(Arc::clone(target), input, output, self.highlander).ok()
    }

    /// Returns true if an automorphism of the shared board maps this rule
    /// exactly onto `other`.
    pub fn is_isomorphic_to(&self, registry: &BoardRegistry, other: &PatternRule) -> bool {
        if self.board.fingerprint() != other.board.fingerprint() || self.highlander != other.highlander {
            return false;
        }
        registry.automorphisms(&self.board).iter().any(|automorphism| {
            self.embedded(&self.board, automorphism)
                .map_or(false, |image| image.input == other.input && image.output == other.output)
        })
    }

    /// The same rule on the canonical board of its board's isomorphism class.
    pub fn on_canonical_board(&self, registry: &BoardRegistry) -> Result<PatternRule, CodecError> {
        let unmapped = || CodecError::NoCanonicalImage(registry.name_of(&self.board));
        let canonical = registry.canonical(&self.board).ok_or_else(unmapped)?;
        if canonical.fingerprint() == self.board.fingerprint() {
            return Ok(Self {
                board: canonical,
                ..self.clone()
            });
        }
        let isomorphism = registry.isomorphism(&self.board, &canonical).ok_or_else(unmapped)?;
        self.embedded(&canonical, &isomorphism).ok_or_else(unmapped)
    }

    /// Builds a rule from untrusted feature sets written against `board`,
    /// exactly as named, and carries it onto the canonical board.
    fn from_exact_board(
        registry: &BoardRegistry,
        board: Arc<PatternBoard>,
        input: FeatureSet,
        output: FeatureSet,
        highlander: bool,
    ) -> Result<Self, CodecError> {
        for set in [&input, &output] {
            if let Some(feature) = set.feature_outside(&board) {
                return Err(CodecError::FeatureOutOfRange(feature));
            }
        }
        PatternRule::new(board, input, output, highlander)?.on_canonical_board(registry)
    }

    /// The automorphic variant with the smallest binary encoding.
    pub fn canonicalized(&self, registry: &BoardRegistry) -> Result<PatternRule, CodecError> {
        let mapping = registry.feature_mapping(&self.board)?;
        let mut best: Option<(Vec<u8>, PatternRule)> = None;
        for automorphism in registry.automorphisms(&self.board).iter() {
            let Some(variant) = self.embedded(&self.board, automorphism) else {
                continue;
            };
            let bytes = encode_rule(&mapping, 0, &variant.input, &variant.output)?;
            if best.as_ref().map_or(true, |(smallest, _)| bytes < *smallest) {
                best = Some((bytes, variant));
            }
        }
        Ok(best.map_or_else(|| self.clone(), |(_, rule)| rule))
    }

    /// `"<board name>/<base64>"`, where the payload is the highlander flag
    /// followed by the rule bytes without the palette byte.
    pub fn get_binary_identifier(&self, registry: &BoardRegistry) -> Result<String, CodecError> {
        let mapping = registry.feature_mapping(&self.board)?;
        let bytes = encode_rule(&mapping, 0, &self.input, &self.output)?;
        debug_assert!(
            decode_rule(&mapping, &bytes)
                .map(|(_, input, output, _)| input == self.input && output == self.output)
                .unwrap_or(false),
            "binary rule round trip"
        );
        let mut payload = Vec::with_capacity(bytes.len());
        payload.push(u8::from(self.highlander));
        payload.extend_from_slice(&bytes[1..]);
        Ok(format!("{}/{}", registry.name_of(&self.board), STANDARD.encode(payload)))
    }

    /// Inverse of [`get_binary_identifier`](Self::get_binary_identifier).
    pub fn from_binary_identifier(registry: &mut BoardRegistry, identifier: &str) -> Result<Self, CodecError> {
        let invalid = || CodecError::InvalidIdentifier(identifier.to_string());
        let (name, encoded) = identifier.split_once('/').ok_or_else(invalid)?;
        let payload = STANDARD.decode(encoded).map_err(|_| invalid())?;
        let (&flag, body) = payload.split_first().ok_or_else(invalid)?;
        let board = registry.deserialize_exact_board(name)?;
        let mapping = registry.feature_mapping(&board)?;

        let mut bytes = Vec::with_capacity(payload.len());
        bytes.push(0);
        bytes.extend_from_slice(body);
        let (_, input, output, len) = decode_rule(&mapping, &bytes)?;
        if len != bytes.len() {
            return Err(invalid());
        }
        Self::from_exact_board(registry, board, input, output, flag != 0)
    }

    pub fn to_serialized(&self, registry: &BoardRegistry) -> SerializedPatternRule {
        SerializedPatternRule {
            pattern_board: registry.name_of(&self.board),
            input: self.input.clone(),
            output: self.output.clone(),
            highlander: self.highlander,
        }
    }

    /// Rebuilds a rule from its JSON form. Feature indices refer to the board
    /// as named; the result lives on the canonical board.
    pub fn from_serialized(registry: &mut BoardRegistry, serialized: SerializedPatternRule) -> Result<Self, CodecError> {
        let board = registry.deserialize_exact_board(&serialized.pattern_board)?;
        Self::from_exact_board(
            registry,
            board,
            serialized.input,
            serialized.output,
            serialized.highlander,
        )
    }

    pub fn to_json_string(&self, registry: &BoardRegistry) -> Result<String, CodecError> {
        Ok(serde_json::to_string(&self.to_serialized(registry))?)
    }

    pub fn from_json_str(registry: &mut BoardRegistry, text: &str) -> Result<Self, CodecError> {
        let serialized: SerializedPatternRule = serde_json::from_str(text)?;
        Self::from_serialized(registry, serialized)
    }
}

/// JSON form: `{patternBoard, input, output, highlander?}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SerializedPatternRule {
    pub pattern_board: String,
    pub input: FeatureSet,
    pub output: FeatureSet,
    #[serde(default, skip_serializing_if = "is_false")]
    pub highlander: bool,
}

fn is_false(value: &bool) -> bool {
    !*value
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::feature::Feature;

    const CORNER_RULE: &str = r#"{"patternBoard":"vertex-2-exit-none","input":{"blackEdges":[0,1]},"output":{"blackEdges":[0,1],"redEdges":[2]}}"#;

    fn set(features: &[Feature]) -> FeatureSet {
        FeatureSet::from_features(features).unwrap()
    }

    fn corner_rule(registry: &mut BoardRegistry) -> PatternRule {
        PatternRule::from_json_str(registry, CORNER_RULE).unwrap()
    }

    #[test]
    fn match_states() {
        let mut registry = BoardRegistry::new();
        let rule = corner_rule(&mut registry);
        assert_eq!(rule.get_match_state(&FeatureSet::new()), MatchState::Dormant);
        assert_eq!(
            rule.get_match_state(&set(&[Feature::BlackEdge(0), Feature::BlackEdge(1)])),
            MatchState::Actionable
        );
        assert_eq!(
            rule.get_match_state(&set(&[Feature::BlackEdge(0), Feature::BlackEdge(1), Feature::RedEdge(2)])),
            MatchState::Inconsequential
        );
        assert_eq!(rule.get_match_state(&set(&[Feature::RedEdge(0)])), MatchState::Incompatible);
        assert!(rule.matches(&set(&[Feature::BlackEdge(0), Feature::BlackEdge(1)])));
        assert!(!rule.matches(&set(&[Feature::BlackEdge(0)])));
    }

    #[test]
    fn applying_own_output_makes_rule_trivial() {
        let mut registry = BoardRegistry::with_standard_boards().unwrap();
        let rule = corner_rule(&mut registry);
        let square = registry.board_by_name("square-1").unwrap();
        let embeddings = registry.embeddings(rule.board(), &square);
        let image = rule.embedded(&square, &embeddings[0]).unwrap();
        assert!(!image.output().is_subset_of(image.input()));

        let mut state = image.input().clone();
        image.apply(&mut state).unwrap();
        let closed = PatternRule::new(Arc::clone(&square), state, image.output().clone(), false).unwrap();
        assert!(closed.is_trivial());
    }

    #[test]
    fn rule_is_redundant_against_itself() {
        let mut registry = BoardRegistry::new();
        let rule = corner_rule(&mut registry);
        assert!(rule.is_redundant(&registry, &[rule.clone()]));
        assert!(!rule.is_redundant(&registry, &[]));
    }

    #[test]
    fn validity_uses_solutions() {
        let mut registry = BoardRegistry::new();
        let rule = corner_rule(&mut registry);
        assert_eq!(rule.is_valid(&registry), Ok(true));

        let wrong = PatternRule::new(
            Arc::clone(rule.board()),
            rule.input().clone(),
            set(&[Feature::BlackEdge(2)]),
            false,
        )
        .unwrap();
        assert_eq!(wrong.is_valid(&registry), Ok(false));
    }

    #[test]
    fn highlander_rule_needs_uniqueness() {
        let mut registry = BoardRegistry::with_standard_boards().unwrap();
        let domino = registry.board_by_name("square-2").unwrap();
        let middle = domino
            .edges()
            .iter()
            .find(|e| e.faces.len() == 2 && e.faces.iter().all(|&f| !domino.face(f).is_exit))
            .unwrap()
            .index;
        let [u, v] = [0, 1].map(|i| domino.vertex(domino.edge(middle).vertices[i]).clone());

        let mut input: Vec<Feature> = domino.non_exit_faces().map(|f| Feature::FaceValue(f.index, None)).collect();
        input.push(Feature::BlackEdge(u.exit_edge.unwrap()));
        input.push(Feature::BlackEdge(v.exit_edge.unwrap()));
        input.extend(u.edges.iter().filter(|&&e| e != middle).map(|&e| Feature::RedEdge(e)));
        let make = |highlander| {
            PatternRule::new(Arc::clone(&domino), set(&input), set(&[Feature::RedEdge(middle)]), highlander).unwrap()
        };
        assert_eq!(make(true).is_valid(&registry), Ok(true));
        assert_eq!(make(false).is_valid(&registry), Ok(false));
    }

    /// Rules written against the vertical domino, an isomorphic twin of the
    /// registered horizontal `square-2`.
    fn vertical_domino_rules() -> (String, Vec<(FeatureSet, FeatureSet)>) {
        let descriptor = crate::board::standard::square_cells(&[(0, 0), (0, 1)]);
        let text = descriptor.to_json_string();
        let board = PatternBoard::from_descriptor(descriptor).unwrap();
        let mut rules = Vec::new();
        for vertex in board.vertices() {
            let exit = vertex.exit_edge.unwrap();
            match vertex.edges.as_slice() {
                // Two black edges at a corner turn its exit red.
                &[a, b] => rules.push((
                    set(&[Feature::BlackEdge(a), Feature::BlackEdge(b)]),
                    set(&[Feature::RedEdge(exit)]),
                )),
                // A black exit allows one black board edge at most.
                &[a, b, c] => rules.push((
                    set(&[Feature::BlackEdge(exit), Feature::BlackEdge(a)]),
                    set(&[Feature::RedEdge(b), Feature::RedEdge(c)]),
                )),
                _ => {}
            }
        }
        (text, rules)
    }

    #[test]
    fn twin_board_json_keeps_feature_meaning() {
        let mut registry = BoardRegistry::with_standard_boards().unwrap();
        let horizontal = registry.board_by_name("square-2").unwrap();
        let (text, rules) = vertical_domino_rules();
        assert_eq!(rules.len(), 6);
        for (input, output) in rules {
            let json = serde_json::to_string(&SerializedPatternRule {
                pattern_board: text.clone(),
                input,
                output,
                highlander: false,
            })
            .unwrap();
            let rule = PatternRule::from_json_str(&mut registry, &json).unwrap();
            assert!(Arc::ptr_eq(rule.board(), &horizontal));
            assert_eq!(rule.is_valid(&registry), Ok(true), "{}", json);
        }
    }

    #[test]
    fn twin_board_identifier_keeps_feature_meaning() {
        let mut registry = BoardRegistry::with_standard_boards().unwrap();
        let horizontal = registry.board_by_name("square-2").unwrap();
        let (text, rules) = vertical_domino_rules();
        let vertical = registry.deserialize_exact_board(&text).unwrap();
        for (input, output) in rules {
            let rule = PatternRule::new(Arc::clone(&vertical), input, output, false).unwrap();
            let identifier = rule.get_binary_identifier(&registry).unwrap();
            assert!(identifier.starts_with(&text));
            let decoded = PatternRule::from_binary_identifier(&mut registry, &identifier).unwrap();
            assert!(Arc::ptr_eq(decoded.board(), &horizontal));
            assert_eq!(decoded, rule.on_canonical_board(&registry).unwrap());
            assert_eq!(decoded.is_valid(&registry), Ok(true));
        }
    }

    #[test]
    fn out_of_range_features_are_rejected() {
        let mut registry = BoardRegistry::new();
        let edge = r#"{"patternBoard":"vertex-2-exit-none","input":{"blackEdges":[0,9]},"output":{"blackEdges":[0,9]}}"#;
        assert_eq!(
            PatternRule::from_json_str(&mut registry, edge),
            Err(CodecError::FeatureOutOfRange(Feature::BlackEdge(9)))
        );
        let sector = r#"{"patternBoard":"vertex-2-exit-none","input":{"sectorsOnlyOne":[0]},"output":{}}"#;
        assert_eq!(
            PatternRule::from_json_str(&mut registry, sector),
            Err(CodecError::FeatureOutOfRange(Feature::SectorOnlyOne(0)))
        );
    }

    #[test]
    fn json_form_round_trips() {
        let mut registry = BoardRegistry::new();
        let rule = corner_rule(&mut registry);
        assert_eq!(rule.to_json_string(&registry).unwrap(), CORNER_RULE);
        assert!(PatternRule::from_json_str(&mut registry, "{\"patternBoard\":3}").is_err());
    }

    #[test]
    fn binary_identifier_round_trips() {
        let mut registry = BoardRegistry::new();
        let rule = corner_rule(&mut registry);
        let identifier = rule.get_binary_identifier(&registry).unwrap();
        assert!(identifier.starts_with("vertex-2-exit-none/"));
        let decoded = PatternRule::from_binary_identifier(&mut registry, &identifier).unwrap();
        assert_eq!(decoded, rule);

        let highlander = PatternRule::new(Arc::clone(rule.board()), rule.input().clone(), rule.output().clone(), true)
            .unwrap();
        let identifier = highlander.get_binary_identifier(&registry).unwrap();
        assert!(PatternRule::from_binary_identifier(&mut registry, &identifier).unwrap().is_highlander());
        assert!(PatternRule::from_binary_identifier(&mut registry, "vertex-2-exit-none").is_err());
    }

    #[test]
    fn automorphic_rules_share_canonical_form() {
        let mut registry = BoardRegistry::with_standard_boards().unwrap();
        let square = registry.deserialize_board("square-1").unwrap();
        let v0 = square.vertex(0).clone();
        let v2 = square.vertex(2).clone();
        let make = |edges: &[usize]| {
            PatternRule::new(
                Arc::clone(&square),
                set(&[Feature::BlackEdge(edges[0])]),
                set(&[Feature::BlackEdge(edges[1])]),
                false,
            )
            .unwrap()
        };
        let a = make(&v0.edges);
        let b = make(&v2.edges);
        assert!(a.is_isomorphic_to(&registry, &b));
        assert_eq!(a.canonicalized(&registry).unwrap(), b.canonicalized(&registry).unwrap());
    }
}
