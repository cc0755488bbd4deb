//! Mining rules for one board from its solutions.
//!
//! Inputs are enumerated smallest first. Each input's output is everything
//! its remaining solutions agree on. A candidate is kept only if nothing
//! known so far (prior rules embedded into the board, or variants of rules
//! kept earlier) already derives it.

use crate::board::{BoardRegistry, PatternBoard};
use crate::codec::{encode_rule, CodecError};
use crate::feature::{FaceColorDualFeature, Feature, FeatureSet};
use crate::rule::{embedded_rules, PatternRule};
use crate::solve::{self, SolveError, SolveKinds};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::Arc;

/// Error raised while mining a board.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GenerationError {
    Codec(CodecError),
    Solve(SolveError),
}

impl std::fmt::Display for GenerationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            GenerationError::Codec(e) => write!(f, "{}", e),
            GenerationError::Solve(e) => write!(f, "{}", e),
        }
    }
}

impl std::error::Error for GenerationError {}

impl From<CodecError> for GenerationError {
    fn from(e: CodecError) -> Self {
        GenerationError::Codec(e)
    }
}

impl From<SolveError> for GenerationError {
    fn from(e: SolveError) -> Self {
        GenerationError::Solve(e)
    }
}

/// What to mine and how far to search.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct GenerationOptions {
    pub solve_edges: bool,
    pub solve_sectors: bool,
    pub solve_face_colors: bool,
    pub highlander: bool,
    /// Most features in one rule input.
    pub feature_limit: usize,
    /// Whether face values, blank included, may appear in inputs.
    pub include_face_values: bool,
}

impl Default for GenerationOptions {
    fn default() -> Self {
        Self {
            solve_edges: true,
            solve_sectors: false,
            solve_face_colors: false,
            highlander: false,
            feature_limit: 2,
            include_face_values: false,
        }
    }
}

impl GenerationOptions {
    pub fn kinds(&self) -> SolveKinds {
        SolveKinds {
            edges: self.solve_edges,
            sectors: self.solve_sectors,
            face_colors: self.solve_face_colors,
        }
    }
}

fn input_candidates(board: &PatternBoard, options: &GenerationOptions) -> Vec<Feature> {
    let mut candidates = Vec::new();
    for edge in board.edges() {
        candidates.push(Feature::BlackEdge(edge.index));
        candidates.push(Feature::RedEdge(edge.index));
    }
    if options.solve_sectors {
        for sector in board.sectors() {
            candidates.push(Feature::SectorNotZero(sector.index));
            candidates.push(Feature::SectorNotOne(sector.index));
            candidates.push(Feature::SectorNotTwo(sector.index));
            candidates.push(Feature::SectorOnlyOne(sector.index));
        }
    }
    if options.include_face_values {
        for face in board.non_exit_faces() {
            candidates.push(Feature::FaceValue(face.index, None));
            for value in 0..=face.edges.len() {
                candidates.push(Feature::FaceValue(face.index, Some(value as u8)));
            }
        }
    }
    if options.solve_face_colors {
        for edge in board.edges().iter().filter(|e| e.faces.len() == 2) {
            let (a, b) = (edge.faces[0], edge.faces[1]);
            candidates.extend(FaceColorDualFeature::same(a, b).map(Feature::FaceColorDual));
            candidates.extend(FaceColorDualFeature::opposite(a, b).map(Feature::FaceColorDual));
        }
    }
    candidates
}

/// `input`, followed in highlander mode by `input` inside a blank region:
/// every non-exit face it leaves unvalued becomes a known blank. The
/// highlander filter only drops solutions that no face clue tells apart.
fn input_variants(board: &PatternBoard, input: FeatureSet, highlander: bool) -> Vec<FeatureSet> {
    if !highlander {
        return vec![input];
    }
    let blanks: Vec<Feature> = board
        .non_exit_faces()
        .filter(|face| input.face_value(face.index).is_none())
        .map(|face| Feature::FaceValue(face.index, None))
        .collect();
    if blanks.is_empty() {
        return vec![input];
    }
    match FeatureSet::from_features(&blanks).and_then(|region| input.union(&region)) {
        Ok(region) => vec![input, region],
        Err(_) => vec![input],
    }
}

/// Index combinations of `size` out of `n`, in lexicographic order.
fn combinations(n: usize, size: usize) -> impl Iterator<Item = Vec<usize>> {
    let mut current: Option<Vec<usize>> = (size <= n).then(|| (0..size).collect());
    std::iter::from_fn(move || {
        let result = current.clone()?;
        let next = current.as_mut()?;
        match (0..size).rev().find(|&i| next[i] < n - size + i) {
            Some(i) => {
                next[i] += 1;
                for j in i + 1..size {
                    next[j] = next[j - 1] + 1;
                }
            }
            None => current = None,
        }
        Some(result)
    })
}

/// Mines new rules for `board`.
///
/// `prior` holds rules already known, on any board; they are embedded into
/// `board` before mining starts. Kept rules are returned in canonical form.
/// Boards too large to solve are an error.
pub fn generate_rules_for_board(
    registry: &BoardRegistry,
    board: &Arc<PatternBoard>,
    prior: &[PatternRule],
    options: &GenerationOptions,
) -> Result<Vec<PatternRule>, GenerationError> {
    let solutions = registry.solutions(board)?;
    if solutions.is_empty() {
        return Ok(Vec::new());
    }
    let mapping = registry.feature_mapping(board)?;
    let candidates = input_candidates(board, options);
    let mut known = embedded_rules(registry, prior, board);
    let mut seen: HashSet<Vec<u8>> = HashSet::new();
    let mut kept = Vec::new();
    tracing::debug!(
        candidates = candidates.len(),
        prior = known.len(),
        solutions = solutions.len(),
        "mining board"
    );

    for size in 1..=options.feature_limit {
        for combination in combinations(candidates.len(), size) {
            let Ok(input) = FeatureSet::from_features(combination.iter().map(|&i| &candidates[i])) else {
                continue;
            };
            for input in input_variants(board, input, options.highlander) {
                let remaining = solve::solutions_for(board, &solutions, &input, options.highlander);
                let Some(implied) = solve::implied_features(board, &remaining, options.kinds()) else {
                    continue;
                };
                let Ok(rule) = PatternRule::new(Arc::clone(board), input, implied, options.highlander) else {
                    continue;
                };
                if rule.is_trivial() || rule.is_derived_by(&known) {
                    continue;
                }

                let canonical = rule.canonicalized(registry)?;
                if !seen.insert(encode_rule(&mapping, 0, canonical.input(), canonical.output())?) {
                    continue;
                }
                debug_assert_eq!(canonical.is_valid(registry), Ok(true), "mined rule is invalid");
                known.extend(embedded_rules(registry, [&canonical], board));
                kept.push(canonical);
            }
        }
    }

    tracing::debug!(rules = kept.len(), "mined board");
    Ok(kept)
}
