//! Byte-level rule matching.
//!
//! Matching walks the encoded rule directly and reads target state through
//! [`MatchTarget`], without decoding a [`FeatureSet`] for the rule. The same
//! walk serves live puzzle state ([`RawBoardState`]) and feature sets, so both
//! entry points agree on every input.

use super::{decode_face_color, split_rule, tokens, BinaryFeatureMapping, Token};
use crate::embedding::{EdgeImage, Embedding};
use crate::feature::{ColorRelation, EdgeState, Feature, FeatureSet, SectorState};

/// Read access to the state of a target board.
pub trait MatchTarget {
    fn edge_state(&self, edge: usize) -> EdgeState;
    fn sector_state(&self, sector: usize) -> SectorState;
    /// `None` when unknown, `Some(None)` for a known blank face.
    fn face_value(&self, face: usize) -> Option<Option<u8>>;
    fn face_color_relation(&self, a: usize, b: usize) -> Option<ColorRelation>;
}

impl MatchTarget for FeatureSet {
    fn edge_state(&self, edge: usize) -> EdgeState {
        FeatureSet::edge_state(self, edge)
    }

    fn sector_state(&self, sector: usize) -> SectorState {
        FeatureSet::sector_state(self, sector)
    }

    fn face_value(&self, face: usize) -> Option<Option<u8>> {
        FeatureSet::face_value(self, face)
    }

    fn face_color_relation(&self, a: usize, b: usize) -> Option<ColorRelation> {
        FeatureSet::face_color_relation(self, a, b)
    }
}

/// Colour of a face relative to its group. Faces in different groups have no
/// known relation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FaceColor {
    pub group: usize,
    pub flipped: bool,
}

/// Flat per-element puzzle state, as a solver keeps it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawBoardState {
    pub edges: Vec<EdgeState>,
    pub sectors: Vec<SectorState>,
    pub faces: Vec<Option<Option<u8>>>,
    pub face_colors: Vec<FaceColor>,
}

impl RawBoardState {
    /// Unknown state for a board of the given size.
    pub fn unknown(edges: usize, sectors: usize, faces: usize) -> Self {
        Self {
            edges: vec![EdgeState::Unknown; edges],
            sectors: vec![SectorState::ANY; sectors],
            faces: vec![None; faces],
            face_colors: (0..faces)
                .map(|group| FaceColor { group, flipped: false })
                .collect(),
        }
    }

    /// Flattens a feature set over a board of the given size.
    pub fn from_feature_set(fs: &FeatureSet, edges: usize, sectors: usize, faces: usize) -> Self {
        let mut state = Self::unknown(edges, sectors, faces);
        for (e, slot) in state.edges.iter_mut().enumerate() {
            *slot = fs.edge_state(e);
        }
        for (s, slot) in state.sectors.iter_mut().enumerate() {
            *slot = fs.sector_state(s);
        }
        for (f, slot) in state.faces.iter_mut().enumerate() {
            *slot = fs.face_value(f);
        }
        for dual in fs.face_color_duals() {
            let Some(&group) = dual.primary_faces().first() else {
                continue;
            };
            for face in dual.faces().filter(|&f| f < faces) {
                state.face_colors[face] = FaceColor {
                    group,
                    flipped: dual.relation(group, face) == Some(ColorRelation::Opposite),
                };
            }
        }
        state
    }
}

impl MatchTarget for RawBoardState {
    fn edge_state(&self, edge: usize) -> EdgeState {
        self.edges.get(edge).copied().unwrap_or(EdgeState::Unknown)
    }

    fn sector_state(&self, sector: usize) -> SectorState {
        self.sectors.get(sector).copied().unwrap_or(SectorState::ANY)
    }

    fn face_value(&self, face: usize) -> Option<Option<u8>> {
        self.faces.get(face).copied().flatten()
    }

    fn face_color_relation(&self, a: usize, b: usize) -> Option<ColorRelation> {
        if a == b {
            return Some(ColorRelation::Same);
        }
        let (ca, cb) = (self.face_colors.get(a)?, self.face_colors.get(b)?);
        if ca.group != cb.group {
            return None;
        }
        Some(if ca.flipped == cb.flipped {
            ColorRelation::Same
        } else {
            ColorRelation::Opposite
        })
    }
}

/// Whether a feature holds on the target under the embedding.
/// `None` means the embedding cannot carry the feature at all.
fn feature_holds<T: MatchTarget>(feature: &Feature, embedding: &Embedding, target: &T) -> Option<bool> {
    Some(match feature {
        Feature::BlackEdge(e) => match embedding.map_edge(*e) {
            EdgeImage::Edge(t) => target.edge_state(*t) == EdgeState::Black,
            EdgeImage::Exit(images) if images.len() == 1 => target.edge_state(images[0]) == EdgeState::Black,
            EdgeImage::Exit(_) => return None,
        },
        Feature::RedEdge(e) => embedding
            .map_edge(*e)
            .edges()
            .iter()
            .all(|&t| target.edge_state(t) == EdgeState::Red),
        Feature::FaceValue(f, value) => target.face_value(embedding.map_face(*f)) == Some(*value),
        Feature::FaceColorDual(_) => return None,
        sector => {
            let (s, mask) = sector.sector_mask()?;
            target.sector_state(embedding.map_sector(s)).is_within(mask)
        }
    })
}

fn face_color_holds<T: MatchTarget>(faces: &[u8], embedding: &Embedding, target: &T) -> Option<bool> {
    let dual = decode_face_color(faces).ok()?;
    let anchor = *dual.primary_faces().first()?;
    let mapped_anchor = embedding.map_face(anchor);
    let mut holds = true;
    for face in dual.faces() {
        let expected = dual.relation(anchor, face);
        let mapped = embedding.map_face(face);
        if mapped == mapped_anchor && expected == Some(ColorRelation::Opposite) {
            return None;
        }
        if target.face_color_relation(mapped_anchor, mapped) != expected {
            holds = false;
        }
    }
    Some(holds)
}

fn token_holds<T: MatchTarget>(
    mapping: &BinaryFeatureMapping,
    token: Token<'_>,
    embedding: &Embedding,
    target: &T,
) -> Option<bool> {
    match token {
        Token::Feature(byte) => feature_holds(mapping.feature_for(byte)?, embedding, target),
        Token::FaceColor(faces) => face_color_holds(faces, embedding, target),
    }
}

/// Returns true if the rule's input holds on `target` under `embedding` and
/// its output would add something the embedding can carry.
///
/// `rule` starts at the palette byte. Malformed bytes never match.
pub fn is_actionable_embedding<T: MatchTarget>(
    mapping: &BinaryFeatureMapping,
    rule: &[u8],
    embedding: &Embedding,
    target: &T,
) -> bool {
    let Ok((_, input, output, _)) = split_rule(rule) else {
        return false;
    };
    for token in tokens(input) {
        if token_holds(mapping, token, embedding, target) != Some(true) {
            return false;
        }
    }
    let mut actionable = false;
    for token in tokens(output) {
        match token_holds(mapping, token, embedding, target) {
            None => return false,
            Some(false) => actionable = true,
            Some(true) => {}
        }
    }
    actionable
}

/// Matcher over raw per-element puzzle state.
pub fn is_actionable_embedding_from_data(
    mapping: &BinaryFeatureMapping,
    rule: &[u8],
    embedding: &Embedding,
    state: &RawBoardState,
) -> bool {
    is_actionable_embedding(mapping, rule, embedding, state)
}

/// Matcher over a feature set of the target board.
pub fn is_actionable_embedding_from_feature_set(
    mapping: &BinaryFeatureMapping,
    rule: &[u8],
    embedding: &Embedding,
    fs: &FeatureSet,
) -> bool {
    is_actionable_embedding(mapping, rule, embedding, fs)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::board::{standard, PatternBoard, PatternBoardDescriptor};
    use crate::codec::encode_rule;
    use crate::embedding::compute_embeddings;

    fn corner_rule() -> (PatternBoard, BinaryFeatureMapping, Vec<u8>) {
        let board = PatternBoard::from_descriptor(PatternBoardDescriptor::Vertex {
            exit: true,
            edge_count: 2,
            sector_count: 0,
        })
        .unwrap();
        let mapping = BinaryFeatureMapping::new(&board).unwrap();
        let input = FeatureSet::from_features(&[Feature::BlackEdge(0), Feature::BlackEdge(1)]).unwrap();
        let output = input.union(&FeatureSet::from_features(&[Feature::RedEdge(2)]).unwrap()).unwrap();
        let bytes = encode_rule(&mapping, 0, &input, &output).unwrap();
        (board, mapping, bytes)
    }

    #[test]
    fn matchers_agree_on_square_corners() {
        let (corner, mapping, bytes) = corner_rule();
        let square = PatternBoard::from_descriptor(standard::square_cells(&[(0, 0)])).unwrap();
        let v0 = square.vertex(0);
        let mut fs = FeatureSet::new();
        for &e in &v0.edges {
            fs.add_feature(&Feature::BlackEdge(e)).unwrap();
        }
        let raw = RawBoardState::from_feature_set(
            &fs,
            square.edges().len(),
            square.sectors().len(),
            square.faces().len(),
        );

        let mut actionable = 0;
        for embedding in compute_embeddings(&corner, &square) {
            let from_fs = is_actionable_embedding_from_feature_set(&mapping, &bytes, &embedding, &fs);
            let from_data = is_actionable_embedding_from_data(&mapping, &bytes, &embedding, &raw);
            assert_eq!(from_fs, from_data);
            if from_fs {
                assert_eq!(embedding.map_vertex(0), 0);
                actionable += 1;
            }
        }
        // Both orientations around vertex 0.
        assert_eq!(actionable, 2);
    }

    #[test]
    fn satisfied_output_is_not_actionable() {
        let (corner, mapping, bytes) = corner_rule();
        let square = PatternBoard::from_descriptor(standard::square_cells(&[(0, 0)])).unwrap();
        let v0 = square.vertex(0);
        let mut fs = FeatureSet::new();
        for &e in &v0.edges {
            fs.add_feature(&Feature::BlackEdge(e)).unwrap();
        }
        fs.add_feature(&Feature::RedEdge(v0.exit_edge.unwrap())).unwrap();
        assert!(compute_embeddings(&corner, &square)
            .iter()
            .all(|e| !is_actionable_embedding_from_feature_set(&mapping, &bytes, e, &fs)));
    }

    #[test]
    fn raw_state_relations() {
        let mut raw = RawBoardState::unknown(0, 0, 3);
        raw.face_colors[2] = FaceColor { group: 0, flipped: true };
        assert_eq!(raw.face_color_relation(0, 2), Some(ColorRelation::Opposite));
        assert_eq!(raw.face_color_relation(0, 1), None);
        assert_eq!(raw.face_color_relation(1, 1), Some(ColorRelation::Same));
    }
}
