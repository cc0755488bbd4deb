//! Feature sets: consistent collections of features on one board.

use super::{
    ColorRelation, EdgeState, FaceColorDualFeature, Feature, IncompatibleFeature, SectorState,
};
use crate::board::PatternBoard;
use crate::embedding::{EdgeImage, Embedding};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// Cheap pre-filter result of comparing a rule input against a feature set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum QuickCompatibility {
    /// Some feature is contradicted; the input can never be met.
    Incompatible,
    /// A required face value is still unknown.
    NeedsFaceValues,
    /// Edge, sector or colour state is still missing.
    NeedsState,
    /// Every feature is present.
    Match,
}

/// A consistent set of features.
///
/// The board is not stored; indices refer to the board the owner pairs it with.
/// Face-colour duals are kept pairwise disjoint and sorted.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "SerializedFeatureSet", try_from = "SerializedFeatureSet")]
pub struct FeatureSet {
    black_edges: BTreeSet<usize>,
    red_edges: BTreeSet<usize>,
    sectors: BTreeMap<usize, SectorState>,
    face_values: BTreeMap<usize, Option<u8>>,
    face_color_duals: Vec<FaceColorDualFeature>,
}

impl FeatureSet {
    /// The empty set: nothing is known.
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a set from features, failing on the first contradiction.
    pub fn from_features<'a>(
        features: impl IntoIterator<Item = &'a Feature>,
    ) -> Result<Self, IncompatibleFeature> {
        let mut set = Self::new();
        for feature in features {
            set.add_feature(feature)?;
        }
        Ok(set)
    }

    /// Adds one feature. On error the set is left unchanged.
    pub fn add_feature(&mut self, feature: &Feature) -> Result<(), IncompatibleFeature> {
        let incompatible = || Err(IncompatibleFeature::new(feature.clone()));
        match feature {
            Feature::BlackEdge(e) => {
                if self.red_edges.contains(e) {
                    return incompatible();
                }
                self.black_edges.insert(*e);
            }
            Feature::RedEdge(e) => {
                if self.black_edges.contains(e) {
                    return incompatible();
                }
                self.red_edges.insert(*e);
            }
            Feature::SectorNotZero(_)
            | Feature::SectorNotOne(_)
            | Feature::SectorNotTwo(_)
            | Feature::SectorOnlyOne(_) => {
                let Some((sector, mask)) = feature.sector_mask() else {
                    return incompatible();
                };
                let state = self.sector_state(sector).intersect(mask);
                if state.is_empty() {
                    return incompatible();
                }
                self.sectors.insert(sector, state);
            }
            Feature::FaceValue(face, value) => match self.face_values.get(face) {
                Some(existing) if existing != value => return incompatible(),
                Some(_) => {}
                None => {
                    self.face_values.insert(*face, *value);
                }
            },
            Feature::FaceColorDual(dual) => {
                let (overlapping, rest): (Vec<_>, Vec<_>) = self
                    .face_color_duals
                    .iter()
                    .cloned()
                    .partition(|existing| existing.overlaps(dual));
                let mut merged = dual.clone();
                for existing in &overlapping {
                    merged = existing.merged(&merged)?;
                }
                let mut duals = rest;
                duals.push(merged);
                duals.sort();
                self.face_color_duals = duals;
            }
        }
        Ok(())
    }

    /// Returns true if the set holds no feature at all.
    pub fn is_empty(&self) -> bool {
        self.black_edges.is_empty()
            && self.red_edges.is_empty()
            && self.sectors.is_empty()
            && self.face_values.is_empty()
            && self.face_color_duals.is_empty()
    }

    /// Known colour of `edge`, or [`EdgeState::Unknown`].
    pub fn edge_state(&self, edge: usize) -> EdgeState {
        if self.black_edges.contains(&edge) {
            EdgeState::Black
        } else if self.red_edges.contains(&edge) {
            EdgeState::Red
        } else {
            EdgeState::Unknown
        }
    }

    /// Allowed black counts of `sector`; [`SectorState::ANY`] when unconstrained.
    pub fn sector_state(&self, sector: usize) -> SectorState {
        self.sectors.get(&sector).copied().unwrap_or(SectorState::ANY)
    }

    /// `None` when unknown, `Some(None)` for a known blank face.
    pub fn face_value(&self, face: usize) -> Option<Option<u8>> {
        self.face_values.get(&face).copied()
    }

    /// Relative colour of faces `a` and `b`, if some dual relates them.
    /// A face is always the same colour as itself.
    pub fn face_color_relation(&self, a: usize, b: usize) -> Option<ColorRelation> {
        if a == b {
            return Some(ColorRelation::Same);
        }
        self.face_color_duals.iter().find_map(|dual| dual.relation(a, b))
    }

    /// Black edges, ascending.
    pub fn black_edges(&self) -> impl Iterator<Item = usize> + '_ {
        self.black_edges.iter().copied()
    }

    /// Red edges, ascending.
    pub fn red_edges(&self) -> impl Iterator<Item = usize> + '_ {
        self.red_edges.iter().copied()
    }

    /// Known face values by ascending face index.
    pub fn face_values(&self) -> impl Iterator<Item = (usize, Option<u8>)> + '_ {
        self.face_values.iter().map(|(&f, &v)| (f, v))
    }

    /// Face-colour duals, pairwise disjoint and sorted.
    pub fn face_color_duals(&self) -> &[FaceColorDualFeature] {
        &self.face_color_duals
    }

    /// Canonical feature list: edges, sectors, face values, then duals.
    pub fn features(&self) -> Vec<Feature> {
        let mut features = Vec::new();
        features.extend(self.black_edges.iter().map(|&e| Feature::BlackEdge(e)));
        features.extend(self.red_edges.iter().map(|&e| Feature::RedEdge(e)));
        for (&sector, state) in &self.sectors {
            features.extend(state.features(sector));
        }
        features.extend(self.face_values.iter().map(|(&f, &v)| Feature::FaceValue(f, v)));
        features.extend(self.face_color_duals.iter().cloned().map(Feature::FaceColorDual));
        features
    }

    /// Returns true if this set already entails `feature`.
    pub fn implies(&self, feature: &Feature) -> bool {
        match feature {
            Feature::BlackEdge(e) => self.black_edges.contains(e),
            Feature::RedEdge(e) => self.red_edges.contains(e),
            Feature::FaceValue(face, value) => self.face_values.get(face) == Some(value),
            Feature::FaceColorDual(dual) => {
                self.face_color_duals.iter().any(|own| dual.is_implied_by(own))
            }
            sector => match sector.sector_mask() {
                Some((s, mask)) => self.sector_state(s).is_within(mask),
                None => false,
            },
        }
    }

    /// Returns true if `other` entails every feature of this set.
    pub fn is_subset_of(&self, other: &FeatureSet) -> bool {
        self.black_edges.is_subset(&other.black_edges)
            && self.red_edges.is_subset(&other.red_edges)
            && self
                .sectors
                .iter()
                .all(|(&s, &state)| other.sector_state(s).is_within(state))
            && self
                .face_values
                .iter()
                .all(|(f, v)| other.face_values.get(f) == Some(v))
            && self
                .face_color_duals
                .iter()
                .all(|dual| other.face_color_duals.iter().any(|own| dual.is_implied_by(own)))
    }

    /// Union of two sets, or the first contradiction found.
    pub fn union(&self, other: &FeatureSet) -> Result<FeatureSet, IncompatibleFeature> {
        let mut result = self.clone();
        for feature in other.features() {
            result.add_feature(&feature)?;
        }
        Ok(result)
    }

    /// In-place union. On error `self` is left unchanged.
    pub fn union_in(&mut self, other: &FeatureSet) -> Result<(), IncompatibleFeature> {
        *self = self.union(other)?;
        Ok(())
    }

    /// Returns true if the union of both sets is consistent.
    pub fn is_compatible_with(&self, other: &FeatureSet) -> bool {
        self.union(other).is_ok()
    }

    /// Compares this set (a rule input) against `target` without building a union.
    pub fn get_quick_compatibility_with(&self, target: &FeatureSet) -> QuickCompatibility {
        let mut needs_state = false;
        let mut needs_face_values = false;

        for &e in &self.black_edges {
            match target.edge_state(e) {
                EdgeState::Red => return QuickCompatibility::Incompatible,
                EdgeState::Unknown => needs_state = true,
                EdgeState::Black => {}
            }
        }
        for &e in &self.red_edges {
            match target.edge_state(e) {
                EdgeState::Black => return QuickCompatibility::Incompatible,
                EdgeState::Unknown => needs_state = true,
                EdgeState::Red => {}
            }
        }
        for (&s, &state) in &self.sectors {
            let known = target.sector_state(s);
            if known.intersect(state).is_empty() {
                return QuickCompatibility::Incompatible;
            }
            if !known.is_within(state) {
                needs_state = true;
            }
        }
        for (&f, value) in &self.face_values {
            match target.face_values.get(&f) {
                Some(known) if known != value => return QuickCompatibility::Incompatible,
                Some(_) => {}
                None => needs_face_values = true,
            }
        }
        for dual in &self.face_color_duals {
            let Some(&anchor) = dual.primary_faces().first() else {
                continue;
            };
            for face in dual.faces() {
                match target.face_color_relation(anchor, face) {
                    Some(relation) if Some(relation) != dual.relation(anchor, face) => {
                        return QuickCompatibility::Incompatible
                    }
                    Some(_) => {}
                    None => needs_state = true,
                }
            }
        }

        if needs_face_values {
            QuickCompatibility::NeedsFaceValues
        } else if needs_state {
            QuickCompatibility::NeedsState
        } else {
            QuickCompatibility::Match
        }
    }

    /// First feature naming an element `board` does not have, if any.
    pub fn feature_outside(&self, board: &PatternBoard) -> Option<Feature> {
        self.features().into_iter().find(|feature| !feature.fits_board(board))
    }

    /// Re-expresses this set on the target of `embedding`.
    ///
    /// Returns `None` when the embedding cannot carry a feature: a black exit
    /// edge whose image is not exactly one edge, colliding faces of opposite
    /// colour, or a contradiction in the image.
    pub fn embedded(&self, embedding: &Embedding) -> Option<FeatureSet> {
        let mut result = FeatureSet::new();
        for &e in &self.black_edges {
            let target = match embedding.map_edge(e) {
                EdgeImage::Edge(t) => *t,
                EdgeImage::Exit(images) if images.len() == 1 => images[0],
                EdgeImage::Exit(_) => return None,
            };
            result.add_feature(&Feature::BlackEdge(target)).ok()?;
        }
        for &e in &self.red_edges {
            for &t in embedding.map_edge(e).edges() {
                result.add_feature(&Feature::RedEdge(t)).ok()?;
            }
        }
        for (&s, &state) in &self.sectors {
            for feature in state.features(embedding.map_sector(s)) {
                result.add_feature(&feature).ok()?;
            }
        }
        for (&f, &value) in &self.face_values {
            result
                .add_feature(&Feature::FaceValue(embedding.map_face(f), value))
                .ok()?;
        }
        for dual in &self.face_color_duals {
            if let Some(image) = dual.mapped(|f| embedding.map_face(f)).ok()? {
                result.add_feature(&Feature::FaceColorDual(image)).ok()?;
            }
        }
        Some(result)
    }

    /// External JSON form.
    pub fn to_serialized(&self) -> SerializedFeatureSet {
        SerializedFeatureSet::from(self.clone())
    }
}

/// JSON form of a [`FeatureSet`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SerializedFeatureSet {
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub black_edges: Vec<usize>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub red_edges: Vec<usize>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub sectors_not_zero: Vec<usize>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub sectors_not_one: Vec<usize>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub sectors_not_two: Vec<usize>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub sectors_only_one: Vec<usize>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub face_values: Vec<SerializedFaceValue>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub face_color_dual_features: Vec<SerializedFaceColorDual>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SerializedFaceValue {
    pub face: usize,
    /// `null` for a blank face.
    pub value: Option<u8>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SerializedFaceColorDual {
    pub primary_faces: Vec<usize>,
    pub secondary_faces: Vec<usize>,
    pub same_color_paths: Vec<[usize; 2]>,
    pub opposite_color_paths: Vec<[usize; 2]>,
}

impl From<FeatureSet> for SerializedFeatureSet {
    fn from(set: FeatureSet) -> Self {
        let mut out = SerializedFeatureSet {
            black_edges: set.black_edges.iter().copied().collect(),
            red_edges: set.red_edges.iter().copied().collect(),
            ..Default::default()
        };
        for feature in set.features() {
            match feature {
                Feature::SectorNotZero(s) => out.sectors_not_zero.push(s),
                Feature::SectorNotOne(s) => out.sectors_not_one.push(s),
                Feature::SectorNotTwo(s) => out.sectors_not_two.push(s),
                Feature::SectorOnlyOne(s) => out.sectors_only_one.push(s),
                Feature::FaceValue(face, value) => {
                    out.face_values.push(SerializedFaceValue { face, value })
                }
                Feature::FaceColorDual(dual) => {
                    out.face_color_dual_features.push(SerializedFaceColorDual {
                        primary_faces: dual.primary_faces().iter().copied().collect(),
                        secondary_faces: dual.secondary_faces().iter().copied().collect(),
                        same_color_paths: dual.same_color_paths(),
                        opposite_color_paths: dual.opposite_color_paths(),
                    })
                }
                Feature::BlackEdge(_) | Feature::RedEdge(_) => {}
            }
        }
        out
    }
}

impl TryFrom<SerializedFeatureSet> for FeatureSet {
    type Error = IncompatibleFeature;

    fn try_from(value: SerializedFeatureSet) -> Result<Self, Self::Error> {
        let mut features = Vec::new();
        features.extend(value.black_edges.into_iter().map(Feature::BlackEdge));
        features.extend(value.red_edges.into_iter().map(Feature::RedEdge));
        features.extend(value.sectors_not_zero.into_iter().map(Feature::SectorNotZero));
        features.extend(value.sectors_not_one.into_iter().map(Feature::SectorNotOne));
        features.extend(value.sectors_not_two.into_iter().map(Feature::SectorNotTwo));
        features.extend(value.sectors_only_one.into_iter().map(Feature::SectorOnlyOne));
        features.extend(
            value
                .face_values
                .into_iter()
                .map(|fv| Feature::FaceValue(fv.face, fv.value)),
        );
        for dual in value.face_color_dual_features {
            match FaceColorDualFeature::new(dual.primary_faces.clone(), dual.secondary_faces.clone()) {
                Some(feature) => features.push(Feature::FaceColorDual(feature)),
                None if dual.primary_faces.iter().any(|f| dual.secondary_faces.contains(f)) => {
                    return Err(IncompatibleFeature::new(Feature::FaceColorDual(
                        FaceColorDualFeature::unchecked(dual.primary_faces, dual.secondary_faces),
                    )))
                }
                // A single face states nothing.
                None => {}
            }
        }
        FeatureSet::from_features(&features)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::board::{standard, PatternBoard};
    use crate::embedding::compute_embeddings;

    fn set(features: &[Feature]) -> FeatureSet {
        FeatureSet::from_features(features).unwrap()
    }

    #[test]
    fn contradictions_are_rejected() {
        let mut fs = set(&[Feature::BlackEdge(0)]);
        let before = fs.clone();
        assert!(fs.add_feature(&Feature::RedEdge(0)).is_err());
        assert_eq!(fs, before);

        let mut sectors = set(&[Feature::SectorOnlyOne(2)]);
        assert!(sectors.add_feature(&Feature::SectorNotOne(2)).is_err());
        assert!(sectors.add_feature(&Feature::SectorNotZero(2)).is_ok());

        let mut faces = set(&[Feature::FaceValue(1, Some(2))]);
        assert!(faces.add_feature(&Feature::FaceValue(1, None)).is_err());
    }

    #[test]
    fn union_is_idempotent_and_subset_reflexive() {
        let fs = set(&[
            Feature::BlackEdge(1),
            Feature::RedEdge(3),
            Feature::SectorNotTwo(0),
            Feature::FaceValue(0, Some(3)),
            Feature::FaceColorDual(FaceColorDualFeature::opposite(0, 2).unwrap()),
        ]);
        assert_eq!(fs.union(&fs).unwrap(), fs);
        assert!(fs.is_subset_of(&fs));
        assert!(FeatureSet::new().is_subset_of(&fs));
        assert!(!fs.is_subset_of(&FeatureSet::new()));
    }

    #[test]
    fn duals_merge_transitively() {
        let fs = set(&[
            Feature::FaceColorDual(FaceColorDualFeature::opposite(0, 1).unwrap()),
            Feature::FaceColorDual(FaceColorDualFeature::same(2, 3).unwrap()),
            Feature::FaceColorDual(FaceColorDualFeature::opposite(1, 2).unwrap()),
        ]);
        assert_eq!(fs.face_color_duals().len(), 1);
        assert_eq!(fs.face_color_relation(0, 3), Some(ColorRelation::Same));
        let mut contradiction = fs.clone();
        assert!(contradiction
            .add_feature(&Feature::FaceColorDual(FaceColorDualFeature::opposite(0, 3).unwrap()))
            .is_err());
    }

    #[test]
    fn narrower_sector_state_is_superset() {
        let wide = set(&[Feature::SectorNotZero(0)]);
        let narrow = set(&[Feature::SectorOnlyOne(0)]);
        assert!(wide.is_subset_of(&narrow));
        assert!(!narrow.is_subset_of(&wide));
    }

    #[test]
    fn quick_compatibility_precedence() {
        let input = set(&[Feature::BlackEdge(0), Feature::FaceValue(0, Some(2))]);
        assert_eq!(
            input.get_quick_compatibility_with(&set(&[Feature::RedEdge(0)])),
            QuickCompatibility::Incompatible
        );
        assert_eq!(
            input.get_quick_compatibility_with(&FeatureSet::new()),
            QuickCompatibility::NeedsFaceValues
        );
        assert_eq!(
            input.get_quick_compatibility_with(&set(&[Feature::FaceValue(0, Some(2))])),
            QuickCompatibility::NeedsState
        );
        assert_eq!(
            input.get_quick_compatibility_with(&set(&[
                Feature::BlackEdge(0),
                Feature::FaceValue(0, Some(2))
            ])),
            QuickCompatibility::Match
        );
    }

    #[test]
    fn json_shape() {
        let fs = set(&[Feature::BlackEdge(0), Feature::BlackEdge(1), Feature::RedEdge(2)]);
        let json = serde_json::to_string(&fs).unwrap();
        assert_eq!(json, r#"{"blackEdges":[0,1],"redEdges":[2]}"#);
        let back: FeatureSet = serde_json::from_str(&json).unwrap();
        assert_eq!(back, fs);

        let blank: FeatureSet = serde_json::from_str(r#"{"faceValues":[{"face":0,"value":null}]}"#).unwrap();
        assert_eq!(blank.face_value(0), Some(None));
    }

    #[test]
    fn embedding_carries_exit_edges() {
        let corner = PatternBoard::from_descriptor(crate::board::PatternBoardDescriptor::Vertex {
            exit: true,
            edge_count: 2,
            sector_count: 0,
        })
        .unwrap();
        let square = PatternBoard::from_descriptor(standard::square_cells(&[(0, 0)])).unwrap();
        let embedding = &compute_embeddings(&corner, &square)[0];

        let red_exit = set(&[Feature::RedEdge(2)]);
        let image = red_exit.embedded(embedding).unwrap();
        // The square corner only has its own exit edge left over.
        assert_eq!(image.red_edges().count(), 1);

        let black_exit = set(&[Feature::BlackEdge(2)]);
        assert!(black_exit.embedded(embedding).is_some());

        let l_shape =
            PatternBoard::from_descriptor(standard::square_cells(&[(0, 0), (1, 0), (0, 1)])).unwrap();
        let wide = compute_embeddings(&corner, &l_shape)
            .into_iter()
            .find(|e| l_shape.vertex(e.map_vertex(0)).order() == 4)
            .unwrap();
        // Two leftover board edges: a black summary cannot pick one.
        assert!(black_exit.embedded(&wide).is_none());
        assert_eq!(red_exit.embedded(&wide).unwrap().red_edges().count(), 2);
    }

    #[test]
    fn features_outside_the_board_are_found() {
        let square = PatternBoard::from_descriptor(standard::square_cells(&[(0, 0)])).unwrap();
        let inside = set(&[Feature::BlackEdge(7), Feature::SectorNotOne(3), Feature::FaceValue(0, Some(4))]);
        assert_eq!(inside.feature_outside(&square), None);

        assert_eq!(set(&[Feature::BlackEdge(0), Feature::BlackEdge(9)]).feature_outside(&square), Some(Feature::BlackEdge(9)));
        assert!(set(&[Feature::SectorOnlyOne(4)]).feature_outside(&square).is_some());
        assert!(set(&[Feature::FaceValue(0, Some(5))]).feature_outside(&square).is_some());
        // Face 1 is an exit face and never carries a value.
        assert!(set(&[Feature::FaceValue(1, None)]).feature_outside(&square).is_some());
    }
}
