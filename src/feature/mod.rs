//! Atomic facts about a pattern board.
//!
//! A [`Feature`] is one constraint: an edge colour, a sector restriction, a face
//! value, or a face-colour grouping. Features are collected into a
//! [`FeatureSet`], which rejects contradictions instead of overwriting.

pub mod face_color;
pub mod set;

use crate::board::PatternBoard;

pub use face_color::FaceColorDualFeature;
pub use set::{FeatureSet, QuickCompatibility, SerializedFeatureSet};

/// One atomic constraint on a pattern board.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Feature {
    BlackEdge(usize),
    RedEdge(usize),
    SectorNotZero(usize),
    SectorNotOne(usize),
    SectorNotTwo(usize),
    SectorOnlyOne(usize),
    /// Face index and its value; `None` is a known blank face.
    FaceValue(usize, Option<u8>),
    FaceColorDual(FaceColorDualFeature),
}

impl Feature {
    pub fn is_edge(&self) -> bool {
        matches!(self, Feature::BlackEdge(_) | Feature::RedEdge(_))
    }

    pub fn is_sector(&self) -> bool {
        matches!(
            self,
            Feature::SectorNotZero(_)
                | Feature::SectorNotOne(_)
                | Feature::SectorNotTwo(_)
                | Feature::SectorOnlyOne(_)
        )
    }

    pub fn is_face_value(&self) -> bool {
        matches!(self, Feature::FaceValue(..))
    }

    pub fn is_face_color(&self) -> bool {
        matches!(self, Feature::FaceColorDual(_))
    }

    /// Sector index and allowed-count mask for sector features.
    pub fn sector_mask(&self) -> Option<(usize, SectorState)> {
        match *self {
            Feature::SectorNotZero(s) => Some((s, SectorState::NOT_ZERO)),
            Feature::SectorNotOne(s) => Some((s, SectorState::NOT_ONE)),
            Feature::SectorNotTwo(s) => Some((s, SectorState::NOT_TWO)),
            Feature::SectorOnlyOne(s) => Some((s, SectorState::ONLY_ONE)),
            _ => None,
        }
    }

    /// Returns true if every element the feature names exists on `board`.
    ///
    /// Face values must sit on non-exit faces and not exceed the face's edge
    /// count.
    pub fn fits_board(&self, board: &PatternBoard) -> bool {
        match self {
            Feature::BlackEdge(e) | Feature::RedEdge(e) => *e < board.edges().len(),
            Feature::FaceValue(face, value) => board.faces().get(*face).map_or(false, |f| {
                !f.is_exit && value.map_or(true, |v| usize::from(v) <= f.edges.len())
            }),
            Feature::FaceColorDual(dual) => dual.faces().all(|f| f < board.faces().len()),
            sector => sector.sector_mask().map_or(false, |(s, _)| s < board.sectors().len()),
        }
    }
}

/// Set of black-edge counts {0, 1, 2} still allowed for a sector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SectorState(u8);

impl SectorState {
    pub const ANY: Self = Self(0b111);
    pub const NONE: Self = Self(0);
    pub const NOT_ZERO: Self = Self(0b110);
    pub const NOT_ONE: Self = Self(0b101);
    pub const NOT_TWO: Self = Self(0b011);
    pub const ONLY_ONE: Self = Self(0b010);

    pub const fn from_bits(bits: u8) -> Self {
        Self(bits & 0b111)
    }

    pub const fn bits(&self) -> u8 {
        self.0
    }

    /// State of a sector whose two edges contain `black` black edges.
    pub fn exactly(black: usize) -> Self {
        Self(1 << black.min(2))
    }

    #[inline]
    pub fn allows(&self, black: usize) -> bool {
        black <= 2 && self.0 & (1 << black) != 0
    }

    #[inline]
    pub fn intersect(self, other: Self) -> Self {
        Self(self.0 & other.0)
    }

    /// Returns true if every count allowed here is allowed by `other`.
    #[inline]
    pub fn is_within(self, other: Self) -> bool {
        self.0 & !other.0 == 0
    }

    pub fn is_empty(&self) -> bool {
        self.0 == 0
    }

    /// Minimal sector features that express this state.
    pub fn features(&self, sector: usize) -> Vec<Feature> {
        match self.0 {
            0b010 => vec![Feature::SectorOnlyOne(sector)],
            0b001 => vec![Feature::SectorNotOne(sector), Feature::SectorNotTwo(sector)],
            0b100 => vec![Feature::SectorNotZero(sector), Feature::SectorNotOne(sector)],
            0b110 => vec![Feature::SectorNotZero(sector)],
            0b101 => vec![Feature::SectorNotOne(sector)],
            0b011 => vec![Feature::SectorNotTwo(sector)],
            _ => Vec::new(),
        }
    }
}

impl Default for SectorState {
    fn default() -> Self {
        Self::ANY
    }
}

/// Known colour of an edge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EdgeState {
    Black,
    Red,
    Unknown,
}

/// Relative colour of two faces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ColorRelation {
    Same,
    Opposite,
}

impl ColorRelation {
    pub fn flipped(self) -> Self {
        match self {
            ColorRelation::Same => ColorRelation::Opposite,
            ColorRelation::Opposite => ColorRelation::Same,
        }
    }
}

/// Raised when a feature contradicts what a feature set already holds.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IncompatibleFeature {
    pub feature: Feature,
}

impl IncompatibleFeature {
    pub fn new(feature: Feature) -> Self {
        Self { feature }
    }
}

impl std::fmt::Display for IncompatibleFeature {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "incompatible feature: {:?}", self.feature)
    }
}

impl std::error::Error for IncompatibleFeature {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sector_state_features_cover_every_mask() {
        for bits in 1..8u8 {
            let state = SectorState::from_bits(bits);
            let rebuilt = state
                .features(0)
                .iter()
                .filter_map(Feature::sector_mask)
                .fold(SectorState::ANY, |acc, (_, mask)| acc.intersect(mask));
            assert_eq!(rebuilt, state, "mask {:03b}", bits);
        }
    }

    #[test]
    fn sector_state_counts() {
        assert!(SectorState::exactly(1).is_within(SectorState::ONLY_ONE));
        assert!(SectorState::NOT_ZERO.allows(2));
        assert!(!SectorState::NOT_ZERO.allows(0));
        assert!(SectorState::ONLY_ONE
            .intersect(SectorState::NOT_ONE)
            .is_empty());
    }
}
