//! Face-colour duals: signed partitions of faces.
//!
//! Every face of a solved board is either inside or outside the loop. A dual
//! feature groups faces into two sides; faces on the same side share a colour
//! and faces on opposite sides differ. The side holding the smallest face index
//! is always the primary side.

use super::{ColorRelation, Feature, IncompatibleFeature};
use std::collections::BTreeSet;

/// A same/opposite colour grouping of at least two faces.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FaceColorDualFeature {
    primary: BTreeSet<usize>,
    secondary: BTreeSet<usize>,
}

impl FaceColorDualFeature {
    /// Builds a grouping. Returns `None` if a face is on both sides or fewer
    /// than two faces are named.
    pub fn new(
        primary: impl IntoIterator<Item = usize>,
        secondary: impl IntoIterator<Item = usize>,
    ) -> Option<Self> {
        let primary: BTreeSet<usize> = primary.into_iter().collect();
        let secondary: BTreeSet<usize> = secondary.into_iter().collect();
        if !primary.is_disjoint(&secondary) || primary.len() + secondary.len() < 2 {
            return None;
        }
        Some(Self { primary, secondary }.normalized())
    }

    /// Keeps the sides as given, for reporting malformed input.
    pub(crate) fn unchecked(primary: Vec<usize>, secondary: Vec<usize>) -> Self {
        Self {
            primary: primary.into_iter().collect(),
            secondary: secondary.into_iter().collect(),
        }
    }

    /// Two distinct faces with the same colour.
    pub fn same(a: usize, b: usize) -> Option<Self> {
        Self::new([a, b], [])
    }

    /// Two distinct faces with opposite colours.
    pub fn opposite(a: usize, b: usize) -> Option<Self> {
        Self::new([a], [b])
    }

    fn normalized(self) -> Self {
        match (self.primary.first(), self.secondary.first()) {
            (Some(p), Some(s)) if s < p => Self {
                primary: self.secondary,
                secondary: self.primary,
            },
            (None, Some(_)) => Self {
                primary: self.secondary,
                secondary: self.primary,
            },
            _ => self,
        }
    }

    pub fn primary_faces(&self) -> &BTreeSet<usize> {
        &self.primary
    }

    pub fn secondary_faces(&self) -> &BTreeSet<usize> {
        &self.secondary
    }

    /// All faces, ascending.
    pub fn faces(&self) -> impl Iterator<Item = usize> + '_ {
        let mut all: Vec<usize> = self.primary.iter().chain(self.secondary.iter()).copied().collect();
        all.sort_unstable();
        all.into_iter()
    }

    pub fn contains(&self, face: usize) -> bool {
        self.primary.contains(&face) || self.secondary.contains(&face)
    }

    fn side(&self, face: usize) -> Option<bool> {
        if self.primary.contains(&face) {
            Some(true)
        } else if self.secondary.contains(&face) {
            Some(false)
        } else {
            None
        }
    }

    /// Relation between two faces, if both are in this grouping.
    pub fn relation(&self, a: usize, b: usize) -> Option<ColorRelation> {
        match (self.side(a)?, self.side(b)?) {
            (x, y) if x == y => Some(ColorRelation::Same),
            _ => Some(ColorRelation::Opposite),
        }
    }

    pub fn overlaps(&self, other: &Self) -> bool {
        other.faces().any(|f| self.contains(f))
    }

    /// Merges an overlapping grouping, aligning polarity on the shared faces.
    pub fn merged(&self, other: &Self) -> Result<Self, IncompatibleFeature> {
        let conflict = || IncompatibleFeature::new(Feature::FaceColorDual(other.clone()));
        let shared = other.faces().find(|&f| self.contains(f)).ok_or_else(conflict)?;
        let flip = self.side(shared) != other.side(shared);

        let mut merged = self.clone();
        for face in other.faces() {
            let side = other.side(face).map(|s| s != flip);
            match (merged.side(face), side) {
                (Some(existing), Some(wanted)) if existing != wanted => return Err(conflict()),
                (Some(_), _) => {}
                (None, Some(true)) => {
                    merged.primary.insert(face);
                }
                (None, _) => {
                    merged.secondary.insert(face);
                }
            }
        }
        Ok(merged.normalized())
    }

    /// Re-expresses the grouping under a face mapping.
    ///
    /// Faces mapped onto one target face must lie on the same side. Returns
    /// `Ok(None)` when the image degenerates to a single face.
    pub fn mapped(&self, map: impl Fn(usize) -> usize) -> Result<Option<Self>, IncompatibleFeature> {
        let primary: BTreeSet<usize> = self.primary.iter().map(|&f| map(f)).collect();
        let secondary: BTreeSet<usize> = self.secondary.iter().map(|&f| map(f)).collect();
        if !primary.is_disjoint(&secondary) {
            return Err(IncompatibleFeature::new(Feature::FaceColorDual(self.clone())));
        }
        if primary.len() + secondary.len() < 2 {
            return Ok(None);
        }
        Ok(Some(Self { primary, secondary }.normalized()))
    }

    /// Same-colour witness pairs: each face joined to the smallest face on its side.
    pub fn same_color_paths(&self) -> Vec<[usize; 2]> {
        let mut paths = Vec::new();
        for side in [&self.primary, &self.secondary] {
            if let Some(&anchor) = side.first() {
                paths.extend(side.iter().skip(1).map(|&f| [anchor, f]));
            }
        }
        paths
    }

    /// Opposite-colour witness pairs: the primary anchor joined to every secondary face.
    pub fn opposite_color_paths(&self) -> Vec<[usize; 2]> {
        match self.primary.first() {
            Some(&anchor) => self.secondary.iter().map(|&f| [anchor, f]).collect(),
            None => Vec::new(),
        }
    }

    /// Returns true if `other` states every relation this grouping states.
    pub fn is_implied_by(&self, other: &Self) -> bool {
        let Some(anchor) = self.primary.first().copied() else {
            return true;
        };
        self.faces().all(|f| other.relation(anchor, f) == self.relation(anchor, f))
    }
}
