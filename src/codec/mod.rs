//! Compact binary encoding of pattern rules.
//!
//! Byte layout of one rule:
//!
//! ```text
//! [palette index] [input bytes...] 0xFF [output-only bytes...] 0xFF
//! ```
//!
//! Ordinary features are one byte each, an index into the board's
//! [`BinaryFeatureMapping`]. A face-colour dual is written as `0xFE` followed by
//! one byte per face: primary faces as-is, secondary faces with `0x80` set. It
//! ends at the next `0xFE` or `0xFF`. Ordinary bytes of a section come first,
//! sorted, then its duals.

pub mod matcher;

use crate::board::{BoardError, PatternBoard};
use crate::feature::{FaceColorDualFeature, Feature, FeatureSet, IncompatibleFeature};
use std::collections::HashMap;

/// Terminates the input and output sections of a rule.
pub const SECTION_END: u8 = 0xFF;
/// Starts a face-colour dual.
pub const FACE_COLOR_START: u8 = 0xFE;
/// Marks a secondary face inside a dual.
pub const SECONDARY_FACE_FLAG: u8 = 0x80;
/// Largest face index a dual can carry.
pub const MAX_FACE_INDEX: usize = 125;

/// Error raised while encoding or decoding binary rules.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CodecError {
    /// The board has too many features for one-byte codes.
    MappingTooLarge(usize),
    /// A face index does not fit the dual encoding.
    FaceIndexTooLarge(usize),
    /// A feature has no code on the board.
    UnmappedFeature(Feature),
    /// A byte is not a valid code on the board.
    InvalidByte(u8),
    /// A dual names fewer than two faces or repeats one.
    InvalidFaceColor,
    /// The buffer ended inside a rule.
    Truncated,
    /// The palette index is out of range.
    InvalidPaletteIndex(u8),
    /// A binary identifier is malformed.
    InvalidIdentifier(String),
    /// Malformed JSON rule text.
    Json(String),
    /// A feature names an edge, sector or face the board does not have.
    FeatureOutOfRange(Feature),
    /// A rule could not be carried onto the canonical twin of its board.
    NoCanonicalImage(String),
    Incompatible(IncompatibleFeature),
    Board(BoardError),
}

impl std::fmt::Display for CodecError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CodecError::MappingTooLarge(n) => write!(f, "board has {} features, too many to encode", n),
            CodecError::FaceIndexTooLarge(face) => write!(f, "face index {} exceeds {}", face, MAX_FACE_INDEX),
            CodecError::UnmappedFeature(feature) => write!(f, "feature {:?} has no binary code", feature),
            CodecError::InvalidByte(byte) => write!(f, "invalid feature byte 0x{:02x}", byte),
            CodecError::InvalidFaceColor => write!(f, "invalid face color dual"),
            CodecError::Truncated => write!(f, "truncated rule bytes"),
            CodecError::InvalidPaletteIndex(index) => write!(f, "palette index {} out of range", index),
            CodecError::InvalidIdentifier(id) => write!(f, "invalid binary identifier: {}", id),
            CodecError::Json(e) => write!(f, "invalid rule JSON: {}", e),
            CodecError::FeatureOutOfRange(feature) => write!(f, "feature {:?} does not exist on the board", feature),
            CodecError::NoCanonicalImage(board) => write!(f, "rule on {} does not carry onto its canonical board", board),
            CodecError::Incompatible(e) => write!(f, "{}", e),
            CodecError::Board(e) => write!(f, "{}", e),
        }
    }
}

impl std::error::Error for CodecError {}

impl From<IncompatibleFeature> for CodecError {
    fn from(e: IncompatibleFeature) -> Self {
        CodecError::Incompatible(e)
    }
}

impl From<serde_json::Error> for CodecError {
    fn from(e: serde_json::Error) -> Self {
        CodecError::Json(e.to_string())
    }
}

impl From<BoardError> for CodecError {
    fn from(e: BoardError) -> Self {
        CodecError::Board(e)
    }
}

/// Bijection between the ordinary features of a board and single bytes.
///
/// Order: per edge black then red, per sector the four sector kinds, per
/// non-exit face blank then values `0..=edge count`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BinaryFeatureMapping {
    features: Vec<Feature>,
    codes: HashMap<Feature, u8>,
}

impl BinaryFeatureMapping {
    pub fn new(board: &PatternBoard) -> Result<Self, CodecError> {
        let mut features = Vec::new();
        for edge in board.edges() {
            features.push(Feature::BlackEdge(edge.index));
            features.push(Feature::RedEdge(edge.index));
        }
        for sector in board.sectors() {
            features.push(Feature::SectorNotZero(sector.index));
            features.push(Feature::SectorNotOne(sector.index));
            features.push(Feature::SectorNotTwo(sector.index));
            features.push(Feature::SectorOnlyOne(sector.index));
        }
        for face in board.non_exit_faces() {
            features.push(Feature::FaceValue(face.index, None));
            for value in 0..=face.edges.len() {
                features.push(Feature::FaceValue(face.index, Some(value as u8)));
            }
        }
        if features.len() >= usize::from(FACE_COLOR_START) {
            return Err(CodecError::MappingTooLarge(features.len()));
        }
        let codes = features
            .iter()
            .enumerate()
            .map(|(i, f)| (f.clone(), i as u8))
            .collect();
        Ok(Self { features, codes })
    }

    pub fn byte_for(&self, feature: &Feature) -> Option<u8> {
        self.codes.get(feature).copied()
    }

    pub fn feature_for(&self, byte: u8) -> Option<&Feature> {
        self.features.get(usize::from(byte))
    }

    pub fn len(&self) -> usize {
        self.features.len()
    }

    pub fn is_empty(&self) -> bool {
        self.features.is_empty()
    }
}

/// One element of a rule section.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Token<'a> {
    Feature(u8),
    /// Raw face bytes of one dual.
    FaceColor(&'a [u8]),
}

/// Iterates the tokens of one section (without its terminator).
pub fn tokens(section: &[u8]) -> impl Iterator<Item = Token<'_>> {
    let mut rest = section;
    std::iter::from_fn(move || {
        let (&first, tail) = rest.split_first()?;
        if first == FACE_COLOR_START {
            let end = tail.iter().position(|&b| b == FACE_COLOR_START).unwrap_or(tail.len());
            let (faces, next) = tail.split_at(end);
            rest = next;
            Some(Token::FaceColor(faces))
        } else {
            rest = tail;
            Some(Token::Feature(first))
        }
    })
}

/// Splits a rule starting at its palette byte into input and output sections.
///
/// Returns `(palette index, input, output, total length)`.
pub fn split_rule(bytes: &[u8]) -> Result<(u8, &[u8], &[u8], usize), CodecError> {
    let (&palette, body) = bytes.split_first().ok_or(CodecError::Truncated)?;
    let input_end = body.iter().position(|&b| b == SECTION_END).ok_or(CodecError::Truncated)?;
    let after = &body[input_end + 1..];
    let output_end = after.iter().position(|&b| b == SECTION_END).ok_or(CodecError::Truncated)?;
    Ok((
        palette,
        &body[..input_end],
        &after[..output_end],
        1 + input_end + 1 + output_end + 1,
    ))
}

/// Decodes dual face bytes into a feature.
pub fn decode_face_color(faces: &[u8]) -> Result<FaceColorDualFeature, CodecError> {
    let primary = faces
        .iter()
        .filter(|&&b| b & SECONDARY_FACE_FLAG == 0)
        .map(|&b| usize::from(b));
    let secondary = faces
        .iter()
        .filter(|&&b| b & SECONDARY_FACE_FLAG != 0)
        .map(|&b| usize::from(b & !SECONDARY_FACE_FLAG));
    let dual = FaceColorDualFeature::new(primary, secondary).ok_or(CodecError::InvalidFaceColor)?;
    if dual.faces().count() != faces.len() {
        return Err(CodecError::InvalidFaceColor);
    }
    Ok(dual)
}

fn encode_face_color(dual: &FaceColorDualFeature, out: &mut Vec<u8>) -> Result<(), CodecError> {
    out.push(FACE_COLOR_START);
    for (faces, flag) in [(dual.primary_faces(), 0), (dual.secondary_faces(), SECONDARY_FACE_FLAG)] {
        for &face in faces {
            if face > MAX_FACE_INDEX {
                return Err(CodecError::FaceIndexTooLarge(face));
            }
            out.push(face as u8 | flag);
        }
    }
    Ok(())
}

fn encode_section<'a>(
    mapping: &BinaryFeatureMapping,
    features: impl Iterator<Item = &'a Feature>,
    out: &mut Vec<u8>,
) -> Result<(), CodecError> {
    let mut ordinary = Vec::new();
    let mut duals = Vec::new();
    for feature in features {
        match feature {
            Feature::FaceColorDual(dual) => duals.push(dual),
            other => ordinary.push(
                mapping
                    .byte_for(other)
                    .ok_or_else(|| CodecError::UnmappedFeature(other.clone()))?,
            ),
        }
    }
    ordinary.sort_unstable();
    ordinary.dedup();
    out.extend_from_slice(&ordinary);
    for dual in duals {
        encode_face_color(dual, out)?;
    }
    out.push(SECTION_END);
    Ok(())
}

/// Encodes a rule. Only output features not implied by the input are written.
pub fn encode_rule(
    mapping: &BinaryFeatureMapping,
    palette_index: u8,
    input: &FeatureSet,
    output: &FeatureSet,
) -> Result<Vec<u8>, CodecError> {
    let mut bytes = vec![palette_index];
    let input_features = input.features();
    encode_section(mapping, input_features.iter(), &mut bytes)?;
    let output_only: Vec<Feature> = output
        .features()
        .into_iter()
        .filter(|f| !input.implies(f))
        .collect();
    encode_section(mapping, output_only.iter(), &mut bytes)?;
    Ok(bytes)
}

fn decode_section(mapping: &BinaryFeatureMapping, section: &[u8], into: &mut FeatureSet) -> Result<(), CodecError> {
    for token in tokens(section) {
        let feature = match token {
            Token::Feature(byte) => mapping
                .feature_for(byte)
                .cloned()
                .ok_or(CodecError::InvalidByte(byte))?,
            Token::FaceColor(faces) => Feature::FaceColorDual(decode_face_color(faces)?),
        };
        into.add_feature(&feature)?;
    }
    Ok(())
}

/// Decodes a rule starting at its palette byte.
///
/// Returns `(palette index, input, output, bytes consumed)`; the output is the
/// union of the input and the output-only section.
pub fn decode_rule(
    mapping: &BinaryFeatureMapping,
    bytes: &[u8],
) -> Result<(u8, FeatureSet, FeatureSet, usize), CodecError> {
    let (palette, input_bytes, output_bytes, len) = split_rule(bytes)?;
    let mut input = FeatureSet::new();
    decode_section(mapping, input_bytes, &mut input)?;
    let mut output = input.clone();
    decode_section(mapping, output_bytes, &mut output)?;
    Ok((palette, input, output, len))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::board::{standard, PatternBoardDescriptor};

    fn corner() -> PatternBoard {
        PatternBoard::from_descriptor(PatternBoardDescriptor::Vertex {
            exit: true,
            edge_count: 2,
            sector_count: 0,
        })
        .unwrap()
    }

    #[test]
    fn mapping_layout() {
        let board = corner();
        let mapping = BinaryFeatureMapping::new(&board).unwrap();
        assert_eq!(mapping.len(), 6);
        assert_eq!(mapping.byte_for(&Feature::BlackEdge(0)), Some(0));
        assert_eq!(mapping.byte_for(&Feature::RedEdge(2)), Some(5));
        assert_eq!(mapping.feature_for(6), None);
    }

    #[test]
    fn encodes_output_only_bytes() {
        let board = corner();
        let mapping = BinaryFeatureMapping::new(&board).unwrap();
        let input = FeatureSet::from_features(&[Feature::BlackEdge(0), Feature::BlackEdge(1)]).unwrap();
        let output = input.union(&FeatureSet::from_features(&[Feature::RedEdge(2)]).unwrap()).unwrap();
        let bytes = encode_rule(&mapping, 3, &input, &output).unwrap();
        assert_eq!(bytes, vec![3, 0, 2, SECTION_END, 5, SECTION_END]);

        let (palette, decoded_input, decoded_output, len) = decode_rule(&mapping, &bytes).unwrap();
        assert_eq!((palette, len), (3, bytes.len()));
        assert_eq!(decoded_input, input);
        assert_eq!(decoded_output, output);
    }

    #[test]
    fn face_colors_use_marker_bytes() {
        let board = PatternBoard::from_descriptor(standard::square_cells(&[(0, 0)])).unwrap();
        let mapping = BinaryFeatureMapping::new(&board).unwrap();
        let input = FeatureSet::from_features(&[Feature::BlackEdge(0)]).unwrap();
        let faces = &board.edge(0).faces;
        let dual = FaceColorDualFeature::opposite(faces[0], faces[1]).unwrap();
        let output = input
            .union(&FeatureSet::from_features(&[Feature::FaceColorDual(dual)]).unwrap())
            .unwrap();
        let bytes = encode_rule(&mapping, 0, &input, &output).unwrap();
        let (_, input_section, output_section, _) = split_rule(&bytes).unwrap();
        assert_eq!(input_section, &[0]);
        assert_eq!(output_section[0], FACE_COLOR_START);
        assert_eq!(output_section[2] & SECONDARY_FACE_FLAG, SECONDARY_FACE_FLAG);

        let (_, _, decoded, _) = decode_rule(&mapping, &bytes).unwrap();
        assert_eq!(decoded, output);
    }

    #[test]
    fn tokens_split_duals() {
        let section = [4, 9, FACE_COLOR_START, 0, 0x81, FACE_COLOR_START, 2, 3];
        let tokens: Vec<Token> = tokens(&section).collect();
        assert_eq!(
            tokens,
            vec![
                Token::Feature(4),
                Token::Feature(9),
                Token::FaceColor(&[0, 0x81]),
                Token::FaceColor(&[2, 3]),
            ]
        );
    }

    #[test]
    fn truncated_rules_fail() {
        let mapping = BinaryFeatureMapping::new(&corner()).unwrap();
        assert_eq!(decode_rule(&mapping, &[0, 1, 2]), Err(CodecError::Truncated));
        assert_eq!(decode_rule(&mapping, &[0, 40, SECTION_END, SECTION_END]), Err(CodecError::InvalidByte(40)));
    }
}
