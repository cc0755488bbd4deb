//! Fingerprinting and WL (Weisfeiler–Lehman) refinement for pattern boards.
//!
//! Two fingerprints exist per board:
//! - the *descriptor fingerprint*, a hash of the canonical descriptor bytes. It is
//!   representation-sensitive and serves as the stable cache handle.
//! - the *shape fingerprint*, an isomorphism-invariant WL hash over the
//!   vertex/edge/face/sector incidence structure. It buckets registry lookups so
//!   that full isomorphism checks only run between plausible candidates.
//!
//! All hashing is SHA-256 with domain separation and length prefixing, so
//! fingerprints are identical across fresh builds.

use crate::board::{PatternBoard, VertexKind};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Domain tag for descriptor fingerprints.
pub const DOMAIN_DESCRIPTOR: &[u8] = b"BOARD_DESCRIPTOR";
/// Domain tag for initial WL labels.
pub const DOMAIN_WL_INIT: &[u8] = b"WL_INIT";
/// Domain tag for WL refinement rounds.
pub const DOMAIN_WL_ROUND: &[u8] = b"WL_ROUND";
/// Domain tag for the final shape fingerprint.
pub const DOMAIN_SHAPE: &[u8] = b"BOARD_SHAPE";

/// Number of WL rounds used for shape fingerprints.
pub const WL_ROUNDS: usize = 4;

/// A 256-bit hash value.
#[repr(transparent)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct HashValue(pub [u8; 32]);

impl HashValue {
    /// Creates a zero hash (all zeros).
    #[inline]
    pub fn zero() -> Self {
        Self([0u8; 32])
    }

    /// Creates a hash from a raw byte array.
    #[inline]
    pub const fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    /// Returns the raw byte array.
    #[inline]
    pub const fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// Computes SHA-256 of the given data with domain separation.
    ///
    /// Input is `b"SWF:<domain>:v1" || length_prefix(data) || data`, where the
    /// length prefix is a 64-bit little-endian byte count.
    pub fn hash_with_domain(domain: &[u8], data: &[u8]) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(b"SWF:");
        hasher.update(domain);
        hasher.update(b":v1");
        let len = data.len() as u64;
        hasher.update(len.to_le_bytes());
        hasher.update(data);
        Self(hasher.finalize().into())
    }
}

impl std::fmt::Display for HashValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "HashValue({:02x}{:02x}{:02x}{:02x}…)",
            self.0[0], self.0[1], self.0[2], self.0[3]
        )
    }
}

/// Hashes canonical descriptor bytes.
pub fn descriptor_fingerprint(bytes: &[u8]) -> HashValue {
    HashValue::hash_with_domain(DOMAIN_DESCRIPTOR, bytes)
}

// Node numbering inside the incidence graph: vertices, edges, faces, sectors.
struct IncidenceGraph {
    labels: Vec<HashValue>,
    neighbours: Vec<Vec<usize>>,
}

impl IncidenceGraph {
    fn new(board: &PatternBoard) -> Self {
        let v0 = 0;
        let e0 = v0 + board.vertices().len();
        let f0 = e0 + board.edges().len();
        let s0 = f0 + board.faces().len();
        let total = s0 + board.sectors().len();

        let mut labels = Vec::with_capacity(total);
        for vertex in board.vertices() {
            let kind = match vertex.kind {
                VertexKind::Interior => 0u8,
                VertexKind::Exit => 1,
                VertexKind::Open => 2,
            };
            labels.push(initial_label(b'v', &[kind, vertex.order() as u8]));
        }
        for edge in board.edges() {
            labels.push(initial_label(b'e', &[edge.is_exit as u8, edge.faces.len() as u8]));
        }
        for face in board.faces() {
            labels.push(initial_label(b'f', &[face.is_exit as u8, face.edges.len() as u8]));
        }
        for _ in board.sectors() {
            labels.push(initial_label(b's', &[]));
        }

        let mut neighbours = vec![Vec::new(); total];
        let mut link = |a: usize, b: usize| {
            neighbours[a].push(b);
            neighbours[b].push(a);
        };
        for edge in board.edges() {
            for &v in &edge.vertices {
                link(e0 + edge.index, v0 + v);
            }
            for &f in &edge.faces {
                link(e0 + edge.index, f0 + f);
            }
        }
        for sector in board.sectors() {
            link(s0 + sector.index, v0 + sector.vertex);
            link(s0 + sector.index, f0 + sector.face);
            for &e in &sector.edges {
                link(s0 + sector.index, e0 + e);
            }
        }

        Self { labels, neighbours }
    }

    fn refine(&mut self, rounds: usize) {
        for round in 0..rounds {
            let next: Vec<HashValue> = (0..self.labels.len())
                .map(|node| {
                    let mut around: Vec<[u8; 32]> =
                        self.neighbours[node].iter().map(|&n| self.labels[n].0).collect();
                    around.sort_unstable();
                    let mut data = Vec::with_capacity(40 + 32 * around.len());
                    data.extend_from_slice(&(round as u64).to_le_bytes());
                    data.extend_from_slice(&self.labels[node].0);
                    for label in around {
                        data.extend_from_slice(&label);
                    }
                    HashValue::hash_with_domain(DOMAIN_WL_ROUND, &data)
                })
                .collect();
            self.labels = next;
        }
    }
}

fn initial_label(tag: u8, data: &[u8]) -> HashValue {
    let mut bytes = Vec::with_capacity(1 + data.len());
    bytes.push(tag);
    bytes.extend_from_slice(data);
    HashValue::hash_with_domain(DOMAIN_WL_INIT, &bytes)
}

/// Computes the isomorphism-invariant shape fingerprint of a board.
///
/// Equal boards up to relabeling always share a shape fingerprint; the converse
/// does not hold, so callers confirm with an explicit isomorphism search.
pub fn shape_fingerprint(board: &PatternBoard) -> HashValue {
    let mut graph = IncidenceGraph::new(board);
    graph.refine(WL_ROUNDS);

    let mut labels: Vec<[u8; 32]> = graph.labels.iter().map(|h| h.0).collect();
    labels.sort_unstable();
    let mut data = Vec::with_capacity(8 + 32 * labels.len());
    data.extend_from_slice(&(labels.len() as u64).to_le_bytes());
    for label in labels {
        data.extend_from_slice(&label);
    }
    HashValue::hash_with_domain(DOMAIN_SHAPE, &data)
}
