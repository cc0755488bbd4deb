//! Pattern boards: small local graphs used as the domain of rules.
//!
//! A board is built once from a [`PatternBoardDescriptor`] and is immutable
//! afterwards. Element indices are dense and deterministic:
//! - vertices follow descriptor order,
//! - board edges come first, then one exit edge per exit vertex (vertex order),
//! - non-exit faces follow descriptor order, then exit faces,
//! - sectors are numbered face by face.
//!
//! Exit elements stand for "the puzzle continues here". An exit edge
//! summarises every edge at its vertex that lies outside the board: black
//! means at least one of them is black, red means all of them are red.

pub mod descriptor;
pub mod registry;
pub mod standard;

use crate::fingerprint::{self, HashValue};
use std::collections::HashMap;

pub use descriptor::PatternBoardDescriptor;
pub use registry::BoardRegistry;
pub use standard::BoardFamily;

/// How much of a vertex's neighbourhood the board knows about.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum VertexKind {
    /// Every incident edge is a board edge.
    Interior,
    /// Outside edges are summarised by one exit edge.
    Exit,
    /// Loose endpoint; nothing is known about outside edges.
    Open,
}

/// A vertex of a pattern board.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Vertex {
    /// Position in [`PatternBoard::vertices`].
    pub index: usize,
    pub kind: VertexKind,
    /// Incident board (non-exit) edges, ascending.
    pub edges: Vec<usize>,
    /// The edge summarising outside edges. Set only for exit vertices.
    pub exit_edge: Option<usize>,
    /// Sectors with this vertex as their apex.
    pub sectors: Vec<usize>,
    /// Faces touching the vertex, exit faces included.
    pub faces: Vec<usize>,
}

impl Vertex {
    /// Returns true for exit and open vertices.
    #[inline]
    pub fn is_exit(&self) -> bool {
        self.kind != VertexKind::Interior
    }

    /// Number of incident board edges.
    #[inline]
    pub fn order(&self) -> usize {
        self.edges.len()
    }

    /// Board edges followed by the exit edge, if any.
    pub fn all_edges(&self) -> impl Iterator<Item = usize> + '_ {
        self.edges.iter().copied().chain(self.exit_edge)
    }
}

/// An edge of a pattern board.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Edge {
    /// Position in [`PatternBoard::edges`]. Exit edges come after board edges.
    pub index: usize,
    pub is_exit: bool,
    /// Endpoints. Exit edges have a single endpoint, their exit vertex.
    pub vertices: Vec<usize>,
    /// Faces on either side, at most two. Exit edges have none.
    pub faces: Vec<usize>,
    /// Sectors this edge is one of the two sides of.
    pub sectors: Vec<usize>,
}

impl Edge {
    /// Returns the endpoint that is not `vertex`.
    pub fn other_vertex(&self, vertex: usize) -> Option<usize> {
        match self.vertices.as_slice() {
            [a, b] if *a == vertex => Some(*b),
            [a, b] if *b == vertex => Some(*a),
            _ => None,
        }
    }
}

/// Two consecutive board edges bounding the same face at one vertex.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Sector {
    pub index: usize,
    /// Apex vertex shared by both edges.
    pub vertex: usize,
    pub edges: [usize; 2],
    /// Face the sector opens into.
    pub face: usize,
}

impl Sector {
    /// Returns true if the sector spans exactly the edges `a` and `b`.
    pub fn spans(&self, a: usize, b: usize) -> bool {
        (self.edges[0] == a && self.edges[1] == b) || (self.edges[0] == b && self.edges[1] == a)
    }
}

/// A face of a pattern board.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Face {
    pub index: usize,
    /// Exit faces lie outside the board and are only partially bounded.
    pub is_exit: bool,
    /// Bounding board edges (cyclic order for non-exit faces).
    pub edges: Vec<usize>,
    /// Corner vertices, ascending.
    pub vertices: Vec<usize>,
    pub sectors: Vec<usize>,
}

/// Error raised while building or resolving pattern boards.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BoardError {
    /// The descriptor does not describe a consistent board.
    InvalidDescriptor(String),
    /// A board name is neither registered nor a JSON descriptor.
    UnknownBoard(String),
}

impl std::fmt::Display for BoardError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BoardError::InvalidDescriptor(msg) => write!(f, "invalid board descriptor: {}", msg),
            BoardError::UnknownBoard(name) => write!(f, "unknown pattern board: {}", name),
        }
    }
}

impl std::error::Error for BoardError {}

/// Descriptor-independent building blocks of a board.
#[derive(Debug, Clone, Default)]
pub(crate) struct BoardParts {
    pub kinds: Vec<VertexKind>,
    pub edges: Vec<[usize; 2]>,
    pub faces: Vec<FacePart>,
}

#[derive(Debug, Clone)]
pub(crate) struct FacePart {
    pub is_exit: bool,
    pub edges: Vec<usize>,
    /// `(vertex, edge, edge)` triples that become sectors of this face.
    pub corners: Vec<(usize, usize, usize)>,
}

/// An immutable pattern board.
///
/// Equality is structural: two boards are equal when they were built from the
/// same descriptor. Isomorphic boards with different descriptors are not equal;
/// use [`BoardRegistry::is_isomorphic`] for that.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PatternBoard {
    descriptor: PatternBoardDescriptor,
    vertices: Vec<Vertex>,
    edges: Vec<Edge>,
    sectors: Vec<Sector>,
    faces: Vec<Face>,
    edge_lookup: HashMap<(usize, usize), usize>,
    fingerprint: HashValue,
    shape: HashValue,
}

impl PatternBoard {
    /// Builds a board from its descriptor.
    pub fn from_descriptor(descriptor: PatternBoardDescriptor) -> Result<Self, BoardError> {
        let parts = descriptor.parts()?;
        Self::assemble(descriptor, parts)
    }

    fn assemble(descriptor: PatternBoardDescriptor, parts: BoardParts) -> Result<Self, BoardError> {
        let invalid = |msg: String| BoardError::InvalidDescriptor(msg);

        let mut vertices: Vec<Vertex> = parts
            .kinds
            .iter()
            .enumerate()
            .map(|(index, &kind)| Vertex {
                index,
                kind,
                edges: Vec::new(),
                exit_edge: None,
                sectors: Vec::new(),
                faces: Vec::new(),
            })
            .collect();

        let mut edges = Vec::with_capacity(parts.edges.len() + vertices.len());
        let mut edge_lookup = HashMap::new();
        for (index, &[a, b]) in parts.edges.iter().enumerate() {
            if a >= vertices.len() || b >= vertices.len() || a == b {
                return Err(invalid(format!("edge {} has invalid endpoints ({}, {})", index, a, b)));
            }
            let key = (a.min(b), a.max(b));
            if edge_lookup.insert(key, index).is_some() {
                return Err(invalid(format!("duplicate edge between {} and {}", a, b)));
            }
            vertices[a].edges.push(index);
            vertices[b].edges.push(index);
            edges.push(Edge {
                index,
                is_exit: false,
                vertices: vec![a, b],
                faces: Vec::new(),
                sectors: Vec::new(),
            });
        }

        for vertex in vertices.iter_mut() {
            if vertex.kind == VertexKind::Exit {
                let index = edges.len();
                vertex.exit_edge = Some(index);
                edges.push(Edge {
                    index,
                    is_exit: true,
                    vertices: vec![vertex.index],
                    faces: Vec::new(),
                    sectors: Vec::new(),
                });
            }
        }

        let mut faces = Vec::with_capacity(parts.faces.len());
        let mut sectors = Vec::new();
        for (index, part) in parts.faces.iter().enumerate() {
            if part.edges.is_empty() {
                return Err(invalid(format!("face {} has no edges", index)));
            }
            let mut face_vertices = Vec::new();
            for &e in &part.edges {
                let edge = edges
                    .get_mut(e)
                    .filter(|edge| !edge.is_exit)
                    .ok_or_else(|| invalid(format!("face {} references invalid edge {}", index, e)))?;
                if edge.faces.len() == 2 {
                    return Err(invalid(format!("edge {} bounds more than two faces", e)));
                }
                edge.faces.push(index);
                face_vertices.extend(edge.vertices.iter().copied());
            }
            face_vertices.sort_unstable();
            face_vertices.dedup();
            for &v in &face_vertices {
                vertices[v].faces.push(index);
            }

            let mut face_sectors = Vec::with_capacity(part.corners.len());
            for &(v, e1, e2) in &part.corners {
                let touches = |e: usize| edges[e].vertices.contains(&v) && part.edges.contains(&e);
                if e1 == e2 || !touches(e1) || !touches(e2) {
                    return Err(invalid(format!("face {} has an invalid corner at vertex {}", index, v)));
                }
                let sector_index = sectors.len();
                sectors.push(Sector {
                    index: sector_index,
                    vertex: v,
                    edges: [e1, e2],
                    face: index,
                });
                vertices[v].sectors.push(sector_index);
                edges[e1].sectors.push(sector_index);
                edges[e2].sectors.push(sector_index);
                face_sectors.push(sector_index);
            }

            faces.push(Face {
                index,
                is_exit: part.is_exit,
                edges: part.edges.clone(),
                vertices: face_vertices,
                sectors: face_sectors,
            });
        }

        for vertex in vertices.iter_mut() {
            vertex.edges.sort_unstable();
            vertex.faces.sort_unstable();
            vertex.faces.dedup();
        }

        let fingerprint = descriptor.fingerprint();
        let mut board = Self {
            descriptor,
            vertices,
            edges,
            sectors,
            faces,
            edge_lookup,
            fingerprint,
            shape: HashValue::zero(),
        };
        board.shape = fingerprint::shape_fingerprint(&board);
        Ok(board)
    }

    /// Returns the descriptor this board was built from.
    pub fn descriptor(&self) -> &PatternBoardDescriptor {
        &self.descriptor
    }

    /// Representation fingerprint: identical for identical descriptors.
    ///
    /// Used as the stable cache handle for per-board data.
    #[inline]
    pub fn fingerprint(&self) -> HashValue {
        self.fingerprint
    }

    /// Isomorphism-invariant shape fingerprint.
    #[inline]
    pub fn shape_fingerprint(&self) -> HashValue {
        self.shape
    }

    /// All vertices, indexed by [`Vertex::index`].
    pub fn vertices(&self) -> &[Vertex] {
        &self.vertices
    }

    /// Board edges followed by exit edges.
    pub fn edges(&self) -> &[Edge] {
        &self.edges
    }

    /// All sectors, indexed by [`Sector::index`].
    pub fn sectors(&self) -> &[Sector] {
        &self.sectors
    }

    /// Non-exit and exit faces, indexed by [`Face::index`].
    pub fn faces(&self) -> &[Face] {
        &self.faces
    }

    /// Panics if `index` is out of range; see [`Feature::fits_board`] for
    /// checking untrusted indices.
    ///
    /// [`Feature::fits_board`]: crate::feature::Feature::fits_board
    pub fn vertex(&self, index: usize) -> &Vertex {
        &self.vertices[index]
    }

    /// Panics if `index` is out of range.
    pub fn edge(&self, index: usize) -> &Edge {
        &self.edges[index]
    }

    /// Panics if `index` is out of range.
    pub fn sector(&self, index: usize) -> &Sector {
        &self.sectors[index]
    }

    /// Panics if `index` is out of range.
    pub fn face(&self, index: usize) -> &Face {
        &self.faces[index]
    }

    /// Returns the board edge joining `a` and `b`, if any.
    pub fn edge_between(&self, a: usize, b: usize) -> Option<usize> {
        self.edge_lookup.get(&(a.min(b), a.max(b))).copied()
    }

    /// Returns the sector at `vertex` spanning edges `a` and `b` on `face`.
    pub fn sector_between(&self, vertex: usize, a: usize, b: usize, face: usize) -> Option<usize> {
        self.vertices[vertex]
            .sectors
            .iter()
            .copied()
            .find(|&s| self.sectors[s].face == face && self.sectors[s].spans(a, b))
    }

    /// Number of board (non-exit) edges.
    pub fn board_edge_count(&self) -> usize {
        self.edges.iter().filter(|e| !e.is_exit).count()
    }

    /// Iterates over non-exit faces.
    pub fn non_exit_faces(&self) -> impl Iterator<Item = &Face> {
        self.faces.iter().filter(|f| !f.is_exit)
    }

    /// Number of vertices of each kind, as `(interior, exit, open)`.
    pub fn kind_counts(&self) -> (usize, usize, usize) {
        self.vertices.iter().fold((0, 0, 0), |(i, x, o), v| match v.kind {
            VertexKind::Interior => (i + 1, x, o),
            VertexKind::Exit => (i, x + 1, o),
            VertexKind::Open => (i, x, o + 1),
        })
    }

    /// Largest number of board edges at any vertex.
    pub fn max_vertex_order(&self) -> usize {
        self.vertices.iter().map(Vertex::order).max().unwrap_or(0)
    }
}
