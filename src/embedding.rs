//! Embeddings of one pattern board into another.
//!
//! An embedding maps the vertices, edges, faces and sectors of a *source*
//! board into a *target* board while preserving incidence. Exit elements give
//! the source slack at its boundary: an exit edge maps to the whole set of
//! target edges it summarises, and exit faces may land on any face containing
//! the images of their edges.
//!
//! The search is a backtracking subgraph match over vertices followed by a
//! backtracking assignment of faces. Candidates are always tried in ascending
//! index order, so results are deterministic.

use crate::board::{PatternBoard, VertexKind};

/// Image of a source edge.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum EdgeImage {
    /// A board edge maps to exactly one target board edge.
    Edge(usize),
    /// An exit edge maps to the sorted set of target edges it summarises.
    /// The set may be empty.
    Exit(Vec<usize>),
}

impl EdgeImage {
    /// Target edges covered by this image.
    pub fn edges(&self) -> &[usize] {
        match self {
            EdgeImage::Edge(e) => std::slice::from_ref(e),
            EdgeImage::Exit(edges) => edges,
        }
    }
}

/// A structure-preserving map from a source board into a target board.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Embedding {
    vertex_map: Vec<usize>,
    edge_map: Vec<EdgeImage>,
    sector_map: Vec<usize>,
    face_map: Vec<usize>,
}

impl Embedding {
    /// The identity embedding of a board into itself.
    pub fn identity(board: &PatternBoard) -> Self {
        Self {
            vertex_map: (0..board.vertices().len()).collect(),
            edge_map: board
                .edges()
                .iter()
                .map(|e| {
                    if e.is_exit {
                        EdgeImage::Exit(vec![e.index])
                    } else {
                        EdgeImage::Edge(e.index)
                    }
                })
                .collect(),
            sector_map: (0..board.sectors().len()).collect(),
            face_map: (0..board.faces().len()).collect(),
        }
    }

    #[inline]
    pub fn map_vertex(&self, vertex: usize) -> usize {
        self.vertex_map[vertex]
    }

    #[inline]
    pub fn map_edge(&self, edge: usize) -> &EdgeImage {
        &self.edge_map[edge]
    }

    #[inline]
    pub fn map_sector(&self, sector: usize) -> usize {
        self.sector_map[sector]
    }

    #[inline]
    pub fn map_face(&self, face: usize) -> usize {
        self.face_map[face]
    }

    /// Returns true if this embedding is a bijection that preserves every kind:
    /// vertex kinds, exit edges onto single exit edges, and face exit status.
    pub fn is_isomorphism(&self, source: &PatternBoard, target: &PatternBoard) -> bool {
        if source.vertices().len() != target.vertices().len()
            || source.edges().len() != target.edges().len()
            || source.faces().len() != target.faces().len()
            || source.sectors().len() != target.sectors().len()
        {
            return false;
        }
        let vertices_ok = source
            .vertices()
            .iter()
            .all(|v| target.vertex(self.vertex_map[v.index]).kind == v.kind);
        let edges_ok = source.edges().iter().all(|e| match &self.edge_map[e.index] {
            EdgeImage::Edge(_) => !e.is_exit,
            EdgeImage::Exit(images) => images.len() == 1 && target.edge(images[0]).is_exit,
        });
        let faces_ok = source
            .faces()
            .iter()
            .all(|f| target.face(self.face_map[f.index]).is_exit == f.is_exit);
        vertices_ok && edges_ok && faces_ok
    }
}

/// Computes every embedding of `source` into `target`.
///
/// Returns an empty list when the source cannot fit; that is a normal outcome.
pub fn compute_embeddings(source: &PatternBoard, target: &PatternBoard) -> Vec<Embedding> {
    let (s_interior, _, _) = source.kind_counts();
    let (t_interior, _, _) = target.kind_counts();
    if source.vertices().len() > target.vertices().len()
        || source.board_edge_count() > target.board_edge_count()
        || s_interior > t_interior
        || source.non_exit_faces().count() > target.non_exit_faces().count()
    {
        return Vec::new();
    }

    let mut search = EmbeddingSearch {
        source,
        target,
        order: visit_order(source),
        vertex_map: vec![None; source.vertices().len()],
        used: vec![false; target.vertices().len()],
        results: Vec::new(),
    };
    search.assign_vertices(0);
    search.results
}

/// Computes the automorphisms of a board.
pub fn compute_automorphisms(board: &PatternBoard) -> Vec<Embedding> {
    compute_embeddings(board, board)
        .into_iter()
        .filter(|e| e.is_isomorphism(board, board))
        .collect()
}

// Breadth-first from the lowest vertex, so every vertex after the first in a
// component has an already-mapped neighbour.
fn visit_order(board: &PatternBoard) -> Vec<usize> {
    let n = board.vertices().len();
    let mut seen = vec![false; n];
    let mut order = Vec::with_capacity(n);
    for start in 0..n {
        if seen[start] {
            continue;
        }
        seen[start] = true;
        let mut head = order.len();
        order.push(start);
        while head < order.len() {
            let v = order[head];
            head += 1;
            for &e in &board.vertex(v).edges {
                if let Some(w) = board.edge(e).other_vertex(v) {
                    if !seen[w] {
                        seen[w] = true;
                        order.push(w);
                    }
                }
            }
        }
    }
    order
}

struct EmbeddingSearch<'a> {
    source: &'a PatternBoard,
    target: &'a PatternBoard,
    order: Vec<usize>,
    vertex_map: Vec<Option<usize>>,
    used: Vec<bool>,
    results: Vec<Embedding>,
}

impl<'a> EmbeddingSearch<'a> {
    fn vertex_compatible(&self, sv: usize, tv: usize) -> bool {
        let (s, t) = (self.source.vertex(sv), self.target.vertex(tv));
        match s.kind {
            VertexKind::Interior => t.kind == VertexKind::Interior && t.order() == s.order(),
            VertexKind::Exit => t.kind != VertexKind::Open && t.order() >= s.order(),
            VertexKind::Open => t.order() >= s.order(),
        }
    }

    fn candidates(&self, sv: usize) -> Vec<usize> {
        let anchor = self.source.vertex(sv).edges.iter().find_map(|&e| {
            let other = self.source.edge(e).other_vertex(sv)?;
            self.vertex_map[other]
        });
        match anchor {
            Some(t_anchor) => {
                let mut around: Vec<usize> = self
                    .target
                    .vertex(t_anchor)
                    .edges
                    .iter()
                    .filter_map(|&e| self.target.edge(e).other_vertex(t_anchor))
                    .collect();
                around.sort_unstable();
                around
            }
            None => (0..self.target.vertices().len()).collect(),
        }
    }

    fn assign_vertices(&mut self, depth: usize) {
        if depth == self.order.len() {
            self.complete_vertices();
            return;
        }

        let sv = self.order[depth];
        for tv in self.candidates(sv) {
            if self.used[tv] || !self.vertex_compatible(sv, tv) {
                continue;
            }
            let adjacent_ok = self.source.vertex(sv).edges.iter().all(|&e| {
                match self.source.edge(e).other_vertex(sv).and_then(|o| self.vertex_map[o]) {
                    Some(t_other) => self.target.edge_between(tv, t_other).is_some(),
                    None => true,
                }
            });
            if !adjacent_ok {
                continue;
            }

            self.vertex_map[sv] = Some(tv);
            self.used[tv] = true;
            self.assign_vertices(depth + 1);
            self.vertex_map[sv] = None;
            self.used[tv] = false;
        }
    }

    fn complete_vertices(&mut self) {
        let Some(vertex_map) = self.vertex_map.iter().copied().collect::<Option<Vec<usize>>>() else {
            return;
        };

        let mut edge_map = Vec::with_capacity(self.source.edges().len());
        for edge in self.source.edges() {
            if edge.is_exit {
                continue;
            }
            let (a, b) = (vertex_map[edge.vertices[0]], vertex_map[edge.vertices[1]]);
            match self.target.edge_between(a, b) {
                Some(t) => edge_map.push(EdgeImage::Edge(t)),
                None => return,
            }
        }
        for edge in self.source.edges().iter().filter(|e| e.is_exit) {
            let sv = edge.vertices[0];
            let covered: Vec<usize> = self
                .source
                .vertex(sv)
                .edges
                .iter()
                .filter_map(|&e| match &edge_map[e] {
                    EdgeImage::Edge(t) => Some(*t),
                    EdgeImage::Exit(_) => None,
                })
                .collect();
            let target_vertex = self.target.vertex(vertex_map[sv]);
            let mut images: Vec<usize> = target_vertex
                .all_edges()
                .filter(|e| !covered.contains(e))
                .collect();
            images.sort_unstable();
            edge_map.push(EdgeImage::Exit(images));
        }

        let candidates: Vec<Vec<usize>> = self
            .source
            .faces()
            .iter()
            .map(|face| self.face_candidates(face.index, &edge_map))
            .collect();
        let mut face_map = vec![usize::MAX; self.source.faces().len()];
        self.assign_faces(0, &candidates, &mut face_map, &vertex_map, &edge_map);
    }

    fn face_candidates(&self, face: usize, edge_map: &[EdgeImage]) -> Vec<usize> {
        let face = self.source.face(face);
        let images: Vec<usize> = face
            .edges
            .iter()
            .filter_map(|&e| match &edge_map[e] {
                EdgeImage::Edge(t) => Some(*t),
                EdgeImage::Exit(_) => None,
            })
            .collect();
        let Some(&first) = images.first() else {
            return Vec::new();
        };
        let mut candidates: Vec<usize> = self
            .target
            .edge(first)
            .faces
            .iter()
            .copied()
            .filter(|&tf| {
                let target_face = self.target.face(tf);
                let contains_all = images.iter().all(|e| target_face.edges.contains(e));
                if face.is_exit {
                    contains_all
                } else {
                    contains_all && !target_face.is_exit && target_face.edges.len() == face.edges.len()
                }
            })
            .collect();
        candidates.sort_unstable();
        candidates
    }

    fn assign_faces(
        &mut self,
        index: usize,
        candidates: &[Vec<usize>],
        face_map: &mut Vec<usize>,
        vertex_map: &[usize],
        edge_map: &[EdgeImage],
    ) {
        if index == face_map.len() {
            if let Some(sector_map) = self.map_sectors(face_map, vertex_map, edge_map) {
                self.results.push(Embedding {
                    vertex_map: vertex_map.to_vec(),
                    edge_map: edge_map.to_vec(),
                    sector_map,
                    face_map: face_map.clone(),
                });
            }
            return;
        }

        let face = self.source.face(index);
        for &tf in &candidates[index] {
            // Faces on opposite sides of an edge stay on opposite sides.
            let split = face.edges.iter().any(|&e| {
                self.source
                    .edge(e)
                    .faces
                    .iter()
                    .any(|&other| other < index && face_map[other] == tf)
            });
            let clash = (0..index).any(|other| {
                face_map[other] == tf && (!face.is_exit || !self.source.face(other).is_exit)
            });
            if split || clash {
                continue;
            }
            face_map[index] = tf;
            self.assign_faces(index + 1, candidates, face_map, vertex_map, edge_map);
            face_map[index] = usize::MAX;
        }
    }

    fn map_sectors(
        &self,
        face_map: &[usize],
        vertex_map: &[usize],
        edge_map: &[EdgeImage],
    ) -> Option<Vec<usize>> {
        self.source
            .sectors()
            .iter()
            .map(|sector| {
                let (a, b) = match (&edge_map[sector.edges[0]], &edge_map[sector.edges[1]]) {
                    (EdgeImage::Edge(a), EdgeImage::Edge(b)) => (*a, *b),
                    _ => return None,
                };
                self.target
                    .sector_between(vertex_map[sector.vertex], a, b, face_map[sector.face])
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::board::{standard, PatternBoardDescriptor};

    fn board(descriptor: PatternBoardDescriptor) -> PatternBoard {
        PatternBoard::from_descriptor(descriptor).unwrap()
    }

    #[test]
    fn edge_into_square() {
        let edge = board(PatternBoardDescriptor::Edge);
        let square = board(standard::square_cells(&[(0, 0)]));
        let embeddings = compute_embeddings(&edge, &square);
        // 4 edges x 2 orientations x 2 face sides.
        assert_eq!(embeddings.len(), 16);
        for embedding in &embeddings {
            let EdgeImage::Exit(images) = embedding.map_edge(1) else {
                panic!("exit edge must map to a set");
            };
            // A square corner has one other board edge plus its exit edge.
            assert_eq!(images.len(), 2);
        }
    }

    #[test]
    fn square_automorphisms() {
        let square = board(standard::square_cells(&[(0, 0)]));
        let automorphisms = compute_automorphisms(&square);
        assert_eq!(automorphisms.len(), 8);
        assert!(automorphisms.contains(&Embedding::identity(&square)));
    }

    #[test]
    fn hexagon_automorphisms() {
        let hexagon = board(standard::hexagonal_cells(&[(0, 0)]));
        assert_eq!(compute_automorphisms(&hexagon).len(), 12);
    }

    #[test]
    fn larger_source_has_no_embeddings() {
        let pair = board(standard::square_cells(&[(0, 0), (1, 0)]));
        let single = board(standard::square_cells(&[(0, 0)]));
        assert!(compute_embeddings(&pair, &single).is_empty());
    }

    #[test]
    fn square_into_hexagon_fails() {
        let square = board(standard::square_cells(&[(0, 0)]));
        let hexagon = board(standard::hexagonal_cells(&[(0, 0)]));
        assert!(compute_embeddings(&square, &hexagon).is_empty());
    }

    #[test]
    fn interior_vertex_needs_matching_degree() {
        let four = board(PatternBoardDescriptor::Vertex {
            exit: false,
            edge_count: 4,
            sector_count: 0,
        });
        let l_shape = board(standard::square_cells(&[(0, 0), (1, 0), (0, 1)]));
        let single = board(standard::square_cells(&[(0, 0)]));
        // Without sectors the four loose edges may be permuted freely.
        assert_eq!(compute_embeddings(&four, &l_shape).len(), 24);
        assert!(compute_embeddings(&four, &single).is_empty());
    }

    #[test]
    fn sectors_follow_faces() {
        let corner = board(PatternBoardDescriptor::Vertex {
            exit: true,
            edge_count: 2,
            sector_count: 1,
        });
        let square = board(standard::square_cells(&[(0, 0)]));
        let embeddings = compute_embeddings(&corner, &square);
        // One per corner and orientation.
        assert_eq!(embeddings.len(), 8);
        for embedding in &embeddings {
            let sector = square.sector(embedding.map_sector(0));
            assert_eq!(sector.face, embedding.map_face(0));
            assert!(!square.face(sector.face).is_exit);
        }
    }

    #[test]
    fn deterministic_order() {
        let edge = board(PatternBoardDescriptor::Edge);
        let square = board(standard::square_cells(&[(0, 0), (1, 0)]));
        assert_eq!(compute_embeddings(&edge, &square), compute_embeddings(&edge, &square));
    }
}
