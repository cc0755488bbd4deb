//! Standard board catalogue.
//!
//! Boards are grouped into families by the tiling they come from, and each family
//! orders its boards into generations of increasing size. Cell coordinates only
//! serve to derive the abstract faces; no geometry survives into the board.

use super::PatternBoardDescriptor;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// Vertex order of the square tiling.
pub const SQUARE_VERTEX_ORDER: usize = 4;
/// Vertex order of the hexagonal tiling.
pub const HEXAGONAL_VERTEX_ORDER: usize = 3;

/// Tiling family a rule sequence draws boards from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BoardFamily {
    General,
    Square,
    Hexagonal,
}

impl BoardFamily {
    /// Vertex orders of the tilings in this family.
    pub fn vertex_orders(&self) -> &'static [usize] {
        match self {
            BoardFamily::General => &[HEXAGONAL_VERTEX_ORDER, SQUARE_VERTEX_ORDER],
            BoardFamily::Square => &[SQUARE_VERTEX_ORDER],
            BoardFamily::Hexagonal => &[HEXAGONAL_VERTEX_ORDER],
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            BoardFamily::General => "general",
            BoardFamily::Square => "square",
            BoardFamily::Hexagonal => "hexagonal",
        }
    }
}

impl std::fmt::Display for BoardFamily {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A catalogue entry: registered name plus descriptor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StandardBoard {
    pub name: String,
    pub descriptor: PatternBoardDescriptor,
}

impl StandardBoard {
    fn derived(descriptor: PatternBoardDescriptor) -> Self {
        let name = descriptor
            .derived_name()
            .unwrap_or_else(|| descriptor.to_json_string());
        Self { name, descriptor }
    }

    fn named(name: &str, descriptor: PatternBoardDescriptor) -> Self {
        Self {
            name: name.to_string(),
            descriptor,
        }
    }
}

/// Faces board for a set of unit squares at integer cell coordinates.
pub fn square_cells(cells: &[(i32, i32)]) -> PatternBoardDescriptor {
    let cycles = cells
        .iter()
        .map(|&(x, y)| vec![(x, y), (x + 1, y), (x + 1, y + 1), (x, y + 1)])
        .collect();
    faces_from_cycles(cycles, SQUARE_VERTEX_ORDER)
}

/// Faces board for a set of hexagons at axial cell coordinates.
///
/// Corners live on a triangular lattice in skewed coordinates; the centre of
/// cell `(q, r)` is `(2q + r, r - q)`.
pub fn hexagonal_cells(cells: &[(i32, i32)]) -> PatternBoardDescriptor {
    const CORNERS: [(i32, i32); 6] = [(1, 0), (0, 1), (-1, 1), (-1, 0), (0, -1), (1, -1)];
    let cycles = cells
        .iter()
        .map(|&(q, r)| {
            let (cx, cy) = (2 * q + r, r - q);
            CORNERS.iter().map(|&(dx, dy)| (cx + dx, cy + dy)).collect()
        })
        .collect();
    faces_from_cycles(cycles, HEXAGONAL_VERTEX_ORDER)
}

fn faces_from_cycles(cycles: Vec<Vec<(i32, i32)>>, vertex_order: usize) -> PatternBoardDescriptor {
    let mut edges = BTreeSet::new();
    for cycle in &cycles {
        for i in 0..cycle.len() {
            let (a, b) = (cycle[i], cycle[(i + 1) % cycle.len()]);
            edges.insert((a.min(b), a.max(b)));
        }
    }
    let mut degree: BTreeMap<(i32, i32), usize> = BTreeMap::new();
    for (a, b) in &edges {
        *degree.entry(*a).or_default() += 1;
        *degree.entry(*b).or_default() += 1;
    }

    let interior: Vec<_> = degree
        .iter()
        .filter(|(_, &d)| d == vertex_order)
        .map(|(&p, _)| p)
        .collect();
    let exit: Vec<_> = degree
        .iter()
        .filter(|(_, &d)| d != vertex_order)
        .map(|(&p, _)| p)
        .collect();
    let index: BTreeMap<(i32, i32), usize> = interior
        .iter()
        .chain(exit.iter())
        .enumerate()
        .map(|(i, &p)| (p, i))
        .collect();

    PatternBoardDescriptor::Faces {
        non_exit_vertices: interior.len(),
        exit_vertices: exit.len(),
        faces: cycles
            .iter()
            .map(|cycle| cycle.iter().map(|p| index[p]).collect())
            .collect(),
    }
}

/// Vertex boards for a tiling of the given vertex order.
pub fn vertex_boards(vertex_order: usize) -> Vec<StandardBoard> {
    let mut boards = Vec::new();
    for edge_count in 2..vertex_order {
        for sector_count in 0..edge_count {
            boards.push(StandardBoard::derived(PatternBoardDescriptor::Vertex {
                exit: true,
                edge_count,
                sector_count,
            }));
        }
    }
    for sector_count in 0..=vertex_order {
        boards.push(StandardBoard::derived(PatternBoardDescriptor::Vertex {
            exit: false,
            edge_count: vertex_order,
            sector_count,
        }));
    }
    boards
}

fn square_face_generations() -> Vec<Vec<StandardBoard>> {
    vec![
        vec![StandardBoard::named("square-1", square_cells(&[(0, 0)]))],
        vec![StandardBoard::named("square-2", square_cells(&[(0, 0), (1, 0)]))],
        vec![
            StandardBoard::named("square-3-i", square_cells(&[(0, 0), (1, 0), (2, 0)])),
            StandardBoard::named("square-3-l", square_cells(&[(0, 0), (1, 0), (0, 1)])),
        ],
    ]
}

fn hexagonal_face_generations() -> Vec<Vec<StandardBoard>> {
    vec![
        vec![StandardBoard::named("hexagonal-1", hexagonal_cells(&[(0, 0)]))],
        vec![StandardBoard::named("hexagonal-2", hexagonal_cells(&[(0, 0), (1, 0)]))],
    ]
}

/// Ordered generations of standard boards for a family.
///
/// Generation 0 holds the edge board and the vertex boards; later generations
/// hold face boards of growing size.
pub fn generations(family: BoardFamily) -> Vec<Vec<StandardBoard>> {
    let mut first = vec![StandardBoard::derived(PatternBoardDescriptor::Edge)];
    for &order in family.vertex_orders() {
        for board in vertex_boards(order) {
            if !first.iter().any(|b| b.name == board.name) {
                first.push(board);
            }
        }
    }

    let faces = match family {
        BoardFamily::Square => square_face_generations(),
        BoardFamily::Hexagonal => hexagonal_face_generations(),
        BoardFamily::General => {
            let mut merged = square_face_generations();
            for (i, generation) in hexagonal_face_generations().into_iter().enumerate() {
                if i < merged.len() {
                    merged[i].extend(generation);
                } else {
                    merged.push(generation);
                }
            }
            merged
        }
    };

    std::iter::once(first).chain(faces).collect()
}

/// Every standard board of every family, without duplicates.
pub fn all_standard_boards() -> Vec<StandardBoard> {
    let mut boards: Vec<StandardBoard> = Vec::new();
    for board in generations(BoardFamily::General).into_iter().flatten() {
        if !boards.iter().any(|b| b.name == board.name) {
            boards.push(board);
        }
    }
    boards
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::board::{PatternBoard, VertexKind};

    #[test]
    fn square_l_has_one_interior_vertex() {
        let board = PatternBoard::from_descriptor(square_cells(&[(0, 0), (1, 0), (0, 1)])).unwrap();
        let (interior, exit, open) = board.kind_counts();
        assert_eq!((interior, exit, open), (1, 7, 0));
        let center = board.vertex(0);
        assert_eq!(center.kind, VertexKind::Interior);
        assert_eq!(center.order(), 4);
        // Concave corner: the two boundary edges at the interior vertex share an exit face.
        let exit_faces: Vec<_> = board.faces().iter().filter(|f| f.is_exit).collect();
        assert_eq!(exit_faces.iter().filter(|f| f.edges.len() == 2).count(), 1);
    }

    #[test]
    fn hexagon_pair_shares_one_edge() {
        let board = PatternBoard::from_descriptor(hexagonal_cells(&[(0, 0), (1, 0)])).unwrap();
        assert_eq!(board.non_exit_faces().count(), 2);
        assert_eq!(board.board_edge_count(), 11);
        assert_eq!(board.kind_counts().0, 2);
        for face in board.non_exit_faces() {
            assert_eq!(face.edges.len(), 6);
        }
    }

    #[test]
    fn family_generations() {
        let square = generations(BoardFamily::Square);
        assert_eq!(square.len(), 4);
        assert_eq!(square[0][0].name, "edge");
        assert!(square[0].iter().any(|b| b.name == "vertex-2-exit-none"));
        assert!(square[0].iter().any(|b| b.name == "vertex-4-non-exit-4"));
        assert!(!square[0].iter().any(|b| b.name == "vertex-3-non-exit-none"));

        let hex = generations(BoardFamily::Hexagonal);
        assert_eq!(hex.len(), 3);
        assert_eq!(hex[1][0].name, "hexagonal-1");

        let general = generations(BoardFamily::General);
        assert_eq!(general[1].len(), 2);
        assert_eq!(general[3].len(), 2);
    }

    #[test]
    fn family_names_serialize_lowercase() {
        assert_eq!(serde_json::to_string(&BoardFamily::Square).unwrap(), r#""square""#);
        let parsed: BoardFamily = serde_json::from_str(r#""hexagonal""#).unwrap();
        assert_eq!(parsed, BoardFamily::Hexagonal);
    }
}
