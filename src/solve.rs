//! Exhaustive local solving.
//!
//! A solution assigns black or red to every edge of a board (exit edges
//! included) such that the assignment can still be part of a single loop:
//! - interior vertices have 0 or 2 black edges,
//! - exit vertices have 0 or 2 black board edges when their exit edge is red,
//!   and at most one when it is black,
//! - open vertices have at most 2 black edges,
//! - a closed black cycle is the whole loop, so nothing else is black.
//!
//! Solutions are enumerated once per board and then filtered against feature
//! sets. This is the ground truth for rule validity; it is too slow for the
//! matching hot path.

use crate::board::{PatternBoard, VertexKind};
use crate::feature::{ColorRelation, EdgeState, FaceColorDualFeature, Feature, FeatureSet, SectorState};
use std::collections::HashMap;

/// Boards with more edges than this cannot be solved.
pub const MAX_SOLVABLE_EDGES: usize = 64;

/// Error raised when a board cannot be solved.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SolveError {
    /// The board has more edges than a solution bitset holds.
    TooManyEdges(usize),
}

impl std::fmt::Display for SolveError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SolveError::TooManyEdges(edges) => write!(
                f,
                "board has {} edges, at most {} can be solved",
                edges, MAX_SOLVABLE_EDGES
            ),
        }
    }
}

impl std::error::Error for SolveError {}

/// Which kinds of features implied outputs may contain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SolveKinds {
    pub edges: bool,
    pub sectors: bool,
    pub face_colors: bool,
}

impl Default for SolveKinds {
    fn default() -> Self {
        Self {
            edges: true,
            sectors: false,
            face_colors: false,
        }
    }
}

/// One full edge assignment plus the face colouring it induces.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Solution {
    black: u64,
    // (component, parity) per face; faces in one component have known relations.
    colors: Vec<(usize, bool)>,
}

impl Solution {
    fn new(board: &PatternBoard, black: u64) -> Self {
        let face_count = board.faces().len();
        let mut colors = vec![(usize::MAX, false); face_count];
        for start in 0..face_count {
            if colors[start].0 != usize::MAX {
                continue;
            }
            colors[start] = (start, false);
            let mut stack = vec![start];
            while let Some(face) = stack.pop() {
                let parity = colors[face].1;
                for &e in &board.face(face).edges {
                    let edge = board.edge(e);
                    if edge.faces.len() != 2 {
                        continue;
                    }
                    let other = if edge.faces[0] == face { edge.faces[1] } else { edge.faces[0] };
                    if colors[other].0 == usize::MAX {
                        colors[other] = (start, parity ^ (black >> e & 1 == 1));
                        stack.push(other);
                    }
                }
            }
        }
        Self { black, colors }
    }

    #[inline]
    pub fn is_black(&self, edge: usize) -> bool {
        self.black >> edge & 1 == 1
    }

    /// Bitmask of black edges.
    pub fn black_mask(&self) -> u64 {
        self.black
    }

    pub fn face_color_relation(&self, a: usize, b: usize) -> Option<ColorRelation> {
        let ((ca, pa), (cb, pb)) = (self.colors[a], self.colors[b]);
        if ca != cb {
            return None;
        }
        Some(if pa == pb {
            ColorRelation::Same
        } else {
            ColorRelation::Opposite
        })
    }

    fn black_count(&self, edges: &[usize]) -> usize {
        edges.iter().filter(|&&e| self.is_black(e)).count()
    }

    /// Black count of a sector's two edges.
    pub fn sector_count(&self, board: &PatternBoard, sector: usize) -> usize {
        self.black_count(&board.sector(sector).edges)
    }

    /// Black count around a face.
    pub fn face_count(&self, board: &PatternBoard, face: usize) -> usize {
        self.black_count(&board.face(face).edges)
    }

    /// Returns true if the solution makes `feature` hold with certainty.
    pub fn satisfies(&self, board: &PatternBoard, feature: &Feature) -> bool {
        match feature {
            Feature::BlackEdge(e) => self.is_black(*e),
            Feature::RedEdge(e) => !self.is_black(*e),
            Feature::FaceValue(f, Some(v)) => self.face_count(board, *f) == usize::from(*v),
            Feature::FaceValue(_, None) => true,
            Feature::FaceColorDual(dual) => {
                let Some(&anchor) = dual.primary_faces().first() else {
                    return true;
                };
                dual.faces()
                    .all(|f| self.face_color_relation(anchor, f) == dual.relation(anchor, f))
            }
            sector => match sector.sector_mask() {
                Some((s, mask)) => mask.allows(self.sector_count(board, s)),
                None => false,
            },
        }
    }

    /// Returns true if nothing in `input` is contradicted.
    ///
    /// Colour relations the board cannot decide locally do not contradict.
    pub fn consistent_with(&self, board: &PatternBoard, input: &FeatureSet) -> bool {
        input.features().iter().all(|feature| match feature {
            Feature::FaceColorDual(dual) => {
                let Some(&anchor) = dual.primary_faces().first() else {
                    return true;
                };
                dual.faces().all(|f| match self.face_color_relation(anchor, f) {
                    Some(relation) => Some(relation) == dual.relation(anchor, f),
                    None => true,
                })
            }
            other => self.satisfies(board, other),
        })
    }
}

/// Enumerates every solution of an unconstrained board, in a deterministic order.
///
/// Fails with [`SolveError::TooManyEdges`] past [`MAX_SOLVABLE_EDGES`].
pub fn enumerate_solutions(board: &PatternBoard) -> Result<Vec<Solution>, SolveError> {
    if board.edges().len() > MAX_SOLVABLE_EDGES {
        tracing::warn!(edges = board.edges().len(), "board too large to solve");
        return Err(SolveError::TooManyEdges(board.edges().len()));
    }
    let n = board.vertices().len();
    let mut search = Enumerator {
        board,
        black: 0,
        board_black: vec![0; n],
        board_left: board.vertices().iter().map(|v| v.order()).collect(),
        exit_state: vec![None; n],
        found: Vec::new(),
    };
    search.search(0);
    Ok(search
        .found
        .into_iter()
        .map(|black| Solution::new(board, black))
        .collect())
}

fn vertex_allows(kind: VertexKind, board_black: usize, exit_black: bool) -> bool {
    match kind {
        VertexKind::Interior => board_black == 0 || board_black == 2,
        VertexKind::Exit if exit_black => board_black <= 1,
        VertexKind::Exit => board_black == 0 || board_black == 2,
        VertexKind::Open => board_black <= 2,
    }
}

struct Enumerator<'a> {
    board: &'a PatternBoard,
    black: u64,
    board_black: Vec<usize>,
    board_left: Vec<usize>,
    exit_state: Vec<Option<bool>>,
    found: Vec<u64>,
}

impl<'a> Enumerator<'a> {
    fn feasible(&self, v: usize) -> bool {
        let vertex = self.board.vertex(v);
        let exits: &[bool] = match (vertex.exit_edge, self.exit_state[v]) {
            (None, _) => &[false],
            (Some(_), Some(true)) => &[true],
            (Some(_), Some(false)) => &[false],
            (Some(_), None) => &[false, true],
        };
        let low = self.board_black[v];
        (low..=low + self.board_left[v])
            .any(|count| exits.iter().any(|&x| vertex_allows(vertex.kind, count, x)))
    }

    fn set(&mut self, e: usize, black: bool, undo: bool) {
        let edge = self.board.edge(e);
        if edge.is_exit {
            self.exit_state[edge.vertices[0]] = if undo { None } else { Some(black) };
        } else {
            for &v in &edge.vertices {
                if undo {
                    self.board_left[v] += 1;
                    self.board_black[v] -= usize::from(black);
                } else {
                    self.board_left[v] -= 1;
                    self.board_black[v] += usize::from(black);
                }
            }
        }
        if black {
            self.black ^= 1 << e;
        }
    }

    fn search(&mut self, e: usize) {
        if e == self.board.edges().len() {
            if single_loop_ok(self.board, self.black) {
                self.found.push(self.black);
            }
            return;
        }
        for black in [false, true] {
            self.set(e, black, false);
            if self.board.edge(e).vertices.iter().all(|&v| self.feasible(v)) {
                self.search(e + 1);
            }
            self.set(e, black, true);
        }
    }
}

// A closed cycle must be the only black structure on the board.
fn single_loop_ok(board: &PatternBoard, black: u64) -> bool {
    let mut parent: Vec<usize> = (0..board.vertices().len()).collect();
    fn find(parent: &mut [usize], mut x: usize) -> usize {
        while parent[x] != x {
            parent[x] = parent[parent[x]];
            x = parent[x];
        }
        x
    }

    let mut cycle_root = None;
    let black_board: Vec<usize> = board
        .edges()
        .iter()
        .filter(|e| !e.is_exit && black >> e.index & 1 == 1)
        .map(|e| e.index)
        .collect();
    for &e in &black_board {
        let edge = board.edge(e);
        let (a, b) = (find(&mut parent, edge.vertices[0]), find(&mut parent, edge.vertices[1]));
        if a == b {
            cycle_root = Some(a);
        } else {
            parent[a] = b;
        }
    }

    let Some(_) = cycle_root else {
        return true;
    };
    let exit_black = board.edges().iter().any(|e| e.is_exit && black >> e.index & 1 == 1);
    if exit_black {
        return false;
    }
    let root = find(&mut parent, board.edge(black_board[0]).vertices[0]);
    black_board
        .iter()
        .all(|&e| find(&mut parent, board.edge(e).vertices[0]) == root)
}

/// Solutions of `board` consistent with `input`, optionally highlander-filtered.
pub fn solutions_for(
    board: &PatternBoard,
    all: &[Solution],
    input: &FeatureSet,
    highlander: bool,
) -> Vec<Solution> {
    let consistent: Vec<Solution> = all
        .iter()
        .filter(|s| s.consistent_with(board, input))
        .cloned()
        .collect();
    if highlander {
        highlander_filter(board, input, consistent)
    } else {
        consistent
    }
}

/// Drops every solution that shares its observable key with another one.
///
/// The key holds the states of exit edges and of edges touching an exit face
/// or bordering fewer than two faces, plus the black count of every non-exit
/// face without a value in `input`. Two solutions with one key cannot both be
/// the unique answer of a puzzle, so neither survives.
pub fn highlander_filter(board: &PatternBoard, input: &FeatureSet, solutions: Vec<Solution>) -> Vec<Solution> {
    let observable: u64 = board
        .edges()
        .iter()
        .filter(|e| e.is_exit || e.faces.len() < 2 || e.faces.iter().any(|&f| board.face(f).is_exit))
        .fold(0, |mask, e| mask | 1 << e.index);
    let free_faces: Vec<usize> = board
        .non_exit_faces()
        .filter(|f| input.face_value(f.index).is_none())
        .map(|f| f.index)
        .collect();

    let key = |s: &Solution| -> (u64, Vec<usize>) {
        (
            s.black & observable,
            free_faces.iter().map(|&f| s.face_count(board, f)).collect(),
        )
    };
    let mut counts: HashMap<(u64, Vec<usize>), usize> = HashMap::new();
    for solution in &solutions {
        *counts.entry(key(solution)).or_default() += 1;
    }
    solutions
        .into_iter()
        .filter(|s| counts.get(&key(s)).copied() == Some(1))
        .collect()
}

/// Features shared by every solution. Returns `None` when there are none.
pub fn implied_features(board: &PatternBoard, solutions: &[Solution], kinds: SolveKinds) -> Option<FeatureSet> {
    let first = solutions.first()?;
    let mut features = Vec::new();

    if kinds.edges {
        for edge in board.edges() {
            let black = first.is_black(edge.index);
            if solutions.iter().all(|s| s.is_black(edge.index) == black) {
                features.push(if black {
                    Feature::BlackEdge(edge.index)
                } else {
                    Feature::RedEdge(edge.index)
                });
            }
        }
    }

    if kinds.sectors {
        for sector in board.sectors() {
            let seen = solutions.iter().fold(SectorState::NONE, |acc, s| {
                SectorState::from_bits(acc.bits() | SectorState::exactly(s.sector_count(board, sector.index)).bits())
            });
            features.extend(seen.features(sector.index));
        }
    }

    if kinds.face_colors {
        let faces = board.faces().len();
        for a in 0..faces {
            for b in a + 1..faces {
                let relation = first.face_color_relation(a, b);
                if relation.is_some() && solutions.iter().all(|s| s.face_color_relation(a, b) == relation) {
                    let dual = match relation {
                        Some(ColorRelation::Same) => FaceColorDualFeature::same(a, b),
                        _ => FaceColorDualFeature::opposite(a, b),
                    };
                    features.extend(dual.map(Feature::FaceColorDual));
                }
            }
        }
    }

    FeatureSet::from_features(&features).ok()
}

/// Ground-truth validity: every remaining solution satisfies the new output features.
///
/// An input no solution satisfies makes the rule vacuously valid.
pub fn is_pattern_rule_valid(
    board: &PatternBoard,
    all: &[Solution],
    input: &FeatureSet,
    output: &FeatureSet,
    highlander: bool,
) -> bool {
    let solutions = solutions_for(board, all, input, highlander);
    let added: Vec<Feature> = output
        .features()
        .into_iter()
        .filter(|f| !input.implies(f))
        .collect();
    solutions
        .iter()
        .all(|s| added.iter().all(|f| s.satisfies(board, f)))
}

/// Edge state every solution agrees on, for diagnostics.
pub fn forced_edge_state(solutions: &[Solution], edge: usize) -> EdgeState {
    match solutions.first() {
        Some(first) if solutions.iter().all(|s| s.is_black(edge) == first.is_black(edge)) => {
            if first.is_black(edge) {
                EdgeState::Black
            } else {
                EdgeState::Red
            }
        }
        _ => EdgeState::Unknown,
    }
}
