//! Structural descriptors of pattern boards.
//!
//! A descriptor is the serialisable signature of a board. Its JSON form is an
//! array `[nonExitVertices, exitVertices, type, ...]`:
//! - `[0, 2, "edge"]`
//! - `[nonExit, exit, "vertex", edgeCount, sectorCount]`
//! - `[nonExit, exit, "faces", [[v0, v1, ...], ...]]`

use super::{BoardError, BoardParts, FacePart, VertexKind};
use crate::fingerprint::{self, HashValue};
use serde_json::{json, Value};
use std::collections::{BTreeMap, HashMap};

/// Structural signature of a pattern board.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum PatternBoardDescriptor {
    /// A single edge between two exit vertices.
    Edge,
    /// One vertex with `edge_count` loose edges and `sector_count` sectors
    /// between consecutive edges.
    Vertex {
        exit: bool,
        edge_count: usize,
        sector_count: usize,
    },
    /// Polygonal faces over vertices `0..non_exit_vertices` (interior) followed
    /// by `exit_vertices` exit vertices.
    Faces {
        non_exit_vertices: usize,
        exit_vertices: usize,
        faces: Vec<Vec<usize>>,
    },
}

impl PatternBoardDescriptor {
    pub fn non_exit_vertex_count(&self) -> usize {
        match self {
            Self::Edge => 0,
            Self::Vertex { exit, .. } => usize::from(!exit),
            Self::Faces { non_exit_vertices, .. } => *non_exit_vertices,
        }
    }

    pub fn exit_vertex_count(&self) -> usize {
        match self {
            Self::Edge => 2,
            Self::Vertex { exit, .. } => usize::from(*exit),
            Self::Faces { exit_vertices, .. } => *exit_vertices,
        }
    }

    /// Name derived from the structure alone, for boards that have one.
    pub fn derived_name(&self) -> Option<String> {
        match self {
            Self::Edge => Some("edge".to_string()),
            Self::Vertex {
                exit,
                edge_count,
                sector_count,
            } => Some(format!(
                "vertex-{}-{}-{}",
                edge_count,
                if *exit { "exit" } else { "non-exit" },
                if *sector_count == 0 {
                    "none".to_string()
                } else {
                    sector_count.to_string()
                }
            )),
            Self::Faces { .. } => None,
        }
    }

    /// Inverse of [`derived_name`](Self::derived_name).
    pub fn from_derived_name(name: &str) -> Option<Self> {
        if name == "edge" {
            return Some(Self::Edge);
        }
        let rest = name.strip_prefix("vertex-")?;
        let (count, rest) = rest.split_once('-')?;
        let edge_count = count.parse().ok()?;
        let (exit, sectors) = if let Some(sectors) = rest.strip_prefix("non-exit-") {
            (false, sectors)
        } else {
            (true, rest.strip_prefix("exit-")?)
        };
        let sector_count = match sectors {
            "none" => 0,
            other => other.parse().ok().filter(|&n: &usize| n > 0)?,
        };
        Some(Self::Vertex {
            exit,
            edge_count,
            sector_count,
        })
    }

    /// JSON array form.
    pub fn to_json(&self) -> Value {
        let head = json!([self.non_exit_vertex_count(), self.exit_vertex_count()]);
        let mut array = match head {
            Value::Array(array) => array,
            _ => Vec::new(),
        };
        match self {
            Self::Edge => array.push(json!("edge")),
            Self::Vertex {
                edge_count,
                sector_count,
                ..
            } => {
                array.push(json!("vertex"));
                array.push(json!(edge_count));
                array.push(json!(sector_count));
            }
            Self::Faces { faces, .. } => {
                array.push(json!("faces"));
                array.push(json!(faces));
            }
        }
        Value::Array(array)
    }

    /// Parses the JSON array form.
    pub fn from_json(value: &Value) -> Result<Self, BoardError> {
        let invalid = || BoardError::InvalidDescriptor(value.to_string());
        let array = value.as_array().ok_or_else(invalid)?;
        let number = |i: usize| -> Result<usize, BoardError> {
            array
                .get(i)
                .and_then(Value::as_u64)
                .map(|n| n as usize)
                .ok_or_else(invalid)
        };
        let non_exit = number(0)?;
        let exit = number(1)?;
        let kind = array.get(2).and_then(Value::as_str).ok_or_else(invalid)?;

        match kind {
            "edge" if non_exit == 0 && exit == 2 && array.len() == 3 => Ok(Self::Edge),
            "vertex" if non_exit + exit == 1 && array.len() == 5 => Ok(Self::Vertex {
                exit: exit == 1,
                edge_count: number(3)?,
                sector_count: number(4)?,
            }),
            "faces" if array.len() == 4 => {
                let faces = array[3]
                    .as_array()
                    .ok_or_else(invalid)?
                    .iter()
                    .map(|face| {
                        face.as_array()
                            .ok_or_else(invalid)?
                            .iter()
                            .map(|v| v.as_u64().map(|n| n as usize).ok_or_else(invalid))
                            .collect::<Result<Vec<_>, _>>()
                    })
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(Self::Faces {
                    non_exit_vertices: non_exit,
                    exit_vertices: exit,
                    faces,
                })
            }
            _ => Err(invalid()),
        }
    }

    pub fn to_json_string(&self) -> String {
        self.to_json().to_string()
    }

    pub fn from_json_str(text: &str) -> Result<Self, BoardError> {
        let value: Value = serde_json::from_str(text)
            .map_err(|_| BoardError::InvalidDescriptor(text.to_string()))?;
        Self::from_json(&value)
    }

    /// Canonical bytes hashed into the descriptor fingerprint.
    pub fn canonical_bytes(&self) -> Vec<u8> {
        self.to_json_string().into_bytes()
    }

    pub fn fingerprint(&self) -> HashValue {
        fingerprint::descriptor_fingerprint(&self.canonical_bytes())
    }

    pub(crate) fn parts(&self) -> Result<BoardParts, BoardError> {
        match self {
            Self::Edge => Ok(edge_parts()),
            Self::Vertex {
                exit,
                edge_count,
                sector_count,
            } => vertex_parts(*exit, *edge_count, *sector_count),
            Self::Faces {
                non_exit_vertices,
                exit_vertices,
                faces,
            } => faces_parts(*non_exit_vertices, *exit_vertices, faces),
        }
    }
}

impl std::fmt::Display for PatternBoardDescriptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.to_json_string())
    }
}

fn edge_parts() -> BoardParts {
    BoardParts {
        kinds: vec![VertexKind::Exit, VertexKind::Exit],
        edges: vec![[0, 1]],
        faces: (0..2)
            .map(|_| FacePart {
                is_exit: true,
                edges: vec![0],
                corners: Vec::new(),
            })
            .collect(),
    }
}

fn vertex_parts(exit: bool, edge_count: usize, sector_count: usize) -> Result<BoardParts, BoardError> {
    let invalid = |msg: &str| Err(BoardError::InvalidDescriptor(msg.to_string()));
    if edge_count == 0 || (!exit && edge_count < 2) {
        return invalid("vertex board needs at least one edge, two when non-exit");
    }
    // An exit vertex keeps at least one gap for its outside edges.
    let max_sectors = if exit { edge_count - 1 } else { edge_count };
    if sector_count > max_sectors {
        return invalid("too many sectors for vertex board");
    }

    let center = if exit { VertexKind::Exit } else { VertexKind::Interior };
    let mut kinds = vec![center];
    kinds.extend(std::iter::repeat(VertexKind::Open).take(edge_count));

    let edges = (0..edge_count).map(|i| [0, i + 1]).collect();
    let faces = (0..sector_count)
        .map(|k| {
            let (a, b) = (k, (k + 1) % edge_count);
            FacePart {
                is_exit: true,
                edges: vec![a, b],
                corners: vec![(0, a, b)],
            }
        })
        .collect();

    Ok(BoardParts { kinds, edges, faces })
}

fn faces_parts(non_exit: usize, exit: usize, faces: &[Vec<usize>]) -> Result<BoardParts, BoardError> {
    let invalid = |msg: String| BoardError::InvalidDescriptor(msg);
    let vertex_count = non_exit + exit;
    if faces.is_empty() {
        return Err(invalid("faces board without faces".to_string()));
    }

    let mut kinds = vec![VertexKind::Interior; non_exit];
    kinds.extend(std::iter::repeat(VertexKind::Exit).take(exit));

    let mut edges: Vec<[usize; 2]> = Vec::new();
    let mut lookup: HashMap<(usize, usize), usize> = HashMap::new();
    let mut parts = Vec::with_capacity(faces.len());

    for (index, face) in faces.iter().enumerate() {
        let n = face.len();
        if n < 3 {
            return Err(invalid(format!("face {} has fewer than three vertices", index)));
        }
        let mut sorted = face.clone();
        sorted.sort_unstable();
        sorted.dedup();
        if sorted.len() != n || sorted.iter().any(|&v| v >= vertex_count) {
            return Err(invalid(format!("face {} has invalid vertices", index)));
        }

        let face_edges: Vec<usize> = (0..n)
            .map(|i| {
                let (a, b) = (face[i], face[(i + 1) % n]);
                *lookup.entry((a.min(b), a.max(b))).or_insert_with(|| {
                    edges.push([a, b]);
                    edges.len() - 1
                })
            })
            .collect();
        let corners = (0..n)
            .map(|i| (face[i], face_edges[(i + n - 1) % n], face_edges[i]))
            .collect();
        parts.push(FacePart {
            is_exit: false,
            edges: face_edges,
            corners,
        });
    }

    let mut face_count = vec![0usize; edges.len()];
    for part in &parts {
        for &e in &part.edges {
            face_count[e] += 1;
        }
    }

    // Boundary edges meeting at an interior vertex border the same outside region.
    let mut parent: Vec<usize> = (0..edges.len()).collect();
    fn find(parent: &mut [usize], x: usize) -> usize {
        let mut root = x;
        while parent[root] != root {
            root = parent[root];
        }
        let mut node = x;
        while parent[node] != root {
            let next = parent[node];
            parent[node] = root;
            node = next;
        }
        root
    }

    let mut exit_corners = Vec::new();
    for v in 0..non_exit {
        let boundary: Vec<usize> = (0..edges.len())
            .filter(|&e| face_count[e] == 1 && edges[e].contains(&v))
            .collect();
        match boundary.as_slice() {
            [] => {}
            [a, b] => {
                let (ra, rb) = (find(&mut parent, *a), find(&mut parent, *b));
                parent[ra.max(rb)] = ra.min(rb);
                exit_corners.push((v, *a, *b));
            }
            _ => {
                return Err(invalid(format!(
                    "interior vertex {} has {} boundary edges",
                    v,
                    boundary.len()
                )))
            }
        }
    }

    let mut groups: BTreeMap<usize, Vec<usize>> = BTreeMap::new();
    for e in (0..edges.len()).filter(|&e| face_count[e] == 1) {
        let root = find(&mut parent, e);
        groups.entry(root).or_default().push(e);
    }
    for (root, group) in groups {
        let corners = exit_corners
            .iter()
            .copied()
            .filter(|&(_, a, _)| find(&mut parent, a) == root)
            .collect();
        parts.push(FacePart {
            is_exit: true,
            edges: group,
            corners,
        });
    }

    Ok(BoardParts {
        kinds,
        edges,
        faces: parts,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn json_forms() {
        assert_eq!(PatternBoardDescriptor::Edge.to_json_string(), r#"[0,2,"edge"]"#);
        let vertex = PatternBoardDescriptor::Vertex {
            exit: true,
            edge_count: 2,
            sector_count: 0,
        };
        assert_eq!(vertex.to_json_string(), r#"[0,1,"vertex",2,0]"#);
        let faces = PatternBoardDescriptor::Faces {
            non_exit_vertices: 0,
            exit_vertices: 3,
            faces: vec![vec![0, 1, 2]],
        };
        assert_eq!(faces.to_json_string(), r#"[0,3,"faces",[[0,1,2]]]"#);
    }

    #[test]
    fn json_round_trip() {
        for descriptor in [
            PatternBoardDescriptor::Edge,
            PatternBoardDescriptor::Vertex {
                exit: false,
                edge_count: 4,
                sector_count: 3,
            },
            PatternBoardDescriptor::Faces {
                non_exit_vertices: 1,
                exit_vertices: 6,
                faces: vec![vec![0, 1, 2, 3], vec![0, 3, 4, 5], vec![0, 5, 6, 1]],
            },
        ] {
            let text = descriptor.to_json_string();
            assert_eq!(PatternBoardDescriptor::from_json_str(&text).unwrap(), descriptor);
        }
    }

    #[test]
    fn rejects_malformed_json() {
        assert!(PatternBoardDescriptor::from_json_str("[1,2]").is_err());
        assert!(PatternBoardDescriptor::from_json_str(r#"[0,2,"spiral"]"#).is_err());
        assert!(PatternBoardDescriptor::from_json_str("not json").is_err());
    }

    #[test]
    fn derived_names() {
        let name = |exit, edge_count, sector_count| {
            PatternBoardDescriptor::Vertex {
                exit,
                edge_count,
                sector_count,
            }
            .derived_name()
            .unwrap()
        };
        assert_eq!(name(true, 2, 0), "vertex-2-exit-none");
        assert_eq!(name(false, 4, 2), "vertex-4-non-exit-2");
        assert_eq!(PatternBoardDescriptor::Edge.derived_name().as_deref(), Some("edge"));
        assert_eq!(
            PatternBoardDescriptor::from_derived_name("vertex-4-non-exit-2"),
            Some(PatternBoardDescriptor::Vertex {
                exit: false,
                edge_count: 4,
                sector_count: 2,
            })
        );
        assert_eq!(PatternBoardDescriptor::from_derived_name("vertex-3-exit-0"), None);
        assert_eq!(PatternBoardDescriptor::from_derived_name("square-1"), None);
    }

    #[test]
    fn vertex_board_limits() {
        let too_many = PatternBoardDescriptor::Vertex {
            exit: true,
            edge_count: 2,
            sector_count: 2,
        };
        assert!(too_many.parts().is_err());
    }
}
