//! Graph and partition file I/O.
//!
//! The graph format is the DIMACS-like adjacency text format: a header line
//! `n m [fmt]`, then one line per vertex listing (optionally) its weight and
//! its neighbour list, 1-indexed, with per-edge weights when `fmt` says so.
//! `fmt` is `0`/absent (no weights), `1` (edge weights), `10` (node
//! weights), or `11` (both). Comment lines start with `%`. Self-loops are
//! dropped on read; negative weights and degree totals that disagree with
//! the header are rejected.

use std::fs::File;
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::Path;

use crate::error::PartitionError;
use crate::graph::{BlockId, CsrGraph, EdgeWeight, GraphBuilder, NodeId, NodeWeight};

/// Read a weighted graph from `path`.
pub fn read_graph(path: impl AsRef<Path>) -> Result<CsrGraph, PartitionError> {
    let path = path.as_ref();
    let path_str = path.display().to_string();
    let file = File::open(path).map_err(|source| PartitionError::GraphIo {
        path: path_str.clone(),
        source,
    })?;
    let reader = BufReader::new(file);

    let mut lines = reader.lines().enumerate();

    let (header_no, header) = loop {
        match lines.next() {
            Some((no, line)) => {
                let line = line.map_err(|source| PartitionError::GraphIo {
                    path: path_str.clone(),
                    source,
                })?;
                if line.starts_with('%') || line.trim().is_empty() {
                    continue;
                }
                break (no, line);
            }
            None => {
                return Err(PartitionError::malformed_graph(
                    &path_str,
                    0,
                    "missing header line",
                ))
            }
        }
    };

    let mut parts = header.split_whitespace();
    let n: usize = parse_field(&mut parts, &path_str, header_no + 1, "node count")?;
    let m: usize = parse_field(&mut parts, &path_str, header_no + 1, "edge count")?;
    let fmt: u32 = match parts.next() {
        Some(tok) => tok.parse().map_err(|_| {
            PartitionError::malformed_graph(&path_str, header_no + 1, "unreadable format code")
        })?,
        None => 0,
    };
    let has_edge_weights = fmt % 10 == 1;
    let has_node_weights = fmt / 10 == 1;

    let mut builder = GraphBuilder::new(n, 2 * m);
    let mut vertex = 0usize;
    let mut self_loops = 0usize;

    for (no, line) in lines {
        let line = line.map_err(|source| PartitionError::GraphIo {
            path: path_str.clone(),
            source,
        })?;
        if line.starts_with('%') {
            continue;
        }
        if vertex == n {
            if line.trim().is_empty() {
                continue;
            }
            return Err(PartitionError::malformed_graph(
                &path_str,
                no + 1,
                format!("more than {n} vertex lines"),
            ));
        }

        let mut tokens = line.split_whitespace();
        let weight: NodeWeight = if has_node_weights {
            let w = parse_field(&mut tokens, &path_str, no + 1, "node weight")?;
            if w < 0 {
                return Err(PartitionError::malformed_graph(
                    &path_str,
                    no + 1,
                    "negative node weight",
                ));
            }
            w
        } else {
            1
        };
        let node = builder.new_node(weight);

        while let Some(tok) = tokens.next() {
            let raw: usize = tok.parse().map_err(|_| {
                PartitionError::malformed_graph(&path_str, no + 1, "unreadable neighbour id")
            })?;
            if raw == 0 || raw > n {
                return Err(PartitionError::malformed_graph(
                    &path_str,
                    no + 1,
                    format!("neighbour id {raw} out of range 1..={n}"),
                ));
            }
            let target = (raw - 1) as NodeId;
            let w: EdgeWeight = if has_edge_weights {
                let w = parse_field(&mut tokens, &path_str, no + 1, "edge weight")?;
                if w < 0 {
                    return Err(PartitionError::malformed_graph(
                        &path_str,
                        no + 1,
                        "negative edge weight",
                    ));
                }
                w
            } else {
                1
            };
            if target == node {
                self_loops += 1;
                continue;
            }
            builder.new_edge(target, w)?;
        }
        vertex += 1;
    }

    if vertex != n {
        return Err(PartitionError::malformed_graph(
            &path_str,
            0,
            format!("header promises {n} vertices, file has {vertex}"),
        ));
    }
    if builder.edges_built() + self_loops != 2 * m {
        return Err(PartitionError::malformed_graph(
            &path_str,
            0,
            format!(
                "header promises {} arcs, adjacency lists sum to {}",
                2 * m,
                builder.edges_built() + self_loops
            ),
        ));
    }
    if self_loops > 0 {
        log::warn!("dropped {self_loops} self-loop(s) while reading {path_str}");
    }

    builder.finish()
}

/// Write one block id per line, vertex order.
pub fn write_partition(
    graph: &CsrGraph,
    path: impl AsRef<Path>,
) -> Result<(), PartitionError> {
    let path_str = path.as_ref().display().to_string();
    let file = File::create(path.as_ref()).map_err(|source| PartitionError::OutputIo {
        path: path_str.clone(),
        source,
    })?;
    let mut out = BufWriter::new(file);
    for v in 0..graph.n() {
        writeln!(out, "{}", graph.block(v as NodeId)).map_err(|source| {
            PartitionError::OutputIo {
                path: path_str.clone(),
                source,
            }
        })?;
    }
    out.flush().map_err(|source| PartitionError::OutputIo {
        path: path_str,
        source,
    })
}

/// Read a partition previously written by [`write_partition`] onto `graph`.
pub fn read_partition(
    graph: &CsrGraph,
    k: u32,
    path: impl AsRef<Path>,
) -> Result<(), PartitionError> {
    let path_str = path.as_ref().display().to_string();
    let file = File::open(path.as_ref()).map_err(|source| PartitionError::GraphIo {
        path: path_str.clone(),
        source,
    })?;
    let reader = BufReader::new(file);

    let mut vertex = 0usize;
    for (no, line) in reader.lines().enumerate() {
        let line = line.map_err(|source| PartitionError::GraphIo {
            path: path_str.clone(),
            source,
        })?;
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }
        if vertex == graph.n() {
            return Err(PartitionError::MalformedPartition {
                path: path_str,
                line: no + 1,
                reason: format!("more than {} labels", graph.n()),
            });
        }
        let block: BlockId = trimmed.parse().map_err(|_| PartitionError::MalformedPartition {
            path: path_str.clone(),
            line: no + 1,
            reason: "unreadable block id".into(),
        })?;
        if block >= k {
            return Err(PartitionError::MalformedPartition {
                path: path_str,
                line: no + 1,
                reason: format!("block id {block} out of range 0..{k}"),
            });
        }
        graph.set_block(vertex as NodeId, block);
        vertex += 1;
    }
    if vertex != graph.n() {
        return Err(PartitionError::MalformedPartition {
            path: path_str,
            line: 0,
            reason: format!("{} labels for {} vertices", vertex, graph.n()),
        });
    }
    Ok(())
}

fn parse_field<T: std::str::FromStr>(
    tokens: &mut std::str::SplitWhitespace<'_>,
    path: &str,
    line: usize,
    what: &str,
) -> Result<T, PartitionError> {
    tokens
        .next()
        .ok_or_else(|| PartitionError::malformed_graph(path, line, format!("missing {what}")))?
        .parse()
        .map_err(|_| PartitionError::malformed_graph(path, line, format!("unreadable {what}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write as _;

    fn write_tmp(content: &str) -> std::path::PathBuf {
        let mut path = std::env::temp_dir();
        path.push(format!(
            "millcut-io-test-{}-{:x}.graph",
            std::process::id(),
            content.len() as u64 ^ content.as_ptr() as u64
        ));
        let mut f = File::create(&path).unwrap();
        f.write_all(content.as_bytes()).unwrap();
        path
    }

    #[test]
    fn reads_unweighted_triangle() {
        let path = write_tmp("% a triangle\n3 3\n2 3\n1 3\n1 2\n");
        let g = read_graph(&path).unwrap();
        std::fs::remove_file(&path).ok();
        assert_eq!(g.n(), 3);
        assert_eq!(g.m(), 6);
        assert_eq!(g.node_weight(0), 1);
        assert_eq!(g.adjacent(0).collect::<Vec<_>>(), vec![(1, 1), (2, 1)]);
    }

    #[test]
    fn reads_fully_weighted_graph() {
        let path = write_tmp("2 1 11\n5 2 7\n3 1 7\n");
        let g = read_graph(&path).unwrap();
        std::fs::remove_file(&path).ok();
        assert_eq!(g.node_weight(0), 5);
        assert_eq!(g.node_weight(1), 3);
        assert_eq!(g.adjacent(0).collect::<Vec<_>>(), vec![(1, 7)]);
    }

    #[test]
    fn rejects_degree_mismatch() {
        let path = write_tmp("3 3\n2\n1\n\n");
        let err = read_graph(&path);
        std::fs::remove_file(&path).ok();
        assert!(matches!(err, Err(PartitionError::MalformedGraph { .. })));
    }

    #[test]
    fn rejects_out_of_range_neighbour() {
        let path = write_tmp("2 1\n2\n5\n");
        let err = read_graph(&path);
        std::fs::remove_file(&path).ok();
        assert!(matches!(err, Err(PartitionError::MalformedGraph { .. })));
    }

    #[test]
    fn partition_round_trip() {
        let gpath = write_tmp("3 2\n2\n1 3\n2\n");
        let g = read_graph(&gpath).unwrap();
        g.set_block(0, 0);
        g.set_block(1, 1);
        g.set_block(2, 1);
        let mut ppath = std::env::temp_dir();
        ppath.push(format!("millcut-io-test-part-{}", std::process::id()));
        write_partition(&g, &ppath).unwrap();
        g.set_block(1, 0);
        read_partition(&g, 2, &ppath).unwrap();
        std::fs::remove_file(&gpath).ok();
        std::fs::remove_file(&ppath).ok();
        assert_eq!(g.block(1), 1);
    }
}
