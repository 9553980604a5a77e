//! Binary persistence for scale stacks and level graphs.
//!
//! Both formats are little-endian and fully count-prefixed, so a reader
//! can validate every section against its header before trusting it.
//!
//! Scale stack layout:
//!
//! ```text
//! u64 point_count
//! u64 level_count
//! i32 labels, point-major: all levels of sample 0, then sample 1, ...
//! u64 scale_count (must equal level_count)
//! f64 scales, finest first
//! ```
//!
//! Level graph layout:
//!
//! ```text
//! u64 level_count
//! u64 node_count per level
//! per mid-level: u64 edge_count, then (u32 source, u32 target, f64 weight)
//! u64 attribute_count
//! per attribute: u64 name_len, name bytes, then f64 per node per level
//! ```
//!
//! Stacks are persisted after [`crate::Labeling::make_full`]; a level
//! with trailing empty labels loses them on a round trip because label
//! counts are rebuilt from the stored label values.

use std::io::{Read, Write};

use tracing::debug;

use crate::error::{ScaleError, ScaleResult};
use crate::labeling::{Labeling, UNLABELED};
use crate::level_graph::LevelGraph;
use crate::scale_stack::ScaleStack;

fn read_u32<R: Read>(reader: &mut R) -> ScaleResult<u32> {
    let mut buf = [0u8; 4];
    reader.read_exact(&mut buf)?;
    Ok(u32::from_le_bytes(buf))
}

fn read_u64<R: Read>(reader: &mut R) -> ScaleResult<u64> {
    let mut buf = [0u8; 8];
    reader.read_exact(&mut buf)?;
    Ok(u64::from_le_bytes(buf))
}

fn read_i32<R: Read>(reader: &mut R) -> ScaleResult<i32> {
    let mut buf = [0u8; 4];
    reader.read_exact(&mut buf)?;
    Ok(i32::from_le_bytes(buf))
}

fn read_f64<R: Read>(reader: &mut R) -> ScaleResult<f64> {
    let mut buf = [0u8; 8];
    reader.read_exact(&mut buf)?;
    Ok(f64::from_le_bytes(buf))
}

/// Writes a scale stack in the binary layout above.
///
/// # Errors
///
/// Returns an error on I/O failure.
#[allow(clippy::cast_possible_truncation)]
pub fn write_scale_stack<W: Write>(writer: &mut W, stack: &ScaleStack) -> ScaleResult<()> {
    let point_count = stack.sample_count();
    let level_count = stack.level_count();
    writer.write_all(&(point_count as u64).to_le_bytes())?;
    writer.write_all(&(level_count as u64).to_le_bytes())?;

    for sample in 0..point_count as u32 {
        for level in 0..level_count {
            writer.write_all(&stack.labeling(level).label_of(sample).to_le_bytes())?;
        }
    }

    writer.write_all(&(level_count as u64).to_le_bytes())?;
    for &scale in stack.scales() {
        writer.write_all(&scale.to_le_bytes())?;
    }

    debug!(point_count, level_count, "scale stack written");
    Ok(())
}

/// Reads a scale stack written by [`write_scale_stack`].
///
/// When `expected_points` is given, the header's point count must match
/// it; pass the size of the companion point set.
///
/// # Errors
///
/// Returns an error on I/O failure, a point or scale count mismatch, a
/// label below the unlabeled sentinel, or non-increasing scales.
#[allow(clippy::cast_possible_truncation)]
pub fn read_scale_stack<R: Read>(
    reader: &mut R,
    expected_points: Option<usize>,
) -> ScaleResult<ScaleStack> {
    let point_count = read_u64(reader)? as usize;
    let level_count = read_u64(reader)? as usize;
    if let Some(expected) = expected_points {
        if point_count != expected {
            return Err(ScaleError::PointCountMismatch {
                expected,
                actual: point_count,
            });
        }
    }

    // Counts are untrusted until the payload backs them up: every
    // allocation below grows only after a successful read, so a corrupt
    // header claiming huge counts fails at the first missing byte.
    let mut labels: Vec<Vec<i32>> = Vec::new();
    for sample in 0..point_count {
        for level in 0..level_count {
            let label = read_i32(reader)?;
            if label < UNLABELED {
                return Err(ScaleError::InvalidLabel { sample, label });
            }
            if sample == 0 {
                labels.push(Vec::new());
            }
            labels[level].push(label);
        }
    }

    let scale_count = read_u64(reader)? as usize;
    if scale_count != level_count {
        return Err(ScaleError::ScaleCountMismatch {
            header: level_count,
            trailer: scale_count,
        });
    }

    let mut stack = ScaleStack::new();
    let mut labels = labels.into_iter();
    for _ in 0..level_count {
        let scale = read_f64(reader)?;
        let level_labels = labels.next().unwrap_or_default();
        stack.push(scale, Labeling::from_labels(level_labels)?)?;
    }

    debug!(point_count, level_count, "scale stack read");
    Ok(stack)
}

/// Writes a level graph in the binary layout above. Attribute columns
/// are written in sorted name order, so output is deterministic.
///
/// # Errors
///
/// Returns an error on I/O failure.
#[allow(clippy::cast_possible_truncation)]
pub fn write_level_graph<W: Write>(writer: &mut W, graph: &LevelGraph) -> ScaleResult<()> {
    let level_count = graph.level_count();
    writer.write_all(&(level_count as u64).to_le_bytes())?;
    for level in 0..level_count {
        writer.write_all(&(graph.node_count(level) as u64).to_le_bytes())?;
    }

    for mid in 0..level_count.saturating_sub(1) {
        let edge_count = graph.edge_count(mid);
        writer.write_all(&(edge_count as u64).to_le_bytes())?;
        for id in 0..edge_count as u32 {
            let edge = graph.edge(mid, id);
            writer.write_all(&edge.source.to_le_bytes())?;
            writer.write_all(&edge.target.to_le_bytes())?;
            writer.write_all(&edge.weight.to_le_bytes())?;
        }
    }

    let names = graph.node_attribute_names();
    writer.write_all(&(names.len() as u64).to_le_bytes())?;
    for name in names {
        writer.write_all(&(name.len() as u64).to_le_bytes())?;
        writer.write_all(name.as_bytes())?;
        for level in 0..level_count {
            let column = graph.node_attribute(name, level).unwrap_or(&[]);
            for &value in column {
                writer.write_all(&value.to_le_bytes())?;
            }
        }
    }

    debug!(level_count, "level graph written");
    Ok(())
}

/// Reads a level graph written by [`write_level_graph`].
///
/// # Errors
///
/// Returns an error on I/O failure or when an edge endpoint or an
/// attribute name fails validation.
#[allow(clippy::cast_possible_truncation)]
pub fn read_level_graph<R: Read>(reader: &mut R) -> ScaleResult<LevelGraph> {
    let level_count = read_u64(reader)? as usize;
    let mut graph = LevelGraph::new();
    for _ in 0..level_count {
        let level = graph.add_level();
        let node_count = read_u64(reader)? as usize;
        for _ in 0..node_count {
            graph.add_node(level);
        }
    }

    for mid in 0..level_count.saturating_sub(1) {
        let edge_count = read_u64(reader)? as usize;
        for _ in 0..edge_count {
            let source = read_u32(reader)?;
            let target = read_u32(reader)?;
            let weight = read_f64(reader)?;
            if source as usize >= graph.node_count(mid + 1)
                || target as usize >= graph.node_count(mid)
            {
                return Err(ScaleError::CorruptLevelGraph {
                    reason: format!(
                        "edge {source} -> {target} leaves mid-level {mid} \
                         ({} coarse, {} fine nodes)",
                        graph.node_count(mid + 1),
                        graph.node_count(mid)
                    ),
                });
            }
            graph.add_edge(mid, source, target, weight);
        }
    }

    let attribute_count = read_u64(reader)? as usize;
    for _ in 0..attribute_count {
        // The name buffer grows with the bytes actually present rather
        // than trusting the declared length up front.
        let name_len = read_u64(reader)?;
        let mut name_buf = Vec::new();
        reader.by_ref().take(name_len).read_to_end(&mut name_buf)?;
        if (name_buf.len() as u64) < name_len {
            return Err(ScaleError::Io(std::io::ErrorKind::UnexpectedEof.into()));
        }
        let name = String::from_utf8(name_buf).map_err(|_| ScaleError::CorruptLevelGraph {
            reason: "attribute name is not valid UTF-8".to_owned(),
        })?;
        for level in 0..level_count {
            let mut column = Vec::with_capacity(graph.node_count(level));
            for _ in 0..graph.node_count(level) {
                column.push(read_f64(reader)?);
            }
            graph.set_node_attribute(&name, level, column);
        }
    }

    debug!(level_count, "level graph read");
    Ok(graph)
}
