/*!
 * Trace Format
 *
 * One request per line:
 *
 * ```text
 * # comment
 * alloc <id> <size>
 * free <id>
 * ```
 *
 * Ids name allocations; an id may be reused once its allocation is freed.
 */

use crate::core::{KmaError, KmaResult, Size};
use ahash::AHashSet;
use std::path::Path;

pub type RequestId = u64;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TraceOp {
    Alloc { id: RequestId, size: Size },
    Free { id: RequestId },
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Trace {
    ops: Vec<TraceOp>,
}

impl Trace {
    pub fn new(ops: Vec<TraceOp>) -> Self {
        Self { ops }
    }

    /// Parse and check that every free names a live id
    pub fn parse(text: &str) -> KmaResult<Self> {
        let mut ops = Vec::new();
        let mut live = AHashSet::new();

        for (index, raw) in text.lines().enumerate() {
            let line = index + 1;
            let content = raw.split('#').next().unwrap_or("").trim();
            if content.is_empty() {
                continue;
            }

            let fields: Vec<&str> = content.split_whitespace().collect();
            let op = match fields.as_slice() {
                [verb, id, size] if verb.eq_ignore_ascii_case("alloc") => TraceOp::Alloc {
                    id: parse_field(line, "id", id)?,
                    size: parse_field(line, "size", size)?,
                },
                [verb, id] if verb.eq_ignore_ascii_case("free") => TraceOp::Free {
                    id: parse_field(line, "id", id)?,
                },
                _ => {
                    return Err(KmaError::Trace {
                        line,
                        reason: format!("expected 'alloc <id> <size>' or 'free <id>', got '{}'", content),
                    })
                }
            };

            match op {
                TraceOp::Alloc { id, .. } if !live.insert(id) => {
                    return Err(KmaError::Trace {
                        line,
                        reason: format!("id {} is already live", id),
                    });
                }
                TraceOp::Free { id } if !live.remove(&id) => {
                    return Err(KmaError::Trace {
                        line,
                        reason: format!("id {} is not live", id),
                    });
                }
                _ => {}
            }
            ops.push(op);
        }
        Ok(Self { ops })
    }

    pub fn from_file(path: impl AsRef<Path>) -> KmaResult<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|e| KmaError::Trace {
            line: 0,
            reason: format!("cannot read {}: {}", path.display(), e),
        })?;
        Self::parse(&text)
    }

    pub fn ops(&self) -> &[TraceOp] {
        &self.ops
    }

    pub fn len(&self) -> usize {
        self.ops.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }

    /// Render back to the text format
    pub fn to_text(&self) -> String {
        self.ops
            .iter()
            .map(|op| match op {
                TraceOp::Alloc { id, size } => format!("alloc {} {}\n", id, size),
                TraceOp::Free { id } => format!("free {}\n", id),
            })
            .collect()
    }
}

fn parse_field<T: std::str::FromStr>(line: usize, name: &str, value: &str) -> KmaResult<T> {
    value.parse().map_err(|_| KmaError::Trace {
        line,
        reason: format!("invalid {} '{}'", name, value),
    })
}
