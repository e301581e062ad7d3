// shape.rs — Port shapes with dynamic dimensions
//
// A shape is an ordered list of non-negative dimensions. `DYNAMIC_DIM` marks a
// dimension whose extent is only known at run time; it propagates through
// inference instead of failing it.
//
// Preconditions: none.
// Postconditions: `broadcast_merge` leaves `dst` untouched when it fails.
// Failure modes: `FromStr` rejects malformed dimension lists.
// Side effects: none.

use std::fmt;
use std::str::FromStr;

use serde::{Serialize, Serializer};

/// Sentinel for a dimension that is unknown until run time (`?` in text).
pub const DYNAMIC_DIM: usize = usize::MAX;

#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct Shape(Vec<usize>);

/// Serialized as a list of dimensions with `null` for a dynamic one.
impl Serialize for Shape {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_seq(self.0.iter().map(|&d| (d != DYNAMIC_DIM).then_some(d)))
    }
}

impl Shape {
    pub fn new(dims: Vec<usize>) -> Self {
        Shape(dims)
    }

    pub fn dims(&self) -> &[usize] {
        &self.0
    }

    pub fn rank(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Total element count, or `None` for dynamic shapes or on overflow.
    pub fn num_elements(&self) -> Option<usize> {
        self.0.iter().try_fold(1usize, |acc, &d| {
            if d == DYNAMIC_DIM {
                None
            } else {
                acc.checked_mul(d)
            }
        })
    }

    pub fn into_dims(self) -> Vec<usize> {
        self.0
    }
}

impl From<Vec<usize>> for Shape {
    fn from(dims: Vec<usize>) -> Self {
        Shape(dims)
    }
}

impl<const N: usize> From<[usize; N]> for Shape {
    fn from(dims: [usize; N]) -> Self {
        Shape(dims.to_vec())
    }
}

impl fmt::Display for Shape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[")?;
        for (i, &d) in self.0.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            if d == DYNAMIC_DIM {
                write!(f, "?")?;
            } else {
                write!(f, "{d}")?;
            }
        }
        write!(f, "]")
    }
}

/// Parse `2,3,?` (brackets and whitespace optional). The empty string is a
/// rank-0 shape.
impl FromStr for Shape {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let inner = s.trim().trim_start_matches('[').trim_end_matches(']').trim();
        if inner.is_empty() {
            return Ok(Shape::default());
        }
        inner
            .split(',')
            .map(|part| {
                let part = part.trim();
                if part == "?" {
                    Ok(DYNAMIC_DIM)
                } else {
                    part.parse::<usize>()
                        .map_err(|_| format!("invalid dimension '{part}' in shape '{s}'"))
                }
            })
            .collect::<Result<Vec<_>, _>>()
            .map(Shape)
    }
}

/// Merge two dimensions under numpy broadcasting rules.
///
/// Equal dims merge to themselves, a `1` yields to the other side (dynamic
/// included), and a dynamic dim yields to a static one (the run-time check
/// is deferred).
pub fn merge_dim(a: usize, b: usize) -> Option<usize> {
    if a == b || b == 1 {
        Some(a)
    } else if a == 1 || a == DYNAMIC_DIM {
        Some(b)
    } else if b == DYNAMIC_DIM {
        Some(a)
    } else {
        None
    }
}

/// Broadcast `src` into `dst` (right-aligned). Returns false and leaves `dst`
/// unchanged if the shapes are incompatible.
pub fn broadcast_merge(dst: &mut Shape, src: &Shape) -> bool {
    let rank = dst.rank().max(src.rank());
    let mut merged = vec![1usize; rank];
    for (i, slot) in merged.iter_mut().enumerate() {
        let from_end = rank - i;
        let a = dims_from_end(dst, from_end);
        let b = dims_from_end(src, from_end);
        match merge_dim(a, b) {
            Some(d) => *slot = d,
            None => return false,
        }
    }
    dst.0 = merged;
    true
}

fn dims_from_end(shape: &Shape, from_end: usize) -> usize {
    if from_end > shape.rank() {
        1
    } else {
        shape.0[shape.rank() - from_end]
    }
}
