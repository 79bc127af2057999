//! # codeshift-align
//!
//! Character-level Levenshtein alignment with edit script reconstruction.
//!
//! Renderers use this to animate a token that is rewritten in place: the
//! alignment says which characters survive, which are swapped, and which
//! appear or disappear.
//!
//! ## Algorithm
//!
//! A classic `(|before| + 1) × (|after| + 1)` dynamic programming matrix with
//! unit cost for insertion, deletion and substitution. The edit script is
//! recovered by walking the matrix back from the bottom-right cell. When more
//! than one step is optimal, the walk prefers, in order: substitution,
//! insertion, deletion, match.
//!
//! ## Usage
//!
//! ```
//! use codeshift_align::{AlignOp, align_str};
//!
//! let ops = align_str("cat", "hat");
//! assert_eq!(
//!     ops,
//!     vec![AlignOp::Substitute('c', 'h'), AlignOp::Match('a'), AlignOp::Match('t')]
//! );
//! ```

#![warn(missing_docs)]
#![warn(clippy::std_instead_of_core)]

mod tracing_macros;

use core::fmt;
use tracing_macros::trace;

/// One step of an alignment between a `before` and an `after` sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AlignOp {
    /// The character is kept.
    Match(char),
    /// The first character (before) is replaced by the second (after).
    Substitute(char, char),
    /// The character appears only in `after`.
    Insert(char),
    /// The character appears only in `before`.
    Delete(char),
}

impl AlignOp {
    /// The character this step consumes from `before`, if any.
    pub fn before(&self) -> Option<char> {
        match *self {
            AlignOp::Match(c) | AlignOp::Delete(c) | AlignOp::Substitute(c, _) => Some(c),
            AlignOp::Insert(_) => None,
        }
    }

    /// The character this step produces in `after`, if any.
    pub fn after(&self) -> Option<char> {
        match *self {
            AlignOp::Match(c) | AlignOp::Insert(c) | AlignOp::Substitute(_, c) => Some(c),
            AlignOp::Delete(_) => None,
        }
    }

    /// Whether this step costs anything (everything but a match does).
    pub fn is_edit(&self) -> bool {
        !matches!(self, AlignOp::Match(_))
    }
}

impl fmt::Display for AlignOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AlignOp::Match(c) => write!(f, "={c:?}"),
            AlignOp::Substitute(a, b) => write!(f, "{a:?}→{b:?}"),
            AlignOp::Insert(c) => write!(f, "+{c:?}"),
            AlignOp::Delete(c) => write!(f, "-{c:?}"),
        }
    }
}

/// Row-major cost matrix. Row `i` is the first `i` characters of `before`,
/// column `j` the first `j` characters of `after`.
struct CostMatrix {
    cols: usize,
    cells: Vec<usize>,
}

impl CostMatrix {
    fn build(before: &[char], after: &[char]) -> Self {
        let rows = before.len() + 1;
        let cols = after.len() + 1;
        let mut cells = vec![0; rows * cols];

        for (j, cell) in cells.iter_mut().take(cols).enumerate() {
            *cell = j;
        }
        for i in 0..rows {
            cells[i * cols] = i;
        }

        for i in 1..rows {
            for j in 1..cols {
                let diagonal = cells[(i - 1) * cols + (j - 1)];
                cells[i * cols + j] = if before[i - 1] == after[j - 1] {
                    diagonal
                } else {
                    let left = cells[i * cols + (j - 1)];
                    let top = cells[(i - 1) * cols + j];
                    1 + diagonal.min(left).min(top)
                };
            }
        }

        Self { cols, cells }
    }

    #[inline(always)]
    fn get(&self, i: usize, j: usize) -> usize {
        self.cells[i * self.cols + j]
    }
}

/// Align two character sequences.
///
/// The returned script runs from the **end** of both inputs towards the
/// start. Reverse it (or call [`align_forward`]) for start-to-end order.
pub fn align(before: &[char], after: &[char]) -> Vec<AlignOp> {
    let matrix = CostMatrix::build(before, after);
    let mut ops = Vec::with_capacity(before.len().max(after.len()));

    let (mut i, mut j) = (before.len(), after.len());
    while i > 0 || j > 0 {
        if i == 0 {
            ops.push(AlignOp::Insert(after[j - 1]));
            j -= 1;
            continue;
        }
        if j == 0 {
            ops.push(AlignOp::Delete(before[i - 1]));
            i -= 1;
            continue;
        }

        let current = matrix.get(i, j);
        let diagonal = matrix.get(i - 1, j - 1);
        let left = matrix.get(i, j - 1);
        let top = matrix.get(i - 1, j);

        if diagonal + 1 == current {
            ops.push(AlignOp::Substitute(before[i - 1], after[j - 1]));
            i -= 1;
            j -= 1;
        } else if left + 1 == current {
            ops.push(AlignOp::Insert(after[j - 1]));
            j -= 1;
        } else if top + 1 == current {
            ops.push(AlignOp::Delete(before[i - 1]));
            i -= 1;
        } else {
            // Only reachable when diagonal == current, i.e. the characters are equal.
            ops.push(AlignOp::Match(before[i - 1]));
            i -= 1;
            j -= 1;
        }
    }

    trace!(
        before_len = before.len(),
        after_len = after.len(),
        cost = matrix.get(before.len(), after.len()),
        steps = ops.len(),
        "align done"
    );
    ops
}

/// Like [`align`], but in start-to-end order.
pub fn align_forward(before: &[char], after: &[char]) -> Vec<AlignOp> {
    let mut ops = align(before, after);
    ops.reverse();
    ops
}

/// Align two strings character by character, in start-to-end order.
pub fn align_str(before: &str, after: &str) -> Vec<AlignOp> {
    let before: Vec<char> = before.chars().collect();
    let after: Vec<char> = after.chars().collect();
    align_forward(&before, &after)
}

/// The Levenshtein distance between two character sequences.
pub fn distance(before: &[char], after: &[char]) -> usize {
    CostMatrix::build(before, after).get(before.len(), after.len())
}

/// Rebuild the `before` side of a start-to-end script.
pub fn reconstruct_before(ops: &[AlignOp]) -> String {
    ops.iter().filter_map(AlignOp::before).collect()
}

/// Rebuild the `after` side of a start-to-end script.
pub fn reconstruct_after(ops: &[AlignOp]) -> String {
    ops.iter().filter_map(AlignOp::after).collect()
}
