//! Animation script generation from a pairing tree.
//!
//! The script is linear: every deletion first, then, in "after" order,
//! either an addition or a move of the next needed source block to the front
//! of what is left. A pairing whose blocks have children is followed by a
//! nested script for those children.

use crate::block::CodeBlock;
use crate::tracing_macros::debug;
use crate::pairing::{Address, CodeChange, ListOfChanges};
use core::fmt;
use facet::Facet;

/// One primitive step of the replay script.
#[derive(Clone, PartialEq, Eq, Facet)]
#[repr(u8)]
pub enum Animation {
    /// Remove before block `source`.
    Deleting(usize),

    /// Insert after block `dest` at the end of the settled text.
    Adding(usize),

    /// Bring before block `source` to the front of the unsettled pool.
    /// `execute` is false when it is already there.
    MovingUp {
        /// Before-index of the block.
        source: usize,
        /// Whether a visible move happens.
        execute: bool,
    },

    /// Rewrite before block `source` into its paired after block.
    Changing {
        /// Before-index of the block.
        source: usize,
        /// Whether the text actually differs.
        execute: bool,
    },

    /// Animate the interior of before block `source`.
    Nested {
        /// Before-index of the container.
        source: usize,
        /// Script for the container's children.
        #[facet(recursive_type)]
        inner: Vec<Animation>,
    },
}

impl fmt::Display for Animation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Animation::Deleting(i) => write!(f, "Delete(a:{i})"),
            Animation::Adding(j) => write!(f, "Add(b:{j})"),
            Animation::MovingUp { source, execute } => {
                let suffix = if *execute { "" } else { " in place" };
                write!(f, "MoveUp(a:{source}{suffix})")
            }
            Animation::Changing { source, execute } => {
                let suffix = if *execute { "" } else { " unchanged" };
                write!(f, "Change(a:{source}{suffix})")
            }
            Animation::Nested { source, inner } => {
                write!(f, "Nested(a:{source} [")?;
                for (n, op) in inner.iter().enumerate() {
                    if n > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{op}")?;
                }
                write!(f, "])")
            }
        }
    }
}

impl fmt::Debug for Animation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Reuse Display implementation for Debug
        fmt::Display::fmt(self, f)
    }
}

/// Wrapper for collecting animations with automatic tracing.
struct Ops {
    inner: Vec<Animation>,
}

impl Ops {
    fn new() -> Self {
        Self { inner: Vec::new() }
    }

    fn push(&mut self, op: Animation) {
        debug!(%op, "emit");
        self.inner.push(op);
    }

    fn into_inner(self) -> Vec<Animation> {
        self.inner
    }
}

/// Build the animation script for one level of a pairing tree.
pub fn plan(input_destinations: &[CodeChange], output_sources: &[CodeChange]) -> Vec<Animation> {
    plan_level(input_destinations, output_sources, None)
}

/// Build the animation script for a whole [`ListOfChanges`].
pub fn plan_changes(changes: &ListOfChanges) -> Vec<Animation> {
    plan(&changes.input_destinations, &changes.output_sources)
}

/// Like [`plan_changes`], but with the blocks at hand, so that a replay ends
/// on the exact "after" text.
///
/// A paired leaf whose text differs gets a `Changing` step after its move. A
/// pairing where only one side has children gets an empty `Nested` step,
/// which settles the block as its "after" version.
pub fn plan_with_blocks(
    before: &[CodeBlock],
    after: &[CodeBlock],
    changes: &ListOfChanges,
) -> Vec<Animation> {
    plan_level(
        &changes.input_destinations,
        &changes.output_sources,
        Some((before, after)),
    )
}

fn plan_level(
    inputs: &[CodeChange],
    outputs: &[CodeChange],
    blocks: Option<(&[CodeBlock], &[CodeBlock])>,
) -> Vec<Animation> {
    let mut ops = Ops::new();

    for (i, change) in inputs.iter().enumerate() {
        if change.is_deleted() {
            ops.push(Animation::Deleting(i));
        }
    }

    let mut remaining: Vec<usize> = inputs
        .iter()
        .enumerate()
        .filter(|(_, c)| !c.is_deleted())
        .map(|(i, _)| i)
        .collect();

    for (j, output) in outputs.iter().enumerate() {
        let source = match output.address {
            Address::Index(s) => s,
            Address::Added => {
                ops.push(Animation::Adding(j));
                continue;
            }
            Address::Deleted => {
                debug!(after = j, "deleted sentinel on the after side, skipping");
                continue;
            }
        };

        let execute = remaining.first() != Some(&source);
        if let Some(pos) = remaining.iter().position(|&r| r == source) {
            remaining.remove(pos);
        }
        ops.push(Animation::MovingUp { source, execute });

        let inner_inputs: &[CodeChange] = inputs
            .get(source)
            .map_or(&[][..], |c| c.children.as_slice());
        let inner_outputs: &[CodeChange] = &output.children;
        let paired_blocks = blocks.and_then(|(before, after)| before.get(source).zip(after.get(j)));

        if !inner_inputs.is_empty() || !inner_outputs.is_empty() {
            let inner_blocks = paired_blocks.map(|(a, b)| (a.children(), b.children()));
            let inner = plan_level(inner_inputs, inner_outputs, inner_blocks);
            ops.push(Animation::Nested { source, inner });
        } else if let Some((a, b)) = paired_blocks {
            if !a.is_leaf() || !b.is_leaf() {
                // Only one side has children, so nothing was matched inside.
                ops.push(Animation::Nested {
                    source,
                    inner: Vec::new(),
                });
            } else if a.text_content() != b.text_content() {
                ops.push(Animation::Changing {
                    source,
                    execute: true,
                });
            }
        }
    }

    debug!(total_ops = ops.inner.len(), "plan_level done");
    ops.into_inner()
}

/// Count the top-level steps of a script that consume an after-index
/// (`Adding` and `MovingUp`).
pub fn after_steps(script: &[Animation]) -> usize {
    script
        .iter()
        .filter(|op| matches!(op, Animation::Adding(_) | Animation::MovingUp { .. }))
        .count()
}
