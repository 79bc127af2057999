//! The pairing tree produced by the matcher.
//!
//! For one list-of-siblings comparison, every "before" block gets a
//! [`CodeChange`] saying where it went, and every "after" block gets one
//! saying where it came from. Paired containers carry the same thing for
//! their children, recursively.

use crate::block::CodeBlock;
use facet::Facet;

/// Where a block went (seen from the before side) or came from (seen from
/// the after side).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Facet)]
#[repr(u8)]
pub enum Address {
    /// Index of the paired block in the other version.
    Index(usize),
    /// Before-side only: the block has no destination.
    Deleted,
    /// After-side only: the block has no source.
    Added,
}

impl Address {
    /// The paired index, if any.
    pub fn index(self) -> Option<usize> {
        match self {
            Address::Index(i) => Some(i),
            Address::Deleted | Address::Added => None,
        }
    }
}

/// A locally introduced identifier that changed name between versions.
#[derive(Debug, Clone, PartialEq, Eq, Facet)]
pub struct Rename {
    /// Name in the before version.
    pub from: String,
    /// Name in the after version.
    pub to: String,
}

/// One node of the pairing tree.
#[derive(Debug, Clone, PartialEq, Eq, Facet)]
pub struct CodeChange {
    /// Where the block went or came from.
    pub address: Address,
    /// Pairings of this block's own children, ordered by this side's child
    /// index. Only populated when both paired blocks have children.
    #[facet(recursive_type)]
    pub children: Vec<CodeChange>,
    /// Best-effort identifier renames; not exhaustive.
    pub renames: Vec<Rename>,
}

impl CodeChange {
    /// A change pointing at `index` on the other side.
    pub fn paired(index: usize) -> Self {
        Self {
            address: Address::Index(index),
            children: Vec::new(),
            renames: Vec::new(),
        }
    }

    /// A before-side change with no destination.
    pub fn deleted() -> Self {
        Self {
            address: Address::Deleted,
            children: Vec::new(),
            renames: Vec::new(),
        }
    }

    /// An after-side change with no source.
    pub fn added() -> Self {
        Self {
            address: Address::Added,
            children: Vec::new(),
            renames: Vec::new(),
        }
    }

    /// Attach nested pairings.
    pub fn with_children(mut self, children: Vec<CodeChange>) -> Self {
        self.children = children;
        self
    }

    /// Whether the block was removed.
    pub fn is_deleted(&self) -> bool {
        self.address == Address::Deleted
    }

    /// Whether the block is new.
    pub fn is_added(&self) -> bool {
        self.address == Address::Added
    }
}

/// The matcher's result for one list-of-siblings comparison.
#[derive(Debug, Clone, PartialEq, Eq, Facet)]
pub struct ListOfChanges {
    /// One entry per before-index.
    pub input_destinations: Vec<CodeChange>,
    /// One entry per after-index.
    pub output_sources: Vec<CodeChange>,
    /// Heuristic dissimilarity; lower is more similar. Not a minimal edit
    /// distance.
    pub distance: usize,
}

/// Errors found when checking a pairing tree for consistency.
#[derive(Facet, Debug)]
#[facet(derive(Error))]
#[repr(u8)]
pub enum PairingError {
    /// {side} side at {path} has {changes} changes for {blocks} blocks
    LengthMismatch {
        path: String,
        side: &'static str,
        changes: usize,
        blocks: usize,
    },

    /// {side} block {index} at {path} points to index {target}, but the other side only has {len}
    AddressOutOfRange {
        path: String,
        side: &'static str,
        index: usize,
        target: usize,
        len: usize,
    },

    /// before block {before} at {path} points to after block {after}, which does not point back
    AsymmetricPairing {
        path: String,
        before: usize,
        after: usize,
    },

    /// {side} block {index} at {path} carries a sentinel that belongs to the other side
    SentinelOnWrongSide {
        path: String,
        side: &'static str,
        index: usize,
    },

    /// paired blocks {before} and {after} at {path} disagree on whether they have nested changes
    ChildrenMismatch {
        path: String,
        before: usize,
        after: usize,
    },
}

fn child_path(path: &str, index: usize) -> String {
    if path == "/" {
        format!("/{index}")
    } else {
        format!("{path}/{index}")
    }
}

/// Check one level of a pairing tree, and, when `blocks` is given, that it
/// lines up with the block lists it claims to describe.
fn check_level(
    path: &str,
    inputs: &[CodeChange],
    outputs: &[CodeChange],
    blocks: Option<(&[CodeBlock], &[CodeBlock])>,
) -> Result<(), PairingError> {
    if let Some((before, after)) = blocks {
        if inputs.len() != before.len() {
            return Err(PairingError::LengthMismatch {
                path: path.to_owned(),
                side: "before",
                changes: inputs.len(),
                blocks: before.len(),
            });
        }
        if outputs.len() != after.len() {
            return Err(PairingError::LengthMismatch {
                path: path.to_owned(),
                side: "after",
                changes: outputs.len(),
                blocks: after.len(),
            });
        }
    }

    for (j, change) in outputs.iter().enumerate() {
        match change.address {
            Address::Index(i) => {
                if i >= inputs.len() {
                    return Err(PairingError::AddressOutOfRange {
                        path: path.to_owned(),
                        side: "after",
                        index: j,
                        target: i,
                        len: inputs.len(),
                    });
                }
                if inputs[i].address != Address::Index(j) {
                    return Err(PairingError::AsymmetricPairing {
                        path: path.to_owned(),
                        before: i,
                        after: j,
                    });
                }
            }
            Address::Added => {}
            Address::Deleted => {
                return Err(PairingError::SentinelOnWrongSide {
                    path: path.to_owned(),
                    side: "after",
                    index: j,
                });
            }
        }
    }

    for (i, change) in inputs.iter().enumerate() {
        let j = match change.address {
            Address::Index(j) => j,
            Address::Deleted => continue,
            Address::Added => {
                return Err(PairingError::SentinelOnWrongSide {
                    path: path.to_owned(),
                    side: "before",
                    index: i,
                });
            }
        };
        if j >= outputs.len() {
            return Err(PairingError::AddressOutOfRange {
                path: path.to_owned(),
                side: "before",
                index: i,
                target: j,
                len: outputs.len(),
            });
        }
        if outputs[j].address != Address::Index(i) {
            return Err(PairingError::AsymmetricPairing {
                path: path.to_owned(),
                before: i,
                after: j,
            });
        }

        let inner_in = &change.children;
        let inner_out = &outputs[j].children;
        if inner_in.is_empty() && inner_out.is_empty() {
            continue;
        }
        if inner_in.is_empty() || inner_out.is_empty() {
            return Err(PairingError::ChildrenMismatch {
                path: path.to_owned(),
                before: i,
                after: j,
            });
        }
        let inner_blocks = blocks.map(|(a, b)| (a[i].children(), b[j].children()));
        check_level(&child_path(path, i), inner_in, inner_out, inner_blocks)?;
    }

    Ok(())
}

impl ListOfChanges {
    /// Assemble a pairing result.
    pub fn new(
        input_destinations: Vec<CodeChange>,
        output_sources: Vec<CodeChange>,
        distance: usize,
    ) -> Self {
        Self {
            input_destinations,
            output_sources,
            distance,
        }
    }

    /// Before-indices whose block was deleted, in order.
    pub fn deleted(&self) -> impl Iterator<Item = usize> + '_ {
        self.input_destinations
            .iter()
            .enumerate()
            .filter(|(_, c)| c.is_deleted())
            .map(|(i, _)| i)
    }

    /// After-indices whose block was added, in order.
    pub fn added(&self) -> impl Iterator<Item = usize> + '_ {
        self.output_sources
            .iter()
            .enumerate()
            .filter(|(_, c)| c.is_added())
            .map(|(j, _)| j)
    }

    /// `(before, after)` index pairs, in before order.
    pub fn pairs(&self) -> impl Iterator<Item = (usize, usize)> + '_ {
        self.input_destinations
            .iter()
            .enumerate()
            .filter_map(|(i, c)| c.address.index().map(|j| (i, j)))
    }

    /// Nested pairing for a paired before-index, if its children were matched.
    pub fn nested(&self, before_index: usize) -> Option<ListOfChanges> {
        let input = self.input_destinations.get(before_index)?;
        let after_index = input.address.index()?;
        let output = self.output_sources.get(after_index)?;
        if input.children.is_empty() && output.children.is_empty() {
            return None;
        }
        Some(ListOfChanges::new(
            input.children.clone(),
            output.children.clone(),
            0,
        ))
    }

    /// Check that the pairing tree is internally consistent: every address is
    /// in range, every pairing points back, and sentinels sit on the right
    /// side.
    pub fn validate(&self) -> Result<(), PairingError> {
        check_level("/", &self.input_destinations, &self.output_sources, None)
    }

    /// Like [`validate`](Self::validate), and also check that the tree lines
    /// up with the block lists it describes, at every nesting level.
    pub fn validate_against(
        &self,
        before: &[CodeBlock],
        after: &[CodeBlock],
    ) -> Result<(), PairingError> {
        check_level(
            "/",
            &self.input_destinations,
            &self.output_sources,
            Some((before, after)),
        )
    }
}
