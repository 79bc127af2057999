//! Structural diffing of source code and step-by-step replay of the edit.
//!
//! codeshift provides:
//! - **Block model**: a classified tree of definitions, actions, decisions
//!   and plain text, as produced by a language front end
//! - **Matching**: pairs blocks between two versions of a file, recursively
//! - **Planning**: turns a pairing into a linear animation script
//! - **Replay**: walks the script and yields one text snapshot per step
//! - **Persistence**: stores and reloads pairings as JSON
//!
//! Character-level alignment for animating a rewritten token lives in
//! [`align`].
//!
//! # Example
//!
//! ```rust
//! use codeshift::{CodeBlock, Replay, match_blocks, render};
//!
//! let before = vec![
//!     CodeBlock::action("let a = 1;\n", &["a"], &[]),
//!     CodeBlock::action("let b = 2;\n", &["b"], &[]),
//! ];
//! let after = vec![
//!     CodeBlock::action("let b = 2;\n", &["b"], &[]),
//!     CodeBlock::action("let a = 1;\n", &["a"], &[]),
//! ];
//!
//! let changes = match_blocks(&before, &after);
//! let mut replay = Replay::for_changes(&before, &after, &changes).unwrap();
//! while let Some(snapshot) = replay.advance().unwrap() {
//!     println!("{}", snapshot.flatten().render());
//! }
//! assert_eq!(replay.current_text(), render(&after));
//! ```

mod tracing_macros;

pub mod block;
pub mod matching;
pub mod pairing;
pub mod persist;
pub mod plan;
pub mod replay;

pub use codeshift_align as align;

pub use block::{Action, CodeBlock, Decision, Definition, TextBlock, render};
pub use matching::{MatchConfig, match_blocks, match_blocks_with};
pub use pairing::{Address, CodeChange, ListOfChanges, PairingError, Rename};
pub use persist::PersistError;
pub use plan::{Animation, plan, plan_changes, plan_with_blocks};
pub use replay::{Focus, Replay, ReplayError, Snapshot, StepKind};
