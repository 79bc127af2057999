//! Replay of an animation script as a stream of text snapshots.
//!
//! Each nesting level is a frame holding three buckets over its own block
//! lists: settled text (`processed`), the block being animated (`changed`)
//! and everything not reached yet (`unprocessed`, split by a cursor around
//! the animated block). A `Nested` step pushes a child frame; the stack is
//! explicit so replay depth never grows the call stack.

use crate::block::CodeBlock;
use crate::pairing::ListOfChanges;
use crate::plan::{Animation, plan_with_blocks};
use crate::tracing_macros::{debug, trace};
use facet::Facet;
use smallvec::SmallVec;
use std::collections::VecDeque;

/// What a snapshot shows happening.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Facet)]
#[repr(u8)]
pub enum StepKind {
    /// The focused block is about to disappear.
    Delete,
    /// The focused block is new.
    Add,
    /// The focused block is moving to the end of the settled text.
    Move,
    /// The focused block is being rewritten.
    Change,
    /// Something is happening inside the focused block.
    Internal,
}

/// The middle part of a snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Facet)]
#[repr(u8)]
pub enum Focus {
    /// Text of the animated block.
    Text(String),
    /// Snapshot of a nested level, for [`StepKind::Internal`].
    Inner {
        /// The nested snapshot.
        #[facet(recursive_type)]
        snapshot: Box<Snapshot>,
    },
}

/// One intermediate state of a replay.
///
/// Rendered in order: `processed`, `unprocessed_before`, `focus`,
/// `unprocessed_after`.
#[derive(Debug, Clone, PartialEq, Eq, Facet)]
pub struct Snapshot {
    /// What this step does.
    pub kind: StepKind,
    /// Text that is already in its final place.
    pub processed: String,
    /// The animated block, or the nested snapshot.
    pub focus: Focus,
    /// Unsettled text that sat before the animated block.
    pub unprocessed_before: String,
    /// Unsettled text that sat after the animated block.
    pub unprocessed_after: String,
    /// For a change that rewrites text, the text being replaced.
    pub replaced: Option<String>,
    /// Whether the step comes from a nested level.
    pub nested: bool,
}

impl Snapshot {
    /// Whether this snapshot wraps a nested one.
    pub fn is_internal(&self) -> bool {
        matches!(self.focus, Focus::Inner { .. })
    }

    /// The focused text, if this snapshot is flat.
    pub fn focus_text(&self) -> Option<&str> {
        match &self.focus {
            Focus::Text(text) => Some(text.as_str()),
            Focus::Inner { .. } => None,
        }
    }

    /// Splice nested snapshots into their parents until the result is flat.
    ///
    /// Flat snapshots come back unchanged.
    pub fn flatten(self) -> Snapshot {
        let mut flat = self;
        loop {
            match flat.focus {
                Focus::Text(_) => return flat,
                Focus::Inner { snapshot } => {
                    let inner = *snapshot;
                    flat = Snapshot {
                        kind: inner.kind,
                        processed: flat.processed + &inner.processed,
                        focus: inner.focus,
                        unprocessed_before: inner.unprocessed_before,
                        unprocessed_after: inner.unprocessed_after + &flat.unprocessed_after,
                        replaced: inner.replaced,
                        nested: true,
                    };
                }
            }
        }
    }

    /// Concatenate every bucket, in display order.
    pub fn render(&self) -> String {
        let mut out = String::new();
        self.render_into(&mut out);
        out
    }

    fn render_into(&self, out: &mut String) {
        out.push_str(&self.processed);
        out.push_str(&self.unprocessed_before);
        match &self.focus {
            Focus::Text(text) => out.push_str(text),
            Focus::Inner { snapshot } => snapshot.render_into(out),
        }
        out.push_str(&self.unprocessed_after);
    }
}

/// Errors raised while replaying a script.
#[derive(Facet, Debug, PartialEq, Eq)]
#[facet(derive(Error))]
#[repr(u8)]
pub enum ReplayError {
    /// replay advanced after it was exhausted
    Exhausted,

    /// step at depth {depth} names before block {source}, but the level only has {len}
    SourceOutOfRange {
        depth: usize,
        source: usize,
        len: usize,
    },

    /// step at depth {depth} needs after block {dest}, but the level only has {len}
    DestinationOutOfRange {
        depth: usize,
        dest: usize,
        len: usize,
    },

    /// before block {source} at depth {depth} is not where the step needs it
    SourceNotPending { depth: usize, source: usize },

    /// before block {source} at depth {depth} is used before it was moved into place
    UnpairedSource { depth: usize, source: usize },
}

/// One slot of a bucket, resolved against the frame's block lists.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Entry {
    /// Untouched before block.
    Original(usize),
    /// Before block on its way out.
    Deleted(usize),
    /// New after block.
    Added(usize),
    /// After block that replaced its before counterpart.
    Changed(usize),
}

enum Applied<'a> {
    Snapshot(Snapshot),
    Descend(Frame<'a>),
}

struct Frame<'a> {
    before: &'a [CodeBlock],
    after: &'a [CodeBlock],
    queue: VecDeque<Animation>,
    processed: Vec<Entry>,
    changed: Option<Entry>,
    unprocessed: Vec<Entry>,
    /// `unprocessed[..split]` sits before the animated block.
    split: usize,
    /// After-index each moved before block lands on.
    dest: Vec<Option<usize>>,
    next_after: usize,
    /// After-index of the container a child frame is animating.
    interior: Option<usize>,
}

impl<'a> Frame<'a> {
    fn new(before: &'a [CodeBlock], after: &'a [CodeBlock], script: Vec<Animation>) -> Self {
        Self {
            before,
            after,
            queue: script.into(),
            processed: Vec::new(),
            changed: None,
            unprocessed: (0..before.len()).map(Entry::Original).collect(),
            split: 0,
            dest: vec![None; before.len()],
            next_after: 0,
            interior: None,
        }
    }

    fn write_entry(&self, entry: Entry, out: &mut String) {
        let block = match entry {
            Entry::Original(i) | Entry::Deleted(i) => self.before.get(i),
            Entry::Added(j) | Entry::Changed(j) => self.after.get(j),
        };
        if let Some(block) = block {
            block.write_text(out);
        }
    }

    fn text_of(&self, entries: &[Entry]) -> String {
        let mut out = String::new();
        for entry in entries {
            self.write_entry(*entry, &mut out);
        }
        out
    }

    /// Settle whatever the previous step animated.
    fn collapse(&mut self) {
        if let Some(entry) = self.changed.take()
            && !matches!(entry, Entry::Deleted(_))
        {
            self.processed.push(entry);
        }
        self.split = 0;
    }

    fn check_source(&self, source: usize, depth: usize) -> Result<(), ReplayError> {
        if source < self.before.len() {
            Ok(())
        } else {
            Err(ReplayError::SourceOutOfRange {
                depth,
                source,
                len: self.before.len(),
            })
        }
    }

    fn check_dest(&self, dest: usize, depth: usize) -> Result<(), ReplayError> {
        if dest < self.after.len() {
            Ok(())
        } else {
            Err(ReplayError::DestinationOutOfRange {
                depth,
                dest,
                len: self.after.len(),
            })
        }
    }

    fn destination(&self, source: usize, depth: usize) -> Result<usize, ReplayError> {
        self.dest
            .get(source)
            .copied()
            .flatten()
            .ok_or(ReplayError::UnpairedSource { depth, source })
    }

    /// Remove `source` from the unsettled pool, leaving the cursor where it was.
    fn take_pending(&mut self, source: usize, depth: usize) -> Result<(), ReplayError> {
        let pos = self
            .unprocessed
            .iter()
            .position(|e| *e == Entry::Original(source))
            .ok_or(ReplayError::SourceNotPending { depth, source })?;
        self.unprocessed.remove(pos);
        self.split = pos;
        Ok(())
    }

    /// Take `source` back from the end of the settled text, where the move
    /// right before put it, or else from the unsettled pool.
    fn take_moved(&mut self, source: usize, depth: usize) -> Result<(), ReplayError> {
        if self.processed.last() == Some(&Entry::Original(source)) {
            self.processed.pop();
            Ok(())
        } else {
            self.take_pending(source, depth)
        }
    }

    fn snapshot(&self, kind: StepKind, focus: String, replaced: Option<String>) -> Snapshot {
        let split = self.split.min(self.unprocessed.len());
        Snapshot {
            kind,
            processed: self.text_of(&self.processed),
            focus: Focus::Text(focus),
            unprocessed_before: self.text_of(&self.unprocessed[..split]),
            unprocessed_after: self.text_of(&self.unprocessed[split..]),
            replaced,
            nested: false,
        }
    }

    /// Wrap a snapshot of this frame's active child.
    fn wrap(&self, inner: Snapshot) -> Snapshot {
        Snapshot {
            kind: StepKind::Internal,
            processed: self.text_of(&self.processed),
            focus: Focus::Inner {
                snapshot: Box::new(inner),
            },
            unprocessed_before: String::new(),
            unprocessed_after: self.text_of(&self.unprocessed),
            replaced: None,
            nested: false,
        }
    }

    fn apply(&mut self, op: Animation, depth: usize) -> Result<Applied<'a>, ReplayError> {
        match op {
            Animation::Deleting(source) => {
                self.check_source(source, depth)?;
                self.take_pending(source, depth)?;
                self.changed = Some(Entry::Deleted(source));
                let focus = self.before[source].text_content();
                let snapshot = self.snapshot(StepKind::Delete, focus, None);
                Ok(Applied::Snapshot(snapshot))
            }
            Animation::Adding(dest) => {
                self.check_dest(dest, depth)?;
                self.changed = Some(Entry::Added(dest));
                self.split = 0;
                self.next_after = dest + 1;
                let focus = self.after[dest].text_content();
                let snapshot = self.snapshot(StepKind::Add, focus, None);
                Ok(Applied::Snapshot(snapshot))
            }
            Animation::MovingUp { source, .. } => {
                self.check_source(source, depth)?;
                let dest = self.next_after;
                self.check_dest(dest, depth)?;
                self.take_pending(source, depth)?;
                self.dest[source] = Some(dest);
                self.next_after += 1;
                self.changed = Some(Entry::Original(source));
                let focus = self.before[source].text_content();
                let snapshot = self.snapshot(StepKind::Move, focus, None);
                Ok(Applied::Snapshot(snapshot))
            }
            Animation::Changing { source, execute } => {
                self.check_source(source, depth)?;
                let dest = self.destination(source, depth)?;
                self.take_moved(source, depth)?;
                self.changed = Some(Entry::Changed(dest));
                let focus = self.after[dest].text_content();
                let replaced = execute.then(|| self.before[source].text_content());
                let snapshot = self.snapshot(StepKind::Change, focus, replaced);
                Ok(Applied::Snapshot(snapshot))
            }
            Animation::Nested { source, inner } => {
                self.check_source(source, depth)?;
                let dest = self.destination(source, depth)?;
                self.take_moved(source, depth)?;
                self.split = 0;
                self.interior = Some(dest);
                let (before, after) = (self.before, self.after);
                Ok(Applied::Descend(Frame::new(
                    before[source].children(),
                    after[dest].children(),
                    inner,
                )))
            }
        }
    }

    /// The child frame animating `interior` ran out of steps.
    fn finish_interior(&mut self) {
        if let Some(dest) = self.interior.take() {
            self.processed.push(Entry::Changed(dest));
        }
    }
}

/// Check every index a script names against the block lists it will run on.
fn validate(
    before: &[CodeBlock],
    after: &[CodeBlock],
    script: &[Animation],
    depth: usize,
) -> Result<(), ReplayError> {
    let source_in_range = |source: usize| {
        if source < before.len() {
            Ok(source)
        } else {
            Err(ReplayError::SourceOutOfRange {
                depth,
                source,
                len: before.len(),
            })
        }
    };
    let dest_in_range = |dest: usize| {
        if dest < after.len() {
            Ok(dest)
        } else {
            Err(ReplayError::DestinationOutOfRange {
                depth,
                dest,
                len: after.len(),
            })
        }
    };

    let mut dest: Vec<Option<usize>> = vec![None; before.len()];
    let mut next_after = 0;
    for op in script {
        match op {
            Animation::Deleting(source) => {
                source_in_range(*source)?;
            }
            Animation::Adding(j) => {
                next_after = dest_in_range(*j)? + 1;
            }
            Animation::MovingUp { source, .. } => {
                let source = source_in_range(*source)?;
                dest[source] = Some(dest_in_range(next_after)?);
                next_after += 1;
            }
            Animation::Changing { source, .. } => {
                let source = source_in_range(*source)?;
                if dest[source].is_none() {
                    return Err(ReplayError::UnpairedSource { depth, source });
                }
            }
            Animation::Nested { source, inner } => {
                let source = source_in_range(*source)?;
                let Some(j) = dest[source] else {
                    return Err(ReplayError::UnpairedSource { depth, source });
                };
                let (inner_before, inner_after) = (before[source].children(), after[j].children());
                validate(inner_before, inner_after, inner, depth + 1)?;
            }
        }
    }
    Ok(())
}

/// Pull-based enumerator of replay snapshots.
///
/// Returns one snapshot per primitive step, then `Ok(None)` once, then
/// [`ReplayError::Exhausted`]. Any other error ends the replay.
pub struct Replay<'a> {
    frames: SmallVec<[Frame<'a>; 4]>,
    finished: bool,
}

impl<'a> Replay<'a> {
    /// Prepare a replay of `script` over the two block lists.
    pub fn new(
        before: &'a [CodeBlock],
        after: &'a [CodeBlock],
        script: Vec<Animation>,
    ) -> Result<Self, ReplayError> {
        validate(before, after, &script, 0)?;
        debug!(steps = script.len(), "replay ready");
        let mut frames = SmallVec::new();
        frames.push(Frame::new(before, after, script));
        Ok(Self {
            frames,
            finished: false,
        })
    }

    /// Prepare a replay that ends on the exact `after` text.
    pub fn for_changes(
        before: &'a [CodeBlock],
        after: &'a [CodeBlock],
        changes: &ListOfChanges,
    ) -> Result<Self, ReplayError> {
        Self::new(before, after, plan_with_blocks(before, after, changes))
    }

    /// Current nesting depth, 0 at the top level.
    pub fn depth(&self) -> usize {
        self.frames.len().saturating_sub(1)
    }

    /// Run the next step.
    pub fn advance(&mut self) -> Result<Option<Snapshot>, ReplayError> {
        if self.finished {
            return Err(ReplayError::Exhausted);
        }
        if let Some(top) = self.frames.last_mut() {
            top.collapse();
        }

        loop {
            let depth = self.depth();
            let Some(top) = self.frames.last_mut() else {
                self.finished = true;
                return Ok(None);
            };

            let Some(op) = top.queue.pop_front() else {
                if depth == 0 {
                    debug!("replay exhausted");
                    self.finished = true;
                    return Ok(None);
                }
                self.frames.pop();
                debug!(depth, "frame popped");
                if let Some(parent) = self.frames.last_mut() {
                    parent.finish_interior();
                }
                continue;
            };

            trace!(depth, %op, "step");
            match top.apply(op, depth) {
                Ok(Applied::Snapshot(snapshot)) => return Ok(Some(self.wrap(snapshot))),
                Ok(Applied::Descend(child)) => {
                    debug!(depth = depth + 1, "frame pushed");
                    self.frames.push(child);
                }
                Err(err) => {
                    debug!(%err, "replay failed");
                    self.finished = true;
                    return Err(err);
                }
            }
        }
    }

    fn wrap(&self, mut snapshot: Snapshot) -> Snapshot {
        let depth = self.depth();
        snapshot.nested = depth > 0;
        for frame in self.frames[..depth].iter().rev() {
            snapshot = frame.wrap(snapshot);
        }
        snapshot
    }

    /// Iterate over flat snapshots.
    pub fn flattened(self) -> impl Iterator<Item = Result<Snapshot, ReplayError>> + 'a {
        self.map(|step| step.map(Snapshot::flatten))
    }

    /// Text of the whole replay as it stands once the last step settles.
    pub fn current_text(&self) -> String {
        let top = self.depth();
        let mut text = String::new();
        for (depth, frame) in self.frames.iter().enumerate().rev() {
            let mut level = frame.text_of(&frame.processed);
            if depth == top {
                if let Some(entry) = frame.changed
                    && !matches!(entry, Entry::Deleted(_))
                {
                    frame.write_entry(entry, &mut level);
                }
            } else {
                level.push_str(&text);
            }
            level.push_str(&frame.text_of(&frame.unprocessed));
            text = level;
        }
        text
    }
}

impl Iterator for Replay<'_> {
    type Item = Result<Snapshot, ReplayError>;

    fn next(&mut self) -> Option<Self::Item> {
        match self.advance() {
            Ok(Some(snapshot)) => Some(Ok(snapshot)),
            Ok(None) | Err(ReplayError::Exhausted) => None,
            Err(err) => Some(Err(err)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::block::render;
    use crate::matching::match_blocks;
    use crate::plan::plan_changes;
    use facet_testhelpers::test;

    fn lines(items: &[&str]) -> Vec<CodeBlock> {
        items.iter().map(|s| CodeBlock::text(s)).collect()
    }

    fn function(stmt: &str) -> CodeBlock {
        CodeBlock::definition(
            "function",
            Some("f"),
            &[],
            vec![
                CodeBlock::text("fn f() {\n"),
                CodeBlock::action(stmt, &["x"], &[]),
                CodeBlock::text("}\n"),
            ],
        )
    }

    fn up(source: usize, execute: bool) -> Animation {
        Animation::MovingUp { source, execute }
    }

    fn parts(s: &Snapshot) -> (StepKind, &str, &str, &str, &str) {
        (
            s.kind,
            s.processed.as_str(),
            s.unprocessed_before.as_str(),
            s.focus_text().unwrap_or("<inner>"),
            s.unprocessed_after.as_str(),
        )
    }

    #[test]
    fn test_flat_replay() {
        let before = lines(&["a\n", "b\n", "c\n"]);
        let after = lines(&["c\n", "a\n", "d\n"]);
        let changes = match_blocks(&before, &after);
        let script = plan_changes(&changes);
        assert_eq!(
            script,
            vec![
                Animation::Deleting(1),
                up(2, true),
                up(0, false),
                Animation::Adding(2),
            ]
        );

        let mut replay = Replay::new(&before, &after, script).unwrap();
        let s = replay.advance().unwrap().unwrap();
        assert_eq!(parts(&s), (StepKind::Delete, "", "a\n", "b\n", "c\n"));
        assert_eq!(replay.current_text(), "a\nc\n");

        let s = replay.advance().unwrap().unwrap();
        assert_eq!(parts(&s), (StepKind::Move, "", "a\n", "c\n", ""));

        let s = replay.advance().unwrap().unwrap();
        assert_eq!(parts(&s), (StepKind::Move, "c\n", "", "a\n", ""));

        let s = replay.advance().unwrap().unwrap();
        assert_eq!(parts(&s), (StepKind::Add, "c\na\n", "", "d\n", ""));

        assert_eq!(replay.advance().unwrap(), None);
        assert_eq!(replay.current_text(), render(&after));
        assert_eq!(replay.advance(), Err(ReplayError::Exhausted));
    }

    #[test]
    fn test_nested_replay_ends_on_after_text() {
        let before = vec![function("  x = 1;\n"), CodeBlock::text("\n")];
        let after = vec![CodeBlock::text("\n"), function("  x = 2;\n")];
        let changes = match_blocks(&before, &after);

        let mut replay = Replay::for_changes(&before, &after, &changes).unwrap();
        let mut snapshots = Vec::new();
        while let Some(s) = replay.advance().unwrap() {
            snapshots.push(s);
        }
        assert_eq!(replay.current_text(), render(&after));
        assert_eq!(snapshots.len(), 6);

        let inner: Vec<Snapshot> = snapshots[2..]
            .iter()
            .cloned()
            .map(Snapshot::flatten)
            .collect();
        assert!(snapshots[2..].iter().all(Snapshot::is_internal));
        assert_eq!(
            parts(&inner[0]),
            (StepKind::Move, "\n", "", "fn f() {\n", "  x = 1;\n}\n")
        );
        assert_eq!(
            parts(&inner[2]),
            (StepKind::Change, "\nfn f() {\n", "", "  x = 2;\n", "}\n")
        );
        assert_eq!(inner[2].replaced.as_deref(), Some("  x = 1;\n"));
        assert_eq!(
            parts(&inner[3]),
            (StepKind::Move, "\nfn f() {\n  x = 2;\n", "", "}\n", "")
        );
        assert!(inner.iter().all(|s| s.nested));
    }

    #[test]
    fn test_flatten_keeps_rendered_text() {
        let before = vec![function("  x = 1;\n"), CodeBlock::text("// end\n")];
        let after = vec![function("  x = 2;\n"), CodeBlock::text("// end\n")];
        let changes = match_blocks(&before, &after);

        for step in Replay::for_changes(&before, &after, &changes).unwrap() {
            let snapshot = step.unwrap();
            let flat = snapshot.clone().flatten();
            assert_eq!(flat.render(), snapshot.render());
            assert!(!flat.is_internal());
            assert_eq!(flat.clone().flatten(), flat);
        }
    }

    #[test]
    fn test_flattened_iterator_yields_flat_snapshots() {
        let before = vec![function("  x = 1;\n")];
        let after = vec![function("  x = 1;\n")];
        let changes = match_blocks(&before, &after);
        let snapshots: Vec<Snapshot> = Replay::for_changes(&before, &after, &changes)
            .unwrap()
            .flattened()
            .collect::<Result<_, _>>()
            .unwrap();
        // One move at the top, three inside the body
        assert_eq!(snapshots.len(), 4);
        assert!(!snapshots[0].nested);
        let body = &snapshots[1..];
        assert!(body.iter().all(|s| s.nested && s.focus_text().is_some()));
    }

    #[test]
    fn test_invalid_scripts_are_rejected_up_front() {
        let before = lines(&["a\n"]);
        let after = lines(&["a\n"]);

        let err = Replay::new(&before, &after, vec![Animation::Deleting(3)]).err();
        assert_eq!(
            err,
            Some(ReplayError::SourceOutOfRange {
                depth: 0,
                source: 3,
                len: 1
            })
        );

        let err = Replay::new(&before, &after, vec![Animation::Adding(1)]).err();
        assert_eq!(
            err,
            Some(ReplayError::DestinationOutOfRange {
                depth: 0,
                dest: 1,
                len: 1
            })
        );

        let change = Animation::Changing {
            source: 0,
            execute: true,
        };
        let err = Replay::new(&before, &after, vec![change]).err();
        assert_eq!(
            err,
            Some(ReplayError::UnpairedSource {
                depth: 0,
                source: 0
            })
        );
    }

    #[test]
    fn test_misplaced_step_ends_the_replay() {
        let before = lines(&["a\n", "b\n"]);
        let after = lines(&["a\n", "b\n"]);
        let script = vec![up(0, false), up(0, false)];
        let mut replay = Replay::new(&before, &after, script).unwrap();
        assert!(replay.advance().unwrap().is_some());
        assert_eq!(
            replay.advance(),
            Err(ReplayError::SourceNotPending {
                depth: 0,
                source: 0
            })
        );
        assert_eq!(replay.advance(), Err(ReplayError::Exhausted));
    }

    #[test]
    fn test_one_sided_container_reaches_the_after_text() {
        let body = vec![CodeBlock::text("let x;\n")];
        let before = vec![
            CodeBlock::definition("variable", Some("x"), &[], body),
            CodeBlock::text("\n"),
        ];
        let after = vec![
            CodeBlock::definition("variable", Some("x"), &[], Vec::new()),
            CodeBlock::text("\n"),
        ];
        let changes = match_blocks(&before, &after);

        let mut replay = Replay::for_changes(&before, &after, &changes).unwrap();
        let mut kinds = Vec::new();
        while let Some(s) = replay.advance().unwrap() {
            kinds.push(s.kind);
        }
        // The emptied body leaves no step of its own.
        assert_eq!(kinds, vec![StepKind::Move, StepKind::Move]);
        assert_eq!(replay.current_text(), render(&after));
        assert_eq!(replay.current_text(), "\n");
    }
}
