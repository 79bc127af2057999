//! End-to-end tests: match, plan, replay.

use codeshift::align::{align_str, reconstruct_after, reconstruct_before};
use codeshift::{
    Animation, CodeBlock, ListOfChanges, Replay, Snapshot, StepKind, match_blocks, persist,
    plan_changes, plan_with_blocks, render,
};
use facet_testhelpers::test;

fn area(body: &str) -> CodeBlock {
    CodeBlock::definition(
        "function",
        Some("area"),
        &["w", "h"],
        vec![
            CodeBlock::text("fn area(w, h) {\n"),
            CodeBlock::action(body, &["a"], &["w", "h"]),
            CodeBlock::decision(
                "if",
                &["a"],
                vec![
                    CodeBlock::text("  if a > 0 {\n"),
                    CodeBlock::action("    return a;\n", &[], &["a"]),
                    CodeBlock::text("  }\n"),
                ],
            ),
            CodeBlock::text("  0\n}\n"),
        ],
    )
}

fn main_fn(extra: bool) -> CodeBlock {
    let mut body = vec![CodeBlock::text("fn main() {\n")];
    if extra {
        body.push(CodeBlock::action("  let x = 1;\n", &["x"], &[]));
    }
    body.push(CodeBlock::action("  print(area(2, 3));\n", &[], &["area", "print"]));
    body.push(CodeBlock::text("}\n"));
    CodeBlock::definition("function", Some("main"), &[], body)
}

fn before() -> Vec<CodeBlock> {
    vec![
        CodeBlock::text("// old\n"),
        area("  let a = w * h;\n"),
        CodeBlock::text("\n"),
        main_fn(false),
    ]
}

fn after() -> Vec<CodeBlock> {
    vec![
        main_fn(true),
        CodeBlock::text("\n"),
        area("  let a = h * w;\n"),
        CodeBlock::text("// done\n"),
    ]
}

fn replay_all(before: &[CodeBlock], after: &[CodeBlock], changes: &ListOfChanges) -> Vec<Snapshot> {
    let mut replay = Replay::for_changes(before, after, changes).unwrap();
    let mut out = Vec::new();
    while let Some(snapshot) = replay.advance().unwrap() {
        out.push(snapshot);
    }
    assert_eq!(replay.current_text(), render(after));
    out
}

#[test]
fn test_pairing_of_a_reordered_program() {
    let (before, after) = (before(), after());
    let changes = match_blocks(&before, &after);
    changes.validate_against(&before, &after).unwrap();

    assert_eq!(changes.deleted().collect::<Vec<_>>(), vec![0]);
    assert_eq!(changes.added().collect::<Vec<_>>(), vec![3]);
    assert_eq!(
        changes.pairs().collect::<Vec<_>>(),
        vec![(1, 2), (2, 1), (3, 0)]
    );

    let main_inner = changes.nested(3).unwrap();
    assert_eq!(main_inner.added().collect::<Vec<_>>(), vec![1]);
}

#[test]
fn test_script_completeness() {
    let (before, after) = (before(), after());
    let changes = match_blocks(&before, &after);
    let script = plan_changes(&changes);

    let deletions = script
        .iter()
        .filter(|op| matches!(op, Animation::Deleting(_)))
        .count();
    assert_eq!(deletions, changes.deleted().count());

    let placed: Vec<&Animation> = script
        .iter()
        .filter(|op| matches!(op, Animation::Adding(_) | Animation::MovingUp { .. }))
        .collect();
    assert_eq!(placed.len(), after.len());

    // Every deletion precedes every placement
    let first_placement = script
        .iter()
        .position(|op| !matches!(op, Animation::Deleting(_)))
        .unwrap();
    assert_eq!(first_placement, deletions);

    // Both functions moved, so both get a nested script
    let nested = script
        .iter()
        .filter(|op| matches!(op, Animation::Nested { .. }))
        .count();
    assert_eq!(nested, 2);
}

#[test]
fn test_replay_reaches_the_after_text() {
    let (before, after) = (before(), after());
    let changes = match_blocks(&before, &after);
    let snapshots = replay_all(&before, &after, &changes);

    assert_eq!(snapshots[0].kind, StepKind::Delete);
    assert_eq!(snapshots[0].focus_text(), Some("// old\n"));
    assert_eq!(snapshots.last().map(|s| s.kind), Some(StepKind::Add));

    for snapshot in &snapshots {
        let flat = snapshot.clone().flatten();
        assert_eq!(flat.render(), snapshot.render());
        assert_eq!(flat.nested, snapshot.is_internal());
    }
}

#[test]
fn test_change_steps_align_old_and_new_text() {
    let (before, after) = (before(), after());
    let changes = match_blocks(&before, &after);
    let changes_seen: Vec<Snapshot> = replay_all(&before, &after, &changes)
        .into_iter()
        .map(Snapshot::flatten)
        .filter(|s| s.kind == StepKind::Change)
        .collect();

    assert_eq!(changes_seen.len(), 1);
    let change = &changes_seen[0];
    let old = change.replaced.as_deref().unwrap();
    let new = change.focus_text().unwrap();
    assert_eq!(old, "  let a = w * h;\n");
    assert_eq!(new, "  let a = h * w;\n");

    let ops = align_str(old, new);
    assert_eq!(reconstruct_before(&ops), old);
    assert_eq!(reconstruct_after(&ops), new);
    assert_eq!(ops.iter().filter(|op| op.is_edit()).count(), 2);
}

#[test]
fn test_identity_replays_without_edits() {
    let mut program = before();
    program.push(CodeBlock::text("\n"));
    let changes = match_blocks(&program, &program);

    assert_eq!(changes.distance, 0);
    assert!(changes.pairs().all(|(i, j)| i == j));
    assert_eq!(changes.pairs().count(), program.len());

    let script = plan_with_blocks(&program, &program, &changes);
    assert!(script.iter().all(|op| matches!(
        op,
        Animation::MovingUp { execute: false, .. } | Animation::Nested { .. }
    )));

    for snapshot in replay_all(&program, &program, &changes) {
        let flat = snapshot.flatten();
        assert_eq!(flat.kind, StepKind::Move);
        assert_eq!(flat.render(), render(&program));
    }
}

#[test]
fn test_disjoint_lists_delete_then_add() {
    let before = vec![CodeBlock::text("a\n"), CodeBlock::text("b\n")];
    let after = vec![
        CodeBlock::action("x = 1;\n", &["x"], &[]),
        CodeBlock::action("y = 2;\n", &["y"], &[]),
    ];
    let changes = match_blocks(&before, &after);
    assert_eq!(changes.distance, 0);
    assert_eq!(changes.deleted().count(), 2);
    assert_eq!(changes.added().count(), 2);

    let kinds: Vec<StepKind> = replay_all(&before, &after, &changes)
        .iter()
        .map(|s| s.kind)
        .collect();
    assert_eq!(
        kinds,
        vec![
            StepKind::Delete,
            StepKind::Delete,
            StepKind::Add,
            StepKind::Add,
        ]
    );
}

#[test]
fn test_stored_pairing_replays_the_same() {
    let (before, after) = (before(), after());
    let changes = match_blocks(&before, &after);
    let json = persist::to_json(&changes).unwrap();
    let restored = persist::from_json_for(&json, &before, &after).unwrap();

    assert_eq!(
        replay_all(&before, &after, &restored),
        replay_all(&before, &after, &changes)
    );
}
