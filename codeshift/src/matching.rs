//! Block matching between two versions of a sibling list.
//!
//! Runs in phases over the blocks that are still unpaired:
//! 1. Named definitions: same kind and same name
//! 2. Structural equality: identical blocks, committed when unambiguous
//! 3. Heuristic scoring: opt-in greedy assignment by penalty score
//! 4. Residuals: whatever is left is deleted (before) or added (after)
//!
//! Paired containers are matched recursively, and their inner distance is
//! folded into the parent's.

use crate::block::{CodeBlock, Definition};
use crate::pairing::{Address, CodeChange, ListOfChanges, Rename};
use crate::tracing_macros::{debug, trace};
use rapidhash::RapidHashMap as HashMap;
use std::collections::BTreeSet;

/// Penalty weights and switches for the matcher.
#[derive(Debug, Clone)]
pub struct MatchConfig {
    /// Two definitions of different kinds.
    pub kind_penalty: usize,

    /// Two definitions with different names.
    pub name_penalty: usize,

    /// Per parameter present on one side only.
    pub parameter_penalty: usize,

    /// Multiplier applied to the distance of a paired definition's children.
    pub inner_code_multiplier: usize,

    /// Per identifier read on one side only.
    pub read_penalty: usize,

    /// Per identifier written on one side only.
    pub write_penalty: usize,

    /// Placeholder score for combinations that are not compared (decisions,
    /// mixed variants). Scores at or above this are never committed.
    pub max_penalty: usize,

    /// After the unambiguous structural pairs are committed, pair the
    /// remaining identical blocks in ascending index order instead of
    /// leaving them unpaired.
    pub pair_ambiguous_in_order: bool,

    /// Commit residual pairs greedily by heuristic score. Off by default:
    /// blocks that are neither identical nor same-named definitions are then
    /// reported as deleted and added.
    pub assign_by_score: bool,
}

impl Default for MatchConfig {
    fn default() -> Self {
        Self {
            kind_penalty: 2,
            name_penalty: 20,
            parameter_penalty: 10,
            inner_code_multiplier: 2,
            read_penalty: 10,
            write_penalty: 100,
            max_penalty: 1000,
            pair_ambiguous_in_order: true,
            assign_by_score: false,
        }
    }
}

/// Match two sibling lists with the default configuration.
pub fn match_blocks(before: &[CodeBlock], after: &[CodeBlock]) -> ListOfChanges {
    match_blocks_with(before, after, &MatchConfig::default())
}

/// Match two sibling lists.
///
/// Never fails: combinations the matcher does not compare degrade to the
/// maximum penalty instead of aborting the comparison.
pub fn match_blocks_with(
    before: &[CodeBlock],
    after: &[CodeBlock],
    config: &MatchConfig,
) -> ListOfChanges {
    debug!(
        before = before.len(),
        after = after.len(),
        "match_blocks start"
    );
    let mut level = LevelMatch::new(before, after, config);

    if level.single_definition_pair() {
        return level.finish();
    }

    level.named_definition_phase();
    trace!(distance = level.distance, "after named_definition_phase");

    level.structural_phase();
    trace!(distance = level.distance, "after structural_phase");

    if config.assign_by_score {
        level.score_phase();
        trace!(distance = level.distance, "after score_phase");
    }

    level.finish()
}

/// Symmetric difference size of two identifier collections.
fn symmetric_difference<'a>(
    a: impl IntoIterator<Item = &'a String>,
    b: impl IntoIterator<Item = &'a String>,
) -> usize {
    let a: BTreeSet<&str> = a.into_iter().map(String::as_str).collect();
    let b: BTreeSet<&str> = b.into_iter().map(String::as_str).collect();
    a.symmetric_difference(&b).count()
}

/// Renames implied by pairing two definitions: the name itself, and
/// positional parameters when both sides declare the same number.
fn definition_renames(a: &Definition, b: &Definition) -> Vec<Rename> {
    let mut renames = Vec::new();
    if let (Some(from), Some(to)) = (&a.name, &b.name)
        && from != to
    {
        renames.push(Rename {
            from: from.clone(),
            to: to.clone(),
        });
    }
    if a.parameters.len() == b.parameters.len() {
        for (from, to) in a.parameters.iter().zip(&b.parameters) {
            if from != to {
                renames.push(Rename {
                    from: from.clone(),
                    to: to.clone(),
                });
            }
        }
    }
    renames
}

/// Whether two blocks are the same thing, ignoring literal text where the
/// variant carries semantic information instead.
pub fn structurally_equal(a: &CodeBlock, b: &CodeBlock) -> bool {
    fn all_equal(a: &[CodeBlock], b: &[CodeBlock]) -> bool {
        a.len() == b.len() && a.iter().zip(b).all(|(x, y)| structurally_equal(x, y))
    }

    match (a, b) {
        (CodeBlock::Definition(x), CodeBlock::Definition(y)) => {
            x.kind == y.kind
                && x.name == y.name
                && x.parameters == y.parameters
                && all_equal(&x.children, &y.children)
        }
        (CodeBlock::Action(x), CodeBlock::Action(y)) => x.writes == y.writes && x.reads == y.reads,
        (CodeBlock::Decision(x), CodeBlock::Decision(y)) => {
            x.kind == y.kind && x.depends_on == y.depends_on && all_equal(&x.children, &y.children)
        }
        (CodeBlock::Text(x), CodeBlock::Text(y)) => x.text == y.text && x.special == y.special,
        _ => false,
    }
}

/// Working state for one list-of-siblings comparison.
struct LevelMatch<'a> {
    before: &'a [CodeBlock],
    after: &'a [CodeBlock],
    config: &'a MatchConfig,
    inputs: Vec<Option<CodeChange>>,
    outputs: Vec<Option<CodeChange>>,
    distance: usize,
}

impl<'a> LevelMatch<'a> {
    fn new(before: &'a [CodeBlock], after: &'a [CodeBlock], config: &'a MatchConfig) -> Self {
        Self {
            before,
            after,
            config,
            inputs: vec![None; before.len()],
            outputs: vec![None; after.len()],
            distance: 0,
        }
    }

    #[inline(always)]
    fn before_paired(&self, i: usize) -> bool {
        self.inputs[i].is_some()
    }

    #[inline(always)]
    fn after_paired(&self, j: usize) -> bool {
        self.outputs[j].is_some()
    }

    /// Match the children of two paired blocks, if both have any.
    fn nested(&self, i: usize, j: usize) -> Option<ListOfChanges> {
        let (a, b) = (self.before[i].children(), self.after[j].children());
        if a.is_empty() || b.is_empty() {
            return None;
        }
        Some(match_blocks_with(a, b, self.config))
    }

    fn commit(
        &mut self,
        i: usize,
        j: usize,
        cost: usize,
        nested: Option<ListOfChanges>,
        renames: Vec<Rename>,
        reason: &'static str,
    ) {
        trace!(
            before = i,
            before_kind = self.before[i].kind_name(),
            after = j,
            cost,
            reason,
            "commit pair"
        );
        let (inner_in, inner_out) = nested
            .map(|n| (n.input_destinations, n.output_sources))
            .unwrap_or_default();
        self.inputs[i] = Some(CodeChange {
            address: Address::Index(j),
            children: inner_in,
            renames: renames.clone(),
        });
        self.outputs[j] = Some(CodeChange {
            address: Address::Index(i),
            children: inner_out,
            renames,
        });
        self.distance = self.distance.saturating_add(cost);
    }

    /// One definition of the same kind on each side: assume it is the same
    /// construct, edited, whatever its name.
    fn single_definition_pair(&mut self) -> bool {
        let (before, after) = (self.before, self.after);
        let (Some(CodeBlock::Definition(a)), Some(CodeBlock::Definition(b))) =
            (before.first(), after.first())
        else {
            return false;
        };
        if before.len() != 1 || after.len() != 1 || a.kind != b.kind {
            return false;
        }

        let nested = self.nested(0, 0);
        let inner = nested.as_ref().map_or(0, |n| n.distance);
        let renames = definition_renames(a, b);
        self.commit(0, 0, inner, nested, renames, "single definition");
        true
    }

    /// Phase 1: definitions with the same kind and the same name.
    fn named_definition_phase(&mut self) {
        let (before, after) = (self.before, self.after);
        for i in 0..before.len() {
            if self.before_paired(i) {
                continue;
            }
            let CodeBlock::Definition(a) = &before[i] else {
                continue;
            };

            // Anonymous definitions of one kind share the empty name.
            let found = (0..after.len()).find(|&j| {
                !self.after_paired(j)
                    && matches!(
                        &after[j],
                        CodeBlock::Definition(b) if b.kind == a.kind && b.name == a.name
                    )
            });
            let Some(j) = found else {
                continue;
            };
            let CodeBlock::Definition(b) = &after[j] else {
                continue;
            };

            let nested = self.nested(i, j);
            let inner = nested.as_ref().map_or(0, |n| n.distance);
            let parameters = symmetric_difference(&a.parameters, &b.parameters);
            let cost = self
                .config
                .inner_code_multiplier
                .saturating_mul(inner)
                .saturating_add(self.config.parameter_penalty.saturating_mul(parameters));
            let renames = definition_renames(a, b);
            self.commit(i, j, cost, nested, renames, "named definition");
        }
    }

    /// Phase 2: identical blocks.
    ///
    /// A candidate is committed as soon as one of its indices appears in no
    /// other candidate. Whatever stays ambiguous is either paired in index
    /// order or left alone, depending on the config.
    fn structural_phase(&mut self) {
        let mut candidates: Vec<(usize, usize)> = Vec::new();
        for i in 0..self.before.len() {
            if self.before_paired(i) {
                continue;
            }
            for j in 0..self.after.len() {
                if !self.after_paired(j) && structurally_equal(&self.before[i], &self.after[j]) {
                    candidates.push((i, j));
                }
            }
        }
        trace!(candidates = candidates.len(), "structural candidates");

        while !candidates.is_empty() {
            let mut per_before: HashMap<usize, usize> = HashMap::default();
            let mut per_after: HashMap<usize, usize> = HashMap::default();
            for &(i, j) in &candidates {
                *per_before.entry(i).or_default() += 1;
                *per_after.entry(j).or_default() += 1;
            }

            let unique = candidates
                .iter()
                .copied()
                .find(|(i, j)| per_before[i] == 1 || per_after[j] == 1);

            let (i, j, reason) = match unique {
                Some((i, j)) => (i, j, "unique structural"),
                None if self.config.pair_ambiguous_in_order => {
                    let (i, j) = candidates[0];
                    (i, j, "ambiguous structural, in order")
                }
                None => {
                    trace!(
                        left = candidates.len(),
                        "structural phase: only ambiguous candidates left"
                    );
                    break;
                }
            };

            let nested = self.nested(i, j);
            let inner = nested.as_ref().map_or(0, |n| n.distance);
            self.commit(i, j, inner, nested, Vec::new(), reason);
            candidates.retain(|&(a, b)| a != i && b != j);
        }
    }

    /// Heuristic dissimilarity of two unpaired blocks, with the nested
    /// matching it was computed from.
    fn score(&self, i: usize, j: usize) -> (usize, Option<ListOfChanges>) {
        let config = self.config;
        match (&self.before[i], &self.after[j]) {
            (CodeBlock::Definition(a), CodeBlock::Definition(b)) => {
                let mut cost: usize = 0;
                if a.kind != b.kind {
                    cost = cost.saturating_add(config.kind_penalty);
                }
                if a.name != b.name {
                    cost = cost.saturating_add(config.name_penalty);
                }
                let parameters = symmetric_difference(&a.parameters, &b.parameters);
                cost = cost.saturating_add(config.parameter_penalty.saturating_mul(parameters));
                let nested = self.nested(i, j);
                if let Some(n) = &nested {
                    let inner = config.inner_code_multiplier.saturating_mul(n.distance);
                    cost = cost.saturating_add(inner);
                }
                (cost, nested)
            }
            (CodeBlock::Action(a), CodeBlock::Action(b)) => {
                let reads = symmetric_difference(&a.reads, &b.reads);
                let writes = symmetric_difference(&a.writes, &b.writes);
                let cost = config
                    .read_penalty
                    .saturating_mul(reads)
                    .saturating_add(config.write_penalty.saturating_mul(writes));
                (cost, None)
            }
            // Branch-by-branch comparison of decisions is not implemented.
            (CodeBlock::Decision(_), CodeBlock::Decision(_)) => (config.max_penalty, None),
            _ => (config.max_penalty, None),
        }
    }

    /// Phase 3: greedy min-cost assignment over the remaining blocks.
    fn score_phase(&mut self) {
        let mut scored: Vec<(usize, usize, usize, Option<ListOfChanges>)> = Vec::new();
        for i in 0..self.before.len() {
            if self.before_paired(i) {
                continue;
            }
            for j in 0..self.after.len() {
                if self.after_paired(j) {
                    continue;
                }
                let (cost, nested) = self.score(i, j);
                trace!(before = i, after = j, cost, "scored pair");
                if cost < self.config.max_penalty {
                    scored.push((cost, i, j, nested));
                }
            }
        }
        scored.sort_by_key(|&(cost, i, j, _)| (cost, i, j));

        for (cost, i, j, nested) in scored {
            if self.before_paired(i) || self.after_paired(j) {
                continue;
            }
            let renames = match (&self.before[i], &self.after[j]) {
                (CodeBlock::Definition(a), CodeBlock::Definition(b)) => definition_renames(a, b),
                _ => Vec::new(),
            };
            self.commit(i, j, cost, nested, renames, "scored");
        }
    }

    /// Phase 4: residuals become deletions and additions.
    fn finish(self) -> ListOfChanges {
        let input_destinations: Vec<CodeChange> = self
            .inputs
            .into_iter()
            .map(|c| c.unwrap_or_else(CodeChange::deleted))
            .collect();
        let output_sources: Vec<CodeChange> = self
            .outputs
            .into_iter()
            .map(|c| c.unwrap_or_else(CodeChange::added))
            .collect();
        debug!(
            before = input_destinations.len(),
            after = output_sources.len(),
            deleted = input_destinations.iter().filter(|c| c.is_deleted()).count(),
            added = output_sources.iter().filter(|c| c.is_added()).count(),
            distance = self.distance,
            "match_blocks done"
        );
        ListOfChanges::new(input_destinations, output_sources, self.distance)
    }
}
