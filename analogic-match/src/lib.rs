//! # analogic-match
//!
//! Layer 2: The structure-mapping pipeline for the ANALOGIC engine.
//!
//! Given two concept graphs (a *base* and a *target*), this crate discovers
//! the maximal analogical mappings between them through five strictly
//! sequential stages:
//! - **Hypothesis generation**: filter and intern rules produce local pairings
//! - **Structuring**: each hypothesis is annotated with emaps, nogoods and
//!   children, propagated upward through the expression DAG
//! - **GMap construction**: consistent hypothesis roots become initial GMaps
//! - **Combination and merging**: maximal mutually consistent GMap subsets are
//!   enumerated (Bron-Kerbosch over the conflict graph) and unioned
//! - **Scoring and inference**: structural evaluation scores, entity content
//!   matches, and transfer of unmatched base structure onto the target
//!
//! ## Complexity Warning
//!
//! Combination is the only super-linear stage: enumerating maximal consistent
//! subsets is exponential in the worst case. The combiner checks the
//! configured deadline cooperatively inside the recursion and aborts the match
//! when it is exceeded. Every other stage is polynomial in the hypothesis
//! count.

use analogic_core::{ConceptGraph, GraphError, ItemId, Predicate};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap, HashSet, VecDeque};
use std::fmt::Debug;
use std::time::{Duration, Instant};
use thiserror::Error;

// ============================================================================
// Type Aliases
// ============================================================================

/// Identifier of a match hypothesis within a structure arena
pub type MhId = usize;

// ============================================================================
// Error Types
// ============================================================================

/// Errors in structure-mapping operations
#[derive(Error, Debug)]
pub enum MatchError {
    #[error("Rule '{rule}' failed: {message}")]
    RuleFailure { rule: String, message: String },
    #[error("Malformed graph: {0}")]
    Graph(#[from] GraphError),
    #[error("Combination timeout after {0:?}")]
    Timeout(Duration),
}

/// Result type for structure-mapping operations
pub type AnalogyResult<T> = Result<T, MatchError>;

// ============================================================================
// Match Options
// ============================================================================

/// Configuration for a single match invocation
///
/// Created per call and read-only thereafter; there is no process-wide state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MatchOptions {
    /// Attribute names dropped from both entities before content comparison
    pub unmatched_attributes: BTreeSet<String>,
    /// Deadline for the combination stage
    pub timeout: Duration,
}

impl Default for MatchOptions {
    fn default() -> Self {
        Self {
            unmatched_attributes: BTreeSet::new(),
            timeout: Duration::from_secs(30),
        }
    }
}

impl MatchOptions {
    /// Ignore the given attribute names during emap content comparison
    pub fn with_unmatched_attributes<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.unmatched_attributes = names.into_iter().map(Into::into).collect();
        self
    }
}

// ============================================================================
// Match Hypotheses
// ============================================================================

/// A match hypothesis: one candidate pairing of a base item with a target item
///
/// Both sides are always of the same kind (entities or expressions); kind
/// crossing is rejected when hypotheses are generated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Mh {
    /// Item in the base graph
    pub base: ItemId,
    /// Item in the target graph
    pub target: ItemId,
}

impl Mh {
    /// Create a match hypothesis
    pub fn new(base: ItemId, target: ItemId) -> Self {
        Self { base, target }
    }
}

/// Structural record derived for one match hypothesis
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MhRecord {
    /// The hypothesis itself
    pub mh: Mh,
    /// Whether both sides are entities
    pub emap: bool,
    /// Emap hypotheses participating in this hypothesis' subtree
    pub emaps: BTreeSet<MhId>,
    /// Other hypotheses aliasing this one's base or target
    pub nogood: BTreeSet<MhId>,
    /// Hypotheses pairing the positional arguments of this one's expressions
    pub children: BTreeSet<MhId>,
}

// ============================================================================
// Rule Engine
// ============================================================================

/// The two graphs visible to rules during a match
pub struct MatchContext<'a> {
    /// Base graph
    pub base: &'a ConceptGraph,
    /// Target graph
    pub target: &'a ConceptGraph,
}

/// Outcome of a single rule application; an `Err` aborts the whole match
pub type RuleOutcome<T> = Result<T, String>;

/// Filter rule: maps a candidate item pair to at most one hypothesis
pub type FilterRule =
    Box<dyn Fn(&MatchContext, ItemId, ItemId) -> RuleOutcome<Option<Mh>> + Send + Sync>;

/// Intern rule: derives further hypotheses from an existing one
pub type InternRule = Box<dyn Fn(&MatchContext, Mh) -> RuleOutcome<Vec<Mh>> + Send + Sync>;

/// An ordered collection of filter and intern rules
///
/// Filter rules run over the full cartesian product of base and target items;
/// intern rules run transitively to fixpoint over every produced hypothesis.
/// Rules must be pure.
pub struct Ruleset {
    filters: Vec<(String, FilterRule)>,
    interns: Vec<(String, InternRule)>,
}

impl Default for Ruleset {
    fn default() -> Self {
        Self::new()
    }
}

impl Ruleset {
    /// Create an empty ruleset
    pub fn new() -> Self {
        Self {
            filters: Vec::new(),
            interns: Vec::new(),
        }
    }

    /// Add a filter rule
    pub fn add_filter<F>(&mut self, name: impl Into<String>, rule: F)
    where
        F: Fn(&MatchContext, ItemId, ItemId) -> RuleOutcome<Option<Mh>> + Send + Sync + 'static,
    {
        self.filters.push((name.into(), Box::new(rule)));
    }

    /// Add an intern rule
    pub fn add_intern<F>(&mut self, name: impl Into<String>, rule: F)
    where
        F: Fn(&MatchContext, Mh) -> RuleOutcome<Vec<Mh>> + Send + Sync + 'static,
    {
        self.interns.push((name.into(), Box::new(rule)));
    }

    /// Number of rules across both families
    pub fn len(&self) -> usize {
        self.filters.len() + self.interns.len()
    }

    /// Check if the ruleset is empty
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// The literal-similarity default ruleset
    ///
    /// Pairs expressions with identical functors, aligns the positional
    /// arguments of paired expressions (entities pair directly; function
    /// expressions pair even under different functor names), and interns
    /// entity pairs wherever both parents align.
    pub fn literal_similarity() -> Self {
        let mut rules = Self::new();

        rules.add_filter("same-functor", |ctx, base, target| {
            let (base_item, target_item) = (&ctx.base.graph[base], &ctx.target.graph[target]);
            match (base_item.functor(), target_item.functor()) {
                (Some(bf), Some(tf)) if bf.name == tf.name && bf.arity == tf.arity => {
                    Ok(Some(Mh::new(base, target)))
                }
                _ => Ok(None),
            }
        });

        rules.add_intern("argument-alignment", |ctx, mh| {
            let mut derived = Vec::new();
            if !ctx.base.is_expression(mh.base) || !ctx.target.is_expression(mh.target) {
                return Ok(derived);
            }
            let base_args = ctx.base.args(mh.base);
            let target_args = ctx.target.args(mh.target);
            if base_args.len() != target_args.len() {
                return Ok(derived);
            }
            for (&b, &t) in base_args.iter().zip(target_args.iter()) {
                if ctx.base.is_entity(b) && ctx.target.is_entity(t) {
                    derived.push(Mh::new(b, t));
                } else if let (Ok(bf), Ok(tf)) = (ctx.base.functor(b), ctx.target.functor(t)) {
                    // Functions align under a shared parent even when named
                    // differently
                    if bf.is_function() && tf.is_function() && bf.arity == tf.arity {
                        derived.push(Mh::new(b, t));
                    }
                }
            }
            Ok(derived)
        });

        rules
    }
}

impl Debug for Ruleset {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Ruleset")
            .field("filters", &self.filters.len())
            .field("interns", &self.interns.len())
            .finish()
    }
}

/// Reject hypotheses that cross the entity/expression kinds or reference
/// unknown items
fn check_hypothesis(ctx: &MatchContext, rule: &str, mh: Mh) -> AnalogyResult<()> {
    let base = ctx.base.graph.node_weight(mh.base);
    let target = ctx.target.graph.node_weight(mh.target);
    let malformed = match (base, target) {
        (Some(b), Some(t)) => b.is_entity() != t.is_entity(),
        _ => true,
    };
    if malformed {
        return Err(MatchError::RuleFailure {
            rule: rule.to_string(),
            message: format!(
                "returned malformed hypothesis {:?} -> {:?}",
                mh.base, mh.target
            ),
        });
    }
    Ok(())
}

/// Run filter rules over the item cartesian product, then intern rules to
/// fixpoint
///
/// Termination is guaranteed: the hypothesis universe is bounded by the item
/// product of the two graphs and results accumulate in a set.
fn generate_hypotheses(ctx: &MatchContext, rules: &Ruleset) -> AnalogyResult<Vec<Mh>> {
    let mut seen: HashSet<Mh> = HashSet::new();
    let mut queue: VecDeque<Mh> = VecDeque::new();

    for base in ctx.base.items() {
        for target in ctx.target.items() {
            for (name, rule) in &rules.filters {
                match rule(ctx, base, target) {
                    Ok(Some(mh)) => {
                        check_hypothesis(ctx, name, mh)?;
                        if seen.insert(mh) {
                            queue.push_back(mh);
                        }
                    }
                    Ok(None) => {}
                    Err(message) => {
                        return Err(MatchError::RuleFailure {
                            rule: name.clone(),
                            message,
                        })
                    }
                }
            }
        }
    }

    while let Some(mh) = queue.pop_front() {
        for (name, rule) in &rules.interns {
            let derived = rule(ctx, mh).map_err(|message| MatchError::RuleFailure {
                rule: name.clone(),
                message,
            })?;
            for d in derived {
                check_hypothesis(ctx, name, d)?;
                if seen.insert(d) {
                    queue.push_back(d);
                }
            }
        }
    }

    let mut hypotheses: Vec<Mh> = seen.into_iter().collect();
    hypotheses.sort();
    Ok(hypotheses)
}

// ============================================================================
// Hypothesis Structure
// ============================================================================

/// Arena of match hypotheses with their structural records
///
/// Built in two phases: local annotation (emaps, nogoods, children from the
/// base/target alias multimaps) followed by memoised upward propagation of
/// emaps and nogoods through the children relation. Read-only afterwards.
#[derive(Debug, Serialize, Deserialize)]
pub struct MhStructure {
    records: Vec<MhRecord>,
    roots: Vec<MhId>,
    /// Reverse lookup, rebuilt on demand rather than serialized
    #[serde(skip)]
    index: HashMap<Mh, MhId>,
}

impl MhStructure {
    /// Annotate a hypothesis set against its two graphs
    pub fn build(ctx: &MatchContext, hypotheses: &[Mh]) -> Self {
        let mut by_base: HashMap<ItemId, BTreeSet<MhId>> = HashMap::new();
        let mut by_target: HashMap<ItemId, BTreeSet<MhId>> = HashMap::new();
        let mut index = HashMap::new();
        for (id, &mh) in hypotheses.iter().enumerate() {
            by_base.entry(mh.base).or_default().insert(id);
            by_target.entry(mh.target).or_default().insert(id);
            index.insert(mh, id);
        }

        // Phase 1: local annotation
        let mut records: Vec<MhRecord> = Vec::with_capacity(hypotheses.len());
        for (id, &mh) in hypotheses.iter().enumerate() {
            let emap = ctx.base.is_entity(mh.base) && ctx.target.is_entity(mh.target);

            let mut nogood: BTreeSet<MhId> = by_base[&mh.base]
                .union(&by_target[&mh.target])
                .copied()
                .collect();
            nogood.remove(&id);

            let mut children = BTreeSet::new();
            if !emap {
                let base_args = ctx.base.args(mh.base);
                let target_args = ctx.target.args(mh.target);
                if base_args.len() == target_args.len() {
                    for (b, t) in base_args.iter().zip(target_args.iter()) {
                        if let (Some(bs), Some(ts)) = (by_base.get(b), by_target.get(t)) {
                            children.extend(bs.intersection(ts).copied());
                        }
                    }
                }
            }

            let emaps = if emap {
                BTreeSet::from([id])
            } else {
                BTreeSet::new()
            };

            records.push(MhRecord {
                mh,
                emap,
                emaps,
                nogood,
                children,
            });
        }

        let mut structure = Self {
            records,
            roots: Vec::new(),
            index,
        };

        // Phase 2: propagate emaps and nogoods upward
        structure.propagate();

        // A root is a hypothesis that is no other hypothesis' child
        let mut child_ids: HashSet<MhId> = HashSet::new();
        for record in &structure.records {
            child_ids.extend(record.children.iter().copied());
        }
        structure.roots = (0..structure.records.len())
            .filter(|id| !child_ids.contains(id))
            .collect();

        structure
    }

    /// Depth-first propagation over the acyclic children relation
    fn propagate(&mut self) {
        let mut done = vec![false; self.records.len()];
        for id in 0..self.records.len() {
            self.propagate_into(id, &mut done);
        }
    }

    fn propagate_into(&mut self, id: MhId, done: &mut [bool]) {
        if done[id] {
            return;
        }
        done[id] = true;

        let children: Vec<MhId> = self.records[id].children.iter().copied().collect();
        for &child in &children {
            self.propagate_into(child, done);
        }

        let mut emaps = std::mem::take(&mut self.records[id].emaps);
        let mut nogood = std::mem::take(&mut self.records[id].nogood);
        for &child in &children {
            emaps.extend(self.records[child].emaps.iter().copied());
            nogood.extend(self.records[child].nogood.iter().copied());
        }
        self.records[id].emaps = emaps;
        self.records[id].nogood = nogood;
    }

    /// Number of hypotheses
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Check if there are no hypotheses
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// The structural record of a hypothesis
    pub fn record(&self, id: MhId) -> &MhRecord {
        &self.records[id]
    }

    /// All structural records in id order
    pub fn records(&self) -> &[MhRecord] {
        &self.records
    }

    /// Look up the id of a hypothesis
    pub fn id_of(&self, mh: Mh) -> Option<MhId> {
        self.index.get(&mh).copied()
    }

    /// Hypotheses that are no other hypothesis' child
    pub fn roots(&self) -> &[MhId] {
        &self.roots
    }

    /// Whether a hypothesis' structure is internally consistent
    pub fn is_consistent(&self, id: MhId) -> bool {
        let record = &self.records[id];
        record.emaps.is_disjoint(&record.nogood)
    }

    /// The hypothesis and all its descendants through the children relation
    pub fn descendant_closure(&self, root: MhId) -> BTreeSet<MhId> {
        let mut closure = BTreeSet::new();
        let mut stack = vec![root];
        while let Some(id) = stack.pop() {
            if closure.insert(id) {
                for &child in &self.records[id].children {
                    if !closure.contains(&child) {
                        stack.push(child);
                    }
                }
            }
        }
        closure
    }
}

// ============================================================================
// GMaps
// ============================================================================

/// Names of the two graphs a mapping connects
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MappingDesc {
    /// Base graph name
    pub base: String,
    /// Target graph name
    pub target: String,
}

/// A global mapping: a self-consistent bundle of match hypotheses
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Gmap {
    /// Member hypotheses
    pub mhs: BTreeSet<MhId>,
    /// Root hypotheses
    pub roots: BTreeSet<MhId>,
    /// Emap hypotheses in the bundle
    pub emaps: BTreeSet<MhId>,
    /// Hypotheses conflicting with the bundle
    pub nogood: BTreeSet<MhId>,
    /// Structural evaluation score
    pub score: usize,
    /// Emap hypotheses whose entities are content-equal
    pub emap_matches: usize,
    /// The two graphs this mapping connects
    pub mapping: MappingDesc,
    /// Candidate inferences: unmatched base expressions implied by the mapping
    pub inferences: Vec<ItemId>,
    /// Inferences rewritten onto the target, when transfer succeeded
    pub transferred: Option<Vec<InferredExpr>>,
}

impl Gmap {
    /// Whether the mapping merges no conflicting structure
    pub fn is_consistent(&self) -> bool {
        self.emaps.is_disjoint(&self.nogood)
    }

    /// Whether two mappings cannot coexist
    pub fn conflicts_with(&self, other: &Gmap) -> bool {
        !self.mhs.is_disjoint(&other.nogood) || !other.mhs.is_disjoint(&self.nogood)
    }

    /// Ordered (base, target) item pairs of the mapping
    pub fn pairs(&self, structure: &MhStructure) -> Vec<(ItemId, ItemId)> {
        self.mhs
            .iter()
            .map(|&id| {
                let mh = structure.record(id).mh;
                (mh.base, mh.target)
            })
            .collect()
    }
}

/// Construct initial GMaps from consistent hypothesis roots
///
/// Inconsistent roots are split into their children, recursively, so every
/// emitted GMap is consistent. Identical bundles reachable from two split
/// roots are emitted once.
fn build_gmaps(structure: &MhStructure, mapping: &MappingDesc) -> Vec<Gmap> {
    let mut gmaps = Vec::new();
    let mut seen: HashSet<BTreeSet<MhId>> = HashSet::new();
    for &root in structure.roots() {
        collect_gmaps(structure, root, mapping, &mut gmaps, &mut seen);
    }
    gmaps
}

fn collect_gmaps(
    structure: &MhStructure,
    id: MhId,
    mapping: &MappingDesc,
    gmaps: &mut Vec<Gmap>,
    seen: &mut HashSet<BTreeSet<MhId>>,
) {
    if structure.is_consistent(id) {
        let mhs = structure.descendant_closure(id);
        if seen.insert(mhs.clone()) {
            let record = structure.record(id);
            gmaps.push(Gmap {
                mhs,
                roots: BTreeSet::from([id]),
                emaps: record.emaps.clone(),
                nogood: record.nogood.clone(),
                score: 0,
                emap_matches: 0,
                mapping: mapping.clone(),
                inferences: Vec::new(),
                transferred: None,
            });
        }
    } else {
        for &child in &structure.record(id).children {
            collect_gmaps(structure, child, mapping, gmaps, seen);
        }
    }
}

// ============================================================================
// Combination (maximal consistent subsets)
// ============================================================================

/// Enumerate every maximal internally consistent subset of the GMap set
///
/// Formulated as maximal-clique enumeration (Bron-Kerbosch with pivoting) on
/// the compatibility graph, whose edges connect mutually consistent GMaps;
/// these are exactly the maximal independent sets of the conflict graph. Each
/// maximal subset is returned exactly once.
fn maximal_consistent_sets(
    gmaps: &[Gmap],
    deadline: Instant,
    timeout: Duration,
) -> AnalogyResult<Vec<Vec<usize>>> {
    let n = gmaps.len();
    if n == 0 {
        return Ok(Vec::new());
    }

    let mut compatible: Vec<BTreeSet<usize>> = vec![BTreeSet::new(); n];
    for i in 0..n {
        for j in (i + 1)..n {
            if !gmaps[i].conflicts_with(&gmaps[j]) {
                compatible[i].insert(j);
                compatible[j].insert(i);
            }
        }
    }

    let mut sets = Vec::new();
    let mut current = BTreeSet::new();
    bron_kerbosch(
        &compatible,
        &mut current,
        (0..n).collect(),
        BTreeSet::new(),
        &mut sets,
        deadline,
        timeout,
    )?;
    Ok(sets)
}

fn bron_kerbosch(
    compatible: &[BTreeSet<usize>],
    current: &mut BTreeSet<usize>,
    mut candidates: BTreeSet<usize>,
    mut excluded: BTreeSet<usize>,
    sets: &mut Vec<Vec<usize>>,
    deadline: Instant,
    timeout: Duration,
) -> AnalogyResult<()> {
    if Instant::now() >= deadline {
        return Err(MatchError::Timeout(timeout));
    }
    if candidates.is_empty() && excluded.is_empty() {
        sets.push(current.iter().copied().collect());
        return Ok(());
    }

    // Pivot on the vertex covering the most candidates
    let pivot = candidates
        .iter()
        .chain(excluded.iter())
        .copied()
        .max_by_key(|&u| compatible[u].intersection(&candidates).count())
        .expect("candidates or excluded is non-empty");

    let branch: Vec<usize> = candidates
        .difference(&compatible[pivot])
        .copied()
        .collect();
    for v in branch {
        let neighbours = &compatible[v];
        current.insert(v);
        bron_kerbosch(
            compatible,
            current,
            candidates.intersection(neighbours).copied().collect(),
            excluded.intersection(neighbours).copied().collect(),
            sets,
            deadline,
            timeout,
        )?;
        current.remove(&v);
        candidates.remove(&v);
        excluded.insert(v);
    }
    Ok(())
}

// ============================================================================
// Merging
// ============================================================================

/// Union each maximal consistent subset into a single GMap
///
/// Membership is preserved: the merged hypothesis set is exactly the union of
/// the component sets, and likewise for roots, emaps and nogoods.
fn merge_gmaps(sets: &[Vec<usize>], gmaps: &[Gmap], mapping: &MappingDesc) -> Vec<Gmap> {
    sets.iter()
        .map(|set| {
            let mut merged = Gmap {
                mhs: BTreeSet::new(),
                roots: BTreeSet::new(),
                emaps: BTreeSet::new(),
                nogood: BTreeSet::new(),
                score: 0,
                emap_matches: 0,
                mapping: mapping.clone(),
                inferences: Vec::new(),
                transferred: None,
            };
            for &i in set {
                merged.mhs.extend(gmaps[i].mhs.iter().copied());
                merged.roots.extend(gmaps[i].roots.iter().copied());
                merged.emaps.extend(gmaps[i].emaps.iter().copied());
                merged.nogood.extend(gmaps[i].nogood.iter().copied());
            }
            merged
        })
        .collect()
}

// ============================================================================
// Scoring
// ============================================================================

/// Trickle-down structural evaluation: each hypothesis contributes its depth,
/// so deeply nested alignments outscore flat ones
fn ses(structure: &MhStructure, id: MhId, depth: usize) -> usize {
    let children = &structure.record(id).children;
    if children.is_empty() {
        depth
    } else {
        depth
            + children
                .iter()
                .map(|&child| ses(structure, child, depth + 1))
                .sum::<usize>()
    }
}

/// Compute the structural score and entity content matches of a GMap
fn score_gmap(
    gmap: &mut Gmap,
    structure: &MhStructure,
    ctx: &MatchContext,
    options: &MatchOptions,
) {
    gmap.score = gmap.mhs.len()
        + gmap
            .roots
            .iter()
            .map(|&root| ses(structure, root, 0))
            .sum::<usize>();

    gmap.emap_matches = gmap
        .emaps
        .iter()
        .filter(|&&id| {
            let mh = structure.record(id).mh;
            match (ctx.base.entity(mh.base), ctx.target.entity(mh.target)) {
                (Some(b), Some(t)) => b.content_matches(t, &options.unmatched_attributes),
                _ => false,
            }
        })
        .count();
}

// ============================================================================
// Inference Transfer
// ============================================================================

/// An expression rewritten from the base onto the target
///
/// Leaves are existing target items; interior nodes carry the base functor
/// over rewritten arguments. No entities are ever synthesized.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum InferredExpr {
    /// An item the mapping already pairs: the target side is used directly
    Mapped(ItemId),
    /// A base expression with no counterpart, rebuilt over rewritten arguments
    Expr {
        /// Functor carried over from the base expression
        functor: Predicate,
        /// Rewritten arguments in positional order
        args: Vec<InferredExpr>,
    },
}

/// Unmatched base expressions implied by a mapping: ancestors of matched base
/// structure, expanded to their unmatched descendant expressions
fn candidate_inferences(
    gmap: &Gmap,
    structure: &MhStructure,
    base: &ConceptGraph,
) -> Vec<ItemId> {
    let matched: HashSet<ItemId> = gmap
        .mhs
        .iter()
        .map(|&id| structure.record(id).mh.base)
        .collect();
    let matched_exprs: HashSet<ItemId> = matched
        .iter()
        .copied()
        .filter(|&item| base.is_expression(item))
        .collect();

    let ancestors: Vec<ItemId> = base
        .expressions()
        .into_iter()
        .filter(|item| !matched.contains(item))
        .filter(|&item| base.is_ancestor_of(&matched_exprs, item))
        .collect();

    let mut inferences: BTreeSet<ItemId> = BTreeSet::new();
    for ancestor in ancestors {
        for item in base.descendants(ancestor) {
            if base.is_expression(item) && !matched.contains(&item) {
                inferences.insert(item);
            }
        }
    }
    inferences.into_iter().collect()
}

/// Rewrite one base expression through the mapping's pair function
///
/// Returns `None` when the rewrite reaches an entity the mapping does not
/// pair; the caller treats that as a local, silent abort.
pub fn transfer_expression(
    base: &ConceptGraph,
    pairs: &HashMap<ItemId, ItemId>,
    item: ItemId,
) -> Option<InferredExpr> {
    if let Some(&mapped) = pairs.get(&item) {
        return Some(InferredExpr::Mapped(mapped));
    }
    if base.is_entity(item) {
        return None;
    }
    let functor = base.functor(item).ok()?.clone();
    let mut args = Vec::new();
    for arg in base.args(item) {
        args.push(transfer_expression(base, pairs, arg)?);
    }
    Some(InferredExpr::Expr { functor, args })
}

/// Extract candidate inferences and attempt to transfer them onto the target
///
/// A failed transfer leaves the GMap without `transferred`; the failure is
/// local to this GMap and not surfaced as an error.
fn transfer_gmap(gmap: &mut Gmap, structure: &MhStructure, ctx: &MatchContext) {
    gmap.inferences = candidate_inferences(gmap, structure, ctx.base);
    if gmap.inferences.is_empty() {
        return;
    }

    let pairs: HashMap<ItemId, ItemId> = gmap
        .mhs
        .iter()
        .map(|&id| {
            let mh = structure.record(id).mh;
            (mh.base, mh.target)
        })
        .collect();

    let mut transferred = Vec::new();
    for &inference in &gmap.inferences {
        match transfer_expression(ctx.base, &pairs, inference) {
            Some(expr) => transferred.push(expr),
            None => return,
        }
    }
    gmap.transferred = Some(transferred);
}

// ============================================================================
// Match Pipeline
// ============================================================================

/// Output of a match: scored GMaps plus the annotated hypothesis structure
#[derive(Debug, Serialize, Deserialize)]
pub struct MatchResult {
    /// Merged, scored global mappings, best first
    pub gmaps: Vec<Gmap>,
    /// The annotated hypothesis arena the GMaps index into
    pub structure: MhStructure,
}

/// Discover the maximal analogical mappings between two concept graphs
///
/// With no ruleset, literal similarity is used. Empty results at any stage
/// are normal values: inputs admitting no mapping yield an empty GMap
/// collection, not an error.
///
/// # Errors
/// `MatchError::Graph` when either graph fails validation,
/// `MatchError::RuleFailure` when a rule fails or returns a malformed
/// hypothesis, and `MatchError::Timeout` when combination exceeds the
/// configured deadline.
pub fn match_graphs(
    base: &ConceptGraph,
    target: &ConceptGraph,
    ruleset: Option<&Ruleset>,
    options: &MatchOptions,
) -> AnalogyResult<MatchResult> {
    base.validate()?;
    target.validate()?;

    let default_rules;
    let rules = match ruleset {
        Some(rules) => rules,
        None => {
            default_rules = Ruleset::literal_similarity();
            &default_rules
        }
    };

    let ctx = MatchContext { base, target };
    let hypotheses = generate_hypotheses(&ctx, rules)?;
    let structure = MhStructure::build(&ctx, &hypotheses);

    let mapping = MappingDesc {
        base: base.name.clone(),
        target: target.name.clone(),
    };
    let initial = build_gmaps(&structure, &mapping);

    let deadline = Instant::now() + options.timeout;
    let sets = maximal_consistent_sets(&initial, deadline, options.timeout)?;
    let mut gmaps = merge_gmaps(&sets, &initial, &mapping);

    for gmap in &mut gmaps {
        score_gmap(gmap, &structure, &ctx, options);
        transfer_gmap(gmap, &structure, &ctx);
    }
    gmaps.sort_by(|a, b| {
        (b.score, b.emap_matches)
            .cmp(&(a.score, a.emap_matches))
            .then_with(|| a.mhs.cmp(&b.mhs))
    });

    Ok(MatchResult { gmaps, structure })
}

/// The highest-scoring GMap, ties broken by entity content matches
pub fn best_gmap(gmaps: &[Gmap]) -> Option<&Gmap> {
    gmaps
        .iter()
        .max_by(|a, b| (a.score, a.emap_matches).cmp(&(b.score, b.emap_matches)))
}

// ============================================================================
// Tests
// ============================================================================
