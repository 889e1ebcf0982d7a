//! # The Memo
//!
//! The memo is the interned store at the center of the Cascades search. It
//! compactly represents an exponential space of equivalent plans as a DAG of
//! [`Group`]s (equivalence classes) whose members are [`GroupExpression`]s:
//! an operator plus child *group* ids rather than child expressions, so that
//! every subtree alternative is shared.
//!
//! ## Interning
//!
//! Two group expressions are equal iff their operators are equal (value
//! equality, payloads included) and their child group id sequences are
//! equal. The memo keeps one index entry per canonical key; inserting an
//! expression that already exists returns the existing one. This is what
//! makes rule application terminate: a rule that produces an already-known
//! expression inserts nothing and triggers no further exploration.
//!
//! ## Ownership
//!
//! Groups own their expressions; cross-references are plain [`GroupId`]s
//! into the memo's arena. The memo lives for one optimization call and is
//! dropped afterwards.
//!
//! ## Group merging
//!
//! A transformation may produce an expression that canonicalizes into a
//! *different* group than its source, proving the two groups logically
//! equivalent. The memo then merges them: the lower id survives, the other
//! id forwards to it, expression sets are unioned, winners are kept by
//! minimum cost, and every child reference is rewritten through the
//! forwarding table. Rewriting can reveal new collisions, which merge
//! recursively. Merged-away ids stay resolvable forever.
//!
//! ## Acyclicity
//!
//! The child relation over groups must stay acyclic. Inserting an
//! expression whose children transitively reach its target group, or
//! merging two groups that reach each other, indicates a broken rule and
//! fails the optimization with [`OptimizerError::CycleDetected`].

use crate::cost::Cost;
use crate::error::{OptResult, OptimizerError};
use crate::expr::{OpExpression, Operator, SortKey};
use crate::properties::PropertySet;
use crate::stats::Statistics;
use serde::{Deserialize, Serialize};
use std::collections::hash_map::Entry;
use std::collections::{HashMap, HashSet};
use std::fmt;
use tracing::{debug, trace};

/// Opaque identifier of a [`Group`].
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub struct GroupId(u32);

impl GroupId {
    fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for GroupId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "G{}", self.0)
    }
}

/// Opaque identifier of a [`GroupExpression`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ExprId(u32);

impl ExprId {
    fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for ExprId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "E{}", self.0)
    }
}

/// A canonicalized expression: one operator plus child group ids.
///
/// Stats and costs are memoized here per output property set, recorded by
/// the driver's stats-and-cost derivation.
#[derive(Debug)]
pub struct GroupExpression {
    op: Operator,
    children: Vec<GroupId>,
    group: GroupId,
    stats: HashMap<PropertySet, Statistics>,
    cost: HashMap<PropertySet, Cost>,
    applied_rules: HashSet<u64>,
}

impl GroupExpression {
    pub fn op(&self) -> &Operator {
        &self.op
    }

    pub fn children(&self) -> &[GroupId] {
        &self.children
    }

    /// The owning group.
    pub fn group_id(&self) -> GroupId {
        self.group
    }

    pub fn stats_for(&self, output_props: &PropertySet) -> Option<&Statistics> {
        self.stats.get(output_props)
    }

    pub fn cost_for(&self, output_props: &PropertySet) -> Option<Cost> {
        self.cost.get(output_props).copied()
    }

    pub fn record_stats_and_cost(
        &mut self,
        output_props: PropertySet,
        stats: Statistics,
        cost: Cost,
    ) {
        self.stats.insert(output_props.clone(), stats);
        self.cost.insert(output_props, cost);
    }

    /// Output property sets this expression has been costed for.
    pub fn costed_props(&self) -> impl Iterator<Item = (&PropertySet, Cost)> {
        self.cost.iter().map(|(p, c)| (p, *c))
    }
}

/// The plan currently known to be cheapest for one required property set.
#[derive(Debug, Clone)]
pub enum Winner {
    /// A costed physical expression, with the output properties it was
    /// costed under and the input property set chosen for each child.
    Expr {
        expr: ExprId,
        cost: Cost,
        output_props: PropertySet,
        input_props: Vec<PropertySet>,
    },
    /// A sort enforcer on top of the same group's winner for the weaker
    /// requirement `input_req`.
    Enforced {
        order: Vec<SortKey>,
        cost: Cost,
        input_req: PropertySet,
    },
}

impl Winner {
    pub fn cost(&self) -> Cost {
        match self {
            Winner::Expr { cost, .. } | Winner::Enforced { cost, .. } => *cost,
        }
    }
}

/// An equivalence class of logically equivalent expressions.
#[derive(Debug)]
pub struct Group {
    id: GroupId,
    exprs: Vec<ExprId>,
    /// All logical rules have reached a fixpoint over this group's
    /// expressions. Reset when a new logical expression joins the group.
    pub explored: bool,
    /// All implementation rules have been applied.
    pub implemented: bool,
    /// Best known plan per required property set.
    pub best: HashMap<PropertySet, Winner>,
}

impl Group {
    fn new(id: GroupId) -> Self {
        Self {
            id,
            exprs: Vec::new(),
            explored: false,
            implemented: false,
            best: HashMap::new(),
        }
    }

    pub fn id(&self) -> GroupId {
        self.id
    }

    /// Member expressions in insertion order.
    pub fn exprs(&self) -> &[ExprId] {
        &self.exprs
    }
}

/// Result of a memo insertion.
#[derive(Debug, Clone, Copy)]
pub struct InsertResult {
    pub group: GroupId,
    pub expr: ExprId,
    /// False when the canonical key already existed.
    pub inserted: bool,
}

/// The interned store of groups and group expressions.
#[derive(Debug, Default)]
pub struct Memo {
    groups: Vec<Group>,
    exprs: Vec<GroupExpression>,
    interned: HashMap<(Operator, Vec<GroupId>), ExprId>,
    /// Merged-away group id to its survivor.
    forwarded: HashMap<GroupId, GroupId>,
}

impl Memo {
    pub fn new() -> Self {
        Self::default()
    }

    /// Follows the forwarding table to the surviving group id. Ids of
    /// never-merged groups map to themselves.
    pub fn resolve(&self, id: GroupId) -> GroupId {
        Self::resolve_from(&self.forwarded, id)
    }

    fn resolve_from(forwarded: &HashMap<GroupId, GroupId>, mut id: GroupId) -> GroupId {
        while let Some(&next) = forwarded.get(&id) {
            id = next;
        }
        id
    }

    pub fn group(&self, id: GroupId) -> &Group {
        let id = self.resolve(id);
        &self.groups[id.index()]
    }

    pub fn group_mut(&mut self, id: GroupId) -> &mut Group {
        let id = self.resolve(id);
        &mut self.groups[id.index()]
    }

    pub fn expr(&self, id: ExprId) -> &GroupExpression {
        &self.exprs[id.index()]
    }

    pub fn expr_mut(&mut self, id: ExprId) -> &mut GroupExpression {
        &mut self.exprs[id.index()]
    }

    /// Number of live (unmerged) groups.
    pub fn num_groups(&self) -> usize {
        self.groups.len() - self.forwarded.len()
    }

    /// Number of expressions reachable through live groups.
    pub fn num_exprs(&self) -> usize {
        self.live_group_ids().map(|g| self.groups[g.index()].exprs.len()).sum()
    }

    /// Ids of all live groups in ascending order.
    pub fn live_group_ids(&self) -> impl Iterator<Item = GroupId> + '_ {
        (0..self.groups.len() as u32)
            .map(GroupId)
            .filter(|g| !self.forwarded.contains_key(g))
    }

    pub fn rule_applied(&self, expr: ExprId, rule_hash: u64) -> bool {
        self.exprs[expr.index()].applied_rules.contains(&rule_hash)
    }

    pub fn mark_rule_applied(&mut self, expr: ExprId, rule_hash: u64) {
        self.exprs[expr.index()].applied_rules.insert(rule_hash);
    }

    /// Inserts a canonicalized expression.
    ///
    /// With `target = None` a fresh key creates a new group; with
    /// `target = Some(g)` the expression joins `g`, recording that it is
    /// logically equivalent to `g`'s members. A key hit in a different
    /// group than the target merges the two groups.
    pub fn insert(
        &mut self,
        op: Operator,
        children: Vec<GroupId>,
        target: Option<GroupId>,
    ) -> OptResult<InsertResult> {
        if matches!(op, Operator::Leaf(_)) {
            return Err(OptimizerError::Internal(
                "leaf placeholders cannot be interned".into(),
            ));
        }
        let children: Vec<GroupId> = children.into_iter().map(|c| self.resolve(c)).collect();
        let target = target.map(|t| self.resolve(t));

        if let Some(t) = target {
            for &child in &children {
                if child == t || self.reaches(child, t) {
                    return Err(OptimizerError::CycleDetected(t));
                }
            }
        }

        let key = (op.clone(), children.clone());
        if let Some(&existing) = self.interned.get(&key) {
            let owner = self.resolve(self.exprs[existing.index()].group);
            let group = match target {
                Some(t) if t != owner => self.merge_groups(owner, t)?,
                _ => owner,
            };
            return Ok(InsertResult {
                group,
                expr: existing,
                inserted: false,
            });
        }

        let group = match target {
            Some(t) => t,
            None => {
                let id = GroupId(self.groups.len() as u32);
                self.groups.push(Group::new(id));
                id
            }
        };
        let expr = ExprId(self.exprs.len() as u32);
        self.exprs.push(GroupExpression {
            op: op.clone(),
            children,
            group,
            stats: HashMap::new(),
            cost: HashMap::new(),
            applied_rules: HashSet::new(),
        });
        self.groups[group.index()].exprs.push(expr);
        self.interned.insert(key, expr);
        if op.is_logical() {
            // New logical member: the group's rule fixpoint must be redone.
            let g = &mut self.groups[group.index()];
            g.explored = false;
            g.implemented = false;
        }
        trace!(%group, %expr, op = op.name(), "memo insert");
        Ok(InsertResult {
            group,
            expr,
            inserted: true,
        })
    }

    /// Memoizes an operator tree leaves-up and inserts the root, optionally
    /// into `target`. [`Operator::Leaf`] children resolve to their group
    /// directly.
    pub fn insert_expression_tree_into(
        &mut self,
        tree: &OpExpression,
        target: Option<GroupId>,
    ) -> OptResult<InsertResult> {
        if matches!(tree.op, Operator::Leaf(_)) {
            return Err(OptimizerError::Internal(
                "expression tree rooted at a leaf placeholder".into(),
            ));
        }
        let children = tree
            .children
            .iter()
            .map(|c| self.memoize(c))
            .collect::<OptResult<Vec<_>>>()?;
        self.insert(tree.op.clone(), children, target)
    }

    /// Memoizes an operator tree leaves-up, creating groups as needed.
    pub fn insert_expression_tree(&mut self, tree: &OpExpression) -> OptResult<InsertResult> {
        self.insert_expression_tree_into(tree, None)
    }

    fn memoize(&mut self, tree: &OpExpression) -> OptResult<GroupId> {
        if let Operator::Leaf(group) = tree.op {
            return Ok(self.resolve(group));
        }
        let children = tree
            .children
            .iter()
            .map(|c| self.memoize(c))
            .collect::<OptResult<Vec<_>>>()?;
        Ok(self.insert(tree.op.clone(), children, None)?.group)
    }

    /// True when `needle` is reachable from `from` over child edges.
    fn reaches(&self, from: GroupId, needle: GroupId) -> bool {
        let mut stack = vec![self.resolve(from)];
        let mut visited = HashSet::new();
        while let Some(g) = stack.pop() {
            if !visited.insert(g) {
                continue;
            }
            for &eid in &self.groups[g.index()].exprs {
                for &child in &self.exprs[eid.index()].children {
                    let child = self.resolve(child);
                    if child == needle {
                        return true;
                    }
                    stack.push(child);
                }
            }
        }
        false
    }

    /// Merges two groups proven logically equivalent. The lower id
    /// survives; all references to the other are redirected.
    fn merge_groups(&mut self, a: GroupId, b: GroupId) -> OptResult<GroupId> {
        let a = self.resolve(a);
        let b = self.resolve(b);
        if a == b {
            return Ok(a);
        }
        let (into, from) = if a <= b { (a, b) } else { (b, a) };
        if self.reaches(into, from) || self.reaches(from, into) {
            return Err(OptimizerError::CycleDetected(into));
        }
        debug!(%into, %from, "merging groups");
        self.forwarded.insert(from, into);

        let moved = std::mem::take(&mut self.groups[from.index()].exprs);
        for &eid in &moved {
            self.exprs[eid.index()].group = into;
        }
        self.groups[into.index()].exprs.extend(moved);

        let from_best = std::mem::take(&mut self.groups[from.index()].best);
        for (req, winner) in from_best {
            match self.groups[into.index()].best.entry(req) {
                Entry::Vacant(v) => {
                    v.insert(winner);
                }
                Entry::Occupied(mut o) => {
                    if winner.cost() < o.get().cost() {
                        o.insert(winner);
                    }
                }
            }
        }

        let from_explored = self.groups[from.index()].explored;
        let from_implemented = self.groups[from.index()].implemented;
        let g = &mut self.groups[into.index()];
        g.explored &= from_explored;
        g.implemented &= from_implemented;

        self.reintern()?;
        Ok(self.resolve(into))
    }

    /// Rewrites all child references through the forwarding table and
    /// rebuilds the interning index. Duplicates inside one group fold into
    /// the first occurrence; a duplicate across two groups proves those
    /// groups equivalent and merges them (recursively).
    fn reintern(&mut self) -> OptResult<()> {
        {
            let forwarded = &self.forwarded;
            for e in &mut self.exprs {
                e.group = Self::resolve_from(forwarded, e.group);
                for c in &mut e.children {
                    *c = Self::resolve_from(forwarded, *c);
                }
            }
        }

        let mut map: HashMap<(Operator, Vec<GroupId>), ExprId> =
            HashMap::with_capacity(self.interned.len());
        let mut conflict: Option<(GroupId, GroupId)> = None;
        let mut duplicates: Vec<(ExprId, ExprId)> = Vec::new();
        for gid in self.live_group_ids().collect::<Vec<_>>() {
            for &eid in &self.groups[gid.index()].exprs {
                let e = &self.exprs[eid.index()];
                let key = (e.op.clone(), e.children.clone());
                match map.entry(key) {
                    Entry::Vacant(v) => {
                        v.insert(eid);
                    }
                    Entry::Occupied(o) => {
                        let survivor = *o.get();
                        let survivor_group = self.exprs[survivor.index()].group;
                        if survivor_group != gid {
                            conflict.get_or_insert((survivor_group, gid));
                        } else {
                            duplicates.push((eid, survivor));
                        }
                    }
                }
            }
        }
        self.interned = map;

        for (dup, survivor) in duplicates {
            trace!(%dup, %survivor, "folding duplicate expression");
            let applied = std::mem::take(&mut self.exprs[dup.index()].applied_rules);
            self.exprs[survivor.index()].applied_rules.extend(applied);
            let stats = std::mem::take(&mut self.exprs[dup.index()].stats);
            for (k, v) in stats {
                self.exprs[survivor.index()].stats.entry(k).or_insert(v);
            }
            let cost = std::mem::take(&mut self.exprs[dup.index()].cost);
            for (k, v) in cost {
                self.exprs[survivor.index()].cost.entry(k).or_insert(v);
            }
            let g = self.exprs[dup.index()].group;
            self.groups[g.index()].exprs.retain(|&e| e != dup);
            for group in &mut self.groups {
                for winner in group.best.values_mut() {
                    if let Winner::Expr { expr, .. } = winner {
                        if *expr == dup {
                            *expr = survivor;
                        }
                    }
                }
            }
        }

        if let Some((a, b)) = conflict {
            self.merge_groups(a, b)?;
        }
        Ok(())
    }
}
