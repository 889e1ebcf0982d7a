//! # The Search Driver
//!
//! Top-down Cascades search over the memo, in three phases per group:
//!
//! 1. **Explore** -- apply transformation rules to every logical expression
//!    until no rule produces a new canonical key (a fixpoint over a growing
//!    expression list: a transformation can create a match for an earlier
//!    rule, so one pass is not enough).
//! 2. **Implement** -- apply implementation rules to every logical
//!    expression, populating the group with physical alternatives.
//! 3. **Optimize** -- recursively cost every physical alternative against a
//!    required property set, memoizing the winner per `(group, properties)`
//!    pair exactly like a DP table entry.
//!
//! Costing is bottom-up inside the top-down recursion: each candidate first
//! optimizes its children for the property sets it demands of them, then
//! derives its own statistics and cost from theirs. A child that cannot
//! satisfy its requirement makes the candidate infeasible -- never an error.
//!
//! ## Enforcement
//!
//! When a requirement includes a sort order that no physical alternative
//! provides natively (or provides only expensively), the group is also
//! optimized for the requirement minus the sort, and a `SortOp` enforcer on
//! top of that winner competes on cost. The enforcer lives in the winner
//! table, not in the memo, so the group graph stays acyclic.
//!
//! ## Determinism and isolation
//!
//! Rules fire in registration order over bindings in memo insertion order;
//! identical inputs and statistics yield identical plans. Each optimizer
//! value owns a fresh memo and is discarded after the call -- there is no
//! process-global state. A cooperative cancellation flag is checked at
//! group-level boundaries; cancellation unwinds and reports "no plan".

use crate::catalog::Catalog;
use crate::cost::{Cost, CostModel};
use crate::error::{OptResult, OptimizerError};
use crate::expr::{OpExpression, Operator, PhysicalOp};
use crate::memo::{ExprId, GroupId, Memo, Winner};
use crate::pattern::BindingIterator;
use crate::properties::{Property, PropertyKind, PropertySet};
use crate::rule::{OptContext, Rule, RuleRegistry};
use crate::stats::{self, Statistics};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, trace, warn};

/// Budgets and controls for one optimization call.
pub struct SearchConfig {
    /// Upper bound on live memo groups; new rule output is dropped beyond it.
    pub max_memo_groups: usize,
    /// Upper bound on total rule applications.
    pub max_iterations: usize,
    /// Cooperative cancellation, checked at group-level boundaries.
    pub cancel: Option<Arc<AtomicBool>>,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            max_memo_groups: 100_000,
            max_iterations: 1_000_000,
            cancel: None,
        }
    }
}

/// The cost-based optimizer.
///
/// A value type: construct one per optimization call (or reset by
/// constructing a new one). The rule registry, cost model, and catalog are
/// shared immutably.
pub struct Optimizer {
    pub memo: Memo,
    rules: Arc<RuleRegistry>,
    cost_model: Arc<dyn CostModel>,
    catalog: Arc<dyn Catalog>,
    config: SearchConfig,
    iterations: usize,
}

impl Optimizer {
    pub fn new(
        rules: Arc<RuleRegistry>,
        cost_model: Arc<dyn CostModel>,
        catalog: Arc<dyn Catalog>,
        config: SearchConfig,
    ) -> Self {
        Self {
            memo: Memo::new(),
            rules,
            cost_model,
            catalog,
            config,
            iterations: 0,
        }
    }

    /// Optimizes the first statement of a query.
    ///
    /// Returns `Ok(None)` for an empty statement list, when no physical
    /// plan covers `required`, or on cooperative cancellation. The returned
    /// tree contains only physical operators.
    pub fn build_plan(
        &mut self,
        statements: Vec<OpExpression>,
        required: &PropertySet,
    ) -> OptResult<Option<OpExpression>> {
        let Some(tree) = statements.into_iter().next() else {
            debug!("no statements supplied");
            return Ok(None);
        };
        let root = self.memo.insert_expression_tree(&tree)?;
        let root_group = root.group;
        debug!(%root_group, "starting optimization");

        match self.run(root_group, required) {
            Ok(()) => {}
            Err(OptimizerError::Cancelled) => {
                debug!("optimization cancelled");
                return Ok(None);
            }
            Err(e) => return Err(e),
        }

        let plan = self.choose_best_plan(root_group, required);
        match &plan {
            Some(_) => debug!(iterations = self.iterations, "optimization complete"),
            None => debug!("no physical plan covers the requirement"),
        }
        Ok(plan)
    }

    fn run(&mut self, root: GroupId, required: &PropertySet) -> OptResult<()> {
        self.explore_group(root)?;
        self.implement_group(root)?;
        self.optimize_group(root, required)
    }

    fn check_cancelled(&self) -> OptResult<()> {
        match &self.config.cancel {
            Some(flag) if flag.load(Ordering::Relaxed) => Err(OptimizerError::Cancelled),
            _ => Ok(()),
        }
    }

    fn budget_left(&self) -> bool {
        self.iterations < self.config.max_iterations
            && self.memo.num_groups() < self.config.max_memo_groups
    }

    /// Applies all transformation rules to every logical expression in the
    /// group until the expression list stops growing, then marks the group
    /// explored. Idempotent once marked.
    pub fn explore_group(&mut self, group: GroupId) -> OptResult<()> {
        self.check_cancelled()?;
        let gid = self.memo.resolve(group);
        if self.memo.group(gid).explored {
            return Ok(());
        }
        trace!(group = %gid, "explore_group");

        // Fixpoint over a growing expression list: rule application may add
        // members (and merges may fold some away), so re-snapshot until a
        // round finds nothing unprocessed.
        let mut processed = std::collections::HashSet::new();
        loop {
            let gid = self.memo.resolve(group);
            let pending: Vec<ExprId> = self
                .memo
                .group(gid)
                .exprs()
                .iter()
                .copied()
                .filter(|e| !processed.contains(e))
                .collect();
            if pending.is_empty() {
                break;
            }
            for eid in pending {
                processed.insert(eid);
                if self.memo.expr(eid).op().is_logical() {
                    self.explore_expression(eid)?;
                }
            }
        }

        let gid = self.memo.resolve(group);
        self.memo.group_mut(gid).explored = true;
        Ok(())
    }

    /// Applies every transformation rule to one logical expression, in
    /// registration order, exploring any newly produced logical expression
    /// before moving on. Child groups are explored afterwards.
    fn explore_expression(&mut self, eid: ExprId) -> OptResult<()> {
        trace!(expr = %eid, op = self.memo.expr(eid).op().name(), "explore_expr");
        let rules = Arc::clone(&self.rules);
        for rule in rules.transformation_rules() {
            let produced = self.apply_rule(eid, rule)?;
            for new_expr in produced {
                if self.memo.expr(new_expr).op().is_logical() {
                    self.explore_expression(new_expr)?;
                }
            }
        }

        let children = self.memo.expr(eid).children().to_vec();
        for child in children {
            let child = self.memo.resolve(child);
            if !self.memo.group(child).explored {
                self.explore_group(child)?;
            }
        }
        Ok(())
    }

    /// Applies all implementation rules to the group's logical expressions
    /// and recurses into child groups, then marks the group implemented.
    /// Idempotent once marked.
    pub fn implement_group(&mut self, group: GroupId) -> OptResult<()> {
        self.check_cancelled()?;
        let gid = self.memo.resolve(group);
        if self.memo.group(gid).implemented {
            return Ok(());
        }
        trace!(group = %gid, "implement_group");

        let mut processed = std::collections::HashSet::new();
        loop {
            let gid = self.memo.resolve(group);
            let pending: Vec<ExprId> = self
                .memo
                .group(gid)
                .exprs()
                .iter()
                .copied()
                .filter(|e| !processed.contains(e))
                .collect();
            if pending.is_empty() {
                break;
            }
            for eid in pending {
                processed.insert(eid);
                if self.memo.expr(eid).op().is_logical() {
                    self.implement_expression(eid)?;
                }
            }
        }

        let gid = self.memo.resolve(group);
        self.memo.group_mut(gid).implemented = true;
        Ok(())
    }

    /// Applies implementation rules to one logical expression and recurses
    /// into unimplemented child groups.
    fn implement_expression(&mut self, eid: ExprId) -> OptResult<()> {
        let rules = Arc::clone(&self.rules);
        for rule in rules.implementation_rules() {
            self.apply_rule(eid, rule)?;
        }

        let children = self.memo.expr(eid).children().to_vec();
        for child in children {
            let child = self.memo.resolve(child);
            if !self.memo.group(child).implemented {
                self.implement_group(child)?;
            }
        }
        Ok(())
    }

    /// Binds, guards, transforms, and integrates one rule against one
    /// expression. Returns the ids of newly created expressions.
    ///
    /// A rule is applied to an expression at most once (fingerprint
    /// de-duplication); a failing transform is logged and produces nothing.
    fn apply_rule(&mut self, eid: ExprId, rule: &dyn Rule) -> OptResult<Vec<ExprId>> {
        if self.memo.rule_applied(eid, rule.rule_hash()) {
            return Ok(Vec::new());
        }
        if !self.budget_left() {
            debug!(rule = rule.name(), "search budget exhausted; skipping");
            return Ok(Vec::new());
        }
        self.iterations += 1;

        let target = self.memo.expr(eid).group_id();
        let pattern = rule.pattern();
        let bindings: Vec<OpExpression> =
            BindingIterator::new(&self.memo, eid, &pattern).collect();
        self.memo.mark_rule_applied(eid, rule.rule_hash());

        let mut produced = Vec::new();
        for plan in bindings {
            let ctx = OptContext {
                catalog: self.catalog.as_ref(),
            };
            if !rule.check(&plan, &ctx) {
                continue;
            }
            trace!(rule = rule.name(), expr = %eid, "rule_match");

            let outputs = match rule.transform(&plan, &ctx) {
                Ok(outputs) => outputs,
                Err(err) => {
                    warn!(rule = rule.name(), error = %err, "rule transform failed");
                    continue;
                }
            };
            for output in outputs {
                let result = self.memo.insert_expression_tree_into(&output, Some(target))?;
                if result.inserted {
                    trace!(
                        rule = rule.name(),
                        group = %result.group,
                        expr = %result.expr,
                        "rule_insert"
                    );
                    produced.push(result.expr);
                }
            }
        }
        Ok(produced)
    }

    /// Finds the cheapest plan for `(group, required)`, memoized in the
    /// group's winner table. Considers every physical member and, for sort
    /// requirements, a sort enforcer over the weaker requirement.
    pub fn optimize_group(&mut self, group: GroupId, required: &PropertySet) -> OptResult<()> {
        self.check_cancelled()?;
        let gid = self.memo.resolve(group);
        if self.memo.group(gid).best.contains_key(required) {
            return Ok(());
        }
        trace!(group = %gid, req = %required, "optimize_group");

        let exprs = self.memo.group(gid).exprs().to_vec();
        for eid in exprs {
            if self.memo.expr(eid).op().is_physical() {
                self.optimize_expression(eid, required)?;
            }
        }

        if let Some(Property::Sort(order)) = required.get(PropertyKind::Sort).cloned() {
            self.try_sort_enforcer(gid, required, order)?;
        }
        Ok(())
    }

    /// Costs a sort enforcer on top of the group's best plan for the
    /// requirement without its sort component, and records it as the winner
    /// when strictly cheaper than the incumbent.
    fn try_sort_enforcer(
        &mut self,
        gid: GroupId,
        required: &PropertySet,
        order: Vec<crate::expr::SortKey>,
    ) -> OptResult<()> {
        let base = required.without(PropertyKind::Sort);
        self.optimize_group(gid, &base)?;

        let gid = self.memo.resolve(gid);
        let Some(base_cost) = self.memo.group(gid).best.get(&base).map(Winner::cost) else {
            return Ok(());
        };
        let Some(input_stats) = self.best_stats(gid, &base) else {
            return Ok(());
        };

        let enforcer = PhysicalOp::SortOp {
            order: order.clone(),
        };
        let cost = self.cost_model.compute_cost(
            &enforcer,
            &input_stats,
            std::slice::from_ref(&input_stats),
            &[base_cost],
        );
        if cost.is_infinite() {
            return Ok(());
        }

        let incumbent = self.memo.group(gid).best.get(required).map(Winner::cost);
        if incumbent.map_or(true, |c| cost < c) {
            trace!(group = %gid, req = %required, cost = cost.value(), "best_update");
            self.memo.group_mut(gid).best.insert(
                required.clone(),
                Winner::Enforced {
                    order,
                    cost,
                    input_req: base,
                },
            );
        }
        Ok(())
    }

    /// Costs one physical expression against a requirement.
    ///
    /// For each `(output, inputs)` candidate from the child property
    /// derivation: optimize every child for its input property set, fetch
    /// the child winners' stats and costs, derive this expression's stats
    /// and cost, and record a new winner when the output covers the
    /// requirement at a strictly lower cost.
    fn optimize_expression(&mut self, eid: ExprId, required: &PropertySet) -> OptResult<()> {
        let Operator::Physical(op) = self.memo.expr(eid).op().clone() else {
            return Err(OptimizerError::Internal(format!(
                "optimize_expression on non-physical expression {eid}"
            )));
        };
        let children = self.memo.expr(eid).children().to_vec();

        for (output_props, input_props) in derive_child_properties(&op, children.len(), required) {
            trace!(expr = %eid, op = op.name(), output = %output_props, "cost_candidate");

            let mut child_stats = Vec::with_capacity(children.len());
            let mut child_costs = Vec::with_capacity(children.len());
            let mut feasible = true;
            for (child, child_req) in children.iter().zip(input_props.iter()) {
                let child = self.memo.resolve(*child);
                self.optimize_group(child, child_req)?;
                let winner_cost = self.memo.group(child).best.get(child_req).map(Winner::cost);
                match (winner_cost, self.best_stats(child, child_req)) {
                    (Some(cost), Some(stats)) => {
                        child_costs.push(cost);
                        child_stats.push(stats);
                    }
                    // No plan for this child under this requirement: the
                    // candidate is infeasible, not an error.
                    _ => {
                        feasible = false;
                        break;
                    }
                }
            }
            if !feasible {
                continue;
            }

            let (_, cost) =
                self.derive_stats_and_cost(eid, &op, &output_props, &child_stats, &child_costs);
            if cost.is_infinite() {
                continue;
            }

            if output_props.covers(required) {
                let gid = self.memo.expr(eid).group_id();
                let incumbent = self.memo.group(gid).best.get(required).map(Winner::cost);
                if incumbent.map_or(true, |c| cost < c) {
                    trace!(group = %gid, req = %required, cost = cost.value(), "best_update");
                    self.memo.group_mut(gid).best.insert(
                        required.clone(),
                        Winner::Expr {
                            expr: eid,
                            cost,
                            output_props: output_props.clone(),
                            input_props: input_props.clone(),
                        },
                    );
                }
            }
        }
        Ok(())
    }

    /// Derives output statistics and total cost for one candidate,
    /// memoized on the expression per output property set.
    fn derive_stats_and_cost(
        &mut self,
        eid: ExprId,
        op: &PhysicalOp,
        output_props: &PropertySet,
        child_stats: &[Statistics],
        child_costs: &[Cost],
    ) -> (Statistics, Cost) {
        {
            let expr = self.memo.expr(eid);
            if let (Some(stats), Some(cost)) =
                (expr.stats_for(output_props), expr.cost_for(output_props))
            {
                return (stats.clone(), cost);
            }
        }

        let output_stats = self.derive_output_stats(op, child_stats);
        let cost = self
            .cost_model
            .compute_cost(op, &output_stats, child_stats, child_costs);
        self.memo.expr_mut(eid).record_stats_and_cost(
            output_props.clone(),
            output_stats.clone(),
            cost,
        );
        (output_stats, cost)
    }

    fn derive_output_stats(&self, op: &PhysicalOp, child_stats: &[Statistics]) -> Statistics {
        let fallback = || Statistics::new(1000.0, 100_000.0);
        let child = |i: usize| child_stats.get(i).cloned().unwrap_or_else(fallback);
        match op {
            PhysicalOp::SeqScan { table, .. } => {
                self.catalog.table_stats(table).unwrap_or_else(fallback)
            }
            PhysicalOp::FilterOp { predicate } => {
                let input = child(0);
                let selectivity = stats::estimate_selectivity(predicate, &input);
                stats::derive_filter_stats(&input, selectivity)
            }
            PhysicalOp::HashJoin { condition, .. }
            | PhysicalOp::MergeJoin { condition, .. }
            | PhysicalOp::NestedLoopJoin { condition, .. } => {
                let pairs = stats::equi_join_column_pairs(condition);
                stats::derive_join_stats(&child(0), &child(1), &pairs)
            }
            PhysicalOp::HashAggregate { group_by, .. }
            | PhysicalOp::StreamAggregate { group_by, .. } => {
                let cols: Vec<String> = group_by
                    .iter()
                    .filter_map(|e| match e {
                        crate::expr::Expr::Column(c) => Some(c.name.clone()),
                        _ => None,
                    })
                    .collect();
                stats::derive_aggregate_stats(&child(0), &cols)
            }
            PhysicalOp::LimitOp { count, .. } => stats::derive_limit_stats(&child(0), *count),
            // Projection and sort leave cardinality untouched.
            PhysicalOp::ProjectOp { .. } | PhysicalOp::SortOp { .. } => child(0),
        }
    }

    /// Statistics of the group's winner for a requirement; enforced winners
    /// pass through to the plan they wrap (a sort changes no cardinality).
    fn best_stats(&self, group: GroupId, required: &PropertySet) -> Option<Statistics> {
        match self.memo.group(group).best.get(required)? {
            Winner::Expr {
                expr, output_props, ..
            } => self.memo.expr(*expr).stats_for(output_props).cloned(),
            Winner::Enforced { input_req, .. } => self.best_stats(group, input_req),
        }
    }

    /// Extracts the cheapest fully physical plan for `(group, required)`,
    /// or `None` when no winner was recorded.
    pub fn choose_best_plan(
        &self,
        group: GroupId,
        required: &PropertySet,
    ) -> Option<OpExpression> {
        let gid = self.memo.resolve(group);
        match self.memo.group(gid).best.get(required)? {
            Winner::Expr {
                expr, input_props, ..
            } => {
                let e = self.memo.expr(*expr);
                let mut children = Vec::with_capacity(e.children().len());
                for (i, &child) in e.children().iter().enumerate() {
                    let child_req = input_props.get(i).cloned().unwrap_or_default();
                    children.push(self.choose_best_plan(child, &child_req)?);
                }
                Some(OpExpression::new(e.op().clone(), children))
            }
            Winner::Enforced {
                order, input_req, ..
            } => {
                let input = self.choose_best_plan(gid, input_req)?;
                Some(OpExpression::new(
                    Operator::Physical(PhysicalOp::SortOp {
                        order: order.clone(),
                    }),
                    vec![input],
                ))
            }
        }
    }
}

/// Enumerates the `(output properties, per-child input properties)`
/// combinations a physical operator can satisfy under a requirement.
///
/// The first candidate is always the operator's native one: its own output
/// guarantees with its own input requirements (an empty requirement list
/// means one empty set per child). Order-preserving unary operators get a
/// second, pass-through candidate that forwards a required sort order to
/// their child and claims it in the output.
fn derive_child_properties(
    op: &PhysicalOp,
    arity: usize,
    required: &PropertySet,
) -> Vec<(PropertySet, Vec<PropertySet>)> {
    let mut native_inputs = op.required_input_properties();
    if native_inputs.is_empty() {
        native_inputs = vec![PropertySet::new(); arity];
    }
    let native_output = op.provided_output_properties();

    let mut candidates = vec![(native_output.clone(), native_inputs.clone())];

    if arity == 1 && op.preserves_order() {
        if let Some(sort) = required.get(PropertyKind::Sort) {
            if !native_output.covers(&PropertySet::with_property(sort.clone())) {
                let mut output = native_output;
                output.insert(sort.clone());
                let mut input = native_inputs.remove(0);
                input.insert(sort.clone());
                candidates.push((output, vec![input]));
            }
        }
    }

    candidates
}
