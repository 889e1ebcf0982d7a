//! # Built-in Optimization Rules
//!
//! The default rule set for the Cascades search engine.
//!
//! ## Transformation Rules (Logical -> Logical)
//!
//! - [`join_commutativity::JoinCommutativityRule`]: swaps the sides of
//!   inner and cross joins (`A JOIN B -> B JOIN A`), letting the cost model
//!   pick the cheaper orientation.
//!
//! ## Implementation Rules (Logical -> Physical)
//!
//! - [`impl_scan::GetToSeqScanRule`]: base-table access as a sequential scan.
//! - [`impl_filter::FilterToPhysicalRule`]: logical filter as a physical
//!   predicate evaluation.
//! - [`impl_project::ProjectToPhysicalRule`]: logical projection as physical
//!   expression evaluation.
//! - [`impl_join::JoinToNestedLoopJoinRule`]: the universal join fallback,
//!   any join type and condition.
//! - [`impl_join::JoinToHashJoinRule`]: inner equi-joins, one alternative
//!   per build side.
//! - [`impl_join::JoinToMergeJoinRule`]: inner equi-joins over sorted
//!   inputs (the sort requirements are declared as input properties).
//! - [`impl_agg::AggregateToHashAggregateRule`] /
//!   [`impl_agg::AggregateToStreamAggregateRule`]: hash-based and
//!   sorted-stream aggregation.
//! - [`impl_limit::LimitToLimitOpRule`]: row-count truncation.
//! - [`enforcer::SortToSortOpRule`]: explicit ORDER BY as a physical sort;
//!   the same operator serves as the search's sort enforcer.

pub mod enforcer;
pub mod impl_agg;
pub mod impl_filter;
pub mod impl_join;
pub mod impl_limit;
pub mod impl_project;
pub mod impl_scan;
pub mod join_commutativity;

use qopt_core::rule::RuleRegistry;

/// The standard registry with every built-in rule, in the order the
/// optimizer applies them.
pub fn default_rule_registry() -> RuleRegistry {
    let mut registry = RuleRegistry::new();

    // Transformation rules expand the logical search space.
    registry.add_rule(Box::new(join_commutativity::JoinCommutativityRule));

    // Implementation rules lower logical operators to physical alternatives.
    registry.add_rule(Box::new(impl_scan::GetToSeqScanRule));
    registry.add_rule(Box::new(impl_filter::FilterToPhysicalRule));
    registry.add_rule(Box::new(impl_project::ProjectToPhysicalRule));
    registry.add_rule(Box::new(impl_join::JoinToNestedLoopJoinRule));
    registry.add_rule(Box::new(impl_join::JoinToHashJoinRule));
    registry.add_rule(Box::new(impl_join::JoinToMergeJoinRule));
    registry.add_rule(Box::new(impl_agg::AggregateToHashAggregateRule));
    registry.add_rule(Box::new(impl_agg::AggregateToStreamAggregateRule));
    registry.add_rule(Box::new(enforcer::SortToSortOpRule));
    registry.add_rule(Box::new(impl_limit::LimitToLimitOpRule));

    registry
}
