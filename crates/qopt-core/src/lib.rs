//! # qopt-core: Cascades Query Optimizer Core
//!
//! This crate implements the core data structures and algorithms of a
//! Cascades-style cost-based query optimizer: it takes a logical operator
//! tree and produces the lowest-cost physical plan that satisfies the
//! query's required physical properties.
//!
//! ## Module Overview
//!
//! - **`memo`**: the interned store that compactly represents the search
//!   space as groups of logically equivalent expressions.
//! - **`expr`**: scalar expressions, logical and physical operators, and the
//!   non-interned `OpExpression` tree used as rule I/O and extracted plan.
//! - **`properties`**: physical property sets (sort order, distribution,
//!   columns) with the covers relation that drives requirement checking.
//! - **`pattern`**: the declarative pattern language and the binding
//!   iterator that enumerates every way a pattern maps onto the memo DAG.
//! - **`rule`**: the `Rule` trait and the immutable, ordered `RuleRegistry`.
//! - **`search`**: the driver -- explore, implement, optimize, and best-plan
//!   extraction, with budgets and cooperative cancellation.
//! - **`cost`**: the cost abstraction and the default weighted cost model.
//! - **`stats`**: statistics structures and cardinality derivation formulas.
//! - **`catalog`**: read-only access to table metadata and statistics.
//! - **`error`**: the shared error type.
//!
//! ## Contract with the surrounding engine
//!
//! Parsing, name resolution, and lowering to an executable plan live
//! outside this crate: callers convert a parsed statement to an
//! [`expr::OpExpression`], extract the required
//! [`properties::PropertySet`], and lower the returned physical tree
//! themselves. The optimizer guarantees the extracted tree contains only
//! physical operators and respects operator arities, or returns no plan at
//! all.

pub mod catalog;
pub mod cost;
pub mod error;
pub mod expr;
pub mod memo;
pub mod pattern;
pub mod properties;
pub mod rule;
pub mod search;
pub mod stats;
