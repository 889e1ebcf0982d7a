//! # Expression and Operator Types
//!
//! The optimizer's plan representation has three layers:
//!
//! ## Scalar Expressions (`Expr`)
//! Row-level computations: column references, literals, comparisons, boolean
//! logic, function calls. They appear inside predicates, projections, join
//! conditions, and sort keys.
//!
//! ## Logical Operators (`LogicalOp`)
//! Logical operators describe *what* to compute without saying *how*. A
//! logical `Join` says "combine these two relations on this condition" but
//! not whether to use a hash join or a nested loop. Transformation rules
//! rewrite logical operators into equivalent logical alternatives.
//!
//! ## Physical Operators (`PhysicalOp`)
//! Physical operators describe *how* to execute. Implementation rules produce
//! them from logical operators, and each one has well-defined cost
//! characteristics and, where relevant, required input properties (e.g.
//! `MergeJoin` needs both children sorted on the join keys).
//!
//! The unified [`Operator`] enum wraps both layers, plus the [`Operator::Leaf`]
//! placeholder that stands for a whole memo group inside a bound
//! [`OpExpression`]. The `OpKind` discriminants support pattern matching on
//! operator type without inspecting payloads.

use crate::memo::GroupId;
use crate::properties::PropertySet;
use ordered_float::OrderedFloat;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Reference to a table in the catalog.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TableRef {
    pub schema: String,
    pub name: String,
}

impl TableRef {
    pub fn new(schema: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            schema: schema.into(),
            name: name.into(),
        }
    }
}

impl fmt::Display for TableRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.schema, self.name)
    }
}

/// Reference to a column, optionally qualified by table.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ColumnRef {
    pub table: Option<String>,
    pub name: String,
    pub index: u32,
}

impl ColumnRef {
    pub fn new(table: impl Into<String>, name: impl Into<String>, index: u32) -> Self {
        Self {
            table: Some(table.into()),
            name: name.into(),
            index,
        }
    }
}

impl fmt::Display for ColumnRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.table {
            Some(t) => write!(f, "{}.{}", t, self.name),
            None => write!(f, "{}", self.name),
        }
    }
}

/// Constant value appearing in a query (e.g. `WHERE x = 42`).
///
/// Floats are wrapped in `OrderedFloat` so payloads stay `Eq + Hash`, which
/// memo interning requires.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ScalarValue {
    Null,
    Bool(bool),
    Int64(i64),
    Float64(OrderedFloat<f64>),
    Utf8(String),
    /// Date as days since the Unix epoch.
    Date(i32),
}

/// Scalar expression tree used in predicates, projections, join conditions
/// and sort keys.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Expr {
    Column(ColumnRef),
    Literal(ScalarValue),
    BinaryOp {
        op: BinaryOp,
        left: Box<Expr>,
        right: Box<Expr>,
    },
    UnaryOp {
        op: UnaryOp,
        operand: Box<Expr>,
    },
    Function {
        name: String,
        args: Vec<Expr>,
    },
    /// Conjunction stored as a flat list, which keeps conjunct decomposition
    /// trivial (no nested binary AND trees).
    And(Vec<Expr>),
    Or(Vec<Expr>),
}

impl Expr {
    /// All column references in this expression, in syntactic order.
    pub fn columns(&self) -> Vec<&ColumnRef> {
        let mut out = Vec::new();
        self.collect_columns(&mut out);
        out
    }

    fn collect_columns<'a>(&'a self, out: &mut Vec<&'a ColumnRef>) {
        match self {
            Expr::Column(c) => out.push(c),
            Expr::Literal(_) => {}
            Expr::BinaryOp { left, right, .. } => {
                left.collect_columns(out);
                right.collect_columns(out);
            }
            Expr::UnaryOp { operand, .. } => operand.collect_columns(out),
            Expr::Function { args, .. } => {
                for a in args {
                    a.collect_columns(out);
                }
            }
            Expr::And(exprs) | Expr::Or(exprs) => {
                for e in exprs {
                    e.collect_columns(out);
                }
            }
        }
    }

    /// Flatten AND-chains: `(A AND (B AND C))` yields `[A, B, C]`.
    pub fn conjuncts(&self) -> Vec<&Expr> {
        match self {
            Expr::And(exprs) => exprs.iter().flat_map(|e| e.conjuncts()).collect(),
            other => vec![other],
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BinaryOp {
    Eq,
    NotEq,
    Lt,
    LtEq,
    Gt,
    GtEq,
    Add,
    Sub,
    Mul,
    Div,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum UnaryOp {
    Not,
    Neg,
    IsNull,
    IsNotNull,
}

/// SQL join types.
///
/// Only `Inner` and `Cross` are commutative; the others have fixed left/right
/// semantics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum JoinType {
    Inner,
    Left,
    Right,
    Full,
    Semi,
    Anti,
    Cross,
}

/// Aggregate call such as `SUM(DISTINCT price)`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AggExpr {
    pub func: AggFunc,
    pub arg: Expr,
    pub distinct: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AggFunc {
    Count,
    Sum,
    Avg,
    Min,
    Max,
}

/// Sort key: an expression with direction and null placement.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SortKey {
    pub expr: Expr,
    pub ascending: bool,
    pub nulls_first: bool,
}

impl SortKey {
    /// Ascending key with nulls last, the common default.
    pub fn asc(expr: Expr) -> Self {
        Self {
            expr,
            ascending: true,
            nulls_first: false,
        }
    }
}

/// Which child of a hash join is materialized into the hash table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BuildSide {
    Left,
    Right,
}

/// Logical operators: *what* to compute.
///
/// Children are referenced by group id once an operator lives in the memo;
/// inside an [`OpExpression`] they are held inline.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LogicalOp {
    /// Base-table access. Always a leaf.
    Get {
        table: TableRef,
        columns: Vec<ColumnRef>,
    },
    /// Discards rows not matching the predicate. One child.
    Filter { predicate: Expr },
    /// Computes output expressions from the child's columns. One child.
    Project { exprs: Vec<Expr>, aliases: Vec<String> },
    /// Combines two relations. The primary target for transformation rules
    /// and the operator with the most implementation alternatives.
    Join { join_type: JoinType, condition: Expr },
    /// Groups rows and computes aggregate functions. One child.
    Aggregate {
        group_by: Vec<Expr>,
        aggregates: Vec<AggExpr>,
    },
    /// Orders the output. One child.
    Sort { order: Vec<SortKey> },
    /// Returns at most `count` rows starting at `offset`. One child.
    Limit { offset: u64, count: u64 },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LogicalOpKind {
    Get,
    Filter,
    Project,
    Join,
    Aggregate,
    Sort,
    Limit,
}

impl LogicalOp {
    pub fn kind(&self) -> LogicalOpKind {
        match self {
            LogicalOp::Get { .. } => LogicalOpKind::Get,
            LogicalOp::Filter { .. } => LogicalOpKind::Filter,
            LogicalOp::Project { .. } => LogicalOpKind::Project,
            LogicalOp::Join { .. } => LogicalOpKind::Join,
            LogicalOp::Aggregate { .. } => LogicalOpKind::Aggregate,
            LogicalOp::Sort { .. } => LogicalOpKind::Sort,
            LogicalOp::Limit { .. } => LogicalOpKind::Limit,
        }
    }

    pub fn name(&self) -> &'static str {
        match self.kind() {
            LogicalOpKind::Get => "Get",
            LogicalOpKind::Filter => "Filter",
            LogicalOpKind::Project => "Project",
            LogicalOpKind::Join => "Join",
            LogicalOpKind::Aggregate => "Aggregate",
            LogicalOpKind::Sort => "Sort",
            LogicalOpKind::Limit => "Limit",
        }
    }

    pub fn arity(&self) -> usize {
        match self {
            LogicalOp::Get { .. } => 0,
            LogicalOp::Join { .. } => 2,
            _ => 1,
        }
    }
}

/// Physical operators: *how* to execute.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PhysicalOp {
    /// Sequential (full) table scan. O(n), no prerequisites.
    SeqScan {
        table: TableRef,
        columns: Vec<ColumnRef>,
    },
    /// Row-at-a-time predicate evaluation. Preserves the input order.
    FilterOp { predicate: Expr },
    /// Expression evaluation per row.
    ProjectOp { exprs: Vec<Expr>, aliases: Vec<String> },
    /// Builds a hash table on `build_side`, probes with the other child.
    /// Requires an equi-join predicate.
    HashJoin {
        join_type: JoinType,
        build_side: BuildSide,
        condition: Expr,
    },
    /// Merges two streams pre-sorted on the join keys. O(n + m), minimal
    /// memory; the sort requirement is declared via input properties.
    MergeJoin { join_type: JoinType, condition: Expr },
    /// For each left row, scans all right rows. O(n * m); the universal
    /// fallback that works for any join condition.
    NestedLoopJoin { join_type: JoinType, condition: Expr },
    /// Hash table keyed by the group-by columns. Works for any input order.
    HashAggregate {
        group_by: Vec<Expr>,
        aggregates: Vec<AggExpr>,
    },
    /// Single pass over input pre-sorted on the group-by columns.
    StreamAggregate {
        group_by: Vec<Expr>,
        aggregates: Vec<AggExpr>,
    },
    /// Materializes and sorts its input. Also serves as the sort enforcer.
    SortOp { order: Vec<SortKey> },
    /// Row-count truncation. Preserves the input order.
    LimitOp { offset: u64, count: u64 },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PhysicalOpKind {
    SeqScan,
    FilterOp,
    ProjectOp,
    HashJoin,
    MergeJoin,
    NestedLoopJoin,
    HashAggregate,
    StreamAggregate,
    SortOp,
    LimitOp,
}

impl PhysicalOp {
    pub fn kind(&self) -> PhysicalOpKind {
        match self {
            PhysicalOp::SeqScan { .. } => PhysicalOpKind::SeqScan,
            PhysicalOp::FilterOp { .. } => PhysicalOpKind::FilterOp,
            PhysicalOp::ProjectOp { .. } => PhysicalOpKind::ProjectOp,
            PhysicalOp::HashJoin { .. } => PhysicalOpKind::HashJoin,
            PhysicalOp::MergeJoin { .. } => PhysicalOpKind::MergeJoin,
            PhysicalOp::NestedLoopJoin { .. } => PhysicalOpKind::NestedLoopJoin,
            PhysicalOp::HashAggregate { .. } => PhysicalOpKind::HashAggregate,
            PhysicalOp::StreamAggregate { .. } => PhysicalOpKind::StreamAggregate,
            PhysicalOp::SortOp { .. } => PhysicalOpKind::SortOp,
            PhysicalOp::LimitOp { .. } => PhysicalOpKind::LimitOp,
        }
    }

    pub fn name(&self) -> &'static str {
        match self.kind() {
            PhysicalOpKind::SeqScan => "SeqScan",
            PhysicalOpKind::FilterOp => "PhysicalFilter",
            PhysicalOpKind::ProjectOp => "PhysicalProject",
            PhysicalOpKind::HashJoin => "HashJoin",
            PhysicalOpKind::MergeJoin => "MergeJoin",
            PhysicalOpKind::NestedLoopJoin => "NestedLoopJoin",
            PhysicalOpKind::HashAggregate => "HashAggregate",
            PhysicalOpKind::StreamAggregate => "StreamAggregate",
            PhysicalOpKind::SortOp => "PhysicalSort",
            PhysicalOpKind::LimitOp => "PhysicalLimit",
        }
    }

    pub fn arity(&self) -> usize {
        match self {
            PhysicalOp::SeqScan { .. } => 0,
            PhysicalOp::HashJoin { .. }
            | PhysicalOp::MergeJoin { .. }
            | PhysicalOp::NestedLoopJoin { .. } => 2,
            _ => 1,
        }
    }

    /// Property sets each child must satisfy, one per child.
    ///
    /// An empty result means "no requirements"; the driver substitutes
    /// `arity` empty property sets.
    pub fn required_input_properties(&self) -> Vec<PropertySet> {
        match self {
            PhysicalOp::MergeJoin { condition, .. } => {
                let (left_keys, right_keys) = merge_join_sort_keys(condition);
                vec![
                    PropertySet::with_sort(left_keys),
                    PropertySet::with_sort(right_keys),
                ]
            }
            PhysicalOp::StreamAggregate { group_by, .. } => {
                let keys = group_by.iter().cloned().map(SortKey::asc).collect();
                vec![PropertySet::with_sort(keys)]
            }
            _ => Vec::new(),
        }
    }

    /// Property set this operator's output satisfies regardless of its
    /// children (its native guarantees).
    pub fn provided_output_properties(&self) -> PropertySet {
        match self {
            PhysicalOp::SortOp { order } => PropertySet::with_sort(order.clone()),
            PhysicalOp::MergeJoin { condition, .. } => {
                let (left_keys, _) = merge_join_sort_keys(condition);
                PropertySet::with_sort(left_keys)
            }
            PhysicalOp::StreamAggregate { group_by, .. } => {
                let keys = group_by.iter().cloned().map(SortKey::asc).collect();
                PropertySet::with_sort(keys)
            }
            _ => PropertySet::new(),
        }
    }

    /// Whether the operator emits rows in its (single) child's order.
    pub fn preserves_order(&self) -> bool {
        matches!(self, PhysicalOp::FilterOp { .. } | PhysicalOp::LimitOp { .. })
    }
}

/// Per-side sort keys a merge join needs: the left child sorted on the left
/// columns of each equi-conjunct, the right child on the right columns.
pub fn merge_join_sort_keys(condition: &Expr) -> (Vec<SortKey>, Vec<SortKey>) {
    let mut left = Vec::new();
    let mut right = Vec::new();
    for conjunct in condition.conjuncts() {
        if let Expr::BinaryOp {
            op: BinaryOp::Eq,
            left: l,
            right: r,
        } = conjunct
        {
            if matches!((l.as_ref(), r.as_ref()), (Expr::Column(_), Expr::Column(_))) {
                left.push(SortKey::asc((**l).clone()));
                right.push(SortKey::asc((**r).clone()));
            }
        }
    }
    (left, right)
}

/// Unified operator.
///
/// `Leaf` is the binding placeholder: inside an [`OpExpression`] produced by
/// the binding iterator it stands for an entire memo group, and on
/// re-insertion it resolves back to that group's id. It is neither logical
/// nor physical and never appears in an extracted plan.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Operator {
    Logical(LogicalOp),
    Physical(PhysicalOp),
    Leaf(GroupId),
}

/// Kind discriminant for pattern matching, payload-free.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OpKind {
    Logical(LogicalOpKind),
    Physical(PhysicalOpKind),
    Leaf,
}

impl Operator {
    pub fn is_logical(&self) -> bool {
        matches!(self, Operator::Logical(_))
    }

    pub fn is_physical(&self) -> bool {
        matches!(self, Operator::Physical(_))
    }

    pub fn kind(&self) -> OpKind {
        match self {
            Operator::Logical(l) => OpKind::Logical(l.kind()),
            Operator::Physical(p) => OpKind::Physical(p.kind()),
            Operator::Leaf(_) => OpKind::Leaf,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Operator::Logical(l) => l.name(),
            Operator::Physical(p) => p.name(),
            Operator::Leaf(_) => "Leaf",
        }
    }

    pub fn arity(&self) -> usize {
        match self {
            Operator::Logical(l) => l.arity(),
            Operator::Physical(p) => p.arity(),
            Operator::Leaf(_) => 0,
        }
    }
}

/// A non-interned operator tree.
///
/// `OpExpression` is the unit of rule input and output and the form of the
/// extracted best plan. Trees are freely constructed and dropped; only their
/// canonicalized [`GroupExpression`](crate::memo::GroupExpression) form is
/// interned in the memo.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OpExpression {
    pub op: Operator,
    pub children: Vec<OpExpression>,
}

impl OpExpression {
    pub fn new(op: Operator, children: Vec<OpExpression>) -> Self {
        Self { op, children }
    }

    /// A childless node.
    pub fn leaf(op: Operator) -> Self {
        Self {
            op,
            children: Vec::new(),
        }
    }

    /// True when every operator in the tree is physical.
    pub fn is_fully_physical(&self) -> bool {
        self.op.is_physical() && self.children.iter().all(OpExpression::is_fully_physical)
    }

    fn fmt_indented(&self, f: &mut fmt::Formatter<'_>, indent: usize) -> fmt::Result {
        writeln!(f, "{}{}", "  ".repeat(indent), self.op.name())?;
        for child in &self.children {
            child.fmt_indented(f, indent + 1)?;
        }
        Ok(())
    }
}

impl fmt::Display for OpExpression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.fmt_indented(f, 0)
    }
}
