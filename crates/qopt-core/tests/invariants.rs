//! Universal properties of the optimizer, checked over concrete and
//! randomized plans: interning, duplicate freedom, acyclicity, the explore
//! fixpoint, physical-only extraction, requirement coverage, cost
//! optimality, determinism, and idempotence.

use qopt_core::catalog::InMemoryCatalog;
use qopt_core::cost::DefaultCostModel;
use qopt_core::expr::*;
use qopt_core::memo::{GroupId, Memo, Winner};
use qopt_core::pattern::BindingIterator;
use qopt_core::properties::PropertySet;
use qopt_core::rule::OptContext;
use qopt_core::search::{Optimizer, SearchConfig};
use qopt_core::stats::{ColumnStatistics, Statistics};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::collections::HashSet;
use std::sync::Arc;

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn test_catalog() -> InMemoryCatalog {
    let mut c = InMemoryCatalog::new();
    let tables: &[(&str, f64, &[(&str, f64)])] = &[
        ("t", 1000.0, &[("a", 100.0), ("x", 500.0)]),
        ("a", 100.0, &[("k", 100.0)]),
        ("b", 100_000.0, &[("k", 10_000.0)]),
    ];
    for (name, rows, cols) in tables {
        let table = TableRef::new("s", *name);
        let col_refs: Vec<ColumnRef> = cols
            .iter()
            .enumerate()
            .map(|(i, (col, _))| ColumnRef::new(*name, *col, i as u32))
            .collect();
        let mut stats = Statistics::new(*rows, rows * 100.0);
        for (col, ndv) in cols.iter() {
            stats = stats.with_column(*col, ColumnStatistics::new(*ndv, 0.0));
        }
        c.add_table(&table, col_refs, stats);
    }
    c
}

fn optimizer_with(catalog: Arc<InMemoryCatalog>) -> Optimizer {
    Optimizer::new(
        Arc::new(qopt_rules::default_rule_registry()),
        Arc::new(DefaultCostModel::default()),
        catalog,
        SearchConfig::default(),
    )
}

fn get(name: &str) -> OpExpression {
    OpExpression::leaf(Operator::Logical(LogicalOp::Get {
        table: TableRef::new("s", name),
        columns: vec![],
    }))
}

fn col(table: &str, name: &str) -> Expr {
    Expr::Column(ColumnRef::new(table, name, 0))
}

fn equi(lt: &str, lc: &str, rt: &str, rc: &str) -> Expr {
    Expr::BinaryOp {
        op: BinaryOp::Eq,
        left: Box::new(col(lt, lc)),
        right: Box::new(col(rt, rc)),
    }
}

fn inner_join(condition: Expr, left: OpExpression, right: OpExpression) -> OpExpression {
    OpExpression::new(
        Operator::Logical(LogicalOp::Join {
            join_type: JoinType::Inner,
            condition,
        }),
        vec![left, right],
    )
}

/// Runs the full pipeline and returns the optimizer, root group, and plan.
fn optimize(tree: &OpExpression, required: &PropertySet) -> (Optimizer, GroupId, Option<OpExpression>) {
    let mut opt = optimizer_with(Arc::new(test_catalog()));
    let root = opt.memo.insert_expression_tree(tree).unwrap();
    opt.explore_group(root.group).unwrap();
    opt.implement_group(root.group).unwrap();
    opt.optimize_group(root.group, required).unwrap();
    let plan = opt.choose_best_plan(root.group, required);
    (opt, root.group, plan)
}

fn join_query() -> OpExpression {
    inner_join(equi("a", "k", "b", "k"), get("a"), get("b"))
}

fn assert_no_duplicate_keys(memo: &Memo) {
    for gid in memo.live_group_ids() {
        let mut seen = HashSet::new();
        for &eid in memo.group(gid).exprs() {
            let e = memo.expr(eid);
            let key = (e.op().clone(), e.children().to_vec());
            assert!(
                seen.insert(key),
                "duplicate canonical key in group {gid}"
            );
        }
    }
}

fn assert_acyclic(memo: &Memo) {
    fn visit(
        memo: &Memo,
        g: GroupId,
        visiting: &mut HashSet<GroupId>,
        done: &mut HashSet<GroupId>,
    ) {
        if done.contains(&g) {
            return;
        }
        assert!(visiting.insert(g), "cycle through group {g}");
        for &eid in memo.group(g).exprs() {
            for &child in memo.expr(eid).children() {
                visit(memo, memo.resolve(child), visiting, done);
            }
        }
        visiting.remove(&g);
        done.insert(g);
    }
    let mut done = HashSet::new();
    for gid in memo.live_group_ids() {
        visit(memo, gid, &mut HashSet::new(), &mut done);
    }
}

// ---------------------------------------------------------------------------
// Properties
// ---------------------------------------------------------------------------

/// 1: logically identical subtrees intern to the same group.
#[test]
fn interning_shares_identical_subtrees() {
    let tree = inner_join(equi("t", "a", "t", "a"), get("t"), get("t"));
    let (opt, root, _) = optimize(&tree, &PropertySet::new());

    let root_children = opt
        .memo
        .group(root)
        .exprs()
        .iter()
        .map(|&e| opt.memo.expr(e))
        .find(|e| e.op().is_logical())
        .unwrap()
        .children()
        .to_vec();
    assert_eq!(root_children[0], root_children[1]);

    // Re-inserting the same tree lands on the same group.
    let mut opt2 = optimizer_with(Arc::new(test_catalog()));
    let first = opt2.memo.insert_expression_tree(&tree).unwrap();
    let second = opt2.memo.insert_expression_tree(&tree).unwrap();
    assert!(!second.inserted);
    assert_eq!(first.group, second.group);
}

/// 2: no group holds two expressions with equal canonical keys.
#[test]
fn no_duplicate_group_expressions() {
    let (opt, _, _) = optimize(&join_query(), &PropertySet::new());
    assert_no_duplicate_keys(&opt.memo);
}

/// 3: the group graph stays acyclic through exploration and costing.
#[test]
fn group_graph_is_acyclic() {
    let (opt, _, _) = optimize(&join_query(), &PropertySet::new());
    assert_acyclic(&opt.memo);
}

/// 4: after exploration, no transformation rule produces a new canonical
/// key anywhere in the memo.
#[test]
fn explore_reaches_a_fixpoint() {
    let catalog = Arc::new(test_catalog());
    let mut opt = optimizer_with(Arc::clone(&catalog));
    let root = opt.memo.insert_expression_tree(&join_query()).unwrap();
    opt.explore_group(root.group).unwrap();

    let registry = qopt_rules::default_rule_registry();
    let ctx = OptContext {
        catalog: catalog.as_ref(),
    };
    for gid in opt.memo.live_group_ids().collect::<Vec<_>>() {
        for eid in opt.memo.group(gid).exprs().to_vec() {
            if !opt.memo.expr(eid).op().is_logical() {
                continue;
            }
            for rule in registry.transformation_rules() {
                let bindings: Vec<OpExpression> =
                    BindingIterator::new(&opt.memo, eid, &rule.pattern()).collect();
                for binding in bindings {
                    if !rule.check(&binding, &ctx) {
                        continue;
                    }
                    for out in rule.transform(&binding, &ctx).unwrap() {
                        let res = opt
                            .memo
                            .insert_expression_tree_into(&out, Some(gid))
                            .unwrap();
                        assert!(!res.inserted, "explored group {gid} was not at fixpoint");
                    }
                }
            }
        }
    }
}

/// 5: extracted plans contain only physical operators.
#[test]
fn extracted_plans_are_fully_physical() {
    let (_, _, plan) = optimize(&join_query(), &PropertySet::new());
    assert!(plan.unwrap().is_fully_physical());
}

/// 6: the extracted plan's output covers the requirement it was asked for.
#[test]
fn extracted_plan_covers_requirement() {
    fn provided_sort(plan: &OpExpression) -> Vec<SortKey> {
        match &plan.op {
            Operator::Physical(PhysicalOp::SortOp { order }) => order.clone(),
            Operator::Physical(op) if op.preserves_order() => provided_sort(&plan.children[0]),
            Operator::Physical(op) => match op
                .provided_output_properties()
                .get(qopt_core::properties::PropertyKind::Sort)
            {
                Some(qopt_core::properties::Property::Sort(order)) => order.clone(),
                _ => vec![],
            },
            _ => vec![],
        }
    }

    let required = PropertySet::with_sort(vec![SortKey::asc(col("t", "x"))]);
    let tree = OpExpression::new(
        Operator::Logical(LogicalOp::Filter {
            predicate: Expr::BinaryOp {
                op: BinaryOp::Gt,
                left: Box::new(col("t", "x")),
                right: Box::new(Expr::Literal(ScalarValue::Int64(5))),
            },
        }),
        vec![get("t")],
    );
    let (_, _, plan) = optimize(&tree, &required);
    let plan = plan.expect("sortable filter must be plannable");
    assert!(PropertySet::with_sort(provided_sort(&plan)).covers(&required));
    assert!(plan.is_fully_physical());
}

/// 7: the winner is the argmin over all costed physical expressions whose
/// output covers the requirement.
#[test]
fn winner_is_argmin_over_costed_expressions() {
    let required = PropertySet::new();
    let (opt, root, _) = optimize(&join_query(), &required);

    let winner = opt.memo.group(root).best.get(&required).unwrap();
    let mut qualifying = Vec::new();
    for &eid in opt.memo.group(root).exprs() {
        let e = opt.memo.expr(eid);
        if !e.op().is_physical() {
            continue;
        }
        for (props, cost) in e.costed_props() {
            if props.covers(&required) {
                qualifying.push(cost);
            }
        }
    }
    assert!(!qualifying.is_empty());
    for cost in &qualifying {
        assert!(winner.cost() <= *cost);
    }
    if let Winner::Expr { cost, .. } = winner {
        assert!(qualifying.iter().any(|c| c == cost));
    }
}

/// 8: identical inputs produce byte-identical plans.
#[test]
fn planning_is_deterministic() {
    let required = PropertySet::with_sort(vec![SortKey::asc(col("a", "k"))]);
    let (_, _, first) = optimize(&join_query(), &required);
    let (_, _, second) = optimize(&join_query(), &required);
    assert_eq!(format!("{:?}", first), format!("{:?}", second));
}

/// 9: re-running any phase changes nothing.
#[test]
fn phases_are_idempotent() {
    let required = PropertySet::new();
    let (mut opt, root, plan) = optimize(&join_query(), &required);

    let groups = opt.memo.num_groups();
    let exprs = opt.memo.num_exprs();
    let cost = opt.memo.group(root).best.get(&required).unwrap().cost();

    opt.explore_group(root).unwrap();
    opt.implement_group(root).unwrap();
    opt.optimize_group(root, &required).unwrap();

    assert_eq!(opt.memo.num_groups(), groups);
    assert_eq!(opt.memo.num_exprs(), exprs);
    assert_eq!(
        opt.memo.group(root).best.get(&required).unwrap().cost(),
        cost
    );
    let replan = opt.choose_best_plan(root, &required);
    assert_eq!(format!("{:?}", plan), format!("{:?}", replan));
}

/// An unmatchable requirement yields no plan rather than an error.
#[test]
fn unmatchable_requirement_yields_no_plan() {
    use qopt_core::properties::{Distribution, Property};
    let required = PropertySet::with_property(Property::Distribution(Distribution::Broadcast));
    let (_, _, plan) = optimize(&get("t"), &required);
    assert!(plan.is_none());
}

// ---------------------------------------------------------------------------
// Depth and randomized coverage
// ---------------------------------------------------------------------------

/// 32 nested joins: the recursive driver must handle plan depth without
/// exhausting the stack, and still satisfy the structural properties.
#[test]
fn deeply_nested_joins() {
    let mut tree = get("t0");
    for i in 1..=32 {
        tree = inner_join(
            Expr::Literal(ScalarValue::Bool(true)),
            tree,
            get(&format!("t{i}")),
        );
    }
    let (opt, _, plan) = optimize(&tree, &PropertySet::new());
    let plan = plan.expect("deep join chain must be plannable");
    assert!(plan.is_fully_physical());

    let mut depth = 0;
    let mut node = &plan;
    while let Some(child) = node.children.first() {
        depth += 1;
        node = child;
    }
    assert!(depth >= 32);
    assert_no_duplicate_keys(&opt.memo);
    assert_acyclic(&opt.memo);
}

/// Randomized logical trees over {Get, Filter, Project, Join} keep every
/// structural property, and planning stays deterministic.
#[test]
fn randomized_plans_preserve_invariants() {
    let mut rng = StdRng::seed_from_u64(0x5eed);
    let tables = ["t", "a", "b"];

    fn random_tree(rng: &mut StdRng, tables: &[&str], depth: usize) -> OpExpression {
        if depth == 0 {
            return get(tables[rng.gen_range(0..tables.len())]);
        }
        match rng.gen_range(0..4) {
            0 => get(tables[rng.gen_range(0..tables.len())]),
            1 => OpExpression::new(
                Operator::Logical(LogicalOp::Filter {
                    predicate: Expr::BinaryOp {
                        op: BinaryOp::Gt,
                        left: Box::new(col("t", "x")),
                        right: Box::new(Expr::Literal(ScalarValue::Int64(
                            rng.gen_range(0..100),
                        ))),
                    },
                }),
                vec![random_tree(rng, tables, depth - 1)],
            ),
            2 => OpExpression::new(
                Operator::Logical(LogicalOp::Project {
                    exprs: vec![col("t", "a")],
                    aliases: vec!["a".into()],
                }),
                vec![random_tree(rng, tables, depth - 1)],
            ),
            _ => inner_join(
                equi("a", "k", "b", "k"),
                random_tree(rng, tables, depth - 1),
                random_tree(rng, tables, depth - 1),
            ),
        }
    }

    for _ in 0..15 {
        let tree = random_tree(&mut rng, &tables, 3);
        let (opt, root, plan) = optimize(&tree, &PropertySet::new());
        let plan = plan.expect("random logical tree must be plannable");
        assert!(plan.is_fully_physical());
        assert_no_duplicate_keys(&opt.memo);
        assert_acyclic(&opt.memo);
        assert!(opt.memo.group(root).best.get(&PropertySet::new()).is_some());

        let (_, _, replay) = optimize(&tree, &PropertySet::new());
        assert_eq!(format!("{:?}", Some(&plan)), format!("{:?}", replay.as_ref()));
    }
}
