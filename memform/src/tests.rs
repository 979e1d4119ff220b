use crate::cfa::{
    CfaEdge, Declaration, EdgeKind, FileLocation, Statement, VariableClassification,
    VariableDeclaration,
};
use crate::converter::FormulaConverter;
use crate::expr::{BinaryOperator, Expression, Initializer};
use crate::machine_model::LINUX64;
use crate::options::EncodingOptions;
use crate::path_formula::PathFormula;
use crate::shutdown::ShutdownNotifier;
use crate::types::{BuiltIn, CType, CompositeKind, CompositeMember, TypeRegistry};

#[cfg(test)]
use crate::error::EncodingError;
#[cfg(test)]
use crate::expr::FunctionCallExpression;
#[cfg(test)]
use crate::formula::{Formula, Sort, Term};
#[cfg(test)]
use crate::quantifier::QuantifierPolicy;
#[cfg(test)]
use crate::slice::{PartSpan, SliceAssignment, SliceExpression};
#[cfg(test)]
use crate::types::{ArrayLength, SimplifiedType};
#[cfg(test)]
use std::sync::Arc;
#[cfg(test)]
use std::time::Duration;

/// `struct s { int x; int y; }`, `union u { int i; float f; }` and
/// `union w { int i; char c[100]; }`
pub fn small_registry() -> TypeRegistry {
    let mut registry = TypeRegistry::new();
    registry.define(
        CompositeKind::Struct,
        "s",
        vec![
            CompositeMember::new("x", CType::int()),
            CompositeMember::new("y", CType::int()),
        ],
    );
    registry.define(
        CompositeKind::Union,
        "u",
        vec![
            CompositeMember::new("i", CType::int()),
            CompositeMember::new("f", CType::BuiltIn(BuiltIn::Float)),
        ],
    );
    registry.define(
        CompositeKind::Union,
        "w",
        vec![
            CompositeMember::new("i", CType::int()),
            CompositeMember::new("c", CType::array_of(CType::BuiltIn(BuiltIn::Char), 100)),
        ],
    );
    registry
}

pub fn converter_with(
    options: EncodingOptions,
    addressed: &[&str],
    shutdown: ShutdownNotifier,
) -> FormulaConverter {
    FormulaConverter::new(
        options,
        LINUX64.clone(),
        small_registry(),
        addressed.iter().map(|n| n.to_string()).collect::<VariableClassification>(),
        shutdown,
    )
}

pub fn converter(options: EncodingOptions, addressed: &[&str]) -> FormulaConverter {
    converter_with(options, addressed, ShutdownNotifier::new())
}

pub fn location(line: u32) -> FileLocation {
    FileLocation::new("test.c", line)
}

pub fn edge(function: &str, line: u32, kind: EdgeKind) -> CfaEdge {
    CfaEdge::new(kind, function, location(line))
}

pub fn declaration(name: &str, ty: CType, initializer: Option<Initializer>) -> EdgeKind {
    EdgeKind::Declaration(Declaration::Variable(VariableDeclaration {
        name: name.to_owned(),
        ty,
        is_global: false,
        initializer,
    }))
}

pub fn assignment(lhs: Expression, rhs: Expression) -> EdgeKind {
    EdgeKind::Statement(Statement::Assignment { lhs, rhs })
}

pub fn int_var(name: &str) -> Expression {
    Expression::id(name, CType::int())
}

/// `int x; x = 1; x = x + 1;` in `main`
pub fn counter_program() -> Vec<CfaEdge> {
    vec![
        edge("main", 1, declaration("main::x", CType::int(), None)),
        edge(
            "main",
            2,
            assignment(int_var("main::x"), Expression::int_literal(1)),
        ),
        edge(
            "main",
            3,
            assignment(
                int_var("main::x"),
                Expression::binary(
                    BinaryOperator::Plus,
                    int_var("main::x"),
                    Expression::int_literal(1),
                    CType::int(),
                ),
            ),
        ),
    ]
}

/// Encode `edges` in order, starting from the empty path
pub fn encode_all(conv: &FormulaConverter, edges: &[CfaEdge]) -> crate::error::Result<PathFormula> {
    let mut pf = conv.make_empty_path_formula();
    for e in edges {
        pf = conv.encode_edge(&pf, e)?;
    }
    Ok(pf)
}

#[cfg(test)]
fn address_of(name: &str) -> Formula {
    crate::formula::FormulaManager::new()
        .make_variable_without_ssa_index(Sort::BitVec(64), &format!("__ADDRESS_OF_{}", name))
}

#[test]
fn ssa_indices_grow_along_a_path() {
    let conv = converter(Default::default(), &[]);
    let edges = counter_program();
    let mut pf = conv.make_empty_path_formula();
    let mut last = 0;
    for e in edges.iter() {
        pf = conv.encode_edge(&pf, e).unwrap();
        let index = pf.ssa().get_index("main::x").unwrap();
        assert!(index > last);
        last = index;
    }
    assert_eq!(last, 4);
    assert_eq!(pf.length(), 3);

    let fmgr = conv.formula_manager();
    let x = |i| fmgr.make_variable(Sort::BitVec(32), "main::x", i);
    assert_eq!(
        pf.formula().conjuncts(),
        vec![
            fmgr.make_equal(x(3), fmgr.make_bv(32, 1)),
            fmgr.make_equal(x(4), fmgr.make_plus(x(3), fmgr.make_bv(32, 1))),
        ]
    );
}

#[test]
fn blank_edges_and_no_ops_keep_the_path() {
    let conv = converter(Default::default(), &[]);
    let pf = encode_all(&conv, &counter_program()[..2]).unwrap();
    let blank = conv.encode_edge(&pf, &edge("main", 9, EdgeKind::Blank)).unwrap();
    assert_eq!(blank, pf);
    let prototype = edge(
        "main",
        9,
        EdgeKind::Declaration(Declaration::Function("f".into())),
    );
    assert_eq!(conv.encode_edge(&pf, &prototype).unwrap().length(), pf.length());
}

#[test]
fn struct_copy_decomposes_into_fields() {
    let conv = converter(Default::default(), &[]);
    let empty = conv.make_empty_path_formula();
    let mut encoder = conv.edge_encoder(&empty, "main", location(1));
    let a = Expression::id("main::a", CType::struct_named("s"));
    let b = Expression::id("main::b", CType::struct_named("s"));
    let spans = encoder
        .decompose(&SliceAssignment::new(
            SliceExpression::of(a.clone()),
            Some(SliceExpression::of(b)),
        ))
        .unwrap();

    assert_eq!(spans.len(), 2);
    assert_eq!(spans[0].lhs, SliceExpression::of(a.clone()).field("x"));
    assert_eq!(spans[1].lhs, SliceExpression::of(a).field("y"));
    for span in spans.iter() {
        assert_eq!(span.rhs.len(), 1);
        assert_eq!(span.rhs[0].span, PartSpan::whole(32));
        assert!(span.index_variables().is_empty());
    }
}

#[test]
fn struct_copy_between_unaliased_variables() {
    let conv = converter(Default::default(), &[]);
    let a = Expression::id("main::a", CType::struct_named("s"));
    let b = Expression::id("main::b", CType::struct_named("s"));
    let pf = encode_all(&conv, &[edge("main", 1, assignment(a, b))]).unwrap();
    let fmgr = conv.formula_manager();
    let v = |n: &str, i| fmgr.make_variable(Sort::BitVec(32), n, i);
    assert_eq!(
        pf.formula().conjuncts(),
        vec![
            fmgr.make_equal(v("main::a$x", 2), v("main::b$x", 1)),
            fmgr.make_equal(v("main::a$y", 2), v("main::b$y", 1)),
        ]
    );
}

#[test]
fn self_copy_reads_every_field_before_writing() {
    let conv = converter(Default::default(), &["main::s"]);
    let s = Expression::id("main::s", CType::struct_named("s"));
    let pf = encode_all(
        &conv,
        &[
            edge("main", 1, declaration("main::s", CType::struct_named("s"), None)),
            edge("main", 2, assignment(s.clone(), s)),
        ],
    )
    .unwrap();

    let fmgr = conv.formula_manager();
    let ints = |i| fmgr.make_array("*int32_t", i, Sort::BitVec(64), Sort::BitVec(32));
    let x = address_of("main::s");
    let y = fmgr.make_plus(x.clone(), fmgr.make_bv(64, 4));
    // `y` is read from the version before `x` was written
    let conjuncts = pf.formula().conjuncts();
    assert!(conjuncts.contains(&fmgr.make_equal(
        ints(2),
        fmgr.make_store(ints(1), x.clone(), fmgr.make_select(ints(1), x))
    )));
    assert!(conjuncts.contains(&fmgr.make_equal(
        ints(3),
        fmgr.make_store(ints(2), y.clone(), fmgr.make_select(ints(1), y))
    )));
}

#[test]
fn array_broadcast_is_unrolled_into_store_chain() {
    let conv = converter(Default::default(), &[]);
    let array = CType::array_of(CType::int(), 3);
    let declared = encode_all(
        &conv,
        &[edge("main", 1, declaration("main::a", array.clone(), None))],
    )
    .unwrap();
    assert!(declared.pointer_target_set().is_base("main::a"));

    let mut encoder = conv.edge_encoder(&declared, "main", location(2));
    let f = encoder
        .handle_slice_assignments(
            &[SliceAssignment::new(
                SliceExpression::of(Expression::id("main::a", array)),
                Some(SliceExpression::of(Expression::int_literal(5))),
            )],
            crate::quantifier::QuantifierPolicy::FromOptions,
            false,
        )
        .unwrap();

    let fmgr = conv.formula_manager();
    let arr = |i| fmgr.make_array("*int32_t", i, Sort::BitVec(64), Sort::BitVec(32));
    let a = address_of("main::a");
    let five = fmgr.make_bv(32, 5);
    let at = |offset| fmgr.make_plus(a.clone(), fmgr.make_bv(64, offset));
    assert_eq!(
        f,
        fmgr.make_and_all([
            fmgr.make_equal(arr(2), fmgr.make_store(arr(1), at(0), five.clone())),
            fmgr.make_equal(arr(3), fmgr.make_store(arr(2), at(4), five.clone())),
            fmgr.make_equal(arr(4), fmgr.make_store(arr(3), at(8), five)),
        ])
    );
    let pf = encoder.finish(f);
    assert_eq!(pf.ssa().get_index("*int32_t"), Some(4));
}

#[test]
fn unrolling_is_capped_and_warned_about_once() {
    let conv = converter(EncodingOptions::default().with_max_array_length(100), &[]);
    let array = CType::array_of(CType::int(), 10000);
    let declared = encode_all(
        &conv,
        &[edge("main", 1, declaration("main::a", array.clone(), None))],
    )
    .unwrap();
    let warnings = conv.soundness_warnings().len();

    let zero = SliceAssignment::new(
        SliceExpression::of(Expression::id("main::a", array)),
        Some(SliceExpression::of(Expression::int_literal(0))),
    );
    let mut encoder = conv.edge_encoder(&declared, "main", location(2));
    let f = encoder
        .handle_slice_assignments(
            &[zero.clone()],
            crate::quantifier::QuantifierPolicy::FromOptions,
            false,
        )
        .unwrap();
    assert_eq!(f.conjuncts().len(), 100);
    assert_eq!(conv.soundness_warnings().len(), warnings + 1);
    assert!(conv
        .soundness_warnings()
        .iter()
        .any(|w| w.contains("10000") && w.contains("100 elements")));

    encoder
        .handle_slice_assignments(
            &[zero],
            crate::quantifier::QuantifierPolicy::FromOptions,
            false,
        )
        .unwrap();
    assert_eq!(conv.soundness_warnings().len(), warnings + 1);
}

#[test]
fn uf_heap_retains_cells_outside_the_written_field() {
    let options = EncodingOptions {
        use_arrays_for_heap: false,
        ..Default::default()
    };
    let conv = converter(options, &["main::s"]);
    let s_type = CType::struct_named("s");
    let p_type = CType::pointer_to(s_type.clone());
    let p = Expression::id("main::p", p_type.clone());
    let pf = encode_all(
        &conv,
        &[
            edge("main", 1, declaration("main::s", s_type, None)),
            edge("main", 2, declaration("main::p", p_type, None)),
            edge(
                "main",
                3,
                assignment(
                    Expression::arrow(p, "x", CType::int()),
                    Expression::int_literal(5),
                ),
            ),
        ],
    )
    .unwrap();

    let fmgr = conv.formula_manager();
    let cell = |i, address: Formula| {
        fmgr.make_uf_application("*int32_t", i, Sort::BitVec(32), vec![address])
    };
    let identity =
        |address: Formula| fmgr.make_equal(cell(2, address.clone()), cell(1, address));
    let s = address_of("main::s");
    let s_y = fmgr.make_plus(s.clone(), fmgr.make_bv(64, 4));
    let p2 = fmgr.make_variable(Sort::BitVec(64), "main::p", 2);

    let conjuncts = pf.formula().conjuncts();
    assert!(conjuncts.contains(&fmgr.make_equal(cell(2, p2.clone()), fmgr.make_bv(32, 5))));
    assert!(conjuncts.contains(&identity(s_y)));
    assert!(conjuncts.contains(&fmgr.make_or(fmgr.make_equal(s.clone(), p2), identity(s.clone()))));
    assert!(!conjuncts.contains(&identity(s)));
    assert_eq!(pf.ssa().get_index("*int32_t"), Some(2));
}

#[test]
fn union_member_write_updates_the_other_member() {
    let conv = converter(Default::default(), &[]);
    let u = Expression::id("main::u", CType::union_named("u"));
    let pf = encode_all(
        &conv,
        &[edge(
            "main",
            1,
            assignment(
                Expression::field(u, "i", CType::int()),
                Expression::int_literal(5),
            ),
        )],
    )
    .unwrap();

    let fmgr = conv.formula_manager();
    let types = conv.types();
    let float = types.sort_of(&types.simplify(&CType::BuiltIn(BuiltIn::Float))).unwrap();
    let conjuncts = pf.formula().conjuncts();
    assert!(conjuncts.contains(&fmgr.make_equal(
        fmgr.make_variable(Sort::BitVec(32), "main::u$i", 2),
        fmgr.make_bv(32, 5)
    )));
    assert!(conjuncts.contains(&fmgr.make_equal(
        fmgr.make_variable(float.clone(), "main::u$f", 2),
        fmgr.make_fp_from_ieee_bits(fmgr.make_bv(32, 5), float)
    )));
}

#[test]
fn initializer_list_fills_fresh_memory_in_place() {
    let conv = converter(Default::default(), &[]);
    let items = vec![
        Initializer::Expression(Expression::int_literal(1)),
        Initializer::Expression(Expression::int_literal(2)),
    ];
    let pf = encode_all(
        &conv,
        &[edge(
            "main",
            1,
            declaration(
                "main::a",
                CType::array_of(CType::int(), 3),
                Some(Initializer::List(items)),
            ),
        )],
    )
    .unwrap();

    let fmgr = conv.formula_manager();
    let arr = fmgr.make_array("*int32_t", 1, Sort::BitVec(64), Sort::BitVec(32));
    let a = address_of("main::a");
    let element = |offset: i128, value: i128| {
        let address = if offset == 0 {
            a.clone()
        } else {
            fmgr.make_plus(a.clone(), fmgr.make_bv(64, offset))
        };
        fmgr.make_equal(fmgr.make_select(arr.clone(), address), fmgr.make_bv(32, value))
    };
    let conjuncts = pf.formula().conjuncts();
    assert!(conjuncts.contains(&element(0, 1)));
    assert!(conjuncts.contains(&element(4, 2)));
    assert!(conjuncts.contains(&element(8, 0)));
    assert_eq!(pf.ssa().get_index("*int32_t"), Some(1));
}

#[test]
fn uniform_initializer_is_quantified() {
    let options = EncodingOptions {
        use_quantifiers_on_arrays: true,
        ..Default::default()
    };
    let conv = converter(options, &[]);
    let items = vec![Initializer::Expression(Expression::int_literal(7)); 4];
    let pf = encode_all(
        &conv,
        &[edge(
            "main",
            1,
            declaration(
                "main::a",
                CType::Array(Box::new(CType::int()), None),
                Some(Initializer::List(items)),
            ),
        )],
    )
    .unwrap();

    assert_eq!(
        pf.pointer_target_set().base_type("main::a"),
        Some(&SimplifiedType::Array(
            Arc::new(conv.types().simplify(&CType::int())),
            ArrayLength::Literal(4)
        ))
    );
    let quantified = pf
        .formula()
        .conjuncts()
        .iter()
        .filter(|f| matches!(f.term(), Term::Forall(..)))
        .count();
    assert_eq!(quantified, 1);
}

#[test]
fn untyped_allocation_is_typed_by_first_cast() {
    let conv = converter(Default::default(), &[]);
    let void_pointer = CType::pointer_to(CType::BuiltIn(BuiltIn::Void));
    let int_pointer = CType::pointer_to(CType::int());
    let v = Expression::id("main::v", void_pointer.clone());
    let malloc = FunctionCallExpression {
        function: "malloc".into(),
        arguments: vec![Expression::int(8, CType::BuiltIn(BuiltIn::UnsignedLong))],
        ty: void_pointer,
    };
    let allocated = encode_all(
        &conv,
        &[edge(
            "main",
            1,
            EdgeKind::Statement(Statement::CallAssignment {
                lhs: v.clone(),
                call: malloc,
            }),
        )],
    )
    .unwrap();
    assert!(!allocated.pointer_target_set().is_base("__malloc_1"));
    assert!(allocated
        .pointer_target_set()
        .deferred_allocation("main::v")
        .is_some());

    let typed = conv
        .encode_edge(
            &allocated,
            &edge(
                "main",
                2,
                assignment(
                    Expression::id("main::p", int_pointer.clone()),
                    Expression::cast(v, int_pointer),
                ),
            ),
        )
        .unwrap();
    assert_eq!(
        typed.pointer_target_set().base_type("__malloc_1"),
        Some(&SimplifiedType::Array(
            Arc::new(conv.types().simplify(&CType::int())),
            ArrayLength::Literal(2)
        ))
    );
    assert!(typed
        .pointer_target_set()
        .deferred_allocation("main::v")
        .is_none());
}

#[test]
fn parameters_and_results_flow_through_calls() {
    let conv = converter(Default::default(), &[]);
    let call = FunctionCallExpression {
        function: "f".into(),
        arguments: vec![Expression::int_literal(5)],
        ty: CType::int(),
    };
    let pf = encode_all(
        &conv,
        &[
            edge(
                "main",
                1,
                EdgeKind::FunctionCall {
                    call,
                    parameters: vec![("f::n".into(), CType::int())],
                },
            ),
            edge(
                "f",
                2,
                EdgeKind::Return {
                    value: Some(int_var("f::n")),
                    return_type: CType::int(),
                },
            ),
            edge(
                "main",
                3,
                EdgeKind::FunctionReturn {
                    callee: "f".into(),
                    lhs: Some(int_var("main::r")),
                    return_type: CType::int(),
                },
            ),
        ],
    )
    .unwrap();

    let fmgr = conv.formula_manager();
    let v = |n: &str, i| fmgr.make_variable(Sort::BitVec(32), n, i);
    assert_eq!(
        pf.formula().conjuncts(),
        vec![
            fmgr.make_equal(v("f::n", 2), fmgr.make_bv(32, 5)),
            fmgr.make_equal(v("f::__retval__", 2), v("f::n", 2)),
            fmgr.make_equal(v("main::r", 2), v("f::__retval__", 2)),
        ]
    );
}

#[test]
fn negated_assumption() {
    let conv = converter(Default::default(), &[]);
    let condition = Expression::binary(
        BinaryOperator::LessThan,
        int_var("main::x"),
        Expression::int_literal(3),
        CType::int(),
    );
    let pf = encode_all(
        &conv,
        &[edge(
            "main",
            1,
            EdgeKind::Assume {
                condition,
                truth_assumption: false,
            },
        )],
    )
    .unwrap();
    assert!(matches!(pf.formula().term(), Term::Not(_)));
}

#[test]
fn merging_paths_lifts_the_lagging_side() {
    let conv = converter(Default::default(), &[]);
    let empty = conv.make_empty_path_formula();
    let assigned = encode_all(&conv, &counter_program()[1..2]).unwrap();
    let merged = conv.make_or(&assigned, &empty).unwrap();

    let fmgr = conv.formula_manager();
    let x = |i| fmgr.make_variable(Sort::BitVec(32), "main::x", i);
    assert_eq!(merged.ssa().get_index("main::x"), Some(2));
    assert_eq!(
        merged.formula(),
        &fmgr.make_or(
            fmgr.make_equal(x(2), fmgr.make_bv(32, 1)),
            fmgr.make_equal(x(2), x(1)),
        )
    );
}

#[test]
fn converter_is_shared_between_threads() {
    let conv = Arc::new(converter(Default::default(), &[]));
    let expected = encode_all(&conv, &counter_program()).unwrap();
    let handles: Vec<_> = (0..4)
        .map(|_| {
            let conv = conv.clone();
            std::thread::spawn(move || encode_all(&conv, &counter_program()).unwrap())
        })
        .collect();
    for h in handles {
        assert_eq!(h.join().unwrap(), expected);
    }
}

#[test]
fn shutdown_interrupts_encoding() {
    let shutdown = ShutdownNotifier::new();
    let conv = converter_with(Default::default(), &[], shutdown.clone());
    shutdown.request_shutdown();
    assert_eq!(
        encode_all(&conv, &counter_program()[1..2]),
        Err(EncodingError::Interrupted)
    );
}

#[test]
fn unsupported_library_calls_are_reported_with_location() {
    let conv = converter(Default::default(), &[]);
    let call = FunctionCallExpression {
        function: "pthread_create".into(),
        arguments: vec![],
        ty: CType::int(),
    };
    let err = encode_all(&conv, &[edge("main", 7, EdgeKind::Statement(Statement::Call(call)))])
        .unwrap_err();
    assert!(matches!(
        err,
        EncodingError::UnsupportedCode {
            location: Some(ref l),
            ..
        } if *l == location(7)
    ));
}

#[test]
fn union_write_leaves_distant_array_elements_alone() {
    let conv = converter(Default::default(), &["main::u"]);
    let w = CType::union_named("w");
    let char_type = CType::BuiltIn(BuiltIn::Char);
    let chars = CType::array_of(char_type.clone(), 100);
    let u = Expression::id("main::u", w.clone());
    let c = |i| {
        Expression::subscript(
            Expression::field(u.clone(), "c", chars.clone()),
            Expression::int_literal(i),
            char_type.clone(),
        )
    };
    let before = encode_all(
        &conv,
        &[
            edge("main", 1, declaration("main::u", w, None)),
            edge("main", 2, assignment(c(10), Expression::int_literal(7))),
        ],
    )
    .unwrap();
    assert_eq!(before.ssa().get_index("*int8_t"), Some(2));

    let mut encoder = conv.edge_encoder(&before, "main", location(3));
    let f = encoder
        .assign(
            &Expression::field(u.clone(), "i", CType::int()),
            Some(SliceExpression::of(Expression::int_literal(5))),
            false,
        )
        .unwrap();

    // Only the four bytes of `i` change, each to its part of 5
    let fmgr = conv.formula_manager();
    let bytes = |i| fmgr.make_array("*int8_t", i, Sort::BitVec(64), Sort::BitVec(8));
    let a = address_of("main::u");
    let conjuncts = f.conjuncts();
    assert_eq!(conjuncts.len(), 5);
    assert!(conjuncts.contains(&fmgr.make_equal(
        bytes(3),
        fmgr.make_store(bytes(2), a.clone(), fmgr.make_bv(8, 5))
    )));
    for k in 1..4u32 {
        let at = fmgr.make_plus(a.clone(), fmgr.make_bv(64, k as i128));
        assert!(conjuncts.contains(&fmgr.make_equal(
            bytes(3 + k),
            fmgr.make_store(bytes(2 + k), at, fmgr.make_bv(8, 0))
        )));
    }
    assert!(!f.to_string().contains("__nondet_value"));

    let after = encoder.finish(f);
    let read = conv
        .encode_edge(
            &after,
            &edge(
                "main",
                4,
                assignment(Expression::id("main::r", char_type.clone()), c(10)),
            ),
        )
        .unwrap();
    assert_eq!(read.ssa().get_index("*int8_t"), Some(6));
    assert!(read.formula().to_string().contains("(select |*int8_t@6| "));
}

#[test]
fn quantified_array_assignment_and_retention() {
    let options = EncodingOptions {
        use_quantifiers_on_arrays: true,
        ..Default::default()
    };
    let conv = converter(options, &[]);
    let array = CType::array_of(CType::int(), 3);
    let declared = encode_all(
        &conv,
        &[edge("main", 1, declaration("main::a", array.clone(), None))],
    )
    .unwrap();

    let mut encoder = conv.edge_encoder(&declared, "main", location(2));
    let f = encoder
        .handle_slice_assignments(
            &[SliceAssignment::new(
                SliceExpression::of(Expression::id("main::a", array)),
                Some(SliceExpression::of(Expression::int_literal(5))),
            )],
            QuantifierPolicy::FromOptions,
            false,
        )
        .unwrap();

    let fmgr = conv.formula_manager();
    let arr = |i| fmgr.make_array("*int32_t", i, Sort::BitVec(64), Sort::BitVec(32));
    let a = address_of("main::a");
    let quantified = |f: &Formula| match f.term() {
        Term::Forall(vars, body) if vars.len() == 1 => (vars[0].clone(), body.clone()),
        _ => panic!("expected a quantified formula, got {}", f),
    };
    let conjuncts = f.conjuncts();
    assert_eq!(conjuncts.len(), 2);

    let (q, written) = quantified(&conjuncts[0]);
    let element = fmgr.make_plus(a.clone(), fmgr.make_multiply(q.clone(), fmgr.make_bv(64, 4)));
    assert_eq!(
        written,
        fmgr.make_equal(
            fmgr.make_select(arr(2), element.clone()),
            fmgr.make_ite(
                fmgr.make_less_than(q, fmgr.make_bv(64, 3), false),
                fmgr.make_bv(32, 5),
                fmgr.make_select(arr(1), element),
            )
        )
    );

    let (cell, retained) = quantified(&conjuncts[1]);
    let in_range = fmgr.make_and(
        fmgr.make_less_or_equal(a.clone(), cell.clone(), false),
        fmgr.make_less_than(cell.clone(), fmgr.make_plus(a, fmgr.make_bv(64, 12)), false),
    );
    assert_eq!(
        retained,
        fmgr.make_or(
            in_range,
            fmgr.make_equal(
                fmgr.make_select(arr(2), cell.clone()),
                fmgr.make_select(arr(1), cell)
            )
        )
    );

    let pf = encoder.finish(f);
    assert_eq!(pf.ssa().get_index("*int32_t"), Some(2));
}

#[test]
fn aliased_union_member_is_read_back_reinterpreted() {
    let conv = converter(Default::default(), &["main::u"]);
    let u = Expression::id("main::u", CType::union_named("u"));
    let float = CType::BuiltIn(BuiltIn::Float);
    let pf = encode_all(
        &conv,
        &[
            edge("main", 1, declaration("main::u", CType::union_named("u"), None)),
            edge(
                "main",
                2,
                assignment(
                    Expression::field(u.clone(), "i", CType::int()),
                    Expression::int_literal(5),
                ),
            ),
            edge(
                "main",
                3,
                assignment(
                    Expression::id("main::g", float.clone()),
                    Expression::field(u, "f", float.clone()),
                ),
            ),
        ],
    )
    .unwrap();

    let fmgr = conv.formula_manager();
    let types = conv.types();
    let float = types.simplify(&float);
    let float_sort = types.sort_of(&float).unwrap();
    let region = conv.regions.region_for(&float, None).heap_name();
    let floats = |i| fmgr.make_array(&region, i, Sort::BitVec(64), float_sort.clone());
    let a = address_of("main::u");
    let conjuncts = pf.formula().conjuncts();
    assert!(conjuncts.contains(&fmgr.make_equal(
        floats(2),
        fmgr.make_store(
            floats(1),
            a.clone(),
            fmgr.make_fp_from_ieee_bits(fmgr.make_bv(32, 5), float_sort.clone())
        )
    )));
    assert!(conjuncts.contains(&fmgr.make_equal(
        fmgr.make_variable(float_sort.clone(), "main::g", 2),
        fmgr.make_select(floats(2), a)
    )));
}

#[test]
fn dereferenced_write_retains_other_targets_conditionally() {
    let options = EncodingOptions {
        use_arrays_for_heap: false,
        ..Default::default()
    };
    let conv = converter(options, &["main::x"]);
    let p_type = CType::pointer_to(CType::int());
    let p = Expression::id("main::p", p_type.clone());
    let pf = encode_all(
        &conv,
        &[
            edge("main", 1, declaration("main::x", CType::int(), None)),
            edge("main", 2, declaration("main::p", p_type, None)),
            edge(
                "main",
                3,
                assignment(
                    Expression::deref(p, CType::int()),
                    Expression::int_literal(7),
                ),
            ),
        ],
    )
    .unwrap();

    let fmgr = conv.formula_manager();
    let cell = |i, address: Formula| {
        fmgr.make_uf_application("*int32_t", i, Sort::BitVec(32), vec![address])
    };
    let identity =
        |address: Formula| fmgr.make_equal(cell(2, address.clone()), cell(1, address));
    let x = address_of("main::x");
    let p2 = fmgr.make_variable(Sort::BitVec(64), "main::p", 2);

    let conjuncts = pf.formula().conjuncts();
    assert!(conjuncts.contains(&fmgr.make_equal(cell(2, p2.clone()), fmgr.make_bv(32, 7))));
    assert!(conjuncts.contains(&fmgr.make_or(fmgr.make_equal(x.clone(), p2), identity(x.clone()))));
    assert!(!conjuncts.contains(&identity(x)));
}

#[test]
fn arrays_without_literal_length_unroll_to_the_default() {
    let conv = converter(Default::default(), &[]);
    let n = int_var("main::n");
    let unknown = CType::Array(Box::new(CType::int()), None);
    let variable = CType::Array(Box::new(CType::int()), Some(Box::new(n)));
    let empty = conv.make_empty_path_formula();
    let mut encoder = conv.edge_encoder(&empty, "main", location(1));
    let mut fill = |ty: CType| {
        let p = Expression::id("main::p", CType::pointer_to(ty.clone()));
        encoder
            .handle_slice_assignments(
                &[SliceAssignment::new(
                    SliceExpression::of(Expression::deref(p, ty)),
                    Some(SliceExpression::of(Expression::int_literal(0))),
                )],
                QuantifierPolicy::FromOptions,
                false,
            )
            .unwrap()
    };
    let warnings = conv.soundness_warnings().len();

    let f = fill(unknown.clone());
    assert_eq!(f.conjuncts().len(), 20);
    assert!(f.conjuncts().iter().all(|c| matches!(c.term(), Term::Equal(..))));
    fill(unknown);
    assert_eq!(conv.soundness_warnings().len(), warnings + 1);
    assert!(conv
        .soundness_warnings()
        .iter()
        .any(|w| w.contains("unknown length") && w.contains("20 elements")));

    // Elements past the actual length are left alone
    let f = fill(variable.clone());
    assert_eq!(f.conjuncts().len(), 20);
    assert!(f.conjuncts().iter().all(|c| matches!(c.term(), Term::Or(..))));
    fill(variable);
    assert_eq!(conv.soundness_warnings().len(), warnings + 2);
    assert!(conv
        .soundness_warnings()
        .iter()
        .any(|w| w.contains("variable length") && w.contains("20 elements")));
}

#[test]
fn quantifier_policy_mixes_strategies_per_index() {
    let conv = converter(Default::default(), &[]);
    let rows = CType::Array(
        Box::new(CType::array_of(CType::int(), 2)),
        Some(Box::new(int_var("main::n"))),
    );
    let p = Expression::id("main::p", CType::pointer_to(rows.clone()));
    let zero = SliceAssignment::new(
        SliceExpression::of(Expression::deref(p, rows)),
        Some(SliceExpression::of(Expression::int_literal(0))),
    );
    let empty = conv.make_empty_path_formula();

    // The variable length is quantified, the literal inner length unrolled
    let f = conv
        .edge_encoder(&empty, "main", location(1))
        .handle_slice_assignments(&[zero.clone()], QuantifierPolicy::EncodeSymbolicOnly, false)
        .unwrap();
    let body = match f.conjuncts()[0].term() {
        Term::Forall(vars, body) if vars.len() == 1 => body.clone(),
        _ => panic!("expected a quantified write, got {}", f),
    };
    let elements = body.conjuncts();
    assert_eq!(elements.len(), 2);
    for e in elements.iter() {
        assert!(matches!(e.term(), Term::Equal(lhs, rhs)
            if matches!(lhs.term(), Term::Select(..)) && matches!(rhs.term(), Term::Ite(..))));
    }

    let f = conv
        .edge_encoder(&empty, "main", location(1))
        .handle_slice_assignments(&[zero], QuantifierPolicy::Unroll, false)
        .unwrap();
    assert!(!f.to_string().contains("(forall"));
    assert_eq!(f.conjuncts().len(), 40);
}

#[test]
fn unbounded_unrolling_can_be_interrupted() {
    let shutdown = ShutdownNotifier::new();
    let conv = converter_with(
        EncodingOptions::default().with_max_array_length(-1),
        &[],
        shutdown.clone(),
    );
    let huge = CType::array_of(CType::int(), 1 << 40);
    let p = Expression::id("main::p", CType::pointer_to(huge.clone()));
    let empty = conv.make_empty_path_formula();
    let mut encoder = conv.edge_encoder(&empty, "main", location(1));

    let stopper = std::thread::spawn(move || {
        std::thread::sleep(Duration::from_millis(50));
        shutdown.request_shutdown();
    });
    let result = encoder.handle_slice_assignments(
        &[SliceAssignment::new(
            SliceExpression::of(Expression::deref(p, huge)),
            Some(SliceExpression::of(Expression::int_literal(0))),
        )],
        QuantifierPolicy::Unroll,
        false,
    );
    stopper.join().unwrap();
    assert_eq!(result, Err(EncodingError::Interrupted));
}
