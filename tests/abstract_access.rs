//! Read-only child access through `Engine::abstract_node`.

use std::any::Any;

use rewalk::engine::{Abstract, Kind, TypeId, WalkError};
use test_utils::calc::{self, BinaryOp, CALCULATION, ENGINE, EXPR, EXPR_SLICE, Expr, FUNC, SCALAR, Scalar};

/// Renders a graph generically, e.g. `Calculation(Expr(BinaryOp(...)))`.
fn render(node: Abstract<'_>) -> String {
    let name = match node.name() {
        "" => ENGINE.stringify(node.type_id()),
        name => name.to_string(),
    };
    if let Some(scalar) = node.downcast_ref::<Scalar>() {
        return scalar.value.to_string();
    }
    let children: Vec<String> = node.children().map(render).collect();
    format!("{name}({})", children.join(", "))
}

#[test]
fn test_struct_children() {
    let _ = rewalk::logging::init_logger(false, Some("debug"));
    let calc = calc::sample();
    let root = ENGINE.abstract_node(CALCULATION, Some(&calc)).unwrap().unwrap();

    assert_eq!(root.type_id(), CALCULATION);
    assert_eq!(root.name(), "Calculation");
    assert_eq!(root.num_children(), 1);
    assert!(root.child_at(1).is_none());

    let expr = root.child_at(0).unwrap();
    assert_eq!(expr.type_id(), EXPR);
    assert_eq!(ENGINE.descriptor(expr.type_id()).unwrap().kind(), Kind::TaggedUnion);
    assert_eq!(expr.num_children(), 1);
    assert!(expr.child_at(1).is_none());

    let op = expr.child_at(0).unwrap();
    assert_eq!(op.type_id(), calc::BINARY_OP);
    assert_eq!(op.num_children(), 2);
    assert!(op.downcast_ref::<BinaryOp>().is_some());
}

#[test]
fn test_slice_children() {
    let args = vec![Expr::scalar(1), Expr::scalar(2), Expr::scalar(3)];
    let slice = ENGINE.abstract_node(EXPR_SLICE, Some(&args)).unwrap().unwrap();
    assert_eq!(slice.num_children(), 3);
    assert_eq!(slice.name(), "");

    let last = slice.child_at(2).unwrap().child_at(0).unwrap();
    assert_eq!(last.type_id(), SCALAR);
    assert_eq!(last.downcast_ref::<Scalar>(), Some(&Scalar { value: 3 }));
    assert!(slice.child_at(3).is_none());
}

#[test]
fn test_generic_rendering() {
    let calc = calc::sample();
    let root = ENGINE.abstract_node(CALCULATION, Some(&calc)).unwrap().unwrap();
    assert_eq!(
        render(root),
        "Calculation(Expr(BinaryOp(Expr(BinaryOp(Expr(1), Expr(2))), \
         Expr(Func([]Expr(Expr(3), Expr(4), Expr(Func([]Expr(Expr(5), Expr(6))))))))))"
    );
}

#[test]
fn test_null_and_unknown() {
    assert!(ENGINE.abstract_node(FUNC, None).unwrap().is_none());
    let value: &dyn Any = &0u8;
    let err = ENGINE.abstract_node(TypeId(77), Some(value)).unwrap_err();
    assert!(matches!(err, WalkError::UnknownType(TypeId(77))));
}

#[test]
fn test_mismatched_value_has_no_children() {
    let wrong = 5u32;
    let node = ENGINE.abstract_node(CALCULATION, Some(&wrong)).unwrap().unwrap();
    assert_eq!(node.num_children(), 1);
    assert!(node.child_at(0).is_none());
}
