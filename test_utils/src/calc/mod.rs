//! A small calculator AST and its descriptor table.
//!
//! `Expr` is a tagged union over three member structs, two of which sit behind an
//! `Arc`, so the graph exercises unions, slices and structural sharing at once:
//!
//! ```text
//! Calculation { expr: Expr }
//! Expr = Binary(Arc<BinaryOp>) | Scalar(Scalar) | Func(Arc<Func>)
//! BinaryOp { left: Expr, right: Expr, op: Op }
//! Func { name: String, args: Vec<Expr> }
//! Scalar { value: i64 }
//! ```

pub mod generator;

use std::any::Any;
use std::sync::Arc;

use once_cell::sync::Lazy;
use rewalk::{Descriptor, Engine, Handle, TypeId};

pub const CALCULATION: TypeId = TypeId(1);
pub const BINARY_OP: TypeId = TypeId(2);
pub const FUNC: TypeId = TypeId(3);
pub const SCALAR: TypeId = TypeId(4);
pub const EXPR: TypeId = TypeId(5);
pub const EXPR_SLICE: TypeId = TypeId(6);

/// Shared engine over [`descriptors`].
pub static ENGINE: Lazy<Engine> =
    Lazy::new(|| Engine::new(descriptors()).expect("calc descriptors must link"));

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Op {
    Add,
    Sub,
    Mul,
}

#[derive(Clone, Debug, PartialEq)]
pub struct Calculation {
    pub expr: Expr,
}

#[derive(Clone, Debug, PartialEq)]
pub enum Expr {
    Binary(Arc<BinaryOp>),
    Scalar(Scalar),
    Func(Arc<Func>),
}

#[derive(Clone, Debug, PartialEq)]
pub struct BinaryOp {
    pub left: Expr,
    pub right: Expr,
    pub op: Op,
}

#[derive(Clone, Debug, PartialEq)]
pub struct Func {
    pub name: String,
    pub args: Vec<Expr>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Scalar {
    pub value: i64,
}

impl Calculation {
    pub fn new(expr: Expr) -> Self {
        Self { expr }
    }

    pub fn eval(&self) -> i64 {
        self.expr.eval()
    }
}

impl Expr {
    pub fn scalar(value: i64) -> Self {
        Expr::Scalar(Scalar { value })
    }

    pub fn binary(op: Op, left: Expr, right: Expr) -> Self {
        Expr::Binary(Arc::new(BinaryOp { left, right, op }))
    }

    pub fn func(name: &str, args: Vec<Expr>) -> Self {
        Expr::Func(Arc::new(Func { name: name.to_string(), args }))
    }

    /// Evaluates with wrapping arithmetic. `sum` adds its arguments, `max` and
    /// `min` pick one (0 when empty), any other function yields its argument count.
    pub fn eval(&self) -> i64 {
        match self {
            Expr::Scalar(s) => s.value,
            Expr::Binary(b) => {
                let (l, r) = (b.left.eval(), b.right.eval());
                match b.op {
                    Op::Add => l.wrapping_add(r),
                    Op::Sub => l.wrapping_sub(r),
                    Op::Mul => l.wrapping_mul(r),
                }
            }
            Expr::Func(f) => {
                let args = f.args.iter().map(Expr::eval);
                match f.name.as_str() {
                    "sum" => args.fold(0i64, i64::wrapping_add),
                    "max" => args.max().unwrap_or(0),
                    "min" => args.min().unwrap_or(0),
                    _ => f.args.len() as i64,
                }
            }
        }
    }

    /// Number of `Scalar` leaves.
    pub fn scalars(&self) -> usize {
        match self {
            Expr::Scalar(_) => 1,
            Expr::Binary(b) => b.left.scalars() + b.right.scalars(),
            Expr::Func(f) => f.args.iter().map(Expr::scalars).sum(),
        }
    }
}

fn inspect_expr(expr: &Expr) -> Option<(TypeId, &dyn Any)> {
    match expr {
        Expr::Binary(b) => Some((BINARY_OP, &**b as &dyn Any)),
        Expr::Scalar(s) => Some((SCALAR, s as &dyn Any)),
        Expr::Func(f) => Some((FUNC, &**f as &dyn Any)),
    }
}

fn rewrap_expr(id: TypeId, payload: Handle<'_>) -> Option<Expr> {
    match id {
        BINARY_OP => payload.take::<BinaryOp>().map(|b| Expr::Binary(Arc::new(b))),
        SCALAR => payload.take::<Scalar>().map(Expr::Scalar),
        FUNC => payload.take::<Func>().map(|f| Expr::Func(Arc::new(f))),
        _ => None,
    }
}

/// The descriptor table for the calculator types.
pub fn descriptors() -> Vec<Descriptor> {
    vec![
        Descriptor::structure::<Calculation>(CALCULATION, "Calculation")
            .field("expr", EXPR, |c| &c.expr, |c, v| c.expr = v)
            .build(),
        Descriptor::structure::<BinaryOp>(BINARY_OP, "BinaryOp")
            .field("left", EXPR, |b| &b.left, |b, v| b.left = v)
            .field("right", EXPR, |b| &b.right, |b, v| b.right = v)
            .build(),
        Descriptor::structure::<Func>(FUNC, "Func")
            .field("args", EXPR_SLICE, |f| &f.args, |f, v| f.args = v)
            .build(),
        Descriptor::structure::<Scalar>(SCALAR, "Scalar").build(),
        Descriptor::tagged_union::<Expr>(EXPR, "Expr", inspect_expr, rewrap_expr),
        Descriptor::slice::<Expr>(EXPR_SLICE, EXPR),
    ]
}

/// `(1 + 2) * sum(3, 4, max(5, 6))`
pub fn sample() -> Calculation {
    Calculation::new(Expr::binary(
        Op::Mul,
        Expr::binary(Op::Add, Expr::scalar(1), Expr::scalar(2)),
        Expr::func(
            "sum",
            vec![
                Expr::scalar(3),
                Expr::scalar(4),
                Expr::func("max", vec![Expr::scalar(5), Expr::scalar(6)]),
            ],
        ),
    ))
}
