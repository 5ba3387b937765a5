//! Random calculator graphs for property-based testing.
//!
//! Generation is depth-limited so that graphs stay small enough to walk thousands
//! of times per property, and so that the frame count of a walk stays well under
//! the engine's default limit.

use quickcheck::{Arbitrary, Gen};

use super::{Calculation, Expr, Op};

/// Maximum nesting of binary operators and function calls.
const MAX_DEPTH: usize = 6;

const FUNC_NAMES: &[&str] = &["sum", "max", "min", "count"];

/// Generates a random number in the range [min, max] inclusive.
fn gen_range(g: &mut Gen, min: u32, max: u32) -> u32 {
    min + (u32::arbitrary(g) % (max - min + 1))
}

fn gen_scalar(g: &mut Gen) -> Expr {
    // Small values keep evaluation readable when a property fails.
    Expr::scalar(i64::from(i16::arbitrary(g)))
}

fn gen_expr(g: &mut Gen, depth: usize) -> Expr {
    if depth == 0 {
        return gen_scalar(g);
    }
    const CHOICES: &[&str] = &["scalar", "binary", "func"];
    match *g.choose(CHOICES).unwrap() {
        "scalar" => gen_scalar(g),
        "binary" => Expr::binary(Op::arbitrary(g), gen_expr(g, depth - 1), gen_expr(g, depth - 1)),
        "func" => {
            let name = *g.choose(FUNC_NAMES).unwrap();
            let args = (0..gen_range(g, 0, 4)).map(|_| gen_expr(g, depth - 1)).collect();
            Expr::func(name, args)
        }
        _ => unreachable!(),
    }
}

impl Arbitrary for Op {
    fn arbitrary(g: &mut Gen) -> Self {
        const CHOICES: &[Op] = &[Op::Add, Op::Sub, Op::Mul];
        *g.choose(CHOICES).unwrap()
    }
}

impl Arbitrary for Expr {
    fn arbitrary(g: &mut Gen) -> Self {
        gen_expr(g, g.size().min(MAX_DEPTH))
    }
}

impl Arbitrary for Calculation {
    fn arbitrary(g: &mut Gen) -> Self {
        Calculation::new(Expr::arbitrary(g))
    }
}
