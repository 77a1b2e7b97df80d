//! The stock peephole patterns.

use crate::ir::{BinaryOp, InstrKind, InstrTag, ResultType};

use super::peephole::{Pattern, RewriteCtx, Template};

/// Constant folding and the two strength reductions, in matching priority order.
pub fn default_patterns() -> Vec<Pattern> {
    vec![fold_constants(), mul_to_shift(), div_to_shift()]
}

/// `imm a; imm b; a op b` becomes `imm (a op b)` for `+ - * /`.
pub fn fold_constants() -> Pattern {
    Pattern::new(
        "fold-constants",
        vec![
            Template::Kind(InstrTag::LoadImmInt),
            Template::Kind(InstrTag::LoadImmInt),
            Template::any_binary(),
        ],
        rewrite_fold,
    )
}

/// `load x; imm 2^k; x * 2^k` becomes `x << k`.
pub fn mul_to_shift() -> Pattern {
    Pattern::new(
        "mul-to-shl",
        vec![
            Template::Kind(InstrTag::Load),
            Template::Kind(InstrTag::LoadImmInt),
            Template::Binary {
                op: BinaryOp::Mul,
                ty: ResultType::Integer,
            },
        ],
        |ctx, at| rewrite_pow2(ctx, at, BinaryOp::ShL),
    )
}

/// `load x; imm 2^k; x / 2^k` becomes `x >> k`.
pub fn div_to_shift() -> Pattern {
    Pattern::new(
        "div-to-shr",
        vec![
            Template::Kind(InstrTag::Load),
            Template::Kind(InstrTag::LoadImmInt),
            Template::Binary {
                op: BinaryOp::Div,
                ty: ResultType::Integer,
            },
        ],
        |ctx, at| rewrite_pow2(ctx, at, BinaryOp::ShR),
    )
}

/// Exponent of `value` when it is a power of two.
pub fn power_of_two(value: i64) -> Option<u32> {
    if value > 0 && value & (value - 1) == 0 {
        Some(value.trailing_zeros())
    } else {
        None
    }
}

fn fold(op: BinaryOp, a: i64, b: i64) -> Option<i64> {
    match op {
        BinaryOp::Add => Some(a.wrapping_add(b)),
        BinaryOp::Sub => Some(a.wrapping_sub(b)),
        BinaryOp::Mul => Some(a.wrapping_mul(b)),
        BinaryOp::Div if b != 0 => Some(a.wrapping_div(b)),
        _ => None,
    }
}

fn rewrite_fold(ctx: &mut RewriteCtx<'_>, at: usize) -> bool {
    let (first, second, op_id) = (ctx.seq[at], ctx.seq[at + 1], ctx.seq[at + 2]);

    let (InstrKind::LoadImmInt(a), InstrKind::LoadImmInt(b)) = (ctx.kind(at), ctx.kind(at + 1))
    else {
        return false;
    };
    let (a, b) = (*a, *b);
    let InstrKind::Binary { op, lhs, rhs, .. } = *ctx.kind(at + 2) else {
        return false;
    };
    if ctx.prog.ty(op_id) != ResultType::Integer
        || ctx.resolve(lhs) != first
        || ctx.resolve(rhs) != second
        || ctx.referenced_outside(first, op_id)
        || ctx.referenced_outside(second, op_id)
    {
        return false;
    }
    let Some(value) = fold(op, a, b) else {
        return false;
    };

    let folded = ctx.prog.add(ResultType::Integer, InstrKind::LoadImmInt(value));
    ctx.seq.splice(at..at + 3, [folded]);
    ctx.replace(op_id, folded);
    true
}

fn rewrite_pow2(ctx: &mut RewriteCtx<'_>, at: usize, shift: BinaryOp) -> bool {
    let (load, imm, op_id) = (ctx.seq[at], ctx.seq[at + 1], ctx.seq[at + 2]);

    let InstrKind::LoadImmInt(divisor) = *ctx.kind(at + 1) else {
        return false;
    };
    let InstrKind::Binary {
        lhs, rhs, cmp_jump, ..
    } = *ctx.kind(at + 2)
    else {
        return false;
    };
    if ctx.resolve(lhs) != load || ctx.resolve(rhs) != imm || ctx.referenced_outside(imm, op_id) {
        return false;
    }
    let Some(exponent) = power_of_two(divisor) else {
        return false;
    };

    ctx.prog.instr_mut(imm).kind = InstrKind::LoadImmInt(i64::from(exponent));
    let shifted = ctx.prog.add(
        ResultType::Integer,
        InstrKind::Binary {
            op: shift,
            lhs: load,
            rhs: imm,
            cmp_jump,
        },
    );
    ctx.seq[at + 2] = shifted;
    ctx.replace(op_id, shifted);
    true
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_power_of_two() {
        assert_eq!(power_of_two(1), Some(0));
        assert_eq!(power_of_two(8), Some(3));
        assert_eq!(power_of_two(1 << 40), Some(40));
        assert_eq!(power_of_two(12), None);
        assert_eq!(power_of_two(0), None);
        assert_eq!(power_of_two(-4), None);
        assert_eq!(power_of_two(i64::MIN), None);
    }

    #[test]
    fn test_fold_declines_division_by_zero() {
        assert_eq!(fold(BinaryOp::Div, 7, 0), None);
        assert_eq!(fold(BinaryOp::Div, 7, 2), Some(3));
        assert_eq!(fold(BinaryOp::Lt, 1, 2), None);
        assert_eq!(fold(BinaryOp::Add, i64::MAX, 1), Some(i64::MIN));
    }

    #[test]
    fn test_default_pattern_order() {
        let names: Vec<_> = default_patterns().iter().map(|p| p.name).collect();
        assert_eq!(names, vec!["fold-constants", "mul-to-shl", "div-to-shr"]);
    }
}
