//! Cell-level operator kernels.
//!
//! Typed columns only reach these when no vectorized path applies; `Object`
//! columns always dispatch here, one tagged cell at a time.

use std::cmp::Ordering;

use fo_types::{
    ArithmeticOp, ComparisonOp, DType, NullKind, Scalar, TypeError, arithmetic_result_dtype,
};

/// Missing marker for a cell result whose inputs were not both present.
fn missing_result(left: &Scalar, right: &Scalar, out: DType) -> Scalar {
    match out {
        DType::Float64 => Scalar::Null(NullKind::NaN),
        DType::Datetime64 | DType::Timedelta64 => Scalar::Null(NullKind::NaT),
        _ if left.is_nan() || right.is_nan() => Scalar::Null(NullKind::NaN),
        _ if left.is_nat() || right.is_nat() => Scalar::Null(NullKind::NaT),
        _ => Scalar::Null(NullKind::Null),
    }
}

/// Python-style modulo: the result takes the sign of the divisor.
pub(crate) fn float_mod(a: f64, b: f64) -> f64 {
    if b == 0.0 {
        return f64::NAN;
    }
    let r = a % b;
    if r != 0.0 && (r < 0.0) != (b < 0.0) {
        r + b
    } else {
        r
    }
}

pub(crate) fn float_apply(op: ArithmeticOp) -> fn(f64, f64) -> f64 {
    match op {
        ArithmeticOp::Add => |a, b| a + b,
        ArithmeticOp::Sub => |a, b| a - b,
        ArithmeticOp::Mul => |a, b| a * b,
        ArithmeticOp::Div => |a, b| a / b,
        ArithmeticOp::FloorDiv => |a, b| (a / b).floor(),
        ArithmeticOp::Mod => float_mod,
        ArithmeticOp::Pow => f64::powf,
    }
}

/// Integer kernel. Returns `None` when the result is not an integer
/// (zero divisor for floordiv/mod, negative exponent), in which case the
/// caller evaluates on the float path.
pub(crate) fn int_apply(op: ArithmeticOp, a: i64, b: i64) -> Option<i64> {
    match op {
        ArithmeticOp::Add => Some(a.wrapping_add(b)),
        ArithmeticOp::Sub => Some(a.wrapping_sub(b)),
        ArithmeticOp::Mul => Some(a.wrapping_mul(b)),
        ArithmeticOp::Div => None,
        ArithmeticOp::FloorDiv => {
            if b == 0 {
                return None;
            }
            let q = a.wrapping_div(b);
            if a.wrapping_rem(b) != 0 && ((a < 0) != (b < 0)) {
                Some(q - 1)
            } else {
                Some(q)
            }
        }
        ArithmeticOp::Mod => {
            if b == 0 {
                return None;
            }
            let r = a.wrapping_rem(b);
            if r != 0 && ((r < 0) != (b < 0)) {
                Some(r + b)
            } else {
                Some(r)
            }
        }
        ArithmeticOp::Pow => u32::try_from(b).ok().map(|exp| a.wrapping_pow(exp)),
    }
}

fn numeric_cell(
    left: &Scalar,
    right: &Scalar,
    op: ArithmeticOp,
    out: DType,
) -> Result<Scalar, TypeError> {
    if out == DType::Int64 {
        let as_int = |value: &Scalar| match value {
            Scalar::Bool(v) => Some(i64::from(*v)),
            Scalar::Int64(v) => Some(*v),
            _ => None,
        };
        if let (Some(a), Some(b)) = (as_int(left), as_int(right))
            && let Some(result) = int_apply(op, a, b)
        {
            return Ok(Scalar::Int64(result));
        }
    }
    let lhs = left.to_f64()?;
    let rhs = right.to_f64()?;
    Ok(Scalar::Float64(float_apply(op)(lhs, rhs)))
}

fn overflow<T>(value: Option<T>) -> Result<T, TypeError> {
    value.ok_or(TypeError::OutOfBoundsDatetime)
}

/// Scale a nanosecond duration by a float factor; NaN/inf factors yield NaT.
fn scale_timedelta(nanos: i64, factor: f64, op: ArithmeticOp) -> Result<Scalar, TypeError> {
    let scaled = match op {
        ArithmeticOp::Mul => nanos as f64 * factor,
        ArithmeticOp::Div => nanos as f64 / factor,
        ArithmeticOp::FloorDiv => (nanos as f64 / factor).floor(),
        _ => {
            return Err(TypeError::UnsupportedOperand {
                op,
                left: DType::Timedelta64,
                right: DType::Float64,
            });
        }
    };
    if !scaled.is_finite() {
        return Ok(Scalar::Null(NullKind::NaT));
    }
    if scaled < i64::MIN as f64 || scaled > i64::MAX as f64 {
        return Err(TypeError::OutOfBoundsDatetime);
    }
    Ok(Scalar::Timedelta64(scaled.trunc() as i64))
}

fn timedelta_pair(a: i64, b: i64, op: ArithmeticOp) -> Result<Scalar, TypeError> {
    match op {
        ArithmeticOp::Add => Ok(Scalar::Timedelta64(overflow(a.checked_add(b))?)),
        ArithmeticOp::Sub => Ok(Scalar::Timedelta64(overflow(a.checked_sub(b))?)),
        ArithmeticOp::Div => Ok(Scalar::Float64(a as f64 / b as f64)),
        ArithmeticOp::FloorDiv => match int_apply(ArithmeticOp::FloorDiv, a, b) {
            Some(q) => Ok(Scalar::Int64(q)),
            None => Ok(Scalar::Null(NullKind::Null)),
        },
        ArithmeticOp::Mod => match int_apply(ArithmeticOp::Mod, a, b) {
            Some(r) => Ok(Scalar::Timedelta64(r)),
            None => Ok(Scalar::Null(NullKind::NaT)),
        },
        ArithmeticOp::Mul | ArithmeticOp::Pow => Err(TypeError::UnsupportedOperand {
            op,
            left: DType::Timedelta64,
            right: DType::Timedelta64,
        }),
    }
}

/// Apply `left op right` to two cells.
///
/// The result dtype is resolved from the cell tags, so an `Object` column
/// fails here as soon as one cell pairing has no kernel.
pub fn arithmetic_cell(
    left: &Scalar,
    right: &Scalar,
    op: ArithmeticOp,
) -> Result<Scalar, TypeError> {
    let out = arithmetic_result_dtype(left.dtype(), right.dtype(), op)?;
    if left.is_missing() || right.is_missing() {
        return Ok(missing_result(left, right, out));
    }

    let unsupported = || TypeError::UnsupportedOperand {
        op,
        left: left.dtype(),
        right: right.dtype(),
    };

    match (left, right) {
        (l, r) if l.dtype().is_numeric() && r.dtype().is_numeric() => {
            numeric_cell(l, r, op, out)
        }
        (Scalar::Utf8(a), Scalar::Utf8(b)) => {
            let mut joined = String::with_capacity(a.len() + b.len());
            joined.push_str(a);
            joined.push_str(b);
            Ok(Scalar::Utf8(joined))
        }
        (Scalar::Datetime64(a), Scalar::Timedelta64(b)) => match op {
            ArithmeticOp::Add => Ok(Scalar::Datetime64(overflow(a.checked_add(*b))?)),
            ArithmeticOp::Sub => Ok(Scalar::Datetime64(overflow(a.checked_sub(*b))?)),
            _ => Err(unsupported()),
        },
        (Scalar::Timedelta64(a), Scalar::Datetime64(b)) => {
            Ok(Scalar::Datetime64(overflow(a.checked_add(*b))?))
        }
        (Scalar::Datetime64(a), Scalar::Datetime64(b)) => {
            Ok(Scalar::Timedelta64(overflow(a.checked_sub(*b))?))
        }
        (Scalar::Timedelta64(a), Scalar::Timedelta64(b)) => timedelta_pair(*a, *b, op),
        (Scalar::Timedelta64(a), Scalar::Int64(b)) => match op {
            ArithmeticOp::Mul => Ok(Scalar::Timedelta64(overflow(a.checked_mul(*b))?)),
            ArithmeticOp::Div | ArithmeticOp::FloorDiv if *b == 0 => {
                Ok(Scalar::Null(NullKind::NaT))
            }
            ArithmeticOp::Div => Ok(Scalar::Timedelta64(overflow(a.checked_div(*b))?)),
            ArithmeticOp::FloorDiv => {
                overflow(a.checked_div(*b))?;
                let q = overflow(int_apply(ArithmeticOp::FloorDiv, *a, *b))?;
                Ok(Scalar::Timedelta64(q))
            }
            _ => Err(unsupported()),
        },
        (Scalar::Timedelta64(a), Scalar::Float64(b)) => scale_timedelta(*a, *b, op),
        (Scalar::Int64(a), Scalar::Timedelta64(b)) => {
            Ok(Scalar::Timedelta64(overflow(a.checked_mul(*b))?))
        }
        (Scalar::Float64(a), Scalar::Timedelta64(b)) => {
            scale_timedelta(*b, *a, ArithmeticOp::Mul)
        }
        _ => Err(unsupported()),
    }
}

/// Compare two cells.
///
/// A missing operand never produces a missing result: `ne` is `true`, every
/// other operator `false`. Equality across incomparable dtypes follows the
/// same rule; ordering across them is an error.
pub fn compare_cells(left: &Scalar, right: &Scalar, op: ComparisonOp) -> Result<bool, TypeError> {
    if left.is_missing() || right.is_missing() {
        return Ok(op.unordered_result());
    }

    let ordering = match (left, right) {
        (Scalar::Utf8(a), Scalar::Utf8(b)) => Some(a.cmp(b)),
        (Scalar::Int64(a), Scalar::Int64(b))
        | (Scalar::Datetime64(a), Scalar::Datetime64(b))
        | (Scalar::Timedelta64(a), Scalar::Timedelta64(b)) => Some(a.cmp(b)),
        (l, r) if l.dtype().is_numeric() && r.dtype().is_numeric() => {
            l.to_f64()?.partial_cmp(&r.to_f64()?)
        }
        _ => {
            if op.is_equality() {
                return Ok(op.unordered_result());
            }
            return Err(TypeError::InvalidComparison {
                op,
                left: left.dtype(),
                right: right.dtype(),
            });
        }
    };

    let Some(ordering) = ordering else {
        return Ok(op.unordered_result());
    };

    Ok(match op {
        ComparisonOp::Gt => ordering == Ordering::Greater,
        ComparisonOp::Lt => ordering == Ordering::Less,
        ComparisonOp::Eq => ordering == Ordering::Equal,
        ComparisonOp::Ne => ordering != Ordering::Equal,
        ComparisonOp::Ge => ordering != Ordering::Less,
        ComparisonOp::Le => ordering != Ordering::Greater,
    })
}
