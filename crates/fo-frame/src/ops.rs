//! Binary operation entry points: flexible methods, reverse methods,
//! comparisons and the `std::ops` operator impls.

use fo_columnar::{Column, ColumnError};
use fo_runtime::{EvidenceLedger, RuntimePolicy};
use fo_types::Scalar;
use rayon::prelude::*;
use tracing::{debug, trace};

use crate::align::align_operand;
use crate::{
    ArithmeticOp, Axis, ComparisonOp, DataFrame, FlexOptions, FrameError, OperationKind, Operand,
    validate_operand,
};

/// Which side of the operator the frame sits on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Side {
    Left,
    Right,
}

/// Run `kernel` over every aligned column pair, optionally on the rayon pool.
/// Output order always matches input order; the first failure wins.
fn dispatch<F>(
    pairs: &[(Column, Column)],
    parallel: bool,
    kernel: F,
) -> Result<Vec<Column>, FrameError>
where
    F: Fn(&Column, &Column) -> Result<Column, ColumnError> + Sync,
{
    let columns: Result<Vec<Column>, ColumnError> = if parallel {
        pairs.par_iter().map(|(l, r)| kernel(l, r)).collect()
    } else {
        pairs.iter().map(|(l, r)| kernel(l, r)).collect()
    };
    Ok(columns?)
}

/// `other op frame_column`. When the operator commutes for both dtypes the
/// forward kernel is reused.
fn reverse_kernel(
    frame_column: &Column,
    other: &Column,
    op: ArithmeticOp,
) -> Result<Column, ColumnError> {
    if op.commutes_for(frame_column.dtype()) && op.commutes_for(other.dtype()) {
        trace!(op = %op, "reverse operand commutes; using forward kernel");
        return frame_column.binary_arithmetic(other, op);
    }
    other.binary_arithmetic(frame_column, op)
}

impl DataFrame {
    fn run_arithmetic(
        &self,
        operand: &Operand<'_>,
        op: ArithmeticOp,
        options: &FlexOptions,
        side: Side,
        policy: &RuntimePolicy,
        ledger: &mut EvidenceLedger,
    ) -> Result<Self, FrameError> {
        validate_operand(self, operand, OperationKind::Arithmetic(op), options.axis)?;

        let mut aligned = align_operand(self, operand, options.axis, policy, ledger)?;
        if let Some(fill) = &options.fill_value {
            aligned = aligned.fill(fill)?;
        }

        let parallel = policy.decide_column_parallelism(aligned.pairs.len(), ledger);
        debug!(
            op = %op,
            side = ?side,
            operand = operand.kind_name(),
            columns = aligned.pairs.len(),
            parallel,
            "dispatching arithmetic"
        );

        let columns = match side {
            Side::Left => dispatch(&aligned.pairs, parallel, |l, r| l.binary_arithmetic(r, op))?,
            Side::Right => dispatch(&aligned.pairs, parallel, |l, r| reverse_kernel(l, r, op))?,
        };
        aligned.into_frame(columns)
    }

    /// Flexible arithmetic `self op other`.
    ///
    /// The operand is validated, aligned to this frame (union of labels), and
    /// optionally fill-substituted before each column is dispatched to the
    /// kernel selected for its dtype pair. Any failing column fails the whole
    /// call.
    pub fn arithmetic<'a>(
        &self,
        other: impl Into<Operand<'a>>,
        op: ArithmeticOp,
        options: &FlexOptions,
    ) -> Result<Self, FrameError> {
        self.arithmetic_with_policy(
            other,
            op,
            options,
            &RuntimePolicy::default(),
            &mut EvidenceLedger::new(),
        )
    }

    pub fn arithmetic_with_policy<'a>(
        &self,
        other: impl Into<Operand<'a>>,
        op: ArithmeticOp,
        options: &FlexOptions,
        policy: &RuntimePolicy,
        ledger: &mut EvidenceLedger,
    ) -> Result<Self, FrameError> {
        self.run_arithmetic(&other.into(), op, options, Side::Left, policy, ledger)
    }

    /// Reflected arithmetic `other op self` (`'a' + df`, `1 - df`).
    pub fn reverse_arithmetic<'a>(
        &self,
        other: impl Into<Operand<'a>>,
        op: ArithmeticOp,
        options: &FlexOptions,
    ) -> Result<Self, FrameError> {
        self.reverse_arithmetic_with_policy(
            other,
            op,
            options,
            &RuntimePolicy::default(),
            &mut EvidenceLedger::new(),
        )
    }

    pub fn reverse_arithmetic_with_policy<'a>(
        &self,
        other: impl Into<Operand<'a>>,
        op: ArithmeticOp,
        options: &FlexOptions,
        policy: &RuntimePolicy,
        ledger: &mut EvidenceLedger,
    ) -> Result<Self, FrameError> {
        self.run_arithmetic(&other.into(), op, options, Side::Right, policy, ledger)
    }

    pub fn add<'a>(&self, other: impl Into<Operand<'a>>) -> Result<Self, FrameError> {
        self.arithmetic(other, ArithmeticOp::Add, &FlexOptions::default())
    }

    pub fn sub<'a>(&self, other: impl Into<Operand<'a>>) -> Result<Self, FrameError> {
        self.arithmetic(other, ArithmeticOp::Sub, &FlexOptions::default())
    }

    pub fn mul<'a>(&self, other: impl Into<Operand<'a>>) -> Result<Self, FrameError> {
        self.arithmetic(other, ArithmeticOp::Mul, &FlexOptions::default())
    }

    /// True division; integer inputs produce `Float64`.
    pub fn div<'a>(&self, other: impl Into<Operand<'a>>) -> Result<Self, FrameError> {
        self.arithmetic(other, ArithmeticOp::Div, &FlexOptions::default())
    }

    pub fn floordiv<'a>(&self, other: impl Into<Operand<'a>>) -> Result<Self, FrameError> {
        self.arithmetic(other, ArithmeticOp::FloorDiv, &FlexOptions::default())
    }

    pub fn rem<'a>(&self, other: impl Into<Operand<'a>>) -> Result<Self, FrameError> {
        self.arithmetic(other, ArithmeticOp::Mod, &FlexOptions::default())
    }

    pub fn pow<'a>(&self, other: impl Into<Operand<'a>>) -> Result<Self, FrameError> {
        self.arithmetic(other, ArithmeticOp::Pow, &FlexOptions::default())
    }

    pub fn radd<'a>(&self, other: impl Into<Operand<'a>>) -> Result<Self, FrameError> {
        self.reverse_arithmetic(other, ArithmeticOp::Add, &FlexOptions::default())
    }

    pub fn rsub<'a>(&self, other: impl Into<Operand<'a>>) -> Result<Self, FrameError> {
        self.reverse_arithmetic(other, ArithmeticOp::Sub, &FlexOptions::default())
    }

    pub fn rmul<'a>(&self, other: impl Into<Operand<'a>>) -> Result<Self, FrameError> {
        self.reverse_arithmetic(other, ArithmeticOp::Mul, &FlexOptions::default())
    }

    pub fn rdiv<'a>(&self, other: impl Into<Operand<'a>>) -> Result<Self, FrameError> {
        self.reverse_arithmetic(other, ArithmeticOp::Div, &FlexOptions::default())
    }

    pub fn rfloordiv<'a>(&self, other: impl Into<Operand<'a>>) -> Result<Self, FrameError> {
        self.reverse_arithmetic(other, ArithmeticOp::FloorDiv, &FlexOptions::default())
    }

    pub fn rrem<'a>(&self, other: impl Into<Operand<'a>>) -> Result<Self, FrameError> {
        self.reverse_arithmetic(other, ArithmeticOp::Mod, &FlexOptions::default())
    }

    pub fn rpow<'a>(&self, other: impl Into<Operand<'a>>) -> Result<Self, FrameError> {
        self.reverse_arithmetic(other, ArithmeticOp::Pow, &FlexOptions::default())
    }

    /// Element-wise comparison; every output column is `Bool` with no
    /// missing entries.
    pub fn compare<'a>(
        &self,
        other: impl Into<Operand<'a>>,
        op: ComparisonOp,
    ) -> Result<Self, FrameError> {
        self.compare_with_axis(other, op, Axis::Columns)
    }

    pub fn compare_with_axis<'a>(
        &self,
        other: impl Into<Operand<'a>>,
        op: ComparisonOp,
        axis: Axis,
    ) -> Result<Self, FrameError> {
        self.compare_with_policy(
            other,
            op,
            axis,
            &RuntimePolicy::default(),
            &mut EvidenceLedger::new(),
        )
    }

    pub fn compare_with_policy<'a>(
        &self,
        other: impl Into<Operand<'a>>,
        op: ComparisonOp,
        axis: Axis,
        policy: &RuntimePolicy,
        ledger: &mut EvidenceLedger,
    ) -> Result<Self, FrameError> {
        let operand = other.into();
        validate_operand(self, &operand, OperationKind::Comparison(op), axis)?;

        let aligned = align_operand(self, &operand, axis, policy, ledger)?;
        let parallel = policy.decide_column_parallelism(aligned.pairs.len(), ledger);
        debug!(
            op = %op,
            operand = operand.kind_name(),
            columns = aligned.pairs.len(),
            parallel,
            "dispatching comparison"
        );

        let columns = dispatch(&aligned.pairs, parallel, |l, r| l.binary_comparison(r, op))?;
        aligned.into_frame(columns)
    }

    pub fn eq<'a>(&self, other: impl Into<Operand<'a>>) -> Result<Self, FrameError> {
        self.compare(other, ComparisonOp::Eq)
    }

    pub fn ne<'a>(&self, other: impl Into<Operand<'a>>) -> Result<Self, FrameError> {
        self.compare(other, ComparisonOp::Ne)
    }

    pub fn gt<'a>(&self, other: impl Into<Operand<'a>>) -> Result<Self, FrameError> {
        self.compare(other, ComparisonOp::Gt)
    }

    pub fn lt<'a>(&self, other: impl Into<Operand<'a>>) -> Result<Self, FrameError> {
        self.compare(other, ComparisonOp::Lt)
    }

    pub fn ge<'a>(&self, other: impl Into<Operand<'a>>) -> Result<Self, FrameError> {
        self.compare(other, ComparisonOp::Ge)
    }

    pub fn le<'a>(&self, other: impl Into<Operand<'a>>) -> Result<Self, FrameError> {
        self.compare(other, ComparisonOp::Le)
    }
}

// Infix operators never take a fill value.
macro_rules! impl_frame_operator {
    ($trait:ident, $method:ident, $op:expr) => {
        impl std::ops::$trait<&DataFrame> for &DataFrame {
            type Output = Result<DataFrame, FrameError>;

            fn $method(self, rhs: &DataFrame) -> Self::Output {
                self.arithmetic(rhs, $op, &FlexOptions::default())
            }
        }

        impl_frame_operator!(@scalar $trait, $method, $op, Scalar);
        impl_frame_operator!(@scalar $trait, $method, $op, i64);
        impl_frame_operator!(@scalar $trait, $method, $op, f64);
        impl_frame_operator!(@scalar $trait, $method, $op, &str);
    };
    (@scalar $trait:ident, $method:ident, $op:expr, $scalar:ty) => {
        impl std::ops::$trait<$scalar> for &DataFrame {
            type Output = Result<DataFrame, FrameError>;

            fn $method(self, rhs: $scalar) -> Self::Output {
                self.arithmetic(rhs, $op, &FlexOptions::default())
            }
        }

        impl std::ops::$trait<&DataFrame> for $scalar {
            type Output = Result<DataFrame, FrameError>;

            fn $method(self, rhs: &DataFrame) -> Self::Output {
                rhs.reverse_arithmetic(self, $op, &FlexOptions::default())
            }
        }
    };
}

impl_frame_operator!(Add, add, ArithmeticOp::Add);
impl_frame_operator!(Sub, sub, ArithmeticOp::Sub);
impl_frame_operator!(Mul, mul, ArithmeticOp::Mul);
impl_frame_operator!(Div, div, ArithmeticOp::Div);
impl_frame_operator!(Rem, rem, ArithmeticOp::Mod);

#[cfg(test)]
mod tests {
    use fo_runtime::{EvidenceLedger, IssueKind, RuntimePolicy};
    use fo_types::{DType, NullKind, Scalar};

    use crate::{ArithmeticOp, Axis, ComparisonOp, DataFrame, FlexOptions, FrameError, Series};

    fn ints<'a>(name: &'a str, values: &[i64]) -> (&'a str, Vec<Scalar>) {
        (name, values.iter().copied().map(Scalar::Int64).collect())
    }

    #[test]
    fn frame_add_aligns_on_union_of_labels() {
        let left = DataFrame::from_dict_with_index(
            vec![ints("a", &[1, 2])],
            vec![0_i64.into(), 1_i64.into()],
        )
        .expect("left");
        let right = DataFrame::from_dict_with_index(
            vec![ints("a", &[10, 20]), ints("b", &[5, 6])],
            vec![1_i64.into(), 2_i64.into()],
        )
        .expect("right");

        let out = left.add(&right).expect("add");
        assert_eq!(out.column_names(), vec!["a", "b"]);
        assert_eq!(
            out.column("a").expect("a").values(),
            &[
                Scalar::Null(NullKind::Null),
                Scalar::Int64(12),
                Scalar::Null(NullKind::Null)
            ]
        );
        assert_eq!(out.column("b").expect("b").validity().count_valid(), 0);
    }

    #[test]
    fn fill_value_only_replaces_one_sided_gaps() {
        let left = DataFrame::from_dict(vec![(
            "a",
            vec![
                Scalar::Float64(1.0),
                Scalar::Float64(f64::NAN),
                Scalar::Float64(f64::NAN),
            ],
        )])
        .expect("left");
        let right = DataFrame::from_dict(vec![(
            "a",
            vec![
                Scalar::Float64(f64::NAN),
                Scalar::Float64(2.0),
                Scalar::Float64(f64::NAN),
            ],
        )])
        .expect("right");

        let out = left
            .arithmetic(
                &right,
                ArithmeticOp::Add,
                &FlexOptions::default().with_fill_value(10.0),
            )
            .expect("add");
        assert_eq!(
            out.column("a").expect("a").values(),
            &[
                Scalar::Float64(11.0),
                Scalar::Float64(12.0),
                Scalar::Null(NullKind::NaN)
            ]
        );
    }

    #[test]
    fn reverse_subtraction_swaps_operands() {
        let df = DataFrame::from_dict(vec![ints("a", &[1, 2, 3])]).expect("frame");
        let out = df.rsub(10_i64).expect("rsub");
        assert_eq!(
            out.column("a").expect("a").values(),
            &[Scalar::Int64(9), Scalar::Int64(8), Scalar::Int64(7)]
        );
        let infix = (10_i64 - &df).expect("infix");
        assert_eq!(infix, out);
    }

    #[test]
    fn integer_division_family() {
        let df = DataFrame::from_dict(vec![ints("a", &[7, -7])]).expect("frame");

        let div = df.div(2_i64).expect("div");
        assert_eq!(div.dtypes(), vec![("a", DType::Float64)]);

        let floordiv = df.floordiv(2_i64).expect("floordiv");
        assert_eq!(
            floordiv.column("a").expect("a").values(),
            &[Scalar::Int64(3), Scalar::Int64(-4)]
        );

        let rem = (&df % 3_i64).expect("rem");
        assert_eq!(
            rem.column("a").expect("a").values(),
            &[Scalar::Int64(1), Scalar::Int64(2)]
        );

        let pow = df.pow(2_i64).expect("pow");
        assert_eq!(
            pow.column("a").expect("a").values(),
            &[Scalar::Int64(49), Scalar::Int64(49)]
        );

        let rpow = df.rpow(2_i64).expect("rpow");
        assert_eq!(rpow.column("a").expect("a").dtype(), DType::Float64);
    }

    #[test]
    fn sequence_operand_broadcasts_per_column() {
        let df = DataFrame::from_dict(vec![ints("a", &[1, 2]), ints("b", &[3, 4])])
            .expect("frame");
        let out = df
            .add(vec![Scalar::Int64(10), Scalar::Int64(100)])
            .expect("add");
        assert_eq!(
            out.column("b").expect("b").values(),
            &[Scalar::Int64(103), Scalar::Int64(104)]
        );

        let err = df
            .add(vec![Scalar::Int64(1); 3])
            .expect_err("wrong length");
        assert!(matches!(err, FrameError::ShapeMismatch(_)));
    }

    #[test]
    fn series_operand_along_rows() {
        let df = DataFrame::from_dict(vec![ints("a", &[1, 2]), ints("b", &[3, 4])])
            .expect("frame");
        let series = Series::from_values(
            "s",
            vec![0_i64.into(), 1_i64.into()],
            vec![Scalar::Int64(1), Scalar::Int64(2)],
        )
        .expect("series");

        let out = df
            .arithmetic(
                &series,
                ArithmeticOp::Mul,
                &FlexOptions::default().with_axis(Axis::Rows),
            )
            .expect("mul");
        assert_eq!(
            out.column("b").expect("b").values(),
            &[Scalar::Int64(3), Scalar::Int64(8)]
        );

        let cmp = df
            .compare_with_axis(&series, ComparisonOp::Ge, Axis::Rows)
            .expect("ge");
        assert_eq!(
            cmp.column("a").expect("a").values(),
            &[Scalar::Bool(true), Scalar::Bool(true)]
        );
    }

    #[test]
    fn ordering_across_incomparable_dtypes_is_type_mismatch() {
        let df = DataFrame::from_dict(vec![(
            "s",
            vec![Scalar::from("a"), Scalar::from("b")],
        )])
        .expect("frame");

        let err = df.gt(1_i64).expect_err("must fail");
        assert!(matches!(err, FrameError::TypeMismatch(_)));

        let eq = df.eq(1_i64).expect("equality is defined");
        assert_eq!(
            eq.column("s").expect("s").values(),
            &[Scalar::Bool(false), Scalar::Bool(false)]
        );
    }

    #[test]
    fn parallel_dispatch_matches_sequential() {
        let data: Vec<(String, Vec<Scalar>)> = (0..20)
            .map(|i| {
                (
                    format!("c{i}"),
                    vec![Scalar::Int64(i), Scalar::Float64(f64::NAN), Scalar::Int64(-i)],
                )
            })
            .collect();
        let df = DataFrame::from_dict(
            data.iter()
                .map(|(name, values)| (name.as_str(), values.clone()))
                .collect(),
        )
        .expect("frame");

        let mut ledger = EvidenceLedger::new();
        let parallel = df
            .arithmetic_with_policy(
                3_i64,
                ArithmeticOp::Mul,
                &FlexOptions::default(),
                &RuntimePolicy::strict().with_parallel_column_threshold(Some(2)),
                &mut ledger,
            )
            .expect("parallel");
        let sequential = df
            .arithmetic_with_policy(
                3_i64,
                ArithmeticOp::Mul,
                &FlexOptions::default(),
                &RuntimePolicy::strict().with_parallel_column_threshold(None),
                &mut EvidenceLedger::new(),
            )
            .expect("sequential");

        assert_eq!(parallel, sequential);
        assert_eq!(
            parallel.column_names(),
            df.column_names(),
            "column order is preserved"
        );
        assert!(
            ledger
                .records()
                .iter()
                .any(|record| record.issue.kind == IssueKind::ParallelDispatch)
        );
    }

    #[test]
    fn strict_policy_rejects_oversized_alignment() {
        let left = DataFrame::from_dict_with_index(
            vec![ints("a", &[1, 2, 3])],
            vec!["k".into(), "k".into(), "k".into()],
        )
        .expect("left");
        let right = DataFrame::from_dict_with_index(
            vec![ints("a", &[1, 2, 3])],
            vec!["k".into(), "k".into(), "j".into()],
        )
        .expect("right");

        let err = left
            .arithmetic_with_policy(
                &right,
                ArithmeticOp::Add,
                &FlexOptions::default(),
                &RuntimePolicy::strict().with_aligned_row_cap(Some(4)),
                &mut EvidenceLedger::new(),
            )
            .expect_err("6 cartesian rows + 1 exceed the cap");
        assert!(matches!(err, FrameError::CompatibilityRejected(_)));

        let repaired = left
            .arithmetic_with_policy(
                &right,
                ArithmeticOp::Add,
                &FlexOptions::default(),
                &RuntimePolicy::hardened(Some(4)),
                &mut EvidenceLedger::new(),
            )
            .expect("hardened mode admits");
        assert_eq!(repaired.len(), 7);
    }
}
