use fo_types::Scalar;

use crate::{ArithmeticOp, Axis, ComparisonOp, DataFrame, FrameError, Series};

/// Right-hand side of a binary frame operation.
#[derive(Debug, Clone, PartialEq)]
pub enum Operand<'a> {
    Frame(&'a DataFrame),
    Series(&'a Series),
    Scalar(Scalar),
    /// A bare, unlabeled list or tuple of values.
    Sequence(Vec<Scalar>),
    /// No value at all (`None`).
    Absent,
}

impl<'a> From<&'a DataFrame> for Operand<'a> {
    fn from(value: &'a DataFrame) -> Self {
        Self::Frame(value)
    }
}

impl<'a> From<&'a Series> for Operand<'a> {
    fn from(value: &'a Series) -> Self {
        Self::Series(value)
    }
}

impl From<Scalar> for Operand<'_> {
    fn from(value: Scalar) -> Self {
        Self::Scalar(value)
    }
}

impl From<Option<Scalar>> for Operand<'_> {
    fn from(value: Option<Scalar>) -> Self {
        value.map_or(Self::Absent, Self::Scalar)
    }
}

impl From<Vec<Scalar>> for Operand<'_> {
    fn from(value: Vec<Scalar>) -> Self {
        Self::Sequence(value)
    }
}

impl From<&[Scalar]> for Operand<'_> {
    fn from(value: &[Scalar]) -> Self {
        Self::Sequence(value.to_vec())
    }
}

impl From<bool> for Operand<'_> {
    fn from(value: bool) -> Self {
        Self::Scalar(value.into())
    }
}

impl From<i64> for Operand<'_> {
    fn from(value: i64) -> Self {
        Self::Scalar(value.into())
    }
}

impl From<f64> for Operand<'_> {
    fn from(value: f64) -> Self {
        Self::Scalar(value.into())
    }
}

impl From<&str> for Operand<'_> {
    fn from(value: &str) -> Self {
        Self::Scalar(value.into())
    }
}

impl Operand<'_> {
    #[must_use]
    pub fn kind_name(&self) -> &'static str {
        match self {
            Self::Frame(_) => "frame",
            Self::Series(_) => "series",
            Self::Scalar(_) => "scalar",
            Self::Sequence(_) => "sequence",
            Self::Absent => "absent",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperationKind {
    Arithmetic(ArithmeticOp),
    Comparison(ComparisonOp),
}

/// Reject operands whose shape or kind cannot take part in `kind` against
/// `frame`. Runs before any alignment and never touches column data.
pub fn validate_operand(
    frame: &DataFrame,
    operand: &Operand<'_>,
    kind: OperationKind,
    axis: Axis,
) -> Result<(), FrameError> {
    let (rows, columns) = frame.shape();

    match (kind, operand) {
        (OperationKind::Comparison(op), Operand::Sequence(values)) => {
            Err(FrameError::ShapeMismatch(format!(
                "cannot compare a ({rows}, {columns}) frame with a bare sequence of length {} using '{op}'",
                values.len()
            )))
        }
        (OperationKind::Comparison(op), Operand::Absent) => Err(FrameError::IncomparableType(
            format!("'{op}' has no comparison defined against an absent value"),
        )),
        (OperationKind::Arithmetic(op), Operand::Absent) => Err(FrameError::TypeMismatch(
            format!("unsupported operand for {op}: frame and absent value"),
        )),
        (OperationKind::Arithmetic(op), Operand::Sequence(values)) => {
            let expected = match axis {
                Axis::Columns => columns,
                Axis::Rows => rows,
            };
            if values.len() != expected {
                return Err(FrameError::ShapeMismatch(format!(
                    "sequence of length {} cannot be broadcast for {op} against a ({rows}, {columns}) frame along {axis:?}; expected length {expected}",
                    values.len()
                )));
            }
            Ok(())
        }
        _ => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use fo_types::Scalar;

    use super::{OperationKind, Operand, validate_operand};
    use crate::{ArithmeticOp, Axis, ComparisonOp, DataFrame, FrameError};

    fn three_by_two() -> DataFrame {
        DataFrame::from_dict(vec![
            ("0", vec![Scalar::Int64(0), Scalar::Int64(2), Scalar::Int64(4)]),
            ("1", vec![Scalar::Int64(1), Scalar::Int64(3), Scalar::Int64(5)]),
        ])
        .expect("frame")
    }

    #[test]
    fn comparison_rejects_every_bare_sequence() {
        let df = three_by_two();
        for len in [1, 2, 3] {
            let operand = Operand::from(vec![Scalar::Int64(2); len]);
            let err = validate_operand(
                &df,
                &operand,
                OperationKind::Comparison(ComparisonOp::Eq),
                Axis::Columns,
            )
            .expect_err("must fail");
            assert!(matches!(err, FrameError::ShapeMismatch(_)), "len={len}");
        }
    }

    #[test]
    fn comparison_with_absent_is_incomparable() {
        let df = three_by_two();
        for op in [ComparisonOp::Eq, ComparisonOp::Ne, ComparisonOp::Lt] {
            let err = validate_operand(
                &df,
                &Operand::from(None),
                OperationKind::Comparison(op),
                Axis::Columns,
            )
            .expect_err("must fail");
            assert!(matches!(err, FrameError::IncomparableType(_)));
        }
    }

    #[test]
    fn arithmetic_with_absent_is_type_mismatch() {
        let err = validate_operand(
            &three_by_two(),
            &Operand::Absent,
            OperationKind::Arithmetic(ArithmeticOp::Add),
            Axis::Columns,
        )
        .expect_err("must fail");
        assert!(matches!(err, FrameError::TypeMismatch(_)));
    }

    #[test]
    fn arithmetic_sequence_length_follows_axis() {
        let df = three_by_two();
        let kind = OperationKind::Arithmetic(ArithmeticOp::Add);
        let two = Operand::from(vec![Scalar::Int64(1); 2]);
        let three = Operand::from(vec![Scalar::Int64(1); 3]);

        assert!(validate_operand(&df, &two, kind, Axis::Columns).is_ok());
        assert!(validate_operand(&df, &three, kind, Axis::Rows).is_ok());
        assert!(matches!(
            validate_operand(&df, &three, kind, Axis::Columns),
            Err(FrameError::ShapeMismatch(_))
        ));
        assert!(matches!(
            validate_operand(&df, &two, kind, Axis::Rows),
            Err(FrameError::ShapeMismatch(_))
        ));
    }

    #[test]
    fn scalars_and_frames_pass_through() {
        let df = three_by_two();
        let kind = OperationKind::Comparison(ComparisonOp::Gt);
        assert!(validate_operand(&df, &Operand::from(2_i64), kind, Axis::Columns).is_ok());
        assert!(validate_operand(&df, &Operand::from(&df), kind, Axis::Columns).is_ok());
        assert_eq!(Operand::from(&df).kind_name(), "frame");
    }
}
