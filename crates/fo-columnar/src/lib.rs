#![forbid(unsafe_code)]

mod kernels;

use fo_types::{
    DType, NullKind, Scalar, TypeError, arithmetic_result_dtype, cast_scalar, cast_scalar_owned,
    common_dtype, comparison_result_dtype, infer_dtype,
};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::trace;

pub use fo_types::{ArithmeticOp, ComparisonOp};
pub use kernels::{arithmetic_cell, compare_cells};

#[derive(Debug, Clone, Eq)]
pub struct ValidityMask {
    words: Vec<u64>,
    len: usize,
}

impl ValidityMask {
    #[must_use]
    pub fn from_values(values: &[Scalar]) -> Self {
        let mut mask = Self::all_invalid(values.len());
        for (idx, value) in values.iter().enumerate() {
            if !value.is_missing() {
                mask.words[idx / 64] |= 1_u64 << (idx % 64);
            }
        }
        mask
    }

    #[must_use]
    pub fn all_valid(len: usize) -> Self {
        let word_count = len.div_ceil(64);
        let mut words = vec![u64::MAX; word_count];
        let remainder = len % 64;
        if remainder > 0 && !words.is_empty() {
            let last = words.len() - 1;
            words[last] = (1_u64 << remainder) - 1;
        }
        Self { words, len }
    }

    #[must_use]
    pub fn all_invalid(len: usize) -> Self {
        Self {
            words: vec![0_u64; len.div_ceil(64)],
            len,
        }
    }

    #[must_use]
    pub fn get(&self, idx: usize) -> bool {
        if idx >= self.len {
            return false;
        }
        (self.words[idx / 64] >> (idx % 64)) & 1 == 1
    }

    pub fn set(&mut self, idx: usize, value: bool) {
        if idx >= self.len {
            return;
        }
        if value {
            self.words[idx / 64] |= 1_u64 << (idx % 64);
        } else {
            self.words[idx / 64] &= !(1_u64 << (idx % 64));
        }
    }

    #[must_use]
    pub fn count_valid(&self) -> usize {
        self.words.iter().map(|w| w.count_ones() as usize).sum()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.len
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    #[must_use]
    pub fn and_mask(&self, other: &Self) -> Self {
        let len = self.len.min(other.len);
        let word_count = len.div_ceil(64);
        let words = self.words[..word_count]
            .iter()
            .zip(&other.words[..word_count])
            .map(|(a, b)| a & b)
            .collect();
        Self { words, len }
    }

    #[must_use]
    pub fn or_mask(&self, other: &Self) -> Self {
        let len = self.len.min(other.len);
        let word_count = len.div_ceil(64);
        let mut words: Vec<u64> = self.words[..word_count]
            .iter()
            .zip(&other.words[..word_count])
            .map(|(a, b)| a | b)
            .collect();
        let remainder = len % 64;
        if remainder > 0 && !words.is_empty() {
            let last = words.len() - 1;
            words[last] &= (1_u64 << remainder) - 1;
        }
        Self { words, len }
    }

    #[must_use]
    pub fn not_mask(&self) -> Self {
        let mut words: Vec<u64> = self.words.iter().map(|w| !w).collect();
        let remainder = self.len % 64;
        if remainder > 0 && !words.is_empty() {
            let last = words.len() - 1;
            words[last] &= (1_u64 << remainder) - 1;
        }
        Self {
            words,
            len: self.len,
        }
    }

    pub fn bits(&self) -> impl Iterator<Item = bool> + '_ {
        (0..self.len).map(|idx| self.get(idx))
    }
}

impl PartialEq for ValidityMask {
    fn eq(&self, other: &Self) -> bool {
        self.len == other.len && self.bits().eq(other.bits())
    }
}

impl Serialize for ValidityMask {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        use serde::ser::SerializeStruct;
        let bits: Vec<bool> = self.bits().collect();
        let mut state = serializer.serialize_struct("ValidityMask", 1)?;
        state.serialize_field("bits", &bits)?;
        state.end()
    }
}

impl<'de> Deserialize<'de> for ValidityMask {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        struct Raw {
            bits: Vec<bool>,
        }
        let raw = Raw::deserialize(deserializer)?;
        let mut mask = Self::all_invalid(raw.bits.len());
        for (idx, &valid) in raw.bits.iter().enumerate() {
            mask.set(idx, valid);
        }
        Ok(mask)
    }
}

/// Contiguous typed storage used by the vectorized numeric kernels.
///
/// Invalid positions hold an unspecified placeholder; callers pair the data
/// with a `ValidityMask` before reading.
#[derive(Debug, Clone, PartialEq)]
pub enum ColumnData {
    Float64(Vec<f64>),
    Int64(Vec<i64>),
}

impl ColumnData {
    /// Materialize a typed array from scalars. Only `Float64` and `Int64`
    /// targets are supported; other targets return `None`.
    #[must_use]
    pub fn from_scalars(values: &[Scalar], dtype: DType) -> Option<Self> {
        match dtype {
            DType::Float64 => Some(Self::Float64(
                values
                    .iter()
                    .map(|v| match v {
                        Scalar::Float64(f) => *f,
                        Scalar::Int64(i) => *i as f64,
                        Scalar::Bool(b) => f64::from(u8::from(*b)),
                        _ => 0.0,
                    })
                    .collect(),
            )),
            DType::Int64 => Some(Self::Int64(
                values
                    .iter()
                    .map(|v| match v {
                        Scalar::Int64(i) => *i,
                        Scalar::Bool(b) => i64::from(*b),
                        _ => 0,
                    })
                    .collect(),
            )),
            _ => None,
        }
    }
}

/// Vectorized binary arithmetic on `&[f64]` slices. Positions invalid on
/// either side come back invalid.
fn vectorized_binary_f64(
    left: &[f64],
    right: &[f64],
    left_validity: &ValidityMask,
    right_validity: &ValidityMask,
    op: ArithmeticOp,
) -> (Vec<f64>, ValidityMask) {
    let combined = left_validity.and_mask(right_validity);
    let apply = kernels::float_apply(op);

    let out: Vec<f64> = left
        .iter()
        .zip(right)
        .enumerate()
        .map(|(i, (&l, &r))| if combined.get(i) { apply(l, r) } else { 0.0 })
        .collect();

    (out, combined)
}

/// Vectorized binary arithmetic on `&[i64]` slices.
///
/// Returns `None` when any valid pair has no integral result, signalling the
/// caller to evaluate the whole column on the `f64` path.
fn vectorized_binary_i64(
    left: &[i64],
    right: &[i64],
    left_validity: &ValidityMask,
    right_validity: &ValidityMask,
    op: ArithmeticOp,
) -> Option<(Vec<i64>, ValidityMask)> {
    let combined = left_validity.and_mask(right_validity);

    let out = left
        .iter()
        .zip(right)
        .enumerate()
        .map(|(i, (&l, &r))| {
            if combined.get(i) {
                kernels::int_apply(op, l, r)
            } else {
                Some(0)
            }
        })
        .collect::<Option<Vec<i64>>>()?;

    Some((out, combined))
}

/// Homogeneous typed vector plus a missing-value bitmask.
///
/// Typed columns store the dtype's sentinel (`Scalar::missing_for_dtype`) at
/// every missing position. `Null` and `Object` columns keep whatever missing
/// marker a cell arrived with, so a NaN stays NaN.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Column {
    dtype: DType,
    values: Vec<Scalar>,
    validity: ValidityMask,
}

#[derive(Debug, Error, Clone, PartialEq)]
pub enum ColumnError {
    #[error("column length mismatch: left={left}, right={right}")]
    LengthMismatch { left: usize, right: usize },
    #[error(transparent)]
    Type(#[from] TypeError),
}

fn keeps_cell_sentinels(dtype: DType) -> bool {
    matches!(dtype, DType::Null | DType::Object)
}

impl Column {
    /// Construct a column, coercing values to the target dtype.
    pub fn new(dtype: DType, values: Vec<Scalar>) -> Result<Self, ColumnError> {
        let coerced = values
            .into_iter()
            .map(|value| {
                if value.is_missing() {
                    if keeps_cell_sentinels(dtype) {
                        return Ok(value.normalize_missing());
                    }
                    return Ok(Scalar::missing_for_dtype(dtype));
                }
                if value.dtype() == dtype {
                    Ok(value)
                } else {
                    cast_scalar_owned(value, dtype)
                }
            })
            .collect::<Result<Vec<_>, _>>()?;

        let validity = ValidityMask::from_values(&coerced);

        Ok(Self {
            dtype,
            values: coerced,
            validity,
        })
    }

    pub fn from_values(values: Vec<Scalar>) -> Result<Self, ColumnError> {
        let dtype = infer_dtype(&values);
        Self::new(dtype, values)
    }

    /// A column of `len` missing cells carrying `dtype`'s sentinel.
    #[must_use]
    pub fn all_missing(dtype: DType, len: usize) -> Self {
        Self {
            dtype,
            values: vec![Scalar::missing_for_dtype(dtype); len],
            validity: ValidityMask::all_invalid(len),
        }
    }

    /// Repeat `value` `len` times. A missing literal yields a `Null`-typed
    /// column that keeps the literal's missing kind.
    pub fn broadcast(value: &Scalar, len: usize) -> Result<Self, ColumnError> {
        let value = value.clone().normalize_missing();
        let dtype = value.dtype();
        Self::new(dtype, vec![value; len])
    }

    #[must_use]
    pub fn dtype(&self) -> DType {
        self.dtype
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.values.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    #[must_use]
    pub fn values(&self) -> &[Scalar] {
        &self.values
    }

    #[must_use]
    pub fn validity(&self) -> &ValidityMask {
        &self.validity
    }

    pub fn reindex_by_positions(&self, positions: &[Option<usize>]) -> Result<Self, ColumnError> {
        let values = positions
            .iter()
            .map(|slot| match slot {
                Some(idx) => self
                    .values
                    .get(*idx)
                    .cloned()
                    .unwrap_or_else(|| Scalar::missing_for_dtype(self.dtype)),
                None => Scalar::missing_for_dtype(self.dtype),
            })
            .collect::<Vec<_>>();

        Self::new(self.dtype, values)
    }

    fn check_same_len(&self, right: &Self) -> Result<(), ColumnError> {
        if self.len() != right.len() {
            return Err(ColumnError::LengthMismatch {
                left: self.len(),
                right: right.len(),
            });
        }
        Ok(())
    }

    fn vectorized_float(&self, right: &Self, op: ArithmeticOp) -> Option<Result<Self, ColumnError>> {
        let (Some(ColumnData::Float64(l)), Some(ColumnData::Float64(r))) = (
            ColumnData::from_scalars(&self.values, DType::Float64),
            ColumnData::from_scalars(&right.values, DType::Float64),
        ) else {
            return None;
        };

        let (data, validity) = vectorized_binary_f64(&l, &r, &self.validity, &right.validity, op);
        let values = data
            .into_iter()
            .enumerate()
            .map(|(i, v)| {
                if validity.get(i) {
                    Scalar::Float64(v)
                } else {
                    Scalar::Null(NullKind::NaN)
                }
            })
            .collect();

        Some(Self::new(DType::Float64, values))
    }

    /// Typed-array fast path for numeric operands.
    ///
    /// Returns `None` when the operands are not numeric so the caller falls
    /// back to the cell kernels.
    fn try_vectorized_binary(
        &self,
        right: &Self,
        op: ArithmeticOp,
        out_dtype: DType,
    ) -> Option<Result<Self, ColumnError>> {
        let numeric_or_null = |dtype: DType| dtype.is_numeric() || dtype == DType::Null;
        if !numeric_or_null(self.dtype) || !numeric_or_null(right.dtype) {
            return None;
        }

        match out_dtype {
            DType::Float64 => self.vectorized_float(right, op),
            DType::Int64 => {
                let (Some(ColumnData::Int64(l)), Some(ColumnData::Int64(r))) = (
                    ColumnData::from_scalars(&self.values, DType::Int64),
                    ColumnData::from_scalars(&right.values, DType::Int64),
                ) else {
                    return None;
                };

                let Some((data, validity)) =
                    vectorized_binary_i64(&l, &r, &self.validity, &right.validity, op)
                else {
                    trace!(op = %op, "integer kernel has no integral result; using float path");
                    return self.vectorized_float(right, op);
                };

                let values = data
                    .into_iter()
                    .enumerate()
                    .map(|(i, v)| {
                        if validity.get(i) {
                            Scalar::Int64(v)
                        } else {
                            Scalar::Null(NullKind::Null)
                        }
                    })
                    .collect();

                Some(Self::new(DType::Int64, values))
            }
            _ => None,
        }
    }

    /// Element-wise `self op right`.
    ///
    /// The output dtype comes from the promotion rules; numeric pairs use the
    /// vectorized path, everything else the cell kernels. Any cell failure
    /// fails the whole column.
    pub fn binary_arithmetic(&self, right: &Self, op: ArithmeticOp) -> Result<Self, ColumnError> {
        self.check_same_len(right)?;

        let out_dtype = arithmetic_result_dtype(self.dtype, right.dtype, op)?;

        if let Some(result) = self.try_vectorized_binary(right, op, out_dtype) {
            trace!(op = %op, left = ?self.dtype, right = ?right.dtype, out = ?out_dtype, "vectorized kernel");
            return result;
        }

        trace!(op = %op, left = ?self.dtype, right = ?right.dtype, out = ?out_dtype, "cell kernel");
        let values = self
            .values
            .iter()
            .zip(&right.values)
            .map(|(l, r)| arithmetic_cell(l, r, op))
            .collect::<Result<Vec<_>, _>>()?;

        Self::new(out_dtype, values)
    }

    /// Element-wise comparison producing a `Bool` column with no missing
    /// entries (see [`compare_cells`]).
    pub fn binary_comparison(&self, right: &Self, op: ComparisonOp) -> Result<Self, ColumnError> {
        self.check_same_len(right)?;

        let values = self
            .values
            .iter()
            .zip(&right.values)
            .map(|(l, r)| compare_cells(l, r, op).map(Scalar::Bool))
            .collect::<Result<Vec<_>, _>>()?;

        Self::new(comparison_result_dtype(self.dtype, right.dtype, op), values)
    }

    /// Compare every element against a scalar value, producing a `Bool` column.
    pub fn compare_scalar(&self, scalar: &Scalar, op: ComparisonOp) -> Result<Self, ColumnError> {
        let values = self
            .values
            .iter()
            .map(|v| compare_cells(v, scalar, op).map(Scalar::Bool))
            .collect::<Result<Vec<_>, _>>()?;

        Self::new(comparison_result_dtype(self.dtype, scalar.dtype(), op), values)
    }

    /// Select elements where `mask` is `true`. Missing mask entries select
    /// nothing.
    pub fn filter_by_mask(&self, mask: &Self) -> Result<Self, ColumnError> {
        self.check_same_len(mask)?;

        let values = self
            .values
            .iter()
            .zip(&mask.values)
            .filter_map(|(val, mask_val)| match mask_val {
                Scalar::Bool(true) => Some(val.clone()),
                _ => None,
            })
            .collect::<Vec<_>>();

        Self::new(self.dtype, values)
    }

    /// Replace the cells flagged in `positions` with `fill`.
    ///
    /// The fill is cast to this column's dtype; when it cannot be, the column
    /// is promoted to the common dtype of both.
    fn fill_at(&self, positions: &ValidityMask, fill: &Scalar) -> Result<Self, ColumnError> {
        let target = match self.dtype {
            DType::Null => fill.dtype(),
            DType::Object => DType::Object,
            dtype if cast_scalar(fill, dtype).is_ok() => dtype,
            dtype => common_dtype(dtype, fill.dtype())?,
        };
        let fill = cast_scalar(fill, target)?;

        let values = self
            .values
            .iter()
            .enumerate()
            .map(|(i, v)| {
                if positions.get(i) {
                    fill.clone()
                } else {
                    v.clone()
                }
            })
            .collect();

        Self::new(target, values)
    }

    #[must_use]
    pub fn semantic_eq(&self, other: &Self) -> bool {
        self.dtype == other.dtype
            && self.values.len() == other.values.len()
            && self
                .values
                .iter()
                .zip(&other.values)
                .all(|(left, right)| left.semantic_eq(right))
    }
}

/// One-sided fill substitution for an aligned column pair.
///
/// Where exactly one side is missing, that side receives `fill`. Cells
/// missing on both sides, or present on both, are left untouched. Returns
/// the substituted pair and the number of cells filled.
pub fn fill_pair(
    left: &Column,
    right: &Column,
    fill: &Scalar,
) -> Result<(Column, Column, usize), ColumnError> {
    left.check_same_len(right)?;

    if fill.is_missing() {
        return Ok((left.clone(), right.clone(), 0));
    }

    let present_both = left.validity.and_mask(&right.validity);
    let present_either = left.validity.or_mask(&right.validity);
    let one_sided = present_either.and_mask(&present_both.not_mask());

    let fill_left = one_sided.and_mask(&left.validity.not_mask());
    let fill_right = one_sided.and_mask(&right.validity.not_mask());
    let filled = one_sided.count_valid();

    if filled == 0 {
        return Ok((left.clone(), right.clone(), 0));
    }

    let left_out = if fill_left.count_valid() > 0 {
        left.fill_at(&fill_left, fill)?
    } else {
        left.clone()
    };
    let right_out = if fill_right.count_valid() > 0 {
        right.fill_at(&fill_right, fill)?
    } else {
        right.clone()
    };

    Ok((left_out, right_out, filled))
}

#[cfg(test)]
mod tests {
    use fo_types::{DType, NullKind, Scalar};

    use super::{ArithmeticOp, Column, ColumnData, ColumnError, ComparisonOp, ValidityMask, fill_pair};

    fn int_column(values: &[i64]) -> Column {
        Column::from_values(values.iter().copied().map(Scalar::Int64).collect()).expect("ints")
    }

    #[test]
    fn reindex_injects_missing_values() {
        let column = int_column(&[10, 20]);

        let out = column
            .reindex_by_positions(&[Some(1), None, Some(0)])
            .expect("reindex should work");

        assert_eq!(
            out.values(),
            &[
                Scalar::Int64(20),
                Scalar::Null(NullKind::Null),
                Scalar::Int64(10)
            ]
        );
        assert_eq!(out.dtype(), DType::Int64);
    }

    #[test]
    fn typed_columns_canonicalize_missing_markers() {
        let column = Column::new(
            DType::Float64,
            vec![Scalar::Float64(f64::NAN), Scalar::Null(NullKind::Null)],
        )
        .expect("column");
        assert_eq!(
            column.values(),
            &[Scalar::Null(NullKind::NaN), Scalar::Null(NullKind::NaN)]
        );

        let object = Column::new(
            DType::Object,
            vec![Scalar::Float64(f64::NAN), Scalar::Null(NullKind::Null)],
        )
        .expect("column");
        assert_eq!(
            object.values(),
            &[Scalar::Null(NullKind::NaN), Scalar::Null(NullKind::Null)]
        );
    }

    #[test]
    fn numeric_addition_propagates_missing() {
        let left = Column::from_values(vec![
            Scalar::Int64(1),
            Scalar::Null(NullKind::Null),
            Scalar::Float64(f64::NAN),
        ])
        .expect("left");
        let right = int_column(&[2, 5, 3]);

        let out = left
            .binary_arithmetic(&right, ArithmeticOp::Add)
            .expect("add should pass");

        assert_eq!(out.dtype(), DType::Float64);
        assert_eq!(out.values()[0], Scalar::Float64(3.0));
        assert_eq!(out.values()[1], Scalar::Null(NullKind::NaN));
        assert_eq!(out.values()[2], Scalar::Null(NullKind::NaN));
    }

    #[test]
    fn integer_addition_stays_integer() {
        let out = int_column(&[1, 2, 3])
            .binary_arithmetic(&int_column(&[10, 20, 30]), ArithmeticOp::Add)
            .expect("add");
        assert_eq!(out, int_column(&[11, 22, 33]));
    }

    #[test]
    fn integer_true_division_is_float() {
        let out = int_column(&[1, 3])
            .binary_arithmetic(&int_column(&[2, 2]), ArithmeticOp::Div)
            .expect("div");
        assert_eq!(out.dtype(), DType::Float64);
        assert_eq!(out.values(), &[Scalar::Float64(0.5), Scalar::Float64(1.5)]);
    }

    #[test]
    fn integer_floordiv_by_zero_promotes_whole_column() {
        let out = int_column(&[7, 1])
            .binary_arithmetic(&int_column(&[2, 0]), ArithmeticOp::FloorDiv)
            .expect("floordiv");
        assert_eq!(out.dtype(), DType::Float64);
        assert_eq!(
            out.values(),
            &[Scalar::Float64(3.0), Scalar::Float64(f64::INFINITY)]
        );
    }

    #[test]
    fn adding_missing_broadcast_promotes_integers() {
        let nan = Column::broadcast(&Scalar::Float64(f64::NAN), 3).expect("broadcast");
        assert_eq!(nan.dtype(), DType::Null);
        let out = int_column(&[1, 2, 3])
            .binary_arithmetic(&nan, ArithmeticOp::Add)
            .expect("add");
        assert_eq!(out.dtype(), DType::Float64);
        assert_eq!(out.validity().count_valid(), 0);
    }

    #[test]
    fn string_concatenation_keeps_missing() {
        let left = Column::from_values(vec![
            Scalar::from("x"),
            Scalar::Null(NullKind::NaN),
            Scalar::from("x"),
        ])
        .expect("left");
        let suffix = Column::broadcast(&Scalar::from("a"), 3).expect("broadcast");

        let out = left
            .binary_arithmetic(&suffix, ArithmeticOp::Add)
            .expect("concat");
        assert_eq!(out.dtype(), DType::Utf8);
        assert_eq!(
            out.values(),
            &[
                Scalar::from("xa"),
                Scalar::Null(NullKind::Null),
                Scalar::from("xa")
            ]
        );
    }

    #[test]
    fn object_column_fails_as_a_whole_on_one_bad_cell() {
        let object = Column::from_values(vec![
            Scalar::from("x"),
            Scalar::from("y"),
            Scalar::Int64(1),
        ])
        .expect("object");
        assert_eq!(object.dtype(), DType::Object);
        let prefix = Column::broadcast(&Scalar::from("foo_"), 3).expect("broadcast");

        let err = prefix
            .binary_arithmetic(&object, ArithmeticOp::Add)
            .expect_err("must fail");
        assert!(matches!(err, ColumnError::Type(ref e) if e.is_type_mismatch()));
    }

    #[test]
    fn comparison_never_yields_missing() {
        let left = Column::from_values(vec![
            Scalar::Float64(1.0),
            Scalar::Null(NullKind::NaN),
            Scalar::Float64(3.0),
        ])
        .expect("left");

        let gt = left
            .compare_scalar(&Scalar::Int64(2), ComparisonOp::Gt)
            .expect("gt");
        assert_eq!(gt.dtype(), DType::Bool);
        assert_eq!(
            gt.values(),
            &[Scalar::Bool(false), Scalar::Bool(false), Scalar::Bool(true)]
        );
        assert_eq!(gt.validity().count_valid(), 3);

        let ne = left
            .binary_comparison(&left, ComparisonOp::Ne)
            .expect("ne");
        assert_eq!(
            ne.values(),
            &[Scalar::Bool(false), Scalar::Bool(true), Scalar::Bool(false)]
        );
    }

    #[test]
    fn length_mismatch_is_rejected() {
        let err = int_column(&[1, 2])
            .binary_arithmetic(&int_column(&[1]), ArithmeticOp::Add)
            .expect_err("must fail");
        assert_eq!(err, ColumnError::LengthMismatch { left: 2, right: 1 });
    }

    #[test]
    fn fill_pair_only_touches_one_sided_missing() {
        let left = Column::from_values(vec![
            Scalar::Int64(1),
            Scalar::Null(NullKind::Null),
            Scalar::Null(NullKind::Null),
            Scalar::Int64(4),
        ])
        .expect("left");
        let right = Column::from_values(vec![
            Scalar::Null(NullKind::Null),
            Scalar::Int64(2),
            Scalar::Null(NullKind::Null),
            Scalar::Int64(40),
        ])
        .expect("right");

        let (l, r, filled) = fill_pair(&left, &right, &Scalar::Int64(0)).expect("fill");
        assert_eq!(filled, 2);
        assert_eq!(
            l.values(),
            &[
                Scalar::Int64(1),
                Scalar::Int64(0),
                Scalar::Null(NullKind::Null),
                Scalar::Int64(4)
            ]
        );
        assert_eq!(
            r.values(),
            &[
                Scalar::Int64(0),
                Scalar::Int64(2),
                Scalar::Null(NullKind::Null),
                Scalar::Int64(40)
            ]
        );
    }

    #[test]
    fn fill_pair_promotes_when_fill_needs_wider_dtype() {
        let left = Column::from_values(vec![Scalar::Int64(1), Scalar::Null(NullKind::Null)])
            .expect("left");
        let right = Column::from_values(vec![Scalar::Float64(1.0), Scalar::Float64(2.0)])
            .expect("right");

        let (l, _, _) = fill_pair(&left, &right, &Scalar::Float64(0.5)).expect("fill");
        assert_eq!(l.dtype(), DType::Float64);
        assert_eq!(l.values(), &[Scalar::Float64(1.0), Scalar::Float64(0.5)]);
    }

    #[test]
    fn fill_pair_rejects_fill_with_no_common_dtype() {
        let left = Column::from_values(vec![Scalar::Int64(1), Scalar::Null(NullKind::Null)])
            .expect("left");
        let right = int_column(&[1, 2]);
        let err = fill_pair(&left, &right, &Scalar::from("zero")).expect_err("must fail");
        assert!(matches!(err, ColumnError::Type(ref e) if e.is_type_mismatch()));
    }

    #[test]
    fn filter_by_mask_treats_missing_as_false() {
        let data = int_column(&[1, 2, 3]);
        let mask = Column::new(
            DType::Bool,
            vec![
                Scalar::Bool(true),
                Scalar::Null(NullKind::Null),
                Scalar::Bool(true),
            ],
        )
        .expect("mask");
        let out = data.filter_by_mask(&mask).expect("filter");
        assert_eq!(out, int_column(&[1, 3]));
    }

    // === Packed bitvec ValidityMask ===

    #[test]
    fn validity_mask_from_values_packs_correctly() {
        let values = vec![
            Scalar::Int64(1),
            Scalar::Null(NullKind::Null),
            Scalar::Int64(3),
        ];
        let mask = ValidityMask::from_values(&values);
        assert_eq!(mask.len(), 3);
        assert!(mask.get(0));
        assert!(!mask.get(1));
        assert!(mask.get(2));
        assert_eq!(mask.count_valid(), 2);
    }

    #[test]
    fn validity_mask_all_valid_and_invalid() {
        let valid = ValidityMask::all_valid(100);
        assert_eq!(valid.count_valid(), 100);
        let invalid = ValidityMask::all_invalid(100);
        assert_eq!(invalid.count_valid(), 0);
        assert_eq!(valid.not_mask(), invalid);
    }

    #[test]
    fn validity_mask_and_or_not() {
        let mut a = ValidityMask::all_invalid(4);
        a.set(0, true);
        a.set(1, true);

        let mut b = ValidityMask::all_invalid(4);
        b.set(1, true);
        b.set(2, true);

        let and = a.and_mask(&b);
        assert_eq!(and.bits().collect::<Vec<_>>(), vec![false, true, false, false]);

        let or = a.or_mask(&b);
        assert_eq!(or.bits().collect::<Vec<_>>(), vec![true, true, true, false]);

        let not_a = a.not_mask();
        assert_eq!(not_a.bits().collect::<Vec<_>>(), vec![false, false, true, true]);
        assert_eq!(not_a.count_valid(), 2);
    }

    #[test]
    fn validity_mask_boundary_65_elements() {
        let mut values = vec![Scalar::Int64(1); 65];
        values[64] = Scalar::Null(NullKind::Null);
        let mask = ValidityMask::from_values(&values);
        assert_eq!(mask.len(), 65);
        assert_eq!(mask.count_valid(), 64);
        assert!(mask.get(63));
        assert!(!mask.get(64));
        assert_eq!(mask.not_mask().count_valid(), 1);
    }

    #[test]
    fn validity_mask_serde_round_trip() {
        let mask = ValidityMask::from_values(&[
            Scalar::Int64(1),
            Scalar::Null(NullKind::Null),
            Scalar::Int64(3),
        ]);
        let json = serde_json::to_string(&mask).expect("serialize");
        assert!(json.contains("\"bits\""), "should serialize as bits field");
        let back: ValidityMask = serde_json::from_str(&json).expect("deserialize");
        assert_eq!(mask, back);
    }

    #[test]
    fn column_data_only_materializes_numeric_targets() {
        let values = vec![Scalar::Bool(true), Scalar::Int64(4)];
        assert_eq!(
            ColumnData::from_scalars(&values, DType::Int64),
            Some(ColumnData::Int64(vec![1, 4]))
        );
        assert_eq!(ColumnData::from_scalars(&values, DType::Utf8), None);
    }
}
