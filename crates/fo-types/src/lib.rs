#![forbid(unsafe_code)]

mod promote;

use chrono::{DateTime, NaiveDateTime, TimeDelta};
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use promote::{ArithmeticOp, ComparisonOp, arithmetic_result_dtype, comparison_result_dtype};

const NANOS_PER_SECOND: i64 = 1_000_000_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DType {
    Null,
    Bool,
    Int64,
    Float64,
    Utf8,
    Datetime64,
    Timedelta64,
    Object,
}

impl DType {
    /// Bool, Int64 and Float64 participate in numeric promotion.
    #[must_use]
    pub fn is_numeric(self) -> bool {
        matches!(self, Self::Bool | Self::Int64 | Self::Float64)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NullKind {
    Null,
    NaN,
    NaT,
}

/// A single cell value.
///
/// `Datetime64` holds nanoseconds since the UNIX epoch and `Timedelta64` holds
/// a signed nanosecond duration, matching the `datetime64[ns]` /
/// `timedelta64[ns]` storage model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum Scalar {
    Null(NullKind),
    Bool(bool),
    Int64(i64),
    Float64(f64),
    Utf8(String),
    Datetime64(i64),
    Timedelta64(i64),
}

impl From<bool> for Scalar {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<i64> for Scalar {
    fn from(value: i64) -> Self {
        Self::Int64(value)
    }
}

impl From<f64> for Scalar {
    fn from(value: f64) -> Self {
        Self::Float64(value)
    }
}

impl From<&str> for Scalar {
    fn from(value: &str) -> Self {
        Self::Utf8(value.to_owned())
    }
}

impl From<String> for Scalar {
    fn from(value: String) -> Self {
        Self::Utf8(value)
    }
}

impl Scalar {
    #[must_use]
    pub fn dtype(&self) -> DType {
        match self {
            Self::Null(_) => DType::Null,
            Self::Bool(_) => DType::Bool,
            Self::Int64(_) => DType::Int64,
            Self::Float64(_) => DType::Float64,
            Self::Utf8(_) => DType::Utf8,
            Self::Datetime64(_) => DType::Datetime64,
            Self::Timedelta64(_) => DType::Timedelta64,
        }
    }

    #[must_use]
    pub fn is_missing(&self) -> bool {
        match self {
            Self::Null(_) => true,
            Self::Float64(v) => v.is_nan(),
            _ => false,
        }
    }

    #[must_use]
    pub fn is_nan(&self) -> bool {
        matches!(self, Self::Null(NullKind::NaN)) || matches!(self, Self::Float64(v) if v.is_nan())
    }

    #[must_use]
    pub fn is_nat(&self) -> bool {
        matches!(self, Self::Null(NullKind::NaT))
    }

    /// Sentinel stored at a missing position of a column of `dtype`.
    #[must_use]
    pub fn missing_for_dtype(dtype: DType) -> Self {
        match dtype {
            DType::Float64 => Self::Null(NullKind::NaN),
            DType::Datetime64 | DType::Timedelta64 => Self::Null(NullKind::NaT),
            DType::Null | DType::Bool | DType::Int64 | DType::Utf8 | DType::Object => {
                Self::Null(NullKind::Null)
            }
        }
    }

    /// Collapse a float NaN literal onto the `Null(NaN)` marker so a NaN
    /// operand is treated as missing regardless of how it was spelled.
    #[must_use]
    pub fn normalize_missing(self) -> Self {
        match self {
            Self::Float64(v) if v.is_nan() => Self::Null(NullKind::NaN),
            other => other,
        }
    }

    #[must_use]
    pub fn semantic_eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Float64(a), Self::Float64(b)) => (a.is_nan() && b.is_nan()) || (a == b),
            (Self::Null(NullKind::NaN), Self::Float64(v))
            | (Self::Float64(v), Self::Null(NullKind::NaN)) => v.is_nan(),
            _ => self == other,
        }
    }

    pub fn to_f64(&self) -> Result<f64, TypeError> {
        match self {
            Self::Bool(v) => Ok(if *v { 1.0 } else { 0.0 }),
            Self::Int64(v) => Ok(*v as f64),
            Self::Float64(v) => Ok(*v),
            Self::Null(kind) => Err(TypeError::ValueIsMissing { kind: *kind }),
            Self::Utf8(v) => Err(TypeError::NonNumericValue {
                value: v.clone(),
                dtype: DType::Utf8,
            }),
            Self::Datetime64(v) | Self::Timedelta64(v) => Err(TypeError::NonNumericValue {
                value: v.to_string(),
                dtype: self.dtype(),
            }),
        }
    }

    /// Build a `Datetime64` scalar from a naive (UTC) timestamp.
    pub fn from_naive_datetime(value: NaiveDateTime) -> Result<Self, TypeError> {
        value
            .and_utc()
            .timestamp_nanos_opt()
            .map(Self::Datetime64)
            .ok_or(TypeError::OutOfBoundsDatetime)
    }

    /// Build a `Timedelta64` scalar from a chrono duration.
    pub fn from_timedelta(value: TimeDelta) -> Result<Self, TypeError> {
        value
            .num_nanoseconds()
            .map(Self::Timedelta64)
            .ok_or(TypeError::OutOfBoundsDatetime)
    }

    #[must_use]
    pub fn as_naive_datetime(&self) -> Option<NaiveDateTime> {
        let Self::Datetime64(nanos) = self else {
            return None;
        };
        let secs = nanos.div_euclid(NANOS_PER_SECOND);
        let subsec = u32::try_from(nanos.rem_euclid(NANOS_PER_SECOND)).ok()?;
        DateTime::from_timestamp(secs, subsec).map(|dt| dt.naive_utc())
    }

    #[must_use]
    pub fn as_timedelta(&self) -> Option<TimeDelta> {
        match self {
            Self::Timedelta64(nanos) => Some(TimeDelta::nanoseconds(*nanos)),
            _ => None,
        }
    }
}

#[derive(Debug, Error, Clone, PartialEq)]
pub enum TypeError {
    #[error("dtype coercion from {left:?} to {right:?} has no compatible common type")]
    IncompatibleDtypes { left: DType, right: DType },
    #[error("unsupported operand dtype(s) for {op}: {left:?} and {right:?}")]
    UnsupportedOperand {
        op: ArithmeticOp,
        left: DType,
        right: DType,
    },
    #[error("'{op}' not supported between dtypes {left:?} and {right:?}")]
    InvalidComparison {
        op: ComparisonOp,
        left: DType,
        right: DType,
    },
    #[error("cannot cast scalar of dtype {from:?} to {to:?}")]
    InvalidCast { from: DType, to: DType },
    #[error("cannot cast float {value} to int64 without loss")]
    LossyFloatToInt { value: f64 },
    #[error("expected 0/1 for bool cast from int64 but found {value}")]
    InvalidBoolInt { value: i64 },
    #[error("expected 0.0/1.0 for bool cast from float64 but found {value}")]
    InvalidBoolFloat { value: f64 },
    #[error("value {value:?} has non-numeric dtype {dtype:?}")]
    NonNumericValue { value: String, dtype: DType },
    #[error("value is missing ({kind:?})")]
    ValueIsMissing { kind: NullKind },
    #[error("datetime arithmetic out of bounds for nanosecond precision")]
    OutOfBoundsDatetime,
}

impl TypeError {
    /// True when the error means "no kernel exists for these operand types",
    /// as opposed to a value-level failure such as an overflow.
    #[must_use]
    pub fn is_type_mismatch(&self) -> bool {
        matches!(
            self,
            Self::IncompatibleDtypes { .. }
                | Self::UnsupportedOperand { .. }
                | Self::InvalidComparison { .. }
        )
    }
}

pub fn common_dtype(left: DType, right: DType) -> Result<DType, TypeError> {
    use DType::{Bool, Float64, Int64, Null};

    let out = match (left, right) {
        (a, b) if a == b => a,
        (Null, other) | (other, Null) => other,
        (Bool, Int64) | (Int64, Bool) => Int64,
        (Bool, Float64) | (Float64, Bool) => Float64,
        (Int64, Float64) | (Float64, Int64) => Float64,
        _ => return Err(TypeError::IncompatibleDtypes { left, right }),
    };

    Ok(out)
}

/// Infer a column dtype from its values.
///
/// Values with no common typed representation (e.g. strings mixed with
/// integers) fall back to `Object`. A NaN float literal counts as missing:
/// it only makes the column `Float64` when nothing non-numeric is present.
#[must_use]
pub fn infer_dtype(values: &[Scalar]) -> DType {
    let mut current = DType::Null;
    let mut saw_nan = false;
    for value in values {
        if matches!(value, Scalar::Float64(v) if v.is_nan()) {
            saw_nan = true;
            continue;
        }
        match common_dtype(current, value.dtype()) {
            Ok(next) => current = next,
            Err(_) => return DType::Object,
        }
    }
    if saw_nan && matches!(current, DType::Null | DType::Bool | DType::Int64) {
        return DType::Float64;
    }
    current
}

/// Cast a scalar to a target dtype, taking ownership to avoid redundant clones
/// when the value already has the correct type.
pub fn cast_scalar_owned(value: Scalar, target: DType) -> Result<Scalar, TypeError> {
    let from = value.dtype();
    if matches!(value, Scalar::Null(_)) {
        // Object cells keep the sentinel they arrived with.
        if target == DType::Object {
            return Ok(value);
        }
        return Ok(Scalar::missing_for_dtype(target));
    }
    if from == target || target == DType::Object {
        return Ok(value);
    }

    match target {
        DType::Null => Ok(Scalar::Null(NullKind::Null)),
        DType::Bool => match &value {
            Scalar::Int64(v) => match *v {
                0 => Ok(Scalar::Bool(false)),
                1 => Ok(Scalar::Bool(true)),
                _ => Err(TypeError::InvalidBoolInt { value: *v }),
            },
            Scalar::Float64(v) => {
                if *v == 0.0 {
                    Ok(Scalar::Bool(false))
                } else if *v == 1.0 {
                    Ok(Scalar::Bool(true))
                } else {
                    Err(TypeError::InvalidBoolFloat { value: *v })
                }
            }
            _ => Err(TypeError::InvalidCast { from, to: target }),
        },
        DType::Int64 => match &value {
            Scalar::Bool(v) => Ok(Scalar::Int64(i64::from(*v))),
            Scalar::Float64(v) => {
                if !v.is_finite() || *v != v.trunc() {
                    return Err(TypeError::LossyFloatToInt { value: *v });
                }
                if *v < i64::MIN as f64 || *v > i64::MAX as f64 {
                    return Err(TypeError::LossyFloatToInt { value: *v });
                }
                Ok(Scalar::Int64(*v as i64))
            }
            _ => Err(TypeError::InvalidCast { from, to: target }),
        },
        DType::Float64 => match &value {
            Scalar::Bool(v) => Ok(Scalar::Float64(if *v { 1.0 } else { 0.0 })),
            Scalar::Int64(v) => Ok(Scalar::Float64(*v as f64)),
            _ => Err(TypeError::InvalidCast { from, to: target }),
        },
        DType::Utf8 | DType::Datetime64 | DType::Timedelta64 | DType::Object => {
            Err(TypeError::InvalidCast { from, to: target })
        }
    }
}

/// Cast a scalar reference to a target dtype (clones only when conversion is needed).
pub fn cast_scalar(value: &Scalar, target: DType) -> Result<Scalar, TypeError> {
    cast_scalar_owned(value.clone(), target)
}
