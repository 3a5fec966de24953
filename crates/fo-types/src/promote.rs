use std::fmt;

use serde::{Deserialize, Serialize};

use crate::{DType, TypeError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArithmeticOp {
    Add,
    Sub,
    Mul,
    Div,
    FloorDiv,
    Mod,
    Pow,
}

impl ArithmeticOp {
    #[must_use]
    pub fn symbol(self) -> &'static str {
        match self {
            Self::Add => "+",
            Self::Sub => "-",
            Self::Mul => "*",
            Self::Div => "/",
            Self::FloorDiv => "//",
            Self::Mod => "%",
            Self::Pow => "**",
        }
    }

    /// Whether `a op b == b op a` holds for operands stored as `dtype`.
    ///
    /// Addition concatenates strings, so neither `add` nor `mul` commutes
    /// over `Utf8` or `Object` columns.
    #[must_use]
    pub fn commutes_for(self, dtype: DType) -> bool {
        match self {
            Self::Add | Self::Mul => !matches!(dtype, DType::Utf8 | DType::Object),
            Self::Sub | Self::Div | Self::FloorDiv | Self::Mod | Self::Pow => false,
        }
    }
}

impl fmt::Display for ArithmeticOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.symbol())
    }
}

/// Element-wise comparison operations that produce `Bool`-typed columns.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ComparisonOp {
    Gt,
    Lt,
    Eq,
    Ne,
    Ge,
    Le,
}

impl ComparisonOp {
    #[must_use]
    pub fn symbol(self) -> &'static str {
        match self {
            Self::Gt => ">",
            Self::Lt => "<",
            Self::Eq => "==",
            Self::Ne => "!=",
            Self::Ge => ">=",
            Self::Le => "<=",
        }
    }

    #[must_use]
    pub fn is_equality(self) -> bool {
        matches!(self, Self::Eq | Self::Ne)
    }

    /// Result for a pair with no meaningful ordering (a missing operand, or
    /// an equality test across incomparable dtypes).
    #[must_use]
    pub fn unordered_result(self) -> bool {
        matches!(self, Self::Ne)
    }
}

impl fmt::Display for ComparisonOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.symbol())
    }
}

/// Resolve the output dtype of `left op right`.
///
/// `Null` stands for an operand with no typed values (a missing literal or an
/// all-missing column). Integer storage cannot hold the NaN sentinel, so a
/// `Null` operand promotes Bool/Int64 to Float64.
pub fn arithmetic_result_dtype(
    left: DType,
    right: DType,
    op: ArithmeticOp,
) -> Result<DType, TypeError> {
    use ArithmeticOp::{Add, Div, FloorDiv, Mod, Mul, Pow, Sub};
    use DType::{Bool, Datetime64, Float64, Int64, Null, Object, Timedelta64, Utf8};

    let unsupported = || TypeError::UnsupportedOperand { op, left, right };

    let out = match (left, right) {
        (Object, _) | (_, Object) => Object,

        (Null, Null) => Float64,
        (Null, Bool | Int64 | Float64) | (Bool | Int64 | Float64, Null) => Float64,
        (Null, Utf8) | (Utf8, Null) => match op {
            Add => Utf8,
            _ => return Err(unsupported()),
        },
        (Null, Datetime64) | (Datetime64, Null) => match op {
            Add | Sub => Datetime64,
            _ => return Err(unsupported()),
        },
        (Null, Timedelta64) | (Timedelta64, Null) => match op {
            Add | Sub | Mul | Div | FloorDiv | Mod => Timedelta64,
            Pow => return Err(unsupported()),
        },

        (l, r) if l.is_numeric() && r.is_numeric() => match op {
            Div => Float64,
            _ if l == Float64 || r == Float64 => Float64,
            _ => Int64,
        },

        (Utf8, Utf8) => match op {
            Add => Utf8,
            _ => return Err(unsupported()),
        },

        (Datetime64, Timedelta64) => match op {
            Add | Sub => Datetime64,
            _ => return Err(unsupported()),
        },
        (Timedelta64, Datetime64) => match op {
            Add => Datetime64,
            _ => return Err(unsupported()),
        },
        (Datetime64, Datetime64) => match op {
            Sub => Timedelta64,
            _ => return Err(unsupported()),
        },

        (Timedelta64, Timedelta64) => match op {
            Add | Sub | Mod => Timedelta64,
            Div => Float64,
            FloorDiv => Int64,
            Mul | Pow => return Err(unsupported()),
        },
        (Timedelta64, Int64 | Float64) => match op {
            Mul | Div | FloorDiv => Timedelta64,
            _ => return Err(unsupported()),
        },
        (Int64 | Float64, Timedelta64) => match op {
            Mul => Timedelta64,
            _ => return Err(unsupported()),
        },

        _ => return Err(unsupported()),
    };

    Ok(out)
}

/// Every comparison yields booleans, whatever the operand dtypes.
#[must_use]
pub fn comparison_result_dtype(_left: DType, _right: DType, _op: ComparisonOp) -> DType {
    DType::Bool
}
