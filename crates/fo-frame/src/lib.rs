#![forbid(unsafe_code)]

mod align;
mod operand;
mod ops;

use std::collections::{BTreeMap, BTreeSet};

use fo_columnar::{Column, ColumnError};
use fo_index::{Index, IndexError, IndexLabel};
use fo_types::{DType, Scalar};
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use fo_columnar::{ArithmeticOp, ComparisonOp};
pub use operand::{OperationKind, Operand, validate_operand};

#[derive(Debug, Error, Clone, PartialEq)]
pub enum FrameError {
    #[error("index length ({index_len}) does not match column length ({column_len})")]
    LengthMismatch { index_len: usize, column_len: usize },
    #[error("shape mismatch: {0}")]
    ShapeMismatch(String),
    #[error("incomparable operand: {0}")]
    IncomparableType(String),
    #[error("type mismatch: {0}")]
    TypeMismatch(String),
    #[error("duplicate column label '{0}'")]
    DuplicateColumn(String),
    #[error("compatibility gate rejected operation: {0}")]
    CompatibilityRejected(String),
    #[error(transparent)]
    Column(ColumnError),
    #[error(transparent)]
    Index(#[from] IndexError),
}

impl From<ColumnError> for FrameError {
    fn from(err: ColumnError) -> Self {
        match err {
            ColumnError::Type(type_err) if type_err.is_type_mismatch() => {
                Self::TypeMismatch(type_err.to_string())
            }
            other => Self::Column(other),
        }
    }
}

/// Which way a 1-D operand (series or bare sequence) is laid against a frame.
///
/// `Columns` matches the operand's labels/positions to the frame's columns and
/// broadcasts each element down its column. `Rows` matches against the row
/// index and broadcasts across every column.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Axis {
    Rows,
    #[default]
    Columns,
}

/// Options accepted by the flexible arithmetic methods.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FlexOptions {
    pub fill_value: Option<Scalar>,
    pub axis: Axis,
}

impl FlexOptions {
    #[must_use]
    pub fn with_fill_value(mut self, fill_value: impl Into<Scalar>) -> Self {
        self.fill_value = Some(fill_value.into());
        self
    }

    #[must_use]
    pub fn with_axis(mut self, axis: Axis) -> Self {
        self.axis = axis;
        self
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Series {
    name: String,
    index: Index,
    column: Column,
}

impl Series {
    pub fn new(name: impl Into<String>, index: Index, column: Column) -> Result<Self, FrameError> {
        if index.len() != column.len() {
            return Err(FrameError::LengthMismatch {
                index_len: index.len(),
                column_len: column.len(),
            });
        }

        Ok(Self {
            name: name.into(),
            index,
            column,
        })
    }

    pub fn from_values(
        name: impl Into<String>,
        index_labels: Vec<IndexLabel>,
        values: Vec<Scalar>,
    ) -> Result<Self, FrameError> {
        let index = Index::new(index_labels);
        let column = Column::from_values(values)?;
        Self::new(name, index, column)
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn index(&self) -> &Index {
        &self.index
    }

    #[must_use]
    pub fn column(&self) -> &Column {
        &self.column
    }

    #[must_use]
    pub fn values(&self) -> &[Scalar] {
        self.column.values()
    }

    #[must_use]
    pub fn dtype(&self) -> DType {
        self.column.dtype()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.index.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    /// Matches `series > 5` (broadcast scalar comparison).
    pub fn compare_scalar(&self, scalar: &Scalar, op: ComparisonOp) -> Result<Self, FrameError> {
        let column = self.column.compare_scalar(scalar, op)?;
        Self::new(self.name.clone(), self.index.clone(), column)
    }

    fn ensure_boolean(&self, op_name: &str) -> Result<(), FrameError> {
        if !matches!(self.dtype(), DType::Bool | DType::Null) {
            return Err(FrameError::CompatibilityRejected(format!(
                "boolean series required for {op_name}; found dtype {:?}",
                self.dtype()
            )));
        }
        Ok(())
    }

    /// Element-wise boolean NOT. Missing values remain missing.
    pub fn not(&self) -> Result<Self, FrameError> {
        self.ensure_boolean("not")?;

        let values = self
            .values()
            .iter()
            .map(|value| match value {
                Scalar::Bool(v) => Scalar::Bool(!v),
                other => other.clone(),
            })
            .collect();

        Self::new(
            format!("~{}", self.name),
            self.index.clone(),
            Column::new(DType::Bool, values)?,
        )
    }
}

/// Two-dimensional labeled table: an ordered set of uniquely labeled columns
/// sharing one row index.
#[derive(Debug, Clone, PartialEq)]
pub struct DataFrame {
    index: Index,
    columns: BTreeMap<String, Column>,
    column_order: Vec<String>,
}

impl DataFrame {
    fn validate_column_lengths(
        index: &Index,
        columns: &BTreeMap<String, Column>,
    ) -> Result<(), FrameError> {
        for column in columns.values() {
            if column.len() != index.len() {
                return Err(FrameError::LengthMismatch {
                    index_len: index.len(),
                    column_len: column.len(),
                });
            }
        }
        Ok(())
    }

    /// `column_order` must name every column exactly once.
    pub fn new_with_column_order(
        index: Index,
        columns: BTreeMap<String, Column>,
        column_order: Vec<String>,
    ) -> Result<Self, FrameError> {
        Self::validate_column_lengths(&index, &columns)?;

        let mut seen = BTreeSet::new();
        for name in &column_order {
            if !seen.insert(name.as_str()) {
                return Err(FrameError::DuplicateColumn(name.clone()));
            }
            if !columns.contains_key(name) {
                return Err(FrameError::CompatibilityRejected(format!(
                    "column '{name}' not found in data"
                )));
            }
        }
        if seen.len() != columns.len() {
            return Err(FrameError::CompatibilityRejected(
                "column order does not cover every column".to_owned(),
            ));
        }

        Ok(Self {
            index,
            columns,
            column_order,
        })
    }

    /// Build a frame from already-typed columns, keeping their order.
    pub fn from_columns(index: Index, columns: Vec<(String, Column)>) -> Result<Self, FrameError> {
        let mut map = BTreeMap::new();
        let mut order = Vec::with_capacity(columns.len());
        for (name, column) in columns {
            if map.contains_key(&name) {
                return Err(FrameError::DuplicateColumn(name));
            }
            order.push(name.clone());
            map.insert(name, column);
        }
        Self::new_with_column_order(index, map, order)
    }

    /// Construct a DataFrame from named column vectors with a `0..n` index.
    ///
    /// Matches `pd.DataFrame({"a": [1, 2], "b": [3, 4]})`; column dtypes are
    /// inferred.
    pub fn from_dict(data: Vec<(&str, Vec<Scalar>)>) -> Result<Self, FrameError> {
        let n = data.first().map_or(0, |(_, values)| values.len());
        let labels = Index::range(n)?.labels().to_vec();
        Self::from_dict_with_index(data, labels)
    }

    /// Matches `pd.DataFrame({"a": [1, 2]}, index=["x", "y"])`.
    pub fn from_dict_with_index(
        data: Vec<(&str, Vec<Scalar>)>,
        index_labels: Vec<IndexLabel>,
    ) -> Result<Self, FrameError> {
        let n = index_labels.len();
        let columns = data
            .into_iter()
            .map(|(name, values)| {
                if values.len() != n {
                    return Err(FrameError::LengthMismatch {
                        index_len: n,
                        column_len: values.len(),
                    });
                }
                Ok((name.to_owned(), Column::from_values(values)?))
            })
            .collect::<Result<Vec<_>, FrameError>>()?;

        Self::from_columns(Index::new(index_labels), columns)
    }

    /// Single-column frame from a bare list, labelled `"0"`.
    ///
    /// Matches `pd.DataFrame([1, 2, 3], dtype=...)`; `None` infers the dtype.
    pub fn from_values(values: Vec<Scalar>, dtype: Option<DType>) -> Result<Self, FrameError> {
        let index = Index::range(values.len())?;
        let column = match dtype {
            Some(dtype) => Column::new(dtype, values)?,
            None => Column::from_values(values)?,
        };
        Self::from_columns(index, vec![("0".to_owned(), column)])
    }

    /// Return the number of rows.
    #[must_use]
    pub fn len(&self) -> usize {
        self.index.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    #[must_use]
    pub fn num_columns(&self) -> usize {
        self.column_order.len()
    }

    /// `(rows, columns)`.
    #[must_use]
    pub fn shape(&self) -> (usize, usize) {
        (self.len(), self.num_columns())
    }

    #[must_use]
    pub fn index(&self) -> &Index {
        &self.index
    }

    /// Column labels in frame order.
    #[must_use]
    pub fn column_names(&self) -> Vec<&String> {
        self.column_order.iter().collect()
    }

    #[must_use]
    pub fn column(&self, name: &str) -> Option<&Column> {
        self.columns.get(name)
    }

    /// Columns paired with their labels, in frame order.
    pub fn iter_columns(&self) -> impl Iterator<Item = (&str, &Column)> + '_ {
        self.column_order
            .iter()
            .filter_map(|name| self.columns.get(name).map(|col| (name.as_str(), col)))
    }

    /// `(label, dtype)` per column in frame order.
    #[must_use]
    pub fn dtypes(&self) -> Vec<(&str, DType)> {
        self.iter_columns()
            .map(|(name, column)| (name, column.dtype()))
            .collect()
    }

    /// A single column as a `Series` sharing the frame's row index.
    pub fn get_series(&self, name: &str) -> Result<Series, FrameError> {
        let column = self.column(name).ok_or_else(|| {
            FrameError::CompatibilityRejected(format!("column '{name}' not found"))
        })?;
        Series::new(name, self.index.clone(), column.clone())
    }

    /// Filter rows where `mask` is `true`.
    ///
    /// Matches `df[bool_series]`. The mask is reindexed onto the frame index,
    /// so mask labels the frame lacks are ignored; frame rows the mask lacks,
    /// and missing mask entries, are treated as `false`.
    pub fn filter_rows(&self, mask: &Series) -> Result<Self, FrameError> {
        if !matches!(mask.dtype(), DType::Bool | DType::Null) {
            return Err(FrameError::CompatibilityRejected(format!(
                "boolean mask required for filter_rows; found dtype {:?}",
                mask.dtype()
            )));
        }

        let positions = mask.index().get_indexer(&self.index);
        let aligned_mask = mask.column().reindex_by_positions(&positions)?;
        let labels = self
            .index
            .labels()
            .iter()
            .zip(aligned_mask.values())
            .filter_map(|(label, keep)| matches!(keep, Scalar::Bool(true)).then(|| label.clone()))
            .collect();

        let columns = self
            .iter_columns()
            .map(|(name, column)| Ok((name.to_owned(), column.filter_by_mask(&aligned_mask)?)))
            .collect::<Result<Vec<_>, FrameError>>()?;

        Self::from_columns(Index::new(labels), columns)
    }

    /// Value equality that treats NaN cells as equal.
    #[must_use]
    pub fn semantic_eq(&self, other: &Self) -> bool {
        self.index == other.index
            && self.column_order == other.column_order
            && self.iter_columns().zip(other.iter_columns()).all(
                |((left_name, left), (right_name, right))| {
                    left_name == right_name && left.semantic_eq(right)
                },
            )
    }
}
