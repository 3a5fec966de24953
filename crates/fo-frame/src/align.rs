//! Operand alignment: turns a frame and any operand into per-column pairs of
//! equal-length columns over one shared row index.

use std::collections::{BTreeSet, HashMap};

use fo_columnar::{Column, fill_pair};
use fo_index::{AlignmentPlan, Index, align_outer, validate_alignment_plan};
use fo_runtime::{DecisionAction, EvidenceLedger, RuntimePolicy};
use fo_types::{DType, Scalar};
use tracing::debug;

use crate::{Axis, DataFrame, FrameError, Operand, Series};

/// Both operands laid out over the result's row and column labels.
#[derive(Debug, Clone)]
pub(crate) struct AlignedPairs {
    pub(crate) index: Index,
    pub(crate) labels: Vec<String>,
    pub(crate) pairs: Vec<(Column, Column)>,
}

impl AlignedPairs {
    /// One-sided missing substitution across every column pair.
    pub(crate) fn fill(self, fill: &Scalar) -> Result<Self, FrameError> {
        let fill = fill.clone().normalize_missing();
        let mut filled = 0_usize;
        let pairs = self
            .pairs
            .into_iter()
            .map(|(left, right)| {
                let (left, right, count) = fill_pair(&left, &right, &fill)?;
                filled += count;
                Ok((left, right))
            })
            .collect::<Result<Vec<_>, FrameError>>()?;
        debug!(filled, fill = ?fill, "substituted fill value");

        Ok(Self {
            index: self.index,
            labels: self.labels,
            pairs,
        })
    }

    pub(crate) fn into_frame(self, columns: Vec<Column>) -> Result<DataFrame, FrameError> {
        DataFrame::from_columns(self.index, self.labels.into_iter().zip(columns).collect())
    }
}

fn admit(
    rows: usize,
    policy: &RuntimePolicy,
    ledger: &mut EvidenceLedger,
) -> Result<(), FrameError> {
    if policy.decide_alignment_admission(rows, ledger) == DecisionAction::Reject {
        return Err(FrameError::CompatibilityRejected(format!(
            "runtime policy rejected alignment producing {rows} rows"
        )));
    }
    Ok(())
}

fn is_positional(positions: &[Option<usize>], len: usize) -> bool {
    positions.len() == len
        && positions
            .iter()
            .enumerate()
            .all(|(i, pos)| *pos == Some(i))
}

fn reindex(column: &Column, positions: &[Option<usize>]) -> Result<Column, FrameError> {
    if is_positional(positions, column.len()) {
        return Ok(column.clone());
    }
    Ok(column.reindex_by_positions(positions)?)
}

fn row_plan(
    left: &Index,
    right: &Index,
    policy: &RuntimePolicy,
    ledger: &mut EvidenceLedger,
) -> Result<AlignmentPlan, FrameError> {
    let plan = align_outer(left, right);
    validate_alignment_plan(&plan)?;
    admit(plan.union_index.len(), policy, ledger)?;
    Ok(plan)
}

/// Left labels in order, then labels only the right side has.
fn union_labels<'a>(
    left: impl IntoIterator<Item = &'a str>,
    right: impl IntoIterator<Item = &'a str>,
) -> Vec<String> {
    let mut seen = BTreeSet::new();
    left.into_iter()
        .chain(right)
        .filter(|label| seen.insert(*label))
        .map(str::to_owned)
        .collect()
}

fn align_frames(
    left: &DataFrame,
    right: &DataFrame,
    policy: &RuntimePolicy,
    ledger: &mut EvidenceLedger,
) -> Result<AlignedPairs, FrameError> {
    let plan = row_plan(left.index(), right.index(), policy, ledger)?;
    let rows = plan.union_index.len();
    let labels = union_labels(
        left.column_names().into_iter().map(String::as_str),
        right.column_names().into_iter().map(String::as_str),
    );
    debug!(
        rows,
        columns = labels.len(),
        identity = plan.is_identity(),
        "aligned frame operands"
    );

    let pairs = labels
        .iter()
        .map(|label| {
            let l = left
                .column(label)
                .map(|col| reindex(col, &plan.left_positions))
                .transpose()?;
            let r = right
                .column(label)
                .map(|col| reindex(col, &plan.right_positions))
                .transpose()?;
            match (l, r) {
                (Some(l), Some(r)) => Ok((l, r)),
                (Some(l), None) => {
                    let missing = Column::all_missing(l.dtype(), rows);
                    Ok((l, missing))
                }
                (None, Some(r)) => Ok((Column::all_missing(r.dtype(), rows), r)),
                (None, None) => Err(FrameError::CompatibilityRejected(format!(
                    "column '{label}' vanished during alignment"
                ))),
            }
        })
        .collect::<Result<Vec<_>, FrameError>>()?;

    Ok(AlignedPairs {
        index: plan.union_index,
        labels,
        pairs,
    })
}

fn frame_columns(frame: &DataFrame) -> (Vec<String>, Vec<Column>) {
    frame
        .iter_columns()
        .map(|(name, column)| (name.to_owned(), column.clone()))
        .unzip()
}

fn align_scalar(frame: &DataFrame, scalar: &Scalar) -> Result<AlignedPairs, FrameError> {
    let broadcast = Column::broadcast(scalar, frame.len())?;
    let (labels, columns) = frame_columns(frame);
    let pairs = columns
        .into_iter()
        .map(|column| (column, broadcast.clone()))
        .collect();

    Ok(AlignedPairs {
        index: frame.index().clone(),
        labels,
        pairs,
    })
}

fn align_sequence(
    frame: &DataFrame,
    values: &[Scalar],
    axis: Axis,
) -> Result<AlignedPairs, FrameError> {
    let rows = frame.len();
    let (labels, columns) = frame_columns(frame);

    let pairs = match axis {
        Axis::Columns => columns
            .into_iter()
            .zip(values)
            .map(|(column, value)| Ok((column, Column::broadcast(value, rows)?)))
            .collect::<Result<Vec<_>, FrameError>>()?,
        Axis::Rows => {
            let across = Column::from_values(values.to_vec())?;
            columns
                .into_iter()
                .map(|column| (column, across.clone()))
                .collect()
        }
    };

    Ok(AlignedPairs {
        index: frame.index().clone(),
        labels,
        pairs,
    })
}

fn align_series_to_columns(frame: &DataFrame, series: &Series) -> Result<AlignedPairs, FrameError> {
    let rows = frame.len();
    let series_labels: Vec<String> = series
        .index()
        .labels()
        .iter()
        .map(ToString::to_string)
        .collect();

    let mut first_position = HashMap::with_capacity(series_labels.len());
    for (pos, label) in series_labels.iter().enumerate() {
        first_position.entry(label.as_str()).or_insert(pos);
    }

    let labels = union_labels(
        frame.column_names().into_iter().map(String::as_str),
        series_labels.iter().map(String::as_str),
    );
    debug!(
        columns = labels.len(),
        series_len = series.len(),
        "aligned series to frame columns"
    );

    let pairs = labels
        .iter()
        .map(|label| {
            let right = match first_position.get(label.as_str()) {
                Some(&pos) => match series.values().get(pos) {
                    Some(value) => Column::broadcast(value, rows)?,
                    None => Column::all_missing(DType::Null, rows),
                },
                None => Column::all_missing(DType::Null, rows),
            };
            let left = frame
                .column(label)
                .cloned()
                .unwrap_or_else(|| Column::all_missing(DType::Null, rows));
            Ok((left, right))
        })
        .collect::<Result<Vec<_>, FrameError>>()?;

    Ok(AlignedPairs {
        index: frame.index().clone(),
        labels,
        pairs,
    })
}

fn align_series_to_rows(
    frame: &DataFrame,
    series: &Series,
    policy: &RuntimePolicy,
    ledger: &mut EvidenceLedger,
) -> Result<AlignedPairs, FrameError> {
    let plan = row_plan(frame.index(), series.index(), policy, ledger)?;
    debug!(
        rows = plan.union_index.len(),
        identity = plan.is_identity(),
        "aligned series to frame rows"
    );

    let across = reindex(series.column(), &plan.right_positions)?;
    let (labels, pairs) = frame
        .iter_columns()
        .map(|(name, column)| {
            let left = reindex(column, &plan.left_positions)?;
            Ok((name.to_owned(), (left, across.clone())))
        })
        .collect::<Result<Vec<_>, FrameError>>()?
        .into_iter()
        .unzip();

    Ok(AlignedPairs {
        index: plan.union_index,
        labels,
        pairs,
    })
}

/// Lay `operand` against `frame`. Operands are expected to have passed
/// `validate_operand` first.
pub(crate) fn align_operand(
    frame: &DataFrame,
    operand: &Operand<'_>,
    axis: Axis,
    policy: &RuntimePolicy,
    ledger: &mut EvidenceLedger,
) -> Result<AlignedPairs, FrameError> {
    match operand {
        Operand::Frame(other) => align_frames(frame, other, policy, ledger),
        Operand::Series(series) => match axis {
            Axis::Columns => align_series_to_columns(frame, series),
            Axis::Rows => align_series_to_rows(frame, series, policy, ledger),
        },
        Operand::Scalar(scalar) => align_scalar(frame, scalar),
        Operand::Sequence(values) => align_sequence(frame, values, axis),
        Operand::Absent => Err(FrameError::TypeMismatch(
            "an absent operand cannot be aligned".to_owned(),
        )),
    }
}
