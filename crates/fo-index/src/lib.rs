#![forbid(unsafe_code)]

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fmt;
use std::sync::OnceLock;

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum IndexLabel {
    Int64(i64),
    Utf8(String),
}

impl From<i64> for IndexLabel {
    fn from(value: i64) -> Self {
        Self::Int64(value)
    }
}

impl From<&str> for IndexLabel {
    fn from(value: &str) -> Self {
        Self::Utf8(value.to_owned())
    }
}

impl From<String> for IndexLabel {
    fn from(value: String) -> Self {
        Self::Utf8(value)
    }
}

impl fmt::Display for IndexLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Int64(v) => write!(f, "{v}"),
            Self::Utf8(v) => write!(f, "{v}"),
        }
    }
}

/// Ordered label sequence. Row indexes may repeat labels; callers that need
/// uniqueness (column labels) enforce it themselves.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Index {
    labels: Vec<IndexLabel>,
    #[serde(skip)]
    duplicate_cache: OnceLock<bool>,
}

impl PartialEq for Index {
    fn eq(&self, other: &Self) -> bool {
        self.labels == other.labels
    }
}

impl Eq for Index {}

fn detect_duplicates(labels: &[IndexLabel]) -> bool {
    let mut seen = BTreeSet::new();
    labels.iter().any(|label| !seen.insert(label))
}

impl Index {
    #[must_use]
    pub fn new(labels: Vec<IndexLabel>) -> Self {
        Self {
            labels,
            duplicate_cache: OnceLock::new(),
        }
    }

    #[must_use]
    pub fn from_i64(values: Vec<i64>) -> Self {
        Self::new(values.into_iter().map(IndexLabel::from).collect())
    }

    /// `0..len`, the default row index.
    pub fn range(len: usize) -> Result<Self, IndexError> {
        let len_i64 = i64::try_from(len).map_err(|_| IndexError::RangeTooLong { len })?;
        Ok(Self::new((0..len_i64).map(IndexLabel::from).collect()))
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.labels.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    #[must_use]
    pub fn labels(&self) -> &[IndexLabel] {
        &self.labels
    }

    #[must_use]
    pub fn has_duplicates(&self) -> bool {
        *self
            .duplicate_cache
            .get_or_init(|| detect_duplicates(&self.labels))
    }

    #[must_use]
    pub fn contains(&self, label: &IndexLabel) -> bool {
        self.labels.contains(label)
    }

    /// First position of every label.
    #[must_use]
    pub fn position_map_first(&self) -> HashMap<&IndexLabel, usize> {
        let mut positions = HashMap::with_capacity(self.labels.len());
        for (idx, label) in self.labels.iter().enumerate() {
            positions.entry(label).or_insert(idx);
        }
        positions
    }

    /// Positions in `self` for each label of `target` (first match).
    #[must_use]
    pub fn get_indexer(&self, target: &Index) -> Vec<Option<usize>> {
        let map = self.position_map_first();
        target
            .labels
            .iter()
            .map(|label| map.get(label).copied())
            .collect()
    }
}

/// Output labels plus, per output slot, the source position in each operand
/// (`None` where the operand lacks the label).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AlignmentPlan {
    pub union_index: Index,
    pub left_positions: Vec<Option<usize>>,
    pub right_positions: Vec<Option<usize>>,
}

impl AlignmentPlan {
    /// Positional plan for two operands that already share `index`.
    #[must_use]
    pub fn identity(index: &Index) -> Self {
        let positions: Vec<Option<usize>> = (0..index.len()).map(Some).collect();
        Self {
            union_index: index.clone(),
            left_positions: positions.clone(),
            right_positions: positions,
        }
    }

    /// True when every output slot is backed by both operands in order, so
    /// reindexing can be skipped.
    #[must_use]
    pub fn is_identity(&self) -> bool {
        self.left_positions
            .iter()
            .zip(&self.right_positions)
            .enumerate()
            .all(|(i, (l, r))| *l == Some(i) && *r == Some(i))
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum IndexError {
    #[error("alignment vectors must have equal lengths")]
    InvalidAlignmentVectors,
    #[error("cannot materialize a range index of length {len} on this platform")]
    RangeTooLong { len: usize },
}

/// Union alignment for unique labels: left order, then right-only labels.
pub fn align_union(left: &Index, right: &Index) -> AlignmentPlan {
    let left_positions_map = left.position_map_first();
    let right_positions_map = right.position_map_first();

    let mut union_labels = Vec::with_capacity(left.labels.len() + right.labels.len());
    union_labels.extend(left.labels.iter().cloned());
    for label in &right.labels {
        if !left_positions_map.contains_key(label) {
            union_labels.push(label.clone());
        }
    }

    let left_positions = union_labels
        .iter()
        .map(|label| left_positions_map.get(label).copied())
        .collect();

    let right_positions = union_labels
        .iter()
        .map(|label| right_positions_map.get(label).copied())
        .collect();

    AlignmentPlan {
        union_index: Index::new(union_labels),
        left_positions,
        right_positions,
    }
}

fn index_position_groups(index: &Index) -> BTreeMap<&IndexLabel, Vec<usize>> {
    let mut groups: BTreeMap<&IndexLabel, Vec<usize>> = BTreeMap::new();
    for (pos, label) in index.labels().iter().enumerate() {
        groups.entry(label).or_default().push(pos);
    }
    groups
}

/// Duplicate-aware union alignment.
///
/// - preserves left-then-unseen label order
/// - a label present on both sides materializes the cartesian matches
///   (`lc * rc` rows)
/// - one-sided labels keep their original multiplicity
pub fn align_union_with_duplicates(left: &Index, right: &Index) -> AlignmentPlan {
    let left_groups = index_position_groups(left);
    let right_groups = index_position_groups(right);

    let mut seen = BTreeSet::new();
    let mut ordered = Vec::new();
    for label in left.labels().iter().chain(right.labels()) {
        if seen.insert(label) {
            ordered.push(label);
        }
    }

    let mut out_labels = Vec::new();
    let mut left_positions = Vec::new();
    let mut right_positions = Vec::new();

    for label in ordered {
        let left_hits = left_groups.get(label).map_or(&[][..], Vec::as_slice);
        let right_hits = right_groups.get(label).map_or(&[][..], Vec::as_slice);

        if left_hits.is_empty() {
            for &rp in right_hits {
                out_labels.push(label.clone());
                left_positions.push(None);
                right_positions.push(Some(rp));
            }
            continue;
        }

        if right_hits.is_empty() {
            for &lp in left_hits {
                out_labels.push(label.clone());
                left_positions.push(Some(lp));
                right_positions.push(None);
            }
            continue;
        }

        for &lp in left_hits {
            for &rp in right_hits {
                out_labels.push(label.clone());
                left_positions.push(Some(lp));
                right_positions.push(Some(rp));
            }
        }
    }

    AlignmentPlan {
        union_index: Index::new(out_labels),
        left_positions,
        right_positions,
    }
}

/// Outer alignment used by binary operations.
///
/// Identical indexes (duplicates included) align positionally; otherwise
/// duplicates route through the cartesian-aware path.
pub fn align_outer(left: &Index, right: &Index) -> AlignmentPlan {
    if left == right {
        return AlignmentPlan::identity(left);
    }
    if left.has_duplicates() || right.has_duplicates() {
        return align_union_with_duplicates(left, right);
    }
    align_union(left, right)
}

pub fn validate_alignment_plan(plan: &AlignmentPlan) -> Result<(), IndexError> {
    if plan.left_positions.len() != plan.right_positions.len()
        || plan.left_positions.len() != plan.union_index.len()
    {
        return Err(IndexError::InvalidAlignmentVectors);
    }

    Ok(())
}
