//! Source-to-target matching algorithms.
//!
//! Two algorithms share one entry point, [`solve_assignment`]:
//!
//! - **Hungarian**: globally minimal total cost. May produce crossing paths.
//! - **Greedy**: repeatedly takes the cheapest remaining pair. Locally short,
//!   rarely crossing, easier for an operator to reason about.

use std::fmt;
use std::str::FromStr;

use nalgebra::DMatrix;
use serde::{Deserialize, Serialize};
use tracing::trace;

use crate::cancel::CancelToken;
use crate::internal::scipy::linear_sum_assignment;
use crate::{Error, Result};

// =============================================================================
// CostMatrix
// =============================================================================

/// Rectangular table of pairwise costs, rows are sources and columns targets.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(from = "Vec<Vec<f64>>", into = "Vec<Vec<f64>>")]
pub struct CostMatrix(DMatrix<f64>);

impl CostMatrix {
    /// Build from possibly jagged rows.
    ///
    /// The column count is the length of the shortest row; trailing entries of
    /// longer rows are ignored.
    pub fn from_rows<R: AsRef<[f64]>>(rows: &[R]) -> Self {
        let n_rows = rows.len();
        let n_cols = rows.iter().map(|r| r.as_ref().len()).min().unwrap_or(0);
        Self(DMatrix::from_fn(n_rows, n_cols, |i, j| rows[i].as_ref()[j]))
    }

    /// Empty 0x0 matrix.
    pub fn empty() -> Self {
        Self(DMatrix::zeros(0, 0))
    }

    pub fn nrows(&self) -> usize {
        self.0.nrows()
    }

    pub fn ncols(&self) -> usize {
        self.0.ncols()
    }

    /// Cost of pairing `row` with `col`.
    pub fn get(&self, row: usize, col: usize) -> Option<f64> {
        self.0.get((row, col)).copied()
    }

    /// Borrow the underlying matrix.
    pub fn as_matrix(&self) -> &DMatrix<f64> {
        &self.0
    }

    /// Rows as nested vectors.
    pub fn to_rows(&self) -> Vec<Vec<f64>> {
        (0..self.0.nrows())
            .map(|i| self.0.row(i).iter().copied().collect())
            .collect()
    }

    /// Check if the matrix contains NaN values.
    pub fn has_nan(&self) -> bool {
        self.0.iter().any(|x| x.is_nan())
    }

    /// Validate the matrix (no NaN values allowed).
    pub fn validate(&self) -> Result<()> {
        if let Some(pos) = self.0.iter().position(|x| x.is_nan()) {
            // nalgebra storage is column-major
            let (row, col) = (pos % self.0.nrows(), pos / self.0.nrows());
            return Err(Error::InvalidMatrix(format!(
                "cost matrix contains NaN at ({}, {})",
                row, col
            )));
        }
        Ok(())
    }
}

impl From<DMatrix<f64>> for CostMatrix {
    fn from(matrix: DMatrix<f64>) -> Self {
        Self(matrix)
    }
}

impl From<Vec<Vec<f64>>> for CostMatrix {
    fn from(rows: Vec<Vec<f64>>) -> Self {
        Self::from_rows(&rows)
    }
}

impl From<CostMatrix> for Vec<Vec<f64>> {
    fn from(matrix: CostMatrix) -> Self {
        matrix.to_rows()
    }
}

// =============================================================================
// Options
// =============================================================================

/// Matching algorithm selector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum MatchingAlgorithm {
    /// Lowest-cost-first pair selection.
    #[default]
    Greedy,
    /// Globally optimal minimum-cost matching.
    Hungarian,
}

impl MatchingAlgorithm {
    pub fn name(&self) -> &'static str {
        match self {
            MatchingAlgorithm::Greedy => "greedy",
            MatchingAlgorithm::Hungarian => "hungarian",
        }
    }
}

impl fmt::Display for MatchingAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for MatchingAlgorithm {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "greedy" => Ok(MatchingAlgorithm::Greedy),
            "hungarian" => Ok(MatchingAlgorithm::Hungarian),
            other => Err(Error::UnknownAlgorithm(other.to_string())),
        }
    }
}

impl TryFrom<String> for MatchingAlgorithm {
    type Error = Error;

    fn try_from(value: String) -> Result<Self> {
        value.parse()
    }
}

impl From<MatchingAlgorithm> for String {
    fn from(algorithm: MatchingAlgorithm) -> Self {
        algorithm.name().to_string()
    }
}

/// Options for [`solve_assignment`].
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct MatchingOptions {
    /// Which algorithm to run.
    #[serde(default)]
    pub algorithm: MatchingAlgorithm,
    /// Pairs costing more than this are never returned.
    #[serde(
        default,
        deserialize_with = "deserialize_threshold",
        skip_serializing_if = "Option::is_none"
    )]
    pub threshold: Option<f64>,
}

/// Any JSON value is accepted; only numbers count as a threshold.
fn deserialize_threshold<'de, D>(deserializer: D) -> std::result::Result<Option<f64>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let value = Option::<serde_json::Value>::deserialize(deserializer)?;
    Ok(value.as_ref().and_then(serde_json::Value::as_f64))
}

impl MatchingOptions {
    pub fn new(algorithm: MatchingAlgorithm) -> Self {
        Self {
            algorithm,
            threshold: None,
        }
    }

    pub fn greedy() -> Self {
        Self::new(MatchingAlgorithm::Greedy)
    }

    pub fn hungarian() -> Self {
        Self::new(MatchingAlgorithm::Hungarian)
    }

    pub fn with_threshold(mut self, threshold: f64) -> Self {
        self.threshold = Some(threshold);
        self
    }

    /// Parse options from loosely typed JSON, e.g. `{"algorithm": "greedy", "threshold": 3}`.
    ///
    /// An unknown algorithm yields [`Error::UnknownAlgorithm`]. A threshold that is
    /// not a number is treated as absent.
    pub fn from_json(value: &serde_json::Value) -> Result<Self> {
        let object = value.as_object().ok_or_else(|| {
            Error::InvalidArguments(format!("matching options must be an object, got {}", value))
        })?;

        let algorithm = match object.get("algorithm") {
            None | Some(serde_json::Value::Null) => MatchingAlgorithm::default(),
            Some(serde_json::Value::String(name)) => name.parse()?,
            Some(other) => return Err(Error::UnknownAlgorithm(other.to_string())),
        };
        let threshold = object.get("threshold").and_then(serde_json::Value::as_f64);

        Ok(Self {
            algorithm,
            threshold,
        })
    }

    /// Effective threshold: non-finite or non-positive values mean "no threshold".
    pub fn effective_threshold(&self) -> f64 {
        normalize_threshold(self.threshold)
    }
}

/// Map an optional threshold to a finite positive bound or `+inf`.
pub fn normalize_threshold(threshold: Option<f64>) -> f64 {
    match threshold {
        Some(t) if t.is_finite() && t > 0.0 => t,
        _ => f64::INFINITY,
    }
}

// =============================================================================
// Assignment
// =============================================================================

/// Ordered one-to-one pairs of `(source, target)` indices.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Assignment(Vec<(usize, usize)>);

impl Assignment {
    pub fn new(pairs: Vec<(usize, usize)>) -> Self {
        Self(pairs)
    }

    pub fn pairs(&self) -> &[(usize, usize)] {
        &self.0
    }

    pub fn into_pairs(self) -> Vec<(usize, usize)> {
        self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &(usize, usize)> {
        self.0.iter()
    }

    /// Target matched to `source`, if any.
    pub fn target_of(&self, source: usize) -> Option<usize> {
        self.0.iter().find(|(s, _)| *s == source).map(|(_, t)| *t)
    }

    /// Sum of the matrix entries of every pair.
    pub fn total_cost(&self, matrix: &CostMatrix) -> f64 {
        self.0
            .iter()
            .map(|&(r, c)| matrix.get(r, c).unwrap_or(f64::INFINITY))
            .sum()
    }

    /// Source indices in `0..n_sources` that were not matched.
    pub fn unmatched_sources(&self, n_sources: usize) -> Vec<usize> {
        let matched: Vec<usize> = self.0.iter().map(|(s, _)| *s).collect();
        get_unmatched(n_sources, &matched)
    }

    /// Target indices in `0..n_targets` that were not matched.
    pub fn unmatched_targets(&self, n_targets: usize) -> Vec<usize> {
        let matched: Vec<usize> = self.0.iter().map(|(_, t)| *t).collect();
        get_unmatched(n_targets, &matched)
    }
}

impl From<Vec<(usize, usize)>> for Assignment {
    fn from(pairs: Vec<(usize, usize)>) -> Self {
        Self(pairs)
    }
}

impl IntoIterator for Assignment {
    type Item = (usize, usize);
    type IntoIter = std::vec::IntoIter<(usize, usize)>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}

/// Get unmatched indices from a match result.
pub fn get_unmatched(total: usize, matched: &[usize]) -> Vec<usize> {
    let mut is_matched = vec![false; total];
    for &idx in matched {
        if idx < total {
            is_matched[idx] = true;
        }
    }
    (0..total).filter(|&i| !is_matched[i]).collect()
}

// =============================================================================
// Algorithms
// =============================================================================

/// Compute a one-to-one assignment between the rows and columns of `matrix`.
///
/// # Errors
/// - [`Error::InvalidMatrix`] if the matrix contains NaN.
/// - [`Error::Cancelled`] if the token passed to [`solve_assignment_with_cancel`]
///   is raised before the solver finishes.
/// - [`Error::SolverFailure`] if the Hungarian solver finds no augmenting path.
///   Infinite costs are penalized beforehand, so this indicates a solver bug.
pub fn solve_assignment(matrix: &CostMatrix, options: &MatchingOptions) -> Result<Assignment> {
    solve_assignment_with_cancel(matrix, options, &CancelToken::new())
}

/// [`solve_assignment`] that polls `cancel` between steps.
///
/// # Errors
/// Same as [`solve_assignment`]; [`Error::Cancelled`] once `cancel` is raised.
pub fn solve_assignment_with_cancel(
    matrix: &CostMatrix,
    options: &MatchingOptions,
    cancel: &CancelToken,
) -> Result<Assignment> {
    matrix.validate()?;
    let threshold = options.effective_threshold();

    trace!(
        rows = matrix.nrows(),
        cols = matrix.ncols(),
        algorithm = %options.algorithm,
        threshold,
        "solving assignment"
    );

    match options.algorithm {
        MatchingAlgorithm::Greedy => greedy_matching(matrix.as_matrix(), threshold, cancel),
        MatchingAlgorithm::Hungarian => {
            let result = linear_sum_assignment(matrix.as_matrix(), threshold, cancel)?;
            Ok(result
                .assignments
                .into_iter()
                .map(|p| (p.row_idx, p.col_idx))
                .collect::<Vec<_>>()
                .into())
        }
    }
}

/// Greedy minimum-cost matching.
///
/// Candidate pairs with `cost <= threshold` are visited in ascending cost
/// order (ties in row-major order); a pair is accepted when neither its row
/// nor its column is taken. Pairs are returned in acceptance order.
pub fn greedy_matching(
    matrix: &DMatrix<f64>,
    threshold: f64,
    cancel: &CancelToken,
) -> Result<Assignment> {
    let n_rows = matrix.nrows();
    let n_cols = matrix.ncols();

    if n_rows == 0 || n_cols == 0 {
        return Ok(Assignment::default());
    }

    // Collect all valid (cost, row, col) triples in row-major order
    let mut pairs: Vec<(f64, usize, usize)> = Vec::new();
    for i in 0..n_rows {
        for j in 0..n_cols {
            let cost = matrix[(i, j)];
            if cost <= threshold {
                pairs.push((cost, i, j));
            }
        }
    }
    cancel.check()?;

    // Stable sort keeps row-major order among equal costs
    pairs.sort_by(|a, b| a.0.total_cmp(&b.0));

    let mut used_rows = vec![false; n_rows];
    let mut used_cols = vec![false; n_cols];
    let limit = n_rows.min(n_cols);
    let mut matched = Vec::with_capacity(limit);

    for (step, (_cost, row, col)) in pairs.into_iter().enumerate() {
        if step % 4096 == 0 {
            cancel.check()?;
        }
        if used_rows[row] || used_cols[col] {
            continue;
        }

        matched.push((row, col));
        used_rows[row] = true;
        used_cols[col] = true;

        if matched.len() == limit {
            break;
        }
    }

    Ok(Assignment(matched))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    fn greedy(rows: &[Vec<f64>], threshold: Option<f64>) -> Vec<(usize, usize)> {
        let options = MatchingOptions {
            algorithm: MatchingAlgorithm::Greedy,
            threshold,
        };
        solve_assignment(&CostMatrix::from_rows(rows), &options)
            .unwrap()
            .into_pairs()
    }

    // ===== Concrete scenarios =====

    #[test]
    fn test_greedy_two_by_two() {
        let result = greedy(&[vec![5.0, 1.0], vec![2.0, 8.0]], None);
        assert_eq!(result, vec![(0, 1), (1, 0)]);
    }

    #[test]
    fn test_greedy_threshold_keeps_single_pair() {
        let result = greedy(&[vec![3.0, 4.0], vec![5.0, 6.0]], Some(3.0));
        assert_eq!(result, vec![(0, 0)]);
    }

    // ===== Threshold normalization =====

    #[test]
    fn test_threshold_filtering() {
        let rows = vec![
            vec![0.5, 2.0, 3.0],
            vec![2.5, 0.8, 2.0],
            vec![3.0, 3.0, 0.3],
        ];
        // Greedy order: [2,2]=0.3, [0,0]=0.5, [1,1]=0.8
        assert_eq!(greedy(&rows, Some(1.5)), vec![(2, 2), (0, 0), (1, 1)]);
    }

    #[test]
    fn test_invalid_thresholds_mean_unbounded() {
        let rows = vec![vec![10.0, 20.0], vec![30.0, 40.0]];
        for t in [0.0, -1.0, f64::NAN, f64::INFINITY, f64::NEG_INFINITY] {
            assert_eq!(greedy(&rows, Some(t)).len(), 2, "threshold {}", t);
        }
        assert_eq!(normalize_threshold(None), f64::INFINITY);
        assert_eq!(normalize_threshold(Some(2.5)), 2.5);
    }

    #[test]
    fn test_all_above_threshold() {
        assert!(greedy(&[vec![5.0, 6.0], vec![7.0, 8.0]], Some(3.0)).is_empty());
    }

    // ===== Empty/Minimal Inputs =====

    #[test]
    fn test_match_empty() {
        let empty: Vec<Vec<f64>> = Vec::new();
        assert!(greedy(&empty, None).is_empty());
    }

    #[test]
    fn test_zero_columns() {
        assert!(greedy(&[Vec::new(), Vec::new()], None).is_empty());
    }

    #[test]
    fn test_jagged_rows_use_shortest() {
        let matrix = CostMatrix::from_rows(&[vec![1.0, 2.0, 0.1], vec![3.0, 4.0]]);
        assert_eq!(matrix.ncols(), 2);

        let result = greedy(&[vec![1.0, 2.0, 0.1], vec![3.0, 4.0]], None);
        // Column 2 is ignored despite its low cost
        assert_eq!(result, vec![(0, 0), (1, 1)]);
    }

    // ===== Greedy behavior =====

    #[test]
    fn test_ties_keep_row_major_order() {
        let result = greedy(&[vec![1.0, 1.0], vec![1.0, 1.0]], None);
        assert_eq!(result, vec![(0, 0), (1, 1)]);
    }

    #[test]
    fn test_one_to_one_constraint() {
        let rows = vec![vec![0.5, 3.0], vec![0.6, 3.5], vec![0.7, 2.0]];
        // Greedy picks: [0,0]=0.5 first, then [2,1]=2.0
        assert_eq!(greedy(&rows, Some(4.0)), vec![(0, 0), (2, 1)]);
    }

    #[test]
    fn test_more_rows_than_columns() {
        let rows = vec![
            vec![0.5, 2.0, 3.0],
            vec![0.8, 0.4, 2.5],
            vec![1.2, 1.5, 0.3],
            vec![2.0, 2.5, 1.8],
            vec![3.0, 3.5, 2.2],
        ];
        assert_eq!(greedy(&rows, Some(2.0)), vec![(2, 2), (1, 1), (0, 0)]);
    }

    #[test]
    fn test_infinite_costs_without_threshold() {
        let inf = f64::INFINITY;
        let rows = vec![vec![0.5, inf], vec![inf, inf]];
        // +inf <= +inf, so the second row still gets the leftover column
        assert_eq!(greedy(&rows, None), vec![(0, 0), (1, 1)]);
        assert_eq!(greedy(&rows, Some(1.0)), vec![(0, 0)]);
    }

    #[test]
    fn test_result_is_one_to_one() {
        let rows: Vec<Vec<f64>> = (0..7)
            .map(|i| (0..5).map(|j| ((i * 7 + j * 3) % 11) as f64).collect())
            .collect();
        let result = greedy(&rows, None);

        assert_eq!(result.len(), 5);
        let r: HashSet<_> = result.iter().map(|p| p.0).collect();
        let c: HashSet<_> = result.iter().map(|p| p.1).collect();
        assert_eq!(r.len(), result.len());
        assert_eq!(c.len(), result.len());
    }

    #[test]
    fn test_greedy_is_deterministic() {
        let rows = vec![vec![2.0, 2.0, 1.0], vec![1.0, 2.0, 2.0], vec![2.0, 1.0, 2.0]];
        assert_eq!(greedy(&rows, None), greedy(&rows, None));
    }

    // ===== Hungarian =====

    #[test]
    fn test_hungarian_dominates_greedy() {
        let matrix = CostMatrix::from_rows(&[vec![1.0, 2.0], vec![2.0, 100.0]]);
        let g = solve_assignment(&matrix, &MatchingOptions::greedy()).unwrap();
        let h = solve_assignment(&matrix, &MatchingOptions::hungarian()).unwrap();

        assert_eq!(g.total_cost(&matrix), 101.0);
        assert_eq!(h.total_cost(&matrix), 4.0);
        assert_eq!(h.pairs(), &[(0, 1), (1, 0)]);
    }

    #[test]
    fn test_hungarian_threshold_drops_expensive_pairs() {
        let matrix = CostMatrix::from_rows(&[vec![1.0, 2.0], vec![2.0, 100.0]]);
        let h = solve_assignment(&matrix, &MatchingOptions::hungarian().with_threshold(1.5))
            .unwrap();
        // Optimal pairs are (0,1)=2 and (1,0)=2, both above 1.5
        assert!(h.is_empty());
    }

    #[test]
    fn test_hungarian_threshold_filters_optimum_without_resolving() {
        // Optimum is (0,1)=0 (1,2)=1.1 (2,0)=0; the diagonal fits under 1.0 but is never considered
        let matrix = CostMatrix::from_rows(&[
            vec![0.9, 0.0, 5.0],
            vec![5.0, 0.9, 1.1],
            vec![0.0, 5.0, 0.9],
        ]);
        let h = solve_assignment(&matrix, &MatchingOptions::hungarian().with_threshold(1.0))
            .unwrap();
        assert_eq!(h.pairs(), &[(0, 1), (2, 0)]);

        let g = solve_assignment(&matrix, &MatchingOptions::greedy().with_threshold(1.0)).unwrap();
        assert_eq!(g.pairs(), &[(0, 1), (2, 0)]);
    }

    // ===== Validation =====

    #[test]
    fn test_nan_is_rejected() {
        let matrix = CostMatrix::from_rows(&[vec![0.5, f64::NAN], vec![1.0, 0.8]]);
        assert!(matrix.has_nan());

        let err = solve_assignment(&matrix, &MatchingOptions::greedy()).unwrap_err();
        assert!(matches!(err, Error::InvalidMatrix(_)));
        assert!(err.to_string().contains("(0, 1)"));
    }

    #[test]
    fn test_unknown_algorithm() {
        let err = "bogus".parse::<MatchingAlgorithm>().unwrap_err();
        assert!(matches!(err, Error::UnknownAlgorithm(ref name) if name == "bogus"));

        let json = serde_json::json!({"algorithm": "bogus"});
        assert!(matches!(
            MatchingOptions::from_json(&json),
            Err(Error::UnknownAlgorithm(_))
        ));
        assert!(serde_json::from_value::<MatchingOptions>(json).is_err());
    }

    #[test]
    fn test_options_from_json() {
        let options =
            MatchingOptions::from_json(&serde_json::json!({"algorithm": "hungarian", "threshold": 3}))
                .unwrap();
        assert_eq!(options, MatchingOptions::hungarian().with_threshold(3.0));

        // Non-numeric threshold is ignored
        let options =
            MatchingOptions::from_json(&serde_json::json!({"algorithm": "greedy", "threshold": "x"}))
                .unwrap();
        assert_eq!(options.threshold, None);
    }

    #[test]
    fn test_options_serde_ignores_non_numeric_threshold() {
        let json = serde_json::json!({"algorithm": "hungarian", "threshold": "far"});
        let options: MatchingOptions = serde_json::from_value(json.clone()).unwrap();
        assert_eq!(options, MatchingOptions::hungarian());
        assert_eq!(options, MatchingOptions::from_json(&json).unwrap());

        let options: MatchingOptions =
            serde_json::from_value(serde_json::json!({"threshold": 2.5})).unwrap();
        assert_eq!(options, MatchingOptions::greedy().with_threshold(2.5));
    }

    #[test]
    fn test_cost_matrix_serde_as_rows() {
        let matrix = CostMatrix::from_rows(&[vec![1.0, 2.0], vec![3.0, 4.0]]);
        let json = serde_json::to_value(&matrix).unwrap();
        assert_eq!(json, serde_json::json!([[1.0, 2.0], [3.0, 4.0]]));

        let back: CostMatrix = serde_json::from_value(json).unwrap();
        assert_eq!(back, matrix);
    }

    #[test]
    fn test_cancelled_greedy() {
        let token = CancelToken::new();
        token.cancel();
        let matrix = DMatrix::from_element(3, 3, 1.0);
        assert!(matches!(
            greedy_matching(&matrix, f64::INFINITY, &token),
            Err(Error::Cancelled)
        ));
    }

    // ===== Assignment helpers =====

    #[test]
    fn test_get_unmatched() {
        assert_eq!(get_unmatched(5, &[1, 3]), vec![0, 2, 4]);
        assert!(get_unmatched(3, &[0, 1, 2]).is_empty());
        assert_eq!(get_unmatched(3, &[]), vec![0, 1, 2]);
    }

    #[test]
    fn test_assignment_helpers() {
        let assignment = Assignment::new(vec![(2, 0), (0, 1)]);
        assert_eq!(assignment.target_of(2), Some(0));
        assert_eq!(assignment.target_of(1), None);
        assert_eq!(assignment.unmatched_sources(3), vec![1]);
        assert_eq!(assignment.unmatched_targets(3), vec![2]);
    }
}
