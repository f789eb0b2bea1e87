//! SciPy optimization functions port.
//!
//! Ported from scipy.optimize.linear_sum_assignment (rectangular shortest
//! augmenting path, Crouse 2016).
//! License: BSD 3-Clause (SciPy Developers)

use nalgebra::DMatrix;

use crate::cancel::CancelToken;
use crate::Result;

/// Represents a match between a row index and column index.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MatchedPair {
    pub row_idx: usize,
    pub col_idx: usize,
}

/// Result of linear sum assignment.
#[derive(Debug, Clone, Default)]
pub struct AssignmentResult {
    /// Valid assignments (row, col pairs), sorted by row.
    pub assignments: Vec<MatchedPair>,
    /// Indices of rows that were not matched
    pub unmatched_rows: Vec<usize>,
    /// Indices of columns that were not matched
    pub unmatched_cols: Vec<usize>,
}

/// Solve the linear sum assignment problem.
///
/// Finds the assignment of `min(rows, cols)` rows to distinct columns that
/// minimizes the total cost. Entries equal to `+inf` are never selected; a row
/// that can only be completed through such entries stays unmatched.
///
/// # Arguments
/// * `cost_matrix` - cost[i][j] is the cost of assigning row i to column j (no NaN)
/// * `max_cost` - assignments with cost > max_cost are dropped from the optimal matching
/// * `cancel` - polled once per augmented row
pub fn linear_sum_assignment(
    cost_matrix: &DMatrix<f64>,
    max_cost: f64,
    cancel: &CancelToken,
) -> Result<AssignmentResult> {
    let num_rows = cost_matrix.nrows();
    let num_cols = cost_matrix.ncols();

    if num_rows == 0 || num_cols == 0 {
        return Ok(AssignmentResult {
            assignments: Vec::new(),
            unmatched_rows: (0..num_rows).collect(),
            unmatched_cols: (0..num_cols).collect(),
        });
    }

    // The solver needs rows <= cols
    let transposed = num_rows > num_cols;
    let work = if transposed {
        cost_matrix.transpose()
    } else {
        cost_matrix.clone()
    };
    let work = replace_infinite(work);

    let col4row = shortest_augmenting_path(&work, cancel)?;

    let mut pairs: Vec<MatchedPair> = col4row
        .into_iter()
        .enumerate()
        .map(|(i, j)| {
            if transposed {
                MatchedPair { row_idx: j, col_idx: i }
            } else {
                MatchedPair { row_idx: i, col_idx: j }
            }
        })
        .collect();
    pairs.sort_by_key(|p| p.row_idx);

    let mut matched_rows = vec![false; num_rows];
    let mut matched_cols = vec![false; num_cols];
    let mut assignments = Vec::with_capacity(pairs.len());

    for pair in pairs {
        let cost = cost_matrix[(pair.row_idx, pair.col_idx)];
        if cost.is_finite() && cost <= max_cost {
            matched_rows[pair.row_idx] = true;
            matched_cols[pair.col_idx] = true;
            assignments.push(pair);
        }
    }

    let unmatched_rows: Vec<usize> = (0..num_rows).filter(|&i| !matched_rows[i]).collect();
    let unmatched_cols: Vec<usize> = (0..num_cols).filter(|&j| !matched_cols[j]).collect();

    Ok(AssignmentResult {
        assignments,
        unmatched_rows,
        unmatched_cols,
    })
}

/// Replace `+inf` entries with a penalty larger than any complete finite matching.
///
/// Minimizing with this penalty first maximizes the number of finite pairs, then
/// minimizes their cost. Penalized pairs are filtered out by the caller.
fn replace_infinite(mut cost: DMatrix<f64>) -> DMatrix<f64> {
    if cost.iter().all(|c| c.is_finite()) {
        return cost;
    }

    let max_abs = cost
        .iter()
        .filter(|c| c.is_finite())
        .fold(0.0_f64, |acc, c| acc.max(c.abs()));
    let n = cost.nrows().min(cost.ncols()) as f64;
    let penalty = max_abs * 2.0 * (n + 1.0) + 1.0;

    for c in cost.iter_mut() {
        if !c.is_finite() {
            *c = penalty;
        }
    }
    cost
}

/// Rectangular shortest augmenting path solver. Requires `nrows <= ncols`.
///
/// Returns `col4row`, the column assigned to every row.
fn shortest_augmenting_path(cost: &DMatrix<f64>, cancel: &CancelToken) -> Result<Vec<usize>> {
    let nr = cost.nrows();
    let nc = cost.ncols();
    debug_assert!(nr <= nc);

    let mut u = vec![0.0; nr];
    let mut v = vec![0.0; nc];
    let mut shortest_path_costs = vec![f64::INFINITY; nc];
    let mut path: Vec<usize> = vec![usize::MAX; nc];
    let mut col4row: Vec<Option<usize>> = vec![None; nr];
    let mut row4col: Vec<Option<usize>> = vec![None; nc];
    let mut visited_rows = vec![false; nr];
    let mut visited_cols = vec![false; nc];
    let mut remaining: Vec<usize> = vec![0; nc];

    for cur_row in 0..nr {
        cancel.check()?;

        // Dijkstra over reduced costs, starting at cur_row
        let mut min_val = 0.0;
        let mut num_remaining = nc;
        for (it, slot) in remaining.iter_mut().enumerate() {
            // Reverse order so ties resolve towards lower column indices
            *slot = nc - it - 1;
        }
        visited_rows.fill(false);
        visited_cols.fill(false);
        shortest_path_costs.fill(f64::INFINITY);

        let mut i = cur_row;
        let sink = loop {
            let mut index = usize::MAX;
            let mut lowest = f64::INFINITY;
            visited_rows[i] = true;

            for it in 0..num_remaining {
                let j = remaining[it];
                let r = min_val + cost[(i, j)] - u[i] - v[j];
                if r < shortest_path_costs[j] {
                    path[j] = i;
                    shortest_path_costs[j] = r;
                }
                if shortest_path_costs[j] < lowest
                    || (shortest_path_costs[j] == lowest && row4col[j].is_none())
                {
                    lowest = shortest_path_costs[j];
                    index = it;
                }
            }

            min_val = lowest;
            if index == usize::MAX || !min_val.is_finite() {
                // Cannot happen once infinite costs are penalized
                return Err(crate::Error::SolverFailure(
                    "no augmenting path found".to_string(),
                ));
            }

            let j = remaining[index];
            visited_cols[j] = true;
            num_remaining -= 1;
            remaining[index] = remaining[num_remaining];

            match row4col[j] {
                None => break j,
                Some(next) => i = next,
            }
        };

        // Update dual variables
        u[cur_row] += min_val;
        for r in 0..nr {
            if visited_rows[r] && r != cur_row {
                if let Some(c) = col4row[r] {
                    u[r] += min_val - shortest_path_costs[c];
                }
            }
        }
        for c in 0..nc {
            if visited_cols[c] {
                v[c] -= min_val - shortest_path_costs[c];
            }
        }

        // Augment along the path back to cur_row
        let mut j = sink;
        loop {
            let r = path[j];
            row4col[j] = Some(r);
            let prev = col4row[r].replace(j);
            if r == cur_row {
                break;
            }
            match prev {
                Some(p) => j = p,
                None => break,
            }
        }
    }

    Ok(col4row.into_iter().map(|c| c.unwrap_or(usize::MAX)).collect())
}
