//! Typed async entry points, one per registered worker function.
//!
//! Each method queues the call on the pool and returns a [`TaskHandle`] that
//! resolves to exactly what the synchronous function returns, errors
//! included. A closed pool fails the handle with [`crate::Error::PoolClosed`].

use super::handle::TaskHandle;
use super::pool::WorkerPool;
use super::task::{TaskCall, TaskOutput};
use crate::coordinate_frame::CoordinateFrame;
use crate::distances::{DistanceMetric, Point};
use crate::matching::{Assignment, CostMatrix, MatchingOptions};
use crate::show::{DecodeOptions, ShowArchive};

impl WorkerPool {
    /// Background [`crate::solve_assignment`].
    ///
    /// A matrix containing NaN fails the handle immediately; nothing is queued.
    pub fn solve_assignment_async(
        &self,
        matrix: CostMatrix,
        options: MatchingOptions,
    ) -> TaskHandle<Assignment> {
        self.call(
            TaskCall::SolveAssignment { matrix, options },
            TaskOutput::into_assignment,
        )
    }

    /// Background [`crate::assign_points`] with a built-in metric.
    pub fn assign_points_async(
        &self,
        sources: Vec<Point>,
        targets: Vec<Point>,
        metric: DistanceMetric,
        options: MatchingOptions,
    ) -> TaskHandle<Assignment> {
        self.call(
            TaskCall::AssignPoints {
                sources,
                targets,
                metric,
                options,
            },
            TaskOutput::into_assignment,
        )
    }

    /// Background [`crate::decode_show_archive`]. `bytes` moves into the task.
    pub fn decode_show_archive_async(
        &self,
        bytes: Vec<u8>,
        options: DecodeOptions,
    ) -> TaskHandle<ShowArchive> {
        self.call(
            TaskCall::DecodeShowArchive { bytes, options },
            TaskOutput::into_show_archive,
        )
    }

    /// Background [`crate::fit_show_coordinate_frame`].
    pub fn fit_show_coordinate_frame_async(
        &self,
        gps_positions: Vec<Point>,
        headings: Vec<f64>,
        local_takeoff_points: Vec<Point>,
    ) -> TaskHandle<Option<CoordinateFrame>> {
        self.call(
            TaskCall::FitShowCoordinateFrame {
                gps_positions,
                headings,
                local_takeoff_points,
            },
            TaskOutput::into_coordinate_frame,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::worker::PoolConfig;
    use crate::Error;
    use futures::executor::block_on;

    #[test]
    fn test_solve_assignment_async() {
        let pool = WorkerPool::new(PoolConfig::new(2)).unwrap();
        let matrix = CostMatrix::from_rows(&[[3.0, 4.0], [5.0, 6.0]]);
        let handle =
            pool.solve_assignment_async(matrix, MatchingOptions::greedy().with_threshold(3.0));
        assert_eq!(block_on(handle).unwrap().pairs(), &[(0, 0)]);
    }

    #[test]
    fn test_decode_show_archive_async_error() {
        let pool = WorkerPool::new(PoolConfig::new(1)).unwrap();
        let handle = pool.decode_show_archive_async(b"nope".to_vec(), DecodeOptions::default());
        assert!(matches!(block_on(handle), Err(Error::ShowDecode(_))));
    }

    #[test]
    fn test_closed_pool_fails_handle() {
        let pool = WorkerPool::new(PoolConfig::new(1)).unwrap();
        pool.shutdown();
        let handle = pool.fit_show_coordinate_frame_async(vec![], vec![], vec![]);
        assert!(matches!(handle.wait(), Err(Error::PoolClosed)));
    }
}
