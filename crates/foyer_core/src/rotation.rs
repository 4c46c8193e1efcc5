//! crates/foyer_core/src/rotation.rs
//!
//! Chore rotation arithmetic. A fixed three-task cycle advances one step
//! per week from a reference start week.

use crate::domain::{GroupRotation, Task};

/// Number of whole cycle steps elapsed since `start_week`, modulo the cycle
/// length. Non-negative even when `current_week_number` is before the start
/// week (reset mid-year, queries about earlier weeks).
pub fn rotation_offset(current_week_number: i64, start_week: i64) -> usize {
    (current_week_number - start_week).rem_euclid(3) as usize
}

/// The task assigned to the group at `group_index` for the given offset.
pub fn task_for_group(rotation: &GroupRotation, group_index: usize, offset: usize) -> Task {
    rotation.rotation_order[(group_index + offset) % 3]
}

/// Convenience wrapper: the task for a group this week, or `None` when the
/// rotation has never been started.
pub fn current_task(
    rotation: &GroupRotation,
    group_index: usize,
    current_week_number: i64,
) -> Option<Task> {
    let start = rotation.start_week?;
    let offset = rotation_offset(current_week_number, start);
    Some(task_for_group(rotation, group_index, offset))
}
