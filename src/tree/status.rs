//! Aggregate status of a parent node from its children.
//!
//! Precedence, highest first:
//! 1. `running`, then `queued` (no outcome yet)
//! 2. `error`, then `fail`
//! 3. `success` / `updated`: the first such child in traversal order wins
//! 4. `skipped`
//! 5. `idle`

use crate::model::TestStatus;

/// Aggregate child statuses. Returns `None` when there are no children.
#[must_use]
pub fn aggregate_status<I>(statuses: I) -> Option<TestStatus>
where
    I: IntoIterator<Item = TestStatus>,
{
    let mut seen_any = false;
    let mut running = false;
    let mut queued = false;
    let mut error = false;
    let mut fail = false;
    let mut first_definitive = None;
    let mut skipped = false;

    for status in statuses {
        seen_any = true;
        match status {
            TestStatus::Running => running = true,
            TestStatus::Queued => queued = true,
            TestStatus::Error => error = true,
            TestStatus::Fail => fail = true,
            TestStatus::Success | TestStatus::Updated => {
                first_definitive.get_or_insert(status);
            }
            TestStatus::Skipped => skipped = true,
            TestStatus::Idle => {}
        }
    }

    if !seen_any {
        return None;
    }

    let status = if running {
        TestStatus::Running
    } else if queued {
        TestStatus::Queued
    } else if error {
        TestStatus::Error
    } else if fail {
        TestStatus::Fail
    } else if let Some(definitive) = first_definitive {
        definitive
    } else if skipped {
        TestStatus::Skipped
    } else {
        TestStatus::Idle
    };

    Some(status)
}
