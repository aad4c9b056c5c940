//! Derived status aggregation.
//!
//! A single rule maps the statuses of a parent's children to the parent's
//! status. It is used for functions (from tasks) and features (from functions).

use crate::fields::Status;

/// Aggregate child statuses into a derived parent status.
///
/// - no children: ToDo
/// - all Done: Done
/// - all ToDo: ToDo
/// - anything else (some Doing, or Done mixed with ToDo): Doing
pub fn aggregate<I>(children: I) -> Status
where
    I: IntoIterator<Item = Status>,
{
    let mut any = false;
    let mut all_done = true;
    let mut all_todo = true;
    for status in children {
        any = true;
        all_done &= status == Status::Done;
        all_todo &= status == Status::ToDo;
    }
    match (any, all_done, all_todo) {
        (false, _, _) => Status::ToDo,
        (true, true, _) => Status::Done,
        (true, _, true) => Status::ToDo,
        _ => Status::Doing,
    }
}
