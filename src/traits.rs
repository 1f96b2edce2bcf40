//! Seams to external collaborators.
//!
//! The planner never computes travel times itself; whatever builds them
//! (a road router, a great-circle estimate, a spreadsheet) implements
//! [`TravelMatrix`] for the caller's locations.

use std::collections::HashMap;

use crate::catalog::LocationId;

/// Provides travel durations between known locations.
///
/// Lookups happen once, before search; a pair answering `None` is a
/// configuration error.
pub trait TravelMatrix {
    /// Travel duration in seconds from `from` to `to`.
    fn duration(&self, from: &LocationId, to: &LocationId) -> Option<i32>;
}

impl TravelMatrix for HashMap<(LocationId, LocationId), i32> {
    fn duration(&self, from: &LocationId, to: &LocationId) -> Option<i32> {
        if from == to {
            return Some(self.get(&(from.clone(), to.clone())).copied().unwrap_or(0));
        }
        self.get(&(from.clone(), to.clone())).copied()
    }
}

impl<T: TravelMatrix + ?Sized> TravelMatrix for &T {
    fn duration(&self, from: &LocationId, to: &LocationId) -> Option<i32> {
        (**self).duration(from, to)
    }
}
