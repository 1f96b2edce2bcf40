//! Travel-time tables.
//!
//! [`DenseMatrix`] is a ready-made [`TravelMatrix`] for callers that already
//! hold a square duration table. [`TravelTable`] is the solver's own copy,
//! indexed by catalog position so lookups during search are plain array
//! reads.

use std::collections::HashMap;

use crate::catalog::{Catalog, LocationId};
use crate::error::PlannerError;
use crate::traits::TravelMatrix;

/// Square duration table over an ordered list of locations.
#[derive(Debug, Clone)]
pub struct DenseMatrix {
    index: HashMap<LocationId, usize>,
    durations: Vec<Vec<i32>>,
}

impl DenseMatrix {
    /// `durations[i][j]` is the travel time from `ids[i]` to `ids[j]`.
    pub fn new(ids: Vec<LocationId>, durations: Vec<Vec<i32>>) -> Self {
        let index = ids.into_iter().enumerate().map(|(i, id)| (id, i)).collect();
        Self { index, durations }
    }

    /// Build a table by calling `f` for every ordered pair.
    pub fn from_fn<F>(ids: Vec<LocationId>, mut f: F) -> Self
    where
        F: FnMut(&LocationId, &LocationId) -> i32,
    {
        let durations = ids
            .iter()
            .map(|from| ids.iter().map(|to| f(from, to)).collect())
            .collect();
        Self::new(ids, durations)
    }
}

impl TravelMatrix for DenseMatrix {
    fn duration(&self, from: &LocationId, to: &LocationId) -> Option<i32> {
        let i = *self.index.get(from)?;
        let j = *self.index.get(to)?;
        self.durations.get(i)?.get(j).copied()
    }
}

/// Travel times indexed by position in `Catalog::locations`.
#[derive(Debug, Clone)]
pub(crate) struct TravelTable {
    index: HashMap<LocationId, usize>,
    durations: Vec<Vec<i32>>,
}

impl TravelTable {
    pub(crate) fn build<M: TravelMatrix>(
        catalog: &Catalog,
        matrix: &M,
    ) -> Result<Self, PlannerError> {
        let mut index = HashMap::with_capacity(catalog.locations.len());
        for (i, location) in catalog.locations.iter().enumerate() {
            index.insert(location.id.clone(), i);
        }

        let mut durations = Vec::with_capacity(catalog.locations.len());
        for from in &catalog.locations {
            let mut row = Vec::with_capacity(catalog.locations.len());
            for to in &catalog.locations {
                let duration = matrix.duration(&from.id, &to.id).ok_or_else(|| {
                    PlannerError::MissingTravelTime {
                        from: from.id.clone(),
                        to: to.id.clone(),
                    }
                })?;
                row.push(duration);
            }
            durations.push(row);
        }

        Ok(Self { index, durations })
    }

    pub(crate) fn index_of(&self, id: &LocationId) -> Option<usize> {
        self.index.get(id).copied()
    }

    pub(crate) fn travel(&self, from: usize, to: usize) -> i32 {
        self.durations[from][to]
    }
}
