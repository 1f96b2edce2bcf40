//! Errors surfaced to the caller before (or instead of) a search.
//!
//! Only configuration and referential problems are errors. Anything the
//! optimizer can absorb (a visit that does not fit, a day that cannot be
//! worked) ends up in the schedule instead.

use std::fmt;
use std::io;

use crate::catalog::{ClientId, LocationId};

#[derive(Debug)]
pub enum PlannerError {
    /// The travel matrix has no entry for a pair of known locations.
    MissingTravelTime { from: LocationId, to: LocationId },
    /// An entity refers to a location that is not in the catalog.
    UnknownLocation { entity: String, location: LocationId },
    /// An entity refers to a client that is not in the catalog.
    UnknownClient { context: String, client: ClientId },
    DuplicateId(String),
    InvalidEntity { entity: String, reason: String },
    /// A rule points at a day outside the planning horizon.
    InvalidDay { context: String, day: usize },
    NoPlanningDays,
    /// A hotel evening arrival without the matching morning departure (or
    /// the reverse) reached assembly.
    BrokenHotelLink { night: usize, hotel: LocationId },
    Io(io::Error),
    Json(serde_json::Error),
}

impl fmt::Display for PlannerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PlannerError::MissingTravelTime { from, to } => {
                write!(f, "no travel time from {} to {}", from, to)
            }
            PlannerError::UnknownLocation { entity, location } => {
                write!(f, "{} refers to unknown location {}", entity, location)
            }
            PlannerError::UnknownClient { context, client } => {
                write!(f, "{} refers to unknown client {}", context, client)
            }
            PlannerError::DuplicateId(id) => write!(f, "duplicate identifier {}", id),
            PlannerError::InvalidEntity { entity, reason } => write!(f, "{}: {}", entity, reason),
            PlannerError::InvalidDay { context, day } => {
                write!(f, "{} refers to day {} outside the planning horizon", context, day)
            }
            PlannerError::NoPlanningDays => write!(f, "no planning days configured"),
            PlannerError::BrokenHotelLink { night, hotel } => write!(
                f,
                "hotel stay at {} after day {} is missing its arrival or departure",
                hotel, night
            ),
            PlannerError::Io(err) => write!(f, "io error: {}", err),
            PlannerError::Json(err) => write!(f, "json error: {}", err),
        }
    }
}

impl std::error::Error for PlannerError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            PlannerError::Io(err) => Some(err),
            PlannerError::Json(err) => Some(err),
            _ => None,
        }
    }
}

impl From<io::Error> for PlannerError {
    fn from(err: io::Error) -> Self {
        PlannerError::Io(err)
    }
}

impl From<serde_json::Error> for PlannerError {
    fn from(err: serde_json::Error) -> Self {
        PlannerError::Json(err)
    }
}
