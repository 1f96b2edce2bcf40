//! weekly-planner
//!
//! Builds a one-week visiting schedule for a single field agent: which
//! clients to call on, on which day, in what order and at what times, given
//! travel times, workday rules, breaks, hub and hotel transits and
//! pre-scheduled appointments.

pub mod assembler;
pub mod catalog;
pub mod config;
pub mod constraints;
pub mod error;
mod evaluate;
mod local_search;
pub mod matrix;
pub mod persist;
mod registry;
pub mod solver;
pub mod traits;

pub use assembler::{
    classify, weekday_name, AppointmentOutcome, AppointmentReport, ClientReport, DayStatus, Route,
    Schedule, ScheduleMetrics, Stop, StopKind, UnassignedReason, VisitState,
};
pub use catalog::{
    Catalog, Client, ClientId, HotelStay, HubRule, HubTransit, Location, LocationId, LocationKind,
    PrescheduledAppointment, WorkdaySpec,
};
pub use config::{OverrunPolicy, SolveOptions};
pub use constraints::{DayIssue, Leg, TransitKind};
pub use error::PlannerError;
pub use matrix::DenseMatrix;
pub use persist::{load_schedule, save_schedule};
pub use solver::{solve, solve_from, solve_with, CancelFlag, SolveStatus};
pub use traits::TravelMatrix;
