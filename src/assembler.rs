//! Schedule assembly: the public result of a solve.
//!
//! Turns the solver's final plan into routes with concrete times, per-client
//! reports, appointment outcomes and weekly totals. Every value here is
//! derived from a complete plan, never from search state in progress.

use serde::{Deserialize, Serialize};

use crate::catalog::{ClientId, LocationId, PrescheduledAppointment};
use crate::constraints::{DayIssue, Leg, TransitKind};
use crate::error::PlannerError;
use crate::evaluate::{DayTiming, StopItem};
use crate::registry::VisitKind;
use crate::solver::{Plan, Problem, SolveStatus};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Schedule {
    /// One route per planning day, in day order.
    pub routes: Vec<Route>,
    /// One report per catalog client, in catalog order.
    pub clients: Vec<ClientReport>,
    /// One report per pre-scheduled appointment, in catalog order.
    pub appointments: Vec<AppointmentReport>,
    pub metrics: ScheduleMetrics,
    /// Travel cost plus the skip costs of everything not served.
    pub objective: f64,
    pub status: SolveStatus,
    pub day_issues: Vec<DayIssue>,
}

impl Schedule {
    pub fn route(&self, day: usize) -> Option<&Route> {
        self.routes.get(day)
    }

    pub fn client(&self, id: &ClientId) -> Option<&ClientReport> {
        self.clients.iter().find(|report| &report.client == id)
    }

    pub fn appointment(&self, client: &ClientId) -> Option<&AppointmentReport> {
        self.appointments.iter().find(|report| &report.client == client)
    }

    /// Clients without an appointment that were left out of the week.
    pub fn dropped(&self) -> impl Iterator<Item = &ClientId> {
        self.clients
            .iter()
            .filter(|report| report.outcome == Some(AppointmentOutcome::Dropped))
            .map(|report| &report.client)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DayStatus {
    Worked,
    /// Misconfigured or structurally infeasible; see the schedule's day issues.
    Closed,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Route {
    pub day: usize,
    pub name: String,
    pub status: DayStatus,
    pub stops: Vec<Stop>,
    pub start: i32,
    pub end: i32,
    /// Drive time only; flights are counted in `air_time`.
    pub travel_time: i32,
    pub air_time: i32,
    pub service_time: i32,
    pub work_time: i32,
}

impl Route {
    fn closed(day: usize) -> Self {
        Self {
            day,
            name: weekday_name(day),
            status: DayStatus::Closed,
            stops: Vec::new(),
            start: 0,
            end: 0,
            travel_time: 0,
            air_time: 0,
            service_time: 0,
            work_time: 0,
        }
    }

    pub fn client_calls(&self) -> usize {
        self.stops.iter().filter(|stop| stop.kind.client().is_some()).count()
    }

    pub fn break_stop(&self) -> Option<&Stop> {
        self.stops.iter().find(|stop| stop.kind == StopKind::Break)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum StopKind {
    DepartBase,
    ReturnBase,
    HubArrival,
    HubDeparture,
    HotelDeparture,
    HotelArrival,
    Break,
    Call { client: ClientId },
    /// A pre-scheduled appointment served as booked.
    Appointment { client: ClientId },
}

impl StopKind {
    pub fn client(&self) -> Option<&ClientId> {
        match self {
            StopKind::Call { client } | StopKind::Appointment { client } => Some(client),
            _ => None,
        }
    }
}

impl From<TransitKind> for StopKind {
    fn from(kind: TransitKind) -> Self {
        match kind {
            TransitKind::DepartBase => StopKind::DepartBase,
            TransitKind::ReturnBase => StopKind::ReturnBase,
            TransitKind::HubArrival => StopKind::HubArrival,
            TransitKind::HubDeparture => StopKind::HubDeparture,
            TransitKind::HotelDeparture => StopKind::HotelDeparture,
            TransitKind::HotelArrival => StopKind::HotelArrival,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Stop {
    pub kind: StopKind,
    pub location: LocationId,
    pub leg: Leg,
    /// Leg duration into this stop.
    pub travel: i32,
    pub arrival: i32,
    pub time_in: i32,
    pub time_out: i32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AppointmentOutcome {
    Kept,
    Missed,
    Rescheduled,
    /// A client without an appointment left out of the week.
    Dropped,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum UnassignedReason {
    /// No open day accepts the client.
    NoEligibleDay,
    /// No position on any eligible day fits the client's windows.
    NoFeasibleWindow,
    /// It fits somewhere, but the added travel costs more than its priority.
    NotWorthTravel,
    BelowPriorityCutoff,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum VisitState {
    /// `position` is the stop index within the day's route.
    Served { day: usize, position: usize, time_in: i32 },
    Skipped { reason: UnassignedReason },
}

impl VisitState {
    pub fn day(&self) -> Option<usize> {
        match self {
            VisitState::Served { day, .. } => Some(*day),
            VisitState::Skipped { .. } => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AppointmentReport {
    pub client: ClientId,
    pub day: usize,
    pub window: (i32, i32),
    pub outcome: AppointmentOutcome,
    pub state: VisitState,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClientReport {
    pub client: ClientId,
    pub priority: f64,
    /// Day of the client's pre-scheduled appointment, if any.
    pub pinned_day: Option<usize>,
    pub time_from_base: i32,
    pub state: VisitState,
    /// Appointment outcome for booked clients, `Dropped` for skipped
    /// unbooked clients, `None` for served unbooked clients.
    pub outcome: Option<AppointmentOutcome>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ScheduleMetrics {
    pub work_time: i32,
    pub travel_time: i32,
    pub air_time: i32,
    pub service_time: i32,
    pub client_calls: usize,
    pub appointments: usize,
    pub kept: usize,
    pub missed: usize,
    pub rescheduled: usize,
    pub dropped: usize,
}

/// Outcome of an appointment given how its client ended up.
pub fn classify(appointment: &PrescheduledAppointment, state: &VisitState) -> AppointmentOutcome {
    match *state {
        VisitState::Served { day, time_in, .. } => {
            let (open, close) = appointment.window;
            if day == appointment.day && time_in >= open && time_in <= close {
                AppointmentOutcome::Kept
            } else {
                AppointmentOutcome::Rescheduled
            }
        }
        VisitState::Skipped { .. } => AppointmentOutcome::Missed,
    }
}

pub fn weekday_name(day: usize) -> String {
    const NAMES: [&str; 5] = ["Monday", "Tuesday", "Wednesday", "Thursday", "Friday"];
    match NAMES.get(day) {
        Some(name) => name.to_string(),
        None => format!("Day {}", day + 1),
    }
}

pub(crate) fn assemble(
    problem: &Problem<'_>,
    plan: &Plan,
    status: SolveStatus,
) -> Result<Schedule, PlannerError> {
    let catalog = problem.catalog;
    let mut served: Vec<Option<VisitState>> = vec![None; catalog.clients.len()];

    let routes: Vec<Route> = plan
        .timings
        .iter()
        .enumerate()
        .map(|(day, timing)| match timing {
            Some(timing) => build_route(problem, day, timing, &mut served),
            None => Route::closed(day),
        })
        .collect();

    check_hotel_links(problem, &routes)?;

    let base = problem.table.index_of(&catalog.base).unwrap_or(0);
    let clients: Vec<ClientReport> = catalog
        .clients
        .iter()
        .enumerate()
        .map(|(index, client)| {
            let state = served[index].unwrap_or_else(|| VisitState::Skipped {
                reason: skip_reason(problem, plan, index),
            });
            let appointment = catalog.appointment_for(&client.id);
            let outcome = match (appointment, &state) {
                (Some(appt), state) => Some(classify(appt, state)),
                (None, VisitState::Skipped { .. }) => Some(AppointmentOutcome::Dropped),
                (None, VisitState::Served { .. }) => None,
            };
            let time_from_base = problem
                .table
                .index_of(&client.location)
                .map_or(0, |location| problem.table.travel(base, location));
            ClientReport {
                client: client.id.clone(),
                priority: client.priority,
                pinned_day: appointment.map(|appt| appt.day),
                time_from_base,
                state,
                outcome,
            }
        })
        .collect();

    let appointments: Vec<AppointmentReport> = catalog
        .appointments
        .iter()
        .filter_map(|appt| {
            let report = clients.iter().find(|report| report.client == appt.client)?;
            Some(AppointmentReport {
                client: appt.client.clone(),
                day: appt.day,
                window: appt.window,
                outcome: classify(appt, &report.state),
                state: report.state,
            })
        })
        .collect();

    let metrics = metrics(&routes, &clients, &appointments);

    Ok(Schedule {
        routes,
        clients,
        appointments,
        metrics,
        objective: plan.cost,
        status,
        day_issues: problem.model.issues.clone(),
    })
}

fn build_route(
    problem: &Problem<'_>,
    day: usize,
    timing: &DayTiming,
    served: &mut [Option<VisitState>],
) -> Route {
    let catalog = problem.catalog;
    let stops = timing
        .stops
        .iter()
        .enumerate()
        .map(|(position, stop)| {
            let kind = match stop.item {
                StopItem::Transit(kind) => kind.into(),
                StopItem::Break => StopKind::Break,
                StopItem::Visit(id) => {
                    let visit = problem.registry.get(id);
                    let client = catalog.clients[visit.client()].id.clone();
                    served[visit.client()] = Some(VisitState::Served {
                        day,
                        position,
                        time_in: stop.time_in,
                    });
                    match visit.kind {
                        VisitKind::Call { .. } => StopKind::Call { client },
                        VisitKind::Appointment { .. } => StopKind::Appointment { client },
                    }
                }
            };
            Stop {
                kind,
                location: catalog.locations[stop.location].id.clone(),
                leg: stop.leg,
                travel: stop.travel,
                arrival: stop.arrival,
                time_in: stop.time_in,
                time_out: stop.time_out,
            }
        })
        .collect();

    Route {
        day,
        name: weekday_name(day),
        status: DayStatus::Worked,
        stops,
        start: timing.start,
        end: timing.end,
        travel_time: timing.drive_time,
        air_time: timing.air_time,
        service_time: timing.service_time,
        work_time: timing.span(),
    }
}

/// Every kept overnight stay must end day `night` at the hotel and start
/// the next day there.
fn check_hotel_links(problem: &Problem<'_>, routes: &[Route]) -> Result<(), PlannerError> {
    for link in &problem.model.hotel_links {
        let hotel = &problem.catalog.locations[link.hotel].id;
        let evening = routes
            .get(link.night)
            .and_then(|route| route.stops.last())
            .is_some_and(|stop| stop.kind == StopKind::HotelArrival && &stop.location == hotel);
        let morning = routes
            .get(link.night + 1)
            .and_then(|route| route.stops.first())
            .is_some_and(|stop| stop.kind == StopKind::HotelDeparture && &stop.location == hotel);
        if !evening || !morning {
            return Err(PlannerError::BrokenHotelLink {
                night: link.night,
                hotel: hotel.clone(),
            });
        }
    }
    Ok(())
}

fn skip_reason(problem: &Problem<'_>, plan: &Plan, client: usize) -> UnassignedReason {
    if problem.registry.excluded.contains(&client) {
        return UnassignedReason::BelowPriorityCutoff;
    }

    let candidates: Vec<(usize, usize)> = problem
        .registry
        .for_client(client)
        .flat_map(|visit| (0..problem.days()).map(move |day| (visit.id, day)))
        .filter(|&(visit, day)| problem.eligible(visit, day))
        .collect();
    if candidates.is_empty() {
        return UnassignedReason::NoEligibleDay;
    }

    let fits = candidates.iter().any(|&(visit, day)| {
        (0..=plan.days[day].len()).any(|position| {
            let mut sequence = plan.days[day].clone();
            sequence.insert(position, visit);
            problem.time_day(day, &sequence).is_some()
        })
    });
    if fits {
        UnassignedReason::NotWorthTravel
    } else {
        UnassignedReason::NoFeasibleWindow
    }
}

fn metrics(
    routes: &[Route],
    clients: &[ClientReport],
    appointments: &[AppointmentReport],
) -> ScheduleMetrics {
    let mut metrics = ScheduleMetrics::default();
    for route in routes {
        metrics.work_time += route.work_time;
        metrics.travel_time += route.travel_time;
        metrics.air_time += route.air_time;
        metrics.service_time += route.service_time;
        metrics.client_calls += route.client_calls();
    }
    metrics.appointments = appointments.len();
    for report in appointments {
        match report.outcome {
            AppointmentOutcome::Kept => metrics.kept += 1,
            AppointmentOutcome::Missed => metrics.missed += 1,
            AppointmentOutcome::Rescheduled => metrics.rescheduled += 1,
            AppointmentOutcome::Dropped => {}
        }
    }
    metrics.dropped = clients
        .iter()
        .filter(|report| report.outcome == Some(AppointmentOutcome::Dropped))
        .count();
    metrics
}
