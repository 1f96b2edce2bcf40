//! Weekly schedule solver.
//!
//! Each planning day is one route that starts and ends at the base (or a
//! hotel / hub boundary carried over from the adjacent day). The solver
//! builds an initial plan by cheapest insertion, seeded either empty or from
//! a previous schedule, then improves it with local search until the move
//! neighborhoods are exhausted or the budget runs out.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::assembler::{assemble, Schedule, StopKind};
use crate::catalog::{Catalog, ClientId};
use crate::config::SolveOptions;
use crate::constraints::{check_keep_penalties, ConstraintModel};
use crate::error::PlannerError;
use crate::evaluate::{compute_schedule, DayTiming};
use crate::local_search;
use crate::matrix::TravelTable;
use crate::registry::{DayAffinity, Visit, VisitKind, VisitRegistry};
use crate::traits::TravelMatrix;

/// Costs closer than this are treated as equal.
pub(crate) const EPSILON: f64 = 1e-9;

/// How the search ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SolveStatus {
    /// No improving move was left.
    Converged,
    IterationLimit,
    TimeLimit,
    Cancelled,
}

impl SolveStatus {
    /// The schedule is the best found within the budget, not a local optimum.
    pub fn best_found(&self) -> bool {
        !matches!(self, SolveStatus::Converged)
    }
}

/// Shared flag to stop a running solve from another thread.
///
/// The solve still returns the best complete plan found so far.
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Plan the week from scratch.
pub fn solve<M: TravelMatrix>(
    catalog: &Catalog,
    matrix: &M,
    options: SolveOptions,
) -> Result<Schedule, PlannerError> {
    solve_with(catalog, matrix, options, None, None)
}

/// Plan the week starting from a previous schedule (e.g. last week's plan).
pub fn solve_from<M: TravelMatrix>(
    catalog: &Catalog,
    matrix: &M,
    options: SolveOptions,
    initial: &Schedule,
) -> Result<Schedule, PlannerError> {
    solve_with(catalog, matrix, options, Some(initial), None)
}

pub fn solve_with<M: TravelMatrix>(
    catalog: &Catalog,
    matrix: &M,
    options: SolveOptions,
    initial: Option<&Schedule>,
    cancel: Option<&CancelFlag>,
) -> Result<Schedule, PlannerError> {
    catalog.validate(matrix)?;
    let table = TravelTable::build(catalog, matrix)?;
    check_keep_penalties(catalog, &options);
    let model = ConstraintModel::build(catalog, &table, &options);
    let registry = VisitRegistry::build(catalog, &table, &options);
    let problem = Problem {
        catalog,
        table,
        model,
        registry,
        options,
    };

    info!(
        days = catalog.days.len(),
        clients = catalog.clients.len(),
        appointments = catalog.appointments.len(),
        warm_start = initial.is_some(),
        "starting weekly solve"
    );

    let mut ctx = SearchContext::new(Plan::empty(&problem), &problem.options, cancel);

    let seed = match initial {
        Some(schedule) => seed_from(&problem, schedule),
        None => Plan::empty(&problem),
    };
    let seed_days = seed.days.clone();
    ctx.best = construct(&problem, seed, &ctx);
    info!(objective = ctx.best.cost, "initial plan built");

    let status = local_search::improve(&problem, &mut ctx);
    keep_served_appointments(&problem, &mut ctx.best);

    if initial.is_some() && ctx.best.days == seed_days {
        warn!("optimized plan is identical to its warm start");
    }
    info!(
        objective = ctx.best.cost,
        ?status,
        iterations = ctx.iterations,
        elapsed_ms = ctx.started.elapsed().as_millis() as u64,
        "weekly solve finished"
    );

    assemble(&problem, &ctx.best, status)
}

/// Read-only inputs shared by every stage of one solve.
pub(crate) struct Problem<'a> {
    pub(crate) catalog: &'a Catalog,
    pub(crate) table: TravelTable,
    pub(crate) model: ConstraintModel,
    pub(crate) registry: VisitRegistry,
    pub(crate) options: SolveOptions,
}

impl Problem<'_> {
    pub(crate) fn days(&self) -> usize {
        self.model.frames.len()
    }

    /// Whether `visit` may be served on `day` at all.
    pub(crate) fn eligible(&self, visit: usize, day: usize) -> bool {
        let frame = &self.model.frames[day];
        let visit = self.registry.get(visit);
        frame.open
            && visit.region == frame.region
            && match visit.affinity {
                DayAffinity::Any => true,
                DayAffinity::Pinned(pinned) => pinned == day,
            }
    }

    pub(crate) fn time_day(&self, day: usize, sequence: &[usize]) -> Option<DayTiming> {
        let frame = &self.model.frames[day];
        if !frame.open {
            return None;
        }
        let visits: Vec<&Visit> = sequence.iter().map(|&id| self.registry.get(id)).collect();
        compute_schedule(frame, &visits, &self.table, &self.options)
    }

    fn visit_for(&self, client: &ClientId, pinned: bool) -> Option<usize> {
        let index = self.catalog.clients.iter().position(|c| &c.id == client)?;
        let mut call = None;
        let mut appointment = None;
        for visit in self.registry.for_client(index) {
            match visit.kind {
                VisitKind::Call { .. } => call = Some(visit.id),
                VisitKind::Appointment { .. } => appointment = Some(visit.id),
            }
        }
        if pinned { appointment.or(call) } else { call }
    }
}

/// Visit sequences for every day with their timings.
///
/// Only ever replaced as a whole, after every changed day has been timed,
/// so any `Plan` is a complete feasible week.
#[derive(Debug, Clone)]
pub(crate) struct Plan {
    pub(crate) days: Vec<Vec<usize>>,
    /// `None` for closed days.
    pub(crate) timings: Vec<Option<DayTiming>>,
    pub(crate) cost: f64,
}

impl Plan {
    pub(crate) fn empty(problem: &Problem<'_>) -> Self {
        let days = vec![Vec::new(); problem.days()];
        let timings = (0..problem.days()).map(|day| problem.time_day(day, &[])).collect();
        let mut plan = Self {
            days,
            timings,
            cost: 0.0,
        };
        plan.recost(problem);
        plan
    }

    /// Day serving each visit, indexed by visit id.
    pub(crate) fn served(&self, visit_count: usize) -> Vec<Option<usize>> {
        let mut served = vec![None; visit_count];
        for (day, sequence) in self.days.iter().enumerate() {
            for &visit in sequence {
                served[visit] = Some(day);
            }
        }
        served
    }

    pub(crate) fn day_cost(&self, day: usize) -> f64 {
        self.timings[day].as_ref().map_or(0.0, |timing| timing.cost)
    }

    pub(crate) fn set_day(&mut self, day: usize, sequence: Vec<usize>, timing: DayTiming) {
        self.days[day] = sequence;
        self.timings[day] = Some(timing);
    }

    pub(crate) fn recost(&mut self, problem: &Problem<'_>) {
        let travel: f64 = (0..self.days.len()).map(|day| self.day_cost(day)).sum();
        let served = self.served(problem.registry.visits.len());
        self.cost = travel + problem.registry.skip_total(&served);
    }
}

/// Single-writer holder of the best plan and the search budget.
pub(crate) struct SearchContext<'c> {
    pub(crate) best: Plan,
    pub(crate) iterations: usize,
    started: Instant,
    deadline: Option<Instant>,
    max_iterations: usize,
    cancel: Option<&'c CancelFlag>,
}

impl<'c> SearchContext<'c> {
    fn new(best: Plan, options: &SolveOptions, cancel: Option<&'c CancelFlag>) -> Self {
        let started = Instant::now();
        Self {
            best,
            iterations: 0,
            started,
            deadline: options.time_limit().map(|limit| started + limit),
            max_iterations: options.local_search_iterations,
            cancel,
        }
    }

    /// Cancelled or out of time; safe to call from worker threads.
    pub(crate) fn expired(&self) -> bool {
        self.cancel.is_some_and(|flag| flag.is_cancelled())
            || self.deadline.is_some_and(|deadline| Instant::now() >= deadline)
    }

    pub(crate) fn stop_reason(&self) -> Option<SolveStatus> {
        if self.cancel.is_some_and(|flag| flag.is_cancelled()) {
            Some(SolveStatus::Cancelled)
        } else if self.deadline.is_some_and(|deadline| Instant::now() >= deadline) {
            Some(SolveStatus::TimeLimit)
        } else if self.iterations >= self.max_iterations {
            Some(SolveStatus::IterationLimit)
        } else {
            None
        }
    }

    /// Replace the best plan with a strictly better one.
    pub(crate) fn adopt(&mut self, plan: Plan) {
        debug_assert!(plan.cost < self.best.cost);
        self.best = plan;
        self.iterations += 1;
    }
}

// ============================================================================
// Construction
// ============================================================================

struct Insertion {
    day: usize,
    position: usize,
    timing: DayTiming,
    delta: f64,
}

/// Cheapest insertion of every unserved visit: appointments first,
/// then calls by priority. A visit is only inserted when its added cost is
/// below the skip cost it saves.
fn construct(problem: &Problem<'_>, mut plan: Plan, ctx: &SearchContext<'_>) -> Plan {
    let visit_count = problem.registry.visits.len();
    let mut served = plan.served(visit_count);

    let mut order: Vec<&Visit> = problem.registry.visits.iter().collect();
    order.sort_by(|a, b| {
        let a_appt = matches!(a.kind, VisitKind::Appointment { .. });
        let b_appt = matches!(b.kind, VisitKind::Appointment { .. });
        b_appt
            .cmp(&a_appt)
            .then(b.skip_cost.total_cmp(&a.skip_cost))
            .then(a.id.cmp(&b.id))
    });

    for visit in order {
        if ctx.expired() {
            debug!("construction interrupted");
            break;
        }
        let partner_served = visit.partner.is_some_and(|partner| served[partner].is_some());
        if served[visit.id].is_some() || partner_served {
            continue;
        }

        let reward = problem.registry.reward(visit.id, false);
        match best_insertion(problem, &plan, visit.id) {
            Some(insertion) if insertion.delta < reward - EPSILON => {
                debug!(
                    visit = visit.id,
                    day = insertion.day,
                    position = insertion.position,
                    delta = insertion.delta,
                    reward,
                    "inserted"
                );
                let mut sequence = plan.days[insertion.day].clone();
                sequence.insert(insertion.position, visit.id);
                plan.set_day(insertion.day, sequence, insertion.timing);
                served[visit.id] = Some(insertion.day);
            }
            Some(insertion) => {
                debug!(visit = visit.id, delta = insertion.delta, reward, "not worth inserting");
            }
            None => debug!(visit = visit.id, "no feasible insertion"),
        }
    }

    plan.recost(problem);
    plan
}

/// Cheapest feasible position for `visit` over the whole week. Ties go to
/// the lower day travel time, then the earlier day, then the earlier
/// position.
fn best_insertion(problem: &Problem<'_>, plan: &Plan, visit: usize) -> Option<Insertion> {
    (0..problem.days())
        .into_par_iter()
        .filter(|&day| problem.eligible(visit, day))
        .flat_map_iter(|day| {
            let current = plan.day_cost(day);
            (0..=plan.days[day].len()).filter_map(move |position| {
                let mut sequence = plan.days[day].clone();
                sequence.insert(position, visit);
                problem.time_day(day, &sequence).map(|timing| Insertion {
                    day,
                    position,
                    delta: timing.cost - current,
                    timing,
                })
            })
        })
        .min_by(|a, b| {
            a.delta
                .total_cmp(&b.delta)
                .then(a.timing.drive_time.cmp(&b.timing.drive_time))
                .then(a.day.cmp(&b.day))
                .then(a.position.cmp(&b.position))
        })
}

/// Switch a call to its appointment variant when the call already sits on
/// the appointment's day and the day still times out with the window.
fn keep_served_appointments(problem: &Problem<'_>, plan: &mut Plan) {
    let served = plan.served(problem.registry.visits.len());
    for visit in &problem.registry.visits {
        let (VisitKind::Appointment { .. }, Some(call)) = (visit.kind, visit.partner) else {
            continue;
        };
        let Some(day) = served[call] else {
            continue;
        };
        if served[visit.id].is_some() || !problem.eligible(visit.id, day) {
            continue;
        }
        let sequence: Vec<usize> = plan.days[day]
            .iter()
            .map(|&id| if id == call { visit.id } else { id })
            .collect();
        let Some(timing) = problem.time_day(day, &sequence) else {
            continue;
        };
        let mut switched = plan.clone();
        switched.set_day(day, sequence, timing);
        switched.recost(problem);
        if switched.cost < plan.cost - EPSILON {
            debug!(visit = visit.id, day, "call switched to its appointment");
            *plan = switched;
        }
    }
}

/// Rebuild a plan from a previous schedule's client stops. Whole days are
/// kept when they still time out; otherwise stops are kept one by one while
/// the day stays feasible.
fn seed_from(problem: &Problem<'_>, schedule: &Schedule) -> Plan {
    let mut plan = Plan::empty(problem);
    let mut used = vec![false; problem.registry.visits.len()];

    for route in &schedule.routes {
        let day = route.day;
        if day >= problem.days() || !problem.model.frames[day].open {
            continue;
        }

        let mut wanted = Vec::new();
        for stop in &route.stops {
            let (client, pinned) = match &stop.kind {
                StopKind::Call { client } => (client, false),
                StopKind::Appointment { client } => (client, true),
                _ => continue,
            };
            let Some(visit) = problem.visit_for(client, pinned) else {
                continue;
            };
            let visit = if problem.eligible(visit, day) {
                visit
            } else {
                match problem.visit_for(client, false) {
                    Some(call) if problem.eligible(call, day) => call,
                    _ => continue,
                }
            };
            let partner = problem.registry.get(visit).partner;
            if used[visit] || partner.is_some_and(|p| used[p]) || wanted.contains(&visit) {
                continue;
            }
            wanted.push(visit);
        }

        let sequence = match problem.time_day(day, &wanted) {
            Some(timing) => {
                plan.set_day(day, wanted.clone(), timing);
                wanted
            }
            None => {
                let mut kept = Vec::new();
                for visit in wanted {
                    kept.push(visit);
                    match problem.time_day(day, &kept) {
                        Some(timing) => plan.set_day(day, kept.clone(), timing),
                        None => {
                            kept.pop();
                        }
                    }
                }
                kept
            }
        };
        for visit in sequence {
            used[visit] = true;
        }
        debug!(day, visits = plan.days[day].len(), "seeded day from warm start");
    }

    plan.recost(problem);
    plan
}
