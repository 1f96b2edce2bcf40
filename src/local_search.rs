//! Local search over a complete weekly plan.
//!
//! Each iteration scans the neighborhoods in a fixed order, evaluates every
//! move of the first neighborhood that has an improving one in parallel, and
//! applies the best. Ties are broken by move index, so a run is
//! deterministic regardless of thread count.
//!
//! The chain neighborhood comes last: it pairs an insertion with a
//! relocation, for plans where neither move helps on its own.

use rayon::prelude::*;
use tracing::{debug, trace};

use crate::evaluate::DayTiming;
use crate::solver::{Plan, Problem, SearchContext, SolveStatus, EPSILON};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Neighborhood {
    TwoOpt,
    Relocate,
    Swap,
    Exchange,
    Chain,
}

const NEIGHBORHOODS: [Neighborhood; 5] = [
    Neighborhood::TwoOpt,
    Neighborhood::Relocate,
    Neighborhood::Swap,
    Neighborhood::Exchange,
    Neighborhood::Chain,
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Move {
    /// Reverse positions `from..=to` of one day.
    TwoOpt { day: usize, from: usize, to: usize },
    /// Move one visit to another position, same day or not.
    Relocate {
        from_day: usize,
        from_pos: usize,
        to_day: usize,
        to_pos: usize,
    },
    /// Exchange two visits on different days.
    Swap {
        day_a: usize,
        pos_a: usize,
        day_b: usize,
        pos_b: usize,
    },
    /// Serve an unserved visit, dropping its partner if served.
    Insert { visit: usize, day: usize, pos: usize },
    /// Serve an unserved visit in place of a served one.
    Replace { visit: usize, day: usize, pos: usize },
    /// Stop serving a visit.
    Remove { day: usize, pos: usize },
    /// Serve an unserved visit at `pos` and move a served visit from another
    /// day next to it, before or after.
    InsertWith {
        visit: usize,
        day: usize,
        pos: usize,
        from_day: usize,
        from_pos: usize,
        before: bool,
    },
}

struct Candidate {
    cost: f64,
    changes: Vec<(usize, Vec<usize>, DayTiming)>,
}

/// Improve `ctx.best` until no neighborhood has an improving move or the
/// budget runs out.
pub(crate) fn improve(problem: &Problem<'_>, ctx: &mut SearchContext<'_>) -> SolveStatus {
    loop {
        if let Some(status) = ctx.stop_reason() {
            debug!(?status, iterations = ctx.iterations, "local search stopped");
            return status;
        }

        let mut improved = false;
        for neighborhood in NEIGHBORHOODS {
            let moves = generate(problem, &ctx.best, neighborhood);
            let served = ctx.best.served(problem.registry.visits.len());
            let shared: &SearchContext<'_> = ctx;

            let winner = moves
                .par_iter()
                .enumerate()
                .filter_map(|(index, mv)| {
                    if shared.expired() {
                        return None;
                    }
                    evaluate(problem, &shared.best, &served, mv).map(|candidate| (index, candidate))
                })
                .filter(|(_, candidate)| candidate.cost < shared.best.cost - EPSILON)
                .min_by(|a, b| a.1.cost.total_cmp(&b.1.cost).then(a.0.cmp(&b.0)));

            if let Some((index, candidate)) = winner {
                trace!(?neighborhood, mv = ?moves[index], cost = candidate.cost, "applying move");
                let mut plan = ctx.best.clone();
                for (day, sequence, timing) in candidate.changes {
                    plan.set_day(day, sequence, timing);
                }
                plan.recost(problem);
                if plan.cost < ctx.best.cost {
                    ctx.adopt(plan);
                    improved = true;
                    break;
                }
            }
            if ctx.expired() {
                break;
            }
        }

        if !improved {
            let status = ctx.stop_reason().unwrap_or(SolveStatus::Converged);
            debug!(?status, iterations = ctx.iterations, "local search stopped");
            return status;
        }
    }
}

fn generate(problem: &Problem<'_>, plan: &Plan, neighborhood: Neighborhood) -> Vec<Move> {
    let days = problem.days();
    let mut moves = Vec::new();

    match neighborhood {
        Neighborhood::TwoOpt => {
            for (day, sequence) in plan.days.iter().enumerate() {
                for from in 0..sequence.len() {
                    for to in from + 1..sequence.len() {
                        moves.push(Move::TwoOpt { day, from, to });
                    }
                }
            }
        }
        Neighborhood::Relocate => {
            for (from_day, sequence) in plan.days.iter().enumerate() {
                for (from_pos, &visit) in sequence.iter().enumerate() {
                    for to_day in (0..days).filter(|&d| problem.eligible(visit, d)) {
                        let slots = if to_day == from_day {
                            sequence.len()
                        } else {
                            plan.days[to_day].len() + 1
                        };
                        for to_pos in 0..slots {
                            if to_day == from_day && to_pos == from_pos {
                                continue;
                            }
                            moves.push(Move::Relocate {
                                from_day,
                                from_pos,
                                to_day,
                                to_pos,
                            });
                        }
                    }
                }
            }
        }
        Neighborhood::Swap => {
            for day_a in 0..days {
                for day_b in day_a + 1..days {
                    for (pos_a, &a) in plan.days[day_a].iter().enumerate() {
                        if !problem.eligible(a, day_b) {
                            continue;
                        }
                        for (pos_b, &b) in plan.days[day_b].iter().enumerate() {
                            if problem.eligible(b, day_a) {
                                moves.push(Move::Swap {
                                    day_a,
                                    pos_a,
                                    day_b,
                                    pos_b,
                                });
                            }
                        }
                    }
                }
            }
        }
        Neighborhood::Exchange => {
            let served = plan.served(problem.registry.visits.len());
            for visit in problem.registry.visits.iter().filter(|v| served[v.id].is_none()) {
                for day in (0..days).filter(|&d| problem.eligible(visit.id, d)) {
                    for pos in 0..=plan.days[day].len() {
                        moves.push(Move::Insert {
                            visit: visit.id,
                            day,
                            pos,
                        });
                    }
                    for pos in 0..plan.days[day].len() {
                        moves.push(Move::Replace {
                            visit: visit.id,
                            day,
                            pos,
                        });
                    }
                }
            }
            for (day, sequence) in plan.days.iter().enumerate() {
                for pos in 0..sequence.len() {
                    moves.push(Move::Remove { day, pos });
                }
            }
        }
        Neighborhood::Chain => {
            let served = plan.served(problem.registry.visits.len());
            for visit in problem.registry.visits.iter().filter(|v| served[v.id].is_none()) {
                for day in (0..days).filter(|&d| problem.eligible(visit.id, d)) {
                    for (from_day, sequence) in plan.days.iter().enumerate() {
                        if from_day == day {
                            continue;
                        }
                        for (from_pos, &companion) in sequence.iter().enumerate() {
                            if visit.partner == Some(companion)
                                || !problem.eligible(companion, day)
                            {
                                continue;
                            }
                            for pos in 0..=plan.days[day].len() {
                                for before in [true, false] {
                                    moves.push(Move::InsertWith {
                                        visit: visit.id,
                                        day,
                                        pos,
                                        from_day,
                                        from_pos,
                                        before,
                                    });
                                }
                            }
                        }
                    }
                }
            }
        }
    }

    moves
}

/// Days touched by a move, as edited copies of the plan's sequences.
struct Edit<'p> {
    plan: &'p Plan,
    days: Vec<(usize, Vec<usize>)>,
}

impl<'p> Edit<'p> {
    fn new(plan: &'p Plan) -> Self {
        Self { plan, days: Vec::new() }
    }

    fn day(&mut self, day: usize) -> &mut Vec<usize> {
        let index = match self.days.iter().position(|(d, _)| *d == day) {
            Some(index) => index,
            None => {
                self.days.push((day, self.plan.days[day].clone()));
                self.days.len() - 1
            }
        };
        &mut self.days[index].1
    }

    fn remove_visit(&mut self, day: usize, visit: usize) {
        let sequence = self.day(day);
        if let Some(pos) = sequence.iter().position(|&v| v == visit) {
            sequence.remove(pos);
        }
    }
}

fn evaluate(
    problem: &Problem<'_>,
    plan: &Plan,
    served: &[Option<usize>],
    mv: &Move,
) -> Option<Candidate> {
    let mut edit = Edit::new(plan);
    let mut new_served: Option<Vec<Option<usize>>> = None;

    match *mv {
        Move::TwoOpt { day, from, to } => {
            edit.day(day)[from..=to].reverse();
        }
        Move::Relocate {
            from_day,
            from_pos,
            to_day,
            to_pos,
        } => {
            let visit = edit.day(from_day).remove(from_pos);
            edit.day(to_day).insert(to_pos, visit);
        }
        Move::Swap {
            day_a,
            pos_a,
            day_b,
            pos_b,
        } => {
            let a = plan.days[day_a][pos_a];
            let b = plan.days[day_b][pos_b];
            edit.day(day_a)[pos_a] = b;
            edit.day(day_b)[pos_b] = a;
        }
        Move::Insert { visit, day, pos } => {
            let mut next = served.to_vec();
            edit.day(day).insert(pos, visit);
            next[visit] = Some(day);
            if let Some(partner) = problem.registry.get(visit).partner {
                if let Some(partner_day) = served[partner] {
                    edit.remove_visit(partner_day, partner);
                    next[partner] = None;
                }
            }
            new_served = Some(next);
        }
        Move::Replace { visit, day, pos } => {
            let mut next = served.to_vec();
            let replaced = plan.days[day][pos];
            edit.day(day)[pos] = visit;
            next[replaced] = None;
            next[visit] = Some(day);
            if let Some(partner) = problem.registry.get(visit).partner {
                if let Some(partner_day) = served[partner] {
                    if partner != replaced {
                        edit.remove_visit(partner_day, partner);
                    }
                    next[partner] = None;
                }
            }
            new_served = Some(next);
        }
        Move::Remove { day, pos } => {
            let removed = plan.days[day][pos];
            let mut next = served.to_vec();
            edit.day(day).remove(pos);
            next[removed] = None;
            new_served = Some(next);
        }
        Move::InsertWith {
            visit,
            day,
            pos,
            from_day,
            from_pos,
            before,
        } => {
            let mut next = served.to_vec();
            let companion = edit.day(from_day).remove(from_pos);
            let (first, second) = if before { (companion, visit) } else { (visit, companion) };
            let sequence = edit.day(day);
            sequence.insert(pos, second);
            sequence.insert(pos, first);
            next[visit] = Some(day);
            next[companion] = Some(day);
            if let Some(partner) = problem.registry.get(visit).partner {
                if let Some(partner_day) = served[partner] {
                    edit.remove_visit(partner_day, partner);
                    next[partner] = None;
                }
            }
            new_served = Some(next);
        }
    }

    let mut cost = plan.cost;
    let mut changes = Vec::with_capacity(edit.days.len());
    for (day, sequence) in edit.days {
        let timing = problem.time_day(day, &sequence)?;
        cost += timing.cost - plan.day_cost(day);
        changes.push((day, sequence, timing));
    }
    if let Some(next) = new_served {
        cost += problem.registry.skip_total(&next) - problem.registry.skip_total(served);
    }

    Some(Candidate { cost, changes })
}
