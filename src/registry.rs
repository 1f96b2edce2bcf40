//! Visit registry: every client visit the solver may schedule in one run.
//!
//! Day-boundary transits and breaks are not registered here; they belong
//! to each day's frame and are placed by the evaluator.

use std::collections::HashMap;

use crate::catalog::Catalog;
use crate::config::SolveOptions;
use crate::constraints::keep_penalty;
use crate::matrix::TravelTable;

#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) enum VisitKind {
    /// Ordinary call on a client, any eligible day.
    Call { client: usize },
    /// The pre-scheduled variant of a client call.
    Appointment { client: usize },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum DayAffinity {
    Any,
    Pinned(usize),
}

/// A client visit, served at most once or skipped at `skip_cost`.
#[derive(Debug, Clone)]
pub(crate) struct Visit {
    pub(crate) id: usize,
    pub(crate) kind: VisitKind,
    pub(crate) location: Option<usize>,
    pub(crate) duration: i32,
    /// Allowed service start.
    pub(crate) window: Option<(i32, i32)>,
    pub(crate) affinity: DayAffinity,
    pub(crate) region: Option<usize>,
    pub(crate) skip_cost: f64,
    /// The other variant of the same client; at most one of the two is served.
    pub(crate) partner: Option<usize>,
}

impl Visit {
    pub(crate) fn client(&self) -> usize {
        match self.kind {
            VisitKind::Call { client } | VisitKind::Appointment { client } => client,
        }
    }
}

#[derive(Debug, Clone)]
pub(crate) struct VisitRegistry {
    pub(crate) visits: Vec<Visit>,
    /// Catalog client indices left out by the priority cutoff.
    pub(crate) excluded: Vec<usize>,
}

impl VisitRegistry {
    pub(crate) fn build(catalog: &Catalog, table: &TravelTable, options: &SolveOptions) -> Self {
        let mut visits = Vec::new();
        let mut excluded = Vec::new();
        let mut call_of: HashMap<usize, usize> = HashMap::new();

        for (index, client) in catalog.clients.iter().enumerate() {
            let booked = catalog.appointment_for(&client.id).is_some();
            if let Some(cutoff) = options.priority_cutoff {
                if !booked && client.priority <= cutoff {
                    excluded.push(index);
                    continue;
                }
            }

            let region = catalog
                .hubs
                .iter()
                .position(|rule| rule.clients.contains(&client.id));
            let id = visits.len();
            call_of.insert(index, id);
            visits.push(Visit {
                id,
                kind: VisitKind::Call { client: index },
                location: table.index_of(&client.location),
                duration: client.service_duration,
                window: None,
                affinity: DayAffinity::Any,
                region,
                skip_cost: client.priority,
                partner: None,
            });
        }

        for appt in &catalog.appointments {
            let Some(index) = catalog.clients.iter().position(|c| c.id == appt.client) else {
                continue;
            };
            let Some(&call) = call_of.get(&index) else {
                continue;
            };
            let client = &catalog.clients[index];
            let id = visits.len();
            let region = visits[call].region;
            visits[call].partner = Some(id);
            visits.push(Visit {
                id,
                kind: VisitKind::Appointment { client: index },
                location: table.index_of(&client.location),
                duration: client.service_duration,
                window: Some(appt.window),
                affinity: DayAffinity::Pinned(appt.day),
                region,
                skip_cost: keep_penalty(appt, client, options),
                partner: Some(call),
            });
        }

        Self { visits, excluded }
    }

    pub(crate) fn get(&self, id: usize) -> &Visit {
        &self.visits[id]
    }

    pub(crate) fn for_client(&self, client: usize) -> impl Iterator<Item = &Visit> {
        self.visits.iter().filter(move |visit| visit.client() == client)
    }

    /// Serving visit `id` (and dropping its partner if served) lowers the
    /// skip costs by this much.
    pub(crate) fn reward(&self, id: usize, partner_served: bool) -> f64 {
        let visit = self.get(id);
        match (visit.kind, visit.partner) {
            (VisitKind::Appointment { .. }, Some(call)) if !partner_served => {
                visit.skip_cost + self.get(call).skip_cost
            }
            (VisitKind::Call { .. }, Some(appt)) if partner_served => -self.get(appt).skip_cost,
            _ => visit.skip_cost,
        }
    }

    /// Total skip cost of a served set, with a call's cost waived while its
    /// appointment variant is served.
    pub(crate) fn skip_total(&self, served: &[Option<usize>]) -> f64 {
        self.visits
            .iter()
            .filter(|visit| served[visit.id].is_none())
            .filter(|visit| match (visit.kind, visit.partner) {
                (VisitKind::Call { .. }, Some(appt)) => served[appt].is_none(),
                _ => true,
            })
            .map(|visit| visit.skip_cost)
            .sum()
    }
}
