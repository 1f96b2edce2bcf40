//! Test fixtures for weekly-planner.
//!
//! Territories are laid out on a grid around the base at (0, 0) and travel
//! times come from a Manhattan matrix, so every expected time can be worked
//! out by hand.

#![allow(dead_code)]

use std::collections::HashSet;

use weekly_planner::{
    Catalog, Client, ClientId, DayStatus, DenseMatrix, HotelStay, HubRule, HubTransit, Leg,
    Location, LocationId, LocationKind, PrescheduledAppointment, Schedule, SolveOptions, StopKind,
    TravelMatrix, WorkdaySpec,
};

pub fn hours(h: i32) -> i32 {
    h * 3600
}

pub fn minutes(m: i32) -> i32 {
    m * 60
}

/// Builder for test clients with sensible defaults.
#[derive(Clone, Debug)]
pub struct TestClient {
    id: String,
    position: (f64, f64),
    priority: f64,
    duration_min: i32,
}

impl TestClient {
    pub fn new(id: &str) -> Self {
        Self {
            id: id.to_string(),
            position: (1.0, 0.0),
            priority: 10.0,
            duration_min: 30,
        }
    }

    pub fn at(mut self, x: f64, y: f64) -> Self {
        self.position = (x, y);
        self
    }

    pub fn priority(mut self, priority: f64) -> Self {
        self.priority = priority;
        self
    }

    pub fn duration(mut self, minutes: i32) -> Self {
        self.duration_min = minutes;
        self
    }
}

/// Builder for a one-agent territory.
pub struct Territory {
    catalog: Catalog,
    minutes_per_unit: f64,
}

impl Territory {
    pub fn new() -> Self {
        Self {
            catalog: Catalog::new(Location::new("base", LocationKind::Base, (0.0, 0.0))),
            minutes_per_unit: 10.0,
        }
    }

    pub fn minutes_per_unit(mut self, minutes: f64) -> Self {
        self.minutes_per_unit = minutes;
        self
    }

    pub fn client(mut self, client: TestClient) -> Self {
        self.catalog
            .locations
            .push(Location::new(client.id.clone(), LocationKind::Client, client.position));
        self.catalog.clients.push(Client {
            id: ClientId::new(client.id.clone()),
            location: LocationId::new(client.id),
            priority: client.priority,
            service_duration: minutes(client.duration_min),
        });
        self
    }

    pub fn appointment(mut self, client: &str, day: usize, window: (i32, i32)) -> Self {
        self.catalog.appointments.push(PrescheduledAppointment {
            client: ClientId::new(client),
            day,
            window,
            keep_penalty: None,
        });
        self
    }

    pub fn appointment_with_penalty(
        mut self,
        client: &str,
        day: usize,
        window: (i32, i32),
        penalty: f64,
    ) -> Self {
        self.catalog.appointments.push(PrescheduledAppointment {
            client: ClientId::new(client),
            day,
            window,
            keep_penalty: Some(penalty),
        });
        self
    }

    pub fn hub(
        mut self,
        id: &str,
        position: (f64, f64),
        transit: HubTransit,
        days: &[usize],
        clients: &[&str],
    ) -> Self {
        self.catalog
            .locations
            .push(Location::new(id, LocationKind::Hub, position));
        self.catalog.hubs.push(HubRule {
            hub: LocationId::new(id),
            transit,
            days: days.to_vec(),
            clients: clients.iter().map(|c| ClientId::new(*c)).collect(),
        });
        self
    }

    pub fn hotel(mut self, id: &str, position: (f64, f64), night: usize) -> Self {
        if self.catalog.location(&LocationId::new(id)).is_none() {
            self.catalog
                .locations
                .push(Location::new(id, LocationKind::Hotel, position));
        }
        self.catalog.hotels.push(HotelStay {
            hotel: LocationId::new(id),
            night,
        });
        self
    }

    pub fn day(mut self, day: usize, edit: impl FnOnce(&mut WorkdaySpec)) -> Self {
        edit(&mut self.catalog.days[day]);
        self
    }

    pub fn build(self) -> (Catalog, DenseMatrix) {
        let matrix = manhattan(&self.catalog, self.minutes_per_unit);
        (self.catalog, matrix)
    }
}

/// Manhattan distance matrix: one grid unit takes `minutes_per_unit`.
pub fn manhattan(catalog: &Catalog, minutes_per_unit: f64) -> DenseMatrix {
    let ids: Vec<LocationId> = catalog.locations.iter().map(|l| l.id.clone()).collect();
    let durations = catalog
        .locations
        .iter()
        .map(|from| {
            catalog
                .locations
                .iter()
                .map(|to| {
                    let dist = (from.coordinates.0 - to.coordinates.0).abs()
                        + (from.coordinates.1 - to.coordinates.1).abs();
                    (dist * minutes_per_unit * 60.0).round() as i32
                })
                .collect()
        })
        .collect();
    DenseMatrix::new(ids, durations)
}

pub fn quick_options() -> SolveOptions {
    SolveOptions {
        local_search_iterations: 200,
        time_limit_ms: Some(5000),
        ..SolveOptions::default()
    }
}

/// Day on which `client` was served, if any.
pub fn served_day(schedule: &Schedule, client: &str) -> Option<usize> {
    schedule
        .routes
        .iter()
        .find(|route| {
            route
                .stops
                .iter()
                .any(|stop| stop.kind.client().is_some_and(|c| c.0 == client))
        })
        .map(|route| route.day)
}

/// Route and schedule properties every solve must satisfy.
pub fn assert_schedule_invariants(
    schedule: &Schedule,
    catalog: &Catalog,
    matrix: &DenseMatrix,
    options: &SolveOptions,
) {
    let mut seen: HashSet<&ClientId> = HashSet::new();

    for route in &schedule.routes {
        if route.status == DayStatus::Closed {
            assert!(route.stops.is_empty(), "closed day {} has stops", route.day);
            continue;
        }
        let spec = &catalog.days[route.day];

        for pair in route.stops.windows(2) {
            let (a, b) = (&pair[0], &pair[1]);
            let travel = match b.leg {
                Leg::Stay => 0,
                Leg::Drive => matrix.duration(&a.location, &b.location).unwrap(),
                Leg::Air(duration) => duration,
            };
            assert!(
                b.arrival >= a.time_out + travel,
                "day {}: arrival at {} before departure from {} plus travel",
                route.day,
                b.location,
                a.location
            );
            assert!(b.time_in >= b.arrival);
        }

        let breaks: Vec<_> = route.stops.iter().filter(|s| s.kind == StopKind::Break).collect();
        assert!(breaks.len() <= 1, "day {} has {} breaks", route.day, breaks.len());
        let window = (
            spec.earliest_start.saturating_add(spec.break_after.0),
            spec.earliest_start.saturating_add(spec.break_after.1),
        );
        if route.end > window.0 {
            assert_eq!(
                breaks.len(),
                1,
                "day {} runs past the break window without a break",
                route.day
            );
        }
        for brk in breaks {
            assert_eq!(brk.time_out - brk.time_in, spec.break_duration);
            assert!(brk.time_in >= window.0 && brk.time_in <= window.1);
        }

        assert!(route.start >= spec.earliest_start && route.start <= spec.latest_start);
        assert!(route.end <= spec.latest_end);
        let allowance = options.overrun.map_or(0, |policy| policy.allowance);
        assert!(route.work_time <= spec.desired_duration.saturating_add(allowance));

        for stop in &route.stops {
            if let Some(client) = stop.kind.client() {
                assert!(seen.insert(client), "{} served twice", client);
            }
        }
    }

    for report in &schedule.appointments {
        if report.outcome == weekly_planner::AppointmentOutcome::Kept {
            match report.state {
                weekly_planner::VisitState::Served { day, time_in, .. } => {
                    assert_eq!(day, report.day);
                    assert!(time_in >= report.window.0 && time_in <= report.window.1);
                }
                _ => panic!("kept appointment for {} was not served", report.client),
            }
        }
        assert_ne!(report.outcome, weekly_planner::AppointmentOutcome::Dropped);
    }
}
