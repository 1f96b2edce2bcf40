//! Day timing: turns one day's visit sequence into concrete times.
//!
//! Times propagate forward from the day start:
//! arrival = previous departure + leg, service starts at
//! max(arrival, window open), departure = service start + duration.
//! The break is placed in whichever gap gives the shortest feasible day, and
//! the day start is then pushed as late as waits allow.

use crate::config::SolveOptions;
use crate::constraints::{DayFrame, Leg, TransitKind};
use crate::matrix::TravelTable;
use crate::registry::Visit;

#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) enum StopItem {
    Transit(TransitKind),
    Visit(usize),
    Break,
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct TimedStop {
    pub(crate) item: StopItem,
    pub(crate) location: usize,
    pub(crate) leg: Leg,
    /// Leg duration into this stop.
    pub(crate) travel: i32,
    pub(crate) arrival: i32,
    pub(crate) time_in: i32,
    pub(crate) time_out: i32,
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct DayTiming {
    pub(crate) stops: Vec<TimedStop>,
    pub(crate) start: i32,
    pub(crate) end: i32,
    pub(crate) drive_time: i32,
    pub(crate) air_time: i32,
    pub(crate) service_time: i32,
    pub(crate) cost: f64,
}

impl DayTiming {
    pub(crate) fn span(&self) -> i32 {
        self.end - self.start
    }
}

struct Item {
    item: StopItem,
    location: Option<usize>,
    leg: Leg,
    duration: i32,
    window: Option<(i32, i32)>,
}

struct Pass {
    stops: Vec<TimedStop>,
    end: i32,
    drive_time: i32,
    air_time: i32,
    service_time: i32,
    total_wait: i32,
    longest_wait: i32,
    /// Largest start delay that keeps every timed stop inside its window.
    delay_cap: i32,
}

/// Time one day. `None` when the sequence cannot be worked that day.
pub(crate) fn compute_schedule(
    frame: &DayFrame,
    visits: &[&Visit],
    table: &TravelTable,
    options: &SolveOptions,
) -> Option<DayTiming> {
    let items = build_items(frame, visits);
    if items.len() < 2 {
        return None;
    }

    let gaps = std::iter::once(None).chain((0..items.len() - 1).map(Some));
    let mut best: Option<Pass> = None;

    for gap in gaps {
        let Some(pass) = settle(frame, &items, gap, table, options) else {
            continue;
        };
        let start = pass.stops[0].time_in;
        // Without a break the day must be over before the break window opens.
        if gap.is_none() && pass.end > frame.break_window.0 {
            continue;
        }
        if pass.end > frame.latest_end || pass.end - start > frame.max_span {
            continue;
        }
        let shorter = match &best {
            Some(current) => pass.end - start < current.end - current.stops[0].time_in,
            None => true,
        };
        if shorter {
            best = Some(pass);
        }
    }

    let pass = best?;
    let start = pass.stops[0].time_in;
    let cost = options.travel_cost(pass.drive_time)
        + options.overrun_cost(pass.end - start, frame.desired_span);

    Some(DayTiming {
        stops: pass.stops,
        start,
        end: pass.end,
        drive_time: pass.drive_time,
        air_time: pass.air_time,
        service_time: pass.service_time,
        cost,
    })
}

fn build_items(frame: &DayFrame, visits: &[&Visit]) -> Vec<Item> {
    let mut items = Vec::with_capacity(frame.prefix.len() + visits.len() + frame.suffix.len());
    for waypoint in &frame.prefix {
        items.push(Item {
            item: StopItem::Transit(waypoint.kind),
            location: Some(waypoint.location),
            leg: waypoint.leg,
            duration: 0,
            window: None,
        });
    }
    for visit in visits {
        items.push(Item {
            item: StopItem::Visit(visit.id),
            location: visit.location,
            leg: Leg::Drive,
            duration: visit.duration,
            window: visit.window,
        });
    }
    for waypoint in &frame.suffix {
        items.push(Item {
            item: StopItem::Transit(waypoint.kind),
            location: Some(waypoint.location),
            leg: waypoint.leg,
            duration: 0,
            window: None,
        });
    }
    items
}

/// Run the day from its earliest start, then again from the latest start
/// that removes idle waiting without breaking a window.
fn settle(
    frame: &DayFrame,
    items: &[Item],
    gap: Option<usize>,
    table: &TravelTable,
    options: &SolveOptions,
) -> Option<Pass> {
    let (earliest, latest) = frame.start_window;
    let first = forward(frame, items, gap, earliest, table)?;

    let delay = (latest - earliest).min(first.total_wait).min(first.delay_cap).max(0);
    let pass = if delay > 0 {
        forward(frame, items, gap, earliest + delay, table).unwrap_or(first)
    } else {
        first
    };

    match options.max_waiting_time {
        Some(limit) if pass.longest_wait > limit => None,
        _ => Some(pass),
    }
}

fn forward(
    frame: &DayFrame,
    items: &[Item],
    gap: Option<usize>,
    start: i32,
    table: &TravelTable,
) -> Option<Pass> {
    let mut stops = Vec::with_capacity(items.len() + 1);
    let mut time = start;
    let mut previous = items[0].location.unwrap_or(0);
    let mut drive_time = 0;
    let mut air_time = 0;
    let mut service_time = 0;
    let mut total_wait = 0;
    let mut longest_wait = 0;
    let mut delay_cap = i32::MAX;

    for (index, item) in items.iter().enumerate() {
        let location = item.location.unwrap_or(previous);
        let travel = match item.leg {
            Leg::Stay => 0,
            Leg::Drive => table.travel(previous, location),
            Leg::Air(duration) => duration,
        };
        match item.leg {
            Leg::Drive => drive_time += travel,
            Leg::Air(_) => air_time += travel,
            Leg::Stay => {}
        }

        let arrival = time + travel;
        let time_in = match item.window {
            Some((open, close)) => {
                let time_in = arrival.max(open);
                if time_in > close {
                    return None;
                }
                let wait = time_in - arrival;
                total_wait += wait;
                longest_wait = longest_wait.max(wait);
                delay_cap = delay_cap.min((close - time_in).saturating_add(total_wait));
                time_in
            }
            None => arrival,
        };
        let time_out = time_in + item.duration;
        if let StopItem::Visit(_) = item.item {
            service_time += item.duration;
        }
        stops.push(TimedStop {
            item: item.item,
            location,
            leg: item.leg,
            travel,
            arrival,
            time_in,
            time_out,
        });
        time = time_out;
        previous = location;

        if gap == Some(index) {
            let (open, close) = frame.break_window;
            let time_in = time.max(open);
            if time_in > close {
                return None;
            }
            let wait = time_in - time;
            total_wait += wait;
            longest_wait = longest_wait.max(wait);
            delay_cap = delay_cap.min((close - time_in).saturating_add(total_wait));
            let time_out = time_in + frame.break_duration;
            stops.push(TimedStop {
                item: StopItem::Break,
                location: previous,
                leg: Leg::Stay,
                travel: 0,
                arrival: time,
                time_in,
                time_out,
            });
            time = time_out;
        }
    }

    Some(Pass {
        stops,
        end: time,
        drive_time,
        air_time,
        service_time,
        total_wait,
        longest_wait,
        delay_cap,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{Catalog, HubRule, HubTransit, Location, LocationId, LocationKind};
    use crate::constraints::ConstraintModel;
    use crate::matrix::DenseMatrix;
    use crate::registry::{DayAffinity, VisitKind};

    const HOUR: i32 = 3600;
    const MINUTE: i32 = 60;

    /// Base at x=0, clients c1..c4 at x=1..4, hub at x=20; 30 minutes per unit.
    fn setup() -> (Catalog, TravelTable) {
        let mut catalog = Catalog::new(Location::new("base", LocationKind::Base, (0.0, 0.0)));
        for i in 1..=4 {
            catalog.locations.push(Location::new(
                format!("c{}", i),
                LocationKind::Client,
                (i as f64, 0.0),
            ));
        }
        catalog
            .locations
            .push(Location::new("hub", LocationKind::Hub, (20.0, 0.0)));
        let ids: Vec<LocationId> = catalog.locations.iter().map(|l| l.id.clone()).collect();
        let xs: Vec<f64> = catalog.locations.iter().map(|l| l.coordinates.0).collect();
        let matrix = DenseMatrix::new(
            ids,
            xs.iter()
                .map(|a| xs.iter().map(|b| ((a - b).abs() * 30.0 * 60.0) as i32).collect())
                .collect(),
        );
        let table = TravelTable::build(&catalog, &matrix).unwrap();
        (catalog, table)
    }

    fn visit(id: usize, location: usize, duration: i32, window: Option<(i32, i32)>) -> Visit {
        Visit {
            id,
            kind: VisitKind::Call { client: id },
            location: Some(location),
            duration,
            window,
            affinity: DayAffinity::Any,
            region: None,
            skip_cost: 1.0,
            partner: None,
        }
    }

    fn monday(catalog: &Catalog, table: &TravelTable, options: &SolveOptions) -> DayFrame {
        ConstraintModel::build(catalog, table, options).frames[0].clone()
    }

    #[test]
    fn test_empty_day() {
        let (catalog, table) = setup();
        let options = SolveOptions::default();
        let frame = monday(&catalog, &table, &options);

        let timing = compute_schedule(&frame, &[], &table, &options).unwrap();
        assert_eq!(timing.stops.len(), 2);
        assert_eq!(timing.span(), 0);
        assert_eq!(timing.cost, 0.0);
    }

    #[test]
    fn test_arrival_follows_departure_and_travel() {
        let (catalog, table) = setup();
        let options = SolveOptions::default();
        let frame = monday(&catalog, &table, &options);
        let a = visit(0, 1, 30 * MINUTE, None);
        let b = visit(1, 3, 30 * MINUTE, None);

        let timing = compute_schedule(&frame, &[&a, &b], &table, &options).unwrap();
        for pair in timing.stops.windows(2) {
            let travel = if pair[1].leg == Leg::Drive {
                table.travel(pair[0].location, pair[1].location)
            } else {
                pair[1].travel
            };
            assert!(pair[1].arrival >= pair[0].time_out + travel);
        }
        // 30 + 30 + 60 + 30 + 90 minutes, back at noon so no break
        assert_eq!(timing.span(), 240 * MINUTE);
        assert_eq!(timing.drive_time, 180 * MINUTE);
        assert_eq!(timing.service_time, 60 * MINUTE);
        assert!((timing.cost - 12.0).abs() < 1e-9);
    }

    #[test]
    fn test_start_is_delayed_to_absorb_waiting() {
        let (catalog, table) = setup();
        let options = SolveOptions::default();
        let frame = monday(&catalog, &table, &options);
        let appt = visit(0, 1, 30 * MINUTE, Some((10 * HOUR, 10 * HOUR)));

        let timing = compute_schedule(&frame, &[&appt], &table, &options).unwrap();
        assert_eq!(timing.start, 9 * HOUR);
        assert_eq!(timing.stops[1].time_in, 10 * HOUR);
        assert_eq!(timing.stops[1].arrival, 9 * HOUR + 30 * MINUTE);
    }

    #[test]
    fn test_open_ended_windows() {
        let (catalog, table) = setup();
        let options = SolveOptions::default();
        let mut frame = monday(&catalog, &table, &options);
        let appt = visit(0, 1, 30 * MINUTE, Some((10 * HOUR, i32::MAX)));

        let timing = compute_schedule(&frame, &[&appt], &table, &options).unwrap();
        assert_eq!(timing.start, 9 * HOUR);
        assert_eq!(timing.stops[1].time_in, 10 * HOUR);

        frame.break_window.1 = i32::MAX;
        let visits: Vec<Visit> = (0..3).map(|i| visit(i, i + 1, 90 * MINUTE, None)).collect();
        let refs: Vec<&Visit> = visits.iter().collect();
        let timing = compute_schedule(&frame, &refs, &table, &options).unwrap();
        let breaks = timing.stops.iter().filter(|stop| stop.item == StopItem::Break).count();
        assert_eq!(breaks, 1);
    }

    #[test]
    fn test_waiting_beyond_limit_is_infeasible() {
        let (catalog, table) = setup();
        let options = SolveOptions::default();
        let frame = monday(&catalog, &table, &options);
        let appt = visit(0, 1, 30 * MINUTE, Some((11 * HOUR, 11 * HOUR)));

        // Latest start 9:00, arrival 9:30, waiting 90 minutes.
        assert!(compute_schedule(&frame, &[&appt], &table, &options).is_none());

        let relaxed = SolveOptions {
            max_waiting_time: None,
            ..SolveOptions::default()
        };
        assert!(compute_schedule(&frame, &[&appt], &table, &relaxed).is_some());
    }

    #[test]
    fn test_missed_window_is_infeasible() {
        let (catalog, table) = setup();
        let options = SolveOptions::default();
        let frame = monday(&catalog, &table, &options);
        let early = visit(0, 4, 30 * MINUTE, Some((8 * HOUR, 9 * HOUR)));
        let late = visit(1, 1, 30 * MINUTE, Some((8 * HOUR, 8 * HOUR + 45 * MINUTE)));

        assert!(compute_schedule(&frame, &[&early, &late], &table, &options).is_none());
    }

    #[test]
    fn test_long_day_gets_one_break_in_window() {
        let (catalog, table) = setup();
        let options = SolveOptions::default();
        let frame = monday(&catalog, &table, &options);
        let visits: Vec<Visit> = (0..3).map(|i| visit(i, i + 1, 90 * MINUTE, None)).collect();
        let refs: Vec<&Visit> = visits.iter().collect();

        let timing = compute_schedule(&frame, &refs, &table, &options).unwrap();
        let breaks: Vec<&TimedStop> = timing
            .stops
            .iter()
            .filter(|stop| stop.item == StopItem::Break)
            .collect();
        assert_eq!(breaks.len(), 1);
        assert!(breaks[0].time_in >= frame.break_window.0);
        assert!(breaks[0].time_in <= frame.break_window.1);
        assert_eq!(breaks[0].time_out - breaks[0].time_in, frame.break_duration);
    }

    #[test]
    fn test_short_day_skips_break() {
        let (catalog, table) = setup();
        let options = SolveOptions::default();
        let frame = monday(&catalog, &table, &options);
        let a = visit(0, 1, HOUR, None);

        let timing = compute_schedule(&frame, &[&a], &table, &options).unwrap();
        assert!(timing.stops.iter().all(|stop| stop.item != StopItem::Break));
    }

    #[test]
    fn test_desired_duration_is_hard_without_overrun() {
        let (catalog, table) = setup();
        let options = SolveOptions::default();
        let frame = monday(&catalog, &table, &options);
        let visits: Vec<Visit> = (0..4).map(|i| visit(i, i + 1, 90 * MINUTE, None)).collect();
        let refs: Vec<&Visit> = visits.iter().collect();

        assert!(compute_schedule(&frame, &refs, &table, &options).is_none());

        let lenient = SolveOptions {
            overrun: Some(crate::config::OverrunPolicy {
                allowance: 2 * HOUR,
                penalty_per_hour: 10.0,
            }),
            ..SolveOptions::default()
        };
        let frame = monday(&catalog, &table, &lenient);
        let timing = compute_schedule(&frame, &refs, &table, &lenient).unwrap();
        assert!(timing.span() > frame.desired_span);
        assert!(timing.span() <= frame.desired_span + 2 * HOUR);
        assert!(timing.cost > lenient.travel_cost(timing.drive_time));
    }

    #[test]
    fn test_air_leg_is_not_drive_time() {
        let (mut catalog, _) = setup();
        catalog.hubs.push(HubRule {
            hub: LocationId::new("hub"),
            transit: HubTransit::Air { duration: HOUR },
            days: vec![0],
            clients: vec![],
        });
        let (_, table) = setup();
        let options = SolveOptions::default();
        let frame = monday(&catalog, &table, &options);

        let timing = compute_schedule(&frame, &[], &table, &options).unwrap();
        assert_eq!(timing.air_time, 2 * HOUR);
        assert_eq!(timing.drive_time, 0);
        assert_eq!(timing.span(), 2 * HOUR);
    }
}
