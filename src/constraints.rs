//! Constraint model: workday rules, transits and appointments turned into
//! numeric per-day frames the solver can evaluate routes against.

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::catalog::{Catalog, Client, HubTransit, LocationId, PrescheduledAppointment, WorkdaySpec};
use crate::config::SolveOptions;
use crate::evaluate::compute_schedule;
use crate::matrix::TravelTable;

/// How a stop is reached from the one before it.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum Leg {
    /// No movement: the first stop of a day, or a break.
    Stay,
    /// Road travel taken from the travel matrix.
    Drive,
    /// Flight with a fixed duration.
    Air(i32),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TransitKind {
    DepartBase,
    ReturnBase,
    HubArrival,
    HubDeparture,
    HotelDeparture,
    HotelArrival,
}

/// A mandatory day-boundary stop.
#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) struct Waypoint {
    pub(crate) kind: TransitKind,
    pub(crate) location: usize,
    pub(crate) leg: Leg,
}

/// A problem with one day that does not stop the rest of the week.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum DayIssue {
    /// The workday rules contradict themselves.
    Misconfigured { day: usize, reason: String },
    /// The mandatory transits and break do not fit the workday.
    Infeasible { day: usize, reason: String },
    /// An overnight stay was dropped because one of its two days is closed.
    HotelStayDissolved { night: usize, hotel: LocationId },
}

impl DayIssue {
    pub fn day(&self) -> usize {
        match self {
            DayIssue::Misconfigured { day, .. } | DayIssue::Infeasible { day, .. } => *day,
            DayIssue::HotelStayDissolved { night, .. } => *night,
        }
    }
}

/// Everything the evaluator needs to know about one planning day.
#[derive(Debug, Clone)]
pub(crate) struct DayFrame {
    pub(crate) day: usize,
    pub(crate) open: bool,
    pub(crate) start_window: (i32, i32),
    pub(crate) latest_end: i32,
    pub(crate) desired_span: i32,
    pub(crate) max_span: i32,
    /// Absolute break start window.
    pub(crate) break_window: (i32, i32),
    pub(crate) break_duration: i32,
    pub(crate) prefix: Vec<Waypoint>,
    pub(crate) suffix: Vec<Waypoint>,
    /// Hub rule whose region this day works, if any.
    pub(crate) region: Option<usize>,
}

/// An overnight stay whose two transits were placed in adjacent frames.
#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) struct HotelLink {
    pub(crate) night: usize,
    pub(crate) hotel: usize,
}

#[derive(Debug, Clone)]
pub(crate) struct ConstraintModel {
    pub(crate) frames: Vec<DayFrame>,
    pub(crate) hotel_links: Vec<HotelLink>,
    pub(crate) issues: Vec<DayIssue>,
}

impl ConstraintModel {
    /// Assumes a validated catalog.
    pub(crate) fn build(catalog: &Catalog, table: &TravelTable, options: &SolveOptions) -> Self {
        let mut nights: Vec<(usize, usize)> = catalog
            .hotels
            .iter()
            .filter_map(|stay| table.index_of(&stay.hotel).map(|hotel| (stay.night, hotel)))
            .collect();
        nights.sort_unstable();
        let mut dissolved = Vec::new();

        loop {
            let (frames, issues) = build_frames(catalog, table, options, &nights);

            let broken = nights
                .iter()
                .position(|&(night, _)| !frames[night].open || !frames[night + 1].open);

            match broken {
                Some(pos) => {
                    let (night, hotel) = nights.remove(pos);
                    let hotel = catalog.locations[hotel].id.clone();
                    warn!(night, hotel = %hotel, "dissolving hotel stay next to a closed day");
                    dissolved.push(DayIssue::HotelStayDissolved { night, hotel });
                }
                None => {
                    let mut issues = issues;
                    issues.extend(dissolved);
                    for issue in &issues {
                        warn!(day = issue.day(), ?issue, "day issue");
                    }
                    let hotel_links = nights
                        .into_iter()
                        .map(|(night, hotel)| HotelLink { night, hotel })
                        .collect();
                    return Self {
                        frames,
                        hotel_links,
                        issues,
                    };
                }
            }
        }
    }
}

fn build_frames(
    catalog: &Catalog,
    table: &TravelTable,
    options: &SolveOptions,
    nights: &[(usize, usize)],
) -> (Vec<DayFrame>, Vec<DayIssue>) {
    let base = table.index_of(&catalog.base).unwrap_or(0);
    let mut frames = Vec::with_capacity(catalog.days.len());
    let mut issues = Vec::new();

    for (day, spec) in catalog.days.iter().enumerate() {
        let region = catalog.hubs.iter().position(|rule| rule.days.contains(&day));
        let hub = region.and_then(|r| {
            let rule = &catalog.hubs[r];
            table.index_of(&rule.hub).map(|location| (location, rule.transit))
        });

        let morning_hotel = nights
            .iter()
            .find(|&&(night, _)| night + 1 == day)
            .map(|&(_, hotel)| hotel);
        let evening_hotel = nights
            .iter()
            .find(|&&(night, _)| night == day)
            .map(|&(_, hotel)| hotel);

        let mut prefix = Vec::new();
        match morning_hotel {
            Some(hotel) => prefix.push(Waypoint {
                kind: TransitKind::HotelDeparture,
                location: hotel,
                leg: Leg::Stay,
            }),
            None => {
                prefix.push(Waypoint {
                    kind: TransitKind::DepartBase,
                    location: base,
                    leg: Leg::Stay,
                });
                if let Some((location, transit)) = hub {
                    prefix.push(Waypoint {
                        kind: TransitKind::HubArrival,
                        location,
                        leg: transit_leg(transit),
                    });
                }
            }
        }

        let mut suffix = Vec::new();
        match evening_hotel {
            Some(hotel) => suffix.push(Waypoint {
                kind: TransitKind::HotelArrival,
                location: hotel,
                leg: Leg::Drive,
            }),
            None => match hub {
                Some((location, transit)) => {
                    suffix.push(Waypoint {
                        kind: TransitKind::HubDeparture,
                        location,
                        leg: Leg::Drive,
                    });
                    suffix.push(Waypoint {
                        kind: TransitKind::ReturnBase,
                        location: base,
                        leg: transit_leg(transit),
                    });
                }
                None => suffix.push(Waypoint {
                    kind: TransitKind::ReturnBase,
                    location: base,
                    leg: Leg::Drive,
                }),
            },
        }

        let mut frame = DayFrame {
            day,
            open: true,
            start_window: (spec.earliest_start, spec.latest_start),
            latest_end: spec.latest_end,
            desired_span: spec.desired_duration,
            max_span: options.max_span(spec.desired_duration),
            break_window: (
                spec.earliest_start.saturating_add(spec.break_after.0),
                spec.earliest_start.saturating_add(spec.break_after.1),
            ),
            break_duration: spec.break_duration,
            prefix,
            suffix,
            region,
        };

        if let Some(reason) = contradiction(spec) {
            frame.open = false;
            issues.push(DayIssue::Misconfigured { day, reason });
        } else if compute_schedule(&frame, &[], table, options).is_none() {
            frame.open = false;
            issues.push(DayIssue::Infeasible {
                day,
                reason: "mandatory transits and break do not fit the workday".to_string(),
            });
        }

        frames.push(frame);
    }

    (frames, issues)
}

fn transit_leg(transit: HubTransit) -> Leg {
    match transit {
        HubTransit::Drive => Leg::Drive,
        HubTransit::Air { duration } => Leg::Air(duration),
    }
}

fn contradiction(spec: &WorkdaySpec) -> Option<String> {
    if spec.earliest_start > spec.latest_start {
        return Some("earliest start is after latest start".to_string());
    }
    if spec.latest_end < spec.earliest_start {
        return Some("latest end is before earliest start".to_string());
    }
    if spec.desired_duration <= 0 {
        return Some("desired duration must be positive".to_string());
    }
    if spec.break_after.0 > spec.break_after.1 {
        return Some("break window closes before it opens".to_string());
    }
    if spec.break_duration < 0 {
        return Some("negative break duration".to_string());
    }
    None
}

/// Cost of not honoring `appt`.
pub(crate) fn keep_penalty(
    appt: &PrescheduledAppointment,
    client: &Client,
    options: &SolveOptions,
) -> f64 {
    appt.keep_penalty
        .unwrap_or(client.priority + options.miss_appointment_penalty.max(0.0))
}

/// Log appointments whose keep-penalty is below an ordinary priority, which
/// lets the solver trade them for routine calls.
pub(crate) fn check_keep_penalties(catalog: &Catalog, options: &SolveOptions) {
    let top_priority = catalog
        .clients
        .iter()
        .map(|client| client.priority)
        .fold(0.0_f64, f64::max);
    for appt in &catalog.appointments {
        if let Some(client) = catalog.client(&appt.client) {
            let penalty = keep_penalty(appt, client, options);
            if penalty < top_priority {
                warn!(
                    client = %appt.client,
                    penalty,
                    top_priority,
                    "keep penalty below an ordinary priority"
                );
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{HotelStay, HubRule, Location, LocationKind};
    use crate::matrix::DenseMatrix;

    fn catalog() -> Catalog {
        let mut catalog = Catalog::new(Location::new("base", LocationKind::Base, (0.0, 0.0)));
        catalog
            .locations
            .push(Location::new("hub", LocationKind::Hub, (50.0, 0.0)));
        catalog
            .locations
            .push(Location::new("inn", LocationKind::Hotel, (51.0, 0.0)));
        catalog
    }

    fn table(catalog: &Catalog) -> TravelTable {
        let ids = catalog.locations.iter().map(|l| l.id.clone()).collect();
        let coords: Vec<(f64, f64)> = catalog.locations.iter().map(|l| l.coordinates).collect();
        let matrix = DenseMatrix::new(
            ids,
            coords
                .iter()
                .map(|a| {
                    coords
                        .iter()
                        .map(|b| (((a.0 - b.0).abs() + (a.1 - b.1).abs()) * 600.0) as i32)
                        .collect()
                })
                .collect(),
        );
        TravelTable::build(catalog, &matrix).unwrap()
    }

    #[test]
    fn test_plain_week_frames() {
        let catalog = catalog();
        let model = ConstraintModel::build(&catalog, &table(&catalog), &SolveOptions::default());
        assert_eq!(model.frames.len(), 5);
        assert!(model.issues.is_empty());
        let frame = &model.frames[0];
        assert!(frame.open);
        assert_eq!(frame.prefix[0].kind, TransitKind::DepartBase);
        assert_eq!(frame.suffix[0].kind, TransitKind::ReturnBase);
        assert_eq!(frame.break_window, (12 * 3600, 14 * 3600));
    }

    #[test]
    fn test_open_ended_break_window_saturates() {
        let mut catalog = catalog();
        catalog.days[0].break_after = (4 * 3600, i32::MAX);
        let model = ConstraintModel::build(&catalog, &table(&catalog), &SolveOptions::default());
        assert!(model.frames[0].open);
        assert_eq!(model.frames[0].break_window, (12 * 3600, i32::MAX));
    }

    #[test]
    fn test_air_hub_with_hotel_night() {
        let mut catalog = catalog();
        catalog.hubs.push(HubRule {
            hub: LocationId::new("hub"),
            transit: HubTransit::Air { duration: 3600 },
            days: vec![1, 2],
            clients: vec![],
        });
        catalog.hotels.push(HotelStay {
            hotel: LocationId::new("inn"),
            night: 1,
        });
        let model = ConstraintModel::build(&catalog, &table(&catalog), &SolveOptions::default());

        let tuesday = &model.frames[1];
        assert_eq!(tuesday.region, Some(0));
        assert_eq!(tuesday.prefix[1].kind, TransitKind::HubArrival);
        assert_eq!(tuesday.prefix[1].leg, Leg::Air(3600));
        assert_eq!(tuesday.suffix[0].kind, TransitKind::HotelArrival);

        let wednesday = &model.frames[2];
        assert_eq!(wednesday.prefix.len(), 1);
        assert_eq!(wednesday.prefix[0].kind, TransitKind::HotelDeparture);
        assert_eq!(wednesday.suffix[0].kind, TransitKind::HubDeparture);
        assert_eq!(wednesday.suffix[1].leg, Leg::Air(3600));
        assert_eq!(model.hotel_links, vec![HotelLink { night: 1, hotel: 2 }]);
    }

    #[test]
    fn test_contradictory_day_is_closed() {
        let mut catalog = catalog();
        catalog.days[3].latest_start = catalog.days[3].earliest_start - 1;
        let model = ConstraintModel::build(&catalog, &table(&catalog), &SolveOptions::default());
        assert!(!model.frames[3].open);
        assert!(model.frames[2].open);
        assert!(matches!(model.issues[0], DayIssue::Misconfigured { day: 3, .. }));
    }

    #[test]
    fn test_hotel_next_to_closed_day_dissolves() {
        let mut catalog = catalog();
        catalog.hotels.push(HotelStay {
            hotel: LocationId::new("inn"),
            night: 0,
        });
        // Monday cannot even reach the hotel and be back in time.
        catalog.days[0].latest_end = catalog.days[0].earliest_start + 60;
        let model = ConstraintModel::build(&catalog, &table(&catalog), &SolveOptions::default());

        assert!(model.hotel_links.is_empty());
        assert!(model
            .issues
            .iter()
            .any(|issue| matches!(issue, DayIssue::HotelStayDissolved { night: 0, .. })));
        assert_eq!(model.frames[1].prefix[0].kind, TransitKind::DepartBase);
    }
}
