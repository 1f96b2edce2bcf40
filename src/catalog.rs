//! Entity catalog: the read-only description of one planning week.
//!
//! Everything here is loaded and validated once, before the solver runs.

use std::collections::{HashMap, HashSet};
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::PlannerError;
use crate::traits::TravelMatrix;

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct LocationId(pub String);

impl LocationId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }
}

impl fmt::Display for LocationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ClientId(pub String);

impl ClientId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }
}

impl fmt::Display for ClientId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LocationKind {
    Base,
    Hub,
    Hotel,
    Client,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Location {
    pub id: LocationId,
    pub kind: LocationKind,
    /// Coordinates (lat, lng). Opaque to the planner, kept for renderers.
    pub coordinates: (f64, f64),
}

impl Location {
    pub fn new(id: impl Into<String>, kind: LocationKind, coordinates: (f64, f64)) -> Self {
        Self {
            id: LocationId::new(id),
            kind,
            coordinates,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Client {
    pub id: ClientId,
    pub location: LocationId,
    /// Value of visiting this client; higher is more valuable.
    pub priority: f64,
    /// Service duration in seconds.
    pub service_duration: i32,
}

/// A client call already promised for a specific day and time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PrescheduledAppointment {
    pub client: ClientId,
    pub day: usize,
    /// Allowed service start (seconds from midnight).
    pub window: (i32, i32),
    /// Cost of not honoring the appointment. Derived from the client's
    /// priority and the configured miss penalty when absent.
    pub keep_penalty: Option<f64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum HubTransit {
    /// Reached over the road; the leg is ordinary drive time.
    Drive,
    /// Reached by air in a fixed duration that is not drive time.
    Air { duration: i32 },
}

/// Access rule for a remote sub-territory served through a hub.
///
/// On each of `days` the agent works the hub's region only, and the
/// region's clients can be called on no other day.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HubRule {
    pub hub: LocationId,
    pub transit: HubTransit,
    pub days: Vec<usize>,
    pub clients: Vec<ClientId>,
}

/// An overnight stay: day `night` ends at the hotel and day `night + 1`
/// starts there.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HotelStay {
    pub hotel: LocationId,
    pub night: usize,
}

/// Workday rules, all clock values in seconds from midnight.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkdaySpec {
    pub earliest_start: i32,
    pub latest_start: i32,
    pub latest_end: i32,
    /// Desired on-duty duration (start to end, break included).
    pub desired_duration: i32,
    /// Break start window as offsets from `earliest_start`.
    pub break_after: (i32, i32),
    pub break_duration: i32,
}

impl Default for WorkdaySpec {
    fn default() -> Self {
        Self {
            earliest_start: 8 * 3600,
            latest_start: 9 * 3600,
            latest_end: 19 * 3600,
            desired_duration: 9 * 3600,
            break_after: (4 * 3600, 6 * 3600),
            break_duration: 30 * 60,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Catalog {
    pub base: LocationId,
    pub locations: Vec<Location>,
    pub clients: Vec<Client>,
    pub appointments: Vec<PrescheduledAppointment>,
    pub hubs: Vec<HubRule>,
    pub hotels: Vec<HotelStay>,
    /// One entry per planning day.
    pub days: Vec<WorkdaySpec>,
}

impl Catalog {
    /// A five-day week with default workday rules around `base`.
    pub fn new(base: Location) -> Self {
        Self {
            base: base.id.clone(),
            locations: vec![base],
            clients: Vec::new(),
            appointments: Vec::new(),
            hubs: Vec::new(),
            hotels: Vec::new(),
            days: vec![WorkdaySpec::default(); 5],
        }
    }

    pub fn location(&self, id: &LocationId) -> Option<&Location> {
        self.locations.iter().find(|location| &location.id == id)
    }

    pub fn client(&self, id: &ClientId) -> Option<&Client> {
        self.clients.iter().find(|client| &client.id == id)
    }

    pub fn appointment_for(&self, client: &ClientId) -> Option<&PrescheduledAppointment> {
        self.appointments.iter().find(|appt| &appt.client == client)
    }

    /// Check referential integrity and travel-time coverage.
    ///
    /// Workday bounds are not checked here: a contradictory day is reported
    /// per day by the constraint model while the other days still solve.
    pub fn validate<M: TravelMatrix>(&self, matrix: &M) -> Result<(), PlannerError> {
        if self.days.is_empty() {
            return Err(PlannerError::NoPlanningDays);
        }

        let mut kinds: HashMap<&LocationId, LocationKind> = HashMap::new();
        for location in &self.locations {
            if kinds.insert(&location.id, location.kind).is_some() {
                return Err(PlannerError::DuplicateId(location.id.0.clone()));
            }
        }

        match kinds.get(&self.base) {
            Some(LocationKind::Base) => {}
            Some(_) => {
                return Err(PlannerError::InvalidEntity {
                    entity: format!("base {}", self.base),
                    reason: "location is not of kind Base".to_string(),
                });
            }
            None => {
                return Err(PlannerError::UnknownLocation {
                    entity: "base".to_string(),
                    location: self.base.clone(),
                });
            }
        }

        let mut client_ids: HashSet<&ClientId> = HashSet::new();
        for client in &self.clients {
            if !client_ids.insert(&client.id) {
                return Err(PlannerError::DuplicateId(client.id.0.clone()));
            }
            if !kinds.contains_key(&client.location) {
                return Err(PlannerError::UnknownLocation {
                    entity: format!("client {}", client.id),
                    location: client.location.clone(),
                });
            }
            if !client.priority.is_finite() || client.priority < 0.0 {
                return Err(PlannerError::InvalidEntity {
                    entity: format!("client {}", client.id),
                    reason: format!("priority {} must be a non-negative number", client.priority),
                });
            }
            if client.service_duration < 0 {
                return Err(PlannerError::InvalidEntity {
                    entity: format!("client {}", client.id),
                    reason: "negative service duration".to_string(),
                });
            }
        }

        let mut booked: HashSet<&ClientId> = HashSet::new();
        for appt in &self.appointments {
            let context = format!("appointment for {}", appt.client);
            if !client_ids.contains(&appt.client) {
                return Err(PlannerError::UnknownClient {
                    context,
                    client: appt.client.clone(),
                });
            }
            if !booked.insert(&appt.client) {
                return Err(PlannerError::DuplicateId(context));
            }
            if appt.day >= self.days.len() {
                return Err(PlannerError::InvalidDay { context, day: appt.day });
            }
            if appt.window.0 > appt.window.1 {
                return Err(PlannerError::InvalidEntity {
                    entity: context,
                    reason: "window starts after it ends".to_string(),
                });
            }
            if let Some(penalty) = appt.keep_penalty {
                if !penalty.is_finite() || penalty < 0.0 {
                    return Err(PlannerError::InvalidEntity {
                        entity: context,
                        reason: format!("keep penalty {} must be a non-negative number", penalty),
                    });
                }
            }
        }

        let mut hub_days: HashSet<usize> = HashSet::new();
        let mut regional: HashSet<&ClientId> = HashSet::new();
        for rule in &self.hubs {
            let context = format!("hub {}", rule.hub);
            match kinds.get(&rule.hub) {
                Some(LocationKind::Hub) => {}
                Some(_) => {
                    return Err(PlannerError::InvalidEntity {
                        entity: context,
                        reason: "location is not of kind Hub".to_string(),
                    });
                }
                None => {
                    return Err(PlannerError::UnknownLocation {
                        entity: context,
                        location: rule.hub.clone(),
                    });
                }
            }
            if let HubTransit::Air { duration } = rule.transit {
                if duration < 0 {
                    return Err(PlannerError::InvalidEntity {
                        entity: context,
                        reason: "negative air transit duration".to_string(),
                    });
                }
            }
            for &day in &rule.days {
                if day >= self.days.len() {
                    return Err(PlannerError::InvalidDay { context, day });
                }
                if !hub_days.insert(day) {
                    return Err(PlannerError::InvalidEntity {
                        entity: context,
                        reason: format!("day {} already belongs to another hub", day),
                    });
                }
            }
            for client in &rule.clients {
                if !client_ids.contains(client) {
                    return Err(PlannerError::UnknownClient {
                        context,
                        client: client.clone(),
                    });
                }
                if !regional.insert(client) {
                    return Err(PlannerError::InvalidEntity {
                        entity: format!("client {}", client),
                        reason: "assigned to more than one hub region".to_string(),
                    });
                }
            }
        }

        let mut nights: HashSet<usize> = HashSet::new();
        for stay in &self.hotels {
            let context = format!("hotel {}", stay.hotel);
            match kinds.get(&stay.hotel) {
                Some(LocationKind::Hotel) => {}
                Some(_) => {
                    return Err(PlannerError::InvalidEntity {
                        entity: context,
                        reason: "location is not of kind Hotel".to_string(),
                    });
                }
                None => {
                    return Err(PlannerError::UnknownLocation {
                        entity: context,
                        location: stay.hotel.clone(),
                    });
                }
            }
            if stay.night + 1 >= self.days.len() {
                return Err(PlannerError::InvalidDay { context, day: stay.night + 1 });
            }
            if !nights.insert(stay.night) {
                return Err(PlannerError::InvalidEntity {
                    entity: context,
                    reason: format!("night {} already has a hotel", stay.night),
                });
            }
        }

        for from in &self.locations {
            for to in &self.locations {
                match matrix.duration(&from.id, &to.id) {
                    Some(duration) if duration >= 0 => {}
                    _ => {
                        return Err(PlannerError::MissingTravelTime {
                            from: from.id.clone(),
                            to: to.id.clone(),
                        });
                    }
                }
            }
        }

        Ok(())
    }
}
