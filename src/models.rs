use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DayClass {
    Weekday,
    Weekend,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TimeOfDay {
    Morning,
    Afternoon,
    Evening,
}

/// One of the six recurring weekly slots a player can mark as available.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Slot {
    pub day: DayClass,
    pub time: TimeOfDay,
}

impl Slot {
    pub const ALL: [Slot; 6] = [
        Slot::new(DayClass::Weekday, TimeOfDay::Morning),
        Slot::new(DayClass::Weekday, TimeOfDay::Afternoon),
        Slot::new(DayClass::Weekday, TimeOfDay::Evening),
        Slot::new(DayClass::Weekend, TimeOfDay::Morning),
        Slot::new(DayClass::Weekend, TimeOfDay::Afternoon),
        Slot::new(DayClass::Weekend, TimeOfDay::Evening),
    ];

    pub const fn new(day: DayClass, time: TimeOfDay) -> Self {
        Self { day, time }
    }

    pub fn label(&self) -> &'static str {
        match (self.day, self.time) {
            (DayClass::Weekday, TimeOfDay::Morning) => "weekday-morning",
            (DayClass::Weekday, TimeOfDay::Afternoon) => "weekday-afternoon",
            (DayClass::Weekday, TimeOfDay::Evening) => "weekday-evening",
            (DayClass::Weekend, TimeOfDay::Morning) => "weekend-morning",
            (DayClass::Weekend, TimeOfDay::Afternoon) => "weekend-afternoon",
            (DayClass::Weekend, TimeOfDay::Evening) => "weekend-evening",
        }
    }

    pub fn from_label(label: &str) -> Option<Self> {
        Slot::ALL.into_iter().find(|slot| slot.label() == label)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WeeklyAvailability {
    pub user_id: Uuid,
    pub weekday_morning: bool,
    pub weekday_afternoon: bool,
    pub weekday_evening: bool,
    pub weekend_morning: bool,
    pub weekend_afternoon: bool,
    pub weekend_evening: bool,
    pub notes: Option<String>,
}

impl WeeklyAvailability {
    pub fn from_slots(user_id: Uuid, slots: &[Slot], notes: Option<String>) -> Self {
        let mut availability = WeeklyAvailability {
            user_id,
            notes,
            ..Default::default()
        };
        for slot in slots {
            *availability.flag_mut(*slot) = true;
        }
        availability
    }

    pub fn is_available(&self, slot: Slot) -> bool {
        match (slot.day, slot.time) {
            (DayClass::Weekday, TimeOfDay::Morning) => self.weekday_morning,
            (DayClass::Weekday, TimeOfDay::Afternoon) => self.weekday_afternoon,
            (DayClass::Weekday, TimeOfDay::Evening) => self.weekday_evening,
            (DayClass::Weekend, TimeOfDay::Morning) => self.weekend_morning,
            (DayClass::Weekend, TimeOfDay::Afternoon) => self.weekend_afternoon,
            (DayClass::Weekend, TimeOfDay::Evening) => self.weekend_evening,
        }
    }

    fn flag_mut(&mut self, slot: Slot) -> &mut bool {
        match (slot.day, slot.time) {
            (DayClass::Weekday, TimeOfDay::Morning) => &mut self.weekday_morning,
            (DayClass::Weekday, TimeOfDay::Afternoon) => &mut self.weekday_afternoon,
            (DayClass::Weekday, TimeOfDay::Evening) => &mut self.weekday_evening,
            (DayClass::Weekend, TimeOfDay::Morning) => &mut self.weekend_morning,
            (DayClass::Weekend, TimeOfDay::Afternoon) => &mut self.weekend_afternoon,
            (DayClass::Weekend, TimeOfDay::Evening) => &mut self.weekend_evening,
        }
    }

    pub fn slots(&self) -> Vec<Slot> {
        Slot::ALL
            .into_iter()
            .filter(|slot| self.is_available(*slot))
            .collect()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    pub id: Uuid,
    pub title: String,
    pub game: String,
    pub host_id: Uuid,
    pub host_name: String,
    pub location: String,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub min_players: i32,
    pub max_players: i32,
    pub current_players: i32,
}

impl Session {
    pub fn spots_available(&self) -> i32 {
        self.max_players - self.current_players
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct NewSession {
    pub title: String,
    pub game: String,
    pub host_id: Uuid,
    pub host_name: String,
    pub location: String,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub min_players: i32,
    pub max_players: i32,
}

impl NewSession {
    /// Checks the invariants a stored session must hold.
    pub fn validate(&self) -> Result<(), String> {
        if self.start_time >= self.end_time {
            return Err(format!(
                "start time {} is not before end time {}",
                self.start_time, self.end_time
            ));
        }
        if self.min_players < 1 {
            return Err("a session needs at least one player".to_string());
        }
        if self.min_players > self.max_players {
            return Err(format!(
                "min players {} exceeds max players {}",
                self.min_players, self.max_players
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionScore {
    pub time_fit: u8,
    pub capacity: u8,
    pub near_term: u8,
}

impl SessionScore {
    pub fn total(&self) -> u8 {
        self.time_fit + self.capacity + self.near_term
    }
}

#[derive(Debug, Clone)]
pub struct ScoredSession {
    pub session: Session,
    pub slot: Slot,
    pub score: SessionScore,
}
