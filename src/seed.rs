use chrono::{DateTime, Duration, DurationRound, Utc};
use uuid::Uuid;

use crate::error::StoreError;
use crate::models::{NewSession, Slot, WeeklyAvailability};
use crate::store::SessionStore;

pub struct SeedPlayer {
    pub id: &'static str,
    pub display_name: &'static str,
    pub email: &'static str,
    pub slots: &'static [&'static str],
}

pub static PLAYERS: [SeedPlayer; 3] = [
    SeedPlayer {
        id: "3d7f5d6f-24f7-4e8e-8b4b-3e7e44b4a7b2",
        display_name: "Avery Lee",
        email: "avery.lee@example.com",
        slots: &["weekend-evening", "weekend-afternoon"],
    },
    SeedPlayer {
        id: "0c22f1f1-9184-4fd4-9b21-28c68a6a89dc",
        display_name: "Jules Moreno",
        email: "jules.moreno@example.com",
        slots: &["weekday-evening"],
    },
    SeedPlayer {
        id: "d5a0a1a2-2a3c-44c2-8f73-60b7897a9dd2",
        display_name: "Kiara Patel",
        email: "kiara.patel@example.com",
        slots: &[],
    },
];

impl SeedPlayer {
    pub fn uuid(&self) -> Result<Uuid, uuid::Error> {
        Uuid::parse_str(self.id)
    }

    pub fn availability(&self) -> Result<WeeklyAvailability, uuid::Error> {
        let slots: Vec<Slot> = self
            .slots
            .iter()
            .filter_map(|label| Slot::from_label(label))
            .collect();
        Ok(WeeklyAvailability::from_slots(self.uuid()?, &slots, None))
    }
}

pub struct SeedSession {
    pub source_key: &'static str,
    pub host_email: &'static str,
    pub session: NewSession,
}

/// Sessions spread over the next two weeks, anchored on the day of `now`.
pub fn sessions(now: DateTime<Utc>) -> Result<Vec<SeedSession>, uuid::Error> {
    let midnight = now
        .duration_trunc(Duration::days(1))
        .unwrap_or(now);
    let at = |days: i64, hour: i64| midnight + Duration::days(days) + Duration::hours(hour);

    let host = |index: usize| -> Result<(Uuid, String), uuid::Error> {
        let player = &PLAYERS[index];
        Ok((player.uuid()?, player.display_name.to_string()))
    };

    let plan = [
        ("seed-001", 0, "Lantern Keep campaign", "Dungeons & Dragons 5e", "Dice & Dragons, back room", 2, 19, 4, 3, 6),
        ("seed-002", 1, "Lunchtime Catan", "Catan", "Library annex", 3, 12, 2, 3, 4),
        ("seed-003", 2, "Gloomhaven scenario 12", "Gloomhaven", "Kiara's flat", 5, 10, 5, 2, 4),
        ("seed-004", 0, "Wingspan teach", "Wingspan", "Dice & Dragons, front tables", 9, 18, 3, 1, 5),
        ("seed-005", 1, "Blood on the Clocktower", "Blood on the Clocktower", "Community hall", 12, 20, 3, 5, 12),
    ];

    let mut seeds = Vec::with_capacity(plan.len());
    for (source_key, host_index, title, game, location, day, hour, hours, min, max) in plan {
        let (host_id, host_name) = host(host_index)?;
        let start_time = at(day, hour);
        seeds.push(SeedSession {
            source_key,
            host_email: PLAYERS[host_index].email,
            session: NewSession {
                title: title.to_string(),
                game: game.to_string(),
                host_id,
                host_name,
                location: location.to_string(),
                start_time,
                end_time: start_time + Duration::hours(hours),
                min_players: min,
                max_players: max,
            },
        });
    }
    Ok(seeds)
}

/// Loads the seed players' availability and sessions into any store.
pub async fn populate<S: SessionStore>(store: &S, now: DateTime<Utc>) -> anyhow::Result<usize> {
    for player in PLAYERS.iter() {
        store.upsert_availability(&player.availability()?).await?;
    }

    let mut created = 0usize;
    for seed in sessions(now)? {
        match store.create_session(seed.session).await {
            Ok(_) => created += 1,
            Err(StoreError::InvalidSession(reason)) => {
                tracing::warn!(source_key = seed.source_key, %reason, "skipping seed session");
            }
            Err(err) => return Err(err.into()),
        }
    }
    Ok(created)
}

#[cfg(test)]
mod tests {
    use super::*;

    use crate::store::MemoryStore;

    #[test]
    fn seed_sessions_are_valid_and_upcoming() {
        let now = Utc::now();
        let seeds = sessions(now).unwrap();
        assert_eq!(seeds.len(), 5);
        for seed in seeds {
            assert!(seed.session.validate().is_ok(), "{}", seed.source_key);
            assert!(seed.session.start_time > now, "{}", seed.source_key);
        }
    }

    #[tokio::test]
    async fn populate_fills_memory_store() {
        let store = MemoryStore::new();
        let now = Utc::now();
        let created = populate(&store, now).await.unwrap();
        assert_eq!(created, 5);

        let avery = PLAYERS[0].uuid().unwrap();
        let availability = store.get_availability(avery).await.unwrap().unwrap();
        assert!(availability.weekend_evening);
        assert!(!availability.weekday_morning);

        // Kiara's record exists even though every slot is false.
        let kiara = PLAYERS[2].uuid().unwrap();
        assert!(store.get_availability(kiara).await.unwrap().is_some());

        assert_eq!(store.upcoming_sessions(now).await.unwrap().len(), 5);
    }
}
