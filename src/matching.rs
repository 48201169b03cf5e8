use chrono::{DateTime, Datelike, Duration, FixedOffset, Timelike, Utc, Weekday};
use tracing::debug;
use uuid::Uuid;

use crate::error::StoreError;
use crate::models::{
    DayClass, ScoredSession, Session, SessionScore, Slot, TimeOfDay, WeeklyAvailability,
};
use crate::store::SessionStore;

pub const TIME_FIT_POINTS: u8 = 3;
pub const CAPACITY_CAP: i32 = 3;
pub const NEAR_TERM_POINTS: u8 = 2;
pub const NEAR_TERM_WINDOW_DAYS: i64 = 7;

/// Maps a start time to its weekly slot, using the local `offset`.
pub fn classify(start: DateTime<Utc>, offset: FixedOffset) -> Slot {
    let local = start.with_timezone(&offset);
    let day = match local.weekday() {
        Weekday::Sat | Weekday::Sun => DayClass::Weekend,
        _ => DayClass::Weekday,
    };
    let time = match local.hour() {
        0..=11 => TimeOfDay::Morning,
        12..=16 => TimeOfDay::Afternoon,
        _ => TimeOfDay::Evening,
    };
    Slot::new(day, time)
}

pub fn capacity_points(spots_available: i32) -> u8 {
    spots_available.clamp(0, CAPACITY_CAP) as u8
}

pub fn near_term_points(start: DateTime<Utc>, now: DateTime<Utc>) -> u8 {
    let lead = start - now;
    if lead > Duration::zero() && lead < Duration::days(NEAR_TERM_WINDOW_DAYS) {
        NEAR_TERM_POINTS
    } else {
        0
    }
}

pub fn score_session(
    session: &Session,
    availability: &WeeklyAvailability,
    now: DateTime<Utc>,
    offset: FixedOffset,
) -> ScoredSession {
    let slot = classify(session.start_time, offset);
    let time_fit = if availability.is_available(slot) {
        TIME_FIT_POINTS
    } else {
        0
    };

    ScoredSession {
        session: session.clone(),
        slot,
        score: SessionScore {
            time_fit,
            capacity: capacity_points(session.spots_available()),
            near_term: near_term_points(session.start_time, now),
        },
    }
}

/// Scores every upcoming session, best fit first. Equal scores fall back to
/// the earlier start time, then the session id.
pub fn score_sessions(
    availability: &WeeklyAvailability,
    sessions: &[Session],
    now: DateTime<Utc>,
    offset: FixedOffset,
) -> Vec<ScoredSession> {
    let mut scored: Vec<ScoredSession> = sessions
        .iter()
        .filter(|session| session.start_time > now)
        .map(|session| score_session(session, availability, now, offset))
        .collect();

    scored.sort_by(|a, b| {
        b.score
            .total()
            .cmp(&a.score.total())
            .then_with(|| a.session.start_time.cmp(&b.session.start_time))
            .then_with(|| a.session.id.cmp(&b.session.id))
    });
    scored
}

pub fn upcoming_chronological(sessions: &[Session], now: DateTime<Utc>) -> Vec<Session> {
    let mut upcoming: Vec<Session> = sessions
        .iter()
        .filter(|session| session.start_time > now)
        .cloned()
        .collect();
    upcoming.sort_by(|a, b| {
        a.start_time
            .cmp(&b.start_time)
            .then_with(|| a.id.cmp(&b.id))
    });
    upcoming
}

pub fn rank_sessions(
    availability: Option<&WeeklyAvailability>,
    sessions: &[Session],
    now: DateTime<Utc>,
    offset: FixedOffset,
) -> Vec<Session> {
    match availability {
        None => upcoming_chronological(sessions, now),
        Some(availability) => score_sessions(availability, sessions, now, offset)
            .into_iter()
            .map(|scored| scored.session)
            .collect(),
    }
}

pub async fn rank_for_user<S: SessionStore>(
    store: &S,
    user_id: Uuid,
    now: DateTime<Utc>,
    offset: FixedOffset,
) -> Result<Vec<Session>, StoreError> {
    let availability = store.get_availability(user_id).await?;
    let sessions = store.upcoming_sessions(now).await?;

    debug!(
        %user_id,
        candidates = sessions.len(),
        has_availability = availability.is_some(),
        "ranking sessions"
    );

    Ok(rank_sessions(availability.as_ref(), &sessions, now, offset))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn utc() -> FixedOffset {
        FixedOffset::east_opt(0).unwrap()
    }

    fn at(day: u32, hour: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, day, hour, 0, 0).unwrap()
    }

    // Wednesday 2026-03-04 12:00 UTC.
    fn now() -> DateTime<Utc> {
        at(4, 12)
    }

    fn sample_session(start_time: DateTime<Utc>, current: i32, max: i32) -> Session {
        Session {
            id: Uuid::new_v4(),
            title: "Friday night one-shot".to_string(),
            game: "Blades in the Dark".to_string(),
            host_id: Uuid::new_v4(),
            host_name: "Rowan Hale".to_string(),
            location: "Back room, Dice & Dragons".to_string(),
            start_time,
            end_time: start_time + Duration::hours(3),
            min_players: 2,
            max_players: max,
            current_players: current,
        }
    }

    fn weekend_evenings() -> WeeklyAvailability {
        WeeklyAvailability {
            user_id: Uuid::new_v4(),
            weekend_evening: true,
            ..Default::default()
        }
    }

    #[test]
    fn calendar_fixture_is_what_the_tests_assume() {
        assert_eq!(now().weekday(), Weekday::Wed);
        assert_eq!(at(7, 0).weekday(), Weekday::Sat);
        assert_eq!(at(10, 0).weekday(), Weekday::Tue);
    }

    #[test]
    fn hour_buckets_split_at_noon_and_five() {
        let offset = utc();
        assert_eq!(classify(at(4, 0), offset).time, TimeOfDay::Morning);
        assert_eq!(classify(at(4, 11), offset).time, TimeOfDay::Morning);
        assert_eq!(classify(at(4, 12), offset).time, TimeOfDay::Afternoon);
        assert_eq!(classify(at(4, 16), offset).time, TimeOfDay::Afternoon);
        assert_eq!(classify(at(4, 17), offset).time, TimeOfDay::Evening);
        assert_eq!(classify(at(4, 23), offset).time, TimeOfDay::Evening);
    }

    #[test]
    fn classification_uses_local_offset() {
        // 23:00 UTC on Friday is Saturday morning at UTC+2.
        let offset = FixedOffset::east_opt(2 * 3600).unwrap();
        let slot = classify(at(6, 23), offset);
        assert_eq!(slot, Slot::new(DayClass::Weekend, TimeOfDay::Morning));
        assert_eq!(
            classify(at(6, 23), utc()),
            Slot::new(DayClass::Weekday, TimeOfDay::Evening)
        );
    }

    #[test]
    fn exactly_one_slot_earns_time_fit() {
        for hour in 0..24 {
            for day in [4, 7] {
                let session = sample_session(at(day, hour), 5, 5);
                let slot = classify(session.start_time, utc());
                let mut hits = 0;
                for candidate in Slot::ALL {
                    let availability =
                        WeeklyAvailability::from_slots(Uuid::new_v4(), &[candidate], None);
                    let scored = score_session(&session, &availability, now(), utc());
                    if scored.score.time_fit == TIME_FIT_POINTS {
                        hits += 1;
                        assert_eq!(candidate, slot);
                    }
                }
                assert_eq!(hits, 1, "day {day} hour {hour}");
            }
        }
    }

    #[test]
    fn capacity_term_plateaus_at_three_and_floors_at_zero() {
        assert_eq!(capacity_points(-2), 0);
        assert_eq!(capacity_points(0), 0);
        assert_eq!(capacity_points(1), 1);
        assert_eq!(capacity_points(2), 2);
        assert_eq!(capacity_points(3), 3);
        assert_eq!(capacity_points(8), 3);
    }

    #[test]
    fn near_term_window_is_exclusive_on_both_ends() {
        let now = now();
        assert_eq!(near_term_points(now, now), 0);
        assert_eq!(near_term_points(now + Duration::seconds(1), now), 2);
        assert_eq!(
            near_term_points(now + Duration::days(7) - Duration::seconds(1), now),
            2
        );
        assert_eq!(near_term_points(now + Duration::days(7), now), 0);
        assert_eq!(near_term_points(now + Duration::days(12), now), 0);
    }

    #[test]
    fn weekend_evening_player_prefers_saturday_game() {
        let saturday = sample_session(at(7, 19), 2, 5);
        let tuesday = sample_session(at(10, 19), 2, 5);
        let availability = weekend_evenings();

        let scored = score_sessions(
            &availability,
            &[tuesday.clone(), saturday.clone()],
            now(),
            utc(),
        );
        assert_eq!(scored[0].session.id, saturday.id);
        assert_eq!(scored[0].score.total(), 8);
        assert_eq!(scored[1].session.id, tuesday.id);
        assert_eq!(scored[1].score.total(), 5);
    }

    #[test]
    fn full_session_gets_no_capacity_points() {
        let full = sample_session(at(7, 19), 5, 5);
        let scored = score_session(&full, &weekend_evenings(), now(), utc());
        assert_eq!(
            scored.score,
            SessionScore {
                time_fit: 3,
                capacity: 0,
                near_term: 2
            }
        );
    }

    #[test]
    fn overfull_session_does_not_go_negative() {
        let overfull = sample_session(at(7, 19), 7, 5);
        let scored = score_session(&overfull, &weekend_evenings(), now(), utc());
        assert_eq!(scored.score.total(), 5);
    }

    #[test]
    fn all_false_availability_still_scores() {
        let availability = WeeklyAvailability {
            user_id: Uuid::new_v4(),
            ..Default::default()
        };
        let session = sample_session(at(6, 10), 2, 5);
        let scored = score_sessions(&availability, &[session], now(), utc());
        assert_eq!(scored.len(), 1);
        assert_eq!(scored[0].score.total(), 5);
    }

    #[test]
    fn missing_availability_falls_back_to_start_order() {
        let later = sample_session(at(20, 9), 1, 6);
        let past = sample_session(at(1, 18), 1, 6);
        let sooner = sample_session(at(5, 19), 5, 6);
        let at_now = sample_session(now(), 1, 6);
        let sessions = vec![later.clone(), past, sooner.clone(), at_now];

        let ranked = rank_sessions(None, &sessions, now(), utc());
        let ids: Vec<Uuid> = ranked.iter().map(|s| s.id).collect();
        assert_eq!(ids, vec![sooner.id, later.id]);
    }

    #[test]
    fn past_sessions_never_ranked() {
        let past = sample_session(at(3, 19), 0, 6);
        let at_now = sample_session(now(), 0, 6);
        let ahead = sample_session(at(14, 19), 4, 6);
        let ranked = rank_sessions(
            Some(&weekend_evenings()),
            &[past, at_now, ahead.clone()],
            now(),
            utc(),
        );
        assert_eq!(ranked.len(), 1);
        assert_eq!(ranked[0].id, ahead.id);
    }

    #[test]
    fn ties_break_on_start_time() {
        // Both weekday mornings beyond the near-term window: 0 + 3 + 0.
        let later = sample_session(at(13, 10), 2, 5);
        let earlier = sample_session(at(12, 10), 2, 5);
        let ranked = rank_sessions(
            Some(&weekend_evenings()),
            &[later.clone(), earlier.clone()],
            now(),
            utc(),
        );
        assert_eq!(ranked[0].id, earlier.id);
        assert_eq!(ranked[1].id, later.id);
    }

    #[test]
    fn ranking_leaves_inputs_untouched() {
        let availability = weekend_evenings();
        let sessions = vec![
            sample_session(at(7, 19), 2, 5),
            sample_session(at(2, 19), 2, 5),
            sample_session(at(9, 8), 4, 4),
        ];
        let availability_before = availability.clone();
        let sessions_before = sessions.clone();

        let _ = rank_sessions(Some(&availability), &sessions, now(), utc());
        let _ = rank_sessions(None, &sessions, now(), utc());

        assert_eq!(availability, availability_before);
        assert_eq!(sessions, sessions_before);
    }
}
