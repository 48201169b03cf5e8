use std::fmt::Write;

use chrono::{DateTime, FixedOffset, Utc};

use crate::matching;
use crate::models::{Session, Slot, WeeklyAvailability};

#[derive(Debug, Clone)]
pub struct SlotSummary {
    pub slot: Slot,
    pub count: usize,
    pub open_spots: i32,
}

pub fn summarize_by_slot(
    sessions: &[Session],
    now: DateTime<Utc>,
    offset: FixedOffset,
) -> Vec<SlotSummary> {
    let mut map: std::collections::HashMap<Slot, (usize, i32)> = std::collections::HashMap::new();

    for session in sessions.iter().filter(|session| session.start_time > now) {
        let entry = map
            .entry(matching::classify(session.start_time, offset))
            .or_insert((0, 0));
        entry.0 += 1;
        entry.1 += session.spots_available().max(0);
    }

    // Slot::ALL order keeps the section stable between runs.
    Slot::ALL
        .into_iter()
        .filter_map(|slot| {
            map.get(&slot).map(|(count, open_spots)| SlotSummary {
                slot,
                count: *count,
                open_spots: *open_spots,
            })
        })
        .collect()
}

pub fn build_report(
    user_label: &str,
    availability: Option<&WeeklyAvailability>,
    sessions: &[Session],
    now: DateTime<Utc>,
    offset: FixedOffset,
    limit: usize,
) -> String {
    let summaries = summarize_by_slot(sessions, now, offset);

    let mut output = String::new();

    let _ = writeln!(output, "# Session Recommendations");
    let _ = writeln!(
        output,
        "Generated for {} at {}",
        user_label,
        now.with_timezone(&offset).format("%Y-%m-%d %H:%M %:z")
    );
    let _ = writeln!(output);
    let _ = writeln!(output, "## Availability");

    match availability {
        None => {
            let _ = writeln!(
                output,
                "No availability on file; sessions are listed by start time."
            );
        }
        Some(availability) => {
            let slots = availability.slots();
            if slots.is_empty() {
                let _ = writeln!(output, "No slots marked available.");
            } else {
                let labels: Vec<&str> = slots.iter().map(|slot| slot.label()).collect();
                let _ = writeln!(output, "Available: {}", labels.join(", "));
            }
            if let Some(notes) = availability.notes.as_deref() {
                let _ = writeln!(output, "Notes: {notes}");
            }
        }
    }

    let _ = writeln!(output);
    let _ = writeln!(output, "## Upcoming Slot Mix");

    if summaries.is_empty() {
        let _ = writeln!(output, "No upcoming sessions.");
    } else {
        for summary in summaries.iter() {
            let _ = writeln!(
                output,
                "- {}: {} sessions ({} open spots)",
                summary.slot.label(),
                summary.count,
                summary.open_spots
            );
        }
    }

    let _ = writeln!(output);
    let _ = writeln!(output, "## Best Matches");

    match availability {
        None => {
            let upcoming = matching::upcoming_chronological(sessions, now);
            if upcoming.is_empty() {
                let _ = writeln!(output, "No upcoming sessions.");
            }
            for session in upcoming.iter().take(limit) {
                let _ = writeln!(output, "- {}", describe(session, offset));
            }
        }
        Some(availability) => {
            let scored = matching::score_sessions(availability, sessions, now, offset);
            if scored.is_empty() {
                let _ = writeln!(output, "No upcoming sessions.");
            }
            for entry in scored.iter().take(limit) {
                let _ = writeln!(
                    output,
                    "- {} [{}] score {} (time {}, capacity {}, soon {})",
                    describe(&entry.session, offset),
                    entry.slot.label(),
                    entry.score.total(),
                    entry.score.time_fit,
                    entry.score.capacity,
                    entry.score.near_term
                );
            }
        }
    }

    output
}

fn describe(session: &Session, offset: FixedOffset) -> String {
    format!(
        "{} ({}, hosted by {}) at {} on {}, {}/{} players",
        session.title,
        session.game,
        session.host_name,
        session.location,
        session.start_time.with_timezone(&offset).format("%a %Y-%m-%d %H:%M"),
        session.current_players,
        session.max_players
    )
}
