//! Storage contract for sessions, availability and participation.
//!
//! `MemoryStore` keeps everything in maps behind an async lock; the
//! PostgreSQL implementation lives in `db`.

use std::collections::{HashMap, HashSet};
use std::future::Future;

use chrono::{DateTime, Utc};
use tokio::sync::RwLock;
use tracing::info;
use uuid::Uuid;

use crate::error::StoreError;
use crate::models::{NewSession, Session, WeeklyAvailability};

pub trait SessionStore: Send + Sync {
    /// Returns the user's availability, or `None` if they never submitted one.
    fn get_availability(
        &self,
        user_id: Uuid,
    ) -> impl Future<Output = Result<Option<WeeklyAvailability>, StoreError>> + Send;

    /// Inserts or replaces the user's availability.
    fn upsert_availability(
        &self,
        availability: &WeeklyAvailability,
    ) -> impl Future<Output = Result<(), StoreError>> + Send;

    /// Sessions starting strictly after `now`, earliest first.
    fn upcoming_sessions(
        &self,
        now: DateTime<Utc>,
    ) -> impl Future<Output = Result<Vec<Session>, StoreError>> + Send;

    fn get_session(
        &self,
        session_id: Uuid,
    ) -> impl Future<Output = Result<Option<Session>, StoreError>> + Send;

    /// Creates a session with its host as the first player.
    fn create_session(
        &self,
        new_session: NewSession,
    ) -> impl Future<Output = Result<Session, StoreError>> + Send;

    fn join_session(
        &self,
        session_id: Uuid,
        player_id: Uuid,
    ) -> impl Future<Output = Result<Session, StoreError>> + Send;

    fn leave_session(
        &self,
        session_id: Uuid,
        player_id: Uuid,
    ) -> impl Future<Output = Result<Session, StoreError>> + Send;
}

#[derive(Default)]
struct MemoryState {
    availability: HashMap<Uuid, WeeklyAvailability>,
    sessions: HashMap<Uuid, Session>,
    participants: HashSet<(Uuid, Uuid)>,
}

#[derive(Default)]
pub struct MemoryStore {
    state: RwLock<MemoryState>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl SessionStore for MemoryStore {
    async fn get_availability(
        &self,
        user_id: Uuid,
    ) -> Result<Option<WeeklyAvailability>, StoreError> {
        Ok(self.state.read().await.availability.get(&user_id).cloned())
    }

    async fn upsert_availability(
        &self,
        availability: &WeeklyAvailability,
    ) -> Result<(), StoreError> {
        self.state
            .write()
            .await
            .availability
            .insert(availability.user_id, availability.clone());
        Ok(())
    }

    async fn upcoming_sessions(&self, now: DateTime<Utc>) -> Result<Vec<Session>, StoreError> {
        let state = self.state.read().await;
        let mut sessions: Vec<Session> = state
            .sessions
            .values()
            .filter(|session| session.start_time > now)
            .cloned()
            .collect();
        sessions.sort_by(|a, b| a.start_time.cmp(&b.start_time));
        Ok(sessions)
    }

    async fn get_session(&self, session_id: Uuid) -> Result<Option<Session>, StoreError> {
        Ok(self.state.read().await.sessions.get(&session_id).cloned())
    }

    async fn create_session(&self, new_session: NewSession) -> Result<Session, StoreError> {
        new_session.validate().map_err(StoreError::InvalidSession)?;

        let session = Session {
            id: Uuid::new_v4(),
            title: new_session.title,
            game: new_session.game,
            host_id: new_session.host_id,
            host_name: new_session.host_name,
            location: new_session.location,
            start_time: new_session.start_time,
            end_time: new_session.end_time,
            min_players: new_session.min_players,
            max_players: new_session.max_players,
            current_players: 1,
        };

        let mut state = self.state.write().await;
        state.participants.insert((session.id, session.host_id));
        state.sessions.insert(session.id, session.clone());
        info!(session_id = %session.id, title = %session.title, "session created");
        Ok(session)
    }

    async fn join_session(&self, session_id: Uuid, player_id: Uuid) -> Result<Session, StoreError> {
        let mut state = self.state.write().await;
        let MemoryState {
            sessions,
            participants,
            ..
        } = &mut *state;

        let session = sessions
            .get_mut(&session_id)
            .ok_or(StoreError::SessionNotFound(session_id))?;
        if participants.contains(&(session_id, player_id)) {
            return Err(StoreError::AlreadyJoined {
                session_id,
                player_id,
            });
        }
        if session.spots_available() <= 0 {
            return Err(StoreError::SessionFull(session_id));
        }

        participants.insert((session_id, player_id));
        session.current_players += 1;
        Ok(session.clone())
    }

    async fn leave_session(
        &self,
        session_id: Uuid,
        player_id: Uuid,
    ) -> Result<Session, StoreError> {
        let mut state = self.state.write().await;
        let MemoryState {
            sessions,
            participants,
            ..
        } = &mut *state;

        let session = sessions
            .get_mut(&session_id)
            .ok_or(StoreError::SessionNotFound(session_id))?;
        if session.host_id == player_id {
            return Err(StoreError::HostCannotLeave(session_id));
        }
        if !participants.remove(&(session_id, player_id)) {
            return Err(StoreError::NotJoined {
                session_id,
                player_id,
            });
        }

        session.current_players = (session.current_players - 1).max(0);
        Ok(session.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    use crate::models::Slot;

    fn new_session(start_in_days: i64, max_players: i32) -> NewSession {
        let start_time = Utc::now() + Duration::days(start_in_days);
        NewSession {
            title: "Catan league night".to_string(),
            game: "Catan".to_string(),
            host_id: Uuid::new_v4(),
            host_name: "Jules Moreno".to_string(),
            location: "Library annex".to_string(),
            start_time,
            end_time: start_time + Duration::hours(2),
            min_players: 2,
            max_players,
        }
    }

    #[tokio::test]
    async fn upsert_replaces_previous_availability() {
        let store = MemoryStore::new();
        let user_id = Uuid::new_v4();
        let first = WeeklyAvailability::from_slots(
            user_id,
            &[Slot::from_label("weekday-evening").unwrap()],
            None,
        );
        let second = WeeklyAvailability::from_slots(
            user_id,
            &[Slot::from_label("weekend-morning").unwrap()],
            Some("Saturday mornings only".to_string()),
        );

        store.upsert_availability(&first).await.unwrap();
        store.upsert_availability(&second).await.unwrap();

        let stored = store.get_availability(user_id).await.unwrap().unwrap();
        assert_eq!(stored, second);
        assert!(!stored.weekday_evening);
    }

    #[tokio::test]
    async fn create_session_rejects_inverted_times() {
        let store = MemoryStore::new();
        let mut session = new_session(2, 4);
        session.end_time = session.start_time - Duration::hours(1);
        let err = store.create_session(session).await.unwrap_err();
        assert!(matches!(err, StoreError::InvalidSession(_)));
    }

    #[tokio::test]
    async fn join_and_leave_adjust_player_count() {
        let store = MemoryStore::new();
        let session = store.create_session(new_session(2, 4)).await.unwrap();
        assert_eq!(session.current_players, 1);

        let player = Uuid::new_v4();
        let joined = store.join_session(session.id, player).await.unwrap();
        assert_eq!(joined.current_players, 2);

        let err = store.join_session(session.id, player).await.unwrap_err();
        assert!(matches!(err, StoreError::AlreadyJoined { .. }));

        let left = store.leave_session(session.id, player).await.unwrap();
        assert_eq!(left.current_players, 1);

        let err = store.leave_session(session.id, player).await.unwrap_err();
        assert!(matches!(err, StoreError::NotJoined { .. }));
    }

    #[tokio::test]
    async fn full_session_rejects_join_without_changing_count() {
        let store = MemoryStore::new();
        let session = store.create_session(new_session(2, 2)).await.unwrap();
        store.join_session(session.id, Uuid::new_v4()).await.unwrap();

        let err = store
            .join_session(session.id, Uuid::new_v4())
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::SessionFull(_)));

        let stored = store.get_session(session.id).await.unwrap().unwrap();
        assert_eq!(stored.current_players, 2);
    }

    #[tokio::test]
    async fn host_cannot_leave() {
        let store = MemoryStore::new();
        let session = store.create_session(new_session(1, 4)).await.unwrap();
        let err = store
            .leave_session(session.id, session.host_id)
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::HostCannotLeave(_)));
    }

    #[tokio::test]
    async fn upcoming_sessions_skip_past_and_sort_by_start() {
        let store = MemoryStore::new();
        let later = store.create_session(new_session(9, 4)).await.unwrap();
        let sooner = store.create_session(new_session(1, 4)).await.unwrap();
        store.create_session(new_session(-3, 4)).await.unwrap();

        let upcoming = store.upcoming_sessions(Utc::now()).await.unwrap();
        let ids: Vec<Uuid> = upcoming.iter().map(|s| s.id).collect();
        assert_eq!(ids, vec![sooner.id, later.id]);
    }
}
