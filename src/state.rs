use crate::backend::Backend;
use crate::models::{
    Activity, ActivityType, DailyStat, Pet, Period, RangeStat, RunningTimer, WeeklyReport,
};
use crate::session::{PersistedSession, persist_session};
use chrono::{DateTime, NaiveDate, Utc};
use std::collections::{BTreeMap, HashMap};
use std::{path::PathBuf, sync::Arc};
use tokio::sync::Mutex;
use tracing::error;

/// Proof that a fetch was issued; results are applied only while the ticket
/// is still the newest one for its key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Ticket {
    key: String,
    generation: u64,
}

#[derive(Debug, Default)]
pub struct RequestSequencer {
    latest: HashMap<String, u64>,
}

impl RequestSequencer {
    pub fn issue(&mut self, key: impl Into<String>) -> Ticket {
        let key = key.into();
        let generation = self.latest.entry(key.clone()).or_insert(0);
        *generation += 1;
        Ticket {
            key,
            generation: *generation,
        }
    }

    pub fn is_current(&self, ticket: &Ticket) -> bool {
        self.latest.get(&ticket.key) == Some(&ticket.generation)
    }
}

pub fn daily_key(date: NaiveDate) -> String {
    format!("daily:{date}")
}

pub const RANGE_KEY: &str = "range";
pub const WEEKLY_KEY: &str = "weekly";
pub const PETS_KEY: &str = "pets";
pub const ACTIVITIES_KEY: &str = "activities";

#[derive(Debug, Clone, PartialEq)]
pub enum TimerToggle {
    Started(DateTime<Utc>),
    Stopped {
        started_at: DateTime<Utc>,
        ended_at: DateTime<Utc>,
        minutes: f64,
    },
}

/// One start timestamp per timed activity type. Starting a type that is
/// already running is not distinguished from stopping it.
#[derive(Debug, Default)]
pub struct TimerBoard {
    running: BTreeMap<ActivityType, DateTime<Utc>>,
}

impl TimerBoard {
    pub fn toggle(&mut self, kind: ActivityType, now: DateTime<Utc>) -> TimerToggle {
        match self.running.remove(&kind) {
            Some(started_at) => TimerToggle::Stopped {
                started_at,
                ended_at: now,
                minutes: elapsed_minutes(started_at, now),
            },
            None => {
                self.running.insert(kind, now);
                TimerToggle::Started(now)
            }
        }
    }

    /// Puts a stopped timer back, used when logging its result failed.
    pub fn restore(&mut self, kind: ActivityType, started_at: DateTime<Utc>) {
        self.running.insert(kind, started_at);
    }

    pub fn running(&self) -> Vec<RunningTimer> {
        self.running
            .iter()
            .map(|(kind, started_at)| RunningTimer {
                kind: *kind,
                started_at: *started_at,
            })
            .collect()
    }
}

/// Whole minutes between two instants, never less than one.
pub fn elapsed_minutes(start: DateTime<Utc>, end: DateTime<Utc>) -> f64 {
    let minutes = (end - start).num_milliseconds() as f64 / 60_000.0;
    minutes.round().max(1.0)
}

#[derive(Debug, Default)]
pub struct ClientState {
    pub session: PersistedSession,
    pub user_id: Option<i64>,
    pub pets: Vec<Pet>,
    pub pets_loaded: bool,
    /// Newest first.
    pub activities: Vec<Activity>,
    pub daily: BTreeMap<NaiveDate, DailyStat>,
    pub range: Option<RangeStat>,
    pub last_period: Period,
    pub last_range_pet: Option<i64>,
    pub weekly: Option<WeeklyReport>,
    pub timers: TimerBoard,
    pub sequencer: RequestSequencer,
}

impl ClientState {
    pub fn with_session(session: PersistedSession) -> Self {
        Self {
            session,
            ..Self::default()
        }
    }

    pub fn sign_in(&mut self, access_token: String, user_id: i64, email: String) {
        self.session.access_token = Some(access_token);
        self.session.user_email = Some(email);
        self.user_id = Some(user_id);
    }

    /// Drops everything that belonged to the previous user.
    pub fn sign_out(&mut self) {
        self.session.clear_auth();
        self.session.selected_pet_id = None;
        self.user_id = None;
        self.pets.clear();
        self.pets_loaded = false;
        self.activities.clear();
        self.daily.clear();
        self.range = None;
        self.weekly = None;
        self.timers = TimerBoard::default();
    }

    /// Keeps the selection when it still exists, otherwise falls back to the
    /// first pet.
    pub fn set_pets(&mut self, pets: Vec<Pet>) {
        let current = self.session.selected_pet_id;
        let keep = current.filter(|id| pets.iter().any(|pet| pet.id == *id));
        self.session.selected_pet_id = keep.or_else(|| pets.first().map(|pet| pet.id));
        self.pets = pets;
        self.pets_loaded = true;
    }

    pub fn add_pet(&mut self, pet: Pet) {
        if self.session.selected_pet_id.is_none() {
            self.session.selected_pet_id = Some(pet.id);
        }
        self.pets.push(pet);
        self.pets_loaded = true;
    }

    pub fn replace_pet(&mut self, pet: Pet) {
        if let Some(slot) = self.pets.iter_mut().find(|existing| existing.id == pet.id) {
            *slot = pet;
        }
    }

    pub fn remove_pet(&mut self, id: i64) {
        self.pets.retain(|pet| pet.id != id);
        if self.session.selected_pet_id == Some(id) {
            self.session.selected_pet_id = self.pets.first().map(|pet| pet.id);
        }
        for activity in self.activities.iter_mut().filter(|a| a.pet_id == Some(id)) {
            activity.pet_id = None;
        }
    }

    /// Returns false when the pet is unknown; `None` clears the selection.
    pub fn select_pet(&mut self, id: Option<i64>) -> bool {
        if let Some(id) = id {
            if !self.pets.iter().any(|pet| pet.id == id) {
                return false;
            }
        }
        self.session.selected_pet_id = id;
        true
    }

    pub fn prepend_activity(&mut self, activity: Activity) {
        self.activities.insert(0, activity);
    }

    pub fn replace_activity(&mut self, activity: Activity) -> Option<Activity> {
        let slot = self
            .activities
            .iter_mut()
            .find(|existing| existing.id == activity.id)?;
        Some(std::mem::replace(slot, activity))
    }

    pub fn remove_activity(&mut self, id: i64) -> Option<Activity> {
        let index = self.activities.iter().position(|a| a.id == id)?;
        Some(self.activities.remove(index))
    }

    pub fn apply_pets(&mut self, ticket: &Ticket, pets: Vec<Pet>) -> bool {
        if !self.sequencer.is_current(ticket) {
            return false;
        }
        self.set_pets(pets);
        true
    }

    pub fn apply_activities(&mut self, ticket: &Ticket, activities: Vec<Activity>) -> bool {
        if !self.sequencer.is_current(ticket) {
            return false;
        }
        self.activities = activities;
        true
    }

    pub fn apply_daily(&mut self, ticket: &Ticket, stat: DailyStat) -> bool {
        if !self.sequencer.is_current(ticket) {
            return false;
        }
        self.daily.insert(stat.date, stat);
        true
    }

    pub fn apply_range(&mut self, ticket: &Ticket, range: RangeStat) -> bool {
        if !self.sequencer.is_current(ticket) {
            return false;
        }
        self.range = Some(range);
        true
    }

    pub fn apply_weekly(&mut self, ticket: &Ticket, report: WeeklyReport) -> bool {
        if !self.sequencer.is_current(ticket) {
            return false;
        }
        self.weekly = Some(report);
        true
    }
}

/// Application-state container shared by every view.
pub struct AppState<B> {
    pub backend: Arc<B>,
    pub client: Arc<Mutex<ClientState>>,
    pub session_path: PathBuf,
}

impl<B> Clone for AppState<B> {
    fn clone(&self) -> Self {
        Self {
            backend: Arc::clone(&self.backend),
            client: Arc::clone(&self.client),
            session_path: self.session_path.clone(),
        }
    }
}

impl<B: Backend> AppState<B> {
    pub fn new(backend: B, session: PersistedSession, session_path: PathBuf) -> Self {
        Self {
            backend: Arc::new(backend),
            client: Arc::new(Mutex::new(ClientState::with_session(session))),
            session_path,
        }
    }

    pub async fn access_token(&self) -> Option<String> {
        self.client.lock().await.session.access_token.clone()
    }

    /// Writes the persisted part of the state; failures are logged only.
    pub async fn save_session(&self) {
        let snapshot = self.client.lock().await.session.clone();
        if let Err(err) = persist_session(&self.session_path, &snapshot).await {
            error!(path = %self.session_path.display(), "failed to persist session: {err}");
        }
    }
}
