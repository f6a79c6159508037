use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ActivityType {
    Walk,
    Play,
    Meal,
    Treat,
    Poop,
    Care,
}

impl ActivityType {
    pub const ALL: [ActivityType; 6] = [
        ActivityType::Walk,
        ActivityType::Play,
        ActivityType::Meal,
        ActivityType::Treat,
        ActivityType::Poop,
        ActivityType::Care,
    ];

    /// Walk and play are measured in minutes, everything else is counted.
    pub fn expected_unit(self) -> ActivityUnit {
        match self {
            ActivityType::Walk | ActivityType::Play => ActivityUnit::Min,
            _ => ActivityUnit::Count,
        }
    }

    pub fn is_timed(self) -> bool {
        self.expected_unit() == ActivityUnit::Min
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ActivityType::Walk => "walk",
            ActivityType::Play => "play",
            ActivityType::Meal => "meal",
            ActivityType::Treat => "treat",
            ActivityType::Poop => "poop",
            ActivityType::Care => "care",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ActivityUnit {
    Min,
    Count,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ActivitySource {
    Quick,
    #[default]
    Manual,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Activity {
    pub id: i64,
    pub user_id: i64,
    pub pet_id: Option<i64>,
    #[serde(rename = "type")]
    pub kind: ActivityType,
    pub amount: f64,
    pub unit: ActivityUnit,
    pub started_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
    pub note: Option<String>,
    pub source: ActivitySource,
    pub created_at: DateTime<Utc>,
}

/// A validated row ready to be inserted into the activities table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewActivity {
    pub user_id: i64,
    pub pet_id: Option<i64>,
    #[serde(rename = "type")]
    pub kind: ActivityType,
    pub amount: f64,
    pub unit: ActivityUnit,
    pub started_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
    pub note: Option<String>,
    pub source: ActivitySource,
}

/// Unvalidated request to log an activity.
#[derive(Debug, Clone, Deserialize)]
pub struct ActivityInput {
    #[serde(default)]
    pub pet_id: Option<i64>,
    #[serde(rename = "type")]
    pub kind: ActivityType,
    pub amount: f64,
    #[serde(default)]
    pub unit: Option<ActivityUnit>,
    #[serde(default)]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub ended_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub note: Option<String>,
    #[serde(default)]
    pub source: ActivitySource,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ActivityChanges {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub amount: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ended_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Pet {
    pub id: i64,
    pub user_id: i64,
    pub name: String,
    pub species: Option<String>,
    pub birthdate: Option<NaiveDate>,
    pub weight: Option<f64>,
    pub photo_url: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct PetInput {
    pub name: String,
    #[serde(default)]
    pub species: Option<String>,
    #[serde(default)]
    pub birthdate: Option<NaiveDate>,
    #[serde(default)]
    pub weight: Option<f64>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct PetChanges {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub species: Option<String>,
    #[serde(default)]
    pub birthdate: Option<NaiveDate>,
    #[serde(default)]
    pub weight: Option<f64>,
    #[serde(default)]
    pub photo_url: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: i64,
    pub email: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthSession {
    pub access_token: String,
    pub user: User,
}

/// Per-type totals for one local calendar day. Derived, never stored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DailyStat {
    pub date: NaiveDate,
    pub walk_min: f64,
    pub play_min: f64,
    pub meal_count: f64,
    pub treat_count: f64,
    pub poop_count: f64,
    pub care_count: f64,
}

impl DailyStat {
    pub fn empty(date: NaiveDate) -> Self {
        Self {
            date,
            walk_min: 0.0,
            play_min: 0.0,
            meal_count: 0.0,
            treat_count: 0.0,
            poop_count: 0.0,
            care_count: 0.0,
        }
    }

    pub fn add(&mut self, kind: ActivityType, amount: f64) {
        let slot = match kind {
            ActivityType::Walk => &mut self.walk_min,
            ActivityType::Play => &mut self.play_min,
            ActivityType::Meal => &mut self.meal_count,
            ActivityType::Treat => &mut self.treat_count,
            ActivityType::Poop => &mut self.poop_count,
            ActivityType::Care => &mut self.care_count,
        };
        *slot += amount;
    }

    pub fn total_for(&self, kind: ActivityType) -> f64 {
        match kind {
            ActivityType::Walk => self.walk_min,
            ActivityType::Play => self.play_min,
            ActivityType::Meal => self.meal_count,
            ActivityType::Treat => self.treat_count,
            ActivityType::Poop => self.poop_count,
            ActivityType::Care => self.care_count,
        }
    }

    pub fn active_minutes(&self) -> f64 {
        self.walk_min + self.play_min
    }

    pub fn is_empty(&self) -> bool {
        ActivityType::ALL
            .iter()
            .all(|kind| self.total_for(*kind) == 0.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Period {
    #[default]
    Week,
    Month,
    Year,
    All,
}

impl Period {
    pub fn days(self) -> u32 {
        match self {
            Period::Week => 7,
            Period::Month => 30,
            Period::Year => 365,
            Period::All => 400,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RangeStat {
    pub period: Period,
    pub pet_id: Option<i64>,
    pub start: NaiveDate,
    pub end: NaiveDate,
    pub days: Vec<DailyStat>,
    pub streak_days: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WeeklyReport {
    pub start: NaiveDate,
    pub end: NaiveDate,
    pub days: Vec<DailyStat>,
    pub change_vs_last_week: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExtractedActivity {
    #[serde(rename = "type")]
    pub kind: ActivityType,
    pub amount: f64,
    pub unit: ActivityUnit,
}

#[derive(Debug, thiserror::Error, PartialEq)]
pub enum ValidationError {
    #[error("amount must be a positive number, got {0}")]
    InvalidAmount(f64),

    #[error("invalid date '{0}', expected YYYY-MM-DD")]
    InvalidDate(String),

    #[error("pet name must not be empty")]
    EmptyName,

    #[error("filename must not be empty")]
    EmptyFilename,
}

#[derive(Debug, Deserialize)]
pub struct CredentialsRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Deserialize)]
pub struct TextRequest {
    pub text: String,
    #[serde(default)]
    pub pet_id: Option<i64>,
}

#[derive(Debug, Default, Deserialize)]
pub struct StatsQuery {
    #[serde(default)]
    pub period: Option<Period>,
    #[serde(default)]
    pub pet_id: Option<i64>,
}

#[derive(Debug, Default, Deserialize)]
pub struct DateQuery {
    #[serde(default)]
    pub date: Option<String>,
    #[serde(default)]
    pub start: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct PetQuery {
    #[serde(default)]
    pub pet_id: Option<i64>,
}

#[derive(Debug, Deserialize)]
pub struct PhotoQuery {
    pub filename: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct SessionResponse {
    pub signed_in: bool,
    pub user_email: Option<String>,
    pub selected_pet_id: Option<i64>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct TodayResponse {
    pub date: NaiveDate,
    pub stat: DailyStat,
    pub running_timers: Vec<RunningTimer>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunningTimer {
    #[serde(rename = "type")]
    pub kind: ActivityType,
    pub started_at: DateTime<Utc>,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum QuickResponse {
    TimerStarted(RunningTimer),
    Logged { activity: Activity },
}

#[derive(Debug, Serialize, Deserialize)]
pub struct NoteResponse {
    pub extracted: Vec<ExtractedActivity>,
    pub logged: Vec<Activity>,
    /// Set when logging stopped part way; `logged` holds what was stored.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}
