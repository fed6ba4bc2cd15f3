use crate::errors::{AppError, AppResult};
use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};

pub const TIME_OF_DAY_FORMAT: &str = "%H:%M";
pub const DATE_FORMAT: &str = "%Y-%m-%d";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "i64", into = "i64")]
pub enum Priority {
    Low = 1,
    Medium = 2,
    High = 3,
}

impl Priority {
    pub fn as_i64(self) -> i64 {
        self as i64
    }
}

impl TryFrom<i64> for Priority {
    type Error = AppError;

    fn try_from(value: i64) -> AppResult<Self> {
        match value {
            1 => Ok(Self::Low),
            2 => Ok(Self::Medium),
            3 => Ok(Self::High),
            other => Err(AppError::InvalidPriority(other)),
        }
    }
}

impl From<Priority> for i64 {
    fn from(value: Priority) -> Self {
        value.as_i64()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Event {
    pub id: i64,
    pub title: String,
    pub description: Option<String>,
    pub date: NaiveDate,
    #[serde(with = "time_of_day")]
    pub time: NaiveTime,
    pub priority: Priority,
    pub completed: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: Option<DateTime<Utc>>,
}

impl Event {
    /// Local wall-clock instant the event is due.
    pub fn due_at(&self) -> NaiveDateTime {
        self.date.and_time(self.time)
    }

    pub fn is_past_due(&self, now: NaiveDateTime) -> bool {
        !self.completed && self.due_at() < now
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateEvent {
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    pub date: NaiveDate,
    #[serde(with = "time_of_day")]
    pub time: NaiveTime,
    pub priority: Priority,
}

impl CreateEvent {
    pub fn validate(&self) -> AppResult<()> {
        validate_title(&self.title)
    }

    pub fn from_json(value: serde_json::Value) -> AppResult<Self> {
        let payload: Self = serde_json::from_value(value)?;
        payload.validate()?;
        Ok(payload)
    }
}

/// Partial update. `None` leaves a field untouched; `description: Some(None)`
/// clears it.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateEvent {
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default, deserialize_with = "deserialize_some")]
    pub description: Option<Option<String>>,
    #[serde(default)]
    pub date: Option<NaiveDate>,
    #[serde(default, deserialize_with = "time_of_day::deserialize_option")]
    pub time: Option<NaiveTime>,
    #[serde(default)]
    pub priority: Option<Priority>,
    #[serde(default)]
    pub completed: Option<bool>,
}

impl UpdateEvent {
    pub fn completed(completed: bool) -> Self {
        Self {
            completed: Some(completed),
            ..Self::default()
        }
    }

    pub fn validate(&self) -> AppResult<()> {
        match &self.title {
            Some(title) => validate_title(title),
            None => Ok(()),
        }
    }

    pub fn from_json(value: serde_json::Value) -> AppResult<Self> {
        let payload: Self = serde_json::from_value(value)?;
        payload.validate()?;
        Ok(payload)
    }

    /// Applies the changes to `event` and reports whether any field actually
    /// changed value.
    pub fn apply_to(&self, event: &mut Event) -> bool {
        let mut changed = false;
        if let Some(title) = &self.title {
            let title = title.trim();
            if event.title != title {
                event.title = title.to_string();
                changed = true;
            }
        }
        if let Some(description) = &self.description {
            if event.description != *description {
                event.description = description.clone();
                changed = true;
            }
        }
        if let Some(date) = self.date {
            if event.date != date {
                event.date = date;
                changed = true;
            }
        }
        if let Some(time) = self.time {
            if event.time != time {
                event.time = time;
                changed = true;
            }
        }
        if let Some(priority) = self.priority {
            if event.priority != priority {
                event.priority = priority;
                changed = true;
            }
        }
        if let Some(completed) = self.completed {
            if event.completed != completed {
                event.completed = completed;
                changed = true;
            }
        }
        changed
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum StoreState {
    Uninitialized,
    Initializing,
    Ready,
    Failed,
}

impl StoreState {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Uninitialized => "uninitialized",
            Self::Initializing => "initializing",
            Self::Ready => "ready",
            Self::Failed => "failed",
        }
    }
}

/// What UI collaborators observe.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StoreSnapshot {
    pub events: Vec<Event>,
    pub loading: bool,
    pub error: Option<String>,
    pub selected_date: Option<NaiveDate>,
    pub is_ready: bool,
}

pub fn parse_date(raw: &str) -> AppResult<NaiveDate> {
    NaiveDate::parse_from_str(raw.trim(), DATE_FORMAT)
        .map_err(|error| AppError::Validation(format!("invalid date '{}': {}", raw, error)))
}

pub fn parse_time_of_day(raw: &str) -> AppResult<NaiveTime> {
    let raw_trimmed = raw.trim();
    NaiveTime::parse_from_str(raw_trimmed, TIME_OF_DAY_FORMAT)
        .or_else(|_| NaiveTime::parse_from_str(raw_trimmed, "%H:%M:%S"))
        .map_err(|error| AppError::Validation(format!("invalid time '{}': {}", raw, error)))
}

pub fn format_time_of_day(time: NaiveTime) -> String {
    time.format(TIME_OF_DAY_FORMAT).to_string()
}

fn validate_title(title: &str) -> AppResult<()> {
    if title.trim().is_empty() {
        return Err(AppError::Validation("Event title cannot be empty".to_string()));
    }
    Ok(())
}

fn deserialize_some<'de, T, D>(deserializer: D) -> Result<Option<T>, D::Error>
where
    T: Deserialize<'de>,
    D: Deserializer<'de>,
{
    T::deserialize(deserializer).map(Some)
}

mod time_of_day {
    use super::{format_time_of_day, parse_time_of_day};
    use chrono::NaiveTime;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(time: &NaiveTime, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&format_time_of_day(*time))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<NaiveTime, D::Error> {
        let raw = String::deserialize(deserializer)?;
        parse_time_of_day(&raw).map_err(serde::de::Error::custom)
    }

    pub fn deserialize_option<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Option<NaiveTime>, D::Error> {
        let raw = Option::<String>::deserialize(deserializer)?;
        raw.map(|raw| parse_time_of_day(&raw).map_err(serde::de::Error::custom))
            .transpose()
    }
}
