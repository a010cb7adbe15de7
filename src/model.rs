//src/model.rs
use chrono::{DateTime, Duration, Local, NaiveTime, TimeZone, Timelike, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::history::previous_set_at;

/// Set count used when a template exercise does not declare one.
pub const DEFAULT_TEMPLATE_SETS: u32 = 3;

const ID_LEN: usize = 9;

#[derive(Error, Debug, PartialEq, Eq)]
pub enum ModelError {
    #[error("Invalid time of day '{0}'. Expected HH:MM (24h).")]
    InvalidTimeOfDay(String),
    #[error("Time '{0}' does not exist on the session's date in the local timezone.")]
    NonexistentLocalTime(String),
}

/// Generates a short random id (9 hex chars of a v4 UUID).
pub fn new_id() -> String {
    let mut id = Uuid::new_v4().simple().to_string();
    id.truncate(ID_LEN);
    id
}

/// Generates an id that does not collide with any of `taken`.
pub fn unique_id<'a, I>(taken: I) -> String
where
    I: IntoIterator<Item = &'a str>,
{
    let taken: Vec<&str> = taken.into_iter().collect();
    loop {
        let id = new_id();
        if !taken.contains(&id.as_str()) {
            return id;
        }
    }
}

// Weight/reps are written as "" when unset, matching records produced by the
// browser version. Reads accept "", null, numbers and numeric strings. Values
// that do not fit the field (negative or huge reps, junk text) load as empty
// so a single bad set never makes a whole record unreadable.
mod empty_or_number {
    use serde::de::{Deserializer, IgnoredAny};
    use serde::{Deserialize, Serialize, Serializer};
    use tracing::warn;

    pub fn serialize<T, S>(value: &Option<T>, serializer: S) -> Result<S::Ok, S::Error>
    where
        T: Serialize,
        S: Serializer,
    {
        match value {
            Some(v) => v.serialize(serializer),
            None => serializer.serialize_str(""),
        }
    }

    /// Conversion from whatever number the record holds.
    pub trait FromStoredNumber: Sized {
        fn from_stored(value: f64) -> Option<Self>;
    }

    impl FromStoredNumber for f64 {
        fn from_stored(value: f64) -> Option<Self> {
            value.is_finite().then_some(value)
        }
    }

    impl FromStoredNumber for u32 {
        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        fn from_stored(value: f64) -> Option<Self> {
            let in_range = value.fract() == 0.0 && (0.0..=f64::from(u32::MAX)).contains(&value);
            in_range.then(|| value as u32)
        }
    }

    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Number(f64),
        Text(String),
        Other(IgnoredAny),
    }

    pub fn deserialize<'de, T, D>(deserializer: D) -> Result<Option<T>, D::Error>
    where
        T: FromStoredNumber,
        D: Deserializer<'de>,
    {
        let number = match Option::<Raw>::deserialize(deserializer)? {
            None => return Ok(None),
            Some(Raw::Number(n)) => n,
            Some(Raw::Text(s)) if s.trim().is_empty() => return Ok(None),
            Some(Raw::Text(s)) => match s.trim().parse::<f64>() {
                Ok(n) => n,
                Err(_) => {
                    warn!(value = %s, "Ignoring unreadable set value");
                    return Ok(None);
                }
            },
            Some(Raw::Other(_)) => {
                warn!("Ignoring non-numeric set value");
                return Ok(None);
            }
        };
        let value = T::from_stored(number);
        if value.is_none() {
            warn!(value = number, "Ignoring out-of-range set value");
        }
        Ok(value)
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Set {
    pub id: String,
    #[serde(default, with = "empty_or_number")]
    pub weight: Option<f64>,
    #[serde(default, with = "empty_or_number")]
    pub reps: Option<u32>,
    #[serde(default)]
    pub completed: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
}

impl Set {
    /// An uncompleted set with the given values.
    pub fn new(id: String, weight: Option<f64>, reps: Option<u32>) -> Self {
        Self {
            id,
            weight,
            reps,
            completed: false,
            notes: None,
        }
    }

    pub fn empty(id: String) -> Self {
        Self::new(id, None, None)
    }

    /// Both weight and reps are filled in.
    pub const fn is_logged(&self) -> bool {
        self.weight.is_some() && self.reps.is_some()
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Exercise {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub sets: Vec<Set>,
}

impl Exercise {
    pub fn completed_sets(&self) -> usize {
        self.sets.iter().filter(|s| s.completed).count()
    }

    /// Resolves a set by id or by 1-based set number.
    pub fn find_set(&self, key: &str) -> Option<(usize, &Set)> {
        let key = key.trim();
        if let Some(found) = self.sets.iter().enumerate().find(|(_, s)| s.id == key) {
            return Some(found);
        }
        key.parse::<usize>()
            .ok()
            .filter(|n| *n >= 1)
            .and_then(|n| self.sets.get(n - 1).map(|s| (n - 1, s)))
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Workout {
    pub id: String,
    pub name: String,
    pub start_time: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_time: Option<DateTime<Utc>>,
    #[serde(default)]
    pub exercises: Vec<Exercise>,
}

impl Workout {
    pub fn new(name: impl Into<String>, start_time: DateTime<Utc>) -> Self {
        Self {
            id: new_id(),
            name: name.into(),
            start_time,
            end_time: None,
            exercises: Vec::new(),
        }
    }

    pub fn completed_set_count(&self) -> usize {
        self.exercises.iter().map(Exercise::completed_sets).sum()
    }

    pub fn duration(&self) -> Option<Duration> {
        self.end_time.map(|end| end - self.start_time)
    }

    /// Sum of weight x reps over completed sets that have both values.
    pub fn total_volume(&self) -> f64 {
        self.exercises
            .iter()
            .flat_map(|e| e.sets.iter())
            .filter(|s| s.completed)
            .filter_map(|s| Some(s.weight? * f64::from(s.reps?)))
            .sum()
    }

    /// Resolves an exercise by id, 1-based position, or case-insensitive name.
    pub fn find_exercise(&self, key: &str) -> Option<&Exercise> {
        let key = key.trim();
        self.exercises
            .iter()
            .find(|e| e.id == key)
            .or_else(|| {
                key.parse::<usize>()
                    .ok()
                    .filter(|n| *n >= 1)
                    .and_then(|n| self.exercises.get(n - 1))
            })
            .or_else(|| {
                let needle = key.to_lowercase();
                self.exercises
                    .iter()
                    .find(|e| e.name.to_lowercase() == needle)
            })
    }

    fn with_exercises(&self, exercises: Vec<Exercise>) -> Self {
        Self {
            id: self.id.clone(),
            name: self.name.clone(),
            start_time: self.start_time,
            end_time: self.end_time,
            exercises,
        }
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum StoredTemplateExercise {
    // Older records stored a template exercise as its bare name.
    Legacy(String),
    Current {
        name: String,
        #[serde(default)]
        sets: Option<u32>,
    },
}

impl From<StoredTemplateExercise> for TemplateExercise {
    fn from(stored: StoredTemplateExercise) -> Self {
        match stored {
            StoredTemplateExercise::Legacy(name) => Self {
                name,
                sets: DEFAULT_TEMPLATE_SETS,
            },
            StoredTemplateExercise::Current { name, sets } => Self {
                name,
                sets: sets.unwrap_or(DEFAULT_TEMPLATE_SETS),
            },
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(from = "StoredTemplateExercise")]
pub struct TemplateExercise {
    pub name: String,
    pub sets: u32,
}

impl TemplateExercise {
    pub fn new(name: impl Into<String>, sets: u32) -> Self {
        Self {
            name: name.into(),
            sets,
        }
    }

    /// Number of sets a session started from this blueprint gets.
    pub const fn set_count(&self) -> u32 {
        if self.sets == 0 {
            DEFAULT_TEMPLATE_SETS
        } else {
            self.sets
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct WorkoutTemplate {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub category: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default)]
    pub exercises: Vec<TemplateExercise>,
}

/// A single-field edit on a set.
#[derive(Debug, Clone, PartialEq)]
pub enum SetEdit {
    Weight(Option<f64>),
    Reps(Option<u32>),
    Completed(bool),
    Notes(Option<String>),
}

impl SetEdit {
    fn apply(self, set: &Set) -> Set {
        let mut next = set.clone();
        match self {
            Self::Weight(weight) => next.weight = weight,
            Self::Reps(reps) => next.reps = reps,
            Self::Completed(completed) => next.completed = completed,
            Self::Notes(notes) => next.notes = notes.filter(|n| !n.is_empty()),
        }
        next
    }
}

fn map_exercise<F>(workout: &Workout, exercise_id: &str, f: F) -> Workout
where
    F: Fn(&Exercise) -> Exercise,
{
    let exercises = workout
        .exercises
        .iter()
        .map(|ex| if ex.id == exercise_id { f(ex) } else { ex.clone() })
        .collect();
    workout.with_exercises(exercises)
}

fn map_set<F>(workout: &Workout, exercise_id: &str, set_id: &str, f: F) -> Workout
where
    F: Fn(usize, &Set) -> Set,
{
    map_exercise(workout, exercise_id, |ex| Exercise {
        id: ex.id.clone(),
        name: ex.name.clone(),
        sets: ex
            .sets
            .iter()
            .enumerate()
            .map(|(i, s)| if s.id == set_id { f(i, s) } else { s.clone() })
            .collect(),
    })
}

/// Appends an exercise with one empty set. Returns the new workout and the exercise id.
pub fn add_exercise(workout: &Workout, name: &str) -> (Workout, String) {
    let id = unique_id(workout.exercises.iter().map(|e| e.id.as_str()));
    let mut exercises = workout.exercises.clone();
    exercises.push(Exercise {
        id: id.clone(),
        name: name.to_string(),
        sets: vec![Set::empty(new_id())],
    });
    (workout.with_exercises(exercises), id)
}

pub fn remove_exercise(workout: &Workout, exercise_id: &str) -> Workout {
    workout.with_exercises(
        workout
            .exercises
            .iter()
            .filter(|e| e.id != exercise_id)
            .cloned()
            .collect(),
    )
}

/// Appends a set, carrying weight/reps forward from the exercise's last set.
pub fn add_set(workout: &Workout, exercise_id: &str) -> Workout {
    map_exercise(workout, exercise_id, |ex| {
        let id = unique_id(ex.sets.iter().map(|s| s.id.as_str()));
        let new_set = match ex.sets.last() {
            Some(last) => Set::new(id, last.weight, last.reps),
            None => Set::empty(id),
        };
        let mut sets = ex.sets.clone();
        sets.push(new_set);
        Exercise {
            id: ex.id.clone(),
            name: ex.name.clone(),
            sets,
        }
    })
}

pub fn update_set(workout: &Workout, exercise_id: &str, set_id: &str, edit: SetEdit) -> Workout {
    map_set(workout, exercise_id, set_id, |_, s| edit.clone().apply(s))
}

/// Removes a set. An exercise may be left with no sets.
pub fn remove_set(workout: &Workout, exercise_id: &str, set_id: &str) -> Workout {
    map_exercise(workout, exercise_id, |ex| Exercise {
        id: ex.id.clone(),
        name: ex.name.clone(),
        sets: ex.sets.iter().filter(|s| s.id != set_id).cloned().collect(),
    })
}

/// Flips `completed`. When completing, empty weight/reps are first backfilled
/// from `previous`; un-completing leaves the values as they are.
pub fn toggle_completion(set: &Set, previous: Option<&Set>) -> Set {
    let mut next = set.clone();
    if !set.completed {
        if let Some(prev) = previous {
            if next.weight.is_none() {
                next.weight = prev.weight;
            }
            if next.reps.is_none() {
                next.reps = prev.reps;
            }
        }
    }
    next.completed = !set.completed;
    next
}

/// Toggles completion of a set, backfilling from the same-index set of
/// `previous_sets` (the last historical occurrence of the exercise).
pub fn toggle_set_completion(
    workout: &Workout,
    exercise_id: &str,
    set_id: &str,
    previous_sets: Option<&[Set]>,
) -> Workout {
    map_set(workout, exercise_id, set_id, |index, s| {
        toggle_completion(s, previous_set_at(previous_sets, index))
    })
}

pub fn parse_time_of_day(value: &str) -> Result<NaiveTime, ModelError> {
    NaiveTime::parse_from_str(value.trim(), "%H:%M")
        .map_err(|_| ModelError::InvalidTimeOfDay(value.to_string()))
}

// Keeps the local calendar date (and seconds) of the session start and
// replaces hour and minute.
fn on_start_date(workout: &Workout, time_of_day: &str) -> Result<DateTime<Utc>, ModelError> {
    let hm = parse_time_of_day(time_of_day)?;
    let start = workout.start_time.with_timezone(&Local);
    let naive = start
        .date_naive()
        .and_hms_nano_opt(hm.hour(), hm.minute(), start.second(), start.nanosecond())
        .ok_or_else(|| ModelError::NonexistentLocalTime(time_of_day.to_string()))?;
    Local
        .from_local_datetime(&naive)
        .earliest()
        .map(|dt| dt.with_timezone(&Utc))
        .ok_or_else(|| ModelError::NonexistentLocalTime(time_of_day.to_string()))
}

pub fn update_start_time(workout: &Workout, time_of_day: &str) -> Result<Workout, ModelError> {
    let start_time = on_start_date(workout, time_of_day)?;
    Ok(Workout {
        start_time,
        ..workout.clone()
    })
}

pub fn update_end_time(workout: &Workout, time_of_day: &str) -> Result<Workout, ModelError> {
    let end_time = on_start_date(workout, time_of_day)?;
    Ok(Workout {
        end_time: Some(end_time),
        ..workout.clone()
    })
}
