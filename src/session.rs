//src/session.rs
use chrono::{DateTime, Local, Utc};
use thiserror::Error;
use tracing::{debug, info};

use crate::analysis::{AnalysisResult, TaggedAnalysis};
use crate::model::{unique_id, Exercise, ModelError, Set, TemplateExercise, Workout};

#[derive(Error, Debug, PartialEq, Eq)]
pub enum SessionError {
    #[error("No workout in progress. Start one with 'start'.")]
    NoActiveSession,
    #[error("No workout is open for editing.")]
    NoEditTarget,
    #[error("No history entry is open for editing.")]
    NotEditingHistory,
    #[error("Workout not found in history: {0}")]
    HistoryEntryNotFound(String),
    #[error(transparent)]
    Model(#[from] ModelError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionMode {
    Idle,
    Active,
    ActiveMinimized,
    EditingHistory,
}

/// Which workout snapshot edits apply to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EditTarget {
    Active,
    History,
}

/// Owns the in-progress workout and the history entry open for correction.
/// Both may exist at once; an open history entry takes precedence as edit target.
#[derive(Debug, Clone, Default)]
pub struct SessionState {
    active: Option<Workout>,
    minimized: bool,
    history_edit: Option<Workout>,
    analysis: Option<TaggedAnalysis>,
}

impl SessionState {
    pub fn new(active: Option<Workout>) -> Self {
        Self {
            active,
            ..Self::default()
        }
    }

    pub fn active(&self) -> Option<&Workout> {
        self.active.as_ref()
    }

    pub fn history_edit(&self) -> Option<&Workout> {
        self.history_edit.as_ref()
    }

    pub const fn is_minimized(&self) -> bool {
        self.minimized
    }

    pub fn mode(&self) -> SessionMode {
        match (&self.history_edit, &self.active) {
            (Some(_), _) => SessionMode::EditingHistory,
            (None, Some(_)) if self.minimized => SessionMode::ActiveMinimized,
            (None, Some(_)) => SessionMode::Active,
            (None, None) => SessionMode::Idle,
        }
    }

    pub fn edit_target(&self) -> Option<EditTarget> {
        if self.history_edit.is_some() {
            Some(EditTarget::History)
        } else if self.active.is_some() {
            Some(EditTarget::Active)
        } else {
            None
        }
    }

    pub fn target_workout(&self) -> Option<&Workout> {
        match self.edit_target()? {
            EditTarget::History => self.history_edit.as_ref(),
            EditTarget::Active => self.active.as_ref(),
        }
    }

    /// Replaces the current edit target with `f(target)`.
    pub fn modify<F>(&mut self, f: F) -> Result<EditTarget, SessionError>
    where
        F: FnOnce(&Workout) -> Result<Workout, ModelError>,
    {
        let target = self.edit_target().ok_or(SessionError::NoEditTarget)?;
        let slot = match target {
            EditTarget::History => &mut self.history_edit,
            EditTarget::Active => &mut self.active,
        };
        let current = slot.as_ref().ok_or(SessionError::NoEditTarget)?;
        let next = f(current)?;
        debug!(target = ?target, workout_id = %next.id, "Workout edited");
        *slot = Some(next);
        Ok(target)
    }

    /// Starts a session, replacing any unfinished one. Each template exercise
    /// gets its declared number of empty sets.
    pub fn start_session(
        &mut self,
        name: &str,
        template_exercises: Option<&[TemplateExercise]>,
        now: DateTime<Utc>,
    ) -> &Workout {
        let name = match name.trim() {
            "" => format!("Workout {}", now.with_timezone(&Local).format("%-m/%-d/%Y")),
            trimmed => trimmed.to_string(),
        };
        let mut workout = Workout::new(name, now);
        for template_exercise in template_exercises.unwrap_or_default() {
            let mut sets: Vec<Set> = Vec::new();
            for _ in 0..template_exercise.set_count() {
                sets.push(Set::empty(unique_id(sets.iter().map(|s| s.id.as_str()))));
            }
            workout.exercises.push(Exercise {
                id: unique_id(workout.exercises.iter().map(|e| e.id.as_str())),
                name: template_exercise.name.clone(),
                sets,
            });
        }

        if let Some(previous) = &self.active {
            info!(workout_id = %previous.id, "Discarding unfinished workout");
        }
        info!(workout_id = %workout.id, name = %workout.name, "Started workout");
        self.minimized = false;
        self.analysis = None;
        self.active.insert(workout)
    }

    pub fn minimize(&mut self) -> Result<(), SessionError> {
        if self.active.is_none() {
            return Err(SessionError::NoActiveSession);
        }
        self.minimized = true;
        Ok(())
    }

    pub fn resume(&mut self) -> Result<&Workout, SessionError> {
        let active = self.active.as_ref().ok_or(SessionError::NoActiveSession)?;
        self.minimized = false;
        Ok(active)
    }

    /// Ends the active session and prepends it to `history`. A manually set
    /// end time is kept.
    pub fn finish_session(
        &mut self,
        history: &mut Vec<Workout>,
        now: DateTime<Utc>,
    ) -> Result<Workout, SessionError> {
        let mut finished = self.active.take().ok_or(SessionError::NoActiveSession)?;
        finished.end_time.get_or_insert(now);
        history.insert(0, finished.clone());
        self.minimized = false;
        self.analysis = None;
        info!(workout_id = %finished.id, "Finished workout");
        Ok(finished)
    }

    /// Opens a copy of a finished workout for editing. The active session is untouched.
    pub fn open_history_entry(
        &mut self,
        history: &[Workout],
        workout_id: &str,
    ) -> Result<&Workout, SessionError> {
        let entry = history
            .iter()
            .find(|w| w.id == workout_id)
            .ok_or_else(|| SessionError::HistoryEntryNotFound(workout_id.to_string()))?;
        debug!(workout_id, "Opened history entry");
        Ok(self.history_edit.insert(entry.clone()))
    }

    /// Writes the edited copy back over the history entry with the same id.
    pub fn save_history_edits(&mut self, history: &mut [Workout]) -> Result<Workout, SessionError> {
        let edited = self
            .history_edit
            .take()
            .ok_or(SessionError::NotEditingHistory)?;
        let Some(slot) = history.iter_mut().find(|w| w.id == edited.id) else {
            let id = edited.id.clone();
            self.history_edit = Some(edited);
            return Err(SessionError::HistoryEntryNotFound(id));
        };
        *slot = edited.clone();
        info!(workout_id = %edited.id, "Saved history edits");
        Ok(edited)
    }

    pub fn cancel_history_edits(&mut self) -> Result<Workout, SessionError> {
        self.history_edit
            .take()
            .ok_or(SessionError::NotEditingHistory)
    }

    /// Keeps `tagged` only if it belongs to the workout currently open.
    pub fn accept_analysis(&mut self, tagged: TaggedAnalysis) -> bool {
        let current = self.target_workout().map(|w| w.id.as_str());
        if current == Some(tagged.workout_id.as_str()) {
            self.analysis = Some(tagged);
            true
        } else {
            debug!(workout_id = %tagged.workout_id, "Discarding analysis for a workout that is no longer open");
            false
        }
    }

    /// Dismisses a pending analysis result.
    pub fn clear_analysis(&mut self) {
        if self.analysis.take().is_some() {
            debug!("Dismissed analysis result");
        }
    }

    /// Analysis for the workout currently open, if one arrived for it.
    pub fn analysis(&self) -> Option<&AnalysisResult> {
        let current = self.target_workout()?;
        self.analysis
            .as_ref()
            .filter(|tagged| tagged.workout_id == current.id)
            .map(|tagged| &tagged.result)
    }
}
