// src/lib.rs
use anyhow::{bail, Context, Result};
use chrono::Utc;
use std::path::{Path, PathBuf};
use tracing::error;

// --- Declare modules ---
pub mod analysis;
pub mod catalog;
mod config;
pub mod history;
pub mod model;
pub mod session;
pub mod store;
pub mod templates;

// --- Expose public types ---
pub use analysis::{
    AnalysisError, AnalysisGateway, AnalysisRequest, AnalysisResult, GeminiClient,
    TaggedAnalysis, TextGenerator,
};
pub use catalog::MuscleGroup;
pub use config::{
    get_config_path as get_config_path_util, load as load_config_util, parse_color,
    save as save_config_util, AnalysisConfig, Config, ConfigError, StandardColor, Theme, Units,
};
pub use model::{
    Exercise, ModelError, Set, SetEdit, TemplateExercise, Workout, WorkoutTemplate,
    DEFAULT_TEMPLATE_SETS,
};
pub use session::{EditTarget, SessionError, SessionMode, SessionState};
pub use store::{FileStore, KeyValueStore, MemoryStore, StoreError};
pub use templates::{TemplateDraft, TemplateError};

pub struct AppService {
    pub config: Config,
    pub config_path: PathBuf,
    pub data_dir: PathBuf,
    store: Box<dyn KeyValueStore>,
    session: SessionState,
    history: Vec<Workout>,
    custom_templates: Vec<WorkoutTemplate>,
}

impl AppService {
    /// Initializes the application service.
    /// # Errors
    /// Returns `anyhow::Error` if config/data path determination, loading, or store setup fails.
    /// Unreadable records are recovered from rather than reported.
    pub fn initialize() -> Result<Self> {
        let config_path =
            config::get_config_path().context("Failed to determine configuration file path")?;
        let config = config::load(&config_path)
            .with_context(|| format!("Failed to load config from {config_path:?}"))?;

        let data_dir = match &config.data_dir {
            Some(dir) => dir.clone(),
            None => store::get_data_dir().context("Failed to determine data directory")?,
        };
        let store = FileStore::open(&data_dir)
            .with_context(|| format!("Failed to open data directory {data_dir:?}"))?;

        Self::with_store(config, config_path, data_dir, Box::new(store))
    }

    /// Builds a service over any store, loading the three persisted records.
    /// # Errors
    /// Returns `anyhow::Error` if the store cannot be read.
    pub fn with_store(
        config: Config,
        config_path: PathBuf,
        data_dir: PathBuf,
        mut store: Box<dyn KeyValueStore>,
    ) -> Result<Self> {
        let active = store::load_active(store.as_mut()).context("Failed to load active workout")?;
        let history = store::load_history(store.as_ref()).context("Failed to load history")?;
        let custom_templates =
            store::load_templates(store.as_ref()).context("Failed to load custom templates")?;

        Ok(Self {
            config,
            config_path,
            data_dir,
            store,
            session: SessionState::new(active),
            history,
            custom_templates,
        })
    }

    pub fn get_config_path(&self) -> &Path {
        &self.config_path
    }

    pub fn get_data_dir(&self) -> &Path {
        &self.data_dir
    }

    /// Saves the current configuration state.
    /// # Errors
    /// Returns `ConfigError` if saving fails.
    pub fn save_config(&self) -> Result<(), ConfigError> {
        config::save(&self.config_path, &self.config)
    }

    /// Sets the measurement units.
    /// # Errors
    /// Returns `ConfigError` variants if saving fails.
    pub fn set_units(&mut self, units: Units) -> Result<(), ConfigError> {
        self.config.units = units;
        self.save_config()
    }

    /// Gateway configured from the current settings.
    pub fn analysis_gateway(&self) -> AnalysisGateway {
        AnalysisGateway::from_config(&self.config.analysis, self.config.units)
    }

    // --- Session state ---

    pub fn session(&self) -> &SessionState {
        &self.session
    }

    pub fn mode(&self) -> SessionMode {
        self.session.mode()
    }

    pub fn active_workout(&self) -> Option<&Workout> {
        self.session.active()
    }

    /// The workout edits currently apply to.
    pub fn target_workout(&self) -> Option<&Workout> {
        self.session.target_workout()
    }

    /// Finished workouts, newest first.
    pub fn history(&self) -> &[Workout] {
        &self.history
    }

    pub fn history_entry(&self, id: &str) -> Option<&Workout> {
        self.history.iter().find(|w| w.id == id)
    }

    fn persist_active(&mut self) -> Result<()> {
        store::save_active(self.store.as_mut(), self.session.active())
            .context("Failed to save active workout")
    }

    fn persist_history(&mut self) -> Result<()> {
        store::save_history(self.store.as_mut(), &self.history).context("Failed to save history")
    }

    fn persist_templates(&mut self) -> Result<()> {
        store::save_templates(self.store.as_mut(), &self.custom_templates)
            .context("Failed to save custom templates")
    }

    // --- Lifecycle ---

    /// Starts a session, optionally from a template looked up by id or name.
    /// # Errors
    /// Returns an error if the template is unknown or saving fails.
    pub fn start_session(&mut self, name: &str, template: Option<&str>) -> Result<Workout> {
        let template = match template {
            Some(key) => Some(
                templates::find_template(&self.custom_templates, key)
                    .with_context(|| format!("Template not found: '{key}'"))?,
            ),
            None => None,
        };
        let name = match (&template, name.trim()) {
            (Some(t), "") => t.name.clone(),
            _ => name.to_string(),
        };
        let exercises = template.as_ref().map(|t| t.exercises.as_slice());
        let workout = self.session.start_session(&name, exercises, Utc::now()).clone();
        self.persist_active()?;
        Ok(workout)
    }

    /// Starts a session from explicit template exercises.
    /// # Errors
    /// Returns an error if saving fails.
    pub fn start_session_with(
        &mut self,
        name: &str,
        exercises: Option<&[TemplateExercise]>,
    ) -> Result<Workout> {
        let workout = self.session.start_session(name, exercises, Utc::now()).clone();
        self.persist_active()?;
        Ok(workout)
    }

    /// # Errors
    /// Returns `SessionError::NoActiveSession` if nothing is in progress.
    pub fn minimize(&mut self) -> Result<(), SessionError> {
        self.session.minimize()
    }

    /// # Errors
    /// Returns `SessionError::NoActiveSession` if nothing is in progress.
    pub fn resume(&mut self) -> Result<&Workout, SessionError> {
        self.session.resume()
    }

    /// Finishes the active session and moves it to the front of history.
    /// Nothing changes in memory unless both records were written; if the
    /// active record cannot be cleared, the history write is reverted.
    /// # Errors
    /// Returns an error if no session is active or saving fails.
    pub fn finish_session(&mut self) -> Result<Workout> {
        let mut session = self.session.clone();
        let mut history = self.history.clone();
        let finished = session.finish_session(&mut history, Utc::now())?;

        store::save_history(self.store.as_mut(), &history).context("Failed to save history")?;
        if let Err(e) = store::save_active(self.store.as_mut(), session.active()) {
            if let Err(revert) = store::save_history(self.store.as_mut(), &self.history) {
                error!(error = %revert, "Failed to restore history after an aborted finish");
            }
            return Err(e).context("Failed to save active workout");
        }

        self.session = session;
        self.history = history;
        Ok(finished)
    }

    /// # Errors
    /// Returns `SessionError::HistoryEntryNotFound` for unknown ids.
    pub fn open_history_entry(&mut self, workout_id: &str) -> Result<&Workout, SessionError> {
        self.session.open_history_entry(&self.history, workout_id)
    }

    /// # Errors
    /// Returns an error if nothing is open or saving fails.
    pub fn save_history_edits(&mut self) -> Result<Workout> {
        let saved = self.session.save_history_edits(&mut self.history)?;
        self.persist_history()?;
        Ok(saved)
    }

    /// # Errors
    /// Returns `SessionError::NotEditingHistory` if nothing is open.
    pub fn cancel_history_edits(&mut self) -> Result<Workout, SessionError> {
        self.session.cancel_history_edits()
    }

    // --- Edits on the current target ---

    fn modify<F>(&mut self, f: F) -> Result<EditTarget>
    where
        F: FnOnce(&Workout) -> Result<Workout, ModelError>,
    {
        let target = self.session.modify(f)?;
        if target == EditTarget::Active {
            self.persist_active()?;
        }
        Ok(target)
    }

    fn target_exercise(&self, exercise_id: &str) -> Result<&Exercise> {
        let workout = self
            .session
            .target_workout()
            .ok_or(SessionError::NoEditTarget)?;
        match workout.exercises.iter().find(|e| e.id == exercise_id) {
            Some(exercise) => Ok(exercise),
            None => bail!("Exercise not found: {exercise_id}"),
        }
    }

    /// Adds an exercise to the current target and returns its id.
    /// # Errors
    /// Returns an error if nothing is open or saving fails.
    pub fn add_exercise(&mut self, name: &str) -> Result<String> {
        let name = name.trim();
        if name.is_empty() {
            bail!("Exercise name cannot be empty.");
        }
        let mut new_id = String::new();
        self.modify(|w| {
            let (next, id) = model::add_exercise(w, name);
            new_id = id;
            Ok(next)
        })?;
        Ok(new_id)
    }

    /// # Errors
    /// Returns an error if nothing is open or saving fails.
    pub fn remove_exercise(&mut self, exercise_id: &str) -> Result<()> {
        self.modify(|w| Ok(model::remove_exercise(w, exercise_id)))?;
        Ok(())
    }

    /// Adds a set to an exercise and returns the new set.
    /// # Errors
    /// Returns an error if nothing is open, the exercise is unknown, or saving fails.
    pub fn add_set(&mut self, exercise_id: &str) -> Result<Set> {
        self.target_exercise(exercise_id)?;
        self.modify(|w| Ok(model::add_set(w, exercise_id)))?;
        self.target_exercise(exercise_id)?
            .sets
            .last()
            .cloned()
            .context("Set was not added")
    }

    /// # Errors
    /// Returns an error if nothing is open or saving fails.
    pub fn update_set(&mut self, exercise_id: &str, set_id: &str, edit: SetEdit) -> Result<()> {
        self.modify(|w| Ok(model::update_set(w, exercise_id, set_id, edit)))?;
        Ok(())
    }

    /// # Errors
    /// Returns an error if nothing is open or saving fails.
    pub fn remove_set(&mut self, exercise_id: &str, set_id: &str) -> Result<()> {
        self.modify(|w| Ok(model::remove_set(w, exercise_id, set_id)))?;
        Ok(())
    }

    /// Sets logged the last time this exercise appeared in history. While a
    /// history entry is open, that entry itself is skipped.
    pub fn previous_sets(&self, exercise_name: &str) -> Option<&[Set]> {
        let exclude = self.session.history_edit().map(|w| w.id.as_str());
        history::find_previous_sets_excluding(&self.history, exercise_name, exclude)
    }

    /// Toggles a set's completion, backfilling empty values from history.
    /// # Errors
    /// Returns an error if nothing is open, the exercise is unknown, or saving fails.
    pub fn toggle_set_completion(&mut self, exercise_id: &str, set_id: &str) -> Result<Set> {
        let name = self.target_exercise(exercise_id)?.name.clone();
        let previous = self.previous_sets(&name).map(<[Set]>::to_vec);
        self.modify(|w| {
            Ok(model::toggle_set_completion(
                w,
                exercise_id,
                set_id,
                previous.as_deref(),
            ))
        })?;
        self.target_exercise(exercise_id)?
            .sets
            .iter()
            .find(|s| s.id == set_id)
            .cloned()
            .with_context(|| format!("Set not found: {set_id}"))
    }

    /// # Errors
    /// Returns an error for malformed times, when nothing is open, or if saving fails.
    pub fn update_start_time(&mut self, time_of_day: &str) -> Result<()> {
        self.modify(|w| model::update_start_time(w, time_of_day))?;
        Ok(())
    }

    /// # Errors
    /// Returns an error for malformed times, when nothing is open, or if saving fails.
    pub fn update_end_time(&mut self, time_of_day: &str) -> Result<()> {
        self.modify(|w| model::update_end_time(w, time_of_day))?;
        Ok(())
    }

    // --- Templates ---

    pub fn custom_templates(&self) -> &[WorkoutTemplate] {
        &self.custom_templates
    }

    /// Custom templates followed by the built-in presets.
    pub fn all_templates(&self) -> Vec<WorkoutTemplate> {
        self.custom_templates
            .iter()
            .cloned()
            .chain(templates::built_in_templates())
            .collect()
    }

    /// # Errors
    /// Returns `TemplateError` for a blank name or no exercises, or a save error.
    pub fn add_custom_template(
        &mut self,
        name: &str,
        exercises: Vec<TemplateExercise>,
    ) -> Result<WorkoutTemplate> {
        let template = templates::add_custom_template(&mut self.custom_templates, name, exercises)?;
        self.persist_templates()?;
        Ok(template)
    }

    /// Saves a draft; the draft keeps its contents if it is rejected.
    /// # Errors
    /// Returns `TemplateError` for a blank name or no exercises, or a save error.
    pub fn save_template_draft(
        &mut self,
        draft: &mut TemplateDraft,
        name: &str,
    ) -> Result<WorkoutTemplate> {
        let template = draft.build(&mut self.custom_templates, name)?;
        self.persist_templates()?;
        Ok(template)
    }

    /// Deletes a custom template after `confirm` agrees. `Ok(None)` means declined.
    /// # Errors
    /// Returns `TemplateError` for unknown or built-in ids, or a save error.
    pub fn remove_custom_template<F>(&mut self, id: &str, confirm: F) -> Result<Option<WorkoutTemplate>>
    where
        F: FnOnce(&WorkoutTemplate) -> bool,
    {
        let removed = templates::remove_custom_template(&mut self.custom_templates, id, confirm)?;
        if removed.is_some() {
            self.persist_templates()?;
        }
        Ok(removed)
    }

    // --- Analysis ---

    /// Builds a request for the workout currently open.
    /// # Errors
    /// Returns `SessionError::NoEditTarget` if nothing is open.
    pub fn prepare_analysis(&self, gateway: &AnalysisGateway) -> Result<AnalysisRequest, SessionError> {
        self.session
            .target_workout()
            .map(|w| gateway.prepare(w))
            .ok_or(SessionError::NoEditTarget)
    }

    /// Stores a result if it still matches the open workout.
    pub fn accept_analysis(&mut self, tagged: TaggedAnalysis) -> bool {
        self.session.accept_analysis(tagged)
    }

    pub fn analysis(&self) -> Option<&AnalysisResult> {
        self.session.analysis()
    }

    pub fn clear_analysis(&mut self) {
        self.session.clear_analysis();
    }
}
