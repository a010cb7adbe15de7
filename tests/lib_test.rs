use anyhow::Result;
use chrono::{Duration, TimeZone, Utc};
use std::cell::RefCell;
use std::collections::HashMap;
use std::io;
use std::rc::Rc;

use liftlog_lib::{
    store, templates, AnalysisGateway, AppService, Config, FileStore, KeyValueStore, MemoryStore,
    SessionMode, Set, SetEdit, StoreError, TemplateDraft, TemplateError, Units, Workout, WorkoutTemplate,
};

// Helper function to create a test service over an in-memory store
fn create_test_service() -> Result<AppService> {
    service_over(MemoryStore::new())
}

fn service_over<S: KeyValueStore + 'static>(store: S) -> Result<AppService> {
    let config = Config {
        units: Units::Metric,
        ..Default::default()
    };
    AppService::with_store(
        config,
        "test_config.toml".into(),
        ":memory:".into(),
        Box::new(store),
    )
}

fn logged_workout(id: &str, days_ago: i64, exercise: &str, sets: &[(f64, u32)]) -> Workout {
    let start = Utc::now() - Duration::days(days_ago);
    let mut workout = Workout::new(format!("Session {id}"), start);
    workout.id = id.to_string();
    workout.end_time = Some(start + Duration::hours(1));
    let (next, exercise_id) = liftlog_lib::model::add_exercise(&workout, exercise);
    workout = next;
    let exercise = workout
        .exercises
        .iter_mut()
        .find(|e| e.id == exercise_id)
        .unwrap();
    exercise.sets = sets
        .iter()
        .enumerate()
        .map(|(i, (w, r))| {
            let mut set = Set::new(format!("s{i}"), Some(*w), Some(*r));
            set.completed = true;
            set
        })
        .collect();
    workout
}

/// In-memory store that fails either writes or removals of one key. The
/// records are shared so a test can inspect what reached the store.
struct FailingStore {
    records: Rc<RefCell<HashMap<String, String>>>,
    failing_key: &'static str,
    fail_on_remove: bool,
}

impl FailingStore {
    fn new(history: &[Workout], failing_key: &'static str, fail_on_remove: bool) -> Result<Self> {
        let mut records = HashMap::new();
        records.insert(store::HISTORY_KEY.to_string(), serde_json::to_string(history)?);
        Ok(Self {
            records: Rc::new(RefCell::new(records)),
            failing_key,
            fail_on_remove,
        })
    }

    fn check(&self, key: &str, removing: bool) -> Result<(), StoreError> {
        if key == self.failing_key && removing == self.fail_on_remove {
            return Err(StoreError::Io {
                key: key.to_string(),
                source: io::Error::new(io::ErrorKind::Other, "disk full"),
            });
        }
        Ok(())
    }
}

impl KeyValueStore for FailingStore {
    fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        Ok(self.records.borrow().get(key).cloned())
    }

    fn set(&mut self, key: &str, value: &str) -> Result<(), StoreError> {
        self.check(key, false)?;
        self.records.borrow_mut().insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&mut self, key: &str) -> Result<(), StoreError> {
        self.check(key, true)?;
        self.records.borrow_mut().remove(key);
        Ok(())
    }
}

fn store_with_history(history: &[Workout]) -> Result<MemoryStore> {
    let mut store = MemoryStore::new();
    store.set(store::HISTORY_KEY, &serde_json::to_string(history)?)?;
    Ok(store)
}

#[test]
fn test_start_empty_session() -> Result<()> {
    let mut service = create_test_service()?;
    assert_eq!(service.mode(), SessionMode::Idle);

    let workout = service.start_session("Morning Push", None)?;
    assert_eq!(workout.name, "Morning Push");
    assert!(workout.exercises.is_empty());
    assert!(workout.end_time.is_none());
    assert_eq!(service.mode(), SessionMode::Active);
    Ok(())
}

#[test]
fn test_blank_name_gets_dated_default() -> Result<()> {
    let mut service = create_test_service()?;
    let workout = service.start_session("   ", None)?;
    assert!(workout.name.starts_with("Workout "));
    Ok(())
}

#[test]
fn test_start_from_template_by_name() -> Result<()> {
    let mut service = create_test_service()?;
    let workout = service.start_session("", Some("leg day"))?;

    let template = templates::find_template(&[], "Leg Day").unwrap();

    assert_eq!(workout.name, "Leg Day");
    assert_eq!(workout.exercises.len(), template.exercises.len());
    for (exercise, planned) in workout.exercises.iter().zip(&template.exercises) {
        assert_eq!(exercise.name, planned.name);
        assert_eq!(exercise.sets.len(), planned.set_count() as usize);
        assert!(exercise.sets.iter().all(|s| !s.is_logged() && !s.completed));
    }
    // Squats are planned with four sets.
    assert_eq!(workout.exercises[0].sets.len(), 4);
    Ok(())
}

#[test]
fn test_zero_set_template_exercise_gets_default_sets() -> Result<()> {
    let mut service = create_test_service()?;
    let blueprint = vec![
        liftlog_lib::TemplateExercise::new("Squat", 0),
        liftlog_lib::TemplateExercise::new("Lunge", 2),
    ];
    let workout = service.start_session_with("Legs", Some(blueprint.as_slice()))?;
    assert_eq!(workout.exercises[0].sets.len(), 3);
    assert_eq!(workout.exercises[1].sets.len(), 2);
    Ok(())
}

#[test]
fn test_start_with_unknown_template_fails() -> Result<()> {
    let mut service = create_test_service()?;
    assert!(service.start_session("x", Some("does-not-exist")).is_err());
    assert!(service.active_workout().is_none());
    Ok(())
}

#[test]
fn test_add_set_carries_forward() -> Result<()> {
    let mut service = create_test_service()?;
    service.start_session("Pull", None)?;
    let exercise_id = service.add_exercise("Barbell Row")?;

    let first_set_id = service.active_workout().unwrap().exercises[0].sets[0].id.clone();
    service.update_set(&exercise_id, &first_set_id, SetEdit::Weight(Some(60.0)))?;
    service.update_set(&exercise_id, &first_set_id, SetEdit::Reps(Some(8)))?;
    service.update_set(&exercise_id, &first_set_id, SetEdit::Notes(Some("slow".into())))?;

    let added = service.add_set(&exercise_id)?;
    assert_eq!(added.weight, Some(60.0));
    assert_eq!(added.reps, Some(8));
    assert!(!added.completed);
    assert_eq!(added.notes, None);
    assert_ne!(added.id, first_set_id);
    Ok(())
}

#[test]
fn test_add_then_remove_exercise_is_identity() -> Result<()> {
    let mut service = create_test_service()?;
    service.start_session("", Some("t1"))?;
    let before = service.active_workout().unwrap().exercises.clone();

    let id = service.add_exercise("Cable Flys")?;
    assert_eq!(service.active_workout().unwrap().exercises.len(), before.len() + 1);
    service.remove_exercise(&id)?;

    assert_eq!(service.active_workout().unwrap().exercises, before);
    Ok(())
}

#[test]
fn test_blank_exercise_name_is_rejected() -> Result<()> {
    let mut service = create_test_service()?;
    service.start_session("x", None)?;
    assert!(service.add_exercise("  ").is_err());
    Ok(())
}

#[test]
fn test_edits_without_session_fail() -> Result<()> {
    let mut service = create_test_service()?;
    assert!(service.add_exercise("Squat").is_err());
    assert!(service.finish_session().is_err());
    Ok(())
}

#[test]
fn test_previous_sets_use_most_recent_occurrence() -> Result<()> {
    let older = logged_workout("old", 7, "Bench", &[(80.0, 5)]);
    let newer = logged_workout("new", 3, "bench", &[(85.0, 5)]);
    // Stored order deliberately not newest first.
    let service = service_over(store_with_history(&[older, newer])?)?;

    let sets = service.previous_sets("BENCH").unwrap();
    assert_eq!(sets.len(), 1);
    assert_eq!(sets[0].weight, Some(85.0));
    assert!(service.previous_sets("Squat").is_none());
    Ok(())
}

#[test]
fn test_completion_backfills_from_history() -> Result<()> {
    let previous = logged_workout("prev", 2, "Deadlift", &[(140.0, 5), (150.0, 3)]);
    let mut service = service_over(store_with_history(&[previous])?)?;

    service.start_session("Pull", None)?;
    let exercise_id = service.add_exercise("Deadlift")?;
    let second = service.add_set(&exercise_id)?;
    service.update_set(&exercise_id, &second.id, SetEdit::Reps(Some(4)))?;

    let done = service.toggle_set_completion(&exercise_id, &second.id)?;
    assert!(done.completed);
    assert_eq!(done.weight, Some(150.0));
    assert_eq!(done.reps, Some(4));

    let undone = service.toggle_set_completion(&exercise_id, &second.id)?;
    assert!(!undone.completed);
    assert_eq!(undone.weight, Some(150.0));
    Ok(())
}

#[test]
fn test_finish_moves_session_to_front_of_history() -> Result<()> {
    let earlier = logged_workout("earlier", 1, "Squat", &[(100.0, 5)]);
    let mut service = service_over(store_with_history(&[earlier])?)?;

    let started = service.start_session("Today", None)?;
    let finished = service.finish_session()?;

    assert_eq!(finished.id, started.id);
    assert!(finished.end_time.is_some());
    assert_eq!(service.history().len(), 2);
    assert_eq!(service.history()[0].id, started.id);
    assert!(service.active_workout().is_none());
    assert_eq!(service.mode(), SessionMode::Idle);
    Ok(())
}

#[test]
fn test_finish_keeps_existing_end_time() -> Result<()> {
    let mut service = create_test_service()?;
    let started = service.start_session("Evening", None)?;
    let start_local = started.start_time.with_timezone(&chrono::Local);
    service.update_start_time("23:58")?;
    service.update_end_time("23:59")?;
    let end = service.active_workout().unwrap().end_time;
    assert!(end.is_some());

    let finished = service.finish_session()?;
    assert_eq!(finished.end_time, end);
    assert_eq!(
        finished.start_time.with_timezone(&chrono::Local).date_naive(),
        start_local.date_naive()
    );
    Ok(())
}

#[test]
fn test_malformed_time_is_rejected() -> Result<()> {
    let mut service = create_test_service()?;
    let started = service.start_session("x", None)?;
    assert!(service.update_start_time("25:99").is_err());
    assert!(service.update_start_time("noon").is_err());
    assert_eq!(service.active_workout().unwrap().start_time, started.start_time);
    Ok(())
}

#[test]
fn test_history_edit_does_not_touch_active_session() -> Result<()> {
    let past = logged_workout("past", 5, "Overhead Press", &[(40.0, 8)]);
    let mut service = service_over(store_with_history(&[past])?)?;
    service.start_session("Current", None)?;
    service.add_exercise("Curl")?;
    let active_before = service.active_workout().cloned();

    service.open_history_entry("past")?;
    assert_eq!(service.mode(), SessionMode::EditingHistory);
    service.add_exercise("Lateral Raise")?;
    let saved = service.save_history_edits()?;

    assert_eq!(saved.exercises.len(), 2);
    assert_eq!(service.history_entry("past").unwrap().exercises.len(), 2);
    assert_eq!(service.active_workout().cloned(), active_before);
    assert_eq!(service.mode(), SessionMode::Active);
    Ok(())
}

#[test]
fn test_cancelled_history_edit_leaves_entry_unchanged() -> Result<()> {
    let past = logged_workout("past", 5, "Dips", &[(0.0, 12)]);
    let mut service = service_over(store_with_history(&[past.clone()])?)?;

    service.open_history_entry("past")?;
    let exercise_id = service.target_workout().unwrap().exercises[0].id.clone();
    service.remove_exercise(&exercise_id)?;
    service.cancel_history_edits()?;

    assert_eq!(service.history_entry("past"), Some(&past));
    assert!(service.save_history_edits().is_err());
    Ok(())
}

#[test]
fn test_history_edit_does_not_backfill_from_itself() -> Result<()> {
    let mut past = logged_workout("past", 5, "Bench", &[(70.0, 10)]);
    past.exercises[0].sets[0].completed = false;
    past.exercises[0].sets[0].weight = None;
    let mut service = service_over(store_with_history(&[past])?)?;

    service.open_history_entry("past")?;
    assert!(service.previous_sets("Bench").is_none());
    Ok(())
}

#[test]
fn test_state_survives_reload() -> Result<()> {
    let dir = tempfile::tempdir()?;

    let (active_id, template_id) = {
        let mut service = service_over(FileStore::open(dir.path())?)?;
        service.start_session("Finished one", None)?;
        service.add_exercise("Squat")?;
        service.finish_session()?;
        let active = service.start_session("Still going", Some("t2"))?;
        let template = service.add_custom_template(
            "Quick",
            vec![liftlog_lib::TemplateExercise::new("Push-ups", 2)],
        )?;
        (active.id, template.id)
    };

    let service = service_over(FileStore::open(dir.path())?)?;
    assert_eq!(service.active_workout().map(|w| w.id.as_str()), Some(active_id.as_str()));
    assert_eq!(service.history().len(), 1);
    assert_eq!(service.history()[0].exercises[0].name, "Squat");
    assert_eq!(service.custom_templates().len(), 1);
    assert_eq!(service.custom_templates()[0].id, template_id);
    Ok(())
}

#[test]
fn test_empty_values_are_written_as_empty_strings() -> Result<()> {
    let dir = tempfile::tempdir()?;
    {
        let mut service = service_over(FileStore::open(dir.path())?)?;
        service.start_session("x", None)?;
        service.add_exercise("Row")?;
    }
    let raw = std::fs::read_to_string(dir.path().join("activeWorkout.json"))?;
    let value: serde_json::Value = serde_json::from_str(&raw)?;
    let set = &value["exercises"][0]["sets"][0];
    assert_eq!(set["weight"], "");
    assert_eq!(set["reps"], "");
    assert_eq!(set["completed"], false);
    Ok(())
}

#[test]
fn test_legacy_templates_migrate_on_load() -> Result<()> {
    let mut store = MemoryStore::new();
    store.set(
        store::CUSTOM_TEMPLATES_KEY,
        r#"[{"id":"abc","name":"Old","category":"Custom","exercises":["Squat",{"name":"Lunge","sets":4}]}]"#,
    )?;
    let mut service = service_over(store)?;

    let template = &service.custom_templates()[0];
    assert_eq!(template.exercises[0].name, "Squat");
    assert_eq!(template.exercises[0].sets, 3);
    assert_eq!(template.exercises[1].sets, 4);

    let workout = service.start_session("", Some("abc"))?;
    assert_eq!(workout.exercises[0].sets.len(), 3);
    assert_eq!(workout.exercises[1].sets.len(), 4);
    Ok(())
}

#[test]
fn test_corrupt_records_are_recovered() -> Result<()> {
    let mut store = MemoryStore::new();
    store.set(store::ACTIVE_WORKOUT_KEY, "{not json")?;
    store.set(store::HISTORY_KEY, "[1, 2")?;
    let service = service_over(store)?;

    assert!(service.active_workout().is_none());
    assert!(service.history().is_empty());
    assert_eq!(service.mode(), SessionMode::Idle);
    Ok(())
}

#[test]
fn test_template_validation() -> Result<()> {
    let mut service = create_test_service()?;

    let blank = service.add_custom_template("  ", vec![liftlog_lib::TemplateExercise::new("Row", 3)]);
    assert!(matches!(
        blank.unwrap_err().downcast_ref::<TemplateError>(),
        Some(TemplateError::BlankName)
    ));

    let empty = service.add_custom_template("Nothing", Vec::new());
    assert!(matches!(
        empty.unwrap_err().downcast_ref::<TemplateError>(),
        Some(TemplateError::NoExercises)
    ));
    assert!(service.custom_templates().is_empty());
    Ok(())
}

#[test]
fn test_template_draft_keeps_contents_on_rejection() -> Result<()> {
    let mut service = create_test_service()?;
    let mut draft = TemplateDraft::new();
    assert!(draft.add_entry("Hip Thrust:4"));
    assert!(draft.add_entry("Calf Raise"));

    assert!(service.save_template_draft(&mut draft, "").is_err());
    assert_eq!(draft.exercises().len(), 2);

    let saved = service.save_template_draft(&mut draft, "Glutes")?;
    assert_eq!(saved.category, "Custom");
    assert_eq!(saved.exercises[0].sets, 4);
    assert_eq!(saved.exercises[1].sets, 3);
    assert!(draft.exercises().is_empty());

    let all: Vec<WorkoutTemplate> = service.all_templates();
    assert_eq!(all[0].id, saved.id);
    assert_eq!(all.len(), 6);
    Ok(())
}

#[test]
fn test_template_deletion_requires_confirmation() -> Result<()> {
    let mut service = create_test_service()?;
    let template = service.add_custom_template(
        "Temp",
        vec![liftlog_lib::TemplateExercise::new("Plank", 1)],
    )?;

    assert!(service.remove_custom_template(&template.id, |_| false)?.is_none());
    assert_eq!(service.custom_templates().len(), 1);

    let removed = service.remove_custom_template(&template.id, |t| t.name == "Temp")?;
    assert_eq!(removed.map(|t| t.id), Some(template.id));
    assert!(service.custom_templates().is_empty());

    assert!(service.remove_custom_template("t1", |_| true).is_err());
    Ok(())
}

#[tokio::test]
async fn test_analysis_without_credential_uses_fallback() -> Result<()> {
    let mut service = create_test_service()?;
    service.start_session("Arms", None)?;
    let gateway = AnalysisGateway::new(None, Units::Metric);

    let request = service.prepare_analysis(&gateway)?;
    let tagged = gateway.analyze(request).await;
    assert!(service.accept_analysis(tagged));

    let result = service.analysis().unwrap();
    assert_eq!(result.muscle_group_focus, "Full Body");
    assert_eq!(result.summary, "Great job completing your workout!");
    assert_eq!(result.tips.len(), 3);
    Ok(())
}

#[tokio::test]
async fn test_stale_analysis_is_discarded() -> Result<()> {
    let mut service = create_test_service()?;
    service.start_session("First", None)?;
    let gateway = AnalysisGateway::new(None, Units::Metric);
    let request = service.prepare_analysis(&gateway)?;

    service.start_session("Second", None)?;
    let tagged = gateway.analyze(request).await;
    assert!(!service.accept_analysis(tagged));
    assert!(service.analysis().is_none());
    Ok(())
}

#[test]
fn test_analysis_without_target_fails() -> Result<()> {
    let service = create_test_service()?;
    let gateway = AnalysisGateway::new(None, Units::Metric);
    assert!(service.prepare_analysis(&gateway).is_err());
    Ok(())
}

#[test]
fn test_minimize_and_resume() -> Result<()> {
    let mut service = create_test_service()?;
    assert!(service.minimize().is_err());

    service.start_session("x", None)?;
    service.minimize()?;
    assert_eq!(service.mode(), SessionMode::ActiveMinimized);
    service.resume()?;
    assert_eq!(service.mode(), SessionMode::Active);
    Ok(())
}

#[test]
fn test_history_dates_parse_from_browser_format() -> Result<()> {
    let mut store = MemoryStore::new();
    store.set(
        store::HISTORY_KEY,
        r#"[{"id":"w1","name":"Legacy","startTime":"2024-03-01T17:30:00.000Z","endTime":"2024-03-01T18:30:00.000Z","exercises":[{"id":"e1","name":"Squat","sets":[{"id":"s1","weight":"100","reps":5,"completed":true}]}]}]"#,
    )?;
    let service = service_over(store)?;

    let workout = &service.history()[0];
    assert_eq!(
        workout.start_time,
        Utc.with_ymd_and_hms(2024, 3, 1, 17, 30, 0).unwrap()
    );
    assert_eq!(workout.duration(), Some(Duration::hours(1)));
    assert_eq!(workout.exercises[0].sets[0].weight, Some(100.0));
    Ok(())
}

#[test]
fn test_failed_history_write_keeps_session_open() -> Result<()> {
    let earlier = logged_workout("earlier", 1, "Squat", &[(100.0, 5)]);
    let store = FailingStore::new(&[earlier], store::HISTORY_KEY, false)?;
    let mut service = service_over(store)?;

    let started = service.start_session("Today", None)?;
    assert!(service.finish_session().is_err());

    assert_eq!(service.active_workout().map(|w| w.id.clone()), Some(started.id));
    assert!(service.active_workout().unwrap().end_time.is_none());
    assert_eq!(service.history().len(), 1);
    assert_eq!(service.history()[0].id, "earlier");
    Ok(())
}

#[test]
fn test_failed_active_clear_reverts_history() -> Result<()> {
    let earlier = logged_workout("earlier", 1, "Squat", &[(100.0, 5)]);
    let store = FailingStore::new(&[earlier], store::ACTIVE_WORKOUT_KEY, true)?;
    let records = Rc::clone(&store.records);
    let mut service = service_over(store)?;

    let started = service.start_session("Today", None)?;
    assert!(service.finish_session().is_err());

    assert_eq!(service.active_workout().map(|w| w.id.clone()), Some(started.id));
    assert_eq!(service.history().len(), 1);

    let stored = records.borrow();
    let on_disk: Vec<Workout> = serde_json::from_str(&stored[store::HISTORY_KEY])?;
    assert_eq!(on_disk.len(), 1);
    assert_eq!(on_disk[0].id, "earlier");
    assert!(stored.contains_key(store::ACTIVE_WORKOUT_KEY));
    Ok(())
}

#[tokio::test]
async fn test_dismissed_analysis_is_gone() -> Result<()> {
    let mut service = create_test_service()?;
    service.start_session("Arms", None)?;
    let gateway = AnalysisGateway::new(None, Units::Metric);
    let tagged = gateway.analyze(service.prepare_analysis(&gateway)?).await;
    assert!(service.accept_analysis(tagged));

    service.clear_analysis();
    assert!(service.analysis().is_none());
    assert!(service.active_workout().is_some());
    Ok(())
}
