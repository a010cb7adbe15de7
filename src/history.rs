//src/history.rs
use crate::model::{Set, Workout};

/// Sets logged for `exercise_name` in the most recent (by start time) workout
/// that contains it. Names match case-insensitively and exactly.
pub fn find_previous_sets<'a>(history: &'a [Workout], exercise_name: &str) -> Option<&'a [Set]> {
    find_previous_sets_excluding(history, exercise_name, None)
}

/// Same as [`find_previous_sets`], skipping the workout with id `exclude_id`.
/// Used while a history entry is being edited so it does not look itself up.
pub fn find_previous_sets_excluding<'a>(
    history: &'a [Workout],
    exercise_name: &str,
    exclude_id: Option<&str>,
) -> Option<&'a [Set]> {
    let needle = exercise_name.to_lowercase();
    newest_first(history)
        .into_iter()
        .filter(|w| Some(w.id.as_str()) != exclude_id)
        .find_map(|w| {
            w.exercises
                .iter()
                .find(|e| e.name.to_lowercase() == needle)
        })
        .map(|e| e.sets.as_slice())
}

/// Same-index set from a previous occurrence, used as placeholder and backfill source.
pub fn previous_set_at(previous: Option<&[Set]>, index: usize) -> Option<&Set> {
    previous.and_then(|sets| sets.get(index))
}

/// History ordered by start time, newest first. Ties keep their stored order.
pub fn newest_first(history: &[Workout]) -> Vec<&Workout> {
    let mut ordered: Vec<&Workout> = history.iter().collect();
    ordered.sort_by(|a, b| b.start_time.cmp(&a.start_time));
    ordered
}
