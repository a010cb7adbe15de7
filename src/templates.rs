//src/templates.rs
use thiserror::Error;
use tracing::info;

use crate::model::{unique_id, TemplateExercise, WorkoutTemplate, DEFAULT_TEMPLATE_SETS};

pub const CUSTOM_CATEGORY: &str = "Custom";

#[derive(Error, Debug, PartialEq, Eq)]
pub enum TemplateError {
    #[error("Please enter a name for the template.")]
    BlankName,
    #[error("A template needs at least one exercise.")]
    NoExercises,
    #[error("Template not found: {0}")]
    NotFound(String),
    #[error("'{0}' is a built-in template and cannot be deleted.")]
    BuiltInReadOnly(String),
}

struct Preset {
    id: &'static str,
    category: &'static str,
    name: &'static str,
    description: &'static str,
    exercises: &'static [(&'static str, u32)],
}

const PRESETS: &[Preset] = &[
    Preset {
        id: "t1",
        category: "Chest",
        name: "Chest Focus",
        description: "Build a bigger chest with these compound and isolation movements.",
        exercises: &[
            ("Barbell Bench Press", 3),
            ("Incline Dumbbell Press", 3),
            ("Cable Flys", 3),
            ("Push-ups", 3),
        ],
    },
    Preset {
        id: "t2",
        category: "Back",
        name: "Back Builder",
        description: "Widen your lats and thicken your back.",
        exercises: &[
            ("Lat Pulldowns", 3),
            ("Barbell Rows", 3),
            ("Face Pulls", 3),
            ("Deadlifts", 3),
        ],
    },
    Preset {
        id: "t3",
        category: "Legs",
        name: "Leg Day",
        description: "The foundation of strength. Quads, hams, and glutes.",
        exercises: &[
            ("Squats", 4),
            ("Leg Press", 3),
            ("Romanian Deadlifts", 3),
            ("Calf Raises", 4),
        ],
    },
    Preset {
        id: "t4",
        category: "Shoulders",
        name: "Boulder Shoulders",
        description: "Develop 3D delts with overhead and isolation work.",
        exercises: &[
            ("Overhead Press", 4),
            ("Lateral Raises", 3),
            ("Front Raises", 3),
            ("Shrugs", 3),
        ],
    },
    Preset {
        id: "t5",
        category: "Arms",
        name: "Arm Farm",
        description: "Biceps and triceps supersets for maximum pump.",
        exercises: &[
            ("Barbell Curls", 3),
            ("Tricep Pushdowns", 3),
            ("Hammer Curls", 3),
            ("Skullcrushers", 3),
        ],
    },
];

/// The read-only preset routines.
pub fn built_in_templates() -> Vec<WorkoutTemplate> {
    PRESETS
        .iter()
        .map(|p| WorkoutTemplate {
            id: p.id.to_string(),
            name: p.name.to_string(),
            category: p.category.to_string(),
            description: Some(p.description.to_string()),
            exercises: p
                .exercises
                .iter()
                .map(|(name, sets)| TemplateExercise::new(*name, *sets))
                .collect(),
        })
        .collect()
}

pub fn is_built_in(id: &str) -> bool {
    PRESETS.iter().any(|p| p.id == id)
}

/// Resolves a template by id or case-insensitive name, custom templates first.
pub fn find_template(custom: &[WorkoutTemplate], key: &str) -> Option<WorkoutTemplate> {
    let key = key.trim();
    let by_key = |t: &WorkoutTemplate| t.id == key || t.name.eq_ignore_ascii_case(key);
    custom
        .iter()
        .find(|t| by_key(t))
        .cloned()
        .or_else(|| built_in_templates().into_iter().find(|t| by_key(t)))
}

/// Validates and appends a user template with category "Custom".
pub fn add_custom_template(
    templates: &mut Vec<WorkoutTemplate>,
    name: &str,
    exercises: Vec<TemplateExercise>,
) -> Result<WorkoutTemplate, TemplateError> {
    let name = name.trim();
    if name.is_empty() {
        return Err(TemplateError::BlankName);
    }
    if exercises.is_empty() {
        return Err(TemplateError::NoExercises);
    }
    let template = WorkoutTemplate {
        id: unique_id(
            templates
                .iter()
                .map(|t| t.id.as_str())
                .chain(PRESETS.iter().map(|p| p.id)),
        ),
        name: name.to_string(),
        category: CUSTOM_CATEGORY.to_string(),
        description: None,
        exercises,
    };
    info!(id = %template.id, name = %template.name, "Created custom template");
    templates.push(template.clone());
    Ok(template)
}

/// Removes a custom template once `confirm` agrees. Returns `Ok(None)` when
/// the user declined.
pub fn remove_custom_template<F>(
    templates: &mut Vec<WorkoutTemplate>,
    id: &str,
    confirm: F,
) -> Result<Option<WorkoutTemplate>, TemplateError>
where
    F: FnOnce(&WorkoutTemplate) -> bool,
{
    let Some(index) = templates.iter().position(|t| t.id == id) else {
        if is_built_in(id) {
            return Err(TemplateError::BuiltInReadOnly(id.to_string()));
        }
        return Err(TemplateError::NotFound(id.to_string()));
    };
    if !confirm(&templates[index]) {
        return Ok(None);
    }
    let removed = templates.remove(index);
    info!(id = %removed.id, "Deleted custom template");
    Ok(Some(removed))
}

/// A template being put together exercise by exercise.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TemplateDraft {
    exercises: Vec<TemplateExercise>,
}

impl TemplateDraft {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn exercises(&self) -> &[TemplateExercise] {
        &self.exercises
    }

    /// Adds an exercise; blank names are ignored and the count is at least 1.
    pub fn add_exercise(&mut self, name: &str, sets: u32) -> bool {
        let name = name.trim();
        if name.is_empty() {
            return false;
        }
        self.exercises.push(TemplateExercise::new(name, sets.max(1)));
        true
    }

    /// Parses `NAME` or `NAME:SETS`; a missing or unparsable count uses the default.
    pub fn add_entry(&mut self, entry: &str) -> bool {
        if let Some((name, sets)) = entry.rsplit_once(':') {
            if let Ok(sets) = sets.trim().parse::<u32>() {
                return self.add_exercise(name, sets);
            }
        }
        self.add_exercise(entry, DEFAULT_TEMPLATE_SETS)
    }

    pub fn remove_exercise(&mut self, index: usize) -> Option<TemplateExercise> {
        (index < self.exercises.len()).then(|| self.exercises.remove(index))
    }

    /// Saves the draft as a custom template. On rejection the draft keeps its
    /// contents so it can be corrected; on success it is cleared.
    pub fn build(
        &mut self,
        templates: &mut Vec<WorkoutTemplate>,
        name: &str,
    ) -> Result<WorkoutTemplate, TemplateError> {
        let template = add_custom_template(templates, name, self.exercises.clone())?;
        self.exercises.clear();
        Ok(template)
    }
}
