//src/catalog.rs
use std::str::FromStr;
use strum::IntoEnumIterator;
use strum_macros::{Display, EnumIter, EnumString};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, EnumIter, EnumString, Display)]
#[strum(ascii_case_insensitive)]
pub enum MuscleGroup {
    Chest,
    Back,
    Legs,
    Shoulders,
    Arms,
    Core,
    Cardio,
}

impl MuscleGroup {
    pub fn exercises(self) -> &'static [&'static str] {
        match self {
            Self::Chest => &[
                "Barbell Bench Press",
                "Incline Dumbbell Press",
                "Flat Dumbbell Press",
                "Cable Flys",
                "Push-ups",
                "Dips",
                "Machine Chest Press",
                "Pec Deck",
            ],
            Self::Back => &[
                "Deadlift",
                "Pull-ups",
                "Lat Pulldowns",
                "Barbell Rows",
                "Seated Cable Rows",
                "Dumbbell Rows",
                "Face Pulls",
                "T-Bar Rows",
                "Straight Arm Pulldowns",
            ],
            Self::Legs => &[
                "Barbell Squat",
                "Leg Press",
                "Romanian Deadlift",
                "Leg Extensions",
                "Lying Leg Curls",
                "Seated Leg Curls",
                "Bulgarian Split Squats",
                "Calf Raises",
                "Lunges",
                "Hack Squat",
            ],
            Self::Shoulders => &[
                "Overhead Press (OHP)",
                "Seated Dumbbell Press",
                "Lateral Raises",
                "Front Raises",
                "Rear Delt Flys",
                "Upright Rows",
                "Shrugs",
                "Arnold Press",
            ],
            Self::Arms => &[
                "Barbell Curls",
                "Dumbbell Curls",
                "Hammer Curls",
                "Preacher Curls",
                "Tricep Pushdowns",
                "Skullcrushers",
                "Overhead Tricep Extension",
                "Close-Grip Bench Press",
                "Dips (Triceps)",
            ],
            Self::Core => &[
                "Plank",
                "Crunches",
                "Leg Raises",
                "Russian Twists",
                "Ab Wheel Rollout",
                "Cable Crunches",
            ],
            Self::Cardio => &[
                "Treadmill",
                "Elliptical",
                "Stairmaster",
                "Rowing Machine",
                "Cycling",
            ],
        }
    }
}

pub fn muscle_groups() -> Vec<MuscleGroup> {
    MuscleGroup::iter().collect()
}

/// Exercises of the group named `group` (case-insensitive), if it exists.
pub fn exercises_for(group: &str) -> Option<Vec<(MuscleGroup, &'static str)>> {
    let group = MuscleGroup::from_str(group.trim()).ok()?;
    Some(group.exercises().iter().map(|name| (group, *name)).collect())
}

/// Case-insensitive substring search over every catalog entry.
pub fn search(query: &str) -> Vec<(MuscleGroup, &'static str)> {
    let needle = query.trim().to_lowercase();
    MuscleGroup::iter()
        .flat_map(|group| group.exercises().iter().map(move |name| (group, *name)))
        .filter(|(_, name)| name.to_lowercase().contains(&needle))
        .collect()
}
