// src/cli.rs
use clap::{Command, CommandFactory, Parser, Subcommand, ValueEnum};
use clap_complete::Shell;

#[derive(Parser, Debug)]
#[command(author, version, about = "A CLI tool to log workout sessions set by set", long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Output tables as CSV instead of formatted text
    #[arg(long, global = true)]
    pub export_csv: bool,
}

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum UnitsCli {
    Metric,
    Imperial,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Start a new workout session (replaces an unfinished one)
    Start {
        /// Session name; defaults to the template name or today's date
        name: Option<String>,
        /// Template id or name to pre-populate exercises from
        #[arg(short, long)]
        template: Option<String>,
    },
    /// Show the current session state
    Status,
    /// Show the workout being edited, with last-time values as hints
    Show {
        /// Show a finished workout from history instead
        #[arg(long, value_name = "WORKOUT_ID")]
        history: Option<String>,
    },
    /// Add an exercise (starts with one empty set)
    AddExercise {
        /// Exercise name (see 'exercises' for the catalog)
        name: String,
        #[arg(long, value_name = "WORKOUT_ID")]
        history: Option<String>,
    },
    /// Remove an exercise
    RemoveExercise {
        /// Exercise position (1-based), id, or name
        exercise: String,
        #[arg(long, value_name = "WORKOUT_ID")]
        history: Option<String>,
    },
    /// Add a set, copying weight and reps from the previous set
    AddSet {
        /// Exercise position (1-based), id, or name
        exercise: String,
        #[arg(long, value_name = "WORKOUT_ID")]
        history: Option<String>,
    },
    /// Edit weight, reps or notes of a set
    Set {
        /// Exercise position (1-based), id, or name
        exercise: String,
        /// Set number (1-based) or id
        set: String,
        /// Weight; pass an empty string to clear
        #[arg(short, long)]
        weight: Option<String>,
        /// Reps; pass an empty string to clear
        #[arg(short, long)]
        reps: Option<String>,
        /// Notes; pass an empty string to clear
        #[arg(short, long)]
        notes: Option<String>,
        #[arg(long, value_name = "WORKOUT_ID")]
        history: Option<String>,
    },
    /// Mark a set done (or undone). Empty values are filled from last time.
    Complete {
        /// Exercise position (1-based), id, or name
        exercise: String,
        /// Set number (1-based) or id
        set: String,
        #[arg(long, value_name = "WORKOUT_ID")]
        history: Option<String>,
    },
    /// Remove a set
    RemoveSet {
        /// Exercise position (1-based), id, or name
        exercise: String,
        /// Set number (1-based) or id
        set: String,
        #[arg(long, value_name = "WORKOUT_ID")]
        history: Option<String>,
    },
    /// Change the start time (HH:MM) keeping the session's date
    StartTime {
        time: String,
        #[arg(long, value_name = "WORKOUT_ID")]
        history: Option<String>,
    },
    /// Change the end time (HH:MM) on the session's start date
    EndTime {
        time: String,
        #[arg(long, value_name = "WORKOUT_ID")]
        history: Option<String>,
    },
    /// Finish the session and move it to history
    Finish,
    /// List finished workouts, newest first
    History {
        /// Show only the last N entries
        #[arg(short, long, default_value_t = 20)]
        limit: usize,
    },
    /// Show the sets logged the last time an exercise was done
    Previous { exercise: String },
    /// List custom and built-in templates
    Templates,
    /// Create a custom template
    CreateTemplate {
        name: String,
        /// Exercise as NAME or NAME:SETS (repeatable)
        #[arg(short, long = "exercise", value_name = "NAME[:SETS]")]
        exercises: Vec<String>,
    },
    /// Delete a custom template
    DeleteTemplate {
        id: String,
        /// Skip the confirmation prompt
        #[arg(short, long)]
        yes: bool,
    },
    /// Browse the exercise catalog
    Exercises {
        /// Muscle group (Chest, Back, Legs, Shoulders, Arms, Core, Cardio)
        #[arg(short, long)]
        group: Option<String>,
        /// Case-insensitive search over exercise names
        #[arg(short, long, conflicts_with = "group")]
        search: Option<String>,
    },
    /// Ask the AI service for a summary of the open workout
    Analyze {
        #[arg(long, value_name = "WORKOUT_ID")]
        history: Option<String>,
    },
    /// Set preferred units
    SetUnits {
        #[arg(value_enum)]
        units: UnitsCli,
    },
    /// Show the path to the config file
    ConfigPath,
    /// Show the directory where session data is stored
    DataPath,
    /// Generate shell completion scripts
    GenerateCompletion {
        #[arg(value_enum)]
        shell: Shell,
    },
}

impl Commands {
    /// The history entry an edit command was pointed at, if any.
    pub fn history_target(&self) -> Option<&str> {
        match self {
            Self::Show { history }
            | Self::AddExercise { history, .. }
            | Self::RemoveExercise { history, .. }
            | Self::AddSet { history, .. }
            | Self::Set { history, .. }
            | Self::Complete { history, .. }
            | Self::RemoveSet { history, .. }
            | Self::StartTime { history, .. }
            | Self::EndTime { history, .. }
            | Self::Analyze { history } => history.as_deref(),
            _ => None,
        }
    }
}

// Function to parse CLI arguments
pub fn parse_args() -> Cli {
    Cli::parse()
}

pub fn build_cli_command() -> Command {
    Cli::command()
}
