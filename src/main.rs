//src/main.rs
mod cli;

use anyhow::{bail, Context, Result};
use chrono::{DateTime, Duration, Local, Utc};
use comfy_table::{presets::UTF8_FULL, Attribute, Cell, Color, ContentArrangement, Table};
use std::io::{self, stdin, stdout, Write};
use tracing_subscriber::EnvFilter;

use liftlog_lib::{
    catalog, history, parse_color, AnalysisResult, AppService, Exercise, MuscleGroup, SessionMode, Set,
    SetEdit, TemplateDraft, Units, Workout, WorkoutTemplate,
};

/// Whether a command changed the workout it was pointed at.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Outcome {
    Changed,
    Unchanged,
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();

    // --- Check for completion generation request FIRST ---
    let cli_args = cli::parse_args();
    let export_csv = cli_args.export_csv;

    if let cli::Commands::GenerateCompletion { shell } = cli_args.command {
        let mut cmd = cli::build_cli_command();
        let bin_name = cmd.get_name().to_string();

        eprintln!("Generating completion script for {shell}...");
        clap_complete::generate(shell, &mut cmd, bin_name, &mut stdout());
        return Ok(());
    }

    let mut service =
        AppService::initialize().context("Failed to initialize application service")?;

    // `--history <ID>` opens the entry, runs the command against it, then saves or discards.
    let history_target = cli_args.command.history_target().map(ToString::to_string);
    if let Some(id) = &history_target {
        service.open_history_entry(id)?;
    }

    let outcome = run_command(&mut service, cli_args.command, export_csv).await;

    if history_target.is_some() {
        if matches!(outcome, Ok(Outcome::Changed)) {
            let saved = service
                .save_history_edits()
                .context("Failed to save history edits")?;
            println!("Saved changes to '{}' ({}).", saved.name, saved.id);
        } else {
            service.cancel_history_edits()?;
        }
    }

    outcome.map(|_| ())
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(io::stderr)
        .init();
}

async fn run_command(
    service: &mut AppService,
    command: cli::Commands,
    export_csv: bool,
) -> Result<Outcome> {
    let header_color = parse_color(&service.config.theme.header_color)
        .map(Color::from)
        .unwrap_or(Color::Green);
    let units = service.config.units;

    match command {
        cli::Commands::GenerateCompletion { .. } => {
            // Handled before the service is initialized.
        }

        // --- Session lifecycle ---
        cli::Commands::Start { name, template } => {
            if let Some(previous) = service.active_workout() {
                eprintln!("Discarding unfinished session '{}'.", previous.name);
            }
            let workout =
                service.start_session(name.as_deref().unwrap_or(""), template.as_deref())?;
            println!("Started '{}' (ID: {}).", workout.name, workout.id);
            print_workout(service, &workout, header_color);
        }
        cli::Commands::Status => match service.mode() {
            SessionMode::Idle => println!("No workout in progress."),
            SessionMode::Active | SessionMode::ActiveMinimized | SessionMode::EditingHistory => {
                if let Some(workout) = service.active_workout() {
                    print_status(workout);
                }
            }
        },
        cli::Commands::Show { .. } => {
            let workout = target(service)?.clone();
            print_workout(service, &workout, header_color);
        }
        cli::Commands::Finish => {
            let finished = service.finish_session()?;
            println!(
                "Finished '{}': {} sets completed in {}.",
                finished.name,
                finished.completed_set_count(),
                finished
                    .duration()
                    .map_or_else(|| "N/A".to_string(), format_duration)
            );
        }

        // --- Edits on the open workout ---
        cli::Commands::AddExercise { name, .. } => {
            let id = service.add_exercise(&name)?;
            println!("Added exercise '{}' (ID: {id}).", name.trim());
            return Ok(Outcome::Changed);
        }
        cli::Commands::RemoveExercise { exercise, .. } => {
            let found = resolve_exercise(service, &exercise)?;
            service.remove_exercise(&found.id)?;
            println!("Removed exercise '{}'.", found.name);
            return Ok(Outcome::Changed);
        }
        cli::Commands::AddSet { exercise, .. } => {
            let found = resolve_exercise(service, &exercise)?;
            let set = service.add_set(&found.id)?;
            println!(
                "Added set {} to '{}': {}",
                found.sets.len() + 1,
                found.name,
                format_set_values(&set, units)
            );
            return Ok(Outcome::Changed);
        }
        cli::Commands::Set {
            exercise,
            set,
            weight,
            reps,
            notes,
            ..
        } => {
            if weight.is_none() && reps.is_none() && notes.is_none() {
                bail!("Nothing to change. Pass --weight, --reps or --notes.");
            }
            let found = resolve_exercise(service, &exercise)?;
            let (number, set_id) = resolve_set(&found, &set)?;

            let mut edits = Vec::new();
            if let Some(raw) = weight {
                edits.push(SetEdit::Weight(parse_weight(&raw)?));
            }
            if let Some(raw) = reps {
                edits.push(SetEdit::Reps(parse_reps(&raw)?));
            }
            if let Some(text) = notes {
                edits.push(SetEdit::Notes(Some(text)));
            }
            for edit in edits {
                service.update_set(&found.id, &set_id, edit)?;
            }
            println!("Updated set {number} of '{}'.", found.name);
            return Ok(Outcome::Changed);
        }
        cli::Commands::Complete { exercise, set, .. } => {
            let found = resolve_exercise(service, &exercise)?;
            let (number, set_id) = resolve_set(&found, &set)?;
            let updated = service.toggle_set_completion(&found.id, &set_id)?;
            let state = if updated.completed { "done" } else { "not done" };
            println!(
                "Set {number} of '{}' marked {state}: {}",
                found.name,
                format_set_values(&updated, units)
            );
            return Ok(Outcome::Changed);
        }
        cli::Commands::RemoveSet { exercise, set, .. } => {
            let found = resolve_exercise(service, &exercise)?;
            let (number, set_id) = resolve_set(&found, &set)?;
            service.remove_set(&found.id, &set_id)?;
            println!("Removed set {number} from '{}'.", found.name);
            return Ok(Outcome::Changed);
        }
        cli::Commands::StartTime { time, .. } => {
            service.update_start_time(&time)?;
            let workout = target(service)?;
            println!("Start time set to {}.", format_local(workout.start_time));
            return Ok(Outcome::Changed);
        }
        cli::Commands::EndTime { time, .. } => {
            service.update_end_time(&time)?;
            let workout = target(service)?;
            if let Some(end) = workout.end_time {
                println!("End time set to {}.", format_local(end));
            }
            return Ok(Outcome::Changed);
        }

        // --- History ---
        cli::Commands::History { limit } => {
            let entries: Vec<&Workout> = service.history().iter().take(limit).collect();
            if entries.is_empty() {
                println!("No finished workouts yet.");
            } else if export_csv {
                print_history_csv(&entries, units)?;
            } else {
                print_history_table(&entries, header_color, units);
            }
        }
        cli::Commands::Previous { exercise } => match service.previous_sets(&exercise) {
            Some(sets) if export_csv => print_sets_csv(sets, units)?,
            Some(sets) => print_previous_table(&exercise, sets, header_color, units),
            None => println!("No previous sets recorded for '{}'.", exercise.trim()),
        },

        // --- Templates ---
        cli::Commands::Templates => {
            let templates = service.all_templates();
            if export_csv {
                print_templates_csv(&templates)?;
            } else {
                print_templates_table(&templates, header_color);
            }
        }
        cli::Commands::CreateTemplate { name, exercises } => {
            let mut draft = TemplateDraft::new();
            for entry in &exercises {
                if !draft.add_entry(entry) {
                    bail!("Invalid exercise '{entry}'. Use NAME or NAME:SETS.");
                }
            }
            let template = service.save_template_draft(&mut draft, &name)?;
            println!(
                "Created template '{}' with {} exercise(s) (ID: {}).",
                template.name,
                template.exercises.len(),
                template.id
            );
        }
        cli::Commands::DeleteTemplate { id, yes } => {
            let removed = service.remove_custom_template(&id, |template| {
                yes || prompt_confirm(&format!("Delete template '{}'?", template.name))
            })?;
            match removed {
                Some(template) => println!("Deleted template '{}'.", template.name),
                None => println!("Kept template."),
            }
        }

        // --- Catalog ---
        cli::Commands::Exercises { group, search } => {
            let entries: Vec<(MuscleGroup, &str)> = match (group, search) {
                (Some(name), _) => catalog::exercises_for(&name).with_context(|| {
                    let known: Vec<String> =
                        catalog::muscle_groups().iter().map(ToString::to_string).collect();
                    format!("Unknown muscle group '{name}'. Choose one of: {}", known.join(", "))
                })?,
                (None, Some(query)) => catalog::search(&query),
                (None, None) => catalog::search(""),
            };
            if entries.is_empty() {
                println!("No exercises found.");
            } else {
                print_catalog_table(&entries, header_color);
            }
        }

        // --- Analysis ---
        cli::Commands::Analyze { .. } => {
            let gateway = service.analysis_gateway();
            let request = service.prepare_analysis(&gateway)?;
            println!("Analyzing workout...");
            let tagged = gateway.analyze(request).await;
            if service.accept_analysis(tagged) {
                if let Some(result) = service.analysis() {
                    print_analysis(result);
                }
            }
        }

        // --- Config ---
        cli::Commands::SetUnits { units } => {
            let units = match units {
                cli::UnitsCli::Metric => Units::Metric,
                cli::UnitsCli::Imperial => Units::Imperial,
            };
            service.set_units(units)?;
            println!("Units set to {units:?}.");
        }
        cli::Commands::ConfigPath => {
            println!("{}", service.get_config_path().display());
        }
        cli::Commands::DataPath => {
            println!("{}", service.get_data_dir().display());
        }
    }

    Ok(Outcome::Unchanged)
}

// --- Lookups ---

fn target(service: &AppService) -> Result<&Workout> {
    match service.target_workout() {
        Some(workout) => Ok(workout),
        None => bail!("No workout in progress. Start one with 'start'."),
    }
}

fn resolve_exercise(service: &AppService, key: &str) -> Result<Exercise> {
    let workout = target(service)?;
    workout
        .find_exercise(key)
        .cloned()
        .with_context(|| format!("Exercise '{key}' not found in '{}'.", workout.name))
}

/// Returns the 1-based set number and the set id.
fn resolve_set(exercise: &Exercise, key: &str) -> Result<(usize, String)> {
    exercise
        .find_set(key)
        .map(|(index, set)| (index + 1, set.id.clone()))
        .with_context(|| format!("Set '{key}' not found in '{}'.", exercise.name))
}

fn parse_weight(raw: &str) -> Result<Option<f64>> {
    let raw = raw.trim();
    if raw.is_empty() {
        return Ok(None);
    }
    match raw.parse::<f64>() {
        Ok(value) if value.is_finite() && value >= 0.0 => Ok(Some(value)),
        _ => bail!("Invalid weight '{raw}'. Use a non-negative number or an empty string."),
    }
}

fn parse_reps(raw: &str) -> Result<Option<u32>> {
    let raw = raw.trim();
    if raw.is_empty() {
        return Ok(None);
    }
    raw.parse::<u32>()
        .map(Some)
        .with_context(|| format!("Invalid reps '{raw}'. Use a whole number or an empty string."))
}

/// Simple y/N prompt on stdin. Anything but "y"/"yes" declines.
fn prompt_confirm(question: &str) -> bool {
    print!("{question} [y/N]: ");
    if stdout().flush().is_err() {
        return false;
    }
    let mut input = String::new();
    if stdin().read_line(&mut input).is_err() {
        return false;
    }
    matches!(input.trim().to_lowercase().as_str(), "y" | "yes")
}

// --- Formatting ---

fn format_local(time: DateTime<Utc>) -> String {
    time.with_timezone(&Local).format("%Y-%m-%d %H:%M").to_string()
}

fn format_duration(duration: Duration) -> String {
    let minutes = duration.num_minutes().max(0);
    if minutes >= 60 {
        format!("{}h {:02}m", minutes / 60, minutes % 60)
    } else {
        format!("{minutes}m")
    }
}

fn format_weight(weight: Option<f64>) -> String {
    weight.map_or_else(String::new, |w| format!("{w}"))
}

fn format_reps(reps: Option<u32>) -> String {
    reps.map_or_else(String::new, |r| r.to_string())
}

fn format_set_values(set: &Set, units: Units) -> String {
    match (set.weight, set.reps) {
        (Some(w), Some(r)) => format!("{w}{} x {r}", units.weight_label()),
        (Some(w), None) => format!("{w}{} x -", units.weight_label()),
        (None, Some(r)) => format!("- x {r}"),
        (None, None) => "empty".to_string(),
    }
}

fn print_status(workout: &Workout) {
    let total_sets: usize = workout.exercises.iter().map(|e| e.sets.len()).sum();
    println!("In progress: '{}' (ID: {})", workout.name, workout.id);
    println!("  Started:   {}", format_local(workout.start_time));
    let elapsed = Utc::now().signed_duration_since(workout.start_time);
    println!("  Elapsed:   {}", format_duration(elapsed));
    println!("  Exercises: {}", workout.exercises.len());
    println!(
        "  Sets done: {}/{total_sets}",
        workout.completed_set_count()
    );
}

/// Prints every exercise of a workout; the "Last time" column shows the
/// same-index set from the most recent earlier occurrence.
fn print_workout(service: &AppService, workout: &Workout, header_color: Color) {
    let units = service.config.units;
    println!("\n--- {} ---", workout.name);
    println!("Started: {}", format_local(workout.start_time));
    if let Some(end) = workout.end_time {
        println!("Ended:   {}", format_local(end));
    }

    if workout.exercises.is_empty() {
        println!("No exercises yet. Add one with 'add-exercise'.");
        return;
    }

    for (position, exercise) in workout.exercises.iter().enumerate() {
        println!(
            "\n{}. {} ({}/{} sets done)",
            position + 1,
            exercise.name,
            exercise.completed_sets(),
            exercise.sets.len()
        );
        let previous = service.previous_sets(&exercise.name);

        let mut table = Table::new();
        table
            .load_preset(UTF8_FULL)
            .set_content_arrangement(ContentArrangement::Dynamic)
            .set_header(vec![
                Cell::new("Set").fg(header_color),
                Cell::new(format!("Weight ({})", units.weight_label())).fg(header_color),
                Cell::new("Reps").fg(header_color),
                Cell::new("Done").fg(header_color),
                Cell::new("Last time").fg(header_color),
                Cell::new("Notes").fg(header_color),
            ]);

        for (index, set) in exercise.sets.iter().enumerate() {
            let last = history::previous_set_at(previous, index)
                .map_or_else(|| "-".to_string(), |s| format_set_values(s, units));
            let done = if set.completed {
                Cell::new("✔").add_attribute(Attribute::Bold)
            } else {
                Cell::new("")
            };
            table.add_row(vec![
                Cell::new(index + 1),
                Cell::new(format_weight(set.weight)),
                Cell::new(format_reps(set.reps)),
                done,
                Cell::new(last),
                Cell::new(set.notes.as_deref().unwrap_or("")),
            ]);
        }
        println!("{table}");
    }
}

fn print_history_table(entries: &[&Workout], header_color: Color, units: Units) {
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(vec![
            Cell::new("ID").fg(header_color),
            Cell::new("Date").fg(header_color),
            Cell::new("Name").fg(header_color),
            Cell::new("Duration").fg(header_color),
            Cell::new("Exercises").fg(header_color),
            Cell::new("Sets Done").fg(header_color),
            Cell::new(format!("Volume ({})", units.weight_label())).fg(header_color),
        ]);

    for workout in entries {
        table.add_row(vec![
            Cell::new(&workout.id),
            Cell::new(format_local(workout.start_time)),
            Cell::new(&workout.name),
            Cell::new(
                workout
                    .duration()
                    .map_or_else(|| "N/A".to_string(), format_duration),
            ),
            Cell::new(workout.exercises.len()),
            Cell::new(workout.completed_set_count()),
            Cell::new(format!("{:.1}", workout.total_volume())),
        ]);
    }
    println!("{table}");
}

fn print_previous_table(exercise: &str, sets: &[Set], header_color: Color, units: Units) {
    println!("Last time for '{}':", exercise.trim());
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(vec![
            Cell::new("Set").fg(header_color),
            Cell::new(format!("Weight ({})", units.weight_label())).fg(header_color),
            Cell::new("Reps").fg(header_color),
            Cell::new("Done").fg(header_color),
        ]);
    for (index, set) in sets.iter().enumerate() {
        table.add_row(vec![
            Cell::new(index + 1),
            Cell::new(format_weight(set.weight)),
            Cell::new(format_reps(set.reps)),
            Cell::new(if set.completed { "✔" } else { "" }),
        ]);
    }
    println!("{table}");
}

fn print_templates_table(templates: &[WorkoutTemplate], header_color: Color) {
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(vec![
            Cell::new("ID").fg(header_color),
            Cell::new("Name").fg(header_color),
            Cell::new("Category").fg(header_color),
            Cell::new("Exercises").fg(header_color),
        ]);
    for template in templates {
        let exercises = template
            .exercises
            .iter()
            .map(|e| format!("{} x{}", e.name, e.set_count()))
            .collect::<Vec<_>>()
            .join(", ");
        table.add_row(vec![
            Cell::new(&template.id),
            Cell::new(&template.name),
            Cell::new(&template.category),
            Cell::new(exercises),
        ]);
    }
    println!("{table}");
}

fn print_catalog_table(entries: &[(MuscleGroup, &str)], header_color: Color) {
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(vec![
            Cell::new("Muscle Group").fg(header_color),
            Cell::new("Exercise").fg(header_color),
        ]);
    for (group, name) in entries {
        table.add_row(vec![Cell::new(group), Cell::new(name)]);
    }
    println!("{table}");
}

fn print_analysis(result: &AnalysisResult) {
    println!("\n--- Workout Analysis ---");
    println!("{}", result.summary);
    println!("\nFocus: {}", result.muscle_group_focus);
    if !result.tips.is_empty() {
        println!("\nTips:");
        for tip in &result.tips {
            println!("  - {tip}");
        }
    }
    println!();
}

fn print_history_csv(entries: &[&Workout], units: Units) -> Result<()> {
    let mut writer = csv::Writer::from_writer(io::stdout());
    writer.write_record([
        "ID",
        "Start_UTC",
        "End_UTC",
        "Name",
        "Exercises",
        "Sets_Completed",
        &format!("Volume_{}", units.weight_label()),
    ])?;
    for workout in entries {
        writer.write_record([
            workout.id.clone(),
            workout.start_time.to_rfc3339(),
            workout.end_time.map_or_else(String::new, |t| t.to_rfc3339()),
            workout.name.clone(),
            workout.exercises.len().to_string(),
            workout.completed_set_count().to_string(),
            format!("{:.2}", workout.total_volume()),
        ])?;
    }
    writer.flush()?;
    Ok(())
}

fn print_sets_csv(sets: &[Set], units: Units) -> Result<()> {
    let mut writer = csv::Writer::from_writer(io::stdout());
    writer.write_record([
        "Set",
        &format!("Weight_{}", units.weight_label()),
        "Reps",
        "Completed",
        "Notes",
    ])?;
    for (index, set) in sets.iter().enumerate() {
        writer.write_record([
            (index + 1).to_string(),
            format_weight(set.weight),
            format_reps(set.reps),
            set.completed.to_string(),
            set.notes.clone().unwrap_or_default(),
        ])?;
    }
    writer.flush()?;
    Ok(())
}

fn print_templates_csv(templates: &[WorkoutTemplate]) -> Result<()> {
    let mut writer = csv::Writer::from_writer(io::stdout());
    writer.write_record(["Template_ID", "Template", "Category", "Exercise", "Sets"])?;
    for template in templates {
        for exercise in &template.exercises {
            writer.write_record([
                template.id.clone(),
                template.name.clone(),
                template.category.clone(),
                exercise.name.clone(),
                exercise.set_count().to_string(),
            ])?;
        }
    }
    writer.flush()?;
    Ok(())
}
