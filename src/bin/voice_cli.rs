use std::fs;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::{bail, Context, Result};
use chrono::Utc;
use clap::{Parser, Subcommand};
use serde::Serialize;
use voice_trainer::analysis::{
    analyze_samples, calculate_projections, classify, nearest_reference, PitchProjection,
    ReferenceVoice, VoiceProfile,
};
use voice_trainer::config::AppConfig;
use voice_trainer::fixtures;
use voice_trainer::workout::{ExerciseCatalog, WorkoutEffect, WorkoutEvent, WorkoutMachine};
use voice_trainer::CatalogOverview;

#[derive(Parser, Debug)]
#[command(
    name = "voice_cli",
    about = "Desktop harness for the Voice Trainer pitch and workout engine"
)]
struct Cli {
    /// JSON config file (defaults apply when missing)
    #[arg(long)]
    config: Option<PathBuf>,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Measure the settled pitch of a WAV take
    Analyze {
        #[arg(long)]
        wav: PathBuf,
    },
    /// Print the voice profile for a pitch
    Classify {
        #[arg(long)]
        hz: f32,
    },
    /// Run a workout with every timer expiring naturally
    Simulate {
        /// Catalog JSON file; the default workout when omitted
        #[arg(long)]
        catalog: Option<PathBuf>,
        /// Pitch of the synthetic phrase takes
        #[arg(long, default_value_t = 110.0)]
        take_hz: f32,
        /// Print a snapshot on every tick, not only on position changes
        #[arg(long)]
        every_tick: bool,
    },
    /// Print a catalog and its estimated duration
    Catalog {
        #[arg(long)]
        catalog: Option<PathBuf>,
    },
}

#[derive(Serialize)]
struct AnalyzeReport {
    file: String,
    duration_ms: u64,
    settled_hz: Option<f32>,
    pitch_min_hz: Option<f32>,
    pitch_max_hz: Option<f32>,
    voiced_frames: u32,
    total_frames: u32,
    profile: Option<VoiceProfile>,
    nearest_reference: Option<ReferenceVoice>,
    projections: Option<PitchProjection>,
}

#[derive(Serialize)]
struct ClassifyReport {
    profile: VoiceProfile,
    nearest_reference: ReferenceVoice,
    projections: PitchProjection,
}

fn main() -> ExitCode {
    voice_trainer::init_logging();
    match run() {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("Error: {err:?}");
            ExitCode::from(1)
        }
    }
}

fn run() -> Result<()> {
    let cli = Cli::parse();
    let config = match &cli.config {
        Some(path) => AppConfig::load_from_file(path),
        None => AppConfig::default(),
    };

    match cli.command {
        Commands::Analyze { wav } => run_analyze(&config, &wav),
        Commands::Classify { hz } => run_classify(hz),
        Commands::Simulate {
            catalog,
            take_hz,
            every_tick,
        } => run_simulate(&config, catalog.as_deref(), take_hz, every_tick),
        Commands::Catalog { catalog } => run_catalog(&config, catalog.as_deref()),
    }
}

fn load_catalog(path: Option<&Path>) -> Result<ExerciseCatalog> {
    match path {
        Some(path) => {
            let json = fs::read_to_string(path)
                .with_context(|| format!("reading catalog {}", path.display()))?;
            ExerciseCatalog::from_json(&json)
                .with_context(|| format!("validating catalog {}", path.display()))
        }
        None => Ok(ExerciseCatalog::default_workout()),
    }
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string(value).context("serializing output")?);
    Ok(())
}

fn run_analyze(config: &AppConfig, wav: &Path) -> Result<()> {
    let clip = fixtures::load_wav(wav)?;
    let mut config = config.clone();
    config.pitch.sample_rate = clip.sample_rate;
    let take = analyze_samples(&clip.samples, &config)
        .with_context(|| format!("analyzing {} at {} Hz", wav.display(), clip.sample_rate))?;

    print_json(&AnalyzeReport {
        file: wav.display().to_string(),
        duration_ms: take.duration_ms,
        settled_hz: take.settled_hz,
        pitch_min_hz: take.pitch_min_hz,
        pitch_max_hz: take.pitch_max_hz,
        voiced_frames: take.voiced_frames,
        total_frames: take.total_frames,
        profile: take.settled_hz.map(classify),
        nearest_reference: take.settled_hz.map(nearest_reference),
        projections: take.settled_hz.map(calculate_projections),
    })
}

fn run_classify(hz: f32) -> Result<()> {
    if !hz.is_finite() || hz <= 0.0 {
        bail!("pitch must be a positive number of Hz, got {hz}");
    }
    print_json(&ClassifyReport {
        profile: classify(hz),
        nearest_reference: nearest_reference(hz),
        projections: calculate_projections(hz),
    })
}

fn run_simulate(
    config: &AppConfig,
    catalog: Option<&Path>,
    take_hz: f32,
    every_tick: bool,
) -> Result<()> {
    let catalog = load_catalog(catalog)?;
    let sample_rate = config.pitch.sample_rate;
    let phrase_audio =
        fixtures::harmonic_tone(take_hz, sample_rate, sample_rate as usize * 2, &[0.4, 0.2, 0.1]);
    let take = analyze_samples(&phrase_audio, config).context("preparing synthetic take")?;

    let tick_ms = config.workout.tick_millis.max(1);
    let mut machine = WorkoutMachine::new(catalog, config.workout.rest_seconds);
    machine.apply(WorkoutEvent::Start { at: Utc::now() })?;
    let mut last_epoch = machine.epoch();
    print_json(&machine.snapshot())?;

    while !machine.is_terminal() {
        let snapshot = machine.snapshot();
        if snapshot.phrase_text.is_some() && !snapshot.take_recording {
            machine.apply(WorkoutEvent::TakeStarted)?;
            machine.apply(WorkoutEvent::TakeRecorded(take.clone()))?;
        } else {
            let effects = machine.apply(WorkoutEvent::Tick {
                elapsed_ms: tick_ms,
            })?;
            // Every exercise recording hears the same synthetic voice
            for effect in effects {
                if let WorkoutEffect::FinishRecording { index } = effect {
                    machine.apply(WorkoutEvent::ExerciseRecorded {
                        index,
                        buffer: take.clone(),
                    })?;
                }
            }
        }

        if every_tick || machine.epoch() != last_epoch {
            last_epoch = machine.epoch();
            print_json(&machine.snapshot())?;
        }
    }

    if let Some(summary) = machine.summary() {
        eprintln!(
            "Workout {} finished in {:.1} s with {} profile(s)",
            summary.id,
            summary.total_elapsed_secs,
            summary.profiles.len()
        );
    }
    Ok(())
}

fn run_catalog(config: &AppConfig, catalog: Option<&Path>) -> Result<()> {
    let catalog = load_catalog(catalog)?;
    print_json(&CatalogOverview::new(&catalog, config.workout.rest_seconds))
}
