// Workout module - guided multi-exercise sessions
//
// Architecture:
// - catalog: exercise definitions, validated from JSON records
// - machine: pure transition function over (state, event) -> effects
// - driver: tokio task that ticks the machine and owns its recordings
// - streak: completion bookkeeping behind the ProgressStore seam

pub mod catalog;
pub mod driver;
pub mod machine;
pub mod state;
pub mod streak;

pub use catalog::{
    BreathingPhase, DisplayFlags, ExerciseCatalog, ExerciseDefinition, ExerciseKind,
    ExerciseRecord, ExerciseShape,
};
pub use driver::{WorkoutCommand, WorkoutDriver, WorkoutHandle, WorkoutServices};
pub use machine::{BatchOutcome, WorkoutEffect, WorkoutEvent, WorkoutMachine};
pub use state::{
    ExerciseRunState, ExerciseStatus, WorkoutPhase, WorkoutSnapshot, WorkoutSummary,
};
pub use streak::{
    apply_streak, Calendar, FixedCalendar, InMemoryProgressStore, JsonFileProgressStore,
    LocalCalendar, ProgressStore, StreakLedger, StreakRecord, UserProgress,
};
