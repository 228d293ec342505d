//! Streaks, lifetime progress and the persistence boundary.
//!
//! The engine computes new values; durability belongs to a `ProgressStore`.
//! `StreakLedger` is the only writer and serialises load-compute-save so
//! two rapid completions cannot race.

use std::collections::HashMap;
use std::fs;
use std::io;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use chrono::{Local, NaiveDate};
use serde::{Deserialize, Serialize};

use crate::analysis::{MeasurementHistory, VoiceMeasurement};

use super::state::WorkoutSummary;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreakRecord {
    pub count: u32,
    pub last_completed: Option<NaiveDate>,
}

/// Streak after a workout completed on `today`
///
/// Yesterday extends the streak, the same day leaves it alone, anything
/// else starts over at one.
pub fn apply_streak(record: StreakRecord, today: NaiveDate) -> StreakRecord {
    let count = match record.last_completed {
        Some(last) if last == today => record.count.max(1),
        Some(last) if today.pred_opt() == Some(last) => record.count + 1,
        _ => 1,
    };
    StreakRecord {
        count,
        last_completed: Some(today),
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UserProgress {
    pub current_streak: u32,
    pub longest_streak: u32,
    pub total_workouts: u32,
    pub total_minutes: u32,
    pub last_workout_date: Option<NaiveDate>,
}

impl UserProgress {
    pub fn streak(&self) -> StreakRecord {
        StreakRecord {
            count: self.current_streak,
            last_completed: self.last_workout_date,
        }
    }

    /// Fold one completed workout in
    pub fn record_completion(&mut self, summary: &WorkoutSummary, today: NaiveDate) {
        let streak = apply_streak(self.streak(), today);
        self.current_streak = streak.count;
        self.last_workout_date = streak.last_completed;
        self.longest_streak = self.longest_streak.max(streak.count);
        self.total_workouts += 1;
        self.total_minutes += summary.total_minutes();
    }
}

/// External storage keyed by a stable profile id
pub trait ProgressStore: Send + Sync {
    /// Missing progress loads as the default
    fn load_progress(&self, profile_id: &str) -> io::Result<UserProgress>;
    fn save_progress(&self, profile_id: &str, progress: &UserProgress) -> io::Result<()>;
    fn save_summary(&self, profile_id: &str, summary: &WorkoutSummary) -> io::Result<()>;
    /// Missing history loads as empty
    fn load_measurements(&self, profile_id: &str) -> io::Result<Vec<VoiceMeasurement>>;
    fn save_measurement(&self, profile_id: &str, measurement: &VoiceMeasurement)
        -> io::Result<()>;
}

#[derive(Default)]
pub struct InMemoryProgressStore {
    progress: Mutex<HashMap<String, UserProgress>>,
    summaries: Mutex<HashMap<String, Vec<WorkoutSummary>>>,
    measurements: Mutex<HashMap<String, Vec<VoiceMeasurement>>>,
}

impl InMemoryProgressStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn summaries(&self, profile_id: &str) -> Vec<WorkoutSummary> {
        self.summaries
            .lock()
            .ok()
            .and_then(|map| map.get(profile_id).cloned())
            .unwrap_or_default()
    }
}

fn poisoned(component: &str) -> io::Error {
    io::Error::other(format!("{} lock poisoned", component))
}

impl ProgressStore for InMemoryProgressStore {
    fn load_progress(&self, profile_id: &str) -> io::Result<UserProgress> {
        let map = self.progress.lock().map_err(|_| poisoned("progress"))?;
        Ok(map.get(profile_id).cloned().unwrap_or_default())
    }

    fn save_progress(&self, profile_id: &str, progress: &UserProgress) -> io::Result<()> {
        let mut map = self.progress.lock().map_err(|_| poisoned("progress"))?;
        map.insert(profile_id.to_string(), progress.clone());
        Ok(())
    }

    fn save_summary(&self, profile_id: &str, summary: &WorkoutSummary) -> io::Result<()> {
        let mut map = self.summaries.lock().map_err(|_| poisoned("summaries"))?;
        map.entry(profile_id.to_string())
            .or_default()
            .push(summary.clone());
        Ok(())
    }

    fn load_measurements(&self, profile_id: &str) -> io::Result<Vec<VoiceMeasurement>> {
        let map = self
            .measurements
            .lock()
            .map_err(|_| poisoned("measurements"))?;
        Ok(map.get(profile_id).cloned().unwrap_or_default())
    }

    fn save_measurement(
        &self,
        profile_id: &str,
        measurement: &VoiceMeasurement,
    ) -> io::Result<()> {
        let mut map = self
            .measurements
            .lock()
            .map_err(|_| poisoned("measurements"))?;
        map.entry(profile_id.to_string())
            .or_default()
            .push(measurement.clone());
        Ok(())
    }
}

/// Per profile: one JSON file each for progress, workouts and measurements
pub struct JsonFileProgressStore {
    dir: PathBuf,
}

impl JsonFileProgressStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    fn progress_path(&self, profile_id: &str) -> PathBuf {
        self.dir.join(format!("{}.progress.json", profile_id))
    }

    fn history_path(&self, profile_id: &str) -> PathBuf {
        self.dir.join(format!("{}.workouts.json", profile_id))
    }

    fn measurements_path(&self, profile_id: &str) -> PathBuf {
        self.dir.join(format!("{}.measurements.json", profile_id))
    }

    pub fn load_summaries(&self, profile_id: &str) -> io::Result<Vec<WorkoutSummary>> {
        self.read_list(self.history_path(profile_id))
    }

    fn read_list<T: serde::de::DeserializeOwned>(&self, path: PathBuf) -> io::Result<Vec<T>> {
        match fs::read_to_string(path) {
            Ok(contents) => Ok(serde_json::from_str(&contents)?),
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(Vec::new()),
            Err(err) => Err(err),
        }
    }

    fn write_json<T: Serialize>(&self, path: PathBuf, value: &T) -> io::Result<()> {
        fs::create_dir_all(&self.dir)?;
        let contents = serde_json::to_string_pretty(value)?;
        // Write then rename so a crash never leaves half a file
        let tmp = path.with_extension("json.tmp");
        fs::write(&tmp, contents)?;
        fs::rename(tmp, path)
    }
}

impl ProgressStore for JsonFileProgressStore {
    fn load_progress(&self, profile_id: &str) -> io::Result<UserProgress> {
        match fs::read_to_string(self.progress_path(profile_id)) {
            Ok(contents) => Ok(serde_json::from_str(&contents)?),
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(UserProgress::default()),
            Err(err) => Err(err),
        }
    }

    fn save_progress(&self, profile_id: &str, progress: &UserProgress) -> io::Result<()> {
        self.write_json(self.progress_path(profile_id), progress)
    }

    fn save_summary(&self, profile_id: &str, summary: &WorkoutSummary) -> io::Result<()> {
        let mut history = self.load_summaries(profile_id)?;
        history.push(summary.clone());
        self.write_json(self.history_path(profile_id), &history)
    }

    fn load_measurements(&self, profile_id: &str) -> io::Result<Vec<VoiceMeasurement>> {
        self.read_list(self.measurements_path(profile_id))
    }

    fn save_measurement(
        &self,
        profile_id: &str,
        measurement: &VoiceMeasurement,
    ) -> io::Result<()> {
        let mut measurements = self.load_measurements(profile_id)?;
        measurements.push(measurement.clone());
        self.write_json(self.measurements_path(profile_id), &measurements)
    }
}

/// Source of the user's current calendar date
pub trait Calendar: Send + Sync {
    fn today(&self) -> NaiveDate;
}

/// Device-local date
#[derive(Debug, Default)]
pub struct LocalCalendar;

impl Calendar for LocalCalendar {
    fn today(&self) -> NaiveDate {
        Local::now().date_naive()
    }
}

/// Settable date for tests and simulations
#[derive(Debug)]
pub struct FixedCalendar {
    date: Mutex<NaiveDate>,
}

impl FixedCalendar {
    pub fn new(date: NaiveDate) -> Self {
        Self {
            date: Mutex::new(date),
        }
    }

    pub fn set(&self, date: NaiveDate) {
        if let Ok(mut slot) = self.date.lock() {
            *slot = date;
        }
    }

    pub fn advance_days(&self, days: u64) {
        if let Ok(mut slot) = self.date.lock() {
            if let Some(next) = slot.checked_add_days(chrono::Days::new(days)) {
                *slot = next;
            }
        }
    }
}

impl Calendar for FixedCalendar {
    fn today(&self) -> NaiveDate {
        self.date
            .lock()
            .map(|date| *date)
            .unwrap_or_else(|err| *err.into_inner())
    }
}

/// Single writer of streak, progress and measurement state
pub struct StreakLedger {
    store: Arc<dyn ProgressStore>,
    profile_id: String,
    write_lock: Mutex<()>,
}

impl StreakLedger {
    pub fn new(store: Arc<dyn ProgressStore>, profile_id: impl Into<String>) -> Self {
        Self {
            store,
            profile_id: profile_id.into(),
            write_lock: Mutex::new(()),
        }
    }

    pub fn profile_id(&self) -> &str {
        &self.profile_id
    }

    pub fn progress(&self) -> io::Result<UserProgress> {
        self.store.load_progress(&self.profile_id)
    }

    /// Apply a completed workout and persist both progress and summary
    pub fn record_completion(
        &self,
        summary: &WorkoutSummary,
        today: NaiveDate,
    ) -> io::Result<UserProgress> {
        let _guard = self.write_lock.lock().map_err(|_| poisoned("streak ledger"))?;
        let mut progress = self.store.load_progress(&self.profile_id)?;
        progress.record_completion(summary, today);
        self.store.save_progress(&self.profile_id, &progress)?;
        self.store.save_summary(&self.profile_id, summary)?;
        tracing::info!(
            "[StreakLedger] Workout recorded for {}: streak {} (longest {})",
            self.profile_id,
            progress.current_streak,
            progress.longest_streak
        );
        Ok(progress)
    }

    pub fn record_measurement(&self, measurement: &VoiceMeasurement) -> io::Result<()> {
        let _guard = self.write_lock.lock().map_err(|_| poisoned("streak ledger"))?;
        self.store.save_measurement(&self.profile_id, measurement)?;
        tracing::debug!(
            "[StreakLedger] {:?} measurement {} at {:.1} Hz stored",
            measurement.context,
            measurement.id,
            measurement.pitch_hz
        );
        Ok(())
    }

    /// Every stored measurement, oldest first
    pub fn history(&self) -> io::Result<MeasurementHistory> {
        let measurements = self.store.load_measurements(&self.profile_id)?;
        Ok(MeasurementHistory::from_measurements(measurements))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 3, d).unwrap()
    }

    fn summary(minutes: f32) -> WorkoutSummary {
        let started_at = Utc.with_ymd_and_hms(2026, 3, 1, 8, 0, 0).unwrap();
        WorkoutSummary {
            id: "workout-1".to_string(),
            started_at,
            completed_at: started_at,
            total_elapsed_secs: minutes * 60.0,
            exercises: Vec::new(),
            profiles: Vec::new(),
            pitch_after: None,
        }
    }

    #[test]
    fn test_streak_increments_on_consecutive_days() {
        let record = StreakRecord {
            count: 3,
            last_completed: Some(day(9)),
        };
        assert_eq!(
            apply_streak(record, day(10)),
            StreakRecord {
                count: 4,
                last_completed: Some(day(10))
            }
        );
    }

    #[test]
    fn test_same_day_is_idempotent() {
        let record = StreakRecord {
            count: 3,
            last_completed: Some(day(10)),
        };
        assert_eq!(apply_streak(record, day(10)).count, 3);
    }

    #[test]
    fn test_gap_resets_to_one() {
        let record = StreakRecord {
            count: 7,
            last_completed: Some(day(7)),
        };
        assert_eq!(apply_streak(record, day(10)).count, 1);
        assert_eq!(apply_streak(StreakRecord::default(), day(10)).count, 1);
    }

    #[test]
    fn test_month_boundary_is_adjacent() {
        let record = StreakRecord {
            count: 2,
            last_completed: NaiveDate::from_ymd_opt(2026, 2, 28),
        };
        assert_eq!(apply_streak(record, day(1)).count, 3);
    }

    #[test]
    fn test_progress_tracks_longest_and_totals() {
        let mut progress = UserProgress::default();
        progress.record_completion(&summary(5.2), day(1));
        progress.record_completion(&summary(4.6), day(2));
        progress.record_completion(&summary(5.0), day(2));
        progress.record_completion(&summary(5.0), day(5));

        assert_eq!(progress.current_streak, 1);
        assert_eq!(progress.longest_streak, 2);
        assert_eq!(progress.total_workouts, 4);
        assert_eq!(progress.total_minutes, 20);
        assert_eq!(progress.last_workout_date, Some(day(5)));
    }

    #[test]
    fn test_ledger_persists_through_store() {
        let store = Arc::new(InMemoryProgressStore::new());
        let ledger = StreakLedger::new(store.clone(), "user-1");

        ledger.record_completion(&summary(5.0), day(1)).unwrap();
        let progress = ledger.record_completion(&summary(5.0), day(2)).unwrap();

        assert_eq!(progress.current_streak, 2);
        assert_eq!(store.load_progress("user-1").unwrap(), progress);
        assert_eq!(store.summaries("user-1").len(), 2);
        assert_eq!(store.load_progress("someone-else").unwrap(), UserProgress::default());
    }

    #[test]
    fn test_json_store_roundtrip() {
        let dir = std::env::temp_dir().join(format!("voice_trainer_store_{}", std::process::id()));
        let store = JsonFileProgressStore::new(&dir);
        assert_eq!(store.load_progress("p").unwrap(), UserProgress::default());

        let ledger = StreakLedger::new(Arc::new(JsonFileProgressStore::new(&dir)), "p");
        ledger.record_completion(&summary(3.0), day(4)).unwrap();

        let loaded = store.load_progress("p").unwrap();
        assert_eq!(loaded.total_workouts, 1);
        assert_eq!(loaded.last_workout_date, Some(day(4)));
        assert_eq!(store.load_summaries("p").unwrap().len(), 1);
        let _ = fs::remove_dir_all(dir);
    }

    #[test]
    fn test_measurement_history_survives_a_new_store() {
        use crate::analysis::MeasurementContext;

        let dir = std::env::temp_dir().join(format!(
            "voice_trainer_measurements_{}",
            std::process::id()
        ));
        let ledger = StreakLedger::new(Arc::new(JsonFileProgressStore::new(&dir)), "p");
        assert!(ledger.history().unwrap().is_empty());

        let contexts = [
            MeasurementContext::QuickMeasure,
            MeasurementContext::Exercise,
            MeasurementContext::Workout,
        ];
        for (i, (hz, context)) in [130.0, 120.0, 110.0].into_iter().zip(contexts).enumerate() {
            ledger
                .record_measurement(&VoiceMeasurement {
                    id: format!("m{}", i),
                    timestamp: Utc.with_ymd_and_hms(2026, 3, i as u32 + 1, 9, 0, 0).unwrap(),
                    pitch_hz: hz,
                    pitch_min_hz: hz - 4.0,
                    pitch_max_hz: hz + 4.0,
                    duration_secs: 3.0,
                    context,
                })
                .unwrap();
        }

        // A fresh store over the same directory sees everything
        let reopened = StreakLedger::new(Arc::new(JsonFileProgressStore::new(&dir)), "p");
        let history = reopened.history().unwrap();
        assert_eq!(history.len(), 3);
        assert_eq!(history.measurements()[1].context, MeasurementContext::Exercise);
        assert_eq!(history.latest().map(|m| m.context), Some(MeasurementContext::Workout));
        assert_eq!(history.average_pitch(), Some(120));
        assert!(StreakLedger::new(Arc::new(JsonFileProgressStore::new(&dir)), "q")
            .history()
            .unwrap()
            .is_empty());
        let _ = fs::remove_dir_all(dir);
    }

    #[test]
    fn test_fixed_calendar_advances() {
        let calendar = FixedCalendar::new(day(30));
        calendar.advance_days(2);
        assert_eq!(calendar.today(), NaiveDate::from_ymd_opt(2026, 4, 1).unwrap());
    }
}
