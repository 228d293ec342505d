//! Exercise definitions and the workout catalog.
//!
//! Catalog JSON uses camelCase records (`ExerciseRecord`); each record is
//! validated into an `ExerciseDefinition` at load so a malformed entry fails
//! before the workout starts, never mid-session.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Seconds budgeted per phrase when estimating workout length
const SECONDS_PER_PHRASE: u32 = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExerciseKind {
    Breathing,
    Timed,
    Sustained,
    Reps,
    Phrase,
}

impl ExerciseKind {
    pub fn label(&self) -> &'static str {
        match self {
            ExerciseKind::Breathing => "breathing",
            ExerciseKind::Timed => "timed",
            ExerciseKind::Sustained => "sustained",
            ExerciseKind::Reps => "reps",
            ExerciseKind::Phrase => "phrase",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BreathingPhase {
    pub name: String,
    #[serde(rename = "duration")]
    pub seconds: u32,
}

/// How an exercise measures its own progress
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "shape", rename_all = "snake_case")]
pub enum ExerciseShape {
    /// Single countdown; breathing exercises cycle through `phases`
    Countdown {
        duration_secs: u32,
        phases: Vec<BreathingPhase>,
    },
    Reps {
        reps: u32,
        rep_duration_secs: u32,
    },
    /// Advances only on recorded takes
    Phrases { phrases: Vec<String> },
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DisplayFlags {
    pub show_pitch_meter: bool,
    pub show_timer: bool,
    pub show_record_playback: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExerciseDefinition {
    pub id: String,
    pub name: String,
    pub description: String,
    pub kind: ExerciseKind,
    pub shape: ExerciseShape,
    pub instruction: String,
    pub display: DisplayFlags,
    /// Overrides the configured rest that follows this exercise
    pub rest_after_secs: Option<u32>,
}

impl ExerciseDefinition {
    /// Nominal length in seconds, phrases estimated
    pub fn nominal_seconds(&self) -> u32 {
        match &self.shape {
            ExerciseShape::Countdown { duration_secs, .. } => *duration_secs,
            ExerciseShape::Reps {
                reps,
                rep_duration_secs,
            } => reps * rep_duration_secs,
            ExerciseShape::Phrases { phrases } => phrases.len() as u32 * SECONDS_PER_PHRASE,
        }
    }

    pub fn is_phrase(&self) -> bool {
        matches!(self.shape, ExerciseShape::Phrases { .. })
    }

    /// Timer-driven exercises record throughout when they show a pitch
    /// meter or play back a reading; phrase takes own the microphone
    /// themselves.
    pub fn wants_recording(&self) -> bool {
        !self.is_phrase() && (self.display.show_pitch_meter || self.display.show_record_playback)
    }

    fn countdown(
        id: &str,
        name: &str,
        description: &str,
        kind: ExerciseKind,
        duration_secs: u32,
        instruction: &str,
    ) -> Self {
        Self {
            id: id.to_string(),
            name: name.to_string(),
            description: description.to_string(),
            kind,
            shape: ExerciseShape::Countdown {
                duration_secs,
                phases: Vec::new(),
            },
            instruction: instruction.to_string(),
            display: DisplayFlags::default(),
            rest_after_secs: None,
        }
    }

    pub fn reps(
        id: &str,
        name: &str,
        description: &str,
        reps: u32,
        rep_duration_secs: u32,
        instruction: &str,
    ) -> Self {
        Self {
            shape: ExerciseShape::Reps {
                reps,
                rep_duration_secs,
            },
            ..Self::countdown(id, name, description, ExerciseKind::Reps, 0, instruction)
        }
    }

    /// Phrase exercises play back each take by default
    pub fn phrase(
        id: &str,
        name: &str,
        description: &str,
        phrases: &[&str],
        instruction: &str,
    ) -> Self {
        Self {
            shape: ExerciseShape::Phrases {
                phrases: phrases.iter().map(|phrase| phrase.to_string()).collect(),
            },
            display: DisplayFlags {
                show_record_playback: true,
                ..DisplayFlags::default()
            },
            ..Self::countdown(id, name, description, ExerciseKind::Phrase, 0, instruction)
        }
    }
}

/// Breathing phase entry as it appears in catalog JSON
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PhaseRecord {
    pub name: String,
    pub duration: u32,
}

/// Raw catalog entry, exactly as authored
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExerciseRecord {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(rename = "type")]
    pub kind: ExerciseKind,
    #[serde(default)]
    pub duration: Option<u32>,
    #[serde(default)]
    pub reps: Option<u32>,
    #[serde(default)]
    pub rep_duration: Option<u32>,
    #[serde(default)]
    pub phrases: Option<Vec<String>>,
    #[serde(default)]
    pub phases: Option<Vec<PhaseRecord>>,
    #[serde(default)]
    pub instruction: String,
    #[serde(default)]
    pub show_pitch_meter: bool,
    #[serde(default)]
    pub show_timer: bool,
    #[serde(default)]
    pub show_record_playback: bool,
    #[serde(default)]
    pub rest_after: Option<u32>,
}

impl TryFrom<ExerciseRecord> for ExerciseDefinition {
    type Error = ConfigError;

    fn try_from(record: ExerciseRecord) -> Result<Self, Self::Error> {
        let malformed = |reason: &str| ConfigError::MalformedExercise {
            id: record.id.clone(),
            reason: reason.to_string(),
        };

        if record.id.trim().is_empty() {
            return Err(malformed("missing id"));
        }

        let shape = match record.kind {
            ExerciseKind::Breathing | ExerciseKind::Timed | ExerciseKind::Sustained => {
                if record.reps.is_some() || record.rep_duration.is_some() || record.phrases.is_some()
                {
                    return Err(malformed("countdown exercises take only a duration"));
                }
                let duration_secs = match record.duration {
                    Some(0) => return Err(malformed("duration must be positive")),
                    Some(secs) => secs,
                    None => return Err(malformed("missing duration")),
                };
                let phases = match (&record.phases, record.kind) {
                    (None, _) => Vec::new(),
                    (Some(_), kind) if kind != ExerciseKind::Breathing => {
                        return Err(malformed("only breathing exercises have phases"))
                    }
                    (Some(phases), _) if phases.is_empty() => {
                        return Err(malformed("phases must not be empty"))
                    }
                    (Some(phases), _) => {
                        if phases.iter().any(|phase| phase.duration == 0) {
                            return Err(malformed("phase durations must be positive"));
                        }
                        phases
                            .iter()
                            .map(|phase| BreathingPhase {
                                name: phase.name.clone(),
                                seconds: phase.duration,
                            })
                            .collect()
                    }
                };
                ExerciseShape::Countdown {
                    duration_secs,
                    phases,
                }
            }
            ExerciseKind::Reps => {
                if record.duration.is_some() || record.phrases.is_some() || record.phases.is_some()
                {
                    return Err(malformed("reps exercises take only reps and repDuration"));
                }
                match (record.reps, record.rep_duration) {
                    (Some(reps), Some(rep_duration_secs)) if reps > 0 && rep_duration_secs > 0 => {
                        ExerciseShape::Reps {
                            reps,
                            rep_duration_secs,
                        }
                    }
                    (Some(_), Some(_)) => {
                        return Err(malformed("reps and repDuration must be positive"))
                    }
                    _ => return Err(malformed("missing reps or repDuration")),
                }
            }
            ExerciseKind::Phrase => {
                if record.duration.is_some()
                    || record.reps.is_some()
                    || record.rep_duration.is_some()
                    || record.phases.is_some()
                {
                    return Err(malformed("phrase exercises take only phrases"));
                }
                match &record.phrases {
                    Some(phrases) if !phrases.is_empty() => ExerciseShape::Phrases {
                        phrases: phrases.clone(),
                    },
                    Some(_) => return Err(malformed("phrases must not be empty")),
                    None => return Err(malformed("missing phrases")),
                }
            }
        };

        Ok(ExerciseDefinition {
            display: DisplayFlags {
                show_pitch_meter: record.show_pitch_meter,
                show_timer: record.show_timer,
                show_record_playback: record.show_record_playback,
            },
            rest_after_secs: record.rest_after,
            shape,
            kind: record.kind,
            id: record.id,
            name: record.name,
            description: record.description,
            instruction: record.instruction,
        })
    }
}

/// Ordered, validated list of exercises for one workout
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExerciseCatalog {
    exercises: Vec<ExerciseDefinition>,
}

impl ExerciseCatalog {
    pub fn new(exercises: Vec<ExerciseDefinition>) -> Result<Self, ConfigError> {
        if exercises.is_empty() {
            return Err(ConfigError::EmptyCatalog);
        }
        let mut seen = HashSet::new();
        for exercise in &exercises {
            if !seen.insert(exercise.id.as_str()) {
                return Err(ConfigError::MalformedExercise {
                    id: exercise.id.clone(),
                    reason: "duplicate id".to_string(),
                });
            }
        }
        Ok(Self { exercises })
    }

    pub fn from_records(records: Vec<ExerciseRecord>) -> Result<Self, ConfigError> {
        let exercises = records
            .into_iter()
            .map(ExerciseDefinition::try_from)
            .collect::<Result<Vec<_>, _>>()?;
        Self::new(exercises)
    }

    /// Parse a JSON array of catalog records
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        let records: Vec<ExerciseRecord> =
            serde_json::from_str(json).map_err(|err| ConfigError::MalformedExercise {
                id: "<catalog>".to_string(),
                reason: err.to_string(),
            })?;
        Self::from_records(records)
    }

    /// The five-exercise daily workout
    pub fn default_workout() -> Self {
        let breathing = ExerciseDefinition {
            shape: ExerciseShape::Countdown {
                duration_secs: 60,
                phases: vec![
                    BreathingPhase {
                        name: "Inhale".to_string(),
                        seconds: 4,
                    },
                    BreathingPhase {
                        name: "Hold".to_string(),
                        seconds: 4,
                    },
                    BreathingPhase {
                        name: "Exhale".to_string(),
                        seconds: 6,
                    },
                ],
            },
            ..ExerciseDefinition::countdown(
                "diaphragmatic_breathing",
                "Diaphragmatic Breathing",
                "Deep belly breathing to support your voice",
                ExerciseKind::Breathing,
                60,
                "Breathe deeply from your diaphragm. Place a hand on your belly and feel it rise as you inhale.",
            )
        };

        let humming = ExerciseDefinition {
            display: DisplayFlags {
                show_pitch_meter: true,
                ..DisplayFlags::default()
            },
            ..ExerciseDefinition::countdown(
                "humming_warmup",
                "Humming Warmup",
                "Warm up your vocal cords with gentle humming",
                ExerciseKind::Timed,
                45,
                "Hum at a comfortable pitch. Feel the vibration in your chest and face. Start low and gradually vary your pitch.",
            )
        };

        let glides = ExerciseDefinition {
            display: DisplayFlags {
                show_pitch_meter: true,
                ..DisplayFlags::default()
            },
            ..ExerciseDefinition::reps(
                "pitch_glides",
                "Pitch Glides",
                "Slide from high to low pitch smoothly",
                5,
                8,
                "Start at a comfortable high pitch and slowly glide down to your lowest comfortable pitch. Keep the sound smooth and connected.",
            )
        };

        let chest = ExerciseDefinition::phrase(
            "chest_voice",
            "Chest Voice Activation",
            "Strengthen your deep chest resonance",
            &[
                "Hello, my name is...",
                "Good morning everyone",
                "I am confident and strong",
                "My voice is powerful",
                "I speak with authority",
            ],
            "Speak each phrase slowly and deliberately. Feel the vibration in your chest, not your throat.",
        );

        let sustained = ExerciseDefinition {
            display: DisplayFlags {
                show_pitch_meter: true,
                show_timer: true,
                ..DisplayFlags::default()
            },
            ..ExerciseDefinition::countdown(
                "sustained_low",
                "Sustained Low Notes",
                "Build endurance at your lower range",
                ExerciseKind::Sustained,
                30,
                "Hold a low \"ah\" sound at a comfortable pitch. Maintain steady airflow and keep the tone relaxed.",
            )
        };

        Self {
            exercises: vec![breathing, humming, glides, chest, sustained],
        }
    }

    pub fn exercises(&self) -> &[ExerciseDefinition] {
        &self.exercises
    }

    pub fn len(&self) -> usize {
        self.exercises.len()
    }

    pub fn is_empty(&self) -> bool {
        self.exercises.is_empty()
    }

    pub fn get(&self, id: &str) -> Option<&ExerciseDefinition> {
        self.exercises.iter().find(|exercise| exercise.id == id)
    }

    /// Rest that follows exercise `index`
    pub fn rest_after(&self, index: usize, rest_seconds: u32) -> u32 {
        self.exercises
            .get(index)
            .and_then(|exercise| exercise.rest_after_secs)
            .unwrap_or(rest_seconds)
    }

    /// Whole-minute estimate: exercise time plus rests between exercises
    pub fn estimated_duration_minutes(&self, rest_seconds: u32) -> u32 {
        let exercise_secs: u32 = self.exercises.iter().map(|e| e.nominal_seconds()).sum();
        let rest_secs: u32 = (0..self.exercises.len().saturating_sub(1))
            .map(|index| self.rest_after(index, rest_seconds))
            .sum();
        (exercise_secs + rest_secs).div_ceil(60)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(json: &str) -> Result<ExerciseDefinition, ConfigError> {
        let record: ExerciseRecord = serde_json::from_str(json).unwrap();
        ExerciseDefinition::try_from(record)
    }

    fn malformed_reason(result: Result<ExerciseDefinition, ConfigError>) -> String {
        match result {
            Err(ConfigError::MalformedExercise { reason, .. }) => reason,
            other => panic!("Expected MalformedExercise, got {:?}", other),
        }
    }

    #[test]
    fn test_shape_constructors() {
        let glides = ExerciseDefinition::reps("g", "Glides", "", 4, 6, "Glide down");
        assert_eq!(glides.kind, ExerciseKind::Reps);
        assert_eq!(glides.nominal_seconds(), 24);
        assert!(!glides.wants_recording());

        let phrases = ExerciseDefinition::phrase("p", "Phrases", "", &["one", "two"], "Speak");
        assert_eq!(phrases.kind, ExerciseKind::Phrase);
        assert!(phrases.is_phrase());
        assert!(phrases.display.show_record_playback);
        assert_eq!(
            phrases.shape,
            ExerciseShape::Phrases {
                phrases: vec!["one".to_string(), "two".to_string()]
            }
        );
        assert_eq!(phrases.nominal_seconds(), 2 * SECONDS_PER_PHRASE);
    }

    #[test]
    fn test_default_workout_order() {
        let catalog = ExerciseCatalog::default_workout();
        let ids: Vec<&str> = catalog.exercises().iter().map(|e| e.id.as_str()).collect();
        assert_eq!(
            ids,
            vec![
                "diaphragmatic_breathing",
                "humming_warmup",
                "pitch_glides",
                "chest_voice",
                "sustained_low"
            ]
        );
        assert!(catalog.get("chest_voice").unwrap().display.show_record_playback);
        assert!(!catalog.get("chest_voice").unwrap().wants_recording());
        assert!(catalog.get("sustained_low").unwrap().display.show_timer);
    }

    #[test]
    fn test_default_estimate_is_five_minutes() {
        // 60 + 45 + 40 + 50 + 30 seconds of exercise, 4 rests of 10 s
        let catalog = ExerciseCatalog::default_workout();
        assert_eq!(catalog.estimated_duration_minutes(10), 5);
    }

    #[test]
    fn test_rest_override_feeds_estimate() {
        let catalog = ExerciseCatalog::from_json(
            r#"[
                {"id": "a", "type": "timed", "duration": 50, "restAfter": 70},
                {"id": "b", "type": "timed", "duration": 1}
            ]"#,
        )
        .unwrap();
        assert_eq!(catalog.rest_after(0, 10), 70);
        assert_eq!(catalog.estimated_duration_minutes(10), 3);
    }

    #[test]
    fn test_camel_case_records_parse() {
        let def = record(
            r#"{"id": "glides", "type": "reps", "reps": 2, "repDuration": 3, "showPitchMeter": true}"#,
        )
        .unwrap();
        assert_eq!(
            def.shape,
            ExerciseShape::Reps {
                reps: 2,
                rep_duration_secs: 3
            }
        );
        assert!(def.wants_recording());
    }

    #[test]
    fn test_breathing_phases_parse() {
        let def = record(
            r#"{"id": "b", "type": "breathing", "duration": 14,
                "phases": [{"name": "Inhale", "duration": 4}, {"name": "Exhale", "duration": 10}]}"#,
        )
        .unwrap();
        match def.shape {
            ExerciseShape::Countdown { phases, .. } => assert_eq!(phases.len(), 2),
            other => panic!("unexpected shape {:?}", other),
        }
    }

    #[test]
    fn test_ambiguous_shape_is_rejected() {
        let reason =
            malformed_reason(record(r#"{"id": "x", "type": "timed", "duration": 5, "reps": 2}"#));
        assert!(reason.contains("only a duration"));

        let reason = malformed_reason(record(
            r#"{"id": "x", "type": "reps", "reps": 2, "repDuration": 3, "duration": 6}"#,
        ));
        assert!(reason.contains("only reps"));
    }

    #[test]
    fn test_missing_shape_is_rejected() {
        assert!(malformed_reason(record(r#"{"id": "x", "type": "sustained"}"#))
            .contains("missing duration"));
        assert!(malformed_reason(record(r#"{"id": "x", "type": "reps", "reps": 2}"#))
            .contains("missing reps"));
        assert!(malformed_reason(record(r#"{"id": "x", "type": "phrase"}"#))
            .contains("missing phrases"));
        assert!(malformed_reason(record(r#"{"id": "x", "type": "phrase", "phrases": []}"#))
            .contains("must not be empty"));
    }

    #[test]
    fn test_zero_durations_are_rejected() {
        assert!(malformed_reason(record(r#"{"id": "x", "type": "timed", "duration": 0}"#))
            .contains("positive"));
        assert!(malformed_reason(record(
            r#"{"id": "x", "type": "reps", "reps": 0, "repDuration": 3}"#
        ))
        .contains("positive"));
        assert!(malformed_reason(record(
            r#"{"id": "x", "type": "breathing", "duration": 10, "phases": [{"name": "Hold", "duration": 0}]}"#
        ))
        .contains("phase durations"));
    }

    #[test]
    fn test_phases_only_for_breathing() {
        let reason = malformed_reason(record(
            r#"{"id": "x", "type": "timed", "duration": 10, "phases": [{"name": "Hold", "duration": 2}]}"#,
        ));
        assert!(reason.contains("only breathing"));
    }

    #[test]
    fn test_catalog_level_errors() {
        assert_eq!(
            ExerciseCatalog::from_json("[]").unwrap_err(),
            ConfigError::EmptyCatalog
        );

        let dup = ExerciseCatalog::from_json(
            r#"[{"id": "a", "type": "timed", "duration": 5}, {"id": "a", "type": "timed", "duration": 5}]"#,
        );
        assert!(matches!(dup, Err(ConfigError::MalformedExercise { reason, .. }) if reason == "duplicate id"));

        let unknown = ExerciseCatalog::from_json(r#"[{"id": "a", "type": "yodel"}]"#);
        assert!(matches!(unknown, Err(ConfigError::MalformedExercise { id, .. }) if id == "<catalog>"));
    }
}
