//! Per-set outcomes and the aggregate report of one ingestion run.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunState {
    NotStarted,
    FetchingManifest,
    Filtering,
    Dispatching,
    Draining,
    Completed,
    Cancelled,
    FatalError,
}

impl RunState {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            RunState::Completed | RunState::Cancelled | RunState::FatalError
        )
    }

    pub fn can_transition_to(self, next: RunState) -> bool {
        use RunState::*;
        match (self, next) {
            (from, _) if from.is_terminal() => false,
            (_, Cancelled) => true,
            (FetchingManifest, FatalError) => true,
            (NotStarted, FetchingManifest)
            | (FetchingManifest, Filtering)
            | (Filtering, Dispatching)
            | (Dispatching, Draining)
            | (Draining, Completed) => true,
            _ => false,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureStage {
    /// The manifest entry itself failed validation.
    Manifest,
    /// Fetching the set's cards failed.
    Fetch,
    RecordWrite,
    RulingWrite,
    /// Card data was written but the trigram batch was not.
    IndexWrite,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SetFailure {
    pub set_code: String,
    pub set_name: String,
    pub stage: FailureStage,
    pub error: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CardFailure {
    pub set_code: String,
    pub card_id: Option<String>,
    pub card_name: Option<String>,
    pub error: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum SetStatus {
    Succeeded,
    Failed { stage: FailureStage, error: String },
    Cancelled,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SetProcessingOutcome {
    pub set_code: String,
    pub set_name: String,
    pub status: SetStatus,
    pub cards_attempted: usize,
    pub cards_succeeded: usize,
    pub rulings_attempted: usize,
    pub rulings_succeeded: usize,
    pub images_written: usize,
    pub card_failures: Vec<CardFailure>,
}

impl SetProcessingOutcome {
    pub fn new(set_code: &str, set_name: &str) -> Self {
        Self {
            set_code: set_code.to_string(),
            set_name: set_name.to_string(),
            status: SetStatus::Succeeded,
            cards_attempted: 0,
            cards_succeeded: 0,
            rulings_attempted: 0,
            rulings_succeeded: 0,
            images_written: 0,
            card_failures: Vec::new(),
        }
    }

    pub fn failed(mut self, stage: FailureStage, error: impl ToString) -> Self {
        self.status = SetStatus::Failed {
            stage,
            error: error.to_string(),
        };
        self
    }

    pub fn cancelled(mut self) -> Self {
        self.status = SetStatus::Cancelled;
        self
    }

    pub fn is_success(&self) -> bool {
        self.status == SetStatus::Succeeded
    }

    pub fn cards_failed(&self) -> usize {
        self.card_failures.len()
    }
}

/// Aggregate of one run. Always returned to the caller, including on
/// cancellation and partial failure.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunReport {
    pub run_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub state: RunState,
    pub cancelled: bool,
    pub sets_in_manifest: usize,
    pub sets_selected: usize,
    pub sets_attempted: usize,
    pub sets_succeeded: usize,
    pub cards_attempted: usize,
    pub cards_succeeded: usize,
    pub rulings_attempted: usize,
    pub rulings_succeeded: usize,
    pub images_written: usize,
    pub completed_sets: Vec<String>,
    /// Selected sets that were never finished because the run was cancelled.
    pub unfinished_sets: Vec<String>,
    pub set_failures: Vec<SetFailure>,
    pub card_failures: Vec<CardFailure>,
    pub warnings: Vec<String>,
}

impl Default for RunReport {
    fn default() -> Self {
        Self::new()
    }
}

impl RunReport {
    pub fn new() -> Self {
        Self {
            run_id: Uuid::new_v4(),
            started_at: Utc::now(),
            finished_at: None,
            state: RunState::NotStarted,
            cancelled: false,
            sets_in_manifest: 0,
            sets_selected: 0,
            sets_attempted: 0,
            sets_succeeded: 0,
            cards_attempted: 0,
            cards_succeeded: 0,
            rulings_attempted: 0,
            rulings_succeeded: 0,
            images_written: 0,
            completed_sets: Vec::new(),
            unfinished_sets: Vec::new(),
            set_failures: Vec::new(),
            card_failures: Vec::new(),
            warnings: Vec::new(),
        }
    }

    /// Moves to `next`, ignoring transitions the state machine does not allow.
    pub fn transition(&mut self, next: RunState) -> bool {
        if !self.state.can_transition_to(next) {
            log::debug!("ignoring run state transition {:?} -> {:?}", self.state, next);
            return false;
        }
        log::debug!("run state {:?} -> {:?}", self.state, next);
        self.state = next;
        if next == RunState::Cancelled {
            self.cancelled = true;
        }
        if next.is_terminal() {
            self.finished_at = Some(Utc::now());
        }
        true
    }

    pub fn record_manifest_rejection(&mut self, set_code: String, set_name: String, error: String) {
        self.set_failures.push(SetFailure {
            set_code,
            set_name,
            stage: FailureStage::Manifest,
            error,
        });
    }

    pub fn record(&mut self, outcome: SetProcessingOutcome) {
        self.cards_attempted += outcome.cards_attempted;
        self.cards_succeeded += outcome.cards_succeeded;
        self.rulings_attempted += outcome.rulings_attempted;
        self.rulings_succeeded += outcome.rulings_succeeded;
        self.images_written += outcome.images_written;

        match outcome.status {
            SetStatus::Succeeded => {
                self.sets_attempted += 1;
                self.sets_succeeded += 1;
                self.completed_sets.push(outcome.set_code.clone());
            }
            SetStatus::Failed { stage, error } => {
                self.sets_attempted += 1;
                self.set_failures.push(SetFailure {
                    set_code: outcome.set_code.clone(),
                    set_name: outcome.set_name.clone(),
                    stage,
                    error,
                });
            }
            SetStatus::Cancelled => {
                self.unfinished_sets.push(outcome.set_code.clone());
            }
        }
        self.card_failures.extend(outcome.card_failures);
    }

    pub fn warn(&mut self, message: impl Into<String>) {
        let message = message.into();
        log::warn!("{}", message);
        self.warnings.push(message);
    }

    /// Set codes worth feeding back into the allow-list: failed sets, sets with
    /// failed cards, and sets the run never finished.
    pub fn retry_codes(&self) -> Vec<String> {
        let mut codes: Vec<String> = self
            .set_failures
            .iter()
            .map(|f| f.set_code.clone())
            .chain(self.card_failures.iter().map(|f| f.set_code.clone()))
            .chain(self.unfinished_sets.iter().cloned())
            .filter(|c| c != "?")
            .collect();
        codes.sort();
        codes.dedup();
        codes
    }

    pub fn summary(&self) -> String {
        format!(
            "run {} {:?}: sets {}/{} ok, cards {}/{} ok, rulings {}/{} ok, {} set failures, {} card failures{}",
            self.run_id,
            self.state,
            self.sets_succeeded,
            self.sets_attempted,
            self.cards_succeeded,
            self.cards_attempted,
            self.rulings_succeeded,
            self.rulings_attempted,
            self.set_failures.len(),
            self.card_failures.len(),
            if self.cancelled { " (cancelled)" } else { "" }
        )
    }
}
