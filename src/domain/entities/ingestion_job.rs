use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use typed_builder::TypedBuilder;
use uuid::Uuid;

/// Status of a batch ingestion run.
///
/// `Completed` means every item succeeded. A batch in which some items
/// failed but at least one succeeded ends as `CompletedWithErrors`, so the
/// consumer does not have to guess what a "completed" job with a non-empty
/// error list means. A batch in which every item failed, or that was
/// cancelled, ends as `Failed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IngestionJobStatus {
    Pending,
    Processing,
    Completed,
    CompletedWithErrors,
    Failed,
}

impl IngestionJobStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            IngestionJobStatus::Completed
                | IngestionJobStatus::CompletedWithErrors
                | IngestionJobStatus::Failed
        )
    }
}

impl std::string::ToString for IngestionJobStatus {
    fn to_string(&self) -> String {
        match self {
            IngestionJobStatus::Pending => String::from("pending"),
            IngestionJobStatus::Processing => String::from("processing"),
            IngestionJobStatus::Completed => String::from("completed"),
            IngestionJobStatus::CompletedWithErrors => String::from("completed_with_errors"),
            IngestionJobStatus::Failed => String::from("failed"),
        }
    }
}

impl std::str::FromStr for IngestionJobStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(IngestionJobStatus::Pending),
            "processing" => Ok(IngestionJobStatus::Processing),
            "completed" => Ok(IngestionJobStatus::Completed),
            "completed_with_errors" => Ok(IngestionJobStatus::CompletedWithErrors),
            "failed" => Ok(IngestionJobStatus::Failed),
            _ => Err(format!("Invalid IngestionJobStatus: {}", s)),
        }
    }
}

/// Tracks one batch ingestion run.
///
/// Mutations only happen from the ingestion worker (single writer);
/// everyone else reads snapshots through the job repository.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TypedBuilder)]
pub struct IngestionJob {
    #[builder(default=Uuid::new_v4())]
    pub id: Uuid,

    #[builder(default=IngestionJobStatus::Pending)]
    pub status: IngestionJobStatus,

    pub total_items: usize,

    /// Number of attempted items, successful or not. Monotone,
    /// never exceeds `total_items`.
    #[builder(default)]
    pub processed_items: usize,

    /// One message per failed item
    #[builder(default)]
    pub errors: Vec<String>,

    #[builder(default=Utc::now())]
    pub created_at: DateTime<Utc>,

    #[builder(default=Utc::now())]
    pub updated_at: DateTime<Utc>,
}

impl IngestionJob {
    /// Progress percentage, derived so it can never drift from the item counts
    pub fn progress(&self) -> f32 {
        if self.total_items == 0 {
            return 0.0;
        }
        self.processed_items as f32 / self.total_items as f32 * 100.0
    }

    pub fn start_processing(&mut self) {
        self.status = IngestionJobStatus::Processing;
        self.touch();
    }

    pub fn record_item_success(&mut self) {
        if self.processed_items < self.total_items {
            self.processed_items += 1;
        }
        self.touch();
    }

    pub fn record_item_failure(&mut self, message: impl Into<String>) {
        self.errors.push(message.into());
        if self.processed_items < self.total_items {
            self.processed_items += 1;
        }
        self.touch();
    }

    /// Settles the terminal status once every item has been attempted
    pub fn finalize(&mut self) {
        self.status = if self.errors.is_empty() {
            IngestionJobStatus::Completed
        } else if self.errors.len() >= self.total_items {
            IngestionJobStatus::Failed
        } else {
            IngestionJobStatus::CompletedWithErrors
        };
        self.touch();
    }

    /// Marks the whole job failed, e.g. on cancellation
    pub fn fail(&mut self, message: impl Into<String>) {
        self.errors.push(message.into());
        self.status = IngestionJobStatus::Failed;
        self.touch();
    }

    fn touch(&mut self) {
        self.updated_at = Utc::now();
    }
}
