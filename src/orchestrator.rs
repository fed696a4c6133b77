use serde::Serialize;
use tokio::sync::broadcast;

use crate::brain::{ModelClient, PlanGenerator};
use crate::executor::PlanRunner;
use crate::page::Page;
use crate::records::Record;

/// Progress notifications, streamed to HTTP clients in `serve` mode.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum RunEvent {
    RecordStarted { index: usize, total: usize, url: String },
    PlanGenerated { index: usize, actions: usize },
    ActionFailed { index: usize, message: String },
    RecordFinished { index: usize, applied: usize, failed: usize },
    RecordFailed { index: usize, message: String },
    BatchFinished { processed: usize },
}

impl RunEvent {
    pub fn name(&self) -> &'static str {
        match self {
            RunEvent::RecordStarted { .. } => "record_started",
            RunEvent::PlanGenerated { .. } => "plan_generated",
            RunEvent::ActionFailed { .. } => "action_failed",
            RunEvent::RecordFinished { .. } => "record_finished",
            RunEvent::RecordFailed { .. } => "record_failed",
            RunEvent::BatchFinished { .. } => "batch_finished",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordStatus {
    /// The plan ran, whatever the individual actions did.
    Completed,
    /// The page could not be prepared; no plan was generated.
    Failed,
}

/// What happened to one record. Kept in memory only.
#[derive(Debug, Clone, Serialize)]
pub struct RecordReport {
    /// 1-based position in the batch.
    pub index: usize,
    pub url: String,
    pub status: RecordStatus,
    pub planned: usize,
    pub applied: usize,
    pub failures: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize)]
#[serde(transparent)]
pub struct BatchReport {
    pub records: Vec<RecordReport>,
}

impl BatchReport {
    pub fn completed(&self) -> usize {
        self.records
            .iter()
            .filter(|r| r.status == RecordStatus::Completed)
            .count()
    }
}

/// Drives a batch of records through one page, strictly one at a time.
pub struct Orchestrator<C> {
    generator: PlanGenerator<C>,
    runner: PlanRunner,
    default_url: String,
    events: Option<broadcast::Sender<RunEvent>>,
}

impl<C: ModelClient> Orchestrator<C> {
    pub fn new(generator: PlanGenerator<C>, runner: PlanRunner, default_url: impl Into<String>) -> Self {
        Self {
            generator,
            runner,
            default_url: default_url.into(),
            events: None,
        }
    }

    pub fn with_events(mut self, events: broadcast::Sender<RunEvent>) -> Self {
        self.events = Some(events);
        self
    }

    fn emit(&self, event: RunEvent) {
        if let Some(tx) = &self.events {
            // No subscribers is fine.
            let _ = tx.send(event);
        }
    }

    /// Process every record in order. Never stops early: each record's
    /// failures are absorbed into its report.
    pub async fn run<P: Page + ?Sized>(&self, page: &mut P, records: &[Record]) -> BatchReport {
        let total = records.len();
        let mut report = BatchReport::default();

        for (i, record) in records.iter().enumerate() {
            let index = i + 1;
            tracing::info!(index, total, entry = %record.label(), "processing entry");
            report.records.push(self.process(page, index, total, record).await);
        }

        tracing::info!(processed = total, completed = report.completed(), "all entries processed");
        self.emit(RunEvent::BatchFinished { processed: total });
        report
    }

    async fn process<P: Page + ?Sized>(
        &self,
        page: &mut P,
        index: usize,
        total: usize,
        record: &Record,
    ) -> RecordReport {
        let url = record.navigation_target(&self.default_url).to_string();
        self.emit(RunEvent::RecordStarted {
            index,
            total,
            url: url.clone(),
        });

        let mut report = RecordReport {
            index,
            url: url.clone(),
            status: RecordStatus::Completed,
            planned: 0,
            applied: 0,
            failures: Vec::new(),
            error: None,
        };

        let markup = match prepare(&*page, &url).await {
            Ok(markup) => markup,
            Err(e) => {
                let message = e.to_string();
                tracing::warn!(index, %url, error = %message, "could not load form, skipping entry");
                self.emit(RunEvent::RecordFailed {
                    index,
                    message: message.clone(),
                });
                report.status = RecordStatus::Failed;
                report.error = Some(message);
                return report;
            }
        };

        let plan = self.generator.generate(&markup, record).await;
        tracing::info!(index, actions = plan.len(), "received action plan");
        self.emit(RunEvent::PlanGenerated {
            index,
            actions: plan.len(),
        });

        let outcome = self.runner.run(&*page, &plan).await;
        report.planned = plan.len();
        report.applied = outcome.applied();
        for failure in outcome.failures() {
            let message = failure.to_string();
            self.emit(RunEvent::ActionFailed {
                index,
                message: message.clone(),
            });
            report.failures.push(message);
        }

        self.emit(RunEvent::RecordFinished {
            index,
            applied: report.applied,
            failed: report.failures.len(),
        });
        report
    }
}

async fn prepare<P: Page + ?Sized>(page: &P, url: &str) -> Result<String, crate::errors::PageError> {
    tracing::info!(%url, "navigating");
    page.navigate(url).await?;
    page.wait_for_network_idle().await?;
    page.inner_html("body").await
}
