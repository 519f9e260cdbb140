//! Streaming batch pipeline: records in, INSERT statements out.
//!
//! [`BatchPipeline::run`] pulls one record at a time, filters it, renders
//! it, and buffers at most one batch of output before flushing that batch to
//! the preview sink and/or the [`StatementExecutor`].
//!
//! Record-scoped failures (type coercion, schema mismatch) skip the record
//! and are counted. Every other failure aborts the run; batches flushed
//! before the failure are not rolled back.

use crate::error::DbForgeError;
use crate::executor::StatementExecutor;
use crate::filter::FilterEvaluator;
use crate::models::Record;
use crate::sql::{InsertGenerator, InsertMode};
use crate::Result;
use serde::{Deserialize, Serialize};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Instant;
use uuid::Uuid;


/// File extension of the preview output.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PreviewExtension {
    #[default]
    Txt,
    Sql,
}

impl PreviewExtension {
    pub fn as_str(self) -> &'static str {
        match self {
            PreviewExtension::Txt => "txt",
            PreviewExtension::Sql => "sql",
        }
    }
}

impl std::fmt::Display for PreviewExtension {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Preview file location: `<output_dir>/<table>.<ext>`.
pub fn preview_path(output_dir: &Path, table: &str, ext: PreviewExtension) -> PathBuf {
    output_dir.join(format!("{}.{}", table, ext))
}

/// Run-level options of a generation run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GenerationConfig {
    /// Accepted records per flushed batch
    pub batch_size: usize,
    /// Write statements to the preview sink
    pub preview_mode: bool,
    /// Hand statements to the executor
    pub execute_query: bool,
    #[serde(default)]
    pub preview_ext: PreviewExtension,
    #[serde(default)]
    pub insert_mode: InsertMode,
    /// Stop after this many accepted records
    #[serde(default)]
    pub max_records: Option<usize>,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            batch_size: 1000,
            preview_mode: true,
            execute_query: false,
            preview_ext: PreviewExtension::default(),
            insert_mode: InsertMode::default(),
            max_records: None,
        }
    }
}

impl GenerationConfig {
    /// Creates a preview-only configuration with the given batch size.
    pub fn new(batch_size: usize) -> Self {
        Self {
            batch_size,
            ..Self::default()
        }
    }

    pub fn with_preview(mut self, preview_mode: bool) -> Self {
        self.preview_mode = preview_mode;
        self
    }

    pub fn with_execution(mut self, execute_query: bool) -> Self {
        self.execute_query = execute_query;
        self
    }

    pub fn with_insert_mode(mut self, insert_mode: InsertMode) -> Self {
        self.insert_mode = insert_mode;
        self
    }

    pub fn with_max_records(mut self, max_records: usize) -> Self {
        self.max_records = Some(max_records);
        self
    }

    /// Validates the run options.
    ///
    /// # Errors
    /// Returns a configuration error for a zero batch size or a zero
    /// record cap.
    pub fn validate(&self) -> Result<()> {
        if self.batch_size == 0 {
            return Err(DbForgeError::configuration(
                "batch_size must be greater than zero",
            ));
        }
        if self.max_records == Some(0) {
            return Err(DbForgeError::configuration(
                "max_records must be greater than zero when set",
            ));
        }
        Ok(())
    }
}

/// Lifecycle of a pipeline run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum PipelineState {
    #[default]
    Idle,
    Streaming,
    Accumulating,
    Flushing,
    Drained,
    Aborted,
}

impl std::fmt::Display for PipelineState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            PipelineState::Idle => "idle",
            PipelineState::Streaming => "streaming",
            PipelineState::Accumulating => "accumulating",
            PipelineState::Flushing => "flushing",
            PipelineState::Drained => "drained",
            PipelineState::Aborted => "aborted",
        };
        f.write_str(name)
    }
}

/// Cooperative cancellation switch polled between records.
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Counters reported at the end of a run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunSummary {
    pub run_id: Uuid,
    pub table: String,
    pub insert_mode: InsertMode,
    pub records_read: usize,
    pub records_matched: usize,
    pub records_filtered_out: usize,
    pub records_skipped: usize,
    pub batches_flushed: usize,
    pub statements_generated: usize,
    pub rows_affected: u64,
    pub duration_ms: u64,
    pub state: PipelineState,
}

impl RunSummary {
    fn new(table: &str, insert_mode: InsertMode) -> Self {
        Self {
            run_id: Uuid::new_v4(),
            table: table.to_string(),
            insert_mode,
            records_read: 0,
            records_matched: 0,
            records_filtered_out: 0,
            records_skipped: 0,
            batches_flushed: 0,
            statements_generated: 0,
            rows_affected: 0,
            duration_ms: 0,
            state: PipelineState::Idle,
        }
    }
}

/// Rendered output of the records accepted since the last flush.
#[derive(Debug, Default)]
struct PendingBatch {
    /// Full statements in row mode, value tuples in batch mode
    items: Vec<String>,
    first_record: usize,
    last_record: usize,
}

impl PendingBatch {
    fn push(&mut self, item: String, position: usize) {
        if self.items.is_empty() {
            self.first_record = position;
        }
        self.last_record = position;
        self.items.push(item);
    }

    fn len(&self) -> usize {
        self.items.len()
    }

    fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

/// Drives filter, generator, preview sink and executor over one record
/// stream.
pub struct BatchPipeline<'a> {
    config: GenerationConfig,
    filter: FilterEvaluator,
    generator: InsertGenerator,
    preview: Option<&'a mut dyn Write>,
    executor: Option<&'a dyn StatementExecutor>,
    cancel: CancelFlag,
    state: PipelineState,
}

impl<'a> BatchPipeline<'a> {
    pub fn new(
        config: GenerationConfig,
        filter: FilterEvaluator,
        generator: InsertGenerator,
    ) -> Self {
        Self {
            config,
            filter,
            generator,
            preview: None,
            executor: None,
            cancel: CancelFlag::new(),
            state: PipelineState::Idle,
        }
    }

    /// Sink receiving one statement per line in `preview_mode`.
    pub fn with_preview(mut self, sink: &'a mut dyn Write) -> Self {
        self.preview = Some(sink);
        self
    }

    /// Executor receiving each flushed batch in `execute_query` mode.
    pub fn with_executor(mut self, executor: &'a dyn StatementExecutor) -> Self {
        self.executor = Some(executor);
        self
    }

    pub fn with_cancellation(mut self, cancel: CancelFlag) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn state(&self) -> PipelineState {
        self.state
    }

    pub fn config(&self) -> &GenerationConfig {
        &self.config
    }

    /// Streams `records` to completion.
    ///
    /// # Errors
    /// Configuration errors are returned before any record is read. Source
    /// errors, preview write failures, execution failures and cancellation
    /// abort the run; the pipeline is left in [`PipelineState::Aborted`].
    /// On cancellation the pending batch is flushed first, so every record
    /// up to `records_read` has been emitted or accounted for.
    pub async fn run<I>(&mut self, records: I) -> Result<RunSummary>
    where
        I: IntoIterator<Item = Result<Record>>,
    {
        let started = Instant::now();
        let mut summary = RunSummary::new(self.generator.table(), self.config.insert_mode);

        let outcome = self.stream(records.into_iter(), &mut summary).await;
        summary.duration_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);

        match outcome {
            Ok(()) => {
                self.state = PipelineState::Drained;
                summary.state = self.state;
                tracing::info!(
                    "Run {} drained: {} read, {} matched, {} filtered out, {} skipped, {} batch(es)",
                    summary.run_id,
                    summary.records_read,
                    summary.records_matched,
                    summary.records_filtered_out,
                    summary.records_skipped,
                    summary.batches_flushed
                );
                Ok(summary)
            }
            Err(e) => {
                self.state = PipelineState::Aborted;
                tracing::error!("Run {} aborted: {}", summary.run_id, e);
                Err(e)
            }
        }
    }

    async fn stream<I>(&mut self, mut records: I, summary: &mut RunSummary) -> Result<()>
    where
        I: Iterator<Item = Result<Record>>,
    {
        self.check_ready()?;
        self.state = PipelineState::Streaming;
        tracing::info!(
            "Generating {} INSERT statements for '{}' (batch size {})",
            self.config.insert_mode,
            self.generator.table(),
            self.config.batch_size
        );

        let mut batch = PendingBatch::default();
        let mut cancelled = false;
        loop {
            if self.cancel.is_cancelled() {
                tracing::warn!("Cancellation requested; flushing accepted records and stopping");
                cancelled = true;
                break;
            }
            if self
                .config
                .max_records
                .is_some_and(|cap| summary.records_matched >= cap)
            {
                tracing::info!("Reached max_records; stopping");
                break;
            }

            let Some(item) = records.next() else {
                break;
            };
            summary.records_read = summary.records_read.saturating_add(1);
            let position = summary.records_read;

            match self.accept(item) {
                Ok(Some(rendered)) => {
                    summary.records_matched = summary.records_matched.saturating_add(1);
                    batch.push(rendered, position);
                    self.state = PipelineState::Accumulating;
                }
                Ok(None) => {
                    summary.records_filtered_out = summary.records_filtered_out.saturating_add(1);
                }
                Err(e) if e.is_record_scoped() => {
                    tracing::warn!("Skipping record {}: {}", position, e);
                    summary.records_skipped = summary.records_skipped.saturating_add(1);
                }
                Err(e) => return Err(e),
            }

            if batch.len() >= self.config.batch_size {
                self.flush(&mut batch, summary).await?;
            }
        }

        if !batch.is_empty() {
            self.flush(&mut batch, summary).await?;
        }
        if let Some(sink) = self.preview.as_mut() {
            sink.flush().map_err(|e| DbForgeError::Io {
                context: "failed to flush preview output".to_string(),
                source: e,
            })?;
        }
        if cancelled {
            return Err(DbForgeError::Cancelled {
                records_read: summary.records_read,
            });
        }
        Ok(())
    }

    fn check_ready(&self) -> Result<()> {
        self.config.validate()?;
        if self.config.preview_mode && self.preview.is_none() {
            return Err(DbForgeError::configuration(
                "preview_mode is enabled but no preview output was provided",
            ));
        }
        if self.config.execute_query && self.executor.is_none() {
            return Err(DbForgeError::configuration(
                "execute_query is enabled but no database executor was provided",
            ));
        }
        if !self.config.preview_mode && !self.config.execute_query {
            tracing::warn!("Neither preview_mode nor execute_query is set; statements are discarded");
        }
        Ok(())
    }

    /// Filters and renders one source item. `Ok(None)` means filtered out.
    fn accept(&self, item: Result<Record>) -> Result<Option<String>> {
        let record = item?;
        if !self.filter.evaluate(&record)? {
            return Ok(None);
        }
        let rendered = match self.config.insert_mode {
            InsertMode::Row => self.generator.generate(&record)?,
            InsertMode::Batch => self.generator.values_tuple(&record)?,
        };
        Ok(Some(rendered))
    }

    async fn flush(&mut self, batch: &mut PendingBatch, summary: &mut RunSummary) -> Result<()> {
        self.state = PipelineState::Flushing;
        let number = summary.batches_flushed.saturating_add(1);
        let items = std::mem::take(&mut batch.items);

        let statements = match self.config.insert_mode {
            InsertMode::Row => items,
            InsertMode::Batch => self
                .generator
                .statement_from_tuples(&items)
                .into_iter()
                .collect(),
        };

        tracing::debug!(
            "Flushing batch {} (records {}-{}, {} statement(s))",
            number,
            batch.first_record,
            batch.last_record,
            statements.len()
        );

        if self.config.preview_mode
            && let Some(sink) = self.preview.as_mut()
        {
            for statement in &statements {
                writeln!(sink, "{}", statement).map_err(|e| DbForgeError::Io {
                    context: "failed to write preview output".to_string(),
                    source: e,
                })?;
            }
        }

        if self.config.execute_query
            && let Some(executor) = self.executor
        {
            let affected = executor.execute_batch(&statements).await.map_err(|e| {
                DbForgeError::execution_failed(number, batch.first_record, batch.last_record, e)
            })?;
            summary.rows_affected = summary.rows_affected.saturating_add(affected);
        }

        summary.batches_flushed = number;
        summary.statements_generated = summary.statements_generated.saturating_add(statements.len());
        self.state = PipelineState::Streaming;
        Ok(())
    }
}
