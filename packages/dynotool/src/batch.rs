//! BatchWriter / BatchDeleter: bounded-size mutations tolerating partial acceptance.
//!
//! Input is chunked into batches of `capacity` requests. Each batch is
//! submitted, and whatever the service leaves unprocessed is resubmitted
//! on its own (never the whole original batch) after a backoff sleep,
//! until nothing is left. Throttling errors on submission back off the
//! same way. Any other error, including service-side validation of a
//! malformed request, aborts the drain.

use crate::client::{TableClient, MAX_BATCH_WRITE};
use crate::error::{DynoError, Result};
use crate::progress::ProgressSink;
use crate::retry::{Backoff, RetryPolicy, Sleeper};
use crate::stats::TransferStats;
use crate::types::{TableSchema, TaggedRecord, WriteRequest};

const OPERATION: &str = "BatchWriteItem";

pub struct BatchWriter<'a> {
    client: &'a dyn TableClient,
    table: String,
    capacity: usize,
    policy: &'a RetryPolicy,
    sleeper: &'a dyn Sleeper,
    progress: &'a dyn ProgressSink,
}

impl<'a> BatchWriter<'a> {
    /// `capacity` is the per-request batch size, at most `MAX_BATCH_WRITE`.
    pub fn new(
        client: &'a dyn TableClient,
        table: &str,
        capacity: usize,
        policy: &'a RetryPolicy,
        sleeper: &'a dyn Sleeper,
        progress: &'a dyn ProgressSink,
    ) -> Result<Self> {
        if capacity == 0 || capacity > MAX_BATCH_WRITE {
            return Err(DynoError::InvalidArgument(format!(
                "batch capacity must be between 1 and {}, got {}",
                MAX_BATCH_WRITE, capacity
            )));
        }
        Ok(Self {
            client,
            table: table.to_string(),
            capacity,
            policy,
            sleeper,
            progress,
        })
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// One round trip; returns the unprocessed subset.
    pub fn submit_batch(&self, batch: &[WriteRequest]) -> Result<Vec<WriteRequest>> {
        self.client.batch_write(&self.table, batch)
    }

    /// Chunk `requests` into batches and submit each until fully applied.
    pub fn drain<I>(&self, requests: I) -> Result<TransferStats>
    where
        I: IntoIterator<Item = WriteRequest>,
    {
        let mut stats = TransferStats::start();
        let mut backoff = Backoff::new(self.policy, self.sleeper);
        let mut chunk = Vec::with_capacity(self.capacity);

        for request in requests {
            chunk.push(request);
            if chunk.len() == self.capacity {
                self.submit_fully(std::mem::take(&mut chunk), &mut backoff, &mut stats)?;
            }
        }
        if !chunk.is_empty() {
            self.submit_fully(chunk, &mut backoff, &mut stats)?;
        }

        stats.retries = backoff.total_retries();
        Ok(stats.finish())
    }

    /// Submit one batch, then resubmit its unprocessed remainder until empty.
    fn submit_fully(
        &self,
        batch: Vec<WriteRequest>,
        backoff: &mut Backoff<'_>,
        stats: &mut TransferStats,
    ) -> Result<()> {
        let mut pending = batch;
        loop {
            match self.submit_batch(&pending) {
                Ok(unprocessed) => {
                    stats.requests += 1;
                    stats.records += (pending.len() - unprocessed.len().min(pending.len())) as u64;
                    self.progress.on_batch(pending.len(), unprocessed.len());
                    tracing::debug!(
                        table = self.table.as_str(),
                        submitted = pending.len(),
                        unprocessed = unprocessed.len(),
                        "batch submitted"
                    );
                    if unprocessed.is_empty() {
                        backoff.reset();
                        return Ok(());
                    }
                    tracing::warn!(
                        table = self.table.as_str(),
                        unprocessed = unprocessed.len(),
                        "resubmitting unprocessed items"
                    );
                    pending = unprocessed;
                }
                Err(err) if err.is_retryable() => {
                    tracing::warn!(table = self.table.as_str(), error = %err, "batch throttled");
                }
                Err(err) => return Err(err),
            }
            let retry = backoff.consecutive();
            let delay = backoff.wait(OPERATION)?;
            self.progress.on_retry(retry + 1, delay);
        }
    }
}

/// Deletes records by key through a `BatchWriter`.
pub struct BatchDeleter<'a> {
    writer: BatchWriter<'a>,
    schema: &'a TableSchema,
}

impl<'a> BatchDeleter<'a> {
    pub fn new(
        client: &'a dyn TableClient,
        schema: &'a TableSchema,
        capacity: usize,
        policy: &'a RetryPolicy,
        sleeper: &'a dyn Sleeper,
        progress: &'a dyn ProgressSink,
    ) -> Result<Self> {
        Ok(Self {
            writer: BatchWriter::new(client, &schema.name, capacity, policy, sleeper, progress)?,
            schema,
        })
    }

    /// One round trip deleting the given records.
    pub fn submit_batch(&self, records: &[TaggedRecord]) -> Result<Vec<WriteRequest>> {
        let requests = self.delete_requests(records.iter())?;
        self.writer.submit_batch(&requests)
    }

    /// Delete every record. Records may be full items or bare keys; only
    /// the key attributes are sent.
    pub fn drain<'r, I>(&self, records: I) -> Result<TransferStats>
    where
        I: IntoIterator<Item = &'r TaggedRecord>,
    {
        let requests = self.delete_requests(records.into_iter())?;
        self.writer.drain(requests)
    }

    fn delete_requests<'r>(&self, records: impl Iterator<Item = &'r TaggedRecord>) -> Result<Vec<WriteRequest>> {
        records
            .map(|record| self.schema.key_of(record).map(WriteRequest::Delete))
            .collect()
    }
}
