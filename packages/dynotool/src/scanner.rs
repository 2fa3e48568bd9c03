//! PaginatedScanner: drains a table, or one static segment of it, page by page.
//!
//! Pages are requested one at a time and handed to the caller before the
//! next request goes out, so memory stays bounded by a single page.
//! Throttled requests are retried with the shared backoff policy; any
//! other error aborts the drain. The scanner keeps no state between runs
//! beyond the continuation token it threads through its own loop.

use crate::client::{ScanRequest, TableClient};
use crate::error::Result;
use crate::progress::ProgressSink;
use crate::retry::{with_retry, Backoff, RetryPolicy, Sleeper};
use crate::stats::TransferStats;
use crate::types::{PageResult, ScanFilter, Segment};

/// Ratio at or above which a page is reported as critical.
pub const CRITICAL_PRESSURE: f64 = 0.90;

/// Ratio at or above which a page is reported as elevated.
pub const ELEVATED_PRESSURE: f64 = 0.65;

// ── Pressure ────────────────────────────────────────────────────────

/// Consumed-capacity pressure of one page. Observability only: the
/// scanner never slows down on this signal, only on actual throttling.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Pressure {
    /// No provisioned capacity to compare against (on-demand table).
    Unmetered,
    Nominal,
    Elevated,
    Critical,
}

impl Pressure {
    /// `consumed / provisioned`, or `None` when either side is unknown or
    /// the table is unmetered.
    pub fn ratio(consumed: Option<f64>, provisioned: Option<f64>) -> Option<f64> {
        match (consumed, provisioned) {
            (Some(consumed), Some(provisioned)) if provisioned > 0.0 => Some(consumed / provisioned),
            _ => None,
        }
    }

    pub fn from_ratio(ratio: Option<f64>) -> Self {
        match ratio {
            None => Pressure::Unmetered,
            Some(r) if r >= CRITICAL_PRESSURE => Pressure::Critical,
            Some(r) if r >= ELEVATED_PRESSURE => Pressure::Elevated,
            Some(_) => Pressure::Nominal,
        }
    }

    pub fn glyph(&self) -> char {
        match self {
            Pressure::Unmetered | Pressure::Nominal => '.',
            Pressure::Elevated => '*',
            Pressure::Critical => '!',
        }
    }
}

// ── Options ─────────────────────────────────────────────────────────

/// Per-drain scan parameters.
#[derive(Debug, Clone, Default)]
pub struct ScanOptions {
    pub segment: Option<Segment>,
    pub filter: Option<ScanFilter>,
    /// Upper bound on the total number of records delivered.
    pub max_items: Option<u64>,
    /// Records evaluated per request (service default when unset).
    pub page_size: Option<u32>,
    /// Provisioned read capacity for pressure reporting; `None` = unmetered.
    pub read_capacity: Option<f64>,
}

// ── Scanner ─────────────────────────────────────────────────────────

pub struct PaginatedScanner<'a> {
    client: &'a dyn TableClient,
    policy: &'a RetryPolicy,
    sleeper: &'a dyn Sleeper,
    progress: &'a dyn ProgressSink,
}

impl<'a> PaginatedScanner<'a> {
    pub fn new(
        client: &'a dyn TableClient,
        policy: &'a RetryPolicy,
        sleeper: &'a dyn Sleeper,
        progress: &'a dyn ProgressSink,
    ) -> Self {
        Self {
            client,
            policy,
            sleeper,
            progress,
        }
    }

    /// One network round trip. No retry at this level.
    pub fn scan_page(&self, request: &ScanRequest) -> Result<PageResult> {
        self.client.scan(request)
    }

    /// Request pages until the continuation token runs out or `max_items`
    /// records have been delivered, feeding each page to `on_page`.
    ///
    /// The page that crosses `max_items` is truncated to the exact
    /// remaining count, so the caller never receives more than asked for.
    pub fn drain<F>(&self, table: &str, options: &ScanOptions, mut on_page: F) -> Result<TransferStats>
    where
        F: FnMut(PageResult, Pressure) -> Result<()>,
    {
        let mut stats = TransferStats::start();
        let mut backoff = Backoff::new(self.policy, self.sleeper);
        let mut remaining = options.max_items;
        let mut request = ScanRequest {
            table: table.to_string(),
            continuation: None,
            segment: options.segment,
            filter: options.filter.clone(),
            limit: options.page_size,
        };

        while remaining != Some(0) {
            request.limit = page_limit(options.page_size, remaining);

            let mut page = with_retry(&mut backoff, "Scan", self.progress, || self.scan_page(&request))?;
            stats.requests += 1;

            let ratio = Pressure::ratio(page.consumed_capacity, options.read_capacity);
            let pressure = Pressure::from_ratio(ratio);
            stats.observe_capacity(page.consumed_capacity, ratio);

            let mut exhausted = page.continuation.is_none();
            if let Some(left) = remaining {
                if page.records.len() as u64 >= left {
                    page.records.truncate(left as usize);
                    page.count = page.records.len();
                    exhausted = true;
                }
                remaining = Some(left - page.records.len() as u64);
            }

            let delivered = page.records.len();
            stats.records += delivered as u64;
            self.progress.on_page(delivered, pressure);
            tracing::debug!(
                table,
                segment = ?options.segment,
                records = delivered,
                scanned = page.scanned_count,
                consumed = ?page.consumed_capacity,
                ?pressure,
                "scanned page"
            );

            let next = page.continuation.take();
            on_page(page, pressure)?;

            match next {
                Some(token) if !exhausted => request.continuation = Some(token),
                _ => break,
            }
        }

        stats.retries = backoff.total_retries();
        Ok(stats.finish())
    }
}

fn page_limit(page_size: Option<u32>, remaining: Option<u64>) -> Option<u32> {
    let remaining = remaining.map(|r| r.min(u32::MAX as u64) as u32);
    match (page_size, remaining) {
        (Some(size), Some(left)) => Some(size.min(left)),
        (size, left) => size.or(left),
    }
}
