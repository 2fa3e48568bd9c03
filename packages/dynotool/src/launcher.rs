//! Remote fan-out of parallel exports.
//!
//! A parallel export is handed to a launcher function, which invokes one
//! dump function per segment. Each dump function drains its segment into
//! page objects of the target bucket. Segments never talk to each other;
//! disjointness comes from the segment indices alone.

use serde::{Deserialize, Serialize};

use crate::codec::OutputFormat;
use crate::error::{DynoError, Result};
use crate::orchestrator::TransferOrchestrator;
use crate::stats::TransferStats;
use crate::types::Segment;

/// Status code of an accepted asynchronous invocation.
pub const ACCEPTED: u16 = 202;

/// Fire-and-forget function invocation.
pub trait RemoteInvoker: Send + Sync {
    /// Invoke `function` asynchronously with a JSON `payload`; returns the
    /// service status code.
    fn invoke_async(&self, function: &str, payload: &[u8]) -> Result<u16>;
}

/// Deployed function names for one namespace.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FunctionNames {
    pub dump_table: String,
    pub launcher: String,
}

impl FunctionNames {
    pub fn new(prefix: &str, namespace: &str) -> Self {
        let dump_table = format!("{}-{}-dump-table", prefix, namespace);
        Self {
            launcher: format!("{}-launcher", dump_table),
            dump_table,
        }
    }
}

/// Payload of the launcher function.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LaunchRequest {
    pub bucket: String,
    pub table: String,
    pub total_segments: u32,
}

/// Payload of one dump function.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SegmentDumpRequest {
    pub bucket: String,
    pub table: String,
    pub total_segments: u32,
    pub segment: u32,
}

impl SegmentDumpRequest {
    pub fn segment(&self) -> Result<Segment> {
        Segment::new(self.segment, self.total_segments)
    }
}

/// Client side of `export --type parallel`: hand the job to the launcher.
pub fn launch_parallel_export(
    invoker: &dyn RemoteInvoker,
    names: &FunctionNames,
    request: &LaunchRequest,
) -> Result<()> {
    if request.total_segments == 0 {
        return Err(DynoError::InvalidArgument("parallel export needs at least one segment".to_string()));
    }
    let payload = serde_json::to_vec(request)?;
    let status = invoker.invoke_async(&names.launcher, &payload)?;
    if status != ACCEPTED {
        return Err(DynoError::Service {
            operation: "Invoke".to_string(),
            code: status.to_string(),
            message: format!("launcher {} did not accept the job", names.launcher),
        });
    }
    tracing::info!(
        function = names.launcher.as_str(),
        table = request.table.as_str(),
        bucket = request.bucket.as_str(),
        segments = request.total_segments,
        "parallel export launched"
    );
    Ok(())
}

/// Launcher body: one asynchronous dump invocation per segment.
///
/// Returns the status code of every invocation in segment order.
pub fn fan_out(invoker: &dyn RemoteInvoker, names: &FunctionNames, request: &LaunchRequest) -> Result<Vec<u16>> {
    let mut statuses = Vec::with_capacity(request.total_segments as usize);
    for segment in Segment::all(request.total_segments)? {
        let dump = SegmentDumpRequest {
            bucket: request.bucket.clone(),
            table: request.table.clone(),
            total_segments: segment.total,
            segment: segment.index,
        };
        let payload = serde_json::to_vec(&dump)?;
        statuses.push(invoker.invoke_async(&names.dump_table, &payload)?);
    }
    let accepted = statuses.iter().filter(|s| **s == ACCEPTED).count();
    if accepted < statuses.len() {
        tracing::warn!(accepted, launched = statuses.len(), "some segment dumps were not accepted");
    }
    Ok(statuses)
}

/// Dump function body: drain one segment into native page objects.
pub fn dump_segment(orchestrator: &TransferOrchestrator<'_>, request: &SegmentDumpRequest) -> Result<TransferStats> {
    let segment = request.segment()?;
    let stats = orchestrator.export_segment_to_bucket(
        &request.table,
        &request.bucket,
        &OutputFormat::Native,
        Some(segment),
    )?;
    tracing::info!(
        table = request.table.as_str(),
        segment = segment.index + 1,
        total = segment.total,
        %stats,
        "segment export complete"
    );
    Ok(stats)
}
