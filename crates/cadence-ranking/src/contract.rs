use cadence_core::{config::CadenceConfig, Name};
use cadence_host::{ActionContext, ActionRequest, Contract, HostError};
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::{debug, info, info_span, warn};

use crate::error::{RankingError, Result};
use crate::jobs::{RankJob, RANK_JOBS};
use crate::runner::{ChunkedJobRunner, TableRank};
use crate::scan;
use crate::types::{ChunkCursor, ChunkReport, ResetScanArgs, StartOutcome};

/// Names resolved once for a static [`RankJob`].
struct JobSlot {
    job: &'static RankJob,
    owner: Name,
    start_action: Name,
    chunk_action: Name,
}

impl JobSlot {
    fn new(job: &'static RankJob) -> cadence_core::Result<Self> {
        Ok(Self {
            job,
            owner: Name::new(job.owner)?,
            start_action: Name::new(job.start_action)?,
            chunk_action: Name::new(job.chunk_action)?,
        })
    }
}

/// Ranks every entity of a score table, one chunk per invocation.
///
/// `start_action` begins a scan and runs chunk 0 in the same invocation;
/// each further chunk arrives as a deferred call owned by the job's
/// identity, carrying the cursor in its arguments.
pub struct RankingContract {
    identity: Name,
    operators: Vec<Name>,
    chunk_size: u64,
    continuation_delay_secs: u64,
    jobs: Vec<JobSlot>,
}

impl RankingContract {
    pub fn new(
        identity: Name,
        operators: Vec<Name>,
        chunk_size: u64,
        continuation_delay_secs: u64,
    ) -> cadence_core::Result<Self> {
        let jobs = RANK_JOBS
            .iter()
            .map(JobSlot::new)
            .collect::<cadence_core::Result<Vec<_>>>()?;
        Ok(Self {
            identity,
            operators,
            chunk_size,
            continuation_delay_secs,
            jobs,
        })
    }

    /// The scheduler identity and the admin may start and reset scans.
    pub fn from_config(config: &CadenceConfig) -> cadence_core::Result<Self> {
        let mut operators = vec![config.scheduler.identity.clone()];
        if config.scheduler.admin != config.scheduler.identity {
            operators.push(config.scheduler.admin.clone());
        }
        Self::new(
            config.ranking.identity.clone(),
            operators,
            config.ranking.chunk_size,
            config.ranking.continuation_delay_secs,
        )
    }

    pub fn identity(&self) -> &Name {
        &self.identity
    }

    /// Begin a scan of `job` and process its first chunk.
    ///
    /// A scan already chaining for the same job is left alone.
    pub fn start_job(&self, cx: &ActionContext<'_>, job: &RankJob) -> Result<StartOutcome> {
        let slot = self.slot(job)?;
        self.require_operator(cx)?;
        let _span = info_span!("rank_scan", job = job.name, now = cx.now()).entered();

        if scan::is_scanning(cx.conn(), job)? {
            warn!("scan already in progress; start ignored");
            return Ok(StartOutcome::AlreadyScanning);
        }

        scan::begin(cx.conn(), job, self.chunk_size, cx.now())?;
        cx.cancel_deferred(&slot.owner)?;
        info!(chunk_size = self.chunk_size, "scan started");

        let report = self.process_chunk(cx, slot, &ChunkCursor::first(self.chunk_size))?;
        Ok(StartOutcome::Started(report))
    }

    /// Process the chunk `cursor` points at and chain the next one.
    pub fn run_chunk(
        &self,
        cx: &ActionContext<'_>,
        job: &RankJob,
        cursor: &ChunkCursor,
    ) -> Result<ChunkReport> {
        let slot = self.slot(job)?;
        let mut allowed: Vec<&Name> = self.operators.iter().collect();
        allowed.push(&slot.owner);
        cx.require_any_auth(&allowed)?;
        let _span = info_span!("rank_scan", job = job.name, chunk = cursor.chunk_index).entered();

        if cursor.chunk_size == 0 {
            return Err(RankingError::JobStateInvalid(
                "chunk size must be greater than zero".into(),
            ));
        }
        let Some(state) = scan::get(cx.conn(), job)?.filter(|s| s.status.is_scanning()) else {
            return Err(RankingError::JobStateInvalid(format!(
                "no scan of {} in progress",
                job.name
            )));
        };
        // The cursor must be exactly the one the previous chunk issued.
        if state.next_chunk != cursor.chunk_index {
            return Err(RankingError::JobStateInvalid(format!(
                "expected chunk {}, got {}",
                state.next_chunk, cursor.chunk_index
            )));
        }
        if state.chunk_size != cursor.chunk_size {
            return Err(RankingError::JobStateInvalid(format!(
                "expected chunk size {}, got {}",
                state.chunk_size, cursor.chunk_size
            )));
        }
        if state.next_key != cursor.start_key {
            return Err(RankingError::JobStateInvalid(
                "start key does not match the running scan".into(),
            ));
        }

        self.process_chunk(cx, slot, cursor)
    }

    /// Abandon `job`'s scan: drop its pending continuation and its progress.
    pub fn reset_scan(&self, cx: &ActionContext<'_>, job: &RankJob) -> Result<bool> {
        let slot = self.slot(job)?;
        self.require_operator(cx)?;
        let cancelled = cx.cancel_deferred(&slot.owner)?.is_some();
        let cleared = scan::clear(cx.conn(), job)?;
        warn!(job = job.name, cancelled, cleared, "scan reset");
        Ok(cancelled || cleared)
    }

    fn process_chunk(
        &self,
        cx: &ActionContext<'_>,
        slot: &JobSlot,
        cursor: &ChunkCursor,
    ) -> Result<ChunkReport> {
        let report = ChunkedJobRunner::run_chunk(&TableRank::new(slot.job), cx.conn(), cursor)?;

        match &report.next {
            Some(next) => {
                let request =
                    ActionRequest::with_args(self.identity.clone(), slot.chunk_action.clone(), next)?;
                let handle = cx.defer(&slot.owner, &request, self.continuation_delay_secs)?;
                scan::advance(cx.conn(), slot.job, next, cx.now())?;
                debug!(
                    processed = report.processed,
                    next_chunk = next.chunk_index,
                    due_at = handle.due_at,
                    "continuation scheduled"
                );
            }
            None => {
                scan::finish(cx.conn(), slot.job, cx.now())?;
                info!(
                    chunks = report.chunk_index + 1,
                    total = report.total,
                    "scan complete"
                );
            }
        }
        Ok(report)
    }

    fn slot(&self, job: &RankJob) -> Result<&JobSlot> {
        self.jobs
            .iter()
            .find(|s| s.job == job)
            .ok_or_else(|| RankingError::UnknownJob(job.name.to_string()))
    }

    fn require_operator(&self, cx: &ActionContext<'_>) -> Result<()> {
        let allowed: Vec<&Name> = self.operators.iter().collect();
        cx.require_any_auth(&allowed)?;
        Ok(())
    }

    fn handle(&self, cx: &ActionContext<'_>, action: &Name, args: &Value) -> Result<()> {
        if action == "resetscan" {
            let a: ResetScanArgs = decode(args)?;
            let job = RankJob::by_name(&a.job).ok_or(RankingError::UnknownJob(a.job))?;
            self.reset_scan(cx, job)?;
            return Ok(());
        }
        for slot in &self.jobs {
            if *action == slot.start_action {
                self.start_job(cx, slot.job)?;
                return Ok(());
            }
            if *action == slot.chunk_action {
                let cursor: ChunkCursor = decode(args)?;
                self.run_chunk(cx, slot.job, &cursor)?;
                return Ok(());
            }
        }
        Err(HostError::UnknownAction {
            target: self.identity.clone(),
            action: action.clone(),
        }
        .into())
    }
}

impl Contract for RankingContract {
    fn name(&self) -> &Name {
        &self.identity
    }

    fn apply(&self, cx: &ActionContext<'_>, action: &Name, args: &Value) -> cadence_host::Result<()> {
        self.handle(cx, action, args)
            .map_err(|e| e.into_host(&self.identity, action))
    }
}

fn decode<T: DeserializeOwned>(args: &Value) -> Result<T> {
    Ok(T::deserialize(args)?)
}
