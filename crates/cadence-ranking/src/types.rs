use cadence_core::Name;
use serde::{Deserialize, Serialize};

/// Ranks are written in basis points: 10 000 is the top of the collection.
pub const RANK_SCALE: u64 = 10_000;

/// `position` (1-based) among `total` entries, scaled to [`RANK_SCALE`] and
/// rounded up.
///
/// Rounding up keeps every ranked entry above 0, the value of a row no scan
/// has reached. The first of `M` entries gets `ceil(10 000 / M)`, the last
/// gets 10 000. Positions past `total`, possible if rows were added mid-scan,
/// clamp to the scale.
pub fn percentile(position: u64, total: u64) -> u64 {
    if total == 0 {
        return 0;
    }
    let scaled = (u128::from(position) * u128::from(RANK_SCALE)).div_ceil(u128::from(total));
    scaled.min(u128::from(RANK_SCALE)) as u64
}

/// Position of an entity in the ascending scan order.
///
/// Equal scores are ordered by account, so every entity has a distinct key
/// and a distinct position.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct RankKey {
    pub score: i64,
    pub account: Name,
}

/// Resume state threaded through the arguments of successive chunk
/// invocations. Never persisted in a table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkCursor<K = RankKey> {
    /// First entry this chunk processes; `None` starts at the beginning.
    pub start_key: Option<K>,
    /// Number of continuations issued before this one.
    pub chunk_index: u64,
    /// Maximum entries processed per invocation; must be > 0.
    pub chunk_size: u64,
}

impl<K> ChunkCursor<K> {
    /// Cursor for the first chunk of a scan.
    pub fn first(chunk_size: u64) -> Self {
        Self {
            start_key: None,
            chunk_index: 0,
            chunk_size,
        }
    }
}

/// What one chunk invocation did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChunkReport<K = RankKey> {
    pub chunk_index: u64,
    /// Entries processed by this chunk.
    pub processed: u64,
    /// Collection size when the chunk ran.
    pub total: u64,
    /// Cursor for the continuation, `None` when the scan is done.
    pub next: Option<ChunkCursor<K>>,
}

impl<K> ChunkReport<K> {
    pub fn is_done(&self) -> bool {
        self.next.is_none()
    }
}

/// Lifecycle of a job's scan: `Scanning -> Scanning -> ... -> Done`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScanStatus {
    Scanning,
    Done,
}

impl ScanStatus {
    pub fn is_scanning(self) -> bool {
        self == ScanStatus::Scanning
    }
}

impl std::fmt::Display for ScanStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ScanStatus::Scanning => "scanning",
            ScanStatus::Done => "done",
        };
        write!(f, "{s}")
    }
}

impl std::str::FromStr for ScanStatus {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "scanning" => Ok(ScanStatus::Scanning),
            "done" => Ok(ScanStatus::Done),
            other => Err(format!("unknown scan status: {other}")),
        }
    }
}

/// Persisted progress of a job's current or last scan.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RankScan {
    pub job: String,
    pub status: ScanStatus,
    /// Chunk index the next continuation must carry.
    pub next_chunk: u64,
    /// Chunk size the scan was started with.
    pub chunk_size: u64,
    /// Start key the next continuation must carry; `None` before chunk 0.
    pub next_key: Option<RankKey>,
    pub started_at: u64,
    pub updated_at: u64,
}

/// Result of a `startJob` request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StartOutcome {
    /// A new scan began and its first chunk ran.
    Started(ChunkReport),
    /// A scan of the same job is still chaining; nothing was started.
    AlreadyScanning,
}

/// Arguments of `resetscan`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResetScanArgs {
    pub job: String,
}
