//! The collections that get ranked.

/// Static description of one rank job and the table it ranks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RankJob {
    /// Short job name used in CLI and `resetscan`.
    pub name: &'static str,
    /// Score table; trusted SQL identifier.
    pub table: &'static str,
    /// Identity owning the job's continuation slot, separate from the
    /// scheduler's so the two chains never cancel each other.
    pub owner: &'static str,
    /// Entry point that starts a scan.
    pub start_action: &'static str,
    /// Continuation entry point taking a cursor.
    pub chunk_action: &'static str,
}

pub const REPUTATION: RankJob = RankJob {
    name: "rep",
    table: "reputation",
    owner: "rank.rep",
    start_action: "rankreps",
    chunk_action: "rankrep",
};

pub const COMMUNITY_BUILDING: RankJob = RankJob {
    name: "cbs",
    table: "community_building",
    owner: "rank.cbs",
    start_action: "rankcbss",
    chunk_action: "rankcbs",
};

pub const RANK_JOBS: [RankJob; 2] = [REPUTATION, COMMUNITY_BUILDING];

impl RankJob {
    pub fn by_name(name: &str) -> Option<&'static RankJob> {
        RANK_JOBS.iter().find(|j| j.name == name)
    }
}
