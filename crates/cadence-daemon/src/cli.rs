use cadence_core::{config::DEFAULT_SELF_CALL_INTERVAL_SECS, Name};
use cadence_ranking::{RankJob, COMMUNITY_BUILDING, REPUTATION};
use clap::{Parser, Subcommand, ValueEnum};

#[derive(Parser, Debug)]
#[command(name = "cadence", author, version, about, long_about = None)]
pub struct Cli {
    /// Config file; falls back to $CADENCE_CONFIG, then ~/.cadence/cadence.toml
    #[arg(long, global = true)]
    pub config: Option<String>,

    #[command(subcommand)]
    pub cmd: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run the host loop until interrupted
    Run {
        /// Start the scheduler loop before polling
        #[arg(long)]
        start: bool,
    },
    /// Create or replace an operation
    Configure {
        id: Name,
        /// Action invoked on the target
        action: Name,
        /// Contract the action is sent to
        target: Name,
        /// Seconds between runs
        #[arg(long, default_value_t = 60)]
        period: u64,
        /// Unix seconds of the first run; 0 means now
        #[arg(long, default_value_t = 0)]
        start_time: u64,
    },
    /// Pause an operation
    Pause {
        id: Name,
        /// Clear the pause flag instead
        #[arg(long)]
        resume: bool,
    },
    /// Protect an operation from update-ops
    Protect {
        id: Name,
        /// Clear the protect flag instead
        #[arg(long)]
        off: bool,
    },
    /// Delete an operation
    Remove { id: Name },
    /// Mark an operation as run now
    Confirm { id: Name },
    /// Schedule the next tick, replacing any pending one
    Start,
    /// Cancel the pending tick
    Stop,
    /// Stop the loop, drop every operation and install the defaults
    Reset,
    /// Drop unprotected operations and add missing defaults
    UpdateOps,
    /// Show the loop state, operations and pending deferred calls
    List,
    /// Start a rank scan now
    Rank { job: JobArg },
    /// Abandon a rank scan and its pending continuation
    ResetScan { job: JobArg },
    /// Set an account's score
    SetScore {
        job: JobArg,
        account: Name,
        #[arg(allow_negative_numbers = true)]
        score: i64,
    },
    /// Show an account table with its stored ranks
    Ranks { job: JobArg },
    /// Set the seconds between ticks
    SetInterval {
        #[arg(
            default_value_t = DEFAULT_SELF_CALL_INTERVAL_SECS,
            value_parser = clap::value_parser!(u64).range(1..)
        )]
        secs: u64,
    },
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobArg {
    /// Reputation
    Rep,
    /// Community-building score
    Cbs,
}

impl JobArg {
    pub fn job(self) -> &'static RankJob {
        match self {
            JobArg::Rep => &REPUTATION,
            JobArg::Cbs => &COMMUNITY_BUILDING,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_configure() {
        let cli = Cli::parse_from([
            "cadence", "configure", "cs.rep", "calcrep", "harvest", "--period", "120",
        ]);
        match cli.cmd {
            Command::Configure {
                id,
                period,
                start_time,
                ..
            } => {
                assert_eq!(id, "cs.rep");
                assert_eq!(period, 120);
                assert_eq!(start_time, 0);
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn parses_negative_score() {
        let cli = Cli::parse_from(["cadence", "set-score", "cbs", "alice", "-5"]);
        assert!(matches!(
            cli.cmd,
            Command::SetScore { job: JobArg::Cbs, score: -5, .. }
        ));
    }

    #[test]
    fn set_interval_defaults() {
        let cli = Cli::parse_from(["cadence", "set-interval"]);
        assert!(matches!(
            cli.cmd,
            Command::SetInterval { secs } if secs == DEFAULT_SELF_CALL_INTERVAL_SECS
        ));
    }

    #[test]
    fn zero_interval_is_refused() {
        assert!(Cli::try_parse_from(["cadence", "set-interval", "0"]).is_err());
    }

    #[test]
    fn rejects_invalid_names() {
        assert!(Cli::try_parse_from(["cadence", "remove", "Bad Name"]).is_err());
    }

    #[test]
    fn global_config_flag() {
        let cli = Cli::try_parse_from(["cadence", "list", "--config", "/tmp/c.toml"]).unwrap();
        assert_eq!(cli.config.as_deref(), Some("/tmp/c.toml"));
    }
}
