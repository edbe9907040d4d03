// SPDX-License-Identifier: Apache-2.0

//! Command line entry points for the ballot ledger core. This binary is a
//! thin collaborator (spec §1's "out of scope: the command-line surface"
//! names the *design* of a CLI as external; this is the minimal shim that
//! exercises the core library operations end to end).

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use ballotlog_config::LedgerConfig;
use ballotlog_core::CommitContext;
use ballotlog_logstore::GitLogStore;
use ballotlog_merge::MergeEngine;
use ballotlog_model::{Ballot, Contest};
use ballotlog_receipt::ReceiptBuilder;
use ballotlog_submit::SubmissionEngine;
use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "ballotlog", author, version, about, long_about = None)]
struct Cli {
    /// Root directory of the election data tree.
    #[arg(long, global = true)]
    election_data_root: PathBuf,

    /// 0 critical, 1 error, 2 warning, 3 info, 4 debug.
    #[arg(short, long, default_value_t = 3, global = true)]
    verbosity: u8,

    /// Describe the actions that would be taken without writing anything.
    #[arg(short = 'n', long, global = true)]
    printonly: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Submit a cast ballot: one branch per contest, pushed atomically,
    /// followed by receipt construction.
    AcceptBallot {
        /// Path to the cast ballot JSON file.
        #[arg(long)]
        cast_ballot: PathBuf,

        /// Path to the blank ballot JSON file the cast ballot is checked
        /// against.
        #[arg(long)]
        blank_ballot: PathBuf,

        /// Immediately merge this ballot's contests to `main` afterward
        /// (demo/single-node mode; a production deployment runs
        /// `merge-contests` out of band on its own schedule).
        #[arg(short = 'm', long)]
        merge_contests: bool,

        /// Where to write the voter's CSV receipt.
        #[arg(long)]
        receipt_out: Option<PathBuf>,
    },

    /// Fold pending per-contest branches into `main` once they clear the
    /// k-anonymity threshold.
    MergeContests {
        /// Merge exactly this branch, bypassing the threshold batching.
        #[arg(long)]
        branch: Option<String>,

        /// Merge every pending branch regardless of pool size.
        #[arg(long)]
        flush: bool,

        /// Operate on remote-tracking branches (`origin/CVRs/...`) instead
        /// of local ones, deleting only the remote copy on merge.
        #[arg(long)]
        remote: bool,

        /// Override the configured k-anonymity threshold for this run.
        #[arg(long)]
        minimum_cast_cache: Option<usize>,
    },

    /// Tally the merged contests on `main`. Tally algorithms themselves
    /// (plurality, RCV) are an external collaborator (spec §1's
    /// Non-goals); this command exists for CLI-surface completeness.
    TallyContests {
        #[arg(long)]
        contest_uid: Option<String>,
    },

    /// Produce a cast ballot JSON file from a blank ballot and a voter's
    /// selections. Blank-ballot generation and ballot rendering are an
    /// external collaborator (spec §1's Non-goals); this command exists
    /// for CLI-surface completeness only.
    CastBallot {
        #[arg(long)]
        blank_ballot: PathBuf,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Preserved at the process boundary per spec §6, even though every
    // internal commit call takes a `CommitContext` explicitly rather than
    // reading these back out of the environment.
    std::env::set_var("GIT_AUTHOR_DATE", ballotlog_core::constants::SENTINEL_COMMIT_DATE);
    std::env::set_var("GIT_COMMITTER_DATE", ballotlog_core::constants::SENTINEL_COMMIT_DATE);
    std::env::set_var("GIT_EDITOR", "true");

    init_tracing(cli.verbosity);

    let mut config = LedgerConfig::new(&cli.election_data_root);

    match cli.command {
        Command::AcceptBallot {
            cast_ballot,
            blank_ballot,
            merge_contests,
            receipt_out,
        } => run_accept_ballot(&config, cli.printonly, &cast_ballot, &blank_ballot, merge_contests, receipt_out),
        Command::MergeContests {
            branch,
            flush,
            remote,
            minimum_cast_cache,
        } => {
            if let Some(threshold) = minimum_cast_cache {
                config.minimum_cast_cache = threshold;
            }
            run_merge_contests(&config, cli.printonly, branch, flush, remote)
        }
        Command::TallyContests { contest_uid } => {
            tracing::warn!(
                ?contest_uid,
                "tally-contests is an external collaborator (spec Non-goal); nothing to do"
            );
            Ok(())
        }
        Command::CastBallot { blank_ballot } => {
            tracing::warn!(
                blank_ballot = %blank_ballot.display(),
                "cast-ballot (ballot rendering) is an external collaborator (spec Non-goal); nothing to do"
            );
            Ok(())
        }
    }
}

fn init_tracing(verbosity: u8) {
    let level = match verbosity {
        0 => "error",
        1 => "error",
        2 => "warn",
        3 => "info",
        _ => "debug",
    };
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::new(format!("ballotlog={level}")))
        .init();
}

fn run_accept_ballot(
    config: &LedgerConfig,
    printonly: bool,
    cast_ballot_path: &Path,
    blank_ballot_path: &Path,
    merge_contests: bool,
    receipt_out: Option<PathBuf>,
) -> Result<()> {
    let cast = load_ballot_file(cast_ballot_path)
        .with_context(|| format!("reading cast ballot from {}", cast_ballot_path.display()))?;
    let blank = load_ballot_file(blank_ballot_path)
        .with_context(|| format!("reading blank ballot from {}", blank_ballot_path.display()))?;

    ballotlog_validate::validate_cast_ballot_traced(&cast, &blank)?;

    if printonly {
        tracing::info!(ballot_uid = %cast.ballot_uid, contests = cast.contests.len(), "printonly: would submit ballot");
        return Ok(());
    }

    let store = GitLogStore::open(&config.cvr_repo_path())?;
    let ctx = CommitContext::sentinel();

    let submission = SubmissionEngine::new(store, config.clone()).submit_ballot(&cast, &ctx)?;
    tracing::info!(ballot_uid = %submission.ballot_uid, contests = submission.contest_receipts.len(), "ballot submitted");

    let receipt = ReceiptBuilder::new(config.clone())
        .build_receipt(&cast, &submission.contest_receipts, &submission.pending_pool)?;

    if receipt.is_degraded() {
        tracing::warn!("ballot receipt degraded: insufficient unmerged CVRs in one or more contests");
    }
    if let Some(out_path) = receipt_out {
        fs::write(&out_path, &receipt.csv_bytes)
            .with_context(|| format!("writing receipt to {}", out_path.display()))?;
    }

    if merge_contests {
        let merge_store = GitLogStore::open(&config.cvr_repo_path())?;
        let engine = MergeEngine::new(merge_store, config.clone());
        // Demo mode merges exactly the branches this ballot just pushed
        // (spec §4.2 step 5: "invoke Merge Engine directly on these
        // branches"), bypassing the k-anonymity threshold batch entirely --
        // not a generic `merge_pending` pass, which would merge nothing
        // under any realistic `minimum_cast_cache`.
        for branch in submission.branches.values() {
            let remote_branch = format!("origin/{branch}");
            match engine.merge_explicit_branch(&remote_branch, true, &ctx)? {
                Some(digest) => {
                    tracing::info!(branch = %remote_branch, %digest, "demo-mode merge after accept-ballot")
                }
                None => {
                    tracing::warn!(branch = %remote_branch, "demo-mode merge: branch had no changed payload, skipped")
                }
            }
        }
    }

    Ok(())
}

fn run_merge_contests(
    config: &LedgerConfig,
    printonly: bool,
    branch: Option<String>,
    flush: bool,
    remote: bool,
) -> Result<()> {
    if printonly {
        tracing::info!(?branch, flush, remote, "printonly: would merge pending contests");
        return Ok(());
    }

    let store = GitLogStore::open(&config.cvr_repo_path())?;
    let engine = MergeEngine::new(store, config.clone());
    let ctx = CommitContext::sentinel();

    if let Some(branch) = branch {
        let result = engine.merge_explicit_branch(&branch, remote, &ctx)?;
        match result {
            Some(digest) => tracing::info!(%branch, %digest, "merged branch"),
            None => tracing::warn!(%branch, "branch had no changed payload, skipped"),
        }
        return Ok(());
    }

    let summary = engine.merge_pending(flush, remote, &ctx)?;
    for warning in &summary.warnings {
        tracing::warn!(%warning, "merge warning");
    }
    tracing::info!(?summary.merged_per_uid, "merge-contests complete");
    Ok(())
}

/// Loads a ballot from the simple wire format this CLI reads and writes:
/// `{"ballot_uid": "...", "contests": [{"<name>": {...}}, ...]}`, each
/// array entry being one contest in the single-top-level-key shape spec §6
/// describes.
fn load_ballot_file(path: &Path) -> Result<Ballot> {
    let bytes = fs::read(path).with_context(|| format!("reading {}", path.display()))?;
    let doc: serde_json::Value = serde_json::from_slice(&bytes)?;
    let ballot_uid = doc
        .get("ballot_uid")
        .and_then(|v| v.as_str())
        .context("ballot file missing `ballot_uid`")?
        .to_string();
    let contests_value = doc
        .get("contests")
        .and_then(|v| v.as_array())
        .context("ballot file missing `contests` array")?;

    let mut contests = Vec::with_capacity(contests_value.len());
    for entry in contests_value {
        contests.push(Contest::from_json_value(entry.clone())?);
    }

    if contests.is_empty() {
        bail!("ballot file `{}` has no contests", path.display());
    }

    Ok(Ballot::new(ballot_uid, contests))
}
