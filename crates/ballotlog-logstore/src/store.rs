// SPDX-License-Identifier: Apache-2.0

use std::path::Path;

use ballotlog_core::constants::{
    CLOAK_MARKER_FILE, CONTEST_PAYLOAD_FILE, MAIN_BRANCH, MERGE_COMMIT_MESSAGE, ORIGIN_REMOTE,
};
use ballotlog_core::{BallotLogError, CommitContext, Digest, Result};
use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};

use crate::branch::BranchRef;

/// One contest's pending (not yet merged into `main`) branch, as surfaced
/// by [`LogStore::list_pending_cvr_heads`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CvrHead {
    pub branch: String,
    pub contest_uid: String,
    pub head: Digest,
}

/// The content-addressed, append-only log store underlying the ballot
/// ledger (spec §4.1). All operations are blocking; a process that needs
/// concurrency runs more than one actor, not more than one thread against
/// one `LogStore` (spec §5).
#[cfg_attr(any(test, feature = "mock"), mockall::automock)]
pub trait LogStore {
    /// Picks one commit, uniformly at random, from the full ancestry of
    /// `branch` (spec §4.1/§4.2: the branchpoint for a new per-contest
    /// branch). Every ancestor is eligible, including the root commit.
    fn random_ancestor(&self, branch: &str) -> Result<Digest>;

    /// Creates a new local branch named `name` rooted at `start_point`.
    /// Fails if `name` already exists, locally.
    fn create_branch(&self, name: &str, start_point: Digest) -> Result<()>;

    /// Pushes the local branch `name` to `origin`, creating the remote
    /// branch if it does not already exist.
    fn push_branch(&self, name: &str) -> Result<()>;

    /// Deletes the local branch `name`. Idempotent: missing branch is not
    /// an error.
    fn delete_local_branch(&self, name: &str) -> Result<()>;

    /// Deletes the remote branch `name` on `origin`.
    fn delete_remote_branch(&self, name: &str) -> Result<()>;

    /// Commits `payload` (and, if present, `cloak_marker`) as the tip of
    /// `branch`, returning the new commit's digest.
    fn write_contest_payload(
        &self,
        branch: &str,
        payload: &[u8],
        cloak_marker: Option<&[u8]>,
        message: &str,
        ctx: &CommitContext,
    ) -> Result<Digest>;

    /// Reads back the contest payload committed at `commit`.
    fn read_contest_payload(&self, commit: Digest) -> Result<Vec<u8>>;

    /// Reads back the cloak marker committed alongside the contest payload
    /// at `commit`, if any (spec's cloaking extension).
    fn read_cloak_marker(&self, commit: Digest) -> Result<Option<Vec<u8>>>;

    /// Enumerates every branch matching the per-contest pending-CVR shape
    /// (`CVRs/<uid>/<token>`), with each branch's current tip. `remote`
    /// selects `origin/`-tracking branches instead of local ones (spec
    /// §4.3 step 3: "Enumerate CVR branches from {local or remote, per
    /// flag}") — a submission actor that has already pushed and dropped
    /// its local branch is only discoverable this way.
    fn list_pending_cvr_heads(&self, remote: bool) -> Result<Vec<CvrHead>>;

    /// Folds `branch` into `main`: creates a two-parent merge commit whose
    /// tree replaces the contest payload under `branch`'s contest uid with
    /// `witness_payload`, preserving `branch`'s tip as a real parent (so the
    /// ancestry remains independently verifiable) while severing the
    /// content link between the voter's original CVR and the object that
    /// now lives on `main` (spec §4.3). Returns `Ok(None)` if `branch`'s tip
    /// shows no change to the payload file relative to its branchpoint
    /// (spec §7's `merge_empty_diff`, a non-fatal condition the caller logs
    /// and skips).
    fn merge_branch_into_main(
        &self,
        branch: &str,
        witness_payload: &[u8],
        ctx: &CommitContext,
    ) -> Result<Option<Digest>>;

    /// Fast-forwards the local `main` branch to match `origin/main`. Fails
    /// (rather than silently 3-way-merging) if local `main` has diverged,
    /// since divergence on the canonical branch indicates a bug elsewhere
    /// in the system, not a condition to paper over.
    fn pull_main(&self) -> Result<()>;

    /// Current tip of the local `main` branch.
    fn main_head(&self) -> Result<Digest>;
}

/// `git2`-backed [`LogStore`].
///
/// Opening a `GitLogStore` is the entire "scoped acquisition" spec §5 asks
/// for: rather than `chdir`-ing the process into the election data root (as
/// the shell-based reference implementation does, which would be unsound
/// shared mutable state across concurrently running actors in one
/// process), every operation resolves paths against this struct's own
/// `git2::Repository` handle. Dropping a `GitLogStore` releases that handle;
/// there is no broader OS-level state to restore.
pub struct GitLogStore {
    repo: git2::Repository,
}

impl GitLogStore {
    /// Opens the log store rooted at `path` (the repository created by
    /// `git init`/`git clone` for this election's CVR log).
    pub fn open(path: &Path) -> Result<Self> {
        let repo = git2::Repository::open(path)?;
        Ok(GitLogStore { repo })
    }

    fn signatures(ctx: &CommitContext) -> Result<(git2::Signature<'static>, git2::Signature<'static>)> {
        let author = git2::Signature::new(
            &ctx.author_name,
            &ctx.author_email,
            &git2::Time::new(ctx.author_date.timestamp(), 0),
        )?;
        let committer = git2::Signature::new(
            &ctx.author_name,
            &ctx.author_email,
            &git2::Time::new(ctx.committer_date.timestamp(), 0),
        )?;
        Ok((author, committer))
    }

    fn remote_callbacks(&self) -> git2::RemoteCallbacks<'_> {
        let mut callbacks = git2::RemoteCallbacks::new();
        callbacks.credentials(|_url, username_from_url, _allowed_types| {
            git2::Cred::ssh_key_from_agent(username_from_url.unwrap_or("git"))
        });
        callbacks
    }
}

impl LogStore for GitLogStore {
    fn random_ancestor(&self, branch: &str) -> Result<Digest> {
        let mut revwalk = self.repo.revwalk()?;
        revwalk.push_ref(&format!("refs/heads/{branch}"))?;

        // Reservoir sampling of size 1 over the full ancestry: every commit
        // seen so far has equal probability of being the final pick.
        let mut rng = SmallRng::from_rng(rand::thread_rng())
            .map_err(|e| BallotLogError::Other(anyhow::anyhow!(e)))?;
        let mut chosen: Option<git2::Oid> = None;
        let mut seen: u64 = 0;
        for oid in revwalk {
            let oid = oid?;
            seen += 1;
            if rng.gen_range(0..seen) == 0 {
                chosen = Some(oid);
            }
        }

        chosen.map(Digest::from_oid).ok_or_else(|| {
            BallotLogError::Other(anyhow::anyhow!("branch `{branch}` has no commits"))
        })
    }

    fn create_branch(&self, name: &str, start_point: Digest) -> Result<()> {
        let commit = self.repo.find_commit(start_point.oid())?;
        self.repo.branch(name, &commit, false)?;
        Ok(())
    }

    fn push_branch(&self, name: &str) -> Result<()> {
        let mut remote = self.repo.find_remote(ORIGIN_REMOTE)?;
        let refspec = format!("refs/heads/{name}:refs/heads/{name}");
        let mut opts = git2::PushOptions::new();
        opts.remote_callbacks(self.remote_callbacks());
        remote.push(&[refspec.as_str()], Some(&mut opts))?;
        tracing::debug!(branch = name, remote = ORIGIN_REMOTE, "pushed branch");
        Ok(())
    }

    fn delete_local_branch(&self, name: &str) -> Result<()> {
        match self.repo.find_branch(name, git2::BranchType::Local) {
            Ok(mut branch) => {
                branch.delete()?;
                Ok(())
            }
            Err(e) if e.code() == git2::ErrorCode::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    fn delete_remote_branch(&self, name: &str) -> Result<()> {
        let mut remote = self.repo.find_remote(ORIGIN_REMOTE)?;
        let refspec = format!(":refs/heads/{name}");
        let mut opts = git2::PushOptions::new();
        opts.remote_callbacks(self.remote_callbacks());
        remote.push(&[refspec.as_str()], Some(&mut opts))?;
        Ok(())
    }

    fn write_contest_payload(
        &self,
        branch: &str,
        payload: &[u8],
        cloak_marker: Option<&[u8]>,
        message: &str,
        ctx: &CommitContext,
    ) -> Result<Digest> {
        let branch_ref = self.repo.find_branch(branch, git2::BranchType::Local)?;
        let parent_commit = branch_ref.get().peel_to_commit()?;
        let parent_tree = parent_commit.tree()?;

        let payload_oid = self.repo.blob(payload)?;
        let mut builder = self.repo.treebuilder(Some(&parent_tree))?;
        builder.insert(CONTEST_PAYLOAD_FILE, payload_oid, 0o100644)?;
        if let Some(cloak) = cloak_marker {
            let cloak_oid = self.repo.blob(cloak)?;
            builder.insert(CLOAK_MARKER_FILE, cloak_oid, 0o100644)?;
        }
        let tree_oid = builder.write()?;
        let tree = self.repo.find_tree(tree_oid)?;

        let (author, committer) = Self::signatures(ctx)?;
        let commit_oid = self.repo.commit(
            Some(&format!("refs/heads/{branch}")),
            &author,
            &committer,
            message,
            &tree,
            &[&parent_commit],
        )?;
        Ok(Digest::from_oid(commit_oid))
    }

    fn read_contest_payload(&self, commit: Digest) -> Result<Vec<u8>> {
        // Pending-branch commits carry the payload at the tree root;
        // post-merge commits on `main` nest it under the contest uid
        // (see `merge_branch_into_main`). A pre-order walk finds either.
        let commit = self.repo.find_commit(commit.oid())?;
        let tree = commit.tree()?;
        let found = std::cell::RefCell::new(None);
        tree.walk(git2::TreeWalkMode::PreOrder, |_root, entry| {
            if entry.name() == Some(CONTEST_PAYLOAD_FILE) {
                *found.borrow_mut() = Some(entry.id());
                git2::TreeWalkResult::Abort
            } else {
                git2::TreeWalkResult::Ok
            }
        })?;
        let oid = found.into_inner().ok_or_else(|| {
            BallotLogError::Other(anyhow::anyhow!(
                "commit {} has no `{CONTEST_PAYLOAD_FILE}` in its tree",
                commit.id()
            ))
        })?;
        let blob = self.repo.find_blob(oid)?;
        Ok(blob.content().to_vec())
    }

    fn read_cloak_marker(&self, commit: Digest) -> Result<Option<Vec<u8>>> {
        let commit = self.repo.find_commit(commit.oid())?;
        let tree = commit.tree()?;
        match tree.get_name(CLOAK_MARKER_FILE) {
            Some(entry) => {
                let object = entry.to_object(&self.repo)?;
                let blob = object.as_blob().ok_or_else(|| {
                    BallotLogError::Other(anyhow::anyhow!("cloak marker entry is not a blob"))
                })?;
                Ok(Some(blob.content().to_vec()))
            }
            None => Ok(None),
        }
    }

    fn list_pending_cvr_heads(&self, remote: bool) -> Result<Vec<CvrHead>> {
        let branch_type = if remote {
            git2::BranchType::Remote
        } else {
            git2::BranchType::Local
        };
        let mut heads = Vec::new();
        for branch_result in self.repo.branches(Some(branch_type))? {
            let (branch, _branch_type) = branch_result?;
            let Some(name) = branch.name()? else {
                continue;
            };
            let Some(parsed) = BranchRef::parse(name) else {
                continue;
            };
            let commit = branch.get().peel_to_commit()?;
            heads.push(CvrHead {
                branch: parsed.full_name,
                contest_uid: parsed.contest_uid,
                head: Digest::from_oid(commit.id()),
            });
        }
        Ok(heads)
    }

    fn merge_branch_into_main(
        &self,
        branch: &str,
        witness_payload: &[u8],
        ctx: &CommitContext,
    ) -> Result<Option<Digest>> {
        let parsed = BranchRef::parse(branch).ok_or_else(|| {
            BallotLogError::Other(anyhow::anyhow!("`{branch}` is not a pending CVR branch"))
        })?;

        let branch_commit = self.repo.revparse_single(branch)?.peel_to_commit()?;
        if branch_commit.parent_count() == 0 {
            return Ok(None);
        }
        let parent_commit = branch_commit.parent(0)?;
        let diff = self.repo.diff_tree_to_tree(
            Some(&parent_commit.tree()?),
            Some(&branch_commit.tree()?),
            None,
        )?;
        if diff.deltas().len() == 0 {
            return Ok(None);
        }

        let main_ref_name = format!("refs/heads/{MAIN_BRANCH}");
        let main_commit = self.repo.find_reference(&main_ref_name)?.peel_to_commit()?;
        let main_tree = main_commit.tree()?;

        let existing_subtree = main_tree
            .get_path(Path::new(&parsed.contest_uid))
            .ok()
            .and_then(|entry| entry.to_object(&self.repo).ok())
            .and_then(|object| object.peel_to_tree().ok());
        let witness_oid = self.repo.blob(witness_payload)?;
        let mut sub_builder = self.repo.treebuilder(existing_subtree.as_ref())?;
        sub_builder.insert(CONTEST_PAYLOAD_FILE, witness_oid, 0o100644)?;
        let sub_tree_oid = sub_builder.write()?;

        let mut root_builder = self.repo.treebuilder(Some(&main_tree))?;
        root_builder.insert(&parsed.contest_uid, sub_tree_oid, 0o040000)?;
        let new_tree_oid = root_builder.write()?;
        let new_tree = self.repo.find_tree(new_tree_oid)?;

        let (author, committer) = Self::signatures(ctx)?;
        let merge_commit_oid = self.repo.commit(
            Some(&main_ref_name),
            &author,
            &committer,
            MERGE_COMMIT_MESSAGE,
            &new_tree,
            &[&main_commit, &branch_commit],
        )?;
        let digest = Digest::from_oid(merge_commit_oid);
        tracing::debug!(branch, uid = %parsed.contest_uid, %digest, "merged branch into main with witness payload");
        Ok(Some(digest))
    }

    fn pull_main(&self) -> Result<()> {
        // Fetch every branch, not just `main`: the Merge Engine's `--remote`
        // mode (spec §4.3 step 3) reads pending CVRs off `origin/CVRs/...`
        // remote-tracking refs, which only plain `git fetch`/`git pull`
        // (not a `main`-scoped fetch) keeps current.
        let mut remote = self.repo.find_remote(ORIGIN_REMOTE)?;
        let mut opts = git2::FetchOptions::new();
        opts.remote_callbacks(self.remote_callbacks());
        remote.fetch(&[] as &[&str], Some(&mut opts), None)?;

        let remote_main_ref = format!("refs/remotes/{ORIGIN_REMOTE}/{MAIN_BRANCH}");
        let remote_main = self.repo.find_reference(&remote_main_ref)?;
        let fetch_commit = self.repo.reference_to_annotated_commit(&remote_main)?;
        let analysis = self.repo.merge_analysis(&[&fetch_commit])?;

        if analysis.0.is_up_to_date() {
            return Ok(());
        }
        if !analysis.0.is_fast_forward() {
            return Err(BallotLogError::Other(anyhow::anyhow!(
                "local `{MAIN_BRANCH}` has diverged from `{ORIGIN_REMOTE}/{MAIN_BRANCH}`"
            )));
        }

        let main_ref_name = format!("refs/heads/{MAIN_BRANCH}");
        let mut main_ref = self.repo.find_reference(&main_ref_name)?;
        main_ref.set_target(fetch_commit.id(), "fast-forward pull")?;
        self.repo.set_head(&main_ref_name)?;
        self.repo
            .checkout_head(Some(git2::build::CheckoutBuilder::default().force()))?;
        Ok(())
    }

    fn main_head(&self) -> Result<Digest> {
        let reference = self.repo.find_reference(&format!("refs/heads/{MAIN_BRANCH}"))?;
        let commit = reference.peel_to_commit()?;
        Ok(Digest::from_oid(commit.id()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ballotlog_core::constants::CONTEST_FILE_SUBDIR;
    use tempfile::TempDir;

    /// Builds a fresh repository with one empty commit on `main` and
    /// returns the `GitLogStore` opened on it alongside the `TempDir` that
    /// must outlive it.
    fn fixture() -> (TempDir, GitLogStore) {
        let dir = TempDir::new().unwrap();
        let repo = git2::Repository::init(dir.path()).unwrap();
        let ctx = CommitContext::sentinel();
        let (author, committer) = GitLogStore::signatures(&ctx).unwrap();
        let tree_oid = repo.treebuilder(None).unwrap().write().unwrap();
        let tree = repo.find_tree(tree_oid).unwrap();
        repo.commit(
            Some(&format!("refs/heads/{MAIN_BRANCH}")),
            &author,
            &committer,
            "initial commit",
            &tree,
            &[],
        )
        .unwrap();
        drop(repo);
        let store = GitLogStore::open(dir.path()).unwrap();
        (dir, store)
    }

    #[test]
    fn random_ancestor_returns_the_only_commit_on_a_single_commit_branch() {
        let (_dir, store) = fixture();
        let head = store.main_head().unwrap();
        let ancestor = store.random_ancestor(MAIN_BRANCH).unwrap();
        assert_eq!(ancestor, head);
    }

    #[test]
    fn create_branch_then_write_and_read_contest_payload() {
        let (_dir, store) = fixture();
        let start = store.main_head().unwrap();
        let branch_name = format!("{CONTEST_FILE_SUBDIR}/president/0123456789");
        store.create_branch(&branch_name, start).unwrap();

        let ctx = CommitContext::sentinel();
        let digest = store
            .write_contest_payload(&branch_name, br#"{"President":{}}"#, None, "cast", &ctx)
            .unwrap();

        let payload = store.read_contest_payload(digest).unwrap();
        assert_eq!(payload, br#"{"President":{}}"#);
    }

    #[test]
    fn list_pending_cvr_heads_ignores_main() {
        let (_dir, store) = fixture();
        let start = store.main_head().unwrap();
        let branch_name = format!("{CONTEST_FILE_SUBDIR}/president/0123456789");
        store.create_branch(&branch_name, start).unwrap();

        let heads = store.list_pending_cvr_heads(false).unwrap();
        assert_eq!(heads.len(), 1);
        assert_eq!(heads[0].contest_uid, "president");
    }

    #[test]
    fn merge_branch_into_main_replaces_payload_with_witness_value() {
        let (_dir, store) = fixture();
        let start = store.main_head().unwrap();
        let branch_name = format!("{CONTEST_FILE_SUBDIR}/president/0123456789");
        store.create_branch(&branch_name, start).unwrap();

        let ctx = CommitContext::sentinel();
        store
            .write_contest_payload(&branch_name, br#"{"President":{"selection":[0]}}"#, None, "cast", &ctx)
            .unwrap();

        let merge_digest = store
            .merge_branch_into_main(&branch_name, b"witness-value", &ctx)
            .unwrap()
            .expect("branch had a real diff to merge");

        let merged_payload = store.read_contest_payload(merge_digest).unwrap();
        assert_eq!(merged_payload, b"witness-value");
    }

    #[test]
    fn merge_branch_with_no_diff_returns_none() {
        let (_dir, store) = fixture();
        let start = store.main_head().unwrap();
        let branch_name = format!("{CONTEST_FILE_SUBDIR}/president/0123456789");
        store.create_branch(&branch_name, start).unwrap();

        let ctx = CommitContext::sentinel();
        let result = store
            .merge_branch_into_main(&branch_name, b"witness-value", &ctx)
            .unwrap();
        assert!(result.is_none());
    }
}
