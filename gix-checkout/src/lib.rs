//! Plans and applies a checkout: moves a working tree and index from whatever
//! state they are currently in to the tree of a named commit-ish, via the
//! three-way reconciliation between that target tree, the index, and the
//! working directory on disk.
//!
//! The entry point is [`checkout()`]. Everything this crate does not own —
//! the object database, the index codec, the filesystem, the config file and
//! the ref store — is reached through the [`collaborators::Collaborators`]
//! bundle of traits, so the planner and applier can be driven against fakes
//! in tests and against `gix-odb`/`gix-index`/`gix-fs`/`gix-ref` in production.
#![deny(rust_2018_idioms)]
#![forbid(unsafe_code)]

use std::path::PathBuf;

use bstr::{BString, ByteSlice};
use gix_hash::ObjectId;

pub mod aggregate;
pub mod apply;
pub mod collaborators;
pub mod head;
pub mod mode;
pub mod pathspec;
pub mod paths;
pub mod plan;
pub mod walk;

pub use collaborators::{CollabError, Collaborators};
pub use mode::Mode;
pub use plan::Op;

const ANALYZING_WORKDIR: &str = "Analyzing workdir";

/// Configuration for one [`checkout()`] call.
#[derive(Debug, Clone)]
pub struct Options {
    /// Working-tree root.
    pub dir: PathBuf,
    /// Repository metadata root, usually `<dir>/.git`.
    pub gitdir: PathBuf,
    /// Branch name or commit-ish to check out.
    pub ref_name: String,
    /// Prefix filter; defaults to `["."]` (the whole tree) when empty.
    pub filepaths: Vec<BString>,
    /// Glob, rooted at its longest literal leading directory relative to each filepath.
    pub pattern: Option<BString>,
    /// Used when `ref_name` resolves only under `<remote>/<ref_name>`.
    pub remote: String,
    /// Update `HEAD` only; skip the walk, plan and apply entirely.
    pub no_checkout: bool,
    /// Return the plan without touching the filesystem, index, config or `HEAD`.
    pub dry_run: bool,
    /// Prepended to every emitted progress event's name.
    pub emitter_prefix: String,
}

impl Options {
    /// Fills in the required fields; everything else defaults.
    pub fn new(dir: impl Into<PathBuf>, ref_name: impl Into<String>) -> Self {
        let dir = dir.into();
        let gitdir = dir.join(".git");
        Options {
            dir,
            gitdir,
            ref_name: ref_name.into(),
            filepaths: Vec::new(),
            pattern: None,
            remote: "origin".into(),
            no_checkout: false,
            dry_run: false,
            emitter_prefix: String::new(),
        }
    }

    /// Overrides the default `<dir>/.git`.
    pub fn with_gitdir(mut self, gitdir: impl Into<PathBuf>) -> Self {
        self.gitdir = gitdir.into();
        self
    }

    /// Restricts the checkout to these path prefixes.
    pub fn with_filepaths(mut self, filepaths: Vec<BString>) -> Self {
        self.filepaths = filepaths;
        self
    }

    /// Further restricts the checkout with a glob, rooted relative to each filepath.
    pub fn with_pattern(mut self, pattern: impl Into<BString>) -> Self {
        self.pattern = Some(pattern.into());
        self
    }

    /// Overrides the default remote name (`"origin"`) used for the tracking bootstrap.
    pub fn with_remote(mut self, remote: impl Into<String>) -> Self {
        self.remote = remote.into();
        self
    }

    /// Sets `noCheckout`: update `HEAD` only, skip the walk/plan/apply.
    pub fn with_no_checkout(mut self, no_checkout: bool) -> Self {
        self.no_checkout = no_checkout;
        self
    }

    /// Sets `dryRun`: compute and return the plan, make no side effect.
    pub fn with_dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    /// Overrides the default empty progress event name prefix.
    pub fn with_emitter_prefix(mut self, emitter_prefix: impl Into<String>) -> Self {
        self.emitter_prefix = emitter_prefix.into();
        self
    }
}

/// What a [`checkout()`] call actually did.
#[derive(Debug, Clone)]
pub struct Outcome {
    /// The reduced, ordered plan the Tri-Walker and Planner produced. Always
    /// populated, including on a dry run.
    pub plan: Vec<Op>,
    /// The commit-ish `options.ref_name` resolved to.
    pub oid: ObjectId,
    /// Whether the remote-tracking bootstrap ran.
    pub bootstrapped_tracking_branch: bool,
}

/// Everything that can go wrong during a checkout.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// `options.ref_name` was empty.
    #[error("a ref to check out is required")]
    MissingRequiredParameter,
    /// The resolved commit (or its tree) could not be read from the object store.
    #[error("commit could not be read from the object store: {0}")]
    CommitNotFetched(CollabError),
    /// One or more plan ops were `conflict`; nothing was mutated.
    #[error("checkout conflicts on {} path(s)", .0.len())]
    CheckoutConflict(Vec<BString>),
    /// One or more plan ops were `error`; nothing was mutated.
    #[error("checkout failed with {} internal error(s): {}", .0.len(), .0.join("; "))]
    Internal(Vec<String>),
    /// A submodule (gitlink) was encountered. Never returned by [`checkout()`] itself —
    /// submodules are logged and skipped — kept for collaborators that
    /// want to surface the same kind explicitly.
    #[error("submodule checkout is not implemented")]
    NotImplemented,
    /// Any other collaborator failure, re-tagged with the `checkout` caller identity.
    #[error("checkout: {0}")]
    Collaborator(CollabError),
}

impl Error {
    /// Re-tags a collaborator failure with the `checkout` caller identity.
    pub fn from_collaborator(err: CollabError) -> Self {
        Error::Collaborator(err)
    }
}

struct WalkProgressAdapter<'a> {
    emitter: &'a dyn collaborators::Emitter,
    prefix: &'a str,
    visited: usize,
}

impl walk::WalkProgress for WalkProgressAdapter<'_> {
    fn visited(&mut self) {
        self.visited += 1;
        self.emitter.emit_progress(self.prefix, ANALYZING_WORKDIR, self.visited, None);
    }
}

/// Moves `collaborators`' working tree and index from their current state to the tree
/// `options.ref_name` resolves to. See [`Options`] for the full knob set.
pub fn checkout<C: Collaborators>(options: Options, collaborators: &mut C) -> Result<Outcome, Error> {
    if options.ref_name.trim().is_empty() {
        return Err(Error::MissingRequiredParameter);
    }

    let (oid, bootstrapped) = resolve_ref(&options, collaborators)?;
    let fullref = collaborators
        .objects()
        .expand_ref(&options.gitdir, &options.ref_name)
        .map_err(Error::from_collaborator)?;

    if options.no_checkout {
        head::update(&options, &fullref, &oid, collaborators)?;
        return Ok(Outcome {
            plan: Vec::new(),
            oid,
            bootstrapped_tracking_branch: bootstrapped,
        });
    }

    let commit_tree = collaborators
        .objects()
        .commit_tree(&options.gitdir, &oid)
        .map_err(Error::CommitNotFetched)?;

    let matcher = pathspec::Matcher::new(&options.filepaths, options.pattern.as_ref().map(|p| p.as_bstr()));
    let stage = collaborators.index().snapshot();

    let plan = {
        let ctx = walk::Ctx {
            gitdir: &options.gitdir,
            workdir: &options.dir,
            objects: collaborators.objects(),
            fs: collaborators.fs(),
            matcher: &matcher,
        };
        let mut progress = WalkProgressAdapter {
            emitter: collaborators.progress(),
            prefix: &options.emitter_prefix,
            visited: 0,
        };
        walk::walk(&ctx, commit_tree, stage, &mut progress)?
    };

    aggregate::check(&plan)?;

    if options.dry_run {
        return Ok(Outcome {
            plan,
            oid,
            bootstrapped_tracking_branch: bootstrapped,
        });
    }

    apply::apply(&plan, &options, collaborators)?;
    head::update(&options, &fullref, &oid, collaborators)?;

    Ok(Outcome {
        plan,
        oid,
        bootstrapped_tracking_branch: bootstrapped,
    })
}

/// Resolves `options.ref_name`, falling back to the remote-tracking bootstrap
/// when it does not resolve locally.
fn resolve_ref<C: Collaborators>(options: &Options, collaborators: &mut C) -> Result<(ObjectId, bool), Error> {
    if let Some(oid) = collaborators
        .objects()
        .resolve_ref(&options.gitdir, &options.ref_name)
        .map_err(Error::from_collaborator)?
    {
        return Ok((oid, false));
    }

    let remote_ref = format!("{}/{}", options.remote, options.ref_name);
    let oid = collaborators
        .objects()
        .resolve_ref(&options.gitdir, &remote_ref)
        .map_err(Error::from_collaborator)?
        .ok_or_else(|| Error::CommitNotFetched(CollabError::RefNotFound(options.ref_name.clone())))?;

    let branch_remote_key = format!("branch.{}.remote", options.ref_name);
    let branch_merge_key = format!("branch.{}.merge", options.ref_name);
    let merge_value = format!("refs/heads/{}", options.ref_name);
    collaborators
        .config()
        .set(&options.gitdir, &branch_remote_key, &options.remote)
        .map_err(Error::from_collaborator)?;
    collaborators
        .config()
        .set(&options.gitdir, &branch_merge_key, &merge_value)
        .map_err(Error::from_collaborator)?;
    collaborators
        .refs()
        .write_ref(&options.gitdir, &merge_value, &oid)
        .map_err(Error::from_collaborator)?;

    Ok((oid, true))
}
