//! The seams through which this crate reaches the object store, the index, the
//! filesystem, the config store and the progress emitter. We treat all
//! five as external collaborators, expressing that boundary as traits so the planner
//! and applier can be driven against fakes in tests and against the real `gix-odb`,
//! `gix-index`, `gix-fs`, `gix-ref`/`gix-config` stack in production.
use std::path::Path;

use bstr::BString;
use gix_hash::ObjectId;

use crate::mode::Mode;

/// What kind of object or worktree entity a [`crate::walk::Presence`] refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryKind {
    /// A directory, or a tree object.
    Tree,
    /// A file, or a blob object.
    Blob,
    /// A gitlink, i.e. a submodule commit reference.
    Commit,
    /// Anything else the filesystem can produce (device nodes, fifos, sockets, ...).
    Special,
}

/// A single named child of a tree object, as produced by [`ObjectStore::read_tree`].
#[derive(Debug, Clone)]
pub struct TreeEntry {
    pub name: BString,
    pub mode: Mode,
    pub oid: ObjectId,
}

/// The subset of `lstat` information the planner and applier need.
#[derive(Debug, Clone, Copy)]
pub struct Stat {
    pub mode: Mode,
    pub size: u64,
    pub mtime_secs: i64,
}

/// A collaborator-side failure, always re-tagged by the caller into [`crate::Error`].
#[derive(Debug, thiserror::Error)]
pub enum CollabError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("object {0} could not be read from the store")]
    ObjectNotFound(ObjectId),
    #[error("{0} does not resolve to an object")]
    RefNotFound(String),
    #[error("object {0} was not a tree")]
    NotATree(ObjectId),
    #[error("{0}")]
    Other(String),
}

/// Resolves references and reads objects. Backed by `gix-ref` + `gix-odb` in production.
pub trait ObjectStore: Send + Sync {
    /// Resolve `rev` (a branch name, tag, or commit-ish) to an object id, the way
    /// `gix-revision`'s rev-parse does, without following it to a commit's tree yet.
    fn resolve_ref(&self, gitdir: &Path, rev: &str) -> Result<Option<ObjectId>, CollabError>;

    /// Expand a short name like `main` to its full form, e.g. `refs/heads/main`.
    fn expand_ref(&self, gitdir: &Path, rev: &str) -> Result<String, CollabError>;

    /// Peel a commit (or tag) object id down to the tree it references.
    fn commit_tree(&self, gitdir: &Path, commit_id: &ObjectId) -> Result<ObjectId, CollabError>;

    /// List the direct children of a tree object, already sorted the way git stores them.
    fn read_tree(&self, gitdir: &Path, tree_id: &ObjectId) -> Result<Vec<TreeEntry>, CollabError>;

    /// Read a blob's full content.
    fn read_blob(&self, gitdir: &Path, blob_id: &ObjectId) -> Result<Vec<u8>, CollabError>;
}

/// A single index entry as inserted or looked up by [`IndexMut`].
#[derive(Debug, Clone)]
pub struct IndexEntry {
    pub path: BString,
    pub mode: Mode,
    pub oid: ObjectId,
    pub stat: Option<Stat>,
}

/// Mutations against the in-memory index; only reachable while the exclusive lock
/// obtained through [`IndexStore::acquire`] is held.
pub trait IndexMut {
    fn insert(&mut self, entry: IndexEntry);
    fn delete(&mut self, path: &bstr::BStr);
    /// All entries currently staged under `prefix` (or the whole index if `prefix` is empty),
    /// used by the Tri-Walker to enumerate the `STAGE` side of the traversal.
    fn entries_under(&self, prefix: &bstr::BStr) -> Vec<IndexEntry>;
}

/// Takes the named exclusive lock around a closure that mutates the index. The
/// applier acquires it twice: once around the deletion phase, once around the
/// create/update phase.
pub trait IndexStore {
    fn acquire(
        &mut self,
        filepath: &Path,
        f: &mut dyn FnMut(&mut dyn IndexMut) -> Result<(), CollabError>,
    ) -> Result<(), CollabError>;

    /// A read-only copy of the current stage, used to build the `STAGE` side of the
    /// Tri-Walker. Reading the index never requires the exclusive lock; only
    /// `insert`/`delete` do.
    fn snapshot(&self) -> Vec<IndexEntry>;
}

/// Filesystem primitives, backed by `gix-fs` and `std::fs` in production.
pub trait Filesystem: Send + Sync {
    fn read(&self, path: &Path) -> Result<Vec<u8>, CollabError>;
    fn write(&self, path: &Path, bytes: &[u8], executable: bool) -> Result<(), CollabError>;
    fn writelink(&self, path: &Path, target: &[u8]) -> Result<(), CollabError>;
    fn rm(&self, path: &Path) -> Result<(), CollabError>;
    fn mkdir(&self, path: &Path) -> Result<(), CollabError>;
    /// Returns `Ok(false)` specifically for a non-empty directory so callers can
    /// distinguish it (logged and skipped) from a hard failure.
    fn rmdir(&self, path: &Path) -> Result<bool, CollabError>;
    fn lstat(&self, path: &Path) -> Result<Option<Stat>, CollabError>;
    /// Lists the direct children of a working-tree directory for the Tri-Walker's `WORK`
    /// side. Implementations are responsible for excluding the `.git` entry and anything
    /// the repository's ignore rules exclude — the planner never sees either.
    fn read_dir(&self, path: &Path) -> Result<Vec<(BString, Stat)>, CollabError>;
}

/// Sets a single dotted configuration key, e.g. `branch.feature.remote`.
pub trait ConfigStore {
    fn set(&mut self, gitdir: &Path, key: &str, value: &str) -> Result<(), CollabError>;
}

/// Fires progress events, all under a single `"progress"` event kind.
/// Takes `&self` rather than `&mut self`: phase 1/3/4 of the applier emit from several
/// threads at once, and the walk needs to emit while the object store and filesystem
/// are also borrowed, so implementations hold any mutable state (a counter, a channel
/// sender) behind interior mutability, the way `gix_features::progress::Progress` does.
pub trait Emitter: Send + Sync {
    fn emit_progress(&self, prefix: &str, phase: &str, loaded: usize, total: Option<usize>);
}

/// Writes `HEAD` and the ref a branch checkout points at.
pub trait RefStore {
    fn write_head_symbolic(&mut self, gitdir: &Path, fullref: &str) -> Result<(), CollabError>;
    fn write_head_detached(&mut self, gitdir: &Path, oid: &ObjectId) -> Result<(), CollabError>;
    fn write_ref(&mut self, gitdir: &Path, fullref: &str, oid: &ObjectId) -> Result<(), CollabError>;
}

/// The full set of collaborators a [`crate::checkout()`] call needs, bundled so the
/// public entry point takes one generic parameter instead of five.
pub trait Collaborators {
    type Objects: ObjectStore;
    type Index: IndexStore;
    type Fs: Filesystem;
    type Config: ConfigStore;
    type Refs: RefStore;
    type Progress: Emitter;

    fn objects(&self) -> &Self::Objects;
    fn index(&mut self) -> &mut Self::Index;
    fn fs(&self) -> &Self::Fs;
    fn config(&mut self) -> &mut Self::Config;
    fn refs(&mut self) -> &mut Self::Refs;
    fn progress(&self) -> &Self::Progress;
}
