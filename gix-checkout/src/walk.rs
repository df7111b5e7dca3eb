//! The Tri-Walker: a synchronized pre-order walk over `COMMIT`,
//! `WORK` and `STAGE` that yields one [`Triple`] per distinct full path and folds
//! the [`crate::plan::Op`]s the [`crate::plan`] module derives from each.
use std::path::{Path, PathBuf};

use bstr::{BStr, BString, ByteSlice};
use gix_hash::ObjectId;

use crate::collaborators::{EntryKind, Filesystem, IndexEntry, ObjectStore};
use crate::mode::Mode;
use crate::pathspec::Matcher;
use crate::plan::{self, Op};
use crate::Error;

/// One source's view of a path: whether it exists there, and if so what it is.
/// `mode`/`oid` are populated eagerly for `COMMIT` and `STAGE` — both are cheap to
/// know the moment the entry is discovered (a tree listing or an index entry
/// already carries them). The single
/// expensive lazy step, content-hashing a working-tree file, is gated behind
/// [`Presence::populate_work_hash`] and only ever called by the planner when the
/// decision actually requires it.
#[derive(Debug, Clone, Default)]
pub struct Presence {
    pub exists: bool,
    pub kind: Option<EntryKind>,
    pub mode: Option<Mode>,
    pub oid: Option<ObjectId>,
}

impl Presence {
    fn absent() -> Self {
        Self::default()
    }

    pub fn from_tree_entry(mode: Mode, oid: ObjectId) -> Self {
        let kind = match mode {
            Mode::Tree => EntryKind::Tree,
            Mode::Commit => EntryKind::Commit,
            Mode::Blob | Mode::BlobExecutable | Mode::Symlink => EntryKind::Blob,
        };
        Presence {
            exists: true,
            kind: Some(kind),
            mode: Some(mode),
            oid: Some(oid),
        }
    }

    fn from_index_entry(entry: &IndexEntry) -> Self {
        Presence {
            exists: true,
            kind: Some(EntryKind::Blob),
            mode: Some(entry.mode),
            oid: Some(entry.oid),
        }
    }

    fn from_fs(mode: Mode) -> Self {
        Presence {
            exists: true,
            kind: Some(if mode == Mode::Tree { EntryKind::Tree } else { EntryKind::Blob }),
            mode: Some(mode),
            oid: None,
        }
    }

    /// True if this presence is a blob/symlink whose content git would hash. Tree
    /// entries never receive a hash.
    pub fn is_blob_like(&self) -> bool {
        matches!(self.kind, Some(EntryKind::Blob)) && !matches!(self.mode, Some(Mode::Tree))
    }

    /// Hash a working-tree file or symlink's content, memoizing the result.
    /// This is the one lazily-populated field this crate has: tree-typed workdir
    /// entries never receive a hash, only blobs do.
    pub fn populate_work_hash(&mut self, fs: &dyn Filesystem, full_path: &Path) -> Result<(), Error> {
        if self.oid.is_some() || !self.is_blob_like() {
            return Ok(());
        }
        let bytes = fs.read(full_path).map_err(Error::from_collaborator)?;
        self.oid = Some(hash_blob(&bytes));
        Ok(())
    }
}

/// Computes git's blob object id: a sha1 over `"blob <len>\0"` followed by the content.
pub fn hash_blob(content: &[u8]) -> ObjectId {
    use sha1::{Digest, Sha1};
    let mut hasher = Sha1::new();
    hasher.update(format!("blob {}\0", content.len()).as_bytes());
    hasher.update(content);
    let digest: [u8; 20] = hasher.finalize().into();
    ObjectId::from(digest)
}

/// The three presences sharing one full path.
#[derive(Debug, Clone)]
pub struct Triple {
    pub fullpath: BString,
    pub commit: Presence,
    pub work: Presence,
    pub stage: Presence,
}

/// Everything the walk needs from the outside world, gathered once per [`crate::checkout()`] call.
pub struct Ctx<'a> {
    pub gitdir: &'a Path,
    pub workdir: &'a Path,
    pub objects: &'a dyn ObjectStore,
    pub fs: &'a dyn Filesystem,
    pub matcher: &'a Matcher,
}

/// Counts visited entries for the `"Analyzing workdir"` progress phase.
pub trait WalkProgress {
    fn visited(&mut self);
}

/// Runs the Tri-Walker from the commit's root tree, returning the reduced, ordered
/// plan with the Plan Reducer already folded in.
pub fn walk(
    ctx: &Ctx<'_>,
    commit_tree: ObjectId,
    stage: Vec<IndexEntry>,
    progress: &mut dyn WalkProgress,
) -> Result<Vec<Op>, Error> {
    walk_dir(
        ctx,
        BStr::new(b""),
        Some(commit_tree),
        Some(ctx.workdir.to_path_buf()),
        &stage,
        progress,
    )
}

fn walk_dir(
    ctx: &Ctx<'_>,
    rel_dir: &BStr,
    commit_tree: Option<ObjectId>,
    work_dir: Option<PathBuf>,
    stage: &[IndexEntry],
    progress: &mut dyn WalkProgress,
) -> Result<Vec<Op>, Error> {
    let commit_children = match commit_tree {
        Some(id) => Some(ctx.objects.read_tree(ctx.gitdir, &id).map_err(Error::from_collaborator)?),
        None => None,
    };
    let work_children = match &work_dir {
        Some(path) => Some(ctx.fs.read_dir(path).map_err(Error::from_collaborator)?),
        None => None,
    };

    let mut names: std::collections::BTreeSet<BString> = Default::default();
    if let Some(entries) = &commit_children {
        names.extend(entries.iter().map(|e| e.name.clone()));
    }
    if let Some(entries) = &work_children {
        names.extend(entries.iter().map(|(name, _)| name.clone()));
    }
    for entry in stage {
        if let Some(rest) = relative_to(rel_dir, entry.path.as_bstr()) {
            let name = match rest.find_byte(b'/') {
                Some(i) => rest[..i].as_bstr(),
                None => rest,
            };
            names.insert(name.to_owned());
        }
    }

    let mut ops = Vec::new();
    for name in names {
        let fullpath = join_name(rel_dir, name.as_bstr());

        if !ctx.matcher.prefix_matches(fullpath.as_bstr()) {
            continue;
        }
        progress.visited();

        let commit = commit_children
            .as_ref()
            .and_then(|entries| entries.iter().find(|e| e.name == name))
            .map(|e| Presence::from_tree_entry(e.mode, e.oid))
            .unwrap_or_else(Presence::absent);

        let work = work_children
            .as_ref()
            .and_then(|entries| entries.iter().find(|(n, _)| n == &name))
            .map(|(_, stat)| Presence::from_fs(stat.mode))
            .unwrap_or_else(Presence::absent);

        let nested_stage: Vec<IndexEntry> = stage
            .iter()
            .filter(|e| relative_to(fullpath.as_bstr(), e.path.as_bstr()).is_some())
            .cloned()
            .collect();

        // The index is flat, but a path with staged entries nested below it and no
        // entry of its own behaves exactly like a tree for planning purposes (it must
        // be recursed into and, if nothing else wants it, `rmdir`-ed once empty).
        let stage_entry = stage.iter().find(|e| e.path.as_bstr() == fullpath.as_bstr());
        let stage_presence = match stage_entry {
            Some(entry) => Presence::from_index_entry(entry),
            None if !nested_stage.is_empty() => Presence {
                exists: true,
                kind: Some(EntryKind::Tree),
                mode: Some(Mode::Tree),
                oid: None,
            },
            None => Presence::absent(),
        };

        let mut triple = Triple {
            fullpath: fullpath.clone(),
            commit,
            work,
            stage: stage_presence,
        };
        let op = plan::plan_entry(&mut triple, ctx)?;

        let any_tree = triple.commit.kind == Some(EntryKind::Tree)
            || triple.work.kind == Some(EntryKind::Tree)
            || triple.stage.kind == Some(EntryKind::Tree);

        match op {
            Some(Op::Mkdir(_)) | Some(Op::Rmdir(_)) | None if any_tree => {
                let child_commit_tree = match triple.commit.kind {
                    Some(EntryKind::Tree) => triple.commit.oid,
                    _ => None,
                };
                let child_work_dir = match triple.work.kind {
                    Some(EntryKind::Tree) => Some(crate::paths::full_path(ctx.workdir, fullpath.as_bstr())),
                    _ => None,
                };
                let children =
                    walk_dir(ctx, fullpath.as_bstr(), child_commit_tree, child_work_dir, &nested_stage, progress)?;
                ops.extend(plan::reduce(op, children));
            }
            Some(op) => {
                if ctx.matcher.tail_matches(fullpath.as_bstr()) {
                    ops.push(op);
                }
            }
            None => {}
        }
    }

    Ok(ops)
}

fn join_name(dir: &BStr, name: &BStr) -> BString {
    if dir.is_empty() {
        name.to_owned()
    } else {
        let mut p = dir.to_owned();
        p.push(b'/');
        p.extend_from_slice(name);
        p
    }
}

/// `entry_path` relative to `dir`, or `None` if `entry_path` is not `dir` or a descendant of it.
/// `dir == ""` (the root) matches everything.
fn relative_to<'a>(dir: &BStr, entry_path: &'a BStr) -> Option<&'a BStr> {
    if dir.is_empty() {
        return Some(entry_path);
    }
    if entry_path.len() > dir.len() && entry_path.starts_with(dir.as_ref()) && entry_path[dir.len()] == b'/' {
        Some(entry_path[dir.len() + 1..].as_bstr())
    } else {
        None
    }
}
