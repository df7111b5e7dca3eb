//! The Planner and Plan Reducer: classifies one
//! [`crate::walk::Triple`] by its 3-bit presence key and folds a subtree's ops
//! together with its parent's.
use bstr::BString;
use gix_hash::ObjectId;

use crate::collaborators::EntryKind;
use crate::mode::Mode;
use crate::walk::{Ctx, Triple};
use crate::Error;

/// One step of the checkout plan. Ops are immutable once emitted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Op {
    Mkdir(BString),
    Rmdir(BString),
    Create { path: BString, oid: ObjectId, mode: Mode },
    CreateIndex { path: BString, oid: ObjectId, mode: Mode },
    Update { path: BString, oid: ObjectId, mode: Mode, chmod: bool },
    Delete(BString),
    DeleteIndex(BString),
    UpdateDirToBlob { path: BString, oid: ObjectId, mode: Mode },
    UpdateBlobToTree(BString),
    Conflict(BString),
    Error(String),
}

impl Op {
    pub fn path(&self) -> Option<&bstr::BStr> {
        use bstr::ByteSlice;
        Some(
            match self {
                Op::Mkdir(p)
                | Op::Rmdir(p)
                | Op::Create { path: p, .. }
                | Op::CreateIndex { path: p, .. }
                | Op::Update { path: p, .. }
                | Op::Delete(p)
                | Op::DeleteIndex(p)
                | Op::UpdateDirToBlob { path: p, .. }
                | Op::UpdateBlobToTree(p)
                | Op::Conflict(p) => p,
                Op::Error(_) => return None,
            }
            .as_bstr(),
        )
    }
}

/// Classifies one triple by the 3-bit `stage.exists | commit.exists | work.exists` key
/// and emits the op its decision table names, lazily hashing
/// working-tree content only where a branch actually requires it.
pub fn plan_entry(t: &mut Triple, ctx: &Ctx<'_>) -> Result<Option<Op>, Error> {
    let key = (t.stage.exists, t.commit.exists, t.work.exists);
    match key {
        (false, false, false) => Ok(None), // unreachable by construction
        (false, false, true) => Ok(None),  // untracked workdir file: leave alone
        (false, true, false) => plan_new_in_commit_only(t),
        (false, true, true) => plan_new_in_commit_and_workdir(t, ctx),
        (true, false, false) => Ok(Some(Op::DeleteIndex(t.fullpath.clone()))),
        (true, false, true) => plan_removed_in_commit(t, ctx),
        (true, true, false) | (true, true, true) => plan_modified(t, ctx),
    }
}

/// Key `010`: new in the target commit only.
fn plan_new_in_commit_only(t: &Triple) -> Result<Option<Op>, Error> {
    match t.commit.kind {
        Some(EntryKind::Tree) => Ok(Some(Op::Mkdir(t.fullpath.clone()))),
        Some(EntryKind::Blob) => Ok(Some(Op::Create {
            path: t.fullpath.clone(),
            oid: t.commit.oid.expect("blob presence always carries an oid"),
            mode: t.commit.mode.expect("blob presence always carries a mode"),
        })),
        Some(EntryKind::Commit) => {
            tracing::debug!(path = %t.fullpath, "submodule checkout is not supported, skipping");
            Ok(None)
        }
        Some(EntryKind::Special) | None => Ok(Some(Op::Error(format!(
            "{}: commit entry has an unsupported type",
            t.fullpath
        )))),
    }
}

/// Key `011`: new in the target commit, already present untracked in the work tree.
fn plan_new_in_commit_and_workdir(t: &mut Triple, ctx: &Ctx<'_>) -> Result<Option<Op>, Error> {
    match (t.commit.kind, t.work.kind) {
        (Some(EntryKind::Tree), Some(EntryKind::Tree)) => Ok(None),
        (Some(EntryKind::Tree), Some(EntryKind::Blob)) | (Some(EntryKind::Blob), Some(EntryKind::Tree)) => {
            Ok(Some(Op::Conflict(t.fullpath.clone())))
        }
        (Some(EntryKind::Blob), Some(EntryKind::Blob)) => {
            let full_path = crate::paths::full_path(ctx.workdir, t.fullpath.as_bstr());
            t.work.populate_work_hash(ctx.fs, &full_path)?;
            let commit_oid = t.commit.oid.expect("blob presence always carries an oid");
            let commit_mode = t.commit.mode.expect("blob presence always carries a mode");
            if Some(commit_oid) != t.work.oid {
                Ok(Some(Op::Conflict(t.fullpath.clone())))
            } else if Some(commit_mode) != t.work.mode {
                Ok(Some(Op::Conflict(t.fullpath.clone())))
            } else {
                Ok(Some(Op::CreateIndex {
                    path: t.fullpath.clone(),
                    oid: commit_oid,
                    mode: commit_mode,
                }))
            }
        }
        (Some(EntryKind::Commit), Some(EntryKind::Tree)) => {
            tracing::debug!(path = %t.fullpath, "submodule checkout is not supported, skipping");
            Ok(None)
        }
        (Some(EntryKind::Commit), Some(EntryKind::Blob)) => Ok(Some(Op::Conflict(t.fullpath.clone()))),
        _ => Ok(Some(Op::Error(format!(
            "{}: unsupported commit/workdir type combination",
            t.fullpath
        )))),
    }
}

/// Key `101`: staged and on disk, but removed from the target commit.
fn plan_removed_in_commit(t: &mut Triple, ctx: &Ctx<'_>) -> Result<Option<Op>, Error> {
    match t.stage.kind {
        Some(EntryKind::Tree) => Ok(Some(Op::Rmdir(t.fullpath.clone()))),
        Some(EntryKind::Blob) => {
            let full_path = crate::paths::full_path(ctx.workdir, t.fullpath.as_bstr());
            t.work.populate_work_hash(ctx.fs, &full_path)?;
            let stage_oid = t.stage.oid.expect("blob presence always carries an oid");
            if Some(stage_oid) != t.work.oid {
                // Local edits would be lost by removing the file; refuse rather than discard them.
                Ok(Some(Op::Conflict(t.fullpath.clone())))
            } else {
                Ok(Some(Op::Delete(t.fullpath.clone())))
            }
        }
        _ => Ok(Some(Op::Error(format!("{}: unsupported stage entry type", t.fullpath)))),
    }
}

/// Keys `110` and `111`: present in both the stage and the target commit.
fn plan_modified(t: &mut Triple, ctx: &Ctx<'_>) -> Result<Option<Op>, Error> {
    match (t.stage.kind, t.commit.kind) {
        (Some(EntryKind::Tree), Some(EntryKind::Tree)) => Ok(None),
        (Some(EntryKind::Blob), Some(EntryKind::Blob)) => {
            if t.work.exists {
                let full_path = crate::paths::full_path(ctx.workdir, t.fullpath.as_bstr());
                t.work.populate_work_hash(ctx.fs, &full_path)?;
                let stage_oid = t.stage.oid;
                let commit_oid = t.commit.oid;
                if t.work.oid != stage_oid && t.work.oid != commit_oid {
                    // Broader than canonical git (which only compares against the stage):
                    // a workdir that already matches the incoming commit is tolerated.
                    return Ok(Some(Op::Conflict(t.fullpath.clone())));
                }
            }
            let commit_oid = t.commit.oid.expect("blob presence always carries an oid");
            let commit_mode = t.commit.mode.expect("blob presence always carries a mode");
            let stage_mode = t.stage.mode.expect("blob presence always carries a mode");
            if commit_mode != stage_mode {
                Ok(Some(Op::Update {
                    path: t.fullpath.clone(),
                    oid: commit_oid,
                    mode: commit_mode,
                    chmod: true,
                }))
            } else {
                let stage_oid = t.stage.oid.expect("blob presence always carries an oid");
                if commit_oid != stage_oid {
                    Ok(Some(Op::Update {
                        path: t.fullpath.clone(),
                        oid: commit_oid,
                        mode: commit_mode,
                        chmod: false,
                    }))
                } else {
                    Ok(None)
                }
            }
        }
        (Some(EntryKind::Tree), Some(EntryKind::Blob)) => Ok(Some(Op::UpdateDirToBlob {
            path: t.fullpath.clone(),
            oid: t.commit.oid.expect("blob presence always carries an oid"),
            mode: t.commit.mode.expect("blob presence always carries a mode"),
        })),
        (Some(EntryKind::Blob), Some(EntryKind::Tree)) => Ok(Some(Op::UpdateBlobToTree(t.fullpath.clone()))),
        _ => Ok(Some(Op::Error(format!("{}: unsupported stage/commit type combination", t.fullpath)))),
    }
}

/// Folds a subtree's ops into its parent's: `rmdir` bubbles after
/// its children so deletions happen before the directory that held them disappears;
/// every other parent op is prepended so directories exist before their contents.
pub fn reduce(parent: Option<Op>, mut children: Vec<Op>) -> Vec<Op> {
    match parent {
        None => children,
        Some(op @ Op::Rmdir(_)) => {
            children.push(op);
            children
        }
        Some(op) => {
            let mut out = Vec::with_capacity(children.len() + 1);
            out.push(op);
            out.append(&mut children);
            out
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn leaf_path(name: &str) -> BString {
        BString::from(name)
    }

    #[test]
    fn reducer_prepends_mkdir_and_appends_rmdir() {
        let children = vec![Op::Create {
            path: leaf_path("d/a"),
            oid: ObjectId::null(gix_hash::Kind::Sha1),
            mode: Mode::Blob,
        }];
        let reduced = reduce(Some(Op::Mkdir(leaf_path("d"))), children.clone());
        assert_eq!(reduced[0], Op::Mkdir(leaf_path("d")));
        assert_eq!(reduced[1], children[0].clone());

        let reduced = reduce(Some(Op::Rmdir(leaf_path("d"))), children.clone());
        assert_eq!(reduced[0], children[0].clone());
        assert_eq!(reduced[1], Op::Rmdir(leaf_path("d")));
    }

    #[test]
    fn reducer_passes_children_through_when_parent_is_noop() {
        let children = vec![Op::Delete(leaf_path("d/a"))];
        let reduced = reduce(None, children.clone());
        assert_eq!(reduced, children);
    }
}
