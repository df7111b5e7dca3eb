//! The Applier: executes a vetted plan under the exclusive index
//! lock in four strictly sequential phases, fanning out within a phase where it's safe.
use std::path::Path;

use gix_features::parallel::{self, Reduce};

use crate::collaborators::{CollabError, Filesystem, IndexEntry, IndexStore, ObjectStore};
use crate::mode::Mode;
use crate::plan::Op;
use crate::{Error, Options};

const UPDATING_WORKDIR: &str = "Updating workdir";

/// Collects the first error seen across a fan-out, the way the teacher's pack-counting
/// reducers fold per-thread results back into one outcome.
struct CollectErrors<E> {
    first: Option<E>,
}

impl<E: Send> Reduce for CollectErrors<E> {
    type Input = Result<(), E>;
    type FeedProduce = ();
    type Output = ();
    type Error = E;

    fn feed(&mut self, item: Self::Input) -> Result<Self::FeedProduce, Self::Error> {
        if let Err(err) = item {
            if self.first.is_none() {
                self.first = Some(err);
            }
        }
        Ok(())
    }

    fn finalize(self) -> Result<Self::Output, Self::Error> {
        match self.first {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}

/// Bounded fan-out used for phases 1, 3 and 4, driven through `gix_features::parallel`
/// the same way the teacher's pack-counting fans objects out across a chunked iterator.
fn par_for_each<T, E>(items: &[T], f: impl Fn(&T) -> Result<(), E> + Send + Sync) -> Result<(), E>
where
    T: Sync,
    E: Send,
{
    if items.len() <= 1 {
        for item in items {
            f(item)?;
        }
        return Ok(());
    }
    let (chunk_size, thread_limit, _) = parallel::optimize_chunk_size_and_thread_limit(0, Some(items.len()), None, None);
    parallel::in_parallel(
        items.chunks(chunk_size.max(1)),
        thread_limit,
        |_thread_index| (),
        |chunk: &[T], _state: &mut ()| chunk.iter().try_for_each(&f),
        CollectErrors { first: None },
    )
}

/// Recursively empties and removes `dir` through the one-level-at-a-time [`Filesystem`]
/// primitives, since a tree-to-blob swap needs to clear a whole subtree at once.
fn remove_dir_recursive(fs: &dyn Filesystem, dir: &Path) -> Result<(), CollabError> {
    for (name, stat) in fs.read_dir(dir)? {
        let child = crate::paths::join(dir, name.as_bstr());
        if stat.mode == Mode::Tree {
            remove_dir_recursive(fs, &child)?;
        } else {
            fs.rm(&child)?;
        }
    }
    match fs.rmdir(dir)? {
        true => Ok(()),
        false => Err(CollabError::Other(format!("{} not empty after recursive delete", dir.display()))),
    }
}

fn emit(progress: &dyn crate::collaborators::Emitter, prefix: &str, loaded: usize, total: usize) {
    progress.emit_progress(prefix, UPDATING_WORKDIR, loaded, Some(total));
}

/// Runs the four phases of the applier against `plan`, which must already have
/// passed the Conflict / Error Aggregator.
pub fn apply<C: crate::collaborators::Collaborators>(
    plan: &[Op],
    options: &Options,
    collab: &mut C,
) -> Result<(), Error> {
    let total = plan.len();
    let mut loaded = 0usize;
    let index_path = options.gitdir.join("index");

    // Phase 1: deletions. `fs.rm`/recursive delete fan out; the matching index removal
    // is always serialized under the single lock acquisition this phase takes. The
    // deletion half of each tree<->blob swap also happens here, counted toward `loaded`
    // once its other half (mkdir or materialize) completes in a later phase.
    let delete_indexes: Vec<&Op> = plan
        .iter()
        .filter(|op| matches!(op, Op::Delete(_) | Op::DeleteIndex(_)))
        .collect();
    let blob_to_tree: Vec<&Op> = plan.iter().filter(|op| matches!(op, Op::UpdateBlobToTree(_))).collect();
    let dir_to_blob: Vec<&Op> = plan.iter().filter(|op| matches!(op, Op::UpdateDirToBlob { .. })).collect();
    {
        let fs = collab.fs();
        par_for_each(&delete_indexes, |op| -> Result<(), Error> {
            if let Op::Delete(path) = op {
                let full_path = crate::paths::full_path(&options.dir, path.as_bstr());
                fs.rm(&full_path).map_err(Error::from_collaborator)?;
            }
            Ok(())
        })?;
        par_for_each(&blob_to_tree, |op| -> Result<(), Error> {
            if let Op::UpdateBlobToTree(path) = op {
                let full_path = crate::paths::full_path(&options.dir, path.as_bstr());
                fs.rm(&full_path).map_err(Error::from_collaborator)?;
            }
            Ok(())
        })?;
        par_for_each(&dir_to_blob, |op| -> Result<(), Error> {
            if let Op::UpdateDirToBlob { path, .. } = op {
                let full_path = crate::paths::full_path(&options.dir, path.as_bstr());
                remove_dir_recursive(fs, &full_path).map_err(Error::from_collaborator)?;
            }
            Ok(())
        })?;
    }
    collab
        .index()
        .acquire(&index_path, &mut |index| {
            for op in &delete_indexes {
                let path = match op {
                    Op::Delete(p) | Op::DeleteIndex(p) => p,
                    _ => unreachable!(),
                };
                index.delete(path.as_bstr());
            }
            for op in &blob_to_tree {
                if let Op::UpdateBlobToTree(path) = op {
                    index.delete(path.as_bstr());
                }
            }
            for op in &dir_to_blob {
                if let Op::UpdateDirToBlob { path, .. } = op {
                    for nested in index.entries_under(path.as_bstr()) {
                        index.delete(nested.path.as_bstr());
                    }
                }
            }
            Ok(())
        })
        .map_err(Error::from_collaborator)?;
    loaded += delete_indexes.len();
    emit(collab.progress(), &options.emitter_prefix, loaded, total);

    // Phase 2: rmdirs, strictly sequential.
    for op in plan.iter().filter(|op| matches!(op, Op::Rmdir(_))) {
        let Op::Rmdir(path) = op else { unreachable!() };
        let full_path = crate::paths::full_path(&options.dir, path.as_bstr());
        match collab.fs().rmdir(&full_path) {
            Ok(true) => {}
            Ok(false) => tracing::warn!(path = %path, "directory not empty, leaving it in place"),
            Err(e) => return Err(Error::from_collaborator(e)),
        }
        loaded += 1;
        emit(collab.progress(), &options.emitter_prefix, loaded, total);
    }

    // Phase 3: mkdirs, including the directory half of a blob-to-tree swap, whose
    // blob was already removed in phase 1.
    let mkdirs: Vec<&Op> = plan.iter().filter(|op| matches!(op, Op::Mkdir(_))).collect();
    {
        let fs = collab.fs();
        par_for_each(&mkdirs, |op| -> Result<(), Error> {
            if let Op::Mkdir(path) = op {
                let full_path = crate::paths::full_path(&options.dir, path.as_bstr());
                fs.mkdir(&full_path).map_err(Error::from_collaborator)?;
            }
            Ok(())
        })?;
        par_for_each(&blob_to_tree, |op| -> Result<(), Error> {
            if let Op::UpdateBlobToTree(path) = op {
                let full_path = crate::paths::full_path(&options.dir, path.as_bstr());
                fs.mkdir(&full_path).map_err(Error::from_collaborator)?;
            }
            Ok(())
        })?;
    }
    loaded += mkdirs.len() + blob_to_tree.len();
    emit(collab.progress(), &options.emitter_prefix, loaded, total);

    // Phase 4: creates/updates, best-effort (a single unwritable file must not stop
    // the rest of a large checkout). Includes the blob half of a dir-to-blob swap,
    // whose directory was already cleared in phase 1.
    let writes: Vec<&Op> = plan
        .iter()
        .filter(|op| {
            matches!(
                op,
                Op::Create { .. } | Op::Update { .. } | Op::CreateIndex { .. } | Op::UpdateDirToBlob { .. }
            )
        })
        .collect();
    let entries: Vec<Option<IndexEntry>> = {
        let fs = collab.fs();
        let objects = collab.objects();
        writes
            .iter()
            .map(|op| match materialize(op, &options.dir, &options.gitdir, objects, fs) {
                Ok(entry) => Some(entry),
                Err(e) => {
                    tracing::warn!(op = ?op, error = %e, "checkout write failed, skipping");
                    None
                }
            })
            .collect()
    };
    collab
        .index()
        .acquire(&index_path, &mut |index| {
            for entry in entries.into_iter().flatten() {
                index.insert(entry);
            }
            Ok(())
        })
        .map_err(Error::from_collaborator)?;
    loaded += writes.len();
    emit(collab.progress(), &options.emitter_prefix, loaded, total);

    Ok(())
}

fn materialize(
    op: &Op,
    workdir: &Path,
    gitdir: &Path,
    objects: &dyn ObjectStore,
    fs: &dyn Filesystem,
) -> Result<IndexEntry, CollabError> {
    match op {
        Op::CreateIndex { path, oid, mode } => {
            let full_path = crate::paths::full_path(workdir, path.as_bstr());
            let stat = fs.lstat(&full_path)?.ok_or_else(|| CollabError::Other(format!("{path} vanished")))?;
            Ok(IndexEntry {
                path: path.clone(),
                mode: *mode,
                oid: *oid,
                stat: Some(normalize_stat(stat, *mode)),
            })
        }
        Op::Create { path, oid, mode } | Op::Update { path, oid, mode, chmod: _ } => {
            let full_path = crate::paths::full_path(workdir, path.as_bstr());
            if let Op::Update { chmod: true, .. } = op {
                // File modes are only ever set on create, so a mode change goes
                // through a fresh create rather than an in-place chmod.
                fs.rm(&full_path)?;
            }
            let bytes = objects.read_blob(gitdir, oid)?;
            write_by_mode(fs, &full_path, &bytes, *mode)?;
            let stat = fs.lstat(&full_path)?.ok_or_else(|| CollabError::Other(format!("{path} vanished")))?;
            Ok(IndexEntry {
                path: path.clone(),
                mode: *mode,
                oid: *oid,
                stat: Some(normalize_stat(stat, *mode)),
            })
        }
        // The directory this path used to be was already cleared out in phase 1;
        // this is otherwise an ordinary blob creation.
        Op::UpdateDirToBlob { path, oid, mode } => {
            let full_path = crate::paths::full_path(workdir, path.as_bstr());
            let bytes = objects.read_blob(gitdir, oid)?;
            write_by_mode(fs, &full_path, &bytes, *mode)?;
            let stat = fs.lstat(&full_path)?.ok_or_else(|| CollabError::Other(format!("{path} vanished")))?;
            Ok(IndexEntry {
                path: path.clone(),
                mode: *mode,
                oid: *oid,
                stat: Some(normalize_stat(stat, *mode)),
            })
        }
        _ => unreachable!("materialize is only called for write ops"),
    }
}

fn write_by_mode(fs: &dyn Filesystem, path: &Path, bytes: &[u8], mode: Mode) -> Result<(), CollabError> {
    match mode {
        Mode::Blob => fs.write(path, bytes, false),
        Mode::BlobExecutable => fs.write(path, bytes, true),
        Mode::Symlink => fs.writelink(path, bytes),
        other => Err(CollabError::Other(format!("invalid mode {other} in blob"))),
    }
}

/// The filesystem's executable bit is untrustworthy on case-insensitive platforms;
/// a mode we know to be `100755` always reports as such in the index.
fn normalize_stat(stat: crate::collaborators::Stat, mode: Mode) -> crate::collaborators::Stat {
    crate::collaborators::Stat {
        mode: if mode == Mode::BlobExecutable { Mode::BlobExecutable } else { stat.mode },
        ..stat
    }
}
