//! In-memory fakes of the five collaborator traits, used to drive [`gix_checkout::checkout()`]
//! end to end without a real object database or filesystem.
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use bstr::{BString, ByteSlice};
use gix_hash::ObjectId;
use gix_checkout::collaborators::{
    CollabError, Collaborators, ConfigStore, Emitter, Filesystem, IndexEntry, IndexMut, IndexStore, ObjectStore,
    RefStore, Stat, TreeEntry,
};
use gix_checkout::mode::Mode;

pub fn oid(byte: u8) -> ObjectId {
    ObjectId::from([byte; 20])
}

#[derive(Default)]
pub struct FakeObjects {
    pub refs: HashMap<String, ObjectId>,
    pub commit_trees: HashMap<ObjectId, ObjectId>,
    pub trees: HashMap<ObjectId, Vec<TreeEntry>>,
    pub blobs: HashMap<ObjectId, Vec<u8>>,
}

impl ObjectStore for FakeObjects {
    fn resolve_ref(&self, _gitdir: &Path, rev: &str) -> Result<Option<ObjectId>, CollabError> {
        Ok(self.refs.get(rev).copied())
    }

    fn expand_ref(&self, _gitdir: &Path, rev: &str) -> Result<String, CollabError> {
        Ok(if rev.starts_with("refs/") {
            rev.to_string()
        } else {
            format!("refs/heads/{rev}")
        })
    }

    fn commit_tree(&self, _gitdir: &Path, commit_id: &ObjectId) -> Result<ObjectId, CollabError> {
        self.commit_trees.get(commit_id).copied().ok_or(CollabError::ObjectNotFound(*commit_id))
    }

    fn read_tree(&self, _gitdir: &Path, tree_id: &ObjectId) -> Result<Vec<TreeEntry>, CollabError> {
        self.trees.get(tree_id).cloned().ok_or(CollabError::NotATree(*tree_id))
    }

    fn read_blob(&self, _gitdir: &Path, blob_id: &ObjectId) -> Result<Vec<u8>, CollabError> {
        self.blobs.get(blob_id).cloned().ok_or(CollabError::ObjectNotFound(*blob_id))
    }
}

#[derive(Default)]
pub struct FakeIndex {
    pub entries: Vec<IndexEntry>,
}

struct FakeIndexMut<'a>(&'a mut Vec<IndexEntry>);

impl IndexMut for FakeIndexMut<'_> {
    fn insert(&mut self, entry: IndexEntry) {
        self.0.retain(|e| e.path != entry.path);
        self.0.push(entry);
    }

    fn delete(&mut self, path: &bstr::BStr) {
        self.0.retain(|e| e.path.as_bstr() != path);
    }

    fn entries_under(&self, prefix: &bstr::BStr) -> Vec<IndexEntry> {
        self.0
            .iter()
            .filter(|e| prefix.is_empty() || e.path.starts_with(prefix.as_ref()))
            .cloned()
            .collect()
    }
}

impl IndexStore for FakeIndex {
    fn acquire(
        &mut self,
        _filepath: &Path,
        f: &mut dyn FnMut(&mut dyn IndexMut) -> Result<(), CollabError>,
    ) -> Result<(), CollabError> {
        f(&mut FakeIndexMut(&mut self.entries))
    }

    fn snapshot(&self) -> Vec<IndexEntry> {
        self.entries.clone()
    }
}

enum Node {
    File { bytes: Vec<u8>, executable: bool },
    Symlink { target: Vec<u8> },
    Dir,
}

#[derive(Default)]
pub struct FakeFs {
    nodes: Mutex<HashMap<PathBuf, Node>>,
}

impl FakeFs {
    pub fn with_file(self, path: impl Into<PathBuf>, bytes: &[u8], executable: bool) -> Self {
        self.nodes.lock().unwrap().insert(
            path.into(),
            Node::File {
                bytes: bytes.to_vec(),
                executable,
            },
        );
        self
    }

    pub fn with_dir(self, path: impl Into<PathBuf>) -> Self {
        self.nodes.lock().unwrap().insert(path.into(), Node::Dir);
        self
    }

    pub fn contains_file(&self, path: impl AsRef<Path>) -> bool {
        matches!(self.nodes.lock().unwrap().get(path.as_ref()), Some(Node::File { .. }))
    }

    pub fn read_file(&self, path: impl AsRef<Path>) -> Vec<u8> {
        match self.nodes.lock().unwrap().get(path.as_ref()) {
            Some(Node::File { bytes, .. }) => bytes.clone(),
            _ => panic!("{:?} is not a file in the fake filesystem", path.as_ref()),
        }
    }
}

impl Filesystem for FakeFs {
    fn read(&self, path: &Path) -> Result<Vec<u8>, CollabError> {
        match self.nodes.lock().unwrap().get(path) {
            Some(Node::File { bytes, .. }) => Ok(bytes.clone()),
            _ => Err(CollabError::Other(format!("{} is not a file", path.display()))),
        }
    }

    fn write(&self, path: &Path, bytes: &[u8], executable: bool) -> Result<(), CollabError> {
        self.nodes.lock().unwrap().insert(
            path.to_path_buf(),
            Node::File {
                bytes: bytes.to_vec(),
                executable,
            },
        );
        Ok(())
    }

    fn writelink(&self, path: &Path, target: &[u8]) -> Result<(), CollabError> {
        self.nodes
            .lock()
            .unwrap()
            .insert(path.to_path_buf(), Node::Symlink { target: target.to_vec() });
        Ok(())
    }

    fn rm(&self, path: &Path) -> Result<(), CollabError> {
        self.nodes.lock().unwrap().remove(path);
        Ok(())
    }

    fn mkdir(&self, path: &Path) -> Result<(), CollabError> {
        self.nodes.lock().unwrap().entry(path.to_path_buf()).or_insert(Node::Dir);
        Ok(())
    }

    fn rmdir(&self, path: &Path) -> Result<bool, CollabError> {
        let nodes = self.nodes.lock().unwrap();
        if nodes.keys().any(|p| p.parent() == Some(path)) {
            return Ok(false);
        }
        drop(nodes);
        self.nodes.lock().unwrap().remove(path);
        Ok(true)
    }

    fn lstat(&self, path: &Path) -> Result<Option<Stat>, CollabError> {
        Ok(self.nodes.lock().unwrap().get(path).map(|n| match n {
            Node::File { bytes, executable } => Stat {
                mode: if *executable { Mode::BlobExecutable } else { Mode::Blob },
                size: bytes.len() as u64,
                mtime_secs: 0,
            },
            Node::Symlink { target } => Stat {
                mode: Mode::Symlink,
                size: target.len() as u64,
                mtime_secs: 0,
            },
            Node::Dir => Stat {
                mode: Mode::Tree,
                size: 0,
                mtime_secs: 0,
            },
        }))
    }

    fn read_dir(&self, path: &Path) -> Result<Vec<(BString, Stat)>, CollabError> {
        let nodes = self.nodes.lock().unwrap();
        let mut out = Vec::new();
        for (child_path, node) in nodes.iter() {
            if child_path.parent() != Some(path) {
                continue;
            }
            let name = child_path.file_name().expect("child has a name").to_string_lossy();
            let stat = match node {
                Node::File { bytes, executable } => Stat {
                    mode: if *executable { Mode::BlobExecutable } else { Mode::Blob },
                    size: bytes.len() as u64,
                    mtime_secs: 0,
                },
                Node::Symlink { target } => Stat {
                    mode: Mode::Symlink,
                    size: target.len() as u64,
                    mtime_secs: 0,
                },
                Node::Dir => Stat {
                    mode: Mode::Tree,
                    size: 0,
                    mtime_secs: 0,
                },
            };
            out.push((BString::from(name.into_owned()), stat));
        }
        Ok(out)
    }
}

#[derive(Default)]
pub struct FakeConfig {
    pub values: HashMap<String, String>,
}

impl ConfigStore for FakeConfig {
    fn set(&mut self, _gitdir: &Path, key: &str, value: &str) -> Result<(), CollabError> {
        self.values.insert(key.to_string(), value.to_string());
        Ok(())
    }
}

pub enum Head {
    Symbolic(String),
    Detached(ObjectId),
}

#[derive(Default)]
pub struct FakeRefs {
    pub head: Option<Head>,
    pub refs: HashMap<String, ObjectId>,
}

impl RefStore for FakeRefs {
    fn write_head_symbolic(&mut self, _gitdir: &Path, fullref: &str) -> Result<(), CollabError> {
        self.head = Some(Head::Symbolic(fullref.to_string()));
        Ok(())
    }

    fn write_head_detached(&mut self, _gitdir: &Path, oid: &ObjectId) -> Result<(), CollabError> {
        self.head = Some(Head::Detached(*oid));
        Ok(())
    }

    fn write_ref(&mut self, _gitdir: &Path, fullref: &str, oid: &ObjectId) -> Result<(), CollabError> {
        self.refs.insert(fullref.to_string(), *oid);
        Ok(())
    }
}

#[derive(Default)]
pub struct FakeProgress {
    pub events: Mutex<Vec<(String, usize, Option<usize>)>>,
}

impl Emitter for FakeProgress {
    fn emit_progress(&self, _prefix: &str, phase: &str, loaded: usize, total: Option<usize>) {
        self.events.lock().unwrap().push((phase.to_string(), loaded, total));
    }
}

#[derive(Default)]
pub struct Fakes {
    pub objects: FakeObjects,
    pub index: FakeIndex,
    pub fs: FakeFs,
    pub config: FakeConfig,
    pub refs: FakeRefs,
    pub progress: FakeProgress,
}

impl Collaborators for Fakes {
    type Objects = FakeObjects;
    type Index = FakeIndex;
    type Fs = FakeFs;
    type Config = FakeConfig;
    type Refs = FakeRefs;
    type Progress = FakeProgress;

    fn objects(&self) -> &Self::Objects {
        &self.objects
    }

    fn index(&mut self) -> &mut Self::Index {
        &mut self.index
    }

    fn fs(&self) -> &Self::Fs {
        &self.fs
    }

    fn config(&mut self) -> &mut Self::Config {
        &mut self.config
    }

    fn refs(&mut self) -> &mut Self::Refs {
        &mut self.refs
    }

    fn progress(&self) -> &Self::Progress {
        &self.progress
    }
}
