//! Converts a `/`-separated, worktree-relative [`BStr`] path into a native [`PathBuf`].
//! Split along the same unix/windows line the rest of the `gix` ecosystem uses for
//! byte-path conversions.
use std::path::PathBuf;

use bstr::{BStr, ByteSlice};

/// Joins `root` with `rela_path` (a `/`-separated path relative to the worktree root),
/// translating separators on windows.
pub fn full_path(root: &std::path::Path, rela_path: &BStr) -> PathBuf {
    root.join(to_native(rela_path))
}

/// Joins `dir` with a single path component `name` (no separators of its own, as
/// produced by [`crate::collaborators::Filesystem::read_dir`]).
pub fn join(dir: &std::path::Path, name: &BStr) -> PathBuf {
    dir.join(to_native(name))
}

fn to_native(rela_path: &BStr) -> PathBuf {
    #[cfg(unix)]
    {
        use std::os::unix::ffi::OsStrExt;
        PathBuf::from(std::ffi::OsStr::from_bytes(rela_path.as_bytes()))
    }
    #[cfg(not(unix))]
    {
        let as_str = rela_path.to_str().expect("worktree paths are valid UTF-8 on windows");
        PathBuf::from(as_str.replace('/', std::path::MAIN_SEPARATOR_STR))
    }
}
