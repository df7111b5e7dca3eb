//! The Path Matcher: interprets `filepaths[]` as a prefix filter and
//! an optional glob `pattern` rooted at its longest literal leading directory.
use bstr::{BStr, BString, ByteSlice};
use regex::bytes::Regex;

/// Characters that make a glob segment non-literal.
const WILDCARD_META: &[u8] = b"*?[{";

/// Computes `patternRoot`, `bases[]` and the compiled `patternTail` regex once per
/// checkout call, then answers `prefixMatches`/`tailMatches` for every candidate path
/// the Tri-Walker visits.
#[derive(Debug, Clone)]
pub struct Matcher {
    bases: Vec<BString>,
    tail: Option<Regex>,
}

impl Matcher {
    /// `filepaths` defaults to `["."]` if empty.
    pub fn new(filepaths: &[BString], pattern: Option<&BStr>) -> Self {
        let filepaths: Vec<BString> = if filepaths.is_empty() {
            vec![BString::from(".")]
        } else {
            filepaths.to_vec()
        };

        let pattern_root = pattern.map(literal_root).unwrap_or_default();
        let bases: Vec<BString> = filepaths
            .iter()
            .map(|fp| join(fp, &pattern_root))
            .collect();

        let tail = pattern.map(|pattern| {
            let tail = strip_root(pattern, &pattern_root);
            let regex_src = glob_to_regex(tail);
            Regex::new(&regex_src).expect("glob_to_regex always produces a valid regex")
        });

        Matcher { bases, tail }
    }

    /// True if `fullpath` is equal to, or a descendant of, any base. Used to prune
    /// subtrees the Tri-Walker need not descend into.
    pub fn prefix_matches(&self, fullpath: &BStr) -> bool {
        self.bases.iter().any(|base| is_equal_or_descendant(base, fullpath))
    }

    /// True if, for some base, the pattern tail matches `fullpath` with that base's
    /// prefix stripped. Vacuously true when no `pattern` was given.
    pub fn tail_matches(&self, fullpath: &BStr) -> bool {
        let Some(tail) = &self.tail else { return true };
        self.bases.iter().any(|base| {
            strip_base(base, fullpath)
                .map(|rest| tail.is_match(rest.as_bytes()))
                .unwrap_or(false)
        })
    }
}

fn is_equal_or_descendant(base: &BStr, fullpath: &BStr) -> bool {
    if base.as_ref() == b"." {
        return true;
    }
    if fullpath == base {
        return true;
    }
    fullpath.len() > base.len() && fullpath.starts_with(base.as_ref()) && fullpath[base.len()] == b'/'
}

fn strip_base<'a>(base: &BStr, fullpath: &'a BStr) -> Option<&'a BStr> {
    if base.as_ref() == b"." {
        return Some(fullpath);
    }
    if fullpath == base {
        return Some(BStr::new(b""));
    }
    if fullpath.len() > base.len() && fullpath.starts_with(base.as_ref()) && fullpath[base.len()] == b'/' {
        Some(fullpath[base.len() + 1..].as_bstr())
    } else {
        None
    }
}

fn join(filepath: &BStr, root: &BStr) -> BString {
    if root.is_empty() {
        filepath.to_owned()
    } else if filepath.as_ref() == b"." {
        root.to_owned()
    } else {
        let mut out = filepath.to_owned();
        out.push(b'/');
        out.extend_from_slice(root);
        out
    }
}

/// The longest leading directory prefix of `pattern` containing no wildcard
/// metacharacter, `""` if `pattern` begins with one.
fn literal_root(pattern: &BStr) -> BString {
    let mut last_slash = None;
    for (i, b) in pattern.iter().enumerate() {
        if WILDCARD_META.contains(b) {
            break;
        }
        if *b == b'/' {
            last_slash = Some(i);
        }
    }
    match last_slash {
        Some(i) => pattern[..i].as_bstr().to_owned(),
        None => BString::from(""),
    }
}

fn strip_root<'a>(pattern: &'a BStr, root: &BStr) -> &'a BStr {
    if root.is_empty() {
        return pattern;
    }
    let prefix_len = root.len() + 1; // root + '/'
    pattern[prefix_len.min(pattern.len())..].as_bstr()
}

/// Translates a shell-style glob into an anchored byte regex: `**` crosses directory
/// boundaries, `*` and `?` stay within one path segment, `{a,b}` is alternation.
fn glob_to_regex(glob: &BStr) -> String {
    let mut out = String::from("(?s)^");
    let bytes = glob.as_bytes();
    let mut i = 0;
    while i < bytes.len() {
        match bytes[i] {
            b'*' if bytes.get(i + 1) == Some(&b'*') => {
                out.push_str(".*");
                i += 2;
                if bytes.get(i) == Some(&b'/') {
                    i += 1;
                }
            }
            b'*' => {
                out.push_str("[^/]*");
                i += 1;
            }
            b'?' => {
                out.push_str("[^/]");
                i += 1;
            }
            b'{' => {
                let end = bytes[i..].iter().position(|&b| b == b'}').map(|p| p + i);
                if let Some(end) = end {
                    out.push_str("(?:");
                    let alts = std::str::from_utf8(&bytes[i + 1..end]).unwrap_or_default();
                    out.push_str(&alts.split(',').map(regex::escape).collect::<Vec<_>>().join("|"));
                    out.push(')');
                    i = end + 1;
                } else {
                    out.push_str(&regex::escape("{"));
                    i += 1;
                }
            }
            other => {
                out.push_str(&regex::escape(&(other as char).to_string()));
                i += 1;
            }
        }
    }
    out.push('$');
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bs(s: &str) -> BString {
        BString::from(s)
    }

    #[test]
    fn default_filepaths_matches_everything() {
        let m = Matcher::new(&[], None);
        assert!(m.prefix_matches(BStr::new(b"a/b/c")));
        assert!(m.tail_matches(BStr::new(b"a/b/c")));
    }

    #[test]
    fn prefix_gate_prunes_unrelated_subtrees() {
        let m = Matcher::new(&[bs("src")], None);
        assert!(m.prefix_matches(BStr::new(b"src")));
        assert!(m.prefix_matches(BStr::new(b"src/lib.rs")));
        assert!(!m.prefix_matches(BStr::new(b"docs/readme.md")));
    }

    #[test]
    fn glob_tail_matches_brace_alternation_and_globstar() {
        let m = Matcher::new(&[bs(".")], Some(BStr::new(b"**/*.{json,md}")));
        assert!(m.tail_matches(BStr::new(b"a.json")));
        assert!(m.tail_matches(BStr::new(b"a.md")));
        assert!(!m.tail_matches(BStr::new(b"a.txt")));
        assert!(m.tail_matches(BStr::new(b"nested/dir/a.json")));
    }

    #[test]
    fn literal_pattern_root_becomes_a_base() {
        let m = Matcher::new(&[bs(".")], Some(BStr::new(b"sub/dir/*.rs")));
        assert!(m.prefix_matches(BStr::new(b"sub")));
        assert!(m.prefix_matches(BStr::new(b"sub/dir")));
        assert!(!m.prefix_matches(BStr::new(b"other")));
        assert!(m.tail_matches(BStr::new(b"sub/dir/a.rs")));
        assert!(!m.tail_matches(BStr::new(b"sub/dir/txt.md")));
    }
}
