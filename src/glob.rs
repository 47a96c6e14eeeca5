//! Shell-style glob matching and expansion.
//!
//! Template fields (`archs`), destdir expansion (`take`) and the `find`
//! helper all speak the classic fnmatch dialect: `*`, `?`, `[abc]`,
//! `[a-z]`, `[!abc]`. Matching is case-sensitive. During path expansion
//! patterns are applied per component, so `*` never crosses a `/`.

use std::fs;
use std::path::{Path, PathBuf};

use walkdir::WalkDir;

/// Match a single name against an fnmatch-style pattern.
pub fn glob_match(pattern: &str, text: &str) -> bool {
    let pat: Vec<char> = pattern.chars().collect();
    let txt: Vec<char> = text.chars().collect();

    let mut p = 0usize;
    let mut t = 0usize;
    // last '*' position for backtracking
    let mut star_p = usize::MAX;
    let mut star_t = 0usize;

    while t < txt.len() {
        if p < pat.len() {
            match pat[p] {
                '*' => {
                    star_p = p;
                    star_t = t;
                    p += 1;
                    continue;
                }
                '?' => {
                    p += 1;
                    t += 1;
                    continue;
                }
                '[' => match match_class(&pat, p, txt[t]) {
                    Some((true, next)) => {
                        p = next;
                        t += 1;
                        continue;
                    }
                    Some((false, _)) => {}
                    None => {
                        // unterminated class, treat '[' as a literal
                        if txt[t] == '[' {
                            p += 1;
                            t += 1;
                            continue;
                        }
                    }
                },
                c => {
                    if c == txt[t] {
                        p += 1;
                        t += 1;
                        continue;
                    }
                }
            }
        }
        if star_p != usize::MAX {
            star_t += 1;
            t = star_t;
            p = star_p + 1;
        } else {
            return false;
        }
    }

    while p < pat.len() && pat[p] == '*' {
        p += 1;
    }
    p == pat.len()
}

/// Evaluate a `[...]` class starting at `start` (the index of `[`).
///
/// Returns whether `c` is in the class and the index just past the closing
/// `]`, or `None` when the class never terminates.
fn match_class(pat: &[char], start: usize, c: char) -> Option<(bool, usize)> {
    let mut i = start + 1;
    let negated = if i < pat.len() && pat[i] == '!' {
        i += 1;
        true
    } else {
        false
    };

    let mut matched = false;
    let mut first = true;
    while i < pat.len() {
        if pat[i] == ']' && !first {
            return Some((matched != negated, i + 1));
        }
        first = false;
        if i + 2 < pat.len() && pat[i + 1] == '-' && pat[i + 2] != ']' {
            if pat[i] <= c && c <= pat[i + 2] {
                matched = true;
            }
            i += 3;
        } else {
            if pat[i] == c {
                matched = true;
            }
            i += 1;
        }
    }
    None
}

fn has_magic(component: &str) -> bool {
    component.contains(['*', '?', '['])
}

/// Expand a relative glob pattern against a root directory.
///
/// Returns the matching paths relative to `root`, sorted. Pattern
/// components without metacharacters are probed directly so that names
/// containing no wildcard still match dangling symlinks and hidden files.
pub fn expand(root: &Path, pattern: &str) -> Vec<PathBuf> {
    let mut matches = vec![PathBuf::new()];

    for component in pattern.split('/').filter(|c| !c.is_empty()) {
        let mut next = Vec::new();
        for base in &matches {
            if has_magic(component) {
                let dir = root.join(base);
                let Ok(entries) = fs::read_dir(&dir) else {
                    continue;
                };
                let mut names: Vec<String> = entries
                    .flatten()
                    .filter_map(|e| e.file_name().to_str().map(str::to_string))
                    .collect();
                names.sort();
                for name in names {
                    if glob_match(component, &name) {
                        next.push(base.join(&name));
                    }
                }
            } else {
                let candidate = base.join(component);
                if root.join(&candidate).symlink_metadata().is_ok() {
                    next.push(candidate);
                }
            }
        }
        matches = next;
    }

    matches.retain(|m| !m.as_os_str().is_empty());
    matches
}

/// Recursively walk `root` yielding relative paths whose trailing
/// components match `pattern`, lazily and in a stable order.
pub fn find_under(root: &Path, pattern: &str, files_only: bool) -> impl Iterator<Item = PathBuf> {
    let root = root.to_path_buf();
    let parts: Vec<String> = pattern
        .split('/')
        .filter(|p| !p.is_empty())
        .map(str::to_string)
        .collect();

    WalkDir::new(root.clone())
        .min_depth(1)
        .sort_by_file_name()
        .into_iter()
        .filter_map(|entry| entry.ok())
        .filter_map(move |entry| {
            if files_only && !entry.file_type().is_file() {
                return None;
            }
            let rel = entry.path().strip_prefix(&root).ok()?.to_path_buf();
            if suffix_matches(&rel, &parts) {
                Some(rel)
            } else {
                None
            }
        })
}

fn suffix_matches(rel: &Path, parts: &[String]) -> bool {
    if parts.is_empty() {
        return false;
    }
    let comps: Vec<&str> = rel
        .components()
        .filter_map(|c| c.as_os_str().to_str())
        .collect();
    if comps.len() < parts.len() {
        return false;
    }
    comps[comps.len() - parts.len()..]
        .iter()
        .zip(parts)
        .all(|(comp, part)| glob_match(part, comp))
}
