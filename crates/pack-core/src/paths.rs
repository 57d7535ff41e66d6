//! Path helpers shared by the resolver, graph and chunk writer.
//!
//! Output paths are kept as `/`-separated strings relative to the output
//! directory so they can be dropped straight into import literals.

use std::path::{Component, Path, PathBuf};

/// Lexically normalize a path: drop `.` segments and fold `..` into the parent.
#[must_use]
pub fn clean(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                if !out.pop() {
                    out.push("..");
                }
            }
            other => out.push(other.as_os_str()),
        }
    }
    out
}

/// Render a path with `/` separators.
#[must_use]
pub fn to_slash(path: &Path) -> String {
    let mut out = String::new();
    for (i, component) in path.components().enumerate() {
        match component {
            Component::RootDir => {
                out.push('/');
                continue;
            }
            Component::Prefix(prefix) => {
                out.push_str(&prefix.as_os_str().to_string_lossy());
                continue;
            }
            _ => {}
        }
        if i > 0 && !out.ends_with('/') {
            out.push('/');
        }
        out.push_str(&component.as_os_str().to_string_lossy());
    }
    out
}

/// Path of `target` relative to `base`, both absolute or both relative.
#[must_use]
pub fn relative(base: &Path, target: &Path) -> PathBuf {
    let base = clean(base);
    let target = clean(target);
    let base: Vec<_> = base.components().collect();
    let target: Vec<_> = target.components().collect();

    let common = base
        .iter()
        .zip(target.iter())
        .take_while(|(a, b)| a == b)
        .count();

    let mut out = PathBuf::new();
    for _ in common..base.len() {
        out.push("..");
    }
    for component in &target[common..] {
        out.push(component.as_os_str());
    }
    out
}

/// Prefix a relative specifier with `./` unless it already starts with `.` or `/`.
#[must_use]
pub fn ensure_dot_prefix(spec: &str) -> String {
    if spec.starts_with("./") || spec.starts_with("../") || spec.starts_with('/') {
        spec.to_string()
    } else {
        format!("./{spec}")
    }
}

/// Prefix an output path with `/` for use as a URL.
#[must_use]
pub fn ensure_root_prefix(outpath: &str) -> String {
    if outpath.starts_with('/') {
        outpath.to_string()
    } else {
        format!("/{outpath}")
    }
}

/// Import literal that leads from the output file `from` to the output file `to`.
#[must_use]
pub fn relative_literal(from: &str, to: &str) -> String {
    let from_dir = Path::new(from).parent().unwrap_or(Path::new(""));
    ensure_dot_prefix(&to_slash(&relative(from_dir, Path::new(to))))
}

/// Extension of the last path segment including the dot, or `""`.
#[must_use]
pub fn extension(path: &str) -> &str {
    let name_start = path.rfind('/').map_or(0, |i| i + 1);
    let name = &path[name_start..];
    match name.rfind('.') {
        Some(0) | None => "",
        Some(dot) => &name[dot..],
    }
}

/// Swap the last extension of `path` for `ext` (which includes its dot).
#[must_use]
pub fn replace_extension(path: &str, ext: &str) -> String {
    let current = extension(path);
    format!("{}{ext}", &path[..path.len() - current.len()])
}

/// Insert `_<hash>` before the extension: `app/main.js` -> `app/main_1a2b3c4d.js`.
#[must_use]
pub fn append_hash(path: &str, hash: &str) -> String {
    let ext = extension(path);
    format!("{}_{hash}{ext}", &path[..path.len() - ext.len()])
}
