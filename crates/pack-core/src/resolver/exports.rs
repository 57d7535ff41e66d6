//! `package.json` `exports` and `imports` field evaluation.
//!
//! Supports:
//! - Root exports (string shorthand, `"."` key, or a root conditions object)
//! - Exact subpath exports (`"./feature"`)
//! - Pattern exports with a single `*` wildcard
//! - Nested condition objects, matched against the active condition list
//! - `#`-prefixed subpath imports, exact and pattern

use serde_json::{Map, Value};

/// Resolve an `exports` entry for the package root (`None`) or a `./` subpath.
///
/// Returns the target (starting with `./`) or `None` when the package does
/// not export the requested path under the active conditions.
#[must_use]
pub fn resolve_exports(manifest: &Value, subpath: Option<&str>, conditions: &[&str]) -> Option<String> {
    let exports = manifest.get("exports")?;
    match subpath {
        None => resolve_exports_root(exports, conditions),
        Some(sub) => {
            let obj = exports.as_object()?;
            if !has_subpath_keys(obj) {
                return None;
            }
            if let Some(target) = obj.get(sub) {
                return resolve_target(target, conditions).filter(|t| t.starts_with("./"));
            }
            resolve_pattern(obj, sub, conditions).filter(|t| t.starts_with("./"))
        }
    }
}

fn resolve_exports_root(exports: &Value, conditions: &[&str]) -> Option<String> {
    let target = match exports {
        Value::Object(obj) if has_subpath_keys(obj) || obj.contains_key(".") => obj.get(".")?,
        other => other,
    };
    resolve_target(target, conditions).filter(|t| t.starts_with("./"))
}

/// Resolve a `#`-prefixed specifier through the `imports` field.
///
/// Unlike exports, targets may name another package (`"#dep": "lodash"`).
#[must_use]
pub fn resolve_imports_map(manifest: &Value, spec: &str, conditions: &[&str]) -> Option<String> {
    if !spec.starts_with('#') {
        return None;
    }
    let imports = manifest.get("imports")?.as_object()?;
    if let Some(target) = imports.get(spec) {
        return resolve_target(target, conditions);
    }
    resolve_pattern(imports, spec, conditions)
}

/// Whether the object maps paths (`"./x"`) rather than conditions.
fn has_subpath_keys(obj: &Map<String, Value>) -> bool {
    obj.keys().any(|k| k.starts_with('.'))
}

/// Evaluate a target: a string, an array of fallbacks, or a conditions object.
///
/// For condition objects the first entry of `conditions` that the object
/// defines (and that itself resolves) wins.
fn resolve_target(target: &Value, conditions: &[&str]) -> Option<String> {
    match target {
        Value::String(s) => Some(s.clone()),
        Value::Array(items) => items.iter().find_map(|t| resolve_target(t, conditions)),
        Value::Object(obj) => conditions
            .iter()
            .filter_map(|condition| obj.get(*condition))
            .find_map(|value| resolve_target(value, conditions)),
        _ => None,
    }
}

/// Match a `*` pattern key; the most specific (longest) key wins.
fn resolve_pattern(map: &Map<String, Value>, spec: &str, conditions: &[&str]) -> Option<String> {
    let mut best: Option<(&str, &Value, &str)> = None;
    for (key, value) in map {
        if key.matches('*').count() != 1 {
            continue;
        }
        let Some(star) = match_pattern(key, spec) else {
            continue;
        };
        if best.map_or(true, |(k, _, _)| key.len() > k.len()) {
            best = Some((key.as_str(), value, star));
        }
    }

    let (_, value, star) = best?;
    let target = resolve_target(value, conditions)?;
    substitute_star(&target, star)
}

/// `"./features/*"` against `"./features/foo"` gives `"foo"`.
fn match_pattern<'a>(pattern: &str, spec: &'a str) -> Option<&'a str> {
    let (prefix, suffix) = pattern.split_once('*')?;
    if spec.len() < prefix.len() + suffix.len() || !spec.starts_with(prefix) || !spec.ends_with(suffix) {
        return None;
    }
    let star = &spec[prefix.len()..spec.len() - suffix.len()];
    (!star.is_empty()).then_some(star)
}

fn substitute_star(target: &str, star: &str) -> Option<String> {
    if target.matches('*').count() != 1 {
        return None;
    }
    let result = target.replace('*', star);
    if result.split('/').any(|segment| segment == "..") {
        return None;
    }
    Some(result)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    const WEB: &[&str] = &["browser", "import", "module", "default"];
    const NODE: &[&str] = &["node", "import", "module", "default"];

    #[test]
    fn test_string_root() {
        let pkg = json!({ "exports": "./dist/index.js" });
        assert_eq!(resolve_exports(&pkg, None, WEB).as_deref(), Some("./dist/index.js"));
    }

    #[test]
    fn test_root_conditions_follow_priority() {
        let pkg = json!({
            "exports": { "node": "./node.js", "browser": "./browser.js", "default": "./d.js" }
        });
        assert_eq!(resolve_exports(&pkg, None, WEB).as_deref(), Some("./browser.js"));
        assert_eq!(resolve_exports(&pkg, None, NODE).as_deref(), Some("./node.js"));
    }

    #[test]
    fn test_dot_key_with_nested_conditions() {
        let pkg = json!({
            "exports": {
                ".": { "import": { "browser": "./esm.browser.js", "default": "./esm.js" }, "require": "./cjs.js" },
                "./package.json": "./package.json"
            }
        });
        assert_eq!(resolve_exports(&pkg, None, WEB).as_deref(), Some("./esm.browser.js"));
        assert_eq!(resolve_exports(&pkg, None, NODE).as_deref(), Some("./esm.js"));
    }

    #[test]
    fn test_subpath_and_pattern() {
        let pkg = json!({
            "exports": {
                ".": "./index.js",
                "./feature": { "default": "./feature/index.js" },
                "./utils/*": "./src/utils/*.js",
                "./utils/deep/*": "./src/deep/*.js"
            }
        });
        assert_eq!(
            resolve_exports(&pkg, Some("./feature"), WEB).as_deref(),
            Some("./feature/index.js")
        );
        assert_eq!(
            resolve_exports(&pkg, Some("./utils/pad"), WEB).as_deref(),
            Some("./src/utils/pad.js")
        );
        assert_eq!(
            resolve_exports(&pkg, Some("./utils/deep/x"), WEB).as_deref(),
            Some("./src/deep/x.js")
        );
        assert_eq!(resolve_exports(&pkg, Some("./missing"), WEB), None);
    }

    #[test]
    fn test_pattern_rejects_traversal() {
        let pkg = json!({ "exports": { "./*": "./lib/*" } });
        assert_eq!(resolve_exports(&pkg, Some("./../secret"), WEB), None);
    }

    #[test]
    fn test_array_fallback() {
        let pkg = json!({ "exports": { ".": [{ "worker": "./w.js" }, "./fallback.js"] } });
        assert_eq!(resolve_exports(&pkg, None, WEB).as_deref(), Some("./fallback.js"));
    }

    #[test]
    fn test_imports_map() {
        let pkg = json!({
            "imports": {
                "#dep": { "browser": "./dep.browser.js", "default": "./dep.js" },
                "#internal/*": "./src/internal/*.js",
                "#lodash": "lodash"
            }
        });
        assert_eq!(resolve_imports_map(&pkg, "#dep", WEB).as_deref(), Some("./dep.browser.js"));
        assert_eq!(resolve_imports_map(&pkg, "#dep", NODE).as_deref(), Some("./dep.js"));
        assert_eq!(
            resolve_imports_map(&pkg, "#internal/a", WEB).as_deref(),
            Some("./src/internal/a.js")
        );
        assert_eq!(resolve_imports_map(&pkg, "#lodash", WEB).as_deref(), Some("lodash"));
        assert_eq!(resolve_imports_map(&pkg, "dep", WEB), None);
    }
}
