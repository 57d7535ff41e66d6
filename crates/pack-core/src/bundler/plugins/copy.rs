//! Copies static files and directories into the output once the build ends.

use std::path::{Path, PathBuf};

use walkdir::WalkDir;

use crate::bundler::plugin::{EventBus, EventKind, Plugin};
use crate::config::CopyRule;
use crate::error::{Error, Result};

#[derive(Debug, Clone, Default)]
pub struct CopyPlugin {
    rules: Vec<CopyRule>,
}

impl CopyPlugin {
    #[must_use]
    pub fn new(rules: Vec<CopyRule>) -> Self {
        Self { rules }
    }
}

impl Plugin for CopyPlugin {
    fn name(&self) -> &str {
        "copy"
    }

    fn apply(&self, events: &mut EventBus) {
        if self.rules.is_empty() {
            return;
        }
        let rules = self.rules.clone();
        events.on(EventKind::End, self.name(), move |cx| {
            for rule in &rules {
                copy_rule(rule, &cx.config.output)?;
            }
            Ok(())
        });
    }
}

/// Where a rule lands. A file without `to` keeps its name at the top of the
/// output; a directory without `to` spills its contents there.
fn destination(rule: &CopyRule, output: &Path) -> PathBuf {
    match &rule.to {
        Some(to) => output.join(to),
        None if rule.from.is_dir() => output.to_path_buf(),
        None => output.join(rule.from.file_name().unwrap_or_default()),
    }
}

fn copy_rule(rule: &CopyRule, output: &Path) -> Result<()> {
    let dest = destination(rule, output);
    if !rule.from.is_dir() {
        return pack_util::fs::copy_creating_dirs(&rule.from, &dest).map_err(|e| Error::io(&rule.from, e));
    }

    for entry in WalkDir::new(&rule.from).follow_links(true) {
        let entry = entry.map_err(|e| {
            let path = e.path().unwrap_or(&rule.from).to_path_buf();
            Error::io(path, e.into())
        })?;
        if !entry.file_type().is_file() {
            continue;
        }
        let Ok(rel) = entry.path().strip_prefix(&rule.from) else {
            continue;
        };
        let target = dest.join(rel);
        pack_util::fs::copy_creating_dirs(entry.path(), &target).map_err(|e| Error::io(entry.path(), e))?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bundler::graph::ModuleGraph;
    use crate::bundler::plugin::{EventContext, SharedState, Subject};
    use crate::config::BuildConfig;
    use std::fs;

    #[test]
    fn test_copies_files_and_directories() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        fs::create_dir_all(root.join("public/img")).unwrap();
        fs::write(root.join("public/robots.txt"), "User-agent: *").unwrap();
        fs::write(root.join("public/img/a.svg"), "<svg/>").unwrap();
        fs::write(root.join("LICENSE"), "MIT").unwrap();

        let mut config = BuildConfig::new(root);
        config.output = root.join("dist");
        let plugin = CopyPlugin::new(vec![
            CopyRule { from: root.join("public"), to: None },
            CopyRule { from: root.join("LICENSE"), to: Some("meta/LICENSE.txt".into()) },
        ]);

        let mut events = EventBus::new();
        plugin.apply(&mut events);
        let mut graph = ModuleGraph::new();
        let mut shared = SharedState::new();
        let mut cx = EventContext {
            graph: &mut graph,
            shared: &mut shared,
            config: &config,
            subject: Subject::Build,
        };
        events.emit(EventKind::End, &mut cx).unwrap();

        assert_eq!(fs::read_to_string(root.join("dist/robots.txt")).unwrap(), "User-agent: *");
        assert_eq!(fs::read_to_string(root.join("dist/img/a.svg")).unwrap(), "<svg/>");
        assert_eq!(fs::read_to_string(root.join("dist/meta/LICENSE.txt")).unwrap(), "MIT");
    }

    #[test]
    fn test_missing_source_fails() {
        let dir = tempfile::tempdir().unwrap();
        let rule = CopyRule { from: dir.path().join("nope.txt"), to: None };
        assert!(matches!(copy_rule(&rule, &dir.path().join("dist")), Err(Error::Io { .. })));
    }

    #[test]
    fn test_no_rules_registers_nothing() {
        let mut events = EventBus::new();
        CopyPlugin::default().apply(&mut events);
        assert!(!events.has_listeners(EventKind::End));
    }
}
