//! Style injection: importers of a stylesheet insert it as a `<style>` tag.

use super::source_text;
use crate::bundler::loader::{Loader, LoaderContext, LoaderError};
use crate::bundler::package::quote;
use crate::error::Result;
use crate::imports::Fragment;
use crate::paths;

pub fn style_loader() -> Result<Loader> {
    Ok(Loader::new("style", r"\.(css|scss|sass|less)$")?.transform(|cx, _| transform(cx)))
}

fn transform(cx: &mut LoaderContext<'_>) -> Result<(), LoaderError> {
    let css = source_text(cx)?;
    let id = paths::to_slash(&cx.module().id);
    let target = cx.module().id.clone();
    let owner = format!("style:{id}");
    let code = inject_code(&id, &css);
    cx.skip_write();

    // Every importer, rebuilt or not, must carry the current text
    for parent in cx.module().parents.clone() {
        let Some(fragments) = cx.graph[parent].fragments_mut() else {
            continue;
        };
        for fragment in fragments.iter_mut() {
            let hit = fragment.is_owned_by(&owner)
                || fragment
                    .as_import()
                    .is_some_and(|node| node.resolved.as_deref() == Some(target.as_path()));
            if hit {
                *fragment = Fragment::injected(owner.clone(), code.clone());
            }
        }
    }
    Ok(())
}

fn inject_code(id: &str, css: &str) -> String {
    format!(
        "(function () {{ var id = {}; var el = document.querySelector('style[data-pack-id=\"' + id + '\"]'); \
         if (!el) {{ el = document.createElement(\"style\"); el.setAttribute(\"data-pack-id\", id); document.head.appendChild(el); }} \
         el.textContent = {}; }})();",
        quote(id),
        quote(css)
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bundler::graph::ModuleGraph;
    use crate::bundler::loader::apply_loaders;
    use crate::bundler::module::ModuleContent;
    use crate::bundler::plugin::SharedState;
    use crate::config::BuildConfig;
    use crate::imports::{ImportKind, ImportNode};
    use std::path::PathBuf;

    #[test]
    fn test_injects_and_refreshes_style() {
        let mut graph = ModuleGraph::new();
        let main = graph.create(PathBuf::from("/p/src/main.js"));
        graph[main].set_outpath("src/main.js".into());
        let sheet = graph.create(PathBuf::from("/p/src/theme.scss"));
        graph[sheet].set_outpath("src/theme.scss".into());
        graph[sheet].content = ModuleContent::Text("a { b: c }".into());
        let mut node = ImportNode::new(ImportKind::Static, "import './theme.scss';", "./theme.scss");
        node.resolved = Some(PathBuf::from("/p/src/theme.scss"));
        graph[main].content = ModuleContent::Fragments(vec![Fragment::Import(node), Fragment::code("\n")]);
        graph.link(main, sheet);

        let loaders = [style_loader().unwrap()];
        let config = BuildConfig::new("/p");
        apply_loaders(&mut graph, &loaders, &[sheet], &mut SharedState::new(), &config).unwrap();

        assert!(graph[sheet].skip_write);
        let code = graph[main].text().unwrap();
        assert!(code.contains("el.textContent = \"a { b: c }\";"));
        assert!(code.contains("var id = \"/p/src/theme.scss\";"));

        // The parent is not rebuilt, but its injected copy follows the edit
        graph.settle();
        graph[sheet].content = ModuleContent::Text("a { b: d }".into());
        apply_loaders(&mut graph, &loaders, &[sheet], &mut SharedState::new(), &config).unwrap();
        let code = graph[main].text().unwrap();
        assert!(code.contains("el.textContent = \"a { b: d }\";"));
        assert_eq!(code.matches("(function ()").count(), 1);
    }
}
