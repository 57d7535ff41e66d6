//! Writes the HTML page that loads the entry chunk.

use std::collections::BTreeMap;

use regex_lite::{Captures, Regex};
use serde_json::Value;

use crate::bundler::loaders::CSS_KEY;
use crate::bundler::plugin::{EventBus, EventContext, EventKind, Plugin};
use crate::config::HtmlConfig;
use crate::error::{Error, Result};
use crate::paths;

/// Page used when no template is configured.
pub const DEFAULT_TEMPLATE: &str = r#"<!DOCTYPE html>
<html lang="en">
  <head>
    <meta charset="UTF-8" />
    <meta http-equiv="X-UA-Compatible" content="IE=edge" />
    <meta name="viewport" content="width=device-width, initial-scale=1.0" />
    <title><%= html.title %></title>
  </head>
  <body>
    <div id="app"></div>
  </body>
</html>
"#;

/// Marker a template can use to place the script tag explicitly.
const SCRIPTS_MARKER: &str = "<!-- pack:scripts -->";

/// Emits `index.html` (or the configured file name) once the build ends.
#[derive(Debug, Clone, Default)]
pub struct HtmlPlugin {
    options: HtmlConfig,
}

impl HtmlPlugin {
    #[must_use]
    pub fn new(options: HtmlConfig) -> Self {
        Self { options }
    }
}

impl Plugin for HtmlPlugin {
    fn name(&self) -> &str {
        "html"
    }

    fn apply(&self, events: &mut EventBus) {
        let options = self.options.clone();
        events.on(EventKind::End, self.name(), move |cx| write_page(&options, cx));
    }
}

fn write_page(options: &HtmlConfig, cx: &mut EventContext<'_>) -> Result<()> {
    let Some(root) = cx.graph.root() else {
        return Ok(());
    };
    let template = match &options.template {
        Some(path) => pack_util::fs::read_to_string_lossy(path).map_err(|e| Error::io(path, e))?,
        None => DEFAULT_TEMPLATE.to_string(),
    };
    let src = paths::relative_literal(&options.filename, cx.graph[root].final_outpath());
    let page = render_page(
        &template,
        &options.title,
        &cx.config.define,
        &src,
        cx.shared.get(CSS_KEY),
    );
    let path = cx.config.output.join(&options.filename);
    pack_util::fs::atomic_write(&path, page.as_bytes()).map_err(|e| Error::io(&path, e))
}

/// Fill `<%= key %>` placeholders, then add the entry script and any
/// extracted CSS.
///
/// `html.title` maps to `title`; other keys are looked up in `define`.
#[must_use]
pub fn render_page(
    template: &str,
    title: &str,
    define: &BTreeMap<String, Value>,
    script_src: &str,
    css: Option<&str>,
) -> String {
    let mut page = fill_placeholders(template, title, define);

    let script = format!("<script type=\"module\" src=\"{script_src}\"></script>");
    if page.contains(SCRIPTS_MARKER) {
        page = page.replacen(SCRIPTS_MARKER, &script, 1);
    } else {
        insert_before(&mut page, "</body>", &script);
    }

    if let Some(css) = css.filter(|css| !css.is_empty()) {
        insert_before(&mut page, "</head>", &format!("<style>\n{css}</style>\n"));
    }
    page
}

fn fill_placeholders(template: &str, title: &str, define: &BTreeMap<String, Value>) -> String {
    let Ok(re) = Regex::new(r"<%= (\S*) %>") else {
        return template.to_string();
    };
    re.replace_all(template, |caps: &Captures<'_>| match &caps[1] {
        "html.title" => title.to_string(),
        key => match define.get(key) {
            Some(Value::String(s)) => s.clone(),
            Some(other) => other.to_string(),
            None => String::new(),
        },
    })
    .into_owned()
}

/// Insert `text` before the last `tag`, or append it when the tag is missing.
fn insert_before(page: &mut String, tag: &str, text: &str) {
    match page.rfind(tag) {
        Some(pos) => page.insert_str(pos, text),
        None => page.push_str(text),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bundler::graph::ModuleGraph;
    use crate::bundler::plugin::{SharedState, Subject};
    use crate::config::BuildConfig;
    use std::path::PathBuf;

    #[test]
    fn test_default_page() {
        let page = render_page(DEFAULT_TEMPLATE, "Demo", &BTreeMap::new(), "./src/main_1a2b3c4d.js", None);
        assert!(page.contains("<title>Demo</title>"));
        assert!(page.contains(
            "<script type=\"module\" src=\"./src/main_1a2b3c4d.js\"></script></body>"
        ));
        assert!(!page.contains("<style>"));
    }

    #[test]
    fn test_define_placeholders_and_css() {
        let mut define = BTreeMap::new();
        define.insert("API".to_string(), Value::String("https://api.test".into()));
        define.insert("RETRIES".to_string(), Value::from(3));
        let template = "<head></head><body data-api=\"<%= API %>\" data-n=\"<%= RETRIES %>\" data-x=\"<%= NOPE %>\">\
                        <!-- pack:scripts --></body>";

        let page = render_page(template, "t", &define, "./main.js", Some("a{}"));
        assert_eq!(
            page,
            "<head><style>\na{}</style>\n</head><body data-api=\"https://api.test\" data-n=\"3\" data-x=\"\">\
             <script type=\"module\" src=\"./main.js\"></script></body>"
        );
    }

    #[test]
    fn test_plugin_writes_page_on_end() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = BuildConfig::new(dir.path());
        config.output = dir.path().join("dist");

        let mut graph = ModuleGraph::new();
        let main = graph.create(PathBuf::from("/p/src/main.js"));
        graph[main].set_outpath("src/main.js".into());
        graph.set_root(main);

        let mut events = EventBus::new();
        HtmlPlugin::new(HtmlConfig::default()).apply(&mut events);
        let mut shared = SharedState::new();
        shared.set(CSS_KEY, "body{}");
        let mut cx = EventContext {
            graph: &mut graph,
            shared: &mut shared,
            config: &config,
            subject: Subject::Build,
        };
        events.emit(EventKind::End, &mut cx).unwrap();

        let page = std::fs::read_to_string(dir.path().join("dist/index.html")).unwrap();
        assert!(page.contains("<title>pack</title>"));
        assert!(page.contains("src=\"./src/main.js\""));
        assert!(page.contains("<style>\nbody{}</style>\n</head>"));
    }
}
