//! CSS files.
//!
//! In watch mode a stylesheet becomes a `.css.js` module that hands its text
//! to the HMR client, so edits can be swapped in without a reload. In a
//! production build the text is collected under [`CSS_KEY`] in the shared
//! store for the HTML plugin, and the stylesheet itself is not emitted.

use super::source_text;
use crate::bundler::loader::{Loader, LoaderContext, LoaderError};
use crate::bundler::module::ModuleContent;
use crate::bundler::package::quote;
use crate::error::Result;
use crate::imports::{scan_module, Fragment};
use crate::paths;

/// Shared-store key holding extracted CSS.
pub const CSS_KEY: &str = "css";

pub fn css_loader() -> Result<Loader> {
    Ok(Loader::new("css", r"\.css$")?.transform(|cx, _| {
        if cx.config.watch {
            style_module(cx)
        } else {
            extract(cx)
        }
    }))
}

fn style_module(cx: &mut LoaderContext<'_>) -> Result<(), LoaderError> {
    if !matches!(cx.module().content, ModuleContent::Fragments(_)) {
        let css = source_text(cx)?;
        let id = paths::to_slash(&cx.module().id);
        let code = format!(
            "const css = {};\n__packUpdateStyle__({}, css);\nexport default css;\n",
            quote(&css),
            quote(&id)
        );
        cx.module_mut().content = ModuleContent::Fragments(scan_module(&code).fragments);
    }
    cx.change_extension(".css.js");
    Ok(())
}

fn extract(cx: &mut LoaderContext<'_>) -> Result<(), LoaderError> {
    let marker = format!("{CSS_KEY}:{}", paths::to_slash(&cx.module().id));
    if cx.shared.get(&marker).is_none() {
        let css = source_text(cx)?;
        cx.shared.append(CSS_KEY, &css);
        cx.shared.set(&marker, "1");
    }
    cx.skip_write();

    let id = cx.id;
    cx.graph.rewrite_parent_imports(
        id,
        |_| true,
        |site| {
            *site.fragment = Fragment::Code(String::new());
            Ok(())
        },
    )?;
    Ok(())
}
