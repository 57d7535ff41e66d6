//! Static assets: images, fonts and media are copied as is and importers
//! receive the file's URL instead of a module.
//!
//! The import fragment is kept, with its code replaced by a constant that
//! still contains the quoted URL, so hashing the asset later retargets it
//! like any other literal.

use crate::bundler::loader::{Loader, LoaderContext, LoaderError};
use crate::bundler::package::quote;
use crate::error::Result;
use crate::imports::{BindingKind, Fragment, ImportKind, ImportNode};

/// File types handled by [`assets_loader`].
pub const ASSET_PATTERN: &str =
    r"\.(png|jpe?g|gif|svg|webp|avif|ico|bmp|woff2?|eot|ttf|otf|mp4|webm|ogg|mp3|wav|flac|aac|txt|wasm)$";

pub fn assets_loader() -> Result<Loader> {
    Ok(Loader::new("assets", ASSET_PATTERN)?.transform(|cx, _| transform(cx)))
}

fn transform(cx: &mut LoaderContext<'_>) -> Result<(), LoaderError> {
    let id = cx.id;
    cx.graph.rewrite_parent_imports(
        id,
        |_| true,
        |site| {
            if let Fragment::Import(node) = site.fragment {
                node.code = url_code(node);
            }
            Ok(())
        },
    )?;
    Ok(())
}

/// Code binding an asset import to the URL in the node's literal.
fn url_code(node: &ImportNode) -> String {
    let url = quote(&node.path);
    match node.kind {
        ImportKind::Require => url,
        ImportKind::Dynamic => format!("Promise.resolve({{ default: {url} }})"),
        ImportKind::Static | ImportKind::ReExport => {
            let export = if node.kind == ImportKind::ReExport { "export " } else { "" };
            node.bindings
                .iter()
                .map(|binding| match (binding.kind, binding.local()) {
                    (_, "default") => format!("export default {url};"),
                    (BindingKind::Namespace, local) => {
                        format!("{export}const {local} = {{ default: {url} }};")
                    }
                    (_, local) => format!("{export}const {local} = {url};"),
                })
                .collect::<Vec<_>>()
                .join(" ")
        }
    }
}
