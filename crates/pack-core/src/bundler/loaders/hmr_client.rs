//! Dev-only loader wiring every project script to the HMR client.

use crate::bundler::loader::{Loader, LoaderContext, LoaderError};
use crate::bundler::module::ModuleKind;
use crate::bundler::package::quote;
use crate::dev::hmr::CLIENT_RUNTIME;
use crate::error::Result;
use crate::imports::{Binding, BindingKind, Fragment, ImportKind, ImportNode};
use crate::paths;

/// Output name of the client runtime module, at the output root.
pub const CLIENT_FILE: &str = "__pack_client__.js";

/// Owner tag of the `import.meta.hot` assignment.
const HOT_OWNER: &str = "hmr";

pub fn hmr_client_loader() -> Result<Loader> {
    Ok(Loader::new("hmr-client", r"\.(js|jsx|ts|tsx|mjs|cjs|vue)$")?
        .exclude(r"node_modules|\.json\.js$")?
        .include(r"\.css\.js$")?
        .transform(|cx, _| transform(cx)))
}

fn transform(cx: &mut LoaderContext<'_>) -> Result<(), LoaderError> {
    let module = cx.module();
    if module.injected_hmr
        || module.kind == ModuleKind::Synthetic
        || module.is_package_script()
        || module.fragments().is_none()
    {
        return Ok(());
    }
    let hot_id = paths::to_slash(&module.id);
    let is_style = module.kind == ModuleKind::Style;

    let path = cx.config.root.join(CLIENT_FILE);
    let client = cx
        .graph
        .insert_synthetic(path.clone(), CLIENT_FILE.to_string(), CLIENT_RUNTIME.to_string());
    let id = cx.id;
    cx.graph.link(id, client);
    let literal = cx.graph.literal_for(id, client);

    let mut bindings = vec![Binding::new(BindingKind::Named, "createHotContext", Some("__packHot__".into()))];
    let mut names = "createHotContext as __packHot__".to_string();
    if is_style {
        bindings.push(Binding::new(BindingKind::Named, "updateStyle", Some("__packUpdateStyle__".into())));
        names.push_str(", updateStyle as __packUpdateStyle__");
    }
    let mut node = ImportNode::new(
        ImportKind::Static,
        format!("import {{ {names} }} from {};\n", quote(&literal)),
        literal,
    )
    .with_bindings(bindings);
    node.resolved = Some(path);

    let module = cx.module_mut();
    if let Some(fragments) = module.fragments_mut() {
        fragments.insert(0, Fragment::Import(node));
        fragments.insert(
            1,
            Fragment::injected(HOT_OWNER, format!("import.meta.hot = __packHot__({});\n", quote(&hot_id))),
        );
    }
    module.injected_hmr = true;
    Ok(())
}
