//! JSON files as ES modules.

use super::source_text;
use crate::bundler::loader::{Loader, LoaderContext, LoaderError};
use crate::bundler::module::ModuleContent;
use crate::error::Result;
use crate::imports::scan_module;

/// `data.json` becomes `data.json.js` with `export default <json>;`.
pub fn json_loader() -> Result<Loader> {
    Ok(Loader::new("json", r"\.json$")?.transform(|cx, _| transform(cx)))
}

fn transform(cx: &mut LoaderContext<'_>) -> Result<(), LoaderError> {
    if matches!(cx.module().content, ModuleContent::Fragments(_)) {
        // Already converted in an earlier pass
        cx.change_extension(".json.js");
        return Ok(());
    }

    let raw = source_text(cx)?;
    serde_json::from_str::<serde_json::Value>(&raw)
        .map_err(|e| LoaderError::new(format!("invalid JSON: {e}")))?;

    let code = format!("export default {};\n", raw.trim());
    cx.module_mut().content = ModuleContent::Fragments(scan_module(&code).fragments);
    cx.change_extension(".json.js");
    Ok(())
}
