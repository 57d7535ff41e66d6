//! Built-in loaders.
//!
//! | loader         | matches                          | effect                                   |
//! |----------------|----------------------------------|------------------------------------------|
//! | `json`         | `*.json`                         | `export default <json>` as `.json.js`    |
//! | `css`          | `*.css`                          | `.css.js` style module, or extracted CSS |
//! | `style`        | `*.css` and friends              | `<style>` injected into importers        |
//! | `assets`       | images, fonts, media             | importers get the file's URL             |
//! | `hmr-client`   | project scripts (dev only)       | `import.meta.hot` bootstrap              |

mod assets;
mod css;
mod hmr_client;
mod json;
mod style;

pub use assets::{assets_loader, ASSET_PATTERN};
pub use css::{css_loader, CSS_KEY};
pub use hmr_client::{hmr_client_loader, CLIENT_FILE};
pub use json::json_loader;
pub use style::style_loader;

use super::loader::{Loader, LoaderContext, LoaderError};
use super::module::ModuleContent;
use crate::config::BuildConfig;
use crate::error::Result;

/// Loaders installed by [`crate::Build::with_default_loaders`]: json, css and
/// assets, plus the HMR client in watch mode.
pub fn default_loaders(config: &BuildConfig) -> Result<Vec<Loader>> {
    let mut loaders = vec![json_loader()?, css_loader()?, assets_loader()?];
    if config.watch {
        loaders.push(hmr_client_loader()?);
    }
    Ok(loaders)
}

/// The module's raw text: its content if still unscanned, the file otherwise.
fn source_text(cx: &LoaderContext<'_>) -> Result<String, LoaderError> {
    match &cx.module().content {
        ModuleContent::Text(text) => Ok(text.clone()),
        _ => cx.read_source(),
    }
}
