//! Built-in plugins.

mod copy;
mod html;

pub use copy::CopyPlugin;
pub use html::{render_page, HtmlPlugin, DEFAULT_TEMPLATE};
