//! Import discovery for JavaScript files.
//!
//! Provides a scanner that splits source into fragments and a wrapper that
//! turns CommonJS files into ES modules.

mod cjs;
mod fragment;
mod scan;

pub use cjs::wrap_commonjs;
pub use fragment::{
    render, Binding, BindingKind, ExportKind, ExportNode, Fragment, ImportKind, ImportNode,
};
pub use scan::{scan_module, ScanResult};
