//! `pagepack_core` is the library behind the `pagepack` static asset build
//! tool. It scans html pages and server templates, collects the styles,
//! scripts and templates marked by build directives, merges them into
//! bundles, inlines or links each bundle depending on its size, rewrites
//! resource references for versioned delivery and writes the deployable
//! output.
//!
//! ## Processing Pipeline
//!
//! ```text
//! Markup file
//!   -> Lexer (tag, text and comment events with exact source spans)
//!   -> State machine (style, script, textarea regions and directive comments)
//!   -> Document builder (directive regions into a Document resource model)
//!   -> Merge (page and template bundles, core extraction)
//!   -> Embed (inline or external placement at the buffer insertion points)
//!   -> Output (tagged uri rewrite, versioning, domain rotation)
//!   -> Cache flush (files and manifest on disk)
//! ```
//!
//! ## Directives
//!
//! ```html
//! <!-- @STYLE {core:false, inline:true} -->
//! <link href="/css/page.css" rel="stylesheet"/>
//! <!-- /@STYLE -->
//!
//! <!-- @MERGE {name:'widgets', minify:true} -->
//! <script src="./a.js"></script>
//! <script src="./b.js"></script>
//! <!-- /@MERGE -->
//! ```
//!
//! `@STYLE`, `@SCRIPT`, `@TEMPLATE`, `@MODULE`, `@MERGE` and `@IGNORE` are
//! understood. Any other directive is written back unchanged.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::path::Path;
//!
//! use pagepack_core::project::build_project;
//!
//! let report = build_project(Path::new(".")).unwrap();
//! for document in &report.documents {
//! 	println!("{} -> {}", document.file, document.output);
//! }
//! ```

pub use error::*;

pub mod builder;
pub mod cache;
pub mod config;
pub mod directive;
pub mod document;
pub mod embed;
#[allow(unused_assignments)]
mod error;
pub mod lexer;
pub mod literal;
pub mod machine;
pub mod merge;
pub mod minify;
pub mod output;
pub mod project;
pub mod tokens;
pub mod uri;

#[cfg(test)]
mod __fixtures;
#[cfg(test)]
mod __tests;
