use std::path::Path;
use std::path::PathBuf;

use crate::PackResult;
use crate::builder::build_document;
use crate::cache::ContentCache;
use crate::cache::MemoryCache;
use crate::config::PackConfig;
use crate::config::ResolvedDirs;
use crate::directive::Directive;
use crate::document::Document;
use crate::document::DocumentKind;
use crate::machine::ContentVisitor;
use crate::machine::InstructionEvent;
use crate::machine::ResourceEvent;
use crate::machine::ResourceKind;
use crate::project::Project;

pub const PROJECT_ROOT: &str = "/w";
pub const WEB_ROOT: &str = "/w/src/";
pub const PAGE_FILE: &str = "/w/src/index.html";
pub const TEMPLATE_FILE: &str = "/w/src/views/a.ftl";

pub fn test_dirs() -> ResolvedDirs {
	PackConfig::default().resolve_dirs(Path::new(PROJECT_ROOT))
}

/// A cache holding the given `(path, content)` pairs.
pub fn cache_with(entries: &[(&str, &str)]) -> MemoryCache {
	let mut cache = MemoryCache::new();
	for (path, content) in entries {
		cache.cache(path, (*content).to_string());
	}
	cache
}

pub fn page(content: &str, cache: &mut MemoryCache) -> PackResult<Document> {
	build_document(PAGE_FILE, content, DocumentKind::Page, WEB_ROOT, cache)
}

pub fn template(content: &str, cache: &mut MemoryCache) -> PackResult<Document> {
	build_document(TEMPLATE_FILE, content, DocumentKind::Template, WEB_ROOT, cache)
}

/// A project rooted at [`PROJECT_ROOT`] built from in-memory documents.
pub fn project_with(config: PackConfig, documents: Vec<Document>, cache: MemoryCache) -> Project {
	let dirs = config.resolve_dirs(Path::new(PROJECT_ROOT));
	Project {
		root: PathBuf::from(PROJECT_ROOT),
		config,
		dirs,
		documents,
		cache,
	}
}

/// A resource region as seen by a visitor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedResource {
	pub kind: ResourceKind,
	pub tag: String,
	pub begin: String,
	pub source: String,
}

/// Records every resource and directive event and keeps the source as is.
#[derive(Debug, Default)]
pub struct RecordingVisitor {
	pub resources: Vec<RecordedResource>,
	pub directives: Vec<Directive>,
}

impl ContentVisitor for RecordingVisitor {
	fn on_resource(&mut self, event: &mut ResourceEvent<'_>) -> Option<String> {
		self.resources.push(RecordedResource {
			kind: event.kind,
			tag: event.tag.name.clone(),
			begin: event.begin.to_string(),
			source: event.source.clone(),
		});
		None
	}

	fn on_instruction(&mut self, event: InstructionEvent<'_>) {
		self.directives.push(event.directive.clone());
		event.buffer.push(event.source.to_string());
	}
}

pub const STYLE_PAGE: &str = r#"<html><head>
<!-- @STYLE {core:false} -->
<link href="/css/base.css" rel="stylesheet"/>
<style>.page{color:red}</style>
<!-- /@STYLE -->
</head></html>"#;

pub const SCRIPT_PAGE: &str = r#"<body>
<!-- @SCRIPT -->
<script src="/js/a.js"></script>
<!-- /@SCRIPT -->
</body>"#;

pub const MERGE_PAGE: &str = r#"<!-- @MERGE {name:'widgets', minify:true} -->
<script src="./a.js"></script>
<script src="./b.js"></script>
<!-- /@MERGE -->"#;
