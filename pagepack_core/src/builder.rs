//! Populates a [`Document`] from the events of the content state machine.
//!
//! Directives mark the regions whose resources are collected:
//!
//! ```html
//! <!-- @STYLE {core:false} -->
//! <link href="/css/base.css" rel="stylesheet"/>
//! <style>.page{color:red}</style>
//! <!-- /@STYLE -->
//! ```
//!
//! Collected resources are removed from the buffer and a placeholder entry is
//! recorded where the merged bundle is written back later.

use tracing::debug;
use tracing::warn;

use crate::PackResult;
use crate::cache::ContentCache;
use crate::directive::Directive;
use crate::document::Document;
use crate::document::DocumentKind;
use crate::document::Explorer;
use crate::document::MergeGroup;
use crate::document::MergeGroupConfig;
use crate::document::ResourceConfig;
use crate::document::ResourceType;
use crate::document::TemplateFragment;
use crate::document::TemplateRegion;
use crate::machine::ContentVisitor;
use crate::machine::InstructionEvent;
use crate::machine::ResourceEvent;
use crate::machine::ResourceKind;
use crate::machine::scan_markup;

/// An open directive region.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Region {
	Style,
	Script,
	/// Index into [`Document::templates`].
	Template(usize),
	Module,
	/// Index into [`Document::merge_groups`].
	Merge(usize),
	Ignore,
}

impl Region {
	fn command(self) -> &'static str {
		match self {
			Self::Style => "STYLE",
			Self::Script => "SCRIPT",
			Self::Template(_) => "TEMPLATE",
			Self::Module => "MODULE",
			Self::Merge(_) => "MERGE",
			Self::Ignore => "IGNORE",
		}
	}
}

/// A [`ContentVisitor`] that records directive regions and their resources
/// into a [`Document`].
pub struct DocumentBuilder<'a> {
	document: Document,
	cache: &'a mut dyn ContentCache,
	/// Absolute web root ending in `/`.
	web_root: String,
	regions: Vec<Region>,
	inline_styles: usize,
	inline_scripts: usize,
}

impl<'a> DocumentBuilder<'a> {
	pub fn new(
		file: &str,
		kind: DocumentKind,
		web_root: &str,
		cache: &'a mut dyn ContentCache,
	) -> Self {
		Self {
			document: Document::new(file, kind),
			cache,
			web_root: web_root.to_string(),
			regions: vec![],
			inline_styles: 0,
			inline_scripts: 0,
		}
	}

	/// Take the buffer produced by the scan and return the finished document.
	pub fn finish(mut self, buffer: crate::tokens::Buffer) -> Document {
		for region in &self.regions {
			warn!(
				file = %self.document.file,
				directive = region.command(),
				"directive region never closed"
			);
		}

		self.document.buffer = buffer;
		self.document
	}

	/// Resolve a `src`/`href` reference to the absolute path used as the
	/// resource id. Remote urls are not bundled.
	fn resolve_reference(&self, reference: &str) -> Option<String> {
		let reference = reference.trim();
		if reference.is_empty()
			|| reference.starts_with("//")
			|| reference.contains("://")
			|| reference.starts_with("data:")
		{
			return None;
		}

		let reference = reference
			.split(['?', '#'])
			.next()
			.unwrap_or_default();

		let joined = match reference.strip_prefix('/') {
			Some(rest) => format!("{}{rest}", self.web_root),
			None => {
				let dir = self
					.document
					.file
					.rfind('/')
					.map_or("", |index| &self.document.file[..=index]);
				format!("{dir}{reference}")
			}
		};

		Some(normalize_segments(&joined))
	}

	/// Store an inline body under a synthetic key and return the key.
	fn cache_inline(&mut self, res_type: ResourceType, body: &str) -> String {
		let key = match res_type {
			ResourceType::Style => {
				self.inline_styles += 1;
				format!("{}#style{}", self.document.file, self.inline_styles - 1)
			}
			ResourceType::Script => {
				self.inline_scripts += 1;
				format!("{}#script{}", self.document.file, self.inline_scripts - 1)
			}
		};
		self.cache.cache(&key, body.to_string());
		key
	}

	/// The resource id for a closed style or script region.
	fn resource_id(&mut self, res_type: ResourceType, event: &ResourceEvent<'_>) -> Option<String> {
		let attribute = match res_type {
			ResourceType::Style if event.tag.name.eq_ignore_ascii_case("link") => "href",
			ResourceType::Style => return Some(self.cache_inline(res_type, &event.source)),
			ResourceType::Script => "src",
		};

		match event.config.non_empty(attribute) {
			Some(reference) => self.resolve_reference(reference),
			None if res_type == ResourceType::Script => {
				Some(self.cache_inline(res_type, &event.source))
			}
			None => None,
		}
	}

	fn open_region(&mut self, directive: &Directive, event: &mut InstructionEvent<'_>) {
		let region = match directive.command.as_str() {
			"STYLE" | "SCRIPT" => {
				let res_type = if directive.command == "STYLE" {
					ResourceType::Style
				} else {
					ResourceType::Script
				};
				let config = ResourceConfig {
					filename: String::new(),
					core: directive.flag("core"),
					inline: directive.truthy("inline"),
				};

				match res_type {
					ResourceType::Style => {
						self.document.style_config.get_or_insert(config);
					}
					ResourceType::Script => {
						self.document.script_config.get_or_insert(config);
					}
				}

				let point = self.document.point_mut(res_type);
				if point.is_none() {
					*point = Some(event.buffer.push_entry(""));
				}

				if res_type == ResourceType::Style {
					Region::Style
				} else {
					Region::Script
				}
			}
			"TEMPLATE" => {
				let pointer = event.buffer.push_entry("");
				self.document.templates.push(TemplateRegion {
					pointer,
					explorer: Explorer::new(),
				});
				Region::Template(self.document.templates.len() - 1)
			}
			"MODULE" => {
				if self.document.module_point.is_none() {
					self.document.module_point = Some(event.buffer.push_entry(""));
				}
				self.document.modules.get_or_insert_with(Explorer::new);
				Region::Module
			}
			"MERGE" => {
				let pointer = event.buffer.push_entry("");
				self.document.merge_groups.push(MergeGroup {
					pointer: Some(pointer),
					scripts: vec![],
					config: MergeGroupConfig {
						name: directive
							.text("name")
							.filter(|name| !name.is_empty())
							.map(ToString::to_string),
						minify: directive.truthy("minify"),
					},
				});
				Region::Merge(self.document.merge_groups.len() - 1)
			}
			"IGNORE" => Region::Ignore,
			_ => {
				event.buffer.push(event.source.to_string());
				return;
			}
		};

		self.regions.push(region);
	}

	fn close_region(&mut self, directive: &Directive, event: &mut InstructionEvent<'_>) {
		let position = self
			.regions
			.iter()
			.rposition(|region| region.command() == directive.command);

		match position {
			Some(position) => {
				self.regions.remove(position);
			}
			None if is_known_command(&directive.command) => {
				debug!(
					file = %self.document.file,
					directive = %directive.command,
					"closing directive without an open region"
				);
			}
			None => event.buffer.push(event.source.to_string()),
		}
	}

	/// Record a template fragment from a closed textarea.
	fn fragment(event: &ResourceEvent<'_>) -> TemplateFragment {
		let id = event
			.config
			.non_empty("id")
			.or_else(|| event.config.non_empty("name"))
			.unwrap_or_default();

		TemplateFragment {
			id: id.to_string(),
			content: event.source.clone(),
			markup: format!("{}{}{}", event.begin, event.source, event.tag.source),
		}
	}
}

impl ContentVisitor for DocumentBuilder<'_> {
	fn on_resource(&mut self, event: &mut ResourceEvent<'_>) -> Option<String> {
		let region = *self.regions.last()?;

		match (event.kind, region) {
			(_, Region::Ignore) => None,
			(ResourceKind::Textarea, Region::Template(index)) => {
				let fragment = Self::fragment(event);
				let explorer = &mut self.document.templates[index].explorer;
				if event.config.non_empty("data-src").is_some() {
					explorer.externals.push(fragment);
				} else {
					explorer.templates.push(fragment);
				}
				Some(String::new())
			}
			(ResourceKind::Textarea, Region::Module) => {
				let fragment = Self::fragment(event);
				self.document
					.modules
					.get_or_insert_with(Explorer::new)
					.templates
					.push(fragment);
				Some(String::new())
			}
			(ResourceKind::Textarea, _) => None,
			(ResourceKind::Style, Region::Style) => {
				let id = self.resource_id(ResourceType::Style, event)?;
				self.document.page.add(ResourceType::Style, id);
				Some(String::new())
			}
			(ResourceKind::Script, Region::Script) => {
				let id = self.resource_id(ResourceType::Script, event)?;
				self.document.page.add(ResourceType::Script, id);
				Some(String::new())
			}
			(ResourceKind::Style, Region::Template(index)) => {
				let id = self.resource_id(ResourceType::Style, event)?;
				self.document.templates[index]
					.explorer
					.add(ResourceType::Style, id);
				Some(String::new())
			}
			(ResourceKind::Script, Region::Template(index)) => {
				let id = self.resource_id(ResourceType::Script, event)?;
				self.document.templates[index]
					.explorer
					.add(ResourceType::Script, id);
				Some(String::new())
			}
			(ResourceKind::Script, Region::Merge(index)) => {
				let id = self.resource_id(ResourceType::Script, event)?;
				let scripts = &mut self.document.merge_groups[index].scripts;
				if !scripts.contains(&id) {
					scripts.push(id);
				}
				Some(String::new())
			}
			(ResourceKind::Style | ResourceKind::Script, _) => None,
		}
	}

	fn on_instruction(&mut self, mut event: InstructionEvent<'_>) {
		let directive = event.directive.clone();
		if directive.closed {
			self.close_region(&directive, &mut event);
		} else {
			self.open_region(&directive, &mut event);
		}
	}
}

fn is_known_command(command: &str) -> bool {
	matches!(
		command,
		"STYLE" | "SCRIPT" | "TEMPLATE" | "MODULE" | "MERGE" | "IGNORE"
	)
}

/// Resolve `.` and `..` segments of a `/`-separated path.
pub fn normalize_segments(path: &str) -> String {
	let absolute = path.starts_with('/');
	let mut parts: Vec<&str> = vec![];

	for segment in path.split('/') {
		match segment {
			"" | "." => {}
			".." => {
				parts.pop();
			}
			_ => parts.push(segment),
		}
	}

	let joined = parts.join("/");
	if absolute { format!("/{joined}") } else { joined }
}

/// Parse `content` into a [`Document`].
///
/// Inline style and script bodies inside directive regions are stored in
/// `cache` under `<file>#style<n>` and `<file>#script<n>`.
pub fn build_document(
	file: &str,
	content: &str,
	kind: DocumentKind,
	web_root: &str,
	cache: &mut dyn ContentCache,
) -> PackResult<Document> {
	let builder = DocumentBuilder::new(file, kind, web_root, cache);
	let (buffer, builder) = scan_markup(content, file, builder)?;
	let document = builder.finish(buffer);

	debug!(
		file,
		styles = document.page.styles.len(),
		scripts = document.page.scripts.len(),
		templates = document.templates.len(),
		"parsed document"
	);

	Ok(document)
}
