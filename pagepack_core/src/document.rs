use serde::Deserialize;
use serde::Serialize;

use crate::tokens::Buffer;

/// Whether a document is a plain html page or a server template.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DocumentKind {
	Page,
	Template,
}

impl DocumentKind {
	/// The prefix of bundle names derived from documents of this kind.
	pub fn prefix(self) -> &'static str {
		match self {
			Self::Page => "p",
			Self::Template => "t",
		}
	}
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ResourceType {
	Style,
	Script,
}

impl ResourceType {
	pub fn suffix(self) -> &'static str {
		match self {
			Self::Style => ".css",
			Self::Script => ".js",
		}
	}
}

/// Per-document configuration of the style or script bundle.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceConfig {
	/// The output name shared by the page and template bundles, e.g.
	/// `p_user_index`. Set by the merge step.
	pub filename: String,
	/// `Some(false)` excludes the document from core merging. Becomes
	/// `Some(true)` once any dependency moved into the core bundle.
	pub core: Option<bool>,
	/// Inline the core bundle instead of linking it.
	pub inline: bool,
}

/// A text or module template kept for re-insertion.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TemplateFragment {
	/// The `id` (or `name`) of the textarea that held the template.
	pub id: String,
	/// The textarea body.
	pub content: String,
	/// The full textarea markup as written.
	pub markup: String,
}

/// Dependency-ordered resources discovered in one region of a document.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Explorer {
	pub styles: Vec<String>,
	pub scripts: Vec<String>,
	pub templates: Vec<TemplateFragment>,
	/// Templates loaded at runtime from their `data-src`, kept as written.
	pub externals: Vec<TemplateFragment>,
}

impl Explorer {
	pub fn new() -> Self {
		Self::default()
	}

	/// Append a dependency unless it is already listed.
	pub fn add(&mut self, res_type: ResourceType, id: impl Into<String>) {
		let id = id.into();
		let list = match res_type {
			ResourceType::Style => &mut self.styles,
			ResourceType::Script => &mut self.scripts,
		};
		if !list.contains(&id) {
			list.push(id);
		}
	}

	pub fn dependencies(&self, res_type: ResourceType) -> &[String] {
		match res_type {
			ResourceType::Style => &self.styles,
			ResourceType::Script => &self.scripts,
		}
	}

	/// The text templates as written, one per line.
	pub fn stringify_texts(&self) -> String {
		join_markup(&self.templates)
	}

	/// The external template references as written, one per line.
	pub fn stringify_externals(&self) -> String {
		join_markup(&self.externals)
	}

	/// Every template rendered through `wrap`, which receives the id then the
	/// content.
	pub fn stringify_templates(&self, wrap: &str) -> String {
		self.templates
			.iter()
			.map(|template| {
				crate::embed::format_wrap(wrap, &[&template.id, &template.content])
			})
			.collect::<Vec<_>>()
			.join("\n")
	}
}

fn join_markup(fragments: &[TemplateFragment]) -> String {
	fragments
		.iter()
		.map(|fragment| fragment.markup.as_str())
		.collect::<Vec<_>>()
		.join("\n")
}

/// A `@TEMPLATE` region and the buffer entry it is written back to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TemplateRegion {
	pub pointer: usize,
	pub explorer: Explorer,
}

/// Rendered template-level bundles, filled by the embed step.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TemplateConfig {
	pub styles: Option<String>,
	pub scripts: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MergeGroupConfig {
	/// Bundle name. Defaults to `<output name>_m<index>`.
	pub name: Option<String>,
	pub minify: bool,
}

/// A `@MERGE` region: scripts concatenated into one bundle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MergeGroup {
	pub pointer: Option<usize>,
	pub scripts: Vec<String>,
	pub config: MergeGroupConfig,
}

/// The resource model of one parsed document.
///
/// Built by [`crate::builder::DocumentBuilder`] and mutated in place by the
/// merge, embed and output steps. Each insertion point is an index into
/// `buffer`; `None` means absent or already consumed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
	/// Absolute path with `/` separators.
	pub file: String,
	pub kind: DocumentKind,
	pub buffer: Buffer,
	pub style_config: Option<ResourceConfig>,
	pub script_config: Option<ResourceConfig>,
	/// Page-level dependencies.
	pub page: Explorer,
	pub templates: Vec<TemplateRegion>,
	pub template_config: TemplateConfig,
	pub modules: Option<Explorer>,
	pub style_point: Option<usize>,
	pub script_point: Option<usize>,
	pub module_point: Option<usize>,
	pub merge_groups: Vec<MergeGroup>,
}

impl Document {
	pub fn new(file: impl Into<String>, kind: DocumentKind) -> Self {
		Self {
			file: file.into(),
			kind,
			buffer: Buffer::new(),
			style_config: None,
			script_config: None,
			page: Explorer::new(),
			templates: vec![],
			template_config: TemplateConfig::default(),
			modules: None,
			style_point: None,
			script_point: None,
			module_point: None,
			merge_groups: vec![],
		}
	}

	pub fn is_template(&self) -> bool {
		self.kind == DocumentKind::Template
	}

	pub fn config(&self, res_type: ResourceType) -> Option<&ResourceConfig> {
		match res_type {
			ResourceType::Style => self.style_config.as_ref(),
			ResourceType::Script => self.script_config.as_ref(),
		}
	}

	pub fn config_mut(&mut self, res_type: ResourceType) -> Option<&mut ResourceConfig> {
		match res_type {
			ResourceType::Style => self.style_config.as_mut(),
			ResourceType::Script => self.script_config.as_mut(),
		}
	}

	/// The insertion point for the style or script block.
	pub fn point_mut(&mut self, res_type: ResourceType) -> &mut Option<usize> {
		match res_type {
			ResourceType::Style => &mut self.style_point,
			ResourceType::Script => &mut self.script_point,
		}
	}

	/// Serialise the buffer.
	pub fn stringify(&self) -> String {
		self.buffer.stringify()
	}

	/// Visit every buffer entry in order.
	pub fn scan<F>(&mut self, mut callback: F)
	where
		F: FnMut(usize, &mut String),
	{
		for (index, entry) in self.buffer.iter_mut().enumerate() {
			callback(index, entry);
		}
	}
}
