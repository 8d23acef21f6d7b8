use tracing::debug;
use tracing::warn;

use crate::cache::ContentCache;
use crate::document::Document;
use crate::document::DocumentKind;
use crate::document::ResourceType;
use crate::document::TemplateFragment;

/// Which dependency lists [`dependencies`] collects.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ListType {
	/// Page-level and template-level resources.
	All,
	/// Page-level resources only.
	Resources,
	/// Template-level resources not already listed at page level.
	Templates,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DependencyQuery {
	pub res_type: ResourceType,
	pub list_type: ListType,
	/// Return nothing for documents with `core: false`.
	pub check_core_config: bool,
	/// Skip the document's own inline bodies, cached as `<file>#style<n>`
	/// and `<file>#script<n>`.
	pub ignore_entry: bool,
}

impl DependencyQuery {
	pub fn new(res_type: ResourceType, list_type: ListType) -> Self {
		Self {
			res_type,
			list_type,
			check_core_config: false,
			ignore_entry: false,
		}
	}
}

/// The logical bundle name of a document: its path relative to `root` with
/// the extension dropped, separators replaced by `_` and prefixed with `p_`
/// for pages or `t_` for server templates.
///
/// `/w/src/html/user/index.html` under `/w/src/` becomes
/// `p_html_user_index`.
pub fn output_name(file: &str, root: &str, kind: DocumentKind) -> String {
	let relative = file.strip_prefix(root).unwrap_or(file);
	let relative = relative.trim_start_matches('/');

	let file_name_start = relative.rfind('/').map_or(0, |index| index + 1);
	let stem = match relative[file_name_start..].rfind('.') {
		Some(dot) if dot > 0 => &relative[..file_name_start + dot],
		_ => relative,
	};

	format!("{}_{}", kind.prefix(), stem.replace(['/', '\\'], "_"))
}

/// Store the output name on both resource configs.
pub fn begin_merge(document: &mut Document, root: &str) {
	let name = output_name(&document.file, root, document.kind);
	for config in [&mut document.style_config, &mut document.script_config]
		.into_iter()
		.flatten()
	{
		config.filename.clone_from(&name);
	}
}

/// The flattened dependency list of one resource type.
///
/// Documents without a config for the type yield an empty list.
pub fn dependencies(document: &Document, query: DependencyQuery) -> Vec<String> {
	let Some(config) = document.config(query.res_type) else {
		warn!(
			file = %document.file,
			res_type = ?query.res_type,
			"no resource config for document"
		);
		return vec![];
	};

	if query.check_core_config && config.core == Some(false) {
		return vec![];
	}

	let page = document.page.dependencies(query.res_type);
	let mut result: Vec<String> = vec![];

	if matches!(query.list_type, ListType::All | ListType::Resources) {
		result.extend(page.iter().cloned());
	}

	if matches!(query.list_type, ListType::All | ListType::Templates) {
		for region in &document.templates {
			let list = region.explorer.dependencies(query.res_type);
			if query.list_type == ListType::Templates {
				result.extend(list.iter().filter(|id| !page.contains(id)).cloned());
			} else {
				result.extend(list.iter().cloned());
			}
		}
	}

	if query.ignore_entry {
		let entry_prefix = format!("{}#", document.file);
		result.retain(|id| !id.starts_with(&entry_prefix));
	}

	result
}

/// Every text template and external template reference of `document`: the
/// module templates first, then each `@TEMPLATE` region in order.
pub fn template_dependencies(document: &Document) -> Vec<&TemplateFragment> {
	document
		.modules
		.iter()
		.chain(document.templates.iter().map(|region| &region.explorer))
		.flat_map(|explorer| explorer.templates.iter().chain(&explorer.externals))
		.collect()
}

/// Remove every entry of `core` from `list` in place and return the removed
/// entries.
pub fn split(list: &mut Vec<String>, core: &[String]) -> Vec<String> {
	let (removed, kept): (Vec<String>, Vec<String>) =
		list.drain(..).partition(|id| core.contains(id));
	*list = kept;
	removed
}

/// Merge the style dependencies of `document` into `p…css`/`t…css` bundles.
pub fn merge_style(
	document: &mut Document,
	core: &[String],
	cache: &mut dyn ContentCache,
) -> Vec<String> {
	merge_resource(document, ResourceType::Style, core, cache)
}

/// Merge the script dependencies of `document` into `p…js`/`t…js` bundles.
pub fn merge_script(
	document: &mut Document,
	core: &[String],
	cache: &mut dyn ContentCache,
) -> Vec<String> {
	merge_resource(document, ResourceType::Script, core, cache)
}

/// Split the page and template lists against `core`, then cache the
/// remainders. Returns the cache keys of the bundles created.
fn merge_resource(
	document: &mut Document,
	res_type: ResourceType,
	core: &[String],
	cache: &mut dyn ContentCache,
) -> Vec<String> {
	if document.config(res_type).is_none() {
		warn!(
			file = %document.file,
			?res_type,
			"no resource config for document"
		);
		return vec![];
	}

	let mut resources = dependencies(document, DependencyQuery::new(res_type, ListType::Resources));
	let mut templates = dependencies(document, DependencyQuery::new(res_type, ListType::Templates));

	let Some(config) = document.config_mut(res_type) else {
		return vec![];
	};

	if config.core != Some(false) {
		for list in [&mut resources, &mut templates] {
			if !split(list, core).is_empty() {
				config.core = Some(true);
			}
		}
	}

	let root = format!("{}{}", config.filename, res_type.suffix());
	let mut bundles = vec![];

	for (prefix, list) in [("p", &resources), ("t", &templates)] {
		if list.is_empty() {
			continue;
		}

		let name = format!("{prefix}{root}");
		let content = cache.fill(list);
		cache.cache(&name, content);
		debug!(bundle = %name, members = ?list, "cached bundle");
		bundles.push(name);
	}

	bundles
}
