use tracing::debug;

use crate::PackResult;
use crate::cache::ContentCache;
use crate::config::EmbedConfig;
use crate::document::Document;
use crate::document::ResourceType;
use crate::lexer::find_ignore_ascii_case;
use crate::merge::output_name;
use crate::minify::Minifier;
use crate::uri::UriType;
use crate::uri::wrap_uri;

/// Name of the shared bundle in every bundle list.
pub const CORE_BUNDLE: &str = "core";

/// Wrapper for module templates: the textarea id, then its content.
pub const MODULE_WRAP: &str = "<div style=\"display:none\" id=\"%s\">\n%s\n</div>";

/// Substitute each `%s` in `template` with the next entry of `args`.
/// Placeholders without an argument are kept.
pub fn format_wrap(template: &str, args: &[&str]) -> String {
	let mut result = String::with_capacity(template.len());
	let mut rest = template;

	for arg in args {
		let Some(index) = rest.find("%s") else {
			break;
		};
		result.push_str(&rest[..index]);
		result.push_str(arg);
		rest = &rest[index + 2..];
	}

	result.push_str(rest);
	result
}

/// Escape every `</name>` in `content` as `<&#47;name>`, keeping the case of
/// the name as written.
pub fn escape_closing_tag(content: &str, name: &str) -> String {
	let needle = format!("</{name}>");
	let mut result = String::with_capacity(content.len());
	let mut rest = content;

	while let Some(index) = find_ignore_ascii_case(rest, &needle) {
		let matched = &rest[index + 2..index + needle.len() - 1];
		result.push_str(&rest[..index]);
		result.push_str("<&#47;");
		result.push_str(matched);
		result.push('>');
		rest = &rest[index + needle.len()..];
	}

	result.push_str(rest);
	result
}

/// The name of the first closing tag in a wrapper, e.g. `textarea` for
/// `<textarea name="txt">%s</textarea>`.
fn closing_tag_name(wrap: &str) -> Option<&str> {
	let start = wrap.find("</")? + 2;
	let end = wrap[start..].find('>')? + start;
	(end > start).then(|| &wrap[start..end])
}

/// How the members of one bundle list are written.
struct EmbedSpec<'a> {
	uri_type: UriType,
	suffix: &'static str,
	inline: &'a str,
	external: &'a str,
	/// Closing tag escaped inside inlined content.
	escape: Option<&'a str>,
	/// Inline decision for the `core` member.
	core_inline: bool,
	max_bytes: usize,
}

impl<'a> EmbedSpec<'a> {
	fn page(res_type: ResourceType, config: &'a EmbedConfig, core_inline: bool) -> Self {
		match res_type {
			ResourceType::Style => {
				Self {
					uri_type: UriType::Style,
					suffix: res_type.suffix(),
					inline: &config.inline_style,
					external: &config.external_style,
					escape: None,
					core_inline,
					max_bytes: config.max_bytes(),
				}
			}
			ResourceType::Script => {
				Self {
					uri_type: UriType::Script,
					suffix: res_type.suffix(),
					inline: &config.inline_script,
					external: &config.external_script,
					escape: Some("script"),
					core_inline,
					max_bytes: config.max_bytes(),
				}
			}
		}
	}

	fn template(res_type: ResourceType, config: &'a EmbedConfig) -> Self {
		let (uri_type, escape) = match res_type {
			ResourceType::Style => (UriType::Style, None),
			ResourceType::Script => (UriType::Script, closing_tag_name(&config.inline_wrap)),
		};

		Self {
			uri_type,
			suffix: res_type.suffix(),
			inline: &config.inline_wrap,
			external: &config.external_wrap,
			escape,
			core_inline: false,
			max_bytes: config.max_bytes(),
		}
	}

	/// Render every cached member of `names`. Members without cached content
	/// are skipped.
	fn render(&self, names: &[String], cache: &dyn ContentCache) -> Vec<String> {
		let mut result = vec![];

		for name in names {
			let Some(content) = cache.get(&format!("{name}{}", self.suffix)) else {
				continue;
			};

			let inlined = if name == CORE_BUNDLE {
				self.core_inline
			} else {
				content.len() <= self.max_bytes
			};

			if inlined {
				let content = match self.escape {
					Some(tag) => escape_closing_tag(content, tag),
					None => content.to_string(),
				};
				result.push(format_wrap(self.inline, &[&content]));
			} else {
				result.push(format_wrap(self.external, &[&wrap_uri(self.uri_type, name)]));
			}
		}

		result
	}
}

/// Server templates wrap every inserted block in `source_wrap`; pages use
/// the block as is.
fn source_wrapper<'a>(document: &Document, config: &'a EmbedConfig) -> &'a str {
	if document.is_template() && !config.source_wrap.is_empty() {
		&config.source_wrap
	} else {
		"%s"
	}
}

/// Write the `[core?, p<filename>]` bundles at the style or script
/// insertion point, consuming it.
fn embed_resource(
	document: &mut Document,
	res_type: ResourceType,
	config: &EmbedConfig,
	cache: &dyn ContentCache,
) {
	let Some(pointer) = document.point_mut(res_type).take() else {
		return;
	};
	let Some(resource) = document.config(res_type) else {
		return;
	};

	let mut names = vec![];
	if resource.core == Some(true) {
		names.push(CORE_BUNDLE.to_string());
	}
	names.push(format!("p{}", resource.filename));

	let spec = EmbedSpec::page(res_type, config, resource.inline);
	let block = spec.render(&names, cache).join("\n");
	let wrapped = format_wrap(source_wrapper(document, config), &[&block]);

	if let Some(entry) = document.buffer.get_mut(pointer) {
		*entry = wrapped;
	}
}

/// Render the `t<filename>` bundle into the template section.
fn embed_template_bundle(
	document: &mut Document,
	res_type: ResourceType,
	config: &EmbedConfig,
	cache: &dyn ContentCache,
) {
	let Some(resource) = document.config(res_type) else {
		return;
	};

	let names = [format!("t{}", resource.filename)];
	let rendered = EmbedSpec::template(res_type, config).render(&names, cache);
	if rendered.is_empty() {
		return;
	}

	let section = Some(rendered.join("\n"));
	match res_type {
		ResourceType::Style => document.template_config.styles = section,
		ResourceType::Script => document.template_config.scripts = section,
	}
}

/// Embed the style bundles at the style insertion point and render the
/// template-level style section.
pub fn embed_style(document: &mut Document, config: &EmbedConfig, cache: &dyn ContentCache) {
	embed_resource(document, ResourceType::Style, config, cache);
	embed_template_bundle(document, ResourceType::Style, config, cache);
}

/// Embed the script bundles at the script insertion point and render the
/// template-level script section.
pub fn embed_script(document: &mut Document, config: &EmbedConfig, cache: &dyn ContentCache) {
	embed_resource(document, ResourceType::Script, config, cache);
	embed_template_bundle(document, ResourceType::Script, config, cache);
}

/// Concatenate, optionally minify, cache and embed every `@MERGE` group.
///
/// Groups without a name are called `<output name>_m<index>`. Each group's
/// insertion point is consumed, so a group is only embedded once. Minifier
/// failures are returned unchanged.
pub fn embed_merge_groups(
	document: &mut Document,
	root: &str,
	config: &EmbedConfig,
	minifier: &dyn Minifier,
	cache: &mut dyn ContentCache,
) -> PackResult<()> {
	let default_name = output_name(&document.file, root, document.kind);
	let wrapper = source_wrapper(document, config).to_string();
	let spec = EmbedSpec::page(ResourceType::Script, config, false);

	for (index, group) in document.merge_groups.iter_mut().enumerate() {
		let Some(pointer) = group.pointer.take() else {
			continue;
		};
		let name = group
			.config
			.name
			.get_or_insert_with(|| format!("{default_name}_m{index}"))
			.clone();

		let mut content = cache.fill(&group.scripts);
		if group.config.minify {
			content = minifier.minify(&name, &content)?;
		}
		cache.cache(&format!("{name}.js"), content);

		let block = spec.render(std::slice::from_ref(&name), cache).join("\n");
		if let Some(entry) = document.buffer.get_mut(pointer) {
			*entry = format_wrap(&wrapper, &[&block]);
		}

		debug!(bundle = %name, members = ?group.scripts, "merged script group");
	}

	Ok(())
}

/// Write every `@TEMPLATE` region and the module templates back into the
/// buffer.
///
/// Each template region receives its text templates, the rendered style
/// section, the rendered script section and its external template
/// references, joined by `\n`. The template list is cleared afterwards, so
/// a second call does nothing.
pub fn embed_template(document: &mut Document, config: &EmbedConfig) {
	inline_templates(document);
	inline_modules(document, config);
}

fn inline_templates(document: &mut Document) {
	if document.templates.is_empty() {
		return;
	}

	let regions = std::mem::take(&mut document.templates);
	for region in regions {
		let mut parts = vec![];

		let texts = region.explorer.stringify_texts();
		if !texts.is_empty() {
			parts.push(texts);
		}
		if let Some(styles) = document.template_config.styles.as_ref().filter(|s| !s.is_empty()) {
			parts.push(styles.clone());
		}
		if let Some(scripts) = document.template_config.scripts.as_ref().filter(|s| !s.is_empty()) {
			parts.push(scripts.clone());
		}
		let externals = region.explorer.stringify_externals();
		if !externals.is_empty() {
			parts.push(externals);
		}

		if let Some(entry) = document.buffer.get_mut(region.pointer) {
			*entry = parts.join("\n");
		}
	}
}

fn inline_modules(document: &mut Document, config: &EmbedConfig) {
	let Some(pointer) = document.module_point.take() else {
		return;
	};
	let Some(modules) = document.modules.as_ref() else {
		return;
	};

	let content = modules.stringify_templates(MODULE_WRAP);
	if content.is_empty() {
		return;
	}

	let wrapped = format_wrap(source_wrapper(document, config), &[&content]);
	if let Some(entry) = document.buffer.get_mut(pointer) {
		*entry = wrapped;
	}
}
