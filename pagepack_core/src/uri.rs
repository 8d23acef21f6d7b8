//! Tagged uri resolution.
//!
//! Content written by the embed stage refers to resources with a tagged
//! mini-syntax such as `<js:pp_index>` or `<rs:/abs/src/img/a.png>`. Before a
//! document is written every occurrence is replaced by the final, versioned
//! and domain-rotated url.

use std::fmt::Display;

use serde::Deserialize;
use sha2::Digest;
use sha2::Sha256;
use tracing::debug;

use crate::PackError;
use crate::PackResult;
use crate::cache::ContentCache;
use crate::config::PackConfig;
use crate::config::ResolvedDirs;

/// Longest accepted type tag, e.g. the `path` in `<path:...>`.
const MAX_TYPE_LEN: usize = 8;

/// SHA-256 of `bytes` as lower-case hex.
pub fn content_hash(bytes: &[u8]) -> String {
	format!("{:x}", Sha256::digest(bytes))
}

/// The resource types understood inside a tagged uri.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UriType {
	/// `rs`: a generic static resource.
	Resource,
	/// `cs`: a stylesheet bundle.
	Style,
	/// `js`: a script bundle.
	Script,
	/// `sm`: a plain path rewrite.
	Sitemap,
	/// `mf`: the application cache manifest.
	Manifest,
	/// `mdl`: a page used as a module template.
	Module,
	/// `umi`: an internal module id.
	ModuleId,
	/// `path`: source root to output root, web root to `/`.
	Path,
}

impl UriType {
	pub fn parse(tag: &str) -> Option<Self> {
		let kind = match tag {
			"rs" => Self::Resource,
			"cs" => Self::Style,
			"js" => Self::Script,
			"sm" => Self::Sitemap,
			"mf" => Self::Manifest,
			"mdl" => Self::Module,
			"umi" => Self::ModuleId,
			"path" => Self::Path,
			_ => return None,
		};
		Some(kind)
	}

	pub fn as_str(self) -> &'static str {
		match self {
			Self::Resource => "rs",
			Self::Style => "cs",
			Self::Script => "js",
			Self::Sitemap => "sm",
			Self::Manifest => "mf",
			Self::Module => "mdl",
			Self::ModuleId => "umi",
			Self::Path => "path",
		}
	}
}

impl Display for UriType {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.write_str(self.as_str())
	}
}

/// Wrap `uri` as a tagged reference: `<type:uri>`.
pub fn wrap_uri(kind: UriType, uri: &str) -> String {
	format!("<{kind}:{uri}>")
}

fn is_uri_byte(byte: u8) -> bool {
	!byte.is_ascii_whitespace() && !matches!(byte, b'"' | b'\'' | b'<' | b'>')
}

/// Match a tagged uri at the start of `text`. Returns the type tag, the uri
/// and the byte length of the whole reference.
fn match_tagged(text: &str) -> Option<(&str, &str, usize)> {
	let bytes = text.as_bytes();
	if bytes.first() != Some(&b'<') {
		return None;
	}

	let type_len = bytes[1..]
		.iter()
		.position(|byte| !byte.is_ascii_alphabetic())
		.unwrap_or(bytes.len() - 1);
	if type_len == 0 || type_len > MAX_TYPE_LEN || bytes.get(1 + type_len) != Some(&b':') {
		return None;
	}

	let uri_start = 2 + type_len;
	let uri_len = bytes[uri_start..]
		.iter()
		.position(|byte| !is_uri_byte(*byte))
		.unwrap_or(bytes.len() - uri_start);
	if uri_len == 0 || bytes.get(uri_start + uri_len) != Some(&b'>') {
		return None;
	}

	Some((
		&text[1..=type_len],
		&text[uri_start..uri_start + uri_len],
		uri_start + uri_len + 1,
	))
}

/// Replace every tagged uri in `content` with the value returned by
/// `resolve`.
pub fn unwrap_uris<F>(content: &str, mut resolve: F) -> PackResult<String>
where
	F: FnMut(&str, &str) -> PackResult<String>,
{
	let mut result = String::with_capacity(content.len());
	let mut cursor = 0;

	while let Some(offset) = content[cursor..].find('<') {
		let start = cursor + offset;
		result.push_str(&content[cursor..start]);

		match match_tagged(&content[start..]) {
			Some((kind, uri, len)) => {
				result.push_str(&resolve(kind, uri)?);
				cursor = start + len;
			}
			None => {
				result.push('<');
				cursor = start + 1;
			}
		}
	}

	result.push_str(&content[cursor..]);
	Ok(result)
}

/// How a bundle's output file name and version query are derived.
///
/// Configured as a string: `"query"`, `"filename"`, `"counter"` or a
/// pattern using `[FILENAME]`, `[VERSION]` and `[RAND]` where a `?`
/// separates the file name from the query, e.g. `"[FILENAME]_[VERSION]"`
/// or `"[FILENAME]?v=[RAND]"`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(from = "String")]
pub enum VersionMode {
	/// `name.js?<hash>`
	#[default]
	Query,
	/// `<hash>.js`
	Filename,
	/// `name.js?<counter>`
	Counter,
	Pattern(String),
}

impl From<String> for VersionMode {
	fn from(value: String) -> Self {
		match value.as_str() {
			"query" | "" => Self::Query,
			"filename" => Self::Filename,
			"counter" => Self::Counter,
			_ => Self::Pattern(value),
		}
	}
}

/// A versioned output name. `version` is empty when no query is appended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Versioned {
	pub file: String,
	pub version: String,
}

impl VersionMode {
	pub fn apply(&self, filename: &str, hash: &str, counter: u64) -> Versioned {
		match self {
			Self::Query => {
				Versioned {
					file: filename.to_string(),
					version: hash.to_string(),
				}
			}
			Self::Filename => {
				Versioned {
					file: hash.to_string(),
					version: String::new(),
				}
			}
			Self::Counter => {
				Versioned {
					file: filename.to_string(),
					version: counter.to_string(),
				}
			}
			Self::Pattern(pattern) => {
				let expanded = pattern
					.replace("[FILENAME]", filename)
					.replace("[VERSION]", hash)
					.replace("[RAND]", &counter.to_string());
				let (file, version) = expanded.split_once('?').unwrap_or((&expanded, ""));
				let file = if file.is_empty() { filename } else { file };

				Versioned {
					file: file.to_string(),
					version: version.to_string(),
				}
			}
		}
	}
}

/// A list of domains handed out in rotation.
#[derive(Debug, Clone, Default)]
pub struct DomainPool {
	domains: Vec<String>,
	next: usize,
}

impl DomainPool {
	/// Every domain is normalised to end with `/`.
	pub fn new(domains: &[String]) -> Self {
		Self {
			domains: domains
				.iter()
				.filter(|domain| !domain.is_empty())
				.map(|domain| {
					if domain.ends_with('/') {
						domain.clone()
					} else {
						format!("{domain}/")
					}
				})
				.collect(),
			next: 0,
		}
	}

	/// The next domain, or `None` for an empty pool.
	pub fn next_domain(&mut self) -> Option<String> {
		let domain = self.domains.get(self.next % self.domains.len().max(1))?.clone();
		self.next = (self.next + 1) % self.domains.len();
		Some(domain)
	}
}

/// Which pool [`UriFormatter::format_uri`] draws from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Pool {
	Resource,
	Style,
	Script,
	Module,
	Manifest,
	/// No domain pool.
	Relative,
}

/// Where the content being formatted will be written.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FormatContext {
	/// Output path of the file holding the references.
	pub output: String,
	/// `false` while formatting a bundle referenced from a page.
	pub from_page: bool,
	/// `true` when the referencing document is a server template.
	pub is_template: bool,
}

/// Resolves tagged uris for the documents of one build.
#[derive(Debug)]
pub struct UriFormatter {
	dirs: ResolvedDirs,
	charset: String,
	mode: VersionMode,
	static_resources: bool,
	resource: DomainPool,
	style: DomainPool,
	script: DomainPool,
	module: DomainPool,
	manifest: DomainPool,
	counter: u64,
}

impl UriFormatter {
	pub fn new(config: &PackConfig, dirs: ResolvedDirs) -> Self {
		Self {
			dirs,
			charset: config.charset.clone(),
			mode: config.version.mode.clone(),
			static_resources: config.version.static_resources,
			resource: DomainPool::new(&config.domains.resource),
			style: DomainPool::new(&config.domains.style),
			script: DomainPool::new(&config.domains.script),
			module: DomainPool::new(&config.domains.module),
			manifest: DomainPool::new(&config.domains.manifest),
			counter: 0,
		}
	}

	pub fn dirs(&self) -> &ResolvedDirs {
		&self.dirs
	}

	/// Resolve every tagged uri in `content`. Unknown types yield the bare
	/// uri.
	pub fn format_content(
		&mut self,
		content: &str,
		context: &FormatContext,
		cache: &mut dyn ContentCache,
	) -> PackResult<String> {
		unwrap_uris(content, |kind, uri| {
			match UriType::parse(kind) {
				Some(kind) => self.resolve(kind, uri, context, cache),
				None => Ok(uri.to_string()),
			}
		})
	}

	/// Resolve a single reference.
	pub fn resolve(
		&mut self,
		kind: UriType,
		uri: &str,
		context: &FormatContext,
		cache: &mut dyn ContentCache,
	) -> PackResult<String> {
		let output = context.output.as_str();
		let is_template = context.is_template;

		match kind {
			UriType::Resource => Ok(self.format_resource(uri, context, cache)),
			UriType::Style => self.format_bundle(uri, ".css", Pool::Style, context, cache),
			UriType::Script => self.format_bundle(uri, ".js", Pool::Script, context, cache),
			UriType::Sitemap => {
				Ok(self.format_uri(uri, output, context.from_page, is_template, Pool::Relative))
			}
			UriType::Manifest => {
				cache.mark_manifested();
				let target = self.dirs.manifest_output.clone();
				Ok(self.format_uri(&target, output, true, is_template, Pool::Manifest))
			}
			UriType::Module => {
				let target = uri.replacen(&self.dirs.source, &self.dirs.html_output, 1);
				Ok(self.format_uri(&target, output, true, is_template, Pool::Module))
			}
			UriType::ModuleId => {
				Ok(format!(
					"umi://{}",
					uri.replacen(&self.dirs.module_source, "", 1)
				))
			}
			UriType::Path => {
				Ok(uri
					.replacen(&self.dirs.source, &self.dirs.html_output, 1)
					.replacen(&self.dirs.web, "/", 1))
			}
		}
	}

	/// Turn an absolute path into the url written into `output`.
	///
	/// A server template with no configured domain uses `/` for the web root.
	/// Without any domain the result is relative to the directory of
	/// `output`.
	pub fn format_uri(
		&mut self,
		uri: &str,
		output: &str,
		from_page: bool,
		is_template: bool,
		pool: Pool,
	) -> String {
		let pool = match pool {
			Pool::Resource => Some(&mut self.resource),
			Pool::Style => Some(&mut self.style),
			Pool::Script => Some(&mut self.script),
			Pool::Module => Some(&mut self.module),
			Pool::Manifest => Some(&mut self.manifest),
			Pool::Relative => None,
		};

		let domain = pool.and_then(DomainPool::next_domain).or_else(|| {
			(from_page && is_template).then(|| "/".to_string())
		});

		match domain {
			Some(domain) => uri.replacen(&self.dirs.web, &domain, 1),
			None => {
				let relative = relative_path(parent_dir(output), uri);
				if relative.starts_with('.') {
					relative
				} else {
					format!("./{relative}")
				}
			}
		}
	}

	/// `<rs:path?query>`: hash the raw file, record it in the manifest and
	/// rewrite its path.
	fn format_resource(
		&mut self,
		uri: &str,
		context: &FormatContext,
		cache: &mut dyn ContentCache,
	) -> String {
		let (path, query) = match uri.split_once('?') {
			Some((path, query)) => (path, Some(query.to_string())),
			None => (uri, None),
		};

		let version = content_hash(&cache.raw(path));
		cache.resource(&path.replacen(&self.dirs.web, "/", 1), &version);

		let query = query.or_else(|| self.static_resources.then_some(version));
		let path = self.format_uri(
			path,
			&context.output,
			context.from_page,
			context.is_template,
			Pool::Resource,
		);

		match query {
			Some(query) => format!("{path}?{query}"),
			None => path,
		}
	}

	/// `<cs:name>` / `<js:name>`: format the cached bundle, write it under
	/// the static output root and return its versioned url.
	fn format_bundle(
		&mut self,
		name: &str,
		suffix: &str,
		pool: Pool,
		context: &FormatContext,
		cache: &mut dyn ContentCache,
	) -> PackResult<String> {
		let key = format!("{name}{suffix}");
		let content = cache
			.get(&key)
			.ok_or_else(|| PackError::MissingBundle(key.clone()))?
			.to_string();

		let nested = FormatContext {
			output: format!("{}{key}", self.dirs.static_output),
			from_page: false,
			is_template: context.is_template,
		};
		let content = self.format_content(&content, &nested, cache)?;

		let hash = content_hash(content.as_bytes());
		self.counter += 1;
		let versioned = self.mode.apply(name, &hash, self.counter);

		let file = format!("{}{}{suffix}", self.dirs.static_output, versioned.file);
		debug!(file = %file, "output bundle");
		let charset = self.charset.clone();
		cache.output(&file, content, &charset);
		cache.resource(&file.replacen(&self.dirs.web, "/", 1), &hash);

		let uri = self.format_uri(&file, &context.output, true, context.is_template, pool);
		if versioned.version.is_empty() {
			Ok(uri)
		} else {
			Ok(format!("{uri}?{}", versioned.version))
		}
	}
}

/// The directory part of a `/`-separated path.
fn parent_dir(path: &str) -> &str {
	path.rfind('/').map_or("", |index| &path[..index])
}

/// The path of `to` relative to the directory `from`, both `/`-separated.
pub fn relative_path(from: &str, to: &str) -> String {
	let from: Vec<&str> = from.split('/').filter(|part| !part.is_empty()).collect();
	let to: Vec<&str> = to.split('/').filter(|part| !part.is_empty()).collect();

	let common = from
		.iter()
		.zip(&to)
		.take_while(|(a, b)| a == b)
		.count();

	let mut parts: Vec<&str> = vec![".."; from.len() - common];
	parts.extend(&to[common..]);
	parts.join("/")
}
