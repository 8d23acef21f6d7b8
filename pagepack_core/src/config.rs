use std::path::Path;
use std::path::PathBuf;

use serde::Deserialize;

use crate::PackError;
use crate::PackResult;
use crate::uri::VersionMode;

/// Supported config file locations in discovery order (highest precedence
/// first).
pub const CONFIG_FILE_CANDIDATES: [&str; 3] = [
	"pagepack.toml",
	".pagepack.toml",
	".config/pagepack.toml",
];

/// Default inline threshold in kilobytes.
pub const DEFAULT_MAX_SIZE_KB: f64 = 50.0;

/// Configuration loaded from a `pagepack.toml` file.
///
/// ```toml
/// charset = "utf-8"
///
/// [dir]
/// source = "src/"
/// web = "src/"
/// templates = "src/views/"
/// html_output = "pub/"
/// template_output = "pub/views/"
/// static_output = "pub/s/"
///
/// [domains]
/// style = ["https://a.cdn.test/", "https://b.cdn.test/"]
///
/// [version]
/// mode = "query"
/// static = true
///
/// [embed]
/// max_size = 50.0
///
/// [core]
/// styles = ["src/css/base.css"]
/// min_shared = 2
///
/// [include]
/// patterns = ["*.html", "*.ftl"]
///
/// [exclude]
/// patterns = ["src/html/legacy/"]
/// ```
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PackConfig {
	/// Charset recorded for every output file.
	pub charset: String,
	pub dir: DirConfig,
	pub domains: DomainsConfig,
	pub version: VersionConfig,
	pub embed: EmbedConfig,
	pub core: CoreConfig,
	pub include: IncludeConfig,
	pub exclude: ExcludeConfig,
}

impl Default for PackConfig {
	fn default() -> Self {
		Self {
			charset: "utf-8".to_string(),
			dir: DirConfig::default(),
			domains: DomainsConfig::default(),
			version: VersionConfig::default(),
			embed: EmbedConfig::default(),
			core: CoreConfig::default(),
			include: IncludeConfig::default(),
			exclude: ExcludeConfig::default(),
		}
	}
}

/// Input and output directories, relative to the project root.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DirConfig {
	/// Root of the html pages.
	pub source: String,
	/// The directory served as `/`.
	pub web: String,
	/// Root of the server templates (`.ftl`, `.vm`, ...).
	pub templates: String,
	pub html_output: String,
	pub template_output: String,
	/// Where merged style and script bundles are written.
	pub static_output: String,
	/// Prefix stripped from `<umi:...>` references.
	pub module_source: String,
	/// Target of `<mf:...>` references.
	pub manifest_output: String,
}

impl Default for DirConfig {
	fn default() -> Self {
		Self {
			source: "src/".to_string(),
			web: "src/".to_string(),
			templates: "src/views/".to_string(),
			html_output: "pub/".to_string(),
			template_output: "pub/views/".to_string(),
			static_output: "pub/s/".to_string(),
			module_source: "src/html/module/".to_string(),
			manifest_output: "pub/cache.manifest".to_string(),
		}
	}
}

/// Domain pools used when rewriting references. An empty pool falls back to
/// relative paths.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct DomainsConfig {
	/// Generic static resources (`<rs:...>`).
	pub resource: Vec<String>,
	pub style: Vec<String>,
	pub script: Vec<String>,
	pub module: Vec<String>,
	pub manifest: Vec<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct VersionConfig {
	pub mode: VersionMode,
	/// Append the content hash to `<rs:...>` references that carry no query.
	#[serde(rename = "static")]
	pub static_resources: bool,
}

/// Wrappers used when a bundle is written into a document. Each holds one
/// `%s` placeholder.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct EmbedConfig {
	/// Bundles up to this size (kilobytes, inclusive) are inlined.
	pub max_size: f64,
	pub inline_style: String,
	pub external_style: String,
	pub inline_script: String,
	pub external_script: String,
	/// Wrapper for template-level bundles inlined into a template section.
	pub inline_wrap: String,
	/// Wrapper for template-level bundles referenced externally.
	pub external_wrap: String,
	/// Wrapper around every block written into a server template.
	pub source_wrap: String,
}

impl Default for EmbedConfig {
	fn default() -> Self {
		Self {
			max_size: DEFAULT_MAX_SIZE_KB,
			inline_style: "<style type=\"text/css\">%s</style>".to_string(),
			external_style: "<link href=\"%s\" type=\"text/css\" rel=\"stylesheet\"/>".to_string(),
			inline_script: "<script type=\"text/javascript\">%s</script>".to_string(),
			external_script: "<script src=\"%s\" type=\"text/javascript\"></script>".to_string(),
			inline_wrap: "<textarea name=\"txt\">%s</textarea>".to_string(),
			external_wrap: "<textarea name=\"res\" data-src=\"%s\"></textarea>".to_string(),
			source_wrap: "%s".to_string(),
		}
	}
}

impl EmbedConfig {
	/// The inline threshold in bytes.
	#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
	pub fn max_bytes(&self) -> usize {
		(self.max_size.max(0.0) * 1000.0).round() as usize
	}
}

/// Resources shared across pages and merged into the `core` bundles.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct CoreConfig {
	/// Stylesheets, relative to the project root.
	pub styles: Vec<String>,
	/// Scripts, relative to the project root.
	pub scripts: Vec<String>,
	/// When non-zero, every resource used by at least this many documents
	/// also joins the core list.
	pub min_shared: usize,
}

/// Glob patterns selecting the markup files to build, matched against
/// paths relative to the project root.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct IncludeConfig {
	pub patterns: Vec<String>,
}

impl Default for IncludeConfig {
	fn default() -> Self {
		Self {
			patterns: ["*.html", "*.htm", "*.ftl", "*.vm"]
				.into_iter()
				.map(String::from)
				.collect(),
		}
	}
}

/// Configuration for excluding files and directories from scanning.
///
/// Patterns follow gitignore syntax and are applied on top of any
/// `.gitignore` rules.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ExcludeConfig {
	pub patterns: Vec<String>,
}

/// The configured directories resolved against a project root. Every root is
/// an absolute path using `/` separators and ending in `/`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedDirs {
	pub source: String,
	pub web: String,
	pub templates: String,
	pub html_output: String,
	pub template_output: String,
	pub static_output: String,
	pub module_source: String,
	/// A file, so it carries no trailing `/`.
	pub manifest_output: String,
}

impl PackConfig {
	/// Resolve the config path from known discovery candidates.
	#[must_use]
	pub fn resolve_path(root: &Path) -> Option<PathBuf> {
		CONFIG_FILE_CANDIDATES
			.iter()
			.map(|candidate| root.join(candidate))
			.find(|path| path.is_file())
	}

	/// Load the config from the first discovered config file at `root`.
	/// Returns `None` if the file does not exist.
	pub fn load(root: &Path) -> PackResult<Option<PackConfig>> {
		let Some(config_path) = Self::resolve_path(root) else {
			return Ok(None);
		};

		let content = std::fs::read_to_string(&config_path)?;
		let config: PackConfig =
			toml::from_str(&content).map_err(|e| PackError::ConfigParse(e.to_string()))?;

		Ok(Some(config))
	}

	/// Resolve every configured directory against `root`.
	pub fn resolve_dirs(&self, root: &Path) -> ResolvedDirs {
		let root = normalize_path(root);
		let dir = |relative: &str| ensure_trailing_slash(&join_root(&root, relative));

		ResolvedDirs {
			source: dir(&self.dir.source),
			web: dir(&self.dir.web),
			templates: dir(&self.dir.templates),
			html_output: dir(&self.dir.html_output),
			template_output: dir(&self.dir.template_output),
			static_output: dir(&self.dir.static_output),
			module_source: dir(&self.dir.module_source),
			manifest_output: join_root(&root, &self.dir.manifest_output),
		}
	}

	/// The configured core list for `styles` or `scripts`, resolved against
	/// `root`.
	pub fn core_list(&self, root: &Path, entries: &[String]) -> Vec<String> {
		let root = normalize_path(root);
		entries
			.iter()
			.map(|entry| join_root(&root, entry))
			.collect()
	}
}

/// Render a path with `/` separators.
pub fn normalize_path(path: &Path) -> String {
	path.to_string_lossy().replace('\\', "/")
}

fn join_root(root: &str, relative: &str) -> String {
	let relative = relative.replace('\\', "/");
	if relative.starts_with('/') {
		return relative;
	}

	let relative = relative.trim_start_matches("./");
	format!("{}/{relative}", root.trim_end_matches('/'))
}

fn ensure_trailing_slash(path: &str) -> String {
	if path.ends_with('/') {
		path.to_string()
	} else {
		format!("{path}/")
	}
}
