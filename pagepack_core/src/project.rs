use std::collections::HashMap;
use std::collections::HashSet;
use std::path::Path;
use std::path::PathBuf;

use globset::Glob;
use globset::GlobSet;
use globset::GlobSetBuilder;
use ignore::gitignore::Gitignore;
use ignore::gitignore::GitignoreBuilder;
use serde::Serialize;
use tracing::debug;
use tracing::info;

use crate::PackError;
use crate::PackResult;
use crate::builder::build_document;
use crate::cache::ContentCache;
use crate::cache::MemoryCache;
use crate::config::CONFIG_FILE_CANDIDATES;
use crate::config::PackConfig;
use crate::config::ResolvedDirs;
use crate::config::normalize_path;
use crate::document::Document;
use crate::document::DocumentKind;
use crate::document::ResourceType;
use crate::embed::embed_merge_groups;
use crate::embed::embed_script;
use crate::embed::embed_style;
use crate::embed::embed_template;
use crate::merge::DependencyQuery;
use crate::merge::ListType;
use crate::merge::begin_merge;
use crate::merge::dependencies;
use crate::merge::merge_script;
use crate::merge::merge_style;
use crate::minify::CommentStripper;
use crate::minify::Minifier;
use crate::output::output_document;
use crate::uri::UriFormatter;

/// Cache key of the shared stylesheet bundle.
pub const CORE_STYLE_KEY: &str = "core.css";
/// Cache key of the shared script bundle.
pub const CORE_SCRIPT_KEY: &str = "core.js";

/// A scanned project: every markup document parsed and ready to build.
#[derive(Debug)]
pub struct Project {
	pub root: PathBuf,
	pub config: PackConfig,
	pub dirs: ResolvedDirs,
	pub documents: Vec<Document>,
	pub cache: MemoryCache,
}

/// The result of building one document.
#[derive(Debug, Clone, Serialize)]
pub struct DocumentReport {
	pub file: String,
	pub kind: DocumentKind,
	pub output: String,
	/// Cache keys of the bundles merged for the document.
	pub bundles: Vec<String>,
}

/// The result of [`build_project`].
#[derive(Debug, Clone, Default, Serialize)]
pub struct BuildReport {
	pub documents: Vec<DocumentReport>,
	pub core_styles: Vec<String>,
	pub core_scripts: Vec<String>,
	/// Number of files written by the final flush.
	pub written: usize,
}

/// Scan the project at `root` using its discovered config.
pub fn scan_project(root: &Path) -> PackResult<Project> {
	let config = PackConfig::load(root)?.unwrap_or_default();
	scan_project_with_config(root, config)
}

/// Collect and parse every markup document under the configured source and
/// template roots.
pub fn scan_project_with_config(root: &Path, config: PackConfig) -> PackResult<Project> {
	let dirs = config.resolve_dirs(root);
	let include = build_glob_set(&config.include.patterns)?;
	let files = collect_files(root, &dirs, &include, &config.exclude.patterns)?;
	let mut cache = MemoryCache::with_disk();
	let mut documents = Vec::with_capacity(files.len());

	for file in files {
		let content = std::fs::read_to_string(&file).map_err(|e| {
			PackError::UnreadableResource {
				path: file.display().to_string(),
				reason: e.to_string(),
			}
		})?;

		let path = normalize_path(&file);
		let kind = if path.starts_with(&dirs.templates) {
			DocumentKind::Template
		} else {
			DocumentKind::Page
		};

		documents.push(build_document(&path, &content, kind, &dirs.web, &mut cache)?);
	}

	Ok(Project {
		root: root.to_path_buf(),
		config,
		dirs,
		documents,
		cache,
	})
}

/// Build the project at `root` and write its output.
pub fn build_project(root: &Path) -> PackResult<BuildReport> {
	let mut project = scan_project(root)?;
	let mut report = project.build(&CommentStripper)?;
	report.written = project.flush()?;
	Ok(report)
}

impl Project {
	/// The root a document's bundle names are derived from.
	pub fn document_root(&self, kind: DocumentKind) -> &str {
		match kind {
			DocumentKind::Page => &self.dirs.source,
			DocumentKind::Template => &self.dirs.templates,
		}
	}

	/// The configured core list for `res_type` plus, when `core.min_shared`
	/// is set, every resource shared by at least that many documents.
	pub fn core_list(&self, res_type: ResourceType) -> Vec<String> {
		let configured = match res_type {
			ResourceType::Style => &self.config.core.styles,
			ResourceType::Script => &self.config.core.scripts,
		};
		let mut core = self.config.core_list(&self.root, configured);

		let min_shared = self.config.core.min_shared;
		if min_shared == 0 {
			return core;
		}

		let mut order = vec![];
		let mut counts: HashMap<String, usize> = HashMap::new();
		for document in &self.documents {
			if document.config(res_type).is_none() {
				continue;
			}

			let query = DependencyQuery {
				res_type,
				list_type: ListType::All,
				check_core_config: true,
				ignore_entry: true,
			};
			let unique: HashSet<String> = dependencies(document, query).into_iter().collect();
			for id in unique {
				let count = counts.entry(id.clone()).or_insert(0);
				if *count == 0 {
					order.push(id);
				}
				*count += 1;
			}
		}

		order.sort();
		for id in order {
			if counts.get(&id).is_some_and(|count| *count >= min_shared) && !core.contains(&id) {
				core.push(id);
			}
		}

		core
	}

	/// Merge, embed and output every document. Outputs stay in the cache
	/// until [`Project::flush`].
	pub fn build(&mut self, minifier: &dyn Minifier) -> PackResult<BuildReport> {
		let core_styles = self.core_list(ResourceType::Style);
		let core_scripts = self.core_list(ResourceType::Script);

		for (key, list) in [(CORE_STYLE_KEY, &core_styles), (CORE_SCRIPT_KEY, &core_scripts)] {
			if list.is_empty() {
				continue;
			}
			let content = self.cache.fill(list);
			self.cache.cache(key, content);
			debug!(bundle = key, members = ?list, "cached core bundle");
		}

		let mut formatter = UriFormatter::new(&self.config, self.dirs.clone());
		let mut documents = std::mem::take(&mut self.documents);
		let mut reports = Vec::with_capacity(documents.len());

		for document in &mut documents {
			let root = self.document_root(document.kind).to_string();
			let mut bundles = vec![];

			begin_merge(document, &root);
			if document.style_config.is_some() {
				bundles.extend(merge_style(document, &core_styles, &mut self.cache));
			}
			if document.script_config.is_some() {
				bundles.extend(merge_script(document, &core_scripts, &mut self.cache));
			}

			embed_style(document, &self.config.embed, &self.cache);
			embed_script(document, &self.config.embed, &self.cache);
			embed_merge_groups(document, &root, &self.config.embed, minifier, &mut self.cache)?;
			embed_template(document, &self.config.embed);

			let output = output_document(document, &mut formatter, &self.config.charset, &mut self.cache)?;
			reports.push(DocumentReport {
				file: document.file.clone(),
				kind: document.kind,
				output,
				bundles,
			});
		}

		self.documents = documents;

		if self.cache.manifest().manifested {
			let appcache = self.cache.manifest().to_appcache();
			let path = self.dirs.manifest_output.clone();
			self.cache.output(&path, appcache, &self.config.charset);
		}

		info!(documents = reports.len(), "built project");

		Ok(BuildReport {
			documents: reports,
			core_styles,
			core_scripts,
			written: 0,
		})
	}

	/// Write every queued output and the manifest under the html output root.
	pub fn flush(&self) -> PackResult<usize> {
		self.cache.flush(Path::new(&self.dirs.html_output))
	}
}

/// Build a `GlobSet` from a list of glob pattern strings.
fn build_glob_set(patterns: &[String]) -> PackResult<GlobSet> {
	let mut builder = GlobSetBuilder::new();
	for pattern in patterns {
		let glob = Glob::new(pattern).map_err(|e| {
			PackError::IncludePattern {
				pattern: pattern.clone(),
				reason: e.kind().to_string(),
			}
		})?;
		builder.add(glob);
	}
	builder.build().map_err(|e| {
		PackError::IncludePattern {
			pattern: patterns.join(", "),
			reason: e.to_string(),
		}
	})
}

fn build_exclude_matcher(root: &Path, patterns: &[String]) -> PackResult<Gitignore> {
	let mut builder = GitignoreBuilder::new(root);
	for pattern in patterns {
		builder.add_line(None, pattern).map_err(|e| {
			PackError::ExcludePattern {
				pattern: pattern.clone(),
				reason: e.to_string(),
			}
		})?;
	}
	builder.build().map_err(|e| {
		PackError::ExcludePattern {
			pattern: patterns.join(", "),
			reason: e.to_string(),
		}
	})
}

/// Build a `Gitignore` matcher from the project's `.gitignore` file (if any).
fn build_gitignore(root: &Path) -> Gitignore {
	let mut builder = GitignoreBuilder::new(root);
	let gitignore_path = root.join(".gitignore");
	if gitignore_path.exists() {
		let _ = builder.add(gitignore_path);
	}
	builder.build().unwrap_or_else(|_| Gitignore::empty())
}

/// Collect the markup files under the source and template roots.
///
/// Files matched by `.gitignore` or an `[exclude]` pattern are skipped, as
/// are the output directories.
fn collect_files(
	root: &Path,
	dirs: &ResolvedDirs,
	include: &GlobSet,
	exclude_patterns: &[String],
) -> PackResult<Vec<PathBuf>> {
	let walker = Walker {
		root,
		include,
		gitignore: build_gitignore(root),
		exclude: build_exclude_matcher(root, exclude_patterns)?,
		skipped: [&dirs.html_output, &dirs.template_output, &dirs.static_output]
			.into_iter()
			.map(|dir| dir.trim_end_matches('/').to_string())
			.collect(),
	};

	let mut files = vec![];
	let mut visited = HashSet::new();
	for dir in [&dirs.source, &dirs.templates] {
		walker.walk(Path::new(dir), &mut files, &mut visited)?;
	}

	files.sort();
	files.dedup();
	Ok(files)
}

struct Walker<'a> {
	root: &'a Path,
	include: &'a GlobSet,
	gitignore: Gitignore,
	exclude: Gitignore,
	/// Output directories, without trailing `/`.
	skipped: Vec<String>,
}

impl Walker<'_> {
	fn walk(
		&self,
		dir: &Path,
		files: &mut Vec<PathBuf>,
		visited: &mut HashSet<PathBuf>,
	) -> PackResult<()> {
		if !dir.is_dir() {
			return Ok(());
		}

		let canonical = dir.canonicalize().unwrap_or_else(|_| dir.to_path_buf());
		if !visited.insert(canonical) {
			return Ok(());
		}

		for entry in std::fs::read_dir(dir)? {
			let path = entry?.path();

			if let Some(name) = path.file_name().and_then(|n| n.to_str()) {
				if is_ignored_directory_name(name) {
					continue;
				}
			}

			let is_dir = path.is_dir();
			if self.gitignore.matched(&path, is_dir).is_ignore()
				|| self.exclude.matched(&path, is_dir).is_ignore()
			{
				continue;
			}

			if is_dir {
				if self.skipped.contains(&normalize_path(&path)) || has_project_config(&path) {
					continue;
				}
				self.walk(&path, files, visited)?;
			} else if path
				.strip_prefix(self.root)
				.is_ok_and(|relative| self.include.is_match(relative))
			{
				files.push(path);
			}
		}

		Ok(())
	}
}

fn is_ignored_directory_name(name: &str) -> bool {
	name.starts_with('.') || name == "node_modules" || name == "target"
}

/// Nested projects are built on their own.
fn has_project_config(dir: &Path) -> bool {
	CONFIG_FILE_CANDIDATES
		.iter()
		.any(|candidate| dir.join(candidate).is_file())
}
