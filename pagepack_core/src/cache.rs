//! The content cache shared by the merge, embed and output stages.
//!
//! Every stage reads resource content and records its results through the
//! [`ContentCache`] trait, so the whole pipeline can run against an
//! in-memory [`MemoryCache`] in tests and only touch the disk on
//! [`MemoryCache::flush`].

use std::collections::BTreeMap;
use std::collections::HashMap;
use std::path::Path;
use std::time::UNIX_EPOCH;

use serde::Deserialize;
use serde::Serialize;
use tracing::debug;
use tracing::warn;

use crate::PackError;
use crate::PackResult;

/// File name of the deploy manifest written next to the outputs.
pub const MANIFEST_FILE_NAME: &str = "manifest.json";

const MANIFEST_SCHEMA_VERSION: u32 = 1;

/// The persistence boundary of the pipeline.
pub trait ContentCache {
	/// Store `content` under `name`, replacing any previous value.
	fn cache(&mut self, name: &str, content: String);

	/// The content stored under `key`.
	fn get(&self, key: &str) -> Option<&str>;

	/// Concatenate the content of every listed resource with `\n`. Missing
	/// resources are skipped.
	fn fill(&mut self, list: &[String]) -> String;

	/// The raw bytes of the resource at `path`, empty when unavailable.
	fn raw(&mut self, path: &str) -> Vec<u8>;

	/// Queue a file for writing.
	fn output(&mut self, path: &str, content: String, charset: &str);

	/// Record a deployed resource and its version in the manifest.
	fn resource(&mut self, path: &str, version: &str);

	/// Flag the manifest as referenced by a document.
	fn mark_manifested(&mut self);

	fn manifest(&self) -> &Manifest;
}

/// The registry of deployed paths and their content versions.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Manifest {
	/// Set once any document references the manifest with `<mf:...>`.
	pub manifested: bool,
	/// Web path to version.
	pub resources: BTreeMap<String, String>,
}

impl Manifest {
	/// Render the manifest as an html application cache file.
	pub fn to_appcache(&self) -> String {
		let mut lines = vec!["CACHE MANIFEST".to_string()];
		let version = self
			.resources
			.values()
			.fold(String::new(), |acc, version| acc + version);
		lines.push(format!("# {}", crate::uri::content_hash(version.as_bytes())));
		lines.push(String::new());
		lines.push("CACHE:".to_string());
		lines.extend(self.resources.keys().cloned());
		lines.push(String::new());
		lines.push("NETWORK:".to_string());
		lines.push("*".to_string());
		lines.join("\n")
	}
}

#[derive(Debug, Serialize)]
struct ManifestFile<'a> {
	schema_version: u32,
	#[serde(flatten)]
	manifest: &'a Manifest,
}

/// A file queued by [`ContentCache::output`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputFile {
	pub content: String,
	pub charset: String,
}

/// An in-memory [`ContentCache`].
///
/// With [`MemoryCache::with_disk`] resources missing from the cache are read
/// from disk on first use, keyed by their absolute path.
#[derive(Debug, Default)]
pub struct MemoryCache {
	entries: HashMap<String, String>,
	outputs: BTreeMap<String, OutputFile>,
	manifest: Manifest,
	read_disk: bool,
}

impl MemoryCache {
	pub fn new() -> Self {
		Self::default()
	}

	/// A cache that falls back to reading resources from disk.
	pub fn with_disk() -> Self {
		Self {
			read_disk: true,
			..Self::default()
		}
	}

	/// Every queued output, keyed by path.
	pub fn outputs(&self) -> &BTreeMap<String, OutputFile> {
		&self.outputs
	}

	/// Load a resource into the cache. Returns `false` when it is neither
	/// cached nor readable.
	fn load(&mut self, key: &str) -> bool {
		if self.entries.contains_key(key) {
			return true;
		}
		if !self.read_disk {
			return false;
		}

		match std::fs::read_to_string(key) {
			Ok(content) => {
				self.entries.insert(key.to_string(), content);
				true
			}
			Err(error) => {
				warn!(path = key, %error, "unreadable resource");
				false
			}
		}
	}

	/// Write every queued output and the deploy manifest. Returns the number
	/// of files written.
	pub fn flush(&self, out_root: &Path) -> PackResult<usize> {
		for (path, file) in &self.outputs {
			let path = Path::new(path);
			if let Some(parent) = path.parent() {
				std::fs::create_dir_all(parent)?;
			}
			if !file.charset.eq_ignore_ascii_case("utf-8") {
				warn!(path = %path.display(), charset = %file.charset, "only utf-8 output is supported");
			}
			std::fs::write(path, &file.content)?;
			debug!(path = %path.display(), "wrote output");
		}

		save_manifest(out_root, &self.manifest)?;
		Ok(self.outputs.len() + 1)
	}
}

impl ContentCache for MemoryCache {
	fn cache(&mut self, name: &str, content: String) {
		self.entries.insert(name.to_string(), content);
	}

	fn get(&self, key: &str) -> Option<&str> {
		self.entries.get(key).map(String::as_str)
	}

	fn fill(&mut self, list: &[String]) -> String {
		let loaded: Vec<&String> = list.iter().filter(|key| self.load(key)).collect();
		loaded
			.into_iter()
			.filter_map(|key| self.entries.get(key).map(String::as_str))
			.collect::<Vec<_>>()
			.join("\n")
	}

	fn raw(&mut self, path: &str) -> Vec<u8> {
		if let Some(content) = self.entries.get(path) {
			return content.as_bytes().to_vec();
		}
		if !self.read_disk {
			return vec![];
		}

		std::fs::read(path).unwrap_or_else(|error| {
			warn!(path, %error, "unreadable resource");
			vec![]
		})
	}

	fn output(&mut self, path: &str, content: String, charset: &str) {
		self.outputs.insert(
			path.to_string(),
			OutputFile {
				content,
				charset: charset.to_string(),
			},
		);
	}

	fn resource(&mut self, path: &str, version: &str) {
		self.manifest
			.resources
			.insert(path.to_string(), version.to_string());
	}

	fn mark_manifested(&mut self) {
		self.manifest.manifested = true;
	}

	fn manifest(&self) -> &Manifest {
		&self.manifest
	}
}

fn save_manifest(out_root: &Path, manifest: &Manifest) -> PackResult<()> {
	std::fs::create_dir_all(out_root)?;
	let manifest_path = out_root.join(MANIFEST_FILE_NAME);

	let payload = serde_json::to_vec_pretty(&ManifestFile {
		schema_version: MANIFEST_SCHEMA_VERSION,
		manifest,
	})
	.map_err(|e| PackError::Manifest(e.to_string()))?;

	let temp_path = manifest_path.with_extension(format!(
		"json.tmp-{}-{}",
		std::process::id(),
		std::time::SystemTime::now()
			.duration_since(UNIX_EPOCH)
			.map_or(0, |duration| duration.as_nanos())
	));

	std::fs::write(&temp_path, payload)?;
	if let Err(error) = std::fs::rename(&temp_path, &manifest_path) {
		let _ = std::fs::remove_file(&temp_path);
		return Err(error.into());
	}

	Ok(())
}
