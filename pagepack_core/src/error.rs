use miette::Diagnostic;
use thiserror::Error;

#[derive(Debug, Diagnostic, Error)]
#[non_exhaustive]
pub enum PackError {
	#[error(transparent)]
	#[diagnostic(code(pagepack::io_error))]
	Io(#[from] std::io::Error),

	#[error("failed to read `{path}`: {reason}")]
	#[diagnostic(
		code(pagepack::unreadable_resource),
		help("check that the referenced file exists relative to the page or the web root")
	)]
	UnreadableResource { path: String, reason: String },

	#[error("unclosed `{tag}` region at end of `{file}`")]
	#[diagnostic(
		code(pagepack::unclosed_region),
		help("every <style>, <script> and <textarea> must have a matching closing tag")
	)]
	UnclosedRegion { tag: String, file: String },

	#[error("no cached content for bundle `{0}`")]
	#[diagnostic(
		code(pagepack::missing_bundle),
		help("tagged uris such as `<js:name>` must refer to a bundle produced by the merge step")
	)]
	MissingBundle(String),

	#[error("failed to parse config file: {0}")]
	#[diagnostic(
		code(pagepack::config_parse),
		help("check that pagepack.toml is valid TOML with [dir], [embed] and [core] sections")
	)]
	ConfigParse(String),

	#[error("invalid include pattern `{pattern}`: {reason}")]
	#[diagnostic(code(pagepack::include_pattern))]
	IncludePattern { pattern: String, reason: String },

	#[error("invalid exclude pattern `{pattern}`: {reason}")]
	#[diagnostic(code(pagepack::exclude_pattern))]
	ExcludePattern { pattern: String, reason: String },

	#[error("failed to minify merge group `{name}`: {reason}")]
	#[diagnostic(
		code(pagepack::minify),
		help("set `minify:false` on the @MERGE directive to embed the scripts as written")
	)]
	Minify { name: String, reason: String },

	#[error("failed to write manifest: {0}")]
	#[diagnostic(code(pagepack::manifest))]
	Manifest(String),
}

pub type PackResult<T> = Result<T, PackError>;
pub type AnyError = Box<dyn std::error::Error>;
pub type AnyEmptyResult = Result<(), AnyError>;
pub type AnyResult<T> = Result<T, AnyError>;
