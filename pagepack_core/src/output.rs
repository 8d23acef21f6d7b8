use tracing::debug;

use crate::PackResult;
use crate::cache::ContentCache;
use crate::config::ResolvedDirs;
use crate::document::Document;
use crate::document::DocumentKind;
use crate::uri::FormatContext;
use crate::uri::UriFormatter;

/// The output path of a document: its source root swapped for the html
/// output root (pages) or the template output root (server templates).
pub fn output_path(document: &Document, dirs: &ResolvedDirs) -> String {
	let (root, output_root) = match document.kind {
		DocumentKind::Page => (&dirs.source, &dirs.html_output),
		DocumentKind::Template => (&dirs.templates, &dirs.template_output),
	};

	document.file.replacen(root.as_str(), output_root, 1)
}

/// Serialise `document`, resolve its tagged uris and queue it for writing.
/// Returns the output path.
pub fn output_document(
	document: &Document,
	formatter: &mut UriFormatter,
	charset: &str,
	cache: &mut dyn ContentCache,
) -> PackResult<String> {
	let file = output_path(document, formatter.dirs());
	let context = FormatContext {
		output: file.clone(),
		from_page: true,
		is_template: document.is_template(),
	};

	let content = formatter.format_content(&document.stringify(), &context, cache)?;
	debug!(file = %file, "output document");
	cache.output(&file, content, charset);

	Ok(file)
}
