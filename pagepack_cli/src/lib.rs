use std::path::PathBuf;

use clap::Parser;
use clap::Subcommand;
use clap::ValueEnum;

#[derive(Parser)]
#[command(
	author,
	version,
	about = "Bundle, inline and version the styles and scripts of static html pages.",
	long_about = "pagepack reads html pages and server templates, collects the styles and \
	              scripts marked by build directives such as `<!-- @STYLE -->`, merges them \
	              into per-page bundles and writes deployable pages with small bundles inlined \
	              and large ones linked with a content version.\n\nQuick start:\n  pagepack \
	              init   Create a pagepack.toml\n  pagepack scan   List the documents and their \
	              resources\n  pagepack build  Write the output pages and bundles"
)]
pub struct PackCli {
	#[command(subcommand)]
	pub command: Option<Commands>,

	/// Path to the project root directory.
	#[arg(long, short, global = true)]
	pub path: Option<PathBuf>,

	/// Enable verbose output and debug logging.
	#[arg(long, short, global = true, default_value_t = false)]
	pub verbose: bool,

	/// Disable colored output.
	#[arg(long, global = true, default_value_t = false)]
	pub no_color: bool,
}

#[derive(Subcommand)]
pub enum Commands {
	/// Create a `pagepack.toml` with the default settings.
	///
	/// If a config file already exists, this command is a no-op and exits
	/// successfully.
	Init,
	/// Parse every page and template and list the resources they declare.
	///
	/// Nothing is written to disk. Useful for checking that directives are
	/// balanced and that references resolve to the expected files.
	Scan {
		/// Output format. Use `text` for human-readable output or `json` for
		/// programmatic consumption.
		#[arg(long, value_enum, default_value_t = OutputFormat::Text)]
		format: OutputFormat,
	},
	/// Merge, embed and version every document and write the output.
	///
	/// Pages are written under the html output directory, server templates
	/// under the template output directory and linked bundles under the
	/// static output directory. A `manifest.json` listing every deployed
	/// resource and its version is written next to the pages.
	Build {
		/// Run the whole pipeline but do not write any file.
		#[arg(long, default_value_t = false)]
		dry_run: bool,

		/// Output format. Use `text` for human-readable output or `json` for
		/// programmatic consumption.
		#[arg(long, value_enum, default_value_t = OutputFormat::Text)]
		format: OutputFormat,
	},
}

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum OutputFormat {
	/// Human-readable text output with colors and formatting.
	Text,
	/// JSON output for programmatic consumption.
	Json,
}
