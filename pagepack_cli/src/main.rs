use std::path::Path;
use std::path::PathBuf;
use std::process;

use clap::Parser;
use owo_colors::OwoColorize;
use pagepack_cli::Commands;
use pagepack_cli::OutputFormat;
use pagepack_cli::PackCli;
use pagepack_core::AnyEmptyResult;
use pagepack_core::PackError;
use pagepack_core::config::CONFIG_FILE_CANDIDATES;
use pagepack_core::config::PackConfig;
use pagepack_core::config::normalize_path;
use pagepack_core::document::ResourceType;
use pagepack_core::minify::CommentStripper;
use pagepack_core::project::BuildReport;
use pagepack_core::project::Project;
use pagepack_core::project::scan_project;
use serde_json::json;
use tracing_subscriber::EnvFilter;

static USE_COLOR: std::sync::atomic::AtomicBool = std::sync::atomic::AtomicBool::new(true);

fn color_enabled() -> bool {
	USE_COLOR.load(std::sync::atomic::Ordering::Relaxed)
}

/// Apply ANSI color codes only when color is enabled.
macro_rules! colored {
	($text:expr,red) => {
		if color_enabled() {
			format!("{}", $text.red())
		} else {
			format!("{}", $text)
		}
	};
	($text:expr,green) => {
		if color_enabled() {
			format!("{}", $text.green())
		} else {
			format!("{}", $text)
		}
	};
	($text:expr,bold) => {
		if color_enabled() {
			format!("{}", $text.bold())
		} else {
			format!("{}", $text)
		}
	};
}

const SAMPLE_CONFIG: &str = r#"# pagepack configuration

# Directories, relative to this file.
[dir]
source = "src/"
web = "src/"
templates = "src/views/"
html_output = "pub/"
template_output = "pub/views/"
static_output = "pub/s/"

# Bundles up to this size (kilobytes) are inlined, larger ones are linked.
[embed]
max_size = 50.0

# Resources shared by every page, merged into the core bundles.
[core]
styles = []
scripts = []

# "query", "filename", "counter" or a pattern such as "[FILENAME]_[VERSION]".
[version]
mode = "query"
static = false
"#;

fn main() {
	let args = PackCli::parse();

	// Respect NO_COLOR env var and --no-color flag.
	let use_color = !args.no_color
		&& std::env::var_os("NO_COLOR").is_none()
		&& supports_color::on(supports_color::Stream::Stderr).is_some();
	if !use_color {
		USE_COLOR.store(false, std::sync::atomic::Ordering::Relaxed);
	}

	// Install miette's fancy handler for rich error diagnostics.
	miette::set_hook(Box::new(move |_| {
		Box::new(
			miette::MietteHandlerOpts::new()
				.color(use_color)
				.unicode(use_color)
				.build(),
		)
	}))
	.ok();

	init_tracing(args.verbose, use_color);

	let result = match args.command {
		Some(Commands::Init) => run_init(&args),
		Some(Commands::Scan { format }) => run_scan(&args, format),
		Some(Commands::Build { dry_run, format }) => run_build(&args, dry_run, format),
		None => {
			eprintln!("No subcommand specified. Run `pagepack --help` for usage.");
			process::exit(1);
		}
	};

	if let Err(e) = result {
		match e.downcast::<PackError>() {
			Ok(pack_err) => {
				let report: miette::Report = (*pack_err).into();
				eprintln!("{report:?}");
			}
			Err(e) => {
				eprintln!("{} {e}", colored!("error:", red));
			}
		}
		process::exit(2);
	}
}

/// Log to stderr. `RUST_LOG` overrides the default level.
fn init_tracing(verbose: bool, use_color: bool) {
	let default_filter = if verbose { "pagepack_core=debug" } else { "warn" };
	let filter =
		EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));

	tracing_subscriber::fmt()
		.with_env_filter(filter)
		.with_writer(std::io::stderr)
		.with_ansi(use_color)
		.with_target(false)
		.init();
}

fn resolve_root(args: &PackCli) -> PathBuf {
	args.path
		.clone()
		.unwrap_or_else(|| std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")))
}

fn make_relative(path: &str, root: &Path) -> String {
	let root = normalize_path(root);
	path.strip_prefix(root.as_str())
		.map_or(path, |rest| rest.trim_start_matches('/'))
		.to_string()
}

fn run_init(args: &PackCli) -> AnyEmptyResult {
	let root = resolve_root(args);

	if let Some(existing) = PackConfig::resolve_path(&root) {
		println!("Config file already exists: {}", existing.display());
		return Ok(());
	}

	let config_path = root.join(CONFIG_FILE_CANDIDATES[0]);
	std::fs::write(&config_path, SAMPLE_CONFIG)?;
	println!("Created {}", config_path.display());

	println!();
	println!("Next steps:");
	println!("  1. Mark the resources of a page with build directives:");
	println!("     <!-- @STYLE -->");
	println!("     <link href=\"/css/page.css\" rel=\"stylesheet\"/>");
	println!("     <!-- /@STYLE -->");
	println!("  2. Run `pagepack build` to write the output");

	Ok(())
}

fn run_scan(args: &PackCli, format: OutputFormat) -> AnyEmptyResult {
	let root = resolve_root(args);
	let project = scan_project(&root)?;

	match format {
		OutputFormat::Json => {
			let documents: Vec<serde_json::Value> = project
				.documents
				.iter()
				.map(|document| {
					let relative = |list: &[String]| {
						list.iter()
							.map(|id| make_relative(id, &root))
							.collect::<Vec<_>>()
					};
					let groups: Vec<serde_json::Value> = document
						.merge_groups
						.iter()
						.map(|group| {
							json!({
								"name": group.config.name,
								"minify": group.config.minify,
								"scripts": relative(&group.scripts),
							})
						})
						.collect();

					json!({
						"file": make_relative(&document.file, &root),
						"kind": document.kind,
						"styles": relative(document.page.dependencies(ResourceType::Style)),
						"scripts": relative(document.page.dependencies(ResourceType::Script)),
						"templates": document.templates.len(),
						"merge_groups": groups,
					})
				})
				.collect();

			println!("{}", serde_json::to_string_pretty(&json!({ "documents": documents }))?);
		}
		OutputFormat::Text => print_scan(&project, &root, args.verbose),
	}

	Ok(())
}

fn print_scan(project: &Project, root: &Path, verbose: bool) {
	if project.documents.is_empty() {
		println!("No documents found.");
		return;
	}

	for document in &project.documents {
		let kind = if document.is_template() { "template" } else { "page" };
		println!(
			"{} ({kind})",
			colored!(make_relative(&document.file, root), bold)
		);
		println!(
			"  styles: {}, scripts: {}, templates: {}, merge groups: {}",
			document.page.styles.len(),
			document.page.scripts.len(),
			document.templates.len(),
			document.merge_groups.len()
		);

		if verbose {
			for id in document.page.styles.iter().chain(&document.page.scripts) {
				println!("    {}", make_relative(id, root));
			}
		}
	}

	println!();
	println!("Scanned {} document(s).", project.documents.len());
}

fn run_build(args: &PackCli, dry_run: bool, format: OutputFormat) -> AnyEmptyResult {
	let root = resolve_root(args);
	let mut project = scan_project(&root)?;
	let mut report = project.build(&CommentStripper)?;

	let outputs: Vec<String> = project
		.cache
		.outputs()
		.keys()
		.map(|path| make_relative(path, &root))
		.collect();

	if !dry_run {
		report.written = project.flush()?;
	}

	match format {
		OutputFormat::Json => print_build_json(&report, &outputs, &root, dry_run)?,
		OutputFormat::Text => print_build(&report, &outputs, &root, dry_run, args.verbose),
	}

	Ok(())
}

fn print_build_json(
	report: &BuildReport,
	outputs: &[String],
	root: &Path,
	dry_run: bool,
) -> AnyEmptyResult {
	let documents: Vec<serde_json::Value> = report
		.documents
		.iter()
		.map(|document| {
			json!({
				"file": make_relative(&document.file, root),
				"kind": document.kind,
				"output": make_relative(&document.output, root),
				"bundles": document.bundles,
			})
		})
		.collect();

	let output = json!({
		"dry_run": dry_run,
		"written": report.written,
		"documents": documents,
		"outputs": outputs,
	});
	println!("{}", serde_json::to_string_pretty(&output)?);

	Ok(())
}

fn print_build(
	report: &BuildReport,
	outputs: &[String],
	root: &Path,
	dry_run: bool,
	verbose: bool,
) {
	if verbose {
		for document in &report.documents {
			let bundles = if document.bundles.is_empty() {
				String::new()
			} else {
				format!(" ({})", document.bundles.join(", "))
			};
			println!(
				"  {} -> {}{bundles}",
				make_relative(&document.file, root),
				make_relative(&document.output, root)
			);
		}
	}

	if dry_run {
		for output in outputs {
			println!("  would write {output}");
		}
		println!(
			"Dry run: {} document(s) built, {} file(s) would be written.",
			report.documents.len(),
			outputs.len() + 1
		);
		return;
	}

	println!(
		"{} {} document(s), wrote {} file(s).",
		colored!("Built", green),
		report.documents.len(),
		report.written
	);
}
