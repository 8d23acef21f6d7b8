#![allow(dead_code)]

use std::path::Path;

use assert_cmd::Command;
use insta_cmd::get_cargo_bin;

pub fn pagepack_cmd() -> Command {
	let mut cmd = Command::new(get_cargo_bin("pagepack"));
	cmd.env("NO_COLOR", "1");
	cmd.env_remove("RUST_LOG");
	cmd
}

pub const INDEX_PAGE: &str = r#"<head>
<!-- @STYLE --><link href="/css/a.css" rel="stylesheet"/><!-- /@STYLE -->
</head>
<!-- @SCRIPT --><script src="./js/a.js"></script><!-- /@SCRIPT -->"#;

/// A project with one page, one stylesheet and one script using the default
/// directory layout.
pub fn write_sample_project(root: &Path) -> std::io::Result<()> {
	std::fs::create_dir_all(root.join("src/css"))?;
	std::fs::create_dir_all(root.join("src/js"))?;
	std::fs::write(root.join("src/css/a.css"), "a{color:red}")?;
	std::fs::write(root.join("src/js/a.js"), "var a = 1;")?;
	std::fs::write(root.join("src/index.html"), INDEX_PAGE)
}
