use std::cell::Cell;
use std::path::Path;

use rstest::rstest;
use serde_json::json;
use similar_asserts::assert_eq;
use tracing_test::traced_test;

use super::__fixtures::*;
use super::*;
use crate::builder::normalize_segments;
use crate::cache::ContentCache;
use crate::cache::MemoryCache;
use crate::config::EmbedConfig;
use crate::config::PackConfig;
use crate::directive::parse_directive;
use crate::document::Document;
use crate::document::DocumentKind;
use crate::document::ResourceConfig;
use crate::document::ResourceType;
use crate::embed::embed_merge_groups;
use crate::embed::embed_style;
use crate::embed::embed_template;
use crate::embed::escape_closing_tag;
use crate::embed::format_wrap;
use crate::lexer::tokenize;
use crate::literal::parse_literal;
use crate::machine::ContentState;
use crate::machine::PassThrough;
use crate::machine::ResourceKind;
use crate::machine::StateMachine;
use crate::machine::scan_markup;
use crate::merge::DependencyQuery;
use crate::merge::ListType;
use crate::merge::begin_merge;
use crate::merge::dependencies;
use crate::merge::merge_style;
use crate::merge::output_name;
use crate::merge::split;
use crate::merge::template_dependencies;
use crate::minify::CommentStripper;
use crate::minify::Minifier;
use crate::project::build_project;
use crate::tokens::CommentEvent;
use crate::tokens::TagEvent;
use crate::uri::DomainPool;
use crate::uri::FormatContext;
use crate::uri::Pool;
use crate::uri::UriFormatter;
use crate::uri::VersionMode;
use crate::uri::Versioned;
use crate::uri::content_hash;
use crate::uri::relative_path;
use crate::uri::unwrap_uris;

#[rstest]
#[case::plain("<div><p>awesome</p></div>")]
#[case::raw_script(r#"<script>var s = "<b>" + '</p>';</script>"#)]
#[case::comment("<!-- @STYLE {core:false} --><p>x</p><!-- /@STYLE -->")]
#[case::unterminated_comment("<p>a</p><!-- never closed")]
#[case::empty_comment("<p><!----></p>")]
#[case::stray_angle("a < b && c<1")]
#[case::upper_case(r#"<SCRIPT SRC="a.js"></SCRIPT>"#)]
#[case::unquoted_attrs("<textarea name=jst id=t1>{a}</textarea>")]
#[case::unclosed_tag(r#"<div class="x"#)]
fn tokenize_preserves_source(#[case] input: &str) {
	let events = tokenize(input);
	let source: String = events.iter().map(|event| event.source()).collect();
	assert_eq!(source, input);
}

#[test]
fn tokenize_reads_attributes() {
	let events = tokenize(r#"<link href='/a.css' rel=stylesheet disabled/>"#);
	let [tokens::MarkupEvent::Tag(tag)] = events.as_slice() else {
		panic!("expected a single tag, got {events:?}");
	};

	assert_eq!(tag.name, "link");
	assert!(tag.self_closed);
	assert_eq!(tag.attrs.get("href"), Some("/a.css"));
	assert_eq!(tag.attrs.get("REL"), Some("stylesheet"));
	assert!(tag.attrs.has("disabled"));
	assert_eq!(tag.attrs.get("disabled"), None);
}

#[test]
fn tag_event_serialises_from_parts() {
	let tag = TagEvent {
		name: "div".to_string(),
		attrs: [("a", "1"), ("hidden", "")].into_iter().collect(),
		source: String::new(),
		closed: false,
		self_closed: false,
	};

	insta::assert_snapshot!(tag.to_string(), @r#"<div a="1" hidden>"#);
}

#[test]
fn state_machine_emits_each_resource_once() -> PackResult<()> {
	let input = r#"<p>x</p><script src="a.js"></script><style>a{}</style><script>var s = "<b>";</script>"#;
	let (buffer, visitor) = scan_markup(input, "t.html", RecordingVisitor::default())?;

	assert_eq!(buffer.stringify(), input);
	assert_eq!(
		visitor.resources,
		vec![
			RecordedResource {
				kind: ResourceKind::Script,
				tag: "script".to_string(),
				begin: r#"<script src="a.js">"#.to_string(),
				source: String::new(),
			},
			RecordedResource {
				kind: ResourceKind::Style,
				tag: "style".to_string(),
				begin: "<style>".to_string(),
				source: "a{}".to_string(),
			},
			RecordedResource {
				kind: ResourceKind::Script,
				tag: "script".to_string(),
				begin: "<script>".to_string(),
				source: r#"var s = "<b>";"#.to_string(),
			},
		]
	);

	Ok(())
}

#[test]
fn state_machine_treats_link_as_empty_style() -> PackResult<()> {
	let input = r#"<link href="/a.css" rel="stylesheet"/>"#;
	let (buffer, visitor) = scan_markup(input, "t.html", RecordingVisitor::default())?;

	assert_eq!(buffer.stringify(), input);
	assert_eq!(
		visitor.resources,
		vec![RecordedResource {
			kind: ResourceKind::Style,
			tag: "link".to_string(),
			begin: input.to_string(),
			source: String::new(),
		}]
	);

	Ok(())
}

#[rstest]
#[case::disabled_style("<style disabled>a{}</style>")]
#[case::link_without_href(r#"<link rel="icon"/>"#)]
#[case::self_closed_script(r#"<script src="a.js"/>"#)]
#[case::stray_close("</style><p>x</p>")]
fn state_machine_ignores_non_regions(#[case] input: &str) -> PackResult<()> {
	let (buffer, visitor) = scan_markup(input, "t.html", RecordingVisitor::default())?;

	assert_eq!(buffer.stringify(), input);
	assert!(visitor.resources.is_empty());

	Ok(())
}

#[test]
fn state_machine_keeps_comments_inside_regions_as_text() {
	let mut machine = StateMachine::new(RecordingVisitor::default());
	for event in tokenize("<style>") {
		machine.feed(&event);
	}
	assert_eq!(machine.state(), ContentState::Style);

	machine.feed_comment(&CommentEvent {
		source: "<!-- @STYLE -->".to_string(),
		comment: " @STYLE ".to_string(),
	});
	for event in tokenize("a{}</style>") {
		machine.feed(&event);
	}

	assert_eq!(machine.state(), ContentState::Text);
	assert_eq!(machine.previous_state(), ContentState::Style);
	assert_eq!(machine.dump().stringify(), "<style><!-- @STYLE -->a{}</style>");

	let visitor = machine.visitor();
	assert!(visitor.directives.is_empty());
	assert_eq!(visitor.resources.len(), 1);
	assert_eq!(visitor.resources[0].source, "<!-- @STYLE -->a{}");
}

#[test]
fn state_machine_reports_unclosed_region() {
	let result = scan_markup("<script>var a;", "t.html", PassThrough);

	assert!(matches!(
		result,
		Err(PackError::UnclosedRegion { ref tag, ref file }) if tag == "script" && file == "t.html"
	));
}

#[rstest]
#[case::open(" @STYLE {core:false} ", "STYLE", Some(json!({"core": false})), false)]
#[case::close(" /@STYLE ", "STYLE", None, true)]
#[case::lower_case(" @merge {name:'m', minify:true}", "MERGE", Some(json!({"name": "m", "minify": true})), false)]
#[case::without_payload("@IGNORE", "IGNORE", None, false)]
#[case::free_identifier("@SCRIPT {core: window.core}", "SCRIPT", None, false)]
fn parse_directives(
	#[case] comment: &str,
	#[case] command: &str,
	#[case] config: Option<serde_json::Value>,
	#[case] closed: bool,
) {
	let directive = parse_directive(comment).unwrap_or_else(|| panic!("not a directive: {comment}"));

	assert_eq!(directive.command, command);
	assert_eq!(directive.config, config);
	assert_eq!(directive.closed, closed);
}

#[rstest]
#[case::plain(" just a comment ")]
#[case::empty("")]
#[case::at_inside("contact me @ home")]
fn parse_directive_ignores_plain_comments(#[case] comment: &str) {
	assert_eq!(parse_directive(comment), None);
}

#[rstest]
#[case::object("{a:1, 'b':\"x\", c:[1,2,],}", Some(json!({"a": 1, "b": "x", "c": [1, 2]})))]
#[case::nested("{a:{b:{c:null}}}", Some(json!({"a": {"b": {"c": null}}})))]
#[case::undefined("{a:undefined}", Some(json!({"a": null})))]
#[case::numbers("[-2, 1.5, 0]", Some(json!([-2, 1.5, 0])))]
#[case::empty("", None)]
#[case::trailing_tokens("{a:1} extra", None)]
#[case::member_access("{a:window.x}", None)]
#[case::call("{a:alert(1)}", None)]
#[case::unbalanced("{a:1", None)]
#[case::escaped_single_quote(r"{a:'it\'s'}", Some(json!({"a": "it's"})))]
#[case::escaped_double_quote(r#"{a:"say \"hi\""}"#, Some(json!({"a": "say \"hi\""})))]
#[case::double_quote_in_single(r#"{a:'say "hi"'}"#, Some(json!({"a": "say \"hi\""})))]
#[case::newline_escape(r#"{a:"x\ny"}"#, Some(json!({"a": "x\ny"})))]
#[case::escaped_backslash(r"{a:'c:\\dir'}", Some(json!({"a": "c:\\dir"})))]
#[case::escaped_key(r"{'k\'ey':1}", Some(json!({"k'ey": 1})))]
fn parse_literals(#[case] source: &str, #[case] expected: Option<serde_json::Value>) {
	assert_eq!(parse_literal(source), expected);
}

#[test]
fn directive_truthiness() {
	let directive = parse_directive("@MERGE {a:1, b:0, c:'', d:'x', e:[], f:false}")
		.unwrap_or_else(|| panic!("not a directive"));

	assert!(directive.truthy("a"));
	assert!(!directive.truthy("b"));
	assert!(!directive.truthy("c"));
	assert!(directive.truthy("d"));
	assert!(directive.truthy("e"));
	assert!(!directive.truthy("f"));
	assert!(!directive.truthy("missing"));
	assert_eq!(directive.flag("f"), Some(false));
	assert_eq!(directive.flag("a"), None);
}

#[test]
fn builder_collects_style_region() -> PackResult<()> {
	let mut cache = MemoryCache::new();
	let document = page(STYLE_PAGE, &mut cache)?;

	assert_eq!(
		document.page.styles,
		vec![
			"/w/src/css/base.css".to_string(),
			"/w/src/index.html#style0".to_string(),
		]
	);
	assert_eq!(
		document.style_config,
		Some(ResourceConfig {
			filename: String::new(),
			core: Some(false),
			inline: false,
		})
	);
	assert_eq!(cache.get("/w/src/index.html#style0"), Some(".page{color:red}"));
	assert!(document.style_point.is_some());
	assert_eq!(document.stringify(), "<html><head>\n\n\n\n\n</head></html>");

	Ok(())
}

#[test]
fn document_scan_visits_entries_in_order() -> PackResult<()> {
	let mut cache = MemoryCache::new();
	let mut document = page(SCRIPT_PAGE, &mut cache)?;
	let point = document.script_point.unwrap_or_else(|| panic!("no script point"));

	let mut seen = vec![];
	document.scan(|index, entry| {
		seen.push(index);
		if index == point {
			entry.push_str("<!-- scripts -->");
		}
	});

	assert_eq!(seen, (0..document.buffer.len()).collect::<Vec<_>>());
	assert_eq!(
		document.stringify(),
		"<body>\n<!-- scripts -->\n\n\n</body>"
	);

	Ok(())
}

#[test]
fn builder_resolves_references() -> PackResult<()> {
	let mut cache = MemoryCache::new();
	let input = r#"<!-- @SCRIPT -->
<script src="./lib/../js/a.js?v=2"></script>
<script src="/js/b.js#main"></script>
<script src="https://cdn.test/c.js"></script>
<!-- /@SCRIPT -->"#;
	let document = page(input, &mut cache)?;

	assert_eq!(
		document.page.scripts,
		vec!["/w/src/js/a.js".to_string(), "/w/src/js/b.js".to_string()]
	);
	assert!(document.stringify().contains(r#"<script src="https://cdn.test/c.js"></script>"#));

	Ok(())
}

#[test]
fn builder_skips_ignored_regions() -> PackResult<()> {
	let mut cache = MemoryCache::new();
	let input = r#"<!-- @SCRIPT -->
<script src="/js/a.js"></script>
<!-- @IGNORE --><script src="/js/debug.js"></script><!-- /@IGNORE -->
<!-- /@SCRIPT -->"#;
	let document = page(input, &mut cache)?;

	assert_eq!(document.page.scripts, vec!["/w/src/js/a.js".to_string()]);
	assert!(document.stringify().contains(r#"<script src="/js/debug.js"></script>"#));

	Ok(())
}

#[test]
fn builder_keeps_unknown_directives() -> PackResult<()> {
	let mut cache = MemoryCache::new();
	let input = "<p>a</p><!-- @FOO {a:1} --><p>b</p><!-- /@FOO --><!-- note -->";
	let document = page(input, &mut cache)?;

	assert_eq!(document.stringify(), input);

	Ok(())
}

#[test]
fn builder_collects_merge_groups() -> PackResult<()> {
	let mut cache = MemoryCache::new();
	let document = page(MERGE_PAGE, &mut cache)?;

	assert_eq!(document.merge_groups.len(), 1);
	let group = &document.merge_groups[0];
	assert_eq!(group.config.name.as_deref(), Some("widgets"));
	assert!(group.config.minify);
	assert_eq!(
		group.scripts,
		vec!["/w/src/a.js".to_string(), "/w/src/b.js".to_string()]
	);

	Ok(())
}

#[rstest]
#[case::page("/w/src/html/user/index.html", "/w/src/", DocumentKind::Page, "p_html_user_index")]
#[case::template("/w/src/views/a/b.ftl", "/w/src/views/", DocumentKind::Template, "t_a_b")]
#[case::no_extension("/w/src/readme", "/w/src/", DocumentKind::Page, "p_readme")]
#[case::dotted_dir("/w/src/v1.2/index.html", "/w/src/", DocumentKind::Page, "p_v1.2_index")]
fn output_names(
	#[case] file: &str,
	#[case] root: &str,
	#[case] kind: DocumentKind,
	#[case] expected: &str,
) {
	assert_eq!(output_name(file, root, kind), expected);
}

#[rstest]
#[case::parent("/w/src/html/../css/./a.css", "/w/src/css/a.css")]
#[case::relative("a/./b/../c", "a/c")]
#[case::above_root("/../a", "/a")]
fn normalizes_segments(#[case] path: &str, #[case] expected: &str) {
	assert_eq!(normalize_segments(path), expected);
}

#[test]
fn split_moves_core_entries() {
	let mut list = vec!["a".to_string(), "b".to_string(), "c".to_string()];
	let removed = split(&mut list, &["b".to_string(), "z".to_string()]);

	assert_eq!(removed, vec!["b".to_string()]);
	assert_eq!(list, vec!["a".to_string(), "c".to_string()]);
}

#[rstest]
#[case::all(ListType::All, vec!["/w/src/js/a.js", "/w/src/js/a.js", "/w/src/js/b.js"])]
#[case::resources(ListType::Resources, vec!["/w/src/js/a.js"])]
#[case::templates(ListType::Templates, vec!["/w/src/js/b.js"])]
fn dependency_lists(#[case] list_type: ListType, #[case] expected: Vec<&str>) -> PackResult<()> {
	let mut cache = MemoryCache::new();
	let input = r#"<!-- @SCRIPT --><script src="/js/a.js"></script><!-- /@SCRIPT -->
<!-- @TEMPLATE --><script src="/js/a.js"></script><script src="/js/b.js"></script><!-- /@TEMPLATE -->"#;
	let document = page(input, &mut cache)?;

	let result = dependencies(&document, DependencyQuery::new(ResourceType::Script, list_type));
	assert_eq!(result, expected);

	Ok(())
}

#[test]
fn dependencies_respect_core_opt_out() -> PackResult<()> {
	let mut cache = MemoryCache::new();
	let document = page(STYLE_PAGE, &mut cache)?;

	let query = DependencyQuery {
		res_type: ResourceType::Style,
		list_type: ListType::All,
		check_core_config: true,
		ignore_entry: false,
	};
	assert!(dependencies(&document, query).is_empty());

	Ok(())
}

#[test]
fn dependencies_skip_inline_entries() -> PackResult<()> {
	let mut cache = MemoryCache::new();
	let input = r#"<!-- @SCRIPT --><script src="/js/a.js"></script><script>var x;</script><!-- /@SCRIPT -->"#;
	let document = page(input, &mut cache)?;

	let all = dependencies(&document, DependencyQuery::new(ResourceType::Script, ListType::All));
	assert_eq!(all, vec!["/w/src/js/a.js", "/w/src/index.html#script0"]);

	let query = DependencyQuery {
		ignore_entry: true,
		..DependencyQuery::new(ResourceType::Script, ListType::All)
	};
	assert_eq!(dependencies(&document, query), vec!["/w/src/js/a.js"]);

	Ok(())
}

#[test]
fn template_dependencies_list_modules_then_regions() -> PackResult<()> {
	let mut cache = MemoryCache::new();
	let input = r#"<!-- @TEMPLATE --><textarea name="txt" id="row">r</textarea><textarea name="ntp" id="ext" data-src="./ext.html"></textarea><!-- /@TEMPLATE -->
<!-- @MODULE --><textarea name="html" id="mod">m</textarea><!-- /@MODULE -->"#;
	let document = page(input, &mut cache)?;

	let ids: Vec<&str> = template_dependencies(&document)
		.into_iter()
		.map(|fragment| fragment.id.as_str())
		.collect();
	assert_eq!(ids, vec!["mod", "row", "ext"]);

	Ok(())
}

#[test]
#[traced_test]
fn dependencies_warn_without_config() {
	let document = Document::new(PAGE_FILE, DocumentKind::Page);
	let result = dependencies(&document, DependencyQuery::new(ResourceType::Style, ListType::All));

	assert!(result.is_empty());
	assert!(logs_contain("no resource config for document"));
}

#[test]
fn merge_splits_core_resources() -> PackResult<()> {
	let mut cache = cache_with(&[("/w/src/css/base.css", "base{}"), ("/w/src/css/a.css", "a{}")]);
	let input = r#"<!-- @STYLE -->
<link href="/css/base.css" rel="stylesheet"/>
<link href="/css/a.css" rel="stylesheet"/>
<!-- /@STYLE -->"#;
	let mut document = page(input, &mut cache)?;

	begin_merge(&mut document, WEB_ROOT);
	let bundles = merge_style(&mut document, &["/w/src/css/base.css".to_string()], &mut cache);

	assert_eq!(bundles, vec!["pp_index.css".to_string()]);
	assert_eq!(cache.get("pp_index.css"), Some("a{}"));
	let config = document.style_config.as_ref().map(|config| (config.filename.as_str(), config.core));
	assert_eq!(config, Some(("p_index", Some(true))));

	Ok(())
}

#[test]
fn merge_keeps_core_resources_when_opted_out() -> PackResult<()> {
	let mut cache = cache_with(&[("/w/src/css/base.css", "base{}")]);
	let mut document = page(STYLE_PAGE, &mut cache)?;

	begin_merge(&mut document, WEB_ROOT);
	merge_style(&mut document, &["/w/src/css/base.css".to_string()], &mut cache);

	assert_eq!(cache.get("pp_index.css"), Some("base{}\n.page{color:red}"));
	assert_eq!(document.style_config.and_then(|config| config.core), Some(false));

	Ok(())
}

#[rstest]
#[case::at_limit(1000, true)]
#[case::above_limit(1001, false)]
fn embed_inlines_up_to_max_size(#[case] size: usize, #[case] inlined: bool) -> PackResult<()> {
	let content = "a".repeat(size);
	let mut cache = cache_with(&[("/w/src/css/a.css", content.as_str())]);
	let input = r#"<!-- @STYLE --><link href="/css/a.css" rel="stylesheet"/><!-- /@STYLE -->"#;
	let mut document = page(input, &mut cache)?;
	let config = EmbedConfig {
		max_size: 1.0,
		..EmbedConfig::default()
	};

	begin_merge(&mut document, WEB_ROOT);
	merge_style(&mut document, &[], &mut cache);
	embed_style(&mut document, &config, &cache);

	let expected = if inlined {
		format!(r#"<style type="text/css">{content}</style>"#)
	} else {
		r#"<link href="<cs:pp_index>" type="text/css" rel="stylesheet"/>"#.to_string()
	};
	assert_eq!(document.stringify(), expected);
	assert_eq!(document.style_point, None);

	Ok(())
}

#[test]
fn embed_inlines_core_exempt_style_body() -> PackResult<()> {
	let mut cache = MemoryCache::new();
	let input = "<!--@STYLE {core:false}--><style>a{color:red}</style><!--/@STYLE-->";
	let mut document = page(input, &mut cache)?;
	let config = EmbedConfig {
		max_size: 1.0,
		..EmbedConfig::default()
	};

	begin_merge(&mut document, WEB_ROOT);
	let bundles = merge_style(&mut document, &[], &mut cache);
	embed_style(&mut document, &config, &cache);

	assert_eq!(bundles, vec!["pp_index.css".to_string()]);
	assert_eq!(cache.get("pp_index.css"), Some("a{color:red}"));
	assert_eq!(document.stringify(), r#"<style type="text/css">a{color:red}</style>"#);
	assert_eq!(document.style_point, None);

	Ok(())
}

#[test]
fn embed_template_is_idempotent() -> PackResult<()> {
	let mut cache = MemoryCache::new();
	let markup = r#"<textarea name="jst" id="tpl-a">{a}</textarea>"#;
	let input = format!("<!-- @TEMPLATE -->\n{markup}\n<!-- /@TEMPLATE -->");
	let mut document = page(&input, &mut cache)?;
	let config = EmbedConfig::default();

	assert_eq!(document.templates[0].explorer.templates[0].id, "tpl-a");

	embed_template(&mut document, &config);
	let first = document.stringify();
	embed_template(&mut document, &config);

	assert_eq!(first, format!("{markup}\n\n"));
	assert_eq!(document.stringify(), first);

	Ok(())
}

#[test]
fn embed_template_writes_modules() -> PackResult<()> {
	let mut cache = MemoryCache::new();
	let input = "<!-- @MODULE -->\n<textarea name=\"html\" id=\"m-a\">hi</textarea>\n<!-- /@MODULE -->";
	let mut document = page(input, &mut cache)?;

	embed_template(&mut document, &EmbedConfig::default());

	assert_eq!(
		document.stringify(),
		"<div style=\"display:none\" id=\"m-a\">\nhi\n</div>\n\n"
	);
	assert_eq!(document.module_point, None);

	Ok(())
}

#[test]
fn embed_merge_groups_minifies_and_caches() -> PackResult<()> {
	let mut cache = cache_with(&[
		("/w/src/a.js", "var a = 1; // first\n"),
		("/w/src/b.js", "/* second */\nvar b = 2;"),
	]);
	let mut document = page(MERGE_PAGE, &mut cache)?;

	embed_merge_groups(&mut document, WEB_ROOT, &EmbedConfig::default(), &CommentStripper, &mut cache)?;

	assert_eq!(cache.get("widgets.js"), Some("var a = 1;\nvar b = 2;"));
	assert!(document.stringify().starts_with(
		"<script type=\"text/javascript\">var a = 1;\nvar b = 2;</script>"
	));

	Ok(())
}

#[test]
fn embed_merge_groups_consumes_insertion_points() -> PackResult<()> {
	struct Counting(Cell<usize>);

	impl Minifier for Counting {
		fn minify(&self, _name: &str, source: &str) -> PackResult<String> {
			self.0.set(self.0.get() + 1);
			Ok(source.to_string())
		}
	}

	let minifier = Counting(Cell::new(0));
	let mut cache = cache_with(&[("/w/src/a.js", "var a;"), ("/w/src/b.js", "var b;")]);
	let mut document = page(MERGE_PAGE, &mut cache)?;
	let pointer = document.merge_groups[0].pointer;
	assert!(pointer.is_some());

	embed_merge_groups(&mut document, WEB_ROOT, &EmbedConfig::default(), &minifier, &mut cache)?;
	assert_eq!(document.merge_groups[0].pointer, None);

	if let Some(entry) = pointer.and_then(|index| document.buffer.get_mut(index)) {
		*entry = "CHANGED".to_string();
	}
	embed_merge_groups(&mut document, WEB_ROOT, &EmbedConfig::default(), &minifier, &mut cache)?;

	assert_eq!(minifier.0.get(), 1);
	assert!(document.stringify().starts_with("CHANGED"));

	Ok(())
}

#[test]
fn embed_merge_groups_names_unnamed_groups() -> PackResult<()> {
	let mut cache = cache_with(&[("/w/src/a.js", "var a;")]);
	let input = r#"<!-- @MERGE --><script src="./a.js"></script><!-- /@MERGE -->"#;
	let mut document = page(input, &mut cache)?;

	embed_merge_groups(&mut document, WEB_ROOT, &EmbedConfig::default(), &CommentStripper, &mut cache)?;

	assert_eq!(cache.get("p_index_m0.js"), Some("var a;"));
	assert_eq!(document.merge_groups[0].config.name.as_deref(), Some("p_index_m0"));

	Ok(())
}

#[rstest]
#[case::lower("a</script>b", "script", "a<&#47;script>b")]
#[case::mixed_case("</SCRIPT></Script>", "script", "<&#47;SCRIPT><&#47;Script>")]
#[case::untouched("</scripts>", "script", "</scripts>")]
#[case::textarea("x</textarea>", "textarea", "x<&#47;textarea>")]
fn escapes_closing_tags(#[case] content: &str, #[case] name: &str, #[case] expected: &str) {
	assert_eq!(escape_closing_tag(content, name), expected);
}

#[rstest]
#[case::two_args(r#"<div id="%s">%s</div>"#, &["a", "b"], r#"<div id="a">b</div>"#)]
#[case::missing_arg("%s-%s", &["a"], "a-%s")]
#[case::no_placeholder("plain", &["a"], "plain")]
fn formats_wrappers(#[case] template: &str, #[case] args: &[&str], #[case] expected: &str) {
	assert_eq!(format_wrap(template, args), expected);
}

#[rstest]
#[case::query(VersionMode::Query, "pp_a", "h")]
#[case::filename(VersionMode::Filename, "h", "")]
#[case::counter(VersionMode::Counter, "pp_a", "3")]
#[case::pattern_file(VersionMode::from("[FILENAME]_[VERSION]".to_string()), "pp_a_h", "")]
#[case::pattern_query(VersionMode::from("[FILENAME]?v=[RAND]".to_string()), "pp_a", "v=3")]
fn applies_version_modes(#[case] mode: VersionMode, #[case] file: &str, #[case] version: &str) {
	let versioned = mode.apply("pp_a", "h", 3);

	assert_eq!(
		versioned,
		Versioned {
			file: file.to_string(),
			version: version.to_string(),
		}
	);
}

#[rstest]
#[case::child("/w/pub", "/w/pub/s/a.js", "s/a.js")]
#[case::sibling("/w/pub/html", "/w/pub/s/a.js", "../s/a.js")]
#[case::same("/w/pub", "/w/pub", "")]
fn relative_paths(#[case] from: &str, #[case] to: &str, #[case] expected: &str) {
	assert_eq!(relative_path(from, to), expected);
}

#[test]
fn domain_pool_rotates() {
	let mut pool = DomainPool::new(&["https://a.test".to_string(), "https://b.test/".to_string()]);

	assert_eq!(pool.next_domain().as_deref(), Some("https://a.test/"));
	assert_eq!(pool.next_domain().as_deref(), Some("https://b.test/"));
	assert_eq!(pool.next_domain().as_deref(), Some("https://a.test/"));
	assert_eq!(DomainPool::new(&[]).next_domain(), None);
}

#[test]
fn unwrap_uris_replaces_tagged_references() -> PackResult<()> {
	let result = unwrap_uris("a <b> <js:x> <<cs:y> <p:>", |kind, uri| Ok(format!("[{kind}|{uri}]")))?;
	assert_eq!(result, "a <b> [js|x] <[cs|y] <p:>");

	Ok(())
}

#[test]
fn content_hash_is_sha256_hex() {
	assert_eq!(
		content_hash(b"var a = 1;"),
		"f9d67ab9db16c4d56819f49c02aeede48205e5425be05e918636cdea87b5a78c"
	);
}

fn page_context() -> FormatContext {
	FormatContext {
		output: "/w/pub/index.html".to_string(),
		from_page: true,
		is_template: false,
	}
}

#[rstest]
#[case::relative(Pool::Resource, &[], false, "../src/img/a.png")]
#[case::domain(Pool::Resource, &["https://cdn.test"], false, "https://cdn.test/img/a.png")]
#[case::template_root(Pool::Resource, &[], true, "/img/a.png")]
#[case::no_pool(Pool::Relative, &["https://cdn.test"], false, "../src/img/a.png")]
fn formats_uris(
	#[case] pool: Pool,
	#[case] domains: &[&str],
	#[case] is_template: bool,
	#[case] expected: &str,
) {
	let mut config = PackConfig::default();
	config.domains.resource = domains.iter().map(ToString::to_string).collect();
	let mut formatter = UriFormatter::new(&config, test_dirs());

	let uri = formatter.format_uri("/w/src/img/a.png", "/w/pub/index.html", true, is_template, pool);
	assert_eq!(uri, expected);
}

#[test]
fn format_content_resolves_static_resources() -> PackResult<()> {
	let mut config = PackConfig::default();
	config.version.static_resources = true;
	let mut formatter = UriFormatter::new(&config, test_dirs());
	let mut cache = cache_with(&[("/w/src/img/a.png", "PNG")]);

	let content = r#"<img src="<rs:/w/src/img/a.png>"/><img src="<rs:/w/src/img/a.png?v=1>"/>"#;
	let result = formatter.format_content(content, &page_context(), &mut cache)?;

	let hash = content_hash(b"PNG");
	assert_eq!(
		result,
		format!(r#"<img src="../src/img/a.png?{hash}"/><img src="../src/img/a.png?v=1"/>"#)
	);
	assert_eq!(cache.manifest().resources.get("/img/a.png"), Some(&hash));

	Ok(())
}

#[test]
fn format_content_resolves_module_ids_and_manifest() -> PackResult<()> {
	let mut formatter = UriFormatter::new(&PackConfig::default(), test_dirs());
	let mut cache = MemoryCache::new();

	let content = "<umi:/w/src/html/module/a/b.html> <mf:x> <foo:bar>";
	let result = formatter.format_content(content, &page_context(), &mut cache)?;

	assert_eq!(result, "umi://a/b.html ./cache.manifest bar");
	assert!(cache.manifest().manifested);

	Ok(())
}

#[test]
fn format_content_requires_cached_bundles() {
	let mut formatter = UriFormatter::new(&PackConfig::default(), test_dirs());
	let mut cache = MemoryCache::new();

	let result = formatter.format_content("<js:nope>", &page_context(), &mut cache);
	assert!(matches!(result, Err(PackError::MissingBundle(ref key)) if key == "nope.js"));
}

#[test]
fn comment_stripper_removes_comments() -> PackResult<()> {
	let source = "var a = 1; // one\n/* two */\nvar b = '//not';\nvar c = a / b;\n";
	let result = CommentStripper.minify("m", source)?;

	assert_eq!(result, "var a = 1;\nvar b = '//not';\nvar c = a / b;");

	Ok(())
}

#[rstest]
#[case::quote_in_regex("var s = t.replace(/'/g, \"\"); // strip\nvar b = 2;", "var s = t.replace(/'/g, \"\");\nvar b = 2;")]
#[case::slashes_in_regex("var r = /\\/\\//; // two\n", "var r = /\\/\\//;")]
#[case::regex_class("if (/[/*]/.test(x)) {} /* gone */", "if (/[/*]/.test(x)) {}")]
#[case::division_then_string("var d = a / 'x'.length; // len", "var d = a / 'x'.length;")]
fn comment_stripper_keeps_regex_literals(#[case] source: &str, #[case] expected: &str) -> PackResult<()> {
	assert_eq!(CommentStripper.minify("m", source)?, expected);

	Ok(())
}

#[test]
fn comment_stripper_rejects_unterminated_block_comment() {
	let result = CommentStripper.minify("m", "var a; /* open");
	assert!(matches!(result, Err(PackError::Minify { ref name, .. }) if name == "m"));
}

#[rstest]
#[case::string("var s = 'abc // kept")]
#[case::string_newline("var s = 'abc\n'; // kept")]
#[case::regex_after_keyword("return /'/.test(s); // kept\n")]
fn comment_stripper_leaves_unsure_input_unchanged(#[case] source: &str) -> PackResult<()> {
	assert_eq!(CommentStripper.minify("m", source)?, source);

	Ok(())
}

#[test]
#[traced_test]
fn comment_stripper_logs_unminified_bundles() {
	let result = CommentStripper.minify("m", "var s = 'abc");

	assert!(matches!(result, Ok(ref source) if source == "var s = 'abc"));
	assert!(logs_contain("left script unminified"));
}

#[test]
fn config_resolves_directories() {
	let dirs = test_dirs();

	assert_eq!(dirs.source, "/w/src/");
	assert_eq!(dirs.templates, "/w/src/views/");
	assert_eq!(dirs.html_output, "/w/pub/");
	assert_eq!(dirs.static_output, "/w/pub/s/");
	assert_eq!(dirs.manifest_output, "/w/pub/cache.manifest");
}

#[test]
fn config_loads_from_file() -> PackResult<()> {
	let tmp = tempfile::tempdir().unwrap_or_else(|e| panic!("tempdir: {e}"));
	std::fs::write(
		tmp.path().join("pagepack.toml"),
		r#"
[dir]
source = "web/"

[embed]
max_size = 1.5

[version]
mode = "[FILENAME]_[VERSION]"
static = true
"#,
	)?;

	let config = PackConfig::load(tmp.path())?.unwrap_or_else(|| panic!("config not found"));

	assert_eq!(config.dir.source, "web/");
	assert_eq!(config.dir.web, "src/");
	assert_eq!(config.embed.max_bytes(), 1500);
	assert_eq!(config.version.mode, VersionMode::Pattern("[FILENAME]_[VERSION]".to_string()));
	assert!(config.version.static_resources);
	assert_eq!(config.charset, "utf-8");

	Ok(())
}

#[test]
fn config_reports_parse_errors() {
	let tmp = tempfile::tempdir().unwrap_or_else(|e| panic!("tempdir: {e}"));
	std::fs::write(tmp.path().join(".pagepack.toml"), "[embed\nmax_size = 1")
		.unwrap_or_else(|e| panic!("write: {e}"));

	assert!(matches!(PackConfig::load(tmp.path()), Err(PackError::ConfigParse(_))));
}

#[test]
fn config_missing_file_is_none() -> PackResult<()> {
	let tmp = tempfile::tempdir().unwrap_or_else(|e| panic!("tempdir: {e}"));
	assert!(PackConfig::load(tmp.path())?.is_none());

	Ok(())
}

#[test]
fn project_inlines_small_bundles() -> PackResult<()> {
	let mut cache = cache_with(&[
		("/w/src/css/a.css", "a{color:red}"),
		("/w/src/js/a.js", "var s = '</script>';"),
	]);
	let input = format!(
		"<head>\n<!-- @STYLE -->\n<link href=\"/css/a.css\" rel=\"stylesheet\"/>\n<!-- /@STYLE \
		 -->\n</head>{SCRIPT_PAGE}"
	);
	let document = page(&input, &mut cache)?;
	let mut project = project_with(PackConfig::default(), vec![document], cache);

	let report = project.build(&CommentStripper)?;

	assert_eq!(report.documents[0].output, "/w/pub/index.html");
	assert_eq!(
		report.documents[0].bundles,
		vec!["pp_index.css".to_string(), "pp_index.js".to_string()]
	);

	let output = &project.cache.outputs()["/w/pub/index.html"].content;
	assert_eq!(
		output,
		"<head>\n<style type=\"text/css\">a{color:red}</style>\n\n\n</head><body>\n<script \
		 type=\"text/javascript\">var s = '<&#47;script>';</script>\n\n\n</body>"
	);
	assert_eq!(project.documents[0].style_point, None);

	Ok(())
}

#[test]
fn project_links_large_bundles_with_version() -> PackResult<()> {
	let mut cache = cache_with(&[("/w/src/js/a.js", "var a = 1;")]);
	let document = page(SCRIPT_PAGE, &mut cache)?;
	let mut config = PackConfig::default();
	config.embed.max_size = 0.001;
	let mut project = project_with(config, vec![document], cache);

	project.build(&CommentStripper)?;

	let hash = "f9d67ab9db16c4d56819f49c02aeede48205e5425be05e918636cdea87b5a78c";
	let outputs = project.cache.outputs();
	assert_eq!(
		outputs["/w/pub/index.html"].content,
		format!(
			"<body>\n<script src=\"./s/pp_index.js?{hash}\" \
			 type=\"text/javascript\"></script>\n\n\n</body>"
		)
	);
	assert_eq!(outputs["/w/pub/s/pp_index.js"].content, "var a = 1;");
	assert_eq!(
		project.cache.manifest().resources.get("/w/pub/s/pp_index.js"),
		Some(&hash.to_string())
	);

	Ok(())
}

#[test]
fn project_merges_core_bundle() -> PackResult<()> {
	let mut cache = cache_with(&[("/w/src/css/base.css", "base{}"), ("/w/src/css/a.css", "a{}")]);
	let input = r#"<!-- @STYLE -->
<link href="/css/base.css" rel="stylesheet"/>
<link href="/css/a.css" rel="stylesheet"/>
<!-- /@STYLE -->"#;
	let document = page(input, &mut cache)?;
	let mut config = PackConfig::default();
	config.core.styles = vec!["src/css/base.css".to_string()];
	let mut project = project_with(config, vec![document], cache);

	let report = project.build(&CommentStripper)?;

	assert_eq!(report.core_styles, vec!["/w/src/css/base.css".to_string()]);
	let hash = content_hash(b"base{}");
	let output = &project.cache.outputs()["/w/pub/index.html"].content;
	assert!(output.starts_with(&format!(
		"<link href=\"./s/core.css?{hash}\" type=\"text/css\" rel=\"stylesheet\"/>\n<style \
		 type=\"text/css\">a{{}}</style>"
	)));
	assert_eq!(project.cache.outputs()["/w/pub/s/core.css"].content, "base{}");
	assert_eq!(
		project.documents[0].style_config.as_ref().and_then(|config| config.core),
		Some(true)
	);

	Ok(())
}

#[test]
fn project_counts_shared_resources_as_core() -> PackResult<()> {
	let mut cache = MemoryCache::new();
	let first = page(
		r#"<!-- @STYLE --><link href="/css/base.css" rel="stylesheet"/><link href="/css/a.css" rel="stylesheet"/><!-- /@STYLE -->"#,
		&mut cache,
	)?;
	let second = builder::build_document(
		"/w/src/b.html",
		r#"<!-- @STYLE --><link href="/css/base.css" rel="stylesheet"/><!-- /@STYLE -->"#,
		DocumentKind::Page,
		WEB_ROOT,
		&mut cache,
	)?;
	let mut config = PackConfig::default();
	config.core.min_shared = 2;
	let project = project_with(config, vec![first, second], cache);

	assert_eq!(
		project.core_list(ResourceType::Style),
		vec!["/w/src/css/base.css".to_string()]
	);
	assert!(project.core_list(ResourceType::Script).is_empty());

	Ok(())
}

#[test]
fn project_wraps_template_blocks() -> PackResult<()> {
	let mut cache = cache_with(&[("/w/src/css/a.css", "a{}")]);
	let document = template(
		r#"<!-- @STYLE --><link href="/css/a.css" rel="stylesheet"/><!-- /@STYLE -->"#,
		&mut cache,
	)?;
	let mut config = PackConfig::default();
	config.embed.source_wrap = "<#noparse>%s</#noparse>".to_string();
	let mut project = project_with(config, vec![document], cache);

	let report = project.build(&CommentStripper)?;

	assert_eq!(report.documents[0].output, "/w/pub/views/a.ftl");
	assert_eq!(report.documents[0].bundles, vec!["pt_a.css".to_string()]);
	assert_eq!(
		project.cache.outputs()["/w/pub/views/a.ftl"].content,
		"<#noparse><style type=\"text/css\">a{}</style></#noparse>"
	);

	Ok(())
}

#[test]
fn project_fills_template_regions() -> PackResult<()> {
	let mut cache = cache_with(&[
		("/w/src/js/a.js", "var a;"),
		("/w/src/js/b.js", "var b = '</textarea>';"),
	]);
	let input = r#"<!-- @SCRIPT --><script src="/js/a.js"></script><!-- /@SCRIPT -->
<!-- @TEMPLATE -->
<textarea name="jst" id="t1">{a}</textarea>
<script src="/js/b.js"></script>
<textarea name="html" data-src="./list.html"></textarea>
<!-- /@TEMPLATE -->"#;
	let document = page(input, &mut cache)?;
	let mut project = project_with(PackConfig::default(), vec![document], cache);

	let report = project.build(&CommentStripper)?;

	assert_eq!(
		report.documents[0].bundles,
		vec!["pp_index.js".to_string(), "tp_index.js".to_string()]
	);
	assert_eq!(
		project.cache.outputs()["/w/pub/index.html"].content,
		"<script type=\"text/javascript\">var a;</script>\n<textarea name=\"jst\" \
		 id=\"t1\">{a}</textarea>\n<textarea name=\"txt\">var b = \
		 '<&#47;textarea>';</textarea>\n<textarea name=\"html\" \
		 data-src=\"./list.html\"></textarea>\n\n\n\n"
	);
	assert!(project.documents[0].templates.is_empty());

	Ok(())
}

#[test]
fn build_project_writes_outputs() -> PackResult<()> {
	let tmp = tempfile::tempdir().unwrap_or_else(|e| panic!("tempdir: {e}"));
	let root = tmp.path();
	std::fs::create_dir_all(root.join("src/css"))?;
	std::fs::create_dir_all(root.join("src/js"))?;
	std::fs::write(root.join("src/css/a.css"), "a{color:red}")?;
	std::fs::write(root.join("src/js/a.js"), "var a = 1;")?;
	std::fs::write(
		root.join("src/index.html"),
		"<head>\n<!-- @STYLE --><link href=\"/css/a.css\" rel=\"stylesheet\"/><!-- /@STYLE \
		 -->\n</head>\n<!-- @SCRIPT --><script src=\"./js/a.js\"></script><!-- /@SCRIPT -->",
	)?;

	let report = build_project(root)?;

	assert_eq!(report.documents.len(), 1);
	assert_eq!(report.written, 2);

	let html = std::fs::read_to_string(root.join("pub/index.html"))?;
	assert_eq!(
		html,
		"<head>\n<style type=\"text/css\">a{color:red}</style>\n</head>\n<script \
		 type=\"text/javascript\">var a = 1;</script>"
	);
	assert!(root.join("pub").join(cache::MANIFEST_FILE_NAME).is_file());

	Ok(())
}

#[test]
fn build_project_skips_excluded_files() -> PackResult<()> {
	let tmp = tempfile::tempdir().unwrap_or_else(|e| panic!("tempdir: {e}"));
	let root = tmp.path();
	std::fs::create_dir_all(root.join("src/legacy"))?;
	std::fs::write(root.join("src/index.html"), "<p>a</p>")?;
	std::fs::write(root.join("src/legacy/old.html"), "<p>b</p>")?;
	std::fs::write(root.join("pagepack.toml"), "[exclude]\npatterns = [\"src/legacy/\"]\n")?;

	let project = project::scan_project(root)?;
	let files: Vec<&str> = project
		.documents
		.iter()
		.map(|document| document.file.as_str())
		.collect();

	assert_eq!(files.len(), 1);
	assert!(files[0].ends_with("src/index.html"));
	assert!(!Path::new(files[0]).starts_with(root.join("src/legacy")));

	Ok(())
}

#[test]
fn scan_project_rejects_invalid_include_patterns() {
	let tmp = tempfile::tempdir().unwrap_or_else(|e| panic!("tempdir: {e}"));
	let mut config = PackConfig::default();
	config.include.patterns = vec!["*.html".to_string(), "*.{htm".to_string()];

	let result = project::scan_project_with_config(tmp.path(), config);

	assert!(matches!(result, Err(PackError::IncludePattern { ref pattern, .. }) if pattern == "*.{htm"));
}
