//! Format-specific document parsers.
//!
//! A [`DocumentParser`] turns the raw bytes of one file into zero or more
//! [`Document`]s. The [`ParserRegistry`] picks a parser by file extension.
//! Parsers do not set the `source` metadata; the loader does.

use std::path::Path;
use std::sync::{Arc, LazyLock};

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::document::{Document, SECTION_KEY};
use crate::error::{RagError, Result};

/// Parses the content of one file into documents.
pub trait DocumentParser: Send + Sync {
    /// File extensions (lowercase, without the dot) handled by this parser.
    fn extensions(&self) -> &[&'static str];

    /// Parse file content into documents.
    ///
    /// `path` is used for error reporting only.
    fn parse(&self, path: &Path, bytes: &[u8]) -> Result<Vec<Document>>;
}

fn decode_utf8<'a>(path: &Path, bytes: &'a [u8]) -> Result<&'a str> {
    std::str::from_utf8(bytes).map_err(|e| RagError::ParseError {
        path: path.to_path_buf(),
        message: format!("content is not valid UTF-8: {e}"),
    })
}

/// Plain text files become a single document.
#[derive(Debug, Clone, Copy, Default)]
pub struct PlainTextParser;

impl DocumentParser for PlainTextParser {
    fn extensions(&self) -> &[&'static str] {
        &["txt"]
    }

    fn parse(&self, path: &Path, bytes: &[u8]) -> Result<Vec<Document>> {
        let text = decode_utf8(path, bytes)?.replace("\r\n", "\n");
        if text.trim().is_empty() {
            return Ok(Vec::new());
        }
        Ok(vec![Document::new(text.trim())])
    }
}

/// How a markdown file is split into documents.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum MarkdownMode {
    /// One document per file.
    #[default]
    Single,
    /// One document per heading section, with the heading path recorded
    /// under the `section` metadata key.
    Sections,
}

/// Markdown files are reduced to plain text before chunking.
///
/// Markup that carries no meaning for retrieval is removed: front matter,
/// heading markers, emphasis, inline code ticks, fences, images, HTML tags,
/// and link targets (the link text is kept). Paragraph breaks survive so the
/// chunker can split on them.
#[derive(Debug, Clone, Copy, Default)]
pub struct MarkdownParser {
    mode: MarkdownMode,
}

impl MarkdownParser {
    /// Create a parser with the given split mode.
    pub fn new(mode: MarkdownMode) -> Self {
        Self { mode }
    }
}

static IMAGE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"!\[([^\]]*)\]\([^)]*\)").expect("valid regex"));
static LINK: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\[([^\]]+)\]\([^)]*\)").expect("valid regex"));
static HTML_TAG: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"</?[A-Za-z][^>]*>").expect("valid regex"));
static EMPHASIS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(\*\*|__|\*|~~|`)").expect("valid regex"));
static LIST_MARKER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\s*(?:[-*+]|\d+[.)])\s+").expect("valid regex"));
static FRONT_MATTER_KEY: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z_][\w.-]*\s*:(?:\s|$)").expect("valid regex"));

/// A markdown section with its heading path and body lines.
struct MarkdownSection {
    heading_path: String,
    lines: Vec<String>,
}

/// Strip inline markup from a single line of text.
fn strip_inline(line: &str) -> String {
    let line = LIST_MARKER.replace(line, "");
    let line = IMAGE.replace_all(&line, "$1");
    let line = LINK.replace_all(&line, "$1");
    let line = HTML_TAG.replace_all(&line, "");
    let line = EMPHASIS.replace_all(&line, "");
    line.trim_end().to_string()
}

/// Remove a leading `---` block of `key: value` lines closed by a `---` line.
///
/// A leading rule followed by prose is not front matter and is left alone.
fn strip_front_matter(text: &str) -> &str {
    let Some(rest) = text.strip_prefix("---\n") else {
        return text;
    };

    let mut offset = 0;
    let mut has_key = false;
    for line in rest.split_inclusive('\n') {
        let content = line.trim_end_matches('\n');
        if content == "---" {
            return if has_key { &rest[offset + line.len()..] } else { text };
        }
        if FRONT_MATTER_KEY.is_match(content) {
            has_key = true;
        } else if !content.trim().is_empty() && !(has_key && is_continuation(content)) {
            return text;
        }
        offset += line.len();
    }
    text
}

/// Nested values and list items under a front matter key.
fn is_continuation(line: &str) -> bool {
    line.starts_with([' ', '\t']) || line.starts_with("- ")
}

/// Parse markdown text into sections split by headings.
fn parse_markdown_sections(text: &str) -> Vec<MarkdownSection> {
    let mut sections = Vec::new();
    let mut headings: Vec<String> = Vec::new();
    let mut current = MarkdownSection { heading_path: String::new(), lines: Vec::new() };
    let mut in_fence = false;

    for line in text.lines() {
        let trimmed = line.trim_start();
        if trimmed.starts_with("```") || trimmed.starts_with("~~~") {
            in_fence = !in_fence;
            continue;
        }
        if in_fence {
            current.lines.push(line.trim_end().to_string());
            continue;
        }

        let level = trimmed.chars().take_while(|c| *c == '#').count();
        let is_heading = (1..=6).contains(&level)
            && trimmed[level..].chars().next().is_none_or(char::is_whitespace);
        if is_heading {
            let heading = strip_inline(trimmed[level..].trim());
            let previous = std::mem::replace(
                &mut current,
                MarkdownSection { heading_path: String::new(), lines: Vec::new() },
            );
            if !previous.heading_path.is_empty() || !previous.lines.is_empty() {
                sections.push(previous);
            }

            headings.truncate(level - 1);
            headings.push(heading.clone());
            current.heading_path = headings.join(" > ");
            current.lines.push(heading);
            current.lines.push(String::new());
        } else if !trimmed.is_empty()
            && trimmed.chars().all(|c| matches!(c, '-' | '*' | '_' | '='))
        {
            // rule or setext underline
            current.lines.push(String::new());
        } else {
            current.lines.push(strip_inline(line.trim_start_matches('>').trim_start()));
        }
    }

    if !current.heading_path.is_empty() || !current.lines.is_empty() {
        sections.push(current);
    }

    sections
}

/// Join lines, collapsing runs of blank lines into one paragraph break.
fn join_paragraphs(lines: &[String]) -> String {
    let mut out = String::new();
    let mut blank_run = false;
    for line in lines {
        if line.trim().is_empty() {
            blank_run = !out.is_empty();
            continue;
        }
        if blank_run {
            out.push_str("\n\n");
        } else if !out.is_empty() {
            out.push('\n');
        }
        out.push_str(line);
        blank_run = false;
    }
    out
}

impl DocumentParser for MarkdownParser {
    fn extensions(&self) -> &[&'static str] {
        &["md", "markdown"]
    }

    fn parse(&self, path: &Path, bytes: &[u8]) -> Result<Vec<Document>> {
        let text = decode_utf8(path, bytes)?.replace("\r\n", "\n");
        let sections = parse_markdown_sections(strip_front_matter(&text));

        match self.mode {
            MarkdownMode::Single => {
                let lines: Vec<String> = sections
                    .into_iter()
                    .flat_map(|section| section.lines.into_iter().chain([String::new()]))
                    .collect();
                let body = join_paragraphs(&lines);
                if body.is_empty() { Ok(Vec::new()) } else { Ok(vec![Document::new(body)]) }
            }
            MarkdownMode::Sections => Ok(sections
                .into_iter()
                .filter_map(|section| {
                    let body = join_paragraphs(&section.lines);
                    if body.is_empty() {
                        return None;
                    }
                    let mut document = Document::new(body);
                    if !section.heading_path.is_empty() {
                        document = document.with_metadata(SECTION_KEY, section.heading_path);
                    }
                    Some(document)
                })
                .collect()),
        }
    }
}

/// Selects a [`DocumentParser`] by file extension.
#[derive(Clone, Default)]
pub struct ParserRegistry {
    parsers: Vec<Arc<dyn DocumentParser>>,
}

impl ParserRegistry {
    /// An empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Markdown and plain text parsers.
    pub fn with_defaults(markdown_mode: MarkdownMode) -> Self {
        Self::new()
            .register(Arc::new(MarkdownParser::new(markdown_mode)))
            .register(Arc::new(PlainTextParser))
    }

    /// Add a parser. Earlier registrations win for shared extensions.
    pub fn register(mut self, parser: Arc<dyn DocumentParser>) -> Self {
        self.parsers.push(parser);
        self
    }

    /// The parser responsible for `path`, if any.
    pub fn for_path(&self, path: &Path) -> Option<&Arc<dyn DocumentParser>> {
        let ext = path.extension()?.to_str()?.to_ascii_lowercase();
        self.parsers.iter().find(|p| p.extensions().contains(&ext.as_str()))
    }

    /// Whether some parser handles `path`.
    pub fn supports(&self, path: &Path) -> bool {
        self.for_path(path).is_some()
    }
}

impl std::fmt::Debug for ParserRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let extensions: Vec<_> = self.parsers.iter().flat_map(|p| p.extensions().iter()).collect();
        f.debug_struct("ParserRegistry").field("extensions", &extensions).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const GUIDE: &str = "---\ntitle: Guide\n---\n# Networks\n\n\
        A **virtual network** links [subnets](https://example.com/s).\n\n\
        ## Peering\n\nPeering works across `tenants`.\n<br/>\n- item one\n- item two\n";

    #[test]
    fn single_mode_strips_markup_and_keeps_paragraphs() {
        let docs = MarkdownParser::default().parse(Path::new("g.md"), GUIDE.as_bytes()).unwrap();
        assert_eq!(docs.len(), 1);
        let text = &docs[0].text;
        assert!(text.starts_with("Networks\n\nA virtual network links subnets."));
        assert!(text.contains("Peering works across tenants."));
        assert!(text.contains("item one\nitem two"));
        assert!(!text.contains("title: Guide"));
        assert!(!text.contains('#'));
        assert!(!text.contains("https://"));
    }

    #[test]
    fn sections_mode_records_heading_path() {
        let parser = MarkdownParser::new(MarkdownMode::Sections);
        let docs = parser.parse(Path::new("g.md"), GUIDE.as_bytes()).unwrap();
        assert_eq!(docs.len(), 2);
        assert_eq!(docs[0].metadata.get(SECTION_KEY).unwrap(), "Networks");
        assert_eq!(docs[1].metadata.get(SECTION_KEY).unwrap(), "Networks > Peering");
        assert!(docs[1].text.contains("Peering works across tenants."));
    }

    #[test]
    fn front_matter_with_nested_values_is_removed() {
        let md = "---\ntitle: Peering\ntags:\n  - network\n- routing\n\n\
                  owner: net-team\n---\nBody text.\n";
        let docs = MarkdownParser::default().parse(Path::new("p.md"), md.as_bytes()).unwrap();
        assert_eq!(docs[0].text, "Body text.");
    }

    #[test]
    fn leading_rule_before_prose_is_not_front_matter() {
        let md = "---\nIntro about routing tables.\n\n---\n\nMore about next hops.\n";
        let docs = MarkdownParser::default().parse(Path::new("r.md"), md.as_bytes()).unwrap();
        assert!(docs[0].text.contains("Intro about routing tables."));
        assert!(docs[0].text.contains("More about next hops."));
    }

    #[test]
    fn front_matter_needs_a_closing_line_of_its_own() {
        let md = "---\ntitle: Draft\n---more dashes\nBody text.\n";
        assert_eq!(strip_front_matter(md), md);
        assert_eq!(strip_front_matter("---\ntitle: Draft\n"), "---\ntitle: Draft\n");
        assert_eq!(strip_front_matter("---\ntitle: Draft\n---"), "");
    }

    #[test]
    fn fenced_code_is_kept_verbatim() {
        let md = "Intro\n\n```rust\nlet x = *y;\n```\n";
        let docs = MarkdownParser::default().parse(Path::new("c.md"), md.as_bytes()).unwrap();
        assert!(docs[0].text.contains("let x = *y;"));
        assert!(!docs[0].text.contains("```"));
    }

    #[test]
    fn empty_markdown_yields_no_documents() {
        let docs = MarkdownParser::default().parse(Path::new("e.md"), b"\n\n  \n").unwrap();
        assert!(docs.is_empty());
    }

    #[test]
    fn invalid_utf8_is_a_parse_error() {
        let err = PlainTextParser.parse(Path::new("bad.txt"), &[0xff, 0xfe, 0x00]).unwrap_err();
        assert!(matches!(err, RagError::ParseError { .. }));
    }

    #[test]
    fn registry_selects_by_extension() {
        let registry = ParserRegistry::with_defaults(MarkdownMode::Single);
        assert!(registry.supports(Path::new("a/b/notes.md")));
        assert!(registry.supports(Path::new("README.MARKDOWN")));
        assert!(registry.supports(Path::new("plain.txt")));
        assert!(!registry.supports(Path::new("image.png")));
        assert!(!registry.supports(Path::new("Makefile")));
    }
}
