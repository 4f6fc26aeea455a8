//! HTML to Markdown rendering.
//!
//! Conversion itself is delegated to `fast_html2md`; this crate only pins the
//! options and tidies the output so that re-running a sync over unchanged
//! pages produces byte-identical files.

use html2md::rewrite_html as html_to_markdown;
use regex::Regex;
use std::borrow::Cow;
use std::sync::LazyLock;
use tracing::instrument;

// A newline followed by two or more (possibly whitespace-only) blank lines.
static BLANK_RUN_REGEX: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\n(?:[ \t]*\n){2,}").unwrap());
// The converter keeps its list state across lists, so a check box item can
// come out with an ordered marker.
static CHECKLIST_ITEM_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?m)^[ \t]*(?:\d+\.|[*+-])[ \t]+\[([ x])\][ \t]*").unwrap());
static DELIMITER_ROW_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\|(?:[ \t]*:?-+:?[ \t]*\|)+$").unwrap());

/// Converts canonical HTML into Markdown.
///
/// Pure and deterministic: the same input always yields the same output, and
/// nothing is read from or written to anywhere else.
#[derive(Debug, Clone, Copy)]
pub struct TextRenderer {
    commonmark: bool,
}

impl TextRenderer {
    /// Choose between CommonMark output (the default) and the converter's
    /// legacy flavour.
    pub fn new(commonmark: bool) -> Self {
        Self { commonmark }
    }

    #[instrument(skip_all, fields(html_size = html.len()))]
    pub fn render(&self, html: &str) -> String {
        // The converter drops the `&nbsp;` entity instead of turning it into a space.
        let html = html.replace("&nbsp;", " ");
        let markdown = html_to_markdown(&html, self.commonmark);
        let markdown = CHECKLIST_ITEM_REGEX.replace_all(&markdown, "* [${1}] ");
        let markdown = repair_tables(&markdown);
        collapse_blank_lines(&markdown).trim().to_string()
    }
}

impl Default for TextRenderer {
    fn default() -> Self {
        Self::new(true)
    }
}

/// Collapse every run of two or more blank lines into a single blank line.
/// Lines holding only spaces or tabs count as blank.
pub fn collapse_blank_lines(markdown: &str) -> Cow<'_, str> {
    BLANK_RUN_REGEX.replace_all(markdown, "\n\n")
}

/// Turn the converter's pipe rows into GFM tables.
///
/// The first row of every run of `|...|` lines is the header: its cells lose
/// the bold wrapping the converter adds to `<th>` and a `|---|` delimiter row
/// is inserted after it, unless one is already there. Cells of the other rows
/// are trimmed. Everything outside a table is passed through untouched.
pub fn repair_tables(markdown: &str) -> Cow<'_, str> {
    if !markdown.lines().any(is_table_row) {
        return Cow::Borrowed(markdown);
    }
    let mut out = String::with_capacity(markdown.len() + 64);
    let mut lines = markdown.split('\n').peekable();
    let mut in_table = false;
    while let Some(line) = lines.next() {
        if !is_table_row(line) {
            in_table = false;
            out.push_str(line);
        } else if in_table || DELIMITER_ROW_REGEX.is_match(line.trim()) {
            push_row(&mut out, split_cells(line.trim()).into_iter().map(body_cell));
        } else {
            in_table = true;
            let cells = split_cells(line.trim());
            let columns = cells.len();
            push_row(&mut out, cells.into_iter().map(header_cell));
            if !lines.peek().is_some_and(|next| DELIMITER_ROW_REGEX.is_match(next.trim())) {
                out.push('\n');
                push_row(&mut out, std::iter::repeat_n(Cow::Borrowed("---"), columns));
            }
        }
        if lines.peek().is_some() {
            out.push('\n');
        }
    }
    Cow::Owned(out)
}

fn is_table_row(line: &str) -> bool {
    let line = line.trim();
    line.len() >= 2 && line.starts_with('|') && line.ends_with('|') && !line.ends_with("\\|")
}

/// Cells of a `|a|b|` row, split on pipes that are not backslash-escaped.
fn split_cells(row: &str) -> Vec<&str> {
    let inner = &row[1..row.len() - 1];
    let mut cells = vec![];
    let mut start = 0;
    let mut escaped = false;
    for (i, c) in inner.char_indices() {
        match c {
            '\\' if !escaped => {
                escaped = true;
                continue;
            },
            '|' if !escaped => {
                cells.push(&inner[start..i]);
                start = i + 1;
            },
            _ => {},
        }
        escaped = false;
    }
    cells.push(&inner[start..]);
    cells
}

fn header_cell(cell: &str) -> Cow<'_, str> {
    let cell = cell.trim();
    match cell.strip_prefix("**").and_then(|c| c.strip_suffix("**")) {
        Some(inner) if !inner.trim().is_empty() => Cow::Borrowed(inner.trim()),
        _ => Cow::Borrowed(cell),
    }
}

// `** A**` is not bold: the opening run may not be followed by a space.
fn body_cell(cell: &str) -> Cow<'_, str> {
    let cell = cell.trim();
    match cell.strip_prefix("**").and_then(|c| c.strip_suffix("**")) {
        Some(inner) if inner.starts_with(char::is_whitespace) && !inner.trim().is_empty() => {
            Cow::Owned(format!("**{}**", inner.trim()))
        },
        _ => Cow::Borrowed(cell),
    }
}

fn push_row<'a>(out: &mut String, cells: impl Iterator<Item = Cow<'a, str>>) {
    out.push('|');
    for cell in cells {
        out.push_str(&cell);
        out.push('|');
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use quire_normalize::normalize;
    use rstest::rstest;

    #[rstest]
    #[case("a\n\nb", "a\n\nb")]
    #[case("a\n\n\nb", "a\n\nb")]
    #[case("a\n\n\n\n\n\nb", "a\n\nb")]
    #[case("a\n  \n\t\n \nb", "a\n\nb")]
    #[case("a\n \nb", "a\n \nb")]
    #[case("a\nb", "a\nb")]
    fn test_collapse_blank_lines(#[case] input: &str, #[case] expected: &str) {
        assert_eq!(collapse_blank_lines(input), expected);
    }

    #[rstest]
    #[case("|** A**|** B**|\n|1|2|", "|A|B|\n|---|---|\n|1|2|")]
    #[case("|A|B|\n|1|2|", "|A|B|\n|---|---|\n|1|2|")]
    #[case("|A|B|\n|---|---|\n|1|2|", "|A|B|\n|---|---|\n|1|2|")]
    #[case("|A|\n|:--|\n|1|", "|A|\n|:--|\n|1|")]
    #[case("intro\n|A|B|\n|1|2|\noutro", "intro\n|A|B|\n|---|---|\n|1|2|\noutro")]
    #[case("|A|\n|1|\n\n|C|\n|2|", "|A|\n|---|\n|1|\n\n|C|\n|---|\n|2|")]
    #[case("|a\\|b|c|", "|a\\|b|c|\n|---|---|")]
    #[case("| x | ** y**|\n|1|** 2**|", "|x|y|\n|---|---|\n|1|**2**|")]
    fn test_repair_tables(#[case] input: &str, #[case] expected: &str) {
        assert_eq!(repair_tables(input), expected);
    }

    #[test]
    fn test_repair_tables_leaves_prose_borrowed() {
        let prose = "just text\n* a list\n| not a row";
        assert!(matches!(repair_tables(prose), Cow::Borrowed(_)));
    }

    #[rstest]
    #[case(true)]
    #[case(false)]
    fn test_promoted_header_renders_as_table_header(#[case] commonmark: bool) {
        let html = normalize("<table><tr><td>A</td><td>B</td></tr><tr><td>1</td><td>2</td></tr></table>");
        let markdown = TextRenderer::new(commonmark).render(&html);
        assert_eq!(markdown, "|A|B|\n|---|---|\n|1|2|");
    }

    #[test]
    fn test_cell_list_renders_as_single_cell() {
        let html = normalize("<table><tr><td>Who</td></tr><tr><td><ul><li>one</li><li>two</li></ul></td></tr></table>");
        let markdown = TextRenderer::default().render(&html);
        assert_eq!(markdown, "|Who|\n|---|\n|one; two|");
    }

    #[test]
    fn test_checklist_renders_as_task_items() {
        let html = normalize(r#"<p data-tag="to-do">Buy milk</p><p data-tag="to-do:completed">Pay rent</p>"#);
        let markdown = TextRenderer::default().render(&html);
        let lines: Vec<_> = markdown.lines().collect();
        assert_eq!(lines, ["* [ ] Buy milk", "* [x] Pay rent"]);
    }

    #[test]
    fn test_checklist_after_ordered_list_keeps_bullet() {
        let html = normalize(r#"<ol><li>first</li></ol><p data-tag="to-do">Buy milk</p>"#);
        let markdown = TextRenderer::default().render(&html);
        assert!(markdown.lines().any(|line| line == "* [ ] Buy milk"), "{markdown}");
    }

    #[test]
    fn test_non_breaking_space_becomes_space() {
        let html = normalize("<p>a&nbsp;b</p>");
        assert_eq!(TextRenderer::default().render(&html), "a b");
    }

    #[test]
    fn test_render_heading_and_paragraph() {
        let markdown = TextRenderer::default().render("<h2>Overview</h2><p>Some <strong>bold</strong> text.</p>");
        assert!(markdown.contains("Overview"), "{markdown}");
        assert!(markdown.contains("**bold**"), "{markdown}");
        assert!(!markdown.contains("<p>"), "{markdown}");
    }

    #[test]
    fn test_render_is_trimmed_and_collapsed() {
        let html = "<p>first</p><br><br><br><br><div></div><div></div><p>second</p>\n\n\n";
        let markdown = TextRenderer::default().render(html);
        assert_eq!(markdown, markdown.trim());
        assert!(!markdown.contains("\n\n\n"), "{markdown:?}");
        assert!(markdown.starts_with("first"), "{markdown:?}");
        assert!(markdown.ends_with("second"), "{markdown:?}");
    }

    #[test]
    fn test_render_is_idempotent() {
        let html = "<table><thead><tr><th>A</th><th>B</th></tr></thead><tbody><tr><td>1</td><td>x; y</td></tr></tbody></table>\
                    <ul><li>[ ] open</li><li>[x] done</li></ul><p><a href=\"Other Page.md\">other</a></p>";
        let renderer = TextRenderer::default();
        let first = renderer.render(html);
        assert_eq!(first, renderer.render(html));
        assert!(first.contains("|1|x; y|"), "{first}");
        assert!(first.contains("Other Page.md") || first.contains("Other%20Page.md"), "{first}");
    }

    #[test]
    fn test_render_empty() {
        assert_eq!(TextRenderer::default().render(""), "");
    }
}
