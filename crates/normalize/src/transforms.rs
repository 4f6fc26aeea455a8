//! Tree transforms applied, in order, by [`MarkupNormalizer`](crate::MarkupNormalizer).
//!
//! Each transform is independent and only relies on the document shape left
//! behind by the previous ones:
//!
//! 1. [`strip_non_content`]: no `script`, `style` or `noscript` remains.
//! 2. [`promote_table_headers`]: every non-empty table has a header row.
//! 3. [`flatten_cell_lists`]: no `ul`/`ol` remains inside a table cell.
//! 4. [`rewrite_internal_links`]: OneNote page links point at sibling
//!    Markdown files.

use percent_encoding::percent_decode_str;
use tracing::trace;

use crate::consts::{NON_CONTENT_ELEMENTS, ONENOTE_LINK_REGEX};
use crate::document::{Document, Element, Node};
use crate::sanitize::sanitize_filename;

/// A single normalization step.
pub type Transform = fn(&mut Document);

/// The default pipeline, in application order.
pub const DEFAULT_PIPELINE: &[(&str, Transform)] = &[
    ("strip_non_content", strip_non_content),
    ("promote_table_headers", promote_table_headers),
    ("flatten_cell_lists", flatten_cell_lists),
    ("rewrite_internal_links", rewrite_internal_links),
];

/// Remove elements that never render as text.
pub fn strip_non_content(doc: &mut Document) {
    fn keep(node: &Node) -> bool {
        !matches!(node, Node::Element(el) if NON_CONTENT_ELEMENTS.contains(&el.name.as_str()))
    }
    doc.root_mut().children.retain(keep);
    doc.walk_mut(|el| el.children.retain(keep));
}

/// Give every header-less table a header row, so Markdown converters emit a
/// proper table instead of dropping it or guessing.
///
/// A table is considered to have a header when it has a `thead` or any of
/// its own rows contains a `th`; those tables are left alone. Otherwise the
/// first row's `td` cells become `th` cells inside a new `thead`, and the
/// remaining rows are gathered into a single `tbody`. Rows of nested tables
/// are never moved between tables.
pub fn promote_table_headers(doc: &mut Document) {
    doc.walk_mut(|el| {
        if el.is("table") && !has_header(el) && !own_rows(el).is_empty() {
            promote_first_row(el);
        }
    });
}

/// Replace every top-most list inside a table cell with plain text: the
/// trimmed text of each item, in order, joined with `"; "`. Empty items are
/// skipped. Markdown table cells can't hold block content.
pub fn flatten_cell_lists(doc: &mut Document) {
    doc.walk_mut(|el| {
        if el.is("td") || el.is("th") {
            flatten_lists_in(&mut el.children);
        }
    });
}

/// Point `onenote:` page links at the Markdown file the linked page is
/// written to (`<sanitized title>.md`). Links that don't carry a page title
/// are left as they are.
pub fn rewrite_internal_links(doc: &mut Document) {
    doc.walk_mut(|el| {
        if !el.is("a") {
            return;
        }
        let Some(href) = el.attr("href") else {
            return;
        };
        let Some(captures) = ONENOTE_LINK_REGEX.captures(href) else {
            return;
        };
        let title = percent_decode_str(&captures[1]).decode_utf8_lossy();
        let target = format!("{}.md", sanitize_filename(&title));
        trace!(from = %href, to = %target, "rewriting internal link");
        el.set_attr("href", target);
    });
}

fn is_row_group(el: &Element) -> bool {
    matches!(el.name.as_str(), "thead" | "tbody" | "tfoot")
}

/// Rows that belong to this table: direct `tr` children and rows of its
/// own row groups.
fn own_rows(table: &Element) -> Vec<&Element> {
    let mut rows = vec![];
    for child in table.child_elements() {
        if child.is("tr") {
            rows.push(child);
        } else if is_row_group(child) {
            rows.extend(child.child_elements().filter(|row| row.is("tr")));
        }
    }
    rows
}

fn has_header(table: &Element) -> bool {
    table.child_elements().any(|child| child.is("thead"))
        || own_rows(table).iter().any(|row| row.child_elements().any(|cell| cell.is("th")))
}

fn promote_first_row(table: &mut Element) {
    let mut leading = vec![];
    let mut rows = vec![];
    for child in std::mem::take(&mut table.children) {
        match child {
            Node::Element(el) if el.is("tr") => rows.push(el),
            Node::Element(el) if is_row_group(&el) => {
                rows.extend(el.children.into_iter().filter_map(|node| match node {
                    Node::Element(row) if row.is("tr") => Some(row),
                    _ => None,
                }));
            },
            // Inter-element whitespace has no meaning inside a table.
            Node::Text(text) if text.trim().is_empty() => {},
            other => leading.push(other),
        }
    }

    let mut rows = rows.into_iter();
    let mut children = leading;
    if let Some(mut header) = rows.next() {
        for cell in &mut header.children {
            if let Node::Element(cell) = cell
                && cell.is("td")
            {
                cell.name = "th".to_string();
            }
        }
        children.push(Node::Element(Element::new("thead", vec![Node::Element(header)])));
    }
    let body: Vec<Node> = rows.map(Node::Element).collect();
    if !body.is_empty() {
        children.push(Node::Element(Element::new("tbody", body)));
    }
    table.children = children;
}

fn flatten_lists_in(children: &mut [Node]) {
    for child in children.iter_mut() {
        let Node::Element(el) = child else {
            continue;
        };
        if el.is("ul") || el.is("ol") {
            *child = Node::Text(list_as_text(el));
        } else {
            flatten_lists_in(&mut el.children);
        }
    }
}

fn list_as_text(list: &Element) -> String {
    list.child_elements()
        .filter(|item| item.is("li"))
        .map(|item| item.text().split_whitespace().collect::<Vec<_>>().join(" "))
        .filter(|text| !text.is_empty())
        .collect::<Vec<_>>()
        .join("; ")
}
