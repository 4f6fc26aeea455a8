//! Owned, mutable HTML tree.
//!
//! `scraper` is great for querying but its tree is awkward to restructure
//! (moving rows between sections, replacing a list with text). The body of a
//! parsed page is copied into this small owned representation once, the
//! transforms rewrite it in place, and html5ever serializes it back to HTML
//! at the end.

use html5ever::serialize::{Serialize, SerializeOpts, Serializer, TraversalScope, serialize};
use html5ever::{LocalName, QualName, ns};
use scraper::{ElementRef, Html};
use std::io;
use tracing::warn;

use crate::consts::BODY_SELECTOR;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Node {
    Element(Element),
    Text(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Element {
    pub name: String,
    pub attrs: Vec<(String, String)>,
    pub children: Vec<Node>,
}

/// A parsed page body. Comments, the doctype and `<head>` are dropped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Document {
    root: Element,
}

impl Document {
    /// Parse a full document (or fragment) with browser-grade error recovery.
    /// Never fails: unmatched tags are closed or ignored as a browser would.
    pub fn parse(html: &str) -> Self {
        let parsed = Html::parse_document(html);
        let children = parsed.select(&BODY_SELECTOR).next().map(convert_children).unwrap_or_default();
        Self {
            root: Element::new("body", children),
        }
    }

    /// The `<body>` element.
    pub fn root(&self) -> &Element {
        &self.root
    }

    pub fn root_mut(&mut self) -> &mut Element {
        &mut self.root
    }

    /// Visit every element below the body, parents before children.
    pub fn walk_mut<F: FnMut(&mut Element)>(&mut self, mut f: F) {
        for child in &mut self.root.children {
            if let Node::Element(el) = child {
                el.walk_mut(&mut f);
            }
        }
    }

    /// Serialize the body's contents (not the `<body>` tag itself).
    pub fn to_html(&self) -> String {
        let mut out = Vec::new();
        if let Err(e) = serialize(&mut out, &self.root, SerializeOpts::default()) {
            warn!(error = %e, "HTML serialization stopped early");
        }
        String::from_utf8_lossy(&out).into_owned()
    }
}

impl Element {
    pub fn new(name: impl Into<String>, children: Vec<Node>) -> Self {
        Self {
            name: name.into(),
            attrs: vec![],
            children,
        }
    }

    pub fn attr(&self, name: &str) -> Option<&str> {
        self.attrs.iter().find(|(key, _)| key == name).map(|(_, value)| value.as_str())
    }

    pub fn set_attr(&mut self, name: &str, value: impl Into<String>) {
        let value = value.into();
        match self.attrs.iter_mut().find(|(key, _)| key == name) {
            Some((_, existing)) => *existing = value,
            None => self.attrs.push((name.to_string(), value)),
        }
    }

    pub fn is(&self, name: &str) -> bool {
        self.name == name
    }

    /// Direct child elements, skipping text.
    pub fn child_elements(&self) -> impl Iterator<Item = &Element> {
        self.children.iter().filter_map(|child| match child {
            Node::Element(el) => Some(el),
            Node::Text(_) => None,
        })
    }

    /// Concatenated text of every descendant text node.
    pub fn text(&self) -> String {
        let mut out = String::new();
        self.collect_text(&mut out);
        out
    }

    fn collect_text(&self, out: &mut String) {
        for child in &self.children {
            match child {
                Node::Text(text) => out.push_str(text),
                Node::Element(el) => el.collect_text(out),
            }
        }
    }

    fn walk_mut<F: FnMut(&mut Element)>(&mut self, f: &mut F) {
        f(self);
        for child in &mut self.children {
            if let Node::Element(el) = child {
                el.walk_mut(f);
            }
        }
    }
}

impl Serialize for Element {
    fn serialize<S: Serializer>(&self, serializer: &mut S, traversal_scope: TraversalScope) -> io::Result<()> {
        let name = QualName::new(None, ns!(html), LocalName::from(self.name.as_str()));
        let include_node = traversal_scope == TraversalScope::IncludeNode;
        if include_node {
            let attrs: Vec<_> = self
                .attrs
                .iter()
                .map(|(key, value)| (QualName::new(None, ns!(), LocalName::from(key.as_str())), value.as_str()))
                .collect();
            serializer.start_elem(name.clone(), attrs.iter().map(|(key, value)| (key, *value)))?;
        }
        for child in &self.children {
            match child {
                Node::Element(el) => el.serialize(serializer, TraversalScope::IncludeNode)?,
                Node::Text(text) => serializer.write_text(text)?,
            }
        }
        if include_node {
            serializer.end_elem(name)?;
        }
        Ok(())
    }
}

fn convert_children(parent: ElementRef<'_>) -> Vec<Node> {
    parent
        .children()
        .filter_map(|child| match child.value() {
            scraper::Node::Text(text) => Some(Node::Text(String::from(&**text))),
            scraper::Node::Element(_) => ElementRef::wrap(child).map(|el| {
                let value = el.value();
                Node::Element(Element {
                    name: value.name().to_string(),
                    attrs: value.attrs().map(|(key, val)| (key.to_string(), val.to_string())).collect(),
                    children: convert_children(el),
                })
            }),
            _ => None,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[test]
    fn test_parse_keeps_body_only() {
        let doc = Document::parse(
            "<!DOCTYPE html><html><head><title>T</title></head><body><!-- c --><p>Hi <b>there</b></p></body></html>",
        );
        assert_eq!(doc.to_html(), "<p>Hi <b>there</b></p>");
    }

    #[test]
    fn test_escaping() {
        let doc = Document::parse(r#"<p title="a &quot;b&quot;">1 &lt; 2 &amp; 3</p>"#);
        assert_eq!(doc.to_html(), r#"<p title="a &quot;b&quot;">1 &lt; 2 &amp; 3</p>"#);
    }

    #[test]
    fn test_non_breaking_space_is_written_as_entity() {
        let doc = Document::parse("<p>a&nbsp;b</p>");
        assert_eq!(doc.to_html(), "<p>a&nbsp;b</p>");
    }

    #[rstest]
    #[case("<noscript><b>x</b> &amp; y</noscript>", "<noscript><b>x</b> &amp; y</noscript>")]
    #[case("<p>a</p><xmp>1 < 2</xmp>", "<p>a</p><xmp>1 < 2</xmp>")]
    #[case("<iframe><p>raw</p></iframe>", "<iframe><p>raw</p></iframe>")]
    fn test_raw_text_elements_are_not_escaped(#[case] input: &str, #[case] expected: &str) {
        assert_eq!(Document::parse(input).to_html(), expected);
    }

    #[test]
    fn test_void_elements() {
        let doc = Document::parse("<p>a<br>b<img src=\"x.png\"></p>");
        assert_eq!(doc.to_html(), "<p>a<br>b<img src=\"x.png\"></p>");
    }

    #[test]
    fn test_malformed_input_is_recovered() {
        let doc = Document::parse("<div><p>unclosed <b>bold</div>trailing");
        let html = doc.to_html();
        assert!(html.contains("unclosed"));
        assert!(html.contains("bold"));
        assert!(html.contains("trailing"));
    }

    #[test]
    fn test_text_and_attrs() {
        let mut doc = Document::parse("<a href=\"x\">one <i>two</i></a>");
        let mut seen = vec![];
        doc.walk_mut(|el| {
            if el.is("a") {
                seen.push(el.text());
                el.set_attr("href", "y");
            }
        });
        assert_eq!(seen, ["one two"]);
        assert_eq!(doc.to_html(), "<a href=\"y\">one <i>two</i></a>");
    }
}
