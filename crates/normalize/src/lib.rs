//! Markup normalization for OneNote page HTML.
//!
//! OneNote's HTML export has a handful of quirks that trip up generic
//! HTML→Markdown converters: check boxes are tagged paragraphs, tables never
//! have a header row, cells contain block lists, and links between pages use
//! the `onenote:` scheme. [`MarkupNormalizer`] irons those out and produces
//! canonical HTML for the renderer.
//!
//! Normalization never fails. Malformed markup is recovered the same way a
//! browser would recover it, and anything a transform doesn't recognise is
//! passed through unchanged.

mod checklist;
mod consts;
mod document;
mod sanitize;
pub mod transforms;

use tracing::instrument;

pub use crate::checklist::rewrite_checklists;
pub use crate::document::{Document, Element, Node};
pub use crate::sanitize::sanitize_filename;
use crate::transforms::{DEFAULT_PIPELINE, Transform};

/// Raw page HTML in, canonical HTML out.
///
/// Runs the checklist rewrite on the raw text, parses once, then applies each
/// tree transform in order (see [`transforms`]).
#[derive(Debug, Clone)]
pub struct MarkupNormalizer {
    pipeline: Vec<(&'static str, Transform)>,
}

impl MarkupNormalizer {
    /// A normalizer running a custom ordered list of transforms.
    pub fn with_pipeline(pipeline: impl IntoIterator<Item = (&'static str, Transform)>) -> Self {
        Self {
            pipeline: pipeline.into_iter().collect(),
        }
    }

    /// Names of the configured transforms, in application order.
    pub fn transform_names(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.pipeline.iter().map(|(name, _)| *name)
    }

    #[instrument(skip_all, fields(raw_size = raw.len()))]
    pub fn normalize(&self, raw: &str) -> String {
        let raw = rewrite_checklists(raw);
        let mut doc = Document::parse(&raw);
        for (_name, transform) in &self.pipeline {
            transform(&mut doc);
        }
        doc.to_html()
    }
}

impl Default for MarkupNormalizer {
    fn default() -> Self {
        Self::with_pipeline(DEFAULT_PIPELINE.iter().copied())
    }
}

/// Normalize with the default pipeline.
pub fn normalize(raw: &str) -> String {
    MarkupNormalizer::default().normalize(raw)
}
