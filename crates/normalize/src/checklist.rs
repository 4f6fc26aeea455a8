use std::borrow::Cow;

use crate::consts::{TODO_DONE_REGEX, TODO_REGEX};

/// Rewrite OneNote check-box paragraphs into list items with a textual
/// marker: `[ ]` for open items, `[x]` for completed ones.
///
/// Runs on the raw text, before the document is parsed, because the
/// resulting `<li>` elements must go through the same parse as everything
/// else. Paragraphs without a to-do tag are left untouched.
pub fn rewrite_checklists(raw: &str) -> Cow<'_, str> {
    match TODO_REGEX.replace_all(raw, "<li>[ ] ${1}</li>") {
        Cow::Borrowed(_) => TODO_DONE_REGEX.replace_all(raw, "<li>[x] ${1}</li>"),
        Cow::Owned(open) => Cow::Owned(TODO_DONE_REGEX.replace_all(&open, "<li>[x] ${1}</li>").into_owned()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(r#"<p data-tag="to-do">Buy milk</p>"#, "<li>[ ] Buy milk</li>")]
    #[case(r#"<p data-tag="to-do:completed">Ship it</p>"#, "<li>[x] Ship it</li>")]
    #[case(r#"<p style="margin:0" data-tag="to-do" lang="en">Styled</p>"#, "<li>[ ] Styled</li>")]
    #[case("<p data-tag=\"to-do\">Multi\nline</p>", "<li>[ ] Multi\nline</li>")]
    #[case("<p>Plain paragraph</p>", "<p>Plain paragraph</p>")]
    #[case(r#"<p data-tag="important">Not a task</p>"#, r#"<p data-tag="important">Not a task</p>"#)]
    fn test_rewrite_checklists(#[case] input: &str, #[case] expected: &str) {
        assert_eq!(rewrite_checklists(input), expected);
    }

    #[test]
    fn test_mixed_checklist() {
        let raw = r#"<p data-tag="to-do:completed">done</p><p data-tag="to-do">open</p><p>text</p>"#;
        assert_eq!(rewrite_checklists(raw), "<li>[x] done</li><li>[ ] open</li><p>text</p>");
    }

    #[test]
    fn test_untouched_input_is_borrowed() {
        assert!(matches!(rewrite_checklists("<p>nothing</p>"), Cow::Borrowed(_)));
    }
}
