use quire_normalize::sanitize_filename;
use std::path::PathBuf;

/// Number of id characters used as a name when the service gives none.
const ID_NAME_CHARS: usize = 12;

/// Name shown for a node or item: its title, or the first 12 characters of
/// its id when the title is missing or blank.
pub fn display_name(title: Option<&str>, id: &str) -> String {
    match title {
        Some(title) if !title.trim().is_empty() => title.to_string(),
        _ => id.chars().take(ID_NAME_CHARS).collect(),
    }
}

/// Position of a node during one traversal, used to compute output paths.
///
/// Each node borrows its parent, so a chain only lives as long as the
/// traversal frame that built it. The root of a run contributes no path
/// segment; everything below it contributes its sanitized display name.
#[derive(Debug, Clone, Copy)]
pub enum HierarchyNode<'a> {
    Root {
        name: &'a str,
    },
    Collection {
        name: &'a str,
        parent: &'a HierarchyNode<'a>,
    },
    SubCollection {
        name: &'a str,
        parent: &'a HierarchyNode<'a>,
    },
    Item {
        name: &'a str,
        parent: &'a HierarchyNode<'a>,
    },
}

impl<'a> HierarchyNode<'a> {
    pub fn name(&self) -> &'a str {
        match self {
            Self::Root { name } | Self::Collection { name, .. } | Self::SubCollection { name, .. } | Self::Item { name, .. } => {
                name
            },
        }
    }

    pub fn parent(&self) -> Option<&'a HierarchyNode<'a>> {
        match self {
            Self::Root { .. } => None,
            Self::Collection { parent, .. } | Self::SubCollection { parent, .. } | Self::Item { parent, .. } => {
                Some(parent)
            },
        }
    }

    /// Output path relative to the output root. Directories for
    /// collections and sub-collections, `<name>.md` for items.
    pub fn relative_path(&self) -> PathBuf {
        match self {
            Self::Root { .. } => PathBuf::new(),
            Self::Collection { name, parent } | Self::SubCollection { name, parent } => {
                parent.relative_path().join(sanitize_filename(name))
            },
            Self::Item { name, parent } => parent.relative_path().join(format!("{}.md", sanitize_filename(name))),
        }
    }

    /// Human-readable location, root first (`Site / Notebook / Section`).
    pub fn breadcrumb(&self) -> String {
        let mut names = vec![self.name()];
        let mut current = self.parent();
        while let Some(node) = current {
            names.push(node.name());
            current = node.parent();
        }
        names.reverse();
        names.join(" / ")
    }
}
