use serde::{Deserialize, Serialize};

use super::types::Group;

/// Color shown for students without a known group
pub const FALLBACK_COLOR: &str = "#9ca3af";

/// Groups a fresh board starts with
pub fn default_groups() -> Vec<Group> {
    vec![
        Group::new("赤", "#ef4444"),
        Group::new("青", "#3b82f6"),
        Group::new("緑", "#22c55e"),
        Group::new("橙", "#f59e0b"),
        Group::new("紫", "#8b5cf6"),
        Group::new("灰", "#6b7280"),
    ]
}

/// The facility group list and its lock flag
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GroupCatalog {
    pub groups: Vec<Group>,
    pub locked: bool,
}

impl Default for GroupCatalog {
    fn default() -> Self {
        GroupCatalog {
            groups: default_groups(),
            locked: true,
        }
    }
}

impl GroupCatalog {
    /// Coerces a label onto the catalog.
    ///
    /// Unlocked catalogs accept any text. Locked catalogs keep known names and
    /// substitute the first group (or the empty string) for anything else.
    pub fn coerce(&self, label: &str) -> String {
        if !self.locked {
            return label.to_string();
        }
        if self.groups.iter().any(|g| g.name == label) {
            label.to_string()
        } else {
            self.groups.first().map(|g| g.name.clone()).unwrap_or_default()
        }
    }

    pub fn color_for(&self, label: &str) -> &str {
        if label.is_empty() {
            return FALLBACK_COLOR;
        }
        self.groups
            .iter()
            .find(|g| g.name == label)
            .map(|g| g.color.as_str())
            .unwrap_or(FALLBACK_COLOR)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.groups.iter().map(|g| g.name.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_locked_catalog_substitutes_first_group() {
        let catalog = GroupCatalog::default();
        assert_eq!(catalog.coerce("青"), "青");
        assert_eq!(catalog.coerce("unknown"), "赤");
        assert_eq!(catalog.coerce(""), "赤");
    }

    #[test]
    fn test_unlocked_catalog_keeps_free_text() {
        let catalog = GroupCatalog {
            locked: false,
            ..GroupCatalog::default()
        };
        assert_eq!(catalog.coerce("放課後A"), "放課後A");
    }

    #[test]
    fn test_locked_empty_catalog_yields_empty_label() {
        let catalog = GroupCatalog {
            groups: Vec::new(),
            locked: true,
        };
        assert_eq!(catalog.coerce("赤"), "");
    }

    #[test]
    fn test_colors() {
        let catalog = GroupCatalog::default();
        assert_eq!(catalog.color_for("緑"), "#22c55e");
        assert_eq!(catalog.color_for("none"), FALLBACK_COLOR);
        assert_eq!(catalog.color_for(""), FALLBACK_COLOR);
    }
}
