use super::item_list::ListItem;

/// Minimal instruction for the list UI after one reconciliation step.
///
/// Variants that touch rows carry the full list snapshot after the change so
/// a consumer never has to re-query the presenter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChangeDescriptor {
    /// The event was irrelevant or stale.
    None,
    /// The whole list changed; keep `anchor` visible.
    Reloaded { anchor: usize, items: Vec<ListItem> },
    ItemsAdded {
        indices: Vec<usize>,
        /// A neighbouring row whose grouping changed and must be redrawn.
        reload: Option<usize>,
        force_scroll: bool,
        items: Vec<ListItem>,
    },
    ItemsUpdated {
        indices: Vec<usize>,
        updated: Vec<ListItem>,
        items: Vec<ListItem>,
    },
    ItemRemoved { index: usize, items: Vec<ListItem> },
    ItemMoved {
        from: usize,
        to: usize,
        items: Vec<ListItem>,
    },
    /// Typing footer visibility; the list itself is untouched.
    FooterUpdated { visible: bool },
}

impl ChangeDescriptor {
    pub fn is_none(&self) -> bool {
        matches!(self, Self::None)
    }

    pub fn items(&self) -> Option<&[ListItem]> {
        match self {
            Self::Reloaded { items, .. }
            | Self::ItemsAdded { items, .. }
            | Self::ItemsUpdated { items, .. }
            | Self::ItemRemoved { items, .. }
            | Self::ItemMoved { items, .. } => Some(items),
            Self::None | Self::FooterUpdated { .. } => None,
        }
    }

    /// Appends `item` to the carried snapshot, leaving list-less variants alone.
    pub fn with_trailing_item(mut self, item: ListItem) -> Self {
        match &mut self {
            Self::Reloaded { items, .. }
            | Self::ItemsAdded { items, .. }
            | Self::ItemsUpdated { items, .. }
            | Self::ItemRemoved { items, .. }
            | Self::ItemMoved { items, .. } => items.push(item),
            Self::None | Self::FooterUpdated { .. } => {}
        }
        self
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::None => "none",
            Self::Reloaded { .. } => "reloaded",
            Self::ItemsAdded { .. } => "items_added",
            Self::ItemsUpdated { .. } => "items_updated",
            Self::ItemRemoved { .. } => "item_removed",
            Self::ItemMoved { .. } => "item_moved",
            Self::FooterUpdated { .. } => "footer_updated",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn trailing_item_is_not_added_to_list_less_changes() {
        let footer = ChangeDescriptor::FooterUpdated { visible: true };

        assert_eq!(
            footer.clone().with_trailing_item(ListItem::status("x")),
            footer
        );
        assert!(ChangeDescriptor::None
            .with_trailing_item(ListItem::status("x"))
            .is_none());
    }

    #[test]
    fn trailing_item_extends_snapshot() {
        let change = ChangeDescriptor::ItemRemoved {
            index: 0,
            items: vec![],
        }
        .with_trailing_item(ListItem::status("x"));

        assert_eq!(change.items().map(<[ListItem]>::len), Some(1));
    }
}
