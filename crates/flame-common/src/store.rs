//! Client-side categorized state.
//!
//! A [`CategoryStore`] is the in-memory tree of categories of one kind, each
//! holding its ordered entries. Every mutation locates the owning category by
//! id and swaps in a new node for it; all other nodes keep their `Arc`, so a
//! renderer can skip anything that is pointer-equal to what it drew last time.
//!
//! Mutations that reference an unknown category leave the state unchanged and
//! return `false`.

use std::sync::Arc;

use crate::models::{App, Bookmark, Category, CategoryKind, CategoryView, OrderingStrategy};
use crate::ordering::{Sortable, assign_positions, sort_by_strategy};

/// A child of a category: an app or a bookmark.
pub trait Entry: Sortable + Clone {
    /// The only kind of category allowed to own this entry.
    const KIND: CategoryKind;

    fn category_id(&self) -> i64;

    /// Take this entry type's children out of an API view.
    fn take_children(view: &mut CategoryView) -> Vec<Self>;
}

impl Entry for App {
    const KIND: CategoryKind = CategoryKind::Apps;

    fn category_id(&self) -> i64 {
        self.category_id
    }

    fn take_children(view: &mut CategoryView) -> Vec<Self> {
        std::mem::take(&mut view.apps)
    }
}

impl Entry for Bookmark {
    const KIND: CategoryKind = CategoryKind::Bookmarks;

    fn category_id(&self) -> i64 {
        self.category_id
    }

    fn take_children(view: &mut CategoryView) -> Vec<Self> {
        std::mem::take(&mut view.bookmarks)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct CategoryNode<T> {
    pub category: Category,
    pub entries: Vec<T>,
}

#[derive(Debug, Clone)]
pub struct CategoryStore<T> {
    nodes: Vec<Arc<CategoryNode<T>>>,
    category_in_edit: Option<i64>,
    entry_in_edit: Option<T>,
}

impl<T> Default for CategoryStore<T> {
    fn default() -> Self {
        Self {
            nodes: Vec::new(),
            category_in_edit: None,
            entry_in_edit: None,
        }
    }
}

impl<T: Entry> CategoryStore<T> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the whole tree with the categories of `T::KIND` found in `views`.
    pub fn load(&mut self, views: Vec<CategoryView>) {
        self.nodes = views
            .into_iter()
            .filter(|view| view.category.kind == T::KIND)
            .map(|mut view| {
                let entries = T::take_children(&mut view);
                Arc::new(CategoryNode {
                    category: view.category,
                    entries,
                })
            })
            .collect();
    }

    pub fn categories(&self) -> &[Arc<CategoryNode<T>>] {
        &self.nodes
    }

    pub fn category(&self, id: i64) -> Option<&Arc<CategoryNode<T>>> {
        self.nodes.iter().find(|node| node.category.id == id)
    }

    pub fn entry_count(&self) -> usize {
        self.nodes.iter().map(|node| node.entries.len()).sum()
    }

    pub fn find_entry(&self, id: i64) -> Option<&T> {
        self.nodes
            .iter()
            .flat_map(|node| node.entries.iter())
            .find(|entry| entry.id() == id)
    }

    // ── Categories ───────────────────────────────────────────────────

    /// Append a new category. Categories of the other kind are ignored.
    pub fn add_category(&mut self, category: Category) -> bool {
        if category.kind != T::KIND {
            return false;
        }
        self.nodes.push(Arc::new(CategoryNode {
            category,
            entries: Vec::new(),
        }));
        true
    }

    /// Replace a category record, keeping its entries.
    pub fn update_category(&mut self, category: Category) -> bool {
        let id = category.id;
        self.modify_node(id, move |node| {
            node.category = category;
            true
        })
    }

    /// Set only the pinned flag of a category.
    pub fn pin_category(&mut self, id: i64, is_pinned: bool) -> bool {
        self.modify_node(id, |node| {
            node.category.is_pinned = is_pinned;
            true
        })
    }

    pub fn delete_category(&mut self, id: i64) -> bool {
        let before = self.nodes.len();
        self.nodes.retain(|node| node.category.id != id);
        if self.category_in_edit == Some(id) {
            self.category_in_edit = None;
        }
        self.nodes.len() != before
    }

    /// Adopt the order of `ordered`, assigning 1-based positions. Nodes keep
    /// their identity unless their `orderId` actually changes; categories not
    /// present in `ordered` are kept at the end.
    pub fn replace_categories(&mut self, ordered: &[Category]) {
        let mut remaining = std::mem::take(&mut self.nodes);
        let mut next = Vec::with_capacity(remaining.len());
        for (index, category) in ordered.iter().enumerate() {
            let Some(pos) = remaining.iter().position(|n| n.category.id == category.id) else {
                continue;
            };
            let mut node = remaining.remove(pos);
            let order_id = index as i64 + 1;
            if node.category.order_id != Some(order_id) {
                Arc::make_mut(&mut node).category.order_id = Some(order_id);
            }
            next.push(node);
        }
        next.extend(remaining);
        self.nodes = next;
    }

    pub fn sort_categories(&mut self, strategy: OrderingStrategy) {
        self.nodes
            .sort_by(|a, b| crate::ordering::compare(&a.category, &b.category, strategy));
    }

    // ── Entries ──────────────────────────────────────────────────────

    /// Append an entry to its category.
    pub fn add_entry(&mut self, entry: T) -> bool {
        self.modify_node(entry.category_id(), move |node| {
            node.entries.push(entry);
            true
        })
    }

    /// Replace an entry in place inside its (unchanged) category.
    pub fn update_entry(&mut self, entry: T) -> bool {
        self.modify_node(entry.category_id(), move |node| {
            match node.entries.iter().position(|e| e.id() == entry.id()) {
                Some(pos) => {
                    node.entries[pos] = entry;
                    true
                }
                None => false,
            }
        })
    }

    pub fn delete_entry(&mut self, id: i64, category_id: i64) -> bool {
        let removed = self.modify_node(category_id, |node| {
            let before = node.entries.len();
            node.entries.retain(|e| e.id() != id);
            node.entries.len() != before
        });
        if removed
            && self
                .entry_in_edit
                .as_ref()
                .is_some_and(|e| e.id() == id)
        {
            self.entry_in_edit = None;
        }
        removed
    }

    /// Apply the server's copy of an updated entry.
    ///
    /// When the entry moved to another category it is deleted from
    /// `prev_category_id` and appended to its new category; otherwise it is
    /// replaced in place. The record is stored exactly as given.
    pub fn apply_update(&mut self, prev_category_id: i64, entry: T) -> bool {
        if prev_category_id == entry.category_id() {
            return self.update_entry(entry);
        }
        let id = entry.id();
        let deleted = self.delete_entry(id, prev_category_id);
        let added = self.add_entry(entry);
        deleted || added
    }

    /// Replace a category's entries with `entries` in that order, assigning
    /// 1-based positions to match what the server stored.
    pub fn replace_entries(&mut self, category_id: i64, mut entries: Vec<T>) -> bool {
        assign_positions(&mut entries);
        self.modify_node(category_id, move |node| {
            node.entries = entries;
            true
        })
    }

    /// Re-sort one category's entries without touching the others.
    pub fn sort_entries(&mut self, category_id: i64, strategy: OrderingStrategy) -> bool {
        self.modify_node(category_id, |node| {
            sort_by_strategy(&mut node.entries, strategy);
            true
        })
    }

    // ── Edit bookkeeping ─────────────────────────────────────────────

    pub fn set_category_in_edit(&mut self, id: Option<i64>) {
        self.category_in_edit = id;
    }

    /// The category being edited, looked up live so it always reflects the latest entries.
    pub fn category_in_edit(&self) -> Option<&Arc<CategoryNode<T>>> {
        self.category_in_edit.and_then(|id| self.category(id))
    }

    pub fn set_entry_in_edit(&mut self, entry: Option<T>) {
        self.entry_in_edit = entry;
    }

    pub fn entry_in_edit(&self) -> Option<&T> {
        self.entry_in_edit.as_ref()
    }

    fn modify_node<F>(&mut self, category_id: i64, f: F) -> bool
    where
        F: FnOnce(&mut CategoryNode<T>) -> bool,
    {
        let Some(pos) = self.nodes.iter().position(|n| n.category.id == category_id) else {
            return false;
        };
        let mut node = CategoryNode::clone(&self.nodes[pos]);
        if !f(&mut node) {
            return false;
        }
        self.nodes[pos] = Arc::new(node);
        true
    }
}
