//! Display ordering for categories and entries, and the client half of the
//! reorder protocol.
//!
//! A drag-and-drop commit is expressed as [`move_item`] followed by
//! [`positions`]: the moved element is removed at its source index and
//! reinserted at the destination, then every element gets `orderId = index + 1`.

use std::cmp::Ordering;

use thiserror::Error;

use crate::models::{App, Bookmark, Category, OrderingStrategy, ReorderItem};

#[derive(Debug, Error, PartialEq, Eq)]
pub enum OrderingError {
    #[error("Index {index} is out of range for a list of {len}")]
    IndexOutOfRange { index: usize, len: usize },
}

/// Anything that can be sorted by the configured ordering strategy.
pub trait Sortable {
    fn id(&self) -> i64;
    fn name(&self) -> &str;
    fn created_at(&self) -> &str;
    fn order_id(&self) -> Option<i64>;
    fn set_order_id(&mut self, order_id: i64);
}

macro_rules! impl_sortable {
    ($($ty:ty),*) => {
        $(
            impl Sortable for $ty {
                fn id(&self) -> i64 {
                    self.id
                }
                fn name(&self) -> &str {
                    &self.name
                }
                fn created_at(&self) -> &str {
                    &self.created_at
                }
                fn order_id(&self) -> Option<i64> {
                    self.order_id
                }
                fn set_order_id(&mut self, order_id: i64) {
                    self.order_id = Some(order_id);
                }
            }
        )*
    };
}

impl_sortable!(Category, App, Bookmark);

/// Compare two items under `strategy`. Ties fall back to id so the result is total.
///
/// A missing `orderId` sorts before any assigned one, matching SQLite's
/// `ORDER BY ... ASC` treatment of NULL.
pub fn compare<T: Sortable>(a: &T, b: &T, strategy: OrderingStrategy) -> Ordering {
    let primary = match strategy {
        OrderingStrategy::Name => a.name().to_lowercase().cmp(&b.name().to_lowercase()),
        OrderingStrategy::CreatedAt => a.created_at().cmp(b.created_at()),
        OrderingStrategy::OrderId => a.order_id().cmp(&b.order_id()),
    };
    primary.then_with(|| a.id().cmp(&b.id()))
}

pub fn sort_by_strategy<T: Sortable>(items: &mut [T], strategy: OrderingStrategy) {
    items.sort_by(|a, b| compare(a, b, strategy));
}

/// Remove the element at `from` and reinsert it at `to`.
pub fn move_item<T: Clone>(items: &[T], from: usize, to: usize) -> Result<Vec<T>, OrderingError> {
    let len = items.len();
    if from >= len {
        return Err(OrderingError::IndexOutOfRange { index: from, len });
    }
    if to >= len {
        return Err(OrderingError::IndexOutOfRange { index: to, len });
    }
    let mut out = items.to_vec();
    let moved = out.remove(from);
    out.insert(to, moved);
    Ok(out)
}

/// 1-based positional order for every element, in list order.
pub fn positions<T: Sortable>(items: &[T]) -> Vec<ReorderItem> {
    items
        .iter()
        .enumerate()
        .map(|(index, item)| ReorderItem {
            id: item.id(),
            order_id: index as i64 + 1,
        })
        .collect()
}

/// Write the positions from [`positions`] back onto the items.
pub fn assign_positions<T: Sortable>(items: &mut [T]) {
    for (index, item) in items.iter_mut().enumerate() {
        item.set_order_id(index as i64 + 1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::CategoryKind;

    fn category(id: i64, name: &str, created_at: &str, order_id: Option<i64>) -> Category {
        Category {
            id,
            name: name.to_string(),
            kind: CategoryKind::Apps,
            is_pinned: true,
            is_public: true,
            order_id,
            created_at: created_at.to_string(),
            updated_at: created_at.to_string(),
        }
    }

    #[test]
    fn test_sort_by_name_is_case_insensitive() {
        let mut items = vec![
            category(1, "beta", "2024-01-01T00:00:00.000Z", None),
            category(2, "Alpha", "2024-01-02T00:00:00.000Z", None),
            category(3, "gamma", "2024-01-03T00:00:00.000Z", None),
        ];
        sort_by_strategy(&mut items, OrderingStrategy::Name);
        let names: Vec<_> = items.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, vec!["Alpha", "beta", "gamma"]);
    }

    #[test]
    fn test_sort_by_created_at() {
        let mut items = vec![
            category(1, "a", "2024-03-01T00:00:00.000Z", None),
            category(2, "b", "2024-01-01T00:00:00.000Z", None),
        ];
        sort_by_strategy(&mut items, OrderingStrategy::CreatedAt);
        assert_eq!(items[0].id, 2);
    }

    #[test]
    fn test_sort_by_order_id_puts_unordered_first_and_breaks_ties_by_id() {
        let mut items = vec![
            category(4, "d", "", Some(2)),
            category(3, "c", "", Some(1)),
            category(2, "b", "", Some(1)),
            category(1, "a", "", None),
        ];
        sort_by_strategy(&mut items, OrderingStrategy::OrderId);
        let ids: Vec<_> = items.iter().map(|c| c.id).collect();
        assert_eq!(ids, vec![1, 2, 3, 4]);
    }

    #[test]
    fn test_move_item_forward_and_backward() {
        let items = vec!['a', 'b', 'c', 'd'];
        assert_eq!(move_item(&items, 0, 2).unwrap(), vec!['b', 'c', 'a', 'd']);
        assert_eq!(move_item(&items, 3, 1).unwrap(), vec!['a', 'd', 'b', 'c']);
        assert_eq!(move_item(&items, 1, 1).unwrap(), items);
    }

    #[test]
    fn test_move_item_rejects_out_of_range() {
        let items = vec![1, 2];
        assert_eq!(
            move_item(&items, 2, 0),
            Err(OrderingError::IndexOutOfRange { index: 2, len: 2 })
        );
        assert!(move_item(&items, 0, 5).is_err());
    }

    #[test]
    fn test_positions_are_one_based_in_list_order() {
        let items = vec![
            category(9, "x", "", Some(40)),
            category(7, "y", "", None),
            category(8, "z", "", Some(1)),
        ];
        let reorder = positions(&items);
        assert_eq!(
            reorder,
            vec![
                ReorderItem { id: 9, order_id: 1 },
                ReorderItem { id: 7, order_id: 2 },
                ReorderItem { id: 8, order_id: 3 },
            ]
        );
    }

    #[test]
    fn test_assign_positions_is_idempotent() {
        let mut items = vec![category(1, "a", "", None), category(2, "b", "", Some(9))];
        assign_positions(&mut items);
        let first = items.clone();
        assign_positions(&mut items);
        assert_eq!(items, first);
        assert_eq!(items[1].order_id, Some(2));
    }
}
