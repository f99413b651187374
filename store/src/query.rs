//! The query engine: predicates compiled to sorted position streams.
//!
//! A [`Query`](sequent_core::Query) is evaluated against the type and tag
//! indices without touching a single payload file:
//!
//! - a catch-all item becomes a plain position range bounded by the ledger;
//! - event types load their index lists concurrently and union (k-way
//!   merge);
//! - tags load concurrently and intersect (AND);
//! - items union, and the `from_position` bound filters strictly-greater.
//!
//! The result is ascending and duplicate-free; descending reads reverse the
//! final stream rather than re-sorting any index.

use crate::index::SortedIndex;
use sequent_core::{Position, Query, QueryItem, Result, StoreError, Tag};
use std::cmp::Reverse;
use std::collections::BinaryHeap;

/// The on-disk key of a tag's index file (components are already
/// lowercase; the index layer sanitizes filesystem-unsafe characters).
#[must_use]
pub fn tag_index_key(tag: &Tag) -> String {
    format!("{}_{}", tag.key(), tag.value())
}

/// Reject queries that could never be produced by a well-formed caller.
///
/// # Errors
///
/// Returns [`StoreError::InvalidQuery`] for blank event types or tags with
/// empty components.
pub fn validate_query(query: &Query) -> Result<()> {
    for item in &query.items {
        if item.event_types.iter().any(|t| t.trim().is_empty()) {
            return Err(StoreError::InvalidQuery(
                "event types must be non-blank".to_string(),
            ));
        }
        if let Some(tag) = item.tags.iter().find(|tag| !tag.is_valid()) {
            return Err(StoreError::InvalidQuery(format!(
                "tag '{tag}' has an empty key or value"
            )));
        }
    }
    Ok(())
}

/// Evaluates queries against the two event indices.
pub struct QueryEngine<'a> {
    type_index: &'a SortedIndex<u64>,
    tag_index: &'a SortedIndex<u64>,
}

impl<'a> QueryEngine<'a> {
    /// Create an engine over the store's indices.
    #[must_use]
    pub const fn new(type_index: &'a SortedIndex<u64>, tag_index: &'a SortedIndex<u64>) -> Self {
        Self {
            type_index,
            tag_index,
        }
    }

    /// All positions matching `query`, strictly greater than `from`, up to
    /// and including `head` (the current ledger value). Ascending,
    /// duplicate-free.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::InvalidQuery`] on a malformed query or
    /// [`StoreError::Io`] on index failures.
    pub async fn evaluate(
        &self,
        query: &Query,
        from: Position,
        head: Position,
    ) -> Result<Vec<Position>> {
        validate_query(query)?;

        let mut per_item = Vec::with_capacity(query.items.len());
        for item in &query.items {
            per_item.push(self.evaluate_item(item, from, head).await?);
        }
        let mut positions = merge_union(per_item);
        positions.retain(|p| *p > from.get() && *p <= head.get());
        Ok(positions.into_iter().map(Position::new).collect())
    }

    async fn evaluate_item(
        &self,
        item: &QueryItem,
        from: Position,
        head: Position,
    ) -> Result<Vec<u64>> {
        // A catch-all item is a pure range; no index file is touched.
        if item.is_catch_all() {
            return Ok((from.get() + 1..=head.get()).collect());
        }

        let type_union = if item.event_types.is_empty() {
            None
        } else {
            let loads = item
                .event_types
                .iter()
                .map(|event_type| self.type_index.read(event_type));
            let lists = futures::future::try_join_all(loads).await?;
            Some(merge_union(lists))
        };

        let tag_intersection = if item.tags.is_empty() {
            None
        } else {
            let keys: Vec<String> = item.tags.iter().map(tag_index_key).collect();
            let loads = keys.iter().map(|key| self.tag_index.read(key));
            let lists = futures::future::try_join_all(loads).await?;
            if lists.iter().any(Vec::is_empty) {
                return Ok(Vec::new());
            }
            Some(intersect_sorted(lists))
        };

        Ok(match (type_union, tag_intersection) {
            (Some(types), Some(tags)) => intersect_sorted(vec![types, tags]),
            (Some(types), None) => types,
            (None, Some(tags)) => tags,
            // Unreachable: the catch-all case returned above.
            (None, None) => Vec::new(),
        })
    }
}

/// K-way merge of ascending lists into one ascending, duplicate-free list.
#[must_use]
pub fn merge_union(lists: Vec<Vec<u64>>) -> Vec<u64> {
    let mut heap: BinaryHeap<Reverse<(u64, usize)>> = BinaryHeap::with_capacity(lists.len());
    let mut cursors = vec![0usize; lists.len()];
    for (i, list) in lists.iter().enumerate() {
        if let Some(&first) = list.first() {
            heap.push(Reverse((first, i)));
        }
    }

    let mut merged = Vec::with_capacity(lists.iter().map(Vec::len).sum());
    while let Some(Reverse((value, i))) = heap.pop() {
        if merged.last() != Some(&value) {
            merged.push(value);
        }
        cursors[i] += 1;
        if let Some(&next) = lists[i].get(cursors[i]) {
            heap.push(Reverse((next, i)));
        }
    }
    merged
}

/// Intersection of ascending lists by parallel cursor advance.
#[must_use]
pub fn intersect_sorted(lists: Vec<Vec<u64>>) -> Vec<u64> {
    let Some((first, rest)) = lists.split_first() else {
        return Vec::new();
    };
    if rest.is_empty() {
        return first.clone();
    }

    let mut cursors = vec![0usize; rest.len()];
    let mut result = Vec::new();
    'outer: for &candidate in first {
        for (list, cursor) in rest.iter().zip(cursors.iter_mut()) {
            while *cursor < list.len() && list[*cursor] < candidate {
                *cursor += 1;
            }
            match list.get(*cursor) {
                Some(&value) if value == candidate => {}
                Some(_) => continue 'outer,
                None => break 'outer,
            }
        }
        result.push(candidate);
    }
    result
}
