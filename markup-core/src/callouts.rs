//! The Callout Map (§3, §4.6.6, §8): correlates inline callout marks left by the `callouts`
//! substitution pass in a verbatim block with the items of the callout list that follows it.

use std::collections::HashMap;

/// Map from list-item index (1-based, within the callout list that follows a verbatim block) to
/// the callout marker indices it should render, plus the running list number (§3).
#[derive(Debug, Clone, Default)]
pub struct CalloutMap {
    observed: Vec<usize>,
    comap: HashMap<usize, Vec<usize>>,
    list_number: usize,
}

impl CalloutMap {
    pub fn new() -> Self {
        CalloutMap::default()
    }

    /// Records one callout mark seen in a verbatim block's `callouts` pass, in source order.
    pub fn record_mark(&mut self, callout_index: usize) {
        self.observed.push(callout_index);
    }

    /// Registers that list item `item_index` should carry the callout marks observed so far at
    /// positions `[start, end)` (by observation order), called as the callout list is translated.
    pub fn bind_item(&mut self, item_index: usize, marks: Vec<usize>) {
        self.comap.insert(item_index, marks);
    }

    pub fn marks_for(&self, item_index: usize) -> &[usize] {
        self.comap.get(&item_index).map(|v| v.as_slice()).unwrap_or(&[])
    }

    pub fn observed(&self) -> &[usize] {
        &self.observed
    }

    /// Resets the running list counter and observed marks when a callout list closes (§3), ready
    /// for the next verbatim-block/callout-list pairing.
    pub fn close_list(&mut self) {
        self.list_number += 1;
        self.observed.clear();
        self.comap.clear();
    }

    pub fn list_number(&self) -> usize {
        self.list_number
    }

    /// Verifies the invariant in §8: every bound item index is within range and its marks are a
    /// subset of what was actually observed before the list closed.
    pub fn is_consistent(&self, item_count: usize, observed_before_close: &[usize]) -> bool {
        self.comap.iter().all(|(idx, marks)| {
            *idx <= item_count && marks.iter().all(|m| observed_before_close.contains(m))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn records_marks_in_order() {
        let mut map = CalloutMap::new();
        map.record_mark(1);
        map.record_mark(2);
        assert_eq!(map.observed(), &[1, 2]);
    }

    #[test]
    fn bind_and_lookup_item_marks() {
        let mut map = CalloutMap::new();
        map.record_mark(1);
        map.bind_item(1, vec![1]);
        assert_eq!(map.marks_for(1), &[1]);
        assert!(map.is_consistent(3, map.observed().to_vec().as_slice()));
    }

    #[test]
    fn close_list_resets_and_bumps_counter() {
        let mut map = CalloutMap::new();
        map.record_mark(1);
        map.close_list();
        assert_eq!(map.list_number(), 1);
        assert!(map.observed().is_empty());
    }
}
