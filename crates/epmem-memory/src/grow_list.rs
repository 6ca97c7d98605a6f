//! [`GrowList`] – append-only growable array.
//!
//! Used wherever references need to accumulate: the episode log and the
//! per-node episode reference lists.  Capacity starts at
//! [`DEFAULT_CAPACITY`] and doubles whenever an append would overflow it.
//! There is no removal and no shrinking; the only way to give memory back
//! is to drop the whole list (or [`GrowList::discard`] it, which is what
//! ubiquity eviction does).
//!
//! Allocation failure aborts the process through the global allocator, the
//! same discipline the host runtime follows.

/// Initial capacity of every [`GrowList`].
pub const DEFAULT_CAPACITY: usize = 32;

/// Append-only array with explicit capacity doubling.
#[derive(Debug, Clone)]
pub struct GrowList<T> {
    items: Vec<T>,
}

impl<T> Default for GrowList<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> GrowList<T> {
    /// Create an empty list with [`DEFAULT_CAPACITY`] slots reserved.
    pub fn new() -> Self {
        Self {
            items: Vec::with_capacity(DEFAULT_CAPACITY),
        }
    }

    /// Append `item`, doubling the capacity first if the list is full.
    pub fn push(&mut self, item: T) {
        if self.items.len() == self.items.capacity() {
            let extra = self.items.capacity().max(DEFAULT_CAPACITY);
            self.items.reserve_exact(extra);
        }
        self.items.push(item);
    }

    pub fn get(&self, index: usize) -> Option<&T> {
        self.items.get(index)
    }

    pub fn get_mut(&mut self, index: usize) -> Option<&mut T> {
        self.items.get_mut(index)
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.items.capacity()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, T> {
        self.items.iter()
    }

    pub fn iter_mut(&mut self) -> std::slice::IterMut<'_, T> {
        self.items.iter_mut()
    }

    pub fn as_slice(&self) -> &[T] {
        &self.items
    }

    /// Drop every element and release the backing storage.
    pub fn discard(&mut self) {
        self.items = Vec::new();
    }
}

impl<'a, T> IntoIterator for &'a GrowList<T> {
    type Item = &'a T;
    type IntoIter = std::slice::Iter<'a, T>;

    fn into_iter(self) -> Self::IntoIter {
        self.items.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn starts_with_default_capacity() {
        let list: GrowList<u32> = GrowList::new();
        assert!(list.is_empty());
        assert!(list.capacity() >= DEFAULT_CAPACITY);
    }

    #[test]
    fn capacity_doubles_on_overflow() {
        let mut list = GrowList::new();
        for i in 0..DEFAULT_CAPACITY {
            list.push(i);
        }
        let before = list.capacity();
        list.push(DEFAULT_CAPACITY);
        assert!(list.capacity() >= before * 2);
        assert_eq!(list.len(), DEFAULT_CAPACITY + 1);
    }

    #[test]
    fn index_returns_appended_items_in_order() {
        let mut list = GrowList::new();
        list.push("a");
        list.push("b");
        assert_eq!(list.get(0), Some(&"a"));
        assert_eq!(list.get(1), Some(&"b"));
        assert_eq!(list.get(2), None);
        assert_eq!(list.iter().copied().collect::<Vec<_>>(), vec!["a", "b"]);
    }

    #[test]
    fn discard_empties_the_list() {
        let mut list = GrowList::new();
        list.push(1);
        list.discard();
        assert!(list.is_empty());
        assert_eq!(list.get(0), None);
    }
}
