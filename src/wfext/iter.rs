use super::bucket::Entry;

use triomphe::Arc;

/// An iterator over a point-in-time copy of a [`HashMap`][map-struct]'s
/// entries, yielding clones of each key and value.
///
/// Each bucket is read at a single instant, but different buckets may be read
/// at different instants. Updates made after `iter` was called are not
/// observed.
///
/// [map-struct]: ./struct.HashMap.html
pub struct Iter<K, V> {
    entries: std::vec::IntoIter<Arc<Entry<K, V>>>,
}

impl<K, V> Iter<K, V> {
    pub(crate) fn new(entries: Vec<Arc<Entry<K, V>>>) -> Self {
        Self {
            entries: entries.into_iter(),
        }
    }
}

impl<K: Clone, V: Clone> Iterator for Iter<K, V> {
    type Item = (K, V);

    fn next(&mut self) -> Option<Self::Item> {
        self.entries
            .next()
            .map(|entry| (entry.key.clone(), entry.value.clone()))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.entries.size_hint()
    }
}

impl<K: Clone, V: Clone> ExactSizeIterator for Iter<K, V> {}

impl<K, V> std::fmt::Debug for Iter<K, V> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Iter")
            .field("remaining", &self.entries.len())
            .finish()
    }
}
