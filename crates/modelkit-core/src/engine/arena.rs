use slotmap::{Key, SlotMap};

/// A slot-map arena that also remembers registration order.
#[derive(Debug)]
pub(crate) struct OrderedArena<K: Key, T> {
    items: SlotMap<K, T>,
    order: Vec<K>,
}

impl<K: Key, T> OrderedArena<K, T> {
    pub(crate) fn new() -> Self {
        Self {
            items: SlotMap::with_key(),
            order: Vec::new(),
        }
    }

    pub(crate) fn insert(&mut self, item: T) -> K {
        let id = self.items.insert(item);
        self.order.push(id);
        id
    }

    pub(crate) fn remove(&mut self, id: K) -> Option<T> {
        let item = self.items.remove(id)?;
        self.order.retain(|&other| other != id);
        Some(item)
    }

    pub(crate) fn get(&self, id: K) -> Option<&T> {
        self.items.get(id)
    }

    pub(crate) fn get_mut(&mut self, id: K) -> Option<&mut T> {
        self.items.get_mut(id)
    }

    pub(crate) fn order(&self) -> &[K] {
        &self.order
    }

    pub(crate) fn len(&self) -> usize {
        self.order.len()
    }

    pub(crate) fn iter(&self) -> impl Iterator<Item = (K, &T)> + '_ {
        self.order
            .iter()
            .filter_map(|&id| self.items.get(id).map(|item| (id, item)))
    }

    /// Visits every item in registration order, stopping at the first error.
    pub(crate) fn try_for_each_mut<E>(
        &mut self,
        mut f: impl FnMut(K, &mut T) -> Result<(), E>,
    ) -> Result<(), E> {
        for &id in &self.order {
            if let Some(item) = self.items.get_mut(id) {
                f(id, item)?;
            }
        }
        Ok(())
    }

    /// Visits every item newest first, stopping at the first error.
    pub(crate) fn try_for_each_mut_rev<E>(
        &mut self,
        mut f: impl FnMut(K, &mut T) -> Result<(), E>,
    ) -> Result<(), E> {
        for &id in self.order.iter().rev() {
            if let Some(item) = self.items.get_mut(id) {
                f(id, item)?;
            }
        }
        Ok(())
    }

    /// Removes every item, newest first.
    pub(crate) fn drain_reverse(&mut self) -> Vec<T> {
        let mut drained = Vec::with_capacity(self.order.len());
        while let Some(id) = self.order.pop() {
            if let Some(item) = self.items.remove(id) {
                drained.push(item);
            }
        }
        drained
    }
}
