use std::collections::HashMap;
use std::ops;

use slab;

use super::stream::Stream;
use frame::StreamId;

/// Storage for streams
#[derive(Debug)]
pub struct Store {
    slab: slab::Slab<Stream>,
    ids: HashMap<StreamId, usize>,
}

/// "Pointer" to an entry in the store
pub struct Ptr<'a> {
    key: usize,
    slab: &'a mut slab::Slab<Stream>,
}

// ===== impl Store =====

impl Store {
    pub fn new() -> Self {
        Store {
            slab: slab::Slab::new(),
            ids: HashMap::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    pub fn get(&self, id: &StreamId) -> Option<&Stream> {
        self.ids.get(id).map(move |&key| &self.slab[key])
    }

    pub fn find_mut(&mut self, id: &StreamId) -> Option<Ptr> {
        if let Some(&key) = self.ids.get(id) {
            Some(Ptr {
                key: key,
                slab: &mut self.slab,
            })
        } else {
            None
        }
    }

    pub fn contains(&self, id: &StreamId) -> bool {
        self.ids.contains_key(id)
    }

    pub fn insert(&mut self, id: StreamId, val: Stream) {
        let key = self.slab.insert(val);
        assert!(self.ids.insert(id, key).is_none());
    }

    /// Drop a stream from the registry, returning it.
    pub fn remove(&mut self, id: &StreamId) -> Option<Stream> {
        let key = self.ids.remove(id)?;
        Some(self.slab.remove(key))
    }

    pub fn for_each<F>(&mut self, mut f: F)
    where
        F: FnMut(Ptr),
    {
        for &key in self.ids.values() {
            f(Ptr {
                key: key,
                slab: &mut self.slab,
            });
        }
    }

    /// Stream ids currently live, in no particular order.
    pub fn ids(&self) -> Vec<StreamId> {
        self.ids.keys().cloned().collect()
    }
}

// ===== impl Ptr =====

impl<'a> Ptr<'a> {
    pub fn into_mut(self) -> &'a mut Stream {
        &mut self.slab[self.key]
    }
}

impl<'a> ops::Deref for Ptr<'a> {
    type Target = Stream;

    fn deref(&self) -> &Stream {
        &self.slab[self.key]
    }
}

impl<'a> ops::DerefMut for Ptr<'a> {
    fn deref_mut(&mut self) -> &mut Stream {
        &mut self.slab[self.key]
    }
}

#[cfg(test)]
mod test {
    use super::super::scheduler;
    use super::*;

    fn stream(id: u32) -> Stream {
        Stream::new(id.into(), 65_535, 65_535, scheduler::Key::for_test(0))
    }

    #[test]
    fn insert_find_remove() {
        let mut store = Store::new();

        store.insert(1.into(), stream(1));
        store.insert(3.into(), stream(3));

        assert_eq!(store.len(), 2);
        assert_eq!(store.find_mut(&1.into()).unwrap().id, StreamId::from(1));
        assert!(store.find_mut(&5.into()).is_none());

        let removed = store.remove(&1.into()).unwrap();
        assert_eq!(removed.id, StreamId::from(1));
        assert_eq!(store.len(), 1);
        assert!(!store.contains(&1.into()));
    }

    #[test]
    fn for_each_visits_all() {
        let mut store = Store::new();

        for id in [1u32, 3, 5].iter() {
            store.insert((*id).into(), stream(*id));
        }

        let mut seen = Vec::new();
        store.for_each(|ptr| seen.push(u32::from(ptr.id)));
        seen.sort();

        assert_eq!(seen, vec![1, 3, 5]);
    }
}
