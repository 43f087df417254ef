use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::marker::PhantomData;

/// Slot index plus generation counter, so stale references stop resolving.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, PartialOrd, Ord)]
pub struct GenerationalId {
    pub index: usize,
    pub generation: u32,
}

impl GenerationalId {
    pub fn new(index: usize, generation: u32) -> Self {
        Self { index, generation }
    }
}

/// Typed key handed out by an [`Arena`].
pub trait ArenaKey: Copy + Eq {
    fn from_raw(raw: GenerationalId) -> Self;
    fn raw(&self) -> GenerationalId;

    fn index(&self) -> usize {
        self.raw().index
    }

    fn generation(&self) -> u32 {
        self.raw().generation
    }
}

macro_rules! arena_key {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, PartialOrd, Ord)]
        pub struct $name(pub GenerationalId);

        impl ArenaKey for $name {
            fn from_raw(raw: GenerationalId) -> Self {
                Self(raw)
            }

            fn raw(&self) -> GenerationalId {
                self.0
            }
        }
    };
}

arena_key!(
    /// Reference to a scene object. Resolves to nothing once the object is deleted.
    ObjectId
);

arena_key!(
    /// Reference to an object group.
    GroupId
);

/// Generational arena that hands out stable keys while preventing use-after-free.
pub struct Arena<K, T> {
    items: Vec<Option<T>>,
    generations: Vec<u32>,
    free_list: VecDeque<usize>,
    _key: PhantomData<K>,
}

impl<K: ArenaKey + std::fmt::Debug, T: std::fmt::Debug> std::fmt::Debug for Arena<K, T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_map().entries(self.iter()).finish()
    }
}

impl<K: ArenaKey, T> Default for Arena<K, T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<K: ArenaKey, T> Arena<K, T> {
    pub fn new() -> Self {
        Self {
            items: Vec::new(),
            generations: Vec::new(),
            free_list: VecDeque::new(),
            _key: PhantomData,
        }
    }

    pub fn insert(&mut self, item: T) -> K {
        if let Some(index) = self.free_list.pop_front() {
            let generation = self.generations[index];
            self.items[index] = Some(item);
            return K::from_raw(GenerationalId::new(index, generation));
        }

        let index = self.items.len();
        self.items.push(Some(item));
        self.generations.push(0);
        K::from_raw(GenerationalId::new(index, 0))
    }

    pub fn get(&self, id: K) -> Option<&T> {
        if self.is_valid(id) {
            self.items.get(id.index()).and_then(|slot| slot.as_ref())
        } else {
            None
        }
    }

    pub fn get_mut(&mut self, id: K) -> Option<&mut T> {
        if self.is_valid(id) {
            self.items.get_mut(id.index()).and_then(|slot| slot.as_mut())
        } else {
            None
        }
    }

    pub fn contains(&self, id: K) -> bool {
        self.get(id).is_some()
    }

    pub fn remove(&mut self, id: K) -> Option<T> {
        if !self.is_valid(id) {
            return None;
        }
        let slot = self.items.get_mut(id.index())?;
        if slot.is_some() {
            self.generations[id.index()] = self.generations[id.index()].wrapping_add(1);
            self.free_list.push_back(id.index());
        }
        slot.take()
    }

    pub fn iter(&self) -> impl Iterator<Item = (K, &T)> + '_ {
        self.items.iter().enumerate().filter_map(|(index, slot)| {
            slot.as_ref().map(|item| {
                (
                    K::from_raw(GenerationalId::new(index, self.generations[index])),
                    item,
                )
            })
        })
    }

    pub fn ids(&self) -> impl Iterator<Item = K> + '_ {
        self.iter().map(|(id, _)| id)
    }

    pub fn len(&self) -> usize {
        self.items.iter().filter(|slot| slot.is_some()).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn is_valid(&self, id: K) -> bool {
        self.generations
            .get(id.index())
            .copied()
            .map(|gen| gen == id.generation())
            .unwrap_or(false)
    }
}
