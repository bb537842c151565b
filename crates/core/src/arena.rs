//! Generational arenas and the typed ids collaborators hold.
//!
//! The device owns every resource wrapper. Callers get a copyable [`Id`]
//! carrying the slot index, the slot generation and the identity of the
//! owning device; a destroyed resource's id stops resolving as soon as its
//! slot is reused or emptied.

use std::fmt;
use std::hash::{Hash, Hasher};
use std::marker::PhantomData;
use std::sync::atomic::{AtomicU32, Ordering};

static NEXT_OWNER: AtomicU32 = AtomicU32::new(1);

/// Allocates a process-unique owner tag for a new device.
pub(crate) fn next_owner() -> u32 {
    NEXT_OWNER.fetch_add(1, Ordering::Relaxed)
}

/// Typed handle into an [`Arena`].
pub struct Id<M> {
    index: u32,
    generation: u32,
    owner: u32,
    _marker: PhantomData<fn() -> M>,
}

impl<M> Id<M> {
    /// Packs index and generation into a stable 64-bit identity.
    pub fn to_bits(self) -> u64 {
        (u64::from(self.generation) << 32) | u64::from(self.index)
    }

    pub fn index(self) -> u32 {
        self.index
    }

    pub fn owner(self) -> u32 {
        self.owner
    }
}

impl<M> Clone for Id<M> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<M> Copy for Id<M> {}

impl<M> PartialEq for Id<M> {
    fn eq(&self, other: &Self) -> bool {
        self.index == other.index && self.generation == other.generation && self.owner == other.owner
    }
}

impl<M> Eq for Id<M> {}

impl<M> Hash for Id<M> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.index.hash(state);
        self.generation.hash(state);
        self.owner.hash(state);
    }
}

impl<M> fmt::Debug for Id<M> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Id({}v{}@{})", self.index, self.generation, self.owner)
    }
}

/// Id marker types.
pub mod marker {
    #[derive(Debug)]
    pub enum Texture {}
    #[derive(Debug)]
    pub enum VertexBuffer {}
    #[derive(Debug)]
    pub enum IndexBuffer {}
    #[derive(Debug)]
    pub enum Shader {}
    #[derive(Debug)]
    pub enum RenderTarget {}
}

pub type TextureId = Id<marker::Texture>;
pub type VertexBufferId = Id<marker::VertexBuffer>;
pub type IndexBufferId = Id<marker::IndexBuffer>;
pub type ShaderId = Id<marker::Shader>;
pub type RenderTargetId = Id<marker::RenderTarget>;

#[derive(Debug)]
struct Slot<T> {
    generation: u32,
    value: Option<T>,
}

/// Slot storage with generation-checked lookups.
#[derive(Debug)]
pub struct Arena<M, T> {
    slots: Vec<Slot<T>>,
    free: Vec<u32>,
    owner: u32,
    len: usize,
    _marker: PhantomData<fn() -> M>,
}

impl<M, T> Arena<M, T> {
    pub fn new(owner: u32) -> Self {
        Self {
            slots: Vec::new(),
            free: Vec::new(),
            owner,
            len: 0,
            _marker: PhantomData,
        }
    }

    pub fn insert(&mut self, value: T) -> Id<M> {
        self.len += 1;
        if let Some(index) = self.free.pop() {
            let slot = &mut self.slots[index as usize];
            slot.generation = slot.generation.wrapping_add(1);
            slot.value = Some(value);
            let generation = slot.generation;
            return self.id(index, generation);
        }
        let index = self.slots.len() as u32;
        self.slots.push(Slot {
            generation: 0,
            value: Some(value),
        });
        self.id(index, 0)
    }

    fn id(&self, index: u32, generation: u32) -> Id<M> {
        Id {
            index,
            generation,
            owner: self.owner,
            _marker: PhantomData,
        }
    }

    fn slot(&self, id: Id<M>) -> Option<&Slot<T>> {
        debug_assert_eq!(
            id.owner, self.owner,
            "resource id {id:?} belongs to a different device"
        );
        self.slots
            .get(id.index as usize)
            .filter(|slot| slot.generation == id.generation)
    }

    pub fn get(&self, id: Id<M>) -> Option<&T> {
        self.slot(id).and_then(|slot| slot.value.as_ref())
    }

    pub fn get_mut(&mut self, id: Id<M>) -> Option<&mut T> {
        self.slot(id)?;
        self.slots[id.index as usize].value.as_mut()
    }

    pub fn contains(&self, id: Id<M>) -> bool {
        self.get(id).is_some()
    }

    pub fn remove(&mut self, id: Id<M>) -> Option<T> {
        self.slot(id)?;
        let value = self.slots[id.index as usize].value.take()?;
        self.free.push(id.index);
        self.len -= 1;
        Some(value)
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn ids(&self) -> Vec<Id<M>> {
        self.iter().map(|(id, _)| id).collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = (Id<M>, &T)> + '_ {
        let owner = self.owner;
        self.slots.iter().enumerate().filter_map(move |(index, slot)| {
            slot.value.as_ref().map(|value| {
                (
                    Id {
                        index: index as u32,
                        generation: slot.generation,
                        owner,
                        _marker: PhantomData,
                    },
                    value,
                )
            })
        })
    }

    pub fn values_mut(&mut self) -> impl Iterator<Item = &mut T> + '_ {
        self.slots.iter_mut().filter_map(|slot| slot.value.as_mut())
    }

    /// Empties every slot, returning the values.
    pub fn drain(&mut self) -> Vec<T> {
        let mut out = Vec::with_capacity(self.len);
        for (index, slot) in self.slots.iter_mut().enumerate() {
            if let Some(value) = slot.value.take() {
                self.free.push(index as u32);
                out.push(value);
            }
        }
        self.len = 0;
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    type TestArena = Arena<marker::Texture, &'static str>;

    #[test]
    fn insert_then_get_round_trips() {
        let mut arena = TestArena::new(7);
        let id = arena.insert("a");
        assert_eq!(arena.get(id), Some(&"a"));
        assert_eq!(id.owner(), 7);
        assert_eq!(arena.len(), 1);
    }

    #[test]
    fn removed_id_stops_resolving_after_reuse() {
        let mut arena = TestArena::new(1);
        let old = arena.insert("old");
        assert_eq!(arena.remove(old), Some("old"));
        let new = arena.insert("new");
        assert_eq!(old.index(), new.index(), "slot should be reused");
        assert_ne!(old, new, "generation must differ");
        assert_eq!(arena.get(old), None);
        assert_eq!(arena.get(new), Some(&"new"));
    }

    #[test]
    fn double_remove_is_none() {
        let mut arena = TestArena::new(1);
        let id = arena.insert("x");
        assert!(arena.remove(id).is_some());
        assert!(arena.remove(id).is_none());
        assert!(arena.is_empty());
    }

    #[test]
    fn to_bits_differs_across_generations() {
        let mut arena = TestArena::new(1);
        let a = arena.insert("a");
        arena.remove(a);
        let b = arena.insert("b");
        assert_ne!(a.to_bits(), b.to_bits());
    }

    #[test]
    fn iter_skips_empty_slots() {
        let mut arena = TestArena::new(1);
        let a = arena.insert("a");
        let _b = arena.insert("b");
        arena.remove(a);
        let values: Vec<&str> = arena.iter().map(|(_, v)| *v).collect();
        assert_eq!(values, ["b"]);
    }

    #[test]
    fn drain_empties_arena() {
        let mut arena = TestArena::new(1);
        arena.insert("a");
        arena.insert("b");
        assert_eq!(arena.drain().len(), 2);
        assert!(arena.is_empty());
        assert_eq!(arena.iter().count(), 0);
    }

    #[test]
    #[should_panic(expected = "different device")]
    #[cfg(debug_assertions)]
    fn foreign_id_is_a_debug_assertion() {
        let mut first = TestArena::new(1);
        let second = TestArena::new(2);
        let id = first.insert("a");
        let _ = second.get(id);
    }

    #[test]
    fn owners_are_unique() {
        assert_ne!(next_owner(), next_owner());
    }
}
