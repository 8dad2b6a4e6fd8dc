use std::fmt;

/// Handle to a loader owned by a [`Downloader`](crate::Downloader).
///
/// Handles carry the generation of their slot, so a handle to a released
/// loader never resolves to a newer loader reusing the slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct LoaderId {
    index:      u32,
    generation: u32,
}

impl fmt::Display for LoaderId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}v{}", self.index, self.generation)
    }
}

struct Slot<T> {
    generation: u32,
    value:      Option<T>,
}

/// Slab of values addressed by generation-tagged ids.
pub(crate) struct Arena<T> {
    slots: Vec<Slot<T>>,
    free:  Vec<u32>,
    len:   usize,
}

impl<T> Default for Arena<T> {
    fn default() -> Self {
        Self {
            slots: Vec::new(),
            free:  Vec::new(),
            len:   0,
        }
    }
}

impl<T> Arena<T> {
    pub fn insert(&mut self, value: T) -> LoaderId {
        self.len += 1;
        if let Some(index) = self.free.pop() {
            let slot = &mut self.slots[index as usize];
            slot.value = Some(value);
            return LoaderId {
                index,
                generation: slot.generation,
            };
        }
        let index = u32::try_from(self.slots.len()).unwrap_or(u32::MAX);
        self.slots.push(Slot {
            generation: 0,
            value:      Some(value),
        });
        LoaderId {
            index,
            generation: 0,
        }
    }

    pub fn get(&self, id: LoaderId) -> Option<&T> {
        self.slots
            .get(id.index as usize)
            .filter(|slot| slot.generation == id.generation)
            .and_then(|slot| slot.value.as_ref())
    }

    pub fn get_mut(&mut self, id: LoaderId) -> Option<&mut T> {
        self.slots
            .get_mut(id.index as usize)
            .filter(|slot| slot.generation == id.generation)
            .and_then(|slot| slot.value.as_mut())
    }

    pub fn remove(&mut self, id: LoaderId) -> Option<T> {
        let slot = self.slots.get_mut(id.index as usize)?;
        if slot.generation != id.generation {
            return None;
        }
        let value = slot.value.take()?;
        slot.generation = slot.generation.wrapping_add(1);
        self.free.push(id.index);
        self.len -= 1;
        Some(value)
    }

    pub fn len(&self) -> usize { self.len }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stale_id_does_not_resolve() {
        let mut arena = Arena::default();
        let first = arena.insert("first");
        assert_eq!(arena.remove(first), Some("first"));

        let second = arena.insert("second");
        assert_eq!(arena.get(first), None);
        assert_eq!(arena.get(second), Some(&"second"));
        assert_eq!(arena.remove(first), None);
        assert_eq!(arena.len(), 1);
    }
}
