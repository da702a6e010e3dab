use parking_lot::Mutex;

/// Maps opaque 64-bit handles to values.
///
/// A handle packs a slot index (low 32 bits, offset by one so that `0` is never a valid handle) and the
/// slot's generation (high 32 bits). Removing a value bumps the generation, so handles to a removed value
/// never resolve again even after the slot is reused.
#[derive(Debug)]
pub struct HandleTable<T> {
    slots: Mutex<Slots<T>>,
    limit: u32,
}

#[derive(Debug)]
struct Slots<T> {
    entries: Vec<Entry<T>>,
    free: Vec<u32>,
}

#[derive(Debug)]
struct Entry<T> {
    generation: u32,
    value: Option<T>,
}

impl<T> HandleTable<T> {
    pub fn new() -> Self {
        Self::with_capacity_limit(u32::MAX)
    }

    /// A table that never holds more than `limit` values at once.
    pub fn with_capacity_limit(limit: u32) -> Self {
        Self {
            slots: Mutex::new(Slots {
                entries: Vec::new(),
                free: Vec::new(),
            }),
            limit,
        }
    }

    /// Stores `value` and returns its handle.
    ///
    /// Returns [`None`] when no more slots can be addressed.
    pub fn insert(&self, value: T) -> Option<u64> {
        let mut slots = self.slots.lock();

        let index = match slots.free.pop() {
            Some(index) => index,
            None => {
                let index = u32::try_from(slots.entries.len()).ok()?;
                if index >= self.limit {
                    return None;
                }
                slots.entries.try_reserve(1).ok()?;
                slots.entries.push(Entry {
                    generation: 0,
                    value: None,
                });
                index
            }
        };

        let entry = &mut slots.entries[index as usize];
        entry.value = Some(value);
        Some(encode(index, entry.generation))
    }

    /// Removes the value behind `handle`.
    pub fn remove(&self, handle: u64) -> Option<T> {
        let (index, generation) = decode(handle)?;
        let mut slots = self.slots.lock();

        let entry = slots.entries.get_mut(index as usize)?;
        if entry.generation != generation {
            return None;
        }

        let value = entry.value.take()?;
        entry.generation = entry.generation.wrapping_add(1);
        slots.free.push(index);
        Some(value)
    }

    pub fn len(&self) -> usize {
        self.slots
            .lock()
            .entries
            .iter()
            .filter(|entry| entry.value.is_some())
            .count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<T: Clone> HandleTable<T> {
    /// Returns a copy of the value behind `handle`.
    pub fn get(&self, handle: u64) -> Option<T> {
        let (index, generation) = decode(handle)?;
        let slots = self.slots.lock();

        slots
            .entries
            .get(index as usize)
            .filter(|entry| entry.generation == generation)
            .and_then(|entry| entry.value.clone())
    }
}

impl<T> Default for HandleTable<T> {
    fn default() -> Self {
        Self::new()
    }
}

fn encode(index: u32, generation: u32) -> u64 {
    (u64::from(generation) << 32) | (u64::from(index) + 1)
}

fn decode(handle: u64) -> Option<(u32, u32)> {
    let index = (handle & u64::from(u32::MAX)).checked_sub(1)?;
    Some((index as u32, (handle >> 32) as u32))
}
