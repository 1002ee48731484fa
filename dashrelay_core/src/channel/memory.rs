use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use crate::channel::SharedRegion;
use crate::frame::layout;

/// Process local region. Clones share the same words, so one clone can be handed to a
/// simulated peer and the other to [`SharedChannel`](crate::channel::SharedChannel).
#[derive(Clone, Debug)]
pub struct InMemoryRegion{
    words: Arc<[AtomicU32]>,
}

impl Default for InMemoryRegion{
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryRegion{
    pub fn new() -> Self{
        Self{
            words: (0..layout::RECORD_WORDS).map(|_| AtomicU32::new(0)).collect()
        }
    }
}

impl SharedRegion for InMemoryRegion{
    fn load_word(&self, offset: usize) -> u32 {
        self.words[offset / 4].load(Ordering::Acquire)
    }

    fn store_word(&self, offset: usize, value: u32) {
        self.words[offset / 4].store(value, Ordering::Release)
    }
}
