use std::fs::OpenOptions;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU32, Ordering};
use memmap2::{MmapMut, MmapOptions};
use crate::channel::SharedRegion;
use crate::error::ChannelError;
use crate::frame::layout;

/// Region backed by memory mapped file of an existing segment (on Linux `/dev/shm/<name>`).
/// Segment is created by the game process, this side only attaches.
pub struct MmapRegion{
    map: MmapMut,
    segment: PathBuf,
}

impl MmapRegion{
    pub fn attach<P: AsRef<Path>>(segment: P) -> Result<Self, ChannelError>{
        let segment = segment.as_ref().to_path_buf();
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .open(&segment)
            .map_err(|e| ChannelError::SegmentUnavailable{segment: segment.clone(), source: e})?;
        let len = file.metadata()
            .map_err(|e| ChannelError::SegmentUnavailable{segment: segment.clone(), source: e})?
            .len();
        if len < layout::RECORD_SIZE as u64{
            return Err(ChannelError::SegmentTooSmall {segment, found: len, required: layout::RECORD_SIZE})
        }
        // SAFETY: mapping is only accessed through aligned 32 bit atomics, the peer follows the
        // same word granularity.
        let map = unsafe {
            MmapOptions::new().len(layout::RECORD_SIZE).map_mut(&file)
        }.map_err(|e| ChannelError::SegmentUnavailable{segment: segment.clone(), source: e})?;

        Ok(Self{map, segment})
    }

    pub fn segment(&self) -> &Path{
        &self.segment
    }

    #[inline]
    fn word(&self, offset: usize) -> &AtomicU32{
        assert!(offset % 4 == 0 && offset + 4 <= layout::RECORD_SIZE, "offset {offset} outside record");
        // SAFETY: map is page aligned and at least RECORD_SIZE long, offset is checked above.
        unsafe { &*(self.map.as_ptr().add(offset) as *const AtomicU32) }
    }
}

impl SharedRegion for MmapRegion{
    fn load_word(&self, offset: usize) -> u32 {
        self.word(offset).load(Ordering::Acquire)
    }

    fn store_word(&self, offset: usize, value: u32) {
        self.word(offset).store(value, Ordering::Release)
    }
}
