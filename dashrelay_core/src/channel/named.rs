use std::ffi::CString;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU32, Ordering};
use windows_sys::Win32::Foundation::{CloseHandle, HANDLE};
use windows_sys::Win32::System::Memory::{MapViewOfFile, OpenFileMappingA, UnmapViewOfFile, FILE_MAP_ALL_ACCESS, MEMORY_MAPPED_VIEW_ADDRESS};
use crate::channel::SharedRegion;
use crate::error::ChannelError;
use crate::frame::layout;

/// Region backed by a named, pagefile backed file mapping (`CreateFileMapping` with no file).
/// Such a mapping has no path on disk, it is opened by name only.
pub struct NamedMappingRegion{
    handle: HANDLE,
    view: MEMORY_MAPPED_VIEW_ADDRESS,
    segment: PathBuf,
}

// SAFETY: the view stays valid until drop and is accessed only through atomics.
unsafe impl Send for NamedMappingRegion{}

impl NamedMappingRegion{
    /// Opens mapping called `segment` (e.g. `GD_RL_Memory`).
    pub fn attach<P: AsRef<Path>>(segment: P) -> Result<Self, ChannelError>{
        let segment = segment.as_ref().to_path_buf();
        let unavailable = |source: io::Error| ChannelError::SegmentUnavailable {segment: segment.clone(), source};
        let name = segment.to_str()
            .and_then(|s| CString::new(s).ok())
            .ok_or_else(|| unavailable(io::Error::new(io::ErrorKind::InvalidInput, "mapping name is not a valid C string")))?;

        // SAFETY: name is NUL terminated and outlives the call.
        let handle = unsafe { OpenFileMappingA(FILE_MAP_ALL_ACCESS, 0, name.as_ptr() as *const u8) };
        if handle.is_null(){
            return Err(unavailable(io::Error::last_os_error()))
        }
        // SAFETY: handle was just opened with full access.
        let view = unsafe { MapViewOfFile(handle, FILE_MAP_ALL_ACCESS, 0, 0, layout::RECORD_SIZE) };
        if view.Value.is_null(){
            let error = io::Error::last_os_error();
            // SAFETY: handle is owned here and not used afterwards.
            unsafe { CloseHandle(handle) };
            return Err(unavailable(error))
        }
        Ok(Self{handle, view, segment})
    }

    pub fn segment(&self) -> &Path{
        &self.segment
    }

    #[inline]
    fn word(&self, offset: usize) -> &AtomicU32{
        assert!(offset % 4 == 0 && offset + 4 <= layout::RECORD_SIZE, "offset {offset} outside record");
        // SAFETY: view is page aligned and at least RECORD_SIZE long, offset is checked above.
        unsafe { &*((self.view.Value as *const u8).add(offset) as *const AtomicU32) }
    }
}

impl SharedRegion for NamedMappingRegion{
    fn load_word(&self, offset: usize) -> u32 {
        self.word(offset).load(Ordering::Acquire)
    }

    fn store_word(&self, offset: usize, value: u32) {
        self.word(offset).store(value, Ordering::Release)
    }
}

impl Drop for NamedMappingRegion{
    fn drop(&mut self) {
        // SAFETY: view and handle were obtained in `attach` and are released exactly once.
        unsafe {
            UnmapViewOfFile(self.view);
            CloseHandle(self.handle);
        }
    }
}
