//! # Channel
//! Game and trainer share one [`SharedRecord`](crate::frame::SharedRecord).
//! Instead of an OS mutex they cooperate through two flags:
//! ```notrust
//!   game                               trainer
//!   ----                               -------
//!   wait while trainer_reading == 1    spin while host_writing == 1 (bounded)
//!   host_writing = 1                   trainer_reading = 1
//!   write frame                        read frame
//!   host_writing = 0                   write action_command
//!   read action_command                trainer_reading = 0
//! ```
//! Every field is a single 32 bit word and is written atomically at that granularity.
//! Nothing here can protect against a peer violating the convention.
mod mmap;
mod memory;
#[cfg(windows)]
mod named;

pub use mmap::*;
pub use memory::*;
#[cfg(windows)]
pub use named::*;

/// Region the game's segment is attached through: a named mapping on Windows,
/// a memory mapped `/dev/shm` file elsewhere.
#[cfg(windows)]
pub type SegmentRegion = NamedMappingRegion;
#[cfg(not(windows))]
pub type SegmentRegion = MmapRegion;

/// Segment name the game creates, in the form [`SegmentRegion::attach`] expects.
#[cfg(windows)]
pub const DEFAULT_SEGMENT: &str = "GD_RL_Memory";
#[cfg(not(windows))]
pub const DEFAULT_SEGMENT: &str = "/dev/shm/GD_RL_Memory";

use std::path::Path;
use std::time::Duration;
use serde::{Deserialize, Serialize};
use crate::error::ChannelError;
use crate::frame::{layout, Action, RawFrame, SharedRecord};


/// Word addressed view of the shared record.
pub trait SharedRegion{
    /// Atomically loads 32 bit word at byte `offset`.
    fn load_word(&self, offset: usize) -> u32;
    /// Atomically stores 32 bit word at byte `offset`.
    fn store_word(&self, offset: usize, value: u32);

    fn load_i32(&self, offset: usize) -> i32{
        self.load_word(offset) as i32
    }
    fn store_i32(&self, offset: usize, value: i32){
        self.store_word(offset, value as u32)
    }
    fn load_f32(&self, offset: usize) -> f32{
        f32::from_bits(self.load_word(offset))
    }
    fn store_f32(&self, offset: usize, value: f32){
        self.store_word(offset, value.to_bits())
    }

    /// Copies whole record word by word. Words are individually atomic, the record as a whole is not.
    fn snapshot(&self) -> SharedRecord{
        let mut bytes = [0u8; layout::RECORD_SIZE];
        for (i, chunk) in bytes.chunks_exact_mut(4).enumerate(){
            chunk.copy_from_slice(&self.load_word(i * 4).to_ne_bytes());
        }
        bytemuck::pod_read_unaligned(&bytes)
    }
}

/// Timing assumptions of the handshake.
#[derive(Copy, Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChannelTiming{
    /// Iterations of busy wait on `host_writing` before reading anyway.
    pub spin_limit: u32,
    /// Sleep after reset request. The peer does not acknowledge reset, it is expected to respawn in this time.
    pub reset_delay_ms: u64,
    /// Sleep after checkpoint request.
    pub checkpoint_delay_ms: u64,
}

impl Default for ChannelTiming{
    fn default() -> Self {
        Self{
            spin_limit: 2000,
            reset_delay_ms: 50,
            checkpoint_delay_ms: 1350,
        }
    }
}

impl ChannelTiming{
    /// No sleeping, used with simulated peers.
    pub fn immediate() -> Self{
        Self{
            reset_delay_ms: 0,
            checkpoint_delay_ms: 0,
            ..Default::default()
        }
    }
    pub fn reset_delay(&self) -> Duration{
        Duration::from_millis(self.reset_delay_ms)
    }
    pub fn checkpoint_delay(&self) -> Duration{
        Duration::from_millis(self.checkpoint_delay_ms)
    }
}

/// Trainer side of the two-flag protocol.
pub struct SharedChannel<R: SharedRegion>{
    region: R,
    timing: ChannelTiming,
    stale_reads: u64,
}

impl SharedChannel<SegmentRegion>{

    /// Attaches to segment created by game. Missing segment is unrecoverable, there is no retry.
    pub fn attach<P: AsRef<Path>>(segment: P, timing: ChannelTiming) -> Result<Self, ChannelError>{
        let region = SegmentRegion::attach(segment)?;
        #[cfg(feature = "log_info")]
        log::info!("Attached to shared memory segment {:?} ({} bytes)", region.segment(), layout::RECORD_SIZE);
        Ok(Self::new(region, timing))
    }
}

impl<R: SharedRegion> SharedChannel<R>{
    pub fn new(region: R, timing: ChannelTiming) -> Self{
        Self{region, timing, stale_reads: 0}
    }

    /// Waits (bounded) for game to finish writing, claims record and decodes current frame.
    /// Claim is not released here, it is released by [`write_action`](SharedChannel::write_action).
    /// When spin budget is exhausted frame is read anyway and may be stale or torn.
    pub fn read(&mut self) -> RawFrame{
        let mut spins = 0u32;
        while self.region.load_i32(layout::HOST_WRITING) == 1{
            spins += 1;
            if spins > self.timing.spin_limit{
                self.stale_reads += 1;
                #[cfg(feature = "log_debug")]
                log::debug!("Spin budget of {} exhausted, reading possibly stale frame (total stale reads: {})",
                    self.timing.spin_limit, self.stale_reads);
                break;
            }
            std::hint::spin_loop();
        }
        self.region.store_i32(layout::TRAINER_READING, 1);
        RawFrame::from_record(&self.region.snapshot())
    }

    /// Writes action and then releases claim, allowing game to publish next frame.
    pub fn write_action(&mut self, action: Action){
        self.region.store_i32(layout::ACTION_COMMAND, action.index() as i32);
        self.region.store_i32(layout::TRAINER_READING, 0);
    }

    /// Requests level reset. There is no acknowledgement, after the request channel sleeps
    /// for [`reset_delay`](ChannelTiming::reset_delay) expecting the game to respawn.
    pub fn send_reset(&mut self){
        self.region.store_i32(layout::TRAINER_READING, 1);
        self.region.store_i32(layout::RESET_COMMAND, 1);
        self.region.store_i32(layout::ACTION_COMMAND, Action::Release.index() as i32);
        self.region.store_i32(layout::TRAINER_READING, 0);
        #[cfg(feature = "log_trace")]
        log::trace!("Reset requested");
        sleep(self.timing.reset_delay());
    }

    /// Requests the game to set practice checkpoint at current position.
    pub fn send_checkpoint(&mut self){
        self.region.store_i32(layout::CHECKPOINT_COMMAND, 1);
        #[cfg(feature = "log_debug")]
        log::debug!("Checkpoint requested");
        sleep(self.timing.checkpoint_delay());
    }

    /// Number of reads that gave up waiting for the game.
    pub fn stale_reads(&self) -> u64{
        self.stale_reads
    }

    pub fn timing(&self) -> &ChannelTiming{
        &self.timing
    }

    pub fn region(&self) -> &R{
        &self.region
    }
}

fn sleep(duration: Duration){
    if !duration.is_zero(){
        std::thread::sleep(duration);
    }
}

#[cfg(test)]
mod tests{
    use std::cell::RefCell;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;
    use std::thread;
    use crate::channel::{ChannelTiming, InMemoryRegion, SharedChannel, SharedRegion};
    use crate::frame::{layout, Action};

    /// Region recording every store in order.
    struct RecordingRegion{
        inner: InMemoryRegion,
        stores: RefCell<Vec<(usize, u32)>>,
    }

    impl SharedRegion for RecordingRegion{
        fn load_word(&self, offset: usize) -> u32 {
            self.inner.load_word(offset)
        }

        fn store_word(&self, offset: usize, value: u32) {
            self.stores.borrow_mut().push((offset, value));
            self.inner.store_word(offset, value)
        }
    }

    fn recording() -> SharedChannel<RecordingRegion>{
        SharedChannel::new(RecordingRegion{inner: InMemoryRegion::new(), stores: RefCell::new(Vec::new())},
            ChannelTiming::immediate())
    }

    #[test]
    fn read_claims_record_and_keeps_claim(){
        let region = InMemoryRegion::new();
        region.store_f32(layout::PERCENT, 12.5);
        let mut channel = SharedChannel::new(region.clone(), ChannelTiming::immediate());
        let frame = channel.read();
        assert_eq!(frame.percent, 12.5);
        assert_eq!(region.load_i32(layout::TRAINER_READING), 1);
        assert_eq!(channel.stale_reads(), 0);
    }

    #[test]
    fn write_action_clears_flag_after_action(){
        let mut channel = recording();
        channel.read();
        channel.region().stores.borrow_mut().clear();
        channel.write_action(Action::Hold);
        let stores = channel.region().stores.borrow().clone();
        assert_eq!(stores, vec![(layout::ACTION_COMMAND, 1), (layout::TRAINER_READING, 0)]);
    }

    #[test]
    fn reset_sequence_order(){
        let mut channel = recording();
        channel.send_reset();
        let stores = channel.region().stores.borrow().clone();
        assert_eq!(stores, vec![
            (layout::TRAINER_READING, 1),
            (layout::RESET_COMMAND, 1),
            (layout::ACTION_COMMAND, 0),
            (layout::TRAINER_READING, 0),
        ]);
    }

    #[test]
    fn read_gives_up_on_stuck_writer(){
        let region = InMemoryRegion::new();
        region.store_i32(layout::HOST_WRITING, 1);
        region.store_f32(layout::PERCENT, 3.0);
        let mut channel = SharedChannel::new(region, ChannelTiming{spin_limit: 10, ..ChannelTiming::immediate()});
        let frame = channel.read();
        assert_eq!(frame.percent, 3.0);
        assert_eq!(channel.stale_reads(), 1);
    }

    #[test]
    fn read_waits_for_writer_in_other_thread(){
        let region = InMemoryRegion::new();
        region.store_i32(layout::HOST_WRITING, 1);
        let peer = region.clone();
        let started = Arc::new(AtomicBool::new(false));
        let started_peer = started.clone();
        let mut channel = SharedChannel::new(region, ChannelTiming{spin_limit: u32::MAX, ..ChannelTiming::immediate()});
        thread::scope(|s|{
            s.spawn(move ||{
                started_peer.store(true, Ordering::Release);
                peer.store_f32(layout::PERCENT, 77.0);
                peer.store_i32(layout::HOST_WRITING, 0);
            });
            let frame = channel.read();
            assert!(started.load(Ordering::Acquire));
            assert_eq!(frame.percent, 77.0);
        });
        assert_eq!(channel.stale_reads(), 0);
    }
}
