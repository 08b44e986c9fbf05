//! Double-buffered frame slots shared between the decoder and the compositor
//!
//! Two fixed-size slots are exchanged by index. The mutex only guards the
//! index bookkeeping; pixel data is written and scanned outside the lock
//! through [`WriteWindow`] and [`ReadWindow`], which are the only ways to
//! reach slot memory.
//!
//! Invariants kept under the lock:
//! - the write slot is never pinned by a reader
//! - slot roles only change in `commit_frame`, on read-pin release (deferred
//!   commit), and on renegotiation/cleanup
//! - windows from an older generation can no longer change pool state

use crate::types::NegotiatedFormat;

use parking_lot::Mutex;
use std::sync::Arc;

/// One pixel buffer
///
/// Owns a heap allocation through a raw pointer so that slices handed to the
/// producer and the consumer never alias a reference to the owning `Box`.
struct Slot {
    ptr: *mut u8,
    len: usize,
}

// SAFETY: access to the bytes is arbitrated by `PoolState`; at most one
// `WriteWindow` exists per slot and it never coexists with a read pin on the
// same slot. `len` is immutable.
unsafe impl Send for Slot {}
unsafe impl Sync for Slot {}

impl Slot {
    fn zeroed(len: usize) -> Arc<Self> {
        let data = Box::into_raw(vec![0u8; len].into_boxed_slice());
        Arc::new(Self {
            ptr: data.cast::<u8>(),
            len,
        })
    }

    fn len(&self) -> usize {
        self.len
    }

    /// # Safety
    /// The caller must hold a read pin or the write role on this slot.
    unsafe fn bytes(&self) -> &[u8] {
        std::slice::from_raw_parts(self.ptr, self.len)
    }

    /// # Safety
    /// The caller must be the only accessor of this slot.
    #[allow(clippy::mut_from_ref)]
    unsafe fn bytes_mut(&self) -> &mut [u8] {
        std::slice::from_raw_parts_mut(self.ptr, self.len)
    }
}

impl Drop for Slot {
    fn drop(&mut self) {
        let data = std::ptr::slice_from_raw_parts_mut(self.ptr, self.len);
        // SAFETY: `ptr`/`len` came from `Box::into_raw` in `zeroed`.
        drop(unsafe { Box::from_raw(data) });
    }
}

struct PoolState {
    slots: [Arc<Slot>; 2],
    write: usize,
    read: usize,
    format: Option<NegotiatedFormat>,
    has_frame: bool,
    generation: u64,
    writer_active: bool,
    read_pins: u32,
    /// Committed frame waiting for the read pin to drop
    pending_commit: bool,
    /// Read slot holds a frame no reader has taken yet
    unread: bool,
    frames_committed: u64,
    frames_dropped: u64,
}

impl PoolState {
    fn empty() -> Self {
        Self {
            slots: [Slot::zeroed(0), Slot::zeroed(0)],
            write: 0,
            read: 1,
            format: None,
            has_frame: false,
            generation: 0,
            writer_active: false,
            read_pins: 0,
            pending_commit: false,
            unread: false,
            frames_committed: 0,
            frames_dropped: 0,
        }
    }

    fn swap(&mut self) {
        if self.unread {
            self.frames_dropped += 1;
        }
        std::mem::swap(&mut self.write, &mut self.read);
        self.has_frame = true;
        self.unread = true;
    }

    fn reset(&mut self, slots: [Arc<Slot>; 2], format: Option<NegotiatedFormat>) {
        self.slots = slots;
        self.write = 0;
        self.read = 1;
        self.format = format;
        self.has_frame = false;
        self.generation += 1;
        self.writer_active = false;
        self.read_pins = 0;
        self.pending_commit = false;
        self.unread = false;
    }
}

/// Producer/consumer slot exchange
pub struct FrameBufferPool {
    state: Mutex<PoolState>,
}

impl FrameBufferPool {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(PoolState::empty()),
        }
    }

    /// Reallocate both slots for a newly negotiated format
    ///
    /// Slots are zero-filled, the write role goes to slot 0 and the read role
    /// to slot 1. Windows handed out before this call keep their old memory
    /// alive but can no longer commit.
    pub fn reallocate(&self, format: NegotiatedFormat) -> usize {
        let size = format.buffer_size();
        let slots = [Slot::zeroed(size), Slot::zeroed(size)];

        let mut state = self.state.lock();
        state.reset(slots, Some(format));
        tracing::debug!(
            "Frame pool reallocated: 2 x {} bytes (generation {})",
            size,
            state.generation
        );
        size
    }

    /// Drop both slots and forget the negotiated format
    pub fn clear(&self) {
        let mut state = self.state.lock();
        state.reset([Slot::zeroed(0), Slot::zeroed(0)], None);
        tracing::debug!("Frame pool cleared (generation {})", state.generation);
    }

    /// Hand the producer the current write slot
    ///
    /// Returns `None` before negotiation or while another write window is
    /// still outstanding. Any frame committed but not yet displayed is about
    /// to be overwritten and is counted as dropped.
    pub fn acquire_write_slot(&self) -> Option<WriteWindow<'_>> {
        let mut state = self.state.lock();
        let format = state.format?;
        if state.writer_active {
            tracing::warn!("Write slot acquired twice without commit");
            return None;
        }
        if state.pending_commit {
            state.pending_commit = false;
            state.frames_dropped += 1;
        }
        state.writer_active = true;

        Some(WriteWindow {
            pool: self,
            slot: state.slots[state.write].clone(),
            format,
            generation: state.generation,
            released: false,
        })
    }

    /// Publish a filled write slot
    ///
    /// O(1): swaps slot roles, never copies pixels. Returns `false` if the
    /// window predates a reallocation or cleanup and was discarded.
    pub fn commit_frame(&self, mut window: WriteWindow<'_>) -> bool {
        window.released = true;

        let mut state = self.state.lock();
        if window.generation != state.generation {
            tracing::debug!("Discarding frame from stale generation {}", window.generation);
            return false;
        }

        state.writer_active = false;
        state.frames_committed += 1;

        if state.read_pins > 0 {
            // The reader still scans the read slot; finish the swap on unpin.
            state.pending_commit = true;
        } else {
            state.swap();
        }
        true
    }

    /// Snapshot the read slot and its format for one scan
    pub fn read_slot(&self) -> Option<ReadWindow<'_>> {
        let mut state = self.state.lock();
        if !state.has_frame {
            return None;
        }
        let format = state.format?;
        if format.scaled.is_empty() {
            return None;
        }

        state.read_pins += 1;
        state.unread = false;

        Some(ReadWindow {
            pool: self,
            slot: state.slots[state.read].clone(),
            format,
            generation: state.generation,
        })
    }

    pub fn has_frame(&self) -> bool {
        self.state.lock().has_frame
    }

    pub fn format(&self) -> Option<NegotiatedFormat> {
        self.state.lock().format
    }

    /// Slot lengths, in slot-index order
    pub fn slot_sizes(&self) -> [usize; 2] {
        let state = self.state.lock();
        [state.slots[0].len(), state.slots[1].len()]
    }

    /// (committed, dropped) frame counters
    pub fn frame_counters(&self) -> (u64, u64) {
        let state = self.state.lock();
        (state.frames_committed, state.frames_dropped)
    }

    fn release_writer(&self, generation: u64) {
        let mut state = self.state.lock();
        if state.generation == generation {
            state.writer_active = false;
        }
    }

    fn release_reader(&self, generation: u64) {
        let mut state = self.state.lock();
        if state.generation != generation {
            return;
        }
        state.read_pins = state.read_pins.saturating_sub(1);
        if state.read_pins == 0 && state.pending_commit {
            state.pending_commit = false;
            state.swap();
        }
    }
}

impl Default for FrameBufferPool {
    fn default() -> Self {
        Self::new()
    }
}

/// Exclusive producer access to the write slot
///
/// Pass it back to [`FrameBufferPool::commit_frame`] once the frame is
/// complete. Dropping it without committing releases the slot unchanged.
pub struct WriteWindow<'a> {
    pool: &'a FrameBufferPool,
    slot: Arc<Slot>,
    format: NegotiatedFormat,
    generation: u64,
    released: bool,
}

impl WriteWindow<'_> {
    pub fn as_mut_slice(&mut self) -> &mut [u8] {
        // SAFETY: this window is the only accessor of the write slot until it
        // is committed or dropped.
        unsafe { self.slot.bytes_mut() }
    }

    /// Base address for decoders that fill the slot natively
    ///
    /// Valid for `len()` bytes while the window is alive.
    pub fn as_mut_ptr(&mut self) -> *mut u8 {
        self.as_mut_slice().as_mut_ptr()
    }

    pub fn len(&self) -> usize {
        self.slot.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn format(&self) -> NegotiatedFormat {
        self.format
    }
}

impl Drop for WriteWindow<'_> {
    fn drop(&mut self) {
        if !self.released {
            self.pool.release_writer(self.generation);
        }
    }
}

/// Pinned consumer view of the read slot
pub struct ReadWindow<'a> {
    pool: &'a FrameBufferPool,
    slot: Arc<Slot>,
    format: NegotiatedFormat,
    generation: u64,
}

impl ReadWindow<'_> {
    pub fn pixels(&self) -> &[u8] {
        // SAFETY: a pinned read slot is never handed to the producer.
        unsafe { self.slot.bytes() }
    }

    pub fn format(&self) -> NegotiatedFormat {
        self.format
    }
}

impl Drop for ReadWindow<'_> {
    fn drop(&mut self) {
        self.pool.release_reader(self.generation);
    }
}
