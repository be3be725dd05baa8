//! Non-blocking readback of framebuffer attachments.
//!
//! A [`ReadbackSlot`] tracks one readable target. A frame that wants the
//! target's pixels calls [`ReadbackSlot::try_begin`], records a copy into the
//! transfer buffer, submits, and hands the slot the [`Fence`] of the buffer
//! mapping. Later frames [`poll`](ReadbackSlot::poll) the fence; once it is
//! signaled the mapped bytes are copied into persistent [`PixelBuffer`]s and
//! every queued waiter runs exactly once.

use std::sync::mpsc;

use crate::pixels::{PixelBuffer, PixelFormat};

/// State of a fence as seen from the CPU.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FenceStatus {
    Pending,
    Signaled,
    Failed,
}

/// Signaling half of a fence. Moved into the GPU completion callback.
#[derive(Debug)]
pub struct FenceSignal(mpsc::Sender<bool>);

impl FenceSignal {
    /// Marks the fence as signaled (`ok == true`) or failed.
    pub fn signal(self, ok: bool) {
        // The slot may have been invalidated by a resize; nobody is listening.
        let _ = self.0.send(ok);
    }
}

/// Polling half of a fence.
#[derive(Debug)]
pub struct Fence(mpsc::Receiver<bool>);

impl Fence {
    /// Checks the fence without blocking.
    pub fn status(&self) -> FenceStatus {
        match self.0.try_recv() {
            Ok(true) => FenceStatus::Signaled,
            Ok(false) | Err(mpsc::TryRecvError::Disconnected) => FenceStatus::Failed,
            Err(mpsc::TryRecvError::Empty) => FenceStatus::Pending,
        }
    }
}

/// Creates a connected fence pair.
pub fn fence() -> (FenceSignal, Fence) {
    let (sender, receiver) = mpsc::channel();
    (FenceSignal(sender), Fence(receiver))
}

/// Counters for one slot.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReadbackStats {
    /// Triggers that started a request.
    pub accepted: u64,
    /// Triggers that arrived while a request was in flight.
    pub dropped: u64,
    /// Requests whose data reached the CPU.
    pub completed: u64,
    /// Requests whose mapping failed or that were invalidated.
    pub failed: u64,
}

/// Result of one [`ReadbackSlot::poll`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadbackPoll {
    /// Nothing in flight.
    Idle,
    /// Copy recorded or mapping not finished yet.
    Pending,
    /// New data is available.
    Completed,
    /// The request was lost; the slot is idle again.
    Failed,
}

enum SlotState<M> {
    Idle,
    /// Copy recorded, waiting for the frame to be submitted.
    Recording { meta: M, frame: u64 },
    /// Submitted and mapping; waiting for the fence.
    Mapping { meta: M, frame: u64, fence: Fence },
}

/// Completed pixels together with the metadata captured when they were drawn.
pub struct CompletedReadback<'a, M> {
    pub images: &'a [PixelBuffer],
    pub meta: &'a M,
    pub frame: u64,
}

/// One-shot continuation run after the next completed readback.
pub type Waiter<M> = Box<dyn FnOnce(&CompletedReadback<'_, M>)>;

/// In-flight guard and persistent CPU copy for one readable target.
pub struct ReadbackSlot<M> {
    label: &'static str,
    state: SlotState<M>,
    images: Vec<PixelBuffer>,
    latest: Option<(M, u64)>,
    waiters: Vec<Waiter<M>>,
    stats: ReadbackStats,
}

impl<M> ReadbackSlot<M> {
    /// Creates an idle slot with one zero-sized image per attachment format.
    pub fn new(label: &'static str, formats: &[PixelFormat]) -> Self {
        Self {
            label,
            state: SlotState::Idle,
            images: formats.iter().map(|&f| PixelBuffer::new(f, 0, 0)).collect(),
            latest: None,
            waiters: Vec::new(),
            stats: ReadbackStats::default(),
        }
    }

    pub fn label(&self) -> &'static str {
        self.label
    }

    pub fn stats(&self) -> ReadbackStats {
        self.stats
    }

    pub fn is_idle(&self) -> bool {
        matches!(self.state, SlotState::Idle)
    }

    /// Whether a copy has been recorded and not yet armed with a fence.
    pub fn is_recording(&self) -> bool {
        matches!(self.state, SlotState::Recording { .. })
    }

    pub fn pending_waiters(&self) -> usize {
        self.waiters.len()
    }

    /// Reallocates the CPU images and forgets everything read at the old size.
    ///
    /// An in-flight request targets a transfer buffer that is being replaced,
    /// so it is abandoned. Queued waiters stay queued for the next completion.
    pub fn resize(&mut self, width: u32, height: u32) {
        for image in &mut self.images {
            image.resize(width, height);
        }
        self.latest = None;
        if !self.is_idle() {
            log::debug!("{} readback invalidated by resize", self.label);
            self.stats.failed += 1;
            self.state = SlotState::Idle;
        }
    }

    /// Starts a request for `frame`. Returns `false` and counts a drop when a
    /// request is already in flight.
    pub fn try_begin(&mut self, meta: M, frame: u64) -> bool {
        if !self.is_idle() {
            self.stats.dropped += 1;
            log::trace!("{} readback busy, trigger for frame {frame} dropped", self.label);
            return false;
        }
        self.stats.accepted += 1;
        self.state = SlotState::Recording { meta, frame };
        true
    }

    /// Attaches the fence of the submitted copy.
    pub fn arm(&mut self, fence: Fence) {
        match std::mem::replace(&mut self.state, SlotState::Idle) {
            SlotState::Recording { meta, frame } => {
                self.state = SlotState::Mapping { meta, frame, fence };
            }
            other => {
                log::warn!("{} readback armed while not recording", self.label);
                self.state = other;
            }
        }
    }

    /// Drops a recorded request whose frame was never submitted.
    pub fn abandon(&mut self) {
        if self.is_recording() {
            self.stats.failed += 1;
            self.state = SlotState::Idle;
        }
    }

    /// Checks the fence without blocking.
    ///
    /// When it is signaled, `fetch` copies the mapped transfer buffer into the
    /// slot's images. Waiters only run after `fetch` succeeded, so they never
    /// observe partially written data.
    pub fn poll<E>(
        &mut self,
        fetch: impl FnOnce(&mut [PixelBuffer]) -> Result<(), E>,
    ) -> Result<ReadbackPoll, E> {
        let status = match &self.state {
            SlotState::Idle => return Ok(ReadbackPoll::Idle),
            SlotState::Recording { .. } => return Ok(ReadbackPoll::Pending),
            SlotState::Mapping { fence, .. } => fence.status(),
        };
        match status {
            FenceStatus::Pending => Ok(ReadbackPoll::Pending),
            FenceStatus::Failed => {
                log::warn!("{} readback mapping failed", self.label);
                self.stats.failed += 1;
                self.state = SlotState::Idle;
                Ok(ReadbackPoll::Failed)
            }
            FenceStatus::Signaled => {
                let SlotState::Mapping { meta, frame, .. } =
                    std::mem::replace(&mut self.state, SlotState::Idle)
                else {
                    return Ok(ReadbackPoll::Idle);
                };
                if let Err(e) = fetch(&mut self.images) {
                    self.stats.failed += 1;
                    self.latest = None;
                    return Err(e);
                }
                self.stats.completed += 1;
                self.latest = Some((meta, frame));
                self.run_waiters();
                Ok(ReadbackPoll::Completed)
            }
        }
    }

    fn run_waiters(&mut self) {
        let Some((meta, frame)) = &self.latest else {
            return;
        };
        let completed = CompletedReadback {
            images: &self.images,
            meta,
            frame: *frame,
        };
        for waiter in self.waiters.drain(..) {
            waiter(&completed);
        }
    }

    /// Queues a continuation for the next completed readback.
    pub fn on_next_complete(&mut self, waiter: Waiter<M>) {
        self.waiters.push(waiter);
    }

    /// Most recent completed readback, if any.
    pub fn latest(&self) -> Option<CompletedReadback<'_, M>> {
        self.latest.as_ref().map(|(meta, frame)| CompletedReadback {
            images: &self.images,
            meta,
            frame: *frame,
        })
    }

    /// Forgets the latest data without touching an in-flight request.
    pub fn clear_latest(&mut self) {
        self.latest = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;
    use std::rc::Rc;

    fn fill(value: u8) -> impl FnOnce(&mut [PixelBuffer]) -> Result<(), ()> {
        move |images| {
            for image in images {
                image.fill([value; 4]);
            }
            Ok(())
        }
    }

    #[test]
    fn test_second_trigger_is_dropped() {
        let mut slot: ReadbackSlot<()> = ReadbackSlot::new("pick", &[PixelFormat::Rgba8]);
        slot.resize(2, 2);
        assert!(slot.try_begin((), 1));
        assert!(!slot.try_begin((), 2));
        let (signal, pending) = fence();
        slot.arm(pending);
        assert!(!slot.try_begin((), 3));
        assert_eq!(slot.poll(fill(1)), Ok(ReadbackPoll::Pending));

        signal.signal(true);
        assert_eq!(slot.poll(fill(1)), Ok(ReadbackPoll::Completed));
        assert!(slot.is_idle());
        let stats = slot.stats();
        assert_eq!((stats.accepted, stats.dropped, stats.completed), (1, 2, 1));
    }

    #[test]
    fn test_waiters_fire_once_with_complete_data() {
        let mut slot: ReadbackSlot<u32> = ReadbackSlot::new("depth", &[PixelFormat::Rgba8]);
        slot.resize(1, 1);
        let hits = Rc::new(Cell::new(0));
        let seen = hits.clone();
        slot.on_next_complete(Box::new(move |done| {
            assert_eq!(*done.meta, 7);
            assert_eq!(done.images[0].texel(0, 0), Some([5; 4]));
            seen.set(seen.get() + 1);
        }));

        assert!(slot.try_begin(7, 10));
        let (signal, pending) = fence();
        slot.arm(pending);
        signal.signal(true);
        slot.poll(fill(5)).unwrap();
        assert_eq!(hits.get(), 1);

        assert!(slot.try_begin(8, 11));
        let (signal, pending) = fence();
        slot.arm(pending);
        signal.signal(true);
        slot.poll(fill(6)).unwrap();
        assert_eq!(hits.get(), 1);
        assert_eq!(slot.latest().map(|l| l.frame), Some(11));
    }

    #[test]
    fn test_failed_mapping_keeps_waiters() {
        let mut slot: ReadbackSlot<()> = ReadbackSlot::new("pick", &[PixelFormat::Rgba8]);
        slot.on_next_complete(Box::new(|_| {}));
        assert!(slot.try_begin((), 0));
        let (signal, pending) = fence();
        slot.arm(pending);
        signal.signal(false);
        assert_eq!(slot.poll(fill(0)), Ok(ReadbackPoll::Failed));
        assert!(slot.is_idle());
        assert_eq!(slot.pending_waiters(), 1);
        assert!(slot.latest().is_none());
    }

    #[test]
    fn test_dropped_signal_counts_as_failure() {
        let mut slot: ReadbackSlot<()> = ReadbackSlot::new("pick", &[PixelFormat::Rgba8]);
        assert!(slot.try_begin((), 0));
        let (signal, pending) = fence();
        slot.arm(pending);
        drop(signal);
        assert_eq!(slot.poll(fill(0)), Ok(ReadbackPoll::Failed));
        assert_eq!(slot.stats().failed, 1);
    }

    #[test]
    fn test_resize_invalidates_in_flight_and_latest() {
        let mut slot: ReadbackSlot<()> =
            ReadbackSlot::new("depth", &[PixelFormat::Rgba8, PixelFormat::R32Float]);
        slot.resize(4, 4);
        assert!(slot.try_begin((), 0));
        let (signal, pending) = fence();
        slot.arm(pending);
        signal.signal(true);
        slot.poll(fill(3)).unwrap();
        assert!(slot.latest().is_some());

        assert!(slot.try_begin((), 1));
        slot.resize(8, 2);
        assert!(slot.is_idle());
        assert!(slot.latest().is_none());
        assert_eq!(slot.stats().failed, 1);
        assert!(slot.try_begin((), 2));
    }

    #[test]
    fn test_fetch_error_propagates() {
        let mut slot: ReadbackSlot<()> = ReadbackSlot::new("pick", &[PixelFormat::Rgba8]);
        assert!(slot.try_begin((), 0));
        let (signal, pending) = fence();
        slot.arm(pending);
        signal.signal(true);
        let result = slot.poll(|_| Err("mapped range unavailable"));
        assert_eq!(result, Err("mapped range unavailable"));
        assert!(slot.is_idle());
        assert!(slot.latest().is_none());
    }

    #[test]
    fn test_abandon_returns_to_idle() {
        let mut slot: ReadbackSlot<()> = ReadbackSlot::new("pick", &[PixelFormat::Rgba8]);
        assert!(slot.try_begin((), 0));
        slot.abandon();
        assert!(slot.is_idle());
        assert!(slot.try_begin((), 1));
    }
}
