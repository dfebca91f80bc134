use parking_lot::Mutex;

/// Per-frame-slot queue of GPU teardown tasks. A task enqueued while slot
/// `s` is in use runs at the *start* of the next time slot `s` is entered,
/// by which point the per-slot fence wait in `begin_frame_slot` guarantees
/// the GPU is done with everything slot `s` touched during the frame that
/// enqueued it (spec.md 4.1, 4.9, 9). This is the only sanctioned teardown
/// path for pipelines, images, buffers, samplers and descriptor pools while
/// the device is live.
pub struct DeferredReleaseQueue {
    slots: Vec<Mutex<Vec<Box<dyn FnOnce() + Send>>>>,
}

impl DeferredReleaseQueue {
    pub fn new(frames_in_flight: u32) -> Self {
        let slots = (0..frames_in_flight).map(|_| Mutex::new(Vec::new())).collect();
        Self { slots }
    }

    pub fn frames_in_flight(&self) -> u32 {
        self.slots.len() as u32
    }

    /// Enqueue a release task against `slot`. Move-only by construction
    /// (`FnOnce`); callers capture whatever GPU handles the task must drop.
    pub fn enqueue(&self, slot: u32, task: impl FnOnce() + Send + 'static) {
        self.slots[slot as usize].lock().push(Box::new(task));
    }

    /// Run and clear every task queued against `slot`. Must be called only
    /// after the caller has waited for slot `slot`'s in-flight fence, never
    /// speculatively.
    pub fn drain(&self, slot: u32) {
        let tasks = std::mem::take(&mut *self.slots[slot as usize].lock());
        for task in tasks {
            task();
        }
    }

    /// Drain every slot, in order, used during a clean shutdown (spec.md 6:
    /// "drains all deferred-release queues F times" — callers loop this
    /// `frames_in_flight` times against advancing slot indices; a single
    /// full sweep across all slots here covers one such pass).
    pub fn drain_all(&self) {
        for slot in 0..self.slots.len() as u32 {
            self.drain(slot);
        }
    }

    #[cfg(test)]
    pub(crate) fn pending_len(&self, slot: u32) -> usize {
        self.slots[slot as usize].lock().len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    /// Property 1 (spec.md 8): a resource destroyed during frame N, for slot
    /// `s = N mod F`, must not be touched before slot `s` is next entered —
    /// i.e. at frame N+F, not any time before.
    #[test]
    fn release_runs_only_when_its_slot_is_next_entered() {
        let frames_in_flight = 3u32;
        let queue = DeferredReleaseQueue::new(frames_in_flight);
        let released = Arc::new(AtomicU32::new(0));

        // Frame 0 uses slot 0, enqueues a release against slot 0.
        let flag = released.clone();
        queue.enqueue(0, move || {
            flag.store(1, Ordering::SeqCst);
        });

        // Frames 1 and 2 (slots 1 and 2) must not observe the release.
        queue.drain(1);
        queue.drain(2);
        assert_eq!(released.load(Ordering::SeqCst), 0);

        // Frame 3 (slot 0 again, i.e. frame N+F) runs it.
        queue.drain(0);
        assert_eq!(released.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn drain_clears_the_slot() {
        let queue = DeferredReleaseQueue::new(2);
        queue.enqueue(0, || {});
        queue.enqueue(0, || {});
        assert_eq!(queue.pending_len(0), 2);
        queue.drain(0);
        assert_eq!(queue.pending_len(0), 0);
    }

    #[test]
    fn slots_are_independent() {
        let queue = DeferredReleaseQueue::new(2);
        queue.enqueue(0, || {});
        assert_eq!(queue.pending_len(0), 1);
        assert_eq!(queue.pending_len(1), 0);
    }
}
