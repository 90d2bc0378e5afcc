//! Handing the platform's drawable surface from the UI thread to the engine
//! worker thread.
//!
//! The UI thread only ever writes into a single monitor-guarded slot; it
//! never touches the graphics context. The worker thread blocks on the slot
//! once, at startup, until a first surface is published. After that, any
//! change is left as a pending event in the same slot which the worker
//! drains (and applies to its graphics session) when the engine polls for it.

use std::sync::{Condvar, Mutex};

/// A surface change for the worker thread to apply
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SurfaceEvent<W> {
    /// The drawable was (re)created or resized
    Changed { window: W, width: u32, height: u32 },
    /// The drawable was reclaimed by the platform
    Destroyed,
}

/// The most recently published surface
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublishedSurface<W> {
    pub window: W,
    pub width: u32,
    pub height: u32,
    /// Incremented on every change or destroy notification
    pub generation: u64,
}

#[derive(Debug)]
struct HandoffState<W> {
    window: Option<W>,
    width: u32,
    height: u32,
    generation: u64,

    /// Set once the worker has consumed a first surface; only then are
    /// notifications queued for forwarding
    forwarding: bool,

    /// The latest not yet applied change. Intermediate changes are
    /// superseded, since only the final state of the drawable matters.
    pending: Option<SurfaceEvent<W>>,
    cancelled: bool,
}

/// The error returned by [`SurfaceHandoff::wait_for_surface`] after
/// [`SurfaceHandoff::cancel`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WaitCancelled;

#[derive(Debug)]
pub struct SurfaceHandoff<W> {
    mutex: Mutex<HandoffState<W>>,
    cond: Condvar,
}

impl<W> Default for SurfaceHandoff<W> {
    fn default() -> Self {
        Self {
            mutex: Mutex::new(HandoffState {
                window: None,
                width: 0,
                height: 0,
                generation: 0,
                forwarding: false,
                pending: None,
                cancelled: false,
            }),
            cond: Condvar::new(),
        }
    }
}

impl<W: Clone> SurfaceHandoff<W> {
    pub fn new() -> Self {
        Self::default()
    }

    ///////////////////////////////
    // UI thread
    ///////////////////////////////

    /// Publishes a (re)created or resized surface.
    ///
    /// With `forward` unset the slot is still updated but no pending event
    /// is left for the worker thread.
    pub fn notify_changed(&self, window: W, width: u32, height: u32, forward: bool) {
        let mut guard = self.mutex.lock().unwrap();
        guard.window = Some(window.clone());
        guard.width = width;
        guard.height = height;
        guard.generation += 1;
        if forward && guard.forwarding {
            guard.pending = Some(SurfaceEvent::Changed {
                window,
                width,
                height,
            });
        }
        self.cond.notify_all();
    }

    pub fn notify_destroyed(&self, forward: bool) {
        let mut guard = self.mutex.lock().unwrap();
        guard.window = None;
        guard.width = 0;
        guard.height = 0;
        guard.generation += 1;
        if forward && guard.forwarding {
            guard.pending = Some(SurfaceEvent::Destroyed);
        }
        self.cond.notify_all();
    }

    /// Releases a worker blocked in [`Self::wait_for_surface`] without a
    /// surface. Sticky: later waits fail immediately too.
    pub fn cancel(&self) {
        let mut guard = self.mutex.lock().unwrap();
        guard.cancelled = true;
        self.cond.notify_all();
    }

    ////////////////////////////
    // Worker thread
    ////////////////////////////

    /// Blocks until a surface has been published, then returns the most
    /// recent one. There is no timeout.
    pub fn wait_for_surface(&self) -> Result<PublishedSurface<W>, WaitCancelled> {
        let mut guard = self.mutex.lock().unwrap();
        loop {
            if guard.cancelled {
                return Err(WaitCancelled);
            }
            if let Some(window) = guard.window.clone() {
                guard.forwarding = true;
                // Anything pending is already reflected in what we return
                guard.pending = None;
                return Ok(PublishedSurface {
                    window,
                    width: guard.width,
                    height: guard.height,
                    generation: guard.generation,
                });
            }
            guard = self.cond.wait(guard).unwrap();
        }
    }

    /// Takes the pending change, if any, without blocking
    pub fn take_pending(&self) -> Option<SurfaceEvent<W>> {
        self.mutex.lock().unwrap().pending.take()
    }

    pub fn current(&self) -> Option<PublishedSurface<W>> {
        let guard = self.mutex.lock().unwrap();
        guard.window.clone().map(|window| PublishedSurface {
            window,
            width: guard.width,
            height: guard.height,
            generation: guard.generation,
        })
    }

    pub fn generation(&self) -> u64 {
        self.mutex.lock().unwrap().generation
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{mpsc, Arc};
    use std::thread;
    use std::time::Duration;

    use super::*;

    #[test]
    fn waiter_sees_latest_surface() {
        let handoff = Arc::new(SurfaceHandoff::<u32>::new());
        handoff.notify_changed(1, 800, 480, true);
        handoff.notify_changed(2, 1280, 720, true);

        let published = handoff.wait_for_surface().unwrap();
        assert_eq!(
            published,
            PublishedSurface {
                window: 2,
                width: 1280,
                height: 720,
                generation: 2,
            }
        );
    }

    #[test]
    fn blocked_waiter_is_released_by_publish() {
        let handoff = Arc::new(SurfaceHandoff::<u32>::new());
        let (tx, rx) = mpsc::channel();

        let worker = {
            let handoff = handoff.clone();
            thread::spawn(move || {
                let published = handoff.wait_for_surface();
                tx.send(published).unwrap();
            })
        };

        // Nothing has been published yet, so the worker must still be waiting
        assert!(rx.recv_timeout(Duration::from_millis(50)).is_err());

        handoff.notify_changed(9, 640, 400, true);
        let published = rx.recv_timeout(Duration::from_secs(5)).unwrap().unwrap();
        assert_eq!(published.window, 9);
        assert_eq!(published.generation, 1);
        worker.join().unwrap();
    }

    #[test]
    fn destroy_before_wait_keeps_waiting() {
        let handoff = Arc::new(SurfaceHandoff::<u32>::new());
        handoff.notify_changed(1, 800, 480, true);
        handoff.notify_destroyed(true);
        assert_eq!(handoff.current(), None);
        assert_eq!(handoff.generation(), 2);

        let (tx, rx) = mpsc::channel();
        let worker = {
            let handoff = handoff.clone();
            thread::spawn(move || tx.send(handoff.wait_for_surface()).unwrap())
        };
        assert!(rx.recv_timeout(Duration::from_millis(50)).is_err());
        handoff.notify_changed(3, 800, 480, true);
        assert_eq!(rx.recv_timeout(Duration::from_secs(5)).unwrap().unwrap().window, 3);
        worker.join().unwrap();
    }

    #[test]
    fn cancel_releases_waiter() {
        let handoff = Arc::new(SurfaceHandoff::<u32>::new());
        let worker = {
            let handoff = handoff.clone();
            thread::spawn(move || handoff.wait_for_surface())
        };
        handoff.cancel();
        assert_eq!(worker.join().unwrap(), Err(WaitCancelled));
        assert_eq!(handoff.wait_for_surface(), Err(WaitCancelled));
    }

    #[test]
    fn events_are_only_queued_after_first_surface() {
        let handoff = SurfaceHandoff::<u32>::new();
        handoff.notify_changed(1, 800, 480, true);
        assert_eq!(handoff.take_pending(), None);

        handoff.wait_for_surface().unwrap();
        handoff.notify_changed(1, 1024, 600, true);
        assert_eq!(
            handoff.take_pending(),
            Some(SurfaceEvent::Changed {
                window: 1,
                width: 1024,
                height: 600
            })
        );
        assert_eq!(handoff.take_pending(), None);
    }

    #[test]
    fn latest_pending_event_wins() {
        let handoff = SurfaceHandoff::<u32>::new();
        handoff.notify_changed(1, 800, 480, true);
        handoff.wait_for_surface().unwrap();

        handoff.notify_destroyed(true);
        handoff.notify_changed(2, 800, 480, true);
        assert_eq!(
            handoff.take_pending(),
            Some(SurfaceEvent::Changed {
                window: 2,
                width: 800,
                height: 480
            })
        );

        handoff.notify_changed(3, 800, 480, true);
        handoff.notify_destroyed(true);
        assert_eq!(handoff.take_pending(), Some(SurfaceEvent::Destroyed));
    }

    #[test]
    fn unforwarded_notifications_still_update_the_slot() {
        let handoff = SurfaceHandoff::<u32>::new();
        handoff.notify_changed(1, 800, 480, true);
        handoff.wait_for_surface().unwrap();

        handoff.notify_destroyed(false);
        assert_eq!(handoff.take_pending(), None);
        assert_eq!(handoff.current(), None);

        handoff.notify_changed(4, 800, 480, false);
        assert_eq!(handoff.take_pending(), None);
        assert_eq!(handoff.current().map(|s| s.window), Some(4));
    }
}
