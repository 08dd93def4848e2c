//! Display Update Scheduler
//!
//! One renderer task per session drains a single-slot "render due at"
//! register. Requests only move that deadline; they never render
//! themselves. The renderer takes a fresh [`DisplayView`] snapshot at the
//! moment it renders, so the last state always wins and a burst of requests
//! inside the debounce window costs one render.
//!
//! Deadline merge rule: a request due at `now + delay` never pulls an
//! already-pending deadline earlier (`due = max(pending, now + delay)`),
//! and never pushes it past the cap set by the request that opened the
//! slot: its own deadline plus one more of its delay. A steady stream of
//! delayed requests still ends in a render.

use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, Notify};
use tokio::task::JoinHandle;
use tokio::time::{sleep_until, Instant};
use tracing::{debug, info, warn};

use super::{DisplayError, DisplaySurface, DisplayTarget, DisplayView};

/// Produces the view to render
#[async_trait]
pub trait ViewSource: Send + Sync {
    async fn snapshot(&self) -> DisplayView;
}

#[derive(Debug, Clone, Copy)]
struct Pending {
    at: Instant,
    cap: Instant,
}

impl Pending {
    fn open(at: Instant, window: Duration) -> Self {
        Self { at, cap: at + window }
    }

    fn merge(self, requested: Instant) -> Self {
        Self {
            at: self.at.max(requested).min(self.cap),
            cap: self.cap,
        }
    }
}

struct SchedulerInner {
    guild_id: u64,
    surface: Arc<dyn DisplaySurface>,
    source: Arc<dyn ViewSource>,
    target: Mutex<Option<DisplayTarget>>,
    due: Mutex<Option<Pending>>,
    wake: Notify,
    renderer: Mutex<Option<JoinHandle<()>>>,
}

impl SchedulerInner {
    async fn render_once(&self) -> Result<(), DisplayError> {
        let Some(target) = *self.target.lock().await else {
            return Err(DisplayError::NothingToUpdate);
        };

        let view = self.source.snapshot().await;

        match self.surface.render(&target, &view).await {
            Ok(()) => {
                debug!(guild = self.guild_id, status = ?view.status, "Rendered display");
                Ok(())
            }
            Err(DisplayError::NotFound) => {
                warn!(guild = self.guild_id, "Display target is gone, clearing it");
                let mut current = self.target.lock().await;
                if *current == Some(target) {
                    *current = None;
                }
                Err(DisplayError::NotFound)
            }
            Err(e) => {
                warn!(guild = self.guild_id, error = %e, "Failed to render display");
                Err(e)
            }
        }
    }

    async fn run(self: Arc<Self>) {
        loop {
            let due = self.due.lock().await.map(|p| p.at);

            match due {
                None => self.wake.notified().await,
                Some(at) if Instant::now() >= at => {
                    *self.due.lock().await = None;
                    let _ = self.render_once().await;
                }
                Some(at) => {
                    tokio::select! {
                        _ = sleep_until(at) => {}
                        _ = self.wake.notified() => {}
                    }
                }
            }
        }
    }
}

/// Per-session debounced display updater
///
/// Cheap to clone; clones share the register and the renderer task.
#[derive(Clone)]
pub struct DisplayScheduler {
    inner: Arc<SchedulerInner>,
}

impl DisplayScheduler {
    pub fn new(guild_id: u64, surface: Arc<dyn DisplaySurface>, source: Arc<dyn ViewSource>) -> Self {
        Self {
            inner: Arc::new(SchedulerInner {
                guild_id,
                surface,
                source,
                target: Mutex::new(None),
                due: Mutex::new(None),
                wake: Notify::new(),
                renderer: Mutex::new(None),
            }),
        }
    }

    pub async fn target(&self) -> Option<DisplayTarget> {
        *self.inner.target.lock().await
    }

    /// Pending render deadline, if any
    pub async fn pending_deadline(&self) -> Option<Instant> {
        self.inner.due.lock().await.map(|p| p.at)
    }

    /// Request a render of the current state after `delay`
    ///
    /// A supplied `new_target` takes effect immediately; the previous target
    /// is deleted in the background and a target that is already gone is
    /// ignored. Fails with [`DisplayError::NothingToUpdate`] when there is no
    /// target at all; callers treat that as non-fatal.
    pub async fn update_display(
        &self,
        new_target: Option<DisplayTarget>,
        delay: Duration,
    ) -> Result<(), DisplayError> {
        {
            let mut target = self.inner.target.lock().await;
            match new_target {
                Some(new) => {
                    if let Some(old) = target.replace(new).filter(|old| *old != new) {
                        self.delete_in_background(old);
                    }
                }
                None if target.is_none() => return Err(DisplayError::NothingToUpdate),
                None => {}
            }
        }

        let requested = Instant::now() + delay;
        {
            let mut due = self.inner.due.lock().await;
            *due = Some(match *due {
                Some(pending) => pending.merge(requested),
                None => Pending::open(requested, delay),
            });
        }

        self.ensure_renderer().await;
        self.inner.wake.notify_one();
        Ok(())
    }

    /// Render immediately, bypassing the register
    ///
    /// Used on teardown paths where the renderer is about to be stopped.
    pub async fn render_now(&self) -> Result<(), DisplayError> {
        self.inner.render_once().await
    }

    fn delete_in_background(&self, old: DisplayTarget) {
        let surface = Arc::clone(&self.inner.surface);
        let guild_id = self.inner.guild_id;
        tokio::spawn(async move {
            match surface.delete(&old).await {
                Ok(()) | Err(DisplayError::NotFound) => {
                    debug!(guild = guild_id, message = old.message_id, "Deleted previous display");
                }
                Err(e) => {
                    warn!(guild = guild_id, error = %e, "Failed to delete previous display");
                }
            }
        });
    }

    async fn ensure_renderer(&self) {
        let mut renderer = self.inner.renderer.lock().await;
        if renderer.as_ref().is_some_and(|h| !h.is_finished()) {
            return;
        }

        info!(guild = self.inner.guild_id, "Starting display renderer");
        *renderer = Some(tokio::spawn(Arc::clone(&self.inner).run()));
    }

    /// Stop the renderer and drop any pending render
    pub async fn shutdown(&self) {
        if let Some(handle) = self.inner.renderer.lock().await.take() {
            handle.abort();
        }
        *self.inner.due.lock().await = None;
    }
}
