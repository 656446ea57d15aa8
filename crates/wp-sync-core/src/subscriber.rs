//! Live Event Subscriber.
//!
//! `Unattached -> Attached` on `attach`, back to `Unattached` when the
//! handle is detached or dropped. There is no reconnect: a stream that ends
//! leaves the handle attached but inert.

use futures::StreamExt;
use futures::future::{AbortHandle, Abortable, LocalBoxFuture};
use std::cell::Cell;
use std::rc::Rc;
use tracing::{debug, info, warn};
use wp_api_types::Wave;
use wp_ledger_client::WaveEventSource;

use crate::store::ViewStore;

/// Runs detached futures on the host's single-threaded executor.
pub trait Spawner {
    fn spawn_local(&self, task: LocalBoxFuture<'static, ()>);
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SubscriberState {
    Unattached,
    Attached,
}

pub struct LiveSubscriber {
    store: Rc<ViewStore>,
    events: Option<Rc<dyn WaveEventSource>>,
    spawner: Rc<dyn Spawner>,
    dedupe: bool,
}

impl LiveSubscriber {
    pub fn new(
        store: Rc<ViewStore>,
        events: Option<Rc<dyn WaveEventSource>>,
        spawner: Rc<dyn Spawner>,
    ) -> Self {
        Self {
            store,
            events,
            spawner,
            dedupe: false,
        }
    }

    /// Skip pushed waves identical to one already held.
    pub fn with_dedupe(mut self, dedupe: bool) -> Self {
        self.dedupe = dedupe;
        self
    }

    /// Starts folding `NewWave` notifications into the store. Returns `None`
    /// when no provider is present or the stream cannot be opened.
    pub fn attach(&self) -> Option<SubscriptionHandle> {
        let Some(source) = &self.events else {
            debug!("no provider; live subscriber stays unattached");
            return None;
        };

        let events = match source.new_wave_events() {
            Ok(events) => events,
            Err(err) => {
                warn!(error = %err, "could not subscribe to NewWave");
                return None;
            }
        };

        let store = Rc::clone(&self.store);
        let dedupe = self.dedupe;
        let fold = events.for_each(move |event| {
            let wave = Wave::from(event);
            if dedupe && store.contains_wave(&wave) {
                debug!(from = %wave.address, "duplicate NewWave skipped");
            } else {
                info!(from = %wave.address, message = %wave.message, "NewWave");
                store.append_wave(wave);
            }
            futures::future::ready(())
        });

        let (abort, registration) = AbortHandle::new_pair();
        let task = Abortable::new(fold, registration);
        self.spawner.spawn_local(Box::pin(async move {
            let _ = task.await;
        }));

        info!("live subscriber attached");
        Some(SubscriptionHandle {
            abort,
            state: Rc::new(Cell::new(SubscriberState::Attached)),
        })
    }
}

/// Owns an attached subscription; dropping it detaches.
pub struct SubscriptionHandle {
    abort: AbortHandle,
    state: Rc<Cell<SubscriberState>>,
}

impl SubscriptionHandle {
    pub fn state(&self) -> SubscriberState {
        self.state.get()
    }

    pub fn detach(self) {
        drop(self);
    }
}

impl Drop for SubscriptionHandle {
    fn drop(&mut self) {
        if self.state.replace(SubscriberState::Unattached) == SubscriberState::Attached {
            self.abort.abort();
            info!("live subscriber detached");
        }
    }
}
