//! View State Store.
//!
//! The only owner of UI-observable state. Components mutate it through the
//! transitions below; renderers subscribe with `observe`.

use std::cell::{Cell, RefCell};
use std::rc::Rc;
use tracing::debug;
use wp_api_types::{Account, ViewSnapshot, WalletAddress, Wave};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ObserverId(u64);

type Observer = Rc<dyn Fn(&ViewSnapshot)>;

#[derive(Default)]
pub struct ViewStore {
    state: RefCell<ViewSnapshot>,
    busy_depth: Cell<usize>,
    observers: RefCell<Vec<(ObserverId, Observer)>>,
    next_observer: Cell<u64>,
}

impl ViewStore {
    pub fn new() -> Rc<Self> {
        Rc::new(Self::default())
    }

    pub fn snapshot(&self) -> ViewSnapshot {
        self.state.borrow().clone()
    }

    pub fn account(&self) -> Account {
        self.state.borrow().account.clone()
    }

    pub fn wave_count(&self) -> u64 {
        self.state.borrow().wave_count
    }

    pub fn wave_len(&self) -> usize {
        self.state.borrow().waves.len()
    }

    pub fn is_busy(&self) -> bool {
        self.state.borrow().busy
    }

    pub fn contains_wave(&self, wave: &Wave) -> bool {
        self.state.borrow().waves.iter().any(|held| held == wave)
    }

    /// Returns `false` without notifying when the account is unchanged.
    pub fn set_account(&self, account: WalletAddress) -> bool {
        {
            let mut state = self.state.borrow_mut();
            if state.account.as_ref() == Some(&account) {
                return false;
            }
            debug!(account = %account, "account set");
            state.account = Some(account);
        }
        self.notify();
        true
    }

    pub fn set_wave_count(&self, count: u64) {
        {
            let mut state = self.state.borrow_mut();
            if state.wave_count == count {
                return;
            }
            state.wave_count = count;
        }
        self.notify();
    }

    pub fn append_wave(&self, wave: Wave) {
        self.state.borrow_mut().waves.push(wave);
        self.notify();
    }

    /// Appends in order; existing entries are never touched.
    pub fn extend_waves(&self, waves: impl IntoIterator<Item = Wave>) -> usize {
        // Drained before borrowing; the iterator may itself read the store.
        let waves: Vec<Wave> = waves.into_iter().collect();
        let added = waves.len();
        self.state.borrow_mut().waves.extend(waves);
        if added > 0 {
            self.notify();
        }
        added
    }

    /// Marks a ledger round-trip as in flight until the guard drops.
    pub fn acquire_busy(self: &Rc<Self>) -> BusyGuard {
        let depth = self.busy_depth.get() + 1;
        self.busy_depth.set(depth);
        if depth == 1 {
            self.set_busy(true);
        }
        BusyGuard {
            store: Rc::clone(self),
        }
    }

    pub fn observe(&self, observer: impl Fn(&ViewSnapshot) + 'static) -> ObserverId {
        let id = ObserverId(self.next_observer.get());
        self.next_observer.set(id.0 + 1);
        self.observers.borrow_mut().push((id, Rc::new(observer)));
        id
    }

    pub fn unobserve(&self, id: ObserverId) -> bool {
        let mut observers = self.observers.borrow_mut();
        let before = observers.len();
        observers.retain(|(held, _)| *held != id);
        observers.len() != before
    }

    fn release_busy(&self) {
        let depth = self.busy_depth.get().saturating_sub(1);
        self.busy_depth.set(depth);
        if depth == 0 {
            self.set_busy(false);
        }
    }

    fn set_busy(&self, busy: bool) {
        self.state.borrow_mut().busy = busy;
        self.notify();
    }

    fn notify(&self) {
        let snapshot = self.snapshot();
        // Observers may call back into the store.
        let observers: Vec<Observer> = self
            .observers
            .borrow()
            .iter()
            .map(|(_, observer)| Rc::clone(observer))
            .collect();
        for observer in observers {
            observer(&snapshot);
        }
    }
}

/// Clears the busy flag on drop, including when the owning future is cancelled.
#[must_use = "the busy flag clears as soon as the guard is dropped"]
pub struct BusyGuard {
    store: Rc<ViewStore>,
}

impl Drop for BusyGuard {
    fn drop(&mut self) {
        self.store.release_busy();
    }
}
