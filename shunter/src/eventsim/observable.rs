use smallvec::SmallVec;
use std::fmt::Debug;

pub type Listeners<L> = SmallVec<[L; 4]>;

/// A value with a list of listeners that are told about every change.
///
/// `set` does not call anyone. It hands back a snapshot of the listeners
/// subscribed at the time of the change, and the owner delivers the
/// notification. A listener may unsubscribe (itself or others) while the
/// snapshot is being delivered; use `is_subscribed` before each delivery to
/// skip listeners that have left in the meantime.
#[derive(Clone, Debug)]
pub struct Observable<T: Clone + Debug, L: Copy + Eq + Debug> {
    value: T,
    listeners: Listeners<L>,
}

impl<T: Clone + Debug, L: Copy + Eq + Debug> Observable<T, L> {
    pub fn new(value: T) -> Observable<T, L> {
        Observable {
            value: value,
            listeners: SmallVec::new(),
        }
    }

    pub fn get(&self) -> &T {
        &self.value
    }

    pub fn set(&mut self, x: T) -> Listeners<L> {
        self.value = x;
        self.listeners.clone()
    }

    /// Change the value in place, then snapshot the listeners like `set`.
    pub fn update<F: FnOnce(&mut T)>(&mut self, f: F) -> Listeners<L> {
        f(&mut self.value);
        self.listeners.clone()
    }

    /// Returns false if the listener was already subscribed.
    pub fn subscribe(&mut self, listener: L) -> bool {
        if self.listeners.contains(&listener) {
            return false;
        }
        self.listeners.push(listener);
        true
    }

    /// Returns false if the listener was not subscribed.
    pub fn unsubscribe(&mut self, listener: L) -> bool {
        let before = self.listeners.len();
        self.listeners.retain(|l| *l != listener);
        before != self.listeners.len()
    }

    pub fn is_subscribed(&self, listener: L) -> bool {
        self.listeners.contains(&listener)
    }

    pub fn listeners(&self) -> &[L] {
        &self.listeners
    }
}
