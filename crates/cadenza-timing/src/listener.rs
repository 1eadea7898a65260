use std::cell::RefCell;
use std::rc::{Rc, Weak};

use log::debug;

/// Receives the composed time scale after every dilation tick.
pub trait TimeScaleListener {
    fn on_time_scale_changed(&self, scale: f64);
}

impl<F: Fn(f64)> TimeScaleListener for F {
    fn on_time_scale_changed(&self, scale: f64) {
        self(scale)
    }
}

/// Unordered set of weakly held listeners.
///
/// The registry never keeps a listener alive: dropped listeners are pruned
/// during the next broadcast. Listeners may register or unregister (even
/// themselves) from inside a notification.
#[derive(Default)]
pub struct ListenerRegistry {
    entries: RefCell<Vec<Weak<dyn TimeScaleListener>>>,
}

impl ListenerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a listener. Returns false if it was already registered.
    pub fn register(&self, listener: Rc<dyn TimeScaleListener>) -> bool {
        let ptr = thin_ptr(Rc::as_ptr(&listener));
        let mut entries = self.entries.borrow_mut();
        if entries.iter().any(|w| thin_ptr(w.as_ptr()) == ptr) {
            return false;
        }
        entries.push(Rc::downgrade(&listener));
        true
    }

    /// Removes a listener. Returns false if it was not registered.
    pub fn unregister<L: ?Sized>(&self, listener: &Rc<L>) -> bool {
        let ptr = thin_ptr(Rc::as_ptr(listener));
        let mut entries = self.entries.borrow_mut();
        let before = entries.len();
        entries.retain(|w| thin_ptr(w.as_ptr()) != ptr);
        entries.len() != before
    }

    pub fn contains<L: ?Sized>(&self, listener: &Rc<L>) -> bool {
        let ptr = thin_ptr(Rc::as_ptr(listener));
        self.entries
            .borrow()
            .iter()
            .any(|w| thin_ptr(w.as_ptr()) == ptr)
    }

    /// Number of registrations, including dead ones not yet pruned.
    pub fn len(&self) -> usize {
        self.entries.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.borrow().is_empty()
    }

    /// Notifies every live listener, then prunes dead registrations.
    ///
    /// Iterates over a snapshot; a listener removed by an earlier callback
    /// in the same pass is skipped.
    pub fn broadcast(&self, scale: f64) {
        let snapshot: Vec<Weak<dyn TimeScaleListener>> = self.entries.borrow().clone();
        for weak in &snapshot {
            let Some(listener) = weak.upgrade() else {
                continue;
            };
            if !self.contains(&listener) {
                continue;
            }
            listener.on_time_scale_changed(scale);
        }

        let mut entries = self.entries.borrow_mut();
        let before = entries.len();
        entries.retain(|w| w.strong_count() > 0);
        let pruned = before - entries.len();
        if pruned > 0 {
            debug!("Pruned {pruned} dead time scale listeners");
        }
    }
}

fn thin_ptr<T: ?Sized>(ptr: *const T) -> *const () {
    ptr as *const ()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::{Cell, RefCell};

    #[derive(Default)]
    struct Recorder {
        calls: RefCell<Vec<f64>>,
    }

    impl TimeScaleListener for Recorder {
        fn on_time_scale_changed(&self, scale: f64) {
            self.calls.borrow_mut().push(scale);
        }
    }

    #[test]
    fn register_is_idempotent() {
        let reg = ListenerRegistry::new();
        let rec = Rc::new(Recorder::default());
        assert!(reg.register(rec.clone()));
        assert!(!reg.register(rec.clone()));
        assert_eq!(reg.len(), 1);

        reg.broadcast(0.5);
        assert_eq!(*rec.calls.borrow(), vec![0.5]);
    }

    #[test]
    fn unregister_absent_is_noop() {
        let reg = ListenerRegistry::new();
        let rec = Rc::new(Recorder::default());
        assert!(!reg.unregister(&rec));
        reg.register(rec.clone());
        assert!(reg.unregister(&rec));
        assert!(!reg.unregister(&rec));
        assert!(reg.is_empty());
    }

    #[test]
    fn register_then_unregister_never_notifies() {
        let reg = ListenerRegistry::new();
        let rec = Rc::new(Recorder::default());
        reg.register(rec.clone());
        reg.unregister(&rec);
        reg.broadcast(0.0);
        reg.broadcast(1.0);
        assert!(rec.calls.borrow().is_empty());
    }

    #[test]
    fn dead_listeners_are_pruned() {
        let reg = ListenerRegistry::new();
        let keep = Rc::new(Recorder::default());
        reg.register(keep.clone());
        {
            let gone = Rc::new(Recorder::default());
            reg.register(gone.clone());
            assert_eq!(reg.len(), 2);
        }
        reg.broadcast(0.25);
        assert_eq!(reg.len(), 1);
        assert_eq!(*keep.calls.borrow(), vec![0.25]);
    }

    #[test]
    fn closures_are_listeners() {
        let reg = ListenerRegistry::new();
        let seen = Rc::new(Cell::new(-1.0));
        let sink = Rc::clone(&seen);
        let listener: Rc<dyn TimeScaleListener> = Rc::new(move |s: f64| sink.set(s));
        reg.register(listener.clone());
        reg.broadcast(0.75);
        assert_eq!(seen.get(), 0.75);
    }

    struct SelfRemoving {
        registry: Rc<ListenerRegistry>,
        me: RefCell<Weak<SelfRemoving>>,
        calls: Cell<u32>,
    }

    impl TimeScaleListener for SelfRemoving {
        fn on_time_scale_changed(&self, _scale: f64) {
            self.calls.set(self.calls.get() + 1);
            if let Some(me) = self.me.borrow().upgrade() {
                self.registry.unregister(&me);
            }
        }
    }

    #[test]
    fn listener_can_unregister_itself_during_broadcast() {
        let reg = Rc::new(ListenerRegistry::new());
        let other = Rc::new(Recorder::default());
        let quitter = Rc::new(SelfRemoving {
            registry: Rc::clone(&reg),
            me: RefCell::new(Weak::new()),
            calls: Cell::new(0),
        });
        *quitter.me.borrow_mut() = Rc::downgrade(&quitter);

        reg.register(quitter.clone());
        reg.register(other.clone());

        reg.broadcast(0.5);
        reg.broadcast(0.6);

        assert_eq!(quitter.calls.get(), 1);
        assert_eq!(*other.calls.borrow(), vec![0.5, 0.6]);
        assert!(!reg.contains(&quitter));
    }
}
