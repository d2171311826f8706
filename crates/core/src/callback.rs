// Thread-safe event callback for stream sessions
// Callbacks run with no session lock held other than the dispatch lock

use parking_lot::Mutex;
use std::cell::Cell;
use std::sync::Arc;

/// Session event types
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamEvent {
    /// Cache reached capacity, audio can be read
    Ready,

    /// Cache underran, playback stalls until it refills
    Buffering,

    /// A new metadata blurb became current
    Meta(String),

    /// Stream ended, no more data will arrive
    End,
}

impl StreamEvent {
    /// Numeric code used by the C interface
    pub fn code(&self) -> i32 {
        match self {
            StreamEvent::Ready => 0,
            StreamEvent::Buffering => 1,
            StreamEvent::Meta(_) => 2,
            StreamEvent::End => 3,
        }
    }
}

/// Session callback trait
/// Implementations should be lightweight and non-blocking
pub trait StreamCallback: Send + Sync {
    /// Called when an event occurs
    /// Runs on the fill thread or the reading thread
    fn on_event(&self, event: StreamEvent);
}

impl<F> StreamCallback for F
where
    F: Fn(StreamEvent) + Send + Sync,
{
    fn on_event(&self, event: StreamEvent) {
        self(event)
    }
}

thread_local! {
    static IN_CALLBACK: Cell<bool> = const { Cell::new(false) };
}

/// Marks the current thread as inside a callback until dropped, unwinding included
struct CallbackGuard;

impl CallbackGuard {
    fn enter() -> Self {
        IN_CALLBACK.with(|flag| flag.set(true));
        CallbackGuard
    }
}

impl Drop for CallbackGuard {
    fn drop(&mut self) {
        IN_CALLBACK.with(|flag| flag.set(false));
    }
}

/// Event dispatcher guarding the user callback
///
/// The callback slot and the dispatch scope are separate locks: replacing the
/// callback from inside a callback does not deadlock, and events raised while
/// a callback is running on the same thread are dropped instead of re-entering.
pub struct EventDispatcher {
    callback: Mutex<Option<Arc<dyn StreamCallback>>>,
    dispatch: Mutex<()>,
}

impl EventDispatcher {
    pub fn new() -> Self {
        Self {
            callback: Mutex::new(None),
            dispatch: Mutex::new(()),
        }
    }

    pub fn set_callback(&self, callback: Option<Arc<dyn StreamCallback>>) {
        *self.callback.lock() = callback;
    }

    /// True while the current thread is inside a callback
    pub fn in_callback() -> bool {
        IN_CALLBACK.with(|flag| flag.get())
    }

    pub fn dispatch(&self, event: StreamEvent) {
        if Self::in_callback() {
            log::warn!("Dropping {:?} raised from inside an event callback", event);
            return;
        }

        let _scope = self.dispatch.lock();
        let callback = self.callback.lock().clone();
        if let Some(callback) = callback {
            let _guard = CallbackGuard::enter();
            callback.on_event(event);
        }
    }

    pub fn dispatch_all(&self, events: impl IntoIterator<Item = StreamEvent>) {
        for event in events {
            self.dispatch(event);
        }
    }
}

impl Default for EventDispatcher {
    fn default() -> Self {
        Self::new()
    }
}

/// Callback that records every event, for tests
#[cfg(test)]
pub struct TestCallback {
    events: Arc<Mutex<Vec<StreamEvent>>>,
}

#[cfg(test)]
impl TestCallback {
    pub fn new() -> Self {
        Self {
            events: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn get_events(&self) -> Vec<StreamEvent> {
        self.events.lock().clone()
    }
}

#[cfg(test)]
impl StreamCallback for TestCallback {
    fn on_event(&self, event: StreamEvent) {
        self.events.lock().push(event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dispatch_in_order() {
        let dispatcher = EventDispatcher::new();
        let callback = Arc::new(TestCallback::new());
        dispatcher.set_callback(Some(callback.clone()));

        dispatcher.dispatch(StreamEvent::Ready);
        dispatcher.dispatch(StreamEvent::Meta("StreamTitle='A';".into()));
        dispatcher.dispatch(StreamEvent::End);

        assert_eq!(
            callback.get_events(),
            vec![
                StreamEvent::Ready,
                StreamEvent::Meta("StreamTitle='A';".into()),
                StreamEvent::End
            ]
        );
    }

    #[test]
    fn test_no_callback_is_noop() {
        let dispatcher = EventDispatcher::new();
        dispatcher.dispatch(StreamEvent::Buffering);
        assert!(!EventDispatcher::in_callback());
    }

    #[test]
    fn test_panicking_callback_does_not_silence_thread() {
        let dispatcher = EventDispatcher::new();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let log = seen.clone();
        dispatcher.set_callback(Some(Arc::new(move |event: StreamEvent| {
            if event == StreamEvent::Buffering {
                panic!("callback failure");
            }
            log.lock().push(event);
        })));

        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            dispatcher.dispatch(StreamEvent::Buffering);
        }));
        assert!(result.is_err());
        assert!(!EventDispatcher::in_callback());

        dispatcher.dispatch(StreamEvent::Ready);
        assert_eq!(*seen.lock(), vec![StreamEvent::Ready]);
    }

    #[test]
    fn test_nested_dispatch_is_dropped() {
        let dispatcher = Arc::new(EventDispatcher::new());
        let seen = Arc::new(Mutex::new(Vec::new()));

        let inner = dispatcher.clone();
        let log = seen.clone();
        dispatcher.set_callback(Some(Arc::new(move |event: StreamEvent| {
            log.lock().push(event.clone());
            // Would deadlock on the dispatch scope without the guard
            inner.dispatch(StreamEvent::End);
        })));

        dispatcher.dispatch(StreamEvent::Ready);
        assert_eq!(*seen.lock(), vec![StreamEvent::Ready]);
        assert!(!EventDispatcher::in_callback());
    }

    #[test]
    fn test_replace_callback_from_inside_callback() {
        let dispatcher = Arc::new(EventDispatcher::new());
        let calls = Arc::new(Mutex::new(0));
        let inner = dispatcher.clone();
        let count = calls.clone();
        dispatcher.set_callback(Some(Arc::new(move |_event: StreamEvent| {
            *count.lock() += 1;
            inner.set_callback(None);
        })));

        dispatcher.dispatch(StreamEvent::Ready);
        dispatcher.dispatch(StreamEvent::End);
        assert_eq!(*calls.lock(), 1);
    }
}
