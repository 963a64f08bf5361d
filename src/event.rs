//! Index build notifications.

use std::fmt;
use std::sync::Arc;

use parking_lot::RwLock;

use crate::index::key::FieldPath;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IndexEvent {
    BuildStart(FieldPath),
    BuildEnd(FieldPath),
}

/// Receives index events. Listeners run on the thread that triggered the
/// event and must not call back into index lifecycle operations.
pub trait IndexEventListener: Send + Sync {
    fn on_index_build_start(&self, _fields: &FieldPath) {}

    fn on_index_build_end(&self, _fields: &FieldPath) {}
}

/// Fans events out to the subscribed listeners.
#[derive(Default)]
pub struct EventBus {
    listeners: RwLock<Vec<Arc<dyn IndexEventListener>>>,
}

impl fmt::Debug for EventBus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventBus")
            .field("listeners", &self.listeners.read().len())
            .finish()
    }
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&self, listener: Arc<dyn IndexEventListener>) {
        self.listeners.write().push(listener);
    }

    pub fn publish(&self, event: &IndexEvent) {
        let listeners = self.listeners.read().clone();
        for listener in listeners {
            match event {
                IndexEvent::BuildStart(fields) => listener.on_index_build_start(fields),
                IndexEvent::BuildEnd(fields) => listener.on_index_build_end(fields),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;

    #[derive(Default)]
    struct Recorder(Mutex<Vec<String>>);

    impl IndexEventListener for Recorder {
        fn on_index_build_start(&self, fields: &FieldPath) {
            self.0.lock().push(format!("start {fields}"));
        }

        fn on_index_build_end(&self, fields: &FieldPath) {
            self.0.lock().push(format!("end {fields}"));
        }
    }

    #[test]
    fn test_publish() {
        let bus = EventBus::new();
        let recorder = Arc::new(Recorder::default());
        bus.subscribe(recorder.clone());

        let fields = FieldPath::single("name");
        bus.publish(&IndexEvent::BuildStart(fields.clone()));
        bus.publish(&IndexEvent::BuildEnd(fields));
        assert_eq!(*recorder.0.lock(), vec!["start [name]", "end [name]"]);
    }
}
