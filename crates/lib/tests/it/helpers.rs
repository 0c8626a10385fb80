use std::sync::{Arc, Mutex};

use livestate::{Change, Container, Subscription, Value};

/// Builds a plain value from JSON.
pub fn value(json: serde_json::Value) -> Value {
    Value::from(json)
}

/// Wraps JSON into a fresh container.
pub fn container(json: serde_json::Value) -> Container {
    Container::wrap(Value::from(json)).expect("JSON list or object")
}

/// Collects every change delivered to a container.
pub struct Recorder {
    pub subscription: Subscription,
    changes: Arc<Mutex<Vec<Change>>>,
}

impl Recorder {
    pub fn attach(container: &Container) -> Self {
        let changes = Arc::new(Mutex::new(Vec::new()));
        let sink = changes.clone();
        let subscription = container.subscribe(move |change| {
            sink.lock().unwrap().push(change.clone());
        });
        Self {
            subscription,
            changes,
        }
    }

    pub fn changes(&self) -> Vec<Change> {
        self.changes.lock().unwrap().clone()
    }

    pub fn count(&self) -> usize {
        self.changes.lock().unwrap().len()
    }

    /// Delivered paths in text form.
    pub fn paths(&self) -> Vec<String> {
        self.changes
            .lock()
            .unwrap()
            .iter()
            .map(|change| change.path().to_string())
            .collect()
    }
}
