use serde::Serialize;

use crate::types::ObjectId;

pub const SELECTION_CHANGED: &str = "selection:changed";
pub const EDITING_ENTERED: &str = "editing:entered";
pub const EDITING_EXITED: &str = "editing:exited";
pub const CHANGED: &str = "changed";
pub const MODIFIED: &str = "modified";

/// Prefix used when an object event is re-fired on the canvas.
pub const CANVAS_PREFIX: &str = "text:";

#[derive(Serialize, Clone, Debug, PartialEq)]
pub struct TextEvent {
    pub name: String,
    pub target: ObjectId,
}

type Listener = Box<dyn FnMut(&TextEvent)>;

/// Named listeners plus a queue of fired events waiting to be forwarded.
#[derive(Default)]
pub struct Emitter {
    listeners: Vec<(String, Listener)>,
    pending: Vec<TextEvent>,
}

impl Emitter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on(&mut self, name: &str, listener: impl FnMut(&TextEvent) + 'static) {
        self.listeners.push((name.to_string(), Box::new(listener)));
    }

    pub fn off(&mut self, name: &str) {
        self.listeners.retain(|(n, _)| n != name);
    }

    pub fn fire(&mut self, name: &str, target: ObjectId) {
        let event = TextEvent { name: name.to_string(), target };
        for (n, listener) in self.listeners.iter_mut() {
            if n == name {
                listener(&event);
            }
        }
        self.pending.push(event);
    }

    /// Events fired since the last call, oldest first.
    pub fn drain(&mut self) -> Vec<TextEvent> {
        std::mem::take(&mut self.pending)
    }
}

impl std::fmt::Debug for Emitter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Emitter")
            .field("listeners", &self.listeners.len())
            .field("pending", &self.pending)
            .finish()
    }
}
