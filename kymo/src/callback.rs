use ndarray::Array2;
use std::collections::HashMap;
use std::sync::Arc;

/// Events emitted by the pipeline orchestrator.
#[derive(Debug, Clone)]
pub enum ProcessorEvent {
    /// The per-voxel entropy vector is available.
    /// Payload wrapped in Arc for cheap sharing across listeners.
    EntropyReady {
        entropies: Arc<Vec<f64>>,
        from_cache: bool,
    },
    /// The temporal surface and its binary mask are available.
    SurfaceReady {
        surface: Arc<Array2<f64>>,
        mask: Arc<Array2<bool>>,
    },
}

/// Callback ID for registration/deregistration.
pub type CallbackId = u64;

/// Callback function type.
pub type ProcessorCallback = Arc<dyn Fn(&ProcessorEvent) + Send + Sync>;

/// Explicit listener registry owned by the orchestrator.
///
/// Listeners are invoked synchronously on the calling thread, in no
/// particular order. Callers needing asynchrony wrap their callback in
/// their own executor.
#[derive(Default)]
pub struct CallbackRegistry {
    callbacks: HashMap<CallbackId, ProcessorCallback>,
    next_id: CallbackId,
}

impl CallbackRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a listener and returns its handle.
    pub fn register(&mut self, callback: ProcessorCallback) -> CallbackId {
        let id = self.next_id;
        self.next_id += 1;
        self.callbacks.insert(id, callback);
        id
    }

    /// Removes a listener. Returns false for an unknown handle.
    pub fn unregister(&mut self, id: CallbackId) -> bool {
        self.callbacks.remove(&id).is_some()
    }

    /// Number of registered listeners.
    pub fn len(&self) -> usize {
        self.callbacks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.callbacks.is_empty()
    }

    /// Invokes every listener with the event.
    pub fn emit(&self, event: &ProcessorEvent) {
        for callback in self.callbacks.values() {
            callback(event);
        }
    }
}

impl std::fmt::Debug for CallbackRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CallbackRegistry")
            .field("listeners", &self.callbacks.len())
            .finish()
    }
}
