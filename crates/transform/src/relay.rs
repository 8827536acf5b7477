use std::sync::Arc;

use parking_lot::RwLock;
use tracing::trace;

use crate::delegate::PixelTransformListener;
use crate::types::{Surface, TransformId};

/// Replaceable slot holding the external lifecycle listener.
#[derive(Default)]
pub(crate) struct ListenerSlot {
    listener: RwLock<Option<Arc<dyn PixelTransformListener>>>,
}

impl ListenerSlot {
    pub(crate) fn replace(
        &self,
        listener: Option<Arc<dyn PixelTransformListener>>,
    ) -> Option<Arc<dyn PixelTransformListener>> {
        std::mem::replace(&mut *self.listener.write(), listener)
    }

    /// Clones the listener out so callbacks run without the lock held.
    pub(crate) fn current(&self) -> Option<Arc<dyn PixelTransformListener>> {
        self.listener.read().clone()
    }

    pub(crate) fn is_set(&self) -> bool {
        self.listener.read().is_some()
    }
}

/// Listener installed on the delegate. Forwards notifications with the proxy
/// reported as their source.
pub(crate) struct Relay {
    source: TransformId,
    slot: Arc<ListenerSlot>,
}

impl Relay {
    pub(crate) fn new(source: TransformId, slot: Arc<ListenerSlot>) -> Self {
        Self { source, slot }
    }
}

impl PixelTransformListener for Relay {
    fn on_set_up(&self, origin: TransformId) {
        trace!(%origin, source = %self.source, "relaying set-up");
        if let Some(listener) = self.slot.current() {
            listener.on_set_up(self.source);
        }
    }

    fn on_input_surface_created(&self, origin: TransformId, surface: Surface) {
        trace!(%origin, source = %self.source, %surface, "relaying input surface");
        if let Some(listener) = self.slot.current() {
            listener.on_input_surface_created(self.source, surface);
        }
    }
}
