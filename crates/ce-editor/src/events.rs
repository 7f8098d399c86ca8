//! Signals emitted by the engine, queued until the host drains them.

use crate::realm::Generation;
use ce_core::{ItemId, ModelError};
use serde::Serialize;
use std::cell::RefCell;
use std::collections::VecDeque;
use std::rc::Rc;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum EditorEvent {
    /// A load cycle ran to its end, whether or not every step succeeded.
    PageLoaded {
        generation: Generation,
        warnings: usize,
    },
    /// A press on a component was released without a drag.
    ComponentSelected { component: ItemId },
    ComponentMoved {
        component: ItemId,
        from: ItemId,
        to: ItemId,
        before: Option<ItemId>,
    },
    MoveRejected {
        component: ItemId,
        #[serde(serialize_with = "as_display")]
        reason: ModelError,
    },
    DragEnabled,
    DragDisabled,
}

fn as_display<S: serde::Serializer>(err: &ModelError, s: S) -> Result<S::Ok, S::Error> {
    s.collect_str(err)
}

/// Shared FIFO of [`EditorEvent`]s. Cloning shares the queue.
#[derive(Debug, Clone, Default)]
pub struct EventQueue {
    inner: Rc<RefCell<VecDeque<EditorEvent>>>,
}

impl EventQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, event: EditorEvent) {
        log::debug!("event: {event:?}");
        self.inner.borrow_mut().push_back(event);
    }

    /// Takes every pending event, oldest first.
    pub fn drain(&self) -> Vec<EditorEvent> {
        self.inner.borrow_mut().drain(..).collect()
    }

    pub fn len(&self) -> usize {
        self.inner.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.borrow().is_empty()
    }
}
