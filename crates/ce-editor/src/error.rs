//! Error types for the editor engine.

use ce_core::{ItemId, ModelError};
use thiserror::Error;

/// Failure to inject a script or stylesheet into the iframe document.
///
/// `Clone` because the script injection future is shared between every
/// `enable()` of one document.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum InjectError {
    #[error("document has no <head> to inject into")]
    NoHead,
    #[error("failed to load `{url}`: {reason}")]
    LoadFailed { url: String, reason: String },
    #[error("document was unloaded before `{0}` finished loading")]
    Unloaded(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DragError {
    #[error("no document is loaded")]
    NoDocument,
    #[error("drag library unavailable: {0}")]
    Inject(#[from] InjectError),
    #[error("drag library refused to start: {0}")]
    Library(String),
    #[error("document changed while enabling drag and drop")]
    Superseded,
    #[error("drag and drop was disabled before the library was ready")]
    Cancelled,
    #[error("component `{0}` has no box element in the current page")]
    UnknownComponent(ItemId),
    #[error("a drop is still being processed")]
    Busy,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("could not switch to channel `{channel}`: {reason}")]
pub struct ChannelError {
    pub channel: String,
    pub reason: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LoadError {
    /// A newer document replaced this one before the cycle finished.
    #[error("load cycle superseded by a newer document")]
    Superseded,
    #[error(transparent)]
    ChannelSwitch(#[from] ChannelError),
}

/// Why a drop was refused.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DropError {
    #[error("drop arrived while no drag was in progress")]
    NotDragging,
    #[error("dropped element is not a known component")]
    UnknownElement,
    #[error("drop target is not a known container")]
    UnknownTarget,
    #[error(transparent)]
    Model(#[from] ModelError),
}
