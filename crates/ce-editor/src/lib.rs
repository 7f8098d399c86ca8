pub mod config;
pub mod dragdrop;
pub mod error;
pub mod events;
pub mod gesture;
pub mod load;
pub mod overlay;
pub mod realm;

pub use config::EditorConfig;
pub use dragdrop::DragDropService;
pub use error::{ChannelError, DragError, DropError, InjectError, LoadError};
pub use events::{EditorEvent, EventQueue};
pub use gesture::{GestureEvent, GestureState};
pub use load::{Collaborators, LoadReport, PageLoadController};
pub use overlay::{FrameMetrics, OverlayState, OverlaySyncService};
pub use realm::*;
