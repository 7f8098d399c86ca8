pub mod dom;
pub mod geometry;
pub mod id;
pub mod markup;
pub mod model;
pub mod parser;

pub use dom::{DomNodeId, DomNodeKind, DomTree};
pub use geometry::{Geometry, Offset};
pub use id::ItemId;
pub use markup::MarkupDocument;
pub use model::*;
pub use parser::{ParseOutput, ParseWarning, parse_page};
