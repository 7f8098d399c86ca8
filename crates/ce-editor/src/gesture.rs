//! Pointer gesture state for one component press.
//!
//! A press starts in [`GestureState::Pressing`]. If the drag library picks
//! the element up it becomes [`GestureState::Dragging`]. A release while
//! still pressing is a click. A drop holds [`GestureState::Dropping`] until
//! the model update finishes.
//!
//! | from \ event | Press    | DragStart | Release | Leave | Drop     | DropFinished | DragEnd |
//! |--------------|----------|-----------|---------|-------|----------|--------------|---------|
//! | Idle         | Pressing | Dragging  | -       | Idle  | -        | -            | Idle    |
//! | Pressing     | Pressing | Dragging  | Idle*   | Idle  | -        | -            | Idle    |
//! | Dragging     | -        | Dragging  | Dragging| Dragging | Dropping | -          | Idle    |
//! | Dropping     | -        | -         | Dropping| Dropping | -     | Idle         | -       |
//!
//! `*` is the click. `Reset` goes to `Idle` from anywhere.

use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum GestureState {
    #[default]
    Idle,
    Pressing,
    Dragging,
    Dropping,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GestureEvent {
    Press,
    DragStart,
    Release,
    Leave,
    Drop,
    DropFinished,
    DragEnd,
    Reset,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InvalidTransition {
    pub from: GestureState,
    pub event: GestureEvent,
}

impl fmt::Display for InvalidTransition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?} is not allowed while {:?}", self.event, self.from)
    }
}

impl std::error::Error for InvalidTransition {}

impl GestureState {
    pub fn on(self, event: GestureEvent) -> Result<GestureState, InvalidTransition> {
        use GestureEvent as E;
        use GestureState as S;

        let next = match (self, event) {
            (_, E::Reset) => S::Idle,

            (S::Idle | S::Pressing, E::Press) => S::Pressing,
            (S::Idle | S::Pressing | S::Dragging, E::DragStart) => S::Dragging,

            (S::Pressing, E::Release | E::Leave) => S::Idle,
            (S::Idle, E::Leave) => S::Idle,
            (S::Dragging | S::Dropping, E::Release | E::Leave) => self,

            (S::Dragging, E::Drop) => S::Dropping,
            (S::Dropping, E::DropFinished) => S::Idle,
            (S::Idle | S::Pressing | S::Dragging, E::DragEnd) => S::Idle,

            _ => return Err(InvalidTransition { from: self, event }),
        };
        Ok(next)
    }

    /// `true` when a release in this state counts as a click.
    pub fn is_click_release(self) -> bool {
        self == GestureState::Pressing
    }

    pub fn is_dropping(self) -> bool {
        self == GestureState::Dropping
    }
}
