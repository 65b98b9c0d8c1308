//! Turn-taking state machine
//!
//! Elm-style: `transition` is pure and returns the new state plus the effects
//! the runtime must carry out.

mod effect;
pub mod event;
pub mod state;
pub(crate) mod transition;

#[cfg(test)]
mod proptests;

pub use effect::Effect;
pub use event::Event;
pub use state::{ConvContext, ConvState};
pub use transition::{transition, TransitionError, MAX_TURNS_LIMIT};
