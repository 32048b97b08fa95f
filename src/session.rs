//! Per-user conversation state machine
//!
//! Transitions are pure: `transition` maps a state and an event to the next
//! state plus the effects the runtime must carry out. Remote calls happen in
//! the runtime and come back as result events.

mod effect;
pub mod event;
pub mod state;
pub(crate) mod transition;


pub use effect::{Effect, Notice};
pub use event::{Event, SearchQuery};
pub use state::{SessionContext, SessionState, SettingField, UserSettings};
pub use transition::{transition, TransitionError, TransitionResult};
