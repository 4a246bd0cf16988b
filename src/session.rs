//! Chat session control
//!
//! One session is one send-and-observe interaction: the user message goes
//! out, typed events come back, and the terminal result lands in the
//! conversation store.

mod controller;
mod state;
mod transition;

#[cfg(test)]
pub(crate) mod testing;

pub use controller::SessionController;
pub use state::{SessionOutcome, SessionState};
