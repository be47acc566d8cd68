//! Shared types for the Merge-X batch transfer system.
//!
//! Every crate in the workspace speaks in terms of the types defined here:
//! transfer intents, resolved destinations, gas estimates, batch runs and
//! the progress events emitted while a batch is being sent.

pub mod events;
pub mod gas;
pub mod networks;
pub mod tokens;
pub mod transfer;
pub mod utils;
pub mod validation;

pub use alloy::primitives::{Address, U256};
pub use events::*;
pub use gas::*;
pub use networks::*;
pub use tokens::*;
pub use transfer::*;
pub use utils::*;
pub use validation::*;
