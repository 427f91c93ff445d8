//! The conversational state machine: states, contexts, the registry
//! that holds them, and the machine that drives a chat through them.

pub mod capabilities;
pub mod context;
pub mod machine;
pub mod registry;
pub mod serializer;
pub mod state;
pub mod types;

pub use context::Context;
pub use machine::StateMachine;
pub use registry::{StateRegistry, StateRegistryBuilder};
pub use state::State;
pub use types::{Action, CallbackPayload, ChatId, MessagePayload, StateCode};
