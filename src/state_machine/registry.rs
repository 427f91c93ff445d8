//! Holds every registered [`State`] and the chat's starting point.

use std::collections::HashMap;

use crate::state_machine::state::State;
use crate::state_machine::types::StateCode;
use crate::util::error::{FsmError, Result};

pub struct StateRegistry {
    states: HashMap<StateCode, State>,
    default: StateCode,
}

impl StateRegistry {
    pub fn builder() -> StateRegistryBuilder {
        StateRegistryBuilder::new()
    }

    pub fn get(&self, code: &str) -> Result<&State> {
        self.states
            .get(code)
            .ok_or_else(|| FsmError::UnknownState(code.to_owned()))
    }

    pub fn contains(&self, code: &str) -> bool {
        self.states.contains_key(code)
    }

    pub fn default_state(&self) -> &str {
        &self.default
    }
}

#[derive(Default)]
pub struct StateRegistryBuilder {
    states: HashMap<StateCode, State>,
    default: Option<StateCode>,
}

impl StateRegistryBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a state. Panics on a duplicate code: two states
    /// sharing a code is a construction-time programming error, not a
    /// runtime condition callers should need to handle.
    pub fn state(mut self, state: State) -> Self {
        let code = state.code().to_owned();
        if self.states.insert(code.clone(), state).is_some() {
            panic!("duplicate state code registered: {code}");
        }
        self
    }

    /// Sets the state new chats start in. Must name a state registered
    /// via [`Self::state`]; checked at [`Self::build`] time.
    pub fn default_state(mut self, code: impl Into<StateCode>) -> Self {
        self.default = Some(code.into());
        self
    }

    pub fn build(self) -> Result<StateRegistry> {
        let default = self.default.ok_or(FsmError::NoDefaultState)?;
        if !self.states.contains_key(&default) {
            return Err(FsmError::UnknownState(default));
        }
        Ok(StateRegistry {
            states: self.states,
            default,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_missing_default() {
        let err = StateRegistry::builder()
            .state(State::new("a"))
            .build()
            .unwrap_err();
        assert!(matches!(err, FsmError::NoDefaultState));
    }

    #[test]
    fn rejects_unknown_default() {
        let err = StateRegistry::builder()
            .state(State::new("a"))
            .default_state("b")
            .build()
            .unwrap_err();
        assert!(matches!(err, FsmError::UnknownState(ref c) if c == "b"));
    }

    #[test]
    #[should_panic(expected = "duplicate state code registered")]
    fn rejects_duplicate_codes() {
        StateRegistry::builder()
            .state(State::new("a"))
            .state(State::new("a"));
    }

    #[test]
    fn builds_with_valid_default() {
        let registry = StateRegistry::builder()
            .state(State::new("a"))
            .default_state("a")
            .build()
            .unwrap();
        assert_eq!(registry.default_state(), "a");
        assert!(registry.contains("a"));
        assert!(registry.get("missing").is_err());
    }
}
