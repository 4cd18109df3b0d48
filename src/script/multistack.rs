use super::value::NumValue;
use std::collections::HashMap;
use thiserror::Error;

/// Raised when popping or peeking a variable whose stack holds no values.
#[derive(Debug, Error, PartialEq)]
#[error("stack `{name}` is empty")]
pub struct EmptyStack {
    pub name: String,
}

/// A mapping from variable name to a stack of [`NumValue`]s.
///
/// Each name owns an independent stack with strict LIFO order; a drained
/// stack is removed from the map so `is_empty` doubles as a presence
/// check.
#[derive(Debug, Default)]
pub struct VarStack {
    slots: HashMap<String, Vec<NumValue>>,
}

impl VarStack {
    pub fn new() -> Self {
        Self::default()
    }

    /// Pushes `value` onto the stack named `name`.
    pub fn push(&mut self, name: &str, value: NumValue) {
        self.slots.entry(name.to_string()).or_default().push(value);
    }

    /// Removes and returns the most recently pushed value for `name`.
    pub fn pop(&mut self, name: &str) -> Result<NumValue, EmptyStack> {
        let stack = self.slots.get_mut(name).ok_or_else(|| EmptyStack {
            name: name.to_string(),
        })?;
        let value = stack.pop().expect("drained stacks are removed from the map");
        if stack.is_empty() {
            self.slots.remove(name);
        }
        Ok(value)
    }

    /// Returns the most recently pushed value for `name` without removing
    /// it.
    pub fn peek(&self, name: &str) -> Result<&NumValue, EmptyStack> {
        self.slots
            .get(name)
            .and_then(|stack| stack.last())
            .ok_or_else(|| EmptyStack {
                name: name.to_string(),
            })
    }

    pub fn is_empty(&self, name: &str) -> bool {
        !self.slots.contains_key(name)
    }
}
