//! Per-map schema tables

use std::collections::BTreeMap;

use serde::Serialize;
use serde_json::Value;
use tracing::debug;

use super::shape::{HandlerShape, RawShape};
use crate::error::ContractError;
use crate::event::{Event, EventMap};

/// Event name to handler shape table for one event map
///
/// Built once when a contract is created and shared read-only afterwards.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Schema {
    name: String,
    events: BTreeMap<String, HandlerShape>,
}

impl Schema {
    /// Build the schema declared by an event map type
    pub fn of<M: EventMap>() -> Result<Self, ContractError> {
        debug!(map = M::NAME, "Schema::of: called");
        let mut builder = SchemaBuilder::new(M::NAME);
        M::describe(&mut builder);
        builder.build()
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    pub fn contains(&self, event: &str) -> bool {
        self.events.contains_key(event)
    }

    pub fn get(&self, event: &str) -> Option<&HandlerShape> {
        self.events.get(event)
    }

    /// Event names in lexical order
    pub fn events(&self) -> impl Iterator<Item = &str> {
        self.events.keys().map(String::as_str)
    }

    /// Look up a shape, failing with `UnknownEvent` when the name is not declared
    pub fn shape(&self, event: &str) -> Result<&HandlerShape, ContractError> {
        self.events.get(event).ok_or_else(|| ContractError::UnknownEvent {
            map: self.name.clone(),
            event: event.to_string(),
        })
    }

    /// Validate raw arguments for `event` before they are dispatched
    pub fn validate_args(&self, event: &str, args: &[Value]) -> Result<&HandlerShape, ContractError> {
        let shape = self.shape(event)?;
        shape.check_args(args).map_err(|detail| ContractError::ShapeMismatch {
            event: event.to_string(),
            detail,
        })?;
        Ok(shape)
    }

    /// Validate a handler result for `event`
    pub fn validate_return(&self, event: &str, value: &Value) -> Result<(), ContractError> {
        self.shape(event)?
            .check_return(value)
            .map_err(|detail| ContractError::ShapeMismatch {
                event: event.to_string(),
                detail,
            })
    }
}

/// Collects event declarations and rejects duplicate names on `build`
#[derive(Debug)]
pub struct SchemaBuilder {
    name: String,
    events: BTreeMap<String, HandlerShape>,
    duplicate: Option<String>,
}

impl SchemaBuilder {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            events: BTreeMap::new(),
            duplicate: None,
        }
    }

    /// Declare a typed event
    pub fn event<E: Event>(&mut self) -> &mut Self {
        self.insert(E::NAME, E::shape())
    }

    /// Declare an event at runtime from a payload or handler declaration
    pub fn raw(&mut self, name: &str, shape: impl Into<RawShape>) -> &mut Self {
        self.insert(name, shape.into().funcify())
    }

    pub fn insert(&mut self, name: &str, shape: HandlerShape) -> &mut Self {
        if self.events.insert(name.to_string(), shape).is_some() && self.duplicate.is_none() {
            self.duplicate = Some(name.to_string());
        }
        self
    }

    pub fn build(self) -> Result<Schema, ContractError> {
        if let Some(event) = self.duplicate {
            return Err(ContractError::DuplicateEvent { map: self.name, event });
        }
        debug!(map = %self.name, events = self.events.len(), "SchemaBuilder::build: done");
        Ok(Schema {
            name: self.name,
            events: self.events,
        })
    }
}
