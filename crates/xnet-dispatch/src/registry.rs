//! Registry of named handlers and aliases.
//!
//! Handlers live in registry-owned slots addressed by [`HandlerId`]. A name
//! maps to exactly one slot; re-registering a name points it at a new slot.
//! Aliases point at a slot directly and are only consulted when no primary
//! name matches.

use std::any::Any;

use indexmap::IndexMap;
use xnet_directive::{Directives, ParsedArguments};

use crate::Handler;

/// Opaque reference to a registered handler.
///
/// Ids carry the registry epoch they were issued in, so an id obtained before
/// [`HandlerRegistry::reset`] never matches a handler registered after it.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct HandlerId {
    index: usize,
    epoch: u64,
}

/// Resolved directives: each handler with the concatenated arguments of every
/// directive name that resolved to it, in directive order.
pub type Resolution = IndexMap<HandlerId, Vec<ParsedArguments>>;

/// Registry error.
#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    /// The id was not issued by this registry or predates the last reset.
    #[error("unknown handler id")]
    UnknownHandler,
}

struct Slot {
    name: String,
    handler: Box<dyn Handler>,
}

/// Named handlers and aliases.
///
/// Constructed once per process (usually owned by a
/// [`Dispatcher`](crate::Dispatcher)) and passed around explicitly.
#[derive(Default)]
pub struct HandlerRegistry {
    slots: Vec<Slot>,
    names: IndexMap<String, usize>,
    aliases: IndexMap<String, usize>,
    epoch: u64,
}

impl HandlerRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a handler under `name`, replacing any handler of that name.
    ///
    /// A replaced handler keeps its position in registration order. Its slot
    /// is reused unless an alias still points at it, in which case the alias
    /// keeps the old handler and the name moves to a new slot.
    pub fn register<H: Handler>(&mut self, name: impl Into<String>, handler: H) -> HandlerId {
        let name = name.into();

        if let Some(&index) = self.names.get(&name)
            && !self.aliases.values().any(|&aliased| aliased == index)
        {
            self.slots[index].handler = Box::new(handler);
            return self.id(index);
        }

        let index = self.slots.len();
        self.slots.push(Slot {
            name: name.clone(),
            handler: Box::new(handler),
        });
        self.names.insert(name, index);
        self.id(index)
    }

    /// Register `alias` as an alternative name for a registered handler.
    ///
    /// Aliases are consulted only when no handler is registered under the
    /// directive name itself.
    pub fn register_alias(
        &mut self,
        alias: impl Into<String>,
        handler: HandlerId,
    ) -> Result<(), RegistryError> {
        let index = self.index(handler).ok_or(RegistryError::UnknownHandler)?;
        self.aliases.insert(alias.into(), index);
        Ok(())
    }

    /// Remove every handler and alias.
    pub fn reset(&mut self) {
        self.slots.clear();
        self.names.clear();
        self.aliases.clear();
        self.epoch += 1;
    }

    /// Look up a directive name: primary names first, then aliases.
    #[must_use]
    pub fn lookup(&self, name: &str) -> Option<HandlerId> {
        self.names
            .get(name)
            .or_else(|| self.aliases.get(name))
            .map(|&index| self.id(index))
    }

    /// Resolve directives to handlers.
    ///
    /// Unknown directive names are logged and skipped.
    #[must_use]
    pub fn resolve(&self, directives: &Directives) -> Resolution {
        let mut resolution = Resolution::new();

        for (name, args) in directives.iter() {
            let Some(id) = self.lookup(name) else {
                tracing::info!(directive = %name, "Skipping unknown directive");
                continue;
            };
            resolution.entry(id).or_default().extend_from_slice(args);
        }

        resolution
    }

    /// Ids of all handlers reachable by primary name, in registration order.
    #[must_use]
    pub fn registered(&self) -> Vec<HandlerId> {
        self.names.values().map(|&index| self.id(index)).collect()
    }

    /// Primary names in registration order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.names.keys().map(String::as_str)
    }

    /// True if a handler is registered under `name` (aliases excluded).
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.names.contains_key(name)
    }

    /// Number of primary names.
    #[must_use]
    pub fn len(&self) -> usize {
        self.names.len()
    }

    /// True if nothing is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    /// Name the handler was registered under.
    #[must_use]
    pub fn name_of(&self, id: HandlerId) -> Option<&str> {
        self.index(id).map(|index| self.slots[index].name.as_str())
    }

    /// Borrow the handler registered under `name` as its concrete type.
    #[must_use]
    pub fn handler<H: Handler>(&self, name: &str) -> Option<&H> {
        let &index = self.names.get(name)?;
        let handler: &dyn Any = &*self.slots[index].handler;
        handler.downcast_ref()
    }

    /// Mutably borrow the handler registered under `name` as its concrete type.
    pub fn handler_mut<H: Handler>(&mut self, name: &str) -> Option<&mut H> {
        let &index = self.names.get(name)?;
        let handler: &mut dyn Any = &mut *self.slots[index].handler;
        handler.downcast_mut()
    }

    pub(crate) fn slot_mut(&mut self, id: HandlerId) -> Option<(&str, &mut dyn Handler)> {
        let index = self.index(id)?;
        let slot = &mut self.slots[index];
        Some((slot.name.as_str(), &mut *slot.handler))
    }

    fn id(&self, index: usize) -> HandlerId {
        HandlerId {
            index,
            epoch: self.epoch,
        }
    }

    fn index(&self, id: HandlerId) -> Option<usize> {
        (id.epoch == self.epoch && id.index < self.slots.len()).then_some(id.index)
    }
}
