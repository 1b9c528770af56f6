//! Optional capabilities registered against a tree.
//!
//! A feature owns its own state and subscriptions and exposes its operations
//! as ordinary methods on itself; the registry only tracks which features are
//! enabled so they can be looked up and detached again.

pub mod editable;

use std::any::Any;
use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use tracing::debug;

pub use editable::{EditKind, EditRequest, EditSession, Editable, EditableOptions, SubmitCause};

pub trait Feature: Any {
    /// Registry key; one feature per name.
    fn name(&self) -> &'static str;

    /// Names of the operations this feature makes callable.
    fn api(&self) -> &'static [&'static str];

    /// Drops every subscription the feature holds.
    fn detach(&self);
}

struct Entry {
    feature: Rc<dyn Feature>,
    any: Rc<dyn Any>,
}

#[derive(Default)]
pub struct FeatureRegistry {
    entries: RefCell<Vec<Entry>>,
}

impl fmt::Debug for FeatureRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.names()).finish()
    }
}

impl FeatureRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `feature`, replacing (and detaching) one with the same name.
    pub fn enable<F: Feature>(&self, feature: F) -> Rc<F> {
        let name = feature.name();
        self.disable(name);

        let feature = Rc::new(feature);
        self.entries.borrow_mut().push(Entry {
            feature: feature.clone(),
            any: feature.clone(),
        });
        debug!(feature = name, "feature enabled");
        feature
    }

    pub fn get<F: Feature>(&self) -> Option<Rc<F>> {
        self.entries
            .borrow()
            .iter()
            .find_map(|entry| Rc::clone(&entry.any).downcast::<F>().ok())
    }

    /// Detaches and forgets the feature registered as `name`.
    pub fn disable(&self, name: &str) -> bool {
        let removed = {
            let mut entries = self.entries.borrow_mut();
            entries
                .iter()
                .position(|entry| entry.feature.name() == name)
                .map(|pos| entries.remove(pos))
        };
        match removed {
            Some(entry) => {
                entry.feature.detach();
                debug!(feature = name, "feature disabled");
                true
            }
            None => false,
        }
    }

    pub fn is_enabled(&self, name: &str) -> bool {
        self.entries
            .borrow()
            .iter()
            .any(|entry| entry.feature.name() == name)
    }

    /// Enabled feature names in enable order.
    pub fn names(&self) -> Vec<&'static str> {
        self.entries
            .borrow()
            .iter()
            .map(|entry| entry.feature.name())
            .collect()
    }

    /// Name of the enabled feature providing operation `api`, if any.
    pub fn provides(&self, api: &str) -> Option<&'static str> {
        self.entries
            .borrow()
            .iter()
            .find(|entry| entry.feature.api().contains(&api))
            .map(|entry| entry.feature.name())
    }
}
