//! In-place editing of node labels.
//!
//! One edit session at a time. A create session owns a local placeholder
//! child which is swapped for a (possibly gated) `add` on submit; an update
//! session submits a (possibly gated) `set` of the edited key.

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, instrument};

use crate::application::error::SyncResult;
use crate::application::event_bus::ContextId;
use crate::application::features::Feature;
use crate::application::sync::CommandSync;
use crate::domain::{EventName, NodeData, NodeDatum, NodeId, NodeState, TreeEvent};

pub const NAME: &str = "Editable";
const API: &[&str] = &["create_child_node", "edit_node", "finish_editing"];

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EditableOptions {
    /// Node data key holding the edited value
    pub data_key: String,
    /// Value used when a new node is submitted empty
    pub default_value: String,
}

impl Default for EditableOptions {
    fn default() -> Self {
        Self {
            data_key: "text".to_string(),
            default_value: String::new(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EditKind {
    Create,
    Update,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubmitCause {
    Enter,
    Blur,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EditSession {
    pub kind: EditKind,
    /// Placeholder for `Create`, edited node for `Update`
    pub node: NodeId,
}

/// What a before-hook gets to inspect.
#[derive(Debug, Clone, PartialEq)]
pub struct EditRequest {
    pub value: String,
    pub node: NodeId,
    pub cause: SubmitCause,
}

/// Returns `false` to veto the submit.
pub type EditHook = Rc<dyn Fn(&EditRequest) -> bool>;

pub struct Editable {
    sync: Rc<CommandSync>,
    options: EditableOptions,
    context: ContextId,
    session: Rc<RefCell<Option<EditSession>>>,
    before_create: RefCell<Vec<EditHook>>,
    before_edit: RefCell<Vec<EditHook>>,
}

impl fmt::Debug for Editable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Editable")
            .field("options", &self.options)
            .field("session", &self.session.borrow())
            .finish()
    }
}

impl Editable {
    pub fn new(sync: Rc<CommandSync>, options: EditableOptions) -> Self {
        let context = ContextId::new();
        let session: Rc<RefCell<Option<EditSession>>> = Rc::new(RefCell::new(None));

        let weak_tree = sync.tree().downgrade();
        let watched = Rc::clone(&session);
        sync.tree()
            .events()
            .on_with_context(EventName::Update, context, move |event| {
                let TreeEvent::Update { .. } = event else {
                    return;
                };
                let Some(tree) = weak_tree.upgrade() else {
                    return;
                };
                let current = *watched.borrow();
                if let Some(session) = current {
                    if !tree.contains(session.node) {
                        debug!(node = %session.node, "edited node removed, closing session");
                        *watched.borrow_mut() = None;
                    }
                }
            });

        Self {
            sync,
            options,
            context,
            session,
            before_create: RefCell::new(Vec::new()),
            before_edit: RefCell::new(Vec::new()),
        }
    }

    pub fn options(&self) -> &EditableOptions {
        &self.options
    }

    pub fn session(&self) -> Option<EditSession> {
        *self.session.borrow()
    }

    pub fn before_create<F>(&self, hook: F)
    where
        F: Fn(&EditRequest) -> bool + 'static,
    {
        self.before_create.borrow_mut().push(Rc::new(hook));
    }

    pub fn before_edit<F>(&self, hook: F)
    where
        F: Fn(&EditRequest) -> bool + 'static,
    {
        self.before_edit.borrow_mut().push(Rc::new(hook));
    }

    /// Opens `parent` and starts a create session on a fresh placeholder child.
    ///
    /// A collapsed parent that advertises unloaded children is loaded first.
    /// Returns the placeholder id, or `None` for an unknown parent.
    #[instrument(level = "debug", skip(self))]
    pub async fn create_child_node(&self, parent: NodeId) -> SyncResult<Option<NodeId>> {
        let tree = self.sync.tree();
        if !tree.contains(parent) {
            return Ok(None);
        }
        self.finish_editing();

        if !tree.is_leaf(parent) && tree.get_state(parent) == Some(NodeState::Collapsed) {
            self.sync.expand(parent).await?;
            if !tree.contains(parent) {
                return Ok(None);
            }
        }

        let Some(placeholder) = tree.add([NodeDatum::default()], Some(parent)).into_iter().next()
        else {
            return Ok(None);
        };
        *self.session.borrow_mut() = Some(EditSession {
            kind: EditKind::Create,
            node: placeholder,
        });
        Ok(Some(placeholder))
    }

    /// Starts an update session on `id`; `false` for an unknown node.
    pub fn edit_node(&self, id: NodeId) -> bool {
        if !self.sync.tree().contains(id) {
            return false;
        }
        self.finish_editing();
        *self.session.borrow_mut() = Some(EditSession {
            kind: EditKind::Update,
            node: id,
        });
        true
    }

    /// Current value of the edited key, as an input would show it.
    pub fn current_value(&self) -> Option<String> {
        let session = self.session()?;
        let data = self.sync.tree().get_node_data(session.node)?;
        Some(match data.get(&self.options.data_key) {
            Some(Value::String(s)) => s.clone(),
            Some(other) => other.to_string(),
            None => String::new(),
        })
    }

    /// Commits the open session with `value`.
    ///
    /// `Ok(false)` when there is no session or a hook vetoed; the session is
    /// kept on veto.
    #[instrument(level = "debug", skip(self))]
    pub async fn submit(&self, value: &str, cause: SubmitCause) -> SyncResult<bool> {
        let Some(session) = self.session() else {
            return Ok(false);
        };
        let request = EditRequest {
            value: value.to_string(),
            node: session.node,
            cause,
        };
        let hooks: Vec<EditHook> = match session.kind {
            EditKind::Create => self.before_create.borrow().clone(),
            EditKind::Update => self.before_edit.borrow().clone(),
        };
        if !hooks.iter().all(|hook| hook(&request)) {
            debug!(kind = ?session.kind, "submit vetoed");
            return Ok(false);
        }

        self.session.borrow_mut().take();
        let tree = self.sync.tree();
        match session.kind {
            EditKind::Create => {
                let Some(parent) = tree.get_parent_id(session.node) else {
                    return Ok(false);
                };
                let value = if value.is_empty() {
                    self.options.default_value.as_str()
                } else {
                    value
                };
                tree.remove(session.node);
                let datum = NodeDatum::new(self.data(value));
                self.sync.add(vec![datum], Some(parent)).await?;
            }
            EditKind::Update => {
                self.sync.set(session.node, self.data(value)).await?;
            }
        }
        Ok(true)
    }

    /// Cancels the open session; a create placeholder is removed.
    pub fn finish_editing(&self) {
        let session = self.session.borrow_mut().take();
        if let Some(EditSession {
            kind: EditKind::Create,
            node,
        }) = session
        {
            self.sync.tree().remove(node);
        }
    }

    fn data(&self, value: &str) -> NodeData {
        let mut data = NodeData::new();
        data.insert(
            self.options.data_key.clone(),
            Value::String(value.to_string()),
        );
        data
    }
}

impl Feature for Editable {
    fn name(&self) -> &'static str {
        NAME
    }

    fn api(&self) -> &'static [&'static str] {
        API
    }

    fn detach(&self) {
        self.session.borrow_mut().take();
        let removed = self.sync.tree().events().off(self.context);
        debug!(removed, "editable detached");
    }
}
