//! Command synchronization: tree mutations confirmed by a remote authority.
//!
//! For every operation with a registered command the remote call is issued
//! first and the local mutation is applied only once the call succeeds. A
//! failed call never touches the tree, so there is nothing to roll back:
//!
//! ```text
//! ISSUED ──success──► APPLIED     (store mutation + successAjaxResponse)
//!        └─failure──► DISCARDED   (errorAjaxResponse only)
//! ```
//!
//! Operations without a command go straight to the store. Targets are
//! re-checked when a call resolves; if one was removed in the meantime the
//! resolution is discarded like any other failure.

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use serde_json::{json, Value};
use tracing::{debug, info, info_span, warn, Instrument};

use crate::application::command::{
    build_request, CommandConfig, CorrelationToken, PendingCommand, RequestOptions,
};
use crate::application::error::{SyncError, SyncResult};
use crate::application::tree::Tree;
use crate::domain::{CommandKind, NodeData, NodeDatum, NodeId, NodeState, TreeEvent};
use crate::infrastructure::Transport;

pub struct CommandSync {
    tree: Tree,
    transport: Rc<dyn Transport>,
    commands: RefCell<HashMap<CommandKind, CommandConfig>>,
    pending: RefCell<HashMap<CorrelationToken, PendingCommand>>,
    load_root: bool,
}

/// Forgets a pending record when dropped, including when the call's future
/// is dropped mid-flight.
struct PendingGuard<'a> {
    pending: &'a RefCell<HashMap<CorrelationToken, PendingCommand>>,
    token: CorrelationToken,
}

impl Drop for PendingGuard<'_> {
    fn drop(&mut self) {
        if let Ok(mut pending) = self.pending.try_borrow_mut() {
            pending.remove(&self.token);
        }
    }
}

impl std::fmt::Debug for CommandSync {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CommandSync")
            .field("commands", &self.commands.borrow())
            .field("pending", &self.pending.borrow().len())
            .field("load_root", &self.load_root)
            .finish()
    }
}

impl CommandSync {
    pub fn new(tree: Tree, transport: Rc<dyn Transport>) -> Self {
        Self {
            tree,
            transport,
            commands: RefCell::new(HashMap::new()),
            pending: RefCell::new(HashMap::new()),
            load_root: true,
        }
    }

    pub fn with_commands<I>(self, commands: I) -> Self
    where
        I: IntoIterator<Item = (CommandKind, CommandConfig)>,
    {
        self.commands.borrow_mut().extend(commands);
        self
    }

    /// Whether `initialize` fetches the root's children. On by default.
    pub fn with_load_root(mut self, load_root: bool) -> Self {
        self.load_root = load_root;
        self
    }

    pub fn tree(&self) -> &Tree {
        &self.tree
    }

    pub fn register(&self, command: CommandKind, config: CommandConfig) {
        debug!(%command, "command registered");
        self.commands.borrow_mut().insert(command, config);
    }

    pub fn unregister(&self, command: CommandKind) -> Option<CommandConfig> {
        self.commands.borrow_mut().remove(&command)
    }

    pub fn is_gated(&self, command: CommandKind) -> bool {
        self.commands.borrow().contains_key(&command)
    }

    /// Commands issued and not yet resolved.
    pub fn pending(&self) -> Vec<PendingCommand> {
        self.pending.borrow().values().cloned().collect()
    }

    pub fn is_loading(&self) -> bool {
        !self.pending.borrow().is_empty()
    }

    fn command(&self, command: CommandKind) -> Option<CommandConfig> {
        self.commands.borrow().get(&command).cloned()
    }

    fn resolve_parent(&self, parent: Option<NodeId>) -> NodeId {
        parent
            .filter(|id| self.tree.contains(*id))
            .unwrap_or_else(|| self.tree.root_id())
    }

    fn ensure_present(&self, command: CommandKind, id: NodeId) -> SyncResult<()> {
        if self.tree.contains(id) {
            Ok(())
        } else {
            Err(SyncError::TargetVanished { command, id })
        }
    }

    /// Loads the first level of the tree through the read command.
    ///
    /// Does nothing when root loading is off or read is not gated.
    pub async fn initialize(&self) -> SyncResult<Vec<NodeId>> {
        if !self.load_root {
            debug!("root loading disabled");
            return Ok(Vec::new());
        }
        self.load_children(None).await
    }

    // ============================================================
    // GATED OPERATIONS
    // ============================================================

    /// Adds `data` under `parent` once the create command is confirmed.
    pub async fn add(&self, data: Vec<NodeDatum>, parent: Option<NodeId>) -> SyncResult<Vec<NodeId>> {
        let Some(config) = self.command(CommandKind::Create) else {
            return Ok(self.tree.add(data, parent));
        };
        let parent = self.resolve_parent(parent);
        let params = object(json!({
            "parentId": parent,
            "data": serde_json::to_value(&data).unwrap_or_default(),
        }));

        let outcome = self
            .round_trip(CommandKind::Create, &config, Some(parent), vec![parent], params)
            .await;
        self.settle(CommandKind::Create, outcome, |_| {
            self.ensure_present(CommandKind::Create, parent)?;
            let ids = self.tree.add(data, Some(parent));
            Ok((ids.clone(), ids))
        })
    }

    /// Fetches the children of `parent` and adds them.
    ///
    /// Without a read command there is nothing to fetch and nothing is added.
    pub async fn load_children(&self, parent: Option<NodeId>) -> SyncResult<Vec<NodeId>> {
        let Some(config) = self.command(CommandKind::Read) else {
            debug!("no read command registered");
            return Ok(Vec::new());
        };
        let parent = self.resolve_parent(parent);
        let params = object(json!({ "nodeId": parent }));

        let outcome = self
            .round_trip(CommandKind::Read, &config, Some(parent), vec![parent], params)
            .await;
        self.settle(CommandKind::Read, outcome, |body| {
            self.ensure_present(CommandKind::Read, parent)?;
            let data = NodeDatum::list_from_value(body.clone()).map_err(|e| {
                SyncError::InvalidPayload {
                    command: CommandKind::Read,
                    message: e.to_string(),
                }
            })?;
            let ids = self.tree.add(data, Some(parent));
            Ok((ids.clone(), ids))
        })
    }

    /// Opens `id`, lazily loading its children first when it advertises
    /// children it does not have yet.
    pub async fn expand(&self, id: NodeId) -> SyncResult<Vec<NodeId>> {
        let Some(node) = self.tree.get_node(id) else {
            return Ok(Vec::new());
        };
        let needs_load = node.has_child && node.child_ids().is_empty();
        let loaded = if needs_load && self.is_gated(CommandKind::Read) {
            self.load_children(Some(id)).await?
        } else {
            Vec::new()
        };
        self.tree.set_state(id, NodeState::Expanded);
        Ok(loaded)
    }

    /// Removes `id` and its subtree once the remove command is confirmed.
    pub async fn remove(&self, id: NodeId) -> SyncResult<()> {
        let Some(config) = self.command(CommandKind::Remove) else {
            self.tree.remove(id);
            return Ok(());
        };
        if let Err(e) = self.tree.read(|store| store.check_remove(id)) {
            debug!(%e, "gated remove ignored");
            return Ok(());
        }
        let params = object(json!({ "nodeId": id }));

        let outcome = self
            .round_trip(CommandKind::Remove, &config, Some(id), vec![id], params)
            .await;
        self.settle(CommandKind::Remove, outcome, |_| {
            self.ensure_present(CommandKind::Remove, id)?;
            self.tree.remove(id);
            Ok(((), vec![id]))
        })
    }

    /// Removes every child of `id` once the command is confirmed.
    pub async fn remove_all_children(&self, id: NodeId) -> SyncResult<()> {
        let Some(config) = self.command(CommandKind::RemoveAllChildren) else {
            self.tree.remove_all_children(id);
            return Ok(());
        };
        if let Err(e) = self.tree.read(|store| store.check_remove_all_children(id)) {
            debug!(%e, "gated remove_all_children ignored");
            return Ok(());
        }
        let params = object(json!({ "nodeId": id }));

        let outcome = self
            .round_trip(CommandKind::RemoveAllChildren, &config, Some(id), vec![id], params)
            .await;
        self.settle(CommandKind::RemoveAllChildren, outcome, |_| {
            self.ensure_present(CommandKind::RemoveAllChildren, id)?;
            let removed = self.tree.get_child_ids(id);
            self.tree.remove_all_children(id);
            Ok(((), removed))
        })
    }

    /// Merges `properties` into the node's data once the update is confirmed.
    pub async fn set(&self, id: NodeId, properties: NodeData) -> SyncResult<()> {
        let Some(config) = self.command(CommandKind::Update) else {
            self.tree.set(id, properties);
            return Ok(());
        };
        if let Err(e) = self.tree.read(|store| store.check_set(id, &properties)) {
            debug!(%e, "gated set ignored");
            return Ok(());
        }
        let params = object(json!({ "nodeId": id, "data": properties.clone() }));

        let outcome = self
            .round_trip(CommandKind::Update, &config, Some(id), vec![id], params)
            .await;
        self.settle(CommandKind::Update, outcome, |_| {
            self.ensure_present(CommandKind::Update, id)?;
            self.tree.set(id, properties);
            Ok(((), vec![id]))
        })
    }

    /// Deletes `keys` from the node's data once the update is confirmed.
    pub async fn remove_data(&self, id: NodeId, keys: Vec<String>) -> SyncResult<()> {
        let Some(config) = self.command(CommandKind::Update) else {
            self.tree.remove_data(id, &keys);
            return Ok(());
        };
        if let Err(e) = self.tree.read(|store| store.check_remove_data(id, &keys)) {
            debug!(%e, "gated remove_data ignored");
            return Ok(());
        }
        let params = object(json!({ "nodeId": id, "keys": keys.clone() }));

        let outcome = self
            .round_trip(CommandKind::Update, &config, Some(id), vec![id], params)
            .await;
        self.settle(CommandKind::Update, outcome, |_| {
            self.ensure_present(CommandKind::Update, id)?;
            self.tree.remove_data(id, &keys);
            Ok(((), vec![id]))
        })
    }

    /// Re-parents `id` once the move command is confirmed.
    pub async fn move_node(&self, id: NodeId, new_parent: Option<NodeId>) -> SyncResult<()> {
        let Some(config) = self.command(CommandKind::Move) else {
            self.tree.move_node(id, new_parent);
            return Ok(());
        };
        let target = match self.tree.read(|store| store.check_move(id, new_parent)) {
            Ok((original, target)) if original != target => target,
            Ok(_) => {
                debug!(%id, "gated move to current parent ignored");
                return Ok(());
            }
            Err(e) => {
                debug!(%e, "gated move ignored");
                return Ok(());
            }
        };
        let params = object(json!({ "nodeId": id, "newParentId": target }));

        let outcome = self
            .round_trip(CommandKind::Move, &config, Some(id), vec![id, target], params)
            .await;
        if outcome.is_ok() && self.already_under(id, target) {
            debug!(%id, %target, "confirmed move already in place");
            return Ok(());
        }
        self.settle(CommandKind::Move, outcome, |_| {
            self.ensure_present(CommandKind::Move, id)?;
            self.ensure_present(CommandKind::Move, target)?;
            self.tree
                .read(|store| store.check_move(id, Some(target)))
                .map_err(|e| SyncError::Conflict {
                    command: CommandKind::Move,
                    message: e.to_string(),
                })?;
            self.tree.move_node(id, Some(target));
            Ok(((), vec![id]))
        })
    }

    /// Raw round trip for `command` without touching the tree; returns the
    /// response body.
    pub async fn load_data(
        &self,
        command: CommandKind,
        acting: Option<NodeId>,
        options: RequestOptions,
    ) -> SyncResult<Value> {
        let config = self.command(command).unwrap_or_default();
        let targets = acting.into_iter().collect();
        let outcome = self
            .round_trip_with(command, &config, acting, targets, options)
            .await;
        self.settle(command, outcome, |body| Ok((body.clone(), Vec::new())))
    }

    fn already_under(&self, id: NodeId, target: NodeId) -> bool {
        self.tree.contains(target)
            && matches!(
                self.tree.read(|store| store.check_move(id, Some(target))),
                Ok((original, _)) if original == target
            )
    }

    // ============================================================
    // PROTOCOL
    // ============================================================

    async fn round_trip(
        &self,
        command: CommandKind,
        config: &CommandConfig,
        acting: Option<NodeId>,
        targets: Vec<NodeId>,
        params: NodeData,
    ) -> SyncResult<Value> {
        self.round_trip_with(command, config, acting, targets, RequestOptions::with_params(params))
            .await
    }

    /// Issues exactly one remote call and classifies its outcome.
    async fn round_trip_with(
        &self,
        command: CommandKind,
        config: &CommandConfig,
        acting: Option<NodeId>,
        targets: Vec<NodeId>,
        options: RequestOptions,
    ) -> SyncResult<Value> {
        let acting_data = acting.and_then(|id| self.tree.get_node_data(id));
        let request = build_request(command, config, acting_data.as_ref(), options)?;

        let token = CorrelationToken::new();
        let span = info_span!("command", %command, %token);
        async move {
            info!(method = %request.method, url = %request.url, "issuing command");
            self.pending.borrow_mut().insert(
                token,
                PendingCommand {
                    token,
                    command,
                    targets,
                    request: request.clone(),
                },
            );

            let guard = PendingGuard {
                pending: &self.pending,
                token,
            };
            let outcome = self.transport.send(request).await;
            drop(guard);

            let response = match outcome {
                Ok(response) => response,
                Err(source) => return Err(SyncError::Transport { command, source }),
            };
            if !response.is_success_status() {
                return Err(SyncError::Status {
                    command,
                    status: response.status,
                });
            }
            if response.body_signals_failure() {
                return Err(SyncError::Rejected(command));
            }
            Ok(response.body)
        }
        .instrument(span)
        .await
    }

    /// Applies a confirmed command or discards a failed one, then notifies.
    ///
    /// `apply` returns the caller's result plus the ids to report.
    fn settle<T, F>(&self, command: CommandKind, outcome: SyncResult<Value>, apply: F) -> SyncResult<T>
    where
        F: FnOnce(&Value) -> SyncResult<(T, Vec<NodeId>)>,
    {
        let applied = outcome.and_then(|body| {
            let (value, ids) = apply(&body)?;
            Ok((value, ids, body))
        });
        match applied {
            Ok((value, ids, body)) => {
                info!(%command, count = ids.len(), "command applied");
                self.tree
                    .notify(TreeEvent::SuccessResponse { command, ids, body });
                Ok(value)
            }
            Err(error) => {
                warn!(%command, %error, "command discarded");
                self.tree.notify(TreeEvent::ErrorResponse {
                    command,
                    error: error.to_string(),
                });
                Err(error)
            }
        }
    }
}

fn object(value: Value) -> NodeData {
    match value {
        Value::Object(map) => map,
        _ => NodeData::new(),
    }
}
