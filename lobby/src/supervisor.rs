//! The table supervisor: directory of table actors, creation flow,
//! event fan-out, and the request dispatch bridge.
//!
//! The directory map is the only shared-memory structure in the
//! subsystem; it holds actor handles and nothing else, so a plain
//! reader/writer lock is enough. Every table mutation crosses an
//! actor boundary.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use chrono::Utc;
use serde_json::{json, Value};
use tokio::sync::mpsc;
use tokio::time::Duration;
use tracing::{info, warn};

use pokerd_engine::{EngineFactory, HoldemFactory};
use pokerd_shared::traits::{AuditLog, AuditRecord, Connection, Hub, TableRow, TableStore};
use pokerd_shared::wire::{
    new_table_id, ApiRequest, CreateTablePayload, JoinTablePayload, ReplyEnvelope,
    RequestEnvelope,
};
use pokerd_shared::{Error, ErrorCode, Result};
use pokerd_table::{spawn_table_actor, Table, TableHandle, TableNotice};

use crate::rate_limit::{RateLimitConfig, RateLimiter};
use crate::validator;

// ============================================================================
// CONFIGURATION
// ============================================================================

#[derive(Clone)]
pub struct LobbyConfig {
    pub rate_limit: RateLimitConfig,
    /// Deadline applied to every synchronous actor exchange.
    pub command_timeout: Duration,
}

impl Default for LobbyConfig {
    fn default() -> Self {
        Self {
            rate_limit: RateLimitConfig::default(),
            command_timeout: Duration::from_secs(5),
        }
    }
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct LobbyStats {
    pub tables: usize,
    pub players_seated: usize,
    pub observers: usize,
    pub tables_by_status: HashMap<String, usize>,
}

// ============================================================================
// SUPERVISOR
// ============================================================================

pub struct TableSupervisor {
    inner: Arc<Inner>,
}

struct Inner {
    directory: RwLock<HashMap<String, TableHandle>>,
    limiter: RateLimiter,
    factory: Arc<dyn EngineFactory>,
    hub: Arc<dyn Hub>,
    store: Option<Arc<dyn TableStore>>,
    audit: Option<Arc<dyn AuditLog>>,
    config: LobbyConfig,
    notice_tx: mpsc::UnboundedSender<TableNotice>,
}

pub struct SupervisorBuilder {
    config: LobbyConfig,
    factory: Arc<dyn EngineFactory>,
    hub: Arc<dyn Hub>,
    store: Option<Arc<dyn TableStore>>,
    audit: Option<Arc<dyn AuditLog>>,
}

impl SupervisorBuilder {
    pub fn new(hub: Arc<dyn Hub>) -> Self {
        Self {
            config: LobbyConfig::default(),
            factory: Arc::new(HoldemFactory),
            hub,
            store: None,
            audit: None,
        }
    }

    pub fn config(mut self, config: LobbyConfig) -> Self {
        self.config = config;
        self
    }

    pub fn factory(mut self, factory: Arc<dyn EngineFactory>) -> Self {
        self.factory = factory;
        self
    }

    pub fn store(mut self, store: Arc<dyn TableStore>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn audit(mut self, audit: Arc<dyn AuditLog>) -> Self {
        self.audit = Some(audit);
        self
    }

    pub fn build(self) -> TableSupervisor {
        TableSupervisor::new(self)
    }
}

impl TableSupervisor {
    pub fn builder(hub: Arc<dyn Hub>) -> SupervisorBuilder {
        SupervisorBuilder::new(hub)
    }

    fn new(builder: SupervisorBuilder) -> Self {
        let (notice_tx, notice_rx) = mpsc::unbounded_channel();
        let limiter = RateLimiter::spawn(
            builder.config.rate_limit.clone(),
            builder.config.command_timeout,
        );
        let inner = Arc::new(Inner {
            directory: RwLock::new(HashMap::new()),
            limiter,
            factory: builder.factory,
            hub: builder.hub,
            store: builder.store,
            audit: builder.audit,
            config: builder.config,
            notice_tx,
        });
        tokio::spawn(notice_pump(Arc::downgrade(&inner), notice_rx));
        Self { inner }
    }

    // ------------------------------------------------------------------
    // Directory
    // ------------------------------------------------------------------

    fn lookup(&self, table_id: &str) -> Result<TableHandle> {
        self.inner
            .directory
            .read()
            .map_err(|_| Error::new(ErrorCode::Cancelled, "directory lock poisoned"))?
            .get(table_id)
            .cloned()
            .ok_or_else(|| Error::table_not_found(table_id))
    }

    fn handles(&self) -> Vec<TableHandle> {
        self.inner
            .directory
            .read()
            .map(|directory| directory.values().cloned().collect())
            .unwrap_or_default()
    }

    fn remove_handle(&self, table_id: &str) {
        if let Ok(mut directory) = self.inner.directory.write() {
            directory.remove(table_id);
        }
    }

    pub fn table_count(&self) -> usize {
        self.inner.directory.read().map(|d| d.len()).unwrap_or(0)
    }

    // ------------------------------------------------------------------
    // Operations
    // ------------------------------------------------------------------

    /// Creation flow: validator, then rate-limit, then the actor.
    /// Validation failures leave no attempt recorded; `can_create` is
    /// recorded before `record_created`.
    pub async fn create(&self, user_id: &str, payload: &CreateTablePayload) -> Result<Value> {
        validator::validate_user_id(user_id)?;
        let validated = validator::validate_create(payload)?;
        self.inner.limiter.can_create(user_id).await?;

        let table_id = new_table_id();
        let table = Table::new(
            table_id.clone(),
            validated.name,
            user_id.to_string(),
            validated.description,
            validated.tags,
            validated.settings.clone(),
        );
        let view = pokerd_table::table_info(&table, Some(user_id));
        let row = table_row(&table);

        let engine = self
            .inner
            .factory
            .create(validated.settings.small_blind, validated.settings.big_blind);
        let handle = spawn_table_actor(
            table,
            engine,
            self.inner.notice_tx.clone(),
            self.inner.config.command_timeout,
        );

        {
            let mut directory = self
                .inner
                .directory
                .write()
                .map_err(|_| Error::new(ErrorCode::Cancelled, "directory lock poisoned"))?;
            directory.insert(table_id.clone(), handle);
        }

        // Write-through bookkeeping is best-effort; the core never
        // reads it back.
        if let Err(err) = self.inner.limiter.record_created(user_id, &table_id).await {
            warn!(%err, table = %table_id, "created-table record lost");
        }
        if let Some(store) = &self.inner.store {
            if let Err(err) = store.upsert(row).await {
                warn!(%err, table = %table_id, "table row write failed");
            }
        }
        self.audit(user_id, Some(&table_id), "table_create", "ok", None).await;
        info!(table = %table_id, creator = %user_id, "table created");
        Ok(view)
    }

    pub async fn get(&self, table_id: &str, viewer: Option<&str>) -> Result<Value> {
        validator::validate_table_id(table_id)?;
        self.lookup(table_id)?.get_info(viewer).await
    }

    pub async fn get_game_state(&self, table_id: &str, viewer: Option<&str>) -> Result<Value> {
        validator::validate_table_id(table_id)?;
        self.lookup(table_id)?.get_game_state(viewer).await
    }

    /// List tables, applying the validated filter map to each table's
    /// viewer-filtered listing.
    pub async fn list(&self, viewer: Option<&str>, filters: Option<&Value>) -> Result<Vec<Value>> {
        if let Some(filters) = filters {
            validator::validate_filters(filters)?;
        }
        let mut listings = Vec::new();
        for handle in self.handles() {
            match handle.get_info(viewer).await {
                Ok(info) => {
                    if filters.map(|f| listing_matches(&info, f)).unwrap_or(true) {
                        listings.push(info);
                    }
                }
                // A table that died between snapshot and query is
                // simply absent from the listing.
                Err(_) => continue,
            }
        }
        Ok(listings)
    }

    pub async fn join(
        &self,
        user_id: &str,
        username: &str,
        payload: &JoinTablePayload,
    ) -> Result<(Value, String)> {
        validator::validate_user_id(user_id)?;
        validator::validate_username(username)?;
        validator::validate_table_id(&payload.table_id)?;

        let mode = payload.mode.as_str();
        if mode != "player" && mode != "observer" {
            return Err(Error::new(
                ErrorCode::InvalidJoinMode,
                format!("unknown join mode {mode:?}"),
            ));
        }

        let handle = self.lookup(&payload.table_id)?;
        let result = match mode {
            "player" => {
                self.inner.limiter.can_join(user_id, &payload.table_id).await?;
                let view = handle
                    .join_player(user_id, username, payload.position, payload.password.clone())
                    .await?;
                let _ = self
                    .inner
                    .limiter
                    .record_player_joined(user_id, &payload.table_id)
                    .await;
                view
            }
            _ => {
                self.inner
                    .limiter
                    .can_observe(user_id, &payload.table_id)
                    .await?;
                let view = handle
                    .join_observer(user_id, username, payload.password.clone())
                    .await?;
                let _ = self
                    .inner
                    .limiter
                    .record_observer_joined(user_id, &payload.table_id)
                    .await;
                view
            }
        };
        self.audit(user_id, Some(&payload.table_id), "table_join", "ok", None)
            .await;
        Ok((result, handle.room.clone()))
    }

    pub async fn leave(&self, user_id: &str, table_id: &str) -> Result<String> {
        validator::validate_user_id(user_id)?;
        validator::validate_table_id(table_id)?;
        let handle = self.lookup(table_id)?;
        handle.leave(user_id).await?;
        // Membership kind is not echoed back; clearing both sets is
        // idempotent on the rate-limit records.
        let _ = self.inner.limiter.record_player_left(user_id, table_id).await;
        let _ = self
            .inner
            .limiter
            .record_observer_left(user_id, table_id)
            .await;
        self.audit(user_id, Some(table_id), "table_leave", "ok", None).await;
        Ok(handle.room.clone())
    }

    pub async fn set_ready(&self, user_id: &str, table_id: &str, ready: bool) -> Result<()> {
        validator::validate_table_id(table_id)?;
        self.lookup(table_id)?.set_ready(user_id, ready).await
    }

    pub async fn start_game(&self, user_id: &str, table_id: &str) -> Result<()> {
        validator::validate_table_id(table_id)?;
        self.lookup(table_id)?.start_hand(user_id).await
    }

    pub async fn game_action(&self, user_id: &str, table_id: &str, data: Value) -> Result<()> {
        validator::validate_table_id(table_id)?;
        self.lookup(table_id)?.ingest_action(user_id, data).await
    }

    /// Close a table; only its creator may.
    pub async fn close(&self, user_id: &str, table_id: &str) -> Result<()> {
        validator::validate_table_id(table_id)?;
        let handle = self.lookup(table_id)?;
        if handle.creator_id != user_id {
            self.audit(user_id, Some(table_id), "table_close", "denied", None)
                .await;
            return Err(Error::new(
                ErrorCode::NotTableCreator,
                "only the creator may close a table",
            ));
        }
        handle.shutdown().await?;
        self.remove_handle(table_id);
        let _ = self
            .inner
            .limiter
            .record_closed(&handle.creator_id, table_id)
            .await;
        if let Some(store) = &self.inner.store {
            if let Err(err) = store.delete(table_id).await {
                warn!(%err, table = %table_id, "table row delete failed");
            }
        }
        self.audit(user_id, Some(table_id), "table_close", "ok", None).await;
        info!(table = %table_id, "table closed");
        Ok(())
    }

    /// Shut down every table actor and clear the directory.
    pub async fn stop(&self) -> Result<()> {
        let handles: Vec<TableHandle> = {
            let mut directory = self
                .inner
                .directory
                .write()
                .map_err(|_| Error::new(ErrorCode::Cancelled, "directory lock poisoned"))?;
            directory.drain().map(|(_, handle)| handle).collect()
        };
        for handle in handles {
            let _ = handle.shutdown().await;
        }
        info!("supervisor stopped");
        Ok(())
    }

    pub async fn stats(&self) -> Result<LobbyStats> {
        let mut stats = LobbyStats {
            tables: 0,
            players_seated: 0,
            observers: 0,
            tables_by_status: HashMap::new(),
        };
        for handle in self.handles() {
            let Ok(info) = handle.get_info(None).await else {
                continue;
            };
            stats.tables += 1;
            stats.players_seated += info["player_count"].as_u64().unwrap_or(0) as usize;
            stats.observers += info["observer_count"].as_u64().unwrap_or(0) as usize;
            if let Some(status) = info["status"].as_str() {
                *stats.tables_by_status.entry(status.to_string()).or_insert(0) += 1;
            }
        }
        Ok(stats)
    }

    async fn audit(
        &self,
        user_id: &str,
        table_id: Option<&str>,
        action: &str,
        result: &str,
        details: Option<Value>,
    ) {
        if let Some(audit) = &self.inner.audit {
            let record = AuditRecord {
                at: Utc::now(),
                user_id: user_id.to_string(),
                table_id: table_id.map(str::to_string),
                action: action.to_string(),
                result: result.to_string(),
                details,
            };
            if let Err(err) = audit.record(record).await {
                warn!(%err, "audit sink rejected a record");
            }
        }
    }

    // ------------------------------------------------------------------
    // Dispatch bridge
    // ------------------------------------------------------------------

    /// Parse, route and answer one request envelope on behalf of a
    /// connection. Join/leave replies also move the connection in and
    /// out of the table's room.
    pub async fn handle_request(
        &self,
        conn: &dyn Connection,
        envelope: &RequestEnvelope,
    ) -> ReplyEnvelope {
        match self.dispatch(conn, envelope).await {
            Ok((data, room)) => match room {
                Some(room) => ReplyEnvelope::ok_in_room(envelope, data, room),
                None => ReplyEnvelope::ok(envelope, data),
            },
            Err(err) => ReplyEnvelope::fail(envelope, &err),
        }
    }

    async fn dispatch(
        &self,
        conn: &dyn Connection,
        envelope: &RequestEnvelope,
    ) -> Result<(Option<Value>, Option<String>)> {
        let user_id = conn.user_id().to_string();
        let request = envelope.parse()?;
        match request {
            ApiRequest::Create(payload) => {
                let view = self.create(&user_id, &payload).await?;
                Ok((Some(view), None))
            }
            ApiRequest::Join(payload) => {
                let (view, room) = self.join(&user_id, conn.username(), &payload).await?;
                conn.join_room(&room).await?;
                Ok((Some(view), Some(room)))
            }
            ApiRequest::Leave(payload) => {
                let room = self.leave(&user_id, &payload.table_id).await?;
                conn.leave_room(&room).await?;
                Ok((None, None))
            }
            ApiRequest::List(payload) => {
                let listings = self.list(Some(&user_id), payload.filters.as_ref()).await?;
                Ok((Some(json!({ "tables": listings })), None))
            }
            ApiRequest::Get(payload) => {
                let view = self.get(&payload.table_id, Some(&user_id)).await?;
                Ok((Some(view), None))
            }
            ApiRequest::Close(payload) => {
                self.close(&user_id, &payload.table_id).await?;
                Ok((None, None))
            }
            ApiRequest::SetReady(payload) => {
                self.set_ready(&user_id, &payload.table_id, payload.ready).await?;
                Ok((None, None))
            }
            ApiRequest::StartGame(payload) => {
                self.start_game(&user_id, &payload.table_id).await?;
                Ok((None, None))
            }
            ApiRequest::GameAction(payload) => {
                self.game_action(&user_id, &payload.table_id, payload.action)
                    .await?;
                Ok((None, None))
            }
            ApiRequest::GetStats => {
                let stats = self.stats().await?;
                let limiter = self.inner.limiter.stats().await?;
                Ok((
                    Some(json!({ "lobby": stats, "rate_limits": limiter })),
                    None,
                ))
            }
        }
    }
}

// ============================================================================
// EVENT PUMP
// ============================================================================

/// Forward actor notices to the hub and keep the directory honest.
/// Holds only a weak reference so dropping the supervisor stops the
/// pump.
async fn notice_pump(
    inner: std::sync::Weak<Inner>,
    mut notice_rx: mpsc::UnboundedReceiver<TableNotice>,
) {
    while let Some(notice) = notice_rx.recv().await {
        let Some(inner) = inner.upgrade() else { break };
        match notice {
            TableNotice::Broadcast { room, event } => {
                let message = match serde_json::to_value(&event) {
                    Ok(message) => message,
                    Err(err) => {
                        warn!(%err, "unencodable event dropped");
                        continue;
                    }
                };
                if let Err(err) = inner.hub.broadcast_to_room(&room, message).await {
                    warn!(%err, room = %room, "broadcast failed");
                }
            }
            TableNotice::Empty { table_id } => {
                // Last participant left: shut the actor down and close
                // out the bookkeeping.
                let handle = inner
                    .directory
                    .write()
                    .ok()
                    .and_then(|mut directory| directory.remove(&table_id));
                if let Some(handle) = handle {
                    info!(table = %table_id, "closing empty table");
                    let _ = handle.shutdown().await;
                    let _ = inner
                        .limiter
                        .record_closed(&handle.creator_id, &table_id)
                        .await;
                    if let Some(store) = &inner.store {
                        let _ = store.delete(&table_id).await;
                    }
                }
            }
            TableNotice::Terminated { table_id } => {
                // Worker exit (shutdown or panic): prune the handle if
                // it is still registered.
                if let Ok(mut directory) = inner.directory.write() {
                    directory.remove(&table_id);
                }
            }
        }
    }
}

// ============================================================================
// HELPERS
// ============================================================================

fn table_row(table: &Table) -> TableRow {
    TableRow {
        id: table.id.clone(),
        name: table.name.clone(),
        variant: table.variant.as_str().to_string(),
        status: table.status.as_str().to_string(),
        creator_id: table.creator_id.clone(),
        min_players: pokerd_table::MIN_PLAYERS,
        max_players: table.settings.max_players,
        settings: serde_json::to_value(pokerd_table::participant_view(table).settings)
            .unwrap_or_default(),
        room_id: table.room(),
        created_at: table.created_at,
        updated_at: table.updated_at,
    }
}

/// Match one listing against a validated filter map.
fn listing_matches(info: &Value, filters: &Value) -> bool {
    let Some(filters) = filters.as_object() else {
        return true;
    };
    for (key, want) in filters {
        let ok = match key.as_str() {
            "game_type" => info["variant"] == *want,
            "status" => info["status"] == *want,
            "has_space" => info["has_space"] == *want,
            "created_by" => info["creator_id"] == *want,
            "max_players" => info["capacity"] == *want,
            "min_buy_in" => match (info["buy_in"].as_u64(), want.as_u64()) {
                (Some(buy_in), Some(min)) => buy_in >= min,
                _ => false,
            },
            "max_buy_in" => match (info["buy_in"].as_u64(), want.as_u64()) {
                (Some(buy_in), Some(max)) => buy_in <= max,
                _ => false,
            },
            "tags" => match (info["tags"].as_array(), want.as_array()) {
                (Some(have), Some(want)) => want.iter().all(|t| have.contains(t)),
                _ => false,
            },
            _ => true,
        };
        if !ok {
            return false;
        }
    }
    true
}
