//! Per-user rate limiting behind a single-worker actor.
//!
//! The worker is the only code that touches user records; everything
//! else enqueues commands on a bounded channel and waits on a oneshot
//! reply. Sliding windows keep only timestamps inside the window, and
//! an hourly sweep evicts users with no live relationships.

use std::collections::{HashMap, HashSet};

use tokio::sync::{mpsc, oneshot};
use tokio::time::{interval, Duration, Instant};
use tracing::{debug, info};

use pokerd_shared::{Error, ErrorCode, Result};

/// Command channel depth.
pub const COMMAND_BUFFER: usize = 1024;

// ============================================================================
// POLICY
// ============================================================================

/// Limits, fixed at construction.
#[derive(Debug, Clone)]
pub struct RateLimitConfig {
    /// Concurrently open tables created by one user.
    pub max_created_tables: usize,
    /// Create attempts inside `create_window`.
    pub max_creates_per_window: usize,
    pub create_window: Duration,
    /// Join attempts inside `join_window`.
    pub max_joins_per_window: usize,
    pub join_window: Duration,
    /// Concurrently observed tables.
    pub max_observed_tables: usize,
    /// Idle records older than this are evicted.
    pub idle_ttl: Duration,
    pub cleanup_interval: Duration,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            max_created_tables: 10,
            max_creates_per_window: 5,
            create_window: Duration::from_secs(5 * 60),
            max_joins_per_window: 10,
            join_window: Duration::from_secs(60),
            max_observed_tables: 20,
            idle_ttl: Duration::from_secs(24 * 60 * 60),
            cleanup_interval: Duration::from_secs(60 * 60),
        }
    }
}

// ============================================================================
// STATE
// ============================================================================

#[derive(Debug, Default)]
struct UserRecord {
    created_tables: Vec<String>,
    create_attempts: Vec<Instant>,
    join_attempts: Vec<Instant>,
    observed_tables: HashSet<String>,
    seated_tables: HashSet<String>,
    last_activity: Option<Instant>,
}

impl UserRecord {
    fn has_relationships(&self) -> bool {
        !self.created_tables.is_empty()
            || !self.observed_tables.is_empty()
            || !self.seated_tables.is_empty()
    }
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct RateLimitStats {
    pub tracked_users: usize,
    pub created_tables: usize,
    pub seated_memberships: usize,
    pub observed_memberships: usize,
}

// ============================================================================
// COMMANDS
// ============================================================================

pub enum RateLimitCommand {
    CanCreate {
        user_id: String,
        reply: oneshot::Sender<Result<()>>,
    },
    CanJoin {
        user_id: String,
        table_id: String,
        reply: oneshot::Sender<Result<()>>,
    },
    CanObserve {
        user_id: String,
        table_id: String,
        reply: oneshot::Sender<Result<()>>,
    },
    RecordCreated { user_id: String, table_id: String },
    RecordClosed { user_id: String, table_id: String },
    RecordPlayerJoined { user_id: String, table_id: String },
    RecordPlayerLeft { user_id: String, table_id: String },
    RecordObserverJoined { user_id: String, table_id: String },
    RecordObserverLeft { user_id: String, table_id: String },
    GetStats {
        reply: oneshot::Sender<RateLimitStats>,
    },
    Cleanup,
}

// ============================================================================
// HANDLE
// ============================================================================

/// Cloneable handle to the rate-limit worker.
#[derive(Clone)]
pub struct RateLimiter {
    tx: mpsc::Sender<RateLimitCommand>,
    command_timeout: Duration,
}

impl RateLimiter {
    pub fn spawn(config: RateLimitConfig, command_timeout: Duration) -> Self {
        let (tx, rx) = mpsc::channel(COMMAND_BUFFER);
        tokio::spawn(RateLimitWorker::new(config).run(rx));
        Self {
            tx,
            command_timeout,
        }
    }

    async fn ask(
        &self,
        build: impl FnOnce(oneshot::Sender<Result<()>>) -> RateLimitCommand,
    ) -> Result<()> {
        let (reply_tx, reply_rx) = oneshot::channel();
        tokio::time::timeout(self.command_timeout, async {
            self.tx
                .send(build(reply_tx))
                .await
                .map_err(|_| Error::cancelled())?;
            reply_rx.await.map_err(|_| Error::cancelled())?
        })
        .await
        .map_err(|_| Error::cancelled())?
    }

    async fn tell(&self, command: RateLimitCommand) -> Result<()> {
        tokio::time::timeout(self.command_timeout, self.tx.send(command))
            .await
            .map_err(|_| Error::cancelled())?
            .map_err(|_| Error::cancelled())
    }

    pub async fn can_create(&self, user_id: &str) -> Result<()> {
        let user_id = user_id.to_string();
        self.ask(move |reply| RateLimitCommand::CanCreate { user_id, reply })
            .await
    }

    pub async fn can_join(&self, user_id: &str, table_id: &str) -> Result<()> {
        let (user_id, table_id) = (user_id.to_string(), table_id.to_string());
        self.ask(move |reply| RateLimitCommand::CanJoin {
            user_id,
            table_id,
            reply,
        })
        .await
    }

    pub async fn can_observe(&self, user_id: &str, table_id: &str) -> Result<()> {
        let (user_id, table_id) = (user_id.to_string(), table_id.to_string());
        self.ask(move |reply| RateLimitCommand::CanObserve {
            user_id,
            table_id,
            reply,
        })
        .await
    }

    pub async fn record_created(&self, user_id: &str, table_id: &str) -> Result<()> {
        self.tell(RateLimitCommand::RecordCreated {
            user_id: user_id.to_string(),
            table_id: table_id.to_string(),
        })
        .await
    }

    pub async fn record_closed(&self, user_id: &str, table_id: &str) -> Result<()> {
        self.tell(RateLimitCommand::RecordClosed {
            user_id: user_id.to_string(),
            table_id: table_id.to_string(),
        })
        .await
    }

    pub async fn record_player_joined(&self, user_id: &str, table_id: &str) -> Result<()> {
        self.tell(RateLimitCommand::RecordPlayerJoined {
            user_id: user_id.to_string(),
            table_id: table_id.to_string(),
        })
        .await
    }

    pub async fn record_player_left(&self, user_id: &str, table_id: &str) -> Result<()> {
        self.tell(RateLimitCommand::RecordPlayerLeft {
            user_id: user_id.to_string(),
            table_id: table_id.to_string(),
        })
        .await
    }

    pub async fn record_observer_joined(&self, user_id: &str, table_id: &str) -> Result<()> {
        self.tell(RateLimitCommand::RecordObserverJoined {
            user_id: user_id.to_string(),
            table_id: table_id.to_string(),
        })
        .await
    }

    pub async fn record_observer_left(&self, user_id: &str, table_id: &str) -> Result<()> {
        self.tell(RateLimitCommand::RecordObserverLeft {
            user_id: user_id.to_string(),
            table_id: table_id.to_string(),
        })
        .await
    }

    pub async fn stats(&self) -> Result<RateLimitStats> {
        let (reply_tx, reply_rx) = oneshot::channel();
        tokio::time::timeout(self.command_timeout, async {
            self.tx
                .send(RateLimitCommand::GetStats { reply: reply_tx })
                .await
                .map_err(|_| Error::cancelled())?;
            reply_rx.await.map_err(|_| Error::cancelled())
        })
        .await
        .map_err(|_| Error::cancelled())?
    }

    /// Force a cleanup pass; the worker also runs one on its ticker.
    pub async fn cleanup(&self) -> Result<()> {
        self.tell(RateLimitCommand::Cleanup).await
    }
}

// ============================================================================
// WORKER
// ============================================================================

struct RateLimitWorker {
    config: RateLimitConfig,
    users: HashMap<String, UserRecord>,
}

impl RateLimitWorker {
    fn new(config: RateLimitConfig) -> Self {
        Self {
            config,
            users: HashMap::new(),
        }
    }

    async fn run(mut self, mut rx: mpsc::Receiver<RateLimitCommand>) {
        info!("rate limiter started");
        let mut ticker = interval(self.config.cleanup_interval);
        // The first tick completes immediately; consume it.
        ticker.tick().await;

        loop {
            tokio::select! {
                command = rx.recv() => match command {
                    Some(command) => self.handle(command),
                    None => break,
                },
                _ = ticker.tick() => self.cleanup(),
            }
        }
    }

    fn handle(&mut self, command: RateLimitCommand) {
        match command {
            RateLimitCommand::CanCreate { user_id, reply } => {
                let _ = reply.send(self.can_create(&user_id));
            }
            RateLimitCommand::CanJoin { user_id, reply, .. } => {
                let _ = reply.send(self.can_join(&user_id));
            }
            RateLimitCommand::CanObserve { user_id, reply, .. } => {
                let _ = reply.send(self.can_observe(&user_id));
            }
            RateLimitCommand::RecordCreated { user_id, table_id } => {
                let record = self.touch(&user_id);
                if !record.created_tables.contains(&table_id) {
                    record.created_tables.push(table_id);
                }
            }
            RateLimitCommand::RecordClosed { user_id, table_id } => {
                let record = self.touch(&user_id);
                record.created_tables.retain(|t| *t != table_id);
            }
            RateLimitCommand::RecordPlayerJoined { user_id, table_id } => {
                self.touch(&user_id).seated_tables.insert(table_id);
            }
            RateLimitCommand::RecordPlayerLeft { user_id, table_id } => {
                self.touch(&user_id).seated_tables.remove(&table_id);
            }
            RateLimitCommand::RecordObserverJoined { user_id, table_id } => {
                self.touch(&user_id).observed_tables.insert(table_id);
            }
            RateLimitCommand::RecordObserverLeft { user_id, table_id } => {
                self.touch(&user_id).observed_tables.remove(&table_id);
            }
            RateLimitCommand::GetStats { reply } => {
                let _ = reply.send(self.stats());
            }
            RateLimitCommand::Cleanup => self.cleanup(),
        }
    }

    fn touch(&mut self, user_id: &str) -> &mut UserRecord {
        let record = self.users.entry(user_id.to_string()).or_default();
        record.last_activity = Some(Instant::now());
        record
    }

    /// Drop timestamps that slipped out of the window.
    fn prune_window(log: &mut Vec<Instant>, window: Duration, now: Instant) {
        log.retain(|at| now.duration_since(*at) < window);
    }

    fn can_create(&mut self, user_id: &str) -> Result<()> {
        let (max_tables, max_attempts, window) = (
            self.config.max_created_tables,
            self.config.max_creates_per_window,
            self.config.create_window,
        );
        let now = Instant::now();
        let record = self.touch(user_id);
        Self::prune_window(&mut record.create_attempts, window, now);

        if record.created_tables.len() >= max_tables {
            debug!(user = %user_id, "create denied: too many open tables");
            return Err(Error::new(
                ErrorCode::RateLimitExceeded,
                "too many open tables for this user",
            ));
        }
        if record.create_attempts.len() >= max_attempts {
            debug!(user = %user_id, "create denied: attempt window full");
            return Err(Error::new(
                ErrorCode::RateLimitExceeded,
                "too many create attempts, slow down",
            ));
        }
        record.create_attempts.push(now);
        Ok(())
    }

    fn can_join(&mut self, user_id: &str) -> Result<()> {
        let (max_attempts, window) = (
            self.config.max_joins_per_window,
            self.config.join_window,
        );
        let now = Instant::now();
        let record = self.touch(user_id);
        Self::prune_window(&mut record.join_attempts, window, now);

        if record.join_attempts.len() >= max_attempts {
            debug!(user = %user_id, "join denied: attempt window full");
            return Err(Error::new(
                ErrorCode::RateLimitExceeded,
                "too many join attempts, slow down",
            ));
        }
        record.join_attempts.push(now);
        Ok(())
    }

    fn can_observe(&mut self, user_id: &str) -> Result<()> {
        let max_observed = self.config.max_observed_tables;
        // Observing is a join attempt for window purposes.
        self.can_join(user_id)?;
        let record = self.touch(user_id);
        if record.observed_tables.len() >= max_observed {
            return Err(Error::new(
                ErrorCode::RateLimitExceeded,
                "too many tables observed at once",
            ));
        }
        Ok(())
    }

    /// Evict users with no live relationships and a day of silence.
    fn cleanup(&mut self) {
        let (idle_ttl, create_window, join_window) = (
            self.config.idle_ttl,
            self.config.create_window,
            self.config.join_window,
        );
        let now = Instant::now();
        let before = self.users.len();
        self.users.retain(|_, record| {
            Self::prune_window(&mut record.create_attempts, create_window, now);
            Self::prune_window(&mut record.join_attempts, join_window, now);
            let idle = record
                .last_activity
                .map(|at| now.duration_since(at) > idle_ttl)
                .unwrap_or(true);
            record.has_relationships() || !idle
        });
        let evicted = before - self.users.len();
        if evicted > 0 {
            info!(evicted, "rate limiter cleanup evicted idle users");
        }
    }

    fn stats(&self) -> RateLimitStats {
        RateLimitStats {
            tracked_users: self.users.len(),
            created_tables: self.users.values().map(|r| r.created_tables.len()).sum(),
            seated_memberships: self.users.values().map(|r| r.seated_tables.len()).sum(),
            observed_memberships: self.users.values().map(|r| r.observed_tables.len()).sum(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn limiter(config: RateLimitConfig) -> RateLimiter {
        RateLimiter::spawn(config, Duration::from_secs(2))
    }

    /// Three creates allowed, the fourth limited.
    #[tokio::test]
    async fn test_create_attempt_window() {
        let rl = limiter(RateLimitConfig {
            max_creates_per_window: 3,
            ..Default::default()
        });

        for _ in 0..3 {
            rl.can_create("u1").await.unwrap();
        }
        let err = rl.can_create("u1").await.unwrap_err();
        assert_eq!(err.code, ErrorCode::RateLimitExceeded);

        // Another user is unaffected.
        rl.can_create("u2").await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_window_slides() {
        let rl = limiter(RateLimitConfig {
            max_creates_per_window: 2,
            create_window: Duration::from_secs(300),
            ..Default::default()
        });

        rl.can_create("u1").await.unwrap();
        rl.can_create("u1").await.unwrap();
        assert!(rl.can_create("u1").await.is_err());

        // Once the window passes, attempts are allowed again.
        tokio::time::sleep(Duration::from_secs(301)).await;
        rl.can_create("u1").await.unwrap();
    }

    #[tokio::test]
    async fn test_active_table_cap() {
        let rl = limiter(RateLimitConfig {
            max_created_tables: 2,
            max_creates_per_window: 100,
            ..Default::default()
        });

        rl.can_create("u1").await.unwrap();
        rl.record_created("u1", "t1").await.unwrap();
        rl.can_create("u1").await.unwrap();
        rl.record_created("u1", "t2").await.unwrap();

        let err = rl.can_create("u1").await.unwrap_err();
        assert_eq!(err.code, ErrorCode::RateLimitExceeded);

        // Closing a table frees a slot.
        rl.record_closed("u1", "t1").await.unwrap();
        rl.can_create("u1").await.unwrap();
    }

    #[tokio::test]
    async fn test_join_window() {
        let rl = limiter(RateLimitConfig {
            max_joins_per_window: 2,
            ..Default::default()
        });
        rl.can_join("u1", "t1").await.unwrap();
        rl.can_join("u1", "t2").await.unwrap();
        let err = rl.can_join("u1", "t3").await.unwrap_err();
        assert_eq!(err.code, ErrorCode::RateLimitExceeded);
    }

    #[tokio::test]
    async fn test_observe_cap() {
        let rl = limiter(RateLimitConfig {
            max_observed_tables: 2,
            max_joins_per_window: 100,
            ..Default::default()
        });
        rl.can_observe("u1", "t1").await.unwrap();
        rl.record_observer_joined("u1", "t1").await.unwrap();
        rl.can_observe("u1", "t2").await.unwrap();
        rl.record_observer_joined("u1", "t2").await.unwrap();

        let err = rl.can_observe("u1", "t3").await.unwrap_err();
        assert_eq!(err.code, ErrorCode::RateLimitExceeded);

        rl.record_observer_left("u1", "t1").await.unwrap();
        rl.can_observe("u1", "t3").await.unwrap();
    }

    /// The attempt log never grows past the configured maximum.
    #[tokio::test]
    async fn test_attempt_log_is_bounded() {
        let rl = limiter(RateLimitConfig {
            max_creates_per_window: 3,
            ..Default::default()
        });
        for _ in 0..20 {
            let _ = rl.can_create("u1").await;
        }
        let stats = rl.stats().await.unwrap();
        assert_eq!(stats.tracked_users, 1);
        // A fourth allowed attempt would prove the log exceeded the
        // cap; the denial path must not append.
        assert!(rl.can_create("u1").await.is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_cleanup_evicts_idle_users() {
        let rl = limiter(RateLimitConfig {
            idle_ttl: Duration::from_secs(24 * 60 * 60),
            ..Default::default()
        });
        rl.can_join("idle", "t1").await.unwrap();
        rl.can_join("busy", "t1").await.unwrap();
        rl.record_player_joined("busy", "t1").await.unwrap();
        assert_eq!(rl.stats().await.unwrap().tracked_users, 2);

        tokio::time::sleep(Duration::from_secs(25 * 60 * 60)).await;
        rl.cleanup().await.unwrap();

        // The idle user is gone; the seated one survives.
        let stats = rl.stats().await.unwrap();
        assert_eq!(stats.tracked_users, 1);
        assert_eq!(stats.seated_memberships, 1);
    }
}
