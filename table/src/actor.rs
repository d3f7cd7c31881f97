//! The table actor: a single worker owning one table and its engine.
//!
//! All mutation happens on the worker; callers talk to it through a
//! bounded command channel and receive replies on per-command oneshot
//! channels, bounded by their own deadline. Command handling itself is
//! synchronous, which keeps replies and event emission panic-safe
//! behind one `catch_unwind`.

use std::panic::{catch_unwind, AssertUnwindSafe};

use serde_json::Value;
use tokio::sync::{mpsc, oneshot};
use tokio::time::{sleep_until, Duration, Instant};
use tracing::{error, info, warn};

use pokerd_engine::{GameEngine, HandRound, SeatedPlayer};
use pokerd_shared::wire::Event;
use pokerd_shared::{Error, ErrorCode, Result};

use crate::filter;
use crate::settings::MIN_PLAYERS;
use crate::table::{Table, TableStatus};

/// Command channel depth per table.
pub const COMMAND_BUFFER: usize = 128;

// ============================================================================
// COMMANDS AND NOTICES
// ============================================================================

/// Commands map 1:1 to the public table API.
pub enum TableCommand {
    JoinPlayer {
        user_id: String,
        username: String,
        /// External 1-based position; zero or negative auto-assigns.
        position: i64,
        password: Option<String>,
        reply: oneshot::Sender<Result<Value>>,
    },
    JoinObserver {
        user_id: String,
        username: String,
        password: Option<String>,
        reply: oneshot::Sender<Result<Value>>,
    },
    Leave {
        user_id: String,
        reply: oneshot::Sender<Result<()>>,
    },
    SetReady {
        user_id: String,
        ready: bool,
        reply: oneshot::Sender<Result<()>>,
    },
    GetInfo {
        viewer: Option<String>,
        reply: oneshot::Sender<Result<Value>>,
    },
    GetGameState {
        viewer: Option<String>,
        reply: oneshot::Sender<Result<Value>>,
    },
    StartHand {
        user_id: String,
        reply: oneshot::Sender<Result<()>>,
    },
    IngestAction {
        user_id: String,
        data: Value,
        reply: oneshot::Sender<Result<()>>,
    },
    Shutdown {
        reply: oneshot::Sender<()>,
    },
}

/// Out-of-band notices from the worker to its supervisor.
#[derive(Debug)]
pub enum TableNotice {
    /// Broadcast this event to the table's room.
    Broadcast { room: String, event: Event },
    /// The last participant left; the table should be closed.
    Empty { table_id: String },
    /// The worker exited (shutdown or panic).
    Terminated { table_id: String },
}

// ============================================================================
// HANDLE
// ============================================================================

/// Cloneable handle to a table actor.
#[derive(Clone)]
pub struct TableHandle {
    pub table_id: String,
    pub creator_id: String,
    pub room: String,
    tx: mpsc::Sender<TableCommand>,
    command_timeout: Duration,
}

impl TableHandle {
    /// Enqueue a command and await its reply under the handle's
    /// deadline. A deadline that fires before the enqueue leaves no
    /// side effect; one that fires after it still lets the command
    /// execute, only the reply is abandoned.
    async fn request<T>(
        &self,
        build: impl FnOnce(oneshot::Sender<Result<T>>) -> TableCommand,
    ) -> Result<T> {
        let (reply_tx, reply_rx) = oneshot::channel();
        let command = build(reply_tx);
        tokio::time::timeout(self.command_timeout, async {
            self.tx
                .send(command)
                .await
                .map_err(|_| Error::table_not_found(&self.table_id))?;
            reply_rx
                .await
                .map_err(|_| Error::table_not_found(&self.table_id))?
        })
        .await
        .map_err(|_| Error::cancelled())?
    }

    pub async fn join_player(
        &self,
        user_id: &str,
        username: &str,
        position: i64,
        password: Option<String>,
    ) -> Result<Value> {
        let (user_id, username) = (user_id.to_string(), username.to_string());
        self.request(move |reply| TableCommand::JoinPlayer {
            user_id,
            username,
            position,
            password,
            reply,
        })
        .await
    }

    pub async fn join_observer(
        &self,
        user_id: &str,
        username: &str,
        password: Option<String>,
    ) -> Result<Value> {
        let (user_id, username) = (user_id.to_string(), username.to_string());
        self.request(move |reply| TableCommand::JoinObserver {
            user_id,
            username,
            password,
            reply,
        })
        .await
    }

    pub async fn leave(&self, user_id: &str) -> Result<()> {
        let user_id = user_id.to_string();
        self.request(move |reply| TableCommand::Leave { user_id, reply })
            .await
    }

    pub async fn set_ready(&self, user_id: &str, ready: bool) -> Result<()> {
        let user_id = user_id.to_string();
        self.request(move |reply| TableCommand::SetReady {
            user_id,
            ready,
            reply,
        })
        .await
    }

    pub async fn get_info(&self, viewer: Option<&str>) -> Result<Value> {
        let viewer = viewer.map(str::to_string);
        self.request(move |reply| TableCommand::GetInfo { viewer, reply })
            .await
    }

    pub async fn get_game_state(&self, viewer: Option<&str>) -> Result<Value> {
        let viewer = viewer.map(str::to_string);
        self.request(move |reply| TableCommand::GetGameState { viewer, reply })
            .await
    }

    pub async fn start_hand(&self, user_id: &str) -> Result<()> {
        let user_id = user_id.to_string();
        self.request(move |reply| TableCommand::StartHand { user_id, reply })
            .await
    }

    pub async fn ingest_action(&self, user_id: &str, data: Value) -> Result<()> {
        let user_id = user_id.to_string();
        self.request(move |reply| TableCommand::IngestAction {
            user_id,
            data,
            reply,
        })
        .await
    }

    /// Idempotent: a table that is already gone counts as shut down.
    pub async fn shutdown(&self) -> Result<()> {
        let (reply_tx, reply_rx) = oneshot::channel();
        let sent = tokio::time::timeout(
            self.command_timeout,
            self.tx.send(TableCommand::Shutdown { reply: reply_tx }),
        )
        .await;
        match sent {
            Err(_) => Err(Error::cancelled()),
            Ok(Err(_)) => Ok(()),
            Ok(Ok(())) => {
                let _ = tokio::time::timeout(self.command_timeout, reply_rx).await;
                Ok(())
            }
        }
    }
}

// ============================================================================
// WORKER
// ============================================================================

/// Spawn the worker for a table and return its handle.
pub fn spawn_table_actor(
    table: Table,
    engine: Box<dyn GameEngine>,
    notices: mpsc::UnboundedSender<TableNotice>,
    command_timeout: Duration,
) -> TableHandle {
    let (tx, rx) = mpsc::channel(COMMAND_BUFFER);
    let handle = TableHandle {
        table_id: table.id.clone(),
        creator_id: table.creator_id.clone(),
        room: table.room(),
        tx,
        command_timeout,
    };

    let worker = TableWorker {
        table,
        engine,
        notices,
        turn_deadline: None,
    };
    tokio::spawn(worker.run(rx));
    handle
}

struct TableWorker {
    table: Table,
    engine: Box<dyn GameEngine>,
    notices: mpsc::UnboundedSender<TableNotice>,
    /// Armed while a hand is running and the turn timer is non-zero.
    turn_deadline: Option<(String, Instant)>,
}

enum Flow {
    Continue,
    Stop,
}

impl TableWorker {
    async fn run(mut self, mut rx: mpsc::Receiver<TableCommand>) {
        let table_id = self.table.id.clone();
        info!(table = %table_id, "table actor started");

        loop {
            let armed = self.turn_deadline.as_ref().map(|(_, deadline)| *deadline);
            let command = match armed {
                Some(deadline) => tokio::select! {
                    command = rx.recv() => command,
                    _ = sleep_until(deadline) => {
                        self.on_turn_timeout();
                        continue;
                    }
                },
                None => rx.recv().await,
            };
            let Some(command) = command else { break };

            match catch_unwind(AssertUnwindSafe(|| self.handle(command))) {
                Ok(Flow::Continue) => self.rearm_turn_timer(),
                Ok(Flow::Stop) => break,
                Err(_) => {
                    // A panic aborts the hand and closes the table; the
                    // directory entry is pruned by the supervisor.
                    error!(table = %table_id, "table worker panicked, closing table");
                    self.table.status = TableStatus::Closed;
                    self.notify(Event::TableClosed {
                        table_id: table_id.clone(),
                    });
                    break;
                }
            }
        }

        rx.close();
        let _ = self
            .notices
            .send(TableNotice::Terminated { table_id });
    }

    fn notify(&self, event: Event) {
        let _ = self.notices.send(TableNotice::Broadcast {
            room: self.table.room(),
            event,
        });
    }

    fn broadcast_all(&self, events: Vec<Event>) {
        for event in events {
            self.notify(event);
        }
    }

    // ------------------------------------------------------------------
    // Turn timer
    // ------------------------------------------------------------------

    fn rearm_turn_timer(&mut self) {
        let limit = self.table.settings.turn_time_limit_secs;
        if limit == 0 || !self.engine.in_progress() {
            self.turn_deadline = None;
            return;
        }
        match self.engine.current_actor() {
            None => self.turn_deadline = None,
            Some(actor) => {
                let stale = !matches!(&self.turn_deadline, Some((held, _)) if *held == actor);
                if stale {
                    self.turn_deadline =
                        Some((actor, Instant::now() + Duration::from_secs(limit)));
                }
            }
        }
    }

    fn on_turn_timeout(&mut self) {
        let Some((actor, _)) = self.turn_deadline.take() else {
            return;
        };
        warn!(table = %self.table.id, player = %actor, "turn timer expired, folding");
        match self.engine.fold_player(&actor, true) {
            Ok(events) => {
                self.broadcast_all(events);
                self.settle_if_finished();
            }
            Err(err) => warn!(table = %self.table.id, %err, "timeout fold failed"),
        }
        self.rearm_turn_timer();
    }

    // ------------------------------------------------------------------
    // Command handling
    // ------------------------------------------------------------------

    fn handle(&mut self, command: TableCommand) -> Flow {
        match command {
            TableCommand::JoinPlayer {
                user_id,
                username,
                position,
                password,
                reply,
            } => {
                let result = self.join_player(&user_id, &username, position, password);
                let _ = reply.send(result);
            }
            TableCommand::JoinObserver {
                user_id,
                username,
                password,
                reply,
            } => {
                let result = self.join_observer(&user_id, &username, password);
                let _ = reply.send(result);
            }
            TableCommand::Leave { user_id, reply } => {
                let _ = reply.send(self.leave(&user_id));
            }
            TableCommand::SetReady {
                user_id,
                ready,
                reply,
            } => {
                let result = self.table.set_ready(&user_id, ready).map(|()| {
                    self.notify(Event::PlayerReadyChanged {
                        table_id: self.table.id.clone(),
                        user_id,
                        ready,
                    });
                });
                let _ = reply.send(result);
            }
            TableCommand::GetInfo { viewer, reply } => {
                let view = filter::table_info(&self.table, viewer.as_deref());
                let _ = reply.send(Ok(view));
            }
            TableCommand::GetGameState { viewer, reply } => {
                let snapshot = self.engine.in_progress().then(|| self.engine.snapshot());
                let view =
                    filter::game_state(&self.table, snapshot.as_ref(), viewer.as_deref());
                let _ = reply.send(Ok(view));
            }
            TableCommand::StartHand { user_id, reply } => {
                let _ = reply.send(self.start_hand(&user_id));
            }
            TableCommand::IngestAction {
                user_id,
                data,
                reply,
            } => {
                let result = self.engine.apply_action(&user_id, &data).map(|events| {
                    self.broadcast_all(events);
                    self.settle_if_finished();
                });
                let _ = reply.send(result);
            }
            TableCommand::Shutdown { reply } => {
                if self.table.status != TableStatus::Closed {
                    self.table.status = TableStatus::Closed;
                    self.notify(Event::TableClosed {
                        table_id: self.table.id.clone(),
                    });
                }
                let _ = reply.send(());
                return Flow::Stop;
            }
        }
        Flow::Continue
    }

    fn check_password(&self, password: Option<&str>) -> Result<()> {
        if !self.table.settings.private {
            return Ok(());
        }
        match password {
            Some(candidate) if self.table.settings.password_matches(candidate) => Ok(()),
            _ => Err(Error::new(ErrorCode::InvalidPassword, "wrong table password")),
        }
    }

    fn join_player(
        &mut self,
        user_id: &str,
        username: &str,
        position: i64,
        password: Option<String>,
    ) -> Result<Value> {
        self.check_password(password.as_deref())?;
        let seat = self.table.seat_player(user_id, username, position)?;
        info!(table = %self.table.id, user = %user_id, seat, "player joined");
        self.notify(Event::PlayerJoined {
            table_id: self.table.id.clone(),
            user_id: user_id.to_string(),
            username: username.to_string(),
            position: Some(seat),
        });
        self.maybe_auto_start();
        Ok(filter::table_info(&self.table, Some(user_id)))
    }

    fn join_observer(
        &mut self,
        user_id: &str,
        username: &str,
        password: Option<String>,
    ) -> Result<Value> {
        self.check_password(password.as_deref())?;
        self.table.add_observer(user_id, username)?;
        info!(table = %self.table.id, user = %user_id, "observer joined");
        self.notify(Event::PlayerJoined {
            table_id: self.table.id.clone(),
            user_id: user_id.to_string(),
            username: username.to_string(),
            position: None,
        });
        Ok(filter::table_info(&self.table, Some(user_id)))
    }

    fn leave(&mut self, user_id: &str) -> Result<()> {
        // A seated player leaving mid-hand folds first; the hand never
        // aborts on a departure.
        if self.table.is_seated(user_id) && self.engine.in_progress() {
            match self.engine.fold_player(user_id, false) {
                Ok(events) => {
                    self.broadcast_all(events);
                    self.settle_if_finished();
                }
                // Not part of the running hand (busted or sat out).
                Err(_) => {}
            }
        }

        self.table.remove_user(user_id)?;
        info!(table = %self.table.id, user = %user_id, "left table");
        self.notify(Event::PlayerLeft {
            table_id: self.table.id.clone(),
            user_id: user_id.to_string(),
        });

        if self.table.player_count() == 0 && self.table.observer_count() == 0 {
            let _ = self.notices.send(TableNotice::Empty {
                table_id: self.table.id.clone(),
            });
        }
        Ok(())
    }

    fn seated_players(&self) -> Vec<SeatedPlayer> {
        self.table
            .seats
            .iter()
            .filter_map(|seat| {
                seat.occupant.as_ref().map(|o| SeatedPlayer {
                    user_id: o.user_id.clone(),
                    username: o.username.clone(),
                    seat: seat.position,
                    chips: o.chips,
                })
            })
            .filter(|p| !p.chips.is_zero())
            .collect()
    }

    fn start_hand(&mut self, user_id: &str) -> Result<()> {
        if !self.table.is_seated(user_id) {
            return Err(Error::new(
                ErrorCode::PlayerNotAtTable,
                "only seated players may start a hand",
            ));
        }
        if !matches!(self.table.status, TableStatus::Waiting | TableStatus::Active) {
            return Err(Error::new(
                ErrorCode::GameNotInProgress,
                format!("table is {}", self.table.status.as_str()),
            ));
        }
        self.begin_hand()
    }

    fn maybe_auto_start(&mut self) {
        if !self.table.settings.auto_start
            || self.table.status != TableStatus::Waiting
            || (self.table.player_count() as u8) < MIN_PLAYERS
        {
            return;
        }
        if let Err(err) = self.begin_hand() {
            warn!(table = %self.table.id, %err, "auto-start declined");
        }
    }

    fn begin_hand(&mut self) -> Result<()> {
        let events = self.engine.start_hand(self.seated_players())?;
        if self.table.status == TableStatus::Waiting {
            self.table.transition(TableStatus::Active)?;
            self.notify(Event::GameStarted {
                table_id: self.table.id.clone(),
            });
        }
        info!(table = %self.table.id, "hand started");
        self.broadcast_all(events);
        Ok(())
    }

    /// When a hand finishes, settle engine stacks back into the seats
    /// and announce the result.
    fn settle_if_finished(&mut self) {
        let snapshot = self.engine.snapshot();
        if snapshot.round != HandRound::Finished {
            return;
        }
        for player in &snapshot.players {
            if let Some(seat) = self
                .table
                .seats
                .iter_mut()
                .find(|s| s.occupant.as_ref().is_some_and(|o| o.user_id == player.user_id))
            {
                if let Some(occupant) = seat.occupant.as_mut() {
                    occupant.chips = player.chips;
                }
            }
        }
        self.notify(Event::GameFinished {
            table_id: self.table.id.clone(),
            winners: snapshot.winners.clone(),
        });
    }
}
