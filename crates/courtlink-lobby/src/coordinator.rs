//! Lobby coordinator: an isolated Tokio task that owns one lobby
//! connection end to end.
//!
//! The coordinator runs in its own task and owns the channel, the state
//! store, the heartbeat scheduler, and the reconnection supervisor. The
//! outside world talks to it through [`LobbyHandle`] (commands with
//! reply channels) and listens on a stream of [`LobbyUpdate`]s. No
//! shared mutable state, just message passing.
//!
//! Incoming events — remote publishes and the loopback echoes of our
//! own — go through one code path: decode at the boundary, apply to the
//! store, surface a [`LobbyUpdate`] if anything changed. Malformed
//! messages are logged and dropped; they never tear the session down.

use tokio::sync::{mpsc, oneshot};
use tokio::time::{self, Instant as TokioInstant};

use courtlink_liveness::HeartbeatScheduler;
use courtlink_protocol::{
    CaseRef, ClientId, JsonCodec, LobbyCode, LobbyEvent, Phase, PlayerJoined,
    RoleId, StateSync,
};
use courtlink_state::{LobbySnapshot, LobbyStore, Participant};
use courtlink_transport::{Channel, ChannelMessage, Connector, TransportError};

use crate::{LobbyConfig, LobbyError, ReconnectSupervisor};

/// Milliseconds since the Unix epoch. Wire timestamps are informational;
/// liveness decisions always use the local receipt clock.
fn now_ms() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

// ---------------------------------------------------------------------------
// Updates
// ---------------------------------------------------------------------------

/// State changes pushed to the lobby's consumer (the UI layer).
#[derive(Debug, Clone, PartialEq)]
pub enum LobbyUpdate {
    /// A new participant appeared on the channel.
    ParticipantJoined(Participant),
    /// A participant left deliberately.
    ParticipantLeft {
        participant: Participant,
        freed_role: Option<RoleId>,
    },
    /// A participant went silent past the staleness window.
    ParticipantTimedOut {
        participant: Participant,
        freed_role: Option<RoleId>,
    },
    /// A role was assigned (locally or remotely).
    RoleAssigned { player_id: ClientId, role: RoleId },
    /// The local participant's role claim lost a wire race and was
    /// dropped. It is never re-asserted automatically.
    RoleLost { role: RoleId },
    /// The selected case changed.
    CaseChanged(CaseRef),
    /// The session phase advanced.
    PhaseChanged(Phase),
    /// A leader snapshot changed local state (missed events healed).
    Synced(LobbySnapshot),
    /// The connection dropped; attempt `attempt` of `max_attempts` is
    /// scheduled.
    Reconnecting { attempt: u32, max_attempts: u32 },
    /// Reconnected under a fresh connection id. Any previously held
    /// role is gone.
    Reconnected { new_id: ClientId },
    /// The reconnect budget is spent. The coordinator shuts down after
    /// this; `countdown` is the grace period the UI shows before
    /// abandoning the session.
    ReconnectFailed { countdown: std::time::Duration },
}

// ---------------------------------------------------------------------------
// Commands and handle
// ---------------------------------------------------------------------------

/// Commands sent to the coordinator through its channel.
///
/// The `oneshot::Sender` in each variant is the reply channel — the
/// caller sends a command and waits for the response on it.
enum LobbyCommand {
    ClaimRole {
        role: RoleId,
        reply: oneshot::Sender<Result<(), LobbyError>>,
    },
    SelectCase {
        case: CaseRef,
        reply: oneshot::Sender<Result<(), LobbyError>>,
    },
    StartTrial {
        reply: oneshot::Sender<Result<(), LobbyError>>,
    },
    Snapshot {
        reply: oneshot::Sender<LobbySnapshot>,
    },
    Disconnect {
        reply: oneshot::Sender<()>,
    },
}

/// Handle to a running lobby coordinator.
///
/// Cheap to clone — it's just an `mpsc::Sender` wrapper. When the
/// coordinator is gone (disconnected, or reconnection gave up), every
/// method returns [`LobbyError::NotConnected`].
#[derive(Clone)]
pub struct LobbyHandle {
    sender: mpsc::Sender<LobbyCommand>,
}

impl LobbyHandle {
    /// Claims an exclusive role for the local participant.
    ///
    /// First-claim-wins: if the seat is taken this fails locally and
    /// nothing is broadcast.
    pub async fn claim_role(&self, role: RoleId) -> Result<(), LobbyError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.sender
            .send(LobbyCommand::ClaimRole {
                role,
                reply: reply_tx,
            })
            .await
            .map_err(|_| LobbyError::NotConnected)?;
        reply_rx.await.map_err(|_| LobbyError::NotConnected)?
    }

    /// Selects the case for the session. Leader-only.
    pub async fn select_case(&self, case: CaseRef) -> Result<(), LobbyError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.sender
            .send(LobbyCommand::SelectCase {
                case,
                reply: reply_tx,
            })
            .await
            .map_err(|_| LobbyError::NotConnected)?;
        reply_rx.await.map_err(|_| LobbyError::NotConnected)?
    }

    /// Starts the trial. Leader-only; requires a selected case.
    pub async fn start_trial(&self) -> Result<(), LobbyError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.sender
            .send(LobbyCommand::StartTrial { reply: reply_tx })
            .await
            .map_err(|_| LobbyError::NotConnected)?;
        reply_rx.await.map_err(|_| LobbyError::NotConnected)?
    }

    /// Requests a copy of the current lobby state.
    pub async fn snapshot(&self) -> Result<LobbySnapshot, LobbyError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.sender
            .send(LobbyCommand::Snapshot { reply: reply_tx })
            .await
            .map_err(|_| LobbyError::NotConnected)?;
        reply_rx.await.map_err(|_| LobbyError::NotConnected)
    }

    /// Leaves the lobby: announces `player-left` and tears the
    /// coordinator down. Idempotent — disconnecting twice is fine.
    pub async fn disconnect(&self) -> Result<(), LobbyError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        if self
            .sender
            .send(LobbyCommand::Disconnect { reply: reply_tx })
            .await
            .is_err()
        {
            // Coordinator already gone.
            return Ok(());
        }
        let _ = reply_rx.await;
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Entry point
// ---------------------------------------------------------------------------

/// Namespace for opening lobby connections.
pub struct Lobby;

impl Lobby {
    /// Connects to the lobby channel, announces the local participant,
    /// and spawns the coordinator task.
    ///
    /// Returns the command handle and the update stream. The lobby
    /// creator passes `is_leader = true`; everyone else joins as a
    /// regular participant.
    pub async fn connect<C: Connector>(
        connector: C,
        code: LobbyCode,
        player_name: impl Into<String>,
        is_leader: bool,
        config: LobbyConfig,
    ) -> Result<(LobbyHandle, mpsc::UnboundedReceiver<LobbyUpdate>), LobbyError>
    {
        let player_name = player_name.into();
        let channel = connector.connect(&code.channel_name()).await?;
        let local_id = channel.client_id().clone();
        let now = now_ms();

        let store = LobbyStore::new(
            code.clone(),
            local_id.clone(),
            player_name.clone(),
            is_leader,
            now,
        );

        let (cmd_tx, cmd_rx) = mpsc::channel(32);
        let (update_tx, update_rx) = mpsc::unbounded_channel();

        let actor = LobbyActor {
            connector,
            code,
            player_name,
            channel: Some(channel),
            store,
            codec: JsonCodec::new(),
            heartbeat: HeartbeatScheduler::new(config.liveness.clone()),
            supervisor: ReconnectSupervisor::new(config.reconnect.clone()),
            reconnect_at: None,
            cmd_rx,
            updates: update_tx,
        };

        // Announce before the loop starts so peers learn about us even
        // if the caller never issues a command.
        let join = LobbyEvent::PlayerJoined(actor.store.join_announcement(now));
        actor.publish(&join).await?;

        tracing::info!(code = %actor.code, id = %local_id, "joined lobby");
        tokio::spawn(actor.run());

        Ok((LobbyHandle { sender: cmd_tx }, update_rx))
    }
}

// ---------------------------------------------------------------------------
// Actor
// ---------------------------------------------------------------------------

/// Pends forever while disconnected so the select loop's other branches
/// keep running.
async fn next_channel_message<Ch: Channel>(
    channel: &mut Option<Ch>,
) -> Option<ChannelMessage> {
    match channel {
        Some(ch) => ch.recv().await,
        None => std::future::pending().await,
    }
}

struct LobbyActor<C: Connector> {
    connector: C,
    code: LobbyCode,
    player_name: String,
    /// `None` while a reconnect is pending or after final failure.
    channel: Option<C::Channel>,
    store: LobbyStore,
    codec: JsonCodec,
    heartbeat: HeartbeatScheduler,
    supervisor: ReconnectSupervisor,
    /// When the next reconnect attempt fires. `None` when connected.
    reconnect_at: Option<TokioInstant>,
    cmd_rx: mpsc::Receiver<LobbyCommand>,
    updates: mpsc::UnboundedSender<LobbyUpdate>,
}

impl<C: Connector> LobbyActor<C> {
    async fn run(mut self) {
        loop {
            let reconnect_due = self.reconnect_at;
            // Biased: pending channel traffic drains before the next
            // command, so a caller whose intent succeeded reads its own
            // write on the following snapshot.
            tokio::select! {
                biased;
                msg = next_channel_message(&mut self.channel) => {
                    match msg {
                        Some(msg) => self.apply_message(msg).await,
                        None => self.on_connection_lost(),
                    }
                }
                _ = self.heartbeat.wait_for_beat() => {
                    self.on_beat().await;
                }
                _ = async move {
                    match reconnect_due {
                        Some(at) => time::sleep_until(at).await,
                        None => std::future::pending().await,
                    }
                } => {
                    if !self.try_reconnect().await {
                        break;
                    }
                }
                cmd = self.cmd_rx.recv() => {
                    match cmd {
                        Some(cmd) => {
                            if !self.handle_command(cmd).await {
                                break;
                            }
                        }
                        // Every handle dropped: leave cleanly.
                        None => {
                            self.shutdown().await;
                            break;
                        }
                    }
                }
            }
        }
        tracing::info!(code = %self.code, "lobby coordinator stopped");
    }

    fn emit(&self, update: LobbyUpdate) {
        // The consumer dropping its receiver is not an error.
        let _ = self.updates.send(update);
    }

    async fn publish(&self, event: &LobbyEvent) -> Result<(), LobbyError> {
        let Some(channel) = &self.channel else {
            return Err(LobbyError::NotConnected);
        };
        let (name, bytes) = event.encode(&self.codec)?;
        channel.publish(name, &bytes).await?;
        Ok(())
    }

    // -----------------------------------------------------------------
    // Commands (local intents)
    // -----------------------------------------------------------------

    /// Returns `false` when the actor should stop.
    async fn handle_command(&mut self, cmd: LobbyCommand) -> bool {
        match cmd {
            LobbyCommand::ClaimRole { role, reply } => {
                let result = self.claim_role(role).await;
                let _ = reply.send(result);
                true
            }
            LobbyCommand::SelectCase { case, reply } => {
                let result = self.select_case(case).await;
                let _ = reply.send(result);
                true
            }
            LobbyCommand::StartTrial { reply } => {
                let result = self.start_trial().await;
                let _ = reply.send(result);
                true
            }
            LobbyCommand::Snapshot { reply } => {
                let _ = reply.send(self.store.snapshot());
                true
            }
            LobbyCommand::Disconnect { reply } => {
                self.shutdown().await;
                let _ = reply.send(());
                false
            }
        }
    }

    // Intents validate, then broadcast. Nothing is committed before the
    // publish succeeds: the assignment or selection lands through the
    // loopback echo, so a failed broadcast leaves the state untouched
    // and the intent retryable.

    async fn claim_role(&self, role: RoleId) -> Result<(), LobbyError> {
        let payload = self.store.claim_role(role)?;
        self.publish(&LobbyEvent::RoleClaimed(payload)).await
    }

    async fn select_case(&self, case: CaseRef) -> Result<(), LobbyError> {
        let payload = self.store.select_case(case)?;
        self.publish(&LobbyEvent::CaseSelected(payload)).await
    }

    async fn start_trial(&mut self) -> Result<(), LobbyError> {
        let payload = self.store.start_trial(now_ms())?;
        self.publish(&LobbyEvent::TrialStart(payload)).await?;
        // The broadcast is out; the echo finishes the move to Active
        // through the same handler as everyone else.
        self.store.mark_starting();
        self.emit(LobbyUpdate::PhaseChanged(Phase::Starting));
        Ok(())
    }

    async fn shutdown(&mut self) {
        let leave = LobbyEvent::PlayerLeft(self.store.leave_announcement(now_ms()));
        if let Err(err) = self.publish(&leave).await {
            tracing::debug!(%err, "leave announcement failed");
        }
        if let Some(channel) = self.channel.take() {
            channel.close().await;
        }
    }

    // -----------------------------------------------------------------
    // Incoming events
    // -----------------------------------------------------------------

    async fn apply_message(&mut self, msg: ChannelMessage) {
        let event = match LobbyEvent::decode(&self.codec, &msg.event, &msg.data) {
            Ok(event) => event,
            Err(err) => {
                tracing::warn!(%err, event = %msg.event, "dropping malformed message");
                return;
            }
        };
        let now = now_ms();

        match event {
            LobbyEvent::PlayerJoined(joined) => {
                if self.store.apply_join(&joined, now) {
                    self.emit(LobbyUpdate::ParticipantJoined(Participant {
                        id: joined.id.clone(),
                        name: joined.name.clone(),
                        is_leader: joined.is_leader,
                        role: None,
                        last_seen_at: now,
                    }));
                    // Announce back so the newcomer learns we exist.
                    // Re-announcements are duplicate joins on every other
                    // client, so the cascade stops after one round.
                    if &joined.id != self.store.local_id() {
                        let hello = LobbyEvent::PlayerJoined(
                            self.store.join_announcement(now),
                        );
                        if let Err(err) = self.publish(&hello).await {
                            tracing::warn!(%err, "announce-back failed");
                        }
                    }
                }
                // The leader answers every observed join with a session
                // snapshot so late or lossy joiners converge.
                if self.store.is_leader() && &joined.id != self.store.local_id() {
                    let sync =
                        LobbyEvent::StateSync(self.store.sync_announcement(now));
                    if let Err(err) = self.publish(&sync).await {
                        tracing::warn!(%err, "state-sync publish failed");
                    }
                }
            }
            LobbyEvent::PlayerLeft(left) => {
                if let Some(evicted) = self.store.apply_leave(&left) {
                    self.emit(LobbyUpdate::ParticipantLeft {
                        participant: evicted.participant,
                        freed_role: evicted.freed_role,
                    });
                }
            }
            LobbyEvent::RoleClaimed(claim) => {
                let already = self.store.role_holder(claim.role_id)
                    == Some(&claim.player_id);
                let outcome = self.store.apply_role_claim(&claim);
                if let Some(displaced) = &outcome.displaced {
                    if displaced == self.store.local_id() {
                        self.emit(LobbyUpdate::RoleLost { role: claim.role_id });
                    }
                }
                if !already {
                    self.emit(LobbyUpdate::RoleAssigned {
                        player_id: claim.player_id.clone(),
                        role: claim.role_id,
                    });
                }
            }
            LobbyEvent::CaseSelected(selected) => {
                if self.store.apply_case(&selected) {
                    self.emit(LobbyUpdate::CaseChanged(selected.case));
                }
            }
            LobbyEvent::TrialStart(start) => {
                if self.store.apply_trial_start(&start) {
                    self.emit(LobbyUpdate::PhaseChanged(Phase::Active));
                }
            }
            LobbyEvent::Heartbeat(beat) => {
                self.store.apply_heartbeat(&beat, now);
            }
            LobbyEvent::StateSync(sync) => {
                if self.store.apply_state_sync(&sync) {
                    self.emit(LobbyUpdate::Synced(self.store.snapshot()));
                }
            }
        }
    }

    // -----------------------------------------------------------------
    // Liveness
    // -----------------------------------------------------------------

    async fn on_beat(&mut self) {
        let now = now_ms();
        let beat = LobbyEvent::Heartbeat(self.store.heartbeat(now));
        match self.publish(&beat).await {
            Ok(()) => {}
            Err(LobbyError::Transport(TransportError::ChannelClosed)) => {
                self.on_connection_lost();
                return;
            }
            Err(err) => {
                tracing::warn!(%err, "heartbeat publish failed");
            }
        }

        let timeout_ms = self.heartbeat.config().timeout_ms();
        for evicted in self.store.sweep_stale(now, timeout_ms) {
            tracing::info!(
                participant = %evicted.participant.id,
                name = %evicted.participant.name,
                "participant timed out"
            );
            self.emit(LobbyUpdate::ParticipantTimedOut {
                participant: evicted.participant,
                freed_role: evicted.freed_role,
            });
        }
    }

    // -----------------------------------------------------------------
    // Reconnection
    // -----------------------------------------------------------------

    fn on_connection_lost(&mut self) {
        self.channel = None;
        // A half-dead connection must not keep advertising liveness.
        self.heartbeat.pause();
        if let Some(attempt) = self.supervisor.on_connection_lost() {
            let config = self.supervisor.config();
            self.reconnect_at = Some(TokioInstant::now() + config.retry_delay);
            self.emit(LobbyUpdate::Reconnecting {
                attempt,
                max_attempts: config.max_attempts,
            });
        }
    }

    /// Returns `false` when the reconnect budget is spent and the actor
    /// should stop.
    async fn try_reconnect(&mut self) -> bool {
        self.reconnect_at = None;
        match self.connector.connect(&self.code.channel_name()).await {
            Ok(channel) => {
                let new_id = channel.client_id().clone();
                self.channel = Some(channel);
                self.supervisor.on_attempt_succeeded();

                let now = now_ms();
                self.rebuild_store(new_id.clone(), now);

                // Rejoin as a new participant. The old connection's seat
                // stays vacant until someone claims it.
                let join =
                    LobbyEvent::PlayerJoined(self.store.join_announcement(now));
                if let Err(err) = self.publish(&join).await {
                    tracing::warn!(%err, "rejoin announcement failed");
                }
                self.heartbeat.resume();
                tracing::info!(code = %self.code, id = %new_id, "reconnected");
                self.emit(LobbyUpdate::Reconnected { new_id });
                true
            }
            Err(err) => {
                tracing::warn!(%err, "reconnect attempt failed");
                match self.supervisor.on_attempt_failed() {
                    Some(attempt) => {
                        let config = self.supervisor.config();
                        self.reconnect_at =
                            Some(TokioInstant::now() + config.retry_delay);
                        self.emit(LobbyUpdate::Reconnecting {
                            attempt,
                            max_attempts: config.max_attempts,
                        });
                        true
                    }
                    None => {
                        self.emit(LobbyUpdate::ReconnectFailed {
                            countdown: self.supervisor.config().failure_countdown,
                        });
                        false
                    }
                }
            }
        }
    }

    /// Rebuilds the store around the fresh connection id.
    ///
    /// Known peers are carried over with a full staleness window to
    /// prove they are still alive; the session phase, case, and role
    /// assignments are re-adopted minus the dead connection's seat. The
    /// local participant's previous role is deliberately not restored.
    fn rebuild_store(&mut self, new_id: ClientId, now: u64) {
        let old = self.store.snapshot();
        let mut store = LobbyStore::new(
            old.code,
            new_id,
            self.player_name.clone(),
            old.is_leader,
            now,
        );
        for peer in old.participants.iter().filter(|p| p.id != old.local_id) {
            store.apply_join(
                &PlayerJoined {
                    id: peer.id.clone(),
                    name: peer.name.clone(),
                    is_leader: peer.is_leader,
                    timestamp: now,
                },
                now,
            );
        }
        let mut roles = old.roles;
        roles.retain(|_, holder| *holder != old.local_id);
        store.apply_state_sync(&StateSync {
            phase: old.phase,
            case: old.case,
            roles,
            timestamp: now,
        });
        self.store = store;
    }
}
