//! Coordinator actor: an isolated Tokio task that owns one participant's
//! view of a session, plus the handle used to talk to it.
//!
//! The same actor runs on every participant. `host_room` makes it the host:
//! it then owns a [`TurnAuthority`] and its decisions are what everyone else
//! adopts. `join_room` makes it a follower that trusts exactly one host.

use std::time::Duration;

use tokio::sync::{broadcast, mpsc, oneshot};
use tracing::{debug, info, trace, warn};
use turnforge_authority::{Advance, TurnAuthority};
use turnforge_protocol::{
    ErrorNotice, Hello, JsonCodec, JsonEnvelopeCodec, LobbyState, Message, Player, ReplayPayload,
    RoomContext, SessionId, TurnStart, TurnSubmission, unix_now,
};
use turnforge_timer::{Expiry, TurnTimer};
use turnforge_transport::{PeerId, PeerStream, PeerTransport, TransportEvent};

use crate::{
    CoordinatorConfig, SeenMessages, SessionError, SessionEvent, SessionPhase, SessionSnapshot,
    SessionStats,
};

type Reply<T> = oneshot::Sender<Result<T, SessionError>>;

/// Commands sent to a coordinator actor through its channel.
enum Command {
    HostRoom {
        prompt: String,
        turn_duration: Duration,
        reply: Reply<SessionId>,
    },
    JoinRoom {
        session_id: SessionId,
        reply: Reply<()>,
    },
    StartGame {
        reply: Reply<()>,
    },
    Submit {
        text: String,
        reply: Reply<()>,
    },
    Leave {
        reply: Reply<()>,
    },
    Finish {
        reply: Reply<()>,
    },
    Snapshot {
        reply: oneshot::Sender<SessionSnapshot>,
    },
    Shutdown,
}

// ---------------------------------------------------------------------------
// Handle
// ---------------------------------------------------------------------------

/// Handle to a running coordinator. Cheap to clone.
///
/// The coordinator stops when [`shutdown`](Self::shutdown) is called or the
/// last handle is dropped, leaving its transport session on the way out.
#[derive(Clone)]
pub struct CoordinatorHandle {
    local_peer: PeerId,
    commands: mpsc::Sender<Command>,
    events: broadcast::Sender<SessionEvent>,
}

impl CoordinatorHandle {
    /// Spawns a coordinator over `transport` on the current Tokio runtime.
    pub fn spawn<T: PeerTransport>(transport: T, config: CoordinatorConfig) -> Self {
        let config = config.validated();
        let (tx, rx) = mpsc::channel(config.command_channel_size);
        let (events, _) = broadcast::channel(config.event_channel_size);
        let local_peer = transport.local_peer().clone();

        let actor = CoordinatorActor {
            transport,
            local_peer: local_peer.clone(),
            codec: JsonEnvelopeCodec::new(JsonCodec),
            commands: rx,
            events: events.clone(),
            stream: None,
            timer: TurnTimer::new(config.timer.clone()),
            epoch: 0,
            seen: SeenMessages::new(config.dedup_capacity),
            phase: SessionPhase::Idle,
            view: SessionView::default(),
            authority: None,
            stats: SessionStats::default(),
            status: None,
            config,
        };
        tokio::spawn(actor.run());

        Self {
            local_peer,
            commands: tx,
            events,
        }
    }

    /// The identity this coordinator plays as.
    pub fn local_peer(&self) -> &PeerId {
        &self.local_peer
    }

    /// Creates a room with this participant as host and opens the lobby.
    /// Returns the new session id for others to join.
    pub async fn host_room(
        &self,
        prompt: impl Into<String>,
        turn_duration: Duration,
    ) -> Result<SessionId, SessionError> {
        let prompt = prompt.into();
        self.request(|reply| Command::HostRoom {
            prompt,
            turn_duration,
            reply,
        })
        .await?
    }

    /// Joins an existing session as a participant and says hello.
    pub async fn join_room(&self, session_id: SessionId) -> Result<(), SessionError> {
        self.request(|reply| Command::JoinRoom { session_id, reply })
            .await?
    }

    /// Host only: freezes the lobby and starts turn 0.
    pub async fn start_game(&self) -> Result<(), SessionError> {
        self.request(|reply| Command::StartGame { reply }).await?
    }

    /// Submits text for the active turn, which must be this player's.
    pub async fn submit(&self, text: impl Into<String>) -> Result<(), SessionError> {
        let text = text.into();
        self.request(|reply| Command::Submit { text, reply }).await?
    }

    /// Leaves the session from any phase and returns to idle. Idempotent.
    pub async fn leave(&self) -> Result<(), SessionError> {
        self.request(|reply| Command::Leave { reply }).await?
    }

    /// Ends a finished session. The replay stays visible in snapshots.
    pub async fn finish(&self) -> Result<(), SessionError> {
        self.request(|reply| Command::Finish { reply }).await?
    }

    pub async fn snapshot(&self) -> Result<SessionSnapshot, SessionError> {
        self.request(|reply| Command::Snapshot { reply }).await
    }

    /// Subscribes to state transitions from now on.
    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.events.subscribe()
    }

    /// Stops the coordinator task.
    pub async fn shutdown(&self) -> Result<(), SessionError> {
        self.commands
            .send(Command::Shutdown)
            .await
            .map_err(|_| SessionError::Unavailable)
    }

    async fn request<R>(
        &self,
        command: impl FnOnce(oneshot::Sender<R>) -> Command,
    ) -> Result<R, SessionError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.commands
            .send(command(reply_tx))
            .await
            .map_err(|_| SessionError::Unavailable)?;
        reply_rx.await.map_err(|_| SessionError::Unavailable)
    }
}

// ---------------------------------------------------------------------------
// Actor
// ---------------------------------------------------------------------------

/// Everything tied to the current session. Replaced wholesale on reset.
#[derive(Debug, Default)]
struct SessionView {
    session_id: Option<SessionId>,
    is_host: bool,
    /// Pinned on the first authoritative envelope (or self, on the host).
    host_id: Option<PeerId>,
    players: Vec<Player>,
    roster: Vec<PeerId>,
    prompt: String,
    turn_duration: Duration,
    active_turn: Option<TurnStart>,
    /// Last turn this participant sent a submission or timeout for.
    submitted: Option<u32>,
    replay: Option<ReplayPayload>,
}

struct CoordinatorActor<T> {
    transport: T,
    local_peer: PeerId,
    config: CoordinatorConfig,
    codec: JsonEnvelopeCodec,
    commands: mpsc::Receiver<Command>,
    events: broadcast::Sender<SessionEvent>,
    /// Incoming frames for the joined session. `None` while not in one.
    stream: Option<PeerStream>,
    timer: TurnTimer,
    /// Bumped whenever a session is joined or torn down, so a timer armed in
    /// an earlier session can never act on this one.
    epoch: u64,
    seen: SeenMessages,
    phase: SessionPhase,
    view: SessionView,
    /// Host only, from `start_game` until the session closes.
    authority: Option<TurnAuthority>,
    stats: SessionStats,
    status: Option<String>,
}

impl<T: PeerTransport> CoordinatorActor<T> {
    async fn run(mut self) {
        info!(peer = %self.local_peer, "coordinator started");

        loop {
            tokio::select! {
                command = self.commands.recv() => match command {
                    Some(Command::Shutdown) | None => break,
                    Some(command) => self.handle_command(command).await,
                },
                event = next_event(&mut self.stream) => match event {
                    Some(event) => self.handle_transport(event).await,
                    None => self.reset("transport stream closed").await,
                },
                expiry = self.timer.expired() => self.handle_expiry(expiry).await,
            }
        }

        if self.stream.is_some() {
            self.close_session().await;
        }
        info!(peer = %self.local_peer, "coordinator stopped");
    }

    async fn handle_command(&mut self, command: Command) {
        match command {
            Command::HostRoom {
                prompt,
                turn_duration,
                reply,
            } => {
                let result = self.host_room(prompt, turn_duration).await;
                let _ = reply.send(result);
            }
            Command::JoinRoom { session_id, reply } => {
                let result = self.join_room(session_id).await;
                let _ = reply.send(result);
            }
            Command::StartGame { reply } => {
                let result = self.start_game().await;
                let _ = reply.send(result);
            }
            Command::Submit { text, reply } => {
                let result = self.submit(text).await;
                let _ = reply.send(result);
            }
            Command::Leave { reply } => {
                let result = self.leave().await;
                let _ = reply.send(result);
            }
            Command::Finish { reply } => {
                let result = self.finish().await;
                let _ = reply.send(result);
            }
            Command::Snapshot { reply } => {
                let _ = reply.send(self.snapshot());
            }
            // Handled by the run loop.
            Command::Shutdown => {}
        }
    }

    // -- Commands ---------------------------------------------------------

    async fn host_room(
        &mut self,
        prompt: String,
        turn_duration: Duration,
    ) -> Result<SessionId, SessionError> {
        self.ensure_vacant("host a room")?;
        let session_id = SessionId::generate();
        self.activate(&session_id).await?;

        let me = Player::host(self.local_peer.clone(), self.config.display_name.clone());
        self.view = SessionView {
            session_id: Some(session_id.clone()),
            is_host: true,
            host_id: Some(self.local_peer.clone()),
            players: vec![me],
            prompt,
            turn_duration: self.config.clamp_turn_duration(turn_duration),
            ..Default::default()
        };
        info!(
            %session_id,
            host = %self.local_peer,
            turn_secs = self.view.turn_duration.as_secs_f64(),
            "room hosted"
        );
        self.set_phase(SessionPhase::Lobby);
        self.announce_lobby().await;
        Ok(session_id)
    }

    async fn join_room(&mut self, session_id: SessionId) -> Result<(), SessionError> {
        self.ensure_vacant("join a room")?;
        self.activate(&session_id).await?;

        self.view = SessionView {
            session_id: Some(session_id.clone()),
            ..Default::default()
        };
        info!(%session_id, peer = %self.local_peer, "room joined");
        self.set_phase(SessionPhase::Lobby);

        let hello = Hello {
            display_name: self.config.display_name.clone(),
        };
        let _ = self.broadcast(Message::Hello(hello)).await;
        Ok(())
    }

    async fn start_game(&mut self) -> Result<(), SessionError> {
        const OP: &str = "start the game";
        if !self.view.is_host {
            return Err(SessionError::NotHost(OP));
        }
        if self.phase != SessionPhase::Lobby {
            return Err(self.invalid_phase(OP));
        }
        let Some(room) = self.room_context() else {
            return Err(self.invalid_phase(OP));
        };

        let mut authority = TurnAuthority::new(room.clone())?;
        info!(
            session_id = %room.session_id,
            players = room.players.len(),
            "game starting"
        );
        let _ = self.broadcast(Message::LobbyState(room.lobby_state())).await;

        let first = authority.start_turn();
        let replay = authority.build_replay();
        self.authority = Some(authority);
        match first {
            Some(start) => self.begin_turn(start).await,
            None => self.finish_round(replay).await,
        }
        Ok(())
    }

    async fn submit(&mut self, text: String) -> Result<(), SessionError> {
        const OP: &str = "submit";
        if self.phase != SessionPhase::InTurn {
            return Err(self.invalid_phase(OP));
        }
        let Some(turn) = self.view.active_turn.as_ref() else {
            return Err(self.invalid_phase(OP));
        };
        if turn.current_player_id != self.local_peer {
            return Err(SessionError::NotYourTurn);
        }
        if self.view.submitted == Some(turn.turn_index) {
            return Err(SessionError::AlreadySubmitted(turn.turn_index));
        }

        let submission = TurnSubmission {
            session_id: turn.session_id.clone(),
            turn_index: turn.turn_index,
            player_id: self.local_peer.clone(),
            text,
            timestamp: unix_now(),
        };
        self.view.submitted = Some(submission.turn_index);
        let sent = self.broadcast(Message::TurnSubmit(submission.clone())).await;

        if self.view.is_host {
            // The host's own submission counts even if nobody heard it; a
            // send failure is already in the status.
            self.settle(submission).await;
            return Ok(());
        }
        if sent.is_err() {
            self.view.submitted = None;
        }
        sent
    }

    async fn leave(&mut self) -> Result<(), SessionError> {
        if self.phase == SessionPhase::Idle && self.stream.is_none() {
            return Ok(());
        }
        info!(peer = %self.local_peer, "leaving session");
        self.close_session().await;
        self.view = SessionView::default();
        self.set_phase(SessionPhase::Idle);
        Ok(())
    }

    async fn finish(&mut self) -> Result<(), SessionError> {
        if self.phase != SessionPhase::Replay {
            return Err(self.invalid_phase("finish"));
        }
        self.close_session().await;
        self.set_phase(SessionPhase::Ended);
        Ok(())
    }

    fn snapshot(&self) -> SessionSnapshot {
        let view = &self.view;
        SessionSnapshot {
            local_peer: self.local_peer.clone(),
            phase: self.phase,
            is_host: view.is_host,
            session_id: view.session_id.clone(),
            host_id: view.host_id.clone(),
            players: view.players.clone(),
            roster: view.roster.clone(),
            prompt: view.prompt.clone(),
            turn_duration: view.turn_duration,
            active_turn: view.active_turn.clone(),
            turn_remaining: view.active_turn.as_ref().and(self.timer.remaining()),
            replay: view.replay.clone(),
            status: self.status.clone(),
            stats: self.stats,
        }
    }

    // -- Incoming ---------------------------------------------------------

    async fn handle_transport(&mut self, event: TransportEvent) {
        match event {
            TransportEvent::Message { data, from } => self.handle_frame(&data, from).await,
            TransportEvent::RosterChanged(peers) => self.handle_roster(peers).await,
            TransportEvent::Invalidated { reason } => self.reset(&reason).await,
        }
    }

    async fn handle_frame(&mut self, data: &[u8], from: PeerId) {
        self.stats.received += 1;

        let envelope = match self.codec.decode(data) {
            Ok(envelope) => envelope,
            Err(e) => {
                self.stats.malformed += 1;
                debug!(%from, error = %e, "dropping malformed frame");
                return;
            }
        };
        if self.view.session_id.as_ref() != Some(&envelope.session_id) {
            debug!(%from, session_id = %envelope.session_id, "dropping frame for another session");
            return;
        }
        if !self.seen.insert(envelope.message_id.clone()) {
            self.stats.duplicates += 1;
            trace!(message_id = %envelope.message_id, "duplicate dropped");
            return;
        }
        if envelope.sender_id != from {
            self.stats.fenced += 1;
            warn!(claimed = %envelope.sender_id, %from, "sender mismatch, dropping");
            return;
        }

        let kind = envelope.kind();
        if kind.is_authoritative() && !self.trusts_host(&envelope.sender_id) {
            self.stats.fenced += 1;
            warn!(
                %kind,
                sender = %envelope.sender_id,
                host = ?self.view.host_id,
                "host-only message from another peer dropped"
            );
            return;
        }
        trace!(%kind, sender = %envelope.sender_id, "envelope received");

        let sender = envelope.sender_id;
        match envelope.message {
            Message::LobbyState(lobby) => self.on_lobby_state(lobby),
            Message::TurnStart(start) => self.on_turn_start(start),
            Message::TurnSubmit(submission) | Message::TurnTimeout(submission) => {
                self.on_submission(sender, submission).await
            }
            Message::Replay(replay) => self.on_replay(replay),
            Message::Error(notice) => self.on_error(notice),
            Message::Hello(hello) => self.on_hello(sender, hello).await,
        }
    }

    /// Whether `sender` may originate host-only kinds. Pins the host on
    /// first use.
    fn trusts_host(&mut self, sender: &PeerId) -> bool {
        if self.view.is_host {
            return false;
        }
        match &self.view.host_id {
            Some(host) => host == sender,
            None => {
                info!(host = %sender, "host pinned");
                self.view.host_id = Some(sender.clone());
                true
            }
        }
    }

    fn on_lobby_state(&mut self, lobby: LobbyState) {
        if !matches!(self.phase, SessionPhase::Lobby | SessionPhase::InTurn) {
            debug!(phase = %self.phase, "lobby update ignored");
            return;
        }
        self.view.prompt = lobby.prompt.clone();
        let announced = lobby.turn_duration();
        // Zero stays "unknown"; anything else gets the same bounds as hosting.
        self.view.turn_duration = if announced.is_zero() {
            announced
        } else {
            self.config.clamp_turn_duration(announced)
        };
        if self.view.turn_duration != announced {
            warn!(
                announced_secs = lobby.turn_duration_sec,
                secs = self.view.turn_duration.as_secs_f64(),
                "host turn duration out of range, clamped"
            );
        }
        self.view.players = lobby.players.clone();
        debug!(players = lobby.players.len(), "lobby updated");
        self.emit(SessionEvent::LobbyUpdated(lobby.players));
    }

    fn on_turn_start(&mut self, start: TurnStart) {
        if !matches!(self.phase, SessionPhase::Lobby | SessionPhase::InTurn) {
            debug!(phase = %self.phase, turn = start.turn_index, "turn start ignored");
            return;
        }
        if let Some(active) = &self.view.active_turn {
            if start.turn_index <= active.turn_index {
                debug!(
                    turn = start.turn_index,
                    active = active.turn_index,
                    "stale turn start ignored"
                );
                return;
            }
        }
        self.adopt_turn(start);
    }

    async fn on_submission(&mut self, sender: PeerId, submission: TurnSubmission) {
        if !self.view.is_host {
            trace!(player = %submission.player_id, turn = submission.turn_index, "submission observed");
            return;
        }
        if sender != submission.player_id {
            self.stats.rejected += 1;
            debug!(%sender, player = %submission.player_id, "submission on behalf of another player");
            return;
        }
        self.settle(submission).await;
    }

    fn on_replay(&mut self, replay: ReplayPayload) {
        if matches!(self.phase, SessionPhase::Replay | SessionPhase::Ended) {
            trace!("replay already adopted");
            return;
        }
        self.adopt_replay(replay);
    }

    fn on_error(&mut self, notice: ErrorNotice) {
        if !notice.is_for(&self.local_peer) {
            trace!(code = notice.code, recipient = ?notice.recipient, "error notice for another peer");
            return;
        }
        warn!(code = notice.code, message = %notice.message, "host reported an error");
        self.set_status(format!("host error {}: {}", notice.code, notice.message));
    }

    async fn on_hello(&mut self, sender: PeerId, hello: Hello) {
        if !self.view.is_host {
            return;
        }
        if self.phase != SessionPhase::Lobby {
            debug!(%sender, phase = %self.phase, "hello after start refused");
            let notice = ErrorNotice::new(ErrorNotice::GAME_IN_PROGRESS, "game already started")
                .to(sender);
            let _ = self.broadcast(Message::Error(notice)).await;
            return;
        }
        if self.view.players.iter().any(|p| p.id == sender) {
            // They may have missed the last announcement.
            self.announce_lobby().await;
            return;
        }
        if self.view.players.len() >= self.config.max_players {
            debug!(%sender, max = self.config.max_players, "lobby full");
            let notice = ErrorNotice::new(
                ErrorNotice::ROOM_FULL,
                format!("room is full ({} players)", self.config.max_players),
            )
            .to(sender);
            let _ = self.broadcast(Message::Error(notice)).await;
            return;
        }

        info!(player = %sender, name = %hello.display_name, "player joined lobby");
        self.view.players.push(Player::new(sender, hello.display_name));
        self.announce_lobby().await;
    }

    async fn handle_roster(&mut self, peers: Vec<PeerId>) {
        debug!(peers = peers.len(), "roster changed");
        self.view.roster = peers;
        if !self.view.is_host || self.phase != SessionPhase::Lobby {
            return;
        }

        let before = self.view.players.len();
        let roster = &self.view.roster;
        let local = &self.local_peer;
        self.view
            .players
            .retain(|p| &p.id == local || roster.contains(&p.id));
        let removed = before - self.view.players.len();
        if removed > 0 {
            info!(removed, "departed players pruned from lobby");
            self.announce_lobby().await;
        }
    }

    async fn handle_expiry(&mut self, expiry: Expiry) {
        let active = self.view.active_turn.as_ref().map(|t| t.turn_index);
        if expiry.epoch != self.epoch
            || self.phase != SessionPhase::InTurn
            || active != Some(expiry.turn_index)
        {
            trace!(turn = expiry.turn_index, epoch = expiry.epoch, "stale timer ignored");
            return;
        }
        let Some(turn) = self.view.active_turn.clone() else {
            return;
        };

        if self.view.is_host {
            info!(turn = turn.turn_index, player = %turn.current_player_id, "turn timed out");
            let submission =
                TurnSubmission::timeout(turn.session_id, turn.turn_index, turn.current_player_id);
            self.settle(submission).await;
        } else if turn.current_player_id == self.local_peer
            && self.view.submitted != Some(turn.turn_index)
        {
            info!(turn = turn.turn_index, "own turn timed out, notifying host");
            self.view.submitted = Some(turn.turn_index);
            let submission =
                TurnSubmission::timeout(turn.session_id, turn.turn_index, self.local_peer.clone());
            let _ = self.broadcast(Message::TurnTimeout(submission)).await;
        }
    }

    // -- Host decisions ---------------------------------------------------

    /// Feeds a submission through the authority and publishes the outcome.
    async fn settle(&mut self, submission: TurnSubmission) {
        let Some(authority) = self.authority.as_mut() else {
            self.stats.rejected += 1;
            debug!(player = %submission.player_id, "submission before game start dropped");
            return;
        };
        let outcome = match authority.accept_and_advance(&submission) {
            Ok(outcome) => outcome,
            Err(rejection) => {
                self.stats.rejected += 1;
                debug!(
                    player = %submission.player_id,
                    turn = submission.turn_index,
                    %rejection,
                    "submission rejected"
                );
                return;
            }
        };

        self.emit(SessionEvent::SubmissionAccepted(submission.into()));
        match outcome {
            Advance::Next(start) => self.begin_turn(start).await,
            Advance::Complete(replay) => self.finish_round(replay).await,
        }
    }

    async fn begin_turn(&mut self, start: TurnStart) {
        let _ = self.broadcast(Message::TurnStart(start.clone())).await;
        self.adopt_turn(start);
    }

    async fn finish_round(&mut self, replay: ReplayPayload) {
        info!(
            session_id = %replay.session_id,
            items = replay.items.len(),
            "round complete"
        );
        let _ = self.broadcast(Message::Replay(replay.clone())).await;
        self.adopt_replay(replay);
    }

    async fn announce_lobby(&mut self) {
        let Some(room) = self.room_context() else {
            return;
        };
        self.emit(SessionEvent::LobbyUpdated(room.players.clone()));
        let _ = self.broadcast(Message::LobbyState(room.lobby_state())).await;
    }

    fn room_context(&self) -> Option<RoomContext> {
        Some(RoomContext {
            session_id: self.view.session_id.clone()?,
            host_id: self.view.host_id.clone()?,
            players: self.view.players.clone(),
            prompt: self.view.prompt.clone(),
            turn_duration: self.view.turn_duration,
        })
    }

    // -- Local state ------------------------------------------------------

    fn adopt_turn(&mut self, start: TurnStart) {
        // A participant that never saw the lobby doesn't know the duration;
        // the host's own countdown still covers the turn.
        if self.view.turn_duration.is_zero() {
            self.timer.disarm();
        } else {
            self.timer
                .arm(self.epoch, start.turn_index, self.view.turn_duration);
        }
        debug!(
            turn = start.turn_index,
            player = %start.current_player_id,
            "turn adopted"
        );
        self.view.active_turn = Some(start.clone());
        self.set_phase(SessionPhase::InTurn);
        self.emit(SessionEvent::TurnStarted(start));
    }

    fn adopt_replay(&mut self, replay: ReplayPayload) {
        self.timer.disarm();
        self.view.active_turn = None;
        self.view.replay = Some(replay.clone());
        self.set_phase(SessionPhase::Replay);
        self.emit(SessionEvent::ReplayReady(replay));
    }

    /// Joins the transport session and clears per-session bookkeeping.
    async fn activate(&mut self, session_id: &SessionId) -> Result<(), SessionError> {
        match self.transport.join(session_id.as_str()).await {
            Ok(stream) => {
                self.stream = Some(stream);
                self.epoch += 1;
                self.seen.clear();
                self.authority = None;
                self.timer.disarm();
                self.status = None;
                Ok(())
            }
            Err(e) => {
                warn!(%session_id, error = %e, "transport join failed");
                self.view = SessionView::default();
                self.set_status(format!("could not join session: {e}"));
                self.set_phase(SessionPhase::Idle);
                Err(SessionError::ActivationFailure(e))
            }
        }
    }

    /// Stops listening, cancels the timer, and leaves the transport session.
    /// The view is left for the caller to keep or clear.
    async fn close_session(&mut self) {
        self.stream = None;
        self.timer.disarm();
        self.authority = None;
        self.seen.clear();
        self.epoch += 1;
        if let Err(e) = self.transport.leave().await {
            warn!(error = %e, "transport leave failed");
        }
    }

    /// Tears the session down after the transport gave up on it.
    async fn reset(&mut self, reason: &str) {
        warn!(
            peer = %self.local_peer,
            session_id = ?self.view.session_id,
            reason,
            "session reset"
        );
        self.close_session().await;
        self.view = SessionView::default();
        self.set_status(reason.to_string());
        self.emit(SessionEvent::Reset {
            reason: reason.to_string(),
        });
        self.set_phase(SessionPhase::Idle);
    }

    async fn broadcast(&mut self, message: Message) -> Result<(), SessionError> {
        let kind = message.kind();
        let Some(session_id) = self.view.session_id.clone() else {
            return Err(self.invalid_phase("broadcast"));
        };
        let sealed = self.codec.encode(&session_id, &self.local_peer, message)?;
        // Our own frames must never be processed if the transport echoes them.
        self.seen.insert(sealed.message_id.clone());

        match self.transport.broadcast(&sealed.bytes).await {
            Ok(()) => {
                trace!(%kind, message_id = %sealed.message_id, "broadcast sent");
                Ok(())
            }
            Err(e) => {
                self.stats.send_failures += 1;
                warn!(%kind, error = %e, "broadcast failed");
                self.set_status(format!("could not send {kind}: {e}"));
                Err(SessionError::TransportSendFailure(e))
            }
        }
    }

    fn ensure_vacant(&self, op: &'static str) -> Result<(), SessionError> {
        if self.phase.is_vacant() && self.stream.is_none() {
            Ok(())
        } else {
            Err(self.invalid_phase(op))
        }
    }

    fn invalid_phase(&self, op: &'static str) -> SessionError {
        SessionError::InvalidPhase {
            op,
            phase: self.phase,
        }
    }

    fn set_phase(&mut self, to: SessionPhase) {
        let from = self.phase;
        if from == to {
            return;
        }
        self.phase = to;
        info!(peer = %self.local_peer, %from, %to, "phase changed");
        self.emit(SessionEvent::PhaseChanged { from, to });
    }

    fn set_status(&mut self, status: String) {
        self.status = Some(status.clone());
        self.emit(SessionEvent::Status(status));
    }

    fn emit(&self, event: SessionEvent) {
        // No subscribers is fine.
        let _ = self.events.send(event);
    }
}

/// The next transport event, or pending forever while not in a session.
async fn next_event(stream: &mut Option<PeerStream>) -> Option<TransportEvent> {
    match stream {
        Some(stream) => stream.next().await,
        None => std::future::pending().await,
    }
}
