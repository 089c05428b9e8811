//! Room: one match from the second registration to reclaim
//!
//! A room starts *waiting*, switches to *running* once, when its second
//! player registers, and ends *finished*. While running, a single task owns
//! the engine and multiplexes timers, actions and departures.

use dashmap::DashMap;
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::time::{interval_at, sleep, Instant, MissedTickBehavior};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::util::time::{
    millis, FINISH_GRACE_MS, FRAME_INTERVAL_MS, MATCH_DURATION_SECS, SPAWN_INTERVAL_MS,
    WRITE_TIMEOUT_MS,
};
use crate::ws::protocol::{ServerMsg, StartedInfo, StateSnapshot};

use super::engine::Engine;
use super::outcome::{MatchOutcome, MatchSummary, Participant};
use super::player::{Player, PlayerAction, RoomLink};
use super::session::Session;

/// Players per room
pub const ROOM_CAPACITY: usize = 2;

const ACTION_QUEUE_SIZE: usize = 256;
const DEPARTURE_QUEUE_SIZE: usize = ROOM_CAPACITY * 2;

/// Timing of a match
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RoomConfig {
    pub frame_interval: Duration,
    pub spawn_interval: Duration,
    pub match_duration: Duration,
    /// Pause between the final broadcast and closing the connections
    pub finish_grace: Duration,
    pub write_timeout: Duration,
}

impl Default for RoomConfig {
    fn default() -> Self {
        Self {
            frame_interval: millis(FRAME_INTERVAL_MS),
            spawn_interval: millis(SPAWN_INTERVAL_MS),
            match_duration: Duration::from_secs(MATCH_DURATION_SECS),
            finish_grace: millis(FINISH_GRACE_MS),
            write_timeout: millis(WRITE_TIMEOUT_MS),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RoomPhase {
    Waiting,
    Running,
    Finished,
}

type RoomQueues = (mpsc::Receiver<PlayerAction>, mpsc::Receiver<Uuid>);

pub struct Room {
    pub id: Uuid,
    /// Players keyed by match-scoped id
    players: DashMap<Uuid, Arc<Player>>,
    /// Registration order, its length is the occupancy
    seats: Mutex<Vec<Uuid>>,
    phase: Mutex<RoomPhase>,
    config: RoomConfig,
    seed: u64,
    actions_tx: mpsc::Sender<PlayerAction>,
    departures_tx: mpsc::Sender<Uuid>,
    queues: Mutex<Option<RoomQueues>>,
    cancel_tx: watch::Sender<bool>,
    reclaim_tx: mpsc::Sender<Uuid>,
    last_snapshot: Mutex<Option<StateSnapshot>>,
    summary: Mutex<Option<MatchSummary>>,
}

impl Room {
    pub fn new(config: RoomConfig, reclaim_tx: mpsc::Sender<Uuid>, seed: u64) -> Self {
        let (actions_tx, actions_rx) = mpsc::channel(ACTION_QUEUE_SIZE);
        let (departures_tx, departures_rx) = mpsc::channel(DEPARTURE_QUEUE_SIZE);
        let (cancel_tx, _) = watch::channel(false);

        Self {
            id: Uuid::new_v4(),
            players: DashMap::with_capacity(ROOM_CAPACITY),
            seats: Mutex::new(Vec::with_capacity(ROOM_CAPACITY)),
            phase: Mutex::new(RoomPhase::Waiting),
            config,
            seed,
            actions_tx,
            departures_tx,
            queues: Mutex::new(Some((actions_rx, departures_rx))),
            cancel_tx,
            reclaim_tx,
            last_snapshot: Mutex::new(None),
            summary: Mutex::new(None),
        }
    }

    fn link(&self) -> RoomLink {
        RoomLink {
            room_id: self.id,
            actions: self.actions_tx.clone(),
            departures: self.departures_tx.clone(),
            cancel: self.cancel_tx.subscribe(),
        }
    }

    /// Seat a session. Returns the new player and the occupancy after
    /// registration, or gives the session back if the room is not open.
    pub fn try_register(&self, session: Session) -> Result<(Arc<Player>, usize), Session> {
        let mut seats = self.seats.lock();
        if *self.phase.lock() != RoomPhase::Waiting || seats.len() >= ROOM_CAPACITY {
            return Err(session);
        }

        let player = Arc::new(Player::spawn(session, self.link(), self.config.write_timeout));
        self.players.insert(player.game_session_id, player.clone());
        seats.push(player.game_session_id);

        info!(
            room_id = %self.id,
            user_id = %player.user_id,
            game_session_id = %player.game_session_id,
            occupancy = seats.len(),
            "Player joined room"
        );

        Ok((player, seats.len()))
    }

    pub fn occupancy(&self) -> usize {
        self.seats.lock().len()
    }

    pub fn phase(&self) -> RoomPhase {
        *self.phase.lock()
    }

    pub fn has_user(&self, user_id: &Uuid) -> bool {
        self.players.iter().any(|p| p.user_id == *user_id)
    }

    /// Snapshot most recently broadcast to the players
    #[cfg(test)]
    pub fn last_snapshot(&self) -> Option<StateSnapshot> {
        self.last_snapshot.lock().clone()
    }

    /// Summary of a finished match, handed out once
    pub fn take_summary(&self) -> Option<MatchSummary> {
        self.summary.lock().take()
    }

    fn broadcast(&self, msg: &ServerMsg) {
        for player in self.players.iter() {
            player.send(msg.clone());
        }
    }

    /// Enter *running* and drive the match until it finishes
    pub async fn run(self: Arc<Self>) {
        let Some((mut actions, mut departures)) = self.queues.lock().take() else {
            error!(room_id = %self.id, "Room is already running");
            return;
        };

        let seated: Vec<Arc<Player>> = {
            let seats = self.seats.lock();
            let mut phase = self.phase.lock();
            let current = *phase;
            if current != RoomPhase::Waiting || seats.len() != ROOM_CAPACITY {
                error!(room_id = %self.id, occupancy = seats.len(), phase = ?current, "Room cannot start");
                return;
            }
            *phase = RoomPhase::Running;
            seats
                .iter()
                .filter_map(|id| self.players.get(id).map(|p| p.value().clone()))
                .collect()
        };
        let [first, second] = seated.as_slice() else {
            error!(room_id = %self.id, "Seated player missing from room");
            return;
        };
        let (player1, player2) = (
            Participant {
                user_id: first.user_id,
                game_session_id: first.game_session_id,
                player_num: 1,
            },
            Participant {
                user_id: second.user_id,
                game_session_id: second.game_session_id,
                player_num: 2,
            },
        );

        let mut engine = Engine::new(player1.game_session_id, player2.game_session_id, self.seed);
        let duration = self.config.match_duration.as_secs();
        for (player, me, opponent) in [(first, player1, player2), (second, player2, player1)] {
            player.send(ServerMsg::Started(StartedInfo {
                opponent: opponent.user_id,
                player_num: me.player_num,
                duration,
            }));
            player.start_listening();
        }
        info!(
            room_id = %self.id,
            player1 = %player1.user_id,
            player2 = %player2.user_id,
            "Match started"
        );

        let start = Instant::now();
        let mut frames = interval_at(start + self.config.frame_interval, self.config.frame_interval);
        frames.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let mut spawns = interval_at(start + self.config.spawn_interval, self.config.spawn_interval);
        spawns.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let timer = sleep(self.config.match_duration);
        tokio::pin!(timer);

        let outcome = loop {
            tokio::select! {
                _ = &mut timer => break MatchOutcome::TimeExpired,
                Some(left) = departures.recv() => {
                    if engine.player_number(&left).is_some() {
                        break MatchOutcome::Disconnected { left };
                    }
                    error!(room_id = %self.id, game_session_id = %left, "Departure of a player not in this match");
                }
                _ = frames.tick() => {
                    let snapshot = engine.snapshot();
                    self.broadcast(&ServerMsg::State(snapshot.clone()));
                    *self.last_snapshot.lock() = Some(snapshot);
                    engine.step();
                }
                _ = spawns.tick() => engine.spawn_product(),
                Some(action) = actions.recv() => {
                    engine.apply_action(action.game_session_id, action.action);
                }
            }
        };

        self.finish(outcome, &engine, player1, player2).await;
    }

    async fn finish(&self, outcome: MatchOutcome, engine: &Engine, player1: Participant, player2: Participant) {
        *self.phase.lock() = RoomPhase::Finished;

        let state = engine.state();
        *self.summary.lock() = Some(MatchSummary {
            outcome,
            player1,
            player2,
            score1: state.player(player1.player_num).score,
            score2: state.player(player2.player_num).score,
        });

        let notice = match outcome {
            MatchOutcome::TimeExpired => {
                info!(
                    room_id = %self.id,
                    score1 = state.player1.score,
                    score2 = state.player2.score,
                    "Match time is over"
                );
                ServerMsg::TimeOver
            }
            MatchOutcome::Disconnected { left } => {
                if self.players.remove(&left).is_none() {
                    warn!(room_id = %self.id, game_session_id = %left, "Departed player already removed");
                }
                self.seats.lock().retain(|id| *id != left);
                info!(room_id = %self.id, game_session_id = %left, "Match ended by disconnect");
                ServerMsg::Disconnected
            }
        };
        self.broadcast(&notice);

        sleep(self.config.finish_grace).await;

        for player in self.players.iter() {
            player.close();
        }
        // Stops the inbound loops and any outbound loop without a pending close
        self.cancel_tx.send_replace(true);

        if let Err(e) = self.reclaim_tx.send(self.id).await {
            error!(room_id = %self.id, error = %e, "Failed to hand room back for reclaim");
        }
        debug!(room_id = %self.id, "Room finished");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::outcome::GameResult;
    use crate::game::session::testing::{self, Peer};
    use crate::game::session::Frame;

    const SEED: u64 = 42;

    fn config() -> RoomConfig {
        RoomConfig {
            match_duration: Duration::from_secs(2),
            // no products fall, scores stay put
            spawn_interval: Duration::from_secs(60),
            ..RoomConfig::default()
        }
    }

    fn seat(room: &Room) -> (Arc<Player>, Peer) {
        let (session, peer) = testing::session(Uuid::new_v4());
        let (player, _) = room.try_register(session).ok().expect("room has a free seat");
        (player, peer)
    }

    fn started(msg: Option<ServerMsg>) -> StartedInfo {
        match msg {
            Some(ServerMsg::Started(info)) => info,
            other => panic!("expected started, got {other:?}"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn registration_closes_after_two() {
        let (reclaim_tx, _reclaim_rx) = mpsc::channel(1);
        let room = Room::new(config(), reclaim_tx, SEED);

        let (session, _peer1) = testing::session(Uuid::new_v4());
        assert_eq!(room.try_register(session).ok().map(|(_, n)| n), Some(1));
        let (session, _peer2) = testing::session(Uuid::new_v4());
        assert_eq!(room.try_register(session).ok().map(|(_, n)| n), Some(2));

        let (session, _peer3) = testing::session(Uuid::new_v4());
        assert!(room.try_register(session).is_err());
        assert_eq!(room.occupancy(), 2);
        assert_eq!(room.phase(), RoomPhase::Waiting);
    }

    #[tokio::test(start_paused = true)]
    async fn time_expiry_notifies_and_reclaims_once() {
        let (reclaim_tx, mut reclaim_rx) = mpsc::channel(4);
        let room = Arc::new(Room::new(config(), reclaim_tx, SEED));
        let (p1, mut peer1) = seat(&room);
        let (p2, mut peer2) = seat(&room);

        let task = tokio::spawn(room.clone().run());

        let info1 = started(peer1.next_status().await);
        let info2 = started(peer2.next_status().await);
        assert_eq!((info1.opponent, info1.player_num, info1.duration), (p2.user_id, 1, 2));
        assert_eq!((info2.opponent, info2.player_num, info2.duration), (p1.user_id, 2, 2));

        assert_eq!(peer1.next_status().await, Some(ServerMsg::TimeOver));
        assert_eq!(peer2.next_status().await, Some(ServerMsg::TimeOver));
        // close frame then the sink is gone
        assert_eq!(peer1.next_frame().await, Some(Frame::Close));
        assert_eq!(peer2.next_frame().await, Some(Frame::Close));

        task.await.unwrap();
        assert_eq!(reclaim_rx.recv().await, Some(room.id));
        assert!(reclaim_rx.try_recv().is_err());
        assert_eq!(room.phase(), RoomPhase::Finished);

        let summary = room.take_summary().expect("summary stored");
        assert_eq!(summary.outcome, MatchOutcome::TimeExpired);
        assert_eq!(summary.player1.game_session_id, p1.game_session_id);
        let [r1, r2] = summary.records().unwrap();
        assert_eq!((r1.result, r2.result), (GameResult::Draw, GameResult::Draw));
        assert!(room.take_summary().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn read_failure_ends_match_for_that_player() {
        let (reclaim_tx, mut reclaim_rx) = mpsc::channel(4);
        let room = Arc::new(Room::new(config(), reclaim_tx, SEED));
        let (p1, mut peer1) = seat(&room);
        let (p2, mut peer2) = seat(&room);

        let task = tokio::spawn(room.clone().run());
        started(peer1.next_status().await);
        started(peer2.next_status().await);

        peer2.fail_read();

        assert_eq!(peer1.next_status().await, Some(ServerMsg::Disconnected));
        assert_eq!(peer1.next_frame().await, Some(Frame::Close));
        task.await.unwrap();

        assert_eq!(reclaim_rx.recv().await, Some(room.id));
        assert!(reclaim_rx.try_recv().is_err());
        assert!(!room.has_user(&p2.user_id));
        assert!(room.has_user(&p1.user_id));

        let summary = room.take_summary().unwrap();
        assert_eq!(
            summary.outcome,
            MatchOutcome::Disconnected {
                left: p2.game_session_id
            }
        );
        let [r1, r2] = summary.records().unwrap();
        assert_eq!((r1.user_id, r1.result), (p1.user_id, GameResult::Win));
        assert_eq!((r2.user_id, r2.result), (p2.user_id, GameResult::Loss));
        // the leaver never got a notice
        assert!(peer2
            .drain()
            .iter()
            .all(|f| !matches!(f, Frame::Text(t) if t.contains("disconnected"))));
    }

    #[tokio::test(start_paused = true)]
    async fn broadcast_lags_one_step_behind() {
        let (reclaim_tx, _reclaim_rx) = mpsc::channel(4);
        let room = Arc::new(Room::new(config(), reclaim_tx, SEED));
        let (p1, mut peer1) = seat(&room);
        let (p2, _peer2) = seat(&room);

        // queued before the match, applied before the first frame
        peer1.send_action(10);
        tokio::spawn(room.clone().run());
        started(peer1.next_status().await);

        let mut expected = Engine::new(p1.game_session_id, p2.game_session_id, SEED);
        expected.apply_action(p1.game_session_id, 10);

        for tick in 1..=5 {
            match peer1.next_msg().await {
                Some(ServerMsg::State(snapshot)) => {
                    assert_eq!(snapshot, expected.snapshot(), "tick {tick}");
                }
                other => panic!("expected state, got {other:?}"),
            }
            expected.step();
        }
        assert!(room.last_snapshot().is_some());
    }
}
