//! Matchmaking service - places sessions into rooms and reclaims finished ones

use dashmap::DashMap;
use parking_lot::Mutex;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::game::room::ROOM_CAPACITY;
use crate::game::session::{send_frame, Frame};
use crate::game::{Room, RoomConfig, RoomPhase, Session};
use crate::store::ResultReporter;
use crate::ws::protocol::ServerMsg;

/// Pending sessions waiting for placement
pub const SUBMIT_QUEUE_SIZE: usize = 1024;
const RECLAIM_QUEUE_SIZE: usize = 256;
/// Placement retries when the chosen room fills up concurrently
const PLACEMENT_ATTEMPTS: usize = 5;

#[derive(Debug, thiserror::Error)]
pub enum MatchmakingError {
    #[error("user is already in a match")]
    AlreadyInMatch,

    #[error("room limit of {0} reached")]
    CapacityExceeded(usize),

    #[error("matchmaking queue is full")]
    QueueFull,

    #[error("matchmaking service stopped")]
    Closed,
}

type ServiceQueues = (mpsc::Receiver<Session>, mpsc::Receiver<Uuid>);

/// Matchmaking service
pub struct MatchmakingService {
    rooms: DashMap<Uuid, Arc<Room>>,
    /// Live room counter, checked and updated under the lock
    total: Mutex<usize>,
    max_rooms: usize,
    room_config: RoomConfig,
    reporter: Arc<dyn ResultReporter>,
    submit_tx: mpsc::Sender<Session>,
    reclaim_tx: mpsc::Sender<Uuid>,
    queues: Mutex<Option<ServiceQueues>>,
}

impl MatchmakingService {
    pub fn new(max_rooms: usize, room_config: RoomConfig, reporter: Arc<dyn ResultReporter>) -> Self {
        let (submit_tx, submit_rx) = mpsc::channel(SUBMIT_QUEUE_SIZE);
        let (reclaim_tx, reclaim_rx) = mpsc::channel(RECLAIM_QUEUE_SIZE);

        Self {
            rooms: DashMap::new(),
            total: Mutex::new(0),
            max_rooms,
            room_config,
            reporter,
            submit_tx,
            reclaim_tx,
            queues: Mutex::new(Some((submit_rx, reclaim_rx))),
        }
    }

    /// Hand a fresh session over for placement without waiting
    pub fn submit(&self, session: Session) -> Result<(), MatchmakingError> {
        let (user_id, session_id) = (session.user_id, session.session_id.clone());
        self.submit_tx.try_send(session).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => MatchmakingError::QueueFull,
            mpsc::error::TrySendError::Closed(_) => MatchmakingError::Closed,
        })?;

        debug!(user_id = %user_id, session_id = %session_id, "Session submitted for matchmaking");
        Ok(())
    }

    /// Number of live rooms
    pub fn active_rooms(&self) -> usize {
        self.rooms.len()
    }

    /// Room the user currently plays in
    #[cfg(test)]
    pub fn find_user_room(&self, user_id: &Uuid) -> Option<Arc<Room>> {
        self.rooms
            .iter()
            .find(|r| r.has_user(user_id))
            .map(|r| r.value().clone())
    }

    /// Run the matchmaking event loop
    pub async fn run(self: Arc<Self>) {
        let Some((mut submissions, mut reclaims)) = self.queues.lock().take() else {
            error!("Matchmaking service is already running");
            return;
        };
        info!(max_rooms = self.max_rooms, "Matchmaking service started");

        loop {
            tokio::select! {
                Some(session) = submissions.recv() => {
                    tokio::spawn(self.clone().place(session));
                }
                Some(room_id) = reclaims.recv() => {
                    let service = self.clone();
                    tokio::spawn(async move { service.reclaim(room_id).await });
                }
                else => break,
            }
        }
    }

    async fn place(self: Arc<Self>, mut session: Session) {
        let user_id = session.user_id;

        for attempt in 1..=PLACEMENT_ATTEMPTS {
            let room = match self.find_room(&user_id) {
                Ok(room) => room,
                Err(MatchmakingError::AlreadyInMatch) => {
                    warn!(user_id = %user_id, "User is already playing, rejecting connection");
                    self.reject_playing(session).await;
                    return;
                }
                Err(e) => {
                    error!(user_id = %user_id, error = %e, "Cannot place player");
                    return;
                }
            };

            match room.try_register(session) {
                Ok((player, occupancy)) => {
                    player.send(ServerMsg::Connected);
                    if occupancy == ROOM_CAPACITY {
                        tokio::spawn(room.run());
                    }
                    return;
                }
                Err(returned) => {
                    debug!(user_id = %user_id, room_id = %room.id, attempt, "Room closed before registration");
                    session = returned;
                }
            }
        }

        warn!(user_id = %user_id, "Giving up on placing player");
    }

    /// Open room for the user, creating one if none is left
    fn find_room(&self, user_id: &Uuid) -> Result<Arc<Room>, MatchmakingError> {
        let mut open = None;
        for room in self.rooms.iter() {
            if room.has_user(user_id) {
                return Err(MatchmakingError::AlreadyInMatch);
            }
            if open.is_none() && room.phase() == RoomPhase::Waiting && room.occupancy() < ROOM_CAPACITY {
                open = Some(room.value().clone());
            }
        }

        match open {
            Some(room) => Ok(room),
            None => self.create_room(),
        }
    }

    fn create_room(&self) -> Result<Arc<Room>, MatchmakingError> {
        let mut total = self.total.lock();
        if *total >= self.max_rooms {
            return Err(MatchmakingError::CapacityExceeded(self.max_rooms));
        }
        *total += 1;

        let room = Arc::new(Room::new(self.room_config, self.reclaim_tx.clone(), rand::random()));
        self.rooms.insert(room.id, room.clone());
        info!(room_id = %room.id, total = *total, "Created room");

        Ok(room)
    }

    /// Tell a duplicate connection the user is already playing, then close it
    async fn reject_playing(&self, session: Session) {
        let Session { user_id, mut sink, .. } = session;
        let deadline = self.room_config.write_timeout;

        match serde_json::to_string(&ServerMsg::Playing) {
            Ok(text) => {
                if let Err(e) = send_frame(&mut sink, Frame::Text(text), deadline).await {
                    debug!(user_id = %user_id, error = %e, "Playing notice not delivered");
                    return;
                }
            }
            Err(e) => error!(user_id = %user_id, error = %e, "Failed to encode playing notice"),
        }

        if let Err(e) = send_frame(&mut sink, Frame::Close, deadline).await {
            debug!(user_id = %user_id, error = %e, "Close frame not delivered");
        }
    }

    /// Drop a finished room and report its results
    async fn reclaim(&self, room_id: Uuid) {
        let Some((_, room)) = self.rooms.remove(&room_id) else {
            error!(room_id = %room_id, "Reclaim of an unknown room");
            return;
        };
        {
            let mut total = self.total.lock();
            *total = total.saturating_sub(1);
            info!(room_id = %room_id, total = *total, "Room reclaimed");
        }

        let Some(summary) = room.take_summary() else {
            error!(room_id = %room_id, "Finished room has no match summary");
            return;
        };
        let records = match summary.records() {
            Ok(records) => records,
            Err(e) => {
                error!(room_id = %room_id, error = %e, "Cannot derive match results");
                return;
            }
        };

        for record in &records {
            if let Err(e) = self.reporter.report(record).await {
                error!(
                    room_id = %room_id,
                    user_id = %record.user_id,
                    error = %e,
                    "Failed to report match result"
                );
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::session::testing::{self, Peer};
    use crate::game::GameResult;
    use crate::store::reporter::testing::RecordingReporter;
    use std::time::Duration;

    fn room_config() -> RoomConfig {
        RoomConfig {
            match_duration: Duration::from_secs(3),
            spawn_interval: Duration::from_secs(60),
            ..RoomConfig::default()
        }
    }

    fn start(max_rooms: usize) -> (Arc<MatchmakingService>, Arc<RecordingReporter>) {
        let reporter = Arc::new(RecordingReporter::default());
        let service = Arc::new(MatchmakingService::new(max_rooms, room_config(), reporter.clone()));
        tokio::spawn(service.clone().run());
        (service, reporter)
    }

    fn connect(service: &MatchmakingService, user_id: Uuid) -> Peer {
        let (session, peer) = testing::session(user_id);
        service.submit(session).unwrap();
        peer
    }

    async fn wait_until(mut done: impl FnMut() -> bool) {
        for _ in 0..1_000 {
            if done() {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("condition not reached");
    }

    #[tokio::test(start_paused = true)]
    async fn two_users_share_one_running_room() {
        let (service, _) = start(10);
        let (a, b) = (Uuid::new_v4(), Uuid::new_v4());
        let mut peer_a = connect(&service, a);
        let mut peer_b = connect(&service, b);

        assert_eq!(peer_a.next_status().await, Some(ServerMsg::Connected));
        assert_eq!(peer_b.next_status().await, Some(ServerMsg::Connected));
        assert!(matches!(peer_a.next_status().await, Some(ServerMsg::Started(_))));
        assert!(matches!(peer_b.next_status().await, Some(ServerMsg::Started(_))));

        assert_eq!(service.active_rooms(), 1);
        let room = service.find_user_room(&a).expect("room of a");
        assert!(room.has_user(&b));
        assert_eq!(room.phase(), RoomPhase::Running);
    }

    #[tokio::test(start_paused = true)]
    async fn second_connection_of_a_player_is_turned_away() {
        let (service, _) = start(10);
        let (a, b) = (Uuid::new_v4(), Uuid::new_v4());
        let mut peer_a = connect(&service, a);
        let _peer_b = connect(&service, b);
        assert_eq!(peer_a.next_status().await, Some(ServerMsg::Connected));

        let mut again = connect(&service, a);
        assert_eq!(again.next_msg().await, Some(ServerMsg::Playing));
        assert_eq!(again.next_frame().await, Some(Frame::Close));
        assert_eq!(again.next_frame().await, None);

        assert_eq!(service.active_rooms(), 1);
        assert!(matches!(peer_a.next_status().await, Some(ServerMsg::Started(_))));
    }

    #[tokio::test(start_paused = true)]
    async fn room_limit_drops_extra_sessions() {
        let (service, _) = start(1);
        let mut peer_a = connect(&service, Uuid::new_v4());
        let _peer_b = connect(&service, Uuid::new_v4());
        assert_eq!(peer_a.next_status().await, Some(ServerMsg::Connected));
        assert!(matches!(peer_a.next_status().await, Some(ServerMsg::Started(_))));

        let mut peer_c = connect(&service, Uuid::new_v4());
        // dropped without a word
        assert_eq!(peer_c.next_frame().await, None);
        assert_eq!(service.active_rooms(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn finished_match_is_reported_and_reclaimed() {
        let (service, reporter) = start(10);
        let (a, b) = (Uuid::new_v4(), Uuid::new_v4());
        let mut peer_a = connect(&service, a);
        let mut peer_b = connect(&service, b);
        for peer in [&mut peer_a, &mut peer_b] {
            assert_eq!(peer.next_status().await, Some(ServerMsg::Connected));
            assert!(matches!(peer.next_status().await, Some(ServerMsg::Started(_))));
        }

        assert_eq!(peer_a.next_status().await, Some(ServerMsg::TimeOver));
        wait_until(|| reporter.records().len() == 2).await;

        assert_eq!(service.active_rooms(), 0);
        let records = reporter.records();
        assert!(records.iter().all(|r| r.result == GameResult::Draw && r.score == 0));
        let mut users: Vec<Uuid> = records.iter().map(|r| r.user_id).collect();
        users.sort();
        let mut expected = vec![a, b];
        expected.sort();
        assert_eq!(users, expected);
    }

    #[tokio::test(start_paused = true)]
    async fn leaver_loses_and_room_is_reclaimed_once() {
        let (service, reporter) = start(10);
        let (a, b) = (Uuid::new_v4(), Uuid::new_v4());
        let mut peer_a = connect(&service, a);
        let mut peer_b = connect(&service, b);
        for peer in [&mut peer_a, &mut peer_b] {
            assert_eq!(peer.next_status().await, Some(ServerMsg::Connected));
            assert!(matches!(peer.next_status().await, Some(ServerMsg::Started(_))));
        }

        peer_a.fail_read();

        assert_eq!(peer_b.next_status().await, Some(ServerMsg::Disconnected));
        wait_until(|| reporter.records().len() == 2).await;
        // let any second reclaim surface
        tokio::time::sleep(Duration::from_secs(5)).await;

        let records = reporter.records();
        assert_eq!(records.len(), 2);
        let result_of = |user| records.iter().find(|r| r.user_id == user).map(|r| r.result);
        assert_eq!(result_of(a), Some(GameResult::Loss));
        assert_eq!(result_of(b), Some(GameResult::Win));
        assert_eq!(service.active_rooms(), 0);
        assert_eq!(*service.total.lock(), 0);

        // the user can play again
        let mut again = connect(&service, a);
        assert_eq!(again.next_status().await, Some(ServerMsg::Connected));
    }
}
