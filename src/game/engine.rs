//! Authoritative simulation of one match
//!
//! The engine is owned by the room loop and never shared, so it carries no
//! locks. Every call mutates the state synchronously.

use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use std::collections::HashMap;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::ws::protocol::StateSnapshot;

use super::action::Action;
use super::physics::{
    jump_step, move_horizontally, round2, Hitbox, PLAYER_BASE_Y, PLAYER_JUMP_SPEED,
    PRODUCT_MIN_Y, PRODUCT_SPEED, SPAWN_Y,
};
use super::snapshot;

/// Length of a fresh target list
pub const TARGET_COUNT: usize = 4;
/// Product types are 1..=TARGET_VARIETY
pub const TARGET_VARIETY: u8 = 6;

pub const SUCCESS_POINTS: i32 = 3;
pub const FAILURE_POINTS: i32 = -1;

/// Products spawn within [SPAWN_MARGIN, 100 - SPAWN_MARGIN]
const SPAWN_MARGIN: f64 = 5.0;

/// Player state (authoritative)
#[derive(Debug, Clone, PartialEq)]
pub struct PlayerData {
    pub score: i32,
    pub x: f64,
    pub y: f64,
    pub target_list: Vec<u8>,
    pub speed_y: f64,
    pub jumps: bool,
}

impl PlayerData {
    fn new(x: f64, target_list: Vec<u8>) -> Self {
        Self {
            score: 0,
            x,
            y: PLAYER_BASE_Y,
            target_list,
            speed_y: 0.0,
            jumps: false,
        }
    }

    fn apply(&mut self, action: Action) {
        if action.jumps() && !self.jumps {
            self.speed_y = PLAYER_JUMP_SPEED;
            self.jumps = true;
        }
        let direction = action.direction();
        if direction != 0.0 {
            self.x = move_horizontally(self.x, direction);
        }
    }

    fn perform_jump(&mut self) {
        let (y, speed_y, airborne) = jump_step(self.y, self.speed_y);
        self.y = y;
        self.speed_y = speed_y;
        self.jumps = airborne;
    }

    /// Award the product if it is wanted, penalize otherwise.
    /// Returns the points shown to the clients.
    fn catch(&mut self, kind: u8) -> i32 {
        let before = self.target_list.len();
        self.target_list.retain(|&target| target != kind);
        let matched = before - self.target_list.len();

        if matched > 0 {
            self.score += SUCCESS_POINTS * matched as i32;
            SUCCESS_POINTS
        } else {
            self.score += FAILURE_POINTS;
            FAILURE_POINTS
        }
    }
}

/// Falling product
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ProductData {
    pub x: f64,
    pub y: f64,
    pub kind: u8,
    pub speed: f64,
}

/// Points earned or lost at a catch, visible for one frame
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PointsData {
    pub x: f64,
    pub y: f64,
    pub player_num: u8,
    pub points: i32,
}

/// Whole simulation state
#[derive(Debug, Clone, PartialEq)]
pub struct SimState {
    pub player1: PlayerData,
    pub player2: PlayerData,
    pub products: Vec<ProductData>,
    pub collected: Vec<PointsData>,
}

impl SimState {
    pub fn player(&self, num: u8) -> &PlayerData {
        if num == 1 {
            &self.player1
        } else {
            &self.player2
        }
    }

    fn player_mut(&mut self, num: u8) -> &mut PlayerData {
        if num == 1 {
            &mut self.player1
        } else {
            &mut self.player2
        }
    }
}

/// Draw a target list of `count` types from 1..=variety, unique when possible
pub fn generate_target_list<R: Rng + ?Sized>(rng: &mut R, count: usize, variety: u8) -> Vec<u8> {
    if usize::from(variety) >= count {
        let mut pool: Vec<u8> = (1..=variety).collect();
        pool.shuffle(rng);
        pool.truncate(count);
        pool
    } else {
        (0..count).map(|_| rng.gen_range(1..=variety)).collect()
    }
}

/// The game engine of a single room
pub struct Engine {
    /// Match-scoped player id -> player number (1 or 2)
    players: HashMap<Uuid, u8>,
    state: SimState,
    rng: ChaCha8Rng,
}

impl Engine {
    /// Create an engine for two players, `player1` gets number 1
    pub fn new(player1: Uuid, player2: Uuid, seed: u64) -> Self {
        let mut rng = ChaCha8Rng::seed_from_u64(seed);
        let state = SimState {
            player1: PlayerData::new(25.0, generate_target_list(&mut rng, TARGET_COUNT, TARGET_VARIETY)),
            player2: PlayerData::new(75.0, generate_target_list(&mut rng, TARGET_COUNT, TARGET_VARIETY)),
            products: Vec::with_capacity(16),
            collected: Vec::with_capacity(4),
        };

        let mut players = HashMap::with_capacity(2);
        players.insert(player1, 1);
        players.insert(player2, 2);

        Self {
            players,
            state,
            rng,
        }
    }

    pub fn player_number(&self, game_session_id: &Uuid) -> Option<u8> {
        self.players.get(game_session_id).copied()
    }

    pub fn state(&self) -> &SimState {
        &self.state
    }

    #[cfg(test)]
    pub(crate) fn state_mut(&mut self) -> &mut SimState {
        &mut self.state
    }

    /// Copy of the current state in wire form
    pub fn snapshot(&self) -> StateSnapshot {
        snapshot::build(&self.state)
    }

    /// Advance the simulation by one frame
    pub fn step(&mut self) {
        let state = &mut self.state;
        state.collected.clear();

        for i in (0..state.products.len()).rev() {
            let product = &mut state.products[i];
            product.y = round2(product.y - product.speed);
            let product = *product;

            let hitbox = Hitbox::product(product.x, product.y);
            let p1_caught = hitbox.overlaps(&Hitbox::player(state.player1.x, state.player1.y));
            let p2_caught = hitbox.overlaps(&Hitbox::player(state.player2.x, state.player2.y));

            for (caught, num) in [(p1_caught, 1u8), (p2_caught, 2u8)] {
                if !caught {
                    continue;
                }
                let points = state.player_mut(num).catch(product.kind);
                state.collected.push(PointsData {
                    x: product.x,
                    y: product.y,
                    player_num: num,
                    points,
                });
                info!(
                    player_num = num,
                    kind = product.kind,
                    points,
                    "Product caught at ({}, {})",
                    product.x,
                    product.y
                );
            }

            if p1_caught || p2_caught || product.y < PRODUCT_MIN_Y {
                state.products.remove(i);
            }
        }

        for player in [&mut state.player1, &mut state.player2] {
            if player.jumps {
                player.perform_jump();
            }
        }

        for player in [&mut state.player1, &mut state.player2] {
            if player.target_list.is_empty() {
                player.target_list = generate_target_list(&mut self.rng, TARGET_COUNT, TARGET_VARIETY);
            }
        }
    }

    /// Apply a client action mask right away
    pub fn apply_action(&mut self, game_session_id: Uuid, mask: u32) {
        let Some(num) = self.player_number(&game_session_id) else {
            warn!(game_session_id = %game_session_id, "Action from a player not in this match");
            return;
        };

        match Action::from_mask(mask) {
            Some(Action::Stand) => {
                debug!(game_session_id = %game_session_id, "Player stands still");
            }
            Some(action) => {
                debug!(game_session_id = %game_session_id, ?action, "Player action");
                self.state.player_mut(num).apply(action);
            }
            None => {
                warn!(game_session_id = %game_session_id, mask, "Unknown action mask");
            }
        }
    }

    /// Drop a new random product from the top
    pub fn spawn_product(&mut self) {
        let product = ProductData {
            x: round2(self.rng.gen::<f64>() * (100.0 - 2.0 * SPAWN_MARGIN) + SPAWN_MARGIN),
            y: SPAWN_Y,
            kind: self.rng.gen_range(1..=TARGET_VARIETY),
            speed: round2(PRODUCT_SPEED + self.rng.gen::<f64>() * PRODUCT_SPEED / 2.0),
        };
        debug!(?product, "New product");
        self.state.products.push(product);
    }
}
