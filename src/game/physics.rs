//! Movement constants, jump physics and catch collision
//!
//! All coordinates live in a normalized 0-100 space on both axes, Y grows
//! upwards and the player stands on a fixed ground baseline.

/// Horizontal distance covered per action
pub const PLAYER_SPEED: f64 = 1.7;
/// Ground level of the players
pub const PLAYER_BASE_Y: f64 = 8.7;
/// Initial upward velocity of a jump
pub const PLAYER_JUMP_SPEED: f64 = 4.0;
/// Velocity lost per frame while airborne
pub const PLAYER_GRAVITY: f64 = 0.4;
pub const PLAYER_WIDTH: f64 = 10.0;
pub const PLAYER_HEIGHT: f64 = 18.0;

/// Nominal fall speed per frame, actual speeds are in [speed, 1.5 * speed]
pub const PRODUCT_SPEED: f64 = 0.40;
/// Products below this line have faded out of view
pub const PRODUCT_MIN_Y: f64 = -10.0;
pub const PRODUCT_WIDTH: f64 = 5.0;
pub const PRODUCT_HEIGHT: f64 = 5.0;

pub const MIN_X: f64 = 0.0;
pub const MAX_X: f64 = 100.0;
/// Products appear at the top edge
pub const SPAWN_Y: f64 = 100.0;

// Hitboxes follow the client sprites: the anchor offsets are integer halves
// of the trimmed sprite and the extents cut the transparent borders.
const PRODUCT_ANCHOR_X: f64 = 2.0;
const PRODUCT_ANCHOR_Y: f64 = -1.0;
const PRODUCT_HIT_WIDTH: f64 = PRODUCT_WIDTH - 0.5;
const PRODUCT_HIT_HEIGHT: f64 = PRODUCT_HEIGHT - 4.0;
const PLAYER_ANCHOR_X: f64 = 4.0;
const PLAYER_ANCHOR_Y: f64 = 1.0;
const PLAYER_HIT_WIDTH: f64 = PLAYER_WIDTH - 1.0;
const PLAYER_HIT_HEIGHT: f64 = PLAYER_HEIGHT - 7.5;

/// Round to the two decimals clients work with
pub fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// Axis-aligned rectangle anchored at its lower-left corner
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Hitbox {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

impl Hitbox {
    pub fn product(x: f64, y: f64) -> Self {
        Self {
            x: x - PRODUCT_ANCHOR_X,
            y: y - PRODUCT_ANCHOR_Y,
            width: PRODUCT_HIT_WIDTH,
            height: PRODUCT_HIT_HEIGHT,
        }
    }

    pub fn player(x: f64, y: f64) -> Self {
        Self {
            x: x - PLAYER_ANCHOR_X,
            y: y - PLAYER_ANCHOR_Y,
            width: PLAYER_HIT_WIDTH,
            height: PLAYER_HIT_HEIGHT,
        }
    }

    /// Overlap on both axes, touching edges count
    pub fn overlaps(&self, other: &Hitbox) -> bool {
        let x_overlap = self.x + self.width >= other.x && self.x <= other.x + other.width;
        let y_overlap = self.y + self.height >= other.y && self.y <= other.y + other.height;
        x_overlap && y_overlap
    }
}

/// Shift a horizontal position by `direction * PLAYER_SPEED`, clamped to the field
pub fn move_horizontally(x: f64, direction: f64) -> f64 {
    round2(x + direction * PLAYER_SPEED).clamp(MIN_X, MAX_X)
}

/// One frame of a jump. Returns (new_y, new_speed_y, still_airborne)
pub fn jump_step(y: f64, speed_y: f64) -> (f64, f64, bool) {
    let new_y = round2(y + speed_y);
    let new_speed = round2(speed_y - PLAYER_GRAVITY);
    if new_y <= PLAYER_BASE_Y {
        (PLAYER_BASE_Y, 0.0, false)
    } else {
        (new_y, new_speed, true)
    }
}
