//! Client action masks

/// What a player asked for in one action message
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    Stand,
    Right,
    Left,
    Jump,
    RightJump,
    LeftJump,
}

impl Action {
    /// Decode a mask sent by the client.
    ///
    /// Clients send the pressed keys as digits (`1` right, `10` jump, `100`
    /// left, combined as `11`, `110`, ...). Single-bit values `2` (jump) and
    /// `4` (left) are accepted too. `101` and `111` press both directions:
    /// the former cancels out, the latter only keeps the jump. Anything else
    /// is `None`.
    pub fn from_mask(mask: u32) -> Option<Self> {
        match mask {
            0 | 101 => Some(Action::Stand),
            1 => Some(Action::Right),
            4 | 100 => Some(Action::Left),
            2 | 10 | 111 => Some(Action::Jump),
            11 => Some(Action::RightJump),
            110 => Some(Action::LeftJump),
            _ => None,
        }
    }

    /// -1 for left, 1 for right, 0 otherwise
    pub fn direction(self) -> f64 {
        match self {
            Action::Right | Action::RightJump => 1.0,
            Action::Left | Action::LeftJump => -1.0,
            Action::Stand | Action::Jump => 0.0,
        }
    }

    pub fn jumps(self) -> bool {
        matches!(self, Action::Jump | Action::RightJump | Action::LeftJump)
    }
}
