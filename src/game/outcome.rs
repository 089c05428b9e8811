//! Match outcome and the per-player results derived from it

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Why a match ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchOutcome {
    /// Match timer elapsed, scores decide
    TimeExpired,
    /// A player left; carries their match-scoped id
    Disconnected { left: Uuid },
}

/// Result stored in the player's profile
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GameResult {
    Win,
    Loss,
    Draw,
}

/// Identity of one participant, captured when the match starts
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Participant {
    pub user_id: Uuid,
    pub game_session_id: Uuid,
    pub player_num: u8,
}

/// Everything the matchmaker needs once a room finished
#[derive(Debug, Clone, PartialEq)]
pub struct MatchSummary {
    pub outcome: MatchOutcome,
    pub player1: Participant,
    pub player2: Participant,
    pub score1: i32,
    pub score2: i32,
}

/// One row for the result reporter
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MatchRecord {
    pub user_id: Uuid,
    pub score: i32,
    pub result: GameResult,
}

impl MatchSummary {
    /// Results for both participants, or an error string if the
    /// disconnected player is not one of them
    pub fn records(&self) -> Result<[MatchRecord; 2], String> {
        let (result1, result2) = match self.outcome {
            MatchOutcome::TimeExpired => {
                let (s1, s2) = (self.score1, self.score2);
                if s1 == s2 || (s1 < 0 && s2 < 0) {
                    (GameResult::Draw, GameResult::Draw)
                } else if s1 > s2 {
                    (GameResult::Win, GameResult::Loss)
                } else {
                    (GameResult::Loss, GameResult::Win)
                }
            }
            MatchOutcome::Disconnected { left } => {
                if left == self.player1.game_session_id {
                    (GameResult::Loss, GameResult::Win)
                } else if left == self.player2.game_session_id {
                    (GameResult::Win, GameResult::Loss)
                } else {
                    return Err(format!("left player {left} is not part of the match"));
                }
            }
        };

        Ok([
            MatchRecord {
                user_id: self.player1.user_id,
                score: self.score1,
                result: result1,
            },
            MatchRecord {
                user_id: self.player2.user_id,
                score: self.score2,
                result: result2,
            },
        ])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn participant(num: u8) -> Participant {
        Participant {
            user_id: Uuid::new_v4(),
            game_session_id: Uuid::new_v4(),
            player_num: num,
        }
    }

    fn summary(outcome: MatchOutcome, score1: i32, score2: i32) -> MatchSummary {
        MatchSummary {
            outcome,
            player1: participant(1),
            player2: participant(2),
            score1,
            score2,
        }
    }

    #[test]
    fn higher_score_wins_on_time() {
        let s = summary(MatchOutcome::TimeExpired, 10, 7);
        let [r1, r2] = s.records().unwrap();
        assert_eq!((r1.user_id, r1.score, r1.result), (s.player1.user_id, 10, GameResult::Win));
        assert_eq!((r2.user_id, r2.score, r2.result), (s.player2.user_id, 7, GameResult::Loss));

        let [r1, r2] = summary(MatchOutcome::TimeExpired, 2, 5).records().unwrap();
        assert_eq!((r1.result, r2.result), (GameResult::Loss, GameResult::Win));
    }

    #[test]
    fn equal_or_both_negative_is_a_draw() {
        for (a, b) in [(4, 4), (-1, -6), (0, 0)] {
            let [r1, r2] = summary(MatchOutcome::TimeExpired, a, b).records().unwrap();
            assert_eq!((r1.result, r2.result), (GameResult::Draw, GameResult::Draw), "{a} vs {b}");
        }
        // one negative is still decided by score
        let [r1, _] = summary(MatchOutcome::TimeExpired, -1, 0).records().unwrap();
        assert_eq!(r1.result, GameResult::Loss);
    }

    #[test]
    fn leaver_loses_regardless_of_score() {
        let mut s = summary(MatchOutcome::TimeExpired, 12, 0);
        s.outcome = MatchOutcome::Disconnected {
            left: s.player1.game_session_id,
        };
        let [r1, r2] = s.records().unwrap();
        assert_eq!((r1.score, r1.result), (12, GameResult::Loss));
        assert_eq!((r2.score, r2.result), (0, GameResult::Win));

        s.outcome = MatchOutcome::Disconnected {
            left: s.player2.game_session_id,
        };
        let [r1, r2] = s.records().unwrap();
        assert_eq!((r1.result, r2.result), (GameResult::Win, GameResult::Loss));
    }

    #[test]
    fn stranger_leaving_is_an_error() {
        let s = summary(
            MatchOutcome::Disconnected {
                left: Uuid::new_v4(),
            },
            1,
            1,
        );
        assert!(s.records().is_err());
    }
}
