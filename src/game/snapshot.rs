//! Snapshot building for network transmission

use crate::ws::protocol::{PlayerSnapshot, PointsSnapshot, ProductSnapshot, StateSnapshot};

use super::engine::{PlayerData, PointsData, ProductData, SimState};

impl From<&PlayerData> for PlayerSnapshot {
    fn from(p: &PlayerData) -> Self {
        Self {
            score: p.score,
            x: p.x,
            y: p.y,
            target_list: p.target_list.clone(),
        }
    }
}

impl From<&ProductData> for ProductSnapshot {
    fn from(p: &ProductData) -> Self {
        Self {
            x: p.x,
            y: p.y,
            kind: p.kind,
        }
    }
}

impl From<&PointsData> for PointsSnapshot {
    fn from(p: &PointsData) -> Self {
        Self {
            x: p.x,
            y: p.y,
            player_num: p.player_num,
            points: p.points,
        }
    }
}

/// Copy the simulation state out into its wire form.
/// Hidden fields (velocities, fall speeds) stay behind.
pub fn build(state: &SimState) -> StateSnapshot {
    StateSnapshot {
        player1: PlayerSnapshot::from(&state.player1),
        player2: PlayerSnapshot::from(&state.player2),
        products: state.products.iter().map(ProductSnapshot::from).collect(),
        collected: state.collected.iter().map(PointsSnapshot::from).collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::engine::Engine;
    use uuid::Uuid;

    #[test]
    fn snapshot_is_detached_from_engine() {
        let mut engine = Engine::new(Uuid::new_v4(), Uuid::new_v4(), 3);
        engine.spawn_product();
        let snapshot = engine.snapshot();

        engine.step();
        engine.state_mut().player1.score = 99;

        assert_eq!(snapshot.player1.score, 0);
        assert_eq!(snapshot.products.len(), 1);
        assert_eq!(snapshot.products[0].y, 100.0);
        assert!(engine.state().products[0].y < 100.0);
    }

    #[test]
    fn snapshot_carries_collected_points() {
        let mut engine = Engine::new(Uuid::new_v4(), Uuid::new_v4(), 3);
        engine.state_mut().collected.push(PointsData {
            x: 10.0,
            y: 11.0,
            player_num: 2,
            points: -1,
        });
        let snapshot = engine.snapshot();
        assert_eq!(
            snapshot.collected,
            vec![PointsSnapshot {
                x: 10.0,
                y: 11.0,
                player_num: 2,
                points: -1
            }]
        );
        assert_eq!(snapshot.player2.target_list, engine.state().player2.target_list);
    }
}
