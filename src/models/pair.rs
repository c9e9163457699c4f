use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

use crate::error::{Result, SyncError};

/// 有向站点对的键: (入口站点ID, 出口站点ID)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PairKey {
    pub from_toll_id: i64,
    pub to_toll_id: i64,
}

impl PairKey {
    pub fn new(from_toll_id: i64, to_toll_id: i64) -> Self {
        Self {
            from_toll_id,
            to_toll_id,
        }
    }
}

/// 有向站点对 (CalculatePrice)
#[derive(Debug, Clone, PartialEq, Eq, FromRow, Serialize, Deserialize)]
pub struct DirectedTollPair {
    pub id: Uuid,
    pub from_toll_id: i64,
    pub to_toll_id: i64,
    pub state_calculator_id: Uuid,
}

impl DirectedTollPair {
    pub fn new(from_toll_id: i64, to_toll_id: i64, state_calculator_id: Uuid) -> Result<Self> {
        if from_toll_id == to_toll_id {
            return Err(SyncError::SelfPair(from_toll_id));
        }
        Ok(Self {
            id: Uuid::new_v4(),
            from_toll_id,
            to_toll_id,
            state_calculator_id,
        })
    }

    pub fn key(&self) -> PairKey {
        PairKey::new(self.from_toll_id, self.to_toll_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn self_pair_is_rejected() {
        let state = Uuid::new_v4();
        assert!(matches!(
            DirectedTollPair::new(7, 7, state),
            Err(SyncError::SelfPair(7))
        ));
        let pair = DirectedTollPair::new(7, 8, state).unwrap();
        assert_eq!(pair.key(), PairKey::new(7, 8));
    }
}
