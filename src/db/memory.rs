use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicUsize, Ordering};

use indexmap::IndexMap;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::db::store::{Changeset, TollStore};
use crate::error::Result;
use crate::models::{
    CommitSummary, DirectedTollPair, Polygon, PriceDimensions, PriceFact, PriceOwner,
    StateCalculator, TollPoint,
};

/// 内存存储, 与 Postgres 存储保持相同的唯一性与合并语义 (测试与试运行使用)
#[derive(Debug, Default)]
pub struct InMemoryStore {
    inner: RwLock<Tables>,
    region_fetches: AtomicUsize,
}

#[derive(Debug, Default)]
struct Tables {
    tolls: BTreeMap<i64, TollPoint>,
    states: HashMap<String, StateCalculator>,
    pairs: IndexMap<Uuid, DirectedTollPair>,
    pair_index: HashMap<(i64, i64, Uuid), Uuid>,
    prices: IndexMap<Uuid, PriceFact>,
    price_index: HashMap<(PriceOwner, PriceDimensions), Uuid>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_points(points: Vec<TollPoint>) -> Self {
        let tables = Tables {
            tolls: points.into_iter().map(|p| (p.id, p)).collect(),
            ..Tables::default()
        };
        Self {
            inner: RwLock::new(tables),
            region_fetches: AtomicUsize::new(0),
        }
    }

    /// 区域查询次数 (用于验证批量匹配只查询一次)
    pub fn region_fetch_count(&self) -> usize {
        self.region_fetches.load(Ordering::SeqCst)
    }

    pub async fn point(&self, id: i64) -> Option<TollPoint> {
        self.inner.read().await.tolls.get(&id).cloned()
    }

    pub async fn pairs(&self) -> Vec<DirectedTollPair> {
        self.inner.read().await.pairs.values().cloned().collect()
    }

    pub async fn prices(&self) -> Vec<PriceFact> {
        self.inner.read().await.prices.values().cloned().collect()
    }
}

impl TollStore for InMemoryStore {
    async fn fetch_points_in_region(&self, region: &Polygon) -> Result<Vec<TollPoint>> {
        self.region_fetches.fetch_add(1, Ordering::SeqCst);
        let tables = self.inner.read().await;
        Ok(tables
            .tolls
            .values()
            .filter(|p| p.location.map_or(false, |loc| region.contains(&loc)))
            .cloned()
            .collect())
    }

    async fn fetch_points_by_ids(&self, ids: &[i64]) -> Result<Vec<TollPoint>> {
        let tables = self.inner.read().await;
        Ok(ids.iter().filter_map(|id| tables.tolls.get(id).cloned()).collect())
    }

    async fn fetch_pairs_by_ids(&self, ids: &[Uuid]) -> Result<Vec<DirectedTollPair>> {
        let tables = self.inner.read().await;
        Ok(ids.iter().filter_map(|id| tables.pairs.get(id).cloned()).collect())
    }

    async fn fetch_pairs_for_state(&self, state_calculator_id: Uuid) -> Result<Vec<DirectedTollPair>> {
        let tables = self.inner.read().await;
        Ok(tables
            .pairs
            .values()
            .filter(|p| p.state_calculator_id == state_calculator_id)
            .cloned()
            .collect())
    }

    async fn fetch_prices_for_owners(&self, owners: &[PriceOwner]) -> Result<Vec<PriceFact>> {
        let tables = self.inner.read().await;
        Ok(tables
            .prices
            .values()
            .filter(|f| owners.contains(&f.owner))
            .cloned()
            .collect())
    }

    async fn find_state_calculator(&self, state_code: &str) -> Result<Option<StateCalculator>> {
        let tables = self.inner.read().await;
        Ok(tables.states.get(&state_code.to_uppercase()).cloned())
    }

    async fn commit(&self, changes: Changeset) -> Result<CommitSummary> {
        let mut guard = self.inner.write().await;
        let tables = &mut *guard;
        let mut summary = CommitSummary::default();

        // 1. 州计算器: 按州代码合并
        let mut state_ids: HashMap<Uuid, Uuid> = HashMap::new();
        for state in changes.state_calculators {
            let client_id = state.id;
            let code = state.state_code.to_uppercase();
            let actual = match tables.states.get_mut(&code) {
                Some(existing) => {
                    existing.name = state.name;
                    existing.id
                }
                None => {
                    tables.states.insert(
                        code.clone(),
                        StateCalculator {
                            id: client_id,
                            name: state.name,
                            state_code: code,
                        },
                    );
                    client_id
                }
            };
            state_ids.insert(client_id, actual);
            summary.state_calculators += 1;
        }

        // 2. 站点: 归属与半径分别只写各自的列
        for assignment in changes.assignments {
            if let Some(existing) = tables.tolls.get_mut(&assignment.toll_id) {
                if assignment.number.is_some() {
                    existing.number = assignment.number;
                }
                existing.state_calculator_id = Some(
                    *state_ids
                        .get(&assignment.state_calculator_id)
                        .unwrap_or(&assignment.state_calculator_id),
                );
                summary.tolls_updated += 1;
            }
        }
        for update in changes.radii {
            if let Some(existing) = tables.tolls.get_mut(&update.toll_id) {
                existing.search_radius_m = update.search_radius_m;
                summary.tolls_updated += 1;
            }
        }

        // 3. 站点对: (from, to, state) 冲突时保留已有行
        let mut pair_ids: HashMap<Uuid, Uuid> = HashMap::new();
        for mut pair in changes.pairs {
            pair.state_calculator_id = *state_ids
                .get(&pair.state_calculator_id)
                .unwrap_or(&pair.state_calculator_id);
            let key = (pair.from_toll_id, pair.to_toll_id, pair.state_calculator_id);
            let actual = match tables.pair_index.get(&key) {
                Some(existing) => *existing,
                None => {
                    tables.pair_index.insert(key, pair.id);
                    tables.pairs.insert(pair.id, pair.clone());
                    pair.id
                }
            };
            pair_ids.insert(pair.id, actual);
            summary.pairs_upserted += 1;
        }

        // 4. 价格: (归属, 维度) 冲突时覆盖金额, 保留已有的细化字段
        for mut fact in changes.prices {
            if let PriceOwner::Pair(id) = fact.owner {
                fact.owner = PriceOwner::Pair(*pair_ids.get(&id).unwrap_or(&id));
            }
            let key = (fact.owner, fact.dimensions);
            let existing = tables
                .price_index
                .get(&key)
                .and_then(|id| tables.prices.get_mut(id));
            match existing {
                Some(existing) => {
                    existing.amount = fact.amount;
                    if fact.description.as_deref().map_or(false, |d| !d.trim().is_empty()) {
                        existing.description = fact.description;
                    }
                    if fact.time_from.is_some() {
                        existing.time_from = fact.time_from;
                    }
                    if fact.time_to.is_some() {
                        existing.time_to = fact.time_to;
                    }
                }
                None => {
                    tables.price_index.insert(key, fact.id);
                    tables.prices.insert(fact.id, fact);
                }
            }
            summary.prices_upserted += 1;
        }

        Ok(summary)
    }

    async fn purge_region(&self, region: &Polygon) -> Result<u64> {
        let mut guard = self.inner.write().await;
        let tables = &mut *guard;

        let toll_ids: Vec<i64> = tables
            .tolls
            .values()
            .filter(|p| p.location.map_or(false, |loc| region.contains(&loc)))
            .map(|p| p.id)
            .collect();

        let pair_ids: Vec<Uuid> = tables
            .pairs
            .values()
            .filter(|p| toll_ids.contains(&p.from_toll_id))
            .map(|p| p.id)
            .collect();

        let doomed: Vec<Uuid> = tables
            .prices
            .values()
            .filter(|f| match f.owner {
                PriceOwner::Toll(id) => toll_ids.contains(&id),
                PriceOwner::Pair(id) => pair_ids.contains(&id),
            })
            .map(|f| f.id)
            .collect();

        for id in &doomed {
            if let Some(fact) = tables.prices.shift_remove(id) {
                tables.price_index.remove(&(fact.owner, fact.dimensions));
            }
        }
        for id in &pair_ids {
            if let Some(pair) = tables.pairs.shift_remove(id) {
                tables
                    .pair_index
                    .remove(&(pair.from_toll_id, pair.to_toll_id, pair.state_calculator_id));
            }
        }

        Ok(doomed.len() as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::store::{RadiusUpdate, TollAssignment};
    use crate::models::GeoPoint;

    fn store() -> InMemoryStore {
        let mut toll = TollPoint::new(7, "Exit 7", Some(GeoPoint::new(39.2, -76.6)));
        toll.number = Some("7A".to_string());
        InMemoryStore::with_points(vec![toll])
    }

    #[tokio::test]
    async fn assignments_leave_radius_untouched() {
        let store = store();
        store
            .commit(Changeset {
                radii: vec![RadiusUpdate {
                    toll_id: 7,
                    search_radius_m: 149.95,
                }],
                ..Changeset::default()
            })
            .await
            .unwrap();

        let state = Uuid::new_v4();
        let summary = store
            .commit(Changeset {
                assignments: vec![TollAssignment {
                    toll_id: 7,
                    number: None,
                    state_calculator_id: state,
                }],
                ..Changeset::default()
            })
            .await
            .unwrap();

        let toll = store.point(7).await.unwrap();
        assert_eq!(summary.tolls_updated, 1);
        assert_eq!(toll.search_radius_m, 149.95);
        assert_eq!(toll.number.as_deref(), Some("7A"));
        assert_eq!(toll.state_calculator_id, Some(state));
    }

    #[tokio::test]
    async fn radius_updates_leave_number_untouched() {
        let store = store();
        store
            .commit(Changeset {
                assignments: vec![TollAssignment {
                    toll_id: 7,
                    number: Some("7B".to_string()),
                    state_calculator_id: Uuid::new_v4(),
                }],
                ..Changeset::default()
            })
            .await
            .unwrap();
        store
            .commit(Changeset {
                radii: vec![RadiusUpdate {
                    toll_id: 7,
                    search_radius_m: 500.0,
                }],
                ..Changeset::default()
            })
            .await
            .unwrap();

        let toll = store.point(7).await.unwrap();
        assert_eq!(toll.number.as_deref(), Some("7B"));
        assert_eq!(toll.search_radius_m, 500.0);
    }

    #[tokio::test]
    async fn unknown_tolls_are_not_counted() {
        let summary = store()
            .commit(Changeset {
                radii: vec![RadiusUpdate {
                    toll_id: 99,
                    search_radius_m: 10.0,
                }],
                ..Changeset::default()
            })
            .await
            .unwrap();
        assert_eq!(summary.tolls_updated, 0);
    }
}
