use std::collections::{HashMap, HashSet};

use indexmap::{IndexMap, IndexSet};
use uuid::Uuid;

use crate::db::TollStore;
use crate::error::Result;
use crate::models::{PriceFact, PriceFactRequest, PriceOwner};

/// 按归属索引的价格矩阵
///
/// 每次任务加载一次; `set_price` 只修改内存索引, 并把新建/更新的记录
/// 记到 pending 中, 由调用方一次性提交。
#[derive(Debug, Clone, Default)]
pub struct PriceMatrix {
    index: HashMap<PriceOwner, Vec<PriceFact>>,
    pending: IndexSet<Uuid>,
}

impl PriceMatrix {
    pub fn new() -> Self {
        Self::default()
    }

    /// 从已有价格记录构建索引
    pub fn from_facts(facts: impl IntoIterator<Item = PriceFact>) -> Self {
        let mut matrix = Self::new();
        for fact in facts {
            matrix.index.entry(fact.owner).or_default().push(fact);
        }
        matrix
    }

    pub fn facts_for(&self, owner: &PriceOwner) -> &[PriceFact] {
        self.index.get(owner).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn len(&self) -> usize {
        self.index.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    /// 写入或更新一条价格
    ///
    /// 金额非正时跳过并返回 None。维度组合已存在时覆盖金额, 描述与时间窗口
    /// 只在新值非空时覆盖; 否则新建记录。
    pub fn set_price(&mut self, owner: PriceOwner, request: &PriceFactRequest) -> Option<PriceFact> {
        if !request.has_positive_amount() {
            tracing::debug!("跳过非正金额 {} ({})", request.amount, owner);
            return None;
        }

        let facts = self.index.entry(owner).or_default();
        let fact = match facts.iter_mut().find(|f| f.dimensions == request.dimensions) {
            Some(existing) => {
                existing.amount = request.amount.clone();
                if let Some(description) = non_blank(&request.description) {
                    existing.description = Some(description);
                }
                if request.time_from.is_some() {
                    existing.time_from = request.time_from;
                }
                if request.time_to.is_some() {
                    existing.time_to = request.time_to;
                }
                existing.clone()
            }
            None => {
                let fact = PriceFact {
                    id: Uuid::new_v4(),
                    owner,
                    dimensions: request.dimensions,
                    time_from: request.time_from,
                    time_to: request.time_to,
                    amount: request.amount.clone(),
                    description: non_blank(&request.description),
                };
                facts.push(fact.clone());
                fact
            }
        };

        self.pending.insert(fact.id);
        Some(fact)
    }

    /// 取出待提交的记录 (新建与更新), 清空 pending
    pub fn take_pending(&mut self) -> Vec<PriceFact> {
        let pending = std::mem::take(&mut self.pending);
        if pending.is_empty() {
            return Vec::new();
        }
        let mut by_id: HashMap<Uuid, PriceFact> = self
            .index
            .values()
            .flatten()
            .filter(|f| pending.contains(&f.id))
            .map(|f| (f.id, f.clone()))
            .collect();
        pending.iter().filter_map(|id| by_id.remove(id)).collect()
    }
}

fn non_blank(value: &Option<String>) -> Option<String> {
    value
        .as_deref()
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

/// 批量写入结果
#[derive(Debug, Default)]
pub struct BatchOutcome {
    pub matrix: PriceMatrix,
    /// 归属 -> 本批次写入的价格
    pub results: IndexMap<PriceOwner, Vec<PriceFact>>,
    /// 存储中不存在的归属
    pub skipped: Vec<PriceOwner>,
}

/// 批量写入: 一次加载全部归属及其已有价格, 逐条 `set_price`
///
/// 不存在的归属会被跳过, 不算错误。结果只在内存中, 需要调用方提交
/// `outcome.matrix.take_pending()`。
pub async fn apply_batch<S: TollStore>(
    store: &S,
    requests: IndexMap<PriceOwner, Vec<PriceFactRequest>>,
) -> Result<BatchOutcome> {
    let toll_ids: Vec<i64> = requests.keys().filter_map(PriceOwner::toll_id).collect();
    let pair_ids: Vec<Uuid> = requests.keys().filter_map(PriceOwner::pair_id).collect();

    let mut known: HashSet<PriceOwner> = HashSet::new();
    known.extend(
        store
            .fetch_points_by_ids(&toll_ids)
            .await?
            .into_iter()
            .map(|p| PriceOwner::Toll(p.id)),
    );
    known.extend(
        store
            .fetch_pairs_by_ids(&pair_ids)
            .await?
            .into_iter()
            .map(|p| PriceOwner::Pair(p.id)),
    );

    let owners: Vec<PriceOwner> = requests.keys().filter(|o| known.contains(*o)).copied().collect();
    let existing = store.fetch_prices_for_owners(&owners).await?;

    let mut outcome = BatchOutcome {
        matrix: PriceMatrix::from_facts(existing),
        ..BatchOutcome::default()
    };

    for (owner, owner_requests) in requests {
        if !known.contains(&owner) {
            tracing::warn!("Price owner {} not found, skipping {} prices", owner, owner_requests.len());
            outcome.skipped.push(owner);
            continue;
        }
        let written: Vec<PriceFact> = owner_requests
            .iter()
            .filter_map(|request| outcome.matrix.set_price(owner, request))
            .collect();
        outcome.results.insert(owner, written);
    }

    Ok(outcome)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{Changeset, InMemoryStore};
    use crate::models::{
        AxleClass, DayOfWeek, DirectedTollPair, GeoPoint, PaymentType, StateCalculator,
        TimeOfDay, TollPoint,
    };
    use bigdecimal::BigDecimal;
    use chrono::NaiveTime;
    use std::str::FromStr;

    fn amount(value: &str) -> BigDecimal {
        BigDecimal::from_str(value).unwrap()
    }

    fn cash_5_axle(value: &str) -> PriceFactRequest {
        PriceFactRequest::new(amount(value), PaymentType::Cash, AxleClass::axles(5))
    }

    #[test]
    fn same_dimensions_overwrite_instead_of_insert() {
        let owner = PriceOwner::Toll(1);
        let mut matrix = PriceMatrix::new();

        let first = matrix.set_price(owner, &cash_5_axle("12.50")).unwrap();
        let second = matrix.set_price(owner, &cash_5_axle("14.00")).unwrap();

        assert_eq!(first.id, second.id);
        assert_eq!(matrix.facts_for(&owner).len(), 1);
        assert_eq!(matrix.facts_for(&owner)[0].amount, amount("14.00"));
    }

    #[test]
    fn different_dimensions_create_separate_facts() {
        let owner = PriceOwner::Toll(1);
        let mut matrix = PriceMatrix::new();

        matrix.set_price(owner, &cash_5_axle("12.50"));
        matrix.set_price(owner, &cash_5_axle("9.00").days(DayOfWeek::Saturday, DayOfWeek::Sunday));
        matrix.set_price(owner, &cash_5_axle("15.00").time_of_day(TimeOfDay::Peak));
        matrix.set_price(
            owner,
            &PriceFactRequest::new(amount("10.00"), PaymentType::Transponder, AxleClass::axles(5)),
        );
        matrix.set_price(PriceOwner::Toll(2), &cash_5_axle("12.50"));

        assert_eq!(matrix.facts_for(&owner).len(), 4);
        assert_eq!(matrix.len(), 5);
    }

    #[test]
    fn non_positive_amounts_are_skipped() {
        let owner = PriceOwner::Toll(1);
        let mut matrix = PriceMatrix::new();

        assert!(matrix.set_price(owner, &cash_5_axle("0")).is_none());
        assert!(matrix.set_price(owner, &cash_5_axle("-3.25")).is_none());

        assert!(matrix.facts_for(&owner).is_empty());
        assert_eq!(matrix.pending_count(), 0);
    }

    #[test]
    fn refinements_survive_an_update_without_them() {
        let owner = PriceOwner::Pair(Uuid::new_v4());
        let mut matrix = PriceMatrix::new();
        let six = NaiveTime::from_hms_opt(6, 0, 0).unwrap();
        let nine = NaiveTime::from_hms_opt(9, 0, 0).unwrap();

        matrix.set_price(
            owner,
            &cash_5_axle("20.00").window(six, nine).description("Morning rush"),
        );
        let updated = matrix
            .set_price(owner, &cash_5_axle("21.00").description("   "))
            .unwrap();

        assert_eq!(updated.amount, amount("21.00"));
        assert_eq!(updated.description.as_deref(), Some("Morning rush"));
        assert_eq!(updated.time_from, Some(six));
        assert_eq!(updated.time_to, Some(nine));
    }

    #[test]
    fn take_pending_returns_each_touched_fact_once() {
        let owner = PriceOwner::Toll(1);
        let mut matrix = PriceMatrix::from_facts(vec![PriceFact {
            id: Uuid::new_v4(),
            owner: PriceOwner::Toll(9),
            dimensions: cash_5_axle("1").dimensions,
            time_from: None,
            time_to: None,
            amount: amount("1"),
            description: None,
        }]);

        matrix.set_price(owner, &cash_5_axle("12.50"));
        matrix.set_price(owner, &cash_5_axle("13.50"));

        let pending = matrix.take_pending();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].amount, amount("13.50"));
        assert!(matrix.take_pending().is_empty());
    }

    #[tokio::test]
    async fn apply_batch_skips_unknown_owners() {
        let store = InMemoryStore::with_points(vec![
            TollPoint::new(1, "North Plaza", Some(GeoPoint::new(39.0, -77.0))),
            TollPoint::new(2, "South Plaza", Some(GeoPoint::new(38.9, -77.0))),
        ]);
        let state = StateCalculator::new("Maryland", "MD");
        let pair = DirectedTollPair::new(1, 2, state.id).unwrap();
        store
            .commit(Changeset {
                state_calculators: vec![state],
                pairs: vec![pair.clone()],
                ..Changeset::default()
            })
            .await
            .unwrap();

        let mut requests = IndexMap::new();
        requests.insert(PriceOwner::Toll(1), vec![cash_5_axle("4.00"), cash_5_axle("0")]);
        requests.insert(PriceOwner::Pair(pair.id), vec![cash_5_axle("8.00")]);
        requests.insert(PriceOwner::Toll(404), vec![cash_5_axle("1.00")]);
        requests.insert(PriceOwner::Pair(Uuid::new_v4()), vec![cash_5_axle("1.00")]);

        let mut outcome = apply_batch(&store, requests).await.unwrap();

        assert_eq!(outcome.results.len(), 2);
        assert_eq!(outcome.results[&PriceOwner::Toll(1)].len(), 1);
        assert_eq!(outcome.results[&PriceOwner::Pair(pair.id)].len(), 1);
        assert_eq!(outcome.skipped.len(), 2);
        assert!(outcome.skipped.contains(&PriceOwner::Toll(404)));

        let pending = outcome.matrix.take_pending();
        store
            .commit(Changeset {
                prices: pending,
                ..Changeset::default()
            })
            .await
            .unwrap();
        assert_eq!(store.prices().await.len(), 2);
    }
}
