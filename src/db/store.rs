use std::future::Future;

use uuid::Uuid;

use crate::error::Result;
use crate::models::{
    CommitSummary, DirectedTollPair, Polygon, PriceFact, PriceOwner, StateCalculator, TollPoint,
};

/// 导入对站点的归属更新; `number` 为 `None` 时保留已有编号
#[derive(Debug, Clone, PartialEq)]
pub struct TollAssignment {
    pub toll_id: i64,
    pub number: Option<String>,
    pub state_calculator_id: Uuid,
}

/// 半径分配结果, 只写 `search_radius_m`
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RadiusUpdate {
    pub toll_id: i64,
    pub search_radius_m: f64,
}

impl From<&TollPoint> for RadiusUpdate {
    fn from(point: &TollPoint) -> Self {
        Self {
            toll_id: point.id,
            search_radius_m: point.search_radius_m,
        }
    }
}

/// 一次导入/维护任务累积的待写入变更, 在 [`TollStore::commit`] 中原子提交
///
/// 站点更新按列拆分: 导入只写编号与州计算器, 半径维护只写搜索半径,
/// 两类任务交错提交时互不覆盖。
#[derive(Debug, Clone, Default)]
pub struct Changeset {
    pub state_calculators: Vec<StateCalculator>,
    pub assignments: Vec<TollAssignment>,
    pub radii: Vec<RadiusUpdate>,
    pub pairs: Vec<DirectedTollPair>,
    pub prices: Vec<PriceFact>,
}

impl Changeset {
    pub fn is_empty(&self) -> bool {
        self.state_calculators.is_empty()
            && self.assignments.is_empty()
            && self.radii.is_empty()
            && self.pairs.is_empty()
            && self.prices.is_empty()
    }
}

/// 核心算法依赖的存储能力
///
/// `commit` 必须是原子的; 站点对按 (from, to, state) 唯一, 价格按
/// (归属, 维度) 唯一, 冲突时合并而不是报错。存储可能保留已有行的 ID,
/// 因此提交时需要把依赖行中的客户端 ID 替换为存储返回的 ID。
pub trait TollStore: Send + Sync {
    /// 区域内的全部站点 (点在多边形内)
    fn fetch_points_in_region(
        &self,
        region: &Polygon,
    ) -> impl Future<Output = Result<Vec<TollPoint>>> + Send;

    fn fetch_points_by_ids(
        &self,
        ids: &[i64],
    ) -> impl Future<Output = Result<Vec<TollPoint>>> + Send;

    fn fetch_pairs_by_ids(
        &self,
        ids: &[Uuid],
    ) -> impl Future<Output = Result<Vec<DirectedTollPair>>> + Send;

    fn fetch_pairs_for_state(
        &self,
        state_calculator_id: Uuid,
    ) -> impl Future<Output = Result<Vec<DirectedTollPair>>> + Send;

    fn fetch_prices_for_owners(
        &self,
        owners: &[PriceOwner],
    ) -> impl Future<Output = Result<Vec<PriceFact>>> + Send;

    fn find_state_calculator(
        &self,
        state_code: &str,
    ) -> impl Future<Output = Result<Option<StateCalculator>>> + Send;

    fn commit(&self, changes: Changeset) -> impl Future<Output = Result<CommitSummary>> + Send;

    /// 删除区域内站点上的价格以及起点在区域内的站点对 (连同其价格), 返回删除的价格数
    fn purge_region(&self, region: &Polygon) -> impl Future<Output = Result<u64>> + Send;
}
