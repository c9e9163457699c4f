use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use crate::config::EngineConfig;
use crate::geodesy;
use crate::models::TollPoint;

/// 半径之和超过距离的容差 (浮点噪声)
const OVERLAP_TOLERANCE_M: f64 = 1e-6;

/// 单次分配的统计
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AllocationStats {
    pub points: usize,
    pub valid_points: usize,
    pub shrunk_pairs: usize,
    pub repaired_points: usize,
    /// 合法坐标但半径最终为 0 的站点
    pub collapsed_points: usize,
}

/// 搜索半径分配器
///
/// 贪心两两收缩, 再对半径塌缩的站点做一轮有界修复。不迭代到不动点,
/// 密集簇中修复后的站点可能仍然很小。
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RadiusAllocator {
    pub default_radius_m: f64,
    pub clearance_m: f64,
    pub repair_threshold_m: f64,
}

impl Default for RadiusAllocator {
    fn default() -> Self {
        Self::from_config(&EngineConfig::default())
    }
}

impl RadiusAllocator {
    pub fn from_config(config: &EngineConfig) -> Self {
        Self {
            default_radius_m: config.default_radius_m,
            clearance_m: config.clearance_m,
            repair_threshold_m: config.repair_threshold_m,
        }
    }

    /// 原地重算所有站点的 `search_radius_m`
    ///
    /// 结果只取决于站点集合本身: 处理顺序总是按站点 ID 排序。
    pub fn allocate(&self, points: &mut [TollPoint]) -> AllocationStats {
        let mut order: Vec<usize> = (0..points.len()).collect();
        order.sort_by_key(|&i| points[i].id);

        let mut stats = AllocationStats {
            points: points.len(),
            ..AllocationStats::default()
        };
        self.run(points, &order, None, &mut stats);

        stats.valid_points = points.iter().filter(|p| p.valid_location().is_some()).count();
        stats.collapsed_points = points
            .iter()
            .filter(|p| p.valid_location().is_some() && p.search_radius_m <= 0.0)
            .count();

        tracing::debug!(
            "半径分配完成: {} 站点, {} 对收缩, {} 站点修复, {} 站点半径为 0",
            stats.points,
            stats.shrunk_pairs,
            stats.repaired_points,
            stats.collapsed_points
        );
        stats
    }

    /// `subset` 为 None 时处理全部站点; 否则为修复轮, 只重置子集并只检查涉及子集的站点对
    fn run(
        &self,
        points: &mut [TollPoint],
        order: &[usize],
        subset: Option<&HashSet<usize>>,
        stats: &mut AllocationStats,
    ) {
        let repairing = subset.is_some();

        // 1. 初始化
        for &i in order {
            if subset.map_or(true, |s| s.contains(&i)) {
                let point = &mut points[i];
                point.search_radius_m = if point.valid_location().is_some() {
                    self.default_radius_m
                } else {
                    0.0
                };
            }
        }

        // 2. 两两收缩
        for (pos, &a) in order.iter().enumerate() {
            for &b in &order[pos + 1..] {
                if let Some(s) = subset {
                    if !s.contains(&a) && !s.contains(&b) {
                        continue;
                    }
                }
                if self.resolve_pair(points, a, b) {
                    stats.shrunk_pairs += 1;
                }
            }
        }

        // 3. 仅一轮修复
        if repairing {
            return;
        }
        let collapsed: HashSet<usize> = order
            .iter()
            .copied()
            .filter(|&i| {
                points[i].valid_location().is_some()
                    && points[i].search_radius_m < self.repair_threshold_m
            })
            .collect();
        if collapsed.is_empty() {
            return;
        }
        stats.repaired_points = collapsed.len();
        self.run(points, order, Some(&collapsed), stats);
    }

    /// 两圆重叠时把半径之和收缩到 `距离 - 间隙`, 返回是否发生收缩
    fn resolve_pair(&self, points: &mut [TollPoint], a: usize, b: usize) -> bool {
        let ra = points[a].search_radius_m;
        let rb = points[b].search_radius_m;
        if ra <= 0.0 || rb <= 0.0 {
            return false;
        }
        let (Some(la), Some(lb)) = (points[a].valid_location(), points[b].valid_location()) else {
            return false;
        };

        let distance = geodesy::haversine_m(&la, &lb);
        if ra + rb - distance <= OVERLAP_TOLERANCE_M {
            return false;
        }

        let allowed_sum = (distance - self.clearance_m).max(0.0);
        let (na, nb) = shrink_pair(ra, rb, allowed_sum);
        points[a].search_radius_m = na;
        points[b].search_radius_m = nb;
        true
    }
}

/// 对半扣减超出部分; 一方扣到 0 后剩余部分先从 a 再从 b 扣
pub fn shrink_pair(ra: f64, rb: f64, allowed_sum: f64) -> (f64, f64) {
    let excess = ra + rb - allowed_sum.max(0.0);
    if excess <= 0.0 {
        return (ra, rb);
    }

    let half = excess / 2.0;
    let take_a = half.min(ra);
    let take_b = half.min(rb);
    let mut na = ra - take_a;
    let mut nb = rb - take_b;
    let mut remaining = excess - take_a - take_b;

    if remaining > 0.0 && na > 0.0 {
        let take = remaining.min(na);
        na -= take;
        remaining -= take;
    }
    if remaining > 0.0 && nb > 0.0 {
        nb -= remaining.min(nb);
    }

    (na.max(0.0), nb.max(0.0))
}
