use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use dashmap::DashMap;
use futures::stream::{self, StreamExt};
use indexmap::{IndexMap, IndexSet};

use crate::adapters::{SourceAdapter, SourceBatch, SourceRecord};
use crate::config::AppConfig;
use crate::db::{Changeset, TollAssignment, TollStore};
use crate::error::Result;
use crate::models::{
    BoundingBox, DirectedTollPair, ImportReport, PairKey, PriceFact, PriceOwner, StateCalculator,
    TollPoint,
};
use crate::service::matcher::GeoBoundedMatcher;
use crate::service::pair_expander;
use crate::service::price_matrix::PriceMatrix;

/// 导入服务: 标签匹配 -> 站点对展开 -> 价格写入 -> 一次提交
pub struct ImportService<S> {
    store: Arc<S>,
    matcher: GeoBoundedMatcher,
    max_concurrent_runs: usize,
}

impl<S: TollStore> ImportService<S> {
    pub fn new(store: Arc<S>, config: &AppConfig) -> Self {
        Self {
            store,
            matcher: GeoBoundedMatcher::new(config.engine.match_mode),
            max_concurrent_runs: config.import.max_concurrent_runs.max(1),
        }
    }

    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    /// 加载并导入一个数据源, 任何失败都记录在报告里
    pub async fn import<A: SourceAdapter>(&self, adapter: &A) -> ImportReport {
        match adapter.load().await {
            Ok(batch) => self.run_reported(batch).await,
            Err(e) => {
                tracing::error!("Source {} failed to load: {}", adapter.name(), e);
                let mut report = ImportReport::new(adapter.name(), "");
                report.errors.push(e.to_string());
                report
            }
        }
    }

    /// 并发导入多个批次, 报告按输入顺序返回 (数据源同名时各自保留)
    pub async fn run_many(&self, batches: Vec<SourceBatch>) -> Vec<ImportReport> {
        let reports: DashMap<usize, ImportReport> = DashMap::with_capacity(batches.len());
        let collected = &reports;

        stream::iter(batches.into_iter().enumerate())
            .for_each_concurrent(self.max_concurrent_runs, move |(index, batch)| async move {
                let report = self.run_reported(batch).await;
                collected.insert(index, report);
            })
            .await;

        let mut ordered: Vec<(usize, ImportReport)> = reports.into_iter().collect();
        ordered.sort_by_key(|(index, _)| *index);
        ordered.into_iter().map(|(_, report)| report).collect()
    }

    async fn run_reported(&self, batch: SourceBatch) -> ImportReport {
        let source = batch.source.clone();
        let state_code = batch.state_code.clone();
        match self.run(batch).await {
            Ok(report) => report,
            Err(e) => {
                tracing::error!("Import {} ({}) rejected: {}", source, state_code, e);
                let mut report = ImportReport::new(source, state_code);
                report.errors.push(e.to_string());
                report
            }
        }
    }

    /// 执行一次导入
    ///
    /// 输入不合法 (区域、州代码) 时直接返回错误, 不做任何处理。未匹配的标签
    /// 记入 `not_found`; 提交失败记入 `errors`, 此时没有任何数据写入。
    pub async fn run(&self, batch: SourceBatch) -> Result<ImportReport> {
        batch.validate()?;
        let region = batch.region.to_polygon()?;
        let mut report = ImportReport::new(&batch.source, &batch.state_code);
        let mut changes = Changeset::default();

        tracing::info!(
            "[Import] {} ({}): 开始导入, {} 条记录",
            batch.source,
            batch.state_code,
            batch.records.len()
        );

        // Phase 1: 州计算器 (首次遇到时创建)
        let state = match self.store.find_state_calculator(&batch.state_code).await? {
            Some(state) => state,
            None => {
                let state = StateCalculator::new(&batch.state_name, &batch.state_code);
                tracing::info!("[Import] 新建州计算器 {} ({})", state.name, state.state_code);
                changes.state_calculators.push(state.clone());
                state
            }
        };

        // Phase 2: 一次区域查询匹配全部标签
        let labels: IndexSet<String> = batch.labels().map(str::to_string).collect();
        let matches = self.matcher.find_matches(self.store.as_ref(), &labels, &region).await?;
        let matched_ids: HashSet<i64> = matches.values().flatten().map(|p| p.id).collect();

        tracing::info!(
            "[Import] {}: {} 个标签, 匹配到 {} 个站点",
            batch.source,
            labels.len(),
            matched_ids.len()
        );

        // Phase 3: 加载已有站点对与价格
        let mut pairs: HashMap<PairKey, DirectedTollPair> = self
            .store
            .fetch_pairs_for_state(state.id)
            .await?
            .into_iter()
            .map(|p| (p.key(), p))
            .collect();

        let owners: Vec<PriceOwner> = matched_ids
            .iter()
            .map(|id| PriceOwner::Toll(*id))
            .chain(
                pairs
                    .values()
                    .filter(|p| matched_ids.contains(&p.from_toll_id) && matched_ids.contains(&p.to_toll_id))
                    .map(|p| PriceOwner::Pair(p.id)),
            )
            .collect();
        let mut matrix = PriceMatrix::from_facts(self.store.fetch_prices_for_owners(&owners).await?);

        // Phase 4: 逐条应用
        let mut not_found: IndexSet<String> = IndexSet::new();
        let mut touched: IndexMap<i64, TollAssignment> = IndexMap::new();
        let mut new_pairs: Vec<DirectedTollPair> = Vec::new();

        for record in &batch.records {
            match record {
                SourceRecord::Plaza { label, number, prices } => {
                    let points = resolve(&matches, std::slice::from_ref(label), &mut not_found);
                    if points.is_empty() {
                        continue;
                    }
                    for point in &points {
                        let assignment = touched.entry(point.id).or_insert_with(|| TollAssignment {
                            toll_id: point.id,
                            number: None,
                            state_calculator_id: state.id,
                        });
                        if let Some(number) = number.as_deref().filter(|n| !n.trim().is_empty()) {
                            assignment.number = Some(number.trim().to_string());
                        }

                        for request in prices {
                            matrix.set_price(PriceOwner::Toll(point.id), request);
                        }
                    }
                    report.processed += 1;
                }
                SourceRecord::Route { entry, exit, prices } => {
                    let entries = resolve(&matches, entry, &mut not_found);
                    let exits = resolve(&matches, exit, &mut not_found);
                    if entries.is_empty() || exits.is_empty() {
                        continue;
                    }

                    let written = pair_expander::expand(&entries, &exits, |from, to| {
                        let key = PairKey::new(from.id, to.id);
                        let pair_id = match pairs.get(&key) {
                            Some(pair) => pair.id,
                            None => match DirectedTollPair::new(from.id, to.id, state.id) {
                                Ok(pair) => {
                                    let id = pair.id;
                                    new_pairs.push(pair.clone());
                                    pairs.insert(key, pair);
                                    id
                                }
                                Err(e) => {
                                    tracing::warn!("[Import] 跳过站点对 {:?}: {}", key, e);
                                    return Vec::new();
                                }
                            },
                        };
                        prices
                            .iter()
                            .filter_map(|request| matrix.set_price(PriceOwner::Pair(pair_id), request))
                            .collect::<Vec<PriceFact>>()
                    });

                    tracing::debug!(
                        "[Import] 路段 {:?} -> {:?}: {} 个站点对",
                        entry,
                        exit,
                        written.len()
                    );
                    report.processed += 1;
                }
            }
        }

        // Phase 5: 一次提交
        let pending = matrix.take_pending();
        report.not_found = not_found.into_iter().collect();
        changes.assignments = touched.into_values().collect();
        changes.pairs = new_pairs;
        let prices_written = pending.len();
        let pairs_created = changes.pairs.len();
        changes.prices = pending;

        match self.store.commit(changes).await {
            Ok(summary) => {
                report.prices_written = prices_written;
                report.pairs_created = pairs_created;
                tracing::info!(
                    "[Import] {} ({}): 完成 - 处理 {}, 价格 {}, 新站点对 {}, 未找到 {} ({:?})",
                    report.source,
                    report.state_code,
                    report.processed,
                    report.prices_written,
                    report.pairs_created,
                    report.not_found.len(),
                    summary
                );
            }
            Err(e) => {
                tracing::error!("[Import] {} 提交失败: {}", report.source, e);
                report.processed = 0;
                report.errors.push(e.to_string());
            }
        }

        Ok(report)
    }

    /// 按区域删除价格与站点对
    pub async fn purge_region(&self, region: &BoundingBox) -> Result<u64> {
        let polygon = region.to_polygon()?;
        let deleted = self.store.purge_region(&polygon).await?;
        tracing::info!("[Import] 区域 {:?}: 删除 {} 条价格", region, deleted);
        Ok(deleted)
    }
}

/// 合并多个标签的匹配结果 (按站点去重), 未找到的标签记入 `not_found`
fn resolve(
    matches: &IndexMap<String, Vec<TollPoint>>,
    labels: &[String],
    not_found: &mut IndexSet<String>,
) -> Vec<TollPoint> {
    let mut seen: HashSet<i64> = HashSet::new();
    let mut points = Vec::new();

    for label in labels {
        let found = matches.get(label).map(Vec::as_slice).unwrap_or(&[]);
        if found.is_empty() {
            not_found.insert(label.clone());
            continue;
        }
        for point in found {
            if seen.insert(point.id) {
                points.push(point.clone());
            }
        }
    }

    points
}
