//! Postgres/PostGIS 存储实现
//!
//! 依赖的表结构 (由外部迁移维护):
//!
//! - `toll_points(id bigint, name text, key text, number text, location geometry(Point, 4326), search_radius_m double precision, state_calculator_id uuid)`
//! - `state_calculators(id uuid, name text, state_code text UNIQUE)`
//! - `toll_pairs(id uuid, from_toll_id bigint, to_toll_id bigint, state_calculator_id uuid, UNIQUE (from_toll_id, to_toll_id, state_calculator_id), CHECK (from_toll_id <> to_toll_id))`
//! - `toll_prices(id uuid, toll_id bigint, pair_id uuid, payment_type text, axle_class smallint, day_of_week_from smallint, day_of_week_to smallint, time_of_day text, time_from time, time_to time, amount numeric, description text, CHECK (num_nonnulls(toll_id, pair_id) = 1))`
//!   带两个部分唯一索引: `(toll_id, <维度>) WHERE toll_id IS NOT NULL` 与 `(pair_id, <维度>) WHERE pair_id IS NOT NULL`

use std::collections::HashMap;
use std::time::{Duration, Instant};

use indexmap::IndexMap;
use sqlx::{PgPool, Postgres, QueryBuilder, Transaction};
use uuid::Uuid;

use crate::db::store::{Changeset, TollStore};
use crate::error::Result;
use crate::models::{
    CommitSummary, DirectedTollPair, Polygon, PriceDimensions, PriceFact, PriceFactRow,
    PriceOwner, StateCalculator, TollPoint, TollPointRow,
};

/// 每条 INSERT 语句的最大行数
const CHUNK_SIZE: usize = 1000;

/// 提交超时
const COMMIT_TIMEOUT: Duration = Duration::from_secs(30);

const TOLL_COLUMNS: &str = r#"
    id, name, key, number,
    ST_Y(location) AS lat,
    ST_X(location) AS lon,
    search_radius_m, state_calculator_id
"#;

const PRICE_COLUMNS: &str = r#"
    id, toll_id, pair_id, payment_type, axle_class,
    day_of_week_from, day_of_week_to, time_of_day,
    time_from, time_to, amount, description
"#;

const PRICE_DIMENSION_COLUMNS: &str =
    "payment_type, axle_class, day_of_week_from, day_of_week_to, time_of_day";

/// 基于 sqlx 连接池的存储
#[derive(Debug, Clone)]
pub struct PgTollStore {
    pool: PgPool,
}

impl PgTollStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

fn to_price_facts(rows: Vec<PriceFactRow>) -> Vec<PriceFact> {
    rows.into_iter()
        .filter_map(|row| {
            let id = row.id;
            match PriceFact::try_from(row) {
                Ok(fact) => Some(fact),
                Err(e) => {
                    tracing::warn!("Skipping unreadable price {}: {}", id, e);
                    None
                }
            }
        })
        .collect()
}

impl TollStore for PgTollStore {
    async fn fetch_points_in_region(&self, region: &Polygon) -> Result<Vec<TollPoint>> {
        let sql = format!(
            "SELECT {TOLL_COLUMNS} FROM toll_points \
             WHERE location IS NOT NULL \
               AND ST_Contains(ST_GeomFromText($1, 4326), location)"
        );
        let rows = sqlx::query_as::<_, TollPointRow>(&sql)
            .bind(region.to_wkt())
            .fetch_all(&self.pool)
            .await?;
        Ok(rows.into_iter().map(TollPoint::from).collect())
    }

    async fn fetch_points_by_ids(&self, ids: &[i64]) -> Result<Vec<TollPoint>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let sql = format!("SELECT {TOLL_COLUMNS} FROM toll_points WHERE id = ANY($1)");
        let rows = sqlx::query_as::<_, TollPointRow>(&sql)
            .bind(ids)
            .fetch_all(&self.pool)
            .await?;
        Ok(rows.into_iter().map(TollPoint::from).collect())
    }

    async fn fetch_pairs_by_ids(&self, ids: &[Uuid]) -> Result<Vec<DirectedTollPair>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let pairs = sqlx::query_as::<_, DirectedTollPair>(
            r#"
            SELECT id, from_toll_id, to_toll_id, state_calculator_id
            FROM toll_pairs
            WHERE id = ANY($1)
            "#,
        )
        .bind(ids)
        .fetch_all(&self.pool)
        .await?;
        Ok(pairs)
    }

    async fn fetch_pairs_for_state(&self, state_calculator_id: Uuid) -> Result<Vec<DirectedTollPair>> {
        let pairs = sqlx::query_as::<_, DirectedTollPair>(
            r#"
            SELECT id, from_toll_id, to_toll_id, state_calculator_id
            FROM toll_pairs
            WHERE state_calculator_id = $1
            "#,
        )
        .bind(state_calculator_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(pairs)
    }

    async fn fetch_prices_for_owners(&self, owners: &[PriceOwner]) -> Result<Vec<PriceFact>> {
        let toll_ids: Vec<i64> = owners.iter().filter_map(PriceOwner::toll_id).collect();
        let pair_ids: Vec<Uuid> = owners.iter().filter_map(PriceOwner::pair_id).collect();
        if toll_ids.is_empty() && pair_ids.is_empty() {
            return Ok(Vec::new());
        }

        let sql = format!(
            "SELECT {PRICE_COLUMNS} FROM toll_prices \
             WHERE toll_id = ANY($1) OR pair_id = ANY($2)"
        );
        let rows = sqlx::query_as::<_, PriceFactRow>(&sql)
            .bind(&toll_ids)
            .bind(&pair_ids)
            .fetch_all(&self.pool)
            .await?;
        Ok(to_price_facts(rows))
    }

    async fn find_state_calculator(&self, state_code: &str) -> Result<Option<StateCalculator>> {
        let state = sqlx::query_as::<_, StateCalculator>(
            r#"
            SELECT id, name, state_code
            FROM state_calculators
            WHERE state_code = $1
            "#,
        )
        .bind(state_code.to_uppercase())
        .fetch_optional(&self.pool)
        .await?;
        Ok(state)
    }

    async fn commit(&self, changes: Changeset) -> Result<CommitSummary> {
        if changes.is_empty() {
            return Ok(CommitSummary::default());
        }

        tracing::debug!(
            "开始提交: {} 州, {} 站点归属, {} 半径, {} 站点对, {} 价格",
            changes.state_calculators.len(),
            changes.assignments.len(),
            changes.radii.len(),
            changes.pairs.len(),
            changes.prices.len()
        );
        let start_time = Instant::now();

        let execute_result = tokio::time::timeout(COMMIT_TIMEOUT, async move {
            let mut tx = self.pool.begin().await?;
            let summary = write_changeset(&mut tx, changes).await?;
            tx.commit().await?;
            Ok::<_, sqlx::Error>(summary)
        })
        .await;

        match execute_result {
            Ok(Ok(summary)) => {
                tracing::info!("✓ 提交成功: {:?}, 耗时: {:?}", summary, start_time.elapsed());
                Ok(summary)
            }
            Ok(Err(e)) => {
                tracing::error!("✗ 提交失败, 耗时: {:?}, 错误: {:?}", start_time.elapsed(), e);
                Err(e.into())
            }
            Err(_) => {
                tracing::error!("✗ 提交超时 (>{:?})!", COMMIT_TIMEOUT);
                Err(sqlx::Error::PoolTimedOut.into())
            }
        }
    }

    async fn purge_region(&self, region: &Polygon) -> Result<u64> {
        let mut tx = self.pool.begin().await?;
        let wkt = region.to_wkt();

        let deleted = sqlx::query(
            r#"
            WITH region_tolls AS (
                SELECT id FROM toll_points
                WHERE location IS NOT NULL
                  AND ST_Contains(ST_GeomFromText($1, 4326), location)
            ),
            region_pairs AS (
                SELECT id FROM toll_pairs
                WHERE from_toll_id IN (SELECT id FROM region_tolls)
            )
            DELETE FROM toll_prices
            WHERE toll_id IN (SELECT id FROM region_tolls)
               OR pair_id IN (SELECT id FROM region_pairs)
            "#,
        )
        .bind(&wkt)
        .execute(&mut *tx)
        .await?
        .rows_affected();

        let pairs = sqlx::query(
            r#"
            DELETE FROM toll_pairs
            WHERE from_toll_id IN (
                SELECT id FROM toll_points
                WHERE location IS NOT NULL
                  AND ST_Contains(ST_GeomFromText($1, 4326), location)
            )
            "#,
        )
        .bind(&wkt)
        .execute(&mut *tx)
        .await?
        .rows_affected();

        tx.commit().await?;
        tracing::info!("区域清理完成: 删除 {} 条价格, {} 个站点对", deleted, pairs);
        Ok(deleted)
    }
}

/// 在同一事务内按依赖顺序写入: 州 -> 站点 -> 站点对 -> 价格
async fn write_changeset(
    tx: &mut Transaction<'_, Postgres>,
    changes: Changeset,
) -> std::result::Result<CommitSummary, sqlx::Error> {
    let mut summary = CommitSummary::default();

    // 1. 州计算器 (state_code 冲突时保留已有 ID)
    let mut state_ids: HashMap<Uuid, Uuid> = HashMap::new();
    for state in &changes.state_calculators {
        let actual: Uuid = sqlx::query_scalar(
            r#"
            INSERT INTO state_calculators (id, name, state_code)
            VALUES ($1, $2, $3)
            ON CONFLICT (state_code) DO UPDATE SET name = EXCLUDED.name
            RETURNING id
            "#,
        )
        .bind(state.id)
        .bind(&state.name)
        .bind(state.state_code.to_uppercase())
        .fetch_one(&mut **tx)
        .await?;
        state_ids.insert(state.id, actual);
        summary.state_calculators += 1;
    }
    let remap_state = |id: Uuid| *state_ids.get(&id).unwrap_or(&id);

    // 2a. 站点归属: 编号为空时保留已有值
    for chunk in changes.assignments.chunks(CHUNK_SIZE) {
        let mut query_builder = QueryBuilder::<Postgres>::new(
            "UPDATE toll_points AS t SET \
                number = COALESCE(v.number, t.number), \
                state_calculator_id = v.state_calculator_id \
             FROM (",
        );
        query_builder.push_values(chunk, |mut b, assignment| {
            b.push_bind(assignment.toll_id)
                .push_bind(assignment.number.clone())
                .push_bind(remap_state(assignment.state_calculator_id));
        });
        query_builder.push(") AS v(id, number, state_calculator_id) WHERE t.id = v.id");
        let result = query_builder.build().execute(&mut **tx).await?;
        summary.tolls_updated += result.rows_affected() as usize;
    }

    // 2b. 搜索半径
    for chunk in changes.radii.chunks(CHUNK_SIZE) {
        let mut query_builder = QueryBuilder::<Postgres>::new(
            "UPDATE toll_points AS t SET search_radius_m = v.search_radius_m FROM (",
        );
        query_builder.push_values(chunk, |mut b, update| {
            b.push_bind(update.toll_id).push_bind(update.search_radius_m);
        });
        query_builder.push(") AS v(id, search_radius_m) WHERE t.id = v.id");
        let result = query_builder.build().execute(&mut **tx).await?;
        summary.tolls_updated += result.rows_affected() as usize;
    }

    // 3. 站点对: 唯一键冲突时返回已有 ID
    let mut unique_pairs: IndexMap<(i64, i64, Uuid), Vec<Uuid>> = IndexMap::new();
    for pair in &changes.pairs {
        unique_pairs
            .entry((pair.from_toll_id, pair.to_toll_id, remap_state(pair.state_calculator_id)))
            .or_default()
            .push(pair.id);
    }
    let unique_pairs: Vec<((i64, i64, Uuid), Vec<Uuid>)> = unique_pairs.into_iter().collect();

    let mut pair_ids: HashMap<Uuid, Uuid> = HashMap::new();
    for chunk in unique_pairs.chunks(CHUNK_SIZE) {
        let mut query_builder = QueryBuilder::<Postgres>::new(
            "INSERT INTO toll_pairs (id, from_toll_id, to_toll_id, state_calculator_id) ",
        );
        query_builder.push_values(chunk, |mut b, ((from, to, state), client_ids)| {
            b.push_bind(client_ids[0])
                .push_bind(*from)
                .push_bind(*to)
                .push_bind(*state);
        });
        query_builder.push(
            " ON CONFLICT (from_toll_id, to_toll_id, state_calculator_id) \
              DO UPDATE SET from_toll_id = EXCLUDED.from_toll_id \
              RETURNING id, from_toll_id, to_toll_id, state_calculator_id",
        );
        let stored: Vec<DirectedTollPair> = query_builder
            .build_query_as::<DirectedTollPair>()
            .fetch_all(&mut **tx)
            .await?;

        let by_key: HashMap<(i64, i64, Uuid), Uuid> = stored
            .iter()
            .map(|p| ((p.from_toll_id, p.to_toll_id, p.state_calculator_id), p.id))
            .collect();
        for (key, client_ids) in chunk {
            if let Some(actual) = by_key.get(key) {
                for client_id in client_ids {
                    pair_ids.insert(*client_id, *actual);
                }
            }
        }
        summary.pairs_upserted += stored.len();
    }

    // 4. 价格: 同一语句内不能重复命中同一行, 先按 (归属, 维度) 去重
    let mut unique_prices: IndexMap<(PriceOwner, PriceDimensions), PriceFact> = IndexMap::new();
    for fact in changes.prices {
        let mut fact = fact;
        if let PriceOwner::Pair(id) = fact.owner {
            fact.owner = PriceOwner::Pair(*pair_ids.get(&id).unwrap_or(&id));
        }
        unique_prices.insert((fact.owner, fact.dimensions), fact);
    }
    let (toll_prices, pair_prices): (Vec<PriceFact>, Vec<PriceFact>) = unique_prices
        .into_values()
        .partition(|f| matches!(f.owner, PriceOwner::Toll(_)));

    for (facts, owner_column) in [(toll_prices, "toll_id"), (pair_prices, "pair_id")] {
        for chunk in facts.chunks(CHUNK_SIZE) {
            summary.prices_upserted += upsert_prices(tx, chunk, owner_column).await?;
        }
    }

    Ok(summary)
}

async fn upsert_prices(
    tx: &mut Transaction<'_, Postgres>,
    facts: &[PriceFact],
    owner_column: &str,
) -> std::result::Result<usize, sqlx::Error> {
    let mut query_builder = QueryBuilder::<Postgres>::new(format!(
        "INSERT INTO toll_prices AS p ({PRICE_COLUMNS}) "
    ));

    query_builder.push_values(facts, |mut b, fact| {
        let d = &fact.dimensions;
        b.push_bind(fact.id)
            .push_bind(fact.owner.toll_id())
            .push_bind(fact.owner.pair_id())
            .push_bind(d.payment_type.as_str())
            .push_bind(d.axle_class.0)
            .push_bind(d.day_of_week_from.as_i16())
            .push_bind(d.day_of_week_to.as_i16())
            .push_bind(d.time_of_day.as_str())
            .push_bind(fact.time_from)
            .push_bind(fact.time_to)
            .push_bind(fact.amount.clone())
            .push_bind(fact.description.clone());
    });

    query_builder.push(format!(
        " ON CONFLICT ({owner_column}, {PRICE_DIMENSION_COLUMNS}) \
          WHERE {owner_column} IS NOT NULL \
          DO UPDATE SET \
            amount = EXCLUDED.amount, \
            description = COALESCE(NULLIF(TRIM(EXCLUDED.description), ''), p.description), \
            time_from = COALESCE(EXCLUDED.time_from, p.time_from), \
            time_to = COALESCE(EXCLUDED.time_to, p.time_to)"
    ));

    let result = query_builder.build().execute(&mut **tx).await?;
    Ok(result.rows_affected() as usize)
}
