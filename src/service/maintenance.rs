use std::sync::Arc;

use rayon::prelude::*;

use crate::config::AppConfig;
use crate::db::{Changeset, RadiusUpdate, TollStore};
use crate::error::Result;
use crate::models::{BoundingBox, Polygon};
use crate::service::radius::{AllocationStats, RadiusAllocator};

/// 区域半径维护: 拉取区域站点, 整体重算搜索半径并提交
pub struct RadiusMaintenance<S> {
    store: Arc<S>,
    allocator: RadiusAllocator,
}

impl<S: TollStore> RadiusMaintenance<S> {
    pub fn new(store: Arc<S>, config: &AppConfig) -> Self {
        Self {
            store,
            allocator: RadiusAllocator::from_config(&config.engine),
        }
    }

    pub async fn reallocate(&self, region: &BoundingBox) -> Result<AllocationStats> {
        let polygon = region.to_polygon()?;
        let mut points = self.store.fetch_points_in_region(&polygon).await?;
        let stats = self.allocator.allocate(&mut points);

        self.store
            .commit(Changeset {
                radii: points.iter().map(RadiusUpdate::from).collect(),
                ..Changeset::default()
            })
            .await?;

        tracing::info!("[Radius] 区域 {:?}: {:?}", region, stats);
        Ok(stats)
    }

    /// 多区域: 先依次拉取, 再并行分配 (各区域互不影响), 最后按输入顺序逐个提交
    ///
    /// 区域重叠时, 边界上的站点以最后一个区域的结果为准。
    pub async fn reallocate_many(&self, regions: &[BoundingBox]) -> Result<Vec<AllocationStats>> {
        let polygons: Vec<Polygon> = regions
            .iter()
            .map(BoundingBox::to_polygon)
            .collect::<Result<_>>()?;

        let mut region_points = Vec::with_capacity(polygons.len());
        for polygon in &polygons {
            region_points.push(self.store.fetch_points_in_region(polygon).await?);
        }

        let allocator = self.allocator;
        let stats: Vec<AllocationStats> = region_points
            .par_iter_mut()
            .map(|points| allocator.allocate(points))
            .collect();

        for (points, region) in region_points.into_iter().zip(regions) {
            self.store
                .commit(Changeset {
                    radii: points.iter().map(RadiusUpdate::from).collect(),
                    ..Changeset::default()
                })
                .await?;
            tracing::debug!("[Radius] 区域 {:?} 已提交", region);
        }

        tracing::info!("[Radius] {} 个区域重算完成", regions.len());
        Ok(stats)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::InMemoryStore;
    use crate::geodesy::EARTH_RADIUS_M;
    use crate::models::{GeoPoint, TollPoint};

    fn north_of(lat: f64, meters: f64) -> GeoPoint {
        GeoPoint::new(lat + (meters / EARTH_RADIUS_M).to_degrees(), -76.6)
    }

    #[tokio::test]
    async fn reallocate_persists_radii_for_region() {
        let store = Arc::new(InMemoryStore::with_points(vec![
            TollPoint::new(1, "A", Some(north_of(39.0, 0.0))),
            TollPoint::new(2, "B", Some(north_of(39.0, 300.0))),
            TollPoint::new(3, "Far", Some(GeoPoint::new(45.0, -70.0))),
        ]));
        let maintenance = RadiusMaintenance::new(store.clone(), &AppConfig::default());

        let stats = maintenance
            .reallocate(&BoundingBox::new(38.0, -77.5, 40.0, -75.5))
            .await
            .unwrap();

        assert_eq!(stats.points, 2);
        assert_eq!(stats.shrunk_pairs, 1);
        assert!((store.point(1).await.unwrap().search_radius_m - 149.95).abs() < 1e-6);
        assert!((store.point(2).await.unwrap().search_radius_m - 149.95).abs() < 1e-6);
        assert_eq!(store.point(3).await.unwrap().search_radius_m, 0.0);
    }

    #[tokio::test]
    async fn reallocate_many_handles_each_region() {
        let store = Arc::new(InMemoryStore::with_points(vec![
            TollPoint::new(1, "A", Some(north_of(39.0, 0.0))),
            TollPoint::new(2, "B", Some(GeoPoint::new(45.0, -70.0))),
        ]));
        let maintenance = RadiusMaintenance::new(store.clone(), &AppConfig::default());

        let stats = maintenance
            .reallocate_many(&[
                BoundingBox::new(38.0, -77.5, 40.0, -75.5),
                BoundingBox::new(44.0, -71.0, 46.0, -69.0),
            ])
            .await
            .unwrap();

        assert_eq!(stats.len(), 2);
        assert_eq!(store.point(1).await.unwrap().search_radius_m, 500.0);
        assert_eq!(store.point(2).await.unwrap().search_radius_m, 500.0);
    }

    #[tokio::test]
    async fn invalid_region_fails_before_fetching() {
        let store = Arc::new(InMemoryStore::new());
        let maintenance = RadiusMaintenance::new(store.clone(), &AppConfig::default());

        let result = maintenance
            .reallocate_many(&[BoundingBox::new(40.0, -75.0, 39.0, -76.0)])
            .await;

        assert!(result.is_err());
        assert_eq!(store.region_fetch_count(), 0);
    }
}
