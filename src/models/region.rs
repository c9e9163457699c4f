use geo::{Contains, LineString};
use serde::{Deserialize, Serialize};

use crate::error::{Result, SyncError};
use crate::geodesy;
use crate::models::GeoPoint;

/// 行政区外接矩形 (度)
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub south: f64,
    pub west: f64,
    pub north: f64,
    pub east: f64,
}

impl BoundingBox {
    pub fn new(south: f64, west: f64, north: f64, east: f64) -> Self {
        Self {
            south,
            west,
            north,
            east,
        }
    }

    /// 转为闭合多边形, 顶点顺序: 西南 -> 东南 -> 东北 -> 西北 -> 西南
    pub fn to_polygon(&self) -> Result<Polygon> {
        if !geodesy::is_valid_coordinate(self.south, self.west)
            || !geodesy::is_valid_coordinate(self.north, self.east)
        {
            return Err(SyncError::InvalidRegion(format!(
                "bounding box out of range: {self:?}"
            )));
        }
        if self.south >= self.north || self.west >= self.east {
            return Err(SyncError::InvalidRegion(format!(
                "bounding box has no area: {self:?}"
            )));
        }

        Polygon::new(vec![
            (self.west, self.south),
            (self.east, self.south),
            (self.east, self.north),
            (self.west, self.north),
            (self.west, self.south),
        ])
    }
}

/// 闭合多边形, 顶点为 (经度, 纬度), EPSG:4326
///
/// 只能经由 [`Polygon::new`] 构造; 反序列化同样走校验。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "Vec<(f64, f64)>", into = "Vec<(f64, f64)>")]
pub struct Polygon {
    shape: geo::Polygon<f64>,
}

impl Polygon {
    pub fn new(ring: Vec<(f64, f64)>) -> Result<Self> {
        if ring.len() < 4 {
            return Err(SyncError::InvalidRegion(format!(
                "polygon ring needs at least 4 points, got {}",
                ring.len()
            )));
        }
        if ring.first() != ring.last() {
            return Err(SyncError::InvalidRegion(
                "polygon ring does not close back to its start".to_string(),
            ));
        }
        if let Some((lon, lat)) = ring
            .iter()
            .find(|(lon, lat)| !geodesy::is_valid_coordinate(*lat, *lon))
        {
            return Err(SyncError::InvalidRegion(format!(
                "polygon vertex ({lon}, {lat}) out of range"
            )));
        }

        Ok(Self {
            shape: geo::Polygon::new(LineString::from(ring), Vec::new()),
        })
    }

    pub fn ring(&self) -> &LineString<f64> {
        self.shape.exterior()
    }

    /// 点是否在多边形内部; 边界上的点不算, 与 PostGIS `ST_Contains` 一致
    pub fn contains(&self, point: &GeoPoint) -> bool {
        point.is_valid() && self.shape.contains(&point.to_point())
    }

    /// WKT 表示, 供 ST_GeomFromText 使用
    pub fn to_wkt(&self) -> String {
        let coords: Vec<String> = self
            .ring()
            .coords()
            .map(|c| format!("{} {}", c.x, c.y))
            .collect();
        format!("POLYGON(({}))", coords.join(", "))
    }
}

impl TryFrom<Vec<(f64, f64)>> for Polygon {
    type Error = SyncError;

    fn try_from(ring: Vec<(f64, f64)>) -> Result<Self> {
        Self::new(ring)
    }
}

impl From<Polygon> for Vec<(f64, f64)> {
    fn from(polygon: Polygon) -> Self {
        polygon.ring().coords().map(|c| (c.x, c.y)).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bounding_box_polygon_is_closed() {
        let polygon = BoundingBox::new(38.9, -77.2, 39.0, -77.0).to_polygon().unwrap();
        assert_eq!(polygon.ring().0.len(), 5);
        assert_eq!(polygon.ring().0.first(), polygon.ring().0.last());
        assert!(polygon.contains(&GeoPoint::new(38.95, -77.1)));
        assert!(!polygon.contains(&GeoPoint::new(39.5, -77.1)));
    }

    #[test]
    fn malformed_regions_are_rejected() {
        assert!(BoundingBox::new(39.0, -77.2, 38.9, -77.0).to_polygon().is_err());
        assert!(BoundingBox::new(38.9, -77.2, 95.0, -77.0).to_polygon().is_err());
        assert!(Polygon::new(vec![(0.0, 0.0), (1.0, 0.0), (1.0, 1.0)]).is_err());
        assert!(Polygon::new(vec![(0.0, 0.0), (1.0, 0.0), (1.0, 1.0), (0.0, 1.0)]).is_err());
    }

    #[test]
    fn wkt_lists_lon_before_lat() {
        let polygon = BoundingBox::new(1.0, 2.0, 3.0, 4.0).to_polygon().unwrap();
        assert_eq!(polygon.to_wkt(), "POLYGON((2 1, 4 1, 4 3, 2 3, 2 1))");
    }

    #[test]
    fn boundary_points_are_outside() {
        let polygon = BoundingBox::new(0.0, 0.0, 2.0, 2.0).to_polygon().unwrap();
        assert!(polygon.contains(&GeoPoint::new(1.0, 1.0)));
        assert!(!polygon.contains(&GeoPoint::new(1.0, 0.0)));
        assert!(!polygon.contains(&GeoPoint::new(2.0, 2.0)));
        assert!(!polygon.contains(&GeoPoint::new(1.0, 3.0)));
    }

    #[test]
    fn deserialization_validates_the_ring() {
        let polygon: Polygon =
            serde_json::from_str("[[0.0, 0.0], [2.0, 0.0], [2.0, 2.0], [0.0, 0.0]]").unwrap();
        assert!(polygon.contains(&GeoPoint::new(0.5, 1.5)));

        let open = serde_json::from_str::<Polygon>("[[0.0, 0.0], [2.0, 0.0], [2.0, 2.0], [0.0, 2.0]]");
        assert!(open.is_err());
        let out_of_range = serde_json::from_str::<Polygon>("[[0.0, 0.0], [200.0, 0.0], [2.0, 2.0], [0.0, 0.0]]");
        assert!(out_of_range.is_err());
    }
}
