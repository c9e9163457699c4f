use geo::Point;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

use crate::geodesy;

/// WGS84 坐标
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoPoint {
    pub lat: f64,
    pub lon: f64,
}

impl GeoPoint {
    pub fn new(lat: f64, lon: f64) -> Self {
        Self { lat, lon }
    }

    pub fn is_valid(&self) -> bool {
        geodesy::is_valid_coordinate(self.lat, self.lon)
    }

    /// 转为 `geo` 点 (x = 经度, y = 纬度)
    pub fn to_point(&self) -> Point<f64> {
        Point::new(self.lon, self.lat)
    }
}

/// 收费站点 (TollPoint)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TollPoint {
    pub id: i64,
    pub name: String,
    pub key: String,
    pub number: Option<String>,
    pub location: Option<GeoPoint>,
    pub search_radius_m: f64,
    pub state_calculator_id: Option<Uuid>,
}

impl TollPoint {
    pub fn new(id: i64, name: impl Into<String>, location: Option<GeoPoint>) -> Self {
        Self {
            id,
            name: name.into(),
            key: String::new(),
            number: None,
            location,
            search_radius_m: 0.0,
            state_calculator_id: None,
        }
    }

    pub fn with_key(mut self, key: impl Into<String>) -> Self {
        self.key = key.into();
        self
    }

    /// 仅返回合法坐标
    pub fn valid_location(&self) -> Option<GeoPoint> {
        self.location.filter(GeoPoint::is_valid)
    }
}

/// 收费站点数据库行 (location 由 ST_Y/ST_X 拆出)
#[derive(Debug, Clone, FromRow)]
pub struct TollPointRow {
    pub id: i64,
    pub name: Option<String>,
    pub key: Option<String>,
    pub number: Option<String>,
    pub lat: Option<f64>,
    pub lon: Option<f64>,
    pub search_radius_m: Option<f64>,
    pub state_calculator_id: Option<Uuid>,
}

impl From<TollPointRow> for TollPoint {
    fn from(row: TollPointRow) -> Self {
        let location = match (row.lat, row.lon) {
            (Some(lat), Some(lon)) => Some(GeoPoint::new(lat, lon)),
            _ => None,
        };
        Self {
            id: row.id,
            name: row.name.unwrap_or_default(),
            key: row.key.unwrap_or_default(),
            number: row.number,
            location,
            search_radius_m: row.search_radius_m.unwrap_or(0.0),
            state_calculator_id: row.state_calculator_id,
        }
    }
}

/// 州计算器 (StateCalculator), 每个州代码唯一
#[derive(Debug, Clone, PartialEq, Eq, FromRow, Serialize, Deserialize)]
pub struct StateCalculator {
    pub id: Uuid,
    pub name: String,
    pub state_code: String,
}

impl StateCalculator {
    pub fn new(name: impl Into<String>, state_code: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            state_code: state_code.into().to_uppercase(),
        }
    }
}
