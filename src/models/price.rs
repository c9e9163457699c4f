use std::fmt;
use std::str::FromStr;

use bigdecimal::{BigDecimal, Zero};
use chrono::NaiveTime;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// 价格归属: 单个站点或有向站点对, 二者必居其一
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(tag = "kind", content = "id", rename_all = "snake_case")]
pub enum PriceOwner {
    Toll(i64),
    Pair(Uuid),
}

impl PriceOwner {
    pub fn toll_id(&self) -> Option<i64> {
        match self {
            Self::Toll(id) => Some(*id),
            Self::Pair(_) => None,
        }
    }

    pub fn pair_id(&self) -> Option<Uuid> {
        match self {
            Self::Toll(_) => None,
            Self::Pair(id) => Some(*id),
        }
    }
}

impl fmt::Display for PriceOwner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Toll(id) => write!(f, "toll:{id}"),
            Self::Pair(id) => write!(f, "pair:{id}"),
        }
    }
}

/// 维度值解析失败
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownDimension(pub String);

impl fmt::Display for UnknownDimension {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown price dimension value '{}'", self.0)
    }
}

impl std::error::Error for UnknownDimension {}

/// 支付方式
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentType {
    #[default]
    Any,
    Cash,
    Transponder,
    PayByPlate,
}

impl PaymentType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Any => "any",
            Self::Cash => "cash",
            Self::Transponder => "transponder",
            Self::PayByPlate => "pay_by_plate",
        }
    }
}

impl FromStr for PaymentType {
    type Err = UnknownDimension;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "any" | "" => Ok(Self::Any),
            "cash" => Ok(Self::Cash),
            "transponder" | "tag" | "ezpass" | "e-zpass" => Ok(Self::Transponder),
            "pay_by_plate" | "plate" | "video" => Ok(Self::PayByPlate),
            other => Err(UnknownDimension(other.to_string())),
        }
    }
}

/// 轴数等级, 0 表示不限
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AxleClass(pub i16);

impl AxleClass {
    pub const ANY: AxleClass = AxleClass(0);

    pub fn axles(count: i16) -> Self {
        Self(count.max(0))
    }
}

/// 星期, Any 表示不限
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DayOfWeek {
    #[default]
    Any,
    Monday,
    Tuesday,
    Wednesday,
    Thursday,
    Friday,
    Saturday,
    Sunday,
}

impl DayOfWeek {
    /// 数据库存储值: 0 = Any, 1..=7 = 周一..周日
    pub fn as_i16(&self) -> i16 {
        match self {
            Self::Any => 0,
            Self::Monday => 1,
            Self::Tuesday => 2,
            Self::Wednesday => 3,
            Self::Thursday => 4,
            Self::Friday => 5,
            Self::Saturday => 6,
            Self::Sunday => 7,
        }
    }

    pub fn from_i16(value: i16) -> Result<Self, UnknownDimension> {
        match value {
            0 => Ok(Self::Any),
            1 => Ok(Self::Monday),
            2 => Ok(Self::Tuesday),
            3 => Ok(Self::Wednesday),
            4 => Ok(Self::Thursday),
            5 => Ok(Self::Friday),
            6 => Ok(Self::Saturday),
            7 => Ok(Self::Sunday),
            other => Err(UnknownDimension(other.to_string())),
        }
    }
}

/// 时段
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TimeOfDay {
    #[default]
    Any,
    Peak,
    OffPeak,
    Overnight,
    Weekend,
}

impl TimeOfDay {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Any => "any",
            Self::Peak => "peak",
            Self::OffPeak => "off_peak",
            Self::Overnight => "overnight",
            Self::Weekend => "weekend",
        }
    }
}

impl FromStr for TimeOfDay {
    type Err = UnknownDimension;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "any" | "" => Ok(Self::Any),
            "peak" => Ok(Self::Peak),
            "off_peak" | "offpeak" => Ok(Self::OffPeak),
            "overnight" => Ok(Self::Overnight),
            "weekend" => Ok(Self::Weekend),
            other => Err(UnknownDimension(other.to_string())),
        }
    }
}

/// 价格维度组合, 同一归属下唯一
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PriceDimensions {
    pub payment_type: PaymentType,
    pub axle_class: AxleClass,
    #[serde(default)]
    pub day_of_week_from: DayOfWeek,
    #[serde(default)]
    pub day_of_week_to: DayOfWeek,
    #[serde(default)]
    pub time_of_day: TimeOfDay,
}

impl PriceDimensions {
    pub fn new(payment_type: PaymentType, axle_class: AxleClass) -> Self {
        Self {
            payment_type,
            axle_class,
            ..Self::default()
        }
    }
}

/// 价格记录 (TollPrice)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriceFact {
    pub id: Uuid,
    pub owner: PriceOwner,
    pub dimensions: PriceDimensions,
    pub time_from: Option<NaiveTime>,
    pub time_to: Option<NaiveTime>,
    pub amount: BigDecimal,
    pub description: Option<String>,
}

/// 价格写入请求
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriceFactRequest {
    pub amount: BigDecimal,
    #[serde(flatten)]
    pub dimensions: PriceDimensions,
    #[serde(default)]
    pub time_from: Option<NaiveTime>,
    #[serde(default)]
    pub time_to: Option<NaiveTime>,
    #[serde(default)]
    pub description: Option<String>,
}

impl PriceFactRequest {
    pub fn new(amount: BigDecimal, payment_type: PaymentType, axle_class: AxleClass) -> Self {
        Self {
            amount,
            dimensions: PriceDimensions::new(payment_type, axle_class),
            time_from: None,
            time_to: None,
            description: None,
        }
    }

    pub fn days(mut self, from: DayOfWeek, to: DayOfWeek) -> Self {
        self.dimensions.day_of_week_from = from;
        self.dimensions.day_of_week_to = to;
        self
    }

    pub fn time_of_day(mut self, time_of_day: TimeOfDay) -> Self {
        self.dimensions.time_of_day = time_of_day;
        self
    }

    /// 时间窗口, 允许跨越午夜 (from > to)
    pub fn window(mut self, from: NaiveTime, to: NaiveTime) -> Self {
        self.time_from = Some(from);
        self.time_to = Some(to);
        self
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn has_positive_amount(&self) -> bool {
        self.amount > BigDecimal::zero()
    }
}

/// 价格记录数据库行
#[derive(Debug, Clone, FromRow)]
pub struct PriceFactRow {
    pub id: Uuid,
    pub toll_id: Option<i64>,
    pub pair_id: Option<Uuid>,
    pub payment_type: String,
    pub axle_class: i16,
    pub day_of_week_from: i16,
    pub day_of_week_to: i16,
    pub time_of_day: String,
    pub time_from: Option<NaiveTime>,
    pub time_to: Option<NaiveTime>,
    pub amount: BigDecimal,
    pub description: Option<String>,
}

impl TryFrom<PriceFactRow> for PriceFact {
    type Error = UnknownDimension;

    fn try_from(row: PriceFactRow) -> Result<Self, Self::Error> {
        let owner = match (row.toll_id, row.pair_id) {
            (Some(toll_id), None) => PriceOwner::Toll(toll_id),
            (None, Some(pair_id)) => PriceOwner::Pair(pair_id),
            _ => return Err(UnknownDimension(format!("owner of price {}", row.id))),
        };

        Ok(Self {
            id: row.id,
            owner,
            dimensions: PriceDimensions {
                payment_type: row.payment_type.parse()?,
                axle_class: AxleClass(row.axle_class),
                day_of_week_from: DayOfWeek::from_i16(row.day_of_week_from)?,
                day_of_week_to: DayOfWeek::from_i16(row.day_of_week_to)?,
                time_of_day: row.time_of_day.parse()?,
            },
            time_from: row.time_from,
            time_to: row.time_to,
            amount: row.amount,
            description: row.description,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn payment_type_aliases() {
        assert_eq!("E-ZPass".parse::<PaymentType>().unwrap(), PaymentType::Transponder);
        assert_eq!("Video".parse::<PaymentType>().unwrap(), PaymentType::PayByPlate);
        assert!("bitcoin".parse::<PaymentType>().is_err());
    }

    #[test]
    fn request_builder_defaults_to_any() {
        let req = PriceFactRequest::new(BigDecimal::from(3), PaymentType::Cash, AxleClass::axles(5));
        assert_eq!(req.dimensions.day_of_week_from, DayOfWeek::Any);
        assert_eq!(req.dimensions.day_of_week_to, DayOfWeek::Any);
        assert_eq!(req.dimensions.time_of_day, TimeOfDay::Any);
        assert!(req.has_positive_amount());
        assert!(!PriceFactRequest::new(BigDecimal::zero(), PaymentType::Cash, AxleClass::ANY)
            .has_positive_amount());
    }

    #[test]
    fn row_with_both_owners_is_rejected() {
        let row = PriceFactRow {
            id: Uuid::new_v4(),
            toll_id: Some(1),
            pair_id: Some(Uuid::new_v4()),
            payment_type: "cash".into(),
            axle_class: 2,
            day_of_week_from: 0,
            day_of_week_to: 0,
            time_of_day: "any".into(),
            time_from: None,
            time_to: None,
            amount: BigDecimal::from(1),
            description: None,
        };
        assert!(PriceFact::try_from(row).is_err());
    }
}
