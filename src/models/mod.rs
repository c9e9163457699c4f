pub mod pair;
pub mod price;
pub mod region;
pub mod report;
pub mod toll;

pub use pair::{DirectedTollPair, PairKey};
pub use price::{
    AxleClass, DayOfWeek, PaymentType, PriceDimensions, PriceFact, PriceFactRequest, PriceFactRow,
    PriceOwner, TimeOfDay, UnknownDimension,
};
pub use region::{BoundingBox, Polygon};
pub use report::{export_reports_csv, CommitSummary, ImportReport};
pub use toll::{GeoPoint, StateCalculator, TollPoint, TollPointRow};
