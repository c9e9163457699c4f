use std::path::{Path, PathBuf};

use crate::adapters::{SourceAdapter, SourceBatch};
use crate::error::{Result, SyncError};

/// 读取统一 JSON 格式的数据源文件
#[derive(Debug, Clone)]
pub struct JsonFeedAdapter {
    name: String,
    path: PathBuf,
}

impl JsonFeedAdapter {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let name = path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());
        Self { name, path }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn parse(name: &str, content: &str) -> Result<SourceBatch> {
        let mut batch: SourceBatch = serde_json::from_str(content)?;
        if batch.source.trim().is_empty() {
            batch.source = name.to_string();
        }
        batch.state_code = batch.state_code.trim().to_uppercase();
        batch.validate()?;
        Ok(batch)
    }
}

impl SourceAdapter for JsonFeedAdapter {
    fn name(&self) -> &str {
        &self.name
    }

    async fn load(&self) -> Result<SourceBatch> {
        let content = tokio::fs::read_to_string(&self.path).await.map_err(|e| {
            SyncError::InvalidSource {
                source_name: self.name.clone(),
                message: format!("cannot read {}: {}", self.path.display(), e),
            }
        })?;
        let batch = Self::parse(&self.name, &content)?;
        tracing::info!(
            "Loaded source {} ({}): {} records",
            batch.source,
            batch.state_code,
            batch.records.len()
        );
        Ok(batch)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::SourceRecord;
    use crate::models::{AxleClass, DayOfWeek, PaymentType};
    use bigdecimal::BigDecimal;
    use std::io::Write;
    use std::str::FromStr;

    const FEED: &str = r#"{
        "source": "",
        "state_code": " md ",
        "state_name": "Maryland",
        "region": { "south": 37.9, "west": -79.5, "north": 39.7, "east": -75.0 },
        "records": [
            {
                "type": "plaza",
                "label": "Fort McHenry Tunnel",
                "number": "FMT-1",
                "prices": [
                    { "amount": "4.00", "payment_type": "transponder", "axle_class": 2 },
                    { "amount": "6.00", "payment_type": "pay_by_plate", "axle_class": 2,
                      "day_of_week_from": "saturday", "day_of_week_to": "sunday",
                      "description": "weekend plate rate" }
                ]
            },
            {
                "type": "route",
                "entry": ["Exit 1"],
                "exit": ["Exit 7", "Exit 9"],
                "prices": [ { "amount": "12.25", "payment_type": "cash", "axle_class": 5 } ]
            }
        ]
    }"#;

    #[test]
    fn parses_canonical_feed() {
        let batch = JsonFeedAdapter::parse("md_feed", FEED).unwrap();

        assert_eq!(batch.source, "md_feed");
        assert_eq!(batch.state_code, "MD");
        assert_eq!(batch.records.len(), 2);
        assert_eq!(
            batch.labels().collect::<Vec<_>>(),
            vec!["Fort McHenry Tunnel", "Exit 1", "Exit 7", "Exit 9"]
        );

        let SourceRecord::Plaza { number, prices, .. } = &batch.records[0] else {
            panic!("expected plaza record");
        };
        assert_eq!(number.as_deref(), Some("FMT-1"));
        assert_eq!(prices[1].dimensions.payment_type, PaymentType::PayByPlate);
        assert_eq!(prices[1].dimensions.day_of_week_from, DayOfWeek::Saturday);
        assert_eq!(prices[1].description.as_deref(), Some("weekend plate rate"));

        let route_prices = batch.records[1].prices();
        assert_eq!(route_prices[0].amount, BigDecimal::from_str("12.25").unwrap());
        assert_eq!(route_prices[0].dimensions.axle_class, AxleClass::axles(5));
    }

    #[test]
    fn rejects_feed_with_inverted_region() {
        let feed = FEED.replace("\"south\": 37.9", "\"south\": 40.9");
        assert!(matches!(
            JsonFeedAdapter::parse("md_feed", &feed),
            Err(SyncError::InvalidRegion(_))
        ));
    }

    #[tokio::test]
    async fn loads_feed_from_disk() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(FEED.as_bytes()).unwrap();

        let adapter = JsonFeedAdapter::new(file.path());
        let batch = adapter.load().await.unwrap();

        assert_eq!(batch.source, adapter.name());
        assert_eq!(batch.records.len(), 2);
    }

    #[tokio::test]
    async fn missing_file_is_an_invalid_source() {
        let adapter = JsonFeedAdapter::new("/nonexistent/feed.json");
        assert!(matches!(adapter.load().await, Err(SyncError::InvalidSource { .. })));
    }
}
