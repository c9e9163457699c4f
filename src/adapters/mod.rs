pub mod json_feed;

use std::future::Future;

use serde::{Deserialize, Serialize};

use crate::error::{Result, SyncError};
use crate::models::{BoundingBox, PriceFactRequest};

pub use json_feed::JsonFeedAdapter;

/// 数据源适配器: 把各州的原始数据转成统一的 (标签, 价格) 记录
pub trait SourceAdapter: Send + Sync {
    fn name(&self) -> &str;

    fn load(&self) -> impl Future<Output = Result<SourceBatch>> + Send;
}

/// 单个数据源一次导入的全部内容
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceBatch {
    pub source: String,
    pub state_code: String,
    pub state_name: String,
    pub region: BoundingBox,
    pub records: Vec<SourceRecord>,
}

impl SourceBatch {
    pub fn validate(&self) -> Result<()> {
        if self.state_code.trim().is_empty() {
            return Err(SyncError::InvalidSource {
                source_name: self.source.clone(),
                message: "missing state code".to_string(),
            });
        }
        self.region.to_polygon().map(|_| ())
    }

    /// 全部标签 (按出现顺序, 可能重复)
    pub fn labels(&self) -> impl Iterator<Item = &str> {
        self.records.iter().flat_map(SourceRecord::labels)
    }
}

/// 统一记录: 站点价格或入口/出口路段价格
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SourceRecord {
    Plaza {
        label: String,
        #[serde(default)]
        number: Option<String>,
        prices: Vec<PriceFactRequest>,
    },
    Route {
        entry: Vec<String>,
        exit: Vec<String>,
        prices: Vec<PriceFactRequest>,
    },
}

impl SourceRecord {
    pub fn labels(&self) -> Box<dyn Iterator<Item = &str> + '_> {
        match self {
            Self::Plaza { label, .. } => Box::new(std::iter::once(label.as_str())),
            Self::Route { entry, exit, .. } => {
                Box::new(entry.iter().chain(exit.iter()).map(String::as_str))
            }
        }
    }

    pub fn prices(&self) -> &[PriceFactRequest] {
        match self {
            Self::Plaza { prices, .. } | Self::Route { prices, .. } => prices,
        }
    }
}
