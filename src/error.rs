use thiserror::Error;

/// 同步引擎错误
///
/// 只用于调用方错误和基础设施故障; 数据质量问题 (未匹配标签、无效坐标、
/// 非正金额) 不会走到这里, 而是记录在报告里或直接跳过。
#[derive(Debug, Error)]
pub enum SyncError {
    /// 区域多边形不合法 (点数不足、未闭合、坐标越界)
    #[error("invalid region: {0}")]
    InvalidRegion(String),

    /// 站点对的起点与终点相同
    #[error("toll pair cannot start and end at toll {0}")]
    SelfPair(i64),

    /// 数据源内容不合法
    #[error("invalid source '{source_name}': {message}")]
    InvalidSource { source_name: String, message: String },

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("config error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("csv error: {0}")]
    Csv(#[from] csv::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, SyncError>;
