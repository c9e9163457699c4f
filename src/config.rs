use config::{Config, Environment, File};
use serde::{Deserialize, Serialize};

use crate::service::matcher::MatchMode;

/// 应用配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub database: DatabaseConfig,
    pub engine: EngineConfig,
    pub import: ImportConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub acquire_timeout_secs: u64,
    pub slow_statement_secs: u64,
}

/// 匹配与半径分配参数
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    pub default_radius_m: f64,
    pub clearance_m: f64,
    pub repair_threshold_m: f64,
    pub match_mode: MatchMode,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImportConfig {
    /// 同时执行的导入任务上限
    pub max_concurrent_runs: usize,
    /// 未匹配/错误报告 CSV 输出路径
    pub report_path: String,
    /// 导入完成后是否对涉及的区域重算搜索半径
    pub reallocate_radius: bool,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            database: DatabaseConfig {
                url: std::env::var("DATABASE_URL")
                    .unwrap_or_else(|_| "postgres://localhost/toll_registry".to_string()),
                max_connections: 20,
                acquire_timeout_secs: 10,
                slow_statement_secs: 5,
            },
            engine: EngineConfig::default(),
            import: ImportConfig {
                max_concurrent_runs: 4,
                report_path: "import-report.csv".to_string(),
                reallocate_radius: true,
            },
        }
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            default_radius_m: 500.0,
            clearance_m: 0.1,
            repair_threshold_m: 2.0,
            match_mode: MatchMode::NameOrKey,
        }
    }
}

impl AppConfig {
    /// 加载配置: 默认值 -> toll-registry-sync.toml (可选) -> TOLL_SYNC__* 环境变量 -> DATABASE_URL
    pub fn load() -> Result<Self, config::ConfigError> {
        let defaults = Self::default();

        Config::builder()
            .set_default("database.url", defaults.database.url)?
            .set_default(
                "database.max_connections",
                defaults.database.max_connections as u64,
            )?
            .set_default(
                "database.acquire_timeout_secs",
                defaults.database.acquire_timeout_secs,
            )?
            .set_default(
                "database.slow_statement_secs",
                defaults.database.slow_statement_secs,
            )?
            .set_default("engine.default_radius_m", defaults.engine.default_radius_m)?
            .set_default("engine.clearance_m", defaults.engine.clearance_m)?
            .set_default("engine.repair_threshold_m", defaults.engine.repair_threshold_m)?
            .set_default("engine.match_mode", defaults.engine.match_mode.as_str())?
            .set_default(
                "import.max_concurrent_runs",
                defaults.import.max_concurrent_runs as u64,
            )?
            .set_default("import.report_path", defaults.import.report_path)?
            .set_default("import.reallocate_radius", defaults.import.reallocate_radius)?
            .add_source(File::with_name("toll-registry-sync").required(false))
            .add_source(Environment::with_prefix("TOLL_SYNC").separator("__"))
            .set_override_option("database.url", std::env::var("DATABASE_URL").ok())?
            .build()?
            .try_deserialize()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn load_falls_back_to_defaults() {
        let config = AppConfig::load().unwrap();
        assert_eq!(config.engine.default_radius_m, 500.0);
        assert_eq!(config.engine.clearance_m, 0.1);
        assert_eq!(config.engine.repair_threshold_m, 2.0);
        assert_eq!(config.engine.match_mode, MatchMode::NameOrKey);
        assert!(config.import.max_concurrent_runs > 0);
    }
}
