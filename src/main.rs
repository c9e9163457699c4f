use std::path::Path;
use std::sync::Arc;

use toll_registry_sync::models::{export_reports_csv, ImportReport};
use toll_registry_sync::{
    create_pool, AppConfig, ImportService, JsonFeedAdapter, PgTollStore, RadiusMaintenance,
    SourceAdapter,
};
use tracing::{info, warn};
use tracing_subscriber::fmt::time::ChronoLocal;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // 初始化日志 - 使用本地时间格式
    tracing_subscriber::fmt()
        .with_timer(ChronoLocal::new("%Y-%m-%d %H:%M:%S".to_string()))
        .with_target(true)
        .with_level(true)
        .init();

    // 加载配置
    let config = AppConfig::load()?;
    info!("Starting toll registry sync with config: {:?}", config.engine);

    let feeds: Vec<String> = std::env::args().skip(1).collect();
    if feeds.is_empty() {
        warn!("Usage: toll-registry-sync <feed.json>...");
        return Ok(());
    }

    // 创建数据库连接池
    let pool = create_pool(&config.database).await?;
    info!("Database pool created");
    let store = Arc::new(PgTollStore::new(pool));

    let importer = ImportService::new(store.clone(), &config);

    // 读取数据源; 读取失败的直接记入报告
    let mut batches = Vec::with_capacity(feeds.len());
    let mut reports: Vec<ImportReport> = Vec::new();
    for path in &feeds {
        let adapter = JsonFeedAdapter::new(path);
        match adapter.load().await {
            Ok(batch) => batches.push(batch),
            Err(e) => {
                warn!("Skipping feed {}: {}", path, e);
                let mut report = ImportReport::new(adapter.name(), "");
                report.errors.push(e.to_string());
                reports.push(report);
            }
        }
    }
    let regions: Vec<_> = batches.iter().map(|b| b.region).collect();

    let results = importer.run_many(batches).await;
    reports.extend(results);
    reports.sort_by(|a, b| a.source.cmp(&b.source));

    for report in &reports {
        info!(
            "{} ({}): 处理 {}, 价格 {}, 新站点对 {}, 未找到 {}, 错误 {}",
            report.source,
            report.state_code,
            report.processed,
            report.prices_written,
            report.pairs_created,
            report.not_found.len(),
            report.errors.len()
        );
    }

    let rows = export_reports_csv(&reports, Path::new(&config.import.report_path))?;
    info!("Report written to {} ({} rows)", config.import.report_path, rows);

    // 导入完成后重算涉及区域的搜索半径
    if config.import.reallocate_radius && !regions.is_empty() {
        let maintenance = RadiusMaintenance::new(store, &config);
        let stats = maintenance.reallocate_many(&regions).await?;
        let collapsed: usize = stats.iter().map(|s| s.collapsed_points).sum();
        info!("Radius reallocated for {} regions, {} collapsed points", stats.len(), collapsed);
    }

    Ok(())
}
