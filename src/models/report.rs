use std::fs::File;
use std::path::Path;

use csv::Writer;
use serde::{Deserialize, Serialize};

/// 单次导入的结果报告
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ImportReport {
    pub source: String,
    pub state_code: String,
    /// 成功处理的记录数
    pub processed: usize,
    pub prices_written: usize,
    pub pairs_created: usize,
    /// 未找到的站点标签
    pub not_found: Vec<String>,
    pub errors: Vec<String>,
}

impl ImportReport {
    pub fn new(source: impl Into<String>, state_code: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            state_code: state_code.into(),
            ..Self::default()
        }
    }

    pub fn is_clean(&self) -> bool {
        self.not_found.is_empty() && self.errors.is_empty()
    }
}

/// 存储提交结果
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommitSummary {
    pub state_calculators: usize,
    pub tolls_updated: usize,
    pub pairs_upserted: usize,
    pub prices_upserted: usize,
}

/// 导出导入报告到 CSV: 每个未找到标签/错误一行, 干净的数据源输出一行汇总
pub fn export_reports_csv<'a>(
    reports: impl IntoIterator<Item = &'a ImportReport>,
    output_path: &Path,
) -> Result<usize, csv::Error> {
    let file = File::create(output_path)?;
    let mut writer = Writer::from_writer(file);
    let mut rows = 0;

    writer.write_record([
        "source",
        "state_code",
        "processed",
        "prices_written",
        "pairs_created",
        "kind",
        "detail",
    ])?;

    for report in reports {
        let summary = [
            report.source.clone(),
            report.state_code.clone(),
            report.processed.to_string(),
            report.prices_written.to_string(),
            report.pairs_created.to_string(),
        ];

        let details = report
            .not_found
            .iter()
            .map(|label| ("not_found", label.as_str()))
            .chain(report.errors.iter().map(|e| ("error", e.as_str())));

        let mut wrote_detail = false;
        for (kind, detail) in details {
            writer.write_record(summary.iter().map(String::as_str).chain([kind, detail]))?;
            rows += 1;
            wrote_detail = true;
        }
        if !wrote_detail {
            writer.write_record(summary.iter().map(String::as_str).chain(["ok", ""]))?;
            rows += 1;
        }
    }

    writer.flush()?;
    Ok(rows)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn export_writes_one_row_per_issue() {
        let mut dirty = ImportReport::new("md_feed", "MD");
        dirty.processed = 3;
        dirty.not_found = vec!["Key Bridge".into(), "Exit 99".into()];
        dirty.errors = vec!["database error: timeout".into()];
        let clean = ImportReport::new("de_feed", "DE");

        let file = tempfile::NamedTempFile::new().unwrap();
        let rows = export_reports_csv([&dirty, &clean], file.path()).unwrap();

        assert_eq!(rows, 4);
        let content = std::fs::read_to_string(file.path()).unwrap();
        assert!(content.starts_with("source,state_code,processed"));
        assert!(content.contains("md_feed,MD,3,0,0,not_found,Key Bridge"));
        assert!(content.contains("de_feed,DE,0,0,0,ok,"));
    }
}
