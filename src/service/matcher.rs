use indexmap::{IndexMap, IndexSet};
use serde::{Deserialize, Serialize};

use crate::db::TollStore;
use crate::error::Result;
use crate::models::{Polygon, TollPoint};

/// 标签与站点的哪个字段比较
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchMode {
    Name,
    Key,
    #[default]
    NameOrKey,
}

impl MatchMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Name => "name",
            Self::Key => "key",
            Self::NameOrKey => "name_or_key",
        }
    }

    /// 参与比较的站点字段
    fn fields<'a>(&self, point: &'a TollPoint) -> impl Iterator<Item = &'a str> {
        let name = matches!(self, Self::Name | Self::NameOrKey).then_some(point.name.as_str());
        let key = matches!(self, Self::Key | Self::NameOrKey).then_some(point.key.as_str());
        name.into_iter().chain(key)
    }
}

/// 占位标签: 空、全空白或全下划线
pub fn is_placeholder(value: &str) -> bool {
    value.trim().chars().all(|c| c == '_')
}

/// 区域内标签匹配器
///
/// 每次调用只做一次区域查询, 然后在内存中对全部标签匹配:
/// 先精确匹配 (忽略大小写), 精确结果为空时才退回双向子串匹配。
#[derive(Debug, Clone, Copy, Default)]
pub struct GeoBoundedMatcher {
    mode: MatchMode,
}

impl GeoBoundedMatcher {
    pub fn new(mode: MatchMode) -> Self {
        Self { mode }
    }

    pub fn mode(&self) -> MatchMode {
        self.mode
    }

    /// 查询区域内站点并匹配所有标签, 返回 标签 -> 站点列表 (未找到为空列表)
    pub async fn find_matches<S: TollStore>(
        &self,
        store: &S,
        labels: &IndexSet<String>,
        region: &Polygon,
    ) -> Result<IndexMap<String, Vec<TollPoint>>> {
        let points = store.fetch_points_in_region(region).await?;
        tracing::debug!(
            "区域内 {} 个站点, 待匹配标签 {} 个 (mode={})",
            points.len(),
            labels.len(),
            self.mode.as_str()
        );
        Ok(self.match_labels(&points, labels))
    }

    /// 纯内存匹配
    pub fn match_labels(
        &self,
        points: &[TollPoint],
        labels: &IndexSet<String>,
    ) -> IndexMap<String, Vec<TollPoint>> {
        labels
            .iter()
            .map(|label| (label.clone(), self.match_label(points, label)))
            .collect()
    }

    pub fn match_label(&self, points: &[TollPoint], label: &str) -> Vec<TollPoint> {
        if is_placeholder(label) {
            return Vec::new();
        }
        let needle = label.trim().to_lowercase();

        let exact = self.select(points, |field| field == needle);
        if !exact.is_empty() {
            return exact;
        }

        self.select(points, |field| field.contains(&needle) || needle.contains(field))
    }

    fn select<P>(&self, points: &[TollPoint], predicate: P) -> Vec<TollPoint>
    where
        P: Fn(&str) -> bool,
    {
        points
            .iter()
            .filter(|point| {
                self.mode.fields(point).any(|field| {
                    !is_placeholder(field) && predicate(field.trim().to_lowercase().as_str())
                })
            })
            .cloned()
            .collect()
    }
}
