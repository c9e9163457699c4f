use indexmap::IndexMap;

use crate::models::{PairKey, TollPoint};

/// 入口 × 出口 笛卡尔展开为有向站点对
///
/// 对每个 `entry.id != exit.id` 的组合调用 `f`, 其结果追加到 `(entry.id, exit.id)`
/// 对应的桶中 (不覆盖)。入口/出口中重复的站点各自独立处理。
/// 单值结果可用 `Some(x)` 或 `[x]` 返回。
pub fn expand<R, I, F>(entries: &[TollPoint], exits: &[TollPoint], mut f: F) -> IndexMap<PairKey, Vec<R>>
where
    F: FnMut(&TollPoint, &TollPoint) -> I,
    I: IntoIterator<Item = R>,
{
    let mut results: IndexMap<PairKey, Vec<R>> = IndexMap::new();

    for entry in entries {
        for exit in exits {
            if entry.id == exit.id {
                continue;
            }
            let produced = f(entry, exit);
            results
                .entry(PairKey::new(entry.id, exit.id))
                .or_default()
                .extend(produced);
        }
    }

    results
}

#[cfg(test)]
mod tests {
    use super::*;

    fn toll(id: i64) -> TollPoint {
        TollPoint::new(id, format!("Plaza {id}"), None)
    }

    #[test]
    fn self_pairs_are_excluded() {
        let tolls = vec![toll(1), toll(2)];
        let mut calls = Vec::new();

        let result = expand(&tolls, &tolls, |e, x| {
            calls.push((e.id, x.id));
            Some(e.id * 10 + x.id)
        });

        assert_eq!(calls, vec![(1, 2), (2, 1)]);
        assert_eq!(result.len(), 2);
        assert_eq!(result[&PairKey::new(1, 2)], vec![12]);
        assert_eq!(result[&PairKey::new(2, 1)], vec![21]);
    }

    #[test]
    fn duplicate_combinations_append_into_one_bucket() {
        let entries = vec![toll(1), toll(1)];
        let exits = vec![toll(3)];

        let result = expand(&entries, &exits, |_, _| vec!["a", "b"]);

        assert_eq!(result.len(), 1);
        assert_eq!(result[&PairKey::new(1, 3)], vec!["a", "b", "a", "b"]);
    }

    #[test]
    fn empty_side_produces_nothing() {
        let mut called = false;
        let result = expand(&[toll(1)], &[], |_, _| {
            called = true;
            None::<()>
        });
        assert!(result.is_empty());
        assert!(!called);
    }
}
