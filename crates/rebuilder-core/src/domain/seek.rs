//! Seek - 不揃いなビルドレコードに対する入れ子フィールド検索
//!
//! hub の応答は形の緩い JSON（RPM 行のリストとビルド行のリストが並び、
//! map の中に list、その中にまた map）が多い。`nvr`, `arch`, `state`,
//! `build_id` などの検索はすべて同じ前順走査を通すので、どの呼び出し元も
//! 「最初の一致」について同じ答えを得る。
//!
//! # 走査順
//! - map は子より先に自分の `key` を返す
//! - 子は格納順に訪問する（配列はリスト順）

use serde_json::{Map, Value};

/// Pre-order walk over every node of a JSON tree.
///
/// Lazy and finite. Cloning the iterator (or calling [`nodes`] again) restarts
/// the walk without touching the tree.
#[derive(Debug, Clone)]
pub struct Nodes<'a> {
    stack: Vec<&'a Value>,
}

impl<'a> Iterator for Nodes<'a> {
    type Item = &'a Value;

    fn next(&mut self) -> Option<Self::Item> {
        let node = self.stack.pop()?;
        match node {
            Value::Array(items) => self.stack.extend(items.iter().rev()),
            Value::Object(map) => self.stack.extend(map.values().rev()),
            _ => {}
        }
        Some(node)
    }
}

/// Walk every node under (and including) `root`.
pub fn nodes(root: &Value) -> Nodes<'_> {
    Nodes { stack: vec![root] }
}

/// Every value stored under `key`, at any depth.
pub fn seek<'a>(root: &'a Value, key: &'a str) -> impl Iterator<Item = &'a Value> + Clone + 'a {
    nodes(root).filter_map(move |node| node.as_object().and_then(|map| map.get(key)))
}

/// Every map that carries `key`, at any depth.
///
/// Used when several fields of the same row must stay together
/// (name/version/release/arch of one RPM).
pub fn records_with<'a>(
    root: &'a Value,
    key: &'a str,
) -> impl Iterator<Item = &'a Map<String, Value>> + Clone + 'a {
    nodes(root).filter_map(move |node| node.as_object().filter(|map| map.contains_key(key)))
}

/// First string stored under `key`.
pub fn first_str<'a>(root: &'a Value, key: &'a str) -> Option<&'a str> {
    seek(root, key).find_map(Value::as_str)
}

/// First integer stored under `key`.
pub fn first_i64(root: &Value, key: &str) -> Option<i64> {
    seek(root, key).find_map(Value::as_i64)
}

/// True when the tree holds at least one build row (`nvr`) or RPM row (`arch`).
///
/// The hub returns `[[], []]` rather than null when nothing matched.
pub fn has_rows(root: &Value) -> bool {
    seek(root, "nvr").next().is_some() || seek(root, "arch").next().is_some()
}

/// `name-version-release` of the source RPM row, if there is one.
///
/// Only the `src` row is trusted: binary rows of a multiarch build can carry
/// names that differ from the build's own.
pub fn source_nvr(root: &Value) -> Option<String> {
    let row = records_with(root, "arch").find(|row| row["arch"] == "src")?;
    if let Some(nvr) = row.get("nvr").and_then(Value::as_str) {
        return Some(nvr.to_string());
    }
    let field = |key: &str| row.get(key).and_then(Value::as_str);
    Some(format!("{}-{}-{}", field("name")?, field("version")?, field("release")?))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn finds_keys_at_any_depth() {
        let v = json!([
            [{"nvr": "a-1-1", "arch": "src"}, {"nvr": "a-1-1", "arch": "noarch"}],
            [{"build": {"nvr": "a-1-1", "state": 1}}]
        ]);
        let arches: Vec<_> = seek(&v, "arch").filter_map(Value::as_str).collect();
        assert_eq!(arches, vec!["src", "noarch"]);
        assert_eq!(seek(&v, "nvr").count(), 3);
        assert_eq!(first_i64(&v, "state"), Some(1));
    }

    #[test]
    fn parent_match_comes_before_nested_match() {
        let v = json!({"name": "outer", "child": {"name": "inner"}});
        let names: Vec<_> = seek(&v, "name").filter_map(Value::as_str).collect();
        assert_eq!(names, vec!["outer", "inner"]);
    }

    #[test]
    fn matched_value_is_searched_too() {
        let v = json!({"info": {"info": 7}});
        let hits: Vec<_> = seek(&v, "info").collect();
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[1], &json!(7));
    }

    #[test]
    fn walk_is_restartable() {
        let v = json!([{"k": 1}, {"k": 2}]);
        let it = seek(&v, "k");
        let first: Vec<_> = it.clone().collect();
        let second: Vec<_> = it.collect();
        assert_eq!(first, second);
    }

    #[test]
    fn scalars_and_empty_collections_yield_nothing() {
        assert_eq!(seek(&json!(null), "nvr").count(), 0);
        assert_eq!(seek(&json!("nvr"), "nvr").count(), 0);
        assert!(!has_rows(&json!([[], []])));
        assert!(has_rows(&json!([[{"nvr": "x-1-1"}], []])));
    }

    #[test]
    fn source_nvr_comes_from_src_row_only() {
        let v = json!([[
            {"name": "q-libs", "version": "1.0", "release": "1", "arch": "x86_64"},
            {"name": "q", "version": "1.0", "release": "1", "arch": "src"}
        ], [{"nvr": "q-1.0-1", "build_id": 9}]]);
        assert_eq!(source_nvr(&v).as_deref(), Some("q-1.0-1"));

        let binary_only =
            json!([[{"name": "q", "version": "1", "release": "1", "arch": "noarch"}]]);
        assert_eq!(source_nvr(&binary_only), None);
    }

    #[test]
    fn records_keep_row_fields_together() {
        let v = json!([[
            {"name": "x", "version": "1", "arch": "src"},
            {"name": "x", "version": "1", "arch": "noarch"}
        ], [{"name": "x", "nvr": "x-1-1"}]]);
        let rows: Vec<_> = records_with(&v, "arch").collect();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[1]["arch"], "noarch");
    }
}
