//! Ids - 実行識別子
//!
//! dispatch の実行ごとに ULID を振り、ログ行と最終サマリーを突き合わせられるようにする。
//! ULID は生成時刻順にソートされるので、実行 ID の並びは実行順と一致する。

use serde::{Deserialize, Serialize};
use std::fmt;
use ulid::Ulid;

/// RunId は dispatch 実行 1 回の識別子
#[repr(transparent)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RunId(Ulid);

impl RunId {
    pub fn generate() -> Self {
        Self(Ulid::new())
    }

    pub fn from_ulid(ulid: Ulid) -> Self {
        Self(ulid)
    }

    pub fn as_ulid(&self) -> Ulid {
        self.0
    }
}

impl From<Ulid> for RunId {
    fn from(ulid: Ulid) -> Self {
        Self::from_ulid(ulid)
    }
}

impl fmt::Display for RunId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "run-{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_has_prefix() {
        let id = RunId::generate();
        assert!(id.to_string().starts_with("run-"));
    }

    #[test]
    fn run_ids_are_sortable() {
        let id1 = RunId::generate();
        std::thread::sleep(std::time::Duration::from_millis(2));
        let id2 = RunId::generate();
        assert!(id1 < id2);
    }

    #[test]
    fn run_ids_can_be_serialized() {
        let id = RunId::from(Ulid::new());
        let s = serde_json::to_string(&id).unwrap();
        let back: RunId = serde_json::from_str(&s).unwrap();
        assert_eq!(id, back);
    }
}
