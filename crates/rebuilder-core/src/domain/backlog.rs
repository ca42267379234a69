//! Backlog - 投入待ちパッケージの順序付きリスト

use std::collections::{HashSet, VecDeque};

/// Backlog はパッケージ名の FIFO
///
/// # 不変条件
/// - 名前は一意：2 回書かれたパッケージは最初の位置で 1 回だけ投入される
/// - pop するのは dispatcher だけ
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Backlog {
    queue: VecDeque<String>,
}

impl Backlog {
    pub fn new<I, S>(packages: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut seen = HashSet::new();
        let queue = packages
            .into_iter()
            .map(Into::into)
            .filter(|name: &String| seen.insert(name.clone()))
            .collect();
        Self { queue }
    }

    /// Build list minus ignore list.
    ///
    /// Both are line-oriented; blank lines and `#` comments are skipped.
    pub fn from_lists(build_list: &str, ignore_list: &str) -> Self {
        let ignored: HashSet<&str> = list_entries(ignore_list).collect();
        Self::new(list_entries(build_list).filter(|pkg| !ignored.contains(pkg)))
    }

    pub fn pop_front(&mut self) -> Option<String> {
        self.queue.pop_front()
    }

    pub fn len(&self) -> usize {
        self.queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.queue.iter().map(String::as_str)
    }
}

fn list_entries(text: &str) -> impl Iterator<Item = &str> {
    text.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ignore_list_is_subtracted() {
        let backlog = Backlog::from_lists("a\n b \n\n# comment\nc\n", "b\n");
        assert_eq!(backlog.iter().collect::<Vec<_>>(), vec!["a", "c"]);
    }

    #[test]
    fn duplicates_keep_first_position() {
        let mut backlog = Backlog::new(["a", "b", "a", "c", "b"]);
        assert_eq!(backlog.len(), 3);
        assert_eq!(backlog.pop_front().as_deref(), Some("a"));
        assert_eq!(backlog.pop_front().as_deref(), Some("b"));
        assert_eq!(backlog.pop_front().as_deref(), Some("c"));
        assert!(backlog.is_empty());
    }

    #[test]
    fn empty_lists_give_empty_backlog() {
        assert!(Backlog::from_lists("", "").is_empty());
        assert!(Backlog::from_lists("a\n", "a\n").is_empty());
    }
}
