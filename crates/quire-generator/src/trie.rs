//! Path-segment trie for URL routing.

use std::collections::BTreeMap;

#[derive(Debug, Clone)]
struct Node<T> {
    value: Option<T>,
    children: BTreeMap<String, Node<T>>,
}

impl<T> Default for Node<T> {
    fn default() -> Self {
        Self {
            value: None,
            children: BTreeMap::new(),
        }
    }
}

/// Maps `/`-separated paths to values.
///
/// Empty segments are ignored, so `/a//b/` and `a/b` are the same key and
/// `/` addresses the root.
#[derive(Debug, Clone)]
pub struct UrlTrie<T> {
    root: Node<T>,
    len: usize,
}

impl<T> Default for UrlTrie<T> {
    fn default() -> Self {
        Self {
            root: Node::default(),
            len: 0,
        }
    }
}

impl<T> UrlTrie<T> {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert `value` at `path`, returning the value it replaced.
    pub fn insert(&mut self, path: &str, value: T) -> Option<T> {
        let mut node = &mut self.root;
        for segment in segments(path) {
            node = node.children.entry(segment.to_string()).or_default();
        }
        let previous = node.value.replace(value);
        if previous.is_none() {
            self.len += 1;
        }
        previous
    }

    /// Exact match.
    pub fn lookup(&self, path: &str) -> Option<&T> {
        self.node(path).and_then(|node| node.value.as_ref())
    }

    /// Every value at or below `prefix`, in pre-order.
    pub fn prefix_search(&self, prefix: &str) -> Vec<&T> {
        let mut out = Vec::new();
        if let Some(node) = self.node(prefix) {
            collect(node, &mut out);
        }
        out
    }

    /// Number of stored values.
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    fn node(&self, path: &str) -> Option<&Node<T>> {
        let mut node = &self.root;
        for segment in segments(path) {
            node = node.children.get(segment)?;
        }
        Some(node)
    }
}

fn segments(path: &str) -> impl Iterator<Item = &str> {
    path.split('/').filter(|segment| !segment.is_empty())
}

fn collect<'a, T>(node: &'a Node<T>, out: &mut Vec<&'a T>) {
    if let Some(value) = &node.value {
        out.push(value);
    }
    for child in node.children.values() {
        collect(child, out);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn routes() -> UrlTrie<&'static str> {
        let mut trie = UrlTrie::new();
        trie.insert("/2024/01/15/a.html", "a");
        trie.insert("/2024/01/16/b.html", "b");
        trie
    }

    #[test]
    fn test_lookup() {
        let trie = routes();
        assert_eq!(trie.lookup("/2024/01/15/a.html"), Some(&"a"));
        assert_eq!(trie.lookup("2024/01/16/b.html"), Some(&"b"));
        assert_eq!(trie.lookup("/nope"), None);
        assert_eq!(trie.lookup("/2024/01"), None);
    }

    #[test]
    fn test_prefix_search() {
        let trie = routes();
        let mut found = trie.prefix_search("/2024/01");
        found.sort();
        assert_eq!(found, vec![&"a", &"b"]);

        assert_eq!(trie.prefix_search("/2024/01/15").len(), 1);
        assert_eq!(trie.prefix_search("/").len(), 2);
        assert!(trie.prefix_search("/2023").is_empty());
    }

    #[test]
    fn test_prefix_is_segment_based() {
        let trie = routes();
        assert!(trie.prefix_search("/2024/0").is_empty());
    }

    #[test]
    fn test_last_insert_wins() {
        let mut trie = routes();
        assert_eq!(trie.insert("/2024/01/15/a.html", "a2"), Some("a"));
        assert_eq!(trie.lookup("/2024/01/15/a.html"), Some(&"a2"));
        assert_eq!(trie.len(), 2);
    }

    #[test]
    fn test_empty_segments_are_ignored() {
        let mut trie = UrlTrie::new();
        trie.insert("//x///y/", 1);
        assert_eq!(trie.lookup("/x/y"), Some(&1));
        assert!(!trie.is_empty());
    }
}
