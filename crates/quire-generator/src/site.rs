//! The in-memory site model produced by a build.

use std::{collections::BTreeMap, ops::Range};

use quire_core::{Config, Page, Post};
use serde_json::{Map, Value, json};

use crate::{build::BuildStats, layout::LayoutRegistry, trie::UrlTrie};

/// Everything one build loaded, derived and rendered.
///
/// Collections hold indices into [`Site::posts`], which is sorted newest
/// first. The routing trie maps both the canonical and the archive path of
/// every post to its index.
#[derive(Debug)]
pub struct Site {
    pub config: Config,
    pub pages: Vec<Page>,
    pub posts: Vec<Post>,
    pub layouts: LayoutRegistry,
    pub data: BTreeMap<String, Value>,

    /// Post ranges per pagination page; empty when pagination is off.
    pub paginated: Vec<Range<usize>>,

    /// `YYYY-MM` buckets, newest first.
    pub archives: Vec<(String, Vec<usize>)>,

    /// Tag cloud terms.
    pub tags: Vec<String>,

    /// Posts per header tag, by tag name.
    pub tag_index: Vec<(String, Vec<usize>)>,

    /// Posts per header category, by category name.
    pub categories: Vec<(String, Vec<usize>)>,

    pub trie: UrlTrie<usize>,
    pub stats: BuildStats,
}

impl Site {
    /// Post routed at `path`, canonical or archive mirror.
    pub fn lookup(&self, path: &str) -> Option<&Post> {
        self.trie.lookup(path).map(|&idx| &self.posts[idx])
    }

    /// Posts routed at or below `prefix`, each once, newest first.
    pub fn search(&self, prefix: &str) -> Vec<&Post> {
        let mut hits: Vec<usize> = self.trie.prefix_search(prefix).into_iter().copied().collect();
        hits.sort_unstable();
        hits.dedup();
        hits.into_iter().map(|idx| &self.posts[idx]).collect()
    }

    /// The `site` object handed to every template.
    pub fn site_value(&self) -> Value {
        json!({
            "title": self.config.title,
            "subtitle": self.config.subtitle,
            "description": self.config.description,
            "author": self.config.author,
            "url": self.config.url,
            "posts": self.posts,
            "pages": self.pages,
            "data": self.data,
            "archives": self.archive_value(),
            "tags": self.tags,
        })
    }

    /// Archive buckets as an ordered `YYYY-MM` → posts object.
    pub fn archive_value(&self) -> Value {
        let map: Map<String, Value> = self
            .archives
            .iter()
            .map(|(month, members)| (month.clone(), self.posts_value(members)))
            .collect();
        Value::Object(map)
    }

    /// Groups as `[{name, posts}]`.
    pub fn groups_value(&self, groups: &[(String, Vec<usize>)]) -> Value {
        groups
            .iter()
            .map(|(name, members)| json!({ "name": name, "posts": self.posts_value(members) }))
            .collect()
    }

    /// The posts at `indices`, serialized.
    pub fn posts_value(&self, indices: &[usize]) -> Value {
        indices
            .iter()
            .map(|&idx| serde_json::to_value(&self.posts[idx]).unwrap_or(Value::Null))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collections::{archive_buckets, sort_posts};

    fn site(files: &[&str]) -> Site {
        let config = Config {
            title: "Blog".to_string(),
            url: "http://example.com".to_string(),
            ..Config::default()
        };
        let mut posts: Vec<Post> = files
            .iter()
            .map(|file| {
                Post::from_source(format!("_posts/{file}"), "body", &config).expect("post")
            })
            .collect();
        sort_posts(&mut posts);

        let mut trie = UrlTrie::new();
        for (idx, post) in posts.iter().enumerate() {
            trie.insert(&post.relative_url, idx);
            trie.insert(&post.archive_url(), idx);
        }

        Site {
            archives: archive_buckets(&posts),
            config,
            pages: Vec::new(),
            posts,
            layouts: LayoutRegistry::new(),
            data: BTreeMap::new(),
            paginated: Vec::new(),
            tags: vec!["rust".to_string()],
            tag_index: Vec::new(),
            categories: Vec::new(),
            trie,
            stats: BuildStats::default(),
        }
    }

    #[test]
    fn test_lookup_canonical_and_mirror() {
        let site = site(&["2024-01-15-a.md", "2024-01-16-b.md"]);
        assert_eq!(site.lookup("/2024/01/15/a.html").unwrap().slug, "a");
        assert_eq!(site.lookup("/archives/2024/01/16/b.html").unwrap().slug, "b");
        assert!(site.lookup("/nope").is_none());
    }

    #[test]
    fn test_search_dedupes_mirrors() {
        let site = site(&["2024-01-15-a.md", "2024-01-16-b.md", "2023-05-01-c.md"]);

        let slugs: Vec<_> = site.search("/2024/01").iter().map(|p| p.slug.as_str()).collect();
        assert_eq!(slugs, vec!["b", "a"]);

        assert_eq!(site.search("/").len(), 3);
        assert_eq!(site.search("/archives/2023").len(), 1);
    }

    #[test]
    fn test_site_value() {
        let site = site(&["2024-01-15-a.md", "2024-02-01-b.md"]);
        let value = site.site_value();

        assert_eq!(value["title"], "Blog");
        assert_eq!(value["posts"].as_array().unwrap().len(), 2);
        assert_eq!(value["posts"][0]["slug"], "b");
        assert_eq!(value["tags"][0], "rust");

        let months: Vec<_> = value["archives"].as_object().unwrap().keys().cloned().collect();
        assert_eq!(months, vec!["2024-02", "2024-01"]);
    }

    #[test]
    fn test_groups_value() {
        let site = site(&["2024-01-15-a.md"]);
        let value = site.groups_value(&[("rust".to_string(), vec![0])]);
        assert_eq!(value[0]["name"], "rust");
        assert_eq!(value[0]["posts"][0]["slug"], "a");
    }
}
