//! Post collections: ordering, pagination, archives and tags.

use std::{
    collections::{BTreeMap, HashMap},
    ops::Range,
    sync::LazyLock,
};

use jieba_rs::Jieba;
use quire_core::Post;

/// Terms kept in the tag cloud.
pub const TAG_CLOUD_SIZE: usize = 20;

/// Tag cloud entry used when no title yields a term.
pub const EMPTY_TAG_CLOUD: &str = "无标签";

static JIEBA: LazyLock<Jieba> = LazyLock::new(Jieba::new);

/// Newest first; same-date posts by slug.
pub fn sort_posts(posts: &mut [Post]) {
    posts.sort_by(|a, b| b.date.cmp(&a.date).then_with(|| a.slug.cmp(&b.slug)));
}

/// Contiguous index ranges of at most `per_page` posts.
///
/// Empty when `per_page` is zero.
pub fn paginate(len: usize, per_page: usize) -> Vec<Range<usize>> {
    if per_page == 0 {
        return Vec::new();
    }
    (0..len)
        .step_by(per_page)
        .map(|start| start..(start + per_page).min(len))
        .collect()
}

/// Site-relative URL of pagination page `number` (1-based).
pub fn pagination_url(number: usize) -> String {
    if number <= 1 {
        "/index.html".to_string()
    } else {
        format!("/page/{number}/index.html")
    }
}

/// Posts bucketed by `YYYY-MM`, in order of first appearance.
///
/// With posts sorted newest first, buckets come out newest first too.
pub fn archive_buckets(posts: &[Post]) -> Vec<(String, Vec<usize>)> {
    let mut buckets: Vec<(String, Vec<usize>)> = Vec::new();
    let mut positions: HashMap<String, usize> = HashMap::new();

    for (idx, post) in posts.iter().enumerate() {
        let key = post.date.format("%Y-%m").to_string();
        match positions.get(&key) {
            Some(&pos) => buckets[pos].1.push(idx),
            None => {
                positions.insert(key.clone(), buckets.len());
                buckets.push((key, vec![idx]));
            }
        }
    }
    buckets
}

/// Posts grouped by a header list such as `tags` or `categories`, by name.
pub fn group_by<F>(posts: &[Post], terms: F) -> Vec<(String, Vec<usize>)>
where
    F: Fn(&Post) -> &[String],
{
    let mut groups: BTreeMap<String, Vec<usize>> = BTreeMap::new();
    for (idx, post) in posts.iter().enumerate() {
        for term in terms(post) {
            let term = term.trim();
            if term.is_empty() {
                continue;
            }
            let members = groups.entry(term.to_string()).or_default();
            if members.last() != Some(&idx) {
                members.push(idx);
            }
        }
    }
    groups.into_iter().collect()
}

/// Most frequent title terms across all posts.
///
/// Titles are segmented in search mode and lowercased. Terms shorter than
/// two characters are dropped. Ties are broken by the term itself.
pub fn tag_cloud(posts: &[Post]) -> Vec<String> {
    let mut frequency: HashMap<String, usize> = HashMap::new();
    for post in posts {
        for token in JIEBA.cut_for_search(&post.title, true) {
            let token = token.trim().to_lowercase();
            if !is_cloud_term(&token) {
                continue;
            }
            *frequency.entry(token).or_default() += 1;
        }
    }

    let mut ranked: Vec<(String, usize)> = frequency.into_iter().collect();
    ranked.sort_by(|(a, x), (b, y)| y.cmp(x).then_with(|| a.cmp(b)));

    let mut tags: Vec<String> = ranked
        .into_iter()
        .take(TAG_CLOUD_SIZE)
        .map(|(token, _)| token)
        .collect();
    if tags.is_empty() {
        tags.push(EMPTY_TAG_CLOUD.to_string());
    }
    tags
}

fn is_cloud_term(token: &str) -> bool {
    token.chars().count() >= 2
}
