//! RSS feed generation.

use chrono::{DateTime, FixedOffset, Local};
use quire_core::{Config, Post};
use rss::{
    ChannelBuilder, GuidBuilder, Item, ItemBuilder,
    extension::atom::{AtomExtensionBuilder, Link},
};
use tracing::debug;

/// Posts carried by the feed.
pub const FEED_LIMIT: usize = 20;

/// Feed file name below the destination.
pub const FEED_FILE: &str = "feed.xml";

/// RFC 1123 with a numeric zone.
const RFC1123Z: &str = "%a, %d %b %Y %H:%M:%S %z";

const XML_DECLARATION: &str = r#"<?xml version="1.0" encoding="UTF-8"?>"#;

/// RSS 2.0 feed generator.
#[derive(Debug)]
pub struct RssGenerator<'a> {
    config: &'a Config,
}

impl<'a> RssGenerator<'a> {
    #[must_use]
    pub fn new(config: &'a Config) -> Self {
        Self { config }
    }

    /// Feed XML for the newest [`FEED_LIMIT`] of `posts`, which must
    /// already be sorted newest first.
    pub fn generate(&self, posts: &[Post]) -> String {
        self.generate_at(posts, Local::now().fixed_offset())
    }

    fn generate_at(&self, posts: &[Post], now: DateTime<FixedOffset>) -> String {
        let posts = &posts[..posts.len().min(FEED_LIMIT)];
        debug!(count = posts.len(), "generating RSS feed");

        let base = self.config.url.trim_end_matches('/');
        let items: Vec<Item> = posts.iter().map(|post| self.post_to_item(post)).collect();

        let mut self_link = Link::default();
        self_link.set_href(format!("{base}/{FEED_FILE}"));
        self_link.set_rel("self");
        self_link.set_mime_type(Some("application/rss+xml".to_string()));

        let channel = ChannelBuilder::default()
            .title(self.config.title.clone())
            .link(self.config.url.clone())
            .description(self.config.description.clone())
            .language(Some("zh-CN".to_string()))
            .last_build_date(Some(now.format(RFC1123Z).to_string()))
            .atom_ext(Some(AtomExtensionBuilder::default().links(vec![self_link]).build()))
            .items(items)
            .build();

        let xml = channel.to_string();
        if xml.starts_with("<?xml") {
            xml
        } else {
            format!("{XML_DECLARATION}\n{xml}")
        }
    }

    fn post_to_item(&self, post: &Post) -> Item {
        let link = self.config.absolute_url(&post.relative_url);
        let guid = GuidBuilder::default().value(link.clone()).permalink(true).build();

        ItemBuilder::default()
            .title(Some(post.title.clone()))
            .link(Some(link))
            .guid(Some(guid))
            .pub_date(Some(post.date.format(RFC1123Z).to_string()))
            .description(Some(post.excerpt.clone()))
            .build()
    }
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;

    fn config() -> Config {
        Config {
            title: "Test Blog".to_string(),
            url: "https://example.com".to_string(),
            description: "A test blog".to_string(),
            ..Config::default()
        }
    }

    fn post(config: &Config, file: &str, title: &str) -> Post {
        let raw = format!("---\ntitle: \"{title}\"\n---\nExcerpt of {title}.\n\nRest.");
        Post::from_source(format!("_posts/{file}"), &raw, config).expect("post")
    }

    fn fixed_now() -> DateTime<FixedOffset> {
        FixedOffset::east_opt(8 * 3600)
            .unwrap()
            .with_ymd_and_hms(2024, 2, 1, 12, 0, 0)
            .unwrap()
    }

    #[test]
    fn test_generate_rss() {
        let config = config();
        let posts = vec![
            post(&config, "2024-01-16-second.md", "Second Post"),
            post(&config, "2024-01-15-first.md", "First Post"),
        ];

        let xml = RssGenerator::new(&config).generate_at(&posts, fixed_now());

        assert!(xml.starts_with("<?xml"));
        assert!(xml.contains("<title>Test Blog</title>"));
        assert!(xml.contains("<link>https://example.com</link>"));
        assert!(xml.contains("<description>A test blog</description>"));
        assert!(xml.contains("<language>zh-CN</language>"));
        assert!(xml.contains("<lastBuildDate>Thu, 01 Feb 2024 12:00:00 +0800</lastBuildDate>"));
        assert!(xml.contains(r#"href="https://example.com/feed.xml""#));
        assert!(xml.contains(r#"rel="self""#));
        assert!(xml.contains("<link>https://example.com/2024/01/15/first.html</link>"));
        assert!(xml.contains("https://example.com/2024/01/15/first.html</guid>"));
        assert!(xml.contains("<![CDATA[Excerpt of First Post.]]>"));
        assert!(xml.find("Second Post") < xml.find("First Post"));
    }

    #[test]
    fn test_feed_limit() {
        let config = config();
        let posts: Vec<Post> = (1..=25)
            .map(|day| {
                post(
                    &config,
                    &format!("2024-01-{day:02}-p{day}.md"),
                    &format!("Post {day}"),
                )
            })
            .collect();

        let xml = RssGenerator::new(&config).generate_at(&posts, fixed_now());
        assert_eq!(xml.matches("<item>").count(), FEED_LIMIT);
    }

    #[test]
    fn test_pub_date_format() {
        let config = config();
        let posts = vec![post(&config, "2024-01-15-first.md", "First")];
        let item = RssGenerator::new(&config).post_to_item(&posts[0]);
        let pub_date = item.pub_date().unwrap();
        assert!(pub_date.starts_with("Mon, 15 Jan 2024 00:00:00 "));
    }
}
