//! Sitemap generation.

use chrono::{Local, NaiveDate};
use quire_core::Config;
use tracing::debug;

/// Sitemap file name below the destination.
pub const SITEMAP_FILE: &str = "sitemap.xml";

const CHANGEFREQ: &str = "weekly";
const PRIORITY: f32 = 0.8;

/// Sitemap generator.
///
/// Every entry gets the same `lastmod`, `changefreq` and `priority`; only
/// the location varies.
#[derive(Debug)]
pub struct SitemapGenerator<'a> {
    config: &'a Config,
    urls: Vec<String>,
}

impl<'a> SitemapGenerator<'a> {
    #[must_use]
    pub fn new(config: &'a Config) -> Self {
        Self {
            config,
            urls: Vec::new(),
        }
    }

    /// Append a site-relative URL.
    pub fn push(&mut self, url: impl Into<String>) {
        self.urls.push(url.into());
    }

    /// Append several site-relative URLs in order.
    pub fn extend<I, S>(&mut self, urls: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.urls.extend(urls.into_iter().map(Into::into));
    }

    pub fn len(&self) -> usize {
        self.urls.len()
    }

    pub fn is_empty(&self) -> bool {
        self.urls.is_empty()
    }

    /// Sitemap XML dated today.
    pub fn generate(&self) -> String {
        self.generate_on(Local::now().date_naive())
    }

    fn generate_on(&self, today: NaiveDate) -> String {
        debug!(count = self.urls.len(), "generating sitemap");

        let lastmod = today.format("%Y-%m-%d").to_string();
        let mut xml = String::from(r#"<?xml version="1.0" encoding="UTF-8"?>"#);
        xml.push('\n');
        xml.push_str(r#"<urlset xmlns="http://www.sitemaps.org/schemas/sitemap/0.9">"#);
        xml.push('\n');

        for url in &self.urls {
            let loc = self.config.absolute_url(url);
            xml.push_str("  <url>\n");
            xml.push_str(&format!("    <loc>{}</loc>\n", escape_xml(&loc)));
            xml.push_str(&format!("    <lastmod>{lastmod}</lastmod>\n"));
            xml.push_str(&format!("    <changefreq>{CHANGEFREQ}</changefreq>\n"));
            xml.push_str(&format!("    <priority>{PRIORITY:.1}</priority>\n"));
            xml.push_str("  </url>\n");
        }

        xml.push_str("</urlset>\n");
        xml
    }
}

/// Escape special XML characters.
fn escape_xml(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&apos;")
}
