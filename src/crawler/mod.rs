//! Breadth-first, politeness-constrained site crawler.
//!
//! A crawl walks out from a seed URL through a FIFO frontier, never leaving
//! the seed's registrable domain, honoring the site's robots rules, and
//! pausing between fetches. Pages come back in strict discovery order.
pub mod robots;

use std::collections::{HashSet, VecDeque};
use std::sync::LazyLock;
use std::time::Duration;

use scraper::{Html, Selector};
use thiserror::Error;
use tracing::{debug, info, warn};
use url::Url;

use crate::config::CrawlerConfig;
use self::robots::RobotsGate;

static LINK_SELECTOR: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("a[href]").expect("static selector"));

/// A page recorded by the crawl. Non-2xx responses are recorded with an
/// empty body; transport failures are not recorded at all.
#[derive(Debug, Clone)]
pub struct FetchedPage {
    pub url: String,
    pub status: u16,
    pub html: String,
}

/// Per-crawl traversal bounds.
#[derive(Debug, Clone)]
pub struct CrawlLimits {
    pub max_pages: usize,
    pub max_depth: usize,
    pub crawl_delay: Duration,
}

#[derive(Debug, Error)]
pub enum CrawlerError {
    #[error("invalid seed URL {url:?}: {source}")]
    InvalidSeed {
        url: String,
        source: url::ParseError,
    },

    #[error("seed URL {0:?} has no host")]
    SeedWithoutHost(String),

    #[error("failed to build HTTP client: {0}")]
    ClientBuild(#[from] reqwest::Error),
}

/// Crawler scoped to one site.
///
/// Robots rules are loaded once at construction from the seed's origin; the
/// scope key (registrable domain, or the literal host where none exists) is
/// fixed from the seed.
pub struct SiteCrawler {
    client: reqwest::blocking::Client,
    seed: Url,
    scope_key: String,
    robots: RobotsGate,
}

impl SiteCrawler {
    pub fn new(seed_url: &str, config: &CrawlerConfig) -> Result<Self, CrawlerError> {
        let seed = Url::parse(seed_url).map_err(|source| CrawlerError::InvalidSeed {
            url: seed_url.to_string(),
            source,
        })?;
        let scope_key =
            scope_key(&seed).ok_or_else(|| CrawlerError::SeedWithoutHost(seed_url.to_string()))?;

        let client = reqwest::blocking::Client::builder()
            .user_agent(config.user_agent.clone())
            .timeout(Duration::from_secs(config.fetch_timeout_secs))
            .build()?;

        let robots = RobotsGate::load(&client, &seed, &config.user_agent, config.robots_fail_closed);

        Ok(Self {
            client,
            seed,
            scope_key,
            robots,
        })
    }

    /// Run the breadth-first crawl.
    ///
    /// Returns the recorded pages in discovery order plus the count of URLs
    /// skipped for scope, robots, or transport reasons.
    pub fn crawl(&self, limits: &CrawlLimits) -> (Vec<FetchedPage>, usize) {
        let mut frontier: VecDeque<(Url, usize)> = VecDeque::new();
        frontier.push_back((self.seed.clone(), 0));

        let mut visited: HashSet<String> = HashSet::new();
        let mut results: Vec<FetchedPage> = Vec::new();
        let mut skipped = 0usize;

        while results.len() < limits.max_pages {
            let Some((url, depth)) = frontier.pop_front() else {
                break;
            };
            if !visited.insert(url.as_str().to_string()) {
                continue;
            }

            if !self.in_scope(&url) {
                debug!("skipping out-of-domain {url}");
                skipped += 1;
                continue;
            }
            if !self.robots.allows(&url) {
                info!("disallowed by robots: {url}");
                skipped += 1;
                continue;
            }

            let (status, html) = match self.fetch(&url) {
                Ok(page) => page,
                Err(e) => {
                    warn!("error fetching {url}: {e}");
                    skipped += 1;
                    continue;
                }
            };
            info!("fetched {url} ({status})");

            if depth < limits.max_depth && !html.is_empty() {
                for link in extract_links(&url, &html) {
                    if visited.contains(link.as_str()) {
                        continue;
                    }
                    if self.in_scope(&link) {
                        frontier.push_back((link, depth + 1));
                    } else {
                        // Out-of-scope targets are never fetched; count each
                        // one once and remember it so repeat references on
                        // other pages stay silent.
                        debug!("skipping out-of-domain link {link}");
                        visited.insert(link.as_str().to_string());
                        skipped += 1;
                    }
                }
            }

            results.push(FetchedPage {
                url: url.into(),
                status,
                html,
            });

            std::thread::sleep(limits.crawl_delay);
        }

        (results, skipped)
    }

    fn in_scope(&self, url: &Url) -> bool {
        scope_key(url).is_some_and(|key| key == self.scope_key)
    }

    fn fetch(&self, url: &Url) -> Result<(u16, String), reqwest::Error> {
        let resp = self.client.get(url.clone()).send()?;
        let status = resp.status();
        let html = if status.is_success() {
            resp.text()?
        } else {
            String::new()
        };
        Ok((status.as_u16(), html))
    }
}

/// Scope identity for a URL: its registrable domain (public suffix plus one
/// label), or the host itself for IPs and suffix-less names like `localhost`.
fn scope_key(url: &Url) -> Option<String> {
    let host = url.host_str()?;
    Some(
        psl::domain_str(host)
            .unwrap_or(host)
            .to_ascii_lowercase(),
    )
}

/// Resolve anchor targets against the fetched URL, dropping fragments.
/// Malformed individual links are skipped without aborting the scan.
fn extract_links(base: &Url, html: &str) -> Vec<Url> {
    let doc = Html::parse_document(html);
    doc.select(&LINK_SELECTOR)
        .filter_map(|a| a.value().attr("href"))
        .filter_map(|href| {
            let mut resolved = base.join(href).ok()?;
            resolved.set_fragment(None);
            Some(resolved)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use httpmock::prelude::*;

    fn test_config() -> CrawlerConfig {
        CrawlerConfig {
            user_agent: "webrag-bot/test".to_string(),
            fetch_timeout_secs: 5,
            robots_fail_closed: false,
            max_pages: 50,
            max_depth: 3,
            crawl_delay_ms: 500,
        }
    }

    fn limits(max_pages: usize, max_depth: usize) -> CrawlLimits {
        CrawlLimits {
            max_pages,
            max_depth,
            crawl_delay: Duration::ZERO,
        }
    }

    fn page_body(links: &[&str]) -> String {
        let anchors: String = links
            .iter()
            .map(|l| format!("<a href=\"{l}\">link</a>"))
            .collect();
        format!("<html><body><p>content</p>{anchors}</body></html>")
    }

    #[test]
    fn test_bfs_order_and_max_pages() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(GET).path("/robots.txt");
            then.status(404);
        });
        server.mock(|when, then| {
            when.method(GET).path("/");
            then.status(200).body(page_body(&["/a", "/b"]));
        });
        server.mock(|when, then| {
            when.method(GET).path("/a");
            then.status(200).body(page_body(&["/c"]));
        });
        server.mock(|when, then| {
            when.method(GET).path("/b");
            then.status(200).body(page_body(&["/d"]));
        });
        server.mock(|when, then| {
            when.method(GET).path("/c");
            then.status(200).body(page_body(&[]));
        });
        server.mock(|when, then| {
            when.method(GET).path("/d");
            then.status(200).body(page_body(&[]));
        });

        let crawler = SiteCrawler::new(&server.url("/"), &test_config()).unwrap();
        let (pages, skipped) = crawler.crawl(&limits(3, 3));

        assert_eq!(pages.len(), 3, "max_pages bounds recorded results");
        assert_eq!(skipped, 0);
        assert!(pages[0].url.ends_with('/'));
        assert!(pages[1].url.ends_with("/a"), "BFS order: /a before /b");
        assert!(pages[2].url.ends_with("/b"));
    }

    #[test]
    fn test_out_of_domain_link_skipped_not_fetched() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(GET).path("/robots.txt");
            then.status(404);
        });
        server.mock(|when, then| {
            when.method(GET).path("/");
            then.status(200)
                .body(page_body(&["https://elsewhere.example.org/page", "/local"]));
        });
        server.mock(|when, then| {
            when.method(GET).path("/local");
            then.status(200).body(page_body(&[]));
        });

        let crawler = SiteCrawler::new(&server.url("/"), &test_config()).unwrap();
        let (pages, skipped) = crawler.crawl(&limits(10, 3));

        assert_eq!(pages.len(), 2);
        assert_eq!(skipped, 1, "foreign link counted once, never fetched");
        assert!(pages.iter().all(|p| !p.url.contains("elsewhere")));
    }

    #[test]
    fn test_robots_disallow_skips_same_domain_path() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(GET).path("/robots.txt");
            then.status(200)
                .body("User-agent: *\nDisallow: /private\n");
        });
        server.mock(|when, then| {
            when.method(GET).path("/");
            then.status(200).body(page_body(&["/private/page", "/open"]));
        });
        server.mock(|when, then| {
            when.method(GET).path("/open");
            then.status(200).body(page_body(&[]));
        });
        let private = server.mock(|when, then| {
            when.method(GET).path("/private/page");
            then.status(200).body("should never be fetched");
        });

        let crawler = SiteCrawler::new(&server.url("/"), &test_config()).unwrap();
        let (pages, skipped) = crawler.crawl(&limits(10, 3));

        assert_eq!(pages.len(), 2);
        assert_eq!(skipped, 1);
        private.assert_hits(0);
    }

    #[test]
    fn test_non_2xx_recorded_with_empty_body() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(GET).path("/robots.txt");
            then.status(404);
        });
        server.mock(|when, then| {
            when.method(GET).path("/");
            then.status(200).body(page_body(&["/gone"]));
        });
        server.mock(|when, then| {
            when.method(GET).path("/gone");
            then.status(404).body("not found page");
        });

        let crawler = SiteCrawler::new(&server.url("/"), &test_config()).unwrap();
        let (pages, skipped) = crawler.crawl(&limits(10, 3));

        assert_eq!(pages.len(), 2, "non-2xx still counts as a recorded page");
        assert_eq!(skipped, 0);
        let gone = pages.iter().find(|p| p.url.ends_with("/gone")).unwrap();
        assert_eq!(gone.status, 404);
        assert!(gone.html.is_empty());
    }

    #[test]
    fn test_depth_limit_stops_link_discovery() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(GET).path("/robots.txt");
            then.status(404);
        });
        server.mock(|when, then| {
            when.method(GET).path("/");
            then.status(200).body(page_body(&["/depth1"]));
        });
        server.mock(|when, then| {
            when.method(GET).path("/depth1");
            then.status(200).body(page_body(&["/depth2"]));
        });
        let deep = server.mock(|when, then| {
            when.method(GET).path("/depth2");
            then.status(200).body(page_body(&[]));
        });

        let crawler = SiteCrawler::new(&server.url("/"), &test_config()).unwrap();
        let (pages, _) = crawler.crawl(&limits(10, 1));

        assert_eq!(pages.len(), 2, "depth 1 page is fetched but not scanned");
        deep.assert_hits(0);
    }

    #[test]
    fn test_fragments_stripped_and_not_refetched() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(GET).path("/robots.txt");
            then.status(404);
        });
        server.mock(|when, then| {
            when.method(GET).path("/");
            then.status(200)
                .body(page_body(&["/page#intro", "/page#details", "/page"]));
        });
        let page = server.mock(|when, then| {
            when.method(GET).path("/page");
            then.status(200).body(page_body(&[]));
        });

        let crawler = SiteCrawler::new(&server.url("/"), &test_config()).unwrap();
        let (pages, _) = crawler.crawl(&limits(10, 3));

        assert_eq!(pages.len(), 2);
        page.assert_hits(1);
    }

    #[test]
    fn test_invalid_seed_rejected() {
        assert!(matches!(
            SiteCrawler::new("not a url", &test_config()),
            Err(CrawlerError::InvalidSeed { .. })
        ));
    }

    #[test]
    fn test_extract_links_skips_malformed() {
        let base = Url::parse("https://example.com/dir/page").unwrap();
        let html = r##"<html><body>
            <a href="relative">a</a>
            <a href="/rooted">b</a>
            <a href="https://example.com/abs#frag">c</a>
            <a href="http://[badhost/">d</a>
        </body></html>"##;
        let links = extract_links(&base, html);
        let strs: Vec<&str> = links.iter().map(Url::as_str).collect();
        assert_eq!(
            strs,
            vec![
                "https://example.com/dir/relative",
                "https://example.com/rooted",
                "https://example.com/abs",
            ]
        );
    }
}
