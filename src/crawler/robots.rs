//! Robots policy loading and evaluation.
use reqwest::blocking::Client;
use texting_robots::Robot;
use tracing::{info, warn};
use url::Url;

/// Site robots rules, fetched once per crawl from the seed's origin.
///
/// Three load outcomes:
/// - 2xx response: rules parsed and enforced;
/// - non-2xx response (typically 404): the site declares no rules, every URL
///   is allowed;
/// - transport or parse failure: the configured policy decides. The default
///   is fail-open (allow), matching common crawler practice; set
///   `fail_closed` to refuse instead.
pub struct RobotsGate {
    rules: Option<Robot>,
    fail_closed: bool,
}

impl RobotsGate {
    /// Fetch and parse `<origin>/robots.txt` for `seed`.
    pub fn load(client: &Client, seed: &Url, user_agent: &str, fail_closed: bool) -> Self {
        let robots_url = match seed.join("/robots.txt") {
            Ok(u) => u,
            Err(e) => {
                warn!("could not derive robots.txt URL from {seed}: {e}");
                return Self {
                    rules: None,
                    fail_closed,
                };
            }
        };

        match client.get(robots_url.clone()).send() {
            Ok(resp) if resp.status().is_success() => match resp.bytes() {
                Ok(body) => Self::parse(user_agent, &body, fail_closed, &robots_url),
                Err(e) => {
                    warn!("could not read robots.txt body from {robots_url}: {e}");
                    Self {
                        rules: None,
                        fail_closed,
                    }
                }
            },
            Ok(resp) => {
                // The site serves no robots.txt; nothing is disallowed.
                info!(
                    "no robots.txt at {robots_url} ({}), allowing all paths",
                    resp.status()
                );
                Self::parse(user_agent, b"", fail_closed, &robots_url)
            }
            Err(e) => {
                warn!("could not load robots.txt from {robots_url}: {e}");
                Self {
                    rules: None,
                    fail_closed,
                }
            }
        }
    }

    /// Parse rules from raw robots.txt bytes.
    pub fn parse(user_agent: &str, body: &[u8], fail_closed: bool, origin: &Url) -> Self {
        match Robot::new(user_agent, body) {
            Ok(robot) => {
                info!("loaded robots rules from {origin}");
                Self {
                    rules: Some(robot),
                    fail_closed,
                }
            }
            Err(e) => {
                warn!("could not parse robots.txt from {origin}: {e}");
                Self {
                    rules: None,
                    fail_closed,
                }
            }
        }
    }

    /// Whether the rules permit fetching `url`.
    pub fn allows(&self, url: &Url) -> bool {
        match &self.rules {
            Some(robot) => robot.allowed(url.as_str()),
            None => !self.fail_closed,
        }
    }
}
