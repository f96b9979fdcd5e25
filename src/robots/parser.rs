//! robots.txt rules, matched with the robotstxt crate

use robotstxt::DefaultMatcher;

/// Rules from one origin's robots.txt
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RobotsRules {
    /// No usable file: missing, unreachable, or answered with an error status
    AllowAll,
    /// Raw file body, matched on demand
    Content(String),
}

impl RobotsRules {
    /// Builds rules from a robots.txt response
    ///
    /// # Arguments
    ///
    /// * `status` - HTTP status of the robots.txt request
    /// * `body` - Response body
    ///
    /// # Returns
    ///
    /// `AllowAll` for any non-2xx status or blank body, otherwise the parsed content
    pub fn from_response(status: u16, body: &str) -> Self {
        if !(200..300).contains(&status) || body.trim().is_empty() {
            return Self::AllowAll;
        }
        Self::Content(body.to_string())
    }

    /// Checks a URL against the rules for the given user agent token
    ///
    /// Groups naming the agent take precedence over `User-agent: *`.
    pub fn is_allowed(&self, url: &str, user_agent: &str) -> bool {
        match self {
            Self::AllowAll => true,
            Self::Content(body) => {
                let mut matcher = DefaultMatcher::default();
                matcher.one_agent_allowed_by_robots(body, user_agent, url)
            }
        }
    }
}
