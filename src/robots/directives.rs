use crate::robots::pattern::{PathRule, RuleVerdict};
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use std::cmp::Reverse;
use std::time::Duration;

/// Rules declared for one group of `User-agent` lines
#[derive(Debug, Clone, Default, PartialEq)]
pub struct UserAgentDirectives {
    /// Lowercase agent tokens, `*` for the wildcard group
    pub agents: Vec<String>,
    rules: Vec<PathRule>,
    pub crawl_delay: Option<Duration>,
    pub preferred_host: Option<String>,
    pub sitemaps: Vec<String>,
}

impl UserAgentDirectives {
    pub fn new(agents: Vec<String>) -> Self {
        let mut agents: Vec<String> = agents.into_iter().map(|a| a.to_lowercase()).collect();
        agents.sort();
        agents.dedup();

        Self {
            agents,
            ..Self::default()
        }
    }

    pub fn add_rule(&mut self, rule: PathRule) {
        self.rules.push(rule);
        self.rules.sort_by(PathRule::precedence);
    }

    /// Rules in precedence order
    pub fn rules(&self) -> &[PathRule] {
        &self.rules
    }

    /// Absorbs another group declared for the same agents
    pub fn merge(&mut self, other: UserAgentDirectives) {
        for rule in other.rules {
            self.add_rule(rule);
        }
        if self.crawl_delay.is_none() {
            self.crawl_delay = other.crawl_delay;
        }
        if self.preferred_host.is_none() {
            self.preferred_host = other.preferred_host;
        }
        for sitemap in other.sitemaps {
            if !self.sitemaps.contains(&sitemap) {
                self.sitemaps.push(sitemap);
            }
        }
    }

    pub fn is_wildcard(&self) -> bool {
        self.agents.iter().any(|agent| agent == "*")
    }

    /// How specifically this group names `agent`
    ///
    /// Returns the length of the longest token contained in `agent`
    /// (ignoring any `/version` suffix on the token), 1 for the wildcard,
    /// and 0 when the group does not apply.
    pub fn match_score(&self, agent: &str) -> usize {
        let agent = agent.to_lowercase();
        self.agents
            .iter()
            .map(|token| {
                if token == "*" {
                    return 1;
                }
                let product = token.split('/').next().unwrap_or(token).trim();
                if !product.is_empty() && agent.contains(product) {
                    product.len()
                } else {
                    0
                }
            })
            .max()
            .unwrap_or(0)
    }

    /// Verdict of the highest-precedence rule matching `path`
    pub fn check(&self, path: &str) -> Option<RuleVerdict> {
        self.rules
            .iter()
            .find(|rule| rule.matches(path))
            .map(|rule| rule.verdict)
    }
}

/// Parsed robots.txt of one host, ordered for one crawler agent
#[derive(Debug, Clone)]
pub struct HostDirectives {
    blocks: Vec<UserAgentDirectives>,
    agent: String,
    ignore_ua_discrimination: bool,
    fetched_at: DateTime<Utc>,
}

impl HostDirectives {
    /// Orders `blocks` by how specifically they name `agent`
    ///
    /// Most specific token first; ties go to the group with fewer tokens,
    /// then to the lexically smaller token list.
    pub fn new(
        mut blocks: Vec<UserAgentDirectives>,
        agent: &str,
        ignore_ua_discrimination: bool,
    ) -> Self {
        let agent = agent.to_lowercase();
        blocks.sort_by_cached_key(|block| {
            (
                Reverse(block.match_score(&agent)),
                block.agents.len(),
                block.agents.join(","),
            )
        });

        Self {
            blocks,
            agent,
            ignore_ua_discrimination,
            fetched_at: Utc::now(),
        }
    }

    /// Directives that allow everything
    ///
    /// Used when robots.txt is missing, unreadable or unreachable.
    pub fn allow_all(agent: &str, ignore_ua_discrimination: bool) -> Self {
        Self::new(Vec::new(), agent, ignore_ua_discrimination)
    }

    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }

    pub fn blocks(&self) -> &[UserAgentDirectives] {
        &self.blocks
    }

    pub fn fetched_at(&self) -> DateTime<Utc> {
        self.fetched_at
    }

    /// Checks if the directives are older than `ttl`
    pub fn is_expired(&self, ttl: ChronoDuration) -> bool {
        Utc::now() - self.fetched_at > ttl
    }

    /// Returns true unless the path is explicitly disallowed
    pub fn allows(&self, path: &str) -> bool {
        self.check_access(path) != Some(RuleVerdict::Disallow)
    }

    /// Resolves the verdict for `path`
    ///
    /// Normally only the most specific group naming our agent is
    /// consulted. With UA discrimination ignored, every group is
    /// scanned in order; a Disallow from a wildcard group is provisional
    /// and an explicit Allow from a later group overrides it.
    pub fn check_access(&self, path: &str) -> Option<RuleVerdict> {
        let mut provisional = None;

        for block in &self.blocks {
            let score = block.match_score(&self.agent);

            if !self.ignore_ua_discrimination {
                if score == 0 {
                    break;
                }
                return block.check(path);
            }

            match block.check(path) {
                Some(RuleVerdict::Disallow) if block.is_wildcard() => {
                    provisional = Some(RuleVerdict::Disallow);
                }
                Some(verdict) => return Some(verdict),
                None => {}
            }
        }

        provisional
    }

    /// The group that governs our agent, if any
    fn governing_block(&self) -> Option<&UserAgentDirectives> {
        self.blocks
            .first()
            .filter(|block| block.match_score(&self.agent) > 0)
    }

    /// `Crawl-delay` of the group governing our agent
    pub fn crawl_delay(&self) -> Option<Duration> {
        self.governing_block().and_then(|block| block.crawl_delay)
    }

    /// `Host` directive of the group governing our agent
    pub fn preferred_host(&self) -> Option<&str> {
        self.governing_block()
            .and_then(|block| block.preferred_host.as_deref())
    }

    /// Every sitemap URL declared in the file
    pub fn sitemaps(&self) -> Vec<String> {
        let mut sitemaps: Vec<String> = Vec::new();
        for block in &self.blocks {
            for sitemap in &block.sitemaps {
                if !sitemaps.contains(sitemap) {
                    sitemaps.push(sitemap.clone());
                }
            }
        }
        sitemaps
    }
}
