//! robots.txt text parser
//!
//! Turns the raw file into [`UserAgentDirectives`] groups. Parsing never
//! fails: unreadable lines are skipped.

use crate::robots::directives::UserAgentDirectives;
use crate::robots::pattern::{PathRule, RuleVerdict};
use std::time::Duration;

/// Parses robots.txt content into groups
///
/// Consecutive `User-agent` lines open one group; the first rule line
/// after them closes the list of agents. Rule lines that appear before
/// any `User-agent` line belong to the wildcard group. Groups declared
/// for the same set of agents are merged.
///
/// # Arguments
///
/// * `content` - The robots.txt body
///
/// # Returns
///
/// The groups in declaration order
pub fn parse_robots(content: &str) -> Vec<UserAgentDirectives> {
    let mut groups: Vec<UserAgentDirectives> = Vec::new();
    let mut pending_agents: Vec<String> = Vec::new();
    let mut current: Option<UserAgentDirectives> = None;

    for raw_line in content.lines() {
        let line = strip_markup(strip_comment(raw_line));
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        let Some((field, value)) = line.split_once(':') else {
            tracing::trace!("Unrecognized line in robots.txt: {}", line);
            continue;
        };
        let field = field.trim().to_lowercase();
        let value = value.trim();

        if field == "user-agent" {
            if let Some(group) = current.take() {
                push_group(&mut groups, group);
            }
            if !value.is_empty() {
                pending_agents.push(value.to_lowercase());
            }
            continue;
        }

        let group = current.get_or_insert_with(|| {
            let agents = if pending_agents.is_empty() {
                vec!["*".to_string()]
            } else {
                std::mem::take(&mut pending_agents)
            };
            UserAgentDirectives::new(agents)
        });

        match field.as_str() {
            "allow" => group.add_rule(PathRule::new(RuleVerdict::Allow, value)),
            "disallow" => group.add_rule(PathRule::new(RuleVerdict::Disallow, value)),
            "crawl-delay" => match value.parse::<f64>() {
                Ok(seconds) => match Duration::try_from_secs_f64(seconds) {
                    Ok(delay) => group.crawl_delay = Some(delay),
                    Err(_) => tracing::debug!("Ignoring out of range Crawl-delay: {}", value),
                },
                Err(_) => tracing::debug!("Ignoring invalid Crawl-delay value: {}", value),
            },
            "host" => {
                if !value.is_empty() {
                    group.preferred_host = Some(value.to_lowercase());
                }
            }
            "sitemap" => {
                if !value.is_empty() && !group.sitemaps.iter().any(|s| s == value) {
                    group.sitemaps.push(value.to_string());
                }
            }
            _ => tracing::trace!("Ignoring unknown robots.txt directive: {}", field),
        }
    }

    if let Some(group) = current.take() {
        push_group(&mut groups, group);
    }

    groups
}

/// Appends a group, merging it into an earlier group for the same agents
fn push_group(groups: &mut Vec<UserAgentDirectives>, group: UserAgentDirectives) {
    match groups.iter_mut().find(|g| g.agents == group.agents) {
        Some(existing) => existing.merge(group),
        None => groups.push(group),
    }
}

fn strip_comment(line: &str) -> &str {
    match line.find('#') {
        Some(index) => &line[..index],
        None => line,
    }
}

/// Removes `<...>` tags, for robots.txt files served as HTML
fn strip_markup(line: &str) -> String {
    let mut out = String::with_capacity(line.len());
    let mut in_tag = false;

    for c in line.chars() {
        match c {
            '<' => in_tag = true,
            '>' if in_tag => in_tag = false,
            _ if !in_tag => out.push(c),
            _ => {}
        }
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::robots::directives::HostDirectives;

    #[test]
    fn test_basic_groups() {
        let content = "\
User-agent: *
Disallow: /private/
Allow: /private/public.html

User-agent: googlebot
Disallow: /
";
        let groups = parse_robots(content);
        assert_eq!(groups.len(), 2);
        assert_eq!(groups[0].agents, vec!["*"]);
        assert_eq!(groups[0].rules().len(), 2);
        assert_eq!(groups[1].agents, vec!["googlebot"]);
    }

    #[test]
    fn test_consecutive_user_agents_share_group() {
        let groups = parse_robots("User-agent: a\nUser-agent: b\nDisallow: /x\n");
        assert_eq!(groups.len(), 1);
        assert_eq!(groups[0].agents, vec!["a", "b"]);
    }

    #[test]
    fn test_rules_without_user_agent_default_to_wildcard() {
        let groups = parse_robots("Disallow: /tmp/\n");
        assert_eq!(groups.len(), 1);
        assert!(groups[0].is_wildcard());
    }

    #[test]
    fn test_comments_and_case() {
        let content = "# header comment\nUSER-AGENT: *  # everyone\nDISALLOW: /cgi-bin/ # scripts\n";
        let groups = parse_robots(content);
        assert_eq!(groups.len(), 1);
        assert_eq!(groups[0].rules()[0].pattern.as_str(), "/cgi-bin/");
    }

    #[test]
    fn test_crawl_delay_host_and_sitemap() {
        let content = "\
User-agent: *
Crawl-delay: 2.5
Host: Example.com
Sitemap: https://example.com/sitemap.xml
Disallow:
";
        let groups = parse_robots(content);
        let group = &groups[0];
        assert_eq!(group.crawl_delay, Some(Duration::from_millis(2500)));
        assert_eq!(group.preferred_host.as_deref(), Some("example.com"));
        assert_eq!(group.sitemaps, vec!["https://example.com/sitemap.xml"]);

        let directives = HostDirectives::new(groups, "bot", false);
        assert!(directives.allows("/anything"));
    }

    #[test]
    fn test_invalid_crawl_delay_ignored() {
        let groups = parse_robots("User-agent: *\nCrawl-delay: soon\n");
        assert_eq!(groups[0].crawl_delay, None);
    }

    #[test]
    fn test_out_of_range_crawl_delay_ignored() {
        for value in ["1e30", "99999999999999999999", "-5", "inf", "NaN"] {
            let groups = parse_robots(&format!("User-agent: *\nCrawl-delay: {}\nDisallow: /a\n", value));
            assert_eq!(groups[0].crawl_delay, None, "value {}", value);
            assert_eq!(groups[0].rules().len(), 1);
        }
    }

    #[test]
    fn test_duplicate_groups_merged() {
        let content = "\
User-agent: *
Disallow: /a

User-agent: other
Disallow: /

User-agent: *
Disallow: /b
";
        let groups = parse_robots(content);
        assert_eq!(groups.len(), 2);
        assert_eq!(groups[0].rules().len(), 2);
    }

    #[test]
    fn test_html_markup_stripped() {
        let content = "<html><body><pre>\nUser-agent: *<br>\nDisallow: /secret<br>\n</pre></body></html>";
        let directives = HostDirectives::new(parse_robots(content), "bot", false);
        assert!(!directives.allows("/secret/page"));
        assert!(directives.allows("/open"));
    }

    #[test]
    fn test_precedence_example() {
        let content = "\
User-agent: myAgent
Disallow: /a/

User-agent: *
Allow: /a/
";
        let directives = HostDirectives::new(parse_robots(content), "myAgent", false);
        assert!(!directives.allows("/a/x"));

        let others = HostDirectives::new(parse_robots(content), "someoneElse", false);
        assert!(others.allows("/a/x"));
    }

    #[test]
    fn test_garbage_is_ignored() {
        let groups = parse_robots("this is not robots\n\x00\x01\nUser-agent: *\nDisallow: /x\n");
        assert_eq!(groups.len(), 1);
    }
}
