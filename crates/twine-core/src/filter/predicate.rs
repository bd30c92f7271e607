use std::collections::HashSet;

use tracing::warn;

use crate::models::{FilterKind, FilterRule, StatusItem};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct FilterOptions {
    /// Also match user and source rules against the status a retweet wraps
    pub filter_retweets: bool,
}

/// Mute rules compiled into lookup sets. A status is hidden when any rule
/// matches it; everything is compared lowercase.
#[derive(Debug, Clone, Default)]
pub struct CompiledFilter {
    version: u64,
    options: FilterOptions,
    users: HashSet<String>,
    keywords: Vec<String>,
    sources: HashSet<String>,
    domains: Vec<String>,
    skipped: usize,
}

impl CompiledFilter {
    /// Malformed rules are logged and left out.
    pub fn compile<'a>(
        rules: impl IntoIterator<Item = &'a FilterRule>,
        options: FilterOptions,
        version: u64,
    ) -> Self {
        let mut compiled = Self {
            version,
            options,
            ..Self::default()
        };
        for rule in rules {
            let value = match rule.normalized() {
                Ok(value) => value,
                Err(e) => {
                    warn!(kind = %rule.kind, value = %rule.value, error = %e, "skipping malformed filter rule");
                    compiled.skipped += 1;
                    continue;
                }
            };
            match rule.kind {
                FilterKind::User => {
                    compiled.users.insert(value);
                }
                FilterKind::Keyword => {
                    if !compiled.keywords.contains(&value) {
                        compiled.keywords.push(value);
                    }
                }
                FilterKind::Source => {
                    compiled.sources.insert(value);
                }
                FilterKind::Link => {
                    if !compiled.domains.contains(&value) {
                        compiled.domains.push(value);
                    }
                }
            }
        }
        compiled
    }

    /// Rule-set version this filter was compiled from.
    pub fn version(&self) -> u64 {
        self.version
    }

    pub fn options(&self) -> FilterOptions {
        self.options
    }

    pub fn skipped(&self) -> usize {
        self.skipped
    }

    pub fn is_empty(&self) -> bool {
        self.users.is_empty()
            && self.keywords.is_empty()
            && self.sources.is_empty()
            && self.domains.is_empty()
    }

    /// True when some rule mutes `item`.
    pub fn matches(&self, item: &StatusItem) -> bool {
        if self.is_empty() {
            return false;
        }
        self.matches_user(item)
            || self.matches_keyword(item)
            || self.matches_source(item)
            || self.matches_link(item)
    }

    pub fn keep(&self, item: &StatusItem) -> bool {
        !self.matches(item)
    }

    fn matches_user(&self, item: &StatusItem) -> bool {
        if self.users.is_empty() {
            return false;
        }
        if self.users.contains(&item.user_screen_name.to_lowercase()) {
            return true;
        }
        self.options.filter_retweets
            && item
                .retweet
                .as_ref()
                .is_some_and(|rt| self.users.contains(&rt.user_screen_name.to_lowercase()))
    }

    fn matches_keyword(&self, item: &StatusItem) -> bool {
        if self.keywords.is_empty() {
            return false;
        }
        let text = item.text_plain.to_lowercase();
        self.keywords.iter().any(|k| text.contains(k.as_str()))
    }

    fn matches_source(&self, item: &StatusItem) -> bool {
        if self.sources.is_empty() {
            return false;
        }
        let source_matches =
            |source: &Option<String>| source.as_ref().is_some_and(|s| self.sources.contains(&s.trim().to_lowercase()));
        source_matches(&item.source)
            || (self.options.filter_retweets
                && item.retweet.as_ref().is_some_and(|rt| source_matches(&rt.source)))
    }

    fn matches_link(&self, item: &StatusItem) -> bool {
        if self.domains.is_empty() {
            return false;
        }
        item.links.iter().filter_map(|link| link_host(link)).any(|host| {
            self.domains
                .iter()
                .any(|domain| domain_matches(&host, domain))
        })
    }
}

/// Whether `item` stays visible under `predicate`.
pub fn apply(item: &StatusItem, predicate: &CompiledFilter) -> bool {
    predicate.keep(item)
}

fn link_host(link: &str) -> Option<String> {
    let parsed = url::Url::parse(link).ok()?;
    Some(parsed.host_str()?.trim_end_matches('.').to_lowercase())
}

/// `host` is `domain` itself or one of its subdomains.
fn domain_matches(host: &str, domain: &str) -> bool {
    host == domain
        || host
            .strip_suffix(domain)
            .is_some_and(|prefix| prefix.ends_with('.'))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::test_support::make_test_status;
    use crate::models::{RetweetOf, StatusId};

    fn compile(rules: &[FilterRule]) -> CompiledFilter {
        CompiledFilter::compile(rules, FilterOptions::default(), 1)
    }

    fn status_by(author: &str, text: &str) -> StatusItem {
        let mut item = make_test_status(1, 10);
        item.user_screen_name = author.to_string();
        item.text_plain = text.to_string();
        item
    }

    #[test]
    fn test_user_rule_is_exact_and_case_insensitive() {
        let filter = compile(&[FilterRule::user("@SpamUser")]);
        assert!(filter.matches(&status_by("spamuser", "hi")));
        assert!(filter.matches(&status_by("SPAMUSER", "hi")));
        assert!(!filter.matches(&status_by("spamuser2", "hi")));
    }

    #[test]
    fn test_keyword_rule_is_substring() {
        let filter = compile(&[FilterRule::keyword("Spoiler")]);
        assert!(filter.matches(&status_by("alice", "big SPOILERS ahead")));
        assert!(!filter.matches(&status_by("alice", "nothing here")));
    }

    #[test]
    fn test_source_rule_is_exact() {
        let filter = compile(&[FilterRule::source("SpamBot")]);
        let mut item = status_by("alice", "hi");
        item.source = Some("spambot".to_string());
        assert!(filter.matches(&item));
        item.source = Some("spambot pro".to_string());
        assert!(!filter.matches(&item));
        item.source = None;
        assert!(!filter.matches(&item));
    }

    #[test]
    fn test_link_rule_matches_domain_and_subdomains() {
        let filter = compile(&[FilterRule::link("example.com")]);
        let mut item = status_by("alice", "look");
        item.links = vec!["https://ads.Example.com/x".to_string()];
        assert!(filter.matches(&item));
        item.links = vec!["https://example.com".to_string()];
        assert!(filter.matches(&item));
        item.links = vec!["https://notexample.com".to_string(), "not a url".to_string()];
        assert!(!filter.matches(&item));
    }

    #[test]
    fn test_malformed_rules_are_skipped() {
        let filter = compile(&[
            FilterRule::user(""),
            FilterRule::link("   "),
            FilterRule::keyword("ok"),
        ]);
        assert_eq!(filter.skipped(), 2);
        assert!(filter.matches(&status_by("alice", "this is ok")));
        assert!(!filter.matches(&status_by("alice", "fine")));
    }

    #[test]
    fn test_retweet_of_muted_user_depends_on_option() {
        let mut item = status_by("alice", "RT");
        item.retweet = Some(RetweetOf {
            status_id: StatusId(3),
            user_screen_name: "spamuser".to_string(),
            source: None,
        });
        let rules = [FilterRule::user("spamuser")];

        let plain = CompiledFilter::compile(&rules, FilterOptions::default(), 1);
        assert!(apply(&item, &plain));

        let strict = CompiledFilter::compile(
            &rules,
            FilterOptions {
                filter_retweets: true,
            },
            1,
        );
        assert!(!apply(&item, &strict));
    }

    #[test]
    fn test_empty_filter_keeps_everything() {
        let filter = compile(&[]);
        assert!(filter.is_empty());
        assert!(filter.keep(&status_by("anyone", "anything")));
    }
}
