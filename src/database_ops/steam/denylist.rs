//! Denylist of appids/slugs that must never be imported. Immutable once
//! constructed and injected into the importer, so tests can swap it freely.

use std::collections::HashSet;

use crate::util::env::env_opt;

#[derive(Debug, Clone, Default)]
pub struct Denylist {
    appids: HashSet<i64>,
    slugs: HashSet<String>,
}

impl Denylist {
    pub fn new(appids: impl IntoIterator<Item = i64>, slugs: impl IntoIterator<Item = String>) -> Self {
        Self {
            appids: appids.into_iter().collect(),
            slugs: slugs.into_iter().map(|s| s.trim().to_string()).collect(),
        }
    }

    /// Env: DENYLIST_APPIDS ("10,20,30") and DENYLIST_SLUGS ("foo-1,bar-2").
    pub fn from_env() -> Self {
        let appids = env_opt("DENYLIST_APPIDS")
            .map(|raw| {
                raw.split(',')
                    .filter_map(|s| s.trim().parse::<i64>().ok())
                    .collect::<Vec<_>>()
            })
            .unwrap_or_default();
        let slugs = env_opt("DENYLIST_SLUGS")
            .map(|raw| {
                raw.split(',')
                    .map(|s| s.trim().to_string())
                    .filter(|s| !s.is_empty())
                    .collect::<Vec<_>>()
            })
            .unwrap_or_default();
        Self::new(appids, slugs)
    }

    /// Cheap pre-fetch check.
    pub fn contains_appid(&self, appid: i64) -> bool {
        self.appids.contains(&appid)
    }

    /// Post-normalization check; the slug depends on the fetched title.
    pub fn contains_slug(&self, slug: &str) -> bool {
        self.slugs.contains(slug)
    }

    pub fn len(&self) -> usize {
        self.appids.len() + self.slugs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.appids.is_empty() && self.slugs.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn membership_checks() {
        let deny = Denylist::new([10, 20], vec!["bad-game-30".to_string()]);
        assert!(deny.contains_appid(10));
        assert!(!deny.contains_appid(30));
        assert!(deny.contains_slug("bad-game-30"));
        assert!(!deny.contains_slug("good-game-40"));
        assert_eq!(deny.len(), 3);
    }

    #[test]
    fn default_is_empty() {
        assert!(Denylist::default().is_empty());
    }
}
