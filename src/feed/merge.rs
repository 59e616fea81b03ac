//! Merging freshly fetched articles into a stored set.

use std::collections::{HashMap, HashSet};

use crate::model::Article;

/// Result of [`merge_articles`].
#[derive(Debug, Clone, Default)]
pub struct MergeOutcome {
    /// Merged set: existing order first, new articles appended.
    pub articles: Vec<Article>,
    /// Incoming articles that had no stored counterpart.
    pub added: usize,
    /// Stored articles replaced by an incoming version.
    pub updated: usize,
}

/// Merges `incoming` into `existing`, keyed by [`Article::dedup_key`].
///
/// A matched article takes the incoming title, content and author but keeps
/// the stored `is_read` flag and `publish_date`, and keeps the stored summary
/// when the incoming one has none. Undated items are stamped with the fetch
/// time on every parse, so letting the incoming date win would reorder them
/// on each refresh. Stored articles absent from `incoming` are retained. When
/// `incoming` repeats a key, only the first occurrence is used.
///
/// The result is not sorted; see [`sort_by_publish_date`].
pub fn merge_articles(existing: Vec<Article>, incoming: Vec<Article>) -> MergeOutcome {
    let mut articles = existing;
    let mut index: HashMap<String, usize> = articles
        .iter()
        .enumerate()
        .map(|(i, a)| (a.dedup_key().to_string(), i))
        .collect();
    let mut seen_incoming: HashSet<String> = HashSet::new();

    let mut added = 0;
    let mut updated = 0;

    for mut article in incoming {
        let key = article.dedup_key().to_string();
        if !seen_incoming.insert(key.clone()) {
            continue;
        }

        match index.get(&key) {
            Some(&i) => {
                let stored = &mut articles[i];
                article.is_read = stored.is_read;
                article.publish_date = stored.publish_date;
                if article.summary.is_none() {
                    article.summary = stored.summary.take();
                }
                *stored = article;
                updated += 1;
            }
            None => {
                index.insert(key, articles.len());
                articles.push(article);
                added += 1;
            }
        }
    }

    MergeOutcome {
        articles,
        added,
        updated,
    }
}

/// Sorts newest first. Stable, so equal dates keep their relative order.
pub fn sort_by_publish_date(articles: &mut [Article]) {
    articles.sort_by(|a, b| b.publish_date.cmp(&a.publish_date));
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use pretty_assertions::assert_eq;
    use proptest::prelude::*;

    fn article(url: &str, title: &str, day: u32) -> Article {
        Article::new(
            title,
            format!("content of {title}"),
            url,
            Utc.with_ymd_and_hms(2024, 1, day, 0, 0, 0).unwrap(),
            "Feed",
            None,
        )
    }

    #[test]
    fn test_merge_preserves_read_state() {
        let mut stored = article("https://x/a", "A", 1);
        stored.is_read = true;
        let incoming = article("https://x/a", "A (edited)", 1);

        let outcome = merge_articles(vec![stored], vec![incoming]);
        assert_eq!(outcome.articles.len(), 1);
        assert_eq!(outcome.added, 0);
        assert_eq!(outcome.updated, 1);
        assert_eq!(outcome.articles[0].title, "A (edited)");
        assert!(outcome.articles[0].is_read);
    }

    #[test]
    fn test_merge_keeps_stored_publish_date() {
        let stored = article("https://x/a", "A", 1);
        let restamped = article("https://x/a", "A", 20);

        let outcome = merge_articles(vec![stored.clone()], vec![restamped]);
        assert_eq!(outcome.articles[0].publish_date, stored.publish_date);

        let again = merge_articles(outcome.articles.clone(), vec![article("https://x/a", "A", 27)]);
        assert_eq!(again.articles, outcome.articles);
    }

    #[test]
    fn test_merge_keeps_stored_summary_when_incoming_has_none() {
        let mut stored = article("https://x/a", "A", 1);
        stored.summary = Some("cached summary".into());
        let outcome = merge_articles(vec![stored], vec![article("https://x/a", "A", 1)]);
        assert_eq!(outcome.articles[0].summary.as_deref(), Some("cached summary"));
    }

    #[test]
    fn test_merge_appends_new_and_retains_missing() {
        let existing = vec![article("https://x/a", "A", 1), article("https://x/b", "B", 2)];
        let incoming = vec![article("https://x/c", "C", 3), article("https://x/a", "A", 1)];

        let outcome = merge_articles(existing, incoming);
        let urls: Vec<_> = outcome.articles.iter().map(|a| a.url.as_str()).collect();
        assert_eq!(urls, vec!["https://x/a", "https://x/b", "https://x/c"]);
        assert_eq!(outcome.added, 1);
        assert_eq!(outcome.updated, 1);
    }

    #[test]
    fn test_duplicate_incoming_keys_first_wins() {
        let incoming = vec![article("https://x/a", "first", 1), article("https://x/a", "second", 2)];
        let outcome = merge_articles(Vec::new(), incoming);
        assert_eq!(outcome.articles.len(), 1);
        assert_eq!(outcome.articles[0].title, "first");
    }

    #[test]
    fn test_urlless_articles_dedup_by_id() {
        let a = article("", "No link", 1);
        let b = article("", "Other", 1);
        let outcome = merge_articles(vec![a.clone()], vec![a, b]);
        assert_eq!(outcome.articles.len(), 2);
        assert_eq!(outcome.added, 1);
    }

    #[test]
    fn test_sort_newest_first_stable() {
        let mut articles = vec![
            article("https://x/1", "old", 1),
            article("https://x/2", "tie-a", 5),
            article("https://x/3", "new", 9),
            article("https://x/4", "tie-b", 5),
        ];
        sort_by_publish_date(&mut articles);
        let titles: Vec<_> = articles.iter().map(|a| a.title.as_str()).collect();
        assert_eq!(titles, vec!["new", "tie-a", "tie-b", "old"]);
    }

    fn arb_articles() -> impl Strategy<Value = Vec<(u8, bool, u8)>> {
        // (url slot, is_read, day)
        prop::collection::vec((0u8..8, any::<bool>(), 1u8..28), 0..12)
    }

    fn build(specs: &[(u8, bool, u8)]) -> Vec<Article> {
        specs
            .iter()
            .map(|&(slot, read, day)| {
                let mut a = article(&format!("https://x/{slot}"), &format!("t{slot}"), day as u32);
                a.is_read = read;
                a
            })
            .collect()
    }

    proptest! {
        #[test]
        fn merge_never_loses_read_flags(existing in arb_articles(), incoming in arb_articles()) {
            let existing = merge_articles(Vec::new(), build(&existing)).articles;
            let mut fresh = build(&incoming);
            for a in &mut fresh {
                a.is_read = false;
            }

            let merged = merge_articles(existing.clone(), fresh).articles;
            for old in existing.iter().filter(|a| a.is_read) {
                let found = merged.iter().find(|a| a.dedup_key() == old.dedup_key());
                prop_assert!(found.is_some_and(|a| a.is_read));
            }
        }

        #[test]
        fn merge_is_idempotent(existing in arb_articles(), incoming in arb_articles()) {
            let existing = merge_articles(Vec::new(), build(&existing)).articles;
            let incoming = build(&incoming);

            let once = merge_articles(existing, incoming.clone()).articles;
            let twice = merge_articles(once.clone(), incoming).articles;
            let keys = |v: &[Article]| v.iter().map(|a| (a.dedup_key().to_string(), a.is_read)).collect::<Vec<_>>();
            prop_assert_eq!(keys(&once), keys(&twice));
        }

        #[test]
        fn merged_keys_are_unique(existing in arb_articles(), incoming in arb_articles()) {
            let existing = merge_articles(Vec::new(), build(&existing)).articles;
            let merged = merge_articles(existing, build(&incoming)).articles;
            let mut keys: Vec<_> = merged.iter().map(|a| a.dedup_key().to_string()).collect();
            let len = keys.len();
            keys.sort();
            keys.dedup();
            prop_assert_eq!(keys.len(), len);
        }
    }
}
