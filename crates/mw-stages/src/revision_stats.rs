//! Revision stats aggregator (spec §4.C8): groups [`PersistenceStat`]s by
//! their embedded revision and rolls them up under configurable
//! persistence/visibility thresholds.

use mw_model::{PersistenceStat, RevisionRef};
use regex::Regex;

#[derive(Debug, Clone)]
pub struct StatsConfig {
    pub min_persisted: i64,
    pub min_visible_secs: i64,
    pub include: Option<Regex>,
    pub exclude: Option<Regex>,
}

impl Default for StatsConfig {
    fn default() -> Self {
        Self { min_persisted: 5, min_visible_secs: 14 * 86_400, include: None, exclude: None }
    }
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct RevisionStats {
    pub revision: RevisionRef,
    pub tokens_added: i64,
    pub tokens_persisted: i64,
    pub tokens_non_self_persisted: i64,
    pub sum_log_persisted: f64,
    pub sum_log_non_self_persisted: f64,
    pub censored: bool,
    pub non_self_censored: bool,
}

/// Aggregate a (not necessarily grouped) sequence of stats, preserving the
/// order in which each revision was first seen.
pub fn aggregate<I>(stats: I, config: &StatsConfig) -> Vec<RevisionStats>
where
    I: IntoIterator<Item = PersistenceStat>,
{
    let mut order: Vec<(u64, u64)> = Vec::new();
    let mut groups: std::collections::HashMap<(u64, u64), (RevisionRef, Vec<PersistenceStat>)> =
        std::collections::HashMap::new();

    for stat in stats {
        let key = (stat.revision.page_id, stat.revision.id);
        let entry = groups.entry(key).or_insert_with(|| {
            order.push(key);
            (stat.revision.clone(), Vec::new())
        });
        entry.1.push(stat);
    }

    order.into_iter().map(|key| {
        let (revision, token_stats) = groups.remove(&key).expect("key from order exists");
        summarize(revision, &token_stats, config)
    }).collect()
}

fn summarize(revision: RevisionRef, stats: &[PersistenceStat], config: &StatsConfig) -> RevisionStats {
    let mut out = RevisionStats {
        revision,
        tokens_added: 0,
        tokens_persisted: 0,
        tokens_non_self_persisted: 0,
        sum_log_persisted: 0.0,
        sum_log_non_self_persisted: 0.0,
        censored: false,
        non_self_censored: false,
    };

    for p in stats {
        if let Some(re) = &config.include {
            if !re.is_match(&p.token) {
                continue;
            }
        }
        if let Some(re) = &config.exclude {
            if re.is_match(&p.token) {
                continue;
            }
        }

        out.tokens_added += 1;
        out.sum_log_persisted += ((p.persisted + 1) as f64).ln();
        out.sum_log_non_self_persisted += ((p.non_self_persisted + 1) as f64).ln();

        if p.seconds_visible >= config.min_visible_secs {
            out.tokens_persisted += 1;
            out.tokens_non_self_persisted += 1;
            continue;
        }

        if p.persisted >= config.min_persisted {
            out.tokens_persisted += 1;
        }
        if p.non_self_persisted >= config.min_persisted {
            out.tokens_non_self_persisted += 1;
        }

        if p.seconds_possible < config.min_visible_secs {
            out.censored = true;
            out.non_self_censored = true;
        } else {
            if p.processed < config.min_persisted {
                out.censored = true;
            }
            if p.non_self_processed < config.min_persisted {
                out.non_self_censored = true;
            }
        }
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    fn ts(secs: i64) -> mw_model::Timestamp {
        Utc.timestamp_opt(1_700_000_000 + secs, 0).unwrap()
    }

    fn revref() -> RevisionRef {
        RevisionRef { id: 1, page_id: 1, page_title: "Foo".into(), timestamp: ts(0), contributor: None }
    }

    fn stat(token: &str, persisted: i64, non_self_persisted: i64, seconds_visible: i64) -> PersistenceStat {
        PersistenceStat {
            token: token.into(),
            persisted,
            processed: persisted.max(non_self_persisted) + 1,
            non_self_persisted,
            non_self_processed: non_self_persisted + 1,
            seconds_visible,
            seconds_possible: seconds_visible + 1,
            revision: revref(),
        }
    }

    #[test]
    fn visibility_and_persisted_thresholds_each_count_independently() {
        const DAY: i64 = 86_400;
        // "a" clears the visibility bar outright; "b" falls short on both
        // visibility and raw persisted count, so only "a" is credited.
        let stats = vec![stat("a", 6, 4, 20 * DAY), stat("b", 1, 0, 3 * DAY)];
        let config = StatsConfig::default();
        let result = aggregate(stats, &config);
        assert_eq!(result.len(), 1);
        let r = &result[0];
        assert_eq!(r.tokens_added, 2);
        assert_eq!(r.tokens_persisted, 1);
        assert_eq!(r.tokens_non_self_persisted, 1);
        // "b"'s short seconds_possible (< min_visible_secs) marks it censored.
        assert!(r.censored);
        assert!(r.non_self_censored);
    }

    #[test]
    fn a_token_clearing_every_bar_is_not_censored() {
        const DAY: i64 = 86_400;
        let stats = vec![stat("a", 6, 4, 20 * DAY)];
        let result = aggregate(stats, &StatsConfig::default());
        assert_eq!(result[0].tokens_persisted, 1);
        assert!(!result[0].censored);
        assert!(!result[0].non_self_censored);
    }

    #[test]
    fn short_observation_censors() {
        let stats = vec![stat("a", 0, 0, 10)];
        let config = StatsConfig { min_visible_secs: 1_000_000, ..StatsConfig::default() };
        let result = aggregate(stats, &config);
        assert!(result[0].censored);
        assert!(result[0].non_self_censored);
    }

    #[test]
    fn exclude_regex_drops_matching_tokens() {
        let stats = vec![stat("123", 5, 5, 100), stat("word", 5, 5, 100)];
        let config = StatsConfig { exclude: Some(Regex::new(r"^\d+$").unwrap()), ..StatsConfig::default() };
        let result = aggregate(stats, &config);
        assert_eq!(result[0].tokens_added, 1);
    }
}
