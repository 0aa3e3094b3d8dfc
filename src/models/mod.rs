use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// One upcoming fixture scraped from the bookmaker
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Match {
    /// Derived from team names + kickoff time; stable across scrape runs
    /// (the bookmaker does not expose stable internal IDs)
    pub match_id: String,
    pub home_team: String,
    pub away_team: String,
    pub kickoff_time: DateTime<Utc>,
    pub league: Option<String>,
}

/// Decimal 1X2 odds for a match, plus whatever secondary markets were on the page
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OddsRecord {
    pub match_id: String,
    pub home_win: f64,
    pub draw: f64,
    pub away_win: f64,
    pub scraped_at: DateTime<Utc>,
    /// Secondary markets keyed by market name ("1X", "over", "btts_yes", ...).
    /// Never assumed complete; the site omits markets per fixture.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub market_extras: BTreeMap<String, f64>,
}

/// Win/draw/loss distribution; sums to 1.0 within float tolerance
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutcomeProbabilities {
    pub home_win: f64,
    pub draw: f64,
    pub away_win: f64,
}

/// Output of the scoring engine for one match
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PredictionResult {
    pub match_id: String,
    pub probabilities: OutcomeProbabilities,
    pub model_version: String,
}

/// One fixture with its odds, as stored in a snapshot
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SnapshotEntry {
    #[serde(rename = "match")]
    pub fixture: Match,
    pub odds: OddsRecord,
}

/// The unit of storage for the ingestion cache: one whole scrape run.
/// Every entry's `scraped_at` equals `captured_at` (atomic capture);
/// a snapshot is replaced wholesale, never patched.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Snapshot {
    pub captured_at: DateTime<Utc>,
    pub entries: Vec<SnapshotEntry>,
    /// Records dropped by the normalizer in the run that produced this snapshot
    pub rejected: usize,
}

impl Snapshot {
    /// Look up an entry by exact match_id, falling back to a case-insensitive
    /// substring of "Home vs Away" so clients can pass fixture names
    pub fn find_entry(&self, key: &str) -> Option<&SnapshotEntry> {
        if let Some(entry) = self.entries.iter().find(|e| e.fixture.match_id == key) {
            return Some(entry);
        }
        let needle = key.to_lowercase();
        self.entries.iter().find(|e| {
            let name = format!("{} vs {}", e.fixture.home_team, e.fixture.away_team);
            name.to_lowercase().contains(&needle)
        })
    }
}

/// Raw per-fixture strings pulled out of the page before any validation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawMatchRecord {
    pub home_team: String,
    pub away_team: String,
    pub home_win: String,
    pub draw: String,
    pub away_win: String,
    pub kickoff: String,
    #[serde(default)]
    pub extras: BTreeMap<String, String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn snapshot_with(home: &str, away: &str) -> Snapshot {
        let kickoff = Utc.with_ymd_and_hms(2025, 6, 22, 20, 0, 0).unwrap();
        let fixture = Match {
            match_id: "arsenal-chelsea-1750622400".to_string(),
            home_team: home.to_string(),
            away_team: away.to_string(),
            kickoff_time: kickoff,
            league: None,
        };
        let odds = OddsRecord {
            match_id: fixture.match_id.clone(),
            home_win: 2.1,
            draw: 3.4,
            away_win: 3.2,
            scraped_at: Utc::now(),
            market_extras: BTreeMap::new(),
        };
        Snapshot {
            captured_at: odds.scraped_at,
            entries: vec![SnapshotEntry { fixture, odds }],
            rejected: 0,
        }
    }

    #[test]
    fn find_entry_by_match_id() {
        let snapshot = snapshot_with("Arsenal", "Chelsea");
        assert!(snapshot.find_entry("arsenal-chelsea-1750622400").is_some());
        assert!(snapshot.find_entry("liverpool-everton-0").is_none());
    }

    #[test]
    fn find_entry_by_fixture_name_substring() {
        let snapshot = snapshot_with("Arsenal", "Chelsea");
        let entry = snapshot.find_entry("arsenal vs chel").unwrap();
        assert_eq!(entry.fixture.home_team, "Arsenal");
        // Case-insensitive
        assert!(snapshot.find_entry("CHELSEA").is_some());
    }
}
