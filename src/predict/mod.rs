use crate::error::ScoringError;
use crate::models::{Match, OddsRecord, OutcomeProbabilities, PredictionResult};
use once_cell::sync::OnceCell;
use serde::Deserialize;
use std::collections::HashMap;

/// Version tag of the compiled-in strength table
const BUILTIN_MODEL_VERSION: &str = "strength-blend-v1";

/// Home advantage added to the home side's strength before normalizing
const HOME_ADVANTAGE: f64 = 0.1;

/// Blend weights between the strength model and odds-implied probabilities
const MODEL_WEIGHT: f64 = 0.7;
const ODDS_WEIGHT: f64 = 0.3;

/// Pretrained per-team strengths in [0, 1]. Teams outside the table score
/// with `DEFAULT_STRENGTH` as long as something else (a known opponent or
/// current odds) anchors the fixture.
const DEFAULT_STRENGTH: f64 = 0.5;

const BUILTIN_STRENGTHS: &[(&str, f64)] = &[
    // Premier League
    ("manchester united", 0.85),
    ("manchester city", 0.90),
    ("chelsea", 0.85),
    ("arsenal", 0.82),
    ("liverpool", 0.87),
    ("tottenham", 0.80),
    ("leicester", 0.75),
    ("wolves", 0.70),
    ("everton", 0.72),
    ("west ham", 0.71),
    // La Liga
    ("barcelona", 0.89),
    ("real madrid", 0.90),
    ("atletico madrid", 0.86),
    ("sevilla", 0.78),
    ("valencia", 0.75),
];

/// JSON shape of an external model artifact
#[derive(Debug, Deserialize)]
struct ModelArtifact {
    model_version: String,
    team_strengths: HashMap<String, f64>,
}

/// The backing model: a versioned team-strength table
#[derive(Debug, Clone)]
pub struct StrengthModel {
    version: String,
    strengths: HashMap<String, f64>,
}

impl StrengthModel {
    /// Compiled-in strengths; used when no MODEL_PATH is configured
    pub fn builtin() -> Self {
        Self {
            version: BUILTIN_MODEL_VERSION.to_string(),
            strengths: BUILTIN_STRENGTHS
                .iter()
                .map(|(team, s)| (team.to_string(), *s))
                .collect(),
        }
    }

    /// Load a JSON artifact from disk. Any read or parse failure is
    /// `ModelUnavailable`; callers can still serve odds without a model.
    pub fn from_file(path: &str) -> Result<Self, ScoringError> {
        let contents = std::fs::read_to_string(path)
            .map_err(|e| ScoringError::ModelUnavailable(format!("cannot read {path}: {e}")))?;
        let artifact: ModelArtifact = serde_json::from_str(&contents)
            .map_err(|e| ScoringError::ModelUnavailable(format!("invalid artifact {path}: {e}")))?;
        // Strengths outside [0, 1] would push scoring outside a valid
        // probability distribution; refuse the whole artifact
        for (team, strength) in &artifact.team_strengths {
            if !(0.0..=1.0).contains(strength) {
                return Err(ScoringError::ModelUnavailable(format!(
                    "invalid artifact {path}: strength {strength} for {team} outside [0, 1]"
                )));
            }
        }
        Ok(Self {
            version: artifact.model_version,
            strengths: artifact
                .team_strengths
                .into_iter()
                .map(|(team, s)| (team.to_lowercase(), s))
                .collect(),
        })
    }

    fn strength(&self, team: &str) -> Option<f64> {
        self.strengths.get(&team.trim().to_lowercase()).copied()
    }
}

/// Scores fixtures into win/draw/loss distributions. Stateless per call
/// once constructed; safe to share across request handlers.
pub struct ScoringEngine {
    model: StrengthModel,
}

static GLOBAL_ENGINE: OnceCell<ScoringEngine> = OnceCell::new();

impl ScoringEngine {
    pub fn new(model: StrengthModel) -> Self {
        Self { model }
    }

    /// One-time process-wide engine, loading the model on first use.
    /// The artifact path is only honored by the first caller.
    pub fn global(model_path: Option<&str>) -> Result<&'static ScoringEngine, ScoringError> {
        GLOBAL_ENGINE.get_or_try_init(|| {
            let model = match model_path {
                Some(path) => StrengthModel::from_file(path)?,
                None => StrengthModel::builtin(),
            };
            tracing::info!("loaded prediction model {}", model.version);
            Ok(Self::new(model))
        })
    }

    pub fn model_version(&self) -> &str {
        &self.model.version
    }

    /// Score one fixture. Odds are optional: without them the engine falls
    /// back to team-identity features alone, so predictions stay available
    /// when a fixture's odds were rejected during normalization.
    pub fn score(
        &self,
        fixture: &Match,
        odds: Option<&OddsRecord>,
    ) -> Result<PredictionResult, ScoringError> {
        let home_strength = self.model.strength(&fixture.home_team);
        let away_strength = self.model.strength(&fixture.away_team);

        if home_strength.is_none() && away_strength.is_none() && odds.is_none() {
            // Nothing anchors this fixture: no vocabulary hit, no market
            return Err(ScoringError::UnknownTeams {
                home: fixture.home_team.clone(),
                away: fixture.away_team.clone(),
            });
        }

        let mut base_home = home_strength.unwrap_or(DEFAULT_STRENGTH) + HOME_ADVANTAGE;
        let mut base_away = away_strength.unwrap_or(DEFAULT_STRENGTH);

        // Strengths plus the home bump can exceed 1; rescale preserving ratio
        let max = base_home.max(base_away);
        if max > 1.0 {
            base_home /= max;
            base_away /= max;
        }

        // Draws are likeliest between evenly matched sides
        let draw_factor = 1.0 - (base_home - base_away).abs();
        let base_draw = draw_factor * 0.5;

        let (home, draw, away) = match odds.and_then(implied_probabilities) {
            Some((odds_home, odds_draw, odds_away)) => (
                MODEL_WEIGHT * base_home + ODDS_WEIGHT * odds_home,
                MODEL_WEIGHT * base_draw + ODDS_WEIGHT * odds_draw,
                MODEL_WEIGHT * base_away + ODDS_WEIGHT * odds_away,
            ),
            None => (base_home, base_draw, base_away),
        };

        let total = home + draw + away;
        Ok(PredictionResult {
            match_id: fixture.match_id.clone(),
            probabilities: OutcomeProbabilities {
                home_win: home / total,
                draw: draw / total,
                away_win: away / total,
            },
            model_version: self.model.version.clone(),
        })
    }
}

/// Normalized implied probabilities from decimal odds; strips the
/// bookmaker's overround
fn implied_probabilities(odds: &OddsRecord) -> Option<(f64, f64, f64)> {
    if odds.home_win < 1.0 || odds.draw < 1.0 || odds.away_win < 1.0 {
        return None;
    }
    let home = 1.0 / odds.home_win;
    let draw = 1.0 / odds.draw;
    let away = 1.0 / odds.away_win;
    let total = home + draw + away;
    Some((home / total, draw / total, away / total))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use std::collections::BTreeMap;

    fn fixture(home: &str, away: &str) -> Match {
        Match {
            match_id: format!("{}-{}-0", home.to_lowercase(), away.to_lowercase()),
            home_team: home.to_string(),
            away_team: away.to_string(),
            kickoff_time: Utc.with_ymd_and_hms(2025, 6, 22, 20, 0, 0).unwrap(),
            league: None,
        }
    }

    fn odds(home: f64, draw: f64, away: f64) -> OddsRecord {
        OddsRecord {
            match_id: "x".to_string(),
            home_win: home,
            draw,
            away_win: away,
            scraped_at: Utc::now(),
            market_extras: BTreeMap::new(),
        }
    }

    fn assert_distribution(result: &PredictionResult) {
        let p = &result.probabilities;
        assert!((p.home_win + p.draw + p.away_win - 1.0).abs() < 1e-6);
        assert!(p.home_win > 0.0 && p.draw > 0.0 && p.away_win > 0.0);
    }

    #[test]
    fn probabilities_sum_to_one() {
        let engine = ScoringEngine::new(StrengthModel::builtin());
        let result = engine
            .score(&fixture("Arsenal", "Chelsea"), Some(&odds(2.1, 3.4, 3.2)))
            .unwrap();
        assert_distribution(&result);
        assert_eq!(result.model_version, "strength-blend-v1");
    }

    #[test]
    fn identity_only_fallback_without_odds() {
        let engine = ScoringEngine::new(StrengthModel::builtin());
        let result = engine.score(&fixture("Arsenal", "Chelsea"), None).unwrap();
        assert_distribution(&result);
    }

    #[test]
    fn unknown_teams_without_odds_fail() {
        let engine = ScoringEngine::new(StrengthModel::builtin());
        let err = engine
            .score(&fixture("Gor Mahia", "AFC Leopards"), None)
            .unwrap_err();
        assert!(matches!(err, ScoringError::UnknownTeams { .. }));
    }

    #[test]
    fn unknown_teams_with_odds_score_from_the_market() {
        let engine = ScoringEngine::new(StrengthModel::builtin());
        let result = engine
            .score(
                &fixture("Gor Mahia", "AFC Leopards"),
                Some(&odds(1.5, 4.0, 6.0)),
            )
            .unwrap();
        assert_distribution(&result);
        // The market heavily favors the home side; the blend should too
        assert!(result.probabilities.home_win > result.probabilities.away_win);
    }

    #[test]
    fn stronger_team_is_favored() {
        let engine = ScoringEngine::new(StrengthModel::builtin());
        let result = engine
            .score(&fixture("Manchester City", "Leicester"), None)
            .unwrap();
        assert!(result.probabilities.home_win > result.probabilities.away_win);
    }

    #[test]
    fn scoring_is_deterministic() {
        let engine = ScoringEngine::new(StrengthModel::builtin());
        let m = fixture("Arsenal", "Chelsea");
        let o = odds(2.1, 3.4, 3.2);
        let first = engine.score(&m, Some(&o)).unwrap();
        let second = engine.score(&m, Some(&o)).unwrap();
        assert_eq!(first.probabilities.home_win, second.probabilities.home_win);
        assert_eq!(first.probabilities.draw, second.probabilities.draw);
    }

    #[test]
    fn missing_artifact_is_model_unavailable() {
        let err = StrengthModel::from_file("/nonexistent/model.json").unwrap_err();
        assert!(matches!(err, ScoringError::ModelUnavailable(_)));
    }

    #[test]
    fn out_of_range_strengths_are_model_unavailable() {
        let dir = std::env::temp_dir().join("easybets-bad-model-test");
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("model.json");
        // A negative strength would leak a negative probability out of score()
        std::fs::write(
            &path,
            r#"{"model_version":"broken-v1","team_strengths":{"foo fc":-3.0}}"#,
        )
        .unwrap();

        let err = StrengthModel::from_file(path.to_str().unwrap()).unwrap_err();
        assert!(matches!(err, ScoringError::ModelUnavailable(_)));

        std::fs::write(
            &path,
            r#"{"model_version":"broken-v2","team_strengths":{"foo fc":1.5}}"#,
        )
        .unwrap();
        let err = StrengthModel::from_file(path.to_str().unwrap()).unwrap_err();
        assert!(matches!(err, ScoringError::ModelUnavailable(_)));
    }

    #[test]
    fn artifact_version_is_reported() {
        let dir = std::env::temp_dir().join("easybets-model-test");
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("model.json");
        std::fs::write(
            &path,
            r#"{"model_version":"club-ratings-v2","team_strengths":{"Arsenal":0.8,"Chelsea":0.81}}"#,
        )
        .unwrap();

        let model = StrengthModel::from_file(path.to_str().unwrap()).unwrap();
        let engine = ScoringEngine::new(model);
        let result = engine.score(&fixture("Arsenal", "Chelsea"), None).unwrap();
        assert_eq!(result.model_version, "club-ratings-v2");
    }
}
