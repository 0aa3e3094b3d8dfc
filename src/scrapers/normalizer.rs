use crate::models::{Match, OddsRecord, RawMatchRecord};
use chrono::{DateTime, Duration, NaiveDateTime, NaiveTime, TimeZone, Utc};
use std::collections::BTreeMap;

/// Kickoff format as printed on the site
const SITE_KICKOFF_FORMAT: &str = "%d/%m/%y - %H:%M";

/// Survivors of one normalization run plus the count of dropped records.
/// One malformed fixture never invalidates the rest of the batch.
#[derive(Debug)]
pub struct NormalizedBatch {
    pub pairs: Vec<(Match, OddsRecord)>,
    pub rejected: usize,
}

/// Converts raw extractor output into the canonical domain model. Records
/// with odds below 1.0 or unparseable kickoff text are dropped and counted;
/// `scraped_at` is stamped uniformly so the resulting snapshot is an atomic
/// capture.
pub fn normalize(records: Vec<RawMatchRecord>, now: DateTime<Utc>) -> NormalizedBatch {
    let mut pairs = Vec::with_capacity(records.len());
    let mut rejected = 0usize;

    for record in records {
        match normalize_record(&record, now) {
            Some(pair) => pairs.push(pair),
            None => rejected += 1,
        }
    }

    if rejected > 0 {
        tracing::warn!("dropped {} malformed fixture record(s)", rejected);
    }

    NormalizedBatch { pairs, rejected }
}

fn normalize_record(record: &RawMatchRecord, now: DateTime<Utc>) -> Option<(Match, OddsRecord)> {
    let home_team = normalize_team_name(&record.home_team);
    let away_team = normalize_team_name(&record.away_team);
    if home_team.is_empty() || away_team.is_empty() {
        return None;
    }

    let home_win = parse_decimal_odds(&record.home_win)?;
    let draw = parse_decimal_odds(&record.draw)?;
    let away_win = parse_decimal_odds(&record.away_win)?;
    // Decimal odds below 1.0 cannot exist on a real book; it means the
    // page text was mis-grouped, so the whole record is suspect
    if home_win < 1.0 || draw < 1.0 || away_win < 1.0 {
        return None;
    }

    let kickoff_time = parse_kickoff(&record.kickoff, now)?;
    let match_id = derive_match_id(&home_team, &away_team, kickoff_time);

    let mut market_extras = BTreeMap::new();
    for (market, raw_value) in &record.extras {
        // Extras are best-effort; a bad secondary market never drops the record
        if let Some(value) = parse_decimal_odds(raw_value) {
            if value >= 1.0 {
                market_extras.insert(market.clone(), value);
            }
        }
    }

    let fixture = Match {
        match_id: match_id.clone(),
        home_team,
        away_team,
        kickoff_time,
        league: None,
    };
    let odds = OddsRecord {
        match_id,
        home_win,
        draw,
        away_win,
        scraped_at: now,
        market_extras,
    };
    Some((fixture, odds))
}

/// Trim and collapse internal whitespace; the site pads names unevenly
pub fn normalize_team_name(name: &str) -> String {
    name.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Parse a decimal odds string, accepting both "2.10" and the comma
/// locale "2,10"
pub fn parse_decimal_odds(text: &str) -> Option<f64> {
    let cleaned = text.trim().replace(',', ".");
    cleaned.parse::<f64>().ok().filter(|v| v.is_finite())
}

/// Stable fixture identity across scrape runs: slugged team names plus the
/// kickoff unix timestamp
pub fn derive_match_id(home_team: &str, away_team: &str, kickoff: DateTime<Utc>) -> String {
    format!(
        "{}-{}-{}",
        slug(home_team),
        slug(away_team),
        kickoff.timestamp()
    )
}

fn slug(name: &str) -> String {
    name.to_lowercase()
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '-' })
        .collect::<String>()
        .split('-')
        .filter(|s| !s.is_empty())
        .collect::<Vec<_>>()
        .join("-")
}

/// Parse the site's absolute kickoff format, falling back to the relative
/// "Today HH:MM" / "Tomorrow HH:MM" forms resolved against `now`.
/// Anything else is a dropped record, never a guessed default.
pub fn parse_kickoff(text: &str, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
    let text = text.trim();

    if let Ok(naive) = NaiveDateTime::parse_from_str(text, SITE_KICKOFF_FORMAT) {
        return Some(Utc.from_utc_datetime(&naive));
    }

    let lower = text.to_lowercase();
    let (day_offset, rest) = if let Some(rest) = lower.strip_prefix("today") {
        (0i64, rest)
    } else if let Some(rest) = lower.strip_prefix("tomorrow") {
        (1i64, rest)
    } else {
        return None;
    };

    let time = NaiveTime::parse_from_str(rest.trim(), "%H:%M").ok()?;
    let date = now.date_naive() + Duration::days(day_offset);
    Some(Utc.from_utc_datetime(&date.and_time(time)))
}
