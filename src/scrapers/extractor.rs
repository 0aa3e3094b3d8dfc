use crate::error::ExtractError;
use crate::models::RawMatchRecord;
use once_cell::sync::Lazy;
use regex::Regex;
use scraper::{Html, Selector};
use std::collections::BTreeMap;

/// Kickoff text as the site prints it, e.g. "22/06/25 - 20:00"
static KICKOFF_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\d{2}/\d{2}/\d{2} - \d{2}:\d{2}$").unwrap());

/// Secondary markets keyed by the site's data-qa suffix
const EXTRA_MARKETS: &[(&str, &str)] = &[
    ("1X", "prematch-event-selections-1x"),
    ("X2", "prematch-event-selections-x2"),
    ("12", "prematch-event-selections-12"),
    ("over", "prematch-event-selections-over"),
    ("under", "prematch-event-selections-under"),
    ("btts_yes", "prematch-event-selections-yes"),
    ("btts_no", "prematch-event-selections-no"),
];

/// Every selector the extractor depends on, behind one version tag.
/// When the site's markup drifts, a new version goes here and nowhere else.
pub struct SelectorSet {
    pub version: &'static str,
    team: Selector,
    kickoff: Selector,
    headline_odds: Selector,
    idle_marker: Selector,
    extras: Vec<(&'static str, Selector)>,
}

impl SelectorSet {
    /// The selector set currently matching the live site
    pub fn current() -> Self {
        Self::for_version(CURRENT_VERSION).unwrap()
    }

    pub fn for_version(version: &str) -> Option<Self> {
        match version {
            CURRENT_VERSION => Some(Self {
                version: CURRENT_VERSION,
                // Structural roles, not the angular class soup around them
                team: sel("div.event-team"),
                kickoff: sel("span"),
                headline_odds: sel("div.event-selection > div"),
                idle_marker: sel("div.no-events, div.empty-events"),
                extras: EXTRA_MARKETS
                    .iter()
                    .map(|(name, qa)| (*name, sel(&format!("div[data-qa=\"{qa}\"] > div"))))
                    .collect(),
            }),
            _ => None,
        }
    }
}

const CURRENT_VERSION: &str = "sportpesa-v1";

fn sel(css: &str) -> Selector {
    // All inputs are compile-time selector literals
    Selector::parse(css).expect("static selector")
}

/// Mechanically pulls raw fixture records out of rendered markup.
/// No validation happens here; the normalizer owns semantics.
pub struct OddsExtractor {
    selectors: SelectorSet,
}

impl OddsExtractor {
    pub fn new() -> Self {
        Self {
            selectors: SelectorSet::current(),
        }
    }

    pub fn with_selectors(selectors: SelectorSet) -> Self {
        Self { selectors }
    }

    pub fn extract(&self, html: &str) -> Result<Vec<RawMatchRecord>, ExtractError> {
        let document = Html::parse_document(html);

        let teams: Vec<String> = document
            .select(&self.selectors.team)
            .map(element_text)
            .filter(|t| !t.is_empty())
            .collect();

        if teams.len() < 2 {
            // Distinguish "site is genuinely idle" from markup drift before
            // declaring the selectors broken
            if document.select(&self.selectors.idle_marker).next().is_some() {
                return Ok(Vec::new());
            }
            return Err(ExtractError::StructureChanged {
                selector_version: self.selectors.version,
            });
        }

        let kickoffs: Vec<String> = document
            .select(&self.selectors.kickoff)
            .map(element_text)
            .filter(|t| KICKOFF_RE.is_match(t))
            .collect();

        // The 1X2 triple renders as three numeric cells per fixture
        let headline: Vec<String> = document
            .select(&self.selectors.headline_odds)
            .map(element_text)
            .filter(|t| is_decimal_text(t))
            .collect();
        let odds_groups: Vec<&[String]> = headline.chunks(3).filter(|c| c.len() == 3).collect();

        let extras: Vec<(&str, Vec<String>)> = self
            .selectors
            .extras
            .iter()
            .map(|(name, selector)| {
                let values = document.select(selector).map(element_text).collect();
                (*name, values)
            })
            .collect();

        let team_pairs = teams.len() / 2;
        let count = team_pairs.min(odds_groups.len()).min(kickoffs.len());
        if count == 0 {
            // Fixture blocks exist but nothing complete could be assembled
            return Err(ExtractError::NoMatchesFound);
        }

        let mut records = Vec::with_capacity(count);
        for i in 0..count {
            let mut record_extras = BTreeMap::new();
            for (name, values) in &extras {
                if let Some(value) = values.get(i) {
                    record_extras.insert(name.to_string(), value.clone());
                }
            }

            records.push(RawMatchRecord {
                home_team: teams[i * 2].clone(),
                away_team: teams[i * 2 + 1].clone(),
                home_win: odds_groups[i][0].clone(),
                draw: odds_groups[i][1].clone(),
                away_win: odds_groups[i][2].clone(),
                kickoff: kickoffs[i].clone(),
                extras: record_extras,
            });
        }

        Ok(records)
    }
}

impl Default for OddsExtractor {
    fn default() -> Self {
        Self::new()
    }
}

fn element_text(element: scraper::ElementRef) -> String {
    element.text().collect::<String>().trim().to_string()
}

/// "2.10" and "2,10" count as odds text; team names and labels do not
fn is_decimal_text(text: &str) -> bool {
    !text.is_empty()
        && text
            .chars()
            .all(|c| c.is_ascii_digit() || c == '.' || c == ',')
        && text.chars().any(|c| c.is_ascii_digit())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fixture_page() -> String {
        r#"
        <html><body>
          <div class="event">
            <div class="event-team ng-binding">Arsenal</div>
            <div class="event-team ng-binding">Chelsea</div>
            <span class="ng-binding">22/06/25 - 20:00</span>
            <div class="event-selection">
              <div class="ng-binding">2.10</div>
              <div class="ng-binding">3.40</div>
              <div class="ng-binding">3.20</div>
            </div>
            <div data-qa="prematch-event-selections-over"><div>1.85</div></div>
            <div data-qa="prematch-event-selections-under"><div>1.95</div></div>
          </div>
          <div class="event">
            <div class="event-team ng-binding">Barcelona</div>
            <div class="event-team ng-binding">Real Madrid</div>
            <span class="ng-binding">24/06/25 - 21:00</span>
            <div class="event-selection">
              <div class="ng-binding">2.30</div>
              <div class="ng-binding">3.50</div>
              <div class="ng-binding">2.90</div>
            </div>
            <div data-qa="prematch-event-selections-over"><div>1.80</div></div>
            <div data-qa="prematch-event-selections-under"><div>2.00</div></div>
          </div>
        </body></html>
        "#
        .to_string()
    }

    #[test]
    fn extracts_fixture_records() {
        let records = OddsExtractor::new().extract(&fixture_page()).unwrap();
        assert_eq!(records.len(), 2);

        assert_eq!(records[0].home_team, "Arsenal");
        assert_eq!(records[0].away_team, "Chelsea");
        assert_eq!(records[0].home_win, "2.10");
        assert_eq!(records[0].draw, "3.40");
        assert_eq!(records[0].away_win, "3.20");
        assert_eq!(records[0].kickoff, "22/06/25 - 20:00");
        assert_eq!(records[0].extras.get("over").unwrap(), "1.85");

        assert_eq!(records[1].home_team, "Barcelona");
        assert_eq!(records[1].extras.get("under").unwrap(), "2.00");
    }

    #[test]
    fn drifted_markup_is_reported_not_empty() {
        let html = "<html><body><div class=\"totally-new-layout\">stuff</div></body></html>";
        let err = OddsExtractor::new().extract(html).unwrap_err();
        assert!(matches!(
            err,
            ExtractError::StructureChanged {
                selector_version: "sportpesa-v1"
            }
        ));
    }

    #[test]
    fn idle_marker_yields_empty_success() {
        let html = "<html><body><div class=\"no-events\">No events available</div></body></html>";
        let records = OddsExtractor::new().extract(html).unwrap();
        assert!(records.is_empty());
    }

    #[test]
    fn fixture_blocks_without_odds_is_no_matches() {
        let html = r#"
        <html><body>
          <div class="event-team">Arsenal</div>
          <div class="event-team">Chelsea</div>
        </body></html>
        "#;
        let err = OddsExtractor::new().extract(html).unwrap_err();
        assert!(matches!(err, ExtractError::NoMatchesFound));
    }

    #[test]
    fn unknown_selector_version_is_rejected() {
        assert!(SelectorSet::for_version("sportpesa-v0").is_none());
        assert!(SelectorSet::for_version("sportpesa-v1").is_some());
    }

    #[test]
    fn decimal_text_filter() {
        assert!(is_decimal_text("2.10"));
        assert!(is_decimal_text("2,10"));
        assert!(!is_decimal_text("Arsenal"));
        assert!(!is_decimal_text(""));
        assert!(!is_decimal_text("..."));
    }
}
