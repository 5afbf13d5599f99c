//! Point-spread quotes.
//!
//! A quote has the form `<competitor-abbreviation> <signed points>`, e.g.
//! `"KC -3.5"`. The points are added to the named competitor's raw score
//! before the scores are compared.

use std::str::FromStr;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::Side;

/// A parsed spread quote.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Spread {
    pub abbreviation: String,
    pub points: Decimal,
}

impl Spread {
    /// Parse a quote. Returns `None` for anything that is not exactly two
    /// whitespace-separated tokens with a numeric second token (`""`,
    /// `"EVEN"`, `"KC"`, `"KC abc"`).
    #[must_use]
    pub fn parse(quote: &str) -> Option<Self> {
        let mut tokens = quote.split_whitespace();
        let abbreviation = tokens.next()?;
        let points = tokens.next()?;
        if tokens.next().is_some() {
            return None;
        }
        let points = Decimal::from_str(points.strip_prefix('+').unwrap_or(points)).ok()?;
        Some(Self {
            abbreviation: abbreviation.to_string(),
            points,
        })
    }

    /// Which side the quote names, given the event's abbreviations.
    #[must_use]
    pub fn side(&self, away_abbreviation: &str, home_abbreviation: &str) -> Option<Side> {
        if self.abbreviation == away_abbreviation {
            Some(Side::Away)
        } else if self.abbreviation == home_abbreviation {
            Some(Side::Home)
        } else {
            None
        }
    }

    /// Apply the quote to raw `(away, home)` scores. A quote naming neither
    /// competitor leaves the scores untouched.
    #[must_use]
    pub fn adjust(
        &self,
        away_abbreviation: &str,
        home_abbreviation: &str,
        away_score: Decimal,
        home_score: Decimal,
    ) -> (Decimal, Decimal) {
        match self.side(away_abbreviation, home_abbreviation) {
            Some(Side::Away) => (away_score + self.points, home_score),
            Some(Side::Home) => (away_score, home_score + self.points),
            None => (away_score, home_score),
        }
    }
}

impl std::fmt::Display for Spread {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} {}", self.abbreviation, self.points)
    }
}
