//! Bid validator: hard gate between client requests and the matcher.
//!
//! Every [`BidRequest`] passes through [`BidValidator::validate`] before it
//! can touch a lease or the store. A rejected bid has no side effects.
//!
//! ## Checks
//!
//! - Names present, free of the key delimiter, away and home distinct
//! - Stake inside `[min_amount, max_amount]`
//! - Chosen competitor is one of the two event competitors
//! - Optionally, the event has not started yet

use std::sync::Arc;

use chrono::{DateTime, Utc};
use spreadbook_types::constants::KEY_DELIMITER;
use spreadbook_types::{
    Amount, Bid, BidRequest, BiddingConfig, Clock, DivisionId, EventKey, EventTerms, Kind, Result,
    SpreadbookError, UserId,
};

pub struct BidValidator {
    min_amount: Amount,
    max_amount: Amount,
    max_bids_per_submission: usize,
    reject_started_events: bool,
    clock: Arc<dyn Clock>,
}

impl BidValidator {
    #[must_use]
    pub fn new(config: &BiddingConfig, clock: Arc<dyn Clock>) -> Self {
        Self {
            min_amount: config.min_amount,
            max_amount: config.max_amount,
            max_bids_per_submission: config.max_bids_per_submission,
            reject_started_events: config.reject_started_events,
            clock,
        }
    }

    /// Reject submissions carrying more bids than allowed.
    pub fn check_submission(&self, count: usize) -> Result<()> {
        if count > self.max_bids_per_submission {
            return Err(SpreadbookError::SubmissionTooLarge {
                count,
                max: self.max_bids_per_submission,
            });
        }
        Ok(())
    }

    /// Turn a request into a [`Bid`] submitted by `user` at `created_at`.
    ///
    /// # Errors
    /// The first failing check, as a validation error.
    pub fn validate(
        &self,
        user: &UserId,
        request: &BidRequest,
        created_at: DateTime<Utc>,
    ) -> Result<Bid> {
        // 1. Identity and names
        check_name("user", user.as_str())?;
        check_name("div", &request.div)?;
        check_name("kind", &request.kind)?;
        check_name("awayTeam", &request.away_team)?;
        check_name("homeTeam", &request.home_team)?;
        if request.away_team == request.home_team {
            return Err(invalid("awayTeam and homeTeam must differ"));
        }

        // 2. Stake window
        let amount = Amount::try_from(request.amount)
            .ok()
            .filter(|a| (self.min_amount..=self.max_amount).contains(a))
            .ok_or(SpreadbookError::AmountOutOfRange {
                amount: request.amount,
                min: self.min_amount,
                max: self.max_amount,
            })?;

        let event = EventKey::new(
            DivisionId::new(&request.div),
            Kind::new(&request.kind),
            request.date,
            &request.away_team,
            &request.home_team,
        );

        // 3. Chosen side
        let chosen = event.side_of(&request.chosen_competitor).ok_or_else(|| {
            SpreadbookError::UnknownCompetitor {
                competitor: request.chosen_competitor.clone(),
                event: event.to_string(),
            }
        })?;

        // 4. Market still open
        if self.reject_started_events && event.has_started(self.clock.now()) {
            return Err(SpreadbookError::MarketClosed {
                event: event.to_string(),
            });
        }

        Ok(Bid {
            event,
            terms: EventTerms {
                spread: request.spread.trim().to_string(),
                week: request.week,
                away_abbreviation: request.away_abbreviation.clone(),
                home_abbreviation: request.home_abbreviation.clone(),
            },
            chosen,
            amount,
            user: user.clone(),
            created_at,
        })
    }
}

fn invalid(reason: &str) -> SpreadbookError {
    SpreadbookError::InvalidBid {
        reason: reason.to_string(),
    }
}

fn check_name(field: &str, value: &str) -> Result<()> {
    if value.trim().is_empty() {
        return Err(invalid(&format!("{field} must not be empty")));
    }
    if value.contains(KEY_DELIMITER) {
        return Err(invalid(&format!(
            "{field} must not contain '{KEY_DELIMITER}'"
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use spreadbook_types::{ManualClock, Side};

    use super::*;

    fn validator(reject_started: bool) -> BidValidator {
        let clock = ManualClock::at(DateTime::<Utc>::from_timestamp(1_600_000_000, 0).unwrap());
        let config = BiddingConfig {
            reject_started_events: reject_started,
            ..BiddingConfig::default()
        };
        BidValidator::new(&config, Arc::new(clock))
    }

    fn now() -> DateTime<Utc> {
        DateTime::<Utc>::from_timestamp(1_600_000_000, 0).unwrap()
    }

    #[test]
    fn valid_request_becomes_bid() {
        let v = validator(true);
        let bid = v
            .validate(&UserId::new("sam"), &BidRequest::dummy("Home Team", 25), now())
            .unwrap();
        assert_eq!(bid.chosen, Side::Home);
        assert_eq!(bid.amount, 25);
        assert_eq!(bid.event, EventKey::dummy());
        assert_eq!(bid.terms.spread, "AWY -3.0");
        assert_eq!(bid.created_at, now());
    }

    #[test]
    fn amount_window_is_inclusive() {
        let v = validator(true);
        let user = UserId::new("sam");
        assert!(v.validate(&user, &BidRequest::dummy("Away Team", 1), now()).is_ok());
        assert!(v.validate(&user, &BidRequest::dummy("Away Team", 100), now()).is_ok());
        for amount in [0, -5, 101] {
            let err = v
                .validate(&user, &BidRequest::dummy("Away Team", amount), now())
                .unwrap_err();
            assert!(
                matches!(err, SpreadbookError::AmountOutOfRange { amount: a, .. } if a == amount),
                "{err}"
            );
        }
    }

    #[test]
    fn unknown_competitor_rejected() {
        let v = validator(true);
        let err = v
            .validate(&UserId::new("sam"), &BidRequest::dummy("Green Bay", 10), now())
            .unwrap_err();
        assert!(matches!(err, SpreadbookError::UnknownCompetitor { .. }));
    }

    #[test]
    fn names_are_checked() {
        let v = validator(true);
        let mut req = BidRequest::dummy("Away Team", 10);
        req.div = " ".into();
        assert!(matches!(
            v.validate(&UserId::new("sam"), &req, now()).unwrap_err(),
            SpreadbookError::InvalidBid { .. }
        ));

        let mut req = BidRequest::dummy("Away Team", 10);
        req.home_team = "Away Team".into();
        assert!(v.validate(&UserId::new("sam"), &req, now()).is_err());

        let err = v
            .validate(&UserId::new("a|b"), &BidRequest::dummy("Away Team", 10), now())
            .unwrap_err();
        assert!(err.is_validation());
    }

    #[test]
    fn started_event_is_closed() {
        let mut req = BidRequest::dummy("Away Team", 10);
        req.date = now() - chrono::Duration::minutes(1);
        let err = validator(true)
            .validate(&UserId::new("sam"), &req, now())
            .unwrap_err();
        assert!(matches!(err, SpreadbookError::MarketClosed { .. }));
        assert!(validator(false).validate(&UserId::new("sam"), &req, now()).is_ok());
    }

    #[test]
    fn submission_size_limit() {
        let v = validator(true);
        assert!(v.check_submission(50).is_ok());
        assert!(matches!(
            v.check_submission(51).unwrap_err(),
            SpreadbookError::SubmissionTooLarge { count: 51, max: 50 }
        ));
    }
}
