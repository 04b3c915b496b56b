//! Average speed checks between sightings of one plate on one road.
//!
//! Everything here is synchronous and side-effect free apart from the
//! ticketed-day set handed in by the caller, so the registry can run a
//! check and record its outcome in one step.

use std::collections::BTreeSet;
use std::ops::RangeInclusive;

use super::protocol::Ticket;

pub const SECONDS_PER_DAY: u32 = 86_400;

/// Tolerance above the posted limit before a ticket is due.
const SPEED_TOLERANCE_MPH: f64 = 0.5;

/// Calendar day of a timestamp.
pub fn day(timestamp: u32) -> u32 {
    timestamp / SECONDS_PER_DAY
}

/// One camera observation of a plate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Sighting {
    pub plate: String,
    pub road: u16,
    pub mile: u16,
    pub limit: u16,
    pub timestamp: u32,
}

/// Average speed in mph between two sightings ordered by time.
///
/// `None` when both happened in the same second.
pub fn average_speed(first: &Sighting, second: &Sighting) -> Option<f64> {
    let elapsed = second.timestamp.checked_sub(first.timestamp)?;
    if elapsed == 0 {
        return None;
    }
    let distance = first.mile.abs_diff(second.mile);
    Some(f64::from(distance) * 3600.0 / f64::from(elapsed))
}

/// Mph to the wire's hundredths of mph.
fn to_hundredths(speed: f64) -> u16 {
    (speed * 100.0).round().min(f64::from(u16::MAX)) as u16
}

struct Candidate<'a> {
    first: &'a Sighting,
    second: &'a Sighting,
    counterpart: u32,
    speed: f64,
}

impl Candidate<'_> {
    fn days(&self) -> RangeInclusive<u32> {
        day(self.first.timestamp)..=day(self.second.timestamp)
    }

    /// Earlier spans first, then shorter spans, then earlier counterparts.
    fn rank(&self) -> (u32, u32, u32) {
        (
            day(self.first.timestamp),
            day(self.second.timestamp),
            self.counterpart,
        )
    }

    fn into_ticket(self) -> Ticket {
        Ticket {
            plate: self.first.plate.clone(),
            road: self.first.road,
            mile1: self.first.mile,
            timestamp1: self.first.timestamp,
            mile2: self.second.mile,
            timestamp2: self.second.timestamp,
            speed: to_hundredths(self.speed),
        }
    }
}

/// Check `newest` against every other sighting in `history` and issue at
/// most one ticket.
///
/// `history` holds all sightings of `newest.plate` on `newest.road` in
/// arrival order and may or may not already contain `newest`. `ticketed`
/// is the set of days the plate has already been ticketed for, on any road;
/// the days of an issued ticket are added to it before returning.
pub fn issue_ticket(
    history: &[Sighting],
    newest: &Sighting,
    ticketed: &mut BTreeSet<u32>,
) -> Option<Ticket> {
    let mut ordered: Vec<&Sighting> = history
        .iter()
        .filter(|s| s.plate == newest.plate && s.road == newest.road)
        .collect();
    ordered.sort_by_key(|s| s.timestamp);

    let best = ordered
        .into_iter()
        .filter_map(|other| {
            let (first, second) = if other.timestamp < newest.timestamp {
                (other, newest)
            } else {
                (newest, other)
            };
            let speed = average_speed(first, second)?;
            (speed > f64::from(newest.limit) + SPEED_TOLERANCE_MPH).then_some(Candidate {
                first,
                second,
                counterpart: other.timestamp,
                speed,
            })
        })
        .filter(|candidate| ticketed.range(candidate.days()).next().is_none())
        .min_by_key(Candidate::rank)?;

    ticketed.extend(best.days());
    Some(best.into_ticket())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sighting(plate: &str, road: u16, mile: u16, limit: u16, timestamp: u32) -> Sighting {
        Sighting {
            plate: plate.to_string(),
            road,
            mile,
            limit,
            timestamp,
        }
    }

    /// Feed sightings one at a time like the registry does.
    fn replay(sightings: &[Sighting], ticketed: &mut BTreeSet<u32>) -> Vec<Ticket> {
        let mut history = Vec::new();
        let mut tickets = Vec::new();
        for s in sightings {
            history.push(s.clone());
            tickets.extend(issue_ticket(&history, s, ticketed));
        }
        tickets
    }

    #[test]
    fn test_example_ticket() {
        let mut ticketed = BTreeSet::new();
        let tickets = replay(
            &[sighting("UN1X", 123, 8, 60, 0), sighting("UN1X", 123, 9, 60, 45)],
            &mut ticketed,
        );

        assert_eq!(
            tickets,
            vec![Ticket {
                plate: "UN1X".to_string(),
                road: 123,
                mile1: 8,
                timestamp1: 0,
                mile2: 9,
                timestamp2: 45,
                speed: 8000,
            }]
        );
        assert_eq!(ticketed, BTreeSet::from([0]));
    }

    #[test]
    fn test_order_independence() {
        let a = sighting("UN1X", 123, 8, 60, 0);
        let b = sighting("UN1X", 123, 9, 60, 45);

        let forward = replay(&[a.clone(), b.clone()], &mut BTreeSet::new());
        let backward = replay(&[b, a], &mut BTreeSet::new());

        assert_eq!(forward.len(), 1);
        assert_eq!(forward, backward);
    }

    #[test]
    fn test_at_or_just_over_limit_is_not_ticketed() {
        // 10 miles in 600s = 60mph, exactly the limit
        let exact = replay(
            &[sighting("ABC123", 1, 100, 60, 1000), sighting("ABC123", 1, 110, 60, 1600)],
            &mut BTreeSet::new(),
        );
        assert!(exact.is_empty());

        // 1 mile in 60s is 60mph, in 59s it is 61.02mph
        let under_tolerance = replay(
            &[sighting("ABC123", 1, 0, 60, 0), sighting("ABC123", 1, 1, 60, 60)],
            &mut BTreeSet::new(),
        );
        assert!(under_tolerance.is_empty());

        let over = replay(
            &[sighting("ABC123", 1, 0, 60, 0), sighting("ABC123", 1, 1, 60, 59)],
            &mut BTreeSet::new(),
        );
        assert_eq!(over.len(), 1);
        assert_eq!(over[0].speed, 6102);
    }

    #[test]
    fn test_same_second_is_skipped() {
        let tickets = replay(
            &[sighting("ABC123", 1, 0, 60, 500), sighting("ABC123", 1, 50, 60, 500)],
            &mut BTreeSet::new(),
        );
        assert!(tickets.is_empty());
    }

    #[test]
    fn test_other_roads_and_plates_are_ignored() {
        let history = vec![
            sighting("ABC123", 2, 0, 60, 0),
            sighting("XYZ789", 1, 0, 60, 0),
        ];
        let newest = sighting("ABC123", 1, 50, 60, 60);
        assert_eq!(issue_ticket(&history, &newest, &mut BTreeSet::new()), None);
    }

    #[test]
    fn test_one_ticket_per_day_across_roads() {
        let mut ticketed = BTreeSet::new();

        let first = replay(
            &[sighting("FAST1", 1, 0, 60, 100), sighting("FAST1", 1, 10, 60, 200)],
            &mut ticketed,
        );
        assert_eq!(first.len(), 1);

        // Different road, same day
        let second = replay(
            &[sighting("FAST1", 2, 0, 60, 1000), sighting("FAST1", 2, 10, 60, 1100)],
            &mut ticketed,
        );
        assert!(second.is_empty());

        // Same road, next day
        let third = replay(
            &[
                sighting("FAST1", 1, 0, 60, SECONDS_PER_DAY + 100),
                sighting("FAST1", 1, 10, 60, SECONDS_PER_DAY + 200),
            ],
            &mut ticketed,
        );
        assert_eq!(third.len(), 1);
        assert_eq!(ticketed, BTreeSet::from([0, 1]));
    }

    #[test]
    fn test_span_over_ticketed_day_is_suppressed() {
        let mut ticketed = BTreeSet::from([1]);
        let tickets = replay(
            &[
                sighting("NIGHT", 5, 0, 60, SECONDS_PER_DAY - 60),
                sighting("NIGHT", 5, 10, 60, SECONDS_PER_DAY + 60),
            ],
            &mut ticketed,
        );
        assert!(tickets.is_empty());
        assert_eq!(ticketed, BTreeSet::from([1]));
    }

    #[test]
    fn test_multi_day_span_records_every_day() {
        let mut ticketed = BTreeSet::new();
        // 3000 miles in a bit over two days is still > 60mph
        let tickets = replay(
            &[
                sighting("LONG", 7, 0, 50, 10),
                sighting("LONG", 7, 3000, 50, 2 * SECONDS_PER_DAY + 10),
            ],
            &mut ticketed,
        );
        assert_eq!(tickets.len(), 1);
        assert_eq!(ticketed, BTreeSet::from([0, 1, 2]));
    }

    #[test]
    fn test_prefers_earliest_unticketed_span() {
        let mut ticketed = BTreeSet::new();
        let mut history = vec![
            sighting("MULTI", 9, 6000, 60, 2 * SECONDS_PER_DAY),
            sighting("MULTI", 9, 0, 60, 10),
            sighting("MULTI", 9, 2990, 60, SECONDS_PER_DAY + 10),
        ];
        // Speeding against all three, the pair reaching back to day 0 wins
        let newest = sighting("MULTI", 9, 3000, 60, SECONDS_PER_DAY + 500);
        history.push(newest.clone());

        let ticket = issue_ticket(&history, &newest, &mut ticketed).unwrap();
        assert_eq!((ticket.mile1, ticket.timestamp1), (0, 10));
        assert_eq!((ticket.mile2, ticket.timestamp2), (3000, SECONDS_PER_DAY + 500));
        assert_eq!(ticketed, BTreeSet::from([0, 1]));

        // Every remaining pair touches day 1 now
        assert_eq!(issue_ticket(&history, &newest, &mut ticketed), None);
    }

    #[test]
    fn test_speed_saturates() {
        let tickets = replay(
            &[sighting("ROCKET", 1, 0, 60, 0), sighting("ROCKET", 1, 60000, 60, 1)],
            &mut BTreeSet::new(),
        );
        assert_eq!(tickets[0].speed, u16::MAX);
    }
}
