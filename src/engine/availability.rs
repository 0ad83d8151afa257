use chrono::{Datelike, NaiveDate};

use crate::model::*;

use super::conflict::validate_duration;
use super::{Engine, EngineError};

// ── Slot generation ──────────────────────────────────────────────

/// UTC midnight of `date` in ms plus its weekday index (0 = Sunday).
/// Tutor blocks are already UTC; no timezone conversion happens here.
pub(super) fn day_anchor(date: NaiveDate) -> (Ms, u8) {
    let midnight = date.and_time(chrono::NaiveTime::MIN).and_utc();
    (
        midnight.timestamp_millis(),
        date.weekday().num_days_from_sunday() as u8,
    )
}

/// Candidate start-times within `block` at `duration`-sized back-to-back
/// steps from the block's start. No candidate runs past the block's end, so
/// a trailing remainder shorter than `duration` is simply unreachable.
pub fn block_slots(block: Span, duration_ms: Ms) -> Vec<Ms> {
    debug_assert!(duration_ms > 0);
    let mut slots = Vec::new();
    let mut candidate = block.start;
    while candidate + duration_ms <= block.end {
        slots.push(candidate);
        candidate += duration_ms;
    }
    slots
}

/// Drop candidates whose `[candidate, candidate + duration)` window overlaps
/// any busy span (half-open overlap).
fn filter_busy(candidates: Vec<Ms>, busy: &[Span], duration_ms: Ms) -> Vec<Ms> {
    candidates
        .into_iter()
        .filter(|&start| {
            let window = Span::new(start, start + duration_ms);
            !busy.iter().any(|b| b.overlaps(&window))
        })
        .collect()
}

impl Engine {
    /// The Availability Resolver: bookable start-times for `tutor_id` on
    /// `date` (UTC calendar day), ascending, fully materialized. Read-only —
    /// results are re-validated by the Conflict Checker at booking time, so
    /// no tutor lock is taken here. A weekday with no blocks yields an empty
    /// list, not an error.
    pub async fn list_slots(
        &self,
        tutor_id: UserId,
        date: NaiveDate,
        duration_minutes: i64,
    ) -> Result<Vec<Ms>, EngineError> {
        let duration_ms = validate_duration(duration_minutes)?;
        let profile = self.require_tutor(tutor_id).await?;
        let (day_start, weekday) = day_anchor(date);

        let mut blocks: Vec<&AvailabilityBlock> = profile
            .blocks
            .iter()
            .filter(|b| b.day_of_week == weekday)
            .collect();
        if blocks.is_empty() {
            return Ok(Vec::new());
        }
        blocks.sort_by_key(|b| b.start_minute);

        let busy: Vec<Span> = self
            .active_bookings(tutor_id)
            .await
            .iter()
            .map(Booking::span)
            .collect();

        // Same-day blocks never overlap (profile invariant), so walking them
        // in start order yields globally sorted candidates.
        let mut slots = Vec::new();
        for block in blocks {
            let candidates = block_slots(block.span_on(day_start), duration_ms);
            slots.extend(filter_busy(candidates, &busy, duration_ms));
        }
        Ok(slots)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const H: Ms = 3_600_000;
    const M: Ms = 60_000;

    #[test]
    fn day_anchor_weekday() {
        // 2026-08-10 is a Monday.
        let (start, weekday) = day_anchor(NaiveDate::from_ymd_opt(2026, 8, 10).unwrap());
        assert_eq!(weekday, 1);
        assert_eq!(start % (24 * H), 0);

        let (_, sunday) = day_anchor(NaiveDate::from_ymd_opt(2026, 8, 9).unwrap());
        assert_eq!(sunday, 0);
    }

    #[test]
    fn block_slots_back_to_back() {
        // Two-hour block, hour-long sessions: exactly two slots.
        let slots = block_slots(Span::new(9 * H, 11 * H), H);
        assert_eq!(slots, vec![9 * H, 10 * H]);
    }

    #[test]
    fn block_slots_partial_remainder_unreachable() {
        // 90 minutes of block, 60-minute sessions: the trailing 30 minutes
        // can never be sold.
        let slots = block_slots(Span::new(9 * H, 9 * H + 90 * M), H);
        assert_eq!(slots, vec![9 * H]);
    }

    #[test]
    fn block_slots_exact_fit() {
        let slots = block_slots(Span::new(9 * H, 10 * H), H);
        assert_eq!(slots, vec![9 * H]);
    }

    #[test]
    fn block_slots_too_short() {
        let slots = block_slots(Span::new(9 * H, 9 * H + 30 * M), H);
        assert!(slots.is_empty());
    }

    #[test]
    fn filter_busy_drops_overlaps_only() {
        let candidates = vec![9 * H, 10 * H, 11 * H];
        let busy = vec![Span::new(10 * H + 30 * M, 11 * H)];
        // 10:00–11:00 overlaps the busy span; 11:00–12:00 is adjacent, kept.
        assert_eq!(filter_busy(candidates, &busy, H), vec![9 * H, 11 * H]);
    }
}
