use std::collections::BTreeSet;

use rand::Rng;

use crate::calendar::PeriodCalendar;
use crate::data::PeriodId;

/// Finds free blocks of consecutive periods for a student.
pub struct AvailabilityResolver<'c> {
    calendar: &'c PeriodCalendar,
}

impl<'c> AvailabilityResolver<'c> {
    pub fn new(calendar: &'c PeriodCalendar) -> Self {
        Self { calendar }
    }

    /// All blocks of `length` consecutive periods taken from `candidates`
    /// that the student does not already occupy, in calendar order.
    pub fn free_blocks(
        &self,
        occupied: &BTreeSet<PeriodId>,
        length: u32,
        candidates: &[PeriodId],
    ) -> Vec<Vec<PeriodId>> {
        let free: Vec<PeriodId> = self
            .calendar
            .sort_ids(candidates.iter().copied())
            .into_iter()
            .filter(|period| !occupied.contains(period))
            .collect();
        self.calendar.consecutive_blocks(&free, length as usize)
    }

    /// One free block picked uniformly at random, or an empty vector when
    /// none qualifies.
    pub fn available_periods<R: Rng>(
        &self,
        occupied: &BTreeSet<PeriodId>,
        length: u32,
        candidates: &[PeriodId],
        rng: &mut R,
    ) -> Vec<PeriodId> {
        let mut blocks = self.free_blocks(occupied, length, candidates);
        if blocks.is_empty() {
            return Vec::new();
        }
        let pick = rng.random_range(0..blocks.len());
        blocks.swap_remove(pick)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::{CohortSettings, Period};
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    fn calendar(count: u32) -> PeriodCalendar {
        let periods: Vec<Period> = (1..=count)
            .map(|n| Period { id: n, name: format!("P{n}") })
            .collect();
        let settings = CohortSettings { sentinel_period: Some("P99".to_string()), ..CohortSettings::default() };
        PeriodCalendar::new(&periods, &settings).unwrap()
    }

    #[test]
    fn occupied_periods_break_runs() {
        let calendar = calendar(6);
        let resolver = AvailabilityResolver::new(&calendar);
        let occupied: BTreeSet<PeriodId> = [3].into_iter().collect();
        let blocks = resolver.free_blocks(&occupied, 2, calendar.ids());
        assert_eq!(blocks, vec![vec![1, 2], vec![4, 5]]);
    }

    #[test]
    fn empty_when_nothing_fits() {
        let calendar = calendar(4);
        let resolver = AvailabilityResolver::new(&calendar);
        let occupied: BTreeSet<PeriodId> = [2, 4].into_iter().collect();
        let mut rng = StdRng::seed_from_u64(1);
        assert!(resolver.available_periods(&occupied, 2, calendar.ids(), &mut rng).is_empty());
    }

    #[test]
    fn random_pick_is_one_of_the_blocks_and_reproducible() {
        let calendar = calendar(8);
        let resolver = AvailabilityResolver::new(&calendar);
        let occupied = BTreeSet::new();
        let blocks = resolver.free_blocks(&occupied, 2, calendar.ids());

        let first = resolver.available_periods(&occupied, 2, calendar.ids(), &mut StdRng::seed_from_u64(42));
        let again = resolver.available_periods(&occupied, 2, calendar.ids(), &mut StdRng::seed_from_u64(42));
        assert_eq!(first, again);
        assert!(blocks.contains(&first));
    }

    #[test]
    fn picks_spread_over_several_blocks() {
        let calendar = calendar(8);
        let resolver = AvailabilityResolver::new(&calendar);
        let occupied = BTreeSet::new();
        let mut rng = StdRng::seed_from_u64(7);
        let picked: BTreeSet<Vec<PeriodId>> = (0..64)
            .map(|_| resolver.available_periods(&occupied, 1, calendar.ids(), &mut rng))
            .collect();
        assert!(picked.len() > 1);
    }
}
