use std::collections::{HashMap, HashSet};

use log::trace;

use crate::data::{OfferId, PeriodId, PeriodPlaces};
use crate::error::SolverError;

/// Remaining seats of one offer in one period.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlaceRecord {
    pub offer_id: OfferId,
    pub period_id: PeriodId,
    pub number_places: u32,
}

/// Mutable seat counts keyed by `(offer, period)`. Counts only ever go down
/// during a solve and never below zero.
#[derive(Debug, Clone, Default)]
pub struct PlaceTable {
    records: Vec<PlaceRecord>,
    index: HashMap<(OfferId, PeriodId), usize>,
}

impl PlaceTable {
    /// Builds the table from the snapshot. Duplicate `(offer, period)` rows are summed.
    pub fn new<'p>(places: impl IntoIterator<Item = &'p PeriodPlaces>) -> Self {
        let mut table = Self::default();
        for place in places {
            let key = (place.offer_id, place.period_id);
            match table.index.get(&key) {
                Some(&slot) => {
                    let record = &mut table.records[slot];
                    record.number_places = record.number_places.saturating_add(place.number_places);
                }
                None => {
                    table.index.insert(key, table.records.len());
                    table.records.push(PlaceRecord {
                        offer_id: place.offer_id,
                        period_id: place.period_id,
                        number_places: place.number_places,
                    });
                }
            }
        }
        table
    }

    pub fn contains(&self, offer: OfferId, period: PeriodId) -> bool {
        self.index.contains_key(&(offer, period))
    }

    pub fn remaining(&self, offer: OfferId, period: PeriodId) -> Option<u32> {
        self.index
            .get(&(offer, period))
            .map(|slot| self.records[*slot].number_places)
    }

    pub fn records(&self) -> &[PlaceRecord] {
        &self.records
    }

    pub fn total_remaining(&self) -> u64 {
        self.records.iter().map(|r| u64::from(r.number_places)).sum()
    }

    pub fn places_for_offers(&self, offer_ids: &[OfferId]) -> Vec<PlaceRecord> {
        let wanted: HashSet<OfferId> = offer_ids.iter().copied().collect();
        self.records
            .iter()
            .filter(|r| wanted.contains(&r.offer_id))
            .copied()
            .collect()
    }

    pub fn places_for_periods(period_ids: &[PeriodId], records: Vec<PlaceRecord>) -> Vec<PlaceRecord> {
        let wanted: HashSet<PeriodId> = period_ids.iter().copied().collect();
        records
            .into_iter()
            .filter(|r| wanted.contains(&r.period_id))
            .collect()
    }

    /// Drops exhausted records and sorts the rest by remaining seats,
    /// largest first. Ties go to the lowest offer id, then the lowest period id.
    pub fn sorted_by_capacity_desc(records: Vec<PlaceRecord>) -> Vec<PlaceRecord> {
        let mut open: Vec<PlaceRecord> = records.into_iter().filter(|r| r.number_places > 0).collect();
        open.sort_by(|a, b| {
            b.number_places
                .cmp(&a.number_places)
                .then(a.offer_id.cmp(&b.offer_id))
                .then(a.period_id.cmp(&b.period_id))
        });
        open
    }

    /// Takes one seat of `offer` in `period`.
    pub fn decrement(&mut self, offer: OfferId, period: PeriodId) -> Result<(), SolverError> {
        let slot = *self
            .index
            .get(&(offer, period))
            .ok_or(SolverError::MissingPlaceRecord { offer, period })?;
        let record = &mut self.records[slot];
        record.number_places = record
            .number_places
            .checked_sub(1)
            .ok_or(SolverError::CapacityUnderflow { offer, period })?;
        trace!(
            "Offer {} period {} now has {} places left.",
            offer, period, record.number_places
        );
        Ok(())
    }
}
