use std::collections::HashMap;

use itertools::Itertools;

use crate::data::{CohortSettings, Period, PeriodId};
use crate::error::SolverError;

/// The cohort's periods in their fixed processing order (numeric suffix, then
/// name), with the sentinel period removed.
#[derive(Debug, Clone)]
pub struct PeriodCalendar {
    periods: Vec<Period>,
    ids: Vec<PeriodId>,
    positions: HashMap<PeriodId, usize>,
    mandatory: Vec<PeriodId>,
}

impl PeriodCalendar {
    pub fn new(periods: &[Period], settings: &CohortSettings) -> Result<Self, SolverError> {
        let mut ordered: Vec<Period> = periods
            .iter()
            .cloned()
            .sorted_by(|a, b| {
                let key = |p: &Period| (p.number().unwrap_or(u32::MAX), p.name.clone(), p.id);
                key(a).cmp(&key(b))
            })
            .collect();

        if let Some(duplicate) = ordered.iter().map(|p| p.id).duplicates().next() {
            return Err(SolverError::InvalidInput(format!("period {duplicate} listed twice")));
        }

        match &settings.sentinel_period {
            Some(name) => ordered.retain(|p| p.name.trim() != name.as_str()),
            None => {
                ordered.pop();
            }
        }

        if ordered.is_empty() {
            return Err(SolverError::InvalidInput("cohort has no periods to assign".to_string()));
        }

        let ids: Vec<PeriodId> = ordered.iter().map(|p| p.id).collect();
        let positions = ids.iter().enumerate().map(|(pos, id)| (*id, pos)).collect();
        let mandatory = ordered
            .iter()
            .filter(|p| settings.mandatory_excluded_period.as_deref() != Some(p.name.trim()))
            .map(|p| p.id)
            .collect();

        Ok(Self {
            periods: ordered,
            ids,
            positions,
            mandatory,
        })
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    pub fn contains(&self, period: PeriodId) -> bool {
        self.positions.contains_key(&period)
    }

    pub fn position(&self, period: PeriodId) -> Option<usize> {
        self.positions.get(&period).copied()
    }

    pub fn period(&self, period: PeriodId) -> Option<&Period> {
        self.position(period).map(|pos| &self.periods[pos])
    }

    /// Every cohort period, in order.
    pub fn ids(&self) -> &[PeriodId] {
        &self.ids
    }

    /// Fallback search space for mandatory internships.
    pub fn mandatory_ids(&self) -> &[PeriodId] {
        &self.mandatory
    }

    /// Deduplicates `periods`, drops ids outside the cohort and puts the rest
    /// in calendar order.
    pub fn sort_ids(&self, periods: impl IntoIterator<Item = PeriodId>) -> Vec<PeriodId> {
        periods
            .into_iter()
            .filter_map(|id| self.position(id))
            .sorted()
            .dedup()
            .map(|pos| self.ids[pos])
            .collect()
    }

    /// Splits `periods` into runs that are adjacent in calendar order and cuts
    /// each run into aligned blocks of exactly `length` periods. Leftovers
    /// shorter than `length` are dropped.
    pub fn consecutive_blocks(&self, periods: &[PeriodId], length: usize) -> Vec<Vec<PeriodId>> {
        let length = length.max(1);
        let positions: Vec<usize> = self.sort_ids(periods.iter().copied())
            .iter()
            .filter_map(|id| self.position(*id))
            .collect();

        let runs = positions
            .iter()
            .enumerate()
            .chunk_by(|(index, pos)| **pos as isize - *index as isize);

        let mut blocks = Vec::new();
        for (_, run) in &runs {
            let run: Vec<PeriodId> = run.map(|(_, pos)| self.ids[*pos]).collect();
            blocks.extend(run.chunks_exact(length).map(<[PeriodId]>::to_vec));
        }
        blocks
    }
}
