use crate::availability::AvailabilityResolver;
use crate::calendar::PeriodCalendar;
use crate::capacity::PlaceTable;
use crate::data::{
    Affectation, AffectationType, Choice, ChoiceTag, FallbackEvent, Internship, InternshipId, OfferId, OrganizationId, PeriodId,
    SolverInput, SolverOutput, Speciality, SpecialityId, StudentId,
};
use crate::error::SolverError;
use crate::offers::{OfferCatalogue, OfferSelection};
use crate::preferences::PreferenceIndex;
use crate::sink::{self, ResultSink};
use log::{debug, info, trace, warn};
use rand::SeedableRng;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

/// Shared flag to stop a running solve from another thread.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Per-solve knobs.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SolveOptions {
    /// Seeds the student shuffle and the period-block picks.
    pub seed: u64,
    /// Number of runs (seeds `seed`, `seed + 1`, ...). The cheapest wins.
    pub runs: u32,
    pub time_limit_secs: Option<u64>,
    #[serde(skip)]
    pub cancel: Option<CancelToken>,
}

impl Default for SolveOptions {
    fn default() -> Self {
        Self {
            seed: 0,
            runs: 1,
            time_limit_secs: None,
            cancel: None,
        }
    }
}

/// Deadline and cancellation checked at the top of each internship loop.
#[derive(Debug, Clone, Default)]
pub struct SolveBudget {
    started: Option<Instant>,
    limit: Option<Duration>,
    cancel: Option<CancelToken>,
}

impl SolveBudget {
    pub fn unlimited() -> Self {
        Self::default()
    }

    pub fn from_options(options: &SolveOptions) -> Self {
        Self {
            started: Some(Instant::now()),
            limit: options.time_limit_secs.map(Duration::from_secs),
            cancel: options.cancel.clone(),
        }
    }

    pub fn check(&self) -> Result<(), SolverError> {
        if self.cancel.as_ref().is_some_and(CancelToken::is_cancelled) {
            return Err(SolverError::Cancelled);
        }
        if let (Some(started), Some(limit)) = (self.started, self.limit) {
            let elapsed = started.elapsed();
            if elapsed > limit {
                return Err(SolverError::TimeBudgetExceeded { limit, elapsed });
            }
        }
        Ok(())
    }
}

/// Runs the solver `options.runs` times and keeps the cheapest solution.
pub fn solve(input: &SolverInput, options: &SolveOptions) -> Result<SolverOutput, SolverError> {
    let start_time = Instant::now();
    let budget = SolveBudget::from_options(options);
    let runs = options.runs.max(1);

    let mut best: Option<SolverOutput> = None;
    for run in 0..runs {
        let seed = options.seed.wrapping_add(u64::from(run));
        let output = Solver::new(input, seed, budget.clone())?.solve()?;
        info!(
            "Run {}/{} (seed {}): cost {}, {} errors.",
            run + 1,
            runs,
            seed,
            output.total_cost,
            output.errors_count
        );
        let better = best
            .as_ref()
            .is_none_or(|b| (output.total_cost, output.errors_count) < (b.total_cost, b.errors_count));
        if better {
            best = Some(output);
        }
    }

    info!("Solved cohort {} in {:.2?}", input.cohort.id, start_time.elapsed());
    best.ok_or_else(|| SolverError::InvalidInput("no solver run completed".to_string()))
}

/// One greedy pass over a cohort snapshot.
pub struct Solver<'a> {
    input: &'a SolverInput,
    seed: u64,
    calendar: PeriodCalendar,
    places: PlaceTable,
    preferences: PreferenceIndex<'a>,
    catalogue: OfferCatalogue<'a>,
    internships: Vec<&'a Internship>,
    internship_lengths_by_speciality: HashMap<SpecialityId, u32>,
    students: Vec<StudentId>,
    sink: ResultSink,
    fallbacks: Vec<FallbackEvent>,
    errors_count: u32,
    rng: StdRng,
    budget: SolveBudget,
    default_speciality: SpecialityId,
    pending_organization: OrganizationId,
}

impl<'a> Solver<'a> {
    /// Loads everything the solve needs. Fails before any assignment work if
    /// the cohort is missing its default/pending organizations or default
    /// speciality.
    pub fn new(input: &'a SolverInput, seed: u64, budget: SolveBudget) -> Result<Self, SolverError> {
        let cohort = input.cohort.id;
        let settings = &input.settings;
        if input.cohort.is_published {
            warn!("Cohort {} is published; refusing to solve it again.", cohort);
            return Err(SolverError::CohortPublished(cohort));
        }
        validate(input)?;

        let default_organization = input
            .organizations
            .iter()
            .find(|o| o.reference.trim() == settings.default_organization_reference)
            .ok_or_else(|| SolverError::MissingDefaultOrganization {
                cohort,
                reference: settings.default_organization_reference.clone(),
            })?;
        let pending_organization = input
            .organizations
            .iter()
            .find(|o| o.reference.trim() == settings.pending_organization_reference)
            .ok_or_else(|| SolverError::MissingPendingOrganization {
                cohort,
                reference: settings.pending_organization_reference.clone(),
            })?;
        let default_speciality = input
            .specialities
            .iter()
            .find(|s| s.acronym.trim() == settings.default_speciality_acronym)
            .ok_or_else(|| SolverError::MissingDefaultSpeciality {
                cohort,
                acronym: settings.default_speciality_acronym.clone(),
            })?;

        let calendar = PeriodCalendar::new(&input.periods, settings)?;
        let places = PlaceTable::new(input.period_places.iter().filter(|p| calendar.contains(p.period_id)));

        // Mandatory internships first, by speciality sequence, then by name.
        let specialities: HashMap<SpecialityId, &Speciality> = input.specialities.iter().map(|s| (s.id, s)).collect();
        let mut internships: Vec<&'a Internship> = input.internships.iter().collect();
        internships.sort_by_key(|i| {
            let sequence = i
                .speciality_id
                .and_then(|s| specialities.get(&s))
                .map_or(u32::MAX, |s| s.sequence);
            (!i.is_mandatory(), sequence, i.name.clone(), i.id)
        });

        let mut internship_lengths_by_speciality = HashMap::new();
        for internship in &internships {
            if let Some(speciality) = internship.speciality_id {
                *internship_lengths_by_speciality.entry(speciality).or_insert(0) += internship.length_in_periods;
            }
        }

        // Students are shuffled once so nobody is systematically served first.
        let mut rng = StdRng::seed_from_u64(seed);
        let mut students: Vec<StudentId> = input.students.iter().map(|s| s.id).collect();
        students.shuffle(&mut rng);

        info!(
            "Loaded cohort {}: {} students, {} internships, {} offers, {} periods, {} choices, {} enrollments.",
            cohort,
            students.len(),
            internships.len(),
            input.offers.len(),
            calendar.len(),
            input.choices.len(),
            input.enrollments.len()
        );

        Ok(Self {
            input,
            seed,
            sink: ResultSink::new(calendar.len()),
            calendar,
            places,
            preferences: PreferenceIndex::new(&input.choices),
            catalogue: OfferCatalogue::new(&input.offers, &input.organizations, default_organization),
            internships,
            internship_lengths_by_speciality,
            students,
            fallbacks: Vec::new(),
            errors_count: 0,
            rng,
            budget,
            default_speciality: default_speciality.id,
            pending_organization: pending_organization.id,
        })
    }

    pub fn solve(mut self) -> Result<SolverOutput, SolverError> {
        let start_time = Instant::now();

        self.seed_enrollments()?;
        info!("Seeded {} fixed enrollments.", self.sink.len());

        self.priority_pass()?;
        info!("Priority pass done: {} affectations, {} errors.", self.sink.len(), self.errors_count);

        self.general_pass()?;
        info!("General pass done: {} affectations, {} errors.", self.sink.len(), self.errors_count);

        self.fill_pass()?;
        info!(
            "Fill pass done: {} affectations, {} places left, solved in {:.2?}.",
            self.sink.len(),
            self.places.total_remaining(),
            start_time.elapsed()
        );

        Ok(self.into_output())
    }

    fn seed_enrollments(&mut self) -> Result<(), SolverError> {
        let input = self.input;
        for enrollment in &input.enrollments {
            let Some(internship) = self.internships.iter().copied().find(|i| i.id == enrollment.internship_id) else {
                debug!("Skipping enrollment of student {} for an internship outside the cohort.", enrollment.student_id);
                continue;
            };
            if !self.calendar.contains(enrollment.period_id) {
                debug!("Skipping enrollment of student {} outside the cohort periods.", enrollment.student_id);
                continue;
            }
            let speciality = enrollment
                .speciality_id
                .or(internship.speciality_id)
                .unwrap_or(self.default_speciality);
            let offer = self
                .catalogue
                .offer_for(enrollment.organization_id, speciality, internship.id)
                .map(|o| o.id);
            let affectation = Affectation {
                student_id: enrollment.student_id,
                organization_id: enrollment.organization_id,
                period_id: enrollment.period_id,
                speciality_id: speciality,
                internship_id: Some(internship.id),
                choice: ChoiceTag::Enrolled,
                cost: ChoiceTag::Enrolled.cost(),
                type_of_internship: AffectationType::Priority,
            };
            self.place(affectation, offer)?;
        }
        Ok(())
    }

    fn priority_pass(&mut self) -> Result<(), SolverError> {
        for internship in self.internships.clone() {
            self.budget.check()?;
            let students: Vec<StudentId> = self
                .students
                .iter()
                .copied()
                .filter(|s| self.preferences.has_priority_choice(*s, internship.id))
                .collect();
            debug!("{} priority students for {}.", students.len(), internship.name);
            for student in students {
                if self.is_eligible(student, internship) {
                    self.satisfy(student, internship)?;
                }
            }
        }
        Ok(())
    }

    fn general_pass(&mut self) -> Result<(), SolverError> {
        for internship in self.internships.clone() {
            self.budget.check()?;
            for student in self.students.clone() {
                if !self.preferences.has_choices(student) {
                    continue;
                }
                if self.is_eligible(student, internship) {
                    self.satisfy(student, internship)?;
                }
            }
        }
        Ok(())
    }

    /// Every student with free periods left goes to the pending organization
    /// for all of them at once.
    fn fill_pass(&mut self) -> Result<(), SolverError> {
        for student in self.students.clone() {
            let occupied = self.sink.occupied(student);
            let empty: Vec<PeriodId> = self
                .calendar
                .ids()
                .iter()
                .copied()
                .filter(|p| !occupied.contains(p))
                .collect();
            if empty.is_empty() {
                continue;
            }
            debug!("Student {} has {} empty periods, sending to pending organization.", student, empty.len());
            for period in empty {
                let affectation = Affectation {
                    student_id: student,
                    organization_id: self.pending_organization,
                    period_id: period,
                    speciality_id: self.default_speciality,
                    internship_id: None,
                    choice: ChoiceTag::Involuntary,
                    cost: ChoiceTag::Involuntary.cost(),
                    type_of_internship: AffectationType::Normal,
                };
                self.place(affectation, None)?;
            }
        }
        Ok(())
    }

    /// A student is considered for an internship while they have free
    /// periods and have not yet covered it.
    fn is_eligible(&self, student: StudentId, internship: &Internship) -> bool {
        if !self.sink.has_empty_periods(student) {
            return false;
        }
        if self.sink.holds_internship(student, internship.id) {
            return false;
        }
        match internship.speciality_id {
            Some(speciality) => {
                // Periods held for any internship of this speciality, whatever
                // speciality the placement itself ended up in.
                let held = self
                    .sink
                    .for_student(student)
                    .filter(|a| a.internship_id.is_some_and(|i| self.speciality_of(i) == Some(speciality)))
                    .count() as u32;
                let expected = self
                    .internship_lengths_by_speciality
                    .get(&speciality)
                    .copied()
                    .unwrap_or(internship.length_in_periods);
                held + internship.length_in_periods <= expected
            }
            None => {
                // Two electives in the same speciality are not allowed.
                let chosen = self.preferences.speciality_for(student, internship.id);
                !self.sink.for_student(student).any(|a| {
                    a.internship_id
                        .is_some_and(|other| self.is_elective(other) && Some(a.speciality_id) == chosen)
                })
            }
        }
    }

    fn is_elective(&self, internship: InternshipId) -> bool {
        self.internships
            .iter()
            .any(|i| i.id == internship && !i.is_mandatory())
    }

    fn speciality_of(&self, internship: InternshipId) -> Option<SpecialityId> {
        self.internships
            .iter()
            .find(|i| i.id == internship)
            .and_then(|i| i.speciality_id)
    }

    /// Walks the student's choices for `internship` and places them on the
    /// first one with a free block; mandatory internships fall back to an
    /// imposed placement when no choice fits.
    fn satisfy(&mut self, student: StudentId, internship: &'a Internship) -> Result<(), SolverError> {
        let choices = self.preferences.choices_for(student, internship.id);
        trace!("Student {}: {} choices for {}.", student, choices.len(), internship.name);

        for choice in &choices {
            if self.sink.holds(student, choice.organization_id, choice.speciality_id) {
                continue;
            }
            let offers = self
                .catalogue
                .offers_for_choice(choice.organization_id, choice.speciality_id, internship.id);
            for offer in offers {
                let candidates = self.periods_with_places(offer.id);
                let block = AvailabilityResolver::new(&self.calendar).available_periods(
                    self.sink.occupied(student),
                    internship.length_in_periods,
                    &candidates,
                    &mut self.rng,
                );
                if block.is_empty() {
                    continue;
                }
                trace!("Student {} gets choice {} for periods {:?}.", student, choice.choice, block);
                for period in block {
                    let affectation = self.ranked_affectation(student, internship, choice, period);
                    self.place(affectation, Some(offer.id))?;
                }
                return Ok(());
            }
        }

        if internship.is_mandatory() {
            self.impose(student, internship, &choices)?;
        }
        Ok(())
    }

    /// Places the student outside of their choices for a mandatory internship.
    fn impose(&mut self, student: StudentId, internship: &'a Internship, choices: &[&'a Choice]) -> Result<(), SolverError> {
        let resolver = AvailabilityResolver::new(&self.calendar);
        let occupied = self.sink.occupied(student);
        let mut blocks = resolver.free_blocks(occupied, internship.length_in_periods, self.calendar.mandatory_ids());
        if blocks.is_empty() {
            blocks = resolver.free_blocks(occupied, internship.length_in_periods, self.calendar.ids());
        }
        if blocks.is_empty() {
            debug!("Student {} has no free block for {}.", student, internship.name);
            return Ok(());
        }

        let excluded: HashSet<OrganizationId> = choices.iter().map(|c| c.organization_id).collect();
        let mut chosen = None;
        let mut fallback = None;
        for block in blocks {
            let selection = self
                .catalogue
                .best_offer(internship, &excluded, &block, &self.places, self.default_speciality);
            if matches!(selection, OfferSelection::Matched(_)) {
                chosen = Some((block, selection));
                break;
            }
            if fallback.is_none() {
                fallback = Some((block, selection));
            }
        }
        let Some((block, selection)) = chosen.or(fallback) else {
            return Ok(());
        };

        let (choice, type_of_internship) = match selection {
            OfferSelection::DefaultOrganization { .. } => (ChoiceTag::Overflow, AffectationType::Overflow),
            _ => (ChoiceTag::Involuntary, AffectationType::Normal),
        };
        if let Some(tier) = selection.fallback_tier() {
            self.errors_count += 1;
            let event = FallbackEvent {
                student_id: student,
                internship_id: internship.id,
                tier,
                organization_id: selection.organization_id(),
                period_ids: block.clone(),
            };
            debug!("{}", event);
            self.fallbacks.push(event);
        }

        for period in block {
            let affectation = Affectation {
                student_id: student,
                organization_id: selection.organization_id(),
                period_id: period,
                speciality_id: selection.speciality_id(),
                internship_id: Some(internship.id),
                choice,
                cost: choice.cost(),
                type_of_internship,
            };
            self.place(affectation, selection.offer_id())?;
        }
        Ok(())
    }

    fn ranked_affectation(&self, student: StudentId, internship: &Internship, choice: &Choice, period: PeriodId) -> Affectation {
        let (tag, kind) = if choice.organization_id == self.catalogue.default_organization().id {
            (ChoiceTag::Overflow, AffectationType::Overflow)
        } else {
            let kind = if choice.priority { AffectationType::Priority } else { AffectationType::Normal };
            (ChoiceTag::Ranked(choice.choice), kind)
        };
        Affectation {
            student_id: student,
            organization_id: choice.organization_id,
            period_id: period,
            speciality_id: choice.speciality_id,
            internship_id: Some(internship.id),
            choice: tag,
            cost: tag.cost(),
            type_of_internship: kind,
        }
    }

    /// Periods where `offer` still has a seat, in calendar order.
    fn periods_with_places(&self, offer: OfferId) -> Vec<PeriodId> {
        let open = PlaceTable::sorted_by_capacity_desc(self.places.places_for_offers(&[offer]));
        self.calendar.sort_ids(open.into_iter().map(|r| r.period_id))
    }

    /// Records an affectation and takes a seat of `offer`, the offer the
    /// placement was checked against. The default and pending organizations
    /// have no capacity to take from.
    fn place(&mut self, affectation: Affectation, offer: Option<OfferId>) -> Result<(), SolverError> {
        self.sink.check(&affectation)?;
        let organization = affectation.organization_id;
        if organization != self.catalogue.default_organization().id && organization != self.pending_organization {
            match offer {
                Some(offer) if self.places.contains(offer, affectation.period_id) => {
                    self.places.decrement(offer, affectation.period_id)?;
                }
                _ => debug!(
                    "No capacity tracked for organization {} speciality {} period {}.",
                    organization, affectation.speciality_id, affectation.period_id
                ),
            }
        }
        self.sink.push(affectation)
    }

    fn into_output(self) -> SolverOutput {
        let calendar = self.calendar;
        let mut affectations = self.sink.into_affectations();
        affectations.sort_by_key(|a| (a.student_id, calendar.position(a.period_id)));

        if self.errors_count > 0 {
            warn!(
                "Cohort {}: {} placements could not be met from real capacity.",
                self.input.cohort.id, self.errors_count
            );
        }

        SolverOutput {
            cohort_id: self.input.cohort.id,
            seed: self.seed,
            total_cost: sink::total_cost(&affectations),
            cost_by_student: sink::cost_by_student(&affectations),
            stats: sink::solution_stats(&affectations),
            affectations,
            errors_count: self.errors_count,
            fallbacks: self.fallbacks,
        }
    }
}

/// Rejects snapshots the solver cannot make sense of.
fn validate(input: &SolverInput) -> Result<(), SolverError> {
    if let Some(choice) = input.choices.iter().find(|c| ChoiceTag::from_rank(c.choice).is_none()) {
        return Err(SolverError::InvalidInput(format!(
            "student {} has a choice ranked {}, expected 1 to {}",
            choice.student_id,
            choice.choice,
            ChoiceTag::MAX_RANK
        )));
    }
    if let Some(internship) = input.internships.iter().find(|i| i.length_in_periods == 0) {
        return Err(SolverError::InvalidInput(format!(
            "internship {} must span at least one period",
            internship.name
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unlimited_budget_never_stops() {
        assert!(SolveBudget::unlimited().check().is_ok());
    }

    #[test]
    fn cancelled_token_stops_the_budget() {
        let token = CancelToken::new();
        let options = SolveOptions { cancel: Some(token.clone()), ..SolveOptions::default() };
        let budget = SolveBudget::from_options(&options);
        assert!(budget.check().is_ok());
        token.cancel();
        assert!(matches!(budget.check(), Err(SolverError::Cancelled)));
    }

    #[test]
    fn zero_time_limit_runs_out() {
        let budget = SolveBudget {
            started: Some(Instant::now() - Duration::from_millis(5)),
            limit: Some(Duration::ZERO),
            cancel: None,
        };
        assert!(matches!(budget.check(), Err(SolverError::TimeBudgetExceeded { .. })));
    }

    #[test]
    fn options_default_to_one_run() {
        let options: SolveOptions = serde_json::from_str(r#"{"seed": 3}"#).unwrap();
        assert_eq!(options.seed, 3);
        assert_eq!(options.runs, 1);
        assert!(options.cancel.is_none());
    }
}
