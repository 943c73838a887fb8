use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};

use crate::data::{
    Affectation, ChoiceTag, InternshipId, OrganizationId, PeriodId, SolutionStats, SpecialityId, StudentId,
};
use crate::error::SolverError;

static NO_PERIODS: BTreeSet<PeriodId> = BTreeSet::new();

/// Collects affectations as the solve produces them and refuses any that
/// would double-book a student.
#[derive(Debug)]
pub struct ResultSink {
    affectations: Vec<Affectation>,
    occupied: HashMap<StudentId, BTreeSet<PeriodId>>,
    period_limit: usize,
}

impl ResultSink {
    pub fn new(period_limit: usize) -> Self {
        Self {
            affectations: Vec::new(),
            occupied: HashMap::new(),
            period_limit,
        }
    }

    /// Checks that `affectation` can be accepted without storing it.
    pub fn check(&self, affectation: &Affectation) -> Result<(), SolverError> {
        let occupied = self.occupied(affectation.student_id);
        if occupied.contains(&affectation.period_id) {
            return Err(SolverError::DoubleBooking {
                student: affectation.student_id,
                period: affectation.period_id,
            });
        }
        if occupied.len() >= self.period_limit {
            return Err(SolverError::TooManyPeriods {
                student: affectation.student_id,
                limit: self.period_limit,
            });
        }
        Ok(())
    }

    pub fn push(&mut self, affectation: Affectation) -> Result<(), SolverError> {
        self.check(&affectation)?;
        self.occupied
            .entry(affectation.student_id)
            .or_default()
            .insert(affectation.period_id);
        self.affectations.push(affectation);
        Ok(())
    }

    pub fn occupied(&self, student: StudentId) -> &BTreeSet<PeriodId> {
        self.occupied.get(&student).unwrap_or(&NO_PERIODS)
    }

    pub fn has_empty_periods(&self, student: StudentId) -> bool {
        self.occupied(student).len() < self.period_limit
    }

    pub fn for_student(&self, student: StudentId) -> impl Iterator<Item = &Affectation> {
        self.affectations.iter().filter(move |a| a.student_id == student)
    }

    /// Whether the student already holds a placement at this site.
    pub fn holds(&self, student: StudentId, organization: OrganizationId, speciality: SpecialityId) -> bool {
        self.for_student(student)
            .any(|a| a.organization_id == organization && a.speciality_id == speciality)
    }

    pub fn holds_internship(&self, student: StudentId, internship: InternshipId) -> bool {
        self.for_student(student).any(|a| a.internship_id == Some(internship))
    }

    pub fn affectations(&self) -> &[Affectation] {
        &self.affectations
    }

    pub fn len(&self) -> usize {
        self.affectations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.affectations.is_empty()
    }

    pub fn into_affectations(self) -> Vec<Affectation> {
        self.affectations
    }
}

pub fn total_cost(affectations: &[Affectation]) -> u64 {
    affectations.iter().map(|a| u64::from(a.cost)).sum()
}

pub fn cost_by_student(affectations: &[Affectation]) -> BTreeMap<StudentId, u64> {
    let mut costs = BTreeMap::new();
    for affectation in affectations {
        *costs.entry(affectation.student_id).or_insert(0) += u64::from(affectation.cost);
    }
    costs
}

pub fn solution_stats(affectations: &[Affectation]) -> SolutionStats {
    let mut stats = SolutionStats {
        affectations: affectations.len(),
        ..SolutionStats::default()
    };
    let mut students = HashSet::new();
    let mut first_choice = HashSet::new();
    let mut with_fallback = HashSet::new();

    for affectation in affectations {
        students.insert(affectation.student_id);
        *stats.by_choice.entry(affectation.choice.to_string()).or_insert(0) += 1;
        match affectation.choice {
            ChoiceTag::Ranked(1) => {
                first_choice.insert(affectation.student_id);
            }
            ChoiceTag::Involuntary | ChoiceTag::Overflow => {
                with_fallback.insert(affectation.student_id);
            }
            _ => {}
        }
    }

    stats.students = students.len();
    stats.first_choice_students = first_choice.len();
    stats.students_with_fallback = with_fallback.len();
    stats
}
