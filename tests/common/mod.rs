#![allow(dead_code)]

use internship_solver::data::*;

pub const DEFAULT_ORG: OrganizationId = 999;
pub const PENDING_ORG: OrganizationId = 604;
pub const DEFAULT_SPECIALITY: SpecialityId = 100;

/// Builds small cohort snapshots. Periods are `P1..Pn` plus a trailing
/// sentinel period, with ids equal to their number.
pub struct CohortBuilder {
    input: SolverInput,
}

impl CohortBuilder {
    pub fn new(period_count: u32) -> Self {
        let periods = (1..=period_count + 1)
            .map(|n| Period { id: n, name: format!("P{n}") })
            .collect();
        Self {
            input: SolverInput {
                cohort: Cohort { id: 1, name: "Master 2025".to_string(), is_published: false },
                students: Vec::new(),
                specialities: vec![Speciality {
                    id: DEFAULT_SPECIALITY,
                    name: "Default".to_string(),
                    acronym: "MO".to_string(),
                    sequence: 99,
                }],
                organizations: vec![
                    Organization { id: DEFAULT_ORG, reference: "999".to_string(), name: "Error hospital".to_string() },
                    Organization { id: PENDING_ORG, reference: "604".to_string(), name: "Pending".to_string() },
                ],
                internships: Vec::new(),
                offers: Vec::new(),
                period_places: Vec::new(),
                periods,
                choices: Vec::new(),
                enrollments: Vec::new(),
                settings: CohortSettings::default(),
            },
        }
    }

    pub fn speciality(mut self, id: SpecialityId, acronym: &str, sequence: u32) -> Self {
        self.input.specialities.push(Speciality {
            id,
            name: acronym.to_string(),
            acronym: acronym.to_string(),
            sequence,
        });
        self
    }

    pub fn organization(mut self, id: OrganizationId, reference: &str) -> Self {
        self.input.organizations.push(Organization {
            id,
            reference: reference.to_string(),
            name: format!("Hospital {reference}"),
        });
        self
    }

    pub fn internship(mut self, id: InternshipId, name: &str, speciality: Option<SpecialityId>, length: u32) -> Self {
        self.input.internships.push(Internship {
            id,
            name: name.to_string(),
            speciality_id: speciality,
            alternate_speciality_id: None,
            length_in_periods: length,
        });
        self
    }

    pub fn alternate(mut self, internship: InternshipId, speciality: SpecialityId) -> Self {
        if let Some(i) = self.input.internships.iter_mut().find(|i| i.id == internship) {
            i.alternate_speciality_id = Some(speciality);
        }
        self
    }

    /// `places` lists `(period, seats)`.
    pub fn offer(mut self, id: OfferId, organization: OrganizationId, speciality: SpecialityId, places: &[(PeriodId, u32)]) -> Self {
        self.input.offers.push(InternshipOffer {
            id,
            organization_id: organization,
            speciality_id: speciality,
            internship_id: None,
            maximum_enrollments: places.iter().map(|(_, n)| n).sum(),
        });
        self.input.period_places.extend(places.iter().map(|&(period_id, number_places)| PeriodPlaces {
            offer_id: id,
            period_id,
            number_places,
        }));
        self
    }

    /// Restricts an offer to one internship.
    pub fn tied(mut self, offer: OfferId, internship: InternshipId) -> Self {
        if let Some(o) = self.input.offers.iter_mut().find(|o| o.id == offer) {
            o.internship_id = Some(internship);
        }
        self
    }

    pub fn student(mut self, id: StudentId) -> Self {
        self.input.students.push(Student { id, name: format!("Student {id}") });
        self
    }

    pub fn choice(
        mut self,
        student: StudentId,
        internship: InternshipId,
        organization: OrganizationId,
        speciality: SpecialityId,
        rank: u8,
        priority: bool,
    ) -> Self {
        self.input.choices.push(Choice {
            student_id: student,
            internship_id: internship,
            organization_id: organization,
            speciality_id: speciality,
            choice: rank,
            priority,
        });
        self
    }

    pub fn enrollment(mut self, student: StudentId, internship: InternshipId, organization: OrganizationId, period: PeriodId) -> Self {
        self.input.enrollments.push(Enrollment {
            student_id: student,
            internship_id: internship,
            organization_id: organization,
            period_id: period,
            speciality_id: None,
        });
        self
    }

    pub fn build(self) -> SolverInput {
        self.input
    }
}

pub fn for_student(output: &SolverOutput, student: StudentId) -> Vec<&Affectation> {
    output.affectations.iter().filter(|a| a.student_id == student).collect()
}

pub fn at_period(output: &SolverOutput, student: StudentId, period: PeriodId) -> Option<&Affectation> {
    output
        .affectations
        .iter()
        .find(|a| a.student_id == student && a.period_id == period)
}

/// The two-students-one-seat cohort: Surgery, one period long, one seat at
/// organization "010" in P1 and none in P2.
pub fn contended_seat() -> SolverInput {
    CohortBuilder::new(2)
        .speciality(1, "CH", 1)
        .organization(10, "010")
        .internship(1, "Surgery", Some(1), 1)
        .offer(1, 10, 1, &[(1, 1), (2, 0)])
        .student(1)
        .student(2)
        .choice(1, 1, 10, 1, 1, false)
        .choice(2, 1, 10, 1, 1, false)
        .build()
}
