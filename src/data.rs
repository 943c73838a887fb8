use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

// Type aliases for clarity
pub type CohortId = u32;
pub type StudentId = u32;
pub type InternshipId = u32;
pub type OrganizationId = u32;
pub type SpecialityId = u32;
pub type PeriodId = u32;
pub type OfferId = u32;

/// The enrollment group scheduled by one solve.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Cohort {
    pub id: CohortId,
    #[serde(default)]
    pub name: String,
    /// Published cohorts are frozen and must not be solved again.
    #[serde(default)]
    pub is_published: bool,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Student {
    pub id: StudentId,
    #[serde(default)]
    pub name: String,
}

/// A medical speciality. `sequence` drives the order internships are processed in.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Speciality {
    pub id: SpecialityId,
    pub name: String,
    pub acronym: String,
    #[serde(default)]
    pub sequence: u32,
}

/// A placement site.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Organization {
    pub id: OrganizationId,
    pub reference: String,
    #[serde(default)]
    pub name: String,
}

impl Organization {
    /// Three-character references (other than "00") are reserved sites that
    /// normal matching never proposes.
    pub fn is_forbidden(&self) -> bool {
        let reference = self.reference.trim();
        reference != "00" && reference.chars().count() == 3
    }
}

/// A requirement slot of the cohort. No speciality means a non-mandatory
/// (elective) internship.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Internship {
    pub id: InternshipId,
    pub name: String,
    #[serde(default)]
    pub speciality_id: Option<SpecialityId>,
    #[serde(default)]
    pub alternate_speciality_id: Option<SpecialityId>,
    #[serde(default = "default_length")]
    pub length_in_periods: u32,
}

fn default_length() -> u32 {
    1
}

impl Internship {
    pub fn is_mandatory(&self) -> bool {
        self.speciality_id.is_some()
    }
}

/// A named time slot ("P1", "P2", ...).
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Period {
    pub id: PeriodId,
    pub name: String,
}

impl Period {
    /// Numeric suffix of the period name, used for ordering.
    pub fn number(&self) -> Option<u32> {
        self.name
            .trim()
            .trim_start_matches(|c: char| !c.is_ascii_digit())
            .parse()
            .ok()
    }
}

/// A catalogue entry: one organization offering one speciality.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InternshipOffer {
    pub id: OfferId,
    pub organization_id: OrganizationId,
    pub speciality_id: SpecialityId,
    #[serde(default)]
    pub internship_id: Option<InternshipId>,
    #[serde(default)]
    pub maximum_enrollments: u32,
}

/// Seats left for one offer in one period.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PeriodPlaces {
    pub offer_id: OfferId,
    pub period_id: PeriodId,
    pub number_places: u32,
}

/// A ranked student preference for an internship.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Choice {
    pub student_id: StudentId,
    pub internship_id: InternshipId,
    pub organization_id: OrganizationId,
    pub speciality_id: SpecialityId,
    /// Rank, 1 (preferred) to 4.
    pub choice: u8,
    #[serde(default)]
    pub priority: bool,
}

/// A fixed placement decided outside the solver.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Enrollment {
    pub student_id: StudentId,
    pub internship_id: InternshipId,
    pub organization_id: OrganizationId,
    pub period_id: PeriodId,
    #[serde(default)]
    pub speciality_id: Option<SpecialityId>,
}

/// Cohort-level conventions looked up once at solver initialization.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CohortSettings {
    pub default_organization_reference: String,
    pub pending_organization_reference: String,
    pub default_speciality_acronym: String,
    /// Period left out of the cohort. `None` drops the last period by number.
    pub sentinel_period: Option<String>,
    /// Period left out of the mandatory fallback search space.
    pub mandatory_excluded_period: Option<String>,
}

impl Default for CohortSettings {
    fn default() -> Self {
        Self {
            default_organization_reference: "999".to_string(),
            pending_organization_reference: "604".to_string(),
            default_speciality_acronym: "MO".to_string(),
            sentinel_period: None,
            mandatory_excluded_period: Some("P12".to_string()),
        }
    }
}

/// The complete snapshot of a cohort the solver works on.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SolverInput {
    pub cohort: Cohort,
    pub students: Vec<Student>,
    pub specialities: Vec<Speciality>,
    pub organizations: Vec<Organization>,
    pub internships: Vec<Internship>,
    pub offers: Vec<InternshipOffer>,
    pub period_places: Vec<PeriodPlaces>,
    pub periods: Vec<Period>,
    #[serde(default)]
    pub choices: Vec<Choice>,
    #[serde(default)]
    pub enrollments: Vec<Enrollment>,
    #[serde(default)]
    pub settings: CohortSettings,
}

/// How an affectation was obtained. Each tag has a fixed cost.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(into = "String", try_from = "String")]
pub enum ChoiceTag {
    /// One of the student's ranked choices (1 to 4).
    Ranked(u8),
    /// A fixed enrollment.
    Enrolled,
    /// Imposed outside of the student's choices.
    Involuntary,
    /// Overflow to the default organization.
    Overflow,
}

impl ChoiceTag {
    pub const MAX_RANK: u8 = 4;

    pub fn from_rank(rank: u8) -> Option<Self> {
        (1..=Self::MAX_RANK)
            .contains(&rank)
            .then_some(ChoiceTag::Ranked(rank))
    }

    pub fn cost(self) -> u32 {
        match self {
            ChoiceTag::Ranked(rank) => u32::from(rank.saturating_sub(1)),
            ChoiceTag::Enrolled => 0,
            ChoiceTag::Involuntary => 10,
            ChoiceTag::Overflow => 1000,
        }
    }
}

impl fmt::Display for ChoiceTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChoiceTag::Ranked(rank) => write!(f, "{rank}"),
            ChoiceTag::Enrolled => f.write_str("E"),
            ChoiceTag::Involuntary => f.write_str("I"),
            ChoiceTag::Overflow => f.write_str("X"),
        }
    }
}

impl From<ChoiceTag> for String {
    fn from(tag: ChoiceTag) -> Self {
        tag.to_string()
    }
}

impl TryFrom<String> for ChoiceTag {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        match value.as_str() {
            "E" => Ok(ChoiceTag::Enrolled),
            "I" => Ok(ChoiceTag::Involuntary),
            "X" => Ok(ChoiceTag::Overflow),
            other => other
                .parse::<u8>()
                .ok()
                .and_then(ChoiceTag::from_rank)
                .ok_or_else(|| format!("unknown choice tag '{other}'")),
        }
    }
}

/// Kind of placement, serialized as `typeOfInternship`. Fixed
/// enrollments count as priority placements, like priority choices.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AffectationType {
    /// A priority choice or a fixed enrollment.
    #[serde(rename = "S")]
    Priority,
    #[serde(rename = "N")]
    Normal,
    /// Sent to the default organization.
    #[serde(rename = "X")]
    Overflow,
}

/// One student placed at one organization for one period.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Affectation {
    pub student_id: StudentId,
    pub organization_id: OrganizationId,
    pub period_id: PeriodId,
    pub speciality_id: SpecialityId,
    pub internship_id: Option<InternshipId>,
    pub choice: ChoiceTag,
    pub cost: u32,
    pub type_of_internship: AffectationType,
}

/// Degraded placement tiers, reported for operator review.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum FallbackTier {
    AlternateSpeciality,
    DefaultOrganization,
}

/// A placement that could not be met from real capacity.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FallbackEvent {
    pub student_id: StudentId,
    pub internship_id: InternshipId,
    pub tier: FallbackTier,
    pub organization_id: OrganizationId,
    pub period_ids: Vec<PeriodId>,
}

impl fmt::Display for FallbackEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let tier = match self.tier {
            FallbackTier::AlternateSpeciality => "Alternate Speciality",
            FallbackTier::DefaultOrganization => "Default Organization",
        };
        write!(
            f,
            "[{}] Student {} could not be placed for internship {} from real capacity; sent to organization {} for periods {:?}.",
            tier, self.student_id, self.internship_id, self.organization_id, self.period_ids
        )
    }
}

/// Aggregate figures over a finished solution.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SolutionStats {
    pub students: usize,
    pub affectations: usize,
    pub by_choice: BTreeMap<String, usize>,
    pub first_choice_students: usize,
    pub students_with_fallback: usize,
}

/// The final output of the solver.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SolverOutput {
    pub cohort_id: CohortId,
    pub seed: u64,
    pub affectations: Vec<Affectation>,
    pub errors_count: u32,
    pub total_cost: u64,
    pub cost_by_student: BTreeMap<StudentId, u64>,
    pub fallbacks: Vec<FallbackEvent>,
    pub stats: SolutionStats,
}
