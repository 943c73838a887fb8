use std::collections::HashMap;

use itertools::Itertools;

use crate::data::{Choice, InternshipId, SpecialityId, StudentId};

/// One student's choices, in processing order per internship.
#[derive(Debug, Default)]
struct StudentPreferences<'a> {
    by_internship: HashMap<InternshipId, Vec<&'a Choice>>,
    speciality_by_internship: HashMap<InternshipId, SpecialityId>,
}

impl<'a> StudentPreferences<'a> {
    fn new(mut choices: Vec<&'a Choice>) -> Self {
        choices.sort_by_key(|c| (c.internship_id, !c.priority, c.choice, c.organization_id));

        let mut prefs = StudentPreferences::default();
        for choice in &choices {
            // First choice in processing order fixes the internship's speciality.
            prefs
                .speciality_by_internship
                .entry(choice.internship_id)
                .or_insert(choice.speciality_id);
        }
        prefs.by_internship = choices.into_iter().into_group_map_by(|c| c.internship_id);
        prefs
    }
}

/// Choices grouped per student. Read-only once built.
#[derive(Debug, Default)]
pub struct PreferenceIndex<'a> {
    students: HashMap<StudentId, StudentPreferences<'a>>,
}

impl<'a> PreferenceIndex<'a> {
    pub fn new(choices: &'a [Choice]) -> Self {
        let students = choices
            .iter()
            .into_group_map_by(|c| c.student_id)
            .into_iter()
            .map(|(student, choices)| (student, StudentPreferences::new(choices)))
            .collect();
        Self { students }
    }

    pub fn has_choices(&self, student: StudentId) -> bool {
        self.students.contains_key(&student)
    }

    /// Choices of `student` for `internship`: priority choices first, then by rank.
    pub fn choices_for(&self, student: StudentId, internship: InternshipId) -> Vec<&'a Choice> {
        self.students
            .get(&student)
            .and_then(|prefs| prefs.by_internship.get(&internship))
            .cloned()
            .unwrap_or_default()
    }

    pub fn has_priority_choice(&self, student: StudentId, internship: InternshipId) -> bool {
        self.choices_for(student, internship).iter().any(|c| c.priority)
    }

    /// Speciality the student settled on for `internship`.
    pub fn speciality_for(&self, student: StudentId, internship: InternshipId) -> Option<SpecialityId> {
        self.students
            .get(&student)
            .and_then(|prefs| prefs.speciality_by_internship.get(&internship))
            .copied()
    }
}
