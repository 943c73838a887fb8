use std::collections::{HashMap, HashSet};

use crate::capacity::PlaceTable;
use crate::data::{
    FallbackTier, Internship, InternshipId, InternshipOffer, OfferId, Organization, OrganizationId, PeriodId, SpecialityId,
};

/// Outcome of an offer search, from best to worst tier.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OfferSelection<'a> {
    /// Real capacity in the internship's speciality.
    Matched(&'a InternshipOffer),
    /// Real capacity, but in the internship's alternate speciality.
    AlternateSpeciality(&'a InternshipOffer),
    /// No real capacity left: the default organization absorbs the student.
    DefaultOrganization {
        organization_id: OrganizationId,
        speciality_id: SpecialityId,
    },
}

impl OfferSelection<'_> {
    pub fn organization_id(&self) -> OrganizationId {
        match self {
            OfferSelection::Matched(offer) | OfferSelection::AlternateSpeciality(offer) => offer.organization_id,
            OfferSelection::DefaultOrganization { organization_id, .. } => *organization_id,
        }
    }

    /// The offer whose seats the placement takes, if any.
    pub fn offer_id(&self) -> Option<OfferId> {
        match self {
            OfferSelection::Matched(offer) | OfferSelection::AlternateSpeciality(offer) => Some(offer.id),
            OfferSelection::DefaultOrganization { .. } => None,
        }
    }

    pub fn speciality_id(&self) -> SpecialityId {
        match self {
            OfferSelection::Matched(offer) | OfferSelection::AlternateSpeciality(offer) => offer.speciality_id,
            OfferSelection::DefaultOrganization { speciality_id, .. } => *speciality_id,
        }
    }

    /// `None` for a real match; the fallback tier otherwise.
    pub fn fallback_tier(&self) -> Option<FallbackTier> {
        match self {
            OfferSelection::Matched(_) => None,
            OfferSelection::AlternateSpeciality(_) => Some(FallbackTier::AlternateSpeciality),
            OfferSelection::DefaultOrganization { .. } => Some(FallbackTier::DefaultOrganization),
        }
    }
}

/// The cohort's offers, with the organization rules needed to rank them.
#[derive(Debug)]
pub struct OfferCatalogue<'a> {
    offers: Vec<&'a InternshipOffer>,
    organizations: HashMap<OrganizationId, &'a Organization>,
    forbidden: HashSet<OrganizationId>,
    default_organization: &'a Organization,
}

impl<'a> OfferCatalogue<'a> {
    pub fn new(
        offers: &'a [InternshipOffer],
        organizations: &'a [Organization],
        default_organization: &'a Organization,
    ) -> Self {
        let mut offers: Vec<&'a InternshipOffer> = offers.iter().collect();
        offers.sort_by_key(|o| o.id);
        Self {
            offers,
            organizations: organizations.iter().map(|o| (o.id, o)).collect(),
            forbidden: organizations.iter().filter(|o| o.is_forbidden()).map(|o| o.id).collect(),
            default_organization,
        }
    }

    pub fn default_organization(&self) -> &'a Organization {
        self.default_organization
    }

    pub fn is_forbidden(&self, organization: OrganizationId) -> bool {
        self.forbidden.contains(&organization)
    }

    /// The offer behind an enrollment at `organization` in `speciality`.
    /// An offer tied to `internship` wins over an untied one.
    pub fn offer_for(
        &self,
        organization: OrganizationId,
        speciality: SpecialityId,
        internship: InternshipId,
    ) -> Option<&'a InternshipOffer> {
        self.offers_for_choice(organization, speciality, internship)
            .into_iter()
            .min_by_key(|o| o.internship_id.is_none())
    }

    /// Offers matching a student choice for `internship`.
    pub fn offers_for_choice(
        &self,
        organization: OrganizationId,
        speciality: SpecialityId,
        internship: InternshipId,
    ) -> Vec<&'a InternshipOffer> {
        self.offers
            .iter()
            .copied()
            .filter(|o| o.organization_id == organization && o.speciality_id == speciality)
            .filter(|o| o.internship_id.is_none_or(|i| i == internship))
            .collect()
    }

    /// Offers that can host `internship`. An offer tied to an internship only
    /// hosts that one; an untied offer hosts any internship of its speciality,
    /// or any elective.
    fn offers_for_internship(&self, internship: &Internship) -> impl Iterator<Item = &'a InternshipOffer> + '_ {
        let id = internship.id;
        let speciality = internship.speciality_id;
        self.offers.iter().copied().filter(move |o| match o.internship_id {
            Some(tied) => tied == id,
            None => speciality.is_none_or(|s| o.speciality_id == s),
        })
    }

    /// Best offer for `internship` over `periods`, falling back to the
    /// alternate speciality and then to the default organization.
    pub fn best_offer(
        &self,
        internship: &Internship,
        excluded: &HashSet<OrganizationId>,
        periods: &[PeriodId],
        places: &PlaceTable,
        default_speciality: SpecialityId,
    ) -> OfferSelection<'a> {
        let candidates: Vec<&'a InternshipOffer> = self
            .offers_for_internship(internship)
            .filter(|o| !excluded.contains(&o.organization_id) && !self.is_forbidden(o.organization_id))
            .collect();
        if let Some(offer) = self.rank_by_capacity(candidates, periods, places) {
            return OfferSelection::Matched(offer);
        }

        if let Some(alternate) = internship.alternate_speciality_id {
            let candidates: Vec<&'a InternshipOffer> = self
                .offers
                .iter()
                .copied()
                .filter(|o| o.speciality_id == alternate && !self.is_forbidden(o.organization_id))
                .collect();
            if let Some(offer) = self.rank_by_capacity(candidates, periods, places) {
                return OfferSelection::AlternateSpeciality(offer);
            }
        }

        OfferSelection::DefaultOrganization {
            organization_id: self.default_organization.id,
            speciality_id: internship.speciality_id.unwrap_or(default_speciality),
        }
    }

    /// The offer with the most seats left over `periods`, counting the
    /// tightest period of the block. Every period must have a seat. Ties go
    /// to the lowest organization reference, then the lowest offer id.
    fn rank_by_capacity(
        &self,
        offers: Vec<&'a InternshipOffer>,
        periods: &[PeriodId],
        places: &PlaceTable,
    ) -> Option<&'a InternshipOffer> {
        if periods.is_empty() {
            return None;
        }
        let offer_ids: Vec<_> = offers.iter().map(|o| o.id).collect();
        let open = PlaceTable::sorted_by_capacity_desc(PlaceTable::places_for_periods(
            periods,
            places.places_for_offers(&offer_ids),
        ));

        offers
            .into_iter()
            .filter_map(|offer| {
                let seats: Vec<u32> = periods
                    .iter()
                    .map(|period| {
                        open.iter()
                            .find(|r| r.offer_id == offer.id && r.period_id == *period)
                            .map_or(0, |r| r.number_places)
                    })
                    .collect();
                let tightest = seats.into_iter().min().unwrap_or(0);
                (tightest > 0).then_some((offer, tightest))
            })
            .min_by(|(a, seats_a), (b, seats_b)| {
                seats_b
                    .cmp(seats_a)
                    .then_with(|| self.reference_of(a).cmp(self.reference_of(b)))
                    .then(a.id.cmp(&b.id))
            })
            .map(|(offer, _)| offer)
    }

    fn reference_of(&self, offer: &InternshipOffer) -> &str {
        self.organizations
            .get(&offer.organization_id)
            .map_or("", |o| o.reference.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::PeriodPlaces;

    fn org(id: OrganizationId, reference: &str) -> Organization {
        Organization { id, reference: reference.to_string(), name: String::new() }
    }

    fn offer(id: u32, organization_id: OrganizationId, speciality_id: SpecialityId) -> InternshipOffer {
        InternshipOffer { id, organization_id, speciality_id, internship_id: None, maximum_enrollments: 10 }
    }

    fn internship(speciality: Option<SpecialityId>, alternate: Option<SpecialityId>) -> Internship {
        Internship {
            id: 1,
            name: "Surgery".to_string(),
            speciality_id: speciality,
            alternate_speciality_id: alternate,
            length_in_periods: 1,
        }
    }

    fn places(rows: &[(u32, u32, u32)]) -> PlaceTable {
        let rows: Vec<PeriodPlaces> = rows
            .iter()
            .map(|&(offer_id, period_id, number_places)| PeriodPlaces { offer_id, period_id, number_places })
            .collect();
        PlaceTable::new(&rows)
    }

    struct Fixture {
        organizations: Vec<Organization>,
        offers: Vec<InternshipOffer>,
    }

    impl Fixture {
        fn new() -> Self {
            Self {
                organizations: vec![org(1, "20"), org(2, "10"), org(3, "030"), org(9, "999")],
                offers: vec![offer(11, 1, 5), offer(12, 2, 5), offer(13, 3, 5), offer(14, 1, 6), offer(19, 9, 5)],
            }
        }

        fn catalogue(&self) -> OfferCatalogue<'_> {
            OfferCatalogue::new(&self.offers, &self.organizations, &self.organizations[3])
        }
    }

    #[test]
    fn picks_the_offer_with_most_places() {
        let fixture = Fixture::new();
        let catalogue = fixture.catalogue();
        let table = places(&[(11, 1, 2), (12, 1, 4), (13, 1, 9)]);
        let selection = catalogue.best_offer(&internship(Some(5), None), &HashSet::new(), &[1], &table, 0);
        // Offer 13 has more room but its organization is forbidden.
        assert_eq!(selection, OfferSelection::Matched(&fixture.offers[1]));
    }

    #[test]
    fn equal_capacity_goes_to_lowest_reference() {
        let fixture = Fixture::new();
        let catalogue = fixture.catalogue();
        let table = places(&[(11, 1, 3), (12, 1, 3)]);
        let selection = catalogue.best_offer(&internship(Some(5), None), &HashSet::new(), &[1], &table, 0);
        assert_eq!(selection.organization_id(), 2);
    }

    #[test]
    fn excluded_organizations_are_skipped() {
        let fixture = Fixture::new();
        let catalogue = fixture.catalogue();
        let table = places(&[(11, 1, 1), (12, 1, 4)]);
        let excluded: HashSet<_> = [2].into_iter().collect();
        let selection = catalogue.best_offer(&internship(Some(5), None), &excluded, &[1], &table, 0);
        assert_eq!(selection, OfferSelection::Matched(&fixture.offers[0]));
    }

    #[test]
    fn blocks_need_a_seat_in_every_period() {
        let fixture = Fixture::new();
        let catalogue = fixture.catalogue();
        let table = places(&[(11, 1, 5), (11, 2, 0), (12, 1, 1), (12, 2, 1)]);
        let selection = catalogue.best_offer(&internship(Some(5), None), &HashSet::new(), &[1, 2], &table, 0);
        assert_eq!(selection, OfferSelection::Matched(&fixture.offers[1]));
    }

    #[test]
    fn alternate_speciality_ignores_the_exclusion_list() {
        let fixture = Fixture::new();
        let catalogue = fixture.catalogue();
        let table = places(&[(11, 1, 0), (14, 1, 2)]);
        let excluded: HashSet<_> = [1, 2].into_iter().collect();
        let selection = catalogue.best_offer(&internship(Some(5), Some(6)), &excluded, &[1], &table, 0);
        assert_eq!(selection, OfferSelection::AlternateSpeciality(&fixture.offers[3]));
        assert_eq!(selection.fallback_tier(), Some(FallbackTier::AlternateSpeciality));
    }

    #[test]
    fn falls_through_to_the_default_organization() {
        let fixture = Fixture::new();
        let catalogue = fixture.catalogue();
        let table = places(&[(19, 1, 50)]);
        let selection = catalogue.best_offer(&internship(Some(5), None), &HashSet::new(), &[1], &table, 0);
        assert_eq!(
            selection,
            OfferSelection::DefaultOrganization { organization_id: 9, speciality_id: 5 }
        );

        let elective = catalogue.best_offer(&internship(None, None), &HashSet::new(), &[1], &table, 42);
        assert_eq!(elective.speciality_id(), 42);
    }

    #[test]
    fn offers_tied_to_another_internship_are_not_candidates() {
        let organizations = vec![org(1, "20"), org(9, "999")];
        let offers = vec![
            InternshipOffer { internship_id: Some(2), ..offer(21, 1, 5) },
            InternshipOffer { internship_id: Some(1), ..offer(22, 1, 5) },
        ];
        let catalogue = OfferCatalogue::new(&offers, &organizations, &organizations[1]);
        let table = places(&[(21, 1, 8), (22, 1, 1)]);

        let selection = catalogue.best_offer(&internship(Some(5), None), &HashSet::new(), &[1], &table, 0);
        assert_eq!(selection.offer_id(), Some(22));
        assert_eq!(catalogue.offers_for_choice(1, 5, 1), vec![&offers[1]]);
        assert_eq!(catalogue.offer_for(1, 5, 2).map(|o| o.id), Some(21));
        assert_eq!(catalogue.offer_for(1, 5, 3), None);
    }
}
