//! Deterministic lead scoring.
//!
//! Scoring is a pure function of the attempt's facts: same inputs, same
//! score. Band selection picks the 0-100 range; weighted factors place the
//! lead within it and the result is clamped so it never escapes the band.

use crate::domain::contact::ContactProfile;
use crate::domain::outcome::BookingResult;
use crate::domain::score::{LeadScore, ScoreBand, ScoreBreakdown};

const URGENCY_POINTS: u8 = 15;
const BOOKING_POINTS: u8 = 15;
const SERVICE_AREA_POINTS: u8 = 10;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ScoreInput {
    pub urgency_signal: bool,
    pub booking_result: BookingResult,
    pub completeness_points: u8,
    pub in_service_area: bool,
    pub contact_established: bool,
}

pub fn score_lead(input: &ScoreInput) -> LeadScore {
    let band = select_band(input);

    let urgency_points = if input.urgency_signal { URGENCY_POINTS } else { 0 };
    let booking_points = match input.booking_result {
        BookingResult::Booked | BookingResult::Transferred => BOOKING_POINTS,
        BookingResult::NotBooked => 0,
    };
    let service_area_points = if input.in_service_area { SERVICE_AREA_POINTS } else { 0 };
    let completeness_points = input.completeness_points.min(10);

    let raw = u16::from(band.floor())
        + u16::from(urgency_points)
        + u16::from(booking_points)
        + u16::from(completeness_points)
        + u16::from(service_area_points);
    let value = raw.clamp(u16::from(band.floor()), u16::from(band.ceiling())) as u8;

    LeadScore {
        value,
        breakdown: ScoreBreakdown {
            band,
            urgency_points,
            booking_points,
            completeness_points,
            service_area_points,
        },
    }
}

fn select_band(input: &ScoreInput) -> ScoreBand {
    if input.urgency_signal {
        return ScoreBand::Emergency;
    }
    if !input.contact_established {
        return ScoreBand::NoContact;
    }
    if !input.in_service_area {
        return ScoreBand::OutOfArea;
    }
    match input.booking_result {
        BookingResult::Booked | BookingResult::Transferred => ScoreBand::BookedComplete,
        BookingResult::NotBooked => ScoreBand::PartialNoBooking,
    }
}

/// Maps the count of filled core contact fields to 0-10 points.
pub fn completeness_points(profile: &ContactProfile) -> u8 {
    match profile.filled_core_fields() {
        0 => 0,
        1 => 2,
        2 => 5,
        3 => 7,
        _ => 10,
    }
}

/// Service-area membership by exact zip or case-insensitive city substring.
pub fn is_in_service_area(
    zip_codes: &[String],
    cities: &[String],
    zip: Option<&str>,
    city: Option<&str>,
) -> bool {
    if let Some(zip) = zip {
        let zip = zip.trim();
        if !zip.is_empty() && zip_codes.iter().any(|known| known == zip) {
            return true;
        }
    }
    if let Some(city) = city {
        let city = city.trim().to_ascii_lowercase();
        if !city.is_empty()
            && cities.iter().any(|known| city.contains(&known.trim().to_ascii_lowercase()))
        {
            return true;
        }
    }
    false
}

#[cfg(test)]
mod tests {
    use crate::domain::contact::ContactProfile;
    use crate::domain::outcome::BookingResult;
    use crate::domain::score::ScoreBand;
    use crate::scoring::{
        completeness_points, is_in_service_area, score_lead, ScoreInput,
    };

    fn base_input() -> ScoreInput {
        ScoreInput {
            urgency_signal: false,
            booking_result: BookingResult::NotBooked,
            completeness_points: 0,
            in_service_area: true,
            contact_established: true,
        }
    }

    #[test]
    fn urgency_dominates_band_selection() {
        let score = score_lead(&ScoreInput {
            urgency_signal: true,
            booking_result: BookingResult::Booked,
            completeness_points: 10,
            ..base_input()
        });
        assert_eq!(score.breakdown.band, ScoreBand::Emergency);
        assert!((85..=100).contains(&score.value));
    }

    #[test]
    fn booked_full_profile_scores_in_the_booked_band() {
        let score = score_lead(&ScoreInput {
            booking_result: BookingResult::Booked,
            completeness_points: 10,
            ..base_input()
        });
        assert_eq!(score.breakdown.band, ScoreBand::BookedComplete);
        assert!((70..=85).contains(&score.value));
    }

    #[test]
    fn transferred_calls_count_as_booked() {
        let score = score_lead(&ScoreInput {
            booking_result: BookingResult::Transferred,
            ..base_input()
        });
        assert_eq!(score.breakdown.band, ScoreBand::BookedComplete);
    }

    #[test]
    fn no_contact_and_out_of_area_bands_apply_in_order() {
        let unreached = score_lead(&ScoreInput { contact_established: false, ..base_input() });
        assert_eq!(unreached.breakdown.band, ScoreBand::NoContact);
        assert!(unreached.value <= 20);

        let out_of_area = score_lead(&ScoreInput { in_service_area: false, ..base_input() });
        assert_eq!(out_of_area.breakdown.band, ScoreBand::OutOfArea);
        assert!((20..=40).contains(&out_of_area.value));
    }

    #[test]
    fn score_never_escapes_its_band() {
        // Max factors in the no-contact band would overflow the ceiling.
        let score = score_lead(&ScoreInput {
            booking_result: BookingResult::Booked,
            completeness_points: 10,
            contact_established: false,
            ..base_input()
        });
        assert_eq!(score.breakdown.band, ScoreBand::NoContact);
        assert_eq!(score.value, 20);
    }

    #[test]
    fn scoring_is_deterministic() {
        let input = ScoreInput {
            booking_result: BookingResult::Booked,
            completeness_points: 7,
            ..base_input()
        };
        assert_eq!(score_lead(&input), score_lead(&input));
    }

    #[test]
    fn completeness_points_scale_with_filled_fields() {
        let empty = ContactProfile::default();
        assert_eq!(completeness_points(&empty), 0);

        let full = ContactProfile {
            first_name: Some("Ada".to_string()),
            phone: Some("+15035550100".to_string()),
            email: Some("ada@example.com".to_string()),
            address: Some("1 Main St".to_string()),
            ..ContactProfile::default()
        };
        assert_eq!(completeness_points(&full), 10);
    }

    #[test]
    fn service_area_matches_zip_exactly_and_city_by_substring() {
        let zips = vec!["97201".to_string(), "97202".to_string()];
        let cities = vec!["Portland".to_string()];

        assert!(is_in_service_area(&zips, &cities, Some("97201"), None));
        assert!(!is_in_service_area(&zips, &cities, Some("97299"), None));
        assert!(is_in_service_area(&zips, &cities, None, Some("portland, or")));
        assert!(!is_in_service_area(&zips, &cities, None, Some("Salem")));
        assert!(!is_in_service_area(&zips, &cities, None, None));
    }
}
