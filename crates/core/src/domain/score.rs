use serde::{Deserialize, Serialize};

/// Band a scored lead falls into. Bands partition the 0-100 range; a
/// lead's final score is always clamped inside its band so downstream
/// routing can branch on score alone.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScoreBand {
    Emergency,
    BookedComplete,
    PartialNoBooking,
    OutOfArea,
    NoContact,
}

impl ScoreBand {
    pub fn floor(&self) -> u8 {
        match self {
            Self::Emergency => 85,
            Self::BookedComplete => 70,
            Self::PartialNoBooking => 40,
            Self::OutOfArea => 20,
            Self::NoContact => 0,
        }
    }

    pub fn ceiling(&self) -> u8 {
        match self {
            Self::Emergency => 100,
            Self::BookedComplete => 85,
            Self::PartialNoBooking => 60,
            Self::OutOfArea => 40,
            Self::NoContact => 20,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Emergency => "emergency",
            Self::BookedComplete => "booked_complete",
            Self::PartialNoBooking => "partial_no_booking",
            Self::OutOfArea => "out_of_area",
            Self::NoContact => "no_contact",
        }
    }
}

/// Inputs that contributed to a score, kept for the audit trail.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScoreBreakdown {
    pub band: ScoreBand,
    pub urgency_points: u8,
    pub booking_points: u8,
    pub completeness_points: u8,
    pub service_area_points: u8,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LeadScore {
    pub value: u8,
    pub breakdown: ScoreBreakdown,
}

#[cfg(test)]
mod tests {
    use super::ScoreBand;

    #[test]
    fn bands_cover_the_full_range_without_gaps() {
        assert_eq!(ScoreBand::NoContact.floor(), 0);
        assert_eq!(ScoreBand::NoContact.ceiling(), ScoreBand::OutOfArea.floor());
        assert_eq!(ScoreBand::OutOfArea.ceiling(), ScoreBand::PartialNoBooking.floor());
        assert_eq!(ScoreBand::PartialNoBooking.ceiling(), 60);
        assert_eq!(ScoreBand::BookedComplete.ceiling(), ScoreBand::Emergency.floor());
        assert_eq!(ScoreBand::Emergency.ceiling(), 100);
    }
}
