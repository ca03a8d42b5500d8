use std::fmt::Display;

use chrono::NaiveDate;

use crate::storage::entities::ParticipantId;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SeriesColor {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl SeriesColor {
    const fn rgb(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b }
    }
}

impl Display for SeriesColor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{:02x}{:02x}{:02x}", self.r, self.g, self.b)
    }
}

pub const PALETTE: [SeriesColor; 7] = [
    SeriesColor::rgb(0x88, 0x84, 0xd8),
    SeriesColor::rgb(0x82, 0xca, 0x9d),
    SeriesColor::rgb(0xff, 0xc6, 0x58),
    SeriesColor::rgb(0xff, 0x80, 0x42),
    SeriesColor::rgb(0xa4, 0xde, 0x6c),
    SeriesColor::rgb(0xd0, 0xed, 0x57),
    SeriesColor::rgb(0x8d, 0xd1, 0xe1),
];

/// Color of the participant at `position` in the assignment order. The same order always gives
/// the same colors.
pub fn color_at(position: usize) -> SeriesColor {
    PALETTE[position % PALETTE.len()]
}

/// Daily minutes of one participant.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParticipantSeries {
    participant: ParticipantId,
    label: String,
    color: SeriesColor,
    /// Aligned with [ChartSeries::dates].
    minutes: Vec<u32>,
}

impl ParticipantSeries {
    pub fn participant(&self) -> &ParticipantId {
        &self.participant
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn color(&self) -> SeriesColor {
        self.color
    }

    /// One value per date of the series it belongs to.
    pub fn minutes(&self) -> &[u32] {
        &self.minutes
    }

    pub fn total(&self) -> u64 {
        self.minutes.iter().map(|m| u64::from(*m)).sum()
    }
}

/// Dense, zero-filled minutes per participant per day of a window.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChartSeries {
    dates: Vec<NaiveDate>,
    participants: Vec<ParticipantSeries>,
}

impl ChartSeries {
    /// Empty series over `dates`, which must be ascending.
    pub fn new(dates: Vec<NaiveDate>) -> Self {
        Self {
            dates,
            participants: vec![],
        }
    }

    /// Adds a participant whose minutes are looked up with `minutes_on` for every date, so
    /// they always line up with [ChartSeries::dates].
    pub fn push(
        &mut self,
        participant: ParticipantId,
        label: String,
        color: SeriesColor,
        minutes_on: impl FnMut(NaiveDate) -> u32,
    ) {
        let minutes = self.dates.iter().copied().map(minutes_on).collect();
        self.participants.push(ParticipantSeries {
            participant,
            label,
            color,
            minutes,
        });
    }

    pub fn dates(&self) -> &[NaiveDate] {
        &self.dates
    }

    /// Participants in assignment order.
    pub fn participants(&self) -> &[ParticipantSeries] {
        &self.participants
    }

    fn series_of(&self, participant: &ParticipantId) -> Option<&ParticipantSeries> {
        self.participants
            .iter()
            .find(|series| series.participant == *participant)
    }

    /// Minutes of `participant` on `date`. None if either isn't part of the series.
    pub fn minutes(&self, participant: &ParticipantId, date: NaiveDate) -> Option<u32> {
        let index = self.dates.binary_search(&date).ok()?;
        self.series_of(participant)?.minutes.get(index).copied()
    }

    pub fn color_of(&self, participant: &ParticipantId) -> Option<SeriesColor> {
        self.series_of(participant).map(|series| series.color)
    }

    pub fn total(&self, participant: &ParticipantId) -> Option<u64> {
        self.series_of(participant).map(ParticipantSeries::total)
    }

    pub fn is_empty(&self) -> bool {
        self.participants
            .iter()
            .all(|series| series.minutes.iter().all(|m| *m == 0))
    }
}
