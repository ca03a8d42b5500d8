//! Turns stored records into chart-ready series.

pub mod series;

use std::{collections::HashMap, sync::Arc};

use chrono::NaiveDate;
use series::{color_at, ChartSeries};
use tracing::{debug, instrument};

use crate::{
    calendar::AggregationWindow,
    roster::Roster,
    storage::{
        entities::{ActivityId, DurationRecord, ParticipantId},
        log_store::LogStore,
        StoreError,
    },
};

pub struct Aggregator {
    store: Arc<dyn LogStore>,
    roster: Arc<dyn Roster>,
    /// Participant viewing the data. Always part of a series and always first.
    me: ParticipantId,
}

impl Aggregator {
    pub fn new(store: Arc<dyn LogStore>, roster: Arc<dyn Roster>, me: ParticipantId) -> Self {
        Self { store, roster, me }
    }

    /// Order in which participants are shown and colored: self first, then `participants` in
    /// the given order. Repeated ids keep their first position.
    fn assignment_order(&self, participants: &[ParticipantId]) -> Vec<ParticipantId> {
        let mut order: Vec<ParticipantId> = Vec::with_capacity(participants.len() + 1);
        for participant in std::iter::once(&self.me).chain(participants) {
            if !order.contains(participant) {
                order.push(participant.clone());
            }
        }
        order
    }

    /// Builds minutes per day of `activity` for self and `participants` over `window`. Every
    /// day of the window is present, days without records are 0. Records of the same
    /// participant and day are summed.
    #[instrument(skip(self))]
    pub async fn build_series(
        &self,
        activity: &ActivityId,
        window: AggregationWindow,
        participants: &[ParticipantId],
    ) -> Result<ChartSeries, StoreError> {
        let records = self
            .store
            .query_range(activity, window.start_date(), window.end_date())
            .await?;
        debug!("Aggregating {} records", records.len());

        let order = self.assignment_order(participants);
        let mut sums = HashMap::<(NaiveDate, &ParticipantId), u32>::new();
        for record in &records {
            if !window.contains(record.date) || !order.contains(&record.participant) {
                continue;
            }
            let sum = sums.entry((record.date, &record.participant)).or_default();
            *sum = sum.saturating_add(record.minutes);
        }

        let mut series = ChartSeries::new(window.dates());
        for (position, participant) in order.iter().enumerate() {
            series.push(
                participant.clone(),
                self.roster.display_name(participant),
                color_at(position),
                |date| sums.get(&(date, participant)).copied().unwrap_or(0),
            );
        }
        Ok(series)
    }

    /// Records of `participant` over `window`, ordered by date.
    pub async fn records_for(
        &self,
        activity: &ActivityId,
        participant: &ParticipantId,
        window: AggregationWindow,
    ) -> Result<Vec<DurationRecord>, StoreError> {
        let mut records: Vec<_> = self
            .store
            .query_range(activity, window.start_date(), window.end_date())
            .await?
            .into_iter()
            .filter(|record| record.participant == *participant)
            .collect();
        records.sort_by_key(|record| record.date);
        Ok(records)
    }
}
