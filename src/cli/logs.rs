use anyhow::Result;

use crate::{
    calendar::AggregationWindow,
    storage::{
        entities::{ActivityId, DurationRecord, RecordId},
        log_store::LogStore,
    },
};

use super::{dates::DateArgs, Context};

pub async fn add(
    context: &Context,
    activity: ActivityId,
    minutes: u32,
    date: DateArgs,
) -> Result<()> {
    let record = DurationRecord::new(
        activity,
        context.config.participant.clone(),
        date.resolve()?,
        minutes,
    );
    context.store.append(record.clone()).await?;
    println!("{}\t{} min\t{}", record.date, record.minutes, record.id);
    Ok(())
}

pub async fn delete(context: &Context, id: RecordId) -> Result<()> {
    context.store.delete(&id).await?;
    println!("Deleted {id}");
    Ok(())
}

/// Lists own records of the week containing the given date.
pub async fn list(context: &Context, activity: ActivityId, date: DateArgs) -> Result<()> {
    let window = AggregationWindow::week_of(date.resolve()?);
    let records = context
        .aggregator()
        .records_for(&activity, &context.config.participant, window)
        .await?;

    if records.is_empty() {
        println!("No records for {window}");
        return Ok(());
    }
    for record in records {
        println!("{}\t{} min\t{}", record.date, record.minutes, record.id);
    }
    Ok(())
}
