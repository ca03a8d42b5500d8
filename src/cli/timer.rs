use anyhow::Result;
use tokio_stream::StreamExt;

use crate::{
    storage::entities::ActivityId,
    tracker::{controller::TimerController, TimerError},
    utils::time::format_elapsed,
};

use super::Context;

pub async fn start(context: &Context, activity: ActivityId) -> Result<()> {
    let controller = context.controller().await?;
    let session = controller
        .start(activity, context.config.participant.clone())
        .await?;
    println!(
        "Running {} since {}",
        session.activity,
        session.start.with_timezone(&chrono::Local).format("%x %H:%M:%S")
    );
    Ok(())
}

pub async fn stop(context: &Context, activity: ActivityId) -> Result<()> {
    let controller = context.controller().await?;
    match controller.stop(&activity).await {
        Ok(stopped) => {
            for record in &stopped.records {
                println!("{}\t{} min\t{}", record.date, record.minutes, record.id);
            }
            println!(
                "Stopped {} after {}",
                activity,
                format_elapsed(stopped.end - stopped.session.start)
            );
            Ok(())
        }
        Err(TimerError::PartialAppend { appended, failures }) => {
            for record in &appended {
                println!("{}\t{} min\t{}", record.date, record.minutes, record.id);
            }
            Err(TimerError::PartialAppend { appended, failures }.into())
        }
        Err(e) => Err(e.into()),
    }
}

pub async fn status(context: &Context, follow: bool) -> Result<()> {
    let controller: TimerController = context.controller().await?;
    let (Some(session), Some(elapsed)) = (controller.running(), controller.tick()) else {
        println!("No timer is running");
        return Ok(());
    };

    if !follow {
        println!("{}\t{}", session.activity, format_elapsed(elapsed));
        return Ok(());
    }

    let Some(mut ticks) = controller.ticks() else {
        return Ok(());
    };
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => return Ok(()),
            tick = ticks.next() => match tick {
                Some(elapsed) => println!("{}\t{}", session.activity, format_elapsed(elapsed)),
                None => return Ok(()),
            },
        }
    }
}
