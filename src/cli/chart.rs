use ansi_term::Colour;
use anyhow::Result;
use clap::CommandFactory;

use crate::{
    aggregation::series::{ChartSeries, SeriesColor},
    calendar::{shift_window, AggregationWindow, Direction},
    storage::entities::{ActivityId, ParticipantId},
};

use super::{dates::DateArgs, Args, Context};

/// Participants that can be shown next to self.
pub const MAX_SELECTED_PARTICIPANTS: usize = 5;

const MAX_BAR_WIDTH: u64 = 40;

#[derive(Debug, clap::Args)]
pub struct ChartCommand {
    activity: ActivityId,
    #[arg(long, help = "Show the whole month instead of a week")]
    month: bool,
    #[command(flatten)]
    date: DateArgs,
    #[arg(
        long,
        default_value_t = 0,
        allow_hyphen_values = true,
        help = "Move the window by this many weeks or months. Negative values go back"
    )]
    shift: i32,
    #[arg(
        long = "with",
        short = 'w',
        help = "Participants to compare with. Can be used up to 5 times"
    )]
    with: Vec<ParticipantId>,
}

pub async fn process_chart_command(
    context: &Context,
    ChartCommand {
        activity,
        month,
        date,
        shift,
        with,
    }: ChartCommand,
) -> Result<()> {
    if with.len() > MAX_SELECTED_PARTICIPANTS {
        return Err(Args::command()
            .error(
                clap::error::ErrorKind::TooManyValues,
                format!("At most {MAX_SELECTED_PARTICIPANTS} participants can be selected"),
            )
            .into());
    }

    let date = date.resolve()?;
    let mut window = if month {
        AggregationWindow::month_of(date)
    } else {
        AggregationWindow::week_of(date)
    };
    let direction = if shift < 0 {
        Direction::Backward
    } else {
        Direction::Forward
    };
    for _ in 0..shift.unsigned_abs() {
        window = shift_window(window, direction)?;
    }

    let series = context
        .aggregator()
        .build_series(&activity, window, &with)
        .await?;

    println!("{activity}: {window}");
    print!("{}", render(&series));
    Ok(())
}

fn paint(color: SeriesColor, text: &str) -> String {
    Colour::RGB(color.r, color.g, color.b).paint(text).to_string()
}

/// Renders one row per day with a bar per participant, preceded by a legend with totals.
fn render(series: &ChartSeries) -> String {
    let mut output = String::new();
    for participant in series.participants() {
        output += &format!(
            "{} {}\t{} min\n",
            paint(participant.color(), "■"),
            participant.label(),
            participant.total()
        );
    }
    output.push('\n');

    if series.is_empty() {
        output += "No records in this period\n";
        return output;
    }

    let max = series
        .participants()
        .iter()
        .flat_map(|participant| participant.minutes().iter().copied())
        .max()
        .map(u64::from)
        .unwrap_or(0)
        .max(1);

    for (index, date) in series.dates().iter().enumerate() {
        let mut first = true;
        for participant in series.participants() {
            let minutes = participant.minutes().get(index).copied().unwrap_or(0);
            let width = (u64::from(minutes) * MAX_BAR_WIDTH).div_ceil(max);
            let day = if first {
                date.format("%a %d.%m").to_string()
            } else {
                String::new()
            };
            first = false;
            output += &format!(
                "{day:<10}{} {}\n",
                paint(participant.color(), &"█".repeat(width as usize)),
                minutes
            );
        }
    }
    output
}
