pub mod chart;
pub mod dates;
pub mod logs;
pub mod timer;

use std::{path::PathBuf, sync::Arc};

use anyhow::Result;
use chart::{process_chart_command, ChartCommand};
use chrono::Local;
use clap::{Parser, Subcommand};
use dates::DateArgs;
use tracing::level_filters::LevelFilter;

use crate::{
    aggregation::Aggregator,
    config::AppConfig,
    roster::ConfigRoster,
    storage::{
        entities::{ActivityId, RecordId},
        local_state::FileLocalState,
        log_store::JsonLogStore,
    },
    tracker::controller::TimerController,
    utils::{
        clock::DefaultClock,
        dir::create_application_default_path,
        logging::{enable_logging, CLI_PREFIX},
    },
};

#[derive(Parser, Debug)]
#[command(name = "Tempolog", version, long_about = None)]
#[command(about = "Time activities and compare daily minutes", long_about = None)]
struct Args {
    #[command(subcommand)]
    commands: Commands,
    #[arg(
        long,
        global = true,
        help = "Application directory. By default tries to save into $XDG_STATE_HOME or $HOME/.local/state"
    )]
    dir: Option<PathBuf>,
    #[arg(long, global = true, help = "Enable logging")]
    log: bool,
}

#[derive(Subcommand, Debug)]
enum Commands {
    #[command(about = "Start timing an activity. Only one activity can run at a time")]
    Start { activity: ActivityId },
    #[command(about = "Stop the timer and save its time split by day")]
    Stop { activity: ActivityId },
    #[command(about = "Show the running timer")]
    Status {
        #[arg(long, short, help = "Keep printing elapsed time every second")]
        follow: bool,
    },
    #[command(about = "Add minutes to a day by hand")]
    Add {
        activity: ActivityId,
        minutes: u32,
        #[command(flatten)]
        date: DateArgs,
    },
    #[command(about = "Delete a record")]
    Delete { id: RecordId },
    #[command(about = "List own records of a week")]
    Logs {
        activity: ActivityId,
        #[command(flatten)]
        date: DateArgs,
    },
    #[command(about = "Chart daily minutes of a week or a month")]
    Chart {
        #[command(flatten)]
        command: ChartCommand,
    },
}

/// Everything commands need, opened from the application directory.
pub struct Context {
    config: AppConfig,
    store: Arc<JsonLogStore>,
    state: Arc<FileLocalState>,
}

impl Context {
    fn open(dir: PathBuf) -> Result<Self> {
        Ok(Self {
            config: AppConfig::load(&dir)?,
            store: Arc::new(JsonLogStore::new(dir.join("records"))?),
            state: Arc::new(FileLocalState::new(dir.join("timers"))?),
        })
    }

    async fn controller(&self) -> Result<TimerController> {
        Ok(TimerController::restore(
            self.store.clone(),
            self.state.clone(),
            Arc::new(DefaultClock),
            Local,
        )
        .await?)
    }

    fn aggregator(&self) -> Aggregator {
        Aggregator::new(
            self.store.clone(),
            Arc::new(ConfigRoster::new(self.config.names.clone())),
            self.config.participant.clone(),
        )
    }
}

pub async fn run_cli() -> Result<()> {
    let args = Args::parse();

    let dir = args.dir.map_or_else(create_application_default_path, Ok)?;

    let logging_level = if args.log {
        Some(LevelFilter::TRACE)
    } else {
        None
    };
    enable_logging(CLI_PREFIX, &dir.join("logs"), logging_level, args.log)?;

    let context = Context::open(dir)?;

    match args.commands {
        Commands::Start { activity } => timer::start(&context, activity).await,
        Commands::Stop { activity } => timer::stop(&context, activity).await,
        Commands::Status { follow } => timer::status(&context, follow).await,
        Commands::Add {
            activity,
            minutes,
            date,
        } => logs::add(&context, activity, minutes, date).await,
        Commands::Delete { id } => logs::delete(&context, id).await,
        Commands::Logs { activity, date } => logs::list(&context, activity, date).await,
        Commands::Chart { command } => process_chart_command(&context, command).await,
    }
}
