mod display;

use std::path::PathBuf;
use std::sync::Arc;
use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use common::{
    AspectRatio, CredentialStore, FastMode, GenerationInput, HistoryStore, JobId, Model,
    PersistentStore, Resolution,
};
use engine::{
    Config, Dashboard, HttpGenerationApi, PollError, SqliteStore, StatusEngine, Tick,
    TokioScheduler,
};
use tokio::sync::mpsc::{self, UnboundedReceiver};

type Dash = Dashboard<HttpGenerationApi, TokioScheduler>;

#[derive(Parser)]
#[command(author, version, about = "Generate videos from text prompts", long_about = None)]
struct Cli {
    /// Config file (.yaml, .yml or .toml)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,
    /// Log at debug level
    #[arg(short, long, global = true)]
    verbose: bool,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Manage the API key
    Key {
        #[command(subcommand)]
        action: KeyAction,
    },
    /// Submit a new generation
    Generate(GenerateArgs),
    /// Poll a job until it completes or fails
    Watch {
        /// Job to watch; defaults to the newest
        id: Option<String>,
    },
    /// Check a job once
    Refresh {
        id: String,
    },
    /// List past jobs
    History {
        #[arg(short, long, default_value_t = 20)]
        limit: usize,
    },
    /// Show job details
    Show {
        id: String,
    },
    /// Submit a past job's request again
    Replay {
        id: String,
        #[arg(long)]
        no_wait: bool,
    },
    /// Save a finished video to disk
    Download {
        id: String,
        /// Output file, defaults to <ID>.mp4
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Remove a job from history
    Delete {
        id: String,
    },
    /// Remove all jobs from history
    Clear,
    /// Write history to a CSV file
    Export {
        file: PathBuf,
    },
    /// List the available LoRA presets
    Loras,
}

#[derive(Subcommand)]
enum KeyAction {
    /// Store a new API key
    Set { key: String },
    /// Show the stored key, masked
    Show,
    /// Remove the stored key
    Clear,
}

#[derive(Args)]
struct GenerateArgs {
    prompt: String,
    #[arg(long)]
    negative: Option<String>,
    /// 1.3b or 14b
    #[arg(long)]
    model: Option<Model>,
    /// 480p, 720p or 1080p
    #[arg(long)]
    resolution: Option<Resolution>,
    /// 16:9, 1:1 or 9:16
    #[arg(long)]
    aspect_ratio: Option<AspectRatio>,
    /// 17, 33, 49, 65 or 81
    #[arg(long)]
    frames: Option<u32>,
    /// LoRA URL, or `none`
    #[arg(long)]
    lora: Option<String>,
    #[arg(long)]
    seed: Option<u64>,
    #[arg(long)]
    steps: Option<u32>,
    #[arg(long)]
    guide_scale: Option<f64>,
    #[arg(long)]
    shift: Option<f64>,
    /// Off, Balanced or Fast
    #[arg(long)]
    fast_mode: Option<FastMode>,
    /// Return after submitting instead of watching the job
    #[arg(long)]
    no_wait: bool,
}

impl GenerateArgs {
    fn into_input(self) -> GenerationInput {
        let mut input = GenerationInput::new(self.prompt);
        if let Some(negative) = self.negative {
            input.negative_prompt = negative;
        }
        if let Some(model) = self.model {
            input.model = model;
        }
        if let Some(resolution) = self.resolution {
            input.resolution = resolution;
        }
        if let Some(aspect_ratio) = self.aspect_ratio {
            input.aspect_ratio = aspect_ratio;
        }
        if let Some(frames) = self.frames {
            input.frames = frames;
        }
        if let Some(ref lora) = self.lora {
            input.set_lora(lora);
        }
        if self.seed.is_some() {
            input.seed = self.seed;
        }
        if let Some(steps) = self.steps {
            input.sample_steps = steps;
        }
        if let Some(guide_scale) = self.guide_scale {
            input.sample_guide_scale = guide_scale;
        }
        if let Some(shift) = self.shift {
            input.sample_shift = shift;
        }
        if let Some(fast_mode) = self.fast_mode {
            input.fast_mode = fast_mode;
        }
        input
    }
}

struct App {
    config: Config,
    store: Arc<dyn PersistentStore>,
}

impl App {
    fn open(config: Config) -> Result<Self> {
        let store = SqliteStore::open(&config.storage.db_path)
            .with_context(|| format!("Failed to open database {:?}", config.storage.db_path))?;
        log::debug!("Using database {:?}", config.storage.db_path);
        Ok(Self { config, store: Arc::new(store) })
    }

    fn credentials(&self) -> CredentialStore {
        CredentialStore::new(self.store.clone())
    }

    fn dashboard(&self) -> Result<(Dash, UnboundedReceiver<Tick>)> {
        let api = HttpGenerationApi::new(
            &self.config.api.base_url,
            self.credentials(),
            self.config.api.timeout(),
        )?;
        let (tx, rx) = mpsc::unbounded_channel();
        let engine = StatusEngine::new(api, TokioScheduler::new(tx), self.config.polling.options());
        let history = HistoryStore::new(self.store.clone());
        Ok((Dashboard::new(history, engine), rx))
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = Config::load(cli.config.as_deref())?;
    engine::logging::setup_logging(&config.logging, cli.verbose)?;
    let app = App::open(config)?;

    match cli.command {
        Commands::Key { action } => {
            let credentials = app.credentials();
            match action {
                KeyAction::Set { key } => {
                    credentials.set(&key)?;
                    println!("API key saved ({})", credentials.masked().unwrap_or_default());
                }
                KeyAction::Show => match credentials.masked() {
                    Some(masked) => println!("{}", masked),
                    None => println!("No API key set. Use `vidgen key set <KEY>`."),
                },
                KeyAction::Clear => {
                    credentials.clear()?;
                    println!("API key removed");
                }
            }
        }
        Commands::Generate(args) => {
            let no_wait = args.no_wait;
            let (mut dash, mut ticks) = app.dashboard()?;
            submit(&mut dash, &mut ticks, args.into_input(), no_wait).await?;
        }
        Commands::Watch { id } => {
            let (mut dash, mut ticks) = app.dashboard()?;
            match id {
                Some(id) => {
                    dash.select(&JobId(id)).await?;
                }
                None => {
                    if dash.select_latest().await?.is_none() {
                        println!("No jobs in history");
                        return Ok(());
                    }
                }
            }
            watch(&mut dash, &mut ticks).await?;
        }
        Commands::Refresh { id } => {
            let (mut dash, _ticks) = app.dashboard()?;
            let id = JobId(id);
            let event = dash.select(&id).await?;
            if let Some(err) = surfaced_error(&dash) {
                return Err(err.into());
            }
            match event {
                Some(ref event) => println!("{}", display::describe_event(event)),
                None => report_session(&dash),
            }
        }
        Commands::History { limit } => {
            let records = HistoryStore::new(app.store.clone()).recent(limit);
            if records.is_empty() {
                println!("No jobs in history");
            } else {
                println!("{}", display::history_table(&records));
            }
        }
        Commands::Show { id } => {
            let history = HistoryStore::new(app.store.clone());
            match history.get(&JobId(id.clone())) {
                Some(record) => display::print_record(&record),
                None => bail!("Job {} not found in history", id),
            }
        }
        Commands::Replay { id, no_wait } => {
            let (mut dash, mut ticks) = app.dashboard()?;
            let input = dash.replay(&JobId(id))?;
            submit(&mut dash, &mut ticks, input, no_wait).await?;
        }
        Commands::Download { id, output } => {
            let (dash, _ticks) = app.dashboard()?;
            let record = dash
                .history()
                .get(&JobId(id.clone()))
                .with_context(|| format!("Job {} not found in history", id))?;
            let Some(url) = record.video_url else {
                bail!("Job {} has no video yet ({})", id, record.status);
            };
            let output = output.unwrap_or_else(|| PathBuf::from(format!("{}.mp4", id)));
            let bytes = dash.api().download(&url, &output).await?;
            println!("Saved {} ({} bytes)", output.display(), bytes);
        }
        Commands::Delete { id } => {
            let (mut dash, _ticks) = app.dashboard()?;
            if dash.delete(&JobId(id.clone()))? {
                println!("Deleted {}", id);
            } else {
                bail!("Job {} not found in history", id);
            }
        }
        Commands::Clear => {
            let (mut dash, _ticks) = app.dashboard()?;
            dash.clear_history()?;
            println!("History cleared");
        }
        Commands::Export { file } => {
            let records = HistoryStore::new(app.store.clone()).list();
            let mut writer = csv::Writer::from_path(&file)
                .with_context(|| format!("Failed to create {}", file.display()))?;
            for record in &records {
                writer.serialize(display::ExportRow::from(record))?;
            }
            writer.flush()?;
            println!("Exported {} jobs to {}", records.len(), file.display());
        }
        Commands::Loras => {
            println!("{}", display::lora_table());
        }
    }

    Ok(())
}

async fn submit(
    dash: &mut Dash,
    ticks: &mut UnboundedReceiver<Tick>,
    input: GenerationInput,
    no_wait: bool,
) -> Result<()> {
    let record = dash.submit(input).await?;
    println!("Submitted job {}", record.id);
    if no_wait {
        println!("Run `vidgen watch {}` to follow it", record.id);
        return Ok(());
    }
    watch(dash, ticks).await
}

/// Follows the selected job until it settles or the user interrupts.
async fn watch(dash: &mut Dash, ticks: &mut UnboundedReceiver<Tick>) -> Result<()> {
    if let Some(err) = surfaced_error(dash) {
        return Err(err.into());
    }
    report_session(dash);

    while !dash.is_settled() {
        tokio::select! {
            event = dash.next_event(ticks) => {
                match event? {
                    Some(event) => println!("{}", display::describe_event(&event)),
                    None => {
                        if let Some(err) = dash.session().and_then(|s| s.last_error.as_ref()) {
                            eprintln!("Check failed, retrying: {}", err);
                        }
                    }
                }
            }
            _ = tokio::signal::ctrl_c() => {
                println!("Stopped watching; the job keeps running remotely");
                return Ok(());
            }
        }
    }

    if let Some(record) = dash.selected() {
        if let Some(cost) = record.estimated_cost() {
            println!("Estimated cost: {}", display::format_cost(cost));
        }
    }
    Ok(())
}

/// A credential or rejection error from the last check, which retrying will not fix.
fn surfaced_error(dash: &Dash) -> Option<common::ApiError> {
    match dash.session()?.last_error.as_ref()? {
        PollError::Api(err) if err.is_user_facing() => Some(err.clone()),
        _ => None,
    }
}

fn report_session(dash: &Dash) {
    let Some(session) = dash.session() else {
        return;
    };
    match session.video_url {
        Some(ref url) => println!("Job {} is {}: {}", session.job_id, session.status, url),
        None => println!("Job {} is {} ({}%)", session.job_id, session.status, session.progress),
    }
}
