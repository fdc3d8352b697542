//! DebateFlow CLI - Debate Judging Tool
//!
//! A terminal transport for judging generated debates: listen to (or read)
//! each debate, then score it dimension by dimension.

use clap::{Parser, Subcommand};
use colored::Colorize;
use debateflow_core::config::{self, Config};
use debateflow_core::pairing::pair;
use debateflow_core::persistence::FileAnnotationStore;
use debateflow_core::store::{DebateStore, FileDebateStore};
use debateflow_core::{
    AnnotatorId, AudioPreparer, Command, Credentials, Flow, JudgingError, JudgingService,
    JudgingSession, Prompt, PromptKind, SessionState,
};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader, Lines, Stdin};
use tracing::debug;

const DEFAULT_CONFIG_PATH: &str = "debateflow.toml";

type Input = Lines<BufReader<Stdin>>;

#[derive(Parser)]
#[command(
    name = "debateflow",
    version,
    about = "DebateFlow - Judge generated debates",
    long_about = "A CLI tool for scoring generated debates on a five-dimension rubric, with the debate read aloud in two voices."
)]
struct Cli {
    /// Configuration file (defaults to ./debateflow.toml, then built-in defaults)
    #[arg(short, long, global = true, value_name = "PATH")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Judge debates interactively
    Judge {
        /// Your annotator name (1-20 letters, digits or '-')
        #[arg(short, long, value_name = "NAME")]
        annotator: String,

        /// Judge from transcripts without synthesizing audio
        #[arg(long)]
        no_audio: bool,

        /// Judge only these debates, in order
        #[arg(long, num_args = 1.., value_name = "DEBATE_ID")]
        batch: Vec<String>,
    },
    /// Show how many debates an annotator has judged
    Status {
        #[arg(short, long, value_name = "NAME")]
        annotator: String,
    },
    /// Show the voices assigned to a debate
    Pair {
        #[arg(value_name = "DEBATE_ID")]
        debate_id: String,
    },
    /// Synthesize and stitch a debate's audio
    Audio {
        #[arg(value_name = "DEBATE_ID")]
        debate_id: String,
    },
}

enum Step {
    Next,
    Stop,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Load environment variables from .env file if present
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "warn".into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    if let Err(e) = run(cli).await {
        eprintln!("{} {}", "Error:".red().bold(), e);
        std::process::exit(1);
    }
    Ok(())
}

async fn run(cli: Cli) -> Result<(), JudgingError> {
    let config = load_config(cli.config.as_deref())?;

    match cli.command {
        Commands::Judge {
            annotator,
            no_audio,
            batch,
        } => judge(&config, &annotator, no_audio, batch).await,
        Commands::Status { annotator } => status(&config, &annotator),
        Commands::Pair { debate_id } => {
            show_pairing(&config, &debate_id);
            Ok(())
        }
        Commands::Audio { debate_id } => render_audio(&config, &debate_id).await,
    }
}

fn load_config(path: Option<&Path>) -> Result<Config, JudgingError> {
    let path = path.or_else(|| {
        let default = Path::new(DEFAULT_CONFIG_PATH);
        default.is_file().then_some(default)
    });
    match path {
        Some(path) => {
            debug!(path = %path.display(), "Loading configuration");
            Config::load(path)
        }
        None => {
            debug!("Using built-in configuration");
            Ok(config::default_config())
        }
    }
}

async fn judge(
    config: &Config,
    name: &str,
    no_audio: bool,
    batch: Vec<String>,
) -> Result<(), JudgingError> {
    let annotator = AnnotatorId::new(name)?;
    let mut service = JudgingService::from_config(config);

    if !no_audio {
        let credentials = Credentials::from_env(&config.providers);
        match AudioPreparer::from_config(config, &credentials) {
            Ok(preparer) => service = service.with_audio(preparer),
            Err(e) => warn_line(&format!("{e}. Judging from transcripts.")),
        }
    }
    let batch_mode = !batch.is_empty();

    println!();
    println!("{}", "═".repeat(70).bright_blue());
    println!(
        "{}",
        format!("  {} - judging as {}", "DebateFlow".bold(), annotator)
            .bright_blue()
            .bold()
    );
    println!("{}", "═".repeat(70).bright_blue());
    println!(
        "{}",
        "  Type a number to choose, 'q' to stop (progress is kept), 'cancel' to drop this debate."
            .dimmed()
    );

    let opened = match service.resume(&annotator)? {
        Some(session) => {
            println!();
            println!(
                "{} debate #{}",
                "Resuming".bright_green().bold(),
                session.debate().id()
            );
            Ok(session)
        }
        None if batch_mode => service.start_batch(&annotator, batch),
        None => service.select_next_debate(&annotator),
    };
    let mut session = match opened {
        Ok(session) => session,
        Err(JudgingError::NoDebatesRemaining { .. }) => {
            println!("{}", "All debates have been annotated!".bright_green().bold());
            return Ok(());
        }
        Err(e) => return Err(e),
    };

    let mut input = BufReader::new(tokio::io::stdin()).lines();

    loop {
        match run_session(&service, &mut session, &mut input).await? {
            Step::Stop => break,
            Step::Next => {
                if batch_mode && session.queue().is_empty() {
                    println!("{}", "Batch complete.".bright_green().bold());
                    break;
                }
                session = match service.next_debate(session) {
                    Ok(next) => next,
                    Err(JudgingError::NoDebatesRemaining { .. }) => {
                        println!("{}", "All debates have been annotated!".bright_green().bold());
                        break;
                    }
                    Err(e) => return Err(e),
                };
            }
        }
    }

    println!();
    Ok(())
}

/// Drive one session until the annotator moves on or stops.
async fn run_session(
    service: &JudgingService,
    session: &mut JudgingSession,
    input: &mut Input,
) -> Result<Step, JudgingError> {
    match session.state() {
        SessionState::AudioPending => present_debate(service, session).await?,
        state if !state.is_terminal() => recap_debate(service, session)?,
        _ => {}
    }

    loop {
        let prompt = session.prompt();
        render(&prompt);
        if prompt.kind == PromptKind::Abandoned {
            return Ok(Step::Stop);
        }

        let Some(line) = input.next_line().await? else {
            return Ok(Step::Stop);
        };
        let line = line.trim();

        if line.eq_ignore_ascii_case("q") || line.eq_ignore_ascii_case("quit") {
            println!("{}", "Stopped. Run judge again to pick up where you left off.".dimmed());
            return Ok(Step::Stop);
        }
        if line.eq_ignore_ascii_case("cancel") {
            service.cancel(session)?;
            continue;
        }

        let result = match choose(&prompt, line) {
            Some(data) => Command::parse(&data).and_then(|c| service.handle_command(session, c)),
            None if prompt.accepts_text => service.justify(session, line).map(|_| Flow::Continue),
            None => {
                error_line(&format!("Choose 1-{}.", prompt.buttons.len()));
                continue;
            }
        };

        match result {
            Ok(Flow::Continue) => {}
            Ok(Flow::NextDebate) => return Ok(Step::Next),
            Ok(Flow::Finish) => return Ok(Step::Stop),
            Err(e @ JudgingError::PersistenceError { .. }) => {
                error_line(&e.to_string());
                if !retry_persist(service, session, input).await? {
                    return Ok(Step::Stop);
                }
            }
            Err(e @ JudgingError::AnnotationConflict { .. }) => {
                warn_line(&format!("{e}. Keeping the stored annotation."));
                return Ok(Step::Next);
            }
            Err(e) => error_line(&e.to_string()),
        }
    }
}

/// Callback data of the button picked by `line`. An empty line picks the
/// only button when there is exactly one.
fn choose(prompt: &Prompt, line: &str) -> Option<String> {
    if line.is_empty() && prompt.buttons.len() == 1 {
        return prompt.buttons.first().map(|b| b.data.clone());
    }
    let index = line.parse::<usize>().ok()?.checked_sub(1)?;
    prompt.buttons.get(index).map(|b| b.data.clone())
}

async fn retry_persist(
    service: &JudgingService,
    session: &JudgingSession,
    input: &mut Input,
) -> Result<bool, JudgingError> {
    loop {
        println!("{}", "Press Enter to retry saving, or 'q' to stop.".yellow());
        match input.next_line().await? {
            Some(line) if !line.trim().eq_ignore_ascii_case("q") => {}
            _ => return Ok(false),
        }
        match service.persist(session) {
            Ok(_) => return Ok(true),
            Err(e) if e.is_retryable() => error_line(&e.to_string()),
            Err(e) => {
                error_line(&e.to_string());
                return Ok(false);
            }
        }
    }
}

fn debate_header(service: &JudgingService, session: &JudgingSession) -> Result<(), JudgingError> {
    let (done, total) = service.progress(session.annotator())?;
    let debate = session.debate();

    println!();
    println!("{}", "─".repeat(70).dimmed());
    println!(
        "{} {}",
        format!("Debate #{}", debate.id()).bright_cyan().bold(),
        format!("({} of {})", done + 1, total).dimmed()
    );
    println!("{} \"{}\"", "Resolution:".bold(), debate.resolution().bright_white());
    println!("{}", "─".repeat(70).dimmed());
    Ok(())
}

/// Show the resolution, then the audio file or the transcript.
async fn present_debate(
    service: &JudgingService,
    session: &mut JudgingSession,
) -> Result<(), JudgingError> {
    debate_header(service, session)?;

    if service.has_audio() {
        println!("{}", "Preparing audio...".dimmed());
        match service.prepare_audio(session).await {
            Ok(prepared) => {
                println!(
                    "{} {} {}",
                    "Audio:".bold(),
                    prepared.path.display().to_string().bright_white(),
                    format!("({:.0}s)", prepared.duration_secs).dimmed()
                );
                println!("Listen to the full debate, then score it below.");
                return Ok(());
            }
            Err(e) => warn_line(&format!("{e}. Transcript follows.")),
        }
    }

    print_transcript(session);
    Ok(())
}

/// Reorient an annotator who resumed part-way through scoring.
fn recap_debate(service: &JudgingService, session: &JudgingSession) -> Result<(), JudgingError> {
    debate_header(service, session)?;
    match service.stitched_audio(session.debate().id()) {
        Some(path) => println!(
            "{} {}",
            "Audio:".bold(),
            path.display().to_string().bright_white()
        ),
        None => print_transcript(session),
    }
    Ok(())
}

fn print_transcript(session: &JudgingSession) {
    println!();
    for turn in session.debate().turns() {
        println!(
            "{} {}",
            "▶".bright_cyan(),
            format!("{} ({})", turn.side().short_label(), turn.role().as_str())
                .yellow()
                .bold()
        );
        for line in textwrap(turn.text(), 66).lines() {
            println!("  {}", line);
        }
        println!();
    }
}

fn render(prompt: &Prompt) {
    println!();
    let mut lines = prompt.text.lines();
    if let Some(first) = lines.next() {
        println!("{}", first.bold());
    }
    for line in lines {
        println!("{}", line);
    }
    for (i, button) in prompt.buttons.iter().enumerate() {
        println!("  {} {}", format!("[{}]", i + 1).bright_cyan(), button.label);
    }
    if prompt.buttons.is_empty() && !prompt.accepts_text {
        return;
    }
    if prompt.accepts_text {
        println!("  {}", "(or type your answer)".dimmed());
    }
    print!("{} ", ">".bright_cyan().bold());
    std::io::stdout().flush().ok();
}

fn status(config: &Config, name: &str) -> Result<(), JudgingError> {
    let annotator = AnnotatorId::new(name)?;
    let service = JudgingService::from_config(config);
    let (done, total) = service.progress(&annotator)?;

    println!(
        "{} has judged {} of {} debates.",
        annotator.to_string().bright_cyan().bold(),
        done.to_string().bold(),
        total
    );
    if total > 0 && done == total {
        println!("{}", "All debates have been annotated!".bright_green());
    }
    Ok(())
}

fn show_pairing(config: &Config, debate_id: &str) {
    println!("{} {}", "Debate".bold(), debate_id.bright_cyan());
    let providers = [
        ("primary", &config.providers.primary),
        ("secondary", &config.providers.secondary),
    ];
    for (rank, provider) in providers {
        let pool = provider.pool();
        let voices = pair(debate_id, pool.len()).and_then(|p| p.resolve(&pool));
        match voices {
            Some((aff, neg)) => println!(
                "  {:9} {:10}  AFF {} · NEG {}",
                rank,
                provider.kind.as_str(),
                aff.name.bright_white(),
                neg.name.bright_white()
            ),
            None => println!(
                "  {:9} {:10}  {}",
                rank,
                provider.kind.as_str(),
                "needs at least two voices".red()
            ),
        }
    }
}

async fn render_audio(config: &Config, debate_id: &str) -> Result<(), JudgingError> {
    let credentials = Credentials::from_env(&config.providers);
    let preparer = AudioPreparer::from_config(config, &credentials)?;
    let annotations = Arc::new(FileAnnotationStore::new(&config.paths.annotations_dir));
    let store = FileDebateStore::new(&config.paths.debates_dir, annotations);
    let debate = store.load_debate(debate_id)?;

    println!("{} debate #{}...", "Synthesizing".bold(), debate_id);
    let prepared = preparer.prepare(&debate).await?;
    println!(
        "{} {} {}",
        "Wrote".bright_green().bold(),
        prepared.path.display(),
        format!("({:.1}s)", prepared.duration_secs).dimmed()
    );
    Ok(())
}

fn warn_line(message: &str) {
    eprintln!("{} {}", "Warning:".yellow().bold(), message.yellow());
}

fn error_line(message: &str) {
    eprintln!("{} {}", "Error:".red().bold(), message);
}

/// Simple text wrapping function.
fn textwrap(text: &str, width: usize) -> String {
    let mut result = String::new();
    let mut current_line_len = 0;

    for word in text.split_whitespace() {
        if current_line_len + word.len() + 1 > width && current_line_len > 0 {
            result.push('\n');
            current_line_len = 0;
        }
        if current_line_len > 0 {
            result.push(' ');
            current_line_len += 1;
        }
        result.push_str(word);
        current_line_len += word.len();
    }

    result
}
