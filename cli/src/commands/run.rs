use std::io::{BufRead, Write};
use std::path::PathBuf;

use clap::Args;
use loom_core::brief::{Brief, load_brief};
use loom_core::config::{BaseEngineConfig, DEFAULT_MODEL, DEFAULT_OUTPUT_DIR, SessionConfig};
use loom_core::decision::DecisionEvent;
use loom_core::error::LoomError;
use loom_core::generator::Generator;
use loom_core::graph::Loom;
use loom_core::manifest::append_decision;
use loom_core::orchestrator::Orchestrator;
use loom_core::snapshot::save_loom;

use crate::generators::{DEFAULT_API_URL, make_generator};
use crate::util::{exit_error, report_error};

const PROMPT: &str = "Choose [number], s=stop, q=quit: ";

#[derive(Args)]
pub struct RunArgs {
    /// Seed text to start the loom
    #[arg(long, short = 's')]
    seed: String,
    /// Path to brief file (TOML or markdown)
    #[arg(
        long,
        short = 'b',
        required_unless_present = "brief_text",
        conflicts_with = "brief_text"
    )]
    brief_path: Option<PathBuf>,
    /// Inline brief text, used as notes
    #[arg(long)]
    brief_text: Option<String>,
    /// Directory for loom.json and manifest.ndjson
    #[arg(long, short = 'o', env = "LOOM_OUTPUT_DIR", default_value = DEFAULT_OUTPUT_DIR)]
    output_dir: PathBuf,
    /// Write the audit log here instead of <output-dir>/manifest.ndjson
    #[arg(long)]
    manifest_path: Option<PathBuf>,
    /// Number of candidates per step
    #[arg(long, short = 'n', default_value_t = 8)]
    branching_factor: usize,
    /// Max tokens per candidate segment
    #[arg(long, short = 't', default_value_t = 6)]
    segment_tokens: u32,
    /// Candidate generator
    #[arg(long, default_value = "claude_cli_sim", value_parser = ["claude_cli_sim", "fake"])]
    engine: String,
    /// Model for the claude_cli_sim engine
    #[arg(long, env = "LOOM_MODEL", default_value = DEFAULT_MODEL)]
    model: String,
    #[arg(long, default_value_t = 1.0, value_parser = parse_finite)]
    temperature: f64,
    #[arg(long, default_value_t = 1.0, value_parser = parse_finite)]
    top_p: f64,
    /// Messages API base URL
    #[arg(long, env = "ANTHROPIC_BASE_URL", default_value = DEFAULT_API_URL)]
    api_url: String,
    #[arg(long, env = "ANTHROPIC_API_KEY", hide_env_values = true)]
    api_key: Option<String>,
}

/// How an interactive session ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionOutcome {
    /// The user committed a stop; the last decision was saved.
    Stopped { choices: usize },
    /// The user quit (or input ended) without resolving the open decision.
    Quit { choices: usize },
}

#[derive(Debug, PartialEq, Eq)]
enum Reply {
    Choose(usize),
    Stop,
    Quit,
}

pub async fn run(args: RunArgs) -> i32 {
    if args.branching_factor == 0 {
        exit_error(
            "--branching-factor must be at least 1",
            Some("Use -n 8 for the default fan-out"),
        );
    }

    let brief = match resolve_brief(args.brief_path.as_deref(), args.brief_text.as_deref()) {
        Ok(brief) => brief,
        Err(e) => return report_error(&e),
    };
    let config = match session_config(&args) {
        Ok(config) => config,
        Err(e) => return report_error(&e),
    };
    let generator = match make_generator(&config.base_engine, &args.api_url, args.api_key.as_deref())
    {
        Ok(generator) => generator,
        Err(message) => exit_error(
            &message,
            Some("Set ANTHROPIC_API_KEY or pass --engine fake for offline runs"),
        ),
    };

    let loom = Loom::create(args.seed.as_str(), brief.summary(), Some(config.to_metadata()));
    tracing::info!(
        session_id = loom.session_id(),
        engine = %config.base_engine.engine_type,
        branching_factor = config.base_engine.branching_factor,
        "session started"
    );
    let mut orchestrator = Orchestrator::new(loom, generator, brief, config);

    let stdin = std::io::stdin();
    let mut input = stdin.lock();
    let mut out = std::io::stdout();
    match run_session(&mut orchestrator, &mut input, &mut out).await {
        Ok(outcome) => {
            tracing::info!(
                session_id = orchestrator.loom().session_id(),
                ?outcome,
                "session ended"
            );
            0
        }
        Err(e) => match e.downcast_ref::<LoomError>() {
            Some(err) => report_error(err),
            None => exit_error(&e.to_string(), None),
        },
    }
}

fn parse_finite(raw: &str) -> Result<f64, String> {
    let value: f64 = raw.parse().map_err(|e| format!("{e}"))?;
    if value.is_finite() {
        Ok(value)
    } else {
        Err(format!("'{raw}' is not a finite number"))
    }
}

pub fn resolve_brief(
    brief_path: Option<&std::path::Path>,
    brief_text: Option<&str>,
) -> Result<Brief, LoomError> {
    match (brief_path, brief_text) {
        (Some(path), _) => load_brief(path),
        (None, Some(text)) => Ok(Brief::from_notes(text)),
        (None, None) => Ok(Brief::default()),
    }
}

fn session_config(args: &RunArgs) -> Result<SessionConfig, LoomError> {
    Ok(SessionConfig {
        base_engine: BaseEngineConfig {
            engine_type: args.engine.parse()?,
            model_name: args.model.clone(),
            segment_tokens: args.segment_tokens,
            branching_factor: args.branching_factor,
            temperature: args.temperature,
            top_p: args.top_p,
            ..BaseEngineConfig::default()
        },
        output_dir: args.output_dir.clone(),
        manifest_path: args.manifest_path.clone(),
        ..SessionConfig::default()
    })
}

/// Drive the generate / choose loop until the user stops or quits.
///
/// Every resolved decision is persisted immediately: the snapshot is rewritten and the
/// event appended to the audit log.
pub async fn run_session<G, R, W>(
    orchestrator: &mut Orchestrator<G>,
    input: &mut R,
    out: &mut W,
) -> Result<SessionOutcome, Box<dyn std::error::Error>>
where
    G: Generator,
    R: BufRead,
    W: Write,
{
    {
        let loom = orchestrator.loom();
        writeln!(
            out,
            "== Loom Session ==\nSession ID: {}\nSeed: {}\n",
            loom.session_id(),
            loom.current_text()
        )?;
    }

    let mut choices = 0;
    loop {
        let event = orchestrator.generate_step().await?.clone();
        render_candidates(out, orchestrator.loom(), &event)?;

        let reply = loop {
            write!(out, "{PROMPT}")?;
            out.flush()?;
            let mut line = String::new();
            if input.read_line(&mut line)? == 0 {
                break Reply::Quit;
            }
            match parse_reply(&line, event.candidate_node_ids().len()) {
                Some(reply) => break reply,
                None => writeln!(out, "Invalid choice")?,
            }
        };

        match reply {
            Reply::Quit => {
                writeln!(out, "Quit without saving.")?;
                return Ok(SessionOutcome::Quit { choices });
            }
            Reply::Stop => {
                orchestrator.commit_stop(event.id(), "User stop")?;
                save_session(orchestrator, event.id())?;
                writeln!(out, "Stopped.")?;
                writeln!(
                    out,
                    "Session saved to {}",
                    orchestrator.config().output_dir.display()
                )?;
                return Ok(SessionOutcome::Stopped { choices });
            }
            Reply::Choose(index) => {
                let chosen = &event.candidate_node_ids()[index];
                orchestrator.commit_choice(event.id(), chosen, "human choice")?;
                save_session(orchestrator, event.id())?;
                choices += 1;
                writeln!(out, "Chose candidate {}", index + 1)?;
            }
        }
    }
}

/// Parse a prompt reply. Numbers are 1-based; anything out of range is invalid.
fn parse_reply(line: &str, candidates: usize) -> Option<Reply> {
    let reply = line.trim().to_lowercase();
    match reply.as_str() {
        "q" => Some(Reply::Quit),
        "s" => Some(Reply::Stop),
        _ => match reply.parse::<usize>() {
            Ok(n) if (1..=candidates).contains(&n) => Some(Reply::Choose(n - 1)),
            _ => None,
        },
    }
}

fn save_session<G: Generator>(
    orchestrator: &Orchestrator<G>,
    event_id: &str,
) -> Result<(), LoomError> {
    let loom = orchestrator.loom();
    let config = orchestrator.config();
    save_loom(loom, config.snapshot_path())?;
    append_decision(config.manifest_path(), loom.event(event_id)?, loom.session_id())
}

fn render_candidates<W: Write>(
    out: &mut W,
    loom: &Loom,
    event: &DecisionEvent,
) -> Result<(), Box<dyn std::error::Error>> {
    writeln!(out, "Candidates")?;
    writeln!(out, "{:>3}  {:>7}  Text", "#", "Logprob")?;
    for (idx, node_id) in event.candidate_node_ids().iter().enumerate() {
        let node = loom.node(node_id)?;
        let lp = match node.step_logprob() {
            Some(lp) => format!("{lp:.2}"),
            None => "—".to_string(),
        };
        writeln!(
            out,
            "{:>3}  {:>7}  {}",
            idx + 1,
            lp,
            node.text().replace('\n', "\\n")
        )?;
    }
    writeln!(out)?;
    Ok(())
}
