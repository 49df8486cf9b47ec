use std::fs;
use std::path::Path;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use clap::Subcommand;
use clap::ValueEnum;
use tracing_subscriber::EnvFilter;

use opgate_core::clock::Clock;
use opgate_core::clock::SystemClock;
use opgate_core::config::Config;
use opgate_core::persistence::EvidenceLog;
use opgate_core::persistence::JsonlEvidenceLog;
use opgate_core::policy_engine::ApprovalPolicy;
use opgate_core::runner::SkillClassifier;
use opgate_core::runner::SkillInput;
use opgate_core::skill_registry::InputKind;
use opgate_core::usage::LedgerEntitlements;
use opgate_core::Decision;
use opgate_core::OperatorDeps;
use opgate_core::OperatorService;
use opgate_core::Reviewer;
use opgate_core::SessionId;
use opgate_exec::ExternalClassifier;
use opgate_exec::KeywordClassifier;

mod render;

/// Operator skills with quota gating and audited human approval.
#[derive(Parser)]
#[command(name = "opgate")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to a TOML configuration file.
    #[arg(long, global = true, env = "OPGATE_CONFIG")]
    config: Option<PathBuf>,

    /// Directory holding the evidence log.
    #[arg(long, global = true, env = "OPGATE_DATA_DIR")]
    data_dir: Option<PathBuf>,

    /// Print JSON instead of text.
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List skills and whether the current plan can run them.
    Skills,

    /// Show quota usage, or check a single action.
    Quota {
        /// Action to check, e.g. executions_weekly.
        #[arg(long)]
        action: Option<String>,
    },

    /// Run a skill and route the proposal for approval.
    Run {
        skill: String,

        /// Input kind: free_text, email_thread, calendar_event or task_list.
        #[arg(long, default_value = "free_text")]
        kind: String,

        #[arg(required = true, trailing_var_arg = true)]
        text: Vec<String>,
    },

    /// Record a decision on a session under review.
    Decide {
        session: String,

        decision: DecisionArg,

        /// Step indices for approve-partial (comma-separated).
        #[arg(long, value_delimiter = ',')]
        steps: Vec<usize>,

        /// Note for request-revision and escalate, reason for reject.
        #[arg(long)]
        note: Option<String>,

        #[arg(long, env = "OPGATE_REVIEWER", default_value = "local")]
        reviewer: String,

        /// The reviewer passed biometric verification.
        #[arg(long)]
        biometric: bool,
    },

    /// Start a new round for a session returned with revision_requested.
    Revise {
        session: String,

        #[arg(required = true, trailing_var_arg = true)]
        text: Vec<String>,
    },

    /// Reissue an escalated session for a higher authority.
    Escalate { session: String },

    /// List approval sessions.
    Sessions,

    /// Show a session and its proposal.
    Show { session: String },

    /// Export the evidence log as JSON.
    Export,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum DecisionArg {
    Approve,
    ApprovePartial,
    Reject,
    RequestRevision,
    Escalate,
}

fn main() {
    if let Err(err) = run() {
        eprintln!("error: {err}");
        std::process::exit(1);
    }
}

fn run() -> Result<(), Box<dyn std::error::Error>> {
    init_tracing();
    let cli = Cli::parse();
    let config = load_config(cli.config.as_deref())?;
    let service = open_service(config, cli.data_dir.as_deref())?;
    let json = cli.json;

    match cli.command {
        Commands::Skills => {
            let report = service.access_report()?;
            if json {
                println!("{}", serde_json::to_string_pretty(&report)?);
            } else {
                print!("{}", render::skills(&report));
            }
        }
        Commands::Quota { action } => match action {
            Some(action) => {
                let decision = service.check_quota(&action);
                if json {
                    println!("{}", serde_json::to_string_pretty(&decision)?);
                } else {
                    println!("{}", render::limit_decision(&action, &decision));
                }
            }
            None => {
                let report = service.access_report()?;
                if json {
                    println!("{}", serde_json::to_string_pretty(&report)?);
                } else {
                    print!("{}", render::quota(&report, service.config()));
                }
            }
        },
        Commands::Run { skill, kind, text } => {
            let kind = InputKind::parse(&kind)
                .ok_or_else(|| format!("unknown input kind: {kind}"))?;
            let input = SkillInput {
                kind,
                text: text.join(" "),
            };
            let pack = service.run_skill(&skill, &input)?;
            let session = service.route_for_approval(pack.id)?;
            if json {
                println!(
                    "{}",
                    serde_json::to_string_pretty(&serde_json::json!({
                        "proposal": &*pack,
                        "session": &session,
                    }))?
                );
            } else {
                print!("{}", render::proposal(&pack));
                println!("{}", render::session_line(&session));
            }
        }
        Commands::Decide {
            session,
            decision,
            steps,
            note,
            reviewer,
            biometric,
        } => {
            let session_id = parse_session(&session)?;
            let decision = build_decision(decision, steps, note)?;
            let outcome =
                service.record_decision(session_id, decision, &Reviewer::new(reviewer, biometric))?;
            if json {
                println!("{}", serde_json::to_string_pretty(outcome.session())?);
            } else {
                println!("{}", render::outcome(&outcome));
            }
        }
        Commands::Revise { session, text } => {
            let session = service.revise(parse_session(&session)?, &text.join(" "))?;
            print_round(&service, &session, json)?;
        }
        Commands::Escalate { session } => {
            let session = service.escalate_round(parse_session(&session)?)?;
            print_round(&service, &session, json)?;
        }
        Commands::Sessions => {
            let sessions = service.sessions();
            if json {
                println!("{}", serde_json::to_string_pretty(&sessions)?);
            } else if sessions.is_empty() {
                println!("no sessions");
            } else {
                for session in &sessions {
                    println!("{}", render::session_line(session));
                }
            }
        }
        Commands::Show { session } => {
            let session_id = parse_session(&session)?;
            let session = service
                .session(session_id)
                .ok_or_else(|| format!("unknown session {session_id}"))?;
            let pack = service.proposal(session.proposal_id);
            if json {
                println!(
                    "{}",
                    serde_json::to_string_pretty(&serde_json::json!({
                        "session": &session,
                        "proposal": pack.as_deref(),
                    }))?
                );
            } else {
                print!("{}", render::session_detail(&session));
                if let Some(pack) = pack {
                    print!("{}", render::proposal(&pack));
                }
            }
        }
        Commands::Export => {
            println!("{}", service.export_evidence()?);
        }
    }
    Ok(())
}

fn init_tracing() {
    let filter = EnvFilter::try_from_env("OPGATE_LOG").unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

/// An explicit path must exist; the default location is optional.
fn load_config(explicit: Option<&Path>) -> Result<Config, Box<dyn std::error::Error>> {
    let path = match explicit {
        Some(path) => path.to_path_buf(),
        None => match dirs::config_dir() {
            Some(dir) => dir.join("opgate").join("config.toml"),
            None => return Ok(Config::default()),
        },
    };
    if explicit.is_none() && !path.exists() {
        return Ok(Config::default());
    }
    let text = fs::read_to_string(&path)
        .map_err(|err| format!("failed to read config {}: {err}", path.display()))?;
    let config = toml::from_str::<Config>(&text)
        .map_err(|err| format!("failed to parse config {}: {err}", path.display()))?;
    tracing::debug!(path = %path.display(), "loaded config");
    Ok(config)
}

fn default_data_dir() -> PathBuf {
    dirs::data_dir()
        .map(|dir| dir.join("opgate"))
        .unwrap_or_else(|| PathBuf::from(".opgate"))
}

fn ledger_path(config: &Config, data_dir: Option<&Path>) -> PathBuf {
    match (&config.ledger.path, data_dir) {
        (Some(path), _) => path.clone(),
        (None, Some(dir)) => dir.join("evidence.jsonl"),
        (None, None) => default_data_dir().join("evidence.jsonl"),
    }
}

fn build_classifier(config: &Config) -> Result<Arc<dyn SkillClassifier>, Box<dyn std::error::Error>> {
    match &config.classifier.command {
        Some(argv) => {
            let classifier = ExternalClassifier::from_argv(argv)
                .ok_or("classifier.command must name a program")?
                .with_timeout(Duration::from_secs(config.classifier.timeout_secs.max(1)));
            tracing::debug!(program = classifier.program(), "using external classifier");
            Ok(Arc::new(classifier))
        }
        None => Ok(Arc::new(KeywordClassifier::new()?)),
    }
}

fn open_service(
    config: Config,
    data_dir: Option<&Path>,
) -> Result<OperatorService, Box<dyn std::error::Error>> {
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let path = ledger_path(&config, data_dir);
    let log: Arc<dyn EvidenceLog> = Arc::new(JsonlEvidenceLog::open(&path, Arc::clone(&clock))?);
    let policy = match &config.policy.path {
        Some(path) => ApprovalPolicy::load(path)?,
        None => ApprovalPolicy::builtin(),
    };
    let entitlements = Arc::new(LedgerEntitlements::new(
        config.plan.tier,
        config.quota.week_start,
        Arc::clone(&log),
    ));
    let classifier = build_classifier(&config)?;
    tracing::debug!(ledger = %path.display(), policy = %policy.id, "opening operator service");
    Ok(OperatorService::open(OperatorDeps {
        config,
        clock,
        entitlements,
        classifier,
        log,
        policy,
    })?)
}

fn parse_session(input: &str) -> Result<SessionId, String> {
    SessionId::parse(input).ok_or_else(|| format!("invalid session id: {input}"))
}

fn build_decision(
    kind: DecisionArg,
    steps: Vec<usize>,
    note: Option<String>,
) -> Result<Decision, String> {
    if !steps.is_empty() && kind != DecisionArg::ApprovePartial {
        return Err("--steps only applies to approve-partial".to_string());
    }
    Ok(match kind {
        DecisionArg::Approve => Decision::Approve,
        DecisionArg::ApprovePartial => Decision::ApprovePartial { steps },
        DecisionArg::Reject => Decision::Reject { reason: note },
        DecisionArg::RequestRevision => Decision::RequestRevision {
            note: note.unwrap_or_default(),
        },
        DecisionArg::Escalate => Decision::Escalate {
            note: note.unwrap_or_default(),
        },
    })
}

fn print_round(
    service: &OperatorService,
    session: &opgate_core::ApprovalSession,
    json: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    let pack = service.proposal(session.proposal_id);
    if json {
        println!(
            "{}",
            serde_json::to_string_pretty(&serde_json::json!({
                "proposal": pack.as_deref(),
                "session": session,
            }))?
        );
    } else {
        if let Some(pack) = pack {
            print!("{}", render::proposal(&pack));
        }
        println!("{}", render::session_line(session));
    }
    Ok(())
}
