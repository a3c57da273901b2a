use std::path::PathBuf;

use clap::{Parser, Subcommand};
use docaudit_core::{frameworks, resolve_framework, CaseId, RunId};
use docaudit_runner::{CaseRequest, Runner};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "docaudit", version, about = "Document compliance review runs")]
struct Cli {
    /// Workspace root holding `.docaudit/`
    #[arg(long, global = true, default_value = ".")]
    root: PathBuf,

    #[command(subcommand)]
    cmd: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Create .docaudit/ with a default config and an empty database
    Init,

    /// Register a case with its document; prints the case and queued run
    CaseAdd {
        #[arg(long)]
        title: String,
        #[arg(long)]
        url: String,
        #[arg(long, default_value = "indas")]
        framework: String,
        #[arg(long)]
        file_name: Option<String>,
        #[arg(long)]
        owner: Option<String>,
    },

    /// Start the latest run of a case and process it in the foreground
    Start {
        #[arg(long)]
        case: i64,
    },

    /// Show run status and progress
    Status {
        #[arg(long)]
        run: i64,
        /// Print the full debug payload instead of the polling view
        #[arg(long, default_value_t = false)]
        debug: bool,
    },

    /// List the findings of a run
    Findings {
        #[arg(long)]
        run: i64,
    },

    /// Discard findings and progress and requeue a run
    Reset {
        #[arg(long)]
        run: i64,
        /// Also reset a run left `running` by a crashed process
        #[arg(long, default_value_t = false)]
        force: bool,
    },

    /// Print the rule catalog of a framework (all frameworks if omitted)
    Rules {
        #[arg(long)]
        framework: Option<String>,
    },

    /// List cases, newest first
    Cases,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_target(false)
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    let root = cli.root;

    match cli.cmd {
        Command::Init => {
            let cfg_path = Runner::init_root(&root)?;
            println!("Initialized docaudit in {} ({})", root.display(), cfg_path.display());
        }
        Command::CaseAdd { title, url, framework, file_name, owner } => {
            let r = Runner::open(root)?;
            let created = r.create_case(CaseRequest {
                title,
                framework_key: Some(framework),
                document_url: url,
                file_name,
                owner,
            })?;
            println!(
                "Added case {} ({}) with run {} [{}]",
                created.case.id, created.case.framework_key, created.run.id, created.run.status
            );
        }
        Command::Start { case } => {
            let r = Runner::open(root)?;
            let run_id = r.start_run(CaseId(case))?;
            println!("Processing run {run_id}...");
            r.process_run(run_id).await?;
            let view = r.run_status(run_id)?;
            println!("Run {} finished: {}", run_id, view.status);
            if let Some(msg) = view.error_message {
                println!("{msg}");
            }
            if let Some(p) = view.progress {
                println!(
                    "pass={} fail={} unknown={} score={}% coverage={}%",
                    p.pass_count, p.fail_count, p.unknown_count, p.score_current, p.coverage_percent
                );
            }
        }
        Command::Status { run, debug } => {
            let r = Runner::open(root)?;
            if debug {
                let payload = r.run_debug(RunId(run))?;
                println!("{}", serde_json::to_string_pretty(&payload)?);
            } else {
                let view = r.run_status(RunId(run))?;
                println!("{}", serde_json::to_string_pretty(&view)?);
            }
        }
        Command::Findings { run } => {
            let r = Runner::open(root)?;
            let findings = r.findings(RunId(run))?;
            for f in &findings {
                println!("{:<14} {:<8} {}", f.rule_code, f.status.as_str(), f.reason);
                for e in &f.evidence {
                    match e.page {
                        Some(page) => println!("    p.{page}: {}", e.snippet),
                        None => println!("    {}", e.snippet),
                    }
                }
            }
            println!("{} findings", findings.len());
        }
        Command::Reset { run, force } => {
            let r = Runner::open(root)?;
            let reset = r.reset_run(RunId(run), force)?;
            println!("Run {} is {}", reset.id, reset.status);
        }
        Command::Rules { framework } => {
            let selected = match framework {
                Some(key) => vec![*resolve_framework(&key)],
                None => frameworks().to_vec(),
            };
            for fw in selected {
                println!("{} v{} - {} ({} rules)", fw.key, fw.version, fw.name, fw.rule_count());
                for rule in fw.rules() {
                    println!("  {}  {}", rule.rule_code, rule.title);
                }
            }
        }
        Command::Cases => {
            let r = Runner::open(root)?;
            for c in r.list_cases()? {
                println!("- {} [{}] {}", c.id, c.framework_key, c.title);
            }
        }
    }

    Ok(())
}
