use std::error::Error;
use std::fs;
use std::io::{self, Read};
#[cfg(feature = "web")]
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use archseek_view::{
    ClientConfig, HttpCaseApi, InteractionBinder, Outcome, Page, Region, ResultPayload,
    render_fragments,
};
use clap::{Args, Parser, Subcommand};
use serde_json::json;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "archseek-view", about = "Render and drive archseek case results", version)]
pub struct Cli {
    /// Emit JSON instead of human-readable output.
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Render a result payload file into the three page regions.
    Render {
        /// Payload JSON file, or `-` for stdin.
        path: PathBuf,
    },
    /// Drive a case backend interactively from stdin.
    Session {
        #[command(flatten)]
        backend: BackendArgs,
    },
    /// Serve the browser front-end.
    #[cfg(feature = "web")]
    Serve {
        /// Address to listen on.
        #[arg(long, default_value = "127.0.0.1:8080")]
        addr: SocketAddr,
        #[command(flatten)]
        backend: BackendArgs,
    },
}

#[derive(Args, Debug)]
struct BackendArgs {
    /// Base URL of the case backend.
    #[arg(long, default_value = "http://127.0.0.1:5000")]
    backend: String,
    /// Backend session id to send as the session cookie.
    #[arg(long)]
    session: Option<String>,
    /// Per-request timeout in seconds.
    #[arg(long, default_value_t = 30)]
    timeout_secs: u64,
}

impl From<BackendArgs> for ClientConfig {
    fn from(args: BackendArgs) -> Self {
        ClientConfig {
            backend_url: args.backend,
            timeout: Duration::from_secs(args.timeout_secs.max(1)),
            session_id: args.session,
        }
    }
}

pub fn run() -> Result<(), Box<dyn Error>> {
    let cli = Cli::parse();
    init_tracing();
    match cli.command {
        Command::Render { path } => handle_render(&path, cli.json),
        Command::Session { backend } => {
            let runtime = tokio::runtime::Runtime::new()?;
            runtime.block_on(handle_session(backend.into(), cli.json))
        }
        #[cfg(feature = "web")]
        Command::Serve { addr, backend } => {
            let runtime = tokio::runtime::Runtime::new()?;
            let config = archseek_view::web::WebConfig {
                addr,
                backend: backend.into(),
            };
            runtime.block_on(archseek_view::web::serve(config))?;
            Ok(())
        }
    }
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .try_init();
}

fn handle_render(path: &Path, as_json: bool) -> Result<(), Box<dyn Error>> {
    let bytes = if path.as_os_str() == "-" {
        let mut buf = Vec::new();
        io::stdin().read_to_end(&mut buf)?;
        buf
    } else {
        fs::read(path).map_err(|err| format!("Failed to read {}: {err}", path.display()))?
    };
    let payload = ResultPayload::from_json(&bytes)?;
    let fragments = render_fragments(&payload)?;
    if as_json {
        println!("{}", serde_json::to_string_pretty(&fragments)?);
        return Ok(());
    }
    println!("<!-- #{} -->\n{}", Region::Results, fragments.result.trim());
    println!("<!-- #{} -->\n{}", Region::QuerySet, fragments.queryset.trim());
    match fragments.thumbnail {
        Some(markup) => println!("<!-- #{} -->\n{markup}", Region::Thumbnail),
        None => println!("<!-- #{} unchanged -->", Region::Thumbnail),
    }
    Ok(())
}

#[derive(Debug, Clone, PartialEq)]
enum SessionCommand {
    Search(String),
    Click(String),
    Weights(Vec<f64>),
    Show,
    Quit,
}

fn parse_command(line: &str) -> Result<SessionCommand, String> {
    let line = line.trim();
    let (word, rest) = line.split_once(char::is_whitespace).unwrap_or((line, ""));
    let rest = rest.trim();
    match word {
        "search" => Ok(SessionCommand::Search(rest.to_string())),
        "click" if !rest.is_empty() => Ok(SessionCommand::Click(rest.to_string())),
        "click" => Err("click needs a case id".to_string()),
        "weights" => archseek_view::client::parse_weights(rest)
            .map(SessionCommand::Weights)
            .ok_or_else(|| format!("Could not parse weights from {rest:?}")),
        "show" => Ok(SessionCommand::Show),
        "quit" | "exit" => Ok(SessionCommand::Quit),
        other => Err(format!(
            "Unknown command {other:?}; try search, click, weights, show or quit"
        )),
    }
}

async fn handle_session(config: ClientConfig, as_json: bool) -> Result<(), Box<dyn Error>> {
    let binder = InteractionBinder::new(HttpCaseApi::new(config)?);
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        if line.trim().is_empty() {
            continue;
        }
        let command = match parse_command(&line) {
            Ok(command) => command,
            Err(message) => {
                eprintln!("error: {message}");
                continue;
            }
        };
        let result = match command {
            SessionCommand::Search(input) => binder.search(&input).await,
            SessionCommand::Click(case_id) => binder.click(&case_id).await,
            SessionCommand::Weights(weights) => binder.apply_weights(&weights).await,
            SessionCommand::Show => {
                print_regions(&binder.snapshot());
                continue;
            }
            SessionCommand::Quit => break,
        };
        match result {
            Ok(Outcome::Applied) => print_page(&binder.snapshot(), as_json)?,
            Ok(Outcome::Stale) => eprintln!("(response superseded by a newer request)"),
            Err(err) => eprintln!("error: {err}"),
        }
    }
    Ok(())
}

fn print_page(page: &Page, as_json: bool) -> Result<(), Box<dyn Error>> {
    if as_json {
        let cases: Vec<_> = page
            .affordances()
            .iter()
            .map(|affordance| {
                json!({
                    "index": affordance.index,
                    "case_id": affordance.case_id,
                    "action": affordance.action,
                })
            })
            .collect();
        println!("{}", serde_json::to_string(&json!({ "cases": cases }))?);
        return Ok(());
    }
    if page.affordances().is_empty() {
        println!("No cases returned.");
        return Ok(());
    }
    let width = page
        .affordances()
        .iter()
        .map(|affordance| affordance.case_id.len())
        .max()
        .unwrap_or(0)
        .max("CASE_ID".len());
    println!("{:>3}  {:<width$}  {}", "#", "CASE_ID", "CLICK", width = width);
    println!("{:->3}  {:-<width$}  {}", "", "", "------", width = width);
    for affordance in page.affordances() {
        println!(
            "{:>3}  {:<width$}  {}",
            affordance.index,
            affordance.case_id,
            affordance.action,
            width = width
        );
    }
    Ok(())
}

fn print_regions(page: &Page) {
    for region in Region::ALL {
        println!("<!-- #{region} -->\n{}", page.region(region).trim());
    }
}
