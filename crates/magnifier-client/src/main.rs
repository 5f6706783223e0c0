use anyhow::{Context, Result};
use clap::Parser;
use magnifier_client::{
    config::{load_config, ConfigFlags},
    logging::init_logging,
    reconciler::Reconciler,
    repl::{parse_line, render_focused, ReplCommand, HELP},
    Session,
};
use tokio::io::{self, AsyncBufReadExt, BufReader};
use tracing::{error, info};

#[derive(Parser, Debug)]
#[command(name = "magnifier-client", about = "Interactive client for the magnifier decompiler service")]
struct Args {
    #[arg(long, default_value = "")]
    url: String,
    #[arg(long, default_value = "")]
    session: String,
    #[arg(long, default_value = "")]
    log_dir: String,
    #[arg(long, default_value = "")]
    request_timeout_ms: String,
    #[arg(long)]
    max_frame_bytes: Option<usize>,
}

impl From<Args> for ConfigFlags {
    fn from(args: Args) -> Self {
        Self {
            url: args.url,
            session: args.session,
            log_dir: args.log_dir,
            request_timeout_ms: args.request_timeout_ms,
            max_frame_bytes: args.max_frame_bytes,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let config = load_config(&args.into()).context("invalid configuration")?;
    let _log_guard = init_logging(&config);

    let session = Session::start(&config);
    let reconciler = session.reconciler().clone();

    let mut notifications = session.client().notifications();
    let notifier = tokio::spawn(async move {
        while let Ok(message) = notifications.recv().await {
            println!("[service] {message}");
        }
    });

    println!("connecting to {} (:help for commands)", config.url);
    if let Err(err) = reconciler.refresh_catalog().await {
        error!("initial_catalog_failed: {err}");
        println!("error: {err}");
    }

    let mut printed = 0usize;
    let mut lines = BufReader::new(io::stdin()).lines();
    while let Some(line) = lines.next_line().await.context("reading stdin")? {
        let command = match parse_line(&line) {
            Ok(command) => command,
            Err(message) => {
                println!("{message}");
                continue;
            }
        };
        if command == ReplCommand::Quit {
            break;
        }
        if let Err(err) = run_command(&reconciler, command).await {
            error!("command_failed: {err:#}");
            println!("error: {err:#}");
        }
        printed = print_terminal_delta(&reconciler, printed);
    }

    notifier.abort();
    session.shutdown();
    info!("client_exit");
    Ok(())
}

async fn run_command(reconciler: &Reconciler, command: ReplCommand) -> Result<()> {
    match command {
        ReplCommand::Eval(cmd) => reconciler.eval_command(&cmd).await?,
        ReplCommand::Upload(path) => {
            let bitcode = tokio::fs::read(&path)
                .await
                .with_context(|| format!("reading {}", path.display()))?;
            reconciler.upload_bitcode(&bitcode).await?;
            println!("uploaded {} bytes", bitcode.len());
        }
        ReplCommand::Focus(id) => {
            reconciler.focus(id).await?;
            print_focused(reconciler);
        }
        ReplCommand::Functions => {
            let state = reconciler.snapshot();
            for (id, name) in state.catalog.iter() {
                let marker = if id == state.focus.id { '*' } else { ' ' };
                println!("{marker}{id:>5} {name}");
            }
        }
        ReplCommand::Show => print_focused(reconciler),
        ReplCommand::Select(address) => {
            reconciler.select_ir(Some(address));
            let related = reconciler.related_addresses();
            if related.is_empty() {
                println!("no related addresses");
            } else {
                println!("{}", related.join(" "));
            }
        }
        ReplCommand::Clear => reconciler.clear_terminal(),
        ReplCommand::Help => println!("{HELP}"),
        ReplCommand::Quit | ReplCommand::Empty => {}
    }
    Ok(())
}

fn print_focused(reconciler: &Reconciler) {
    println!("{}", render_focused(&reconciler.snapshot()));
}

// Prints terminal text appended since `printed` and returns the new offset.
fn print_terminal_delta(reconciler: &Reconciler, printed: usize) -> usize {
    let state = reconciler.snapshot();
    let text = state.terminal.as_str();
    let start = if printed > text.len() || !text.is_char_boundary(printed) {
        0
    } else {
        printed
    };
    let delta = &text[start..];
    if !delta.is_empty() {
        print!("{delta}");
        if !delta.ends_with('\n') {
            println!();
        }
    }
    text.len()
}
