//! Terminal console for the IoT dashboard session manager.
//!
//! Wires a session manager to the configured identity backend and runs an
//! interactive prompt over it.

use anyhow::{Context, Result};
use iot_console::{
    backend,
    commands::{Command, parse_command, startup_login},
    console::Console,
    logging,
};
use iot_session::{SessionConfig, SessionPhase};
use pico_args::Arguments;
use std::io::Write;
use tokio::io::{AsyncBufReadExt, BufReader};

const HELP: &str = "\
Interactive session console for the IoT dashboard

USAGE:
  iot_console [OPTIONS]

OPTIONS:
  --backend NAME        Identity backend: memory or firebase  [default: memory]
  --email EMAIL         Sign in with this email on start
  --password PASS       Password for --email

FLAGS:
  -h, --help            Print help information

ENVIRONMENT:
  IOT_AUTH_BACKEND, FIREBASE_API_KEY, FIREBASE_PROJECT_ID, FIREBASE_AUTH_DOMAIN,
  FIREBASE_AUTH_URL, FIREBASE_TOKEN_URL, FIRESTORE_URL, IOT_PROBE_ADDR,
  IOT_PROBE_INTERVAL_SECS,
  IOT_DEFAULT_DISPLAY_NAME, RUST_LOG
";

struct Args {
    backend: Option<String>,
    login: Option<Command>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let mut pargs = Arguments::from_env();

    if pargs.contains(["-h", "--help"]) {
        print!("{HELP}");
        std::process::exit(0);
    }

    let email = pargs.opt_value_from_str("--email").ok().flatten();
    let password = pargs.opt_value_from_str("--password").ok().flatten();
    let login = match startup_login(email, password) {
        Ok(login) => login,
        Err(err) => {
            eprintln!("{err}");
            std::process::exit(2);
        }
    };

    let args = Args {
        backend: pargs.opt_value_from_str("--backend").ok().flatten(),
        login,
    };

    dotenvy::dotenv().ok();
    logging::init();

    run(args).await
}

async fn run(args: Args) -> Result<()> {
    let config = SessionConfig::from_env(args.backend).context("Failed to load configuration")?;
    config.validate().context("Invalid configuration")?;
    tracing::info!("Using {} backend", config.backend.name());

    let session = backend::build(&config)?;
    let tasks = session.manager.start();
    let console = Console::new(session.manager.clone(), session.manual_connectivity);

    // Report changes that happen outside of a command
    let mut changes = session.manager.subscribe();
    let watcher = tokio::spawn(async move {
        let mut last_phase = changes.borrow_and_update().phase();
        while changes.changed().await.is_ok() {
            let phase = changes.borrow_and_update().phase();
            if phase != last_phase {
                tracing::debug!("Session phase {:?} -> {:?}", last_phase, phase);
                last_phase = phase;
            }
        }
    });

    let initial = session
        .manager
        .store()
        .wait_for(|s| s.initialized)
        .await;
    if initial.phase() == SessionPhase::Authenticated {
        println!("Session restored.");
    }

    if let Some(login) = args.login {
        if let Command::Login { email, .. } = &login {
            println!("Signing in as {}...", email);
        }
        console.execute(login).await;
    }

    println!("{}", iot_console::console::render_state(&session.manager.snapshot()));
    println!("Type 'help' for commands.");

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        print!("> ");
        std::io::stdout().flush()?;

        let Some(line) = lines.next_line().await? else {
            break;
        };

        match parse_command(&line) {
            Ok(command) => match console.execute(command).await {
                Some(output) => println!("{}", output),
                None => break,
            },
            Err(err) => println!("{}", err),
        }
    }

    watcher.abort();
    tasks.shutdown();
    println!("Bye.");
    Ok(())
}
