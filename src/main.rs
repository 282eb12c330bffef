//! evtscan - Event Attendance Scanner
//!
//! Command line kiosk for QR check-in, ticket validation and consumption claims.

use anyhow::{bail, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use evtscan::app::cache;
use evtscan::app::types::{CheckinForm, Outcome, ScanMode, Ticket};
use evtscan::app::{App, Settings};
use evtscan::scan::flow::UNRECOGNIZED_QR_MESSAGE;
use evtscan::scan::presenter::{format_date, format_time};
use evtscan::scan::{extract_scope_id, NoticeLevel, OutcomeView, ScanFlow, ScanSession};

#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Args {
    /// Attendance API base URL (overrides settings)
    #[arg(long, global = true)]
    api_url: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print the event code inside a check-in QR payload
    Extract { text: String },
    /// Log in as admin and remember the session
    Login {
        #[arg(long)]
        email: String,
        #[arg(long, env = "EVTSCAN_PASSWORD", hide_env_values = true)]
        password: String,
    },
    /// Forget the admin session
    Logout,
    /// List events open for attendance
    Events,
    /// Check-in kiosk: scan an event QR, optionally check in right away
    Scan {
        #[command(flatten)]
        input: ScanInput,
        #[command(flatten)]
        form: FormArgs,
    },
    /// Validate participant tickets
    Validate {
        #[command(flatten)]
        input: ScanInput,
    },
    /// Claim consumption for an event (admin)
    Claim {
        /// Event ID
        #[arg(long)]
        event: String,
        #[command(flatten)]
        input: ScanInput,
    },
    /// Check in to an event by code
    Checkin {
        code: String,
        #[command(flatten)]
        form: FormArgs,
    },
    /// Show a digital ticket
    Ticket { token: String },
}

#[derive(clap::Args, Debug)]
#[group(required = true, multiple = false)]
struct ScanInput {
    /// Directory of captured frames to scan live
    #[arg(long)]
    frames: Option<PathBuf>,
    /// Image file holding a QR code
    #[arg(long)]
    image: Option<PathBuf>,
    /// Scanned text typed in by hand
    #[arg(long)]
    token: Option<String>,
}

impl ScanInput {
    fn mode(&self) -> ScanMode {
        if self.frames.is_some() {
            ScanMode::Camera
        } else {
            ScanMode::Upload
        }
    }
}

#[derive(clap::Args, Debug)]
struct FormArgs {
    #[arg(long)]
    name: Option<String>,
    #[arg(long)]
    phone: Option<String>,
    #[arg(long, default_value = "")]
    address: String,
}

impl FormArgs {
    fn to_form(&self) -> Option<CheckinForm> {
        if self.name.is_none() && self.phone.is_none() {
            return None;
        }
        Some(CheckinForm {
            name: self.name.clone().unwrap_or_default(),
            phone: self.phone.clone().unwrap_or_default(),
            address: self.address.clone(),
        })
    }
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    info!("evtscan v{}", env!("CARGO_PKG_VERSION"));

    let args = Args::parse();

    // Create tokio runtime for async operations
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?;

    runtime.block_on(run(args))
}

async fn run(args: Args) -> Result<()> {
    let mut settings = Settings::load().unwrap_or_else(|e| {
        warn!("Failed to load settings, using defaults: {}", e);
        Settings::default()
    });
    if let Some(url) = args.api_url {
        settings.api_base_url = url;
    }

    let mut app = App::new(settings, cache::load_session())?;

    match args.command {
        Command::Extract { text } => match extract_scope_id(&text) {
            Some(code) => println!("{}", code),
            None => bail!(UNRECOGNIZED_QR_MESSAGE),
        },
        Command::Login { email, password } => {
            let session = app.login(&email, &password).await?;
            let who = session
                .admin
                .name
                .clone()
                .or_else(|| session.admin.email.clone())
                .unwrap_or(email);
            println!("Logged in as {}", who);
        }
        Command::Logout => {
            app.logout()?;
            println!("Logged out");
        }
        Command::Events => {
            let events = app.api().active_events().await?;
            if events.is_empty() {
                println!("No active events");
            }
            for event in events {
                println!(
                    "{}  {}  {}  {}",
                    event.code.as_deref().unwrap_or("-"),
                    event.name,
                    event.date.as_deref().and_then(format_date).unwrap_or_default(),
                    if event.is_checkin_open { "open" } else { "closed" }
                );
            }
        }
        Command::Scan { input, form } => {
            let camera = app.camera(input.frames.as_deref());
            let mut session = app.checkin_session(camera, input.mode());
            let form = form.to_form();
            let outcome = drive(&mut session, &input, form.is_some()).await?;

            if let (Some(Outcome::Success(success)), Some(form)) = (outcome, form) {
                if let Some(code) = success.event.and_then(|e| e.code) {
                    check_in(&app, &code, &form).await?;
                }
            }
        }
        Command::Validate { input } => {
            let camera = app.camera(input.frames.as_deref());
            let mut session = app.validator_session(camera, input.mode());
            drive(&mut session, &input, false).await?;
        }
        Command::Claim { event, input } => {
            let camera = app.camera(input.frames.as_deref());
            let mut session = app.consumption_session(&event, camera, input.mode())?;
            drive(&mut session, &input, false).await?;
        }
        Command::Checkin { code, form } => {
            let Some(form) = form.to_form() else {
                bail!("--name and --phone are required");
            };
            check_in(&app, &code, &form).await?;
        }
        Command::Ticket { token } => {
            let details = app.api().ticket(&token).await?;
            if let Some(event) = &details.event {
                println!("Event:       {}", event.name);
            }
            if let Some(p) = &details.participant {
                println!("Participant: {}", p.name);
                if let Some(address) = &p.address {
                    println!("Address:     {}", address);
                }
            }
            if let Some(ticket) = &details.ticket {
                print_ticket(ticket);
            }
        }
    }

    Ok(())
}

/// Run a scan session over the chosen input and return the last outcome.
///
/// With frames, keeps scanning after each outcome until the user quits or
/// the feed ends (unless `once` is set).
async fn drive<F: ScanFlow>(
    session: &mut ScanSession<F>,
    input: &ScanInput,
    once: bool,
) -> Result<Option<Outcome>> {
    if let Some(token) = &input.token {
        let result = session.submit_text(token).await.map(|o| o.clone());
        print_notices(session);
        let outcome = result?;
        print_outcome(&outcome);
        return Ok(Some(outcome));
    }

    if let Some(path) = &input.image {
        let bytes = tokio::fs::read(path).await?;
        let result = session.upload(&bytes).await.map(|o| o.clone());
        print_notices(session);
        let outcome = result?;
        print_outcome(&outcome);
        return Ok(Some(outcome));
    }

    session.mount().await;
    print_notices(session);

    let mut stdin = BufReader::new(tokio::io::stdin()).lines();
    let mut last = None;
    loop {
        let outcome = session.next_outcome().await.cloned();
        print_notices(session);
        let Some(outcome) = outcome else {
            break;
        };
        print_outcome(&outcome);
        last = Some(outcome);

        if once {
            break;
        }
        eprintln!("Press Enter to scan the next ticket, or q to quit");
        match stdin.next_line().await? {
            Some(line) if line.trim().eq_ignore_ascii_case("q") => break,
            Some(_) => {}
            None => break,
        }
        session.reset().await;
        print_notices(session);
    }

    session.unmount();
    Ok(last)
}

async fn check_in(app: &App, code: &str, form: &CheckinForm) -> Result<()> {
    let event = app.api().checkin_event(code).await?;
    if !event.is_checkin_open {
        bail!("Check-in for {} is closed", event.name);
    }
    let ticket = app.api().check_in(code, form).await?;
    println!("Checked in to {}", event.name);
    print_ticket(&ticket);
    println!(
        "Ticket page: {}/ticket/{}",
        app.settings.public_base_url.trim_end_matches('/'),
        urlencoding::encode(&ticket.token)
    );
    Ok(())
}

fn print_ticket(ticket: &Ticket) {
    println!("Token:       {}", ticket.token);
    if let Some(time) = ticket.checked_in_at.as_deref().and_then(format_time) {
        println!("Checked in:  {}", time);
    }
}

fn print_outcome(outcome: &Outcome) {
    let view = OutcomeView::from_outcome(outcome);
    println!("{}", view.title);
    println!("{}", view.message);
    for (label, value) in &view.details {
        println!("  {:<14} {}", label, value);
    }
}

fn print_notices<F: ScanFlow>(session: &mut ScanSession<F>) {
    for notice in session.take_notices() {
        let tag = match notice.level {
            NoticeLevel::Info => "info",
            NoticeLevel::Success => "ok",
            NoticeLevel::Error => "error",
        };
        eprintln!("[{}] {}", tag, notice.message);
    }
}
