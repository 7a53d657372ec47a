use std::{
    path::{Path, PathBuf},
    time::{Duration, Instant},
};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use console::{Term, style};
use indicatif::{ProgressBar, ProgressStyle};
use tokio::{fs, io::AsyncReadExt};
use tracing_subscriber::{EnvFilter, fmt};

use clipmark_core::{
    Auth, ClientConfig, ExtractionForm, ExtractionUpdate, Extractor, FileStore, HttpApi,
    PollPolicy, RejectReason, SessionState, format_markers, format_results_readable,
    get_config_path, get_download_dir, get_session_dir, scan_markers, validate_registration,
};

fn format_duration(d: Duration) -> String {
    let secs = d.as_secs_f64();
    if secs < 60.0 {
        format!("{:.1}s", secs)
    } else {
        format!("{:.0}m {:.0}s", (secs / 60.0).floor(), secs % 60.0)
    }
}

#[derive(Parser)]
#[command(name = "clipmark", version)]
#[command(about = "Cut stream clips from \"Stream Time Marker\" timestamps")]
struct Cli {
    /// Clip extraction service URL
    #[arg(long, env = "CLIPMARK_API_URL", global = true)]
    api_url: Option<String>,

    /// Auth service URL
    #[arg(long, env = "CLIPMARK_AUTH_URL", global = true)]
    auth_url: Option<String>,

    /// Config file. Defaults to <config dir>/clipmark/config.toml
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Submit markers for a video and download the clips
    Extract {
        /// Video URL (Twitch/YouTube)
        url: String,

        /// File with marker lines. Reads stdin when omitted.
        #[arg(short, long)]
        markers: Option<PathBuf>,

        /// Seconds of video kept before each marker (10-300)
        #[arg(short, long)]
        duration: Option<u32>,

        /// Directory for the ZIP archive. Defaults to the download dir.
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Only print the results, skip the archive download
        #[arg(long)]
        no_download: bool,
    },
    /// Show which markers a text contains
    Markers {
        /// File with marker lines. Reads stdin when omitted.
        file: Option<PathBuf>,
    },
    /// Sign in with email and password
    Login {
        #[arg(short, long)]
        email: String,

        #[arg(long, env = "CLIPMARK_PASSWORD", hide_env_values = true)]
        password: Option<String>,
    },
    /// Create an account
    Register {
        #[arg(short, long)]
        email: String,

        #[arg(short, long)]
        username: String,

        #[arg(long, env = "CLIPMARK_PASSWORD", hide_env_values = true)]
        password: Option<String>,
    },
    /// Sign in with a Google ID token
    GoogleLogin {
        #[arg(long, env = "CLIPMARK_GOOGLE_TOKEN", hide_env_values = true)]
        token: String,
    },
    /// Ask for a password reset email
    ResetPassword {
        #[arg(short, long)]
        email: String,
    },
    /// Sign out and forget the stored session
    Logout,
    /// Show the current session
    Status,
}

fn create_spinner(msg: &str) -> ProgressBar {
    let pb = ProgressBar::new_spinner();
    pb.set_style(
        ProgressStyle::default_spinner()
            .tick_chars("⠁⠂⠄⡀⢀⠠⠐⠈ ")
            .template("{spinner:.cyan} {msg}")
            .unwrap(),
    );
    pb.set_message(msg.to_string());
    pb.enable_steady_tick(Duration::from_millis(80));
    pb
}

fn create_progress_bar(template: &str, len: u64) -> ProgressBar {
    let pb = ProgressBar::new(len);
    pb.set_style(
        ProgressStyle::default_bar()
            .tick_chars("⠁⠂⠄⡀⢀⠠⠐⠈ ")
            .template(template)
            .unwrap()
            .progress_chars("█▓░"),
    );
    pb.enable_steady_tick(Duration::from_millis(80));
    pb
}

fn ok_mark() -> console::StyledObject<&'static str> {
    style("✓").green().bold()
}

async fn read_input(file: Option<&Path>) -> Result<String> {
    match file {
        Some(path) => fs::read_to_string(path)
            .await
            .with_context(|| format!("failed to read {}", path.display())),
        None => {
            let mut text = String::new();
            tokio::io::stdin().read_to_string(&mut text).await?;
            Ok(text)
        }
    }
}

fn read_password(given: Option<String>, prompt: &str) -> Result<String> {
    if let Some(password) = given {
        return Ok(password);
    }
    let term = Term::stderr();
    term.write_str(prompt)?;
    Ok(term.read_secure_line()?)
}

async fn load_config(cli: &Cli) -> Result<ClientConfig> {
    let path = cli.config.clone().unwrap_or_else(get_config_path);
    let mut config = ClientConfig::load(&path).await?;
    if let Some(url) = &cli.api_url {
        config.api_url = url.clone();
    }
    if let Some(url) = &cli.auth_url {
        config.auth_url = url.clone();
    }
    tracing::debug!(?config, "config loaded");
    Ok(config)
}

async fn restore_session(auth: &Auth<HttpApi, FileStore>) -> SessionState {
    let spinner = create_spinner("Checking session...");
    let state = auth.init().await;
    spinner.finish_and_clear();
    state
}

fn print_session(state: &SessionState) {
    match state.user() {
        Some(user) => println!(
            "{} Signed in as {} {}",
            ok_mark(),
            style(user.display_name()).cyan().bold(),
            style(format!("<{}>", user.email)).dim()
        ),
        None => println!("{} Not signed in", style("•").dim()),
    }
}

fn print_header() {
    println!(
        "\n{}  {}\n",
        style("clipmark").cyan().bold(),
        style("Timestamp Clip Extractor").dim()
    );
}

async fn run_markers(file: Option<PathBuf>) -> Result<()> {
    let text = read_input(file.as_deref()).await?;
    let scan = scan_markers(&text);

    if scan.markers.is_empty() {
        println!("{} No \"Stream Time Marker\" timestamps found", style("!").yellow().bold());
    } else {
        println!("{} {} markers", ok_mark(), scan.markers.len());
        println!("{}", format_markers(&scan.markers));
    }

    for rejected in &scan.rejected {
        let reason = match rejected.reason {
            RejectReason::MissingClock => "no clock before marker",
            RejectReason::Malformed => "clock is not H:MM:SS",
            RejectReason::OutOfRange => "minutes or seconds out of range",
        };
        println!(
            "{} line {}: {} {}",
            style("!").yellow().bold(),
            rejected.line,
            reason,
            style(&rejected.clock).dim()
        );
    }
    Ok(())
}

async fn run_extract(
    config: &ClientConfig,
    api: HttpApi,
    url: String,
    markers: Option<PathBuf>,
    duration: Option<u32>,
    output: Option<PathBuf>,
    no_download: bool,
) -> Result<()> {
    let form = ExtractionForm {
        video_url: url,
        timestamps_input: read_input(markers.as_deref()).await?,
        clip_duration: duration.unwrap_or(config.clip_duration),
    };
    let prepared = form.validate()?;

    print_header();
    println!(
        "{} Found {} markers, {}s per clip",
        ok_mark(),
        prepared.markers.len(),
        form.clip_duration
    );
    println!("{}", style(format_markers(&prepared.markers)).dim());
    println!("{}", style("─".repeat(60)).dim());

    let auth = Auth::new(api.clone(), FileStore::new(get_session_dir()));
    let state = restore_session(&auth).await;
    let api = api.with_bearer(state.token());

    let total_start = Instant::now();
    let extractor = Extractor::new(api.clone(), PollPolicy::from(config));
    let bar = create_progress_bar(
        "{spinner:.cyan} [{bar:40.cyan/blue}] {pos:>3}% {msg}",
        100,
    );
    bar.set_message("Submitting...");
    let outcome = extractor
        .run(&form, |update| match update {
            ExtractionUpdate::Queued { task_id } => {
                bar.set_message(format!("Queued {}", style(task_id).dim()))
            }
            ExtractionUpdate::Progress { progress, message } => {
                bar.set_position(progress.into());
                if let Some(message) = message {
                    bar.set_message(message);
                }
            }
        })
        .await;

    let result = match outcome {
        Ok(result) => {
            bar.finish_and_clear();
            result
        }
        Err(e) => {
            bar.abandon();
            return Err(e.into());
        }
    };
    println!(
        "{} Extracted {} clips {}",
        ok_mark(),
        result.successful_clips,
        style(format!("[{}]", format_duration(total_start.elapsed()))).dim()
    );

    if !no_download {
        match result.download_url.as_deref() {
            Some(download_url) => {
                let dir = output.unwrap_or_else(get_download_dir);
                let bar = create_progress_bar(
                    "{spinner:.cyan} [{bar:40.green/blue}] {bytes}/{total_bytes} {msg}",
                    0,
                );
                bar.set_message("Downloading archive...");
                let path = api
                    .download_archive(
                        download_url,
                        result.zip_filename.as_deref(),
                        &dir,
                        |done, total| {
                            if let Some(total) = total {
                                bar.set_length(total);
                            }
                            bar.set_position(done);
                        },
                    )
                    .await;
                bar.finish_and_clear();
                println!(
                    "{} Saved: {}",
                    ok_mark(),
                    style(path?.display()).cyan()
                );
            }
            None => println!("{} No archive to download", style("!").yellow().bold()),
        }
    }

    println!("{}", style("─".repeat(60)).dim());
    println!("{}", format_results_readable(&result, form.clip_duration));
    Ok(())
}

async fn run(cli: Cli) -> Result<()> {
    let config = load_config(&cli).await?;
    let api = HttpApi::new(&config)?;

    match cli.command {
        Command::Extract {
            url,
            markers,
            duration,
            output,
            no_download,
        } => run_extract(&config, api, url, markers, duration, output, no_download).await,
        Command::Markers { file } => run_markers(file).await,
        Command::Login { email, password } => {
            let password = read_password(password, "Password: ")?;
            let auth = Auth::new(api, FileStore::new(get_session_dir()));
            let spinner = create_spinner("Signing in...");
            let state = auth.login(&email, &password).await;
            spinner.finish_and_clear();
            print_session(&state?);
            Ok(())
        }
        Command::Register {
            email,
            username,
            password,
        } => {
            let (password, confirm) = match password {
                Some(password) => (password.clone(), password),
                None => (
                    read_password(None, "Password: ")?,
                    read_password(None, "Confirm password: ")?,
                ),
            };
            validate_registration(&email, &username, &password, &confirm)?;
            let auth = Auth::new(api, FileStore::new(get_session_dir()));
            let spinner = create_spinner("Creating account...");
            let state = auth.register(&email, &username, &password).await;
            spinner.finish_and_clear();
            print_session(&state?);
            Ok(())
        }
        Command::GoogleLogin { token } => {
            let auth = Auth::new(api, FileStore::new(get_session_dir()));
            let state = auth.google_login(&token).await?;
            print_session(&state);
            Ok(())
        }
        Command::ResetPassword { email } => {
            let auth = Auth::new(api, FileStore::new(get_session_dir()));
            let message = auth.request_password_reset(&email).await?;
            println!("{} {}", ok_mark(), message);
            Ok(())
        }
        Command::Logout => {
            let auth = Auth::new(api, FileStore::new(get_session_dir()));
            let spinner = create_spinner("Signing out...");
            auth.logout_stored().await;
            spinner.finish_and_clear();
            println!("{} Signed out", ok_mark());
            Ok(())
        }
        Command::Status => {
            let auth = Auth::new(api, FileStore::new(get_session_dir()));
            let state = restore_session(&auth).await;
            print_session(&state);
            Ok(())
        }
    }
}

#[tokio::main]
async fn main() {
    let filter_layer = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    fmt()
        .with_env_filter(filter_layer)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    if let Err(e) = run(cli).await {
        eprintln!("{} {:#}", style("Error:").red().bold(), e);
        std::process::exit(1);
    }
}
