use std::{error::Error, fs::OpenOptions, net::SocketAddr, path::PathBuf, sync::Arc};

use axum::{
    Router,
    extract::{MatchedPath, Request},
    middleware,
};
use axum_server::Handle;
use clap::Parser;
use tower_http::trace::TraceLayer;

#[cfg(debug_assertions)]
use tower_livereload::LiveReloadLayer;

use tracing_subscriber::{Layer, filter, layer::SubscriberExt, util::SubscriberInitExt};

use fintrack::{
    AppState, FileMailer, Mailer, SmtpMailer, build_router, get_local_offset, graceful_shutdown,
    logging_middleware,
};

/// The web server for Fintrack.
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Args {
    /// File path to the application SQLite database.
    #[arg(long, env = "DB_PATH")]
    db_path: PathBuf,

    /// The port to serve the app from.
    #[arg(short, long, env = "PORT", default_value_t = 3000)]
    port: u16,

    /// The public URL of the server, used for links in emails, e.g. "https://fintrack.example.com".
    #[arg(long, env = "BASE_URL", default_value = "http://localhost:3000")]
    base_url: String,

    /// The canonical name of the local timezone, e.g. "Pacific/Auckland".
    #[arg(long, env = "TIMEZONE", default_value = "Etc/UTC", value_parser = parse_timezone)]
    timezone: String,

    /// The secret used for encrypting cookies and signing email links.
    #[arg(long, env = "SECRET", hide_env_values = true)]
    secret: String,

    /// The SMTP relay used to send emails.
    #[arg(long, env = "SMTP_HOST", conflicts_with = "mail_dir")]
    smtp_host: Option<String>,

    #[arg(long, env = "SMTP_PORT", default_value_t = 587)]
    smtp_port: u16,

    #[arg(long, env = "SMTP_USERNAME", requires = "smtp_host")]
    smtp_username: Option<String>,

    #[arg(long, env = "SMTP_PASSWORD", hide_env_values = true, requires = "smtp_host")]
    smtp_password: Option<String>,

    /// The address emails are sent from, e.g. "Fintrack <no-reply@example.com>".
    #[arg(long, env = "MAIL_FROM", default_value = "Fintrack <no-reply@localhost>")]
    mail_from: String,

    /// Write emails to this directory instead of sending them, useful for local development.
    #[arg(long, env = "MAIL_DIR", required_unless_present = "smtp_host")]
    mail_dir: Option<PathBuf>,
}

fn parse_timezone(timezone: &str) -> Result<String, String> {
    match get_local_offset(timezone) {
        Some(_) => Ok(timezone.to_owned()),
        None => Err(format!(
            "\"{timezone}\" is not a canonical timezone name, e.g. \"Pacific/Auckland\""
        )),
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    setup_logging()?;

    let args = Args::parse();

    let addr = SocketAddr::from(([127, 0, 0, 1], args.port));

    let mailer = create_mailer(&args)?;
    let app_state = AppState::new(
        &args.db_path.to_string_lossy(),
        &args.secret,
        &args.timezone,
        &args.base_url,
        mailer,
    )?;

    let handle = Handle::new();
    tokio::spawn(graceful_shutdown(handle.clone()));

    let router = add_tracing_layer(build_router(app_state))
        .layer(middleware::from_fn(logging_middleware));

    #[cfg(debug_assertions)]
    let router = router.layer(LiveReloadLayer::new());

    tracing::info!("HTTP server listening on {}", addr);
    axum_server::bind(addr)
        .handle(handle)
        .serve(router.into_make_service())
        .await?;

    Ok(())
}

fn create_mailer(args: &Args) -> Result<Arc<dyn Mailer>, Box<dyn Error>> {
    if let Some(mail_dir) = &args.mail_dir {
        tracing::info!("Writing emails to {}", mail_dir.display());
        return Ok(Arc::new(FileMailer::new(mail_dir, &args.mail_from)?));
    }

    let (Some(host), Some(username), Some(password)) = (
        &args.smtp_host,
        &args.smtp_username,
        &args.smtp_password,
    ) else {
        return Err("--smtp-host, --smtp-username and SMTP_PASSWORD must be set together".into());
    };

    tracing::info!("Sending emails via {host}:{}", args.smtp_port);
    Ok(Arc::new(SmtpMailer::new(
        host,
        args.smtp_port,
        username.to_owned(),
        password.to_owned(),
        &args.mail_from,
    )?))
}

fn setup_logging() -> Result<(), Box<dyn Error>> {
    let stdout_log = tracing_subscriber::fmt::layer().pretty();

    let log_file = OpenOptions::new()
        .create(true)
        .append(true)
        .open("debug.log")?;

    let debug_log = tracing_subscriber::fmt::layer()
        .pretty()
        .with_writer(Arc::new(log_file));

    tracing_subscriber::registry()
        .with(
            stdout_log
                .with_filter(filter::LevelFilter::INFO)
                .and_then(debug_log)
                .with_filter(filter::LevelFilter::DEBUG),
        )
        .init();

    Ok(())
}

fn add_tracing_layer(router: Router) -> Router {
    let tracing_layer = TraceLayer::new_for_http()
        .make_span_with(|req: &Request| {
            let method = req.method();
            let uri = req.uri();

            let matched_path = req
                .extensions()
                .get::<MatchedPath>()
                .map(|matched_path| matched_path.as_str());

            tracing::debug_span!("request", %method, %uri, matched_path)
        })
        // By default, `TraceLayer` will log 5xx responses but we're doing our specific
        // logging of errors so disable that
        .on_failure(());

    router.layer(tracing_layer)
}
