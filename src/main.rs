use std::future::Future;
use std::sync::{Arc, Weak};

use clap::{Args, Parser, Subcommand};
use farmconnect::auth::{AuthApi, AuthError, GatewayClient, Role};
use farmconnect::config::{AppConfig, ConfigError, DEFAULT_APP_SCHEME, DEFAULT_AUTH_REDIRECT_HOST};
use farmconnect::deep_link::{LinkPatterns, extract_tokens};
use farmconnect::form::{AuthForm, FieldErrors, FormMode, SubmitOutcome};
use farmconnect::notice::{Notice, NoticeKind};
use farmconnect::verification::{Observer, Shell, Signal, VerificationState, WatchConfig, Watchers};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

const LINK_BUFFER: usize = 8;

#[derive(Debug, thiserror::Error)]
enum CliError {
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),
    #[error("auth backend error: {0}")]
    Auth(#[from] AuthError),
    #[error("invalid input: {0}")]
    Invalid(String),
    #[error("{0}")]
    Rejected(Notice),
    #[error("stdin read failed: {0}")]
    Io(#[from] std::io::Error),
    #[error("invalid JSON payload: {0}")]
    Json(#[from] serde_json::Error),
}

#[derive(Parser, Debug)]
#[command(name = "farmconnect", about = "FarmConnect PH account and verification shell")]
struct Cli {
    #[command(flatten)]
    backend: BackendArgs,

    #[command(subcommand)]
    command: Command,
}

#[derive(Args, Debug)]
struct BackendArgs {
    #[arg(long, env = "SUPABASE_URL", global = true)]
    base_url: Option<String>,

    #[arg(long, env = "SUPABASE_ANON_KEY", hide_env_values = true, global = true)]
    anon_key: Option<String>,
}

impl BackendArgs {
    fn config(self) -> Result<AppConfig, CliError> {
        let base_url = self.base_url.ok_or(ConfigError::Missing { var: "SUPABASE_URL" })?;
        let anon_key = self.anon_key.ok_or(ConfigError::Missing { var: "SUPABASE_ANON_KEY" })?;
        Ok(AppConfig::from_env_with(base_url, anon_key)?)
    }
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Create an account, then wait for the emailed verification link.
    SignUp {
        #[arg(long)]
        email: String,
        #[arg(long)]
        password: String,
        #[arg(long, default_value_t = Role::Consumer)]
        role: Role,
        /// Return right after sign-up instead of waiting for verification.
        #[arg(long, default_value_t = false)]
        no_wait: bool,
    },
    SignIn {
        #[arg(long)]
        email: String,
        #[arg(long)]
        password: String,
    },
    /// Show the screen for the given tokens, or the login screen.
    Whoami(TokenArgs),
    SignOut(TokenArgs),
    /// Arm verification watchers and read deep-link URLs from stdin, one per line.
    Watch {
        /// URL the app was opened with.
        #[arg(long)]
        open_url: Option<String>,
    },
    /// Classify a deep link and report which tokens it carries.
    ParseLink(ParseLinkArgs),
}

#[derive(Args, Debug)]
struct TokenArgs {
    #[arg(long, env = "FARMCONNECT_ACCESS_TOKEN", hide_env_values = true, requires = "refresh_token")]
    access_token: Option<String>,

    #[arg(long, env = "FARMCONNECT_REFRESH_TOKEN", hide_env_values = true)]
    refresh_token: Option<String>,
}

impl TokenArgs {
    fn pair(&self) -> Option<(&str, &str)> {
        Some((self.access_token.as_deref()?, self.refresh_token.as_deref()?))
    }
}

#[derive(Args, Debug)]
struct ParseLinkArgs {
    url: String,

    #[arg(long, env = "APP_SCHEME", default_value = DEFAULT_APP_SCHEME)]
    scheme: String,

    #[arg(long, env = "AUTH_REDIRECT_HOST", default_value = DEFAULT_AUTH_REDIRECT_HOST)]
    redirect_host: String,
}

#[tokio::main]
async fn main() -> Result<(), CliError> {
    // A missing .env is normal; real env vars still apply.
    let _ = dotenvy::dotenv();
    tracing_subscriber::fmt().with_writer(std::io::stderr).init();

    let cli = Cli::parse();
    match cli.command {
        Command::ParseLink(args) => run_parse_link(&args),
        command => {
            let config = cli.backend.config()?;
            run(config, command).await
        }
    }
}

async fn run(config: AppConfig, command: Command) -> Result<(), CliError> {
    let open_url = match &command {
        Command::Watch { open_url } => open_url.clone(),
        _ => None,
    };
    let app = App::start(&config, open_url).await?;

    let result = match command {
        Command::SignUp { email, password, role, no_wait } => run_sign_up(&app, email, password, role, !no_wait).await,
        Command::SignIn { email, password } => run_sign_in(&app, email, password).await,
        Command::Whoami(tokens) => run_whoami(&app, &tokens).await,
        Command::SignOut(tokens) => run_sign_out(&app, &tokens).await,
        Command::Watch { .. } => run_watch(&app).await,
        Command::ParseLink(args) => run_parse_link(&args),
    };

    app.shutdown().await;
    result
}

// =============================================================================
// APP WIRING
// =============================================================================

/// One running shell: gateway, state owner, armed watchers, and the notice
/// printer.
struct App {
    api: Arc<dyn AuthApi>,
    shell: Arc<Shell>,
    links: mpsc::Sender<String>,
    watchers: Watchers,
    printer: JoinHandle<()>,
}

impl App {
    async fn start(config: &AppConfig, open_url: Option<String>) -> Result<Self, CliError> {
        let api: Arc<dyn AuthApi> = Arc::new(GatewayClient::new(config)?);
        let (shell, notices) = Shell::new();
        let printer = tokio::spawn(print_notices(Arc::downgrade(&shell), notices));

        shell.bootstrap(api.as_ref()).await;

        let (links, rx) = mpsc::channel(LINK_BUFFER);
        let watchers =
            Watchers::arm(Arc::clone(&shell), Arc::clone(&api), rx, open_url, WatchConfig::from_config(config));

        Ok(Self { api, shell, links, watchers, printer })
    }

    /// Release the watchers, then let the printer drain what is left.
    async fn shutdown(self) {
        let Self { api, shell, links, watchers, printer } = self;
        watchers.teardown().await;
        drop(links);
        drop(shell);
        drop(api);
        if let Err(e) = printer.await {
            tracing::error!(error = %e, "notice printer failed");
        }
    }
}

/// Print notices until the shell is dropped. The success acknowledgment is
/// dismissed as soon as it has been shown.
async fn print_notices(shell: Weak<Shell>, mut notices: mpsc::UnboundedReceiver<Notice>) {
    while let Some(notice) = notices.recv().await {
        match notice.kind {
            NoticeKind::Info | NoticeKind::VerificationSuccess => println!("{notice}"),
            NoticeKind::Warning => println!("warning: {notice}"),
            NoticeKind::Error => println!("error: {notice}"),
        }
        if notice.kind == NoticeKind::VerificationSuccess {
            if let Some(shell) = shell.upgrade() {
                shell.apply(Signal::Acknowledged);
                print_screen(&shell);
            }
        }
    }
}

fn print_screen(shell: &Shell) {
    let screen = shell.screen();
    println!("== {} ==", screen.title());
    if !screen.subtitle().is_empty() {
        println!("{}", screen.subtitle());
    }
    if screen.is_dashboard() {
        if let Some(user) = shell.snapshot().user {
            println!("signed in as {} ({})", user.email_or_id(), user.role());
        }
    }
}

/// Forward stdin lines to the deep-link watcher until `stop` resolves. When
/// stdin closes first, `keep_waiting` decides whether to still wait on `stop`.
async fn pump_links<F>(links: &mpsc::Sender<String>, stop: F, keep_waiting: bool) -> Result<(), CliError>
where
    F: Future<Output = ()>,
{
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    tokio::pin!(stop);

    loop {
        tokio::select! {
            () = &mut stop => return Ok(()),
            line = lines.next_line() => match line? {
                Some(line) => {
                    let url = line.trim();
                    if !url.is_empty() && links.send(url.to_owned()).await.is_err() {
                        return Ok(());
                    }
                }
                None => {
                    if keep_waiting {
                        stop.await;
                    }
                    return Ok(());
                }
            },
        }
    }
}

async fn interrupted() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::warn!(error = %e, "ctrl-c handler unavailable");
        std::future::pending::<()>().await;
    }
}

// =============================================================================
// COMMANDS
// =============================================================================

fn describe_field_errors(errors: &FieldErrors) -> String {
    [errors.email.as_deref(), errors.password.as_deref()]
        .into_iter()
        .flatten()
        .collect::<Vec<_>>()
        .join("; ")
}

/// Print the outcome's notice, or turn a rejection into an error.
fn report(outcome: &SubmitOutcome) -> Result<(), CliError> {
    match outcome {
        SubmitOutcome::Invalid(errors) => Err(CliError::Invalid(describe_field_errors(errors))),
        SubmitOutcome::Failed(notice) => Err(CliError::Rejected(notice.clone())),
        SubmitOutcome::SignedIn(notice) | SubmitOutcome::SignedUp { notice, .. } => {
            println!("{notice}");
            Ok(())
        }
    }
}

async fn run_sign_up(app: &App, email: String, password: String, role: Role, wait: bool) -> Result<(), CliError> {
    let mut form = AuthForm::new(FormMode::SignUp);
    form.role = role;
    form.detached = !wait;
    form.set_email(email);
    form.set_password(password);

    let outcome = form.submit(app.api.as_ref()).await;
    report(&outcome)?;

    let SubmitOutcome::SignedUp { awaiting_verification, .. } = outcome else {
        return Ok(());
    };
    if !awaiting_verification {
        app.shell.observe_session(app.api.get_session().await?, Observer::Local);
        print_screen(&app.shell);
        return Ok(());
    }
    if !wait {
        return Ok(());
    }

    app.shell.apply(Signal::SignUpPending);
    println!("Waiting for email verification. Paste the link from the email here, or press Ctrl-C to stop.");

    let mut status = app.shell.watch_verification();
    let settled = async move {
        tokio::select! {
            _ = status.wait_for(|s| *s != VerificationState::Waiting) => {}
            () = interrupted() => {}
        }
    };
    pump_links(&app.links, settled, true).await?;

    if app.shell.verification() != VerificationState::Waiting {
        form.reset();
    }
    Ok(())
}

async fn run_sign_in(app: &App, email: String, password: String) -> Result<(), CliError> {
    let mut form = AuthForm::new(FormMode::Login);
    form.set_email(email);
    form.set_password(password);

    let outcome = form.submit(app.api.as_ref()).await;
    report(&outcome)?;

    app.shell.observe_session(app.api.get_session().await?, Observer::Local);
    print_screen(&app.shell);
    Ok(())
}

async fn install_tokens(app: &App, tokens: &TokenArgs) -> Result<(), CliError> {
    if let Some((access, refresh)) = tokens.pair() {
        let session = app.api.set_session(access, refresh).await?;
        app.shell.observe_session(Some(session), Observer::Local);
    }
    Ok(())
}

async fn run_whoami(app: &App, tokens: &TokenArgs) -> Result<(), CliError> {
    install_tokens(app, tokens).await?;
    print_screen(&app.shell);
    if let Some(user) = app.shell.snapshot().user {
        let verified = if user.is_confirmed() { "verified" } else { "not verified" };
        println!("email {verified}");
    }
    Ok(())
}

async fn run_sign_out(app: &App, tokens: &TokenArgs) -> Result<(), CliError> {
    install_tokens(app, tokens).await?;
    app.api.sign_out().await?;
    app.shell.apply(Signal::SignedOut);
    print_screen(&app.shell);
    Ok(())
}

async fn run_watch(app: &App) -> Result<(), CliError> {
    print_screen(&app.shell);
    println!("Watching for verification. Paste deep links here; Ctrl-C or end of input stops.");
    pump_links(&app.links, interrupted(), false).await
}

fn run_parse_link(args: &ParseLinkArgs) -> Result<(), CliError> {
    let patterns = LinkPatterns::new(&args.scheme, &args.redirect_host);
    let tokens = extract_tokens(&args.url);
    let report = serde_json::json!({
        "kind": format!("{:?}", patterns.classify(&args.url)),
        "access_token": tokens.access_token.is_some(),
        "refresh_token": tokens.refresh_token.is_some(),
        "type": tokens.flow_type,
    });
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}
