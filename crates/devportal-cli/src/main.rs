//! `devportal` CLI: the API developer portal from the terminal.
//!
//! Signs in with an identity-provider token, keeps the backend session
//! cookie between runs, and exposes the catalog, app management and
//! certificate issuance.

#![allow(clippy::print_stdout, clippy::print_stderr)]

mod state;

use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{Context, Result, bail};
use chrono::Utc;
use clap::{Parser, Subcommand};
use devportal_client::{
    ClientConfig, DirectorySink, IdentityProvider, Portal, SecureTokenIdentity, SessionCookieJar,
    SignInOutcome, StaticTokenIdentity,
};
use devportal_core::catalog::filter_products;
use devportal_core::format::{format_expiry, format_timestamp};
use devportal_core::model::{DeveloperApp, DeveloperDetails};
use devportal_core::validate::validate_certificate_file_name;
use state::SessionState;
use tracing::debug;

// ── ANSI color helpers ───────────────────────────────────────────────

const RESET: &str = "\x1b[0m";
const BOLD: &str = "\x1b[1m";
const DIM: &str = "\x1b[2m";
const RED: &str = "\x1b[31m";
const GREEN: &str = "\x1b[32m";
const YELLOW: &str = "\x1b[33m";
const CYAN: &str = "\x1b[36m";
const WHITE: &str = "\x1b[37m";

// ── CLI structure ────────────────────────────────────────────────────

/// devportal: API developer portal from the terminal.
#[derive(Parser)]
#[command(
    name = "devportal",
    version,
    about = "devportal CLI: browse the API catalog, manage apps and issue mTLS client certificates",
    long_about = None,
    after_help = format!(
        "{DIM}Environment variables:{RESET}\n  \
         DEVPORTAL_URL                  Backend address (default: http://127.0.0.1:8080)\n  \
         DEVPORTAL_STATE_DIR            Where the session is kept (default: ~/.devportal)\n  \
         DEVPORTAL_FIREBASE_API_KEY     Identity API key, needed for --refresh-token\n  \
         DEVPORTAL_UNAUTHORIZED_POLICY  sign-out (default) or refresh\n  \
         DEVPORTAL_LOG_LEVEL            Log filter when RUST_LOG is unset (default: warn)\n\n\
         {DIM}Examples:{RESET}\n  \
         devportal login --refresh-token $REFRESH_TOKEN\n  \
         devportal products --search orders\n  \
         devportal apps create billing --product billing-api\n  \
         devportal certs issue --out ./credentials"
    ),
)]
struct Cli {
    /// Portal backend address.
    #[arg(long, env = "DEVPORTAL_URL")]
    url: Option<String>,

    /// Directory holding the saved session.
    #[arg(long, env = "DEVPORTAL_STATE_DIR")]
    state_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Sign in with an identity token and start a backend session.
    Login {
        /// Identity-provider ID token (JWT).
        #[arg(long, env = "DEVPORTAL_ID_TOKEN", conflicts_with = "refresh_token")]
        id_token: Option<String>,
        /// Identity-provider refresh token; ID tokens are minted as needed.
        #[arg(long, env = "DEVPORTAL_REFRESH_TOKEN")]
        refresh_token: Option<String>,
    },
    /// Sign out of the backend and the identity provider.
    Logout,
    /// Register the signed-in user as a developer.
    Register,
    /// Show the signed-in developer, certificates and attributes.
    Whoami,
    /// List API products.
    Products {
        /// Only products whose name contains this text.
        #[arg(long, short)]
        search: Option<String>,
    },
    /// Developer app operations.
    Apps {
        #[command(subcommand)]
        action: AppCommands,
    },
    /// Client certificate operations.
    Certs {
        #[command(subcommand)]
        action: CertCommands,
    },
}

#[derive(Subcommand)]
enum AppCommands {
    /// List apps with their credentials.
    List,
    /// Show one app.
    Show { name: String },
    /// Create an app with access to one or more API products.
    Create {
        name: String,
        /// API product to grant (repeatable).
        #[arg(long = "product", short = 'p')]
        products: Vec<String>,
    },
    /// Delete an app.
    Delete { name: String },
}

#[derive(Subcommand)]
enum CertCommands {
    /// Generate a keypair, have the backend sign it, write the credential ZIP.
    Issue {
        /// Directory the credential archive is written to.
        #[arg(long, default_value = ".")]
        out: PathBuf,
    },
    /// Register an existing .pem or .cer certificate.
    Upload { file: PathBuf },
    /// Deregister a certificate by id.
    Delete { id: String },
}

// ── Pretty output helpers ────────────────────────────────────────────

fn header(icon: &str, title: &str) {
    println!("{BOLD}{CYAN}{icon} {title}{RESET}");
    println!("{DIM}─────────────────────────────────────────{RESET}");
}

fn kv_line(key: &str, value: &str) {
    println!("  {DIM}{key:<20}{RESET} {WHITE}{value}{RESET}");
}

fn success(msg: &str) {
    println!("{GREEN}{BOLD}✓{RESET} {msg}");
}

fn warning(msg: &str) {
    println!("{YELLOW}{BOLD}⚠{RESET} {YELLOW}{msg}{RESET}");
}

fn or_na(value: Option<&str>) -> &str {
    value.filter(|v| !v.is_empty()).unwrap_or("N/A")
}

fn print_developer(me: &DeveloperDetails) {
    header("👤", "Developer");
    let name = [me.first_name.as_deref(), me.last_name.as_deref()]
        .into_iter()
        .flatten()
        .collect::<Vec<_>>()
        .join(" ");
    kv_line("Email", or_na(me.email()));
    kv_line("Name", or_na(Some(name.as_str())));
    kv_line("Developer ID", or_na(Some(me.developer_id.as_str())));
    kv_line("Organization", or_na(me.organization_name.as_deref()));
    kv_line("Status", or_na(me.status.as_deref()));
    kv_line("Created", &format_timestamp(me.created_at.as_deref()));
    kv_line("Apps", &me.apps.len().to_string());
    println!();

    header("🔐", "Certificates");
    if me.certificates.is_empty() {
        println!("  {DIM}(none){RESET}");
    }
    for cert in &me.certificates {
        println!("  {CYAN}├─{RESET} {BOLD}{}{RESET} {DIM}{}{RESET}", cert.id, cert.fingerprint);
    }
    println!();

    if !me.attributes.is_empty() {
        header("🏷", "Attributes");
        for attr in &me.attributes {
            kv_line(&attr.name, &attr.value);
        }
        println!();
    }
}

fn print_app(app: &DeveloperApp) {
    header("📦", &app.name);
    kv_line("Status", or_na(app.status.as_deref()));
    if !app.app_id.is_empty() {
        kv_line("App ID", &app.app_id);
    }
    kv_line("Created", &format_timestamp(app.created_at.as_deref()));
    kv_line("Modified", &format_timestamp(app.last_modified_at.as_deref()));

    let now = Utc::now();
    for (i, cred) in app.credentials.iter().enumerate() {
        println!("  {BOLD}Credential {}{RESET}", i + 1);
        kv_line("Consumer key", &cred.consumer_key);
        kv_line("Consumer secret", or_na(cred.consumer_secret.as_deref()));
        kv_line("Issued", &format_timestamp(cred.issued_at.as_deref()));
        kv_line("Expires", &format_expiry(cred.expires_at.as_deref(), now));
        for product in &cred.api_products {
            println!(
                "    {CYAN}├─{RESET} {} {DIM}({}){RESET}",
                product.apiproduct, product.status
            );
        }
    }
    println!();
}

// ── Session handling ─────────────────────────────────────────────────

/// Identity kept alive for the duration of one command.
enum Identity {
    Static {
        provider: Arc<StaticTokenIdentity>,
        id_token: String,
    },
    Refresh(Arc<SecureTokenIdentity>),
}

impl Identity {
    fn from_tokens(
        config: &ClientConfig,
        id_token: Option<String>,
        refresh_token: Option<String>,
    ) -> Result<Self> {
        if let Some(refresh_token) = refresh_token {
            let provider = SecureTokenIdentity::new(config, refresh_token)
                .context("cannot use refresh-token sign-in")?;
            return Ok(Self::Refresh(Arc::new(provider)));
        }
        let Some(id_token) = id_token else {
            bail!("provide --id-token or --refresh-token");
        };
        let provider = StaticTokenIdentity::new(id_token.clone()).context("invalid ID token")?;
        Ok(Self::Static {
            provider: Arc::new(provider),
            id_token,
        })
    }

    fn provider(&self) -> Arc<dyn IdentityProvider> {
        match self {
            Self::Static { provider, .. } => Arc::clone(provider) as Arc<dyn IdentityProvider>,
            Self::Refresh(provider) => Arc::clone(provider) as Arc<dyn IdentityProvider>,
        }
    }

    async fn tokens(&self) -> (Option<String>, Option<String>) {
        match self {
            Self::Static { id_token, .. } => (Some(id_token.clone()), None),
            Self::Refresh(provider) => (None, provider.refresh_token().await),
        }
    }
}

/// A portal plus what is needed to save it again afterwards.
struct Session {
    portal: Portal,
    identity: Identity,
    cookies: Arc<SessionCookieJar>,
    state_dir: PathBuf,
}

impl Session {
    fn open(
        config: ClientConfig,
        identity: Identity,
        cookies: Arc<SessionCookieJar>,
        state_dir: &Path,
    ) -> Result<Self> {
        let portal = Portal::connect(config, identity.provider(), Arc::clone(&cookies))
            .context("failed to create HTTP client")?;
        Ok(Self {
            portal,
            identity,
            cookies,
            state_dir: state_dir.to_path_buf(),
        })
    }

    /// Resume the session saved by `devportal login`.
    fn restore(config: ClientConfig, state_dir: &Path) -> Result<Self> {
        let Some(saved) = state::load(state_dir)? else {
            bail!("not signed in; run `devportal login` first");
        };
        if saved.base_url != config.base_url {
            bail!(
                "saved session belongs to {}; run `devportal login` against {}",
                saved.base_url,
                config.base_url
            );
        }
        let identity = Identity::from_tokens(&config, saved.id_token, saved.refresh_token)?;
        let cookies = if saved.cookies.is_empty() {
            SessionCookieJar::new()
        } else {
            SessionCookieJar::from_json(&saved.cookies)
                .context("corrupt cookie jar in session file; run `devportal logout`")?
        };
        let cookies = Arc::new(cookies);
        let session = Self::open(config, identity, cookies, state_dir)?;
        session.portal.resume();
        debug!(state_dir = %state_dir.display(), "session restored");
        Ok(session)
    }

    /// Save the session if it is still live, drop it if the backend ended
    /// it.
    async fn persist(&self) -> Result<()> {
        if !self.portal.is_signed_in() {
            if state::remove(&self.state_dir)? {
                warning("The session has ended; run `devportal login` to sign in again.");
            }
            return Ok(());
        }
        let (id_token, refresh_token) = self.identity.tokens().await;
        let email = self
            .portal
            .session()
            .identity()
            .current_user()
            .and_then(|u| u.email);
        let state = SessionState {
            base_url: self.portal.config().base_url.clone(),
            cookies: self.cookies.to_json()?,
            refresh_token,
            id_token,
            email,
        };
        state::save(&self.state_dir, &state)?;
        Ok(())
    }
}

// ── Command dispatch ─────────────────────────────────────────────────

fn init_tracing() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        tracing_subscriber::EnvFilter::new(
            std::env::var("DEVPORTAL_LOG_LEVEL").unwrap_or_else(|_| "warn".to_owned()),
        )
    });
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    if std::env::var("DEVPORTAL_LOG_FORMAT").is_ok_and(|f| f.eq_ignore_ascii_case("json")) {
        builder.json().init();
    } else {
        builder.init();
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    init_tracing();
    let cli = Cli::parse();

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!();
            eprintln!("  {RED}{BOLD}✗ Error:{RESET} {e:#}");
            eprintln!();
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> Result<()> {
    let state_dir = match cli.state_dir {
        Some(dir) => dir,
        None => state::default_state_dir()?,
    };
    let mut config = ClientConfig::from_env().context("invalid DEVPORTAL_* configuration")?;
    if let Some(url) = cli.url {
        config = config.with_base_url(url);
    }

    match cli.command {
        Commands::Login {
            id_token,
            refresh_token,
        } => cmd_login(config, &state_dir, id_token, refresh_token).await,
        Commands::Logout => cmd_logout(config, &state_dir).await,
        command => {
            if let Commands::Certs {
                action: CertCommands::Upload { file },
            } = &command
            {
                check_certificate_file(file)?;
            }
            let session = Session::restore(config, &state_dir)?;
            let result = dispatch(&session.portal, command).await;
            session.persist().await?;
            result
        }
    }
}

/// Commands that run against a restored session.
async fn dispatch(portal: &Portal, command: Commands) -> Result<()> {
    match command {
        Commands::Register => cmd_register(portal).await,
        Commands::Whoami => cmd_whoami(portal).await,
        Commands::Products { search } => cmd_products(portal, search.as_deref()).await,
        Commands::Apps { action } => cmd_apps(portal, action).await,
        Commands::Certs { action } => cmd_certs(portal, action).await,
        Commands::Login { .. } | Commands::Logout => Ok(()),
    }
}

// ── Account commands ─────────────────────────────────────────────────

async fn cmd_login(
    config: ClientConfig,
    state_dir: &Path,
    id_token: Option<String>,
    refresh_token: Option<String>,
) -> Result<()> {
    let identity = Identity::from_tokens(&config, id_token, refresh_token)?;
    let session = Session::open(config, identity, Arc::new(SessionCookieJar::new()), state_dir)?;

    let outcome = session.portal.sign_in().await.context("sign-in failed")?;
    session.persist().await?;

    match outcome {
        SignInOutcome::Registered(me) => {
            success(&format!("Signed in as {}", or_na(me.email())));
            println!();
            print_developer(&me);
        }
        SignInOutcome::NeedsRegistration => {
            success("Signed in");
            warning("You are not registered as a developer yet. Run `devportal register` to continue.");
        }
    }
    Ok(())
}

async fn cmd_logout(config: ClientConfig, state_dir: &Path) -> Result<()> {
    if state::load(state_dir)?.is_none() {
        success("Already signed out");
        return Ok(());
    }
    match Session::restore(config, state_dir) {
        Ok(session) => {
            if let Err(e) = session.portal.sign_out().await {
                warning(&format!("Identity sign-out failed: {e}"));
            }
        }
        Err(e) => warning(&format!("Could not resume the saved session ({e:#}); removing it")),
    }
    state::remove(state_dir)?;
    success("Signed out");
    Ok(())
}

async fn cmd_register(portal: &Portal) -> Result<()> {
    let me = portal
        .complete_registration()
        .await
        .context("developer registration failed")?;
    success("Registered as a developer");
    println!();
    print_developer(&me);
    Ok(())
}

async fn cmd_whoami(portal: &Portal) -> Result<()> {
    let me = portal
        .backend()
        .developer_details()
        .await
        .context("failed to load developer details")?;
    print_developer(&me);
    Ok(())
}

// ── Catalog & apps ───────────────────────────────────────────────────

async fn cmd_products(portal: &Portal, search: Option<&str>) -> Result<()> {
    let products = portal
        .backend()
        .api_products()
        .await
        .context("failed to load API products")?;
    let matches = filter_products(&products, search.unwrap_or_default());

    header("📚", &format!("API Products ({})", matches.len()));
    if matches.is_empty() {
        println!("  {DIM}(no matching products){RESET}");
    }
    for product in matches {
        println!("  {CYAN}├─{RESET} {BOLD}{}{RESET} {DIM}{}{RESET}", product.name, product.id);
        if !product.description.is_empty() {
            println!("  {CYAN}│{RESET}  {}", product.description);
        }
        if let Some(spec) = &product.spec_url {
            println!("  {CYAN}│{RESET}  {DIM}spec: {spec}{RESET}");
        }
    }
    println!();
    Ok(())
}

async fn cmd_apps(portal: &Portal, action: AppCommands) -> Result<()> {
    let backend = portal.backend();
    match action {
        AppCommands::List => {
            let apps = backend.developer_apps().await.context("failed to load apps")?;
            if apps.is_empty() {
                println!("  {DIM}(no apps){RESET}");
            }
            for app in &apps {
                print_app(app);
            }
        }
        AppCommands::Show { name } => {
            let app = backend
                .developer_app(&name)
                .await
                .with_context(|| format!("failed to load app '{name}'"))?;
            print_app(&app);
        }
        AppCommands::Create { name, products } => {
            let app = backend
                .create_developer_app(&name, &products)
                .await
                .context("failed to create app")?;
            success(&format!("Created app {}", app.name));
            print_app(&app);
        }
        AppCommands::Delete { name } => {
            backend
                .delete_developer_app(&name)
                .await
                .with_context(|| format!("failed to delete app '{name}'"))?;
            success(&format!("Deleted app {name}"));
        }
    }
    Ok(())
}

// ── Certificates ─────────────────────────────────────────────────────

fn check_certificate_file(file: &Path) -> Result<()> {
    let name = file
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    validate_certificate_file_name(&name)?;
    Ok(())
}

async fn cmd_upload(portal: &Portal, file: &Path) -> Result<()> {
    let registered = portal
        .upload_certificate_file(file)
        .await
        .with_context(|| format!("upload of {} failed", file.display()))?;
    success("Certificate registered");
    kv_line("Fingerprint", or_na(registered.fingerprint.as_deref()));
    kv_line("Certificate ID", or_na(registered.certificate_id.as_deref()));
    Ok(())
}

async fn cmd_certs(portal: &Portal, action: CertCommands) -> Result<()> {
    match action {
        CertCommands::Issue { out } => {
            let sink = DirectorySink::new(&out);
            let progress = |line: &str| println!("  {DIM}›{RESET} {line}");
            header("🔑", "Issuing client certificate");
            let issued = portal
                .issue_certificate(&progress, &sink)
                .await
                .context("certificate issuance failed")?;
            println!();
            success(&format!(
                "Credential written to {}",
                sink.path_for(&issued.archive_file_name).display()
            ));
            kv_line("Key ID", &issued.key_id);
            kv_line("Fingerprint", or_na(issued.fingerprint.as_deref()));
            kv_line("Not after", or_na(issued.not_after.as_deref()));
            warning("The archive holds your private key. Store it securely.");
        }
        CertCommands::Upload { file } => cmd_upload(portal, &file).await?,
        CertCommands::Delete { id } => {
            portal
                .backend()
                .deregister_certificate(&id)
                .await
                .with_context(|| format!("failed to delete certificate '{id}'"))?;
            success(&format!("Deleted certificate {id}"));
        }
    }
    Ok(())
}
