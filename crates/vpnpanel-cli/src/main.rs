mod cli;
mod render;

use std::io::{self, Read, Write};
use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, anyhow};
use chrono::Utc;
use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use vpnpanel_client::{
    AdminProofFeed, AdminReviewScreen, AuthFlow, ClientError, ClientResult, DiskBlobStore,
    HttpApi, MutationOutcome, PayScreen, PortalConfig, ProfileView, Route, Screen, ScreenDeps,
    SelfProofFeed, SessionStore, SqliteStore, route,
};
use vpnpanel_types::{Session, TelegramAuthPayload};

use crate::cli::{AdminCommands, Cli, Commands, PayCommands};

/// Exit status when the router sends the user elsewhere.
const REDIRECT_EXIT_CODE: i32 = 2;

struct App {
    config: PortalConfig,
    api: Arc<HttpApi>,
    sessions: SessionStore,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_writer(io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "vpnpanel=info,vpnpanel_client=info".into()),
        )
        .init();

    let cli = Cli::parse();
    let config = PortalConfig::parse(&cli.raw_config())?;

    let api = Arc::new(HttpApi::new(config.api_url.as_str())?);
    let store = SqliteStore::open(&config.session_db)
        .with_context(|| format!("opening session store {}", config.session_db.display()))?;
    let sessions = SessionStore::new(Arc::new(store));

    if config.admins.is_empty() {
        info!("No admin allow-list configured; admin screens are hidden");
    }

    let app = App { config, api, sessions };

    match cli.command {
        Commands::Login { payload } => app.login(&payload).await,
        Commands::Logout => app.logout(),
        Commands::Profile => app.profile(),
        Commands::Pay { command } => match command {
            PayCommands::List => app.pay_list().await,
            PayCommands::Upload { path } => app.pay_upload(&path).await,
            PayCommands::Watch => app.pay_watch().await,
        },
        Commands::Admin { command } => app.admin(command).await,
        Commands::Health => {
            app.api.health().await?;
            println!("{} is up", app.config.api_url);
            Ok(())
        }
    }
}

impl App {
    /// Run the router for `requested`. A redirect ends the process.
    fn enter(&self, requested: Screen) -> Option<Session> {
        let session = self.sessions.get_stored_user();
        match route(requested, session.as_ref(), &self.config.admins) {
            Route::Show(_) => session,
            Route::Redirect(to) => redirected(requested, to),
        }
    }

    fn enter_signed_in(&self, requested: Screen) -> anyhow::Result<Session> {
        self.enter(requested)
            .ok_or_else(|| anyhow!("{} needs a session", requested))
    }

    /// The server stopped accepting the stored session. Forget it and send
    /// the user back to sign in.
    fn session_rejected(&self, from: Screen) -> ! {
        if let Err(e) = AuthFlow::new(self.api.clone(), self.sessions.clone()).logout() {
            warn!("Could not clear rejected session: {}", e);
        }
        redirected(from, Screen::Auth)
    }

    fn checked<T>(&self, from: Screen, result: ClientResult<T>) -> anyhow::Result<T> {
        match result {
            Err(ClientError::NotAuthenticated) => self.session_rejected(from),
            other => Ok(other?),
        }
    }

    fn deps<B: vpnpanel_client::BlobStore>(&self, session: &Session, blobs: Arc<B>) -> ScreenDeps<HttpApi, B> {
        ScreenDeps {
            api: self.api.clone(),
            blobs,
            sessions: self.sessions.clone(),
            identity: session.identity.clone(),
            poll_interval: self.config.poll_interval,
        }
    }

    fn blob_store(&self) -> anyhow::Result<Arc<DiskBlobStore>> {
        Ok(Arc::new(DiskBlobStore::new(self.config.blob_dir.clone())?))
    }

    async fn login(&self, source: &str) -> anyhow::Result<()> {
        self.enter(Screen::Auth);

        let raw = if source == "-" {
            let mut buf = String::new();
            io::stdin().read_to_string(&mut buf)?;
            buf
        } else {
            tokio::fs::read_to_string(source)
                .await
                .with_context(|| format!("reading payload {}", source))?
        };
        let payload: TelegramAuthPayload =
            serde_json::from_str(&raw).context("payload is not a Telegram login object")?;

        let flow = AuthFlow::new(self.api.clone(), self.sessions.clone());
        let session = flow
            .on_telegram_auth(&payload)
            .await
            .map_err(|e| anyhow!(e.user_message()))?;

        // Same forward the auth screen does after a successful login.
        let view = ProfileView::build(&session, &self.config.admins, &self.config.schedule, Utc::now());
        render::profile(&view, true);
        Ok(())
    }

    fn logout(&self) -> anyhow::Result<()> {
        self.enter_signed_in(Screen::Profile)?;
        AuthFlow::new(self.api.clone(), self.sessions.clone()).logout()?;
        println!("Signed out.");
        Ok(())
    }

    fn profile(&self) -> anyhow::Result<()> {
        let session = self.enter_signed_in(Screen::Profile)?;
        let view = ProfileView::build(&session, &self.config.admins, &self.config.schedule, Utc::now());
        render::profile(&view, true);
        Ok(())
    }

    fn self_feed(&self, session: &Session) -> SelfProofFeed<HttpApi> {
        SelfProofFeed::new(
            self.api.clone(),
            self.sessions.clone(),
            session.identity.clone(),
            CancellationToken::new(),
        )
    }

    async fn pay_list(&self) -> anyhow::Result<()> {
        let session = self.enter_signed_in(Screen::ProfilePay)?;
        let feed = self.self_feed(&session);
        self.checked(Screen::ProfilePay, feed.refresh().await)?;
        render::proofs(&feed.snapshot().items, &Default::default());
        Ok(())
    }

    async fn pay_upload(&self, path: &Path) -> anyhow::Result<()> {
        let session = self.enter_signed_in(Screen::ProfilePay)?;
        let file_name = path
            .file_name()
            .and_then(|n| n.to_str())
            .ok_or_else(|| anyhow!("{} has no file name", path.display()))?;
        let bytes = tokio::fs::read(path)
            .await
            .with_context(|| format!("reading {}", path.display()))?;

        let feed = self.self_feed(&session);
        match feed.upload(file_name, bytes).await {
            Ok(()) => {}
            Err(ClientError::NotAuthenticated) => self.session_rejected(Screen::ProfilePay),
            Err(e) => return Err(anyhow!(e.user_message())),
        }
        println!("Submitted {}. An admin will review it shortly.", file_name);
        render::proofs(&feed.snapshot().items, &Default::default());
        Ok(())
    }

    async fn pay_watch(&self) -> anyhow::Result<()> {
        let session = self.enter_signed_in(Screen::ProfilePay)?;
        let screen = PayScreen::mount(self.deps(&session, self.blob_store()?));
        let mut changes = screen.changes();

        loop {
            tokio::select! {
                _ = tokio::signal::ctrl_c() => break,
                res = changes.changed() => {
                    if res.is_err() {
                        break;
                    }
                    render::clear();
                    render::self_feed(&screen.snapshot(), &screen.images().await);
                    if screen.signed_out() {
                        screen.unmount().await;
                        self.session_rejected(Screen::ProfilePay);
                    }
                }
            }
        }

        info!("Closing payment screen");
        screen.unmount().await;
        Ok(())
    }

    async fn admin(&self, command: AdminCommands) -> anyhow::Result<()> {
        let requested = match command {
            AdminCommands::Users => Screen::AdminList,
            _ => Screen::AdminReview,
        };
        let session = self.enter_signed_in(requested)?;

        if let AdminCommands::Watch { user } = command {
            return self.admin_watch(&session, user).await;
        }

        let feed = AdminProofFeed::new(
            self.api.clone(),
            self.sessions.clone(),
            session.identity.clone(),
            CancellationToken::new(),
        );

        match command {
            AdminCommands::Users => {
                self.checked(requested, feed.refresh().await)?;
                render::users(&feed.snapshot().users, None);
            }
            AdminCommands::Proofs { user } => {
                if let Some(id) = user {
                    feed.preselect(id);
                }
                self.checked(requested, feed.refresh().await)?;
                render::admin_feed(&feed.snapshot(), &Default::default());
            }
            AdminCommands::Approve { id } => {
                self.checked(requested, feed.refresh().await)?;
                report(id, "approved", self.checked(requested, feed.approve(id).await)?);
            }
            AdminCommands::Reject { id } => {
                self.checked(requested, feed.refresh().await)?;
                report(id, "rejected", self.checked(requested, feed.reject(id).await)?);
            }
            AdminCommands::Reset { id } => {
                self.checked(requested, feed.refresh().await)?;
                let outcome = feed.reset_to_pending(id).await;
                report(id, "reset to pending", self.checked(requested, outcome)?);
            }
            AdminCommands::Delete { id, yes } => {
                let outcome = if yes {
                    feed.delete(id, &|_: &str| true).await
                } else {
                    feed.delete(id, &|prompt: &str| ask(prompt)).await
                };
                report(id, "deleted", self.checked(requested, outcome)?);
            }
            AdminCommands::Watch { .. } => {}
        }
        Ok(())
    }

    async fn admin_watch(&self, session: &Session, user: Option<i64>) -> anyhow::Result<()> {
        let screen = AdminReviewScreen::mount_with_selection(self.deps(session, self.blob_store()?), user);
        let mut changes = screen.changes();

        loop {
            tokio::select! {
                _ = tokio::signal::ctrl_c() => break,
                res = changes.changed() => {
                    if res.is_err() {
                        break;
                    }
                    render::clear();
                    render::admin_feed(&screen.snapshot(), &screen.images().await);
                    if screen.signed_out() {
                        screen.unmount().await;
                        self.session_rejected(Screen::AdminReview);
                    }
                }
            }
        }

        info!("Closing review screen");
        screen.unmount().await;
        Ok(())
    }
}

fn redirected(requested: Screen, to: Screen) -> ! {
    let hint = match to {
        Screen::Auth => "sign in with `vpnpanel login --payload <file>`",
        _ => "see `vpnpanel profile`",
    };
    eprintln!("{} is not available, redirected to {}: {}", requested, to, hint);
    std::process::exit(REDIRECT_EXIT_CODE);
}

fn report(id: i64, done: &str, outcome: MutationOutcome) {
    match outcome {
        MutationOutcome::Applied => println!("Proof #{} {}.", id, done),
        MutationOutcome::Unchanged => println!("Proof #{} is already {}.", id, done),
        MutationOutcome::Declined => println!("Kept proof #{}.", id),
        MutationOutcome::Busy => println!("Another change is still running, try again."),
    }
}

fn ask(prompt: &str) -> bool {
    print!("{} [y/N] ", prompt);
    if io::stdout().flush().is_err() {
        return false;
    }
    let mut line = String::new();
    if io::stdin().read_line(&mut line).is_err() {
        return false;
    }
    matches!(line.trim().to_ascii_lowercase().as_str(), "y" | "yes")
}
