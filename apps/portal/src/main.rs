mod cli;

use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::Parser;
use serde::Serialize;
use serde_json::json;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use portal::backend::{AtsSubmission, ResumeFile};
use portal::identity::{FirebaseIdentityProvider, IdpCredential, PresetCredentialFlow};
use portal::models::{ProfilePatch, ProfileSeed};
use portal::plans::{catalogue, format_price, BillingCycle};
use portal::{BackendClient, CloudinaryUploader, Config, ExternalProvider, SessionManager, SessionState};

use crate::cli::{Cli, Command, Credentials};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = Config::from_env()?;

    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            EnvFilter::new(format!("{}={}", env!("CARGO_PKG_NAME"), &config.rust_log))
        }))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    info!("Starting portal v{}", env!("CARGO_PKG_VERSION"));

    if let Command::Plans = cli.command {
        return print_json(&plans(), cli.pretty);
    }

    let backend = BackendClient::new(&config.backend_url, config.http_timeout)
        .context("Failed to build backend client")?;
    info!("Backend client initialized ({})", backend.base_url());

    let mut provider = FirebaseIdentityProvider::new(
        config.require_firebase_api_key()?,
        &config.identity_toolkit_url,
        &config.secure_token_url,
        config.http_timeout,
    )?;
    if let Command::Google { id_token } = &cli.command {
        let flow = PresetCredentialFlow::new(Some(IdpCredential::IdToken(id_token.clone())));
        provider = provider.with_interactive_flow(Arc::new(flow));
    }

    let session = SessionManager::start(Arc::new(provider), Arc::new(backend.clone()));
    session.resolved().await;

    let output = run(cli.command, &config, &session, &backend).await;
    if session.snapshot().is_authenticated() {
        session.log_out().await?;
    }

    print_json(&output?, cli.pretty)
}

async fn run(
    command: Command,
    config: &Config,
    session: &SessionManager,
    backend: &BackendClient,
) -> Result<serde_json::Value> {
    match command {
        Command::Signup {
            credentials,
            name,
            location,
            profession,
            user_type,
        } => {
            let seed = ProfileSeed {
                location,
                profession,
                user_type,
                ..ProfileSeed::with_full_name(name)
            };
            session
                .sign_up(&credentials.email, &credentials.password, seed)
                .await?;
            Ok(describe(&session.snapshot()))
        }
        Command::Login { credentials } => {
            log_in(session, &credentials).await?;
            Ok(describe(&session.snapshot()))
        }
        Command::Google { .. } => {
            match session
                .sign_in_with_external_provider(ExternalProvider::Google)
                .await?
            {
                Some(_) => Ok(describe(&session.snapshot())),
                None => bail!("Google sign-in was cancelled"),
            }
        }
        Command::Update {
            credentials,
            bio,
            location,
            skills,
        } => {
            let uid = log_in(session, &credentials).await?;
            let patch = ProfilePatch {
                bio,
                location,
                skills,
                ..Default::default()
            };
            if patch.is_empty() {
                bail!("Nothing to update");
            }
            let profile = session.update_profile(&uid, patch).await?;
            Ok(serde_json::to_value(profile)?)
        }
        Command::Avatar { credentials, image } => {
            let uid = log_in(session, &credentials).await?;
            let uploader = CloudinaryUploader::new(
                &config.cloudinary_url,
                config.require_cloudinary_cloud_name()?,
                &config.cloudinary_upload_preset,
                config.http_timeout,
            )?;
            let bytes = tokio::fs::read(&image)
                .await
                .with_context(|| format!("Failed to read {}", image.display()))?;
            let file_name = image
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_else(|| "avatar".to_string());

            let url = uploader.upload_image(&file_name, bytes).await?;
            let patch = ProfilePatch {
                photo_url: Some(url),
                ..Default::default()
            };
            let profile = session.update_profile(&uid, patch).await?;
            Ok(serde_json::to_value(profile)?)
        }
        Command::Ats {
            credentials,
            resume,
            job_title,
            company,
        } => {
            log_in(session, &credentials).await?;
            let resume = ResumeFile::from_path(&resume).await?;
            let submission = AtsSubmission::for_session(&session.snapshot(), resume)?
                .targeting(job_title, company);
            let report = backend.check_ats_score(submission).await?;
            Ok(json!({ "band": report.band(), "report": report }))
        }
        Command::Plans => Ok(plans()),
    }
}

async fn log_in(session: &SessionManager, credentials: &Credentials) -> Result<String> {
    let identity = session
        .log_in(&credentials.email, &credentials.password)
        .await?;
    Ok(identity.uid)
}

fn describe(state: &SessionState) -> serde_json::Value {
    json!({
        "phase": state.phase,
        "displayName": state.display_name(),
        "avatarUrl": state.avatar_url(),
        "identity": state.identity,
        "plan": state.profile.as_ref().map(|p| p.tier().plan().name),
        "profile": state.profile,
        "error": state.error.as_ref().map(|e| e.to_string()),
    })
}

fn plans() -> serde_json::Value {
    catalogue()
        .iter()
        .map(|plan| {
            json!({
                "plan": plan,
                "monthly": format_price(plan.price_cents(BillingCycle::Monthly)),
                "yearly": format_price(plan.price_cents(BillingCycle::Yearly)),
                "yearlySavings": format_price(plan.yearly_savings_cents()),
            })
        })
        .collect()
}

fn print_json<T: Serialize>(value: &T, pretty: bool) -> Result<()> {
    let out = if pretty {
        serde_json::to_string_pretty(value)?
    } else {
        serde_json::to_string(value)?
    };
    println!("{out}");
    Ok(())
}
