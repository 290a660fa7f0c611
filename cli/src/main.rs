use std::sync::Arc;

use clap::{Args, Parser, Subcommand};
use serde_json::{Map, Value, json};
use storefront_session::{AuthApi, AuthConfig, AuthError, AuthStateManager, Credentials, HttpAuthApi, NewUser, SessionState};

#[derive(Debug, thiserror::Error)]
enum CliError {
    #[error(transparent)]
    Auth(#[from] AuthError),
    #[error("session read failed: {0}")]
    SessionErrored(AuthError),
    #[error("invalid --field '{0}' (expected key=value)")]
    InvalidField(String),
    #[error("invalid JSON payload: {0}")]
    InvalidJson(#[from] serde_json::Error),
}

#[derive(Parser)]
#[command(name = "storefront-session", about = "Storefront session CLI")]
struct Cli {
    #[arg(long, env = "STOREFRONT_BASE_URL")]
    base_url: Option<String>,

    /// Session cookie (`name=value`) printed by an earlier sign-in.
    #[arg(long, env = "STOREFRONT_SESSION_COOKIE")]
    session_cookie: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Show who the service thinks you are.
    Me,
    SignUp(SignUpArgs),
    SignIn(CredentialArgs),
    SignOut,
    /// Sign in, read the session, sign out, and read it again.
    Flow(CredentialArgs),
}

#[derive(Args)]
struct CredentialArgs {
    #[arg(long)]
    email: String,

    #[arg(long, env = "STOREFRONT_PASSWORD")]
    password: String,
}

#[derive(Args, Debug)]
struct SignUpArgs {
    #[command(flatten)]
    credentials: CredentialArgs,

    #[arg(long)]
    username: Option<String>,

    #[arg(long)]
    name: Option<String>,

    #[arg(long)]
    phone: Option<String>,

    /// Extra registration field, repeatable: `--field newsletter=true`.
    #[arg(long = "field", value_name = "KEY=VALUE")]
    fields: Vec<String>,
}

impl std::fmt::Debug for Cli {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Cli")
            .field("base_url", &self.base_url)
            .field("session_cookie", &self.session_cookie.as_ref().map(|_| "<redacted>"))
            .field("command", &self.command)
            .finish()
    }
}

impl std::fmt::Debug for CredentialArgs {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CredentialArgs")
            .field("email", &self.email)
            .field("password", &"<redacted>")
            .finish()
    }
}

struct CliContext {
    api: Arc<HttpAuthApi>,
    auth: AuthStateManager,
}

#[tokio::main]
async fn main() -> Result<(), CliError> {
    let _ = dotenvy::dotenv();
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let ctx = build_context(&cli)?;

    match cli.command {
        Command::Me => run_me(&ctx).await,
        Command::SignUp(args) => run_sign_up(&ctx, args).await,
        Command::SignIn(args) => run_sign_in(&ctx, &args).await,
        Command::SignOut => run_sign_out(&ctx).await,
        Command::Flow(args) => run_flow(&ctx, &args).await,
    }
}

fn build_context(cli: &Cli) -> Result<CliContext, CliError> {
    let mut config = AuthConfig::from_env()?;
    if let Some(base_url) = &cli.base_url {
        config.base_url = AuthConfig::with_base_url(base_url)?.base_url;
    }

    let api = Arc::new(HttpAuthApi::new(&config)?);
    if let Some(cookie) = &cli.session_cookie {
        api.seed_session_cookie(cookie)?;
    }
    let auth = AuthStateManager::new(Arc::clone(&api) as Arc<dyn AuthApi>, config.session_stale_time());
    Ok(CliContext { api, auth })
}

async fn run_me(ctx: &CliContext) -> Result<(), CliError> {
    let state = ctx.auth.current_session().await;
    print_json(&session_json(state)?)
}

async fn run_sign_up(ctx: &CliContext, args: SignUpArgs) -> Result<(), CliError> {
    let payload = NewUser {
        email: args.credentials.email,
        password: args.credentials.password,
        username: args.username,
        name: args.name,
        phone: args.phone,
        extra: parse_fields(&args.fields)?,
    };
    let user = ctx.auth.sign_up(&payload).await?;
    print_json(&json!({ "user": user, "session_cookie": ctx.api.session_cookie_header() }))
}

async fn run_sign_in(ctx: &CliContext, args: &CredentialArgs) -> Result<(), CliError> {
    let user = ctx
        .auth
        .sign_in(&Credentials::new(&args.email, &args.password))
        .await?;
    print_json(&json!({ "user": user, "session_cookie": ctx.api.session_cookie_header() }))
}

async fn run_sign_out(ctx: &CliContext) -> Result<(), CliError> {
    ctx.auth.sign_out().await?;
    print_json(&json!({ "signed_out": true }))
}

async fn run_flow(ctx: &CliContext, args: &CredentialArgs) -> Result<(), CliError> {
    let before = session_json(ctx.auth.current_session().await)?;
    ctx.auth
        .sign_in(&Credentials::new(&args.email, &args.password))
        .await?;
    let signed_in = session_json(ctx.auth.current_session().await)?;
    ctx.auth.sign_out().await?;
    let after = session_json(ctx.auth.current_session().await)?;
    print_json(&json!({ "before": before, "signed_in": signed_in, "after": after }))
}

fn session_json(state: SessionState) -> Result<Value, CliError> {
    match state {
        SessionState::Authenticated(user) => Ok(json!({ "state": "authenticated", "user": user })),
        SessionState::Anonymous => Ok(json!({ "state": "anonymous" })),
        SessionState::Unknown | SessionState::Loading => Ok(json!({ "state": "unknown" })),
        SessionState::Errored(e) => Err(CliError::SessionErrored(e)),
    }
}

fn parse_fields(fields: &[String]) -> Result<Map<String, Value>, CliError> {
    let mut extra = Map::new();
    for field in fields {
        let Some((key, raw)) = field.split_once('=') else {
            return Err(CliError::InvalidField(field.clone()));
        };
        let key = key.trim();
        if key.is_empty() {
            return Err(CliError::InvalidField(field.clone()));
        }
        // Bare words stay strings; `true`, `3`, `{"a":1}` keep their JSON type.
        let value = serde_json::from_str(raw).unwrap_or_else(|_| Value::String(raw.to_owned()));
        extra.insert(key.to_owned(), value);
    }
    Ok(extra)
}

fn print_json(value: &Value) -> Result<(), CliError> {
    let rendered = serde_json::to_string_pretty(value)?;
    println!("{rendered}");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_fields_keeps_json_types() {
        let fields = vec!["newsletter=true".to_owned(), "course=ikebana".to_owned(), "seats=2".to_owned()];
        let extra = parse_fields(&fields).unwrap();
        assert_eq!(extra["newsletter"], json!(true));
        assert_eq!(extra["course"], json!("ikebana"));
        assert_eq!(extra["seats"], json!(2));
    }

    #[test]
    fn parse_fields_rejects_missing_key() {
        assert!(matches!(parse_fields(&["=x".to_owned()]), Err(CliError::InvalidField(_))));
        assert!(matches!(parse_fields(&["novalue".to_owned()]), Err(CliError::InvalidField(_))));
    }

    #[test]
    fn session_json_reports_errors() {
        assert_eq!(session_json(SessionState::Anonymous).unwrap(), json!({ "state": "anonymous" }));
        assert!(matches!(
            session_json(SessionState::Errored(AuthError::from_status(500, ""))),
            Err(CliError::SessionErrored(_))
        ));
    }

    #[test]
    fn cli_parses_sign_up_fields() {
        let cli = Cli::parse_from([
            "storefront-session",
            "--base-url",
            "http://127.0.0.1:5000",
            "sign-up",
            "--email",
            "ada@petals.test",
            "--password",
            "pw",
            "--field",
            "newsletter=true",
        ]);
        let Command::SignUp(args) = cli.command else {
            panic!("expected sign-up");
        };
        assert_eq!(args.credentials.email, "ada@petals.test");
        assert_eq!(args.fields, vec!["newsletter=true".to_owned()]);
    }

    #[test]
    fn debug_output_hides_password_and_cookie() {
        let cli = Cli::parse_from([
            "storefront-session",
            "--session-cookie",
            "sid=tok-secret",
            "sign-up",
            "--email",
            "ada@petals.test",
            "--password",
            "peonies4ever",
        ]);
        let shown = format!("{cli:?}");
        assert!(shown.contains("ada@petals.test"));
        assert!(!shown.contains("peonies4ever"));
        assert!(!shown.contains("tok-secret"));
    }
}
