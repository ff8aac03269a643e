//! rafflekit CLI: drives the session layer against a live API.
//!
//! # Usage
//!
//! ```bash
//! # Sign in and keep the session across invocations
//! RAFFLEKIT__API__BASE_URL=https://api.example.com rafflekit login -e ana@example.com --remember
//!
//! # Call any endpoint with the stored session
//! rafflekit request get /me/tickets
//!
//! # Check a screen's role gate
//! rafflekit authorize /admin/payments --group back-office
//!
//! rafflekit logout
//! ```
//!
//! Without `--remember` a session lasts only for the invocation that
//! created it.

#![cfg_attr(not(test), forbid(unsafe_code))]

use clap::{Parser, Subcommand, ValueEnum};
use rafflekit_gateway::ApiRequest;
use rafflekit_platform_access::{Role, RoleSet};
use std::path::PathBuf;
use std::process::ExitCode;

mod commands;
mod config;
mod error;

use crate::config::ClientConfig;
use crate::error::CliError;

#[derive(Parser)]
#[command(name = "rafflekit")]
#[command(author, version, about = "rafflekit session client")]
struct Cli {
    /// Optional TOML configuration file; environment variables override it.
    #[arg(long, env = "RAFFLEKIT_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Sign in with email and password
    Login {
        #[arg(short, long)]
        email: String,

        #[arg(long, env = "RAFFLEKIT_PASSWORD", hide_env_values = true)]
        password: String,

        /// Keep the session across restarts
        #[arg(long)]
        remember: bool,
    },
    /// Complete a login that asked for a second factor
    #[command(name = "verify-2fa")]
    VerifyTwoFactor {
        #[arg(short, long)]
        email: String,

        /// Code from the authenticator or email
        #[arg(short, long)]
        code: String,

        /// Temporary token printed by `login`
        #[arg(long)]
        temp_token: Option<String>,

        #[arg(long)]
        remember: bool,
    },
    /// Show the signed-in user
    Whoami,
    /// Send a request through the authenticated gateway
    Request {
        #[arg(value_enum)]
        method: HttpMethod,

        /// Path relative to the API base URL
        path: String,

        /// JSON body
        #[arg(long)]
        body: Option<String>,
    },
    /// Show module visibility for the signed-in user's role
    Modules {
        /// Feature keys to check; lists the explicit map when empty
        keys: Vec<String>,
    },
    /// Evaluate the role gate for a destination
    Authorize {
        destination: String,

        /// Named role group
        #[arg(long, value_enum, conflicts_with = "roles")]
        group: Option<RoleGroup>,

        /// Explicit roles, comma-separated
        #[arg(long, value_delimiter = ',')]
        roles: Vec<String>,
    },
    /// Sign out and clear stored session material
    Logout,
}

#[derive(Clone, Copy, ValueEnum)]
enum HttpMethod {
    Get,
    Post,
    Put,
    Patch,
    Delete,
}

#[derive(Clone, Copy, ValueEnum)]
enum RoleGroup {
    /// Any recognized role
    Any,
    /// admin, superadmin
    BackOffice,
    /// organizer, admin, superadmin
    OrganizerPanel,
    /// superadmin
    SuperadminOnly,
}

#[tokio::main]
async fn main() -> ExitCode {
    use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,rafflekit=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!("command failed: {e}");
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> rafflekit_core::Result<(), CliError> {
    let config = ClientConfig::load(cli.config.as_deref()).map_err(|e| CliError::Config {
        reason: e.to_string(),
    })?;
    tracing::debug!(base_url = %config.api.base_url, "loaded configuration");

    let client = rafflekit_gateway::SessionClient::connect(
        &config.api,
        config.storage.open_store(),
        &config.session,
        &config.modules,
    )
    .map_err(|e| CliError::Transport {
        reason: e.to_string(),
    })?;

    match cli.command {
        Commands::Login {
            email,
            password,
            remember,
        } => commands::login(&client, &email, password, remember).await,
        Commands::VerifyTwoFactor {
            email,
            code,
            temp_token,
            remember,
        } => commands::verify_two_factor(&client, email, &code, temp_token, remember).await,
        Commands::Whoami => commands::whoami(&client).await,
        Commands::Request { method, path, body } => {
            let request = build_request(method, path, body.as_deref())?;
            commands::request(&client, request).await
        }
        Commands::Modules { keys } => commands::modules(&client, &keys).await,
        Commands::Authorize {
            destination,
            group,
            roles,
        } => {
            let required = required_roles(group, &roles)?;
            commands::authorize(&client, &destination, &required).await
        }
        Commands::Logout => commands::logout(&client).await,
    }
}

fn build_request(
    method: HttpMethod,
    path: String,
    body: Option<&str>,
) -> rafflekit_core::Result<ApiRequest, CliError> {
    let request = match method {
        HttpMethod::Get => ApiRequest::get(path),
        HttpMethod::Post => ApiRequest::post(path),
        HttpMethod::Put => ApiRequest::put(path),
        HttpMethod::Patch => ApiRequest::patch(path),
        HttpMethod::Delete => ApiRequest::delete(path),
    };
    let Some(body) = body else {
        return Ok(request);
    };

    let json: serde_json::Value =
        serde_json::from_str(body).map_err(|e| CliError::InvalidArgument {
            reason: format!("--body is not JSON: {e}"),
        })?;
    Ok(request
        .with_json(&json)
        .map_err(|e| CliError::InvalidArgument {
            reason: e.to_string(),
        })?)
}

fn required_roles(group: Option<RoleGroup>, roles: &[String]) -> rafflekit_core::Result<RoleSet, CliError> {
    if let Some(group) = group {
        return Ok(match group {
            RoleGroup::Any => RoleSet::any_authenticated(),
            RoleGroup::BackOffice => RoleSet::back_office(),
            RoleGroup::OrganizerPanel => RoleSet::organizer_panel(),
            RoleGroup::SuperadminOnly => RoleSet::superadmin_only(),
        });
    }
    if roles.is_empty() {
        return Err(CliError::InvalidArgument {
            reason: "pass --group or --roles".to_string(),
        }
        .into());
    }

    let parsed = roles
        .iter()
        .map(|name| name.parse::<Role>())
        .collect::<Result<Vec<_>, _>>()
        .map_err(|e| CliError::InvalidArgument {
            reason: e.to_string(),
        })?;
    Ok(RoleSet::of(&parsed))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cli_definition_is_valid() {
        use clap::CommandFactory;
        Cli::command().debug_assert();
    }

    #[test]
    fn parses_request_subcommand() {
        let cli = Cli::try_parse_from([
            "rafflekit",
            "request",
            "post",
            "/tickets",
            "--body",
            r#"{"raffleId": 3}"#,
        ])
        .unwrap();
        assert!(matches!(cli.command, Commands::Request { .. }));
    }

    #[test]
    fn request_body_must_be_json() {
        let err = build_request(HttpMethod::Post, "/tickets".to_string(), Some("nope")).unwrap_err();
        assert!(err.to_string().contains("--body is not JSON"));

        let request =
            build_request(HttpMethod::Put, "/users/me".to_string(), Some(r#"{"name":"Ana"}"#))
                .unwrap();
        assert_eq!(request.path(), "/users/me");
        assert!(request.body().is_some());
    }

    #[test]
    fn roles_are_parsed_strictly() {
        let set = required_roles(None, &["Admin".to_string(), "organizer".to_string()]).unwrap();
        assert!(set.contains(Role::Admin));
        assert!(set.contains(Role::Organizer));
        assert!(!set.contains(Role::User));

        assert!(required_roles(None, &["wizard".to_string()]).is_err());
        assert!(required_roles(None, &[]).is_err());
    }

    #[test]
    fn group_wins_over_roles() {
        let set = required_roles(Some(RoleGroup::SuperadminOnly), &[]).unwrap();
        assert!(set.contains(Role::Superadmin));
        assert!(!set.contains(Role::Admin));
    }
}
