//! Command implementations.
//!
//! Results go to stdout; diagnostics go through tracing to stderr.

use rafflekit_gateway::{ApiRequest, LoginOutcome, SessionClient, TwoFactorChallenge};
use rafflekit_platform_access::{GateOutcome, RoleSet, Token};
use secrecy::SecretString;

use crate::error::CliError;

fn auth_error(e: impl std::fmt::Display) -> CliError {
    CliError::Authentication {
        reason: e.to_string(),
    }
}

pub async fn login(
    client: &SessionClient,
    email: &str,
    password: String,
    remember: bool,
) -> rafflekit_core::Result<(), CliError> {
    let password = SecretString::from(password);
    let outcome = client
        .auth()
        .login(email, &password, remember)
        .await
        .map_err(auth_error)?;

    match outcome {
        LoginOutcome::Authenticated(session) => {
            if let Some(user) = session.user() {
                println!("signed in as {} ({})", user.email(), user.role());
            }
            if !session.persist_mode().is_durable() {
                println!("session not remembered; it ends when this command exits");
            }
        }
        LoginOutcome::TwoFactorRequired(challenge) => {
            println!("two-factor code required for {}", challenge.email);
            match challenge.temp_token {
                Some(token) => println!(
                    "run: rafflekit verify-2fa -e {} -c <code> --temp-token {}",
                    challenge.email,
                    token.expose()
                ),
                None => println!("run: rafflekit verify-2fa -e {} -c <code>", challenge.email),
            }
        }
    }
    Ok(())
}

pub async fn verify_two_factor(
    client: &SessionClient,
    email: String,
    code: &str,
    temp_token: Option<String>,
    remember: bool,
) -> rafflekit_core::Result<(), CliError> {
    let challenge = TwoFactorChallenge {
        email,
        temp_token: temp_token.map(Token::new),
    };
    let session = client
        .auth()
        .verify_two_factor(&challenge, code, remember)
        .await
        .map_err(auth_error)?;

    if let Some(user) = session.user() {
        println!("signed in as {} ({})", user.email(), user.role());
    }
    Ok(())
}

pub async fn whoami(client: &SessionClient) -> rafflekit_core::Result<(), CliError> {
    client.sessions().bootstrap().await;
    let session = client.sessions().snapshot().await;

    let Some(user) = session.user() else {
        println!("not signed in");
        return Ok(());
    };
    println!("id:    {}", user.id());
    println!("email: {}", user.email());
    println!("role:  {}", user.role());
    if let Some(name) = user.name() {
        println!("name:  {name}");
    }
    if let Some(since) = session.established_at() {
        println!("since: {}", since.to_rfc3339());
    }
    Ok(())
}

pub async fn request(client: &SessionClient, request: ApiRequest) -> rafflekit_core::Result<(), CliError> {
    let response = client
        .gateway()
        .request(request)
        .await
        .map_err(|e| CliError::Request {
            reason: e.to_string(),
        })?;

    match response.classify() {
        Some(kind) => println!("{} ({kind})", response.status()),
        None => println!("{}", response.status()),
    }
    if let Some(body) = response.body() {
        let pretty = serde_json::to_string_pretty(body).unwrap_or_else(|_| body.to_string());
        println!("{pretty}");
    }
    Ok(())
}

pub async fn modules(client: &SessionClient, keys: &[String]) -> rafflekit_core::Result<(), CliError> {
    client.sessions().bootstrap().await;
    let Some(role) = client.sessions().role().await else {
        return Err(CliError::NotSignedIn.into());
    };

    let flags = client.modules().resolve(role).await;
    println!("role {role}, source {:?}", flags.source());

    if keys.is_empty() {
        let mut explicit: Vec<_> = flags.explicit().collect();
        explicit.sort_unstable();
        for (key, visible) in explicit {
            println!("{key}: {}", if visible { "visible" } else { "hidden" });
        }
        return Ok(());
    }
    for key in keys {
        let visible = flags.is_visible(key);
        println!("{key}: {}", if visible { "visible" } else { "hidden" });
    }
    Ok(())
}

pub async fn authorize(
    client: &SessionClient,
    destination: &str,
    required: &RoleSet,
) -> rafflekit_core::Result<(), CliError> {
    let outcome = client
        .sessions()
        .authorize(client.gate(), destination, required)
        .await;

    match outcome {
        GateOutcome::Proceed => println!("allowed: {destination}"),
        GateOutcome::Denied(denial) => {
            println!("denied ({:?}): {}", denial.reason, denial.message);
            println!("login: {}", denial.login_path);
        }
    }
    Ok(())
}

pub async fn logout(client: &SessionClient) -> rafflekit_core::Result<(), CliError> {
    client.auth().logout().await.map_err(auth_error)?;
    println!("signed out");
    Ok(())
}
