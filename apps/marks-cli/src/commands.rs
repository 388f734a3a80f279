use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use chrono::Utc;
use marks_sync::http::{login, ApiClient, HttpRemoteStore, HttpSessionProvider};
use marks_sync::{resolve_entry, Entry, Session, SessionProvider, SyncError, SyncFailure, Synchronizer};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};

use crate::cli::Command;
use crate::config::Config;
use crate::render;
use crate::session_file::{self, StoredSession};

/// How often `watch` checks that the change listener is still running.
const LIVENESS_CHECK: Duration = Duration::from_secs(2);

struct SignedIn {
    client: ApiClient,
    session: Session,
}

pub async fn run(command: Command, config: &Config) -> anyhow::Result<ExitCode> {
    let command = match command {
        Command::Login { id_token } => return sign_in(config, &id_token).await,
        other => other,
    };

    let Some(signed_in) = connect(config).await? else {
        eprintln!("{}", render::SIGN_IN_HINT);
        return Ok(ExitCode::FAILURE);
    };

    match command {
        Command::Logout => sign_out(config, signed_in).await,
        Command::List => list(config, signed_in).await,
        Command::Add { title, url } => add(config, signed_in, &title, &url).await,
        Command::Delete { id, yes } => delete(config, signed_in, &id, yes).await,
        Command::Watch => watch(config, signed_in).await,
        Command::Whoami | Command::Login { .. } => {
            println!("{}", render::header(&signed_in.session));
            Ok(ExitCode::SUCCESS)
        }
    }
}

async fn sign_in(config: &Config, id_token: &str) -> anyhow::Result<ExitCode> {
    let (_, response) = login(&config.api_url, id_token)
        .await
        .context("sign-in failed")?;
    let stored = StoredSession::from_login(&config.api_url, response, Utc::now());
    session_file::save(&config.session_file, &stored)?;

    tracing::info!(user_id = %stored.user.id, "signed in");
    println!("{}", render::header(&Session::from(stored.user)));
    Ok(ExitCode::SUCCESS)
}

/// Restore the stored session and check it with the API. Stale or
/// rejected sessions are cleared.
async fn connect(config: &Config) -> anyhow::Result<Option<SignedIn>> {
    let Some(stored) = session_file::load(&config.session_file)? else {
        return Ok(None);
    };
    if stored.is_expired(Utc::now()) || stored.api_url != config.api_url {
        tracing::debug!(api_url = %stored.api_url, "discarding stored session");
        session_file::clear(&config.session_file)?;
        return Ok(None);
    }

    let client = ApiClient::new(&config.api_url)?.with_token(stored.access_token);
    let provider = HttpSessionProvider::new(client.clone());
    match resolve_entry(&provider).await {
        Entry::Dashboard(session) => Ok(Some(SignedIn { client, session })),
        Entry::SignIn => {
            session_file::clear(&config.session_file)?;
            Ok(None)
        }
    }
}

async fn sign_out(config: &Config, signed_in: SignedIn) -> anyhow::Result<ExitCode> {
    let provider = HttpSessionProvider::new(signed_in.client);
    if let Err(err) = provider.sign_out().await {
        tracing::warn!(%err, "server-side sign out failed");
    }
    session_file::clear(&config.session_file)?;
    println!("Signed out.");
    Ok(ExitCode::SUCCESS)
}

fn synchronizer(signed_in: SignedIn) -> Synchronizer {
    Synchronizer::new(
        Arc::new(HttpRemoteStore::new(signed_in.client)),
        signed_in.session,
    )
}

/// Drop the stored session and point back at sign-in.
fn expired(config: &Config) -> anyhow::Result<ExitCode> {
    session_file::clear(&config.session_file)?;
    eprintln!("{}", SyncFailure::SessionExpired.user_message());
    eprintln!("{}", render::SIGN_IN_HINT);
    Ok(ExitCode::FAILURE)
}

async fn list(config: &Config, signed_in: SignedIn) -> anyhow::Result<ExitCode> {
    println!("{}\n", render::header(&signed_in.session));
    let sync = synchronizer(signed_in);
    match sync.initialize().await {
        Err(SyncError::SessionExpired) => expired(config),
        result => {
            print!("{}", render::dashboard(&sync.state()));
            Ok(if result.is_ok() {
                ExitCode::SUCCESS
            } else {
                ExitCode::FAILURE
            })
        }
    }
}

async fn add(config: &Config, signed_in: SignedIn, title: &str, url: &str) -> anyhow::Result<ExitCode> {
    let sync = synchronizer(signed_in);
    match sync.add_bookmark(title, url).await {
        Ok(created) => {
            println!("Added:\n{}", render::card(&created));
            Ok(ExitCode::SUCCESS)
        }
        Err(SyncError::SessionExpired) => expired(config),
        Err(err) => {
            tracing::debug!(%err, "add failed");
            for line in render::form_errors(&sync.state().form) {
                eprintln!("{line}");
            }
            Ok(ExitCode::FAILURE)
        }
    }
}

async fn delete(config: &Config, signed_in: SignedIn, id: &str, yes: bool) -> anyhow::Result<ExitCode> {
    let sync = synchronizer(signed_in);
    if let Err(err) = sync.initialize().await {
        return match err {
            SyncError::SessionExpired => expired(config),
            err => Err(err).context(SyncFailure::Fetch.user_message()),
        };
    }

    let Some(target) = sync.request_delete(id) else {
        eprintln!("No bookmark with id {id}.");
        return Ok(ExitCode::FAILURE);
    };

    if !yes && !confirm(&render::delete_prompt(&target)).await? {
        sync.cancel_delete();
        println!("Cancelled.");
        return Ok(ExitCode::SUCCESS);
    }

    match sync.confirm_delete().await {
        Ok(_) => {
            println!("Deleted {}.", target.title);
            Ok(ExitCode::SUCCESS)
        }
        Err(SyncError::SessionExpired) => expired(config),
        Err(err) => {
            tracing::debug!(%err, "delete failed");
            eprintln!("{}", SyncFailure::Delete.user_message());
            Ok(ExitCode::FAILURE)
        }
    }
}

/// Ask a yes/no question on the terminal. Anything but `y`/`yes` declines.
async fn confirm(question: &str) -> anyhow::Result<bool> {
    let mut stdout = tokio::io::stdout();
    stdout
        .write_all(format!("{question} [y/N] ").as_bytes())
        .await?;
    stdout.flush().await?;

    let mut answer = String::new();
    BufReader::new(tokio::io::stdin())
        .read_line(&mut answer)
        .await?;
    Ok(is_yes(&answer))
}

fn is_yes(answer: &str) -> bool {
    matches!(answer.trim().to_ascii_lowercase().as_str(), "y" | "yes")
}

async fn watch(config: &Config, signed_in: SignedIn) -> anyhow::Result<ExitCode> {
    println!("{}\n", render::header(&signed_in.session));
    let sync = synchronizer(signed_in);
    match sync.initialize().await {
        Err(SyncError::SessionExpired) => return expired(config),
        Err(err) => tracing::warn!(%err, "initial fetch failed"),
        Ok(()) => {}
    }
    if let Err(err) = sync.subscribe().await {
        if err == SyncError::SessionExpired {
            return expired(config);
        }
        return Err(err).context("could not subscribe to changes");
    }

    let mut rx = sync.watch();
    let mut shown = rx.borrow_and_update().clone();
    print!("{}", render::dashboard(&shown));

    let shutdown = tokio::signal::ctrl_c();
    tokio::pin!(shutdown);
    let mut liveness = tokio::time::interval(LIVENESS_CHECK);

    loop {
        tokio::select! {
            _ = &mut shutdown => break,
            _ = liveness.tick() => {
                if !sync.is_subscribed() {
                    eprintln!("Lost connection to the change feed.");
                    return Ok(ExitCode::FAILURE);
                }
            }
            changed = rx.changed() => {
                if changed.is_err() {
                    break;
                }
                let state = rx.borrow_and_update().clone();
                if state.last_error == Some(SyncFailure::SessionExpired) {
                    sync.teardown();
                    return expired(config);
                }
                if state.bookmarks != shown.bookmarks || state.last_error != shown.last_error {
                    print!("\n{}", render::dashboard(&state));
                }
                shown = state;
            }
        }
    }

    sync.teardown();
    Ok(ExitCode::SUCCESS)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_explicit_yes_confirms() {
        assert!(is_yes("y\n"));
        assert!(is_yes(" YES "));
        assert!(!is_yes(""));
        assert!(!is_yes("n"));
        assert!(!is_yes("yep"));
    }
}
