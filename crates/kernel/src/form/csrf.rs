//! CSRF token generation and verification.
//!
//! Tokens are stored in the session as `<token>:<issued_at>` entries. A token
//! is accepted once and only within [`TOKEN_VALIDITY_SECS`] of issue.

use anyhow::{Result, anyhow};
use rand::RngCore;
use sha2::{Digest, Sha256};
use tower_sessions::Session;

/// Session key for storing CSRF tokens.
const CSRF_SESSION_KEY: &str = "csrf_tokens";

/// Session key of the key form builds are bound to.
const FORM_KEY_SESSION_KEY: &str = "form_key";

/// Maximum number of tokens to store per session.
const MAX_TOKENS: usize = 10;

/// Token validity period in seconds (1 hour).
const TOKEN_VALIDITY_SECS: i64 = 3600;

fn parse_entry(entry: &str) -> Option<(&str, i64)> {
    let (token, issued) = entry.rsplit_once(':')?;
    Some((token, issued.parse().ok()?))
}

fn is_fresh(issued: i64, now: i64) -> bool {
    now - issued <= TOKEN_VALIDITY_SECS
}

async fn stored_tokens(session: &Session) -> Vec<String> {
    session
        .get(CSRF_SESSION_KEY)
        .await
        .ok()
        .flatten()
        .unwrap_or_default()
}

fn random_hex() -> String {
    let mut random_bytes = [0u8; 32];
    rand::thread_rng().fill_bytes(&mut random_bytes);
    hex::encode(random_bytes)
}

/// The session's form key, created on first use.
///
/// Form builds record the key of the session that opened them and refuse
/// requests carrying any other key.
pub async fn session_form_key(session: &Session) -> Result<String> {
    if let Some(key) = session
        .get::<String>(FORM_KEY_SESSION_KEY)
        .await
        .map_err(|e| anyhow!("failed to read form key: {e}"))?
    {
        return Ok(key);
    }

    let key = random_hex();
    session
        .insert(FORM_KEY_SESSION_KEY, &key)
        .await
        .map_err(|e| anyhow!("failed to store form key: {e}"))?;
    Ok(key)
}

/// Generate a CSRF token and store it in the session.
pub async fn generate_csrf_token(session: &Session) -> Result<String> {
    let mut random_bytes = [0u8; 32];
    rand::thread_rng().fill_bytes(&mut random_bytes);
    let now = chrono::Utc::now().timestamp();

    let mut hasher = Sha256::new();
    hasher.update(random_bytes);
    hasher.update(now.to_le_bytes());
    let token = hex::encode(hasher.finalize());

    let mut tokens = stored_tokens(session).await;
    tokens.push(format!("{token}:{now}"));
    if tokens.len() > MAX_TOKENS {
        let excess = tokens.len() - MAX_TOKENS;
        tokens.drain(..excess);
    }

    session
        .insert(CSRF_SESSION_KEY, tokens)
        .await
        .map_err(|e| anyhow!("failed to store CSRF token: {e}"))?;

    Ok(token)
}

/// Verify and consume a submitted CSRF token.
///
/// Returns `Ok(false)` for unknown, expired or empty tokens.
pub async fn verify_csrf_token(session: &Session, submitted: &str) -> Result<bool> {
    if submitted.is_empty() {
        return Ok(false);
    }

    let tokens = stored_tokens(session).await;
    if tokens.is_empty() {
        return Ok(false);
    }

    let now = chrono::Utc::now().timestamp();
    let matched = tokens.iter().any(|entry| {
        parse_entry(entry).is_some_and(|(token, issued)| token == submitted && is_fresh(issued, now))
    });
    if !matched {
        return Ok(false);
    }

    // Consume the token and drop anything stale
    let remaining: Vec<String> = tokens
        .into_iter()
        .filter(|entry| {
            parse_entry(entry)
                .is_some_and(|(token, issued)| token != submitted && is_fresh(issued, now))
        })
        .collect();

    session
        .insert(CSRF_SESSION_KEY, remaining)
        .await
        .map_err(|e| anyhow!("failed to update CSRF tokens: {e}"))?;

    Ok(true)
}
