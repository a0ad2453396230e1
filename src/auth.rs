use std::path::PathBuf;

use tracing::debug;

use crate::error::{DashError, Result};

const TOKEN_ENV_VARS: [&str; 2] = ["GITHUB_TOKEN", "GH_TOKEN"];

/// Try to run a CLI command and capture stdout as a token
fn try_cli_token(program: &str, args: &[&str]) -> Option<String> {
    let output = std::process::Command::new(program)
        .args(args)
        .output()
        .ok()?;

    if output.status.success() {
        non_empty(String::from_utf8_lossy(&output.stdout).as_ref())
    } else {
        None
    }
}

fn non_empty(raw: &str) -> Option<String> {
    let token = raw.trim();
    if token.is_empty() {
        None
    } else {
        Some(token.to_string())
    }
}

/// ~/.config/gitdash/token
fn token_path() -> Option<PathBuf> {
    let config_dir = dirs::config_dir()?;
    Some(config_dir.join("gitdash").join("token"))
}

fn load_stored_token() -> Option<String> {
    let path = token_path()?;
    let token = std::fs::read_to_string(path).ok()?;
    non_empty(&token)
}

/// Resolve a GitHub token, trying in order:
/// 1. `GITHUB_TOKEN` / `GH_TOKEN`
/// 2. the stored token file
/// 3. `gh auth token`
pub fn load_token() -> Result<String> {
    for var in TOKEN_ENV_VARS {
        if let Some(token) = std::env::var(var).ok().as_deref().and_then(non_empty) {
            debug!(source = var, "using token from environment");
            return Ok(token);
        }
    }

    if let Some(token) = load_stored_token() {
        debug!("using stored token");
        return Ok(token);
    }

    if let Some(token) = try_cli_token("gh", &["auth", "token"]) {
        debug!("using token from gh cli");
        return Ok(token);
    }

    Err(DashError::Auth(
        "no token found; set GITHUB_TOKEN or run `gh auth login`".to_string(),
    ))
}
