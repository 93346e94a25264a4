use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use crate::state::ensure_tally_home;

pub const API_KEY_ENV: &str = "TALLY_API_KEY";

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct AuthState {
    pub api_key: Option<String>,
}

fn auth_path() -> Result<PathBuf> {
    Ok(ensure_tally_home()?.join("auth.json"))
}

pub fn read_auth(path: &Path) -> Result<AuthState> {
    if !path.exists() {
        return Ok(AuthState::default());
    }
    let s = fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
    serde_json::from_str(&s).with_context(|| format!("parse {}", path.display()))
}

pub fn write_auth(auth: &AuthState, path: &Path) -> Result<()> {
    let s = serde_json::to_string_pretty(auth)?;
    fs::write(path, s).with_context(|| format!("write {}", path.display()))?;
    Ok(())
}

/// The categorization service key: `$TALLY_API_KEY` first, then `~/.tally/auth.json`.
pub fn api_key() -> Result<String> {
    let from_env = std::env::var(API_KEY_ENV).ok();
    let stored = read_auth(&auth_path()?)?;
    pick_key(from_env, stored).context("no API key; set TALLY_API_KEY or run: tally auth paste-api-key")
}

fn pick_key(from_env: Option<String>, stored: AuthState) -> Option<String> {
    from_env
        .map(|k| k.trim().to_string())
        .filter(|k| !k.is_empty())
        .or(stored.api_key)
        .filter(|k| !k.is_empty())
}

fn prompt_secret(label: &str) -> Result<String> {
    print!("{}: ", label);
    io::stdout().flush().ok();
    let mut s = String::new();
    io::stdin().read_line(&mut s)?;
    Ok(s.trim().to_string())
}

pub fn paste_api_key() -> Result<()> {
    let p = auth_path()?;
    let mut auth = read_auth(&p)?;
    let key = prompt_secret("Paste API key (starts with sk-)")?;
    if !key.starts_with("sk-") {
        bail!("key didn't look like an API key (expected prefix sk-)");
    }
    auth.api_key = Some(key);
    write_auth(&auth, &p)?;
    println!("Saved API key to {}", p.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_env_key_wins_over_stored() {
        let stored = AuthState {
            api_key: Some("sk-file".to_string()),
        };
        assert_eq!(pick_key(Some(" sk-env ".to_string()), stored).as_deref(), Some("sk-env"));
    }

    #[test]
    fn test_blank_env_falls_back_to_file() {
        let stored = AuthState {
            api_key: Some("sk-file".to_string()),
        };
        assert_eq!(pick_key(Some("  ".to_string()), stored).as_deref(), Some("sk-file"));
        assert_eq!(pick_key(None, AuthState::default()), None);
    }

    #[test]
    fn test_auth_file_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("auth.json");
        assert!(read_auth(&path).unwrap().api_key.is_none());

        write_auth(
            &AuthState {
                api_key: Some("sk-abc".to_string()),
            },
            &path,
        )
        .unwrap();
        assert_eq!(read_auth(&path).unwrap().api_key.as_deref(), Some("sk-abc"));
    }
}
