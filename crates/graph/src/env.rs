//! `.env` credential file handling.

use exn::ResultExt;
use quire_remote::error::{ErrorKind, Result};
use std::collections::HashMap;
use std::io::Write;
use std::path::Path;
use tempfile::NamedTempFile;
use tokio::fs;

pub const CLIENT_ID_VAR: &str = "MICROSOFT_CLIENT_ID";
pub const AUTHORITY_VAR: &str = "MICROSOFT_AUTHORITY";
pub const REFRESH_TOKEN_VAR: &str = "MICROSOFT_REFRESH_TOKEN";
pub const ACCESS_TOKEN_VAR: &str = "MICROSOFT_ACCESS_TOKEN";
pub const DEFAULT_AUTHORITY: &str = "https://login.microsoftonline.com/common";

/// Credentials read from a `.env` file, falling back to the process
/// environment for anything the file doesn't set.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct EnvCredentials {
    pub client_id: Option<String>,
    pub authority: Option<String>,
    pub refresh_token: Option<String>,
    pub access_token: Option<String>,
}

impl std::fmt::Debug for EnvCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EnvCredentials")
            .field("client_id", &self.client_id)
            .field("authority", &self.authority)
            .field("refresh_token", &self.refresh_token.as_ref().map(|_| "<redacted>"))
            .field("access_token", &self.access_token.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

impl EnvCredentials {
    /// Read `path` (a missing file is fine) without modifying the process
    /// environment.
    pub fn load(path: &Path) -> Result<Self> {
        let mut vars = HashMap::new();
        if path.is_file() {
            let iter = dotenvy::from_path_iter(path)
                .or_raise(|| ErrorKind::Auth(format!("could not read {}", path.display())))?;
            for item in iter {
                let (key, value) = item.or_raise(|| ErrorKind::Auth(format!("malformed line in {}", path.display())))?;
                vars.insert(key, value);
            }
        }
        Ok(Self::from_lookup(|key| vars.get(key).cloned().or_else(|| std::env::var(key).ok())))
    }

    pub(crate) fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let non_empty = |key: &str| lookup(key).map(|value| value.trim().to_string()).filter(|v| !v.is_empty());
        Self {
            client_id: non_empty(CLIENT_ID_VAR),
            authority: non_empty(AUTHORITY_VAR),
            refresh_token: non_empty(REFRESH_TOKEN_VAR),
            access_token: non_empty(ACCESS_TOKEN_VAR),
        }
    }

    pub fn authority(&self) -> &str {
        self.authority.as_deref().unwrap_or(DEFAULT_AUTHORITY)
    }
}

/// Replace `key`'s assignment in `.env` contents, or append one. Other lines
/// (comments, unrelated keys, blank lines) are preserved verbatim.
pub(crate) fn upsert_env_var(contents: &str, key: &str, value: &str) -> String {
    let assignment = format!("{key}={value}");
    let mut replaced = false;
    let mut lines: Vec<String> = contents
        .lines()
        .map(|line| {
            let trimmed = line.trim_start();
            let trimmed = trimmed.strip_prefix("export ").unwrap_or(trimmed);
            if !replaced && trimmed.strip_prefix(key).is_some_and(|rest| rest.trim_start().starts_with('=')) {
                replaced = true;
                assignment.clone()
            } else {
                line.to_string()
            }
        })
        .collect();
    if !replaced {
        lines.push(assignment);
    }
    let mut out = lines.join("\n");
    out.push('\n');
    out
}

/// Persist a rotated refresh token into the `.env` file it came from.
///
/// Returns `false` without touching the disk when there is no such file: the
/// token then came from the process environment and only lives for this run.
pub(crate) async fn persist_refresh_token(path: &Path, token: &str) -> Result<bool> {
    let contents = match fs::read_to_string(path).await {
        Ok(contents) => contents,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(false),
        Err(e) => return Err(e).or_raise(|| ErrorKind::Auth(format!("could not read {}", path.display()))),
    };
    let updated = upsert_env_var(&contents, REFRESH_TOKEN_VAR, token);
    let path = path.to_path_buf();
    tokio::task::spawn_blocking(move || replace_file(&path, updated.as_bytes()))
        .await
        .or_raise(|| ErrorKind::Auth("credentials file update was interrupted".to_string()))??;
    Ok(true)
}

/// Atomically replace an existing file, keeping its permissions. The
/// replacement is staged in a sibling temp file that only the owner can read.
fn replace_file(path: &Path, contents: &[u8]) -> Result<()> {
    let failed = |action: &str| ErrorKind::Auth(format!("could not {action} {}", path.display()));
    let permissions = std::fs::metadata(path).or_raise(|| failed("read"))?.permissions();
    let parent = path.parent().filter(|p| !p.as_os_str().is_empty()).unwrap_or(Path::new("."));
    let mut temp = NamedTempFile::new_in(parent).or_raise(|| failed("stage a replacement for"))?;
    temp.write_all(contents).or_raise(|| failed("write"))?;
    temp.as_file().set_permissions(permissions).or_raise(|| failed("write"))?;
    temp.persist(path).or_raise(|| failed("replace"))?;
    Ok(())
}
