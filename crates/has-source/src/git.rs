//! Thin wrapper over the git command line.

use has_core::sanitize::sanitize_message;
use std::path::Path;
use std::process::Stdio;
use tokio::process::Command;
use tracing::{debug, warn};

use crate::repo::authenticated_url;
use crate::{SourceError, SourceResult};

/// Run `git` in `dir`. Errors have `secrets` and URL credentials scrubbed.
pub async fn run(dir: &Path, args: &[&str], secrets: &[&str]) -> SourceResult<String> {
    let output = Command::new("git")
        .args(args)
        .current_dir(dir)
        .env("GIT_TERMINAL_PROMPT", "0")
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .output()
        .await?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        let command = args.first().copied().unwrap_or_default().to_string();
        // Don't log the raw error as it may contain the token
        warn!(command = %command, "Git command failed");
        return Err(SourceError::Git {
            command,
            message: sanitize_message(stderr.trim(), secrets),
        });
    }

    Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
}

/// Shallow clone of `revision` (or the default branch) into `dest`.
///
/// Commit SHAs cannot be fetched with `--branch`; those fall back to a full
/// clone followed by a checkout.
pub async fn clone(
    url: &str,
    token: Option<&str>,
    revision: Option<&str>,
    dest: &Path,
) -> SourceResult<()> {
    let auth_url = authenticated_url(url, token);
    let secrets: Vec<&str> = token.into_iter().collect();
    let parent = dest.parent().unwrap_or(dest);
    let dest_str = dest.to_string_lossy().to_string();

    let mut args = vec!["clone", "--depth", "1", "--single-branch"];
    if let Some(rev) = revision.filter(|r| !r.is_empty()) {
        args.extend(["--branch", rev]);
    }
    args.extend([auth_url.as_str(), dest_str.as_str()]);

    debug!(path = %dest.display(), "Cloning repository");
    match run(parent, &args, &secrets).await {
        Ok(_) => Ok(()),
        Err(SourceError::Git { message, .. })
            if revision.is_some() && message.contains("not found in upstream") =>
        {
            let rev = revision.unwrap_or_default();
            if dest.exists() {
                tokio::fs::remove_dir_all(dest).await?;
            }
            run(parent, &["clone", auth_url.as_str(), dest_str.as_str()], &secrets).await?;
            run(dest, &["checkout", rev], &secrets).await?;
            Ok(())
        }
        Err(e) => Err(e),
    }
}

/// Name of the checked-out branch.
pub async fn current_branch(dir: &Path) -> SourceResult<String> {
    run(dir, &["rev-parse", "--abbrev-ref", "HEAD"], &[]).await
}

pub async fn head_commit(dir: &Path) -> SourceResult<String> {
    run(dir, &["rev-parse", "HEAD"], &[]).await
}

/// Classify a clone failure into the core error taxonomy.
pub fn classify_clone_error(err: SourceError) -> has_core::Error {
    let message = match err {
        SourceError::Git { message, .. } => message,
        other => return other.into(),
    };
    let lower = message.to_ascii_lowercase();
    if lower.contains("authentication failed")
        || lower.contains("could not read username")
        || lower.contains("permission denied")
    {
        has_core::Error::Authentication(message)
    } else if lower.contains("repository not found")
        || lower.contains("not found in upstream")
        || lower.contains("does not exist")
        || lower.contains("could not resolve host")
        || lower.contains("did not match any")
    {
        has_core::Error::NotFound(message)
    } else {
        has_core::Error::Transient(message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn git_error(message: &str) -> SourceError {
        SourceError::Git {
            command: "clone".to_string(),
            message: message.to_string(),
        }
    }

    #[test]
    fn test_classify_clone_error() {
        assert!(matches!(
            classify_clone_error(git_error("remote: Repository not found.")),
            has_core::Error::NotFound(_)
        ));
        assert!(matches!(
            classify_clone_error(git_error(
                "fatal: could not read Username for 'https://github.com'"
            )),
            has_core::Error::Authentication(_)
        ));
        assert!(matches!(
            classify_clone_error(git_error("fatal: unable to access: Connection timed out")),
            has_core::Error::Transient(_)
        ));
        assert!(matches!(
            classify_clone_error(git_error("fatal: unable to access: Could not resolve host: nope")),
            has_core::Error::NotFound(_)
        ));
    }

    #[tokio::test]
    async fn test_failed_command_is_sanitized() {
        let dir = tempfile::tempdir().unwrap();
        let err = run(
            dir.path(),
            &["clone", "https://ghp_abcdefghijklmnop@invalid.invalid/x/y.git", "out"],
            &["ghp_abcdefghijklmnop"],
        )
        .await
        .unwrap_err();
        assert!(!err.to_string().contains("ghp_abcdefghijklmnop"));
    }
}
