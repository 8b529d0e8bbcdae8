//! Git host URL handling.

use derive_more::Display;
use url::Url;

use crate::{SourceError, SourceResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
pub enum GitHost {
    #[display("github")]
    GitHub,
    #[display("gitlab")]
    GitLab,
}

/// A repository on a supported git host.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepoUrl {
    pub host: GitHost,
    pub hostname: String,
    /// Owner, or the full group path on GitLab.
    pub owner: String,
    pub name: String,
}

impl RepoUrl {
    /// Parse an https or scp-style (`git@host:owner/repo.git`) URL.
    pub fn parse(raw: &str) -> SourceResult<Self> {
        let raw = raw.trim();
        let normalized = match raw.strip_prefix("git@") {
            Some(rest) => format!("https://{}", rest.replacen(':', "/", 1)),
            None => raw.to_string(),
        };
        let url = Url::parse(&normalized).map_err(|e| SourceError::InvalidUrl(format!("{raw}: {e}")))?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(SourceError::InvalidUrl(format!("{raw}: unsupported scheme")));
        }

        let hostname = url
            .host_str()
            .ok_or_else(|| SourceError::InvalidUrl(format!("{raw}: missing host")))?
            .to_ascii_lowercase();
        let host = if hostname == "github.com" || hostname == "www.github.com" {
            GitHost::GitHub
        } else if hostname.contains("gitlab") {
            GitHost::GitLab
        } else {
            return Err(SourceError::InvalidUrl(format!(
                "{raw}: unsupported git host {hostname}"
            )));
        };

        let mut segments: Vec<&str> = url
            .path_segments()
            .map(|s| s.filter(|seg| !seg.is_empty()).collect())
            .unwrap_or_default();
        if let Some(last) = segments.last_mut() {
            if let Some(stripped) = last.strip_suffix(".git") {
                *last = stripped;
            }
        }
        if host == GitHost::GitHub {
            segments.truncate(2);
        } else if let Some(pos) = segments.iter().position(|s| *s == "-") {
            segments.truncate(pos);
        }
        if segments.len() < 2 {
            return Err(SourceError::InvalidUrl(format!(
                "{raw}: expected owner and repository in path"
            )));
        }

        let name = segments.pop().unwrap_or_default().to_string();
        Ok(Self {
            host,
            hostname: if host == GitHost::GitHub {
                "github.com".to_string()
            } else {
                hostname
            },
            owner: segments.join("/"),
            name,
        })
    }

    /// `owner/name`.
    pub fn path(&self) -> String {
        format!("{}/{}", self.owner, self.name)
    }

    pub fn web_url(&self) -> String {
        format!("https://{}/{}", self.hostname, self.path())
    }

    pub fn clone_url(&self) -> String {
        format!("{}.git", self.web_url())
    }

    /// Host API endpoint describing the repository.
    pub fn api_url(&self) -> String {
        match self.host {
            GitHost::GitHub => format!("https://api.github.com/repos/{}", self.path()),
            GitHost::GitLab => format!(
                "https://{}/api/v4/projects/{}",
                self.hostname,
                urlencoding::encode(&self.path())
            ),
        }
    }

    /// Base URL for raw file content at `revision`, ending in `/`.
    pub fn raw_base_url(&self, revision: &str, context: &str) -> String {
        let context = has_core::api::normalize_context(context);
        let prefix = match self.host {
            GitHost::GitHub => format!(
                "https://raw.githubusercontent.com/{}/{}",
                self.path(),
                revision
            ),
            GitHost::GitLab => format!("{}/-/raw/{}", self.web_url(), revision),
        };
        if context.is_empty() {
            format!("{prefix}/")
        } else {
            format!("{prefix}/{context}/")
        }
    }

    /// Raw content URL of `file` inside `context` at `revision`.
    pub fn raw_file_url(&self, revision: &str, context: &str, file: &str) -> String {
        format!(
            "{}{}",
            self.raw_base_url(revision, context),
            file.trim_start_matches("./").trim_start_matches('/')
        )
    }
}

/// Clone URL carrying `token` as credentials.
pub fn authenticated_url(clone_url: &str, token: Option<&str>) -> String {
    match token.filter(|t| !t.is_empty()) {
        Some(token) => match clone_url.strip_prefix("https://") {
            Some(rest) => format!("https://{}@{}", token, rest),
            None => clone_url.to_string(),
        },
        None => clone_url.to_string(),
    }
}

/// Resolve `reference` against the directory of `base`. Absolute URLs pass
/// through unchanged.
pub fn resolve_relative(base: &str, reference: &str) -> String {
    if reference.starts_with("http://") || reference.starts_with("https://") {
        return reference.to_string();
    }
    match Url::parse(base).and_then(|b| b.join(reference.trim_start_matches('/'))) {
        Ok(url) => url.to_string(),
        Err(_) => reference.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_github() {
        let repo = RepoUrl::parse("https://github.com/devfile-samples/devfile-sample-python-basic.git")
            .unwrap();
        assert_eq!(repo.host, GitHost::GitHub);
        assert_eq!(repo.owner, "devfile-samples");
        assert_eq!(repo.name, "devfile-sample-python-basic");
        assert_eq!(
            repo.api_url(),
            "https://api.github.com/repos/devfile-samples/devfile-sample-python-basic"
        );
    }

    #[test]
    fn test_parse_github_tree_url_and_scp() {
        let repo = RepoUrl::parse("https://github.com/org/repo/tree/main/backend").unwrap();
        assert_eq!(repo.path(), "org/repo");

        let repo = RepoUrl::parse("git@github.com:org/repo.git").unwrap();
        assert_eq!(repo.path(), "org/repo");
    }

    #[test]
    fn test_parse_gitlab_groups() {
        let repo = RepoUrl::parse("https://gitlab.com/group/sub/project").unwrap();
        assert_eq!(repo.host, GitHost::GitLab);
        assert_eq!(repo.owner, "group/sub");
        assert_eq!(repo.name, "project");
        assert_eq!(
            repo.api_url(),
            "https://gitlab.com/api/v4/projects/group%2Fsub%2Fproject"
        );
    }

    #[test]
    fn test_parse_invalid() {
        assert!(RepoUrl::parse("not a url").is_err());
        assert!(RepoUrl::parse("https://github.com/only-owner").is_err());
        assert!(RepoUrl::parse("https://bitbucket.org/org/repo").is_err());
        assert!(RepoUrl::parse("ftp://github.com/org/repo").is_err());
    }

    #[test]
    fn test_raw_urls() {
        let github = RepoUrl::parse("https://github.com/org/repo").unwrap();
        assert_eq!(
            github.raw_file_url("main", "./", "devfile.yaml"),
            "https://raw.githubusercontent.com/org/repo/main/devfile.yaml"
        );
        assert_eq!(
            github.raw_file_url("v1", "backend/", ".devfile/devfile.yaml"),
            "https://raw.githubusercontent.com/org/repo/v1/backend/.devfile/devfile.yaml"
        );

        let gitlab = RepoUrl::parse("https://gitlab.com/org/repo").unwrap();
        assert_eq!(
            gitlab.raw_file_url("main", "api", "devfile.yaml"),
            "https://gitlab.com/org/repo/-/raw/main/api/devfile.yaml"
        );
    }

    #[test]
    fn test_authenticated_url() {
        assert_eq!(
            authenticated_url("https://github.com/org/repo.git", Some("tok")),
            "https://tok@github.com/org/repo.git"
        );
        assert_eq!(
            authenticated_url("https://github.com/org/repo.git", None),
            "https://github.com/org/repo.git"
        );
    }

    #[test]
    fn test_resolve_relative() {
        assert_eq!(
            resolve_relative("https://example.com/repo/main/devfile.yaml", "deploy/app.yaml"),
            "https://example.com/repo/main/deploy/app.yaml"
        );
        assert_eq!(
            resolve_relative("https://example.com/repo/main/", "https://other.com/x.yaml"),
            "https://other.com/x.yaml"
        );
    }
}
