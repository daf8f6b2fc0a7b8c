//! Deployment identities.
//!
//! A [`DeploymentIdentity`] names the compose project that backs one
//! (repository, branch) pair. It depends only on the clone URL and branch,
//! never on the commit, so every push to a branch reconciles the same
//! project in place.

use std::sync::LazyLock;

use derive_more::Display;
use regex::Regex;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Prefix stripped from git refs to obtain a branch name.
pub const BRANCH_REF_PREFIX: &str = "refs/heads/";

static UNSAFE_SLUG_CHARS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[^a-z0-9_-]+").unwrap());

/// Fixed-width lowercase hex SHA-256 digest.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, Display)]
#[display("{_0}")]
#[serde(transparent)]
pub struct ContentHash(String);

impl ContentHash {
    /// Hash arbitrary bytes.
    pub fn of(data: impl AsRef<[u8]>) -> Self {
        Self(hex::encode(Sha256::digest(data.as_ref())))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// First `len` hex characters, for display.
    pub fn short(&self, len: usize) -> &str {
        &self.0[..len.min(self.0.len())]
    }
}

impl AsRef<str> for ContentHash {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Deterministic identity of a (repository, branch) deployment target.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, Display)]
#[display("{project_slug}")]
pub struct DeploymentIdentity {
    pub clone_url: String,
    pub repository: String,
    pub branch: String,
    pub clone_url_hash: ContentHash,
    pub branch_hash: ContentHash,
    pub composite_hash: ContentHash,
    /// Compose project name.
    pub project_slug: String,
}

impl DeploymentIdentity {
    /// Derive the identity for a clone URL and git ref.
    ///
    /// `repository` may be empty, in which case the `owner/name` part of the
    /// clone URL is used for the slug.
    pub fn derive(clone_url: &str, git_ref: &str, repository: &str) -> Self {
        let branch = branch_from_ref(git_ref).to_string();
        let repository = if repository.is_empty() {
            repository_from_clone_url(clone_url)
        } else {
            repository.to_string()
        };

        let clone_url_hash = ContentHash::of(clone_url);
        let branch_hash = ContentHash::of(&branch);
        let composite_hash = ContentHash::of(format!("{}{}", clone_url, branch));

        let mut project_slug = safe_project_name(&format!(
            "{}/{}",
            repository.to_lowercase(),
            branch.to_lowercase()
        ));
        if project_slug.is_empty() {
            project_slug = format!("p{}", composite_hash.short(12));
        }

        Self {
            clone_url: clone_url.to_string(),
            repository,
            branch,
            clone_url_hash,
            branch_hash,
            composite_hash,
            project_slug,
        }
    }

    /// `repository/branch`, lowercased. Used as the log-viewer group label.
    pub fn group(&self) -> String {
        format!(
            "{}/{}",
            self.repository.to_lowercase(),
            self.branch.to_lowercase()
        )
    }
}

/// Strip `refs/heads/`; any other ref is returned unchanged.
pub fn branch_from_ref(git_ref: &str) -> &str {
    git_ref.strip_prefix(BRANCH_REF_PREFIX).unwrap_or(git_ref)
}

/// Normalize arbitrary text into a compose-safe project name.
///
/// This is best-effort: distinct inputs such as `Foo/Bar` and `foo-bar`
/// normalize to the same name.
pub fn safe_project_name(input: &str) -> String {
    let lowercase = input.to_lowercase();
    let replaced = UNSAFE_SLUG_CHARS.replace_all(&lowercase, "-");
    let compact: String = replaced.chars().filter(|c| !c.is_whitespace()).collect();
    compact
        .trim_start_matches(|c: char| !c.is_ascii_alphanumeric())
        .to_string()
}

fn repository_from_clone_url(clone_url: &str) -> String {
    let path = url::Url::parse(clone_url)
        .map(|u| u.path().to_string())
        .unwrap_or_else(|_| {
            // scp-like `git@host:owner/name.git`
            clone_url
                .split_once(':')
                .map(|(_, p)| p.to_string())
                .unwrap_or_else(|| clone_url.to_string())
        });
    let path = path.trim_matches('/');
    let path = path.strip_suffix(".git").unwrap_or(path);
    let segments: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();
    match segments.as_slice() {
        [] => String::new(),
        [name] => name.to_string(),
        [.., owner, name] => format!("{}/{}", owner, name),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const URL: &str = "https://github.com/acme/widgets.git";

    fn assert_slug_is_safe(slug: &str) {
        assert!(!slug.is_empty(), "slug must not be empty");
        assert!(
            slug.chars()
                .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-' || c == '_'),
            "unexpected character in {slug:?}"
        );
        assert!(slug.chars().next().unwrap().is_ascii_alphanumeric());
    }

    #[test]
    fn test_derive_is_deterministic() {
        let a = DeploymentIdentity::derive(URL, "refs/heads/main", "acme/widgets");
        let b = DeploymentIdentity::derive(URL, "refs/heads/main", "acme/widgets");
        assert_eq!(a, b);
    }

    #[test]
    fn test_branch_with_spaces_and_uppercase() {
        let id = DeploymentIdentity::derive(URL, "refs/heads/feature/X Y", "acme/widgets");
        assert_eq!(id.branch, "feature/X Y");
        assert_eq!(id.project_slug, "acme-widgets-feature-x-y");
        assert_slug_is_safe(&id.project_slug);
    }

    #[test]
    fn test_non_branch_ref_passes_through() {
        let id = DeploymentIdentity::derive(URL, "refs/tags/v1.0", "acme/widgets");
        assert_eq!(id.branch, "refs/tags/v1.0");
        assert_slug_is_safe(&id.project_slug);
    }

    #[test]
    fn test_hashes_are_fixed_width_hex() {
        let id = DeploymentIdentity::derive(URL, "refs/heads/main", "acme/widgets");
        for hash in [&id.clone_url_hash, &id.branch_hash, &id.composite_hash] {
            assert_eq!(hash.as_str().len(), 64);
            assert!(hash.as_str().chars().all(|c| c.is_ascii_hexdigit()));
        }
        assert_eq!(id.composite_hash, ContentHash::of(format!("{}main", URL)));
    }

    #[test]
    fn test_same_branch_different_repo_differs() {
        let a = DeploymentIdentity::derive(URL, "refs/heads/main", "acme/widgets");
        let b = DeploymentIdentity::derive(
            "https://github.com/acme/gadgets.git",
            "refs/heads/main",
            "acme/gadgets",
        );
        assert_ne!(a.composite_hash, b.composite_hash);
        assert_ne!(a.project_slug, b.project_slug);
        assert_eq!(a.branch_hash, b.branch_hash);
    }

    #[test]
    fn test_repository_falls_back_to_clone_url() {
        let id = DeploymentIdentity::derive(URL, "refs/heads/main", "");
        assert_eq!(id.repository, "acme/widgets");
        assert_eq!(id.project_slug, "acme-widgets-main");

        let ssh = DeploymentIdentity::derive("git@github.com:acme/widgets.git", "main", "");
        assert_eq!(ssh.repository, "acme/widgets");
    }

    #[test]
    fn test_slug_trims_leading_punctuation() {
        assert_eq!(safe_project_name("__--Hello World"), "hello-world");
        assert_eq!(safe_project_name("///a"), "a");
    }

    #[test]
    fn test_slug_never_empty() {
        let id = DeploymentIdentity::derive("", "refs/heads/???", "...");
        assert_slug_is_safe(&id.project_slug);
        assert!(id.project_slug.starts_with('p'));
    }

    #[test]
    fn test_slug_is_idempotent() {
        let once = safe_project_name("Acme/Widgets/Feature/ÜBER x");
        assert_eq!(safe_project_name(&once), once);
        assert_slug_is_safe(&once);
    }

    #[test]
    fn test_known_collision_is_documented_behavior() {
        assert_eq!(safe_project_name("Foo/Bar"), safe_project_name("foo-bar"));
    }
}
