// crates/clace-registry/src/source.rs
// ============================================================================
// Module: Source Fetch
// Description: Refreshes an app's file tree from disk or git (spec.md
//              §4.3 reload, §4.5 apply step 1).
// Purpose: Give `Registry::reload` and the apply engine one auth-aware way
//          to resolve `source_url` into a flat file list and content hash,
//          instead of re-deriving git plumbing at every call site.
// Dependencies: git2, sha2, tempfile
// ============================================================================

//! ## Overview
//! Dev apps point `source_url` at a local directory and are simply
//! re-walked. Everything else is treated as a git remote: cloned shallow
//! into a scratch directory, optionally checked out to a branch or exact
//! commit, then walked the same way. The file list is hashed with SHA-256
//! so callers can tell a no-op reload from one that actually changed the
//! tree.

use std::fs;
use std::path::Path;
use std::path::PathBuf;

use sha2::Digest;
use sha2::Sha256;
use thiserror::Error;

/// Errors resolving an app's source tree.
#[derive(Debug, Error)]
pub enum SourceError {
    /// Reading the local directory failed.
    #[error("reading {path}: {source}")]
    Io {
        /// Path that failed to read.
        path: String,
        /// Underlying IO error.
        #[source]
        source: std::io::Error,
    },
    /// Cloning or checking out the git remote failed.
    #[error("git fetch of {url}: {message}")]
    Git {
        /// The remote URL that failed.
        url: String,
        /// Error text from `git2`.
        message: String,
    },
}

/// A resolved file tree: the flat list of relative paths and a stable
/// hash of that list.
#[derive(Debug, Clone)]
pub struct ResolvedSource {
    /// Relative file paths, sorted for determinism.
    pub files: Vec<String>,
    /// SHA-256 of the sorted file list, hex-encoded.
    pub files_hash: String,
}

/// Re-reads `source_url`'s file tree.
///
/// Dev apps (`is_dev`) always read `source_url` as a local directory. Prod,
/// stage, and preview apps treat it as a git remote unless `git_auth_name`
/// is `"-"`, in which case the clone is attempted without credentials
/// (a public remote). `git_branch`/`git_commit` pin the checkout when set.
///
/// # Errors
/// Returns [`SourceError::Io`] if a local directory cannot be walked, or
/// [`SourceError::Git`] if the remote cannot be cloned or checked out.
pub fn resolve(
    source_url: &str,
    is_dev: bool,
    git_branch: Option<&str>,
    git_commit: Option<&str>,
    git_auth_name: &str,
) -> Result<ResolvedSource, SourceError> {
    if is_dev {
        return walk_local(Path::new(source_url));
    }
    let checkout = clone_git(source_url, git_branch, git_commit, git_auth_name)?;
    walk_local(checkout.path())
}

/// A checked-out git worktree, removed when dropped.
struct GitCheckout(tempfile::TempDir);

impl GitCheckout {
    fn path(&self) -> &Path {
        self.0.path()
    }
}

fn clone_git(
    url: &str,
    git_branch: Option<&str>,
    git_commit: Option<&str>,
    git_auth_name: &str,
) -> Result<GitCheckout, SourceError> {
    let dir = tempfile::tempdir().map_err(|source| SourceError::Io {
        path: "<tempdir>".to_string(),
        source,
    })?;

    let mut callbacks = git2::RemoteCallbacks::new();
    if git_auth_name != "-" {
        callbacks.credentials(|_url, username_from_url, _allowed| git2::Cred::ssh_key_from_agent(username_from_url.unwrap_or("git")));
    }
    let mut fetch_options = git2::FetchOptions::new();
    fetch_options.remote_callbacks(callbacks);
    fetch_options.depth(1);

    let mut builder = git2::build::RepoBuilder::new();
    builder.fetch_options(fetch_options);
    if let Some(branch) = git_branch {
        builder.branch(branch);
    }
    let repo = builder.clone(url, dir.path()).map_err(|err| SourceError::Git {
        url: url.to_string(),
        message: err.to_string(),
    })?;

    if let Some(commit) = git_commit {
        let oid = git2::Oid::from_str(commit).map_err(|err| SourceError::Git {
            url: url.to_string(),
            message: err.to_string(),
        })?;
        let object = repo.find_object(oid, None).map_err(|err| SourceError::Git {
            url: url.to_string(),
            message: err.to_string(),
        })?;
        repo.checkout_tree(&object, None).map_err(|err| SourceError::Git {
            url: url.to_string(),
            message: err.to_string(),
        })?;
        repo.set_head_detached(oid).map_err(|err| SourceError::Git {
            url: url.to_string(),
            message: err.to_string(),
        })?;
    }

    Ok(GitCheckout(dir))
}

fn walk_local(root: &Path) -> Result<ResolvedSource, SourceError> {
    let mut files = Vec::new();
    let mut stack = vec![PathBuf::new()];
    while let Some(relative) = stack.pop() {
        let absolute = root.join(&relative);
        let entries = fs::read_dir(&absolute).map_err(|source| SourceError::Io {
            path: absolute.display().to_string(),
            source,
        })?;
        for entry in entries {
            let entry = entry.map_err(|source| SourceError::Io {
                path: absolute.display().to_string(),
                source,
            })?;
            let name = entry.file_name();
            if name.to_string_lossy().starts_with('.') {
                continue;
            }
            let child_relative = relative.join(&name);
            let file_type = entry.file_type().map_err(|source| SourceError::Io {
                path: absolute.display().to_string(),
                source,
            })?;
            if file_type.is_dir() {
                stack.push(child_relative);
            } else {
                files.push(child_relative.to_string_lossy().replace('\\', "/"));
            }
        }
    }
    files.sort();
    let mut hasher = Sha256::new();
    for file in &files {
        hasher.update(file.as_bytes());
        hasher.update(b"\n");
    }
    let files_hash = data_encoding::HEXLOWER.encode(&hasher.finalize());
    Ok(ResolvedSource { files, files_hash })
}

#[cfg(test)]
mod tests {
    use std::fs;

    use super::resolve;

    #[test]
    fn walks_a_local_dev_tree() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("app.star"), "x").unwrap();
        fs::create_dir(dir.path().join("sub")).unwrap();
        fs::write(dir.path().join("sub").join("b.star"), "y").unwrap();

        let resolved = resolve(dir.path().to_str().unwrap(), true, None, None, "-").unwrap();
        assert_eq!(resolved.files, vec!["app.star".to_string(), "sub/b.star".to_string()]);
        assert!(!resolved.files_hash.is_empty());
    }

    #[test]
    fn same_tree_hashes_identically() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("a"), "1").unwrap();
        let first = resolve(dir.path().to_str().unwrap(), true, None, None, "-").unwrap();
        let second = resolve(dir.path().to_str().unwrap(), true, None, None, "-").unwrap();
        assert_eq!(first.files_hash, second.files_hash);
    }
}
