//! Version-controlled content store collaborator.
//!
//! The default implementation keeps one checkout directory per workspace
//! under a common root and records writes with a best-effort `git add` +
//! `commit`.  A workspace directory that is not a git checkout still
//! works — the commit step just logs and moves on.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeKind {
    Dir,
    File,
}

/// One node of a workspace listing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TreeNode {
    pub name: String,
    pub path: String,
    pub kind: NodeKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size: Option<u64>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<TreeNode>,
}

#[async_trait]
pub trait ContentStore: Send + Sync {
    async fn read(&self, workspace: &str, path: &str) -> Result<Vec<u8>>;
    async fn write(&self, workspace: &str, path: &str, bytes: &[u8]) -> Result<()>;
    async fn list(&self, workspace: &str, path: &str) -> Result<TreeNode>;
}

/// Run a git command in the given working directory, returning stdout on
/// success.
pub async fn run_git(working_dir: &Path, args: &[&str]) -> Result<String, String> {
    let output = tokio::process::Command::new("git")
        .args(args)
        .current_dir(working_dir)
        .output()
        .await
        .map_err(|e| format!("Failed to run git: {}", e))?;
    if !output.status.success() {
        return Err(String::from_utf8_lossy(&output.stderr).trim().to_string());
    }
    Ok(String::from_utf8_lossy(&output.stdout).to_string())
}

pub struct GitContentStore {
    root: PathBuf,
}

impl GitContentStore {
    pub fn new(root: PathBuf) -> Result<Self> {
        std::fs::create_dir_all(&root)
            .with_context(|| format!("failed to create workspaces root {}", root.display()))?;
        Ok(Self { root })
    }

    fn workspace_dir(&self, workspace: &str) -> Result<PathBuf> {
        if workspace.is_empty()
            || workspace
                .chars()
                .any(|c| !c.is_ascii_alphanumeric() && c != '-' && c != '_')
        {
            bail!("invalid workspace name: {workspace}");
        }
        Ok(self.root.join(workspace))
    }

    fn resolve(&self, workspace: &str, path: &str) -> Result<PathBuf> {
        let rel = clean_rel_path(path)?;
        Ok(self.workspace_dir(workspace)?.join(rel))
    }
}

/// Normalize a topic path into a relative filesystem path.  Leading
/// slashes are stripped; `..` components and empty paths are rejected.
fn clean_rel_path(path: &str) -> Result<PathBuf> {
    let trimmed = path.trim_start_matches('/');
    if trimmed.is_empty() {
        bail!("empty path");
    }
    let mut rel = PathBuf::new();
    for component in trimmed.split('/') {
        match component {
            "" | "." => continue,
            ".." => bail!("path may not traverse upward: {path}"),
            c => rel.push(c),
        }
    }
    if rel.as_os_str().is_empty() {
        bail!("empty path");
    }
    Ok(rel)
}

#[async_trait]
impl ContentStore for GitContentStore {
    async fn read(&self, workspace: &str, path: &str) -> Result<Vec<u8>> {
        let full = self.resolve(workspace, path)?;
        tokio::fs::read(&full)
            .await
            .with_context(|| format!("failed to read {path} in workspace {workspace}"))
    }

    async fn write(&self, workspace: &str, path: &str, bytes: &[u8]) -> Result<()> {
        let dir = self.workspace_dir(workspace)?;
        let full = self.resolve(workspace, path)?;
        if let Some(parent) = full.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(&full, bytes)
            .await
            .with_context(|| format!("failed to write {path} in workspace {workspace}"))?;

        // Record the change when the workspace is a git checkout.
        let rel = clean_rel_path(path)?;
        let rel_str = rel.to_string_lossy().to_string();
        if let Err(e) = run_git(&dir, &["add", "--", &rel_str]).await {
            debug!(workspace, path, "git add skipped: {e}");
            return Ok(());
        }
        if let Err(e) = run_git(&dir, &["commit", "-m", &format!("update {rel_str}")]).await {
            debug!(workspace, path, "git commit skipped: {e}");
        }
        Ok(())
    }

    async fn list(&self, workspace: &str, path: &str) -> Result<TreeNode> {
        let dir = self.workspace_dir(workspace)?;
        let start = if path.trim_start_matches('/').is_empty() {
            dir.clone()
        } else {
            self.resolve(workspace, path)?
        };
        let rel = start
            .strip_prefix(&dir)
            .unwrap_or(Path::new(""))
            .to_string_lossy()
            .to_string();
        walk(start, rel).await
    }
}

/// Depth-first directory walk.  `.git` and other dot-entries are not part
/// of the content tree.
fn walk(dir: PathBuf, rel: String) -> futures::future::BoxFuture<'static, Result<TreeNode>> {
    Box::pin(async move {
        let name = dir
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default();
        let mut children = Vec::new();

        let mut entries = tokio::fs::read_dir(&dir).await?;
        while let Some(entry) = entries.next_entry().await? {
            let entry_name = entry.file_name().to_string_lossy().to_string();
            if entry_name.starts_with('.') {
                continue;
            }
            let child_rel = if rel.is_empty() {
                entry_name.clone()
            } else {
                format!("{rel}/{entry_name}")
            };
            let meta = entry.metadata().await?;
            if meta.is_dir() {
                children.push(walk(entry.path(), child_rel).await?);
            } else {
                children.push(TreeNode {
                    name: entry_name,
                    path: format!("/{child_rel}"),
                    kind: NodeKind::File,
                    size: Some(meta.len()),
                    children: Vec::new(),
                });
            }
        }
        children.sort_by(|a, b| a.name.cmp(&b.name));

        Ok(TreeNode {
            name,
            path: if rel.is_empty() {
                "/".to_string()
            } else {
                format!("/{rel}")
            },
            kind: NodeKind::Dir,
            size: None,
            children,
        })
    })
}
