//! Workspace isolation: copy a module into its own temporary directory.
//!
//! Each test gets a private copy so concurrent runs never share `.terraform`
//! state or mutate the checked-in sources. The copy lives in a `TempDir`
//! owned by the returned [`ModuleWorkspace`]; dropping the workspace removes
//! it unless [`ModuleWorkspace::keep`] was called.
//!
//! With [`CopyScope::Root`] the whole source root is copied and the workspace
//! points at the module inside it, so `source = "../sibling"` references and
//! relative symlinks resolve exactly as they do in the checkout.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use tempfile::TempDir;
use tracing::{debug, warn};

use crate::config::HarnessConfig;
use crate::error::{HarnessError, HarnessResult};

/// Hidden files that are still copied.
const KEPT_HIDDEN_FILES: &[&str] = &[".terraform-version", ".terraform.lock.hcl"];

/// State and variable files that never leave the source tree.
const STATE_AND_VAR_FILES: &[&str] = &[
    "terraform.tfstate",
    "terraform.tfstate.backup",
    "terraform.tfvars",
    "terraform.tfvars.json",
];

/// Top-level directories of a source root that a root copy leaves behind.
const ROOT_SKIPPED_DIRS: &[&str] = &["target"];

/// How much of the source tree goes into the workspace.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CopyScope {
    /// Only the module directory.
    #[default]
    Module,

    /// The whole source root; the workspace is the module inside the copy.
    Root,
}

/// An isolated copy of one module.
#[derive(Debug)]
pub struct ModuleWorkspace {
    /// The module directory that was copied.
    pub source_path: PathBuf,

    /// The module directory inside the temporary copy.
    pub ephemeral_path: PathBuf,

    /// Module/provider name (the module directory's name).
    pub provider_name: String,

    dir: Option<TempDir>,
}

impl ModuleWorkspace {
    /// Persist the temporary directory past drop, for post-mortem debugging.
    pub fn keep(&mut self) {
        if let Some(dir) = self.dir.take() {
            let path = dir.into_path();
            debug!(path = %path.display(), "keeping workspace");
        }
    }

    /// Whether the directory will be removed on drop.
    pub fn is_ephemeral(&self) -> bool {
        self.dir.is_some()
    }

    /// Remove the temporary copy now. Best-effort: failures are logged.
    pub fn cleanup(mut self) {
        if let Some(dir) = self.dir.take() {
            let path = dir.path().to_path_buf();
            if let Err(e) = dir.close() {
                warn!(path = %path.display(), error = %e, "failed to remove workspace");
            }
        }
    }
}

/// Copy `source_root/module_name` into a fresh temporary directory.
pub fn isolate(source_root: &Path, module_name: &str) -> HarnessResult<ModuleWorkspace> {
    isolate_scoped(source_root, module_name, CopyScope::Module)
}

/// [`isolate`] with an explicit [`CopyScope`].
pub fn isolate_scoped(
    source_root: &Path,
    module_name: &str,
    scope: CopyScope,
) -> HarnessResult<ModuleWorkspace> {
    let source_path = source_root.join(module_name);
    if !source_path.is_dir() {
        return Err(HarnessError::setup(
            &source_path,
            "module directory does not exist",
        ));
    }

    let dir = tempfile::Builder::new()
        .prefix(&format!("infratest-{}-", sanitize(module_name)))
        .tempdir()
        .map_err(|e| HarnessError::setup(&source_path, format!("cannot create temp dir: {e}")))?;

    let ephemeral_path = match scope {
        CopyScope::Module => {
            let leaf = source_path
                .file_name()
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from(module_name));
            let ephemeral_path = dir.path().join(leaf);
            copy_tree(&source_path, &ephemeral_path, &[])
                .map_err(|e| HarnessError::setup(&source_path, format!("copy failed: {e}")))?;
            ephemeral_path
        }
        CopyScope::Root => {
            copy_tree(source_root, dir.path(), ROOT_SKIPPED_DIRS)
                .map_err(|e| HarnessError::setup(source_root, format!("copy failed: {e}")))?;
            dir.path().join(module_name)
        }
    };

    if !ephemeral_path.is_dir() {
        return Err(HarnessError::setup(
            &source_path,
            "module was filtered out of the copy",
        ));
    }

    debug!(
        module = module_name,
        scope = ?scope,
        from = %source_path.display(),
        to = %ephemeral_path.display(),
        "isolated module workspace"
    );

    Ok(ModuleWorkspace {
        source_path,
        ephemeral_path,
        provider_name: module_name.to_string(),
        dir: Some(dir),
    })
}

/// [`isolate_scoped`], keeping the copy on disk when `config.keep_workspaces` is set.
pub fn isolate_with_config(
    source_root: &Path,
    module_name: &str,
    scope: CopyScope,
    config: &HarnessConfig,
) -> HarnessResult<ModuleWorkspace> {
    let mut workspace = isolate_scoped(source_root, module_name, scope)?;
    if config.keep_workspaces {
        workspace.keep();
    }
    Ok(workspace)
}

/// Whether an entry named `name` is copied into the workspace.
fn should_copy(name: &str) -> bool {
    if KEPT_HIDDEN_FILES.contains(&name) {
        return true;
    }
    !name.starts_with('.') && !STATE_AND_VAR_FILES.contains(&name)
}

/// Recursive filtered copy. `skip_dirs` applies to `from`'s direct children only.
fn copy_tree(from: &Path, to: &Path, skip_dirs: &[&str]) -> io::Result<()> {
    fs::create_dir_all(to)?;
    for entry in fs::read_dir(from)? {
        let entry = entry?;
        let name = entry.file_name();
        let name_str = name.to_string_lossy();
        if !should_copy(&name_str) {
            continue;
        }

        let src = entry.path();
        let dst = to.join(&name);
        let file_type = entry.file_type()?;
        if file_type.is_symlink() {
            copy_symlink(&src, &dst)?;
        } else if file_type.is_dir() {
            if skip_dirs.contains(&name_str.as_ref()) {
                continue;
            }
            copy_tree(&src, &dst, &[])?;
        } else {
            fs::copy(&src, &dst)?;
        }
    }
    Ok(())
}

/// Recreate the link as is, dangling or relative targets included.
#[cfg(unix)]
fn copy_symlink(src: &Path, dst: &Path) -> io::Result<()> {
    std::os::unix::fs::symlink(fs::read_link(src)?, dst)
}

/// No portable symlink creation here: copy what the link points at.
#[cfg(not(unix))]
fn copy_symlink(src: &Path, dst: &Path) -> io::Result<()> {
    match fs::metadata(src) {
        Ok(meta) if meta.is_dir() => copy_tree(src, dst, &[]),
        Ok(_) => fs::copy(src, dst).map(|_| ()),
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            warn!(path = %src.display(), "skipping dangling symlink");
            Ok(())
        }
        Err(e) => Err(e),
    }
}

/// Module names may contain path separators (`modules/vpc`).
fn sanitize(module_name: &str) -> String {
    module_name
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' { c } else { '_' })
        .collect()
}
