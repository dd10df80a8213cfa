use crate::util::repo_root;
use anyhow::{Context, Result};
use std::process::{Command, Stdio};

pub fn cargo_build_scheduler_bin() -> Result<()> {
    let root = repo_root();
    let status = Command::new("cargo")
        .args(["build", "-p", "scheduler", "--bin", "scheduler", "--quiet"])
        .current_dir(&root)
        .stdin(Stdio::null())
        .stdout(Stdio::inherit())
        .stderr(Stdio::inherit())
        .status()
        .context("cargo build scheduler binary")?;
    if !status.success() {
        anyhow::bail!("failed to build scheduler binary");
    }
    Ok(())
}

pub fn cargo_build_api_bin() -> Result<()> {
    let root = repo_root();
    let status = Command::new("cargo")
        .args(["build", "-p", "api", "--bin", "api", "--quiet"])
        .current_dir(&root)
        .stdin(Stdio::null())
        .stdout(Stdio::inherit())
        .stderr(Stdio::inherit())
        .status()
        .context("cargo build api binary")?;
    if !status.success() {
        anyhow::bail!("failed to build api binary");
    }
    Ok(())
}
