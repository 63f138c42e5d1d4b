use std::path::Path;
use std::process::{ExitStatus, Stdio};
use log::debug;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("docker build failed with exit code {0}")]
    Build(ExitStatus),

    #[error("docker tag failed with exit code {0}")]
    Tag(ExitStatus),

    #[error(transparent)]
    IOError(#[from] std::io::Error),
}

/// `<repository>:<tag>`
pub fn image_name(repository: &str, tag: &str) -> String {
    format!("{repository}:{tag}")
}

pub fn build(context: &Path, tag: &str) -> Result<(), Error> {
    debug!("Building Docker image {} from {}", tag, context.display());
    std::process::Command::new("docker")
        .arg("build")
        .arg("--tag")
        .arg(tag)
        .arg(context)
        .stdout(Stdio::inherit())
        .stderr(Stdio::inherit())
        .status()
        .map(|exit_status| {
            if exit_status.success() {
                Ok(())
            } else {
                Err(Error::Build(exit_status))
            }
        })?
}

pub fn tag(source: &str, target: &str) -> Result<(), Error> {
    debug!("Tagging Docker image {} as {}", source, target);
    std::process::Command::new("docker")
        .arg("tag")
        .arg(source)
        .arg(target)
        .stdout(Stdio::inherit())
        .stderr(Stdio::inherit())
        .status()
        .map(|exit_status| {
            if exit_status.success() {
                Ok(())
            } else {
                Err(Error::Tag(exit_status))
            }
        })?
}

#[cfg(test)]
#[test]
fn test_image_name() {
    assert_eq!(image_name("agent-gateway", "acme_stable_03-14-2024"), "agent-gateway:acme_stable_03-14-2024");
    assert_eq!(image_name("registry.local/gw", "latest"), "registry.local/gw:latest");
}
