use std::fmt::{Display, Formatter};
use std::path::Path;
use std::process::{Command, ExitStatus, Stdio};
use log::debug;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("neither `docker compose` nor `docker-compose` is available")]
    NotFound,

    #[error("{compose} {action} failed with exit code {status}")]
    Failed {
        compose: Compose,
        action: String,
        status: ExitStatus,
    },

    #[error(transparent)]
    IOError(#[from] std::io::Error),
}

/// The two ways the compose CLI can be invoked.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Compose {
    /// `docker compose`, the plugin form.
    Unified,
    /// `docker-compose`, the standalone binary.
    Standalone,
}

impl Compose {
    /// In order of preference.
    pub const CANDIDATES: [Compose; 2] = [Compose::Unified, Compose::Standalone];

    fn command(&self) -> Command {
        match self {
            Compose::Unified => {
                let mut command = Command::new("docker");
                command.arg("compose");
                command
            }
            Compose::Standalone => Command::new("docker-compose"),
        }
    }

    /// Whether `<compose> version` runs and exits successfully.
    pub fn is_available(&self) -> bool {
        self.command()
            .arg("version")
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .map(|exit_status| exit_status.success())
            .unwrap_or(false)
    }

    /// Run `<compose> -f <descriptor> <args>` from the descriptor's directory.
    pub fn run(&self, descriptor: &Path, args: &[&str]) -> Result<(), Error> {
        debug!("{} -f {} {}", self, descriptor.display(), args.join(" "));
        let mut command = self.command();
        if let Some(dir) = descriptor.parent().filter(|dir| !dir.as_os_str().is_empty()) {
            command.current_dir(dir);
        }
        let file_name = descriptor.file_name().unwrap_or(descriptor.as_os_str());
        let exit_status = command
            .arg("-f")
            .arg(file_name)
            .args(args)
            .stdout(Stdio::inherit())
            .stderr(Stdio::inherit())
            .status()?;
        if exit_status.success() {
            Ok(())
        } else {
            Err(Error::Failed {
                compose: *self,
                action: args.first().copied().unwrap_or_default().to_string(),
                status: exit_status,
            })
        }
    }
}

impl Display for Compose {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Compose::Unified => f.write_str("docker compose"),
            Compose::Standalone => f.write_str("docker-compose"),
        }
    }
}

/// Returns the first compose form, in order of preference, that `available` accepts.
pub fn detect(available: impl Fn(Compose) -> bool) -> Result<Compose, Error> {
    Compose::CANDIDATES
        .into_iter()
        .inspect(|compose| debug!("Looking for {compose}"))
        .find(|compose| available(*compose))
        .ok_or(Error::NotFound)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prefers_unified_form() {
        assert_eq!(detect(|_| true).unwrap(), Compose::Unified);
    }

    #[test]
    fn falls_back_to_standalone() {
        let compose = detect(|compose| compose == Compose::Standalone).unwrap();
        assert_eq!(compose, Compose::Standalone);
        assert_eq!(compose.to_string(), "docker-compose");
    }

    #[test]
    fn fails_when_nothing_answers() {
        assert!(matches!(detect(|_| false), Err(Error::NotFound)));
    }
}
