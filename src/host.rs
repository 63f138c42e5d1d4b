use std::path::Path;
use crate::compose::{self, Compose};
use crate::{bundle, docker};

/// External programs the provisioning workflow shells out to.
pub trait Host {
    /// Whether `program` can be found in `PATH`.
    fn find_program(&self, program: &str) -> bool;

    fn compose_available(&self, compose: Compose) -> bool;

    fn compose(&self, compose: Compose, descriptor: &Path, args: &[&str]) -> Result<(), compose::Error>;

    fn build(&self, context: &Path, tag: &str) -> Result<(), docker::Error>;

    fn tag(&self, source: &str, target: &str) -> Result<(), docker::Error>;

    fn unzip(&self, archive: &Path, dest: &Path) -> Result<(), bundle::Error>;
}

/// The machine we are running on.
pub struct System;

impl Host for System {
    fn find_program(&self, program: &str) -> bool {
        which::which(program).is_ok()
    }

    fn compose_available(&self, compose: Compose) -> bool {
        compose.is_available()
    }

    fn compose(&self, compose: Compose, descriptor: &Path, args: &[&str]) -> Result<(), compose::Error> {
        compose.run(descriptor, args)
    }

    fn build(&self, context: &Path, tag: &str) -> Result<(), docker::Error> {
        docker::build(context, tag)
    }

    fn tag(&self, source: &str, target: &str) -> Result<(), docker::Error> {
        docker::tag(source, target)
    }

    fn unzip(&self, archive: &Path, dest: &Path) -> Result<(), bundle::Error> {
        bundle::unzip(archive, dest)
    }
}
