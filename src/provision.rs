use std::path::{Path, PathBuf};
use log::{debug, info, warn};
use thiserror::Error;
use crate::bundle::{self, CleanupWarning};
use crate::compose::{self, Compose};
use crate::config::{self, Instance};
use crate::host::Host;
use crate::vendor::{self, Vendor};
use crate::version::{self, ResolvedVersion};
use crate::{deployment, docker, preflight};

#[derive(Error, Debug)]
pub enum Error {
    #[error("preflight: {0}")]
    Preflight(#[from] preflight::Error),

    #[error("compose: {0}")]
    Compose(#[from] compose::Error),

    #[error("resolve version: {0}")]
    Vendor(#[from] vendor::Error),

    #[error("resolve version: {0}")]
    Version(#[from] version::Error),

    #[error("bundle: {0}")]
    Bundle(#[from] bundle::Error),

    #[error("image: {0}")]
    Docker(#[from] docker::Error),

    #[error("deployment: {0}")]
    Deployment(#[from] deployment::Error),
}

/// Everything a run needs besides the host and the vendor.
pub struct Options<'a> {
    pub workdir: &'a Path,
    pub settings: &'a config::File,
    pub instance: &'a Instance,
    /// Expected SHA-256 of the bundle, hex encoded.
    pub sha256: Option<&'a str>,
}

impl Options<'_> {
    fn compose_file(&self) -> PathBuf {
        self.workdir.join(&self.settings.deployment.compose_file)
    }
}

/// Outcome of a successful provisioning run.
#[derive(Debug)]
pub struct Report {
    pub version: ResolvedVersion,
    pub image: String,
    pub compose: Compose,
    pub compose_file: PathBuf,
    pub console_script: PathBuf,
    /// Leftovers that could not be removed. They never fail the run.
    pub warnings: Vec<CleanupWarning>,
}

/// Provision the gateway: stop any previous deployment, resolve the agent version,
/// download and build its bundle, then start the container.
/// Every step must succeed before the next one starts.
pub async fn provision<H: Host, V: Vendor>(host: &H, vendor: &V, opts: &Options<'_>) -> Result<Report, Error> {
    let settings = opts.settings;

    preflight::check(host, opts.instance)?;

    let compose = compose::detect(|compose| host.compose_available(compose))?;
    info!("Using {compose}");

    stop_existing(host, compose, opts)?;

    let version = resolve_version(vendor).await?;
    let url = bundle::download_url(&settings.bundle.url_template, &version);

    let archive = opts.workdir.join(&settings.bundle.archive);
    info!("Downloading bundle from {url}");
    let written = vendor.download(&url, &archive).await?;
    debug!("{written} bytes written to {}", archive.display());
    let size = bundle::verify(&archive, settings.bundle.min_bytes, opts.sha256)?;
    info!("Bundle downloaded ({size} bytes)");

    let build_dir = opts.workdir.join(&settings.bundle.build_directory);
    bundle::extract(host, &archive, &build_dir, &settings.bundle.recipe_file)?;

    let image = docker::image_name(&settings.image.repository, version.as_str());
    let latest = docker::image_name(&settings.image.repository, "latest");
    info!("Building image {image}");
    host.build(&build_dir, &image)?;
    host.tag(&image, &latest)?;

    let warnings = bundle::cleanup(&[&build_dir, &archive]);
    for warning in &warnings {
        warn!("cleanup: {warning}");
    }

    let rendered = deployment::write(opts.workdir, settings, opts.instance, &image)?;
    info!("Starting {}", opts.instance.deployment_name);
    host.compose(compose, &rendered.compose_file, &["up", "-d"])?;

    Ok(Report {
        version,
        image,
        compose,
        compose_file: rendered.compose_file,
        console_script: rendered.console_script,
        warnings,
    })
}

/// Resolve the agent version and the bundle URL without touching the disk.
pub async fn resolve<V: Vendor>(vendor: &V, opts: &Options<'_>) -> Result<(ResolvedVersion, String), Error> {
    preflight::check_configuration(opts.instance)?;
    let version = resolve_version(vendor).await?;
    let url = bundle::download_url(&opts.settings.bundle.url_template, &version);
    Ok((version, url))
}

/// Tear down the deployment described by the compose file in the working directory.
/// Returns `false` when there is nothing to tear down.
pub fn down<H: Host>(host: &H, opts: &Options<'_>) -> Result<bool, Error> {
    if !opts.compose_file().is_file() {
        return Ok(false);
    }
    let compose = compose::detect(|compose| host.compose_available(compose))?;
    stop_existing(host, compose, opts)
}

fn stop_existing<H: Host>(host: &H, compose: Compose, opts: &Options<'_>) -> Result<bool, Error> {
    let compose_file = opts.compose_file();
    if !compose_file.is_file() {
        debug!("No previous deployment at {}", compose_file.display());
        return Ok(false);
    }
    info!("Stopping previous deployment from {}", compose_file.display());
    host.compose(compose, &compose_file, &["down"])?;
    Ok(true)
}

async fn resolve_version<V: Vendor>(vendor: &V) -> Result<ResolvedVersion, Error> {
    let raw = vendor.fetch_version().await?;
    let version = ResolvedVersion::parse(&raw)?;
    info!(
        "Instance requires agent version {version} ({} {} channel, released {})",
        version.product, version.channel, version.released
    );
    Ok(version)
}
