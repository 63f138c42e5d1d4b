use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use log::{debug, info};
use serde::Serialize;
use thiserror::Error;
use crate::config::{self, Instance};

#[derive(Error, Debug)]
pub enum Error {
    #[error("write {path}: {err}")]
    WriteFile {
        err: std::io::Error,
        path: String,
    },

    #[error("serialize compose file: {0}")]
    Serialize(#[from] serde_yaml::Error),
}

/// Compose file with a single gateway service.
#[derive(Serialize, Debug)]
pub struct Descriptor {
    pub services: BTreeMap<String, Service>,
}

#[derive(Serialize, Debug)]
pub struct Service {
    pub image: String,
    pub container_name: String,
    pub restart: String,
    pub volumes: Vec<String>,
    pub environment: BTreeMap<String, String>,
}

impl Descriptor {
    pub fn new(settings: &config::File, instance: &Instance, image: &str) -> Self {
        let names = &settings.deployment.environment;
        let environment = BTreeMap::from([
            (names.instance_url.clone(), instance.url(&settings.vendor.instance_url)),
            (names.username.clone(), instance.username.clone()),
            (names.password.clone(), instance.password.clone()),
            (names.display_name.clone(), instance.display_name.clone()),
        ]);
        let service = Service {
            image: image.to_string(),
            container_name: instance.deployment_name.clone(),
            restart: "unless-stopped".to_string(),
            volumes: vec![format!(
                "./{}:{}",
                settings.deployment.export_directory, settings.deployment.container_export_path
            )],
            environment,
        };
        Self {
            services: BTreeMap::from([(instance.deployment_name.clone(), service)]),
        }
    }

    pub fn to_yaml(&self) -> Result<String, Error> {
        Ok(serde_yaml::to_string(self)?)
    }
}

/// Shell script that opens a shell inside the running gateway container.
pub fn console_script(deployment_name: &str) -> String {
    format!(
        "#!/bin/sh\n\
         # Open a shell inside the {deployment_name} container.\n\
         exec docker exec -it {deployment_name} /bin/bash\n"
    )
}

/// Paths of the files written by [`write`].
#[derive(Debug)]
pub struct Rendered {
    pub compose_file: PathBuf,
    pub console_script: PathBuf,
}

/// Write the console script and compose file into `workdir`, replacing earlier versions,
/// and create the export directory the compose file mounts.
pub fn write(workdir: &Path, settings: &config::File, instance: &Instance, image: &str) -> Result<Rendered, Error> {
    let deployment = &settings.deployment;

    let export_dir = workdir.join(&deployment.export_directory);
    std::fs::create_dir_all(&export_dir).map_err(|err| write_error(err, &export_dir))?;

    let console_path = workdir.join(&deployment.console_script);
    write_file(&console_path, &console_script(&instance.deployment_name), 0o755)?;
    debug!("Console script written to {}", console_path.display());

    // Contains the instance password.
    let compose_path = workdir.join(&deployment.compose_file);
    let yaml = Descriptor::new(settings, instance, image).to_yaml()?;
    write_file(&compose_path, &yaml, 0o600)?;
    info!("Compose file written to {}", compose_path.display());

    Ok(Rendered {
        compose_file: compose_path,
        console_script: console_path,
    })
}

fn write_error(err: std::io::Error, path: &Path) -> Error {
    Error::WriteFile {
        err,
        path: path.display().to_string(),
    }
}

fn write_file(path: &Path, contents: &str, mode: u32) -> Result<(), Error> {
    std::fs::write(path, contents).map_err(|err| write_error(err, path))?;
    set_mode(path, mode).map_err(|err| write_error(err, path))
}

#[cfg(unix)]
fn set_mode(path: &Path, mode: u32) -> std::io::Result<()> {
    use std::os::unix::fs::PermissionsExt;
    std::fs::set_permissions(path, std::fs::Permissions::from_mode(mode))
}

#[cfg(not(unix))]
fn set_mode(_path: &Path, _mode: u32) -> std::io::Result<()> {
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn instance() -> Instance {
        Instance::new(
            "acme".into(),
            "Lab Gateway".into(),
            None,
            "svc-gateway".into(),
            "hunter2".into(),
        )
    }

    #[test]
    fn descriptor_declares_one_service() {
        let settings = config::File::default();
        let yaml = Descriptor::new(&settings, &instance(), "agent-gateway:acme_stable_03-14-2024")
            .to_yaml()
            .unwrap();
        let parsed: serde_yaml::Value = serde_yaml::from_str(&yaml).unwrap();

        let services = parsed["services"].as_mapping().unwrap();
        assert_eq!(services.len(), 1);

        let service = &parsed["services"]["gateway-lab-gateway"];
        assert_eq!(service["image"].as_str(), Some("agent-gateway:acme_stable_03-14-2024"));
        assert_eq!(service["container_name"].as_str(), Some("gateway-lab-gateway"));
        assert_eq!(service["volumes"][0].as_str(), Some("./export:/opt/agent/export"));

        let environment = service["environment"].as_mapping().unwrap();
        assert_eq!(environment.len(), 4);
        assert_eq!(service["environment"]["MID_INSTANCE_URL"].as_str(), Some("https://acme.vendor.example"));
        assert_eq!(service["environment"]["MID_INSTANCE_USERNAME"].as_str(), Some("svc-gateway"));
        assert_eq!(service["environment"]["MID_INSTANCE_PASSWORD"].as_str(), Some("hunter2"));
        assert_eq!(service["environment"]["MID_SERVER_NAME"].as_str(), Some("Lab Gateway"));
    }

    #[test]
    fn console_script_targets_deployment() {
        let script = console_script("gateway-lab");
        assert!(script.starts_with("#!/bin/sh\n"));
        assert!(script.contains("exec docker exec -it gateway-lab /bin/bash\n"));
    }

    #[test]
    fn write_replaces_previous_files() {
        let dir = tempfile::tempdir().unwrap();
        let settings = config::File::default();
        std::fs::write(dir.path().join("docker-compose.yml"), "stale").unwrap();

        let rendered = write(dir.path(), &settings, &instance(), "agent-gateway:latest").unwrap();

        let compose = std::fs::read_to_string(&rendered.compose_file).unwrap();
        assert!(compose.contains("agent-gateway:latest"));
        assert!(!compose.contains("stale"));
        assert!(rendered.console_script.is_file());
        assert!(dir.path().join("export").is_dir());

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let mode = std::fs::metadata(&rendered.console_script).unwrap().permissions().mode();
            assert_eq!(mode & 0o777, 0o755);
        }
    }
}
