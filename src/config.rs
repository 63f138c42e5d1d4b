use serde::Deserialize;
use serde_inline_default::serde_inline_default;
use std::fmt::{Debug, Formatter};
use thiserror::Error;

const DEFAULT_CONFIG: &str = include_str!("../default.toml");

pub const PLACEHOLDER_INSTANCE: &str = "your-instance";
pub const PLACEHOLDER_DISPLAY_NAME: &str = "your-gateway-name";
pub const PLACEHOLDER_USERNAME: &str = "your-username";
pub const PLACEHOLDER_PASSWORD: &str = "your-password";

#[derive(Error, Debug)]
pub enum Error {
    #[error("read {path}: {err}")]
    ReadFile {
        err: std::io::Error,
        path: String,
    },

    #[error("parse {path}: {err}")]
    Parse {
        err: toml::de::Error,
        path: String,
    },
}

/// A gateway.toml file.
#[derive(Deserialize, Debug, Clone)]
pub struct File {
    pub description: Option<String>,
    pub vendor: Vendor,
    pub bundle: Bundle,
    #[serde(default = "Default::default")]
    pub download: Download,
    pub image: Image,
    pub deployment: Deployment,
}

impl Default for File {
    fn default() -> Self {
        // The default config is compiled into the program, so
        // make sure to test default() to catch panics compile-time.
        toml::from_str(DEFAULT_CONFIG).unwrap()
    }
}

impl File {
    /// Read a user configuration file and lay it over the built-in defaults.
    /// Tables are merged key by key, so a user file only needs the keys it changes.
    pub fn default_with_user_config_file(path: &str) -> Result<Self, Error> {
        let user_config = std::fs::read_to_string(path).map_err(|err| Error::ReadFile {
            err,
            path: path.to_string(),
        })?;
        Self::merged(&user_config).map_err(|err| Error::Parse {
            err,
            path: path.to_string(),
        })
    }

    fn merged(user_config: &str) -> Result<Self, toml::de::Error> {
        let mut base: toml::Table = toml::from_str(DEFAULT_CONFIG)?;
        let overlay: toml::Table = toml::from_str(user_config)?;
        merge(&mut base, overlay);
        toml::Value::Table(base).try_into()
    }
}

fn merge(base: &mut toml::Table, overlay: toml::Table) {
    for (key, value) in overlay {
        if let (Some(toml::Value::Table(existing)), toml::Value::Table(incoming)) =
            (base.get_mut(&key), &value)
        {
            merge(existing, incoming.clone());
            continue;
        }
        base.insert(key, value);
    }
}

#[derive(Deserialize, Debug, Clone)]
pub struct Vendor {
    pub instance_url: String,
    pub version_path: String,
}

#[derive(Deserialize, Debug, Clone)]
pub struct Bundle {
    pub url_template: String,
    pub archive: String,
    pub build_directory: String,
    pub recipe_file: String,
    /// Downloads of this size or smaller are treated as truncated.
    pub min_bytes: u64,
}

#[serde_inline_default]
#[derive(Deserialize, Debug, Clone)]
pub struct Download {
    #[serde_inline_default(30)]
    pub connect_timeout_secs: u64,
    #[serde_inline_default(900)]
    pub timeout_secs: u64,
}

impl Default for Download {
    fn default() -> Self {
        Self {
            connect_timeout_secs: 30,
            timeout_secs: 900,
        }
    }
}

#[derive(Deserialize, Debug, Clone)]
pub struct Image {
    pub repository: String,
}

#[derive(Deserialize, Debug, Clone)]
pub struct Deployment {
    pub compose_file: String,
    pub console_script: String,
    pub export_directory: String,
    pub container_export_path: String,
    pub environment: Environment,
}

/// Names of the environment variables the gateway image reads its settings from.
#[derive(Deserialize, Debug, Clone)]
pub struct Environment {
    pub instance_url: String,
    pub username: String,
    pub password: String,
    pub display_name: String,
}

/// Which vendor instance the gateway connects to, and as whom.
#[derive(Clone)]
pub struct Instance {
    pub name: String,
    pub display_name: String,
    pub deployment_name: String,
    pub username: String,
    pub password: String,
}

impl Instance {
    /// Build the record; the deployment name is derived from the display name when not given.
    pub fn new(
        name: String,
        display_name: String,
        deployment_name: Option<String>,
        username: String,
        password: String,
    ) -> Self {
        let deployment_name = deployment_name
            .filter(|name| !name.trim().is_empty())
            .unwrap_or_else(|| derive_deployment_name(&display_name));
        Self {
            name,
            display_name,
            deployment_name,
            username,
            password,
        }
    }

    pub fn url(&self, template: &str) -> String {
        template.replace("{instance}", &self.name)
    }
}

impl Debug for Instance {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Instance")
            .field("name", &self.name)
            .field("display_name", &self.display_name)
            .field("deployment_name", &self.deployment_name)
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// `gateway-<slug>`, where slug is the display name lowercased with
/// every run of non-alphanumeric characters collapsed into a single dash.
pub fn derive_deployment_name(display_name: &str) -> String {
    let mut slug = String::with_capacity(display_name.len());
    for c in display_name.chars() {
        if c.is_ascii_alphanumeric() {
            slug.push(c.to_ascii_lowercase());
        } else if !slug.is_empty() && !slug.ends_with('-') {
            slug.push('-');
        }
    }
    let slug = slug.trim_end_matches('-');
    if slug.is_empty() {
        "gateway".to_string()
    } else {
        format!("gateway-{slug}")
    }
}

#[cfg(test)]
pub mod test {
    use super::*;

    #[test]
    pub fn load_default_configuration() {
        let cfg = File::default();
        assert_eq!(cfg.description, Some("Built-in gateway provisioning defaults".into()));
        assert_eq!(cfg.bundle.min_bytes, 5000);
        assert_eq!(cfg.download.connect_timeout_secs, 30);
        assert_eq!(cfg.deployment.compose_file, "docker-compose.yml");
    }

    #[test]
    pub fn user_configuration_overrides_single_keys() {
        let cfg = File::merged(
            r#"
            [bundle]
            min_bytes = 100

            [deployment.environment]
            display_name = "GATEWAY_NAME"
            "#,
        )
        .unwrap();
        assert_eq!(cfg.bundle.min_bytes, 100);
        assert_eq!(cfg.bundle.recipe_file, "Dockerfile");
        assert_eq!(cfg.deployment.environment.display_name, "GATEWAY_NAME");
        assert_eq!(cfg.deployment.environment.username, "MID_INSTANCE_USERNAME");
    }

    #[test]
    pub fn user_configuration_rejects_wrong_types() {
        assert!(File::merged("[bundle]\nmin_bytes = \"lots\"\n").is_err());
    }

    #[test]
    pub fn deployment_name_derived_from_display_name() {
        assert_eq!(derive_deployment_name("Lab Gateway #2"), "gateway-lab-gateway-2");
        assert_eq!(derive_deployment_name("  edge__01 "), "gateway-edge-01");
        assert_eq!(derive_deployment_name("***"), "gateway");
    }

    #[test]
    pub fn explicit_deployment_name_wins() {
        let instance = Instance::new(
            "acme".into(),
            "Lab Gateway".into(),
            Some("lab".into()),
            "user".into(),
            "secret".into(),
        );
        assert_eq!(instance.deployment_name, "lab");
        assert_eq!(instance.url("https://{instance}.vendor.example"), "https://acme.vendor.example");
        assert!(!format!("{instance:?}").contains("secret"));
    }
}
