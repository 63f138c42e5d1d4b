use std::sync::OnceLock;
use log::warn;
use regex::Regex;
use thiserror::Error;
use crate::config::{self, Instance};
use crate::host::Host;

/// Programs the workflow cannot run without.
pub const REQUIRED_PROGRAMS: [&str; 2] = ["docker", "unzip"];

#[derive(Error, Debug, PartialEq)]
#[error("{}", describe(.missing_programs, .unset, .invalid_deployment_name))]
pub struct Error {
    pub missing_programs: Vec<&'static str>,
    pub unset: Vec<&'static str>,
    pub invalid_deployment_name: Option<String>,
}

/// Docker container name rule. The name also ends up unquoted in the console script.
fn deployment_name_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    // unwrap ok, the pattern is a literal
    PATTERN.get_or_init(|| Regex::new(r"^[a-zA-Z0-9][a-zA-Z0-9_.-]*$").unwrap())
}

fn describe(missing_programs: &[&str], unset: &[&str], invalid_deployment_name: &Option<String>) -> String {
    let mut problems = Vec::new();
    if !missing_programs.is_empty() {
        problems.push(format!("missing programs: {}", missing_programs.join(", ")));
    }
    if !unset.is_empty() {
        problems.push(format!("set these variables: {}", unset.join(", ")));
    }
    if let Some(name) = invalid_deployment_name {
        problems.push(format!("GATEWAY_DEPLOYMENT_NAME {name:?} is not a valid container name"));
    }
    problems.join("; ")
}

/// Check for required programs and placeholder configuration.
/// Every problem is logged before the check fails.
pub fn check<H: Host>(host: &H, instance: &Instance) -> Result<(), Error> {
    let missing_programs: Vec<&'static str> = REQUIRED_PROGRAMS
        .into_iter()
        .filter(|program| !host.find_program(program))
        .collect();
    for program in &missing_programs {
        warn!("{program} is required but was not found in PATH");
    }
    report(missing_programs, instance)
}

/// Like [`check`], without looking for programs.
pub fn check_configuration(instance: &Instance) -> Result<(), Error> {
    report(Vec::new(), instance)
}

fn report(missing_programs: Vec<&'static str>, instance: &Instance) -> Result<(), Error> {
    let unset = unset_values(instance);
    for variable in &unset {
        warn!("{variable} is not set; it still holds its placeholder value");
    }
    let invalid_deployment_name = Some(&instance.deployment_name)
        .filter(|name| !deployment_name_pattern().is_match(name))
        .cloned();
    if let Some(name) = &invalid_deployment_name {
        warn!("deployment name {name:?} must start with a letter or digit and contain only letters, digits, '_', '.' and '-'");
    }
    if missing_programs.is_empty() && unset.is_empty() && invalid_deployment_name.is_none() {
        Ok(())
    } else {
        Err(Error { missing_programs, unset, invalid_deployment_name })
    }
}

/// Environment variable names of every value still equal to its placeholder, or empty.
pub fn unset_values(instance: &Instance) -> Vec<&'static str> {
    [
        ("GATEWAY_INSTANCE", &instance.name, config::PLACEHOLDER_INSTANCE),
        ("GATEWAY_DISPLAY_NAME", &instance.display_name, config::PLACEHOLDER_DISPLAY_NAME),
        ("GATEWAY_USERNAME", &instance.username, config::PLACEHOLDER_USERNAME),
        ("GATEWAY_PASSWORD", &instance.password, config::PLACEHOLDER_PASSWORD),
    ]
    .into_iter()
    .filter(|(_, value, placeholder)| value.trim().is_empty() || value.as_str() == *placeholder)
    .map(|(variable, _, _)| variable)
    .collect()
}
