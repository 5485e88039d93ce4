/// `load_config` module: loads a YAML description of one desired resource and resolves it,
/// together with command-line overrides and environment fallbacks, into a runnable invocation.
///
/// This module is the only place where untrusted YAML and environment variables are parsed
/// and mapped to the strongly-typed core request.
///
/// # Precedence
/// For every control input: command-line flag, then YAML, then environment, then default.
/// Explicit input always wins over the environment.
///
/// # Environment
/// Each resource kind has its own variable names (see [`env_names`]). Status pages also
/// take every record field from a `BU_*` variable when the YAML leaves it out.
///
/// # Errors
/// All errors use `anyhow::Error` with the offending file or variable named, and are
/// surfaced at the CLI boundary.
use anyhow::{anyhow, bail, Context, Result};
use bu_reconcile_core::model::{DesiredRecord, ResourceKind, State, StatusPageRecord};
use bu_reconcile_core::reconcile::ReconcileRequest;
use serde::Deserialize;
use std::fs;
use std::path::Path;
use std::time::Duration;
use tracing::{error, info};

use crate::transport::{TransportSettings, DEFAULT_TIMEOUT};

/// The YAML document accepted by `bu-reconcile apply`.
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DesiredConfig {
    pub resource: DesiredRecord,
    #[serde(default)]
    pub state: Option<State>,
    #[serde(default)]
    pub id: Option<u64>,
    #[serde(default)]
    pub check_for: Option<Vec<String>>,
    #[serde(default)]
    pub token: Option<String>,
    #[serde(default)]
    pub validate_certs: Option<bool>,
    #[serde(default)]
    pub https_proxy: Option<String>,
}

/// Values given on the command line. `None` means "not given".
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    pub token: Option<String>,
    pub state: Option<State>,
    pub id: Option<u64>,
    pub check_for: Option<Vec<String>>,
    pub validate_certs: Option<bool>,
    pub https_proxy: Option<String>,
    pub timeout: Option<Duration>,
    pub base_url: Option<String>,
    pub dry_run: bool,
}

/// Everything needed to talk to the API.
#[derive(Debug, Clone)]
pub struct Connection {
    pub token: String,
    pub transport: TransportSettings,
    /// Replaces the public API root, mainly for testing against a local server.
    pub base_url: Option<String>,
}

#[derive(Debug, Clone)]
pub struct Invocation {
    pub request: ReconcileRequest,
    pub connection: Connection,
}

/// Environment variable names consulted for one resource kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EnvNames {
    pub token: &'static str,
    pub state: &'static str,
    pub id: &'static str,
    pub check_for: &'static str,
    pub validate_certs: &'static str,
    pub https_proxy: &'static [&'static str],
}

pub const BASE_URL_ENV: &str = "BU_API_BASE_URL";

pub fn env_names(kind: ResourceKind) -> EnvNames {
    match kind {
        ResourceKind::Monitors => EnvNames {
            token: "BU_API_TOKEN",
            state: "BU_STATE",
            id: "BU_ID",
            check_for: "BU_check_for",
            validate_certs: "BU_VALIDATE_CERTS",
            https_proxy: &["https_proxy", "HTTPS_PROXY"],
        },
        ResourceKind::StatusPages => EnvNames {
            token: "BU_API_TOKEN",
            state: "BU_STATE",
            id: "BU_ID",
            check_for: "BU_CHECK_FOR",
            validate_certs: "BU_VALIDATE_CERTS",
            https_proxy: &["https_proxy", "HTTPS_PROXY"],
        },
    }
}

/// Loads the YAML file at `path` and resolves it into an [`Invocation`].
pub fn load_config<P: AsRef<Path>>(path: P, overrides: &Overrides) -> Result<Invocation> {
    let path_ref = path.as_ref();
    info!(config_path = ?path_ref, "Loading desired state from file");

    let config_content = match fs::read_to_string(path_ref) {
        Ok(content) => content,
        Err(e) => {
            error!(error = ?e, config_path = ?path_ref, "Failed to read config file");
            return Err(anyhow!("Failed to read config file {:?}: {}", path_ref, e));
        }
    };

    let config: DesiredConfig = match serde_yaml::from_str(&config_content) {
        Ok(conf) => {
            info!(config_path = ?path_ref, "Parsed config YAML successfully");
            conf
        }
        Err(e) => {
            error!(error = ?e, config_path = ?path_ref, "Failed to parse config YAML");
            return Err(anyhow!("Failed to parse config YAML {:?}: {e}", path_ref));
        }
    };

    resolve(config, overrides).with_context(|| format!("Invalid configuration in {:?}", path_ref))
}

/// Applies overrides and environment fallbacks to a parsed config.
pub fn resolve(config: DesiredConfig, overrides: &Overrides) -> Result<Invocation> {
    let kind = config.resource.kind();
    let names = env_names(kind);

    let mut record = config.resource;
    if let DesiredRecord::StatusPage(page) = &mut record {
        fill_status_page_from_env(page)?;
    }

    let state = match overrides.state.or(config.state) {
        Some(state) => state,
        None => match env_var(names.state) {
            Some(raw) => raw
                .parse::<State>()
                .with_context(|| format!("{} is not a valid state", names.state))?,
            None => State::default(),
        },
    };

    let id = match overrides.id.or(config.id) {
        Some(id) => Some(id),
        None => env_var(names.id)
            .map(|raw| {
                raw.parse::<u64>()
                    .with_context(|| format!("{} must be a positive integer, got '{raw}'", names.id))
            })
            .transpose()?,
    };

    let match_keys = overrides
        .check_for
        .clone()
        .or(config.check_for)
        .or_else(|| env_var(names.check_for).map(|raw| split_list(&raw)))
        .unwrap_or_else(|| kind.default_match_keys());

    record
        .validate(id)
        .context("Resource fields do not satisfy the rules for this kind")?;

    let connection = resolve_connection(
        kind,
        overrides,
        config.token,
        config.validate_certs,
        config.https_proxy,
    )?;

    info!(
        kind = %kind,
        state = ?state,
        id = ?id,
        match_keys = ?match_keys,
        dry_run = overrides.dry_run,
        "Resolved invocation"
    );

    Ok(Invocation {
        request: ReconcileRequest {
            record,
            id,
            match_keys,
            state,
            dry_run: overrides.dry_run,
        },
        connection,
    })
}

/// Resolves token and transport settings for `kind`. Used directly by `list`,
/// which has no YAML file.
pub fn resolve_connection(
    kind: ResourceKind,
    overrides: &Overrides,
    config_token: Option<String>,
    config_validate_certs: Option<bool>,
    config_proxy: Option<String>,
) -> Result<Connection> {
    let names = env_names(kind);

    let token = match overrides.token.clone().or(config_token).or_else(|| env_var(names.token)) {
        Some(token) => {
            info!(token_set = !token.is_empty(), "API token resolved");
            token
        }
        None => {
            error!(env = names.token, "No API token given");
            bail!(
                "No API token given: pass --token, set `token` in the config file or export {}",
                names.token
            );
        }
    };

    let validate_certs = match overrides.validate_certs.or(config_validate_certs) {
        Some(flag) => flag,
        None => match env_var(names.validate_certs) {
            Some(raw) => parse_bool(&raw)
                .with_context(|| format!("{} must be a boolean", names.validate_certs))?,
            None => true,
        },
    };

    let https_proxy = overrides
        .https_proxy
        .clone()
        .or(config_proxy)
        .or_else(|| names.https_proxy.iter().find_map(|name| env_var(name)));

    let base_url = overrides.base_url.clone().or_else(|| env_var(BASE_URL_ENV));

    Ok(Connection {
        token,
        transport: TransportSettings {
            validate_certs,
            https_proxy,
            timeout: overrides.timeout.unwrap_or(DEFAULT_TIMEOUT),
        },
        base_url,
    })
}

fn fill_status_page_from_env(page: &mut StatusPageRecord) -> Result<()> {
    fn text(target: &mut Option<String>, name: &str) {
        if target.is_none() {
            *target = env_var(name);
        }
    }

    if page.history.is_none() {
        page.history = env_var("BU_HISTORY")
            .map(|raw| {
                raw.parse::<i64>()
                    .with_context(|| format!("BU_HISTORY must be an integer, got '{raw}'"))
            })
            .transpose()?;
    }
    text(&mut page.company_name, "BU_COMPANY_NAME");
    text(&mut page.company_url, "BU_COMPANY_URL");
    text(&mut page.contact_url, "BU_CONTACT_URL");
    text(&mut page.logo_url, "BU_LOGO_URL");
    text(&mut page.timezone, "BU_TIMEZONE");
    text(&mut page.subdomain, "BU_SUBDOMAIN");
    text(&mut page.custom_domain, "BU_CUSTOM_DOMAIN");
    if page.hide_from_search_engines.is_none() {
        page.hide_from_search_engines = env_var("BU_HIDE_FROM_SEARCH_ENGINES")
            .map(|raw| {
                parse_bool(&raw).context("BU_HIDE_FROM_SEARCH_ENGINES must be a boolean")
            })
            .transpose()?;
    }
    Ok(())
}

/// Set and non-empty environment variable.
fn env_var(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.trim().is_empty())
}

fn split_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_owned)
        .collect()
}

fn parse_bool(raw: &str) -> Result<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        other => bail!("'{other}' is not a boolean"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lists_split_on_commas() {
        assert_eq!(split_list("url, port,,"), vec!["url", "port"]);
    }

    #[test]
    fn booleans_accept_common_spellings() {
        assert!(parse_bool("Yes").unwrap());
        assert!(!parse_bool("0").unwrap());
        assert!(parse_bool("maybe").is_err());
    }

    #[test]
    fn monitor_and_status_page_use_different_match_key_variables() {
        assert_eq!(env_names(ResourceKind::Monitors).check_for, "BU_check_for");
        assert_eq!(env_names(ResourceKind::StatusPages).check_for, "BU_CHECK_FOR");
    }
}
