//! Auth principal selection and credential profile loading.
//!
//! The credential/config handle itself is host plumbing; this module only
//! resolves the pieces the pipeline needs from it: the tenancy, the home
//! region, and the raw-credential view the request authorizer consumes.

use std::collections::HashMap;
use std::fs;
use std::path::PathBuf;
use std::str::FromStr;

use super::error::ConfigError;

/// The identity used to call the provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Principal {
    ApiKey,
    InstancePrincipal,
    ResourcePrincipal,
    WorkloadPrincipal,
}

impl Principal {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::ApiKey => "api_key",
            Self::InstancePrincipal => "instance_principal",
            Self::ResourcePrincipal => "resource_principal",
            Self::WorkloadPrincipal => "workload_principal",
        }
    }
}

impl FromStr for Principal {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "api_key" => Ok(Self::ApiKey),
            "instance_principal" => Ok(Self::InstancePrincipal),
            "resource_principal" => Ok(Self::ResourcePrincipal),
            "workload_principal" => Ok(Self::WorkloadPrincipal),
            other => Err(ConfigError::UnknownPrincipal(other.to_string())),
        }
    }
}

impl std::fmt::Display for Principal {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One profile section of an OCI-style credential file.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CredentialProfile {
    pub tenancy: String,
    pub region: Option<String>,
    pub user: Option<String>,
    pub fingerprint: Option<String>,
    pub key_file: Option<String>,
    pub security_token_file: Option<String>,
    pub pass_phrase: Option<String>,
}

/// Parses `profile` from the INI-style credential file at `path`.
///
/// Entries in `[DEFAULT]` apply to every profile; the named section
/// overrides them. `~` expands to the caller's home directory.
pub fn load_profile(path: &str, profile: &str) -> Result<CredentialProfile, ConfigError> {
    let expanded = expand_home(path);
    let contents = fs::read_to_string(&expanded).map_err(|source| ConfigError::CredentialFile {
        path: expanded.display().to_string(),
        source,
    })?;

    let sections = parse_sections(&contents);
    if profile != "DEFAULT" && !sections.contains_key(profile) {
        return Err(ConfigError::MissingProfile {
            path: expanded.display().to_string(),
            profile: profile.to_string(),
        });
    }

    let mut entries: HashMap<String, String> =
        sections.get("DEFAULT").cloned().unwrap_or_default();
    if let Some(section) = sections.get(profile) {
        entries.extend(section.clone());
    }

    let required = |key: &str| -> Result<String, ConfigError> {
        entries.get(key).cloned().ok_or_else(|| ConfigError::MissingEntry {
            profile: profile.to_string(),
            entry: key.to_string(),
        })
    };

    Ok(CredentialProfile {
        tenancy: required("tenancy")?,
        region: entries.get("region").cloned(),
        user: entries.get("user").cloned(),
        fingerprint: entries.get("fingerprint").cloned(),
        key_file: entries.get("key_file").cloned(),
        security_token_file: entries.get("security_token_file").cloned(),
        pass_phrase: entries.get("pass_phrase").cloned(),
    })
}

fn parse_sections(contents: &str) -> HashMap<String, HashMap<String, String>> {
    let mut sections: HashMap<String, HashMap<String, String>> = HashMap::new();
    let mut current = "DEFAULT".to_string();

    for line in contents.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') || line.starts_with(';') {
            continue;
        }
        if let Some(name) = line.strip_prefix('[').and_then(|l| l.strip_suffix(']')) {
            current = name.trim().to_string();
            sections.entry(current.clone()).or_default();
            continue;
        }
        if let Some((key, value)) = line.split_once('=') {
            sections
                .entry(current.clone())
                .or_default()
                .insert(key.trim().to_string(), value.trim().to_string());
        }
    }

    sections
}

fn expand_home(path: &str) -> PathBuf {
    if let Some(rest) = path.strip_prefix("~/") {
        if let Ok(home) = std::env::var("HOME") {
            return PathBuf::from(home).join(rest);
        }
    }
    PathBuf::from(path)
}

/// The resolved credential view handed to the client layer.
#[derive(Debug, Clone)]
pub struct Credentials {
    pub principal: Principal,
    pub tenancy: String,
    /// Home region of the credential; the default scan scope.
    pub region: String,
    /// Pre-established session token, when the profile carries one.
    pub session_token: Option<String>,
    pub pass_phrase: Option<String>,
}

impl Credentials {
    /// Resolves credentials for `principal`.
    ///
    /// `api_key` reads the credential file; the workload-style principals
    /// surface tenancy and region through their environment.
    pub fn resolve(
        principal: Principal,
        config_file: &str,
        profile: &str,
        key_pass: Option<String>,
    ) -> Result<Self, ConfigError> {
        match principal {
            Principal::ApiKey => {
                let parsed = load_profile(config_file, profile)?;
                let region = parsed.region.clone().ok_or_else(|| ConfigError::MissingEntry {
                    profile: profile.to_string(),
                    entry: "region".to_string(),
                })?;

                let session_token = match &parsed.security_token_file {
                    Some(token_file) => {
                        let token_path = expand_home(token_file);
                        let token = fs::read_to_string(&token_path).map_err(|source| {
                            ConfigError::CredentialFile {
                                path: token_path.display().to_string(),
                                source,
                            }
                        })?;
                        Some(token.trim().to_string())
                    }
                    None => None,
                };

                Ok(Self {
                    principal,
                    tenancy: parsed.tenancy,
                    region,
                    session_token,
                    pass_phrase: key_pass.or(parsed.pass_phrase),
                })
            }
            _ => {
                let tenancy = std::env::var("OCI_TENANCY")
                    .map_err(|_| ConfigError::MissingEnvironment("OCI_TENANCY"))?;
                let region = std::env::var("OCI_REGION")
                    .map_err(|_| ConfigError::MissingEnvironment("OCI_REGION"))?;
                let session_token = std::env::var("OCI_SESSION_TOKEN").ok();

                Ok(Self { principal, tenancy, region, session_token, pass_phrase: key_pass })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn credential_file(contents: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        file
    }

    #[test]
    fn principal_words_round_trip() {
        for word in ["api_key", "instance_principal", "resource_principal", "workload_principal"]
        {
            assert_eq!(Principal::from_str(word).unwrap().as_str(), word);
        }
        assert!(matches!(
            Principal::from_str("federated"),
            Err(ConfigError::UnknownPrincipal(_))
        ));
    }

    #[test]
    fn named_profile_overrides_default_section() {
        let file = credential_file(
            "[DEFAULT]\n\
             tenancy=ocid1.tenancy.oc1..base\n\
             region=us-ashburn-1\n\
             \n\
             [EU]\n\
             region=eu-frankfurt-1\n",
        );

        let parsed = load_profile(file.path().to_str().unwrap(), "EU").unwrap();
        assert_eq!(parsed.tenancy, "ocid1.tenancy.oc1..base");
        assert_eq!(parsed.region.as_deref(), Some("eu-frankfurt-1"));
    }

    #[test]
    fn comments_and_blank_lines_are_ignored() {
        let file = credential_file(
            "# credentials\n\
             [DEFAULT]\n\
             ; home region\n\
             tenancy = ocid1.tenancy.oc1..t\n\
             region = us-phoenix-1\n\
             user = ocid1.user.oc1..u\n",
        );

        let parsed = load_profile(file.path().to_str().unwrap(), "DEFAULT").unwrap();
        assert_eq!(parsed.region.as_deref(), Some("us-phoenix-1"));
        assert_eq!(parsed.user.as_deref(), Some("ocid1.user.oc1..u"));
    }

    #[test]
    fn unknown_profile_is_an_error() {
        let file = credential_file("[DEFAULT]\ntenancy=t\nregion=r\n");
        assert!(matches!(
            load_profile(file.path().to_str().unwrap(), "NOPE"),
            Err(ConfigError::MissingProfile { .. })
        ));
    }

    #[test]
    fn missing_tenancy_is_an_error() {
        let file = credential_file("[DEFAULT]\nregion=us-ashburn-1\n");
        assert!(matches!(
            load_profile(file.path().to_str().unwrap(), "DEFAULT"),
            Err(ConfigError::MissingEntry { .. })
        ));
    }

    #[test]
    fn api_key_credentials_resolve_from_the_profile() {
        let file = credential_file(
            "[DEFAULT]\n\
             tenancy=ocid1.tenancy.oc1..t\n\
             region=us-ashburn-1\n",
        );

        let creds = Credentials::resolve(
            Principal::ApiKey,
            file.path().to_str().unwrap(),
            "DEFAULT",
            None,
        )
        .unwrap();
        assert_eq!(creds.tenancy, "ocid1.tenancy.oc1..t");
        assert_eq!(creds.region, "us-ashburn-1");
        assert!(creds.session_token.is_none());
    }
}
