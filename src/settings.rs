// Copyright 2024 SAP SE
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

use std::fs;
use std::path::Path;

use clap::{ArgAction, Args};

pub const TAGS_FILE: &str = ".tags";

/// Facts about the triggering pipeline, as exported by the CI runner.
// see https://docs.drone.io/pipeline/environment/reference/
#[derive(Args, Clone, Debug, Default)]
pub struct Pipeline {
    #[arg(long, env = "DRONE_REPO_NAMESPACE", hide = true, default_value_t, global = true)]
    pub repo_owner: String,

    #[arg(long, env = "DRONE_REPO_NAME", hide = true, default_value_t, global = true)]
    pub repo_name: String,

    /// Default branch of the repository
    #[arg(long, env = "DRONE_REPO_BRANCH", hide = true, default_value_t, global = true)]
    pub repo_branch: String,

    #[arg(long, env = "DRONE_COMMIT_SHA", hide = true, default_value_t, global = true)]
    pub commit_sha: String,

    #[arg(long, env = "DRONE_COMMIT_REF", hide = true, default_value_t, global = true)]
    pub commit_ref: String,

    #[arg(long, env = "DRONE_COMMIT_BRANCH", hide = true, default_value_t, global = true)]
    pub commit_branch: String,

    #[arg(long, env = "DRONE_BUILD_NUMBER", hide = true, default_value_t, global = true)]
    pub build_number: u64,

    #[arg(long, env = "DRONE_BUILD_EVENT", hide = true, default_value_t, global = true)]
    pub build_event: String,

    #[arg(long, env = "DRONE_BUILD_STATUS", hide = true, default_value_t, global = true)]
    pub build_status: String,

    #[arg(long, env = "DRONE_BUILD_CREATED", hide = true, default_value_t, global = true)]
    pub build_created: i64,

    #[arg(long, env = "DRONE_BUILD_STARTED", hide = true, default_value_t, global = true)]
    pub build_started: i64,

    #[arg(long, env = "DRONE_TAG", hide = true, default_value_t, global = true)]
    pub tag: String,

    /// Empty outside of pull request builds
    #[arg(long, env = "DRONE_PULL_REQUEST", hide = true, default_value_t, global = true)]
    pub pull_request: String,

    #[arg(long, env = "DRONE_WORKSPACE", hide = true, default_value_t, global = true)]
    pub workspace: String,

    /// Where to write the result card; /dev/stdout and /dev/stderr get an encoded payload
    #[arg(long, env = "DRONE_CARD_PATH", hide = true, default_value_t, global = true)]
    pub card_path: String,
}

/// Settings describing the manifest list itself, shared by every registry flavour.
#[derive(Args, Clone, Debug, Default)]
pub struct ManifestSettings {
    /// Platforms of the source images, each of the form os/arch[/variant]
    #[arg(long, env = "PLUGIN_PLATFORMS", value_delimiter = ',', global = true)]
    pub platforms: Vec<String>,

    /// Image name of the manifest list
    #[arg(long, env = "PLUGIN_TARGET", default_value_t, global = true)]
    pub target: String,

    /// Source image reference with OS, ARCH and VARIANT placeholders
    #[arg(long, env = "PLUGIN_TEMPLATE", default_value_t, global = true)]
    pub template: String,

    /// Path to a manifest spec template, or the template itself
    #[arg(long, env = "PLUGIN_SPEC", default_value_t, global = true)]
    pub spec: String,

    /// Tags of the manifest list, falls back to PLUGIN_TAG and then PLUGIN_TAGS
    #[arg(long, value_delimiter = ',', global = true)]
    pub tags: Vec<String>,

    /// Derive tags from the git ref instead of --tags
    #[arg(long, env = "PLUGIN_AUTO_TAG", global = true)]
    pub auto_tag: bool,

    /// Skip source images that do not exist in the registry
    #[arg(long, env = "PLUGIN_IGNORE_MISSING", global = true)]
    pub ignore_missing: bool,

    /// Skip TLS verification of the registry
    #[arg(long, env = "PLUGIN_SKIP_VERIFY", global = true)]
    pub skip_verify: bool,

    /// Report deprecated settings before running
    #[arg(long, env = "PLUGIN_LINT", default_value_t = true, action = ArgAction::Set, global = true)]
    pub lint: bool,
}

impl ManifestSettings {
    /// Falls back to alias variables and the tags file for settings that were left empty.
    pub fn resolve_aliases(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if self.tags.is_empty() {
            self.tags = split_list(&first_of(&lookup, &["PLUGIN_TAG", "PLUGIN_TAGS"]));
        }
        if !self.auto_tag {
            self.auto_tag = lookup("PLUGIN_DEFAULT_TAGS").is_some_and(|v| is_truthy(&v));
        }

        self.platforms = self.platforms.iter().map(|p| p.trim().to_string()).filter(|p| !p.is_empty()).collect();
        self.tags = self.tags.iter().map(|t| t.trim().to_string()).filter(|t| !t.is_empty()).collect();
    }

    pub fn read_tags_file(&mut self, path: &Path) {
        if !self.tags.is_empty() {
            return;
        }
        if let Ok(content) = fs::read_to_string(path) {
            tracing::debug!("reading tags from {}", path.display());
            self.tags = split_list(&content);
        }
    }
}

/// Static credentials for a generic registry.
#[derive(Args, Clone, Debug, Default)]
pub struct RegistryLogin {
    /// Username for the registry
    #[arg(long, env = "PLUGIN_USERNAME", default_value_t)]
    pub username: String,

    /// Password for the registry
    #[arg(long, env = "PLUGIN_PASSWORD", hide_env_values = true, default_value_t)]
    pub password: String,

    /// Deprecated, use --skip-verify
    #[arg(long, env = "PLUGIN_INSECURE")]
    pub insecure: bool,

    /// Whether the deprecated insecure setting was given at all, whatever its value.
    #[arg(skip)]
    pub insecure_given: bool,
}

impl RegistryLogin {
    pub fn resolve_aliases(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        self.insecure_given = self.insecure || lookup("PLUGIN_INSECURE").is_some();

        if self.username.is_empty() {
            self.username = first_of(&lookup, &["MANIFEST_USERNAME", "DOCKER_USERNAME"]);
        }
        if self.password.is_empty() {
            self.password = first_of(&lookup, &["MANIFEST_PASSWORD", "DOCKER_PASSWORD"]);
        }
    }
}

/// Settings for pushing to Amazon ECR.
#[derive(Args, Clone, Debug, Default)]
pub struct EcrSettings {
    /// AWS access key id, the ambient credential chain is used when unset
    #[arg(long, env = "PLUGIN_ACCESS_KEY", default_value_t)]
    pub access_key: String,

    /// AWS secret access key
    #[arg(long, env = "PLUGIN_SECRET_KEY", hide_env_values = true, default_value_t)]
    pub secret_key: String,

    /// AWS region of the registry
    #[arg(long, env = "PLUGIN_REGION", default_value_t)]
    pub region: String,

    /// ARN of a role to assume before requesting the registry token
    #[arg(long, env = "PLUGIN_ASSUME_ROLE", default_value_t)]
    pub assume_role: String,

    /// External id required by the trust policy of the assumed role
    #[arg(long, env = "PLUGIN_EXTERNAL_ID", hide_env_values = true, default_value_t)]
    pub external_id: String,

    /// Registry host, derived from the token endpoint when unset
    #[arg(long, env = "PLUGIN_REGISTRY", default_value_t)]
    pub registry: String,

    /// Allow an insecure registry
    #[arg(long, env = "PLUGIN_INSECURE")]
    pub insecure: bool,
}

impl EcrSettings {
    pub fn resolve_aliases(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if self.access_key.is_empty() {
            self.access_key = first_of(&lookup, &["ECR_ACCESS_KEY", "AWS_ACCESS_KEY_ID"]);
        }
        if self.secret_key.is_empty() {
            self.secret_key = first_of(&lookup, &["ECR_SECRET_KEY", "AWS_SECRET_ACCESS_KEY"]);
        }
        if self.region.is_empty() {
            self.region = first_of(&lookup, &["ECR_REGION", "AWS_REGION"]);
        }
    }
}

/// Reads an environment variable, treating empty values as unset.
pub fn lookup_env(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.is_empty())
}

fn first_of(lookup: &impl Fn(&str) -> Option<String>, keys: &[&str]) -> String {
    keys.iter().find_map(|k| lookup(k)).unwrap_or_default()
}

fn split_list(value: &str) -> Vec<String> {
    value
        .split([',', '\n'])
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(ToString::to_string)
        .collect()
}

fn is_truthy(value: &str) -> bool {
    matches!(value.to_lowercase().as_str(), "1" | "true" | "yes" | "on")
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::io::Write;

    use super::*;

    fn env_of(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs.iter().map(|(k, v)| ((*k).to_string(), (*v).to_string())).collect();
        move |k| map.get(k).cloned()
    }

    #[test]
    fn registry_login_aliases() {
        let mut login = RegistryLogin::default();
        login.resolve_aliases(env_of(&[("DOCKER_USERNAME", "octocat"), ("MANIFEST_PASSWORD", "hunter2")]));
        assert_eq!(login.username, "octocat");
        assert_eq!(login.password, "hunter2");

        let mut login = RegistryLogin {
            username: "explicit".into(),
            ..Default::default()
        };
        login.resolve_aliases(env_of(&[("MANIFEST_USERNAME", "first"), ("DOCKER_USERNAME", "second")]));
        assert_eq!(login.username, "explicit");
    }

    #[test]
    fn deprecated_insecure_is_noticed_when_false() {
        let mut login = RegistryLogin::default();
        login.resolve_aliases(env_of(&[("PLUGIN_INSECURE", "false")]));
        assert!(login.insecure_given);
        assert!(!login.insecure);

        let mut login = RegistryLogin::default();
        login.resolve_aliases(env_of(&[]));
        assert!(!login.insecure_given);

        let mut login = RegistryLogin {
            insecure: true,
            ..Default::default()
        };
        login.resolve_aliases(env_of(&[]));
        assert!(login.insecure_given);
    }

    #[test]
    fn ecr_aliases_prefer_plugin_specific_names() {
        let mut ecr = EcrSettings::default();
        ecr.resolve_aliases(env_of(&[
            ("ECR_REGION", "eu-central-1"),
            ("AWS_REGION", "us-west-2"),
            ("AWS_ACCESS_KEY_ID", "AKIA"),
        ]));
        assert_eq!(ecr.region, "eu-central-1");
        assert_eq!(ecr.access_key, "AKIA");
        assert_eq!(ecr.secret_key, "");
    }

    #[test]
    fn manifest_settings_aliases() {
        let mut settings = ManifestSettings {
            platforms: vec!["linux/amd64".into(), " ".into(), " linux/arm64 ".into()],
            ..Default::default()
        };
        settings.resolve_aliases(env_of(&[("PLUGIN_TAG", "1.0,latest"), ("PLUGIN_DEFAULT_TAGS", "true")]));
        assert_eq!(settings.platforms, vec!["linux/amd64", "linux/arm64"]);
        assert_eq!(settings.tags, vec!["1.0", "latest"]);
        assert!(settings.auto_tag);
    }

    #[test]
    fn tag_alias_takes_precedence() {
        let mut settings = ManifestSettings::default();
        settings.resolve_aliases(env_of(&[("PLUGIN_TAG", "1.0"), ("PLUGIN_TAGS", "2.0,latest")]));
        assert_eq!(settings.tags, vec!["1.0"]);

        let mut settings = ManifestSettings::default();
        settings.resolve_aliases(env_of(&[("PLUGIN_TAGS", "2.0,latest")]));
        assert_eq!(settings.tags, vec!["2.0", "latest"]);

        let mut settings = ManifestSettings {
            tags: vec!["flag".into()],
            ..Default::default()
        };
        settings.resolve_aliases(env_of(&[("PLUGIN_TAG", "1.0")]));
        assert_eq!(settings.tags, vec!["flag"]);
    }

    #[test]
    fn tags_file_only_fills_empty_tags() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "1.2.3,1.2\nlatest").unwrap();

        let mut settings = ManifestSettings::default();
        settings.read_tags_file(file.path());
        assert_eq!(settings.tags, vec!["1.2.3", "1.2", "latest"]);

        let mut settings = ManifestSettings {
            tags: vec!["explicit".into()],
            ..Default::default()
        };
        settings.read_tags_file(file.path());
        assert_eq!(settings.tags, vec!["explicit"]);

        let mut settings = ManifestSettings::default();
        settings.read_tags_file(Path::new("/nonexistent/.tags"));
        assert!(settings.tags.is_empty());
    }
}
