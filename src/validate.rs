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

use crate::error::{Error, Result};
use crate::settings::{ManifestSettings, RegistryLogin};

/// How the manifest list is described, decided once before any work is done.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Mode {
    /// A manifest spec template, either a file path or inline content.
    Spec(String),
    /// Discrete arguments that are expanded into one entry per platform.
    Args {
        platforms: Vec<String>,
        target: String,
        template: String,
    },
}

/// Checks the settings and picks the [`Mode`].
///
/// `login` is only given for registries with static credentials, the ECR flow
/// authenticates through the token exchange instead.
pub fn verify(settings: &ManifestSettings, login: Option<&RegistryLogin>) -> Result<Mode> {
    if let Some(login) = login {
        if login.username.is_empty() && !login.password.is_empty() {
            return Err(Error::Configuration("no username provided".to_string()));
        }
        if login.password.is_empty() && !login.username.is_empty() {
            return Err(Error::Configuration("no password provided".to_string()));
        }
    }

    if settings.spec.is_empty() {
        if settings.platforms.is_empty() {
            return Err(Error::Configuration("no platforms provided".to_string()));
        }
        if settings.target.is_empty() {
            return Err(Error::Configuration("no target provided".to_string()));
        }
        if settings.template.is_empty() {
            return Err(Error::Configuration("no template provided".to_string()));
        }

        return Ok(Mode::Args {
            platforms: settings.platforms.clone(),
            target: settings.target.clone(),
            template: settings.template.clone(),
        });
    }

    if !settings.platforms.is_empty() || !settings.target.is_empty() || !settings.template.is_empty() {
        return Err(Error::Configuration("both spec and arguments provided".to_string()));
    }

    Ok(Mode::Spec(settings.spec.clone()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args_settings() -> ManifestSettings {
        ManifestSettings {
            platforms: vec!["linux/amd64".into(), "linux/arm64/v8".into()],
            target: "registry.example.com/app".into(),
            template: "registry.example.com/app:OS-ARCH".into(),
            ..Default::default()
        }
    }

    fn assert_config_error(result: Result<Mode>, expected: &str) {
        match result {
            Err(Error::Configuration(msg)) => assert_eq!(msg, expected),
            other => panic!("expected configuration error {expected:?}, got {other:?}"),
        }
    }

    #[test]
    fn accepts_only_spec() {
        let settings = ManifestSettings {
            spec: "manifest.tmpl".into(),
            ..Default::default()
        };
        assert_eq!(verify(&settings, None).unwrap(), Mode::Spec("manifest.tmpl".into()));
    }

    #[test]
    fn accepts_complete_args() {
        let mode = verify(&args_settings(), None).unwrap();
        assert_eq!(mode, Mode::Args {
            platforms: vec!["linux/amd64".into(), "linux/arm64/v8".into()],
            target: "registry.example.com/app".into(),
            template: "registry.example.com/app:OS-ARCH".into(),
        });
    }

    #[test]
    fn rejects_spec_and_args() {
        let settings = ManifestSettings {
            spec: "manifest.tmpl".into(),
            platforms: vec!["linux/amd64".into()],
            ..Default::default()
        };
        assert_config_error(verify(&settings, None), "both spec and arguments provided");

        let settings = ManifestSettings {
            spec: "manifest.tmpl".into(),
            template: "app:ARCH".into(),
            ..Default::default()
        };
        assert_config_error(verify(&settings, None), "both spec and arguments provided");
    }

    #[test]
    fn rejects_neither_spec_nor_args() {
        assert_config_error(verify(&ManifestSettings::default(), None), "no platforms provided");
    }

    #[test]
    fn names_first_missing_argument() {
        let mut settings = args_settings();
        settings.target.clear();
        settings.template.clear();
        assert_config_error(verify(&settings, None), "no target provided");

        let mut settings = args_settings();
        settings.template.clear();
        assert_config_error(verify(&settings, None), "no template provided");
    }

    #[test]
    fn rejects_missing_credential_half_first() {
        let login = RegistryLogin {
            password: "hunter2".into(),
            ..Default::default()
        };
        // the credential rule wins over the missing spec/args rule
        assert_config_error(verify(&ManifestSettings::default(), Some(&login)), "no username provided");

        let login = RegistryLogin {
            username: "octocat".into(),
            ..Default::default()
        };
        assert_config_error(verify(&args_settings(), Some(&login)), "no password provided");
    }

    #[test]
    fn anonymous_and_complete_logins_pass() {
        assert!(verify(&args_settings(), Some(&RegistryLogin::default())).is_ok());

        let login = RegistryLogin {
            username: "octocat".into(),
            password: "hunter2".into(),
            ..Default::default()
        };
        assert!(verify(&args_settings(), Some(&login)).is_ok());
    }
}
