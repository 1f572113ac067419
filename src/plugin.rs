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

use crate::api_clients::TokenClient;
use crate::card::{self, CardData};
use crate::credentials::{self, Credentials};
use crate::error::Result;
use crate::manifest::{self, ManifestInput};
use crate::push::{PushRequest, Pushed, Pusher};
use crate::settings::{EcrSettings, ManifestSettings, Pipeline, RegistryLogin};
use crate::tagging;
use crate::validate::{self, Mode};

/// Where the manifest list goes and how to log in there.
pub enum Registry<C: TokenClient> {
    /// Any registry, with a static username and password.
    Static(RegistryLogin),
    /// Amazon ECR, logging in through a token exchange.
    Ecr { settings: EcrSettings, client: C },
}

impl<C: TokenClient> Registry<C> {
    fn login(&self) -> Option<&RegistryLogin> {
        match self {
            Self::Static(login) => Some(login),
            Self::Ecr { .. } => None,
        }
    }

    fn insecure(&self) -> bool {
        match self {
            Self::Static(login) => login.insecure,
            Self::Ecr { settings, .. } => settings.insecure,
        }
    }

    async fn credentials(&self) -> Result<Credentials> {
        match self {
            Self::Static(login) => Credentials::pass_through(login),
            Self::Ecr { settings, client } => credentials::exchange(client, &settings.registry).await,
        }
    }
}

pub struct Args<C: TokenClient> {
    pub pipeline: Pipeline,
    pub settings: ManifestSettings,
    pub registry: Registry<C>,
}

#[derive(Debug, PartialEq, Eq)]
pub enum Outcome {
    /// Auto tagging does not apply to the triggering ref.
    Skipped,
    Pushed { image: String, pushed: Vec<Pushed> },
}

#[derive(Debug, Default, PartialEq, Eq)]
pub struct Lint {
    pub issues: usize,
    pub warnings: Vec<String>,
}

impl Lint {
    pub fn summary(&self) -> String {
        format!("lint: {} issue(s) found\n{}", self.issues, self.warnings.join("\n"))
    }
}

/// Flags deprecated settings.
pub fn lint<C: TokenClient>(args: &Args<C>) -> Lint {
    let mut lint = Lint::default();

    if let Registry::Static(login) = &args.registry {
        if login.insecure_given {
            lint.issues += 1;
            lint.warnings
                .push("remove insecure from config and use skip_verify instead".to_string());
        }
    }

    lint
}

/// Splits the manifest list into the requests handed to the pusher.
///
/// ECR gets one request per tag when built from arguments, everything else
/// pushes once with all tags embedded.
pub fn push_plan(mode: &Mode, manifest: &ManifestInput, per_tag: bool) -> Vec<ManifestInput> {
    if per_tag && matches!(mode, Mode::Args { .. }) && !manifest.tags.is_empty() {
        manifest.tags.iter().map(|tag| manifest.for_tag(tag)).collect()
    } else {
        vec![manifest.clone()]
    }
}

pub async fn exec<C: TokenClient, P: Pusher>(args: &Args<C>, pusher: &P) -> Result<Outcome> {
    let settings = &args.settings;

    let linter = if settings.lint {
        let summary = lint(args).summary();
        tracing::info!("{summary}");
        summary
    } else {
        String::new()
    };

    let mode = validate::verify(settings, args.registry.login())?;

    let tags = if settings.auto_tag {
        let pipeline = &args.pipeline;
        let auto = tagging::compute_tags(&pipeline.commit_ref, &pipeline.repo_branch, &pipeline.commit_sha);
        if !auto.apply {
            tracing::info!("skipping automated tags for {}", pipeline.commit_ref);
            return Ok(Outcome::Skipped);
        }
        auto.tags
    } else {
        settings.tags.clone()
    };

    let manifest = manifest::build_manifest_input(&mode, &tags, &args.pipeline)?;
    match &mode {
        Mode::Spec(_) => tracing::info!("pushing {} by spec", manifest.image),
        Mode::Args { platforms, template, .. } => tracing::info!(
            "pushing {template} to {} for {}",
            manifest.image,
            platforms.join(", ")
        ),
    }

    let credentials = args.registry.credentials().await?;
    if let Some(registry) = &credentials.registry {
        tracing::info!("logging in to {registry}");
    }

    let per_tag = matches!(args.registry, Registry::Ecr { .. });
    let insecure = settings.skip_verify || args.registry.insecure();

    let mut pushed = Vec::new();
    for request in push_plan(&mode, &manifest, per_tag) {
        tracing::info!("pushing manifest {}", request.image);
        let result = pusher
            .push(&PushRequest {
                credentials: &credentials,
                manifest: &request,
                ignore_missing: settings.ignore_missing,
                insecure,
            })
            .await?;
        tracing::info!("manifest pushed: digest {} {}", result.digest, result.length);
        pushed.push(result);
    }

    card::write_card(&args.pipeline.card_path, CardData {
        image: manifest.image.clone(),
        digest: pushed.last().map(|p| p.digest.clone()).unwrap_or_default(),
        linter,
    });

    Ok(Outcome::Pushed {
        image: manifest.image,
        pushed,
    })
}
