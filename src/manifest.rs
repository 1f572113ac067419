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
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::settings::Pipeline;
use crate::template::{TemplateContext, TemplateEngine};
use crate::validate::Mode;

/// A manifest list in the spec format understood by manifest-tool.
#[allow(clippy::module_name_repetitions)]
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManifestInput {
    pub image: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,
    pub manifests: Vec<ManifestEntry>,
}

#[allow(clippy::module_name_repetitions)]
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManifestEntry {
    pub image: String,
    pub platform: Platform,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Platform {
    pub os: String,
    pub architecture: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub variant: String,
}

impl ManifestInput {
    pub fn parse(document: &str) -> Result<Self> {
        serde_yml::from_str(document).map_err(|e| Error::SpecParse(e.to_string()))
    }

    pub fn to_yaml(&self) -> Result<String> {
        serde_yml::to_string(self).map_err(|e| Error::Push(format!("cannot serialize manifest spec: {e}")))
    }

    /// The same manifest list pushed as `image:tag`, without further tags.
    pub fn for_tag(&self, tag: &str) -> Self {
        Self {
            image: format!("{}:{tag}", self.image),
            tags: Vec::new(),
            manifests: self.manifests.clone(),
        }
    }
}

impl Platform {
    /// Parses `os/arch` or `os/arch/variant`. A trailing slash leaves the variant empty.
    pub fn parse(platform: &str) -> Result<Self> {
        let parts: Vec<&str> = platform.split('/').collect();
        if !(2..=3).contains(&parts.len()) || parts[..2].iter().any(|p| p.is_empty()) {
            return Err(Error::Configuration(format!(
                "malformed platform {platform:?}, expected the form os/arch[/variant]"
            )));
        }

        Ok(Self {
            os: parts[0].to_string(),
            architecture: parts[1].to_string(),
            variant: parts.get(2).map(ToString::to_string).unwrap_or_default(),
        })
    }
}

impl ManifestEntry {
    /// Substitutes the first ARCH, OS and VARIANT placeholder of `template`.
    pub fn from_template(template: &str, platform: Platform) -> Self {
        let image = template
            .replacen("ARCH", &platform.architecture, 1)
            .replacen("OS", &platform.os, 1)
            .replacen("VARIANT", &platform.variant, 1);
        Self { image, platform }
    }
}

/// Where a spec template comes from.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SpecSource {
    File(PathBuf),
    Inline(String),
}

impl SpecSource {
    /// A spec naming an existing path is read from there, anything else is the template itself.
    pub fn resolve(spec: &str) -> Self {
        let path = Path::new(spec);
        if path.exists() {
            Self::File(path.to_path_buf())
        } else {
            Self::Inline(spec.to_string())
        }
    }

    pub fn read(&self) -> Result<String> {
        match self {
            Self::File(path) => fs::read_to_string(path)
                .map_err(|e| Error::Configuration(format!("failed to read template {}: {e}", path.display()))),
            Self::Inline(content) => Ok(content.clone()),
        }
    }
}

/// Builds the manifest list for the selected mode.
pub fn build_manifest_input(mode: &Mode, tags: &[String], pipeline: &Pipeline) -> Result<ManifestInput> {
    match mode {
        Mode::Spec(spec) => from_spec(spec, &TemplateContext::new(pipeline, tags)),
        Mode::Args {
            platforms,
            target,
            template,
        } => from_args(platforms, target, template, tags),
    }
}

fn from_spec(spec: &str, context: &TemplateContext) -> Result<ManifestInput> {
    let source = SpecSource::resolve(spec);
    if let SpecSource::File(path) = &source {
        tracing::debug!("reading spec from {}", path.display());
    }

    let raw = source.read()?;
    let rendered = TemplateEngine::new().render_trim(&raw, context)?;
    tracing::trace!("rendered spec:\n{rendered}");
    ManifestInput::parse(&rendered)
}

fn from_args(platforms: &[String], target: &str, template: &str, tags: &[String]) -> Result<ManifestInput> {
    let manifests = platforms
        .iter()
        .map(|p| Platform::parse(p).map(|platform| ManifestEntry::from_template(template, platform)))
        .collect::<Result<Vec<_>>>()?;

    Ok(ManifestInput {
        image: target.to_string(),
        tags: tags.to_vec(),
        manifests,
    })
}
