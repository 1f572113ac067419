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

//! Renders manifest spec templates with Handlebars.
//!
//! Templates see the pipeline in the same shape older manifest plugins
//! exposed it, e.g. `{{repo.name}}`, `{{build.number}}` or `{{#each build.tags}}`.

use handlebars::{Context, Handlebars, Helper, HelperResult, Output, RenderContext, RenderError, RenderErrorReason};
use serde::Serialize;
use serde_json::Value as JsonValue;

use crate::error::{Error, Result};
use crate::settings::Pipeline;

#[derive(Clone, Debug, Serialize)]
pub struct TemplateContext {
    pub repo: RepoContext,
    pub build: BuildContext,
    pub job: JobContext,
}

#[derive(Clone, Debug, Serialize)]
pub struct RepoContext {
    pub owner: String,
    pub name: String,
    pub branch: String,
}

#[derive(Clone, Debug, Serialize)]
pub struct BuildContext {
    pub path: String,
    pub tag: String,
    pub event: String,
    pub number: u64,
    pub commit: String,
    #[serde(rename = "ref")]
    pub git_ref: String,
    pub branch: String,
    pub pull: String,
    pub status: String,
    pub started: i64,
    pub created: i64,
    pub tags: Vec<String>,
}

#[derive(Clone, Debug, Serialize)]
pub struct JobContext {
    pub started: i64,
}

impl TemplateContext {
    pub fn new(pipeline: &Pipeline, tags: &[String]) -> Self {
        Self {
            repo: RepoContext {
                owner: pipeline.repo_owner.clone(),
                name: pipeline.repo_name.clone(),
                branch: pipeline.repo_branch.clone(),
            },
            build: BuildContext {
                path: pipeline.workspace.clone(),
                tag: pipeline.tag.clone(),
                event: pipeline.build_event.clone(),
                number: pipeline.build_number,
                commit: pipeline.commit_sha.clone(),
                git_ref: pipeline.commit_ref.clone(),
                branch: pipeline.commit_branch.clone(),
                pull: pipeline.pull_request.clone(),
                status: pipeline.build_status.clone(),
                started: pipeline.build_started,
                created: pipeline.build_created,
                tags: tags.to_vec(),
            },
            job: JobContext { started: 0 },
        }
    }
}

pub struct TemplateEngine {
    handlebars: Handlebars<'static>,
}

impl TemplateEngine {
    pub fn new() -> Self {
        let mut handlebars = Handlebars::new();
        handlebars.set_strict_mode(false);
        // the output is YAML, not HTML
        handlebars.register_escape_fn(handlebars::no_escape);

        handlebars.register_helper("uppercase", Box::new(uppercase));
        handlebars.register_helper("lowercase", Box::new(lowercase));
        handlebars.register_helper("uppercasefirst", Box::new(uppercase_first));
        handlebars.register_helper("truncate", Box::new(truncate));
        handlebars.register_helper("urlencode", Box::new(urlencode));
        handlebars.register_helper("trimprefix", Box::new(trim_prefix));

        Self { handlebars }
    }

    /// Renders `template` and strips surrounding whitespace from the result.
    pub fn render_trim(&self, template: &str, context: &TemplateContext) -> Result<String> {
        self.handlebars
            .render_template(template, context)
            .map(|rendered| rendered.trim().to_string())
            .map_err(|e| Error::TemplateRender(e.to_string()))
    }
}

fn param_string(h: &Helper, index: usize, name: &'static str) -> Result<String, RenderError> {
    let param = h.param(index).ok_or(RenderErrorReason::ParamNotFoundForIndex(name, index))?;
    Ok(match param.value() {
        JsonValue::String(s) => s.clone(),
        JsonValue::Null => String::new(),
        other => other.to_string(),
    })
}

fn uppercase(h: &Helper, _: &Handlebars, _: &Context, _: &mut RenderContext, out: &mut dyn Output) -> HelperResult {
    out.write(&param_string(h, 0, "uppercase")?.to_uppercase())?;
    Ok(())
}

fn lowercase(h: &Helper, _: &Handlebars, _: &Context, _: &mut RenderContext, out: &mut dyn Output) -> HelperResult {
    out.write(&param_string(h, 0, "lowercase")?.to_lowercase())?;
    Ok(())
}

fn uppercase_first(
    h: &Helper,
    _: &Handlebars,
    _: &Context,
    _: &mut RenderContext,
    out: &mut dyn Output,
) -> HelperResult {
    let value = param_string(h, 0, "uppercasefirst")?;
    let mut chars = value.chars();
    if let Some(first) = chars.next() {
        out.write(&first.to_uppercase().chain(chars).collect::<String>())?;
    }
    Ok(())
}

/// `{{truncate build.commit 8}}`
fn truncate(h: &Helper, _: &Handlebars, _: &Context, _: &mut RenderContext, out: &mut dyn Output) -> HelperResult {
    let value = param_string(h, 0, "truncate")?;
    let len = h
        .param(1)
        .and_then(|p| p.value().as_u64())
        .ok_or(RenderErrorReason::ParamNotFoundForIndex("truncate", 1))?;
    let len = usize::try_from(len).unwrap_or(usize::MAX);
    out.write(&value.chars().take(len).collect::<String>())?;
    Ok(())
}

fn urlencode(h: &Helper, _: &Handlebars, _: &Context, _: &mut RenderContext, out: &mut dyn Output) -> HelperResult {
    let value = param_string(h, 0, "urlencode")?;
    out.write(&url::form_urlencoded::byte_serialize(value.as_bytes()).collect::<String>())?;
    Ok(())
}

/// `{{trimprefix "v" build.tag}}`
fn trim_prefix(h: &Helper, _: &Handlebars, _: &Context, _: &mut RenderContext, out: &mut dyn Output) -> HelperResult {
    let prefix = param_string(h, 0, "trimprefix")?;
    let value = param_string(h, 1, "trimprefix")?;
    out.write(value.strip_prefix(&prefix).unwrap_or(&value))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn context() -> TemplateContext {
        let pipeline = Pipeline {
            repo_owner: "octocat".into(),
            repo_name: "hello-world".into(),
            repo_branch: "main".into(),
            commit_sha: "0123456789abcdef".into(),
            commit_ref: "refs/tags/v1.2.3".into(),
            build_number: 42,
            tag: "v1.2.3".into(),
            ..Default::default()
        };
        TemplateContext::new(&pipeline, &["1".into(), "1.2".into(), "1.2.3".into()])
    }

    #[test]
    fn renders_pipeline_fields() {
        let engine = TemplateEngine::new();
        let rendered = engine
            .render_trim(
                "\n  image: {{repo.owner}}/{{repo.name}}:{{build.number}}\n  ref: {{build.ref}}\n",
                &context(),
            )
            .unwrap();
        assert_eq!(rendered, "image: octocat/hello-world:42\n  ref: refs/tags/v1.2.3");
    }

    #[test]
    fn renders_tag_list() {
        let engine = TemplateEngine::new();
        let rendered = engine
            .render_trim("{{#each build.tags}}- {{this}}\n{{/each}}", &context())
            .unwrap();
        assert_eq!(rendered, "- 1\n- 1.2\n- 1.2.3");
    }

    #[test]
    fn helpers() {
        let engine = TemplateEngine::new();
        let ctx = context();
        assert_eq!(engine.render_trim("{{uppercase repo.name}}", &ctx).unwrap(), "HELLO-WORLD");
        assert_eq!(engine.render_trim("{{lowercase \"ABC\"}}", &ctx).unwrap(), "abc");
        assert_eq!(engine.render_trim("{{uppercasefirst repo.owner}}", &ctx).unwrap(), "Octocat");
        assert_eq!(engine.render_trim("{{truncate build.commit 7}}", &ctx).unwrap(), "0123456");
        assert_eq!(engine.render_trim("{{urlencode \"a b&c\"}}", &ctx).unwrap(), "a+b%26c");
        assert_eq!(engine.render_trim("{{trimprefix \"v\" build.tag}}", &ctx).unwrap(), "1.2.3");
    }

    #[test]
    fn does_not_escape_html() {
        let engine = TemplateEngine::new();
        let pipeline = Pipeline {
            repo_name: "a&b<c>".into(),
            ..Default::default()
        };
        let ctx = TemplateContext::new(&pipeline, &[]);
        assert_eq!(engine.render_trim("{{repo.name}}", &ctx).unwrap(), "a&b<c>");
    }

    #[test]
    fn render_errors() {
        let engine = TemplateEngine::new();
        assert!(matches!(
            engine.render_trim("{{#each build.tags}}", &context()),
            Err(Error::TemplateRender(_))
        ));
        assert!(matches!(
            engine.render_trim("{{truncate build.commit}}", &context()),
            Err(Error::TemplateRender(_))
        ));
    }
}
