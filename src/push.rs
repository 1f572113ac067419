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

use std::future::Future;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::process::Stdio;

use tempfile::NamedTempFile;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::Command;

use crate::credentials::Credentials;
use crate::error::{Error, Result};
use crate::manifest::ManifestInput;
use crate::settings::lookup_env;

/// Everything the external push needs for one manifest list.
#[derive(Debug)]
pub struct PushRequest<'a> {
    pub credentials: &'a Credentials,
    pub manifest: &'a ManifestInput,
    pub ignore_missing: bool,
    pub insecure: bool,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Pushed {
    pub digest: String,
    pub length: u64,
}

pub trait Pusher {
    fn push(&self, request: &PushRequest<'_>) -> impl Future<Output = Result<Pushed>> + Send;
}

/// Pushes by handing a spec file to the manifest-tool binary.
#[derive(Clone, Debug)]
pub struct ManifestTool {
    binary: PathBuf,
    workdir: Option<PathBuf>,
}

impl ManifestTool {
    /// `workspace` is where the spec file is written and the tool runs, if set.
    pub fn new(workspace: &str) -> Self {
        Self {
            binary: lookup_env("PLUGIN_MANIFEST_TOOL").map_or_else(default_binary, PathBuf::from),
            workdir: (!workspace.is_empty()).then(|| PathBuf::from(workspace)),
        }
    }

    fn write_spec(&self, manifest: &ManifestInput) -> Result<NamedTempFile> {
        let mut builder = tempfile::Builder::new();
        builder.prefix("manifest-").suffix(".yml");
        let file = match &self.workdir {
            Some(dir) => builder.tempfile_in(dir),
            None => builder.tempfile(),
        };
        let mut file = file.map_err(|e| Error::Push(format!("failed to create tempfile: {e}")))?;

        let yaml = manifest.to_yaml()?;
        file.write_all(yaml.as_bytes())
            .map_err(|e| Error::Push(format!("failed to write tempfile: {e}")))?;
        file.flush().map_err(|e| Error::Push(format!("failed to write tempfile: {e}")))?;
        Ok(file)
    }
}

impl Pusher for ManifestTool {
    async fn push(&self, request: &PushRequest<'_>) -> Result<Pushed> {
        // removed when dropped, whichever way this function returns
        let spec = self.write_spec(request.manifest)?;

        let mut command = Command::new(&self.binary);
        command.args(arguments(request, spec.path()));
        if let Some(dir) = &self.workdir {
            command.current_dir(dir);
        }

        tracing::debug!("running {} for {}", self.binary.display(), request.manifest.image);
        let mut child = command
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| Error::Push(format!("cannot run {}: {e}", self.binary.display())))?;

        let (stdout, stderr) = (child.stdout.take(), child.stderr.take());
        let (stdout, stderr, status) = tokio::join!(tee(stdout, io::stdout()), tee(stderr, io::stderr()), child.wait());
        let status = status.map_err(|e| Error::Push(format!("cannot wait for {}: {e}", self.binary.display())))?;

        if !status.success() {
            return Err(Error::Push(format!(
                "{} failed with {status}: {}",
                self.binary.display(),
                stderr.trim()
            )));
        }

        Ok(parse_digest(&stdout))
    }
}

/// Echoes `stream` line by line to `sink` while it is produced and returns everything read.
async fn tee<R: AsyncRead + Unpin>(stream: Option<R>, mut sink: impl Write) -> String {
    let mut captured = String::new();
    let Some(stream) = stream else {
        return captured;
    };

    let mut lines = BufReader::new(stream).lines();
    while let Ok(Some(line)) = lines.next_line().await {
        // best effort, the tool's output is only informational
        let _ = writeln!(sink, "{line}");
        captured.push_str(&line);
        captured.push('\n');
    }
    captured
}

/// Command line for `manifest-tool push from-spec`. Credentials are passed as arguments only.
pub fn arguments(request: &PushRequest<'_>, spec: &Path) -> Vec<String> {
    let mut args = Vec::new();

    if !request.credentials.is_anonymous() {
        args.push(format!("--username={}", request.credentials.username));
        args.push(format!("--password={}", request.credentials.password));
    }
    if request.insecure {
        args.push("--insecure".to_string());
    }

    args.push("push".to_string());
    args.push("from-spec".to_string());
    if request.ignore_missing {
        args.push("--ignore-missing".to_string());
    }
    args.push(spec.display().to_string());

    args
}

/// Reads the `Digest: sha256:... 1234` line manifest-tool prints after a push.
pub fn parse_digest(output: &str) -> Pushed {
    output
        .lines()
        .filter_map(|line| line.trim().strip_prefix("Digest:"))
        .last()
        .map(|rest| {
            let mut fields = rest.split_whitespace();
            Pushed {
                digest: fields.next().unwrap_or_default().to_string(),
                length: fields.next().and_then(|l| l.parse().ok()).unwrap_or_default(),
            }
        })
        .unwrap_or_default()
}

fn default_binary() -> PathBuf {
    if cfg!(windows) {
        PathBuf::from("C:/bin/manifest-tool.exe")
    } else {
        PathBuf::from("/bin/manifest-tool")
    }
}
