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

use semver::Version;

const TAG_PREFIX: &str = "refs/tags/";
const HEAD_PREFIX: &str = "refs/heads/";

/// Tags derived from a git ref, plus whether auto tagging applies to it at all.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AutoTags {
    pub tags: Vec<String>,
    pub apply: bool,
}

/// Combines [`use_default_tag`] and [`default_tags`].
///
/// `_sha` is accepted for parity with the ECR flow but does not influence the result.
pub fn compute_tags(git_ref: &str, default_branch: &str, _sha: &str) -> AutoTags {
    if use_default_tag(git_ref, default_branch) {
        AutoTags {
            tags: default_tags(git_ref),
            apply: true,
        }
    } else {
        AutoTags {
            tags: Vec::new(),
            apply: false,
        }
    }
}

/// Returns the suggested tags for a git ref, most general first.
pub fn default_tags(git_ref: &str) -> Vec<String> {
    if !git_ref.starts_with(TAG_PREFIX) {
        return vec!["latest".to_string()];
    }

    let Ok(version) = Version::parse(strip_tag_prefix(git_ref)) else {
        return vec!["latest".to_string()];
    };

    if !version.pre.is_empty() || !version.build.is_empty() {
        return vec![version.to_string()];
    }

    // 0.x releases are not stable enough to own a bare major tag
    if version.major == 0 {
        return vec![
            format!("{}.{}", version.major, version.minor),
            format!("{}.{}.{}", version.major, version.minor, version.patch),
        ];
    }

    vec![
        version.major.to_string(),
        format!("{}.{}", version.major, version.minor),
        format!("{}.{}.{}", version.major, version.minor, version.patch),
    ]
}

/// Restricts automatic tags to git tags and the default branch.
pub fn use_default_tag(git_ref: &str, default_branch: &str) -> bool {
    git_ref.starts_with(TAG_PREFIX) || strip_head_prefix(git_ref) == default_branch
}

fn strip_head_prefix(git_ref: &str) -> &str {
    git_ref.strip_prefix(HEAD_PREFIX).unwrap_or(git_ref)
}

fn strip_tag_prefix(git_ref: &str) -> &str {
    let git_ref = git_ref.strip_prefix(TAG_PREFIX).unwrap_or(git_ref);
    git_ref.strip_prefix('v').unwrap_or(git_ref)
}
