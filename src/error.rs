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

use thiserror::Error;

/// Every way a single plugin run can fail. None of them are retried.
#[derive(Debug, Error)]
pub enum Error {
    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("can't render template: {0}")]
    TemplateRender(String),

    #[error("can't parse manifest spec: {0}")]
    SpecParse(String),

    #[error("registry auth exchange failed: {0}")]
    AuthExchange(String),

    #[error("could not push manifest list: {0}")]
    Push(String),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
