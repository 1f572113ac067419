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
use std::io::{self, Write};

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use serde::Serialize;

pub const CARD_SCHEMA: &str = "https://drone-plugins.github.io/drone-manifest/card.json";

#[derive(Debug, Serialize)]
pub struct Card<'a> {
    pub schema: &'a str,
    pub data: CardData,
}

#[derive(Clone, Debug, Serialize)]
pub struct CardData {
    pub image: String,
    pub digest: String,
    pub linter: String,
}

/// Writes the result card to `path`. Failures are logged and otherwise ignored.
pub fn write_card(path: &str, data: CardData) {
    if path.is_empty() {
        return;
    }

    let card = Card {
        schema: CARD_SCHEMA,
        data,
    };
    let json = match serde_json::to_vec(&card) {
        Ok(json) => json,
        Err(e) => {
            tracing::debug!("cannot encode card: {e}");
            return;
        },
    };

    let result = match path {
        "/dev/stdout" => write_encoded(&mut io::stdout(), &json),
        "/dev/stderr" => write_encoded(&mut io::stderr(), &json),
        _ => fs::write(path, &json),
    };
    if let Err(e) = result {
        tracing::debug!("cannot write card to {path}: {e}");
    }
}

/// Terminal escape sequence the runner picks the card up from.
fn write_encoded(out: &mut impl Write, json: &[u8]) -> io::Result<()> {
    writeln!(out, "\u{1b}]1338;{}\u{1b}]0m", STANDARD.encode(json))
}
