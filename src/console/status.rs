// Copyright 2024 CoreOS, Inc.
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

//! Console server status parsing.
//!
//! `console -i <name>` prints a single line of the form
//! `name:child:type:details:users:state`, where `users` is a comma
//! separated list of `mode@user@host@port` holders.

use serde::Serialize;
use std::str::FromStr;
use thiserror::Error;

/// Number of leading `:`-separated fields in a status line.
const STATUS_FIELDS: usize = 6;
/// Number of leading `@`-separated parts in a holder token.
const HOLDER_PARTS: usize = 4;

#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum StatusParseError {
    #[error("expected 6 ':'-separated fields, found {0}")]
    MissingFields(usize),
    #[error("malformed holder {0:?}")]
    MalformedHolder(String),
}

/// Someone attached to a console.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ConsoleHolder {
    /// Access flags, one character each.
    pub mode: String,
    pub user: String,
    pub host: String,
    pub port: String,
}

impl ConsoleHolder {
    pub fn can_write(&self) -> bool {
        self.mode.contains('w')
    }
}

impl FromStr for ConsoleHolder {
    type Err = StatusParseError;

    fn from_str(token: &str) -> Result<Self, Self::Err> {
        let parts: Vec<&str> = token.split('@').collect();
        if parts.len() < HOLDER_PARTS {
            return Err(StatusParseError::MalformedHolder(token.to_string()));
        }
        Ok(Self {
            mode: parts[0].to_string(),
            user: parts[1].to_string(),
            host: parts[2].to_string(),
            port: parts[3].to_string(),
        })
    }
}

/// Parsed `console -i` record.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ConsoleStatus {
    pub console: String,
    pub child: String,
    pub conn_type: String,
    pub details: String,
    pub holders: Vec<ConsoleHolder>,
    pub state: String,
}

impl ConsoleStatus {
    /// Holders with write access other than `user`.
    pub fn foreign_writers<'a>(&'a self, user: &'a str) -> impl Iterator<Item = &'a ConsoleHolder> {
        self.holders
            .iter()
            .filter(move |h| h.can_write() && h.user != user)
    }
}

impl FromStr for ConsoleStatus {
    type Err = StatusParseError;

    fn from_str(line: &str) -> Result<Self, Self::Err> {
        let fields: Vec<&str> = line.trim().split(':').collect();
        if fields.len() < STATUS_FIELDS {
            return Err(StatusParseError::MissingFields(fields.len()));
        }

        let holders = fields[4]
            .split(',')
            .filter(|token| !token.is_empty())
            .map(ConsoleHolder::from_str)
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            console: fields[0].to_string(),
            child: fields[1].to_string(),
            conn_type: fields[2].to_string(),
            details: fields[3].to_string(),
            holders,
            state: fields[5].to_string(),
        })
    }
}
