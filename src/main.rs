// Copyright 2017 CoreOS, Inc.
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

use anyhow::Result;
use slog::{slog_o, Drain};
use slog_scope::{debug, error};
use std::process::ExitCode;

mod cli;

fn main() -> ExitCode {
    // Setup logging; console output owns stdout, logs go to stderr.
    let decorator = slog_term::TermDecorator::new().stderr().build();
    let drain = slog_term::FullFormat::new(decorator).build().fuse();
    let drain = slog_async::Async::new(drain).build().fuse();
    let log = slog::Logger::root(drain, slog_o!());
    let guard = slog_scope::set_global_logger(log);

    debug!("Logging initialized");

    let code = match run() {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{:#}", e);
            ExitCode::FAILURE
        }
    };

    // Flush pending log records.
    drop(guard);
    code
}

fn run() -> Result<()> {
    let config = cli::parse_args(std::env::args())?;
    config.run()
}
