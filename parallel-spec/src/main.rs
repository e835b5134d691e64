// Copyright (c) The parallel-spec Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use clap::Parser;
use color_eyre::Result;
use parallel_spec::ParallelSpecApp;

fn main() -> Result<()> {
    color_eyre::install()?;
    _ = enable_ansi_support::enable_ansi_support();

    let app = ParallelSpecApp::parse();
    let output = app.init_output();

    match app.exec(output) {
        Ok(code) => std::process::exit(code),
        Err(error) => {
            error.display_to_stderr(&output.stderr_styles());
            std::process::exit(error.process_exit_code())
        }
    }
}
