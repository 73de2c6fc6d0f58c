/*
 * SPDX-License-Identifier: Apache-2.0
 * Copyright 2025 ByteDance and/or its affiliates.
 */

use std::process::ExitCode;

use clap::{Arg, ArgAction, Command};

const GLOBAL_ARG_VERBOSE: &str = "verbose";

fn build_cli_args() -> Command {
    hget::fetch::add_fetch_args(
        Command::new(hget::build::PKG_NAME)
            .version(hget::build::VERSION)
            .about("Fetch an HTTP/HTTPS resource and write its body to stdout"),
    )
    .arg(
        Arg::new(GLOBAL_ARG_VERBOSE)
            .help("Increase stderr log verbosity")
            .short('v')
            .long(GLOBAL_ARG_VERBOSE)
            .action(ArgAction::Count),
    )
}

fn main() -> ExitCode {
    openssl::init();

    let args = build_cli_args().get_matches();
    hget::logger::setup(args.get_count(GLOBAL_ARG_VERBOSE));

    let rt = match tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
    {
        Ok(rt) => rt,
        Err(e) => {
            eprintln!("failed to start runtime: {e}");
            return ExitCode::FAILURE;
        }
    };
    match rt.block_on(hget::fetch::run(&args)) {
        Ok(_) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{e:#}");
            ExitCode::FAILURE
        }
    }
}
