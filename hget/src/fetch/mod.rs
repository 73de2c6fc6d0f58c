/*
 * SPDX-License-Identifier: Apache-2.0
 * Copyright 2025 ByteDance and/or its affiliates.
 */

use anyhow::Context;
use clap::ArgMatches;
use tokio::io::{AsyncWrite, AsyncWriteExt};

mod connect;

mod request;

mod opts;
pub use opts::{FetchArgs, add_fetch_args, parse_fetch_args};

mod task;
pub use task::{FetchError, FetchTask};

pub async fn run(cmd_args: &ArgMatches) -> anyhow::Result<()> {
    let mut stdout = tokio::io::stdout();
    run_to(cmd_args, &mut stdout).await
}

pub async fn run_to<W>(cmd_args: &ArgMatches, out: &mut W) -> anyhow::Result<()>
where
    W: AsyncWrite + Unpin,
{
    let mut args = parse_fetch_args(cmd_args)?;
    args.resolve_target_address().await?;

    let task = FetchTask::new(args)?;
    task.run_to(out).await?;
    out.flush().await.context("failed to flush output")?;
    Ok(())
}
