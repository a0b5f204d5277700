/*
 * SPDX-FileCopyrightText: Copyright (c) 2026 NVIDIA CORPORATION & AFFILIATES. All rights reserved.
 * SPDX-License-Identifier: Apache-2.0
 *
 * Licensed under the Apache License, Version 2.0 (the "License");
 * you may not use this file except in compliance with the License.
 * You may obtain a copy of the License at
 *
 * http://www.apache.org/licenses/LICENSE-2.0
 *
 * Unless required by applicable law or agreed to in writing, software
 * distributed under the License is distributed on an "AS IS" BASIS,
 * WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
 * See the License for the specific language governing permissions and
 * limitations under the License.
 */

use admiral::cfg::command_line::{Command, Options};
use clap::CommandFactory;
use db::PgStore;
use tracing::metadata::LevelFilter;

#[tokio::main]
async fn main() -> eyre::Result<()> {
    let config = Options::load();
    if config.version {
        println!("{}", env!("CARGO_PKG_VERSION"));
        return Ok(());
    }
    setup_logging(config.debug);

    let sub_cmd = match &config.sub_cmd {
        None => {
            return Ok(Options::command().print_long_help()?);
        }
        Some(s) => s,
    };
    match sub_cmd {
        Command::Migrate(m) => {
            tracing::info!("Running migrations");
            let store = PgStore::connect(&m.datastore, 1).await?;
            db::migrations::migrate(store.pool()).await?;
        }
        Command::Run(daemon) => {
            let config_str = tokio::fs::read_to_string(&daemon.config_path).await?;
            let site_config_str = match &daemon.site_config_path {
                Some(site_path) => Some(tokio::fs::read_to_string(site_path).await?),
                None => None,
            };

            let (stop_tx, stop_rx) = tokio::sync::oneshot::channel();
            let (ready_tx, _ready_rx) = tokio::sync::oneshot::channel();
            tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    let _ = stop_tx.send(());
                }
            });
            admiral::run(config_str, site_config_str, stop_rx, ready_tx).await?;
        }
    }
    Ok(())
}

fn setup_logging(debug: u8) {
    use tracing_subscriber::filter::EnvFilter;
    use tracing_subscriber::prelude::*;
    use tracing_subscriber::util::SubscriberInitExt;

    let level = if debug > 0 {
        LevelFilter::DEBUG
    } else {
        LevelFilter::INFO
    };

    if let Err(e) = tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::Layer::default().compact())
        .with(
            EnvFilter::builder()
                .with_default_directive(level.into())
                .from_env_lossy(),
        )
        .try_init()
    {
        panic!(
            "Failed to initialize trace logging for admiral-api. It's possible some earlier \
            code path has already set a global default log subscriber: {e}"
        );
    }
}
