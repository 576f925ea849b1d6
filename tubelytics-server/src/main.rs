// Copyright 2025 The Tubelytics Authors
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU Affero General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
// GNU Affero General Public License for more details.
//
// You should have received a copy of the GNU Affero General Public License
// along with this program. If not, see <https://www.gnu.org/licenses/>.

use anyhow::Result;
use clap::{builder::FalseyValueParser, Parser};
use std::path::PathBuf;
use tubelytics_server::{
    config::{ServerConfig, StoreBackend},
    run_server,
};

#[derive(Parser, Debug)]
#[command(author, version, about = "Tubelytics admin analytics server", long_about = None)]
struct Args {
    /// Path to configuration file (TOML)
    #[arg(short, long, env = "TUBELYTICS_CONFIG")]
    config: Option<PathBuf>,

    /// HTTP listen address (overrides config file)
    #[arg(long, env = "TUBELYTICS_HTTP_ADDR")]
    http_addr: Option<String>,

    /// Request log backend: memory or postgres
    #[arg(long, env = "TUBELYTICS_STORE_BACKEND")]
    store: Option<StoreBackend>,

    /// Postgres connection string
    #[arg(long, env = "DATABASE_URL", hide_env_values = true)]
    database_url: Option<String>,

    /// Create the request_logs table on startup if missing
    #[arg(long)]
    ensure_schema: bool,

    /// Enable authentication
    #[arg(long, env = "TUBELYTICS_AUTH_ENABLED", value_parser = FalseyValueParser::new())]
    auth_enabled: bool,

    /// Emit JSON logs
    #[arg(long, env = "TUBELYTICS_LOG_JSON", value_parser = FalseyValueParser::new())]
    log_json: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // File and environment first, then CLI overrides
    let mut config = ServerConfig::load(args.config)?;

    if let Some(addr) = args.http_addr {
        config.server.listen_addr = addr;
    }
    if let Some(store) = args.store {
        config.store.backend = store;
    }
    if let Some(url) = args.database_url {
        config.store.database_url = Some(url);
    }
    if args.ensure_schema {
        config.store.ensure_schema = true;
    }
    if args.auth_enabled {
        config.auth.enabled = true;
    }
    if args.log_json {
        config.logging.json = true;
    }

    run_server(config).await
}
