//! Runtime configuration: game rules plus the server's command line.

use crate::clock::{parse_time_of_day, ConclaveWindow};
use chrono::NaiveTime;
use clap::Parser;
use std::path::PathBuf;
use std::time::Duration;

/// Rules of one game instance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GameConfig {
    pub min_players: usize,
    pub traitor_count: usize,
    /// Once the day counter reaches this value at night, the faithful win.
    pub day_limit: u32,
    pub conclave: ConclaveWindow,
    /// Counted in characters.
    pub max_name_len: usize,
    /// Counted in bytes.
    pub max_avatar_len: usize,
    /// Largest roster that still fits a roster broadcast in one datagram.
    pub max_players: usize,
}

impl Default for GameConfig {
    fn default() -> Self {
        Self {
            min_players: 4,
            traitor_count: 2,
            day_limit: 4,
            conclave: ConclaveWindow::default(),
            max_name_len: 32,
            max_avatar_len: 128,
            max_players: 24,
        }
    }
}

/// Command line of the `server` binary.
#[derive(Parser, Debug, Clone)]
#[command(author, version, about = "Authoritative server for the traitors party game")]
pub struct ServerArgs {
    /// Server IP address to bind to
    #[arg(short = 'H', long, default_value = "127.0.0.1")]
    pub host: String,

    /// Server port to listen on
    #[arg(short, long, default_value = "4000")]
    pub port: u16,

    /// Maximum simultaneous connections
    #[arg(long, default_value = "64")]
    pub max_clients: usize,

    /// Seconds without a packet before a connection is dropped
    #[arg(long, default_value = "30")]
    pub client_timeout: u64,

    /// Secret for the master-of-ceremonies console
    #[arg(long, env = "TRAITORS_ADMIN_SECRET", default_value = "admin123")]
    pub admin_secret: String,

    /// Day on which the faithful win by running out the clock
    #[arg(long, default_value = "4")]
    pub day_limit: u32,

    /// Local time the conclave opens (HH:MM)
    #[arg(long, default_value = "22:30", value_parser = parse_time_of_day)]
    pub conclave_start: NaiveTime,

    /// Local time the conclave closes (HH:MM)
    #[arg(long, default_value = "03:00", value_parser = parse_time_of_day)]
    pub conclave_end: NaiveTime,

    /// Directory for JSON snapshots; state is kept in memory when absent
    #[arg(long, env = "TRAITORS_DATA_DIR")]
    pub data_dir: Option<PathBuf>,

    /// Fixed seed for role selection (testing only)
    #[arg(long)]
    pub role_seed: Option<u64>,
}

impl ServerArgs {
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn client_timeout(&self) -> Duration {
        Duration::from_secs(self.client_timeout)
    }

    pub fn game_config(&self) -> GameConfig {
        GameConfig {
            day_limit: self.day_limit,
            conclave: ConclaveWindow::new(self.conclave_start, self.conclave_end),
            ..GameConfig::default()
        }
    }
}
