use std::{
    fs::File,
    net::{SocketAddr, ToSocketAddrs},
    path::PathBuf,
};

use serde::{Deserialize, Serialize};

use crate::Gt7Error;

const CONFIG_FILE_NAME: &str = "config.json";
const APP_DIR: &str = "gt7-telemetry";

pub const DEFAULT_RECEIVE_PORT: u16 = 33740;
pub const DEFAULT_SEND_PORT: u16 = 33739;
pub const DEFAULT_PLAYSTATION_IP: &str = "255.255.255.255";

#[derive(Clone, Serialize, Deserialize, Debug, PartialEq)]
#[serde(default)]
pub struct Gt7Config {
    /// Console address, or a broadcast address to reach any console on the subnet
    pub playstation_ip: String,
    pub receive_port: u16,
    pub send_port: u16,
    /// Accepted packets between two heartbeats
    pub heartbeat_interval_packets: usize,
    pub receive_timeout_ms: u64,
    /// Wait before rebuilding a socket that could not be bound
    pub reconnect_wait_ms: u64,
    /// Record laps even when the console does not report a race, e.g. replays
    pub always_record_data: bool,
    /// Where lap files are stored, defaults to the user data dir
    pub laps_dir: Option<PathBuf>,
}

impl Default for Gt7Config {
    fn default() -> Self {
        Self {
            playstation_ip: DEFAULT_PLAYSTATION_IP.to_string(),
            receive_port: DEFAULT_RECEIVE_PORT,
            send_port: DEFAULT_SEND_PORT,
            heartbeat_interval_packets: 100,
            receive_timeout_ms: 3000,
            reconnect_wait_ms: 5000,
            always_record_data: false,
            laps_dir: None,
        }
    }
}

impl Gt7Config {
    fn config_path() -> Option<PathBuf> {
        Some(dirs::config_dir()?.join(APP_DIR).join(CONFIG_FILE_NAME))
    }

    /// Loads the config saved in the user config dir, `None` when there is none.
    pub fn from_local_file() -> Result<Option<Self>, Gt7Error> {
        match Self::config_path() {
            Some(path) if path.exists() => Self::from_file(&path).map(Some),
            _ => Ok(None),
        }
    }

    pub fn from_file(path: &PathBuf) -> Result<Self, Gt7Error> {
        let file = File::open(path).map_err(|e| Gt7Error::ConfigIOError { source: e })?;
        serde_json::from_reader(file).map_err(|e| Gt7Error::ConfigSerializeError { source: e })
    }

    pub fn save(&self) -> Result<(), Gt7Error> {
        let config_path = Self::config_path().ok_or(Gt7Error::NoConfigDir)?;
        self.save_to(&config_path)
    }

    pub fn save_to(&self, path: &PathBuf) -> Result<(), Gt7Error> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| Gt7Error::ConfigIOError { source: e })?;
        }
        let file = File::create(path).map_err(|e| Gt7Error::ConfigIOError { source: e })?;
        serde_json::to_writer_pretty(file, self)
            .map_err(|e| Gt7Error::ConfigSerializeError { source: e })
    }

    /// Address the heartbeat is sent to.
    pub fn heartbeat_target(&self) -> Result<SocketAddr, Gt7Error> {
        let address = format!("{}:{}", self.playstation_ip, self.send_port);
        (self.playstation_ip.as_str(), self.send_port)
            .to_socket_addrs()
            .ok()
            .and_then(|mut addrs| addrs.next())
            .ok_or(Gt7Error::UnresolvableAddress { address })
    }

    /// Directory lap files are written to.
    pub fn laps_dir(&self) -> Option<PathBuf> {
        self.laps_dir.clone().or_else(crate::writer::default_laps_dir)
    }
}
