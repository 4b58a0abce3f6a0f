use std::collections::HashSet;
use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::metrics::Category;

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub general: GeneralConfig,
    pub categories: CategoriesConfig,
    pub network: NetworkConfig,
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// Window (in ticks) for the moving averages shown next to live values.
    pub average_window: usize,
    /// Refresh traced processes' open-file lists every N ticks.
    pub open_files_every: u64,
    /// Cap on rendered process-table rows.
    pub max_rows: usize,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        GeneralConfig {
            average_window: 60,
            open_files_every: 5,
            max_rows: 15,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct CategoriesConfig {
    pub cpu: bool,
    pub memory: bool,
    pub network: bool,
    pub disks: bool,
    pub processes: bool,
}

impl Default for CategoriesConfig {
    fn default() -> Self {
        CategoriesConfig {
            cpu: true,
            memory: true,
            network: true,
            disks: true,
            processes: true,
        }
    }
}

impl CategoriesConfig {
    pub fn enabled(&self) -> HashSet<Category> {
        let mut set = HashSet::new();
        if self.cpu {
            set.insert(Category::Cpu);
        }
        if self.memory {
            set.insert(Category::Memory);
        }
        if self.network {
            set.insert(Category::Network);
        }
        if self.disks {
            set.insert(Category::Disks);
        }
        if self.processes {
            set.insert(Category::Processes);
        }
        set
    }
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct NetworkConfig {
    /// Interfaces whose name contains any of these (case-insensitive) are
    /// hidden. Loopback is always hidden.
    pub ignore_interfaces: Vec<String>,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        NetworkConfig {
            ignore_interfaces: vec!["docker".to_string(), "podman".to_string()],
        }
    }
}

pub fn config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|p| p.join("statpoll").join("config.toml"))
}

pub fn load_config() -> Config {
    match config_path() {
        Some(path) if path.exists() => load_config_from_path(&path),
        _ => Config::default(),
    }
}

pub fn load_config_from_path(path: &Path) -> Config {
    match std::fs::read_to_string(path) {
        Ok(contents) => toml::from_str(&contents).unwrap_or_default(),
        Err(_) => Config::default(),
    }
}
