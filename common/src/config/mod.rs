use std::fs::File;
use std::io::Read;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::err::{CResult, MuxError};

/// Full server configuration. Loaded once at startup from TOML, merged
/// with CLI overrides, then snapshot into the world; nothing mutates it
/// afterwards except an explicit admin reload building a new snapshot.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct MuxConfig {
    pub base: BaseConfig,
    pub limits: LimitsConfig,
    pub costs: CostsConfig,
    pub toggles: TogglesConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BaseConfig {
    /// Log output directory.
    pub log_dir: Option<String>,

    /// Directory holding the database files below.
    pub data_dir: String,

    /// Flatfile read at startup.
    pub indb: String,

    /// Flatfile written by checkpoints.
    pub outdb: String,

    /// Hash-chained attribute value store.
    pub atr_store: String,

    pub pid_file: String,

    /// Seconds between automatic checkpoints.
    pub dump_interval: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LimitsConfig {
    /// Ceiling on function calls within one evaluation.
    pub func_invk_lim: u32,

    /// Ceiling on evaluator nesting depth.
    pub func_nest_lim: u32,

    /// Wall-clock budget for one evaluation, in milliseconds.
    pub eval_timeout_ms: u64,

    pub lock_nest_lim: u32,

    pub parent_nest_lim: u32,

    pub ntfy_nest_lim: u32,

    pub player_name_limit: usize,

    /// Per-object ceiling on outstanding queue entries.
    pub queue_max: usize,

    /// Ceiling on wait-queue re-entrancy within one tick.
    pub queue_max_depth: u32,

    /// Queue entries drained per tick.
    pub queue_chunk: usize,

    /// Attribute cache capacity, in entries.
    pub atr_cache_size: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CostsConfig {
    pub create_cost: i32,
    pub dig_cost: i32,
    pub open_cost: i32,
    pub wait_cost: i32,
    pub starting_money: i32,
    pub starting_quota: i32,
    /// When false, quota accounting is skipped entirely.
    pub quotas: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TogglesConfig {
    /// Allow spaces in player names.
    pub name_spaces: bool,

    /// Disconnected players are invisible in rooms.
    pub dark_sleepers: bool,

    /// Seeing your own dark objects.
    pub see_own_dark: bool,

    /// Remote descriptions are readable.
    pub read_rem_desc: bool,
}

impl Default for BaseConfig {
    fn default() -> Self {
        BaseConfig {
            log_dir: None,
            data_dir: String::from("./data"),
            indb: String::from("indb"),
            outdb: String::from("outdb"),
            atr_store: String::from("atrdb"),
            pid_file: String::from("muxd.pid"),
            dump_interval: 3600,
        }
    }
}

impl Default for LimitsConfig {
    fn default() -> Self {
        LimitsConfig {
            func_invk_lim: 2500,
            func_nest_lim: 50,
            eval_timeout_ms: 5000,
            lock_nest_lim: 20,
            parent_nest_lim: 10,
            ntfy_nest_lim: 20,
            player_name_limit: 22,
            queue_max: 100,
            queue_max_depth: 50,
            queue_chunk: 10,
            atr_cache_size: 4096,
        }
    }
}

impl Default for CostsConfig {
    fn default() -> Self {
        CostsConfig {
            create_cost: 10,
            dig_cost: 10,
            open_cost: 1,
            wait_cost: 10,
            starting_money: 100,
            starting_quota: 20,
            quotas: false,
        }
    }
}

impl Default for TogglesConfig {
    fn default() -> Self {
        TogglesConfig {
            name_spaces: true,
            dark_sleepers: false,
            see_own_dark: true,
            read_rem_desc: true,
        }
    }
}

impl BaseConfig {
    pub fn get_log_dir(&self) -> Option<String> {
        self.log_dir.clone()
    }

    pub fn indb_path(&self) -> String {
        format!("{}/{}", self.data_dir, self.indb)
    }

    pub fn outdb_path(&self) -> String {
        format!("{}/{}", self.data_dir, self.outdb)
    }

    pub fn atr_store_path(&self) -> String {
        format!("{}/{}", self.data_dir, self.atr_store)
    }
}

/// Read a config file from the given path.
pub fn read_config<P: AsRef<Path>>(path: P) -> CResult<MuxConfig> {
    let mut file = File::open(path.as_ref())?;
    let mut s = String::new();

    let _ = file.read_to_string(&mut s);
    toml::from_str(s.as_str()).map_err(|e| MuxError::ConfigFileParseErr(e.to_string()))
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_defaults() {
        let c = MuxConfig::default();
        assert_eq!(c.limits.func_invk_lim, 2500);
        assert_eq!(c.limits.func_nest_lim, 50);
        assert_eq!(c.limits.player_name_limit, 22);
        assert!(c.toggles.name_spaces);
    }

    #[test]
    fn test_partial_toml_fills_defaults() {
        let c: MuxConfig = toml::from_str(
            r#"
            [limits]
            func_nest_lim = 10

            [toggles]
            name_spaces = false
            "#,
        )
        .unwrap();
        assert_eq!(c.limits.func_nest_lim, 10);
        assert_eq!(c.limits.func_invk_lim, 2500);
        assert!(!c.toggles.name_spaces);
        assert_eq!(c.base.indb, "indb");
    }
}
