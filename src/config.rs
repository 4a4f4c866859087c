use serde::{Deserialize, Serialize};
use serde_json::from_str;
use std::path::PathBuf;
use std::sync::{Mutex, RwLock};

#[derive(clap::Parser, Debug)]
pub struct Opts {
    /// Config file
    #[clap(short = 'c', long = "config", default_value = "config.json")]
    pub config: PathBuf,
}

#[derive(Serialize, Deserialize, Debug, Clone, Default)]
pub struct Config {
    pub discord: DiscordConfig,
    pub walletd: WalletdConfig,
    pub rain: RainConfig,
}

#[derive(Serialize, Deserialize, Debug, Clone, Default)]
pub struct DiscordConfig {
    pub token: String,
    #[serde(rename = "guildId")]
    pub guild_id: u64,
    #[serde(rename = "channelId")]
    pub channel_id: u64,
    #[serde(rename = "excludedRoleId")]
    pub excluded_role_id: Option<u64>,
}

#[derive(Serialize, Deserialize, Debug, Clone, Default)]
pub struct WalletdConfig {
    #[serde(rename = "serviceAddress")]
    pub service_address: String,
    #[serde(rename = "servicePort")]
    pub service_port: u16,
}

#[derive(Serialize, Deserialize, Debug, Clone, Default)]
pub struct RainConfig {
    #[serde(rename = "balanceThreshold")]
    pub balance_threshold: u64,
    #[serde(rename = "checkIntervalS")]
    pub check_interval_s: u64,
    #[serde(rename = "announceDelayS")]
    pub announce_delay_s: u64,
    #[serde(rename = "registerDelayS")]
    pub register_delay_s: u64,
    #[serde(rename = "networkFee")]
    pub network_fee: u64,
    #[serde(rename = "serviceFee")]
    pub service_fee: u64,
}

impl Config {
    pub fn parse_from_file(file: &PathBuf) -> Self {
        use std::fs::read_to_string;
        let confstr = read_to_string(file).expect("confile read");
        from_str(&confstr).expect("confile deser")
    }

    pub fn show() {
        let de: Self = Default::default();
        println!("{}", serde_json::to_string_pretty(&de).unwrap())
    }
}

type ChangeHook = Box<dyn Fn(u64) + Send + Sync>;

/// One live configuration value. Administrative updates land through the
/// typed setter; the controller reads the cell only at loop boundaries, so
/// a change never alters an event already in progress.
pub struct Setting {
    value: RwLock<u64>,
    default: u64,
    hooks: Mutex<Vec<ChangeHook>>,
}

impl Setting {
    pub fn new(default: u64) -> Self {
        Setting {
            value: RwLock::new(default),
            default,
            hooks: Mutex::new(Vec::new()),
        }
    }

    pub fn get(&self) -> u64 {
        *self.value.read().unwrap()
    }

    pub fn set(&self, value: u64) {
        *self.value.write().unwrap() = value;
        for hook in self.hooks.lock().unwrap().iter() {
            hook(value);
        }
    }

    pub fn reset(&self) {
        self.set(self.default);
    }

    pub fn on_change<F: Fn(u64) + Send + Sync + 'static>(&self, hook: F) {
        self.hooks.lock().unwrap().push(Box::new(hook));
    }
}

impl std::fmt::Debug for Setting {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Setting")
            .field("value", &self.get())
            .field("default", &self.default)
            .finish()
    }
}

/// The live-updatable subset of the configuration.
#[derive(Debug)]
pub struct Settings {
    pub balance_threshold: Setting,
    pub check_interval_s: Setting,
    pub announce_delay_s: Setting,
    pub register_delay_s: Setting,
    pub network_fee: Setting,
    pub service_fee: Setting,
}

impl Settings {
    pub fn from_config(config: &RainConfig) -> Self {
        Settings {
            balance_threshold: Setting::new(config.balance_threshold),
            check_interval_s: Setting::new(config.check_interval_s),
            announce_delay_s: Setting::new(config.announce_delay_s),
            register_delay_s: Setting::new(config.register_delay_s),
            network_fee: Setting::new(config.network_fee),
            service_fee: Setting::new(config.service_fee),
        }
    }

    fn cell(&self, key: &str) -> Option<&Setting> {
        match key {
            "balanceThreshold" => Some(&self.balance_threshold),
            "checkIntervalS" => Some(&self.check_interval_s),
            "announceDelayS" => Some(&self.announce_delay_s),
            "registerDelayS" => Some(&self.register_delay_s),
            "networkFee" => Some(&self.network_fee),
            "serviceFee" => Some(&self.service_fee),
            _ => None,
        }
    }

    pub fn get_by_name(&self, key: &str) -> Option<u64> {
        self.cell(key).map(Setting::get)
    }

    pub fn set_by_name(&self, key: &str, value: &str) -> Result<u64, String> {
        let cell = self.cell(key).ok_or_else(|| format!("unknown setting: {}", key))?;
        let parsed: u64 = value.parse().map_err(|_| format!("not a number: {}", value))?;
        cell.set(parsed);
        Ok(parsed)
    }

    pub fn reset_all(&self) {
        self.balance_threshold.reset();
        self.check_interval_s.reset();
        self.announce_delay_s.reset();
        self.register_delay_s.reset();
        self.network_fee.reset();
        self.service_fee.reset();
    }
}
