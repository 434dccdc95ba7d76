use serde::Deserialize;
use std::path::{Path, PathBuf};

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct Config {
    /// Request timeout in seconds
    pub timeout_secs: u64,
    /// Append logs to this file instead of stderr
    pub log_file: Option<PathBuf>,
    pub meal: MealConfig,
    pub weather: WeatherConfig,
    pub notices: Vec<NoticeSource>,
    pub feed: FeedConfig,
}

fn default_timeout() -> u64 {
    10
}

impl Default for Config {
    fn default() -> Self {
        Self {
            timeout_secs: default_timeout(),
            log_file: None,
            meal: MealConfig::default(),
            weather: WeatherConfig::default(),
            notices: Vec::new(),
            feed: FeedConfig::default(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct MealConfig {
    pub school_name: String,
    /// Education office code (ATPT_OFCDC_SC_CODE)
    pub office_code: String,
    /// School code (SD_SCHUL_CODE)
    pub school_code: String,
    pub output: PathBuf,
    pub neis_base_url: String,
    /// Only ever set from NEIS_API_KEY
    #[serde(skip)]
    pub api_key: String,
}

impl Default for MealConfig {
    fn default() -> Self {
        Self {
            school_name: "율곡중학교".to_string(),
            office_code: "J10".to_string(),
            school_code: "7681015".to_string(),
            output: PathBuf::from("meal_info.html"),
            neis_base_url: "https://open.neis.go.kr/hub".to_string(),
            api_key: String::new(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct WeatherConfig {
    pub lat: f64,
    pub lon: f64,
    /// Only ever set from OPENWEATHER_API_KEY
    #[serde(skip)]
    pub api_key: String,
}

impl Default for WeatherConfig {
    fn default() -> Self {
        Self {
            lat: 37.7599,
            lon: 126.7733,
            api_key: String::new(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct NoticeSource {
    /// Display name; derived from the URL host when absent
    pub name: Option<String>,
    pub url: String,
    pub output: Option<PathBuf>,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct FeedConfig {
    /// Prefix for the default `rel="self"` link of regenerated feeds
    pub base_url: String,
    /// Where envelopes are looked up and feeds are written
    pub output_dir: PathBuf,
}

impl Default for FeedConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:5000/feeds".to_string(),
            output_dir: PathBuf::from("."),
        }
    }
}

impl Config {
    pub fn load<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        Ok(config)
    }

    /// Like [`Config::load`], but a missing file yields the defaults.
    pub fn load_or_default<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        if path.as_ref().exists() {
            Self::load(path)
        } else {
            Ok(Self::default())
        }
    }

    /// Parse config from a TOML string (useful for testing)
    pub fn from_str(content: &str) -> anyhow::Result<Self> {
        let config: Config = toml::from_str(content)?;
        Ok(config)
    }

    /// Overlay secrets and school identity from the process environment.
    pub fn with_env(self) -> Self {
        self.with_env_from(|key| std::env::var(key).ok())
    }

    pub fn with_env_from<F>(mut self, lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(key) = lookup("NEIS_API_KEY") {
            self.meal.api_key = key;
        }
        if let Some(key) = lookup("OPENWEATHER_API_KEY") {
            self.weather.api_key = key;
        }
        if let Some(code) = lookup("SCHOOL_CODE") {
            self.meal.school_code = code;
        }
        if let Some(name) = lookup("SCHOOL_NAME") {
            self.meal.school_name = name;
        }
        self
    }
}
