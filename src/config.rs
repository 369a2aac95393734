use crate::error::ConfigError;
use crate::models::ListingKind;
use serde::{Deserialize, Serialize};
use std::env;
use std::path::{Path, PathBuf};
use std::time::Duration;
use url::Url;

const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/115.0.0.0 Safari/537.36";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CityConfig {
    pub name: String,
    #[serde(default)]
    pub display_name: Option<String>,
    pub index_slug: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ListingTypeConfig {
    pub name: String,
    #[serde(default)]
    pub display_name: Option<String>,
    pub index_slug: String,
    pub kind: ListingKind,
}

/// Browser identity applied to every session
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Identity {
    pub user_agent: String,
    pub viewport_width: u32,
    pub viewport_height: u32,
    pub headless: bool,
    /// Mask `navigator.webdriver` and friends on each new tab
    pub stealth: bool,
    pub chrome_path: Option<PathBuf>,
    pub extra_args: Vec<String>,
}

impl Default for Identity {
    fn default() -> Self {
        Self {
            user_agent: DEFAULT_USER_AGENT.to_string(),
            viewport_width: 1920,
            viewport_height: 1080,
            headless: true,
            stealth: true,
            chrome_path: None,
            extra_args: Vec::new(),
        }
    }
}

/// Pacing delays and per-operation timeouts, all in milliseconds
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct Timing {
    pub page_load_delay_ms: u64,
    pub ad_process_delay_ms: u64,
    pub page_load_timeout_ms: u64,
    pub element_wait_timeout_ms: u64,
    pub ad_process_timeout_ms: u64,
    /// Wall-clock budget for one frontier pass
    pub frontier_budget_ms: u64,
    pub scroll_increment_px: u32,
}

impl Default for Timing {
    fn default() -> Self {
        Self {
            page_load_delay_ms: 3000,
            ad_process_delay_ms: 2000,
            page_load_timeout_ms: 30_000,
            element_wait_timeout_ms: 15_000,
            ad_process_timeout_ms: 20_000,
            frontier_budget_ms: 60_000,
            scroll_increment_px: 500,
        }
    }
}

impl Timing {
    pub fn page_load_delay(&self) -> Duration {
        Duration::from_millis(self.page_load_delay_ms)
    }

    pub fn ad_process_delay(&self) -> Duration {
        Duration::from_millis(self.ad_process_delay_ms)
    }

    pub fn page_load_timeout(&self) -> Duration {
        Duration::from_millis(self.page_load_timeout_ms)
    }

    pub fn element_wait_timeout(&self) -> Duration {
        Duration::from_millis(self.element_wait_timeout_ms)
    }

    pub fn ad_process_timeout(&self) -> Duration {
        Duration::from_millis(self.ad_process_timeout_ms)
    }

    pub fn frontier_budget(&self) -> Duration {
        Duration::from_millis(self.frontier_budget_ms)
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase", default)]
pub struct OutputOptions {
    pub individual: bool,
    pub combined: bool,
    pub summary: bool,
}

impl Default for OutputOptions {
    fn default() -> Self {
        Self {
            individual: true,
            combined: true,
            summary: true,
        }
    }
}

/// Everything the scout knows about the target site and how to crawl it.
/// Loaded once at startup; each run derives an immutable [`RunConfig`].
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Settings {
    pub base_url: String,
    pub cities: Vec<CityConfig>,
    pub listing_types: Vec<ListingTypeConfig>,
    pub max_ads_per_type: usize,
    pub timing: Timing,
    pub identity: Identity,
    pub output: OutputOptions,
    pub output_dir: PathBuf,
    pub file_prefix: String,
    pub backend_url: Option<String>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            base_url: "https://divar.ir".to_string(),
            cities: vec![
                CityConfig {
                    name: "tehran".to_string(),
                    display_name: Some("تهران".to_string()),
                    index_slug: "tehran".to_string(),
                },
                CityConfig {
                    name: "karaj".to_string(),
                    display_name: Some("کرج".to_string()),
                    index_slug: "karaj".to_string(),
                },
            ],
            listing_types: vec![
                ListingTypeConfig {
                    name: "sale".to_string(),
                    display_name: Some("فروش".to_string()),
                    index_slug: "buy-apartment".to_string(),
                    kind: ListingKind::Sale,
                },
                ListingTypeConfig {
                    name: "rent".to_string(),
                    display_name: Some("اجاره".to_string()),
                    index_slug: "rent-apartment".to_string(),
                    kind: ListingKind::Rent,
                },
            ],
            max_ads_per_type: 50,
            timing: Timing::default(),
            identity: Identity::default(),
            output: OutputOptions::default(),
            output_dir: PathBuf::from("output"),
            file_prefix: "divar".to_string(),
            backend_url: None,
        }
    }
}

impl Settings {
    /// Read settings from a JSON file (or defaults), then apply environment overrides
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut settings = match path {
            Some(path) => {
                let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
                    path: path.to_path_buf(),
                    source,
                })?;
                serde_json::from_str(&raw)?
            }
            None => Settings::default(),
        };
        settings.apply_env();
        Ok(settings)
    }

    fn apply_env(&mut self) {
        if let Ok(dir) = env::var("SCOUT_OUTPUT_DIR") {
            self.output_dir = PathBuf::from(dir);
        }
        if let Ok(headless) = env::var("SCOUT_HEADLESS") {
            self.identity.headless = !matches!(headless.as_str(), "0" | "false" | "no");
        }
        if let Some(max) = env::var("SCOUT_MAX_PER_TYPE").ok().and_then(|v| v.parse().ok()) {
            self.max_ads_per_type = max;
        }
        if let Ok(path) = env::var("SCOUT_CHROME_PATH") {
            self.identity.chrome_path = Some(PathBuf::from(path));
        }
        if let Ok(url) = env::var("SCOUT_BACKEND_URL") {
            self.backend_url = Some(url);
        }
    }

    /// Run configuration covering the full city/type catalog
    pub fn run_config(&self) -> Result<RunConfig, ConfigError> {
        self.build_run_config(
            self.cities.clone(),
            self.listing_types.clone(),
            self.max_ads_per_type,
        )
    }

    /// Run configuration for a subset of the catalog selected by name.
    /// Empty selections mean "all".
    pub fn select(
        &self,
        cities: &[String],
        listing_types: &[String],
        max_ads: Option<usize>,
    ) -> Result<RunConfig, ConfigError> {
        let cities = if cities.is_empty() {
            self.cities.clone()
        } else {
            cities
                .iter()
                .map(|name| {
                    self.cities
                        .iter()
                        .find(|c| &c.name == name)
                        .cloned()
                        .ok_or_else(|| ConfigError::UnknownCity(name.clone()))
                })
                .collect::<Result<Vec<_>, _>>()?
        };

        let listing_types = if listing_types.is_empty() {
            self.listing_types.clone()
        } else {
            listing_types
                .iter()
                .map(|name| {
                    self.listing_types
                        .iter()
                        .find(|t| &t.name == name)
                        .cloned()
                        .ok_or_else(|| ConfigError::UnknownListingType(name.clone()))
                })
                .collect::<Result<Vec<_>, _>>()?
        };

        self.build_run_config(
            cities,
            listing_types,
            max_ads.unwrap_or(self.max_ads_per_type),
        )
    }

    fn build_run_config(
        &self,
        cities: Vec<CityConfig>,
        listing_types: Vec<ListingTypeConfig>,
        max_per_type: usize,
    ) -> Result<RunConfig, ConfigError> {
        let config = RunConfig {
            base_url: Url::parse(&self.base_url)?,
            cities,
            listing_types,
            max_per_type,
            timing: self.timing.clone(),
            output: self.output,
            output_dir: self.output_dir.clone(),
            file_prefix: self.file_prefix.clone(),
        };
        config.validate()?;
        Ok(config)
    }
}

/// Immutable parameters of one crawl run
#[derive(Debug, Clone)]
pub struct RunConfig {
    pub base_url: Url,
    pub cities: Vec<CityConfig>,
    pub listing_types: Vec<ListingTypeConfig>,
    pub max_per_type: usize,
    pub timing: Timing,
    pub output: OutputOptions,
    pub output_dir: PathBuf,
    pub file_prefix: String,
}

impl RunConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.cities.is_empty() {
            return Err(ConfigError::NoCities);
        }
        if self.listing_types.is_empty() {
            return Err(ConfigError::NoListingTypes);
        }
        if self.max_per_type == 0 {
            return Err(ConfigError::NotPositive("maxPerType"));
        }

        let t = &self.timing;
        let timeouts = [
            ("pageLoadTimeoutMs", t.page_load_timeout_ms),
            ("elementWaitTimeoutMs", t.element_wait_timeout_ms),
            ("adProcessTimeoutMs", t.ad_process_timeout_ms),
            ("frontierBudgetMs", t.frontier_budget_ms),
        ];
        for (name, value) in timeouts {
            if value == 0 {
                return Err(ConfigError::NotPositive(name));
            }
        }
        if t.scroll_increment_px == 0 {
            return Err(ConfigError::NotPositive("scrollIncrementPx"));
        }

        Ok(())
    }

    /// Index page for one city and listing type, e.g. `https://divar.ir/s/karaj/rent-apartment`
    pub fn index_url(&self, city: &CityConfig, listing_type: &ListingTypeConfig) -> String {
        let mut url = self.base_url.clone();
        url.set_path(&format!("s/{}/{}", city.index_slug, listing_type.index_slug));
        url.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_produce_a_valid_run() {
        let config = Settings::default().run_config().unwrap();
        assert_eq!(config.cities.len(), 2);
        assert_eq!(config.listing_types.len(), 2);
        assert_eq!(config.max_per_type, 50);
        assert_eq!(
            config.index_url(&config.cities[1], &config.listing_types[1]),
            "https://divar.ir/s/karaj/rent-apartment"
        );
    }

    #[test]
    fn select_resolves_names_against_catalog() {
        let settings = Settings::default();
        let config = settings
            .select(&["karaj".to_string()], &["rent".to_string()], Some(5))
            .unwrap();

        assert_eq!(config.cities[0].index_slug, "karaj");
        assert_eq!(config.listing_types[0].kind, ListingKind::Rent);
        assert_eq!(config.max_per_type, 5);

        let err = settings
            .select(&["shiraz".to_string()], &[], None)
            .unwrap_err();
        assert!(matches!(err, ConfigError::UnknownCity(name) if name == "shiraz"));
    }

    #[test]
    fn rejects_zero_cap_and_timeouts() {
        let settings = Settings::default();
        assert!(matches!(
            settings.select(&[], &[], Some(0)),
            Err(ConfigError::NotPositive("maxPerType"))
        ));

        let mut config = settings.run_config().unwrap();
        config.timing.page_load_timeout_ms = 0;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::NotPositive("pageLoadTimeoutMs"))
        ));

        config.timing.page_load_timeout_ms = 1;
        config.cities.clear();
        assert!(matches!(config.validate(), Err(ConfigError::NoCities)));
    }

    #[test]
    fn partial_settings_file_keeps_defaults() {
        let settings: Settings =
            serde_json::from_str(r#"{ "maxAdsPerType": 10, "timing": { "pageLoadDelayMs": 500 } }"#)
                .unwrap();

        assert_eq!(settings.max_ads_per_type, 10);
        assert_eq!(settings.timing.page_load_delay_ms, 500);
        assert_eq!(settings.timing.ad_process_delay_ms, 2000);
        assert_eq!(settings.cities.len(), 2);
    }
}
