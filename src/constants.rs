/// Source and layout constants shared across the crate

// Output layout
pub const BRONZE_LAYER: &str = "bronze";
pub const CBS_SOURCE: &str = "cbs";

// Provenance columns appended to every dataset
pub const SRC_TABLE_COLUMN: &str = "src_table";
pub const LOAD_DATE_COLUMN: &str = "load_date";

// Default locations, relative to the working directory
pub const DEFAULT_DATA_ROOT: &str = "data";
pub const DEFAULT_META_ROOT: &str = "meta";
pub const DEFAULT_LOG_ROOT: &str = "logs";
pub const DEFAULT_CONFIG_FILE: &str = "config.toml";
pub const MANIFEST_FILE_NAME: &str = "bronze_cbs_tables.json";

pub const DEFAULT_MAX_WORKERS: usize = 8;
pub const DEFAULT_LOG_RETENTION_DAYS: u32 = 7;

// CBS open-data endpoints
pub const CBS_API_URL: &str = "https://opendata.cbs.nl/ODataApi/odata";
pub const CBS_FEED_URL: &str = "https://opendata.cbs.nl/ODataFeed/odata";

// Filename timestamp formats
pub const RETRIEVAL_DATE_FORMAT: &str = "%Y%m%d";
pub const FILE_TIME_FORMAT: &str = "%H%M%S";
pub const LOG_FILE_TIME_FORMAT: &str = "%Y%m%d_%H%M%S";

/// Env var that overrides `[metrics].pushgateway_url`
pub const PUSHGATEWAY_ENV: &str = "CBS_PUSHGATEWAY_URL";

/// Default manifest path under a metadata root: `{meta}/bronze/cbs/bronze_cbs_tables.json`
pub fn default_manifest_path(meta_root: &std::path::Path) -> std::path::PathBuf {
    meta_root
        .join(BRONZE_LAYER)
        .join(CBS_SOURCE)
        .join(MANIFEST_FILE_NAME)
}
