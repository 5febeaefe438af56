use serde::Deserialize;

#[derive(Deserialize)]
pub(crate) struct Config {
    pub(crate) url: url::Url,

    /// Enables the two-database mode. Media files are looked up in the
    /// secondary database if they are missing in the primary one.
    pub(crate) secondary_url: Option<url::Url>,

    #[serde(default = "default_database_pool_size")]
    pub(crate) pool_size: u32,
}

fn default_database_pool_size() -> u32 {
    10
}
