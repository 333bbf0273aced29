use serde::Deserialize;

/// `ckan` section of the configuration file.
#[derive(Debug, Clone, Deserialize)]
pub struct CkanConfig {
    /// Base URL, e.g. `https://datalake.example.org`.
    pub url: String,
    pub app_project: String,
    pub organization_email: String,
    pub organization_name: String,
    /// Organization owning created packages.
    #[serde(default)]
    pub owner_org: String,
    pub auth: OAuthConfig,
    #[serde(default)]
    pub data: DatasetConfig,
}

impl CkanConfig {
    /// URL of a CKAN action endpoint.
    pub fn action_url(&self, action: &str) -> String {
        format!("{}/api/action/{action}", self.url.trim_end_matches('/'))
    }
}

/// Keycloak password-grant credentials.
#[derive(Clone, Deserialize)]
pub struct OAuthConfig {
    /// Token endpoint.
    pub url: String,
    pub username: String,
    #[serde(default)]
    pub password: String,
    pub client_id: String,
    #[serde(default)]
    pub client_secret: String,
    #[serde(default = "default_grant_type")]
    pub grant_type: String,
    #[serde(default = "default_scope")]
    pub scope: String,
}

// Secrets stay out of debug logs.
impl std::fmt::Debug for OAuthConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OAuthConfig")
            .field("url", &self.url)
            .field("username", &self.username)
            .field("client_id", &self.client_id)
            .field("grant_type", &self.grant_type)
            .field("scope", &self.scope)
            .finish_non_exhaustive()
    }
}

fn default_grant_type() -> String {
    "password".to_string()
}

fn default_scope() -> String {
    "openid".to_string()
}

/// Defaults applied to every created package.
#[derive(Debug, Clone, Deserialize)]
pub struct DatasetConfig {
    /// Ground resolution in cm/px.
    #[serde(default = "default_resolution")]
    pub resolution: u32,
    #[serde(default = "default_topic")]
    pub topic: String,
    #[serde(default = "default_keywords")]
    pub keywords: Vec<String>,
}

fn default_resolution() -> u32 {
    10
}

fn default_topic() -> String {
    "imageryBaseMapsEarthCover".to_string()
}

fn default_keywords() -> Vec<String> {
    vec!["Delineation Map".to_string(), "Wildfire".to_string()]
}

impl Default for DatasetConfig {
    fn default() -> Self {
        Self {
            resolution: default_resolution(),
            topic: default_topic(),
            keywords: default_keywords(),
        }
    }
}
