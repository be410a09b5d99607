use serde::{Deserialize, Serialize};
use serde_yaml::Mapping;
use std::collections::BTreeMap;
use std::fmt::{Debug, Formatter};
use url::Url;

/// Orchestration metadata of an `AlertManagerConfig` object
///
/// None of it is relevant to Mimir; it only identifies the object for the
/// surrounding operator.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ObjectMeta {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,

    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub labels: BTreeMap<String, String>,
}

/// Desired state for a single tenant's Alertmanager
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AlertManagerConfigSpec {
    /// Mimir tenant ID (sent as `X-Scope-OrgID`)
    pub id: String,

    /// Base URL of the Mimir instance owning the tenant
    pub url: Url,

    /// The Alertmanager configuration tree handed to Mimir as-is
    #[serde(default)]
    pub config: Mapping,
}

/// `AlertManagerConfig` custom resource as observed by the reconciler
///
/// # Example
///
/// ```rust
/// use mimir_alertmanager_sync::AlertManagerConfig;
/// use url::Url;
///
/// let config: serde_yaml::Mapping = serde_yaml::from_str("groups: []").unwrap();
/// let resource = AlertManagerConfig::new("t1", Url::parse("http://mimir:8080").unwrap(), config)
///     .with_name("team-a")
///     .with_namespace("monitoring");
///
/// assert_eq!(resource.tenant_id(), "t1");
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AlertManagerConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_version: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,

    #[serde(default)]
    pub metadata: ObjectMeta,

    pub spec: AlertManagerConfigSpec,
}

impl AlertManagerConfig {
    /// Create a resource for the given tenant, endpoint and configuration
    pub fn new(id: &str, url: Url, config: Mapping) -> Self {
        Self {
            api_version: None,
            kind: None,
            metadata: ObjectMeta::default(),
            spec: AlertManagerConfigSpec {
                id: id.to_string(),
                url,
                config,
            },
        }
    }

    /// Set the object name
    pub fn with_name(mut self, name: &str) -> Self {
        self.metadata.name = Some(name.to_string());
        self
    }

    /// Set the object namespace
    pub fn with_namespace(mut self, namespace: &str) -> Self {
        self.metadata.namespace = Some(namespace.to_string());
        self
    }

    /// Add a label to the object metadata
    pub fn with_label(mut self, key: &str, value: &str) -> Self {
        self.metadata
            .labels
            .insert(key.to_string(), value.to_string());
        self
    }

    /// Get the tenant ID
    pub fn tenant_id(&self) -> &str {
        &self.spec.id
    }

    /// Get the Mimir endpoint
    pub fn endpoint(&self) -> &Url {
        &self.spec.url
    }
}

/// Credentials used when talking to Mimir
#[derive(Clone, Default)]
pub enum Authentication {
    /// No credentials
    #[default]
    None,
    /// HTTP basic authentication
    Basic { user: String, key: String },
    /// Bearer token authentication
    Bearer { token: String },
}

impl Authentication {
    /// Basic authentication with a user and an API key
    pub fn basic(user: &str, key: &str) -> Self {
        Self::Basic {
            user: user.to_string(),
            key: key.to_string(),
        }
    }

    /// Bearer token authentication
    pub fn bearer(token: &str) -> Self {
        Self::Bearer {
            token: token.to_string(),
        }
    }
}

// Secrets never end up in logs.
impl Debug for Authentication {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Authentication::None => write!(f, "None"),
            Authentication::Basic { user, .. } => f
                .debug_struct("Basic")
                .field("user", user)
                .field("key", &"<redacted>")
                .finish(),
            Authentication::Bearer { .. } => f
                .debug_struct("Bearer")
                .field("token", &"<redacted>")
                .finish(),
        }
    }
}
