//! Configuration layers of an App.
//!
//! Values come from up to four layers, applied in this order: extra
//! configs (by priority), the App's own config, the Catalog's config and
//! finally the user config. Each layer may name a ConfigMap and a Secret;
//! the ConfigMap is applied before the Secret.

use async_trait::async_trait;
use k8s_openapi::api::core::v1::{ConfigMap, Secret};
use kube::{Api, Client};
use serde_json::{Map, Value};
use thiserror::Error;

#[cfg(test)]
use mockall::automock;

use crate::crd::{App, Catalog, ConfigKind, ConfigSpec, NamespacedRef, ordered_extra_configs};

/// Keys a source may hold its values under, in lookup order.
pub const VALUES_KEYS: [&str; 2] = ["values", "values.yaml"];

/// Failure to load configuration for an App.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// A referenced ConfigMap or Secret does not exist.
    #[error("{kind} {namespace}/{name} not found")]
    SourceNotFound {
        kind: ConfigKind,
        namespace: String,
        name: String,
    },

    /// A source holds values that are not a YAML mapping.
    #[error("{kind} {namespace}/{name} has invalid values: {reason}")]
    Parse {
        kind: ConfigKind,
        namespace: String,
        name: String,
        reason: String,
    },

    /// Reading a source failed.
    #[error("Kubernetes API error: {0}")]
    Kube(#[from] kube::Error),
}

/// A configuration source of an App, before it is read.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ConfigSource {
    /// Layer name, e.g. `app` or `extra-0`.
    pub layer: String,
    /// Kind of object.
    pub kind: ConfigKind,
    /// Where the object lives.
    pub source: NamespacedRef,
}

/// One loaded configuration source.
#[derive(Clone, Debug, PartialEq)]
pub struct ConfigOverlay {
    /// Layer name, e.g. `app` or `extra-0`.
    pub layer: String,
    /// Kind of object the values came from.
    pub kind: ConfigKind,
    /// Where the values came from.
    pub source: NamespacedRef,
    /// `resourceVersion` of the source when it was read.
    pub revision: String,
    /// Parsed values, always a mapping.
    pub values: Value,
}

impl ConfigOverlay {
    /// Name of the copy written next to the HelmRelease.
    pub fn artifact_name(&self, app: &str) -> String {
        match self.kind {
            ConfigKind::ConfigMap => format!("{}-{}-values", app, self.layer),
            ConfigKind::Secret => format!("{}-{}-secrets", app, self.layer),
        }
    }
}

/// All configuration of an App.
///
/// The release engine merges the overlays itself, in the order they are
/// referenced from the HelmRelease, so only the ordered list is kept.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct MergedConfig {
    /// Present sources in application order.
    pub overlays: Vec<ConfigOverlay>,
}

impl MergedConfig {
    /// Build from overlays in application order.
    pub fn from_overlays(overlays: Vec<ConfigOverlay>) -> Self {
        Self { overlays }
    }

    /// Revision tokens in application order.
    pub fn revisions(&self) -> Vec<&str> {
        self.overlays.iter().map(|o| o.revision.as_str()).collect()
    }
}

/// Loads and merges the configuration of an App.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait ConfigMerger: Send + Sync {
    /// Read every configured source for `app`.
    async fn merge(&self, app: &App, catalog: &Catalog) -> Result<MergedConfig, ConfigError>;
}

/// The sources configured for `app`, in application order.
pub fn config_sources(app: &App, catalog: &Catalog) -> Vec<ConfigSource> {
    let mut sources = Vec::new();

    for (idx, extra) in ordered_extra_configs(&app.spec.extra_configs).into_iter().enumerate() {
        sources.push(ConfigSource {
            layer: format!("extra-{}", idx),
            kind: extra.kind,
            source: NamespacedRef {
                name: extra.name.clone(),
                namespace: extra.namespace.clone(),
            },
        });
    }

    let layers: [(&str, Option<&ConfigSpec>); 3] = [
        ("app", app.spec.config.as_ref()),
        ("catalog", catalog.spec.config.as_ref()),
        ("user", app.spec.user_config.as_ref()),
    ];
    for (layer, spec) in layers {
        let Some(spec) = spec else { continue };
        for (kind, source) in [
            (ConfigKind::ConfigMap, &spec.config_map),
            (ConfigKind::Secret, &spec.secret),
        ] {
            if let Some(source) = source {
                sources.push(ConfigSource {
                    layer: layer.to_string(),
                    kind,
                    source: source.clone(),
                });
            }
        }
    }

    sources
}

/// Parse a values document. Empty documents are an empty mapping.
pub fn parse_values(raw: &str) -> Result<Value, String> {
    let value: Value = serde_yaml::from_str(raw).map_err(|e| e.to_string())?;
    match value {
        Value::Null => Ok(Value::Object(Map::new())),
        Value::Object(_) => Ok(value),
        _ => Err("values must be a mapping".to_string()),
    }
}

/// Reads sources from the local cluster.
pub struct KubeConfigMerger {
    client: Client,
}

impl KubeConfigMerger {
    /// Create a merger reading through `client`.
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    async fn load(&self, source: ConfigSource) -> Result<ConfigOverlay, ConfigError> {
        let ConfigSource { layer, kind, source } = source;
        let not_found = || ConfigError::SourceNotFound {
            kind,
            namespace: source.namespace.clone(),
            name: source.name.clone(),
        };

        let (raw, revision) = match kind {
            ConfigKind::ConfigMap => {
                let api: Api<ConfigMap> = Api::namespaced(self.client.clone(), &source.namespace);
                let cm = api.get_opt(&source.name).await?.ok_or_else(not_found)?;
                let raw = cm
                    .data
                    .as_ref()
                    .and_then(|d| VALUES_KEYS.iter().find_map(|k| d.get(*k)).cloned());
                (raw, cm.metadata.resource_version)
            }
            ConfigKind::Secret => {
                let api: Api<Secret> = Api::namespaced(self.client.clone(), &source.namespace);
                let secret = api.get_opt(&source.name).await?.ok_or_else(not_found)?;
                let raw = match secret
                    .data
                    .as_ref()
                    .and_then(|d| VALUES_KEYS.iter().find_map(|k| d.get(*k)))
                {
                    Some(bytes) => Some(String::from_utf8(bytes.0.clone()).map_err(|e| {
                        ConfigError::Parse {
                            kind,
                            namespace: source.namespace.clone(),
                            name: source.name.clone(),
                            reason: e.to_string(),
                        }
                    })?),
                    None => None,
                };
                (raw, secret.metadata.resource_version)
            }
        };

        let values = parse_values(raw.as_deref().unwrap_or_default()).map_err(|reason| {
            ConfigError::Parse {
                kind,
                namespace: source.namespace.clone(),
                name: source.name.clone(),
                reason,
            }
        })?;

        Ok(ConfigOverlay {
            layer,
            kind,
            source,
            revision: revision.unwrap_or_default(),
            values,
        })
    }
}

#[async_trait]
impl ConfigMerger for KubeConfigMerger {
    async fn merge(&self, app: &App, catalog: &Catalog) -> Result<MergedConfig, ConfigError> {
        let mut overlays = Vec::new();
        for source in config_sources(app, catalog) {
            overlays.push(self.load(source).await?);
        }
        Ok(MergedConfig::from_overlays(overlays))
    }
}
