//! Plugin configuration builders
//!
//! Each builder assembles one plugin entry from typed parameters. They are
//! pure: no I/O, and the same inputs always give the same structure. The
//! resulting [`Plugins`] value is handed to the agent's configuration store
//! as-is.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;

use crate::error::{Error, Result};

/// Parameters of one plugin instance
pub type Parameters = Map<String, Value>;

/// One plugin's section of the agent configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PluginConfig {
    pub init_config: Option<Parameters>,
    pub instances: Vec<Parameters>,
}

impl PluginConfig {
    /// A section with no init_config and a single instance
    pub fn single(parameters: Parameters) -> Self {
        Self {
            init_config: None,
            instances: vec![parameters],
        }
    }
}

/// Plugin name to plugin configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Plugins(BTreeMap<String, PluginConfig>);

impl Plugins {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, plugin: impl Into<String>, config: PluginConfig) {
        self.0.insert(plugin.into(), config);
    }

    pub fn get(&self, plugin: &str) -> Option<&PluginConfig> {
        self.0.get(plugin)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &PluginConfig)> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Fold `other` into `self`.
    ///
    /// Instances of a plugin present on both sides are appended in order;
    /// an existing init_config wins over the incoming one.
    pub fn merge(&mut self, other: Plugins) {
        for (plugin, incoming) in other.0 {
            match self.0.get_mut(&plugin) {
                Some(existing) => {
                    if existing.init_config.is_none() {
                        existing.init_config = incoming.init_config;
                    }
                    existing.instances.extend(incoming.instances);
                }
                None => {
                    self.0.insert(plugin, incoming);
                }
            }
        }
    }

    pub fn to_json_pretty(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

impl IntoIterator for Plugins {
    type Item = (String, PluginConfig);
    type IntoIter = std::collections::btree_map::IntoIter<String, PluginConfig>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}

/// Optional `service` and `component` dimensions of a plugin instance.
///
/// Empty values are dropped, and an empty set is never written out.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Dimensions {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub service: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub component: Option<String>,
}

impl Dimensions {
    pub fn new(service: Option<&str>, component: Option<&str>) -> Self {
        let keep = |v: Option<&str>| v.filter(|s| !s.is_empty()).map(str::to_string);
        Self {
            service: keep(service),
            component: keep(component),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.service.is_none() && self.component.is_none()
    }
}

fn parameters<const N: usize>(
    fields: [(&str, Value); N],
    dimensions: &Dimensions,
) -> Result<Parameters> {
    let mut params: Parameters = fields
        .into_iter()
        .map(|(key, value)| (key.to_string(), value))
        .collect();
    if !dimensions.is_empty() {
        params.insert("dimensions".to_string(), serde_json::to_value(dimensions)?);
    }
    Ok(params)
}

fn single(plugin: &str, params: Parameters) -> Plugins {
    let mut config = Plugins::new();
    config.insert(plugin, PluginConfig::single(params));
    config
}

/// Watch processes matching a list of search strings
pub fn watch_process<I, S>(search_strings: I) -> ProcessWatch
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    ProcessWatch {
        search_strings: search_strings.into_iter().map(Into::into).collect(),
        service: None,
        component: None,
        exact_match: true,
        detailed: true,
        process_name: None,
    }
}

/// Builder returned by [`watch_process`]
#[derive(Debug, Clone)]
pub struct ProcessWatch {
    search_strings: Vec<String>,
    service: Option<String>,
    component: Option<String>,
    exact_match: bool,
    detailed: bool,
    process_name: Option<String>,
}

impl ProcessWatch {
    pub fn service(mut self, service: impl Into<String>) -> Self {
        self.service = Some(service.into());
        self
    }

    pub fn component(mut self, component: impl Into<String>) -> Self {
        self.component = Some(component.into());
        self
    }

    pub fn exact_match(mut self, exact: bool) -> Self {
        self.exact_match = exact;
        self
    }

    pub fn detailed(mut self, detailed: bool) -> Self {
        self.detailed = detailed;
        self
    }

    /// Instance name; defaults to the first search string
    pub fn process_name(mut self, name: impl Into<String>) -> Self {
        self.process_name = Some(name.into());
        self
    }

    pub fn build(self) -> Result<Plugins> {
        let name = self
            .process_name
            .filter(|n| !n.is_empty())
            .or_else(|| self.search_strings.first().cloned())
            .ok_or_else(|| {
                Error::InvalidArgument(
                    "watch_process needs a process name or at least one search string"
                        .to_string(),
                )
            })?;
        let dimensions = Dimensions::new(self.service.as_deref(), self.component.as_deref());
        let params = parameters(
            [
                ("name", Value::from(name)),
                ("detailed", Value::from(self.detailed)),
                ("exact_match", Value::from(self.exact_match)),
                ("search_string", Value::from(self.search_strings)),
            ],
            &dimensions,
        )?;
        Ok(single("process", params))
    }
}

/// Watch the processes run by `username`
pub fn watch_process_by_username(
    username: impl Into<String>,
    process_name: impl Into<String>,
) -> UsernameWatch {
    UsernameWatch {
        username: username.into(),
        process_name: process_name.into(),
        service: None,
        component: None,
        detailed: true,
    }
}

/// Builder returned by [`watch_process_by_username`]
#[derive(Debug, Clone)]
pub struct UsernameWatch {
    username: String,
    process_name: String,
    service: Option<String>,
    component: Option<String>,
    detailed: bool,
}

impl UsernameWatch {
    pub fn service(mut self, service: impl Into<String>) -> Self {
        self.service = Some(service.into());
        self
    }

    pub fn component(mut self, component: impl Into<String>) -> Self {
        self.component = Some(component.into());
        self
    }

    pub fn detailed(mut self, detailed: bool) -> Self {
        self.detailed = detailed;
        self
    }

    pub fn build(self) -> Result<Plugins> {
        let dimensions = Dimensions::new(self.service.as_deref(), self.component.as_deref());
        let params = parameters(
            [
                ("name", Value::from(self.process_name)),
                ("detailed", Value::from(self.detailed)),
                ("username", Value::from(self.username)),
            ],
            &dimensions,
        )?;
        Ok(single("process", params))
    }
}

/// Watch the size of some files in a directory
pub fn watch_file_size<I, S>(directory_name: impl Into<String>, file_names: I) -> FileSizeWatch
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    FileSizeWatch {
        directory_name: directory_name.into(),
        file_names: file_names.into_iter().map(Into::into).collect(),
        recursive: false,
        service: None,
        component: None,
    }
}

/// Builder returned by [`watch_file_size`]
#[derive(Debug, Clone)]
pub struct FileSizeWatch {
    directory_name: String,
    file_names: Vec<String>,
    recursive: bool,
    service: Option<String>,
    component: Option<String>,
}

impl FileSizeWatch {
    pub fn recursive(mut self, recursive: bool) -> Self {
        self.recursive = recursive;
        self
    }

    pub fn service(mut self, service: impl Into<String>) -> Self {
        self.service = Some(service.into());
        self
    }

    pub fn component(mut self, component: impl Into<String>) -> Self {
        self.component = Some(component.into());
        self
    }

    pub fn build(self) -> Result<Plugins> {
        let dimensions = Dimensions::new(self.service.as_deref(), self.component.as_deref());
        let params = parameters(
            [
                ("directory_name", Value::from(self.directory_name)),
                ("file_names", Value::from(self.file_names)),
                ("recursive", Value::from(self.recursive)),
            ],
            &dimensions,
        )?;
        Ok(single("file_size", params))
    }
}

/// Watch a directory
pub fn watch_directory(directory_name: impl Into<String>) -> DirectoryWatch {
    DirectoryWatch {
        directory_name: directory_name.into(),
        service: None,
        component: None,
    }
}

/// Builder returned by [`watch_directory`]
#[derive(Debug, Clone)]
pub struct DirectoryWatch {
    directory_name: String,
    service: Option<String>,
    component: Option<String>,
}

impl DirectoryWatch {
    pub fn service(mut self, service: impl Into<String>) -> Self {
        self.service = Some(service.into());
        self
    }

    pub fn component(mut self, component: impl Into<String>) -> Self {
        self.component = Some(component.into());
        self
    }

    pub fn build(self) -> Result<Plugins> {
        let dimensions = Dimensions::new(self.service.as_deref(), self.component.as_deref());
        let params = parameters([("directory", Value::from(self.directory_name))], &dimensions)?;
        Ok(single("directory", params))
    }
}

/// HTTP check of a service API endpoint
pub fn service_api_check(
    name: impl Into<String>,
    url: impl Into<String>,
    pattern: impl Into<String>,
) -> ApiCheck {
    ApiCheck {
        name: name.into(),
        url: url.into(),
        pattern: pattern.into(),
        timeout_secs: 10,
        use_keystone: true,
        service: None,
        component: None,
    }
}

/// Builder returned by [`service_api_check`]
#[derive(Debug, Clone)]
pub struct ApiCheck {
    name: String,
    url: String,
    pattern: String,
    timeout_secs: u64,
    use_keystone: bool,
    service: Option<String>,
    component: Option<String>,
}

impl ApiCheck {
    pub fn use_keystone(mut self, use_keystone: bool) -> Self {
        self.use_keystone = use_keystone;
        self
    }

    /// Request timeout in seconds
    pub fn timeout_secs(mut self, secs: u64) -> Self {
        self.timeout_secs = secs;
        self
    }

    pub fn service(mut self, service: impl Into<String>) -> Self {
        self.service = Some(service.into());
        self
    }

    pub fn component(mut self, component: impl Into<String>) -> Self {
        self.component = Some(component.into());
        self
    }

    pub fn build(self) -> Result<Plugins> {
        let dimensions = Dimensions::new(self.service.as_deref(), self.component.as_deref());
        let params = parameters(
            [
                ("name", Value::from(self.name)),
                ("url", Value::from(self.url)),
                ("match_pattern", Value::from(self.pattern)),
                ("timeout", Value::from(self.timeout_secs)),
                ("use_keystone", Value::from(self.use_keystone)),
            ],
            &dimensions,
        )?;
        Ok(single("http_check", params))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn as_json(plugins: &Plugins) -> Value {
        serde_json::to_value(plugins).unwrap()
    }

    #[test]
    fn test_watch_process_defaults() {
        let config = watch_process(["nova-api"]).build().unwrap();
        assert_eq!(
            as_json(&config),
            json!({
                "process": {
                    "init_config": null,
                    "instances": [{
                        "name": "nova-api",
                        "detailed": true,
                        "exact_match": true,
                        "search_string": ["nova-api"]
                    }]
                }
            })
        );
    }

    #[test]
    fn test_watch_process_options() {
        let config = watch_process(["mysqld", "mysqld_safe"])
            .process_name("mysql")
            .exact_match(false)
            .detailed(false)
            .component("mysql")
            .build()
            .unwrap();
        let instance = &config.get("process").unwrap().instances[0];
        assert_eq!(instance["name"], json!("mysql"));
        assert_eq!(instance["exact_match"], json!(false));
        assert_eq!(instance["detailed"], json!(false));
        assert_eq!(instance["search_string"], json!(["mysqld", "mysqld_safe"]));
        assert_eq!(instance["dimensions"], json!({"component": "mysql"}));
    }

    #[test]
    fn test_watch_process_needs_a_name() {
        let empty: [&str; 0] = [];
        assert!(matches!(
            watch_process(empty).build(),
            Err(Error::InvalidArgument(_))
        ));
        assert!(watch_process(empty).process_name("x").build().is_ok());
    }

    #[test]
    fn test_empty_dimensions_are_omitted() {
        let config = watch_directory("/var/log")
            .service("")
            .component("")
            .build()
            .unwrap();
        let instance = &config.get("directory").unwrap().instances[0];
        assert!(!instance.contains_key("dimensions"));
        assert_eq!(instance["directory"], json!("/var/log"));
    }

    #[test]
    fn test_dimensions_only_carry_supplied_keys() {
        let both = watch_process_by_username("rabbitmq", "rabbitmq")
            .service("messaging")
            .component("rabbitmq")
            .build()
            .unwrap();
        let instance = &both.get("process").unwrap().instances[0];
        assert_eq!(
            instance["dimensions"],
            json!({"service": "messaging", "component": "rabbitmq"})
        );

        let service_only = watch_file_size("/var/lib/mysql", ["ibdata1"])
            .service("mysql")
            .build()
            .unwrap();
        let instance = &service_only.get("file_size").unwrap().instances[0];
        assert_eq!(instance["dimensions"], json!({"service": "mysql"}));
    }

    #[test]
    fn test_watch_process_by_username() {
        let config = watch_process_by_username("kafka", "kafka-broker")
            .build()
            .unwrap();
        assert_eq!(
            as_json(&config),
            json!({
                "process": {
                    "init_config": null,
                    "instances": [{
                        "name": "kafka-broker",
                        "detailed": true,
                        "username": "kafka"
                    }]
                }
            })
        );
    }

    #[test]
    fn test_watch_file_size() {
        let config = watch_file_size("/var/log/nova", ["nova-api.log", "nova-compute.log"])
            .recursive(true)
            .build()
            .unwrap();
        assert_eq!(
            as_json(&config),
            json!({
                "file_size": {
                    "init_config": null,
                    "instances": [{
                        "directory_name": "/var/log/nova",
                        "file_names": ["nova-api.log", "nova-compute.log"],
                        "recursive": true
                    }]
                }
            })
        );
    }

    #[test]
    fn test_service_api_check() {
        let config = service_api_check("keystone-api", "http://localhost:5000/v3", ".*v3.*")
            .use_keystone(false)
            .service("identity")
            .build()
            .unwrap();
        assert_eq!(
            as_json(&config),
            json!({
                "http_check": {
                    "init_config": null,
                    "instances": [{
                        "name": "keystone-api",
                        "url": "http://localhost:5000/v3",
                        "match_pattern": ".*v3.*",
                        "timeout": 10,
                        "use_keystone": false,
                        "dimensions": {"service": "identity"}
                    }]
                }
            })
        );
    }

    #[test]
    fn test_service_api_check_timeout_is_whole_seconds() {
        let config = service_api_check("nova-api", "http://localhost:8774", "compute")
            .timeout_secs(3)
            .build()
            .unwrap();
        let instance = &config.get("http_check").unwrap().instances[0];
        assert_eq!(instance["timeout"], json!(3));
        assert!(instance["timeout"].is_u64());
    }

    #[test]
    fn test_builders_are_deterministic() {
        let a = watch_process(["nginx"]).service("web").build().unwrap();
        let b = watch_process(["nginx"]).service("web").build().unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_merge_appends_instances() {
        let mut config = watch_process(["nova-api"]).build().unwrap();
        config.merge(watch_process(["nova-scheduler"]).build().unwrap());
        config.merge(watch_directory("/var/lib/nova").build().unwrap());

        assert_eq!(config.len(), 2);
        let names: Vec<&Value> = config
            .get("process")
            .unwrap()
            .instances
            .iter()
            .map(|i| &i["name"])
            .collect();
        assert_eq!(names, vec![&json!("nova-api"), &json!("nova-scheduler")]);
    }

    #[test]
    fn test_merge_keeps_existing_init_config() {
        let mut init = Parameters::new();
        init.insert("ttl".to_string(), json!(60));

        let mut base = Plugins::new();
        base.insert(
            "http_check",
            PluginConfig {
                init_config: Some(init.clone()),
                instances: Vec::new(),
            },
        );
        base.merge(service_api_check("a", "http://a", "ok").build().unwrap());

        let merged = base.get("http_check").unwrap();
        assert_eq!(merged.init_config, Some(init));
        assert_eq!(merged.instances.len(), 1);
    }
}
