#![allow(dead_code)]
use std::collections::HashMap;

use srcsync_core::{Settings, SourceDescriptor};

/// Builds settings from a fixed variable table instead of the process environment.
pub fn settings_from(vars: &[(&str, &str)]) -> Settings {
    let table: HashMap<String, String> = vars
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();
    Settings::from_lookup(|key| table.get(key).cloned())
}

/// Returns the descriptor payload the build pipeline sends.
pub fn pipeline_payload() -> &'static str {
    r#"{
        "server_type": "git",
        "repository_url": "git@github.com:acme/app.git",
        "branch": "release",
        "user": "",
        "password": "",
        "tenant_id": "tenant-a",
        "service_id": "service-1"
    }"#
}

pub fn descriptor_from_payload() -> SourceDescriptor {
    serde_json::from_str(pipeline_payload()).expect("valid pipeline payload")
}
