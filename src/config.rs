//! Node configuration (§6): one JSON document describing the interfaces this
//! node binds and the service instances it provides or requires.
//!
//! Deserialization is a plain `serde_json::from_reader` into these structs,
//! mirroring the config-loading approach the other SOME/IP port in this
//! corpus takes against its own `SystemConfig`. Everything past parsing is a
//! distinct validation pass (`Config::validate`) so that a malformed
//! reference produces a named, actionable `ConfigError` rather than a panic
//! deep inside socket setup.

use std::collections::HashMap;
use std::fs::File;
use std::io::BufReader;
use std::path::Path;

use serde::Deserialize;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read configuration file {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse configuration: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("instance {instance:?} references unknown endpoint {endpoint:?} on interface {interface:?}")]
    UnknownEndpoint {
        instance: String,
        interface: String,
        endpoint: String,
    },

    #[error("interface {interface:?} has no endpoint named {endpoint:?} to act as its SD {family} binding")]
    UnknownSdEndpoint {
        interface: String,
        endpoint: String,
        family: &'static str,
    },

    #[error("interface {interface:?} binds SD endpoint {endpoint:?} with port 0; an SD binding must have a non-zero port")]
    SdPortZero { interface: String, endpoint: String },

    #[error(
        "service ({service_id:#x}, {instance_id:#x}, major {major_version}) is offered by both {first:?} and {second:?}"
    )]
    DuplicateService {
        service_id: u16,
        instance_id: u16,
        major_version: u8,
        first: String,
        second: String,
    },

    #[error(
        "endpoints {first:?} and {second:?} both bind ({ip}, {port}, {protocol}); only SD control-plane endpoints may share an address"
    )]
    ConflictingEndpoints {
        first: String,
        second: String,
        ip: String,
        port: u16,
        protocol: String,
    },

    #[error("instance {instance:?} required service {alias:?} names interface {interface:?}, which is not configured")]
    UnknownInterface { instance: String, alias: String, interface: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IpVersion {
    #[serde(rename = "4")]
    V4,
    #[serde(rename = "6")]
    V6,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Protocol {
    Udp,
    Tcp,
}

#[derive(Debug, Clone, Deserialize)]
pub struct EndpointConfig {
    pub ip: String,
    pub port: u16,
    pub version: IpVersion,
    pub protocol: Protocol,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SdBinding {
    #[serde(default)]
    pub ipv4: Option<String>,
    #[serde(default)]
    pub ipv6: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct InterfaceConfig {
    #[serde(default)]
    pub endpoints: HashMap<String, EndpointConfig>,
    pub sd: SdBinding,
}

#[derive(Debug, Clone, Deserialize)]
pub struct EventgroupConfig {
    pub event_ids: Vec<u16>,
    /// Endpoint alias (on the owning interface) this eventgroup publishes
    /// multicast notifications on, if any.
    pub multicast: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ProvidingConfig {
    pub service_id: u16,
    pub instance_id: u16,
    pub major_version: u8,
    #[serde(default)]
    pub minor_version: u32,
    /// interface name -> endpoint alias to offer this service on.
    pub offer_on: HashMap<String, String>,
    #[serde(default)]
    pub eventgroups: HashMap<u16, EventgroupConfig>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RequiredConfig {
    pub service_id: u16,
    pub instance_id: u16,
    pub major_version: u8,
    pub find_on: Vec<String>,
    pub static_ip: Option<String>,
    pub static_port: Option<u16>,
}

fn default_cycle_offer_ms() -> u64 {
    1000
}

fn default_request_timeout_ms() -> u64 {
    1000
}

fn default_multicast_hops() -> u32 {
    1
}

#[derive(Debug, Clone, Deserialize)]
pub struct SdTuning {
    #[serde(default = "default_cycle_offer_ms")]
    pub cycle_offer_ms: u64,
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,
    #[serde(default = "default_multicast_hops")]
    pub multicast_hops: u32,
}

impl Default for SdTuning {
    fn default() -> Self {
        Self {
            cycle_offer_ms: default_cycle_offer_ms(),
            request_timeout_ms: default_request_timeout_ms(),
            multicast_hops: default_multicast_hops(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct InstanceConfig {
    #[serde(default)]
    pub providing: HashMap<String, ProvidingConfig>,
    #[serde(default)]
    pub required: HashMap<String, RequiredConfig>,
    /// interface name -> endpoint alias used as the SD unicast source.
    #[serde(default)]
    pub unicast_bind: HashMap<String, String>,
    #[serde(default)]
    pub sd: SdTuning,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub interfaces: HashMap<String, InterfaceConfig>,
    pub instances: HashMap<String, InstanceConfig>,
}

impl Config {
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let file = File::open(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;
        let config: Config = serde_json::from_reader(BufReader::new(file))?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_str(text: &str) -> Result<Self, ConfigError> {
        let config: Config = serde_json::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    fn endpoint_key(endpoint: &EndpointConfig) -> (String, u16, &'static str) {
        let protocol = match endpoint.protocol {
            Protocol::Udp => "udp",
            Protocol::Tcp => "tcp",
        };
        (endpoint.ip.clone(), endpoint.port, protocol)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        let mut sd_endpoint_names: Vec<(String, String)> = Vec::new();
        for (iface_name, iface) in &self.interfaces {
            for alias in [&iface.sd.ipv4, &iface.sd.ipv6].into_iter().flatten() {
                let endpoint = iface.endpoints.get(alias).ok_or_else(|| ConfigError::UnknownSdEndpoint {
                    interface: iface_name.clone(),
                    endpoint: alias.clone(),
                    family: if Some(alias) == iface.sd.ipv4.as_ref() { "ipv4" } else { "ipv6" },
                })?;
                if endpoint.port == 0 {
                    return Err(ConfigError::SdPortZero {
                        interface: iface_name.clone(),
                        endpoint: alias.clone(),
                    });
                }
                sd_endpoint_names.push((iface_name.clone(), alias.clone()));
            }
        }

        for (instance_name, instance) in &self.instances {
            for (alias, providing) in &instance.providing {
                for (iface_name, endpoint_alias) in &providing.offer_on {
                    self.check_endpoint_reference(instance_name, iface_name, endpoint_alias)?;
                }
                for (eventgroup_id, eventgroup) in &providing.eventgroups {
                    if let Some(multicast_alias) = &eventgroup.multicast {
                        // Multicast eventgroup endpoints are looked up on every
                        // interface this service is offered on; at least one must resolve.
                        let resolves = providing
                            .offer_on
                            .keys()
                            .any(|iface_name| {
                                self.interfaces
                                    .get(iface_name)
                                    .is_some_and(|iface| iface.endpoints.contains_key(multicast_alias))
                            });
                        if !resolves {
                            return Err(ConfigError::UnknownEndpoint {
                                instance: format!("{instance_name}/{alias} eventgroup {eventgroup_id:#x}"),
                                interface: providing.offer_on.keys().next().cloned().unwrap_or_default(),
                                endpoint: multicast_alias.clone(),
                            });
                        }
                    }
                }
            }
            for iface_name in instance.unicast_bind.keys() {
                if !self.interfaces.contains_key(iface_name) {
                    return Err(ConfigError::UnknownInterface {
                        instance: instance_name.clone(),
                        alias: "unicast_bind".to_string(),
                        interface: iface_name.clone(),
                    });
                }
            }
            for (iface_name, endpoint_alias) in &instance.unicast_bind {
                self.check_endpoint_reference(instance_name, iface_name, endpoint_alias)?;
            }
            for (alias, required) in &instance.required {
                for iface_name in &required.find_on {
                    if !self.interfaces.contains_key(iface_name) {
                        return Err(ConfigError::UnknownInterface {
                            instance: instance_name.clone(),
                            alias: alias.clone(),
                            interface: iface_name.clone(),
                        });
                    }
                }
            }
        }

        let mut seen_services: HashMap<(u16, u16, u8), String> = HashMap::new();
        for (instance_name, instance) in &self.instances {
            for (alias, providing) in &instance.providing {
                let key = (providing.service_id, providing.instance_id, providing.major_version);
                let label = format!("{instance_name}/{alias}");
                if let Some(existing) = seen_services.insert(key, label.clone()) {
                    return Err(ConfigError::DuplicateService {
                        service_id: providing.service_id,
                        instance_id: providing.instance_id,
                        major_version: providing.major_version,
                        first: existing,
                        second: label,
                    });
                }
            }
        }

        let mut seen_endpoints: HashMap<(String, u16, &'static str), String> = HashMap::new();
        for (iface_name, iface) in &self.interfaces {
            for (alias, endpoint) in &iface.endpoints {
                let label = format!("{iface_name}/{alias}");
                let key = Self::endpoint_key(endpoint);
                if let Some(existing) = seen_endpoints.insert(key.clone(), label.clone()) {
                    let both_sd_control_plane = sd_endpoint_names
                        .iter()
                        .any(|(i, a)| i == iface_name && a == alias)
                        && sd_endpoint_names.iter().any(|(i, a)| {
                            let other_label = format!("{i}/{a}");
                            other_label == existing
                        });
                    if !both_sd_control_plane {
                        return Err(ConfigError::ConflictingEndpoints {
                            first: existing,
                            second: label,
                            ip: key.0,
                            port: key.1,
                            protocol: key.2.to_string(),
                        });
                    }
                }
            }
        }

        Ok(())
    }

    fn check_endpoint_reference(
        &self,
        instance_name: &str,
        interface: &str,
        endpoint: &str,
    ) -> Result<(), ConfigError> {
        let iface = self.interfaces.get(interface).ok_or_else(|| ConfigError::UnknownInterface {
            instance: instance_name.to_string(),
            alias: endpoint.to_string(),
            interface: interface.to_string(),
        })?;
        if !iface.endpoints.contains_key(endpoint) {
            return Err(ConfigError::UnknownEndpoint {
                instance: instance_name.to_string(),
                interface: interface.to_string(),
                endpoint: endpoint.to_string(),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_json() -> &'static str {
        r#"{
            "interfaces": {
                "eth0": {
                    "endpoints": {
                        "sd-v4": { "ip": "224.224.224.245", "port": 30490, "version": "4", "protocol": "udp" },
                        "service-a": { "ip": "10.0.0.1", "port": 30509, "version": "4", "protocol": "udp" }
                    },
                    "sd": { "ipv4": "sd-v4", "ipv6": null }
                }
            },
            "instances": {
                "node-a": {
                    "providing": {
                        "adder": {
                            "service_id": 4097,
                            "instance_id": 1,
                            "major_version": 1,
                            "minor_version": 0,
                            "offer_on": { "eth0": "service-a" }
                        }
                    },
                    "required": {},
                    "unicast_bind": { "eth0": "service-a" }
                }
            }
        }"#
    }

    #[test]
    fn loads_a_well_formed_document() {
        let config = Config::from_str(sample_json()).unwrap();
        assert_eq!(config.interfaces.len(), 1);
        assert_eq!(config.instances["node-a"].providing["adder"].service_id, 0x1001);
    }

    #[test]
    fn sd_tuning_defaults_when_omitted() {
        let config = Config::from_str(sample_json()).unwrap();
        let tuning = &config.instances["node-a"].sd;
        assert_eq!(tuning.cycle_offer_ms, 1000);
        assert_eq!(tuning.multicast_hops, 1);
    }

    #[test]
    fn rejects_reference_to_unknown_endpoint() {
        let bad = sample_json().replace("\"service-a\"", "\"does-not-exist\"");
        assert!(matches!(Config::from_str(&bad), Err(ConfigError::UnknownEndpoint { .. })));
    }

    #[test]
    fn rejects_sd_endpoint_with_port_zero() {
        let bad = sample_json().replace("30490", "0");
        assert!(matches!(Config::from_str(&bad), Err(ConfigError::SdPortZero { .. })));
    }

    #[test]
    fn rejects_duplicate_service_identity() {
        let json = r#"{
            "interfaces": {
                "eth0": {
                    "endpoints": {
                        "sd-v4": { "ip": "224.224.224.245", "port": 30490, "version": "4", "protocol": "udp" },
                        "a": { "ip": "10.0.0.1", "port": 30509, "version": "4", "protocol": "udp" },
                        "b": { "ip": "10.0.0.1", "port": 30510, "version": "4", "protocol": "udp" }
                    },
                    "sd": { "ipv4": "sd-v4", "ipv6": null }
                }
            },
            "instances": {
                "one": {
                    "providing": { "x": { "service_id": 1, "instance_id": 1, "major_version": 1, "offer_on": { "eth0": "a" } } }
                },
                "two": {
                    "providing": { "y": { "service_id": 1, "instance_id": 1, "major_version": 1, "offer_on": { "eth0": "b" } } }
                }
            }
        }"#;
        assert!(matches!(Config::from_str(json), Err(ConfigError::DuplicateService { .. })));
    }
}
