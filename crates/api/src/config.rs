//! Types for use when configuring fetchbridge modules.

use crate::*;
use std::sync::Mutex;

/// helper transcode function
fn tc<S: serde::Serialize, D: serde::de::DeserializeOwned>(
    s: &S,
) -> BridgeResult<D> {
    serde_json::from_str(
        &serde_json::to_string(s)
            .map_err(|e| BridgeError::other_src("encode", e))?,
    )
    .map_err(|e| BridgeError::other_src("decode", e))
}

type Map = serde_json::Map<String, serde_json::Value>;

/// Denotes a type used to configure a specific fetchbridge module.
///
/// A module config is a struct with a single field, named after the
/// module (e.g. `coreFetchBridge`), holding the actual parameters. All
/// module configs share one json object, so the field name is the key
/// that keeps modules apart.
///
/// Note, the types defined in this struct are specifically for configuration
/// that cannot be changed at runtime, the likes of which might be found
/// in a configuration file.
pub trait ModConfig:
    'static
    + Sized
    + Default
    + std::fmt::Debug
    + serde::Serialize
    + serde::de::DeserializeOwned
    + Send
    + Sync
{
}

/// Fetchbridge configuration.
#[derive(Debug, Default)]
pub struct Config(Mutex<Map>);

impl serde::Serialize for Config {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serde::Serialize::serialize(&*self.0.lock().unwrap(), serializer)
    }
}

impl<'de> serde::Deserialize<'de> for Config {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let map: Map = serde::Deserialize::deserialize(deserializer)?;
        Ok(Self(Mutex::new(map)))
    }
}

impl Config {
    /// Load a configuration from a json string, e.g. the contents of a
    /// config file. Unknown keys are kept, so that modules added later
    /// can still find their parameters.
    pub fn from_json_str(json: &str) -> BridgeResult<Self> {
        serde_json::from_str(json)
            .map_err(|e| BridgeError::other_src("parse config", e))
    }

    /// Render this configuration as pretty-printed json.
    pub fn to_json_pretty(&self) -> BridgeResult<String> {
        serde_json::to_string_pretty(self)
            .map_err(|e| BridgeError::other_src("encode config", e))
    }

    /// Merge a module config into this configuration. Every top-level
    /// property of the module config replaces the property of the same
    /// name.
    ///
    /// Module factories call this with their defaults from
    /// `default_config`. Callers may call it again later to override.
    pub fn set_module_config<M: ModConfig>(&self, m: &M) -> BridgeResult<()> {
        let value: serde_json::Value = tc(m)?;
        let serde_json::Value::Object(value) = value else {
            return Err(BridgeError::other(format!(
                "module config must encode as a json object: {m:?}"
            )));
        };
        let mut lock = self.0.lock().unwrap();
        for (k, v) in value {
            lock.insert(k, v);
        }
        Ok(())
    }

    /// Extract a module config. Note that this config may have been loaded
    /// from disk and edited by humans, so the serialization on the module
    /// config should be tolerant to missing properties, setting sane
    /// defaults.
    pub fn get_module_config<M: ModConfig>(&self) -> BridgeResult<M> {
        let lock = self.0.lock().unwrap();
        tc(&*lock)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
    #[serde(rename_all = "camelCase", default)]
    struct PoolConfig {
        idle_per_host: u32,
        agent: String,
    }

    impl Default for PoolConfig {
        fn default() -> Self {
            Self {
                idle_per_host: 8,
                agent: "test-agent".into(),
            }
        }
    }

    #[derive(
        Debug, Default, Clone, PartialEq, serde::Serialize, serde::Deserialize,
    )]
    #[serde(rename_all = "camelCase", default)]
    struct PoolModConfig {
        test_pool: PoolConfig,
    }

    impl ModConfig for PoolModConfig {}

    #[derive(
        Debug, Default, Clone, PartialEq, serde::Serialize, serde::Deserialize,
    )]
    #[serde(rename_all = "camelCase", default)]
    struct OtherModConfig {
        other_mod: u32,
    }

    impl ModConfig for OtherModConfig {}

    #[test]
    fn default_config_renders_all_modules() {
        let config = Config::default();
        config.set_module_config(&PoolModConfig::default()).unwrap();
        config.set_module_config(&OtherModConfig::default()).unwrap();

        assert_eq!(
            r#"{
  "otherMod": 0,
  "testPool": {
    "agent": "test-agent",
    "idlePerHost": 8
  }
}"#,
            config.to_json_pretty().unwrap()
        );
    }

    #[test]
    fn tolerant_load_from_disk() {
        let config = Config::from_json_str(
            r#"{
              "modBAD": { "foo": "bar" },
              "testPool": { "idlePerHost": 2, "extra": "foo" }
            }"#,
        )
        .unwrap();

        assert_eq!(
            PoolModConfig {
                test_pool: PoolConfig {
                    idle_per_host: 2,
                    agent: "test-agent".into(),
                },
            },
            config.get_module_config::<PoolModConfig>().unwrap(),
        );

        // unset mods get the default
        assert_eq!(
            OtherModConfig::default(),
            config.get_module_config::<OtherModConfig>().unwrap(),
        );
    }

    #[test]
    fn later_set_overrides_defaults() {
        let config = Config::default();
        config.set_module_config(&PoolModConfig::default()).unwrap();
        config
            .set_module_config(&PoolModConfig {
                test_pool: PoolConfig {
                    idle_per_host: 1,
                    ..Default::default()
                },
            })
            .unwrap();

        assert_eq!(
            1,
            config
                .get_module_config::<PoolModConfig>()
                .unwrap()
                .test_pool
                .idle_per_host
        );
    }

    #[test]
    fn invalid_json_is_an_error() {
        assert!(Config::from_json_str("[1, 2]").is_err());
        assert!(Config::from_json_str("{").is_err());
    }
}
