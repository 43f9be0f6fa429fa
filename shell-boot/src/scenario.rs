//! Bootstrap scenarios
//!
//! A scenario describes a simulated application: its wait policy, the local
//! and remote modules with their latencies and failures, the mock server and
//! the data layer. [`Scenario::validate`] turns it into a [`ScenarioPlan`]
//! which builds the session and the module registrations.

use async_trait::async_trait;
use libshellboot::data::{BootstrapDataSource, DataFetchError};
use libshellboot::msw::MockServer;
use libshellboot::registry::registration::{
    register_fn, DeferredRegistration, ModuleRegistration, RegisterFn, RemoteDefinition,
    RemoteLoader,
};
use libshellboot::runtime::{NavigationItem, Route, ShellRuntime};
use libshellboot::{BootstrapConfig, Config, Result, ShellbootError};
use rand::Rng;
use serde::Deserialize;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Scenario {
    #[serde(default)]
    pub bootstrap: BootstrapSection,

    #[serde(default)]
    pub local: Vec<ModuleSpec>,

    #[serde(default)]
    pub remote: Vec<ModuleSpec>,

    #[serde(default)]
    pub msw: MswSection,

    #[serde(default)]
    pub data: DataSection,
}

/// Wait policy; unset flags fall back to the configuration file
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BootstrapSection {
    pub wait_for_msw: Option<bool>,
    pub wait_for_public_data: Option<bool>,
    pub wait_for_protected_data: Option<bool>,

    #[serde(default)]
    pub active_route: ActiveRoute,

    /// Random extra latency added to every module, e.g. "10ms"
    pub jitter: Option<String>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ActiveRoute {
    #[default]
    Public,
    Protected,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ModuleSpec {
    pub name: String,

    /// Remote modules only
    pub remote_name: Option<String>,

    /// Registration latency, e.g. "25ms"; also used by the deferred registration
    pub delay: Option<String>,

    #[serde(default)]
    pub fails: bool,

    /// Remote modules only: the remote entry point cannot be loaded
    #[serde(default)]
    pub load_fails: bool,

    /// The module's route requires an authenticated user
    #[serde(default)]
    pub protected: bool,

    #[serde(default)]
    pub deferred: bool,

    #[serde(default)]
    pub deferred_fails: bool,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MswSection {
    pub delay: Option<String>,

    #[serde(default)]
    pub fails: bool,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DataSection {
    pub public_delay: Option<String>,
    pub protected_delay: Option<String>,

    /// The protected data fetch is refused
    #[serde(default)]
    pub unauthorized: bool,
}

impl Scenario {
    /// Read and parse a scenario file
    ///
    /// Unreadable and malformed files are both invalid input.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            ShellbootError::InvalidInput(format!(
                "Cannot read scenario {}: {}",
                path.display(),
                e
            ))
        })?;
        Self::parse(&content).map_err(|e| match e {
            ShellbootError::InvalidInput(message) => {
                ShellbootError::InvalidInput(format!("{}: {}", path.display(), message))
            }
            other => other,
        })
    }

    pub fn parse(content: &str) -> Result<Self> {
        toml::from_str(content)
            .map_err(|e| ShellbootError::InvalidInput(format!("Invalid scenario: {}", e)))
    }

    /// Check every module and resolve durations
    pub fn validate(&self) -> Result<ScenarioPlan> {
        let local = self
            .local
            .iter()
            .map(ModulePlan::local)
            .collect::<Result<Vec<_>>>()?;
        let remote = self
            .remote
            .iter()
            .map(ModulePlan::remote)
            .collect::<Result<Vec<_>>>()?;

        let mut names: Vec<&str> = local.iter().chain(&remote).map(|m| m.name.as_str()).collect();
        names.sort_unstable();
        if let Some(pair) = names.windows(2).find(|pair| pair[0] == pair[1]) {
            return Err(ShellbootError::InvalidInput(format!(
                "Module name '{}' is used twice",
                pair[0]
            )));
        }

        Ok(ScenarioPlan {
            wait_for_msw: self.bootstrap.wait_for_msw,
            wait_for_public_data: self.bootstrap.wait_for_public_data,
            wait_for_protected_data: self.bootstrap.wait_for_protected_data,
            active_route: self.bootstrap.active_route,
            jitter: parse_delay("bootstrap.jitter", self.bootstrap.jitter.as_deref())?,
            local,
            remote,
            msw: ScenarioMockServer {
                delay: parse_delay("msw.delay", self.msw.delay.as_deref())?,
                fails: self.msw.fails,
            },
            data: ScenarioData {
                public_delay: parse_delay("data.public_delay", self.data.public_delay.as_deref())?,
                protected_delay: parse_delay(
                    "data.protected_delay",
                    self.data.protected_delay.as_deref(),
                )?,
                unauthorized: self.data.unauthorized,
            },
        })
    }
}

fn parse_delay(field: &str, value: Option<&str>) -> Result<Duration> {
    match value {
        None => Ok(Duration::ZERO),
        Some(value) => humantime::parse_duration(value).map_err(|e| {
            ShellbootError::InvalidInput(format!("Invalid duration for {}: '{}' ({})", field, value, e))
        }),
    }
}

/// A validated scenario
#[derive(Debug, Clone)]
pub struct ScenarioPlan {
    wait_for_msw: Option<bool>,
    wait_for_public_data: Option<bool>,
    wait_for_protected_data: Option<bool>,
    pub active_route: ActiveRoute,
    pub jitter: Duration,
    pub local: Vec<ModulePlan>,
    pub remote: Vec<ModulePlan>,
    pub msw: ScenarioMockServer,
    pub data: ScenarioData,
}

impl ScenarioPlan {
    /// Scenario flags over the configuration file's
    pub fn bootstrap_config(&self, config: &Config) -> BootstrapConfig {
        let defaults = &config.bootstrap;
        BootstrapConfig {
            wait_for_msw: self.wait_for_msw.unwrap_or(defaults.wait_for_msw),
            wait_for_public_data: self
                .wait_for_public_data
                .unwrap_or(defaults.wait_for_public_data),
            wait_for_protected_data: self
                .wait_for_protected_data
                .unwrap_or(defaults.wait_for_protected_data),
            event_capacity: defaults.event_capacity,
        }
    }

    pub fn local_modules<R: Rng>(&self, rng: &mut R) -> Vec<ModuleRegistration<(), ()>> {
        self.local
            .iter()
            .map(|module| module.with_jitter(self.jitter, rng).into_registration())
            .collect()
    }

    pub fn remote_modules<R: Rng>(&self, rng: &mut R) -> Vec<ModuleRegistration<(), ()>> {
        self.remote
            .iter()
            .map(|module| module.with_jitter(self.jitter, rng).into_registration())
            .collect()
    }
}

#[derive(Debug, Clone)]
pub struct ModulePlan {
    pub name: String,
    pub remote_name: Option<String>,
    pub delay: Duration,
    pub fails: bool,
    pub load_fails: bool,
    pub protected: bool,
    pub deferred: bool,
    pub deferred_fails: bool,
}

impl ModulePlan {
    fn local(spec: &ModuleSpec) -> Result<Self> {
        if spec.remote_name.is_some() || spec.load_fails {
            return Err(ShellbootError::InvalidInput(format!(
                "Local module '{}' cannot set remote_name or load_fails",
                spec.name
            )));
        }
        Self::from_spec(spec, None)
    }

    fn remote(spec: &ModuleSpec) -> Result<Self> {
        let remote_name = spec
            .remote_name
            .clone()
            .filter(|name| !name.trim().is_empty())
            .ok_or_else(|| {
                ShellbootError::InvalidInput(format!(
                    "Remote module '{}' needs a remote_name",
                    spec.name
                ))
            })?;
        Self::from_spec(spec, Some(remote_name))
    }

    fn from_spec(spec: &ModuleSpec, remote_name: Option<String>) -> Result<Self> {
        if spec.name.trim().is_empty() {
            return Err(ShellbootError::InvalidInput(
                "Module name cannot be empty".to_string(),
            ));
        }
        if spec.deferred_fails && !spec.deferred {
            return Err(ShellbootError::InvalidInput(format!(
                "Module '{}' sets deferred_fails without deferred",
                spec.name
            )));
        }

        Ok(Self {
            name: spec.name.clone(),
            remote_name,
            delay: parse_delay(&format!("{}.delay", spec.name), spec.delay.as_deref())?,
            fails: spec.fails,
            load_fails: spec.load_fails,
            protected: spec.protected,
            deferred: spec.deferred,
            deferred_fails: spec.deferred_fails,
        })
    }

    fn with_jitter<R: Rng>(&self, jitter: Duration, rng: &mut R) -> Self {
        let mut module = self.clone();
        let jitter_ms = u64::try_from(jitter.as_millis()).unwrap_or(u64::MAX);
        if jitter_ms > 0 {
            module.delay += Duration::from_millis(rng.gen_range(0..=jitter_ms));
        }
        module
    }

    fn path(&self) -> String {
        match &self.remote_name {
            Some(remote_name) => format!("/{}/{}", remote_name, self.name),
            None => format!("/{}", self.name),
        }
    }

    fn into_registration(self) -> ModuleRegistration<(), ()> {
        match self.remote_name.clone() {
            None => {
                let name = self.name.clone();
                ModuleRegistration::local(Some(&name), move |runtime: ShellRuntime, _context| {
                    self.register(runtime)
                })
            }
            Some(remote_name) => {
                let definition = RemoteDefinition {
                    name: remote_name,
                    url: Some(format!("scenario://{}", self.path())),
                };
                ModuleRegistration::remote(definition, Arc::new(ScenarioRemoteLoader(self)))
            }
        }
    }

    async fn register(self, runtime: ShellRuntime) -> anyhow::Result<Option<DeferredRegistration<()>>> {
        tokio::time::sleep(self.delay).await;
        if self.fails {
            anyhow::bail!("module {} failed during registration", self.name);
        }

        let path = self.path();
        runtime.register_route(if self.protected {
            Route::protected(path.clone())
        } else {
            Route::public(path.clone())
        });
        runtime.register_navigation_item(NavigationItem {
            label: self.name.clone(),
            to: path,
            section: self.remote_name.clone(),
        });

        if !self.deferred {
            return Ok(None);
        }
        let module = Arc::new(self);
        Ok(Some(DeferredRegistration::new(move |_data: (), _operation| {
            let module = Arc::clone(&module);
            async move {
                tokio::time::sleep(module.delay).await;
                if module.deferred_fails {
                    anyhow::bail!("module {} failed during deferred registration", module.name);
                }
                Ok(())
            }
        })))
    }
}

/// Resolves a scenario's remote module, or fails like an unreachable remote
struct ScenarioRemoteLoader(ModulePlan);

#[async_trait]
impl RemoteLoader<(), ()> for ScenarioRemoteLoader {
    async fn load(&self, remote: &RemoteDefinition) -> anyhow::Result<RegisterFn<(), ()>> {
        if self.0.load_fails {
            anyhow::bail!(
                "remote entry point {} is unreachable",
                remote.url.as_deref().unwrap_or(&remote.name)
            );
        }
        let module = self.0.clone();
        Ok(register_fn(move |runtime: ShellRuntime, _context: Option<()>| {
            module.register(runtime)
        }))
    }
}

#[derive(Debug, Clone)]
pub struct ScenarioMockServer {
    pub delay: Duration,
    pub fails: bool,
}

#[async_trait]
impl MockServer for ScenarioMockServer {
    async fn start(&self) -> anyhow::Result<()> {
        tokio::time::sleep(self.delay).await;
        if self.fails {
            anyhow::bail!("mock server could not bind its handlers");
        }
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub struct ScenarioData {
    pub public_delay: Duration,
    pub protected_delay: Duration,
    pub unauthorized: bool,
}

#[async_trait]
impl BootstrapDataSource<()> for ScenarioData {
    async fn fetch_public_data(&self) -> std::result::Result<(), DataFetchError> {
        tokio::time::sleep(self.public_delay).await;
        Ok(())
    }

    async fn fetch_protected_data(&self) -> std::result::Result<(), DataFetchError> {
        tokio::time::sleep(self.protected_delay).await;
        if self.unauthorized {
            return Err(DataFetchError::Unauthorized);
        }
        Ok(())
    }

    fn deferred_registration_data(&self) {}
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    const FULL: &str = r#"
[bootstrap]
wait_for_msw = true
wait_for_protected_data = true
active_route = "protected"
jitter = "5ms"

[[local]]
name = "home"
delay = "10ms"
deferred = true

[[remote]]
name = "invoices"
remote_name = "billing"
delay = "1s 500ms"
load_fails = true

[msw]
delay = "20ms"

[data]
protected_delay = "15ms"
unauthorized = true
"#;

    #[test]
    fn test_parse_and_validate_full_scenario() {
        let plan = Scenario::parse(FULL).unwrap().validate().unwrap();

        assert_eq!(plan.active_route, ActiveRoute::Protected);
        assert_eq!(plan.jitter, Duration::from_millis(5));
        assert_eq!(plan.local[0].delay, Duration::from_millis(10));
        assert_eq!(plan.remote[0].delay, Duration::from_millis(1500));
        assert_eq!(plan.remote[0].remote_name.as_deref(), Some("billing"));
        assert!(plan.data.unauthorized);
        assert_eq!(plan.msw.delay, Duration::from_millis(20));
    }

    #[test]
    fn test_unset_flags_fall_back_to_config() {
        let plan = Scenario::parse(FULL).unwrap().validate().unwrap();
        let mut config = Config::default();
        config.bootstrap.wait_for_public_data = true;
        config.bootstrap.event_capacity = 8;

        let bootstrap = plan.bootstrap_config(&config);

        assert!(bootstrap.wait_for_msw);
        assert!(bootstrap.wait_for_public_data);
        assert!(bootstrap.wait_for_protected_data);
        assert_eq!(bootstrap.event_capacity, 8);
    }

    #[test]
    fn test_invalid_scenarios() {
        let cases = [
            "[[remote]]\nname = \"a\"\n",
            "[[local]]\nname = \"a\"\nremote_name = \"r\"\n",
            "[[local]]\nname = \"a\"\ndelay = \"soon\"\n",
            "[[local]]\nname = \"a\"\n[[local]]\nname = \"a\"\n",
            "[[local]]\nname = \"a\"\ndeferred_fails = true\n",
            "[[local]]\nname = \"\"\n",
        ];

        for case in cases {
            let result = Scenario::parse(case).and_then(|scenario| scenario.validate());
            assert!(
                matches!(result, Err(ShellbootError::InvalidInput(_))),
                "accepted: {}",
                case
            );
        }
    }

    #[test]
    fn test_unknown_field_is_rejected() {
        let result = Scenario::parse("[bootstrap]\nwait_for_everything = true\n");

        assert!(matches!(result, Err(ShellbootError::InvalidInput(_))));
    }

    #[test]
    fn test_jitter_only_adds_latency() {
        let plan = Scenario::parse(FULL).unwrap().validate().unwrap();
        let mut rng = StdRng::seed_from_u64(7);

        for _ in 0..20 {
            let module = plan.local[0].with_jitter(plan.jitter, &mut rng);
            assert!(module.delay >= Duration::from_millis(10));
            assert!(module.delay <= Duration::from_millis(15));
        }
    }

    #[tokio::test]
    async fn test_registration_adds_routes_and_navigation() {
        let mut plan = Scenario::parse(FULL).unwrap().validate().unwrap().local.remove(0);
        plan.delay = Duration::ZERO;
        plan.protected = true;
        let runtime = ShellRuntime::new();

        let deferred = plan.register(runtime.clone()).await.unwrap();

        assert!(deferred.is_some());
        assert_eq!(
            runtime.route_visibility("/home"),
            Some(libshellboot::RouteVisibility::Protected)
        );
        assert_eq!(runtime.navigation_items_in(None).len(), 1);
    }
}
