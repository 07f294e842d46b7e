//! In-memory container runtime for hosting tests.

use async_trait::async_trait;
use labperiph_core::{ContainerSpec, CoreError, ExecutionResult, Result};
use labperiph_runtime::{ContainerRuntime, LogFollower};
use std::collections::{HashMap, HashSet};
use std::sync::Mutex;
use std::time::Duration;

#[derive(Default)]
struct FakeState {
    up: HashSet<String>,
    specs: HashMap<String, ContainerSpec>,
    started: Vec<String>,
    removed: Vec<String>,
    pings: usize,
    next_port: u16,
}

#[derive(Default)]
pub struct FakeRuntime {
    state: Mutex<FakeState>,
    /// Ping commands exit non-zero while set.
    pub ping_fails: bool,
    /// `docker run` fails while set.
    pub run_fails: bool,
    /// `docker rm` fails while set, as it does for a container that already exited.
    pub remove_fails: bool,
}

impl FakeRuntime {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing_ping() -> Self {
        Self {
            ping_fails: true,
            ..Default::default()
        }
    }

    pub fn failing_run() -> Self {
        Self {
            run_fails: true,
            ..Default::default()
        }
    }

    pub fn failing_remove() -> Self {
        Self::new().with_failing_remove()
    }

    pub fn with_failing_remove(mut self) -> Self {
        self.remove_fails = true;
        self
    }

    pub fn started(&self) -> Vec<String> {
        self.state.lock().unwrap().started.clone()
    }

    pub fn removed(&self) -> Vec<String> {
        self.state.lock().unwrap().removed.clone()
    }

    pub fn running(&self) -> usize {
        self.state.lock().unwrap().up.len()
    }

    pub fn pings(&self) -> usize {
        self.state.lock().unwrap().pings
    }

    pub fn spec(&self, name: &str) -> Option<ContainerSpec> {
        self.state.lock().unwrap().specs.get(name).cloned()
    }
}

#[async_trait]
impl ContainerRuntime for FakeRuntime {
    async fn pull_image(&self, _spec: &ContainerSpec) -> Result<()> {
        Ok(())
    }

    async fn run(&self, spec: &ContainerSpec, _timeout: Duration) -> Result<ExecutionResult> {
        if self.run_fails {
            return Err(CoreError::TransientInfra(format!(
                "docker run {} failed with exit code 125: image not found",
                spec.name
            )));
        }
        let mut state = self.state.lock().unwrap();
        if !state.up.insert(spec.name.clone()) {
            return Err(CoreError::TransientInfra(format!(
                "container name {} is already in use",
                spec.name
            )));
        }
        state.started.push(spec.name.clone());
        state.specs.insert(spec.name.clone(), spec.clone());
        Ok(ExecutionResult::completed(0, format!("{}-id\n", spec.name), String::new()))
    }

    async fn exec(&self, name: &str, _timeout: Duration, _cmd: &[String]) -> Result<ExecutionResult> {
        let mut state = self.state.lock().unwrap();
        if !state.up.contains(name) {
            return Err(CoreError::NotRunning(format!("container {name}")));
        }
        state.pings += 1;
        if self.ping_fails {
            Ok(ExecutionResult::completed(1, String::new(), "connection refused".to_string()))
        } else {
            Ok(ExecutionResult::completed(0, "pong".to_string(), String::new()))
        }
    }

    async fn matching_host_port(&self, spec: &ContainerSpec, _container_port: u16) -> Result<u16> {
        let mut state = self.state.lock().unwrap();
        if !state.up.contains(&spec.name) {
            return Err(CoreError::NotRunning(format!("container {}", spec.name)));
        }
        state.next_port += 1;
        Ok(49152 + state.next_port)
    }

    async fn remove(&self, name: &str, force: bool) -> Result<()> {
        if self.remove_fails {
            return Err(CoreError::TransientInfra(format!(
                "docker rm {name}{} failed with exit code 1: No such container",
                if force { " --force" } else { "" }
            )));
        }
        let mut state = self.state.lock().unwrap();
        state.up.remove(name);
        state.removed.push(name.to_string());
        Ok(())
    }

    async fn container_is_up(&self, name: &str) -> Result<bool> {
        Ok(self.state.lock().unwrap().up.contains(name))
    }

    async fn login(&self, _registry: &str, _user: &str, _token: &str) -> Result<()> {
        Ok(())
    }

    async fn follow_logs(&self, name: &str) -> Result<LogFollower> {
        Ok(LogFollower::from_lines(vec![format!("{name} started")]))
    }
}
