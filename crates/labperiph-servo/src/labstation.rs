//! Bookkeeping of the servos attached to each labstation.
//!
//! A labstation runs one servod per servo; every servo is identified by its
//! serial and served on its own port. Merging a servo that disagrees with
//! what the labstation already hosts is a conflict.

use labperiph_core::{CoreError, Result};
use std::collections::{BTreeMap, HashMap};
use tracing::debug;

#[derive(Debug, Default, Clone)]
pub struct LabstationServos {
    // labstation host -> serial -> servod port
    hosts: HashMap<String, BTreeMap<String, i32>>,
}

impl LabstationServos {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record that `serial` is served on `port` by `host`.
    ///
    /// Re-adding an identical pair is a no-op.
    pub fn add(&mut self, host: &str, serial: &str, port: i32) -> Result<()> {
        if host.is_empty() || serial.is_empty() {
            return Err(CoreError::Validation(
                "labstation host and servo serial are required".to_string(),
            ));
        }
        if port <= 0 {
            return Err(CoreError::Validation(format!(
                "servo {serial} has invalid port {port}"
            )));
        }

        let servos = self.hosts.entry(host.to_string()).or_default();

        if let Some(&existing) = servos.get(serial) {
            if existing == port {
                return Ok(());
            }
            return Err(CoreError::Conflict(format!(
                "labstation {host} already hosts servo {serial} on port {existing}, not {port}"
            )));
        }

        if let Some((owner, _)) = servos.iter().find(|(_, &p)| p == port) {
            return Err(CoreError::Conflict(format!(
                "labstation {host} port {port} is already used by servo {owner}"
            )));
        }

        servos.insert(serial.to_string(), port);
        debug!(host = %host, serial = %serial, port = port, "Recorded labstation servo");
        Ok(())
    }

    /// Merge every servo from `other` into `self`. On a conflict nothing is
    /// recorded.
    pub fn merge(&mut self, other: &LabstationServos) -> Result<()> {
        let mut merged = self.clone();
        for (host, servos) in &other.hosts {
            for (serial, port) in servos {
                merged.add(host, serial, *port)?;
            }
        }
        *self = merged;
        Ok(())
    }

    pub fn port_of(&self, host: &str, serial: &str) -> Option<i32> {
        self.hosts.get(host)?.get(serial).copied()
    }

    /// Servos on `host` as `(serial, port)` pairs, ordered by serial.
    pub fn servos(&self, host: &str) -> Vec<(String, i32)> {
        self.hosts
            .get(host)
            .map(|servos| servos.iter().map(|(s, p)| (s.clone(), *p)).collect())
            .unwrap_or_default()
    }

    pub fn remove(&mut self, host: &str, serial: &str) -> Option<i32> {
        let servos = self.hosts.get_mut(host)?;
        let port = servos.remove(serial);
        if servos.is_empty() {
            self.hosts.remove(host);
        }
        port
    }
}
