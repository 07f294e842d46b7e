use crate::{CoreError, Result};
use serde::{Deserialize, Serialize};

/// The only API type a hosted library may expose.
pub const REST_API_TYPE: &str = "REST";

/// Static manifest entry describing one hostable library.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LibraryRegistration {
    pub name: String,
    pub registry: String,
    pub version: i32,
    pub image: String,
    pub exec_cmd: Vec<String>,
    pub log_dir: String,
    pub port: i32,
    pub servo_port: i32,
    pub ping: String,
    pub api_type: String,
    pub owners: Vec<String>,
    pub description: String,
}

impl LibraryRegistration {
    /// Check the entry can back a running instance. Every problem found is
    /// listed in the error, not just the first.
    pub fn validate(&self) -> Result<()> {
        let mut problems = Vec::new();

        if self.name.trim().is_empty() {
            problems.push("missing name".to_string());
        }
        if self.api_type != REST_API_TYPE {
            problems.push(format!(
                "api_type must be \"{REST_API_TYPE}\", got \"{}\"",
                self.api_type
            ));
        }
        if self.image.trim().is_empty() {
            problems.push("missing image".to_string());
        }
        if self.owners.is_empty() {
            problems.push("missing owners".to_string());
        }
        if self.description.trim().is_empty() {
            problems.push("missing description".to_string());
        }
        // Zero means "none"; anything else must be a real TCP port.
        for (field, value) in [("port", self.port), ("servo_port", self.servo_port)] {
            if value != 0 && u16::try_from(value).map_or(true, |port| port == 0) {
                problems.push(format!("{field} {value} is outside 1..=65535"));
            }
        }

        if problems.is_empty() {
            Ok(())
        } else {
            let subject = if self.name.is_empty() {
                "library registration".to_string()
            } else {
                format!("library registration '{}'", self.name)
            };
            Err(CoreError::Validation(format!(
                "{subject}: {}",
                problems.join("; ")
            )))
        }
    }

    pub fn requires_servo(&self) -> bool {
        self.servo_port > 0
    }

    pub fn exposes_port(&self) -> bool {
        self.port > 0
    }

    /// Container port the library serves on, if it declares a valid one.
    pub fn container_port(&self) -> Option<u16> {
        u16::try_from(self.port).ok().filter(|port| *port > 0)
    }

    /// Parse a JSON manifest (array of registrations) without validating it.
    pub fn parse_manifest(json: &str) -> Result<Vec<Self>> {
        serde_json::from_str(json).map_err(|e| {
            CoreError::SerializationError(format!("invalid library manifest: {e}"))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn valid_registration() -> LibraryRegistration {
        LibraryRegistration {
            name: "foo".to_string(),
            image: "foo-lib:1".to_string(),
            api_type: "REST".to_string(),
            owners: vec!["owner@example.com".to_string()],
            description: "a test library".to_string(),
            ..Default::default()
        }
    }

    #[test]
    fn test_valid_registration_passes() {
        assert!(valid_registration().validate().is_ok());
    }

    #[test]
    fn test_validation_enumerates_all_problems() {
        let reg = LibraryRegistration {
            api_type: "REST".to_string(),
            ..Default::default()
        };

        let err = reg.validate().unwrap_err();
        assert!(matches!(err, CoreError::Validation(_)));
        let text = err.to_string();
        assert!(text.contains("missing name"));
        assert!(text.contains("missing image"));
        assert!(text.contains("missing owners"));
        assert!(text.contains("missing description"));
        assert!(!text.contains("api_type"));
    }

    #[test]
    fn test_api_type_must_be_rest() {
        let reg = LibraryRegistration {
            api_type: "GRPC".to_string(),
            ..valid_registration()
        };
        let text = reg.validate().unwrap_err().to_string();
        assert!(text.contains("api_type"));
        assert!(text.contains("GRPC"));
        assert!(text.contains("'foo'"));
    }

    #[test]
    fn test_api_type_is_case_sensitive() {
        let reg = LibraryRegistration {
            api_type: "rest".to_string(),
            ..valid_registration()
        };
        assert!(reg.validate().is_err());
    }

    #[test]
    fn test_ports_must_fit_tcp_range() {
        let reg = LibraryRegistration {
            port: 70000,
            servo_port: -1,
            ..valid_registration()
        };
        let text = reg.validate().unwrap_err().to_string();
        assert!(text.contains("port 70000 is outside 1..=65535"));
        assert!(text.contains("servo_port -1 is outside 1..=65535"));
        assert_eq!(reg.container_port(), None);

        let reg = LibraryRegistration {
            port: 65535,
            servo_port: 9999,
            ..valid_registration()
        };
        assert!(reg.validate().is_ok());
        assert_eq!(reg.container_port(), Some(65535));
    }

    #[test]
    fn test_parse_manifest() {
        let json = r#"[
            {
                "name": "foo",
                "registry": "gcr.io/lab",
                "version": 2,
                "image": "foo-lib:2",
                "exec_cmd": ["/bin/foo", "--serve"],
                "log_dir": "/var/log/foo",
                "port": 8080,
                "servo_port": 9999,
                "ping": "curl -sf localhost:8080/ping",
                "api_type": "REST",
                "owners": ["a@example.com"],
                "description": "foo"
            },
            { "name": "bar" }
        ]"#;

        let regs = LibraryRegistration::parse_manifest(json).unwrap();
        assert_eq!(regs.len(), 2);
        assert_eq!(regs[0].version, 2);
        assert_eq!(regs[0].exec_cmd, vec!["/bin/foo", "--serve"]);
        assert!(regs[0].requires_servo());
        assert!(regs[0].exposes_port());
        assert!(regs[0].validate().is_ok());
        assert!(!regs[1].exposes_port());
        assert!(regs[1].validate().is_err());
    }

    #[test]
    fn test_parse_manifest_rejects_non_array() {
        let err = LibraryRegistration::parse_manifest(r#"{"name": "foo"}"#).unwrap_err();
        assert!(matches!(err, CoreError::SerializationError(_)));
    }
}
