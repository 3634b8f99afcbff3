//! Verification helpers for testing the router reconciler
//!
//! Provides assertion helpers to verify router state and command execution

use routerd::{NetworkLayer, RouterMgr, UnitState};
use thiserror::Error;

use crate::fixtures::TestScenario;

/// Verification error types
#[derive(Error, Debug)]
pub enum VerificationError {
    #[error("Expected interface '{name}' not found")]
    InterfaceNotFound { name: String },

    #[error("Interface '{name}' should not exist")]
    UnexpectedInterface { name: String },

    #[error("Address mismatch for '{name}': expected '{expected}', got '{actual}'")]
    AddressMismatch {
        name: String,
        expected: String,
        actual: String,
    },

    #[error("Expected route '{route}' not installed")]
    RouteNotFound { route: String },

    #[error("Route '{route}' should not be installed")]
    UnexpectedRoute { route: String },

    #[error("Unit state mismatch for '{name}': expected {expected}, got {actual}")]
    StateMismatch {
        name: String,
        expected: &'static str,
        actual: &'static str,
    },

    #[error("Expected command matching '{expected}', captured {captured:?}")]
    CommandNotFound {
        expected: String,
        captured: Vec<String>,
    },

    #[error("Command matching '{pattern}' should not have run")]
    UnexpectedCommand { pattern: String },

    #[error("Expected {expected} {what}, found {actual}")]
    CountMismatch {
        what: &'static str,
        expected: usize,
        actual: usize,
    },
}

/// Result type for verification operations
pub type VerifyResult<T> = Result<T, VerificationError>;

/// Router state verification helper
pub struct RouterVerifier<'a, N: NetworkLayer> {
    mgr: &'a RouterMgr<N>,
}

impl<'a, N: NetworkLayer> RouterVerifier<'a, N> {
    /// Create a new router verifier
    pub fn new(mgr: &'a RouterMgr<N>) -> Self {
        Self { mgr }
    }

    fn installed(&self) -> Vec<String> {
        self.mgr
            .installed_routes()
            .iter()
            .map(ToString::to_string)
            .collect()
    }

    /// Verify that an interface exists with the given address
    pub fn assert_interface(&self, name: &str, address: &str) -> VerifyResult<()> {
        let found = self
            .mgr
            .interfaces()
            .into_iter()
            .find(|(n, _)| n == name)
            .map(|(_, addr)| addr.to_string());

        match found {
            None => Err(VerificationError::InterfaceNotFound {
                name: name.to_string(),
            }),
            Some(actual) if actual == address => Ok(()),
            Some(actual) => Err(VerificationError::AddressMismatch {
                name: name.to_string(),
                expected: address.to_string(),
                actual,
            }),
        }
    }

    /// Verify that an interface does not exist
    pub fn assert_no_interface(&self, name: &str) -> VerifyResult<()> {
        if self.mgr.interfaces().iter().any(|(n, _)| n == name) {
            return Err(VerificationError::UnexpectedInterface {
                name: name.to_string(),
            });
        }
        Ok(())
    }

    /// Verify that `network via gateway` is installed
    pub fn assert_route(&self, network: &str, gateway: &str) -> VerifyResult<()> {
        let route = format!("{} via {}", network, gateway);
        if self.installed().contains(&route) {
            Ok(())
        } else {
            Err(VerificationError::RouteNotFound { route })
        }
    }

    /// Verify that `network via gateway` is not installed
    pub fn assert_no_route(&self, network: &str, gateway: &str) -> VerifyResult<()> {
        let route = format!("{} via {}", network, gateway);
        if self.installed().contains(&route) {
            Err(VerificationError::UnexpectedRoute { route })
        } else {
            Ok(())
        }
    }

    /// Verify the number of routes attributed to a unit
    pub fn assert_route_count(&self, name: &str, expected: usize) -> VerifyResult<()> {
        let actual = self.mgr.routes_for(name).len();
        if actual != expected {
            return Err(VerificationError::CountMismatch {
                what: "routes",
                expected,
                actual,
            });
        }
        Ok(())
    }

    /// Verify the number of interfaces on the router
    pub fn assert_interface_count(&self, expected: usize) -> VerifyResult<()> {
        let actual = self.mgr.interfaces().len();
        if actual != expected {
            return Err(VerificationError::CountMismatch {
                what: "interfaces",
                expected,
                actual,
            });
        }
        Ok(())
    }

    /// Verify a unit's lifecycle state
    pub fn assert_state(&self, name: &str, expected: UnitState) -> VerifyResult<()> {
        let actual = self.mgr.unit_state(name);
        if actual != expected {
            return Err(VerificationError::StateMismatch {
                name: name.to_string(),
                expected: expected.as_str(),
                actual: actual.as_str(),
            });
        }
        Ok(())
    }

    /// Verify every expectation recorded on a scenario
    pub fn assert_scenario(&self, scenario: &TestScenario) -> VerifyResult<()> {
        for (name, address) in &scenario.expected_interfaces {
            self.assert_interface(name, address)?;
        }
        let installed = self.installed();
        for route in &scenario.expected_routes {
            if !installed.contains(route) {
                return Err(VerificationError::RouteNotFound {
                    route: route.clone(),
                });
            }
        }
        Ok(())
    }
}

/// Command execution verifier (for mock mode)
pub struct CommandVerifier {
    captured_commands: Vec<String>,
}

impl CommandVerifier {
    /// Create a new command verifier
    pub fn new(captured_commands: Vec<String>) -> Self {
        Self { captured_commands }
    }

    /// Verify that a specific command was executed
    pub fn assert_command_executed(&self, expected: &str) -> VerifyResult<()> {
        if self
            .captured_commands
            .iter()
            .any(|cmd| cmd.contains(expected))
        {
            Ok(())
        } else {
            Err(VerificationError::CommandNotFound {
                expected: expected.to_string(),
                captured: self.captured_commands.clone(),
            })
        }
    }

    /// Verify that a command was NOT executed
    pub fn assert_command_not_executed(&self, pattern: &str) -> VerifyResult<()> {
        if self
            .captured_commands
            .iter()
            .any(|cmd| cmd.contains(pattern))
        {
            Err(VerificationError::UnexpectedCommand {
                pattern: pattern.to_string(),
            })
        } else {
            Ok(())
        }
    }

    /// Verify how many commands matched a pattern
    pub fn assert_command_count(&self, pattern: &str, expected: usize) -> VerifyResult<()> {
        let actual = self
            .captured_commands
            .iter()
            .filter(|cmd| cmd.contains(pattern))
            .count();
        if actual != expected {
            return Err(VerificationError::CountMismatch {
                what: "matching commands",
                expected,
                actual,
            });
        }
        Ok(())
    }

    /// Verify that `first` ran before `second`
    pub fn assert_order(&self, first: &str, second: &str) -> VerifyResult<()> {
        let position = |pattern: &str| {
            self.captured_commands
                .iter()
                .position(|cmd| cmd.contains(pattern))
                .ok_or_else(|| VerificationError::CommandNotFound {
                    expected: pattern.to_string(),
                    captured: self.captured_commands.clone(),
                })
        };
        let (a, b) = (position(first)?, position(second)?);
        if a < b {
            Ok(())
        } else {
            Err(VerificationError::UnexpectedCommand {
                pattern: format!("{} before {}", second, first),
            })
        }
    }

    /// Get all captured commands
    pub fn captured_commands(&self) -> &[String] {
        &self.captured_commands
    }
}
