//! Verification helpers for testing VLAN reconciliation
//!
//! Provides assertion helpers over the call log and the state history of a
//! [`crate::FakeSwitch`].

use thiserror::Error;

use prosafe_common::{PortId, SwitchState, VlanId};

use crate::fake_switch::DriverCall;

/// Verification error types
#[derive(Error, Debug)]
pub enum VerificationError {
    #[error("Expected call '{expected}' not found in {actual}")]
    CallNotFound { expected: String, actual: String },

    #[error("Unexpected call '{call}'")]
    UnexpectedCall { call: String },

    #[error("Expected '{first}' before '{then}', calls were {actual}")]
    OrderViolation {
        first: String,
        then: String,
        actual: String,
    },

    #[error("Port {port} lost VLAN {vid} at step {step}")]
    ConnectivityLost { port: PortId, vid: VlanId, step: usize },

    #[error("Port {port} has PVID {vid} but is not a member of it at step {step}")]
    PvidNotMember { port: PortId, vid: VlanId, step: usize },
}

/// Result type for verification operations
pub type VerifyResult<T> = Result<T, VerificationError>;

/// Call log verifier
pub struct CallVerifier {
    calls: Vec<DriverCall>,
}

impl CallVerifier {
    /// Create a new call verifier
    pub fn new(calls: Vec<DriverCall>) -> Self {
        Self { calls }
    }

    fn listing(&self) -> String {
        let calls: Vec<String> = self.calls.iter().map(|c| c.to_string()).collect();
        format!("[{}]", calls.join(", "))
    }

    fn position(&self, call: &DriverCall) -> Option<usize> {
        self.calls.iter().position(|c| c == call)
    }

    /// Verify that `call` was made
    pub fn assert_called(&self, call: &DriverCall) -> VerifyResult<()> {
        match self.position(call) {
            Some(_) => Ok(()),
            None => Err(VerificationError::CallNotFound {
                expected: call.to_string(),
                actual: self.listing(),
            }),
        }
    }

    /// Verify that no call matches `predicate`
    pub fn assert_none<F>(&self, predicate: F) -> VerifyResult<()>
    where
        F: Fn(&DriverCall) -> bool,
    {
        match self.calls.iter().find(|c| predicate(c)) {
            Some(call) => Err(VerificationError::UnexpectedCall {
                call: call.to_string(),
            }),
            None => Ok(()),
        }
    }

    /// Verify that nothing changed VLAN configuration
    pub fn assert_no_mutations(&self) -> VerifyResult<()> {
        self.assert_none(DriverCall::is_mutation)
    }

    /// Verify that `first` was made, and made before `then`
    pub fn assert_before(&self, first: &DriverCall, then: &DriverCall) -> VerifyResult<()> {
        let violation = || VerificationError::OrderViolation {
            first: first.to_string(),
            then: then.to_string(),
            actual: self.listing(),
        };
        let a = self.position(first).ok_or_else(violation)?;
        let b = self.position(then).ok_or_else(violation)?;
        if a < b {
            Ok(())
        } else {
            Err(violation())
        }
    }

    /// Verify that the last call is a logout
    pub fn assert_ends_logged_out(&self) -> VerifyResult<()> {
        match self.calls.last() {
            Some(DriverCall::Logout) => Ok(()),
            _ => Err(VerificationError::CallNotFound {
                expected: "logout (last)".to_string(),
                actual: self.listing(),
            }),
        }
    }

    /// Mutating calls, in order
    pub fn mutations(&self) -> Vec<DriverCall> {
        self.calls
            .iter()
            .filter(|c| c.is_mutation())
            .cloned()
            .collect()
    }
}

/// Verify that each `(port, vid)` keeps `vid` defined and the port a member
/// of it in every recorded state.
pub fn assert_connectivity(
    history: &[SwitchState],
    kept: &[(PortId, VlanId)],
) -> VerifyResult<()> {
    for (step, state) in history.iter().enumerate() {
        for (port, vid) in kept {
            if !state.membership_of(*vid, *port).is_member() {
                return Err(VerificationError::ConnectivityLost {
                    port: *port,
                    vid: *vid,
                    step,
                });
            }
        }
    }
    Ok(())
}

/// Verify that in every recorded state each port is a member of its PVID VLAN.
pub fn assert_pvids_consistent(history: &[SwitchState]) -> VerifyResult<()> {
    for (step, state) in history.iter().enumerate() {
        for (port, vid) in &state.pvids {
            if !state.membership_of(*vid, *port).is_member() {
                return Err(VerificationError::PvidNotMember {
                    port: *port,
                    vid: *vid,
                    step,
                });
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures::{factory_default, state};

    #[test]
    fn test_assert_before() {
        let v = CallVerifier::new(vec![
            DriverCall::Login,
            DriverCall::AddVlan(10),
            DriverCall::SetPortsPvid(vec![2], 10),
            DriverCall::Logout,
        ]);
        assert!(v
            .assert_before(&DriverCall::AddVlan(10), &DriverCall::SetPortsPvid(vec![2], 10))
            .is_ok());
        assert!(v
            .assert_before(&DriverCall::SetPortsPvid(vec![2], 10), &DriverCall::AddVlan(10))
            .is_err());
        assert!(v.assert_before(&DriverCall::Backup, &DriverCall::Logout).is_err());
        assert!(v.assert_ends_logged_out().is_ok());
        assert_eq!(v.mutations().len(), 2);
    }

    #[test]
    fn test_assert_no_mutations() {
        let v = CallVerifier::new(vec![DriverCall::Login, DriverCall::FetchPvids]);
        assert!(v.assert_no_mutations().is_ok());

        let v = CallVerifier::new(vec![DriverCall::DeleteVlans(vec![5])]);
        assert!(matches!(
            v.assert_no_mutations(),
            Err(VerificationError::UnexpectedCall { .. })
        ));
    }

    #[test]
    fn test_connectivity_checks() {
        let before = factory_default(4);
        let after = state(&[(1, "1:U 2:U")], &[(1, 1), (2, 1), (3, 1), (4, 1)]);
        let history = vec![before, after];

        assert!(assert_connectivity(&history, &[(1, 1), (2, 1)]).is_ok());
        assert!(matches!(
            assert_connectivity(&history, &[(3, 1)]),
            Err(VerificationError::ConnectivityLost { port: 3, step: 1, .. })
        ));
        assert!(assert_pvids_consistent(&history).is_err());
    }
}
