//! VlanReconciler - reads a switch, plans and applies the VLAN changes

use tracing::{debug, error, info, instrument};

use prosafe_common::{SwitchDriver, SwitchResult, SwitchState};

use crate::plan::{PlanOp, ReconcilePlan};

/// Outcome of a reconciliation run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReconcileReport {
    /// The plan that was executed
    pub plan: ReconcilePlan,
    /// Number of operations applied
    pub applied: usize,
}

/// Drives one logged-in switch to a desired state.
///
/// Execution is strictly sequential and stops at the first failing
/// operation; the driver error is returned unchanged and nothing is retried.
pub struct VlanReconciler<'a> {
    driver: &'a mut dyn SwitchDriver,
}

impl<'a> VlanReconciler<'a> {
    /// Creates a reconciler over an authenticated driver
    pub fn new(driver: &'a mut dyn SwitchDriver) -> Self {
        Self { driver }
    }

    /// Reads the live state: membership first, then PVIDs
    pub async fn current_state(&mut self) -> SwitchResult<SwitchState> {
        let membership = self.driver.fetch_vlan_membership().await?;
        let pvids = self.driver.fetch_pvids().await?;
        Ok(SwitchState::new(membership, pvids))
    }

    /// Reads the switch and computes the plan without applying it
    #[instrument(skip(self, desired))]
    pub async fn dry_run(&mut self, desired: &SwitchState) -> SwitchResult<ReconcilePlan> {
        let current = self.current_state().await?;
        let plan = ReconcilePlan::compute(self.driver.port_count(), &current, desired)?;
        debug!(
            operations = plan.len(),
            preserved = ?plan.preserved_ports(),
            "Computed reconcile plan"
        );
        Ok(plan)
    }

    /// Reads the switch, computes the plan and applies it
    #[instrument(skip(self, desired))]
    pub async fn reconcile(&mut self, desired: &SwitchState) -> SwitchResult<ReconcileReport> {
        let plan = self.dry_run(desired).await?;
        if plan.is_empty() {
            info!("Switch already matches the desired VLAN configuration");
            return Ok(ReconcileReport { plan, applied: 0 });
        }
        if !plan.kept_vlans().is_empty() {
            info!(
                "Keeping VLANs {:?}, still the PVID of unmanaged ports",
                plan.kept_vlans()
            );
        }

        let applied = self.execute(&plan).await?;
        info!(applied, "VLAN configuration reconciled");
        Ok(ReconcileReport { plan, applied })
    }

    /// Applies `plan` in order, returning the number of operations applied
    pub async fn execute(&mut self, plan: &ReconcilePlan) -> SwitchResult<usize> {
        let total = plan.len();
        for (i, op) in plan.ops().iter().enumerate() {
            info!("[{}/{}] {}", i + 1, total, op);
            if let Err(e) = self.apply(op).await {
                error!("Step {}/{} ({}) failed: {}", i + 1, total, op, e);
                return Err(e);
            }
        }
        Ok(total)
    }

    async fn apply(&mut self, op: &PlanOp) -> SwitchResult<()> {
        match op {
            PlanOp::AddVlan(vid) => self.driver.add_vlan(*vid).await,
            PlanOp::SetMembership { vid, ports } => {
                self.driver.set_vlan_membership(*vid, ports).await
            }
            PlanOp::SetPvid { vid, ports } => self.driver.set_ports_pvid(ports, *vid).await,
            PlanOp::DeleteVlans(vids) => self.driver.delete_vlans(vids).await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use prosafe_common::{SwitchError, SwitchModel};
    use prosafe_test::{factory_default, scenarios, CallVerifier, DriverCall, FakeSwitch};

    async fn switch(state: SwitchState) -> FakeSwitch {
        let mut sw = FakeSwitch::new(SwitchModel::Gs108ev3, state);
        sw.login().await.unwrap();
        sw
    }

    #[tokio::test]
    async fn test_reads_membership_before_pvids() {
        let mut sw = switch(factory_default(8)).await;
        let state = VlanReconciler::new(&mut sw).current_state().await.unwrap();
        assert_eq!(state, factory_default(8));
        assert_eq!(
            sw.calls(),
            vec![
                DriverCall::Login,
                DriverCall::FetchVlanMembership,
                DriverCall::FetchPvids
            ]
        );
    }

    #[tokio::test]
    async fn test_dry_run_does_not_mutate() {
        let (current, desired) = scenarios::move_port_to_new_vlan();
        let mut sw = switch(current).await;
        let plan = VlanReconciler::new(&mut sw).dry_run(&desired).await.unwrap();

        assert_eq!(plan.len(), 4);
        CallVerifier::new(sw.calls()).assert_no_mutations().unwrap();
    }

    #[tokio::test]
    async fn test_reconcile_applies_plan() {
        let (current, desired) = scenarios::move_port_to_new_vlan();
        let mut sw = switch(current).await;
        let report = VlanReconciler::new(&mut sw).reconcile(&desired).await.unwrap();

        assert_eq!(report.applied, 4);
        assert_eq!(sw.state(), desired.materialized(8));
    }

    #[tokio::test]
    async fn test_failure_stops_execution() {
        let (current, desired) = scenarios::move_port_to_new_vlan();
        let mut sw = switch(current).await;
        sw.fail_when(|c| matches!(c, DriverCall::SetVlanMembership(20, _)));

        let err = VlanReconciler::new(&mut sw)
            .reconcile(&desired)
            .await
            .unwrap_err();
        assert!(matches!(err, SwitchError::Protocol { .. }));
        assert_eq!(
            sw.mutations(),
            vec![
                DriverCall::AddVlan(20),
                DriverCall::SetVlanMembership(20, desired.materialized(8).membership[&20].clone()),
            ]
        );
    }
}
