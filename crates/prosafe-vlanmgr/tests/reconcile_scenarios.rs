//! Reconciliation scenarios against the fake switch
//!
//! The fake rejects any step that would take a port out of its PVID VLAN, so
//! a plan that completes here never cut a port off.

use pretty_assertions::assert_eq;

use prosafe_common::{
    materialize_port_map, PortMembership, SwitchDriver, SwitchError, SwitchModel, SwitchState,
};
use prosafe_test::{
    assert_connectivity, assert_pvids_consistent, factory_default, port_map, scenarios, state,
    CallVerifier, DriverCall, FakeSwitch,
};
use prosafe_vlanmgr::{Config, VlanReconciler};

async fn logged_in(model: SwitchModel, current: SwitchState) -> FakeSwitch {
    let mut sw = FakeSwitch::new(model, current);
    sw.login().await.expect("fake login");
    sw
}

fn full(spec: &str, port_count: u8) -> prosafe_common::PortMap {
    materialize_port_map(&port_map(spec), port_count)
}

/// Port 2 moves from VLAN 10 to a new VLAN 20
///
/// Expected sequence:
/// 1. add VLAN 20
/// 2. VLAN 20 = {2:U} (VLAN 10 already holds the widened membership)
/// 3. PVID of port 2 → 20
/// 4. VLAN 10 = {1:U}
#[tokio::test]
async fn test_move_port_to_new_vlan() {
    let (current, desired) = scenarios::move_port_to_new_vlan();
    let mut sw = logged_in(SwitchModel::Gs108ev3, current).await;

    let report = VlanReconciler::new(&mut sw)
        .reconcile(&desired)
        .await
        .expect("reconcile");

    assert_eq!(report.applied, 4);
    assert_eq!(
        sw.mutations(),
        vec![
            DriverCall::AddVlan(20),
            DriverCall::SetVlanMembership(20, full("2:U", 8)),
            DriverCall::SetPortsPvid(vec![2], 20),
            DriverCall::SetVlanMembership(10, full("1:U", 8)),
        ]
    );
    assert_eq!(sw.state(), desired.materialized(8));
    assert_connectivity(&sw.history(), &[(1, 10)]).unwrap();
    assert_pvids_consistent(&sw.history()).unwrap();
}

#[tokio::test]
async fn test_second_run_changes_nothing() {
    let (current, desired) = scenarios::office_split();
    let mut sw = logged_in(SwitchModel::Gs108ev3, current).await;

    VlanReconciler::new(&mut sw)
        .reconcile(&desired)
        .await
        .expect("first run");
    let mutations = sw.mutations().len();

    let report = VlanReconciler::new(&mut sw)
        .reconcile(&desired)
        .await
        .expect("second run");
    assert!(report.plan.is_empty());
    assert_eq!(report.applied, 0);
    assert_eq!(sw.mutations().len(), mutations);
}

#[tokio::test]
async fn test_already_desired_device_gets_no_writes() {
    let mut sw = logged_in(SwitchModel::Gs108ev3, factory_default(8)).await;
    let report = VlanReconciler::new(&mut sw)
        .reconcile(&factory_default(8))
        .await
        .unwrap();

    assert!(report.plan.is_empty());
    CallVerifier::new(sw.calls()).assert_no_mutations().unwrap();
}

/// Ports 5-8 are unmanaged and must stay in VLAN 1 at every step
#[tokio::test]
async fn test_office_split_order() {
    let (current, desired) = scenarios::office_split();
    let mut sw = logged_in(SwitchModel::Gs108ev3, current).await;

    VlanReconciler::new(&mut sw)
        .reconcile(&desired)
        .await
        .expect("reconcile");

    assert_eq!(
        sw.mutations(),
        vec![
            DriverCall::AddVlan(10),
            DriverCall::AddVlan(20),
            DriverCall::SetVlanMembership(10, full("1:T 2:U 3:U", 8)),
            DriverCall::SetVlanMembership(20, full("1:T 4:U", 8)),
            DriverCall::SetPortsPvid(vec![2, 3], 10),
            DriverCall::SetPortsPvid(vec![4], 20),
            DriverCall::SetVlanMembership(1, full("1:U 5:U 6:U 7:U 8:U", 8)),
        ]
    );

    let history = sw.history();
    assert_connectivity(&history, &[(5, 1), (6, 1), (7, 1), (8, 1)]).unwrap();
    assert_pvids_consistent(&history).unwrap();
}

/// The PVID of a port moves only once the port is a member of the new
/// VLAN, and before it leaves the old one
#[tokio::test]
async fn test_pvid_moves_between_widen_and_narrow() {
    let (current, desired) = scenarios::office_split();
    let mut sw = logged_in(SwitchModel::Gs108ev3, current).await;
    VlanReconciler::new(&mut sw)
        .reconcile(&desired)
        .await
        .unwrap();

    let calls = CallVerifier::new(sw.calls());
    let widen = DriverCall::SetVlanMembership(10, full("1:T 2:U 3:U", 8));
    let move_pvid = DriverCall::SetPortsPvid(vec![2, 3], 10);
    let narrow = DriverCall::SetVlanMembership(1, full("1:U 5:U 6:U 7:U 8:U", 8));
    calls.assert_before(&widen, &move_pvid).unwrap();
    calls.assert_before(&move_pvid, &narrow).unwrap();
}

/// Port 3 is unmanaged with PVID 99; VLAN 99 is not in the desired state
#[tokio::test]
async fn test_unmanaged_port_keeps_its_vlan() {
    let (current, desired) = scenarios::unmanaged_port_on_dropped_vlan();
    let mut sw = logged_in(SwitchModel::Gs108ev3, current).await;

    let report = VlanReconciler::new(&mut sw)
        .reconcile(&desired)
        .await
        .expect("reconcile");

    assert!(report.plan.kept_vlans().contains(&99));
    let after = sw.state();
    assert_eq!(after.membership[&99][&3], PortMembership::Untagged);
    assert_eq!(after.pvids[&3], 99);
    assert_connectivity(&sw.history(), &[(3, 99)]).unwrap();
    CallVerifier::new(sw.calls())
        .assert_none(|c| matches!(c, DriverCall::DeleteVlans(_)))
        .unwrap();
}

/// VLAN 30 is dropped while ports 1 and 2 still use it as PVID
#[tokio::test]
async fn test_dropped_vlan_deleted_after_pvids_move() {
    let mut current = factory_default(8);
    current.membership.insert(30, port_map("1:U 2:U"));
    current.pvids.insert(1, 30);
    current.pvids.insert(2, 30);
    let mut sw = logged_in(SwitchModel::Gs108ev3, current).await;

    VlanReconciler::new(&mut sw)
        .reconcile(&factory_default(8))
        .await
        .expect("reconcile");

    let calls = CallVerifier::new(sw.calls());
    calls
        .assert_before(
            &DriverCall::SetPortsPvid(vec![1, 2], 1),
            &DriverCall::DeleteVlans(vec![30]),
        )
        .unwrap();
    assert_eq!(sw.calls().last(), Some(&DriverCall::DeleteVlans(vec![30])));
    assert_eq!(sw.state(), factory_default(8));
}

#[tokio::test]
async fn test_failure_aborts_remaining_steps() {
    let (current, desired) = scenarios::office_split();
    let mut sw = logged_in(SwitchModel::Gs108ev3, current).await;
    sw.fail_when(|c| matches!(c, DriverCall::SetPortsPvid(_, 20)));

    let err = VlanReconciler::new(&mut sw)
        .reconcile(&desired)
        .await
        .unwrap_err();
    assert!(matches!(err, SwitchError::Protocol { .. }));

    let mutations = sw.mutations();
    assert_eq!(
        mutations.last(),
        Some(&DriverCall::SetPortsPvid(vec![4], 20))
    );
    CallVerifier::new(sw.calls())
        .assert_none(|c| matches!(c, DriverCall::SetVlanMembership(1, _)))
        .unwrap();
    // Nothing applied so far cut any port off
    assert_pvids_consistent(&sw.history()).unwrap();
}

#[tokio::test]
async fn test_pvid_on_missing_vlan_is_rejected_before_any_change() {
    let current = state(&[(1, "1:U 2:U")], &[(1, 1), (2, 1), (3, 77)]);
    let desired = state(&[(1, "1:U 2:U")], &[(1, 1), (2, 1)]);
    let mut sw = logged_in(SwitchModel::Gs108ev3, current).await;

    let err = VlanReconciler::new(&mut sw)
        .reconcile(&desired)
        .await
        .unwrap_err();
    assert!(matches!(err, SwitchError::Protocol { .. }));
    CallVerifier::new(sw.calls()).assert_no_mutations().unwrap();
}

/// Port 3 sits in VLAN 99 but the PVID read left it out
#[tokio::test]
async fn test_member_without_pvid_is_rejected_before_any_change() {
    let current = state(&[(1, "1:U"), (99, "3:U")], &[(1, 1)]);
    let desired = state(&[(1, "1:U")], &[(1, 1)]);
    let mut sw = logged_in(SwitchModel::Gs108ev3, current).await;

    let err = VlanReconciler::new(&mut sw)
        .reconcile(&desired)
        .await
        .unwrap_err();
    assert!(matches!(err, SwitchError::Protocol { .. }));
    CallVerifier::new(sw.calls()).assert_no_mutations().unwrap();
    assert_eq!(sw.state().membership[&99][&3], PortMembership::Untagged);
}

#[tokio::test]
async fn test_config_file_on_16_port_switch() {
    let config = Config::parse(
        r#"
[switches.core]
address = "10.0.0.3"
password = "pw"
model = "gs116ev2"

[switches.core.ports.1]
pvid = 1
vlans = ["1U", "100T", "200T"]

[switches.core.ports.2]
pvid = 100
vlans = ["100U", "1N"]

[switches.core.ports.3]
pvid = 200
vlans = ["200U", "1N"]
"#,
    )
    .unwrap();
    let core = config.switch("core").unwrap();
    let mut sw = logged_in(SwitchModel::Gs116ev2, factory_default(16)).await;

    VlanReconciler::new(&mut sw)
        .reconcile(&core.desired_state())
        .await
        .expect("reconcile");

    let after = sw.state();
    assert_eq!(after.membership[&100], full("1:T 2:U", 16));
    assert_eq!(after.membership[&200], full("1:T 3:U", 16));
    assert_eq!(after.membership[&1][&2], PortMembership::Ignored);
    assert_eq!(after.membership[&1][&16], PortMembership::Untagged);
    assert_eq!(after.pvids[&2], 100);
    assert_eq!(after.pvids[&3], 200);
    assert_eq!(after.pvids[&16], 1);

    let unmanaged: Vec<(u8, u16)> = (4..=16).map(|p| (p, 1)).collect();
    assert_connectivity(&sw.history(), &unmanaged).unwrap();
    assert_pvids_consistent(&sw.history()).unwrap();
}
