//! ---
//! cmp_section: "15-testing-qa-runbook"
//! cmp_subsection: "module"
//! cmp_type: "source"
//! cmp_scope: "code"
//! cmp_description: "End-to-end modem polls rendered to result records."
//! cmp_version: "v0.1.0"
//! cmp_owner: "tbd"
//! ---
use cmpoll_core::fixtures::ModemProfile;
use cmpoll_core::{poll_target, ModemIdentity, ModemState, PollRequest, RECORD_FIELDS};
use cmpoll_snmp::testing::{FakeConnector, FakeFault};

fn request(address: &str) -> PollRequest {
    PollRequest::new(
        ModemIdentity::new("0091000060", "5c353bef6106", address),
        "public",
    )
}

#[tokio::test]
async fn completed_and_timeout_records_have_equal_width() {
    let connector = FakeConnector::new()
        .with_agent(ModemProfile::default().agent("10.0.0.1"))
        .fail_connect("10.0.0.2", FakeFault::Timeout);

    let ok = poll_target(&connector, &request("10.0.0.1"), 9).await;
    let timed_out = poll_target(&connector, &request("10.0.0.2"), 9).await;
    assert_eq!(ok.state, ModemState::Completed);
    assert_eq!(timed_out.state, ModemState::Timeout);

    let a = ok.to_record();
    let b = timed_out.to_record();
    assert_eq!(a.split(';').count(), RECORD_FIELDS);
    assert_eq!(b.split(';').count(), RECORD_FIELDS);
    assert!(b.contains(";timeout;"));
}

#[tokio::test]
async fn snapshot_serializes_for_diagnostics() {
    let connector = FakeConnector::new().with_agent(ModemProfile::default().agent("10.0.0.1"));
    let snap = poll_target(&connector, &request("10.0.0.1"), 9).await;
    let json = serde_json::to_value(&snap).unwrap();
    assert_eq!(json["state"], "completed");
    assert_eq!(json["identity"]["address"], "10.0.0.1");
    assert_eq!(json["metadata"]["wan_gateway"], "192.168.100.1");
}
