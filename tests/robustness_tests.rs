use assert_cmd::cargo_bin;
use assert_cmd::prelude::*;
use predicates::prelude::*;
use std::io::Write;
use std::process::Command;

#[test]
fn test_malformed_lines_are_skipped() {
    let mut input = tempfile::NamedTempFile::new().unwrap();
    writeln!(input, r#"{{"command":"register_child","user_id":1,"name":"Ali"}}"#).unwrap();
    // Not JSON at all
    writeln!(input, "register_child,1,Ali").unwrap();
    // Unknown command
    writeln!(input, r#"{{"command":"teleport","user_id":1}}"#).unwrap();
    // Wrong field type
    writeln!(input, r#"{{"command":"order","user_id":"one","child_id":1,"plan_id":1}}"#).unwrap();
    writeln!(input, r#"{{"command":"order","user_id":1,"child_id":1,"plan_id":1}}"#).unwrap();
    writeln!(input, r#"{{"command":"checkout","user_id":1,"subscription_ids":[1],"provider":"mock"}}"#).unwrap();
    writeln!(input, r#"{{"command":"process","payment_id":1}}"#).unwrap();

    let mut cmd = Command::new(cargo_bin!("toybox-fulfillment"));
    cmd.arg(input.path()).arg("--gateway-success-rate").arg("1");

    cmd.assert()
        .success()
        .stderr(predicate::str::contains("Error reading command"))
        .stdout(predicate::str::contains("1,1,1,PLANNED,"));
}

#[test]
fn test_rejected_operations_do_not_stop_replay() {
    let mut input = tempfile::NamedTempFile::new().unwrap();
    writeln!(input, r#"{{"command":"register_child","user_id":1,"name":"Ali"}}"#).unwrap();
    // Foreign child
    writeln!(input, r#"{{"command":"order","user_id":2,"child_id":1,"plan_id":1}}"#).unwrap();
    // Unknown plan
    writeln!(input, r#"{{"command":"order","user_id":1,"child_id":1,"plan_id":9}}"#).unwrap();
    // Box for an unpaid subscription
    writeln!(input, r#"{{"command":"create_box","subscription_id":1}}"#).unwrap();
    writeln!(input, r#"{{"command":"order","user_id":1,"child_id":1,"plan_id":1}}"#).unwrap();
    writeln!(input, r#"{{"command":"create_box","subscription_id":1}}"#).unwrap();

    let mut cmd = Command::new(cargo_bin!("toybox-fulfillment"));
    cmd.arg(input.path());

    cmd.assert()
        .success()
        .stderr(predicate::str::contains("Error applying command: Validation error"))
        .stderr(predicate::str::contains("Error applying command: plan 9 not found"))
        .stderr(predicate::str::contains("Error applying command: subscription 1 not found"))
        .stderr(predicate::str::contains("Error applying command: Invalid state"))
        .stdout(predicate::str::contains("PLANNED").not());
}

#[test]
fn test_provider_callbacks_from_command_file() {
    let mut input = tempfile::NamedTempFile::new().unwrap();
    writeln!(input, r#"{{"command":"register_child","user_id":1,"name":"Ali"}}"#).unwrap();
    writeln!(input, r#"{{"command":"order","user_id":1,"child_id":1,"plan_id":1}}"#).unwrap();
    writeln!(
        input,
        r#"{{"command":"payme","body":{{"jsonrpc":"2.0","id":1,"method":"CreateTransaction","params":{{"id":"r1","time":0,"amount":35000000,"account":{{"user_id":1,"subscription_ids":[1]}}}}}}}}"#
    )
    .unwrap();
    writeln!(
        input,
        r#"{{"command":"payme","body":"{{\"jsonrpc\":\"2.0\",\"id\":2,\"method\":\"PerformTransaction\",\"params\":{{\"id\":\"r1\"}}}}"}}"#
    )
    .unwrap();

    let mut cmd = Command::new(cargo_bin!("toybox-fulfillment"));
    cmd.arg(input.path());

    cmd.assert()
        .success()
        .stderr(predicate::str::contains("Error").not())
        .stdout(predicate::str::contains("1,1,1,PLANNED,"));
}
