use serde_json::json;
use std::io::{BufRead, BufReader, Write};
use std::path::PathBuf;
use std::process::{Child, ChildStdin, ChildStdout, Command, Stdio};
use std::time::{SystemTime, UNIX_EPOCH};

fn temp_dir(prefix: &str) -> PathBuf {
    let p = std::env::temp_dir().join(format!(
        "{}-{}",
        prefix,
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .expect("clock")
            .as_nanos()
    ));
    std::fs::create_dir_all(&p).expect("create temp dir");
    p
}

struct Sidecar {
    child: Child,
    stdin: ChildStdin,
    reader: BufReader<ChildStdout>,
    next_id: u64,
}

impl Sidecar {
    fn spawn() -> Self {
        let exe = env!("CARGO_BIN_EXE_attendanced");
        let mut child = Command::new(exe)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .spawn()
            .expect("spawn attendanced");
        let stdin = child.stdin.take().expect("child stdin");
        let stdout = child.stdout.take().expect("child stdout");
        Self {
            child,
            stdin,
            reader: BufReader::new(stdout),
            next_id: 0,
        }
    }

    fn call(&mut self, method: &str, params: serde_json::Value) -> serde_json::Value {
        self.next_id += 1;
        let id = self.next_id.to_string();
        let payload = json!({ "id": id, "method": method, "params": params });
        writeln!(self.stdin, "{}", payload).expect("write request");
        self.stdin.flush().expect("flush request");

        let mut line = String::new();
        self.reader.read_line(&mut line).expect("read response line");
        let value: serde_json::Value = serde_json::from_str(line.trim()).expect("parse response");
        assert_eq!(value.get("id").and_then(|v| v.as_str()), Some(id.as_str()));
        value
    }

    fn ok(&mut self, method: &str, params: serde_json::Value) -> serde_json::Value {
        let value = self.call(method, params);
        assert!(
            value.get("ok").and_then(|v| v.as_bool()).unwrap_or(false),
            "{} failed: {}",
            method,
            value
        );
        value.get("result").cloned().unwrap_or_else(|| json!({}))
    }

    fn fails(&mut self, method: &str, params: serde_json::Value) -> serde_json::Value {
        let value = self.call(method, params);
        assert_eq!(value["ok"], false, "{} unexpectedly succeeded: {}", method, value);
        value["error"].clone()
    }
}

impl Drop for Sidecar {
    fn drop(&mut self) {
        let _ = self.child.kill();
        let _ = self.child.wait();
    }
}

fn with_class(prefix: &str) -> Sidecar {
    let workspace = temp_dir(prefix);
    let mut sc = Sidecar::spawn();
    sc.ok("workspace.select", json!({ "path": workspace.to_string_lossy() }));
    sc.ok("classes.create", json!({ "name": "Grade 5" }));
    sc.ok("students.add", json!({ "className": "Grade 5", "roll": "1", "name": "Ann" }));
    sc.ok("students.add", json!({ "className": "Grade 5", "roll": "2", "name": "Bo" }));
    sc
}

fn statuses(view: &serde_json::Value) -> Vec<String> {
    view["records"]
        .as_array()
        .expect("records")
        .iter()
        .map(|r| r["status"].as_str().expect("status").to_string())
        .collect()
}

#[test]
fn unsaved_date_derives_unmarked_session_from_roster() {
    let mut sc = with_class("attendanced-derive");
    let view = sc.ok("session.open", json!({ "className": "Grade 5", "date": "2024-03-01" }));
    assert_eq!(view["phase"], "loaded");
    assert_eq!(view["date"], "2024-03-01");
    assert_eq!(
        view["records"],
        json!([
            { "roll": "1", "name": "Ann", "status": "" },
            { "roll": "2", "name": "Bo", "status": "" }
        ])
    );
}

#[test]
fn mark_add_and_save_persists_session_for_that_date() {
    let mut sc = with_class("attendanced-save");
    sc.ok("session.open", json!({ "className": "Grade 5", "date": "2024-03-01" }));

    let view = sc.ok("session.setStatus", json!({ "roll": "1", "status": "P" }));
    assert_eq!(view["changed"], true);
    assert_eq!(view["phase"], "dirty");
    assert_eq!(statuses(&view), vec!["P", ""]);

    let view = sc.ok("session.addStudent", json!({ "roll": "3", "name": "Cy" }));
    assert_eq!(statuses(&view), vec!["P", "", ""]);
    assert_eq!(view["records"][2]["name"], "Cy");
    assert_eq!(view["roster"].as_array().map(|r| r.len()), Some(3));

    let view = sc.ok("session.save", json!({}));
    assert_eq!(view["phase"], "saved");
    assert_eq!(view["savedCount"], 3);
    assert_eq!(view["notice"]["text"], "Attendance saved");

    let saved = sc.ok("attendance.get", json!({ "className": "Grade 5", "date": "2024-03-01" }));
    assert_eq!(saved["recorded"], true);
    assert_eq!(saved["records"][0], json!({ "roll": "1", "name": "Ann", "status": "P" }));
    assert_eq!(saved["records"][1]["status"], "");

    let other_day = sc.ok("attendance.get", json!({ "className": "Grade 5", "date": "2024-03-02" }));
    assert_eq!(other_day["recorded"], false);
}

#[test]
fn saved_record_stays_authoritative_after_roster_grows() {
    let mut sc = with_class("attendanced-authoritative");
    sc.ok("session.open", json!({ "className": "Grade 5", "date": "2024-03-01" }));
    sc.ok("session.setStatus", json!({ "roll": "2", "status": "A" }));
    sc.ok("session.save", json!({}));
    sc.ok("session.close", json!({}));

    sc.ok("students.add", json!({ "className": "Grade 5", "roll": "4", "name": "Di" }));
    let view = sc.ok("session.open", json!({ "className": "Grade 5", "date": "2024-03-01" }));
    assert_eq!(statuses(&view), vec!["", "A"]);
    assert_eq!(view["unrecordedRolls"], json!(["4"]));

    let fresh = sc.ok("session.open", json!({ "className": "Grade 5", "date": "2024-03-04" }));
    assert_eq!(fresh["records"].as_array().map(|r| r.len()), Some(3));
    assert_eq!(fresh["unrecordedRolls"], json!([]));
}

#[test]
fn students_add_for_open_class_merges_without_resetting_marks() {
    let mut sc = with_class("attendanced-merge");
    sc.ok("session.open", json!({ "className": "Grade 5", "date": "2024-03-01" }));
    sc.ok("session.setStatus", json!({ "roll": "1", "status": "A" }));

    let added = sc.ok("students.add", json!({ "className": "Grade 5", "roll": "3", "name": "Cy" }));
    assert_eq!(added["mergedIntoSession"], true);

    let view = sc.ok("session.get", json!({}));
    assert_eq!(statuses(&view), vec!["A", "", ""]);

    let dup = sc.fails("session.addStudent", json!({ "roll": "3", "name": "Cy" }));
    assert_eq!(dup["code"], "conflict");
    let view = sc.ok("session.get", json!({}));
    assert_eq!(view["records"].as_array().map(|r| r.len()), Some(3));
}

#[test]
fn strict_policy_rejects_incomplete_session_without_saving() {
    let mut sc = with_class("attendanced-strict");
    sc.ok(
        "setup.update",
        json!({ "section": "attendance", "patch": { "requireAllMarked": true } }),
    );
    sc.ok("session.open", json!({ "className": "Grade 5", "date": "2024-03-01" }));
    sc.ok("session.setStatus", json!({ "roll": "1", "status": "P" }));

    let e = sc.fails("session.save", json!({}));
    assert_eq!(e["code"], "incomplete_marking");
    assert_eq!(e["details"]["unmarkedRolls"], json!(["2"]));

    let saved = sc.ok("attendance.get", json!({ "className": "Grade 5", "date": "2024-03-01" }));
    assert_eq!(saved["recorded"], false);

    sc.ok("session.setStatus", json!({ "roll": "2", "status": "A" }));
    let view = sc.ok("session.save", json!({}));
    assert_eq!(view["phase"], "saved");

    let setup = sc.ok("setup.get", json!({}));
    assert_eq!(setup["attendance"]["requireAllMarked"], true);
}

#[test]
fn invalid_inputs_are_rejected_before_touching_state() {
    let mut sc = with_class("attendanced-validation");

    let e = sc.fails("session.setStatus", json!({ "roll": "1", "status": "P" }));
    assert_eq!(e["code"], "no_session");

    let e = sc.fails("session.open", json!({ "className": "Grade 5", "date": "2024-3-1" }));
    assert_eq!(e["code"], "bad_date");

    sc.ok("session.open", json!({ "className": "Grade 5", "date": "2024-03-01" }));
    let e = sc.fails("session.setStatus", json!({ "roll": "1", "status": "" }));
    assert_eq!(e["code"], "bad_status");
    let e = sc.fails("session.addStudent", json!({ "roll": " ", "name": "Nobody" }));
    assert_eq!(e["code"], "validation_failed");

    let view = sc.ok("session.setStatus", json!({ "roll": "99", "status": "A" }));
    assert_eq!(view["changed"], false);
    assert_eq!(view["phase"], "loaded");
    assert_eq!(statuses(&view), vec!["", ""]);

    let e = sc.fails("classes.create", json!({ "name": "Grade 5" }));
    assert_eq!(e["code"], "conflict");
    let e = sc.fails("session.open", json!({ "className": "Nope", "date": "2024-03-01" }));
    assert_eq!(e["code"], "not_found");
}

#[test]
fn deleting_open_class_closes_session() {
    let mut sc = with_class("attendanced-delete");
    sc.ok("session.open", json!({ "className": "Grade 5", "date": "2024-03-01" }));
    sc.ok("classes.delete", json!({ "name": "Grade 5" }));

    let view = sc.ok("session.get", json!({}));
    assert_eq!(view["phase"], "empty");
    assert_eq!(view["className"], serde_json::Value::Null);
    let classes = sc.ok("classes.list", json!({}));
    assert_eq!(classes["classes"], json!([]));
}

#[test]
fn csv_export_names_file_after_class() {
    let mut sc = with_class("attendanced-csv");
    sc.ok("session.open", json!({ "className": "Grade 5", "date": "2024-03-01" }));
    sc.ok("session.setStatus", json!({ "roll": "1", "status": "P" }));
    sc.ok("session.setStatus", json!({ "roll": "2", "status": "A" }));
    sc.ok("session.save", json!({}));

    let out = sc.ok("attendance.exportCsv", json!({ "className": "Grade 5" }));
    assert_eq!(out["fileName"], "Grade_5.csv");
    assert_eq!(
        out["csv"],
        "date,roll,name,status\n2024-03-01,1,Ann,P\n2024-03-01,2,Bo,A\n"
    );
    assert_eq!(out["outPath"], serde_json::Value::Null);
}

#[test]
fn session_date_defaults_to_today() {
    let mut sc = with_class("attendanced-today");
    let view = sc.ok("session.open", json!({ "className": "Grade 5" }));
    let date = view["date"].as_str().expect("date");
    assert_eq!(date.len(), 10);
    assert_eq!(&date[4..5], "-");
    assert_eq!(&date[7..8], "-");
}

#[test]
fn padded_class_names_resolve_to_the_stored_class() {
    let mut sc = with_class("attendanced-padded");

    let view = sc.ok("session.open", json!({ "className": " Grade 5 ", "date": "2024-03-01" }));
    assert_eq!(view["className"], "Grade 5");
    assert_eq!(view["records"].as_array().map(|r| r.len()), Some(2));

    let added = sc.ok("students.add", json!({ "className": "Grade 5  ", "roll": "3", "name": "Cy" }));
    assert_eq!(added["mergedIntoSession"], true);
    let roster = sc.ok("students.list", json!({ "className": "  Grade 5" }));
    assert_eq!(roster["students"].as_array().map(|s| s.len()), Some(3));

    let saved = sc.ok("attendance.get", json!({ "className": " Grade 5", "date": "2024-03-01" }));
    assert_eq!(saved["className"], "Grade 5");

    let e = sc.fails("classes.create", json!({ "name": "   " }));
    assert_eq!(e["code"], "bad_params");

    sc.ok("classes.delete", json!({ "name": " Grade 5 " }));
    let view = sc.ok("session.get", json!({}));
    assert_eq!(view["phase"], "empty");
    let classes = sc.ok("classes.list", json!({}));
    assert_eq!(classes["classes"], json!([]));
}
