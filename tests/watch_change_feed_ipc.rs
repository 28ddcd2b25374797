use serde_json::{json, Value};
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

fn spawn_daemon() -> (Child, ChildStdin, BufReader<ChildStdout>) {
    let exe = env!("CARGO_BIN_EXE_madrasad");
    let mut child = Command::new(exe)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .spawn()
        .expect("spawn madrasad");
    let stdin = child.stdin.take().expect("child stdin");
    let stdout = child.stdout.take().expect("child stdout");
    (child, stdin, BufReader::new(stdout))
}

fn request(
    stdin: &mut ChildStdin,
    reader: &mut BufReader<ChildStdout>,
    id: &str,
    method: &str,
    params: Value,
) -> Value {
    let payload = json!({ "id": id, "method": method, "params": params });
    writeln!(stdin, "{}", payload).expect("write request");
    stdin.flush().expect("flush request");

    let mut line = String::new();
    reader.read_line(&mut line).expect("read response line");
    let value: Value = serde_json::from_str(line.trim()).expect("parse response json");
    assert_eq!(value.get("id").and_then(|v| v.as_str()), Some(id));
    value
}

/// Event lines trail the response that caused them and carry no id.
fn read_event(reader: &mut BufReader<ChildStdout>) -> Value {
    let mut line = String::new();
    reader.read_line(&mut line).expect("read event line");
    let value: Value = serde_json::from_str(line.trim()).expect("parse event json");
    assert_eq!(value.get("event").and_then(|v| v.as_str()), Some("change"));
    assert!(value.get("id").is_none());
    value
}

fn setup(stdin: &mut ChildStdin, reader: &mut BufReader<ChildStdout>, prefix: &str) {
    let workspace = temp_dir(prefix);
    let resp = request(
        stdin,
        reader,
        "open",
        "workspace.select",
        json!({ "path": workspace.to_string_lossy() }),
    );
    assert_eq!(resp["ok"], true);
    for (id, params) in [
        (
            "u1",
            json!({ "code": "TE01", "role": "teacher", "name": "أستاذ", "class": "الروضة" }),
        ),
        (
            "u2",
            json!({ "code": "ST01", "role": "student", "name": "طالب أ", "class": "الروضة", "groupType": "روضة" }),
        ),
        (
            "u3",
            json!({ "code": "ST02", "role": "student", "name": "طالب ب", "class": "الروضة", "groupType": "روضة" }),
        ),
    ] {
        let resp = request(stdin, reader, id, "users.create", params);
        assert_eq!(resp["ok"], true);
    }
}

#[test]
fn grade_writes_notify_matching_subscriptions_only() {
    let (mut child, mut stdin, mut reader) = spawn_daemon();
    setup(&mut stdin, &mut reader, "madrasa-watch-grades");

    let sub = request(
        &mut stdin,
        &mut reader,
        "w1",
        "watch.subscribe",
        json!({ "table": "grades", "studentCode": "ST01" }),
    );
    let sub_id = sub["result"]["subscriptionId"]
        .as_str()
        .expect("subscriptionId")
        .to_string();

    let resp = request(
        &mut stdin,
        &mut reader,
        "g1",
        "grades.record",
        json!({
            "studentCode": "ST01",
            "subjectKey": "قرآن",
            "value": "ممتاز",
            "teacherCode": "TE01"
        }),
    );
    assert_eq!(resp["ok"], true);
    let event = read_event(&mut reader);
    assert_eq!(event["subscriptionId"], sub_id.as_str());
    assert_eq!(event["table"], "grades");
    assert_eq!(event["studentCode"], "ST01");
    assert_eq!(event["op"], "insert");

    // A write for another student emits nothing: the very next line must be
    // the response to the follow-up health probe.
    let resp = request(
        &mut stdin,
        &mut reader,
        "g2",
        "grades.record",
        json!({
            "studentCode": "ST02",
            "subjectKey": "قرآن",
            "value": "جيد",
            "teacherCode": "TE01"
        }),
    );
    assert_eq!(resp["ok"], true);
    let probe = request(&mut stdin, &mut reader, "p1", "health", json!({}));
    assert_eq!(probe["ok"], true);

    let _ = child.kill();
}

#[test]
fn attendance_bulk_notifies_per_matching_row() {
    let (mut child, mut stdin, mut reader) = spawn_daemon();
    setup(&mut stdin, &mut reader, "madrasa-watch-bulk");

    let sub = request(
        &mut stdin,
        &mut reader,
        "w1",
        "watch.subscribe",
        json!({ "table": "attendance", "studentCode": "ST02" }),
    );
    let sub_id = sub["result"]["subscriptionId"]
        .as_str()
        .expect("subscriptionId")
        .to_string();

    let resp = request(
        &mut stdin,
        &mut reader,
        "b1",
        "attendance.markBulk",
        json!({
            "date": "2024-03-01",
            "kind": "رسمي",
            "teacherCode": "TE01",
            "entries": [
                { "studentCode": "ST01", "status": "حاضر" },
                { "studentCode": "ST02", "status": "غائب" }
            ]
        }),
    );
    assert_eq!(resp["result"]["saved"], 2);

    // Only the subscribed student's row produces an event.
    let event = read_event(&mut reader);
    assert_eq!(event["subscriptionId"], sub_id.as_str());
    assert_eq!(event["table"], "attendance");
    assert_eq!(event["studentCode"], "ST02");
    assert_eq!(event["op"], "upsert");
    let probe = request(&mut stdin, &mut reader, "p1", "health", json!({}));
    assert_eq!(probe["ok"], true);

    let _ = child.kill();
}

#[test]
fn unsubscribe_stops_the_feed() {
    let (mut child, mut stdin, mut reader) = spawn_daemon();
    setup(&mut stdin, &mut reader, "madrasa-watch-unsub");

    let sub = request(
        &mut stdin,
        &mut reader,
        "w1",
        "watch.subscribe",
        json!({ "table": "attendance", "studentCode": "ST01" }),
    );
    let sub_id = sub["result"]["subscriptionId"]
        .as_str()
        .expect("subscriptionId")
        .to_string();

    let gone = request(
        &mut stdin,
        &mut reader,
        "w2",
        "watch.unsubscribe",
        json!({ "subscriptionId": &sub_id }),
    );
    assert_eq!(gone["ok"], true);

    let resp = request(
        &mut stdin,
        &mut reader,
        "m1",
        "attendance.mark",
        json!({
            "studentCode": "ST01",
            "date": "2024-03-01",
            "kind": "رسمي",
            "status": "حاضر",
            "teacherCode": "TE01"
        }),
    );
    assert_eq!(resp["ok"], true);
    let probe = request(&mut stdin, &mut reader, "p1", "health", json!({}));
    assert_eq!(probe["ok"], true);

    // Tearing down twice is an error, not a silent no-op.
    let resp = request(
        &mut stdin,
        &mut reader,
        "w3",
        "watch.unsubscribe",
        json!({ "subscriptionId": &sub_id }),
    );
    assert_eq!(
        resp["error"]["code"].as_str(),
        Some("not_found")
    );

    let _ = child.kill();
}

#[test]
fn subscribe_validates_table_name() {
    let (mut child, mut stdin, mut reader) = spawn_daemon();
    setup(&mut stdin, &mut reader, "madrasa-watch-table");

    let resp = request(
        &mut stdin,
        &mut reader,
        "w1",
        "watch.subscribe",
        json!({ "table": "users", "studentCode": "ST01" }),
    );
    assert_eq!(resp["error"]["code"].as_str(), Some("bad_params"));

    let _ = child.kill();
}
