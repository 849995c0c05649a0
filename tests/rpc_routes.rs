use std::sync::{Arc, Mutex};

use serde_json::{json, Value as JsonValue};
use smsfwd::client::build_signed_request;
use smsfwd::config::ServerSettings;
use smsfwd::rpc::{
    http, ControlDaemon, DeviceBridge, Endpoint, ResponseEnvelope, HTTP_FAILURE_CODE,
    HTTP_SUCCESS_CODE,
};
use smsfwd::sign::{calc_sign, now_millis};
use smsfwd::storage::{AppSettings, RuleRecord, SenderRecord, SettingsStore, SqliteSettingsStore};
use smsfwd::version::AppVersion;

fn clone_settings(key: &str) -> ServerSettings {
    ServerSettings {
        server_sign_key: key.into(),
        enable_api_clone: true,
        ..ServerSettings::default()
    }
}

fn body(data: Option<JsonValue>, key: &str) -> Vec<u8> {
    serde_json::to_vec(&build_signed_request(data, key, now_millis())).expect("body")
}

fn envelope(bytes: &str) -> ResponseEnvelope {
    serde_json::from_str(bytes).expect("envelope")
}

fn seeded_daemon(settings: ServerSettings) -> ControlDaemon {
    let store = SqliteSettingsStore::in_memory().expect("store");
    store
        .save_settings(&AppSettings {
            enable_sms: true,
            request_timeout: 25,
            sms_template: "{{content}}".into(),
            ..AppSettings::default()
        })
        .expect("settings");
    store
        .insert_sender(&SenderRecord {
            id: 11,
            kind: 0,
            name: "dingtalk".into(),
            json_setting: "{}".into(),
            status: 1,
            time: 0,
            extra: Default::default(),
        })
        .expect("sender");
    store
        .insert_rule(&RuleRecord {
            id: 21,
            kind: "call".into(),
            filed: "transpond_all".into(),
            check: "is".into(),
            value: String::new(),
            sender_id: 11,
            sms_template: String::new(),
            regex_replace: String::new(),
            sim_slot: "ALL".into(),
            status: 1,
            time: 0,
            extra: Default::default(),
        })
        .expect("rule");
    ControlDaemon::with_store(store, settings)
}

#[test]
fn config_query_works_unsigned_when_key_is_empty() {
    let daemon = ControlDaemon::test_instance();
    let reply = daemon.handle_request("/config/query", b"{}");
    assert_eq!(reply.status, 200);
    let resp = envelope(&reply.body);
    assert_eq!(resp.code, HTTP_SUCCESS_CODE);
    assert_eq!(resp.sign, None);
    let data = resp.data.expect("data");
    assert_eq!(data["version_code"], json!(AppVersion::current().code));
    assert_eq!(data["enable_api_clone"], json!(false));
}

#[test]
fn empty_body_is_accepted_without_key() {
    let daemon = ControlDaemon::test_instance();
    let reply = daemon.handle_request("/config/query", b"");
    assert_eq!(reply.status, 200);
}

#[test]
fn signed_server_rejects_unsigned_requests() {
    let daemon = ControlDaemon::test_instance();
    daemon.set_server_settings(clone_settings("secret"));

    let reply = daemon.handle_request("/config/query", b"{}");
    assert_eq!(reply.status, 500);
    let resp = envelope(&reply.body);
    assert_eq!(resp.code, HTTP_FAILURE_CODE);
    assert!(resp.msg.contains("sign"));
    assert_eq!(
        resp.sign,
        Some(calc_sign(&resp.timestamp.to_string(), "secret"))
    );
}

#[test]
fn signed_server_rejects_wrong_key() {
    let daemon = ControlDaemon::test_instance();
    daemon.set_server_settings(clone_settings("secret"));
    let reply = daemon.handle_request("/config/query", &body(None, "not-the-secret"));
    assert_eq!(reply.status, 500);
    assert_eq!(envelope(&reply.body).msg, "signature check failed");
}

#[test]
fn signed_server_accepts_signed_requests_and_signs_replies() {
    let daemon = ControlDaemon::test_instance();
    daemon.set_server_settings(clone_settings("secret"));
    let reply = daemon.handle_request("/config/query", &body(None, "secret"));
    assert_eq!(reply.status, 200);
    let resp = envelope(&reply.body);
    assert!(resp.is_success());
    assert_eq!(
        resp.sign,
        Some(calc_sign(&resp.timestamp.to_string(), "secret"))
    );
    assert_eq!(resp.data.expect("data")["enable_api_clone"], json!(true));
}

#[test]
fn stale_timestamp_is_rejected() {
    let daemon = ControlDaemon::test_instance();
    daemon.set_server_settings(clone_settings("secret"));
    let stale = build_signed_request(None, "secret", now_millis() - 2 * 3_600_000);
    let reply = daemon.handle_request(
        "/config/query",
        &serde_json::to_vec(&stale).expect("body"),
    );
    assert_eq!(reply.status, 500);
    assert!(envelope(&reply.body).msg.contains("1 hour"));
}

#[test]
fn clone_endpoints_are_gated() {
    let daemon = ControlDaemon::test_instance();
    for path in ["/clone/pull", "/clone/push"] {
        let reply = daemon.handle_request(path, &body(None, ""));
        assert_eq!(reply.status, 500);
        assert!(envelope(&reply.body).msg.contains("disabled"));
    }
}

#[test]
fn clone_pull_requires_matching_version() {
    let daemon = seeded_daemon(clone_settings(""));

    let missing = daemon.handle_request("/clone/pull", &body(Some(json!({})), ""));
    assert_eq!(envelope(&missing.body).msg, "the version_code field is required");

    let mismatch =
        daemon.handle_request("/clone/pull", &body(Some(json!({ "version_code": 9999 })), ""));
    assert_eq!(mismatch.status, 500);
    assert!(envelope(&mismatch.body).msg.contains("versions differ"));
}

#[test]
fn clone_pull_exports_snapshot() {
    let daemon = seeded_daemon(clone_settings("secret"));
    let code = daemon.version().code;
    let reply = daemon.handle_request(
        "/clone/pull",
        &body(Some(json!({ "version_code": code })), "secret"),
    );
    assert_eq!(reply.status, 200);
    let data = envelope(&reply.body).data.expect("data");
    assert_eq!(data["version_code"], json!(code));
    assert_eq!(data["enable_sms"], json!(true));
    assert_eq!(data["request_timeout"], json!(25));
    assert_eq!(data["sender_list"][0]["id"], json!(11));
    assert_eq!(data["rule_list"][0]["sender_id"], json!(11));
}

#[test]
fn clone_pull_then_push_replicates_state() {
    let source = seeded_daemon(clone_settings(""));
    let code = source.version().code;
    let pulled = source.handle_request(
        "/clone/pull",
        &body(Some(json!({ "version_code": code })), ""),
    );
    let snapshot = envelope(&pulled.body).data.expect("snapshot");

    let dest = ControlDaemon::test_instance();
    dest.set_server_settings(clone_settings("dest-key"));
    let pushed = dest.handle_request("/clone/push", &body(Some(snapshot), "dest-key"));
    assert_eq!(pushed.status, 200, "{}", pushed.body);
    let resp = envelope(&pushed.body);
    assert_eq!(resp.msg, "success");
    assert_eq!(resp.data, None);

    let expected = source.export_settings().expect("source");
    let actual = dest.export_settings().expect("dest");
    assert_eq!(actual, expected);
}

#[test]
fn clone_push_checks_version_before_touching_store() {
    let daemon = seeded_daemon(clone_settings(""));
    let before = daemon.export_settings().expect("before");
    let reply = daemon.handle_request(
        "/clone/push",
        &body(Some(json!({ "version_code": 1, "sender_list": [], "rule_list": [] })), ""),
    );
    assert_eq!(reply.status, 500);
    assert_eq!(daemon.export_settings().expect("after"), before);
}

#[test]
fn clone_push_failure_reports_store_error() {
    let daemon = seeded_daemon(clone_settings(""));
    let code = daemon.version().code;
    let sender = json!({ "id": 1, "type": 0, "name": "dup" });
    let reply = daemon.handle_request(
        "/clone/push",
        &body(
            Some(json!({
                "version_code": code,
                "sender_list": [sender.clone(), sender],
                "rule_list": []
            })),
            "",
        ),
    );
    assert_eq!(reply.status, 500);
    assert!(envelope(&reply.body).msg.contains("UNIQUE"));
}

#[test]
fn malformed_body_is_a_server_error() {
    let daemon = ControlDaemon::test_instance();
    let reply = daemon.handle_request("/config/query", b"{not json");
    assert_eq!(reply.status, 500);
    assert!(envelope(&reply.body).msg.starts_with("invalid request body"));
}

#[test]
fn unknown_path_is_not_found() {
    let daemon = ControlDaemon::test_instance();
    let reply = daemon.handle_request("/nope", b"{}");
    assert_eq!(reply.status, 404);
    assert_eq!(envelope(&reply.body).code, HTTP_FAILURE_CODE);
}

struct RecordingBridge {
    calls: Arc<Mutex<Vec<Endpoint>>>,
}

impl DeviceBridge for RecordingBridge {
    fn handle(&self, endpoint: Endpoint, data: Option<JsonValue>) -> Result<JsonValue, std::io::Error> {
        self.calls.lock().expect("calls").push(endpoint);
        Ok(json!({ "endpoint": endpoint.path(), "echo": data }))
    }
}

#[test]
fn device_endpoints_follow_their_switches() {
    let daemon = ControlDaemon::test_instance();
    let reply = daemon.handle_request("/battery/query", b"{}");
    assert!(envelope(&reply.body).msg.contains("disabled"));

    daemon.update_server_settings(|settings| settings.enable_api_battery_query = true);
    let reply = daemon.handle_request("/battery/query", b"{}");
    assert_eq!(reply.status, 500);
    assert!(envelope(&reply.body).msg.contains("not supported"));
}

#[test]
fn device_endpoints_delegate_to_bridge() {
    let calls = Arc::new(Mutex::new(Vec::new()));
    let daemon = ControlDaemon::with_store_and_bridge(
        SqliteSettingsStore::in_memory().expect("store"),
        ServerSettings {
            enable_api_sms_send: true,
            enable_api_contact_query: true,
            ..ServerSettings::default()
        },
        Arc::new(RecordingBridge {
            calls: calls.clone(),
        }),
    );

    let reply = daemon.handle_request(
        "/sms/send",
        &body(Some(json!({ "phone_numbers": "10086", "msg_content": "hi" })), ""),
    );
    assert_eq!(reply.status, 200);
    let data = envelope(&reply.body).data.expect("data");
    assert_eq!(data["endpoint"], "/sms/send");
    assert_eq!(data["echo"]["phone_numbers"], "10086");

    daemon.handle_request("/contact/query", b"{}");
    let reply = daemon.handle_request("/call/query", b"{}");
    assert!(envelope(&reply.body).msg.contains("disabled"));

    assert_eq!(
        *calls.lock().expect("calls"),
        vec![Endpoint::SmsSend, Endpoint::ContactQuery]
    );
}

#[test]
fn http_request_is_routed() {
    let daemon = ControlDaemon::test_instance();
    let payload = br#"{"timestamp":1}"#;
    let raw = format!(
        "POST /config/query HTTP/1.1\r\nHost: localhost\r\nContent-Length: {}\r\n\r\n{}",
        payload.len(),
        String::from_utf8_lossy(payload)
    );
    let response = http::handle_http_request(&daemon, raw.as_bytes()).expect("response");
    let text = String::from_utf8(response).expect("utf8");
    assert!(text.starts_with("HTTP/1.1 200 OK"));
    assert!(text.contains("\"code\":200"));
}

#[test]
fn http_get_is_not_allowed() {
    let daemon = ControlDaemon::test_instance();
    let response =
        http::handle_http_request(&daemon, b"GET /config/query HTTP/1.1\r\nHost: x\r\n\r\n")
            .expect("response");
    let text = String::from_utf8(response).expect("utf8");
    assert!(text.starts_with("HTTP/1.1 405"));
}

#[test]
fn http_framing_helpers() {
    let raw = b"POST /clone/pull?x=1 HTTP/1.1\r\ncontent-length: 12\r\n\r\n{\"a\":true}  ";
    let end = http::find_header_end(raw).expect("end");
    assert_eq!(http::parse_content_length(&raw[..end]), Some(12));
    assert_eq!(
        http::parse_request_line(&raw[..end]),
        Some(("POST".to_string(), "/clone/pull?x=1".to_string()))
    );
    assert_eq!(Endpoint::from_path("/clone/pull?x=1"), Some(Endpoint::ClonePull));
    assert_eq!(Endpoint::from_path("/clone/pull/"), Some(Endpoint::ClonePull));
    assert!(http::find_header_end(b"POST / HTTP/1.1\r\n").is_none());
}

#[test]
fn clone_push_without_lists_leaves_store_alone() {
    let daemon = seeded_daemon(clone_settings(""));
    let code = daemon.version().code;
    let before = daemon.export_settings().expect("before");

    for data in [
        json!({ "version_code": code }),
        json!({ "version_code": code, "sender_list": [] }),
        json!({ "version_code": code, "rule_list": [] }),
    ] {
        let reply = daemon.handle_request("/clone/push", &body(Some(data), ""));
        assert_eq!(reply.status, 500);
        let resp = envelope(&reply.body);
        assert_eq!(resp.code, HTTP_FAILURE_CODE);
        assert!(resp.msg.contains("_list"), "{}", resp.msg);
    }
    assert_eq!(daemon.export_settings().expect("after"), before);
}

#[test]
fn clone_push_keeps_unmodeled_rule_fields() {
    let daemon = seeded_daemon(clone_settings(""));
    let code = daemon.version().code;
    let reply = daemon.handle_request(
        "/clone/push",
        &body(
            Some(json!({
                "version_code": code,
                "sender_list": [{ "id": 1, "type": 0, "name": "bark" }],
                "rule_list": [{
                    "id": 2,
                    "type": "sms",
                    "sender_id": 1,
                    "sender_list": "1",
                    "sender_logic": "UNTIL_FAIL",
                    "silent_period": 30
                }]
            })),
            "",
        ),
    );
    assert_eq!(reply.status, 200, "{}", reply.body);

    let pulled = daemon.handle_request(
        "/clone/pull",
        &body(Some(json!({ "version_code": code })), ""),
    );
    let data = envelope(&pulled.body).data.expect("data");
    assert_eq!(data["rule_list"][0]["sender_logic"], "UNTIL_FAIL");
    assert_eq!(data["rule_list"][0]["silent_period"], 30);
    assert_eq!(data["rule_list"][0]["sender_list"], "1");
}

#[test]
fn signed_server_checks_signature_before_endpoint_switches() {
    let daemon = ControlDaemon::test_instance();
    daemon.set_server_settings(ServerSettings {
        server_sign_key: "secret".into(),
        ..ServerSettings::default()
    });

    let unsigned = daemon.handle_request("/clone/pull", b"{}");
    assert_eq!(unsigned.status, 500);
    let msg = envelope(&unsigned.body).msg;
    assert!(msg.contains("sign"), "{}", msg);
    assert!(!msg.contains("disabled"), "{}", msg);

    let signed = daemon.handle_request("/clone/pull", &body(None, "secret"));
    assert!(envelope(&signed.body).msg.contains("disabled"));
}
