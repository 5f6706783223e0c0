mod common;

use common::{open_session, reply, Backend};
use magnifier_core::FunctionCatalog;
use serde_json::{json, Value};
use std::sync::Arc;

fn catalog(entries: &[(u64, &str)]) -> FunctionCatalog {
    entries
        .iter()
        .map(|(id, name)| (*id, name.to_string()))
        .collect()
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn catalog_refresh_parses_listing_and_focuses_first_function() {
    let backend = Backend::new("1 main\n2 helper");
    let (session, service) = open_session(backend.responder());
    let reconciler = session.reconciler();

    reconciler.refresh_catalog().await.expect("refresh");

    let state = reconciler.snapshot();
    assert_eq!(state.catalog, catalog(&[(1, "main"), (2, "helper")]));
    assert_eq!(state.focus.id, 1);
    assert_eq!(state.focus.ir(), "ir of 1");
    assert_eq!(state.focus.code(), "code of 1");
    assert_eq!(service.commands(), vec!["lfa", "dec 1"]);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn blank_listing_clears_catalog_and_artifacts() {
    let backend = Backend::new("1 main\n2 helper");
    let (session, _service) = open_session(backend.responder());
    let reconciler = session.reconciler();
    reconciler.refresh_catalog().await.expect("refresh");
    assert!(reconciler.snapshot().focus.artifacts.is_some());

    backend.set_listing("  \n ");
    reconciler.refresh_catalog().await.expect("refresh");

    let state = reconciler.snapshot();
    assert!(state.catalog.is_empty());
    assert!(state.focus.artifacts.is_none());
    assert!(state.provenance.is_empty());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn newly_listed_function_takes_focus() {
    let backend = Backend::new("1 main");
    let (session, service) = open_session(backend.responder());
    let reconciler = session.reconciler();
    reconciler.refresh_catalog().await.expect("refresh");
    assert_eq!(reconciler.snapshot().focus.id, 1);

    backend.set_listing("1 main\n2 helper");
    reconciler.refresh_catalog().await.expect("refresh");

    let state = reconciler.snapshot();
    assert_eq!(state.focus.id, 2);
    assert_eq!(state.focus.code(), "code of 2");
    assert_eq!(service.commands(), vec!["lfa", "dec 1", "lfa", "dec 2"]);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn vanished_focus_moves_to_greatest_surviving_id_below() {
    let backend = Backend::new("1 a\n3 b\n5 c\n7 d");
    let (session, service) = open_session(backend.responder());
    let reconciler = session.reconciler();
    reconciler.refresh_catalog().await.expect("refresh");
    reconciler.focus(5).await.expect("focus");
    assert_eq!(reconciler.snapshot().focus.code(), "code of 5");

    backend.set_listing("1 a\n3 b\n7 d");
    reconciler.refresh_catalog().await.expect("refresh");

    let state = reconciler.snapshot();
    assert_eq!(state.focus.id, 3);
    assert_eq!(state.focus.code(), "code of 3");
    assert_eq!(service.commands().last().map(String::as_str), Some("dec 3"));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn vanished_focus_without_lower_id_falls_back_to_one() {
    let backend = Backend::new("2 a\n4 b");
    let (session, service) = open_session(backend.responder());
    let reconciler = session.reconciler();
    reconciler.refresh_catalog().await.expect("refresh");
    assert_eq!(reconciler.snapshot().focus.id, 2);

    backend.set_listing("4 b");
    reconciler.refresh_catalog().await.expect("refresh");

    assert_eq!(reconciler.snapshot().focus.id, 1);
    assert_eq!(service.commands().last().map(String::as_str), Some("dec 1"));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn unchanged_listing_keeps_focus_without_decompiling() {
    let backend = Backend::new("1 main\n2 helper");
    let (session, service) = open_session(backend.responder());
    let reconciler = session.reconciler();
    reconciler.refresh_catalog().await.expect("refresh");
    reconciler.refresh_catalog().await.expect("refresh");

    assert_eq!(service.commands(), vec!["lfa", "dec 1", "lfa"]);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn decompilation_builds_symmetric_provenance() {
    let backend = Backend::new("1 main");
    let (session, _service) = open_session(backend.responder());
    let reconciler = session.reconciler();
    reconciler.refresh_catalog().await.expect("refresh");

    let state = reconciler.snapshot();
    assert_eq!(state.provenance.len(), 2);
    assert_eq!(state.provenance.related("a"), ["20".to_string()]);
    assert_eq!(state.provenance.related("20"), ["a".to_string()]);
    assert!(!state.provenance.contains("5"));

    reconciler.select_ir(Some("0xA".to_string()));
    assert_eq!(reconciler.related_addresses(), vec!["20".to_string()]);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn plain_text_decompile_reply_leaves_state_untouched() {
    let backend = Backend::new("1 main");
    let (session, _service) = open_session(backend.responder());
    let reconciler = session.reconciler();
    reconciler.refresh_catalog().await.expect("refresh");
    let before = reconciler.snapshot();

    backend.set_structured(false);
    reconciler.refresh_artifacts().await.expect("refresh");

    assert_eq!(reconciler.snapshot(), before);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn eval_command_echoes_then_refreshes_catalog_once() {
    let backend = Backend::new("1 main");
    let (session, service) = open_session(backend.responder());
    let reconciler = session.reconciler();
    reconciler.refresh_catalog().await.expect("refresh");
    let before = service.requests().len();

    reconciler.eval_command("x").await.expect("eval");

    let state = reconciler.snapshot();
    assert_eq!(state.terminal.as_str(), "> x\nran x\n");
    let issued = service.commands()[before..].to_vec();
    assert_eq!(issued, vec!["x", "lfa"]);

    reconciler.clear_terminal();
    assert!(reconciler.snapshot().terminal.is_empty());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn upload_sends_hex_then_reloads_catalog_and_artifacts() {
    let backend = Backend::new("1 main\n2 helper");
    let (session, service) = open_session(backend.responder());
    let reconciler = session.reconciler();

    reconciler
        .upload_bitcode(&[0xde, 0xad, 0xbe, 0xef])
        .await
        .expect("upload");

    let requests = service.requests();
    assert_eq!(requests[0]["cmd"], "upload");
    assert_eq!(requests[0]["file"], "deadbeef");
    assert_eq!(service.commands(), vec!["upload", "lfa", "dec 1", "dec 1"]);
    assert_eq!(reconciler.snapshot().focus.code(), "code of 1");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn subscribers_observe_completed_operations() {
    let backend = Backend::new("1 main");
    let (session, _service) = open_session(backend.responder());
    let reconciler = session.reconciler();
    let mut updates = reconciler.subscribe();

    reconciler.refresh_catalog().await.expect("refresh");

    updates.changed().await.expect("update");
    let state = updates.borrow_and_update().clone();
    assert_eq!(state.focus.code(), "code of 1");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn focus_accepts_ids_missing_from_catalog() {
    let backend = Backend::new("1 main");
    let (session, service) = open_session(backend.responder());
    let reconciler = session.reconciler();
    reconciler.refresh_catalog().await.expect("refresh");

    reconciler.focus(99).await.expect("focus");

    let state = reconciler.snapshot();
    assert!(!state.catalog.contains(99));
    assert_eq!(state.focus.id, 99);
    assert_eq!(state.focus.code(), "code of 99");
    assert_eq!(service.commands().last().map(String::as_str), Some("dec 99"));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn late_reply_for_previous_focus_is_discarded() {
    let mut held: Option<Value> = None;
    let responder = Box::new(move |request: &Value| {
        let cmd = request["cmd"].as_str().unwrap_or_default().to_string();
        let Some(id) = cmd.strip_prefix("dec ") else {
            return vec![reply(request, json!(""))];
        };
        let output = json!({
            "ir": format!("ir of {id}"),
            "code": format!("code of {id}"),
            "provenance": {"0": [[id.parse::<u64>().expect("id"), 1]]}
        });
        match held.take() {
            None => {
                held = Some(reply(request, output));
                Vec::new()
            }
            Some(earlier) => vec![reply(request, output), earlier],
        }
    });
    let (session, service) = open_session(responder);
    let reconciler = Arc::clone(session.reconciler());

    let first = {
        let reconciler = Arc::clone(&reconciler);
        tokio::spawn(async move { reconciler.focus(2).await })
    };
    service.wait_for_requests(1).await;
    reconciler.focus(3).await.expect("focus 3");
    first.await.expect("join").expect("focus 2");

    let state = reconciler.snapshot();
    assert_eq!(state.focus.id, 3);
    let artifacts = state.focus.artifacts.expect("artifacts");
    assert_eq!(artifacts.function, 3);
    assert_eq!(artifacts.code, "code of 3");
    assert_eq!(state.provenance.related("3"), ["1".to_string()]);
    assert!(!state.provenance.contains("2"));
    assert_eq!(service.commands(), vec!["dec 2", "dec 3"]);
}
