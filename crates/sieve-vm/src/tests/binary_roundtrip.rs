use super::helpers::{actions, engine, fileinto, require, script, FakeMessage, RecordingHandler};
use crate::error::{ExecStatus, RuntimeError};
use crate::message::MessageContext;
use sieve_ast::{command, test, Script};
use sieve_binary::{BinaryError, UsageUpdate, BLOCK_MAIN_PROGRAM};
use std::fs;
use std::path::Path;
use std::time::Duration;
use tempfile::tempdir;

fn filing_script() -> Script {
    script(vec![
        require(&["fileinto", "variables"]),
        command("set").string("box").string("Lists").build(),
        command("if")
            .test(test("header").tag("contains").string("list-id").string("rust"))
            .block(vec![command("fileinto").string("${box}").build()])
            .build(),
    ])
}

/// Overwrite the first byte of the main program in a saved binary
fn corrupt_main_program(path: &Path) {
    let engine = engine();
    let binary = engine.load(path).unwrap();
    let size = binary.block_size(BLOCK_MAIN_PROGRAM).unwrap() as usize;
    drop(binary);

    let mut bytes = fs::read(path).unwrap();
    let start = bytes.len() - size;
    bytes[start] = 0xEE;
    fs::write(path, bytes).unwrap();
}

#[test]
fn test_saved_binary_runs_like_the_original() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("filing.svbin");
    let engine = engine();

    let (compiled, _) = engine.compile(&filing_script(), 10, false).unwrap();
    engine.save(&compiled, &path).unwrap();
    let loaded = engine.load(&path).unwrap();

    assert_eq!(loaded.extensions(), compiled.extensions());
    assert!(loaded.is_up_to_date(10).unwrap());
    assert!(!loaded.is_up_to_date(11).unwrap());

    let mut message = FakeMessage::new().header("List-Id", "<rust.lists.example>");
    let original = engine
        .execute(&compiled, &mut message, &mut MessageContext::new())
        .unwrap();
    let reloaded = engine
        .execute(&loaded, &mut message, &mut MessageContext::new())
        .unwrap();

    assert_eq!(actions(&original), vec![fileinto("Lists")]);
    assert_eq!(actions(&reloaded), actions(&original));
}

#[test]
fn test_bad_magic_is_not_valid_and_gets_recompiled() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("garbage.svbin");
    fs::write(&path, vec![0u8; 64]).unwrap();
    let engine = engine();

    match engine.load(&path) {
        Err(BinaryError::NotValid(reason)) => assert!(reason.contains("magic")),
        other => panic!("Expected NotValid, got {:?}", other),
    }

    let binary = engine.open(&filing_script(), 0, &path, false).unwrap();
    assert_eq!(binary.extensions().len(), 4);
    engine.load(&path).unwrap();
}

#[test]
fn test_stale_binary_is_recompiled() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("stale.svbin");
    let engine = engine();

    let (old, _) = engine
        .compile(&script(vec![command("discard").build()]), 100, false)
        .unwrap();
    engine.save(&old, &path).unwrap();

    let fresh = engine.open(&filing_script(), 200, &path, false).unwrap();
    assert!(fresh.is_up_to_date(200).unwrap());
    assert!(engine.load(&path).unwrap().is_up_to_date(200).unwrap());

    let reopened = engine.open(&filing_script(), 200, &path, false).unwrap();
    assert!(reopened.path().is_some());
}

#[test]
fn test_corrupt_binary_is_recompiled_once() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("corrupt.svbin");
    let engine = engine();
    let source = script(vec![command("discard").build()]);

    let (binary, _) = engine.compile(&source, 0, false).unwrap();
    engine.save(&binary, &path).unwrap();
    corrupt_main_program(&path);

    let loaded = engine.load(&path).unwrap();
    let err = engine
        .execute(&loaded, &mut FakeMessage::new(), &mut MessageContext::new())
        .unwrap_err();
    assert_eq!(err.status(), ExecStatus::BinCorrupt);

    let mut handler = RecordingHandler::default();
    let status = engine.execute_script(
        &source,
        0,
        Some(&path),
        false,
        &mut FakeMessage::new(),
        &mut MessageContext::new(),
        &mut handler,
    );
    assert_eq!(status, ExecStatus::Ok);
    assert_eq!(handler.log, vec!["discard"]);

    let repaired = engine.load(&path).unwrap();
    engine
        .execute(&repaired, &mut FakeMessage::new(), &mut MessageContext::new())
        .unwrap();
}

#[test]
fn test_resource_limit_disables_script_until_reset() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("limited.svbin");
    let engine = engine();
    let source = script(vec![command("discard").build()]);

    let (binary, _) = engine.compile(&source, 0, false).unwrap();
    engine.save(&binary, &path).unwrap();
    let loaded = engine.load(&path).unwrap();

    let exceeded = loaded
        .update_resource_usage(UsageUpdate {
            now: 1_700_000_000,
            cpu_time_ms: 10,
            reset_after_secs: 3600,
            limit_ms: Some(5),
            lock_timeout: Duration::from_secs(1),
        })
        .unwrap();
    assert!(exceeded);
    assert!(loaded.resource_limit_exceeded());

    match engine.execute(&loaded, &mut FakeMessage::new(), &mut MessageContext::new()) {
        Err(RuntimeError::ResourceLimit(_)) => {}
        other => panic!("Expected ResourceLimit, got {:?}", other),
    }

    // The flag is persisted, so a fresh load from disk is refused too
    let mut handler = RecordingHandler::default();
    let status = engine.execute_script(
        &source,
        0,
        Some(&path),
        false,
        &mut FakeMessage::new(),
        &mut MessageContext::new(),
        &mut handler,
    );
    assert_eq!(status, ExecStatus::ResourceLimit);
    assert_eq!(handler.log, vec!["keep"]);

    engine.reset_resource_usage(&loaded).unwrap();
    assert!(!loaded.resource_limit_exceeded());

    let mut handler = RecordingHandler::default();
    let status = engine.execute_script(
        &source,
        0,
        Some(&path),
        false,
        &mut FakeMessage::new(),
        &mut MessageContext::new(),
        &mut handler,
    );
    assert_eq!(status, ExecStatus::Ok);
    assert_eq!(handler.log, vec!["discard"]);
}

#[test]
fn test_failed_store_falls_back_to_keep() {
    let engine = engine();
    let source = script(vec![
        require(&["fileinto"]),
        command("fileinto").string("Missing").build(),
    ]);

    let mut handler = RecordingHandler {
        fail_mailbox: Some("Missing".to_string()),
        ..RecordingHandler::default()
    };
    let status = engine.execute_script(
        &source,
        0,
        None,
        false,
        &mut FakeMessage::new(),
        &mut MessageContext::new(),
        &mut handler,
    );
    assert_eq!(status, ExecStatus::Failure);
    assert_eq!(handler.log, vec!["keep"]);
}

#[test]
fn test_failed_fallback_keep_is_reported() {
    let engine = engine();
    let source = script(vec![
        require(&["fileinto"]),
        command("fileinto").string("Missing").build(),
    ]);

    let mut handler = RecordingHandler {
        fail_mailbox: Some("Missing".to_string()),
        fail_keep: true,
        ..RecordingHandler::default()
    };
    let status = engine.execute_script(
        &source,
        0,
        None,
        false,
        &mut FakeMessage::new(),
        &mut MessageContext::new(),
        &mut handler,
    );
    assert_eq!(status, ExecStatus::KeepFailed);
    assert!(handler.log.is_empty());
}

#[test]
fn test_uncompilable_script_keeps_message() {
    let engine = engine();
    let mut handler = RecordingHandler::default();
    let status = engine.execute_script(
        &script(vec![command("frobnicate").build()]),
        0,
        None,
        false,
        &mut FakeMessage::new(),
        &mut MessageContext::new(),
        &mut handler,
    );
    assert_eq!(status, ExecStatus::Failure);
    assert_eq!(handler.log, vec!["keep"]);
}
