use super::helpers::{
    actions, engine, fileinto, require, run, run_traced, script, try_run, FakeMessage,
};
use crate::engine::Engine;
use crate::error::{ExecStatus, RuntimeError};
use crate::message::MessageContext;
use crate::opcode::{OpCode, OPERAND_STRING, OPERAND_STRING_LIST, OPT_END};
use crate::result::Action;
use crate::settings::Settings;
use sieve_ast::builder::NodeBuilder;
use sieve_ast::{command, test, Command};
use sieve_binary::BinaryBuilder;

fn if_then(condition: NodeBuilder, then: Vec<Command>) -> Command {
    command("if").test(condition).block(then).build()
}

fn filed_if(condition: NodeBuilder, message: &mut FakeMessage) -> bool {
    let result = run(
        &script(vec![
            require(&["fileinto"]),
            if_then(condition, vec![command("fileinto").string("Hit").build()]),
        ]),
        message,
    );
    actions(&result).contains(&fileinto("Hit"))
}

#[test]
fn test_empty_script_keeps() {
    let result = run(&script(Vec::new()), &mut FakeMessage::new());
    assert!(result.actions().is_empty());
    assert!(result.implicit_keep());
}

#[test]
fn test_header_is_respects_comparator() {
    let mut message = FakeMessage::new().header("Subject", "ABC");
    assert!(filed_if(test("header").tag("is").string("subject").string("abc"), &mut message));
    assert!(!filed_if(
        test("header")
            .tag("comparator")
            .string("i;octet")
            .tag("is")
            .string("subject")
            .string("abc"),
        &mut message
    ));
}

#[test]
fn test_header_contains() {
    let mut message = FakeMessage::new().header("Subject", "Hello World");
    assert!(filed_if(test("header").tag("contains").string("subject").string("lo wo"), &mut message));
    assert!(!filed_if(test("header").tag("contains").string("subject").string("xyz"), &mut message));
}

#[test]
fn test_header_default_match_type_is_is() {
    let mut message = FakeMessage::new().header("X-Tag", "spam");
    assert!(filed_if(test("header").string("x-tag").string("SPAM"), &mut message));
    assert!(!filed_if(test("header").string("x-tag").string("spa"), &mut message));
}

#[test]
fn test_header_matches_wildcards() {
    let mut message = FakeMessage::new().header("Subject", "aXXXbYc");
    assert!(filed_if(test("header").tag("matches").string("subject").string("a*b?c"), &mut message));

    let mut message = FakeMessage::new().header("Subject", "aXXXbYYc");
    assert!(!filed_if(test("header").tag("matches").string("subject").string("a*b?c"), &mut message));
}

#[test]
fn test_header_any_of_several_fields() {
    let mut message = FakeMessage::new().header("Cc", "list@example.org");
    assert!(filed_if(
        test("header")
            .tag("contains")
            .strings(["to", "cc"])
            .strings(["nothing", "list@"]),
        &mut message
    ));
}

#[test]
fn test_address_parts() {
    let mut message = FakeMessage::new().header("From", "Alice Example <Alice@Example.COM>");
    assert!(filed_if(
        test("address").tag("all").string("from").string("alice@example.com"),
        &mut message
    ));
    assert!(filed_if(
        test("address").tag("domain").string("from").string("example.com"),
        &mut message
    ));
    assert!(filed_if(
        test("address").tag("localpart").string("from").string("alice"),
        &mut message
    ));
    assert!(!filed_if(
        test("address").tag("domain").string("from").string("alice"),
        &mut message
    ));
}

#[test]
fn test_address_list_and_groups() {
    let mut message = FakeMessage::new().header(
        "To",
        "undisclosed:;, bob@one.example, \"Carol Q.\" <carol@two.example>",
    );
    assert!(filed_if(
        test("address").tag("domain").string("to").string("two.example"),
        &mut message
    ));
}

#[test]
fn test_unparseable_address_only_under_all() {
    let mut message = FakeMessage::new().header("From", "not an address");
    assert!(filed_if(
        test("address").tag("all").string("from").string("not an address"),
        &mut message
    ));
    assert!(!filed_if(
        test("address").tag("localpart").tag("contains").string("from").string("not"),
        &mut message
    ));
}

#[test]
fn test_exists() {
    let mut message = FakeMessage::new().header("From", "a@b.c").header("Subject", "x");
    assert!(filed_if(test("exists").strings(["from", "subject"]), &mut message));
    assert!(!filed_if(test("exists").strings(["from", "x-missing"]), &mut message));
}

#[test]
fn test_size() {
    let mut message = FakeMessage::new().size(5000);
    assert!(filed_if(test("size").tag("over").number(1000), &mut message));
    assert!(!filed_if(test("size").tag("under").number(1000), &mut message));
    assert!(!filed_if(test("size").tag("over").number(5000), &mut message));
}

#[test]
fn test_logical_tests() {
    let mut message = FakeMessage::new().header("Subject", "offer");

    assert!(filed_if(test("not").test(test("false")), &mut message));
    assert!(filed_if(
        test("anyof").tests(vec![
            test("false"),
            test("header").tag("is").string("subject").string("offer"),
        ]),
        &mut message
    ));
    assert!(!filed_if(
        test("allof").tests(vec![
            test("true"),
            test("header").tag("is").string("subject").string("other"),
        ]),
        &mut message
    ));
    assert!(filed_if(
        test("not").test(test("allof").tests(vec![test("true"), test("false")])),
        &mut message
    ));
}

#[test]
fn test_if_elsif_else_chain() {
    let chain = |subject: &str| {
        let mut message = FakeMessage::new().header("Subject", subject);
        let result = run(
            &script(vec![
                require(&["fileinto"]),
                if_then(
                    test("header").tag("contains").string("subject").string("one"),
                    vec![command("fileinto").string("One").build()],
                ),
                command("elsif")
                    .test(test("header").tag("contains").string("subject").string("two"))
                    .block(vec![command("fileinto").string("Two").build()])
                    .build(),
                command("else")
                    .block(vec![command("fileinto").string("Other").build()])
                    .build(),
            ]),
            &mut message,
        );
        actions(&result)
    };

    assert_eq!(chain("one two"), vec![fileinto("One")]);
    assert_eq!(chain("just two"), vec![fileinto("Two")]);
    assert_eq!(chain("three"), vec![fileinto("Other")]);
}

#[test]
fn test_stop_ends_execution_and_keeps_prior_actions() {
    let result = run(
        &script(vec![
            command("discard").build(),
            command("stop").build(),
            command("redirect").string("late@example.org").build(),
        ]),
        &mut FakeMessage::new(),
    );
    assert_eq!(actions(&result), vec![Action::Discard]);
    assert!(!result.implicit_keep());
}

#[test]
fn test_stop_inside_block() {
    let result = run(
        &script(vec![
            if_then(test("true"), vec![command("keep").build(), command("stop").build()]),
            command("discard").build(),
        ]),
        &mut FakeMessage::new(),
    );
    assert_eq!(actions(&result), vec![Action::Keep]);
}

#[test]
fn test_redirect_cancels_implicit_keep() {
    let result = run(
        &script(vec![command("redirect").string("bob@example.org").build()]),
        &mut FakeMessage::new(),
    );
    assert_eq!(
        actions(&result),
        vec![Action::Redirect {
            address: "bob@example.org".to_string()
        }]
    );
    assert!(!result.implicit_keep());
}

#[test]
fn test_duplicate_actions_merged() {
    let result = run(
        &script(vec![
            require(&["fileinto"]),
            command("fileinto").string("Lists").build(),
            command("fileinto").string("Lists").build(),
            command("keep").build(),
            command("keep").build(),
        ]),
        &mut FakeMessage::new(),
    );
    assert_eq!(actions(&result), vec![fileinto("Lists"), Action::Keep]);
}

#[test]
fn test_invalid_redirect_address_fails() {
    let err = try_run(
        &script(vec![
            require(&["variables"]),
            command("set").string("target").string("not an address").build(),
            command("redirect").string("${target}").build(),
        ]),
        &mut FakeMessage::new(),
    )
    .unwrap_err();
    assert_eq!(err.status(), ExecStatus::Failure);
}

#[test]
fn test_action_limit() {
    let engine = Engine::new(Settings {
        max_actions: 1,
        ..Settings::default()
    });
    let (binary, _) = engine
        .compile(
            &script(vec![
                require(&["fileinto"]),
                command("fileinto").string("A").build(),
                command("fileinto").string("B").build(),
            ]),
            0,
            false,
        )
        .unwrap();
    let err = engine
        .execute(&binary, &mut FakeMessage::new(), &mut MessageContext::new())
        .unwrap_err();
    match err {
        RuntimeError::Failure(reason) => assert!(reason.contains("policy limit")),
        other => panic!("Expected Failure, got {:?}", other),
    }
}

#[test]
fn test_temporary_message_failure() {
    let mut message = FakeMessage::new();
    message.temporary_failure = true;
    let err = try_run(
        &script(vec![if_then(
            test("header").string("subject").string("x"),
            vec![command("discard").build()],
        )]),
        &mut message,
    )
    .unwrap_err();
    assert_eq!(err.status(), ExecStatus::TempFailure);
}

#[test]
fn test_trace_records_tests_and_actions() {
    let mut message = FakeMessage::new().header("Subject", "Hello World");
    let (result, trace) = run_traced(
        &script(vec![if_then(
            test("header").tag("contains").string("subject").string("world"),
            vec![command("discard").build()],
        )]),
        &mut message,
    );
    assert_eq!(actions(&result), vec![Action::Discard]);
    assert!(trace.contains("## Started executing script"));
    assert!(trace.contains("header test"));
    assert!(trace.contains("=> true"));
    assert!(trace.contains("discard"));
    assert!(trace.contains("## Finished executing script"));
}

#[test]
fn test_trace_reports_stop() {
    let (_, trace) = run_traced(&script(vec![command("stop").build()]), &mut FakeMessage::new());
    assert!(trace.contains("## Interrupted by stop"));
}

#[test]
fn test_single_string_in_list_slot_is_corrupt() {
    let mut builder = BinaryBuilder::new();
    let code = builder.main_program();
    code.emit_byte(OpCode::Header.as_u8());
    code.emit_byte(OPERAND_STRING_LIST);
    code.emit_integer(1);
    code.emit_byte(OPERAND_STRING);
    code.emit_string("subject");
    code.emit_byte(OPERAND_STRING);
    code.emit_string("offer");
    code.emit_byte(OPT_END);
    code.emit_byte(OPT_END);
    let binary = builder.finish();

    let err = engine()
        .execute(&binary, &mut FakeMessage::new(), &mut MessageContext::new())
        .unwrap_err();
    assert_eq!(err.status(), ExecStatus::BinCorrupt);
    match err {
        RuntimeError::Corrupt { reason, .. } => {
            assert_eq!(reason, "expected string list operand, found STRING")
        }
        other => panic!("Expected Corrupt, got {:?}", other),
    }
}
