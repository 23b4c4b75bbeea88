use super::helpers::{compile, compile_errors, engine, require, script};
use crate::code::{BinaryDump, Disassembler};
use crate::compiler::Severity;
use crate::engine::Engine;
use crate::error::CompileError;
use crate::extension::{ExtensionDef, ExtensionRegistry};
use crate::settings::Settings;
use sieve_ast::builder::NodeBuilder;
use sieve_ast::{command, test};
use sieve_binary::CodeReader;

#[test]
fn test_unknown_command() {
    let diagnostics = compile_errors(&script(vec![command("frobnicate").build()]));
    assert!(diagnostics.mentions("unknown command 'frobnicate'"));
}

#[test]
fn test_extension_command_requires_require() {
    let diagnostics = compile_errors(&script(vec![command("fileinto").string("Spam").build()]));
    assert!(diagnostics.mentions("unknown command 'fileinto'"));

    compile(&script(vec![
        require(&["fileinto"]),
        command("fileinto").string("Spam").build(),
    ]));
}

#[test]
fn test_require_must_lead() {
    let diagnostics = compile_errors(&script(vec![
        command("keep").build(),
        require(&["fileinto"]),
    ]));
    assert!(diagnostics.mentions("can only be used at the beginning"));
}

#[test]
fn test_unknown_capability() {
    let diagnostics = compile_errors(&script(vec![require(&["vnd.unknown"])]));
    assert!(diagnostics.mentions("unknown Sieve capability 'vnd.unknown'"));
}

#[test]
fn test_elsif_must_follow_if() {
    let diagnostics = compile_errors(&script(vec![command("elsif")
        .test(test("true"))
        .block(vec![command("keep").build()])
        .build()]));
    assert!(diagnostics.mentions("must follow"));
}

#[test]
fn test_if_requires_block() {
    let diagnostics = compile_errors(&script(vec![command("if").test(test("true")).build()]));
    assert!(diagnostics.mentions("requires a block"));
}

#[test]
fn test_empty_test_list_rejected() {
    let diagnostics = compile_errors(&script(vec![command("if")
        .test(test("anyof").tests(Vec::<NodeBuilder>::new()))
        .block(vec![command("keep").build()])
        .build()]));
    assert!(diagnostics.mentions("must not be empty"));
}

#[test]
fn test_test_used_as_command() {
    let diagnostics = compile_errors(&script(vec![command("true").build()]));
    assert!(diagnostics.mentions("cannot be used as a command"));
}

#[test]
fn test_tag_after_positional_rejected() {
    let diagnostics = compile_errors(&script(vec![command("if")
        .test(test("header").string("subject").string("x").tag("contains"))
        .block(vec![command("keep").build()])
        .build()]));
    assert!(diagnostics.mentions("must come before the positional arguments"));
}

#[test]
fn test_conflicting_match_types() {
    let diagnostics = compile_errors(&script(vec![command("if")
        .test(
            test("header")
                .tag("is")
                .tag("contains")
                .string("subject")
                .string("x"),
        )
        .block(vec![command("keep").build()])
        .build()]));
    assert!(diagnostics.mentions("conflicts with an earlier tag"));
}

#[test]
fn test_wrong_argument_count() {
    let diagnostics = compile_errors(&script(vec![command("redirect").build()]));
    assert!(diagnostics.mentions("expects 1 positional argument(s), but 0 were found"));
}

#[test]
fn test_unknown_comparator() {
    let diagnostics = compile_errors(&script(vec![command("if")
        .test(
            test("header")
                .tag("comparator")
                .string("i;nonsense")
                .string("subject")
                .string("x"),
        )
        .block(vec![command("keep").build()])
        .build()]));
    assert!(diagnostics.mentions("unknown comparator 'i;nonsense'"));
}

#[test]
fn test_diagnostics_carry_lines() {
    let diagnostics = compile_errors(&script(vec![
        command("keep").line(1).build(),
        command("frobnicate").line(7).build(),
    ]));
    let error = diagnostics
        .iter()
        .find(|d| d.severity == Severity::Error)
        .unwrap();
    assert_eq!(error.line, Some(7));
}

#[test]
fn test_invalid_variable_name() {
    let diagnostics = compile_errors(&script(vec![
        require(&["variables"]),
        command("set").string("1abc").string("value").build(),
    ]));
    assert!(diagnostics.mentions("invalid variable name '1abc'"));
}

#[test]
fn test_equal_precedence_modifiers_rejected() {
    let diagnostics = compile_errors(&script(vec![
        require(&["variables"]),
        command("set")
            .tag("upper")
            .tag("lower")
            .string("name")
            .string("value")
            .build(),
    ]));
    assert!(diagnostics.mentions("equal precedence"));
}

#[test]
fn test_protected_header_rejected() {
    let diagnostics = compile_errors(&script(vec![
        require(&["editheader"]),
        command("addheader").string("Received").string("forged").build(),
    ]));
    assert!(diagnostics.mentions("'Received' is protected"));
}

#[test]
fn test_deleteheader_last_needs_index() {
    let diagnostics = compile_errors(&script(vec![
        require(&["editheader"]),
        command("deleteheader").tag("last").string("X-Spam").build(),
    ]));
    assert!(diagnostics.mentions("requires the :index tag"));
}

#[test]
fn test_deleteheader_index_zero() {
    let diagnostics = compile_errors(&script(vec![
        require(&["editheader"]),
        command("deleteheader").tag("index").number(0).string("X-Spam").build(),
    ]));
    assert!(diagnostics.mentions("at least 1"));
}

#[test]
fn test_unknown_envelope_part() {
    let diagnostics = compile_errors(&script(vec![
        require(&["envelope"]),
        command("if")
            .test(test("envelope").string("bogus").string("x"))
            .block(vec![command("keep").build()])
            .build(),
    ]));
    assert!(diagnostics.mentions("envelope part 'bogus' is not supported"));
}

#[test]
fn test_invalid_relation() {
    let diagnostics = compile_errors(&script(vec![
        require(&["relational"]),
        command("if")
            .test(
                test("header")
                    .tag("count")
                    .string("between")
                    .string("received")
                    .string("2"),
            )
            .block(vec![command("keep").build()])
            .build(),
    ]));
    assert!(diagnostics.has_errors());
}

#[test]
fn test_extensions_linked_in_activation_order() {
    let binary = compile(&script(vec![
        require(&["variables", "fileinto"]),
        command("keep").build(),
    ]));
    let names: Vec<&str> = binary.extensions().iter().map(|e| e.name.as_str()).collect();
    assert_eq!(
        names,
        vec![
            "variables",
            "fileinto",
            "comparator-i;octet",
            "comparator-i;ascii-casemap"
        ]
    );
}

#[test]
fn test_listing_decodes_every_operation() {
    let binary = compile(&script(vec![command("if")
        .test(test("header").tag("contains").string("subject").string("offer"))
        .block(vec![command("discard").build()])
        .build()]));
    let program = binary.main_program().unwrap();
    let registry = engine();
    let ext_map = crate::code::link_extensions(registry.registry(), &binary).unwrap();
    let disassembler = Disassembler::new(registry.registry(), &ext_map, CodeReader::new(&program));
    disassembler.verify().unwrap();

    let mut listing = String::new();
    disassembler.write_listing(&mut listing).unwrap();
    assert!(listing.contains("HEADER"));
    assert!(listing.contains("JMPFALSE"));
    assert!(listing.contains("DISCARD"));
    assert!(listing.contains("match type: :contains"));
    assert!(listing.trim_end().ends_with("[end]"));
}

#[test]
fn test_dump_includes_variables_block() {
    let binary = compile(&script(vec![
        require(&["variables"]),
        command("set").string("folder").string("Lists").build(),
    ]));
    let dump = binary.dump(engine().registry()).unwrap();
    assert!(dump.contains("(variables):"));
    assert!(dump.contains("0: folder"));
    assert!(dump.contains("Main program"));
    assert!(dump.contains("SET"));
}

fn conflicts_with_beta(_this: &ExtensionDef, other: &ExtensionDef) -> bool {
    other.name == "vnd.test.beta"
}

static ALPHA: ExtensionDef = ExtensionDef {
    name: "vnd.test.alpha",
    conflicts: conflicts_with_beta,
    ..ExtensionDef::EMPTY
};

static BETA: ExtensionDef = ExtensionDef {
    name: "vnd.test.beta",
    ..ExtensionDef::EMPTY
};

#[test]
fn test_conflicting_extensions_are_rejected() {
    let mut registry = ExtensionRegistry::new();
    registry.register(&ALPHA);
    registry.register(&BETA);
    let engine = Engine::with_registry(registry, Settings::default());

    engine
        .compile(&script(vec![require(&["vnd.test.alpha"])]), 0, false)
        .unwrap();
    engine
        .compile(&script(vec![require(&["vnd.test.beta"])]), 0, false)
        .unwrap();

    match engine.compile(&script(vec![require(&["vnd.test.beta", "vnd.test.alpha"])]), 0, false) {
        Err(CompileError::Validation(diagnostics)) => assert!(diagnostics
            .mentions("extension 'vnd.test.alpha' conflicts with extension 'vnd.test.beta'")),
        other => panic!("Expected validation failure, got {:?}", other.map(|_| ())),
    }
}
