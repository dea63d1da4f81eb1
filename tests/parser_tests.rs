//! Parser and facade behaviour over realistic schema files

use idl_registry::ast::CommentPlacement;
use idl_registry::schema::{self, MissingPackagePolicy, SchemaFacade};
use idl_registry::{parse, parse_with, Node, NodeKind, ParseOptions, RegistryError};
use proptest::prelude::*;

const COMMON: &str = include_str!("fixtures/common.proto");
const USER: &str = include_str!("fixtures/user.proto");

fn buf() -> ParseOptions {
    ParseOptions::with_namespace("buf")
}

fn directive_pairs(node: &Node) -> Vec<(String, String)> {
    node.directives
        .iter()
        .map(|d| (d.option.clone(), d.value.clone()))
        .collect()
}

// =============================================================================
// Round-trip stability
// =============================================================================

#[test]
fn test_parsing_twice_gives_identical_trees() {
    for source in [COMMON, USER] {
        let first = parse_with(source, &buf()).unwrap();
        let second = parse_with(source, &buf()).unwrap();

        assert_eq!(first, second);
        assert_eq!(first.node_count(), second.node_count());
        assert_eq!(schema::package_name(&first), schema::package_name(&second));
        let values = |root: &Node| -> Vec<String> {
            root.all_directives().iter().map(|d| d.value.clone()).collect()
        };
        assert_eq!(values(&first), values(&second));
    }
}

#[test]
fn test_tree_survives_json() {
    let root = parse_with(USER, &buf()).unwrap();
    let json = serde_json::to_string(&root).unwrap();
    let back: Node = serde_json::from_str(&json).unwrap();
    assert_eq!(root, back);
}

// =============================================================================
// Directives
// =============================================================================

#[test]
fn test_fixture_directives_land_on_declarations() {
    let root = parse_with(USER, &buf()).unwrap();

    let user = root.find("message", "User").unwrap();
    assert_eq!(
        directive_pairs(user),
        vec![
            ("table".to_string(), "users".to_string()),
            ("owner".to_string(), "identity-team".to_string()),
        ]
    );

    let email = root.find("field", "email").unwrap();
    assert_eq!(directive_pairs(email), vec![("pii".to_string(), "true".to_string())]);
    assert!(root.find("field", "id").unwrap().directives.is_empty());

    let rpc = root.find("rpc", "GetUser").unwrap();
    assert_eq!(directive_pairs(rpc), vec![("auth".to_string(), "required".to_string())]);
}

#[test]
fn test_trailing_directive_on_field() {
    let root = parse_with(COMMON, &buf()).unwrap();
    let nanos = root.find("field", "nanos").unwrap();
    assert_eq!(nanos.comments[0].placement, CommentPlacement::Trailing);
    assert_eq!(directive_pairs(nanos), vec![("unit".to_string(), "ns".to_string())]);

    let timestamp = root.find("message", "Timestamp").unwrap();
    assert_eq!(timestamp.comments.len(), 2);
    assert_eq!(timestamp.directives[0].value, "Eq, Hash");
}

#[test]
fn test_eof_comment_is_detached() {
    let root = parse_with(USER, &buf()).unwrap();
    let tail: Vec<_> = root
        .children()
        .iter()
        .rev()
        .take(2)
        .map(|n| n.kind_name())
        .collect();
    assert_eq!(tail, vec!["directive", "comment"]);
    match &root.children().last().unwrap().kind {
        NodeKind::Directive(d) => assert_eq!(d.value, "ignore_eof"),
        other => panic!("expected directive, got {:?}", other),
    }
}

#[test]
fn test_other_namespaces_are_ignored() {
    let source = "// @acme:table:users\n// @buf:owner:core\nmessage A {}";
    let root = parse_with(source, &buf()).unwrap();
    let message = root.find("message", "A").unwrap();
    assert_eq!(directive_pairs(message), vec![("owner".to_string(), "core".to_string())]);

    let any = parse(source).unwrap();
    assert_eq!(any.find("message", "A").unwrap().directives.len(), 2);
}

#[test]
fn test_directive_positions_point_at_marker() {
    let root = parse_with("message A {} // @buf:k:v\n", &buf()).unwrap();
    let directive = &root.find("message", "A").unwrap().directives[0];
    assert_eq!(directive.span.start.line, 1);
    assert_eq!(directive.span.start.column, 17);
    assert!(directive.span.end.column > directive.span.start.column);
}

// =============================================================================
// Facade
// =============================================================================

#[test]
fn test_empty_input_tolerance() {
    let root = parse("").unwrap();
    assert!(root.children().is_empty());
    assert!(schema::validate("").is_ok());
    assert!(schema::validate("syntax = \"proto3\";").is_ok());
    assert!(schema::validate("   \n// only a comment\n").is_ok());
}

#[test]
fn test_import_flag_fidelity() {
    let imports = schema::extract_imports(
        "import \"a.proto\"; import public \"b.proto\"; import weak \"c.proto\";",
    )
    .unwrap();
    let flags: Vec<_> = imports
        .iter()
        .map(|i| (i.path.as_str(), i.public, i.weak))
        .collect();
    assert_eq!(
        flags,
        vec![
            ("a.proto", false, false),
            ("b.proto", true, false),
            ("c.proto", false, true),
        ]
    );

    let from_fixture = schema::extract_imports(USER).unwrap();
    assert_eq!(from_fixture.len(), 3);
    assert!(from_fixture[1].public);
    assert!(from_fixture[2].weak);
}

#[test]
fn test_package_extraction_and_policy() {
    assert_eq!(schema::extract_package_name(USER).unwrap(), "acme.user.v1");

    let strict = SchemaFacade::default();
    assert!(matches!(
        strict.extract_package_name("message A {}"),
        Err(RegistryError::NoPackage)
    ));

    let lenient = SchemaFacade::new(ParseOptions::default(), MissingPackagePolicy::Empty);
    assert_eq!(lenient.extract_package_name("message A {}").unwrap(), "");
}

#[test]
fn test_syntax_error_carries_position() {
    match schema::validate("message A {\n  int32 x = ;\n}") {
        Err(RegistryError::Syntax { line, column, .. }) => {
            assert_eq!(line, 2);
            assert_eq!(column, 13);
        }
        other => panic!("expected syntax error, got {:?}", other),
    }
}

#[test]
fn test_parse_file_and_invalid_utf8() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("user.proto");
    std::fs::write(&path, USER).unwrap();
    let root = schema::parse_file(&path).unwrap();
    assert!(root.find("service", "UserService").is_some());

    assert!(matches!(
        schema::parse_file(dir.path().join("missing.proto")),
        Err(RegistryError::FileOpen { .. })
    ));

    let bytes: &[u8] = b"message A {}\xff";
    assert!(matches!(
        schema::parse_reader(bytes),
        Err(RegistryError::InvalidUtf8 { byte_offset: 12 })
    ));
}

// =============================================================================
// Robustness
// =============================================================================

proptest! {
    #[test]
    fn parser_never_panics_on_arbitrary_bytes(bytes in proptest::collection::vec(any::<u8>(), 0..512)) {
        let _ = schema::parse_reader(bytes.as_slice());
    }

    #[test]
    fn parser_never_panics_on_schema_like_text(source in "[a-z{}=;\"/*@:.0-9 \n]{0,256}") {
        if let Ok(root) = parse(&source) {
            for node in root.walk() {
                prop_assert!(node.span.end >= node.span.start);
            }
        }
    }
}
