mod common;

use common::{factory, load};
use css_blocks::CssBlocksError;

async fn parse_error(source: &str) -> CssBlocksError {
    let files = [("other.css", ".tab { color: red; }"), ("test.css", source)];
    let (factory, _) = factory(&files);
    match load(&factory, "test.css").await {
        Ok(_) => panic!("expected `{}` to fail", source),
        Err(err) => err,
    }
}

async fn error_message(source: &str) -> String {
    parse_error(source).await.to_string()
}

#[tokio::test]
async fn classes_cannot_be_combined() {
    let message = error_message(".foo.bar { color: red; }").await;
    assert!(message.contains("Cannot combine classes `.foo` and `.bar`"), "{}", message);
}

#[tokio::test]
async fn states_cannot_be_combined() {
    let message = error_message("[state|a][state|b] { color: red; }").await;
    assert!(message.contains("Cannot combine states `[state|a]` and `[state|b]`"), "{}", message);

    let message = error_message(".foo[state|g=a][state|g=b] { color: red; }").await;
    assert!(message.contains("Cannot combine states"), "{}", message);
}

#[tokio::test]
async fn classes_cannot_sit_on_the_root() {
    let message = error_message(".root.foo { color: red; }").await;
    assert!(message.contains("Cannot put block classes on the block's root element"), "{}", message);
}

#[tokio::test]
async fn plain_selectors_are_rejected() {
    let message = error_message("#main { color: red; }").await;
    assert!(message.contains("Id selectors are not allowed"), "{}", message);

    let message = error_message("* { color: red; }").await;
    assert!(message.contains("Universal selectors are not allowed"), "{}", message);

    let message = error_message("div.foo { color: red; }").await;
    assert!(message.contains("Tag name selectors are not allowed"), "{}", message);

    let message = error_message(".foo :hover { color: red; }").await;
    assert!(message.contains("Missing block object in selector component"), "{}", message);
}

#[tokio::test]
async fn pseudo_elements_belong_on_the_key() {
    let message = error_message(".foo::before .bar { color: red; }").await;
    assert!(message.contains("Pseudo-elements are only allowed on the key selector"), "{}", message);
}

#[tokio::test]
async fn class_level_objects_cannot_contain_the_root() {
    let message = error_message(".foo .root { color: red; }").await;
    assert!(message.contains("as an ancestor of a root-level object"), "{}", message);

    let message = error_message(".foo > [state|open] { color: red; }").await;
    assert!(message.contains("as an ancestor of a root-level object"), "{}", message);
}

#[tokio::test]
async fn class_and_root_cannot_be_siblings() {
    let message = error_message("[state|open] + .foo { color: red; }").await;
    assert!(message.contains("as siblings"), "{}", message);
}

#[tokio::test]
async fn distinct_root_level_objects_cannot_be_combined() {
    let message = error_message("[state|a] [state|b] { color: red; }").await;
    assert!(message.contains("Distinct root-level objects"), "{}", message);
}

#[tokio::test]
async fn legal_chains_parse() {
    let (factory, _) = factory(&[(
        "ok.css",
        "[state|open] .foo { color: red; }\n.root > .foo + .bar { color: red; }\n.foo ~ .foo[state|on] { color: red; }",
    )]);
    let block = load(&factory, "ok.css").await.unwrap();
    let graph = factory.graph();
    assert_eq!(graph[block].classes().len(), 2);
}

#[tokio::test]
async fn errors_carry_locations() {
    let err = parse_error(".ok { color: red; }\n\n  .a.b { color: red; }").await;
    let location = err.location().expect("syntax errors have a location");
    assert_eq!(location.filename, "test.css");
    assert_eq!(location.line, 3);
    assert_eq!(location.column, 3);
    assert!(err.to_string().ends_with("(test.css:3:3)"), "{}", err);
}

#[tokio::test]
async fn bookkeeping_belongs_in_the_root_rule() {
    let message = error_message(".foo { extends: other; }").await;
    assert!(message.contains("`extends` can only be declared in a `.root` rule"), "{}", message);

    let message = error_message(".root .foo { block-name: x; }").await;
    assert!(message.contains("`block-name` can only be declared"), "{}", message);
}

#[tokio::test]
async fn any_bare_root_selector_allows_bookkeeping() {
    let (factory, _) = factory(&[("file.css", ".root, .foo { block-name: listed; color: red; }")]);
    let block = load(&factory, "file.css").await.unwrap();
    let graph = factory.graph();
    assert_eq!(graph[block].name(), "listed");
    assert!(graph.lookup(block, ".foo").is_some());
}

#[tokio::test]
async fn referenced_classes_must_exist() {
    let message = error_message("@block-reference other from \"other.css\";\nother.missing .foo { color: blue; }").await;
    assert!(message.contains("No class named \"missing\" found in block \"other\""), "{}", message);
    assert!(message.ends_with("(test.css:2:1)"), "{}", message);
}

#[tokio::test]
async fn referenced_states_must_exist() {
    let message = error_message("@block-reference other from \"other.css\";\n.foo + other.tab[state|on] { color: blue; }").await;
    assert!(message.contains("No state `[state|on]` found in block \"other\""), "{}", message);

    let message = error_message("@block-reference other from \"other.css\";\nother[state|open] .foo { color: blue; }").await;
    assert!(message.contains("No state `[state|open]` found in block \"other\""), "{}", message);
}

#[tokio::test]
async fn block_names_must_be_identifiers() {
    let message = error_message(".root { block-name: 9lives; }").await;
    assert!(message.contains("Illegal block name. '9lives' is not a legal CSS identifier"), "{}", message);
}

#[tokio::test]
async fn declared_names_override_the_file_name() {
    let (factory, _) = factory(&[("file.css", ".root { block-name: custom; }")]);
    let block = load(&factory, "file.css").await.unwrap();
    assert_eq!(factory.graph()[block].name(), "custom");
}

#[tokio::test]
async fn extends_only_once() {
    let message = error_message(
        "@block-reference other from \"other.css\";\n.root { extends: other; }\n.root { extends: other; }",
    )
    .await;
    assert!(message.contains("A block can only be extended once"), "{}", message);
}

#[tokio::test]
async fn extends_needs_a_reference() {
    let message = error_message(".root { extends: nobody; }").await;
    assert!(message.contains("No block named \"nobody\" found"), "{}", message);
}

#[tokio::test]
async fn reference_names_are_unique() {
    let message = error_message(
        "@block-reference other from \"other.css\";\n@block-reference other from \"./other.css\";",
    )
    .await;
    assert!(message.contains("Cannot have two block references named `other`"), "{}", message);
}

#[tokio::test]
async fn anonymous_references_use_the_block_name() {
    let (factory, _) = factory(&[
        ("other.css", ".root { block-name: fancy; }"),
        ("test.css", "@block-reference \"other.css\";\nfancy .foo { color: red; }"),
    ]);
    let block = load(&factory, "test.css").await.unwrap();
    let graph = factory.graph();
    assert!(graph[block].reference("fancy").is_some());
}

#[tokio::test]
async fn malformed_css_is_a_syntax_error() {
    let err = parse_error(".foo { color red; }").await;
    assert!(matches!(err, CssBlocksError::InvalidBlockSyntax { .. }));
    assert!(err.to_string().contains("Malformed declaration `color red`"), "{}", err);
}
