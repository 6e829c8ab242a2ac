mod common;

use common::{factory, load};
use css_blocks::{Block, FileIdentifier, ObjectKey, Options};

const NAV: &str = "
@block-reference other from \"other.css\";
.root { color: red; }
[state|open] { color: blue; }
[state|size=large] { width: 10px; }
.item { color: green; }
.item[state|active] { color: white; }
.item[state|kind=primary] { color: black; }
";

const OTHER: &str = ".tab { color: red; } .tab[state|on] { color: blue; } [state|x] { color: green; }";

#[tokio::test]
async fn source_names_look_up_their_objects() {
    let (factory, _) = factory(&[("nav.css", NAV), ("other.css", OTHER)]);
    let nav = load(&factory, "nav.css").await.unwrap();
    let graph = factory.graph();

    let objects = graph.root(nav).all(false);
    assert_eq!(objects.len(), 6);
    for object in objects {
        assert_eq!(graph.lookup(nav, &object.as_source()), Some(object), "{}", object.as_source());
    }
}

#[tokio::test]
async fn referenced_objects_look_up_through_the_reference() {
    let (factory, _) = factory(&[("nav.css", NAV), ("other.css", OTHER)]);
    let nav = load(&factory, "nav.css").await.unwrap();
    let graph = factory.graph();
    let other = graph[nav].reference("other").unwrap();

    let tab = graph.lookup(nav, "other.tab").unwrap();
    assert_eq!(tab.id().block, other);
    assert_eq!(tab.as_source(), ".tab");

    let state = graph.lookup(nav, "other:state(x)").unwrap();
    assert_eq!(state, graph.lookup(other, "[state|x]").unwrap());

    let class_state = graph.lookup(nav, "other.tab[state|on]").unwrap();
    assert_eq!(class_state.parent(), Some(tab));
    assert_eq!(graph.lookup(nav, "other").unwrap(), graph.root(other));
    assert!(graph.lookup(nav, "other.missing").is_none());
}

#[tokio::test]
async fn names_and_classes() {
    let (factory, _) = factory(&[("nav.css", NAV), ("other.css", OTHER)]);
    let nav = load(&factory, "nav.css").await.unwrap();
    let graph = factory.graph();
    let options = Options::default();

    let cases = [
        (".root", "root", "nav"),
        ("[state|open]", "root--open", "nav--open"),
        ("[state|size=large]", "root--size-large", "nav--size-large"),
        (".item", "item", "nav__item"),
        (".item[state|active]", "item--active", "nav__item--active"),
        (".item[state|kind=primary]", "item--kind-primary", "nav__item--kind-primary"),
    ];
    for (source, local_name, class) in cases {
        let object = graph.lookup(nav, source).unwrap();
        assert_eq!(object.local_name(), local_name);
        assert_eq!(object.css_class(&options), class);
    }
}

#[tokio::test]
async fn properties_are_collected_per_pseudo_element() {
    let source = ".item { color: red; } .item::before { content: \"\"; } .item:hover { border: 0; }";
    let (factory, _) = factory(&[("list.css", source)]);
    let list = load(&factory, "list.css").await.unwrap();
    let graph = factory.graph();

    let item = graph.lookup(list, ".item").unwrap();
    let properties = item.properties();
    assert!(properties.contains("color", None));
    assert!(properties.contains("border", None));
    assert!(properties.contains("content", Some("before")));
    assert!(!properties.contains("content", None));
}

#[tokio::test]
async fn inheritance_chain() {
    let files = [
        ("a.css", ".foo { color: red; } .bar { color: red; } [state|open] { color: red; }"),
        (
            "b.css",
            "@block-reference a from \"a.css\";\n.root { extends: a; }\n.foo { color: blue; }",
        ),
    ];
    let (factory, _) = factory(&files);
    let b = load(&factory, "b.css").await.unwrap();
    let graph = factory.graph();
    let a = graph[b].base().unwrap();
    assert_eq!(graph[b].base_name(), Some("a"));

    let foo = graph.lookup(b, ".foo").unwrap();
    assert_eq!(foo.id().block, b);
    assert_eq!(foo.base(), graph.lookup(a, ".foo"));
    assert_eq!(foo.resolve_styles(), vec![foo, graph.lookup(a, ".foo").unwrap()]);

    // Missing objects fall back to the base.
    let bar = graph.lookup(b, ".bar").unwrap();
    assert_eq!(bar.id().block, a);

    let own: Vec<String> = graph.root(b).all(false).iter().map(|o| o.as_source()).collect();
    assert_eq!(own, vec![".root", ".foo"]);
    let all: Vec<String> = graph.root(b).all(true).iter().map(|o| o.as_source()).collect();
    assert_eq!(all, vec![".root", ".foo", "[state|open]", ".bar"]);

    let root_styles = graph.root(b).resolve_styles();
    assert_eq!(root_styles, vec![graph.root(b), graph.root(a)]);
}

#[tokio::test]
async fn debug_lines_list_the_tree() {
    let (factory, _) = factory(&[("nav.css", NAV), ("other.css", OTHER)]);
    let nav = load(&factory, "nav.css").await.unwrap();
    let lines = factory.graph().debug_lines(nav, &Options::default());
    assert_eq!(
        lines,
        vec![
            "Source: nav.css",
            ".root => .nav",
            "  [state|open] => .nav--open",
            "  [state|size=large] => .nav--size-large",
            "  .item => .nav__item",
            "    .item[state|active] => .nav__item--active",
            "    .item[state|kind=primary] => .nav__item--kind-primary",
        ]
    );
}

#[test]
fn names_can_be_set_once() {
    let mut block = Block::new("nav", FileIdentifier::new("nav.css"), "nav.css");
    block.set_name("nav-2").unwrap();
    assert_eq!(block.name(), "nav-2");
    let err = block.set_name("nav-3").unwrap_err();
    assert!(err.to_string().contains("more than once"), "{}", err);
    assert_eq!(block.name(), "nav-2");
}

#[test]
fn object_keys_know_their_level() {
    assert!(ObjectKey::Root.is_root_level());
    assert!(ObjectKey::State { class: None, state: 0 }.is_root_level());
    assert!(ObjectKey::Class(0).is_class_level());
    assert!(ObjectKey::State { class: Some(0), state: 1 }.is_class_level());
}
