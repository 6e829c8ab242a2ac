mod common;

use std::cell::{Cell, RefCell};
use std::rc::Rc;

use common::{compile, factory, factory_with, load};
use css_blocks::factory::{PreprocessQueue, Preprocessor, ProcessedFile};
use css_blocks::{BlockCompiler, FileIdentifier, Options, Result, Syntax};
use futures::FutureExt;
use futures::future::LocalBoxFuture;

#[tokio::test]
async fn concurrent_loads_share_one_import() {
    let (factory, importer) = factory(&[("a.css", ".foo { color: red; }")]);
    let identifier = FileIdentifier::new("a.css");
    let (first, second, third) = futures::join!(
        factory.get_block(&identifier),
        factory.get_block(&identifier),
        factory.get_block(&identifier),
    );
    let first = first.unwrap();
    assert_eq!(second.unwrap(), first);
    assert_eq!(third.unwrap(), first);
    assert_eq!(importer.import_count("a.css"), 1);

    assert_eq!(load(&factory, "a.css").await.unwrap(), first);
    assert_eq!(importer.import_count("a.css"), 1);
    assert_eq!(factory.graph().len(), 1);
}

#[tokio::test]
async fn shared_references_load_once() {
    let files = [
        ("shared.css", ".root { color: red; }"),
        ("a.css", "@block-reference shared from \"shared.css\";"),
        ("b.css", "@block-reference shared from \"./shared.css\";"),
    ];
    let (factory, importer) = factory(&files);
    let (a, b) = futures::join!(load(&factory, "a.css"), load(&factory, "b.css"));
    let (a, b) = (a.unwrap(), b.unwrap());

    let graph = factory.graph();
    assert_eq!(graph[a].reference("shared"), graph[b].reference("shared"));
    assert_eq!(importer.import_count("shared.css"), 1);
}

#[tokio::test]
async fn duplicate_names_are_numbered_in_load_order() {
    let files = [
        ("one.css", ".root { block-name: block; color: red; }"),
        ("two.css", ".root { block-name: block; color: blue; }"),
    ];
    let (factory, _) = factory(&files);
    let one = load(&factory, "one.css").await.unwrap();
    let two = load(&factory, "two.css").await.unwrap();

    let graph = factory.graph();
    assert_eq!(graph[one].name(), "block");
    assert_eq!(graph[two].name(), "block-2");
}

#[tokio::test]
async fn numbered_names_reach_the_output() {
    let files = [
        ("one.css", ".root { block-name: block; }"),
        ("two.css", "@block-reference first from \"one.css\";\n.root { block-name: block; }\n.item { color: red; }"),
    ];
    let css = compile(&files, "two.css").await.unwrap();
    assert_eq!(css, ".block-2__item {\n  color: red;\n}\n");
}

#[tokio::test]
async fn reset_forgets_everything() {
    let (factory, importer) = factory(&[("a.css", ".root { color: red; }")]);
    load(&factory, "a.css").await.unwrap();
    factory.reset();
    assert!(factory.graph().is_empty());

    let id = load(&factory, "a.css").await.unwrap();
    assert_eq!(importer.import_count("a.css"), 2);
    assert_eq!(factory.graph()[id].name(), "a");
}

#[tokio::test]
async fn reference_cycles_are_tolerated() {
    let files = [
        ("a.css", "@block-reference b from \"b.css\";\n.foo { color: red; }"),
        ("b.css", "@block-reference a from \"a.css\";\n.bar { color: blue; }"),
    ];
    let (factory, _) = factory(&files);
    let a = load(&factory, "a.css").await.unwrap();
    let b = load(&factory, "b.css").await.unwrap();

    let graph = factory.graph();
    assert_eq!(graph[a].reference("b"), Some(b));
    assert_eq!(graph[b].reference("a"), Some(a));
    assert_eq!(graph.lookup(b, "a.foo").map(|object| object.id().block), Some(a));
}

#[tokio::test]
async fn extending_inside_a_cycle_fails() {
    let files = [
        ("a.css", "@block-reference b from \"b.css\";\n.foo { color: red; }"),
        ("b.css", "@block-reference a from \"a.css\";\n.root { extends: a; }"),
    ];
    let (factory, _) = factory(&files);
    let err = load(&factory, "a.css").await.unwrap_err();
    assert!(
        err.to_string().contains("Cannot extend block \"a\" because it references this block"),
        "{}",
        err
    );
}

#[tokio::test]
async fn missing_files_are_io_errors() {
    let (factory, _) = factory(&[("a.css", "@block-reference b from \"missing.css\";")]);
    let err = load(&factory, "a.css").await.unwrap_err();
    assert!(err.to_string().contains("no such file: missing.css"), "{}", err);
}

#[tokio::test]
async fn failed_loads_stay_failed() {
    let (factory, importer) = factory(&[("a.css", ".root { extends: nothing; }")]);
    assert!(load(&factory, "a.css").await.is_err());
    assert!(load(&factory, "a.css").await.is_err());
    assert_eq!(importer.import_count("a.css"), 1);
}

#[tokio::test]
async fn implementations_must_be_complete() {
    let files = [
        ("api.css", ".label { color: red; } [state|active] { color: blue; }"),
        ("impl.css", "@block-reference api from \"api.css\";\n.root { implements: api; }\n.label { color: green; }"),
    ];
    let (factory, _) = factory(&files);
    let err = load(&factory, "impl.css").await.unwrap_err();
    assert_eq!(err.to_string(), "Missing implementations for [state|active] from api.css");
}

#[tokio::test]
async fn failed_implementations_give_back_their_slot_and_name() {
    let files = [
        ("api.css", ".label { color: red; }"),
        ("bad.css", "@block-reference api from \"api.css\";\n.root { implements: api; block-name: widget; }"),
        ("good.css", ".root { block-name: widget; color: blue; }"),
    ];
    let (factory, _) = factory(&files);
    let err = load(&factory, "bad.css").await.unwrap_err();
    assert!(err.to_string().starts_with("Missing implementations for .label"), "{}", err);

    let good = load(&factory, "good.css").await.unwrap();
    let graph = factory.graph();
    assert_eq!(graph[good].name(), "widget");
    assert_eq!(graph.blocks().filter(|(_, block)| block.name().starts_with("widget")).count(), 1);
}

// ---------------------------------------------------------------------------
// Preprocessing
// ---------------------------------------------------------------------------

/// Replaces `$color` with `red`.
struct Variables;

impl Preprocessor for Variables {
    fn process<'a>(
        &'a self,
        _full_path: &'a str,
        content: String,
        _options: &'a Options,
        _source_map: Option<String>,
    ) -> LocalBoxFuture<'a, Result<ProcessedFile>> {
        async move {
            Ok(ProcessedFile {
                content: content.replace("$color", "red"),
                source_map: Some("variables-map".to_string()),
                dependencies: vec!["_variables.scss".to_string()],
            })
        }
        .boxed_local()
    }
}

/// Passes CSS through and records what it was given.
#[derive(Default)]
struct PostCss {
    calls: Cell<usize>,
    source_maps: RefCell<Vec<Option<String>>>,
}

impl Preprocessor for PostCss {
    fn process<'a>(
        &'a self,
        _full_path: &'a str,
        content: String,
        _options: &'a Options,
        source_map: Option<String>,
    ) -> LocalBoxFuture<'a, Result<ProcessedFile>> {
        async move {
            self.calls.set(self.calls.get() + 1);
            self.source_maps.borrow_mut().push(source_map);
            Ok(ProcessedFile {
                content,
                source_map: None,
                dependencies: vec!["postcss.config.js".to_string()],
            })
        }
        .boxed_local()
    }
}

#[tokio::test]
async fn preprocessors_are_chained() {
    let (factory, _) = factory(&[("theme.scss", ".root { color: $color; }")]);
    let post = Rc::new(PostCss::default());
    factory.add_preprocessor(Syntax::Scss, Rc::new(Variables));
    factory.add_preprocessor(Syntax::Css, post.clone());

    let id = load(&factory, "theme.scss").await.unwrap();
    let graph = factory.graph();
    let css = BlockCompiler::new(&graph, factory.options()).compile(id).unwrap();

    assert_eq!(css.to_string(), ".theme {\n  color: red;\n}\n");
    assert_eq!(post.calls.get(), 1);
    assert_eq!(*post.source_maps.borrow(), vec![Some("variables-map".to_string())]);
    let dependencies: Vec<&str> = graph[id].dependencies().collect();
    assert_eq!(dependencies, vec!["_variables.scss", "postcss.config.js"]);
}

#[tokio::test]
async fn chaining_can_be_disabled() {
    let options = Options {
        disable_preprocess_chaining: true,
        ..Options::default()
    };
    let (factory, _) = factory_with(
        &[("theme.scss", ".root { color: $color; }"), ("plain.css", ".root { color: blue; }")],
        options,
    );
    let post = Rc::new(PostCss::default());
    factory.add_preprocessor(Syntax::Scss, Rc::new(Variables));
    factory.add_preprocessor(Syntax::Css, post.clone());

    load(&factory, "theme.scss").await.unwrap();
    assert_eq!(post.calls.get(), 0);
    load(&factory, "plain.css").await.unwrap();
    assert_eq!(post.calls.get(), 1);
}

#[tokio::test]
async fn other_syntaxes_need_a_preprocessor() {
    let (factory, _) = factory(&[("theme.scss", ".root { color: $color; }")]);
    let err = load(&factory, "theme.scss").await.unwrap_err();
    assert_eq!(err.to_string(), "No preprocessor provided for scss files: theme.scss");
}

#[tokio::test]
async fn queue_bounds_concurrent_jobs() {
    let queue = PreprocessQueue::new(2);
    let (active, peak) = (&Cell::new(0), &Cell::new(0));
    let job = || async move {
        active.set(active.get() + 1);
        peak.set(peak.get().max(active.get()));
        tokio::task::yield_now().await;
        tokio::task::yield_now().await;
        active.set(active.get() - 1);
        Ok(())
    };

    let results = futures::future::join_all((0..5).map(|_| queue.run(job()))).await;
    assert!(results.iter().all(|result| result.is_ok()));
    assert_eq!(peak.get(), 2);
    assert_eq!(queue.in_flight(), 0);
}

#[tokio::test]
async fn draining_refuses_new_jobs_and_waits_for_running_ones() {
    let queue = PreprocessQueue::new(2);
    let finished = Cell::new(false);
    let running = async {
        tokio::task::yield_now().await;
        finished.set(true);
        Ok(())
    };
    let late = async { Ok(()) };

    let (first, drained, refused) = futures::join!(
        queue.run(running),
        async {
            queue.drain().await;
            finished.get()
        },
        queue.run(late),
    );
    assert!(first.is_ok());
    assert!(drained);
    let err = refused.unwrap_err();
    assert!(err.to_string().contains("cancelled"), "{}", err);
    assert!(!queue.is_draining());
}
