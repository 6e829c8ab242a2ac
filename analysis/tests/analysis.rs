use std::rc::Rc;

use css_blocks::{BlockFactory, BlockGraph, BlockId, FileIdentifier, FilesystemImporter, Options};
use css_blocks_analysis::{SourceSpan, Template, TemplateAnalysis, TemplateAnalysisError};
use serde_json::json;

const NAV: &str = "
.root { color: red; }
[state|open] { color: blue; }
.item { color: green; }
.item[state|active] { color: white; }
.item[state|size=small] { width: 1px; }
.item[state|size=large] { width: 2px; }
.link { color: black; }
";

async fn nav() -> (BlockFactory, BlockId) {
    let factory = BlockFactory::new(Options::default(), Rc::new(FilesystemImporter));
    let id = factory
        .parse_source(NAV.to_string(), FileIdentifier::new("/virtual/nav.css"), "nav")
        .await
        .unwrap();
    (factory, id)
}

fn analysis(graph: &BlockGraph, nav: BlockId) -> TemplateAnalysis<'_> {
    let mut analysis = TemplateAnalysis::new(graph, Template::new("Opticss.JSXTemplate", "App.jsx"));
    analysis.add_block("nav", nav).unwrap();
    analysis
}

/// Record one element with the given static styles and report the result.
fn element(graph: &BlockGraph, nav: BlockId, styles: &[&str]) -> Result<(), TemplateAnalysisError> {
    let mut analysis = analysis(graph, nav);
    analysis.start_element(SourceSpan::at(3, 5))?;
    for style in styles {
        analysis.add_static_style(graph.lookup(nav, style).unwrap())?;
    }
    analysis.end_element()
}

#[tokio::test]
async fn serializes_styles_and_correlations() {
    let (factory, nav) = nav().await;
    let graph = factory.graph();
    let object = |source: &str| graph.lookup(nav, source).unwrap();
    let mut analysis = analysis(&graph, nav);

    analysis.start_element(SourceSpan::at(1, 1)).unwrap();
    analysis.add_static_style(object(".root")).unwrap();
    analysis.add_dynamic_style(object("[state|open]")).unwrap();
    analysis.end_element().unwrap();

    analysis.start_element(SourceSpan::at(2, 3)).unwrap();
    analysis.add_static_style(object(".item")).unwrap();
    analysis
        .add_exclusive_styles(false, &[object(".item[state|size=small]"), object(".item[state|size=large]")])
        .unwrap();
    analysis.end_element().unwrap();

    let serialized = serde_json::to_value(analysis.serialize()).unwrap();
    assert_eq!(
        serialized,
        json!({
            "template": { "type": "Opticss.JSXTemplate", "identifier": "App.jsx" },
            "blocks": { "nav": "/virtual/nav.css" },
            "stylesFound": [
                "nav.item",
                "nav.item[state|size=large]",
                "nav.item[state|size=small]",
                "nav.root",
                "nav[state|open]"
            ],
            "elements": {
                "0": {
                    "static": [3],
                    "correlations": [[-1, 4]],
                    "loc": { "start": { "line": 1, "column": 1 } }
                },
                "1": {
                    "static": [0],
                    "correlations": [[-1, 1, 2]],
                    "loc": { "start": { "line": 2, "column": 3 } }
                }
            }
        })
    );
}

#[tokio::test]
async fn required_choices_have_no_empty_branch() {
    let (factory, nav) = nav().await;
    let graph = factory.graph();
    let mut analysis = analysis(&graph, nav);
    analysis.start_element(SourceSpan::at(1, 1)).unwrap();
    analysis
        .add_exclusive_styles(true, &[graph.lookup(nav, ".root").unwrap(), graph.lookup(nav, ".item").unwrap()])
        .unwrap();
    analysis.end_element().unwrap();

    let serialized = analysis.serialize();
    assert_eq!(serialized.styles_found, vec!["nav.item", "nav.root"]);
    assert_eq!(serialized.elements["0"].correlations, vec![vec![0, 1]]);
    assert!(analysis.to_json().unwrap().contains("\"stylesFound\""));
}

#[tokio::test]
async fn valid_elements_pass() {
    let (factory, nav) = nav().await;
    let graph = factory.graph();
    element(&graph, nav, &[".root", "[state|open]"]).unwrap();
    element(&graph, nav, &[".item", ".item[state|active]", ".item[state|size=large]"]).unwrap();
}

#[tokio::test]
async fn root_and_class_cannot_share_an_element() {
    let (factory, nav) = nav().await;
    let graph = factory.graph();
    let err = element(&graph, nav, &[".root", ".item"]).unwrap_err();
    assert!(err.message.contains("Cannot put block classes on the block's root element"), "{}", err);
    assert!(err.to_string().ends_with("(App.jsx:3:5)"), "{}", err);
}

#[tokio::test]
async fn classes_of_one_block_cannot_pair() {
    let (factory, nav) = nav().await;
    let graph = factory.graph();
    let err = element(&graph, nav, &[".item", ".link"]).unwrap_err();
    assert!(err.message.contains("Classes `.item` and `.link` from the same block `nav`"), "{}", err);
}

#[tokio::test]
async fn exclusive_states_cannot_pair() {
    let (factory, nav) = nav().await;
    let graph = factory.graph();
    let err = element(&graph, nav, &[".item", ".item[state|size=small]", ".item[state|size=large]"]).unwrap_err();
    assert!(err.message.contains("one exclusive state group"), "{}", err);
}

#[tokio::test]
async fn states_need_their_parent() {
    let (factory, nav) = nav().await;
    let graph = factory.graph();
    let err = element(&graph, nav, &[".item[state|active]"]).unwrap_err();
    assert_eq!(
        err.message,
        "Cannot use state `.item[state|active]` without its parent `.item` also applied"
    );
}

#[tokio::test]
async fn alternatives_do_not_conflict() {
    let (factory, nav) = nav().await;
    let graph = factory.graph();
    let mut analysis = analysis(&graph, nav);
    analysis.start_element(SourceSpan::at(1, 1)).unwrap();
    analysis
        .add_exclusive_styles(false, &[graph.lookup(nav, ".item").unwrap(), graph.lookup(nav, ".link").unwrap()])
        .unwrap();
    analysis.end_element().unwrap();
    assert_eq!(analysis.elements().len(), 1);
}

#[tokio::test]
async fn elements_must_be_started() {
    let (factory, nav) = nav().await;
    let graph = factory.graph();
    let mut analysis = analysis(&graph, nav);

    assert!(analysis.end_element().is_err());
    assert!(analysis.add_static_style(graph.root(nav)).is_err());

    analysis.start_element(SourceSpan::at(1, 1)).unwrap();
    let err = analysis.start_element(SourceSpan::at(2, 1)).unwrap_err();
    assert!(err.message.contains("was not ended"), "{}", err);
}

#[tokio::test]
async fn blocks_must_be_added_first() {
    let (factory, nav) = nav().await;
    let graph = factory.graph();
    let mut analysis = TemplateAnalysis::new(&graph, Template::new("Opticss.JSXTemplate", "App.jsx"));
    analysis.start_element(SourceSpan::at(1, 1)).unwrap();
    let err = analysis.add_static_style(graph.root(nav)).unwrap_err();
    assert!(err.message.contains("Block `nav` has not been added"), "{}", err);
}
