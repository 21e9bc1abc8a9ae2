//! Incremental updates must land the graph where a full rebuild would.

use super::helpers::*;
use crate::{
    config::LinkSettings,
    error::UplinkError,
    event::NoteEvent,
    graph::LinkGraph,
    helper::LinksHelper,
    index::{MetadataIndex, VaultIndex},
    mutator::MemoryNoteStore,
};
use std::collections::BTreeSet;
use test_log::test;

/// Feed `event` to the graph the way the reconciliation controller does.
fn apply(graph: &mut LinkGraph, index: &VaultIndex, event: &NoteEvent) -> BTreeSet<String> {
    let mut changed = BTreeSet::new();
    for path in event.paths() {
        changed.extend(graph.upsert(index, path).unwrap());
    }
    changed
}

/// The incrementally maintained graph equals a fresh build over the same index.
fn assert_matches_rebuild(graph: &LinkGraph, index: &VaultIndex) {
    let rebuilt = build_graph(index);
    assert_eq!(
        graph.all().cloned().collect::<Vec<_>>(),
        rebuilt.all().cloned().collect::<Vec<_>>()
    );
    assert_inverse_law(graph);
}

#[test]
fn test_namesake_creation_propagates() {
    let mut index = VaultIndex::from_notes([
        ("Projects/Car.md", "---\nup: Garage\n---\n"),
        ("Garage.md", "#MOC [[Car]]"),
        ("Road.md", "---\nup: Car\n---\n"),
    ]);
    let mut graph = build_graph(&index);
    assert_eq!(graph.get("Garage.md").unwrap().forward_links, set(&["Projects/Car.md"]));
    assert_eq!(graph.get("Road.md").unwrap().parent_links, vec!["Projects/Car.md"]);
    assert_eq!(graph.get("Projects/Car.md").unwrap().display_name, "Car");

    let event = index.upsert_note("Archive/Car.md", "");
    let changed = apply(&mut graph, &index, &event);
    assert!(changed.is_superset(&set(&[
        "Archive/Car.md",
        "Garage.md",
        "Projects/Car.md",
        "Road.md",
    ])));

    assert!(graph.get("Garage.md").unwrap().forward_links.is_empty());
    assert!(graph.get("Road.md").unwrap().parent_links.is_empty());
    let car = graph.get("Projects/Car.md").unwrap();
    assert_eq!(car.display_name, "Projects/Car");
    assert_eq!(car.backward_links, BTreeSet::new());
    assert_eq!(graph.get("Archive/Car.md").unwrap().display_name, "Archive/Car");
    assert_matches_rebuild(&graph, &index);

    let event = index.remove_note("Archive/Car.md").unwrap();
    apply(&mut graph, &index, &event);
    assert_eq!(graph.get("Garage.md").unwrap().forward_links, set(&["Projects/Car.md"]));
    assert_eq!(graph.get("Road.md").unwrap().parent_links, vec!["Projects/Car.md"]);
    assert_eq!(graph.get("Projects/Car.md").unwrap().display_name, "Car");
    assert_matches_rebuild(&graph, &index);
}

#[test]
fn test_rename_leaves_no_stale_entries() {
    let mut index = VaultIndex::from_notes([
        ("Old/P.md", "#MOC [[A]]"),
        ("A.md", "---\nup: P\n---\n[[P]] and [[P]]"),
        ("B.md", "[[P]]"),
    ]);
    let mut graph = build_graph(&index);
    assert_eq!(
        graph.get("Old/P.md").unwrap().backward_links,
        set(&["A.md", "B.md"])
    );

    let event = index.rename_note("Old/P.md", "New/P.md").unwrap();
    apply(&mut graph, &index, &event);

    assert_not_referenced(&graph, "Old/P.md");
    let a = graph.get("A.md").unwrap();
    assert_eq!(a.parent_links, vec!["New/P.md"]);
    assert!(a.forward_links.contains("New/P.md"));
    assert!(a.backward_links.contains("New/P.md"));
    assert_eq!(graph.get("B.md").unwrap().forward_links, set(&["New/P.md"]));
    let p = graph.get("New/P.md").unwrap();
    assert!(p.is_structural);
    assert_eq!(p.backward_links, set(&["A.md", "B.md"]));
    assert_matches_rebuild(&graph, &index);
}

#[test(tokio::test)]
async fn test_rename_with_new_name_rewrites_referrers() {
    init_logging();
    let notes = [
        ("P.md", "#MOC\n[[A]]"),
        ("A.md", "---\nup: P\n---\n[[P]] and [[P#Intro|see]]"),
        ("B.md", "[[P]]"),
        ("C.md", "[[A]]"),
    ];
    let helper = LinksHelper::new(
        VaultIndex::from_notes(notes),
        MemoryNoteStore::new(notes),
        LinkSettings::default(),
    )
    .unwrap();

    let outcomes = helper.rename_note("P.md", "Hubs/P2.md").await.unwrap();
    assert_eq!(
        outcomes.iter().map(|o| o.path.as_str()).collect::<Vec<_>>(),
        vec!["A.md", "B.md"]
    );
    assert!(outcomes.iter().all(|o| o.result == Ok(true)));

    let store = helper.store();
    assert_eq!(store.get("P.md"), None);
    assert_eq!(store.get("Hubs/P2.md").unwrap(), "#MOC\n[[A]]");
    assert_eq!(
        store.get("A.md").unwrap(),
        "---\nup: '[[P2]]'\n---\n[[P2]] and [[P2#Intro|see]]"
    );
    assert_eq!(store.get("B.md").unwrap(), "[[P2]]");
    assert_eq!(store.get("C.md").unwrap(), "[[A]]");

    let graph = helper.graph().read();
    assert_not_referenced(&graph, "P.md");
    let a = graph.get("A.md").unwrap();
    assert_eq!(a.parent_links, vec!["Hubs/P2.md"]);
    assert_eq!(a.forward_links, set(&["Hubs/P2.md"]));
    assert_eq!(a.backward_links, set(&["C.md", "Hubs/P2.md"]));
    assert_eq!(graph.get("B.md").unwrap().forward_links, set(&["Hubs/P2.md"]));
    let p2 = graph.get("Hubs/P2.md").unwrap();
    assert!(p2.is_structural);
    assert_eq!(p2.forward_links, set(&["A.md"]));
    assert_eq!(p2.backward_links, set(&["A.md", "B.md"]));
    assert_matches_rebuild(&graph, &helper.index().read());
}

#[test(tokio::test)]
async fn test_rename_refuses_existing_target() {
    init_logging();
    let notes = [("P.md", "[[Q]]"), ("Q.md", "[[P]]")];
    let helper = LinksHelper::new(
        VaultIndex::from_notes(notes),
        MemoryNoteStore::new(notes),
        LinkSettings::default(),
    )
    .unwrap();

    let result = helper.rename_note("P.md", "Q.md").await;
    assert!(matches!(result, Err(UplinkError::Precondition(_))));
    let result = helper.rename_note("Gone.md", "New.md").await;
    assert!(matches!(result, Err(UplinkError::NotFound(_))));
    assert_eq!(helper.store().get("Q.md").unwrap(), "[[P]]");
    assert_eq!(
        helper.active_node("Q.md").unwrap().forward_links,
        set(&["P.md"])
    );
}

#[test]
fn test_remove_strips_node_and_is_idempotent() {
    let index = create_mixed_index();
    let mut graph = build_graph(&index);

    let changed = graph.remove(&index, "Garage.md").unwrap();
    assert_eq!(
        changed,
        set(&["Archive/Car.md", "Garage.md", "Home.md", "Projects/Car.md"])
    );
    assert_not_referenced(&graph, "Garage.md");
    assert!(graph.get("Archive/Car.md").unwrap().parent_links.is_empty());
    assert_eq!(graph.get("Home.md").unwrap().forward_links, set(&["Banana.md", "Projects/Car.md"]));
    assert_inverse_law(&graph);

    assert!(graph.remove(&index, "Garage.md").unwrap().is_empty());
    assert_not_referenced(&graph, "Garage.md");
    assert_inverse_law(&graph);
}

#[test]
fn test_delete_strips_every_link_set() {
    let mut index = create_mixed_index();
    let mut graph = build_graph(&index);

    let event = index.remove_note("Garage.md").unwrap();
    let changed = apply(&mut graph, &index, &event);
    assert!(changed.contains("Garage.md"));
    assert!(changed.contains("Home.md"));

    assert_not_referenced(&graph, "Garage.md");
    assert_eq!(graph.get("Projects/Car.md").unwrap().forward_links, BTreeSet::new());
    assert!(graph.get("Archive/Car.md").unwrap().parent_links.is_empty());
    assert_matches_rebuild(&graph, &index);
}

#[test]
fn test_header_edit_updates_parent_and_backward_links() {
    let mut index = create_family_index();
    let mut graph = build_graph(&index);

    let event = index.upsert_note("Child1.md", "No parent any more, only [[Child2]].");
    let changed = apply(&mut graph, &index, &event);
    assert_eq!(changed, set(&["Child1.md", "Child2.md", "Root.md"]));

    assert!(graph.get("Child1.md").unwrap().parent_links.is_empty());
    assert_eq!(graph.get("Root.md").unwrap().backward_links, set(&["Child2.md"]));
    assert_eq!(
        graph.get("Child2.md").unwrap().backward_links,
        set(&["Child1.md"])
    );
    assert_matches_rebuild(&graph, &index);
}

#[test]
fn test_unchanged_note_reports_no_change() {
    let mut index = create_family_index();
    let mut graph = build_graph(&index);
    let event = index.upsert_note("Root.md", "---\ntags: [MOC]\n---\n# Root\n");
    assert_eq!(event, NoteEvent::MetadataChanged("Root.md".to_string()));
    assert!(apply(&mut graph, &index, &event).is_empty());
    assert!(index.is_ready());
}
