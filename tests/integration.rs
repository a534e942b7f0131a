//! End-to-end behaviour of the memory tiers and the facade

use std::sync::Arc;

use chrono::{Duration, TimeZone, Utc};
use dieah_recall::{
    Action, Authorizer, BoundedContext, Config, EmbeddingIndex, Error, MemoryFacade,
    MemoryGraph, MemoryRef, Metadata, RetrievalQuery, Role, StorageBackend, StoreRequest,
    Stored, Turn,
};
use tempfile::TempDir;

fn assert_links_reciprocal(graph: &MemoryGraph) {
    for node in graph.nodes() {
        for child in &node.child_ids {
            let child_node = graph.peek_node(child).expect("child exists");
            assert!(
                child_node.parent_ids.contains(&node.id),
                "{} lists child {} without reciprocal parent link",
                node.id,
                child
            );
        }
        for parent in &node.parent_ids {
            let parent_node = graph.peek_node(parent).expect("parent exists");
            assert!(parent_node.child_ids.contains(&node.id));
        }
    }
    assert!(graph.dangling_links().is_empty());
}

#[test]
fn links_stay_bidirectional_through_edits() {
    let mut graph = MemoryGraph::new();
    let root = graph.add_node("root", "topic", &[], Metadata::new()).id;
    let a = graph.add_node("a", "fact", &[root.clone()], Metadata::new()).id;
    let b = graph
        .add_node("b", "fact", &[root.clone(), a.clone()], Metadata::new())
        .id;
    let c = graph
        .add_node("c", "fact", &[b.clone(), "ghost".to_string()], Metadata::new())
        .id;
    let d = graph.add_node("d", "fact", &[a.clone()], Metadata::new()).id;
    assert_links_reciprocal(&graph);

    assert!(graph.delete_node(&b, false));
    assert_links_reciprocal(&graph);
    assert!(graph.peek_node(&c).unwrap().parent_ids.is_empty());

    graph.add_node("e", "fact", &[d.clone(), c.clone()], Metadata::new());
    assert!(graph.delete_node(&a, true));
    assert_links_reciprocal(&graph);
    assert!(!graph.contains(&d));
    assert_eq!(graph.len(), 2);
    assert!(graph.contains(&root));
    assert!(graph.contains(&c));
}

#[test]
fn traversal_survives_cycles() {
    let mut graph = MemoryGraph::new();
    let a = graph.add_node("A", "fact", &[], Metadata::new()).id;
    let b = graph.add_node("B", "fact", &[a.clone()], Metadata::new()).id;
    assert!(graph.link(&b, &a));

    let descendants: Vec<&str> = graph
        .get_descendants(&a, 5)
        .into_iter()
        .map(|n| n.id.as_str())
        .collect();
    assert_eq!(descendants, vec![b.as_str()]);

    let ancestors: Vec<&str> = graph
        .get_ancestors(&b, 5)
        .into_iter()
        .map(|n| n.id.as_str())
        .collect();
    assert_eq!(ancestors, vec![a.as_str()]);
}

#[test]
fn index_enforces_dimension() {
    let mut index = EmbeddingIndex::new(4);
    let err = index
        .insert(vec![1.0, 2.0, 3.0], Metadata::new(), None)
        .unwrap_err();
    assert!(matches!(err, Error::DimensionMismatch { expected: 4, actual: 3 }));
    assert!(index.insert(vec![1.0, 2.0, 3.0, 4.0], Metadata::new(), None).is_ok());
    assert!(matches!(
        index.query(&[1.0], 1),
        Err(Error::DimensionMismatch { .. })
    ));
}

#[test]
fn index_ranks_by_cosine() {
    let mut index = EmbeddingIndex::new(4);
    index
        .insert(vec![1.0, 0.0, 0.0, 0.0], Metadata::new(), Some("a".into()))
        .unwrap();
    index
        .insert(vec![0.0, 1.0, 0.0, 0.0], Metadata::new(), Some("b".into()))
        .unwrap();

    let hits = index.query(&[1.0, 0.0, 0.0, 0.0], 2).unwrap();
    assert_eq!(hits.len(), 2);
    assert_eq!(hits[0].id, "a");
    assert!((hits[0].score - 1.0).abs() < 1e-6);
    assert_eq!(hits[1].id, "b");
    assert!(hits[1].score.abs() < 1e-6);
}

#[test]
fn compression_lands_under_target() {
    let mut ctx = BoundedContext::new(100);
    let mut report = None;
    for i in 0..10 {
        report = ctx.add(Role::User, format!("turn {}", i), Some(15));
        if report.is_some() {
            break;
        }
    }

    let report = report.expect("budget was exceeded");
    assert_eq!(report.tokens_before, 105);
    assert!(ctx.token_count() <= 80);
    assert!(ctx.len() >= 4);

    let contents: Vec<&str> = ctx.turns().iter().map(|t| t.content.as_str()).collect();
    assert_eq!(contents.first(), Some(&"turn 0"));
    assert!(contents.ends_with(&["turn 5", "turn 6"]));
}

#[test]
fn prioritized_slice_is_stable_and_chronological() {
    let start = Utc.with_ymd_and_hms(2025, 3, 1, 9, 0, 0).unwrap();
    let mut ctx = BoundedContext::new(1_000);
    for i in 0..8 {
        let role = if i == 0 { Role::System } else { Role::User };
        let importance = if i % 3 == 0 { 2.0 } else { 0.5 };
        let turn = Turn::new(role, format!("m{}", i), 10 + i as u32)
            .at(start + Duration::seconds(i as i64 * 30))
            .with_importance(importance);
        ctx.add_turn(turn);
    }

    let first = ctx.get(Some(60));
    let second = ctx.get(Some(60));
    assert_eq!(first, second);

    let tokens: u32 = first
        .iter()
        .map(|m| {
            ctx.turns()
                .iter()
                .find(|t| t.content == m.content)
                .map(|t| t.token_count)
                .unwrap()
        })
        .sum();
    assert!(tokens <= 60);

    let positions: Vec<usize> = first
        .iter()
        .map(|m| m.content[1..].parse::<usize>().unwrap())
        .collect();
    let mut sorted = positions.clone();
    sorted.sort();
    assert_eq!(positions, sorted);
    assert_eq!(positions.first(), Some(&0));
    assert!(positions.ends_with(&[6, 7]));
}

#[test]
fn deletion_is_idempotent() {
    let mut graph = MemoryGraph::new();
    let id = graph.add_node("x", "fact", &[], Metadata::new()).id;
    assert!(graph.delete_node(&id, false));
    assert!(!graph.delete_node(&id, false));

    let mut index = EmbeddingIndex::new(2);
    let vid = index.insert(vec![1.0, 1.0], Metadata::new(), None).unwrap();
    assert!(index.delete(&vid));
    assert!(!index.delete(&vid));
}

#[tokio::test]
async fn facade_persists_through_sqlite() {
    let dir = TempDir::new().unwrap();
    let mut config = Config::with_data_dir(dir.path());
    config.storage_backend = StorageBackend::Sqlite;
    config.embedding_dimensions = 3;

    let node_id = {
        let memory = MemoryFacade::open(config.clone()).unwrap();
        let stored = memory
            .store(
                "ops",
                StoreRequest::Fact {
                    content: "Deploys happen on Tuesdays".into(),
                    node_type: "policy".into(),
                    parent_ids: vec![],
                    metadata: Metadata::new(),
                },
            )
            .await
            .unwrap();
        memory
            .store(
                "ops",
                StoreRequest::Semantic {
                    content: "release cadence".into(),
                    embedding: Some(vec![0.0, 1.0, 0.0]),
                    metadata: Metadata::new(),
                    id: None,
                },
            )
            .await
            .unwrap();
        match stored {
            Stored::Fact(outcome) => outcome.id,
            other => panic!("unexpected {:?}", other),
        }
    };
    assert!(dir.path().join("snapshots.db").exists());

    let memory = MemoryFacade::open(config).unwrap();
    let ctx = memory
        .retrieve(
            "ops",
            RetrievalQuery::text("tuesdays").with_embedding(vec![0.0, 2.0, 0.0]),
        )
        .await
        .unwrap();
    assert_eq!(ctx.facts.len(), 1);
    assert_eq!(ctx.facts[0].id, node_id);
    assert_eq!(ctx.semantic.len(), 1);
    assert!((ctx.semantic[0].score - 1.0).abs() < 1e-6);
}

struct OwnConversationsOnly;

#[async_trait::async_trait]
impl Authorizer for OwnConversationsOnly {
    async fn is_authorized(&self, subject: &str, resource: &str, action: Action) -> bool {
        subject == "owner" || (action == Action::Read && !resource.starts_with("conversation:"))
    }
}

#[tokio::test]
async fn facade_checks_authorization_first() {
    let memory = MemoryFacade::in_memory(Config::default())
        .unwrap()
        .with_authorizer(Arc::new(OwnConversationsOnly));
    let conv = memory.open_conversation("owner").await.unwrap();

    let err = memory
        .summarize("guest", &conv)
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Unauthorized { .. }));

    let err = memory
        .delete("guest", MemoryRef::Conversation { id: conv.clone() })
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Unauthorized { .. }));

    let summary = memory.summarize("owner", &conv).await.unwrap();
    assert_eq!(summary, "Empty conversation (0 tokens)");
}
