#![cfg(feature = "qdrant")]

use std::collections::HashMap;

use reposage_memory::{QdrantOps, VectorPoint, VectorStore, VectorStoreError};
use testcontainers::ContainerAsync;
use testcontainers::GenericImage;
use testcontainers::core::{ContainerPort, WaitFor};
use testcontainers::runners::AsyncRunner;

const QDRANT_GRPC_PORT: ContainerPort = ContainerPort::Tcp(6334);

fn qdrant_image() -> GenericImage {
    GenericImage::new("qdrant/qdrant", "v1.16.0")
        .with_wait_for(WaitFor::message_on_stdout("gRPC listening"))
        .with_exposed_port(QDRANT_GRPC_PORT)
}

async fn setup() -> (QdrantOps, ContainerAsync<GenericImage>) {
    let container = qdrant_image().start().await.unwrap();
    let grpc_port = container.get_host_port_ipv4(6334).await.unwrap();
    let ops = QdrantOps::new(&format!("http://127.0.0.1:{grpc_port}")).unwrap();
    (ops, container)
}

fn chunk_point(id: &str, vector: Vec<f32>, path: &str) -> VectorPoint {
    VectorPoint {
        id: id.into(),
        vector,
        payload: HashMap::from([("path".into(), serde_json::json!(path))]),
    }
}

#[tokio::test]
async fn string_ids_survive_roundtrip() {
    let (ops, _container) = setup().await;
    ops.ensure_collection("repo_s1", 3).await.unwrap();
    ops.ensure_collection("repo_s1", 3).await.unwrap();

    ops.upsert(
        "repo_s1",
        vec![
            chunk_point("src/auth.py_0", vec![1.0, 0.0, 0.0], "src/auth.py"),
            chunk_point("src/main.py_0", vec![0.0, 1.0, 0.0], "src/main.py"),
        ],
    )
    .await
    .unwrap();

    assert_eq!(ops.count("repo_s1").await.unwrap(), 2);

    let hits = ops
        .search("repo_s1", vec![1.0, 0.0, 0.0], 1)
        .await
        .unwrap();
    assert_eq!(hits[0].id, "src/auth.py_0");

    let present = ops
        .existing_ids("repo_s1", vec!["src/auth.py_0".into(), "missing".into()])
        .await
        .unwrap();
    assert_eq!(present, vec!["src/auth.py_0".to_owned()]);

    let mut scrolled: Vec<_> = ops
        .scroll("repo_s1")
        .await
        .unwrap()
        .into_iter()
        .map(|p| p.id)
        .collect();
    scrolled.sort();
    assert_eq!(scrolled, vec!["src/auth.py_0", "src/main.py_0"]);
}

#[tokio::test]
async fn missing_collection_is_reported() {
    let (ops, _container) = setup().await;
    let err = ops.search("never_built", vec![1.0], 1).await.unwrap_err();
    assert!(matches!(err, VectorStoreError::MissingCollection(_)));

    ops.delete_collection("never_built").await.unwrap();
}
