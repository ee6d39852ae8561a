use std::collections::HashMap;

use ragdex_memory::{FieldValue, QdrantOps, VectorFilter, VectorPoint, VectorStore};
use testcontainers::ContainerAsync;
use testcontainers::GenericImage;
use testcontainers::core::{ContainerPort, WaitFor};
use testcontainers::runners::AsyncRunner;

const QDRANT_GRPC_PORT: ContainerPort = ContainerPort::Tcp(6334);
const COLLECTION: &str = "ragdex_it";

fn qdrant_image() -> GenericImage {
    GenericImage::new("qdrant/qdrant", "v1.16.0")
        .with_wait_for(WaitFor::message_on_stdout("gRPC listening"))
        .with_exposed_port(QDRANT_GRPC_PORT)
}

async fn setup_with_qdrant() -> (QdrantOps, ContainerAsync<GenericImage>) {
    let container = qdrant_image().start().await.unwrap();
    let grpc_port = container.get_host_port_ipv4(6334).await.unwrap();
    let url = format!("http://127.0.0.1:{grpc_port}");
    let ops = QdrantOps::new(&url, None).unwrap();
    (ops, container)
}

fn chunk(path: &str, index: i64, vector: Vec<f32>) -> VectorPoint {
    VectorPoint {
        id: format!("{path}#chunk-{index}"),
        vector,
        payload: HashMap::from([
            ("file_path".into(), serde_json::json!(path)),
            ("chunk_index".into(), serde_json::json!(index)),
        ]),
    }
}

#[tokio::test]
#[ignore = "requires docker"]
async fn ensure_collection_is_idempotent() {
    let (qdrant, _container) = setup_with_qdrant().await;

    qdrant.ensure_collection(COLLECTION, 4).await.unwrap();
    qdrant.ensure_collection(COLLECTION, 4).await.unwrap();
    assert!(qdrant.collection_exists(COLLECTION).await.unwrap());
}

#[tokio::test]
#[ignore = "requires docker"]
async fn upsert_search_and_list_keep_string_ids() {
    let (qdrant, _container) = setup_with_qdrant().await;
    qdrant.ensure_collection(COLLECTION, 4).await.unwrap();

    qdrant
        .upsert(
            COLLECTION,
            vec![
                chunk("src/a.rs", 0, vec![1.0, 0.0, 0.0, 0.0]),
                chunk("src/a.rs", 1, vec![0.0, 1.0, 0.0, 0.0]),
                chunk("src/b.rs", 0, vec![0.0, 0.0, 1.0, 0.0]),
            ],
        )
        .await
        .unwrap();

    let hits = qdrant
        .search(COLLECTION, vec![1.0, 0.0, 0.0, 0.0], 1, None)
        .await
        .unwrap();
    assert_eq!(hits[0].id, "src/a.rs#chunk-0");
    assert_eq!(hits[0].payload["file_path"], serde_json::json!("src/a.rs"));

    assert_eq!(
        qdrant.list_ids(COLLECTION).await.unwrap(),
        vec!["src/a.rs#chunk-0", "src/a.rs#chunk-1", "src/b.rs#chunk-0"]
    );
    assert_eq!(qdrant.count(COLLECTION).await.unwrap(), 3);
}

#[tokio::test]
#[ignore = "requires docker"]
async fn delete_by_ids_and_filter() {
    let (qdrant, _container) = setup_with_qdrant().await;
    qdrant.ensure_collection(COLLECTION, 4).await.unwrap();
    qdrant
        .upsert(
            COLLECTION,
            vec![
                chunk("src/a.rs", 0, vec![1.0, 0.0, 0.0, 0.0]),
                chunk("src/a.rs", 1, vec![0.0, 1.0, 0.0, 0.0]),
                chunk("src/b.rs", 0, vec![0.0, 0.0, 1.0, 0.0]),
            ],
        )
        .await
        .unwrap();

    qdrant
        .delete_by_ids(COLLECTION, vec!["src/b.rs#chunk-0".into()])
        .await
        .unwrap();
    qdrant
        .delete_by_filter(
            COLLECTION,
            VectorFilter::default().must_eq("chunk_index", FieldValue::Integer(1)),
        )
        .await
        .unwrap();

    assert_eq!(
        qdrant.list_ids(COLLECTION).await.unwrap(),
        vec!["src/a.rs#chunk-0"]
    );
}
