use std::fs::OpenOptions;
use std::io::Write;
use std::path::Path;

use burrow_storage::file::counter_path;
use burrow_storage::{BatchAtomicity, ShortCode, Storage, StorageSettings};
use tempfile::TempDir;
use tracing::Span;

async fn open(path: &Path) -> Storage {
    Storage::open(
        StorageSettings::builder()
            .file_storage_path(path.to_path_buf())
            .span(Span::none())
            .build(),
    )
    .await
    .unwrap()
}

async fn shorten(storage: &Storage, url: &str) -> ShortCode {
    let id = storage.counter().next().await.unwrap();
    let code = ShortCode::generated(id, 7);
    storage.records().save(&code, url).await.unwrap();
    code
}

#[tokio::test]
async fn restart_restores_index_and_counter() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("urls.jsonl");

    let storage = open(&path).await;
    let mut saved = Vec::new();
    for i in 0..5 {
        let url = format!("https://example.com/{i}");
        saved.push((shorten(&storage, &url).await, url));
    }
    let last = storage.counter().next().await.unwrap();
    storage.close().await.unwrap();

    let reopened = open(&path).await;
    for (code, url) in &saved {
        assert_eq!(&reopened.records().get(code).await.unwrap(), url);
        assert_eq!(
            &reopened.records().get_by_original(url).await.unwrap(),
            code
        );
    }
    assert_eq!(reopened.counter().next().await.unwrap(), last + 1);
    reopened.close().await.unwrap();
}

#[tokio::test]
async fn torn_tail_is_skipped_and_appends_continue() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("urls.jsonl");

    let storage = open(&path).await;
    let kept = shorten(&storage, "https://kept.example").await;
    storage.close().await.unwrap();

    {
        let mut file = OpenOptions::new().append(true).open(&path).unwrap();
        file.write_all(br#"{"hash":"zzzz"#).unwrap();
        let mut seq = OpenOptions::new()
            .append(true)
            .open(counter_path(&path))
            .unwrap();
        seq.write_all(b"not json\n").unwrap();
    }

    let storage = open(&path).await;
    assert_eq!(
        storage.records().get(&kept).await.unwrap(),
        "https://kept.example"
    );
    let after = shorten(&storage, "https://after.example").await;
    assert!(after > kept);
    storage.close().await.unwrap();

    let storage = open(&path).await;
    assert_eq!(
        storage.records().get(&after).await.unwrap(),
        "https://after.example"
    );
    storage.close().await.unwrap();
}

#[tokio::test]
async fn rollback_keeps_earlier_batch_items_visible() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("urls.jsonl");
    let storage = open(&path).await;
    assert_eq!(storage.atomicity(), BatchAtomicity::BestEffort);

    let taken = shorten(&storage, "https://taken.example").await;

    let tx = storage.unit_of_work().begin().await.unwrap();
    assert!(tx.is_noop());
    let records = storage.records().with_tx(&tx);
    let counter = storage.counter().with_tx(&tx);

    let mut written = Vec::new();
    for i in 0..3 {
        let id = counter.next().await.unwrap();
        let code = ShortCode::generated(id, 7);
        records
            .save(&code, &format!("https://batch.example/{i}"))
            .await
            .unwrap();
        written.push(code);
    }
    let err = records
        .save(&taken, "https://batch.example/3")
        .await
        .unwrap_err();
    assert!(err.is_conflict());
    tx.rollback().await.unwrap();

    for code in &written {
        assert!(storage.records().get(code).await.is_ok());
    }
    storage.close().await.unwrap();
}
