//! Remote feed traversal against a local HTTP stub.

use std::sync::Arc;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;

use tiltvault::SketchCatalog;
use tiltvault::resource::{CollectionItem, FeedCollection, Resource, ResourceCollection};

/// Serve canned responses keyed by request path. One response per
/// connection; good enough for a feed client.
async fn spawn_stub<F>(handler: F) -> String
where
    F: Fn(&str) -> (u16, String) + Send + Sync + 'static,
{
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let handler = Arc::new(handler);

    tokio::spawn(async move {
        loop {
            let Ok((mut socket, _)) = listener.accept().await else {
                break;
            };
            let handler = handler.clone();
            tokio::spawn(async move {
                let mut request = Vec::new();
                let mut buf = [0u8; 1024];
                while !request.windows(4).any(|w| w == b"\r\n\r\n") {
                    match socket.read(&mut buf).await {
                        Ok(0) | Err(_) => return,
                        Ok(n) => request.extend_from_slice(&buf[..n]),
                    }
                }
                let head = String::from_utf8_lossy(&request);
                let path = head.split_whitespace().nth(1).unwrap_or("/").to_string();

                let (status, body) = handler(&path);
                let reason = if status == 200 { "OK" } else { "Error" };
                let response = format!(
                    "HTTP/1.1 {} {}\r\ncontent-type: application/json\r\ncontent-length: {}\r\nconnection: close\r\n\r\n{}",
                    status,
                    reason,
                    body.len(),
                    body
                );
                let _ = socket.write_all(response.as_bytes()).await;
            });
        }
    });

    format!("http://{}", addr)
}

fn page_of(names: &[&str]) -> String {
    let entries: Vec<String> = names
        .iter()
        .map(|name| {
            format!(
                r#"{{"name":"{n}","description":"a sketch","thumbnail":"http://example.invalid/{n}.png","ownername":"ada","ownerurl":"http://example.invalid/ada","license":"CC-BY","formats":[{{"url":"http://example.invalid/{n}.tilt","format":"TILT"}},{{"url":"http://example.invalid/{n}.glb","format":"GLB"}}]}}"#,
                n = name
            )
        })
        .collect();
    format!("[{}]", entries.join(","))
}

async fn collect_names(collection: &FeedCollection) -> Vec<String> {
    let mut cursor = collection.contents();
    let mut names = Vec::new();
    while let Some(item) = cursor.next().await {
        match item {
            CollectionItem::Sketch(resource) => names.push(resource.name().to_string()),
            CollectionItem::Folder(_) => panic!("feeds are flat"),
        }
    }
    names
}

#[tokio::test]
async fn failing_page_truncates_without_raising() {
    let base = spawn_stub(|path| {
        if path.ends_with("page=0") {
            (200, page_of(&["alpha", "beta"]))
        } else {
            (500, "server on fire".to_string())
        }
    })
    .await;

    let collection = FeedCollection::new(reqwest::Client::new(), "stub", format!("{}/feed", base));
    let names = collect_names(&collection).await;

    assert_eq!(names, vec!["alpha", "beta"]);
    let err = collection.last_error().expect("failure should be recorded");
    assert!(err.contains("500"), "unexpected error text: {}", err);
}

#[tokio::test]
async fn empty_page_is_a_clean_end() {
    let base = spawn_stub(|path| {
        if path.ends_with("page=0") {
            (200, page_of(&["only"]))
        } else {
            (200, "[]".to_string())
        }
    })
    .await;

    let collection = FeedCollection::new(reqwest::Client::new(), "stub", format!("{}/feed", base));
    let names = collect_names(&collection).await;

    assert_eq!(names, vec!["only"]);
    assert!(collection.last_error().is_none());
}

#[tokio::test]
async fn bad_payload_is_recorded_not_raised() {
    let base = spawn_stub(|_| (200, "this is not json".to_string())).await;

    let collection = FeedCollection::new(reqwest::Client::new(), "stub", format!("{}/feed", base));
    let names = collect_names(&collection).await;

    assert!(names.is_empty());
    assert!(collection.last_error().is_some());
}

#[tokio::test]
async fn entries_carry_feed_details() {
    let base = spawn_stub(|path| {
        if path.ends_with("page=0") {
            (200, page_of(&["gamma"]))
        } else {
            (200, "[]".to_string())
        }
    })
    .await;

    let collection = FeedCollection::new(reqwest::Client::new(), "stub", format!("{}/feed", base));
    let mut cursor = collection.contents();
    let Some(CollectionItem::Sketch(resource)) = cursor.next().await else {
        panic!("expected one sketch");
    };

    assert_eq!(resource.name(), "gamma");
    assert_eq!(resource.uri(), "http://example.invalid/gamma.tilt");
    assert_eq!(
        resource.preview_uri(),
        Some("http://example.invalid/gamma.png")
    );
    assert_eq!(resource.description(), Some("a sketch"));
    assert_eq!(resource.license(), Some("CC-BY"));
    let authors = resource.authors();
    assert_eq!(authors.len(), 1);
    assert_eq!(authors[0].name, "ada");
}

#[tokio::test]
async fn catalog_over_failing_feed_keeps_the_valid_prefix() {
    let base = spawn_stub(|path| {
        if path.ends_with("page=0") {
            (200, page_of(&["one", "two", "three"]))
        } else {
            (503, "gone".to_string())
        }
    })
    .await;

    let collection = Arc::new(FeedCollection::new(
        reqwest::Client::new(),
        "stub",
        format!("{}/feed", base),
    ));
    let catalog = SketchCatalog::new(collection);
    catalog.init().await.unwrap();
    catalog.until_idle().await;

    assert_eq!(catalog.num_sketches(), 3);
    assert!(catalog.is_exhausted());
    assert!(catalog.last_error().is_some());
    assert_eq!(catalog.resource(0).unwrap().name(), "one");
}
