/// Streaming downloader: naming, resume and failure handling.
mod common;

use common::test_config;
use mockito::{Matcher, ServerGuard};
use std::io::Write;
use std::time::Duration;
use tempfile::TempDir;
use ydmirror::{DownloadRequest, Downloader, HttpDownloader, HttpTransport, SyncConfig, SyncError};

fn downloader(server: &ServerGuard) -> HttpDownloader {
    let config = test_config(server);
    HttpDownloader::new(HttpTransport::new(&config).unwrap(), &config)
}

#[tokio::test]
async fn test_filename_from_content_disposition() {
    let mut server = mockito::Server::new_async().await;
    let mock = server
        .mock("GET", "/blob/abc123")
        .with_status(200)
        .with_header("content-disposition", "attachment; filename=\"report.txt\"")
        .with_body("hello")
        .expect(1)
        .create_async()
        .await;

    let dir = TempDir::new().unwrap();
    let url = format!("{}/blob/abc123", server.url());
    let request = DownloadRequest::new(url).into_dir(dir.path());

    let receipt = downloader(&server).download(&request).await.unwrap();

    assert_eq!(receipt.path, dir.path().join("report.txt"));
    assert_eq!(receipt.bytes_written, 5);
    assert_eq!(receipt.resumed_from, 0);
    assert_eq!(std::fs::read(&receipt.path).unwrap(), b"hello");
    mock.assert_async().await;
}

#[tokio::test]
async fn test_filename_falls_back_to_url_segment() {
    let mut server = mockito::Server::new_async().await;
    server
        .mock("GET", "/files/data.bin")
        .with_status(200)
        .with_body("0123456789")
        .create_async()
        .await;

    let dir = TempDir::new().unwrap();
    let request = DownloadRequest::new(format!("{}/files/data.bin", server.url()))
        .into_dir(dir.path().join("nested/deeper"))
        .expecting(Some(10));

    let receipt = downloader(&server).download(&request).await.unwrap();

    assert_eq!(receipt.path, dir.path().join("nested/deeper/data.bin"));
    assert_eq!(std::fs::read(&receipt.path).unwrap(), b"0123456789");
}

#[tokio::test]
async fn test_resume_sends_range_and_appends() {
    let mut server = mockito::Server::new_async().await;
    let mock = server
        .mock("GET", "/greeting")
        .match_header("range", "bytes=6-")
        .with_status(206)
        .with_body("world")
        .expect(1)
        .create_async()
        .await;

    let dir = TempDir::new().unwrap();
    std::fs::write(dir.path().join("greeting.txt"), "hello ").unwrap();
    let request = DownloadRequest::new(format!("{}/greeting", server.url()))
        .into_dir(dir.path())
        .named("greeting.txt")
        .expecting(Some(11));

    let receipt = downloader(&server).download(&request).await.unwrap();

    assert_eq!(receipt.resumed_from, 6);
    assert_eq!(receipt.bytes_written, 5);
    let content = std::fs::read(dir.path().join("greeting.txt")).unwrap();
    assert_eq!(content, b"hello world");
    let delivered = receipt.resumed_from + receipt.bytes_written;
    assert_eq!(content.len() as u64, delivered);
    mock.assert_async().await;
}

#[tokio::test]
async fn test_resume_after_resolving_name_from_response() {
    let mut server = mockito::Server::new_async().await;
    let unranged = server
        .mock("GET", "/dl")
        .match_header("range", Matcher::Missing)
        .with_status(200)
        .with_header("content-disposition", "attachment; filename=\"notes.md\"")
        .with_body("abcdef")
        .expect(1)
        .create_async()
        .await;
    let ranged = server
        .mock("GET", "/dl")
        .match_header("range", "bytes=3-")
        .with_status(206)
        .with_body("def")
        .expect(1)
        .create_async()
        .await;

    let dir = TempDir::new().unwrap();
    std::fs::write(dir.path().join("notes.md"), "abc").unwrap();
    let request = DownloadRequest::new(format!("{}/dl", server.url())).into_dir(dir.path());

    let receipt = downloader(&server).download(&request).await.unwrap();

    assert_eq!(receipt.resumed_from, 3);
    assert_eq!(
        std::fs::read(dir.path().join("notes.md")).unwrap(),
        b"abcdef"
    );
    unranged.assert_async().await;
    ranged.assert_async().await;
}

#[tokio::test]
async fn test_ignored_range_rewrites_from_zero() {
    let mut server = mockito::Server::new_async().await;
    server
        .mock("GET", "/whole")
        .with_status(200)
        .with_body("complete")
        .create_async()
        .await;

    let dir = TempDir::new().unwrap();
    std::fs::write(dir.path().join("whole.txt"), "xxx").unwrap();
    let request = DownloadRequest::new(format!("{}/whole", server.url()))
        .into_dir(dir.path())
        .named("whole.txt");

    let receipt = downloader(&server).download(&request).await.unwrap();

    assert_eq!(receipt.resumed_from, 0);
    assert_eq!(
        std::fs::read(dir.path().join("whole.txt")).unwrap(),
        b"complete"
    );
}

#[tokio::test]
async fn test_unsatisfiable_range_on_complete_file() {
    let mut server = mockito::Server::new_async().await;
    let mock = server
        .mock("GET", "/done")
        .match_header("range", "bytes=4-")
        .with_status(416)
        .expect(1)
        .create_async()
        .await;

    let dir = TempDir::new().unwrap();
    std::fs::write(dir.path().join("done.txt"), "full").unwrap();
    let request = DownloadRequest::new(format!("{}/done", server.url()))
        .into_dir(dir.path())
        .named("done.txt")
        .expecting(Some(4));

    let receipt = downloader(&server).download(&request).await.unwrap();

    assert_eq!(receipt.bytes_written, 0);
    assert_eq!(std::fs::read(dir.path().join("done.txt")).unwrap(), b"full");
    mock.assert_async().await;
}

#[tokio::test]
async fn test_unsatisfiable_range_restarts_from_zero() {
    let mut server = mockito::Server::new_async().await;
    server
        .mock("GET", "/changed")
        .match_header("range", "bytes=9-")
        .with_status(416)
        .create_async()
        .await;
    let fresh = server
        .mock("GET", "/changed")
        .match_header("range", Matcher::Missing)
        .with_status(200)
        .with_body("fresh")
        .expect(1)
        .create_async()
        .await;

    let dir = TempDir::new().unwrap();
    std::fs::write(dir.path().join("changed.txt"), "stale-old").unwrap();
    let request = DownloadRequest::new(format!("{}/changed", server.url()))
        .into_dir(dir.path())
        .named("changed.txt");

    let receipt = downloader(&server).download(&request).await.unwrap();

    assert_eq!(receipt.resumed_from, 0);
    assert_eq!(
        std::fs::read(dir.path().join("changed.txt")).unwrap(),
        b"fresh"
    );
    fresh.assert_async().await;
}

#[tokio::test]
async fn test_resume_disabled_truncates_existing_file() {
    let mut server = mockito::Server::new_async().await;
    server
        .mock("GET", "/again")
        .match_header("range", Matcher::Missing)
        .with_status(200)
        .with_body("new")
        .create_async()
        .await;

    let dir = TempDir::new().unwrap();
    std::fs::write(dir.path().join("again.txt"), "old and longer").unwrap();
    let request = DownloadRequest::new(format!("{}/again", server.url()))
        .into_dir(dir.path())
        .named("again.txt")
        .resume(false);

    downloader(&server).download(&request).await.unwrap();

    assert_eq!(std::fs::read(dir.path().join("again.txt")).unwrap(), b"new");
}

#[tokio::test]
async fn test_empty_body_creates_empty_file() {
    let mut server = mockito::Server::new_async().await;
    server
        .mock("GET", "/empty")
        .with_status(200)
        .with_body("")
        .create_async()
        .await;

    let dir = TempDir::new().unwrap();
    let request = DownloadRequest::new(format!("{}/empty", server.url()))
        .into_dir(dir.path())
        .named("empty.txt");

    let receipt = downloader(&server).download(&request).await.unwrap();

    assert_eq!(receipt.bytes_written, 0);
    assert_eq!(
        std::fs::metadata(dir.path().join("empty.txt")).unwrap().len(),
        0
    );
}

#[tokio::test]
async fn test_directory_in_the_way_is_io_error() {
    let mut server = mockito::Server::new_async().await;
    server
        .mock("GET", "/clash")
        .with_status(200)
        .with_body("content")
        .create_async()
        .await;

    let dir = TempDir::new().unwrap();
    std::fs::create_dir(dir.path().join("clash.txt")).unwrap();
    let request = DownloadRequest::new(format!("{}/clash", server.url()))
        .into_dir(dir.path())
        .named("clash.txt");

    let err = downloader(&server).download(&request).await.unwrap_err();

    assert!(matches!(err, SyncError::Io { .. }));
    assert!(dir.path().join("clash.txt").is_dir());
}

#[tokio::test]
async fn test_stalled_stream_keeps_partial_file() {
    let mut server = mockito::Server::new_async().await;
    server
        .mock("GET", "/slow")
        .with_status(200)
        .with_chunked_body(|w| {
            w.write_all(b"part")?;
            w.flush()?;
            std::thread::sleep(Duration::from_secs(3));
            w.write_all(b"rest")
        })
        .create_async()
        .await;

    let config = SyncConfig {
        timeout: Duration::from_secs(1),
        ..test_config(&server)
    };
    let downloader = HttpDownloader::new(HttpTransport::new(&config).unwrap(), &config);
    let dir = TempDir::new().unwrap();
    let request = DownloadRequest::new(format!("{}/slow", server.url()))
        .into_dir(dir.path())
        .named("slow.bin");

    let err = downloader.download(&request).await.unwrap_err();

    assert!(matches!(err, SyncError::Transport { .. }));
    assert_eq!(std::fs::read(dir.path().join("slow.bin")).unwrap(), b"part");
}

#[tokio::test]
async fn test_http_error_leaves_no_file() {
    let mut server = mockito::Server::new_async().await;
    server
        .mock("GET", "/gone")
        .with_status(410)
        .create_async()
        .await;

    let dir = TempDir::new().unwrap();
    let request = DownloadRequest::new(format!("{}/gone", server.url()))
        .into_dir(dir.path())
        .named("gone.txt");

    let err = downloader(&server).download(&request).await.unwrap_err();

    assert!(matches!(err, SyncError::HttpStatus { .. }));
    assert!(!dir.path().join("gone.txt").exists());
}
