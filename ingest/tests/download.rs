mod common;

use std::sync::Arc;

use common::{config, gzip, FakeAttachment, FakeConnector, FakeMessage, SAMPLE_XML};
use ingest::{
    store::{NewRawEmail, Store},
    Error, IngestConfig, Ingestor, MemoryStore,
};

fn connector() -> FakeConnector {
    FakeConnector::new(vec![FakeMessage::new(3, Some("<3@example.net>"))
        .with_attachment(FakeAttachment::new(
            "Report.XML.gz",
            "application/gzip",
            gzip(SAMPLE_XML.as_bytes()),
        )
        .base64())])
}

async fn seed(store: &MemoryStore, uid: Option<u32>) -> String {
    store
        .create_raw_email(NewRawEmail {
            imap_uid: uid,
            ..Default::default()
        })
        .await
        .unwrap()
        .id
}

#[test_log::test(tokio::test)]
async fn test_download_attachment() {
    let connector = connector();
    let ingestor = Ingestor::new(config(), connector.clone(), Arc::new(MemoryStore::new()));

    let attachment = ingestor
        .download_attachment(3, "report.xml.gz")
        .await
        .unwrap();
    assert_eq!(attachment.filename, "Report.XML.gz");
    assert_eq!(attachment.mime, "application/gzip");
    // decoded from base64
    assert_eq!(attachment.bytes, gzip(SAMPLE_XML.as_bytes()));

    assert_eq!(connector.logouts(), 1);
}

#[test_log::test(tokio::test)]
async fn test_download_raw_email_attachment() {
    let store = Arc::new(MemoryStore::new());
    let id = seed(&store, Some(3)).await;
    let ingestor = Ingestor::new(config(), connector(), store.clone());

    let attachment = ingestor
        .download_raw_email_attachment(&id, "Report.XML.gz")
        .await
        .unwrap();
    assert_eq!(attachment.mime, "application/gzip");
    assert!(!attachment.bytes.is_empty());
}

#[test_log::test(tokio::test)]
async fn test_download_errors() {
    let store = Arc::new(MemoryStore::new());
    let legacy = seed(&store, None).await;
    let gone = seed(&store, Some(4)).await;
    let present = seed(&store, Some(3)).await;
    let connector = connector();
    let ingestor = Ingestor::new(config(), connector.clone(), store.clone());

    let err = ingestor
        .download_raw_email_attachment("unknown", "report.xml.gz")
        .await
        .unwrap_err();
    assert!(matches!(err, Error::RawEmailNotFoundError(ref id) if id == "unknown"));
    assert!(err.is_not_found());

    let err = ingestor
        .download_raw_email_attachment(&legacy, "report.xml.gz")
        .await
        .unwrap_err();
    assert!(matches!(err, Error::DownloadNotImplementedError(_)));
    assert!(!err.is_not_found());

    let err = ingestor
        .download_raw_email_attachment(&gone, "report.xml.gz")
        .await
        .unwrap_err();
    assert!(matches!(err, Error::MessageNotFoundError(4)));

    let err = ingestor
        .download_raw_email_attachment(&present, "other.zip")
        .await
        .unwrap_err();
    assert!(matches!(err, Error::AttachmentNotFoundError(3, ref name) if name == "other.zip"));

    // the session is torn down after every failed lookup
    assert_eq!(connector.logouts(), 2);
}

#[test_log::test(tokio::test)]
async fn test_download_too_large() {
    let store = Arc::new(MemoryStore::new());
    let id = seed(&store, Some(3)).await;
    let config = IngestConfig {
        attachment_size_limit: 8,
        ..config()
    };
    let ingestor = Ingestor::new(config, connector(), store.clone());

    match ingestor
        .download_raw_email_attachment(&id, "report.xml.gz")
        .await
        .unwrap_err()
    {
        Error::AttachmentTooLargeError(filename, size, limit) => {
            assert_eq!(filename, "Report.XML.gz");
            assert!(size > limit);
            assert_eq!(limit, 8);
        }
        err => panic!("unexpected error: {err:?}"),
    }
}
