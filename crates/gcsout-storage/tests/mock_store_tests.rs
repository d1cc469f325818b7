// Copyright (C) 2026  winnyboy5
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU Affero General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
// GNU Affero General Public License for more details.
//
// You should have received a copy of the GNU Affero General Public License
// along with this program.  If not, see <https://www.gnu.org/licenses/>.
//! Session-level tests for MockStore
//!
//! These exercise the resumable session contract every ObjectStore must
//! honour, using a store shared across concurrent tasks.

use bytes::Bytes;
use gcsout_storage::mock::{Fault, FaultKind, MockOp, MockStore};
use gcsout_storage::{
    Credential, ObjectStore, ObjectTarget, StorageError, StoreConnector, UploadProgress,
};
use std::sync::Arc;

/// Test Debug trait implementation
#[test]
fn test_mock_store_debug() {
    let store = MockStore::new();
    assert!(format!("{:?}", store).contains("MockStore"));
}

/// Test a multi-chunk upload driven through a trait object
#[tokio::test]
async fn test_multi_chunk_upload_through_trait_object() {
    let mock = MockStore::new();
    let store: Arc<dyn ObjectStore> = Arc::new(mock.clone());
    let target = ObjectTarget::new("bucket", "out/part.000.00.csv").with_content_type("text/csv");

    let session = store.start_upload(&target).await.unwrap();
    let mut offset = 0u64;
    for chunk in [b"id,name\n".as_slice(), b"1,alice\n", b"2,bob\n"] {
        let progress = store
            .write_chunk(&session, offset, Bytes::copy_from_slice(chunk), None)
            .await
            .unwrap();
        offset += chunk.len() as u64;
        assert_eq!(progress, UploadProgress::Partial { persisted: offset });
    }

    let done = store
        .write_chunk(&session, offset, Bytes::new(), Some(offset))
        .await
        .unwrap();
    assert!(matches!(done, UploadProgress::Finalized(ref o) if o.name == "out/part.000.00.csv"));
    assert_eq!(
        mock.object("bucket", "out/part.000.00.csv").await.unwrap(),
        b"id,name\n1,alice\n2,bob\n"
    );
    assert_eq!(
        mock.content_type("bucket", "out/part.000.00.csv").await.as_deref(),
        Some("text/csv")
    );
}

/// Test that a finalized session reports the object again instead of failing
#[tokio::test]
async fn test_finalized_session_is_stable() {
    let store = MockStore::new();
    let session = store.start_upload(&ObjectTarget::new("b", "k")).await.unwrap();
    let first = store
        .write_chunk(&session, 0, Bytes::from_static(b"xyz"), Some(3))
        .await
        .unwrap();

    let again = store
        .write_chunk(&session, 0, Bytes::from_static(b"xyz"), Some(3))
        .await
        .unwrap();
    assert_eq!(first, again);
    assert_eq!(store.query_upload(&session).await.unwrap(), first);
    assert_eq!(store.object("b", "k").await.unwrap(), b"xyz");
}

/// Test that finalizing replaces an existing object with a new generation
#[tokio::test]
async fn test_finalize_overwrites_existing_object() {
    let store = MockStore::new();
    store.insert_object("b", "k", b"old".to_vec()).await;

    let session = store.start_upload(&ObjectTarget::new("b", "k")).await.unwrap();
    let UploadProgress::Finalized(object) = store
        .write_chunk(&session, 0, Bytes::from_static(b"new"), Some(3))
        .await
        .unwrap()
    else {
        panic!("expected finalized upload");
    };

    assert_eq!(object.generation, Some(2));
    assert_eq!(store.object("b", "k").await.unwrap(), b"new");
    assert_eq!(store.object_count().await, 1);
}

/// Test that concurrent sessions on different keys do not interfere
#[tokio::test]
async fn test_concurrent_sessions_are_independent() {
    let store = MockStore::new();

    let mut handles = Vec::new();
    for i in 0..8u8 {
        let store = store.clone();
        handles.push(tokio::spawn(async move {
            let key = format!("obj-{}", i);
            let session = store.start_upload(&ObjectTarget::new("b", &key)).await.unwrap();
            let payload = vec![i; 1000];
            store
                .write_chunk(&session, 0, Bytes::from(payload[..500].to_vec()), None)
                .await
                .unwrap();
            store
                .write_chunk(&session, 500, Bytes::from(payload[500..].to_vec()), Some(1000))
                .await
                .unwrap();
            key
        }));
    }

    for (i, handle) in handles.into_iter().enumerate() {
        let key = handle.await.unwrap();
        assert_eq!(store.object("b", &key).await.unwrap(), vec![i as u8; 1000]);
    }
    assert_eq!(store.open_sessions().await, 0);
    assert_eq!(store.started_sessions().await, 8);
}

/// Test that transient faults fire the requested number of times
#[tokio::test]
async fn test_transient_fault_budget() {
    let store = MockStore::new();
    store
        .inject_fault(Fault::new(MockOp::WriteChunk, FaultKind::Transient).times(2))
        .await;
    let session = store.start_upload(&ObjectTarget::new("b", "k")).await.unwrap();

    for _ in 0..2 {
        let err = store
            .write_chunk(&session, 0, Bytes::from_static(b"a"), None)
            .await
            .unwrap_err();
        assert!(err.is_transient());
    }
    assert_eq!(
        store.query_upload(&session).await.unwrap(),
        UploadProgress::Partial { persisted: 0 }
    );

    store.write_chunk(&session, 0, Bytes::from_static(b"a"), None).await.unwrap();
    assert_eq!(store.write_calls(), 3);
    assert_eq!(store.bytes_received(), 1);
}

/// Test that an unauthenticated fault is classified as an auth failure
#[tokio::test]
async fn test_unauthenticated_fault() {
    let store = MockStore::new();
    store
        .inject_fault(Fault::new(MockOp::StartUpload, FaultKind::Unauthenticated))
        .await;

    let err = store.start_upload(&ObjectTarget::new("b", "k")).await.unwrap_err();
    assert!(err.is_auth());
    assert!(!err.is_transient());

    store.clear_faults().await;
    assert!(store.start_upload(&ObjectTarget::new("b", "k")).await.is_ok());
}

/// Test that writes to an unknown session fail
#[tokio::test]
async fn test_unknown_session() {
    let store = MockStore::new();
    let session = gcsout_storage::UploadSessionId::new("does-not-exist");

    let err = store
        .write_chunk(&session, 0, Bytes::from_static(b"a"), None)
        .await
        .unwrap_err();
    assert!(matches!(err, StorageError::SessionNotFound(_)));
}

/// Test that the connector shares state with the store it was built from
#[tokio::test]
async fn test_connector_shares_state() {
    let mock = MockStore::new();
    let store = mock.connect(&Credential::Ambient).await.unwrap();

    let session = store.start_upload(&ObjectTarget::new("b", "k")).await.unwrap();
    store
        .write_chunk(&session, 0, Bytes::from_static(b"shared"), Some(6))
        .await
        .unwrap();

    assert_eq!(mock.object("b", "k").await.unwrap(), b"shared");
}

/// Test that undecodable key material is rejected at connect time
#[tokio::test]
async fn test_connector_rejects_bad_pkcs12() {
    let mock = MockStore::new();
    let credential = Credential::PrivateKey {
        pkcs12: b"not a pkcs12 archive".to_vec(),
        account_email: "sa@example.iam.gserviceaccount.com".to_string(),
    };

    let err = mock.connect(&credential).await.unwrap_err();
    assert!(matches!(err, StorageError::InvalidCredential(_)));
}
