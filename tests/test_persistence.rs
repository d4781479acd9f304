#![cfg(feature = "test-utils")]

mod support;

use crate::support::file_library;
use chrono::{Duration, Utc};
use snipper::db::{NewAudioFile, SnippetRecord};
use snipper::{LibraryError, PersistenceGateway};

fn record(audio_file_id: i64, region_id: &str, start: f64, end: f64) -> SnippetRecord {
    SnippetRecord {
        audio_file_id,
        region_id: region_id.to_string(),
        start_time: start,
        end_time: end,
        name: "Clip".to_string(),
        is_active: false,
    }
}

#[tokio::test]
async fn test_upsert_snippet_keeps_one_row_per_key() {
    let (library, database, _temp_dir) = file_library().await;
    let track = library.add_track("song.mp3", vec![1, 2, 3]).await.unwrap();

    let first = library
        .upsert_snippet(&record(track, "r1", 1.0, 2.0))
        .await
        .unwrap();
    let second = library
        .upsert_snippet(&record(track, "r1", 3.0, 4.5))
        .await
        .unwrap();

    assert_eq!(first, second);
    let snippets = library.list_snippets_for_track(track).await.unwrap();
    assert_eq!(snippets.len(), 1);
    assert_eq!(snippets[0].start_time, 3.0);
    assert_eq!(snippets[0].end_time, 4.5);

    let stored = database.get_snippet("r1", track).await.unwrap().unwrap();
    assert_eq!(stored.id, first);
}

#[tokio::test]
async fn test_concurrent_upserts_do_not_duplicate() {
    let (library, _database, _temp_dir) = file_library().await;
    let track = library.add_track("song.mp3", vec![1]).await.unwrap();

    let a = record(track, "same", 1.0, 2.0);
    let b = record(track, "same", 5.0, 6.0);
    let c = record(track, "same", 7.0, 8.0);
    let (ra, rb, rc) = tokio::join!(
        library.upsert_snippet(&a),
        library.upsert_snippet(&b),
        library.upsert_snippet(&c)
    );

    let ids = [ra.unwrap(), rb.unwrap(), rc.unwrap()];
    assert!(ids.iter().all(|id| *id == ids[0]));
    assert_eq!(library.list_snippets_for_track(track).await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_same_region_id_on_two_tracks_is_two_rows() {
    let (library, _database, _temp_dir) = file_library().await;
    let first = library.add_track("a.mp3", vec![1]).await.unwrap();
    let second = library.add_track("b.mp3", vec![2]).await.unwrap();

    library.upsert_snippet(&record(first, "r", 1.0, 2.0)).await.unwrap();
    library.upsert_snippet(&record(second, "r", 1.0, 2.0)).await.unwrap();

    assert_eq!(library.list_snippets_for_track(first).await.unwrap().len(), 1);
    assert_eq!(library.list_snippets_for_track(second).await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_delete_track_cascades_to_snippets() {
    let (library, _database, _temp_dir) = file_library().await;
    let doomed = library.add_track("doomed.mp3", vec![1]).await.unwrap();
    let kept = library.add_track("kept.mp3", vec![2]).await.unwrap();

    for i in 0..5 {
        let region_id = format!("r{}", i);
        library
            .upsert_snippet(&record(doomed, &region_id, i as f64, i as f64 + 1.0))
            .await
            .unwrap();
    }
    library.upsert_snippet(&record(kept, "k", 1.0, 2.0)).await.unwrap();

    library.delete_track(doomed).await.unwrap();

    assert!(library.list_snippets_for_track(doomed).await.unwrap().is_empty());
    assert_eq!(library.list_snippets_for_track(kept).await.unwrap().len(), 1);
    assert!(library.get_track(doomed).await.unwrap().is_none());
    assert!(matches!(
        library.delete_track(doomed).await,
        Err(LibraryError::NotFound(_))
    ));
}

#[tokio::test]
async fn test_retention_purges_only_expired_tracks() {
    let (library, _database, _temp_dir) = file_library().await;

    let mut old = NewAudioFile::new("old.mp3", vec![1]);
    old.upload_time = Utc::now() - Duration::days(8);
    let old_id = library.upsert_track(&old).await.unwrap();
    library.upsert_snippet(&record(old_id, "r", 1.0, 2.0)).await.unwrap();

    let mut recent = NewAudioFile::new("recent.mp3", vec![2]);
    recent.upload_time = Utc::now() - Duration::days(6);
    let recent_id = library.upsert_track(&recent).await.unwrap();

    let purged = library.purge_older_than(Duration::days(7)).await.unwrap();

    assert_eq!(purged, vec![old_id]);
    let remaining: Vec<i64> = library
        .list_tracks()
        .await
        .unwrap()
        .into_iter()
        .map(|t| t.id)
        .collect();
    assert_eq!(remaining, vec![recent_id]);
    assert!(library.list_snippets_for_track(old_id).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_reupload_reactivates_without_duplicating() {
    let (library, _database, _temp_dir) = file_library().await;

    let mut original = NewAudioFile::new("song.mp3", vec![1, 2, 3]);
    original.upload_time = Utc::now() - Duration::days(2);
    let first = library.upsert_track(&original).await.unwrap();
    let other = library.add_track("other.mp3", vec![9]).await.unwrap();

    let again = library.add_track("song.mp3", vec![4, 5]).await.unwrap();

    assert_eq!(again, first);
    let tracks = library.list_tracks().await.unwrap();
    assert_eq!(tracks.len(), 2);
    let active: Vec<i64> = tracks.iter().filter(|t| t.is_active).map(|t| t.id).collect();
    assert_eq!(active, vec![first]);
    assert_ne!(active[0], other);

    let stored = library.get_track(first).await.unwrap().unwrap();
    assert_eq!(stored.data, vec![1, 2, 3]);
    assert!(stored.upload_time < Utc::now() - Duration::days(1));
}
