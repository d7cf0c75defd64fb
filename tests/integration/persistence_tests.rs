use std::sync::Arc;
use std::time::Duration;

use vidseek::SeekError;
use vidseek::search::embeddings::HashEmbedder;
use vidseek::search::index::{BuildOptions, EmbeddingIndex};
use vidseek::storage::Database;
use vidseek::test_utils::fixtures::{UnitTestFixture, topic_records};

const TIMEOUT: Duration = Duration::from_secs(5);

fn open_index(fixture: &UnitTestFixture, dims: usize) -> vidseek::Result<EmbeddingIndex> {
    let db = Database::open(fixture.db_path())?;
    EmbeddingIndex::open(db, Arc::new(HashEmbedder::new(dims)), TIMEOUT)
}

#[test]
fn test_entries_survive_reopen() {
    let fixture = UnitTestFixture::new();
    let before = {
        let index = open_index(&fixture, 48).unwrap();
        index
            .build(&topic_records(), BuildOptions::default(), |_| {})
            .unwrap();
        index.snapshot()
    };

    let reopened = open_index(&fixture, 48).unwrap();
    let after = reopened.snapshot();
    assert_eq!(after.len(), 10);
    for (a, b) in before.iter().zip(&after) {
        assert_eq!(**a, **b);
    }
    assert!(reopened.stats().persistent);
}

#[test]
fn test_removal_is_persisted() {
    let fixture = UnitTestFixture::new();
    {
        let index = open_index(&fixture, 48).unwrap();
        index
            .build(&topic_records(), BuildOptions::default(), |_| {})
            .unwrap();
        index.remove("vid-05").unwrap();
    }
    let reopened = open_index(&fixture, 48).unwrap();
    assert_eq!(reopened.len(), 9);
    assert!(reopened.get("vid-05").is_none());
}

#[test]
fn test_reopen_with_other_dimension_fails() {
    let fixture = UnitTestFixture::new();
    {
        let index = open_index(&fixture, 48).unwrap();
        index.upsert("v1", "some text").unwrap();
    }
    let err = open_index(&fixture, 64).err().unwrap();
    assert!(matches!(
        err,
        SeekError::InvalidDimension {
            expected: 64,
            actual: 48
        }
    ));
}
