use super::bulk_insert::bulk_insert_sql;
use super::chunked_upsert::upsert_sql;
use super::session::Dialect;
use super::*;
use crate::model::Backend;
use crate::progress::ProgressEvent;
use crate::selector::select_unembedded;
use crate::test_support::{
    REJECT_BOOM_TRIGGER, embedding_rows, insert_catalog, memory_session, record,
};

fn no_progress() -> impl FnMut(ProgressEvent) {
    |_: ProgressEvent| {}
}

fn key(accession: &str) -> StudyKey {
    StudyKey::new(accession, "rs123", "A")
}

#[test]
fn strategies_disagree_on_a_repeated_key() {
    let first = vec![record("GCST0001", "rs123", "A", vec![1.0, 0.0])];
    let second = vec![record("GCST0001", "rs123", "A", vec![0.0, 1.0])];

    let mut keep_first = BulkInsertStore::new(memory_session(), Backend::Postgres, 10);
    keep_first.upsert(&first, &mut no_progress()).expect("first write");
    keep_first.upsert(&second, &mut no_progress()).expect("second write");
    let kept = load_embedding(keep_first.session(), &key("GCST0001")).expect("lookup");

    let mut keep_last = ChunkedUpsertStore::new(memory_session(), Backend::Sqlite, 10);
    keep_last.upsert(&first, &mut no_progress()).expect("first write");
    keep_last.upsert(&second, &mut no_progress()).expect("second write");
    let replaced = load_embedding(keep_last.session(), &key("GCST0001")).expect("lookup");

    assert_eq!(keep_first.conflict_policy(), ConflictPolicy::KeepFirst);
    assert_eq!(kept, Some(vec![1.0, 0.0]));
    assert_eq!(keep_last.conflict_policy(), ConflictPolicy::KeepLast);
    assert_eq!(replaced, Some(vec![0.0, 1.0]));
    assert_eq!(count_embeddings(keep_first.session()).expect("count"), 1);
    assert_eq!(count_embeddings(keep_last.session()).expect("count"), 1);
}

#[test]
fn duplicate_keys_inside_one_upload_follow_the_same_policies() {
    let records = vec![
        record("GCST0001", "rs123", "A", vec![1.0]),
        record("GCST0001", "rs123", "A", vec![-1.0]),
    ];

    let mut keep_first = BulkInsertStore::new(memory_session(), Backend::Postgres, 10);
    keep_first.upsert(&records, &mut no_progress()).expect("write");
    let mut keep_last = ChunkedUpsertStore::new(memory_session(), Backend::Sqlite, 10);
    keep_last.upsert(&records, &mut no_progress()).expect("write");

    assert_eq!(
        load_embedding(keep_first.session(), &key("GCST0001")).expect("lookup"),
        Some(vec![1.0])
    );
    assert_eq!(
        load_embedding(keep_last.session(), &key("GCST0001")).expect("lookup"),
        Some(vec![-1.0])
    );
}

#[test]
fn bulk_insert_failure_rolls_back_the_whole_upload() {
    let mut store = BulkInsertStore::new(memory_session(), Backend::Postgres, 2);
    store
        .session_mut()
        .connection()
        .execute_batch(REJECT_BOOM_TRIGGER)
        .expect("trigger");
    let records = vec![
        record("GCST0001", "rs1", "A", vec![1.0]),
        record("GCST0002", "rs2", "A", vec![1.0]),
        record("BOOM", "rs3", "A", vec![1.0]),
        record("GCST0004", "rs4", "A", vec![1.0]),
    ];

    let err = store
        .upsert(&records, &mut no_progress())
        .expect_err("third row rejected");

    match err {
        SyncError::Store {
            chunks_committed, ..
        } => assert_eq!(chunks_committed, 0),
        other => panic!("unexpected error: {other}"),
    }
    assert_eq!(embedding_rows(store.session_mut()), 0);
}

#[test]
fn chunked_upsert_failure_keeps_earlier_chunks() {
    let mut store = ChunkedUpsertStore::new(memory_session(), Backend::Sqlite, 2);
    store
        .session_mut()
        .connection()
        .execute_batch(REJECT_BOOM_TRIGGER)
        .expect("trigger");
    let records = vec![
        record("GCST0001", "rs1", "A", vec![1.0]),
        record("GCST0002", "rs2", "A", vec![1.0]),
        record("GCST0003", "rs3", "A", vec![1.0]),
        record("BOOM", "rs4", "A", vec![1.0]),
    ];

    let err = store
        .upsert(&records, &mut no_progress())
        .expect_err("fourth row rejected");

    match err {
        SyncError::Store {
            chunks_committed,
            ref rolled_back,
            ..
        } => {
            assert_eq!(chunks_committed, 1);
            assert!(rolled_back.contains("chunk 2 of 2"));
        }
        ref other => panic!("unexpected error: {other}"),
    }
    assert_eq!(embedding_rows(store.session_mut()), 2);
}

#[test]
fn uploads_report_progress_per_chunk() {
    let records = (0..7)
        .map(|index| record(&format!("GCST{index:04}"), "rs1", "A", vec![0.5, 0.5]))
        .collect::<Vec<EmbeddingRecord>>();

    for mut store in [
        Box::new(BulkInsertStore::new(memory_session(), Backend::Postgres, 3))
            as Box<dyn EmbeddingStore>,
        Box::new(ChunkedUpsertStore::new(memory_session(), Backend::Sqlite, 3)),
    ] {
        let mut events = Vec::<ProgressEvent>::new();
        let summary = store
            .upsert(&records, &mut |event| events.push(event))
            .expect("upload succeeds");

        assert_eq!(summary.rows_submitted, 7);
        assert_eq!(summary.rows_written, 7);
        assert_eq!(summary.chunks_committed, 3);
        assert_eq!(
            events
                .iter()
                .map(|event| event.completed_items)
                .collect::<Vec<usize>>(),
            vec![3, 6, 7]
        );
        assert_eq!(count_embeddings(store.session()).expect("count"), 7);
    }
}

#[test]
fn uploaded_keys_drop_out_of_the_selection() {
    let mut store = ChunkedUpsertStore::new(memory_session(), Backend::Sqlite, 100);
    let texts = [Some("trait"), None, None, None];
    insert_catalog(store.session_mut(), ("GCST1", "rs1", "A"), texts);
    insert_catalog(store.session_mut(), ("GCST2", "rs2", "G"), texts);

    store
        .upsert(&[record("GCST1", "rs1", "A", vec![1.0])], &mut no_progress())
        .expect("upload succeeds");

    let pending = select_unembedded(store.session(), None).expect("selection");
    assert_eq!(pending.len(), 1);
    assert_eq!(pending[0].key, StudyKey::new("GCST2", "rs2", "G"));
}

#[test]
fn empty_uploads_touch_nothing() {
    let mut store = BulkInsertStore::new(memory_session(), Backend::Postgres, 10);
    let summary = store.upsert(&[], &mut no_progress()).expect("no-op");
    assert_eq!(summary, UpsertSummary::default());
}

#[test]
fn bulk_statements_stay_under_the_bind_parameter_ceiling() {
    let mut store = BulkInsertStore::new(memory_session(), Backend::Postgres, 50_000);
    let page = Dialect::Sqlite.max_bind_params() / PARAMS_PER_ROW;
    let records = (0..page + 5)
        .map(|index| record(&format!("GCST{index:06}"), "rs1", "A", vec![1.0]))
        .collect::<Vec<EmbeddingRecord>>();

    let summary = store
        .upsert(&records, &mut no_progress())
        .expect("paged insert succeeds");
    assert_eq!(summary.rows_written as usize, page + 5);
    assert_eq!(summary.chunks_committed, 1);
}

#[test]
fn postgres_sql_uses_numbered_parameters_and_vector_casts() {
    let bulk = bulk_insert_sql(Dialect::Postgres, 2);
    assert!(bulk.contains("($1, $2, $3, $4::text::vector, NOW(), NOW())"));
    assert!(bulk.contains("($5, $6, $7, $8::text::vector, NOW(), NOW())"));
    assert!(bulk.ends_with("DO NOTHING"));

    let upsert = upsert_sql(Dialect::Sqlite);
    assert!(upsert.contains("(?1, ?2, ?3, ?4, datetime('now'), datetime('now'))"));
    assert!(upsert.contains("embedding = excluded.embedding"));
}
