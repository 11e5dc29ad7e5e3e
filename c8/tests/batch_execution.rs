//! Batch execution through the fabric wrappers.

use anyhow::Result;

use c8::{BatchJobStatus, ExecError, QueryOptions};
use c8_testkit::{student, TestFabric};

#[tokio::test]
async fn test_batch_resolves_mixed_outcomes_in_order() -> Result<()> {
    let test = TestFabric::with_collections(&["students"]);
    test.stub.insert_document("students", student("Lily", 21));

    let batch = test.fabric.begin_batch_execution();
    let students = batch.collection("students");

    let neal = students.insert(student("Neal", 22)).await?;
    let duplicate = students.insert(student("Lily", 21)).await?;
    let missing = students.get("Kate").await?;
    let count = students.count().await?;
    let query = batch.c8ql().execute("RETURN 100000", QueryOptions::new()).await?;

    assert_eq!(batch.queue_size(), 5);
    assert_eq!(test.stub.request_count(), 0);
    assert_eq!(neal.status(), BatchJobStatus::Queued);

    let outcomes = batch.commit().await?;

    assert_eq!(outcomes.len(), 5);
    let failed: Vec<usize> = outcomes
        .iter()
        .enumerate()
        .filter(|(_, o)| o.is_err())
        .map(|(i, _)| i)
        .collect();
    assert_eq!(failed, vec![1, 2]);

    assert_eq!(neal.result()?.id, "students/Neal");
    assert_eq!(duplicate.result().unwrap_err().error_code(), Some(1210));
    assert_eq!(missing.result().unwrap_err().error_code(), Some(1202));
    assert_eq!(count.result()?, 2);
    assert_eq!(query.into_result()?.collect_all().await?, vec![serde_json::json!(100000)]);

    assert_eq!(test.stub.request_count(), 1);
    assert_eq!(batch.queue_size(), 0);
    Ok(())
}

#[tokio::test]
async fn test_batch_steps_apply_in_enqueue_order() -> Result<()> {
    let test = TestFabric::with_collections(&["students"]);
    let batch = test.fabric.begin_batch_execution();
    let students = batch.collection("students");

    let before = students.count().await?;
    students.insert(student("Neal", 22)).await?;
    let after = students.count().await?;
    batch.commit().await?;

    assert_eq!(before.result()?, 0);
    assert_eq!(after.result()?, 1);
    Ok(())
}

#[tokio::test]
async fn test_empty_batch_commit() -> Result<()> {
    let test = TestFabric::new();
    let batch = test.fabric.begin_batch_execution();

    assert!(batch.commit().await?.is_empty());
    assert_eq!(test.stub.request_count(), 0);
    Ok(())
}

#[tokio::test]
async fn test_uncommitted_batch_has_no_effect() -> Result<()> {
    let test = TestFabric::with_collections(&["students"]);
    {
        let batch = test.fabric.begin_batch_execution();
        let job = batch.collection("students").insert(student("Neal", 22)).await?;
        assert!(matches!(job.result(), Err(ExecError::Unresolved(_))));
    }

    assert_eq!(test.stub.document_count("students"), 0);
    assert_eq!(test.stub.request_count(), 0);
    Ok(())
}

#[tokio::test]
async fn test_failed_commit_surfaces_immediately() -> Result<()> {
    let test = TestFabric::with_collections(&["students"]);
    let batch = test.fabric.begin_batch_execution();
    let job = batch.collection("students").insert(student("Neal", 22)).await?;

    test.stub.set_fail_next(true);
    let error = batch.commit().await.unwrap_err();

    assert!(error.is_transport());
    assert_eq!(job.status(), BatchJobStatus::Queued);
    assert_eq!(test.stub.document_count("students"), 0);
    Ok(())
}
