mod common;

use async_trait::async_trait;
use common::{api, caller, failure, insert_task, metadata, success};
use docapi::{
    bson::{Bson, doc},
    memory::{InMemoryMetadata, InMemoryStore, StaticPermissionEngine},
    prelude::*,
};
use pretty_assertions::assert_eq;
use serde_json::json;

#[tokio::test]
async fn oversized_batches_insert_nothing() {
    let api = api();
    let batch: Vec<_> = (0..201)
        .map(|i| json!({ "doctype": "Task", "name": format!("T{i}") }))
        .collect();

    let response = api
        .insert_many_documents(&caller(), serde_json::Value::Array(batch))
        .await;

    assert_eq!(failure(response), ErrorKind::Validation);
    assert!(api.store().is_empty("Task").await);
}

#[tokio::test]
async fn batches_stop_at_the_first_failure() {
    let api = api();
    let batch = json!([
        { "doctype": "Task", "name": "A", "subject": "first" },
        { "doctype": "Task", "name": "B", "bogus": true },
        { "doctype": "Task", "name": "C", "subject": "third" },
    ]);

    assert_eq!(failure(api.insert_many_documents(&caller(), batch).await), ErrorKind::Validation);
    assert!(api.store().exists("Task", "A").await.unwrap());
    assert!(!api.store().exists("Task", "B").await.unwrap());
    assert!(!api.store().exists("Task", "C").await.unwrap());
}

#[tokio::test]
async fn batches_return_names_in_order() {
    let api = api();
    let names = success(
        api.insert_many_documents(
            &caller(),
            r#"[{"doctype": "Task", "name": "A"}, {"doctype": "Note", "subject": "x"}]"#,
        )
        .await,
    );

    assert_eq!(names.len(), 2);
    assert_eq!(names[0], "A");
    assert!(api.store().exists("Note", &names[1]).await.unwrap());
}

#[tokio::test]
async fn set_value_allows_idx_but_not_other_standard_fields() {
    let api = api();
    insert_task(&api, "T1", 1).await;

    let saved = success(
        api.set_field_value(&caller(), "Task", "T1", "idx", Some(Bson::Int32(5)))
            .await,
    );
    assert_eq!(saved.get("idx"), Some(&Bson::Int32(5)));

    let response = api
        .set_field_value(&caller(), "Task", "T1", "owner", Some(Bson::from("x@example.com")))
        .await;
    assert_eq!(failure(response), ErrorKind::Validation);

    let stored = success(
        api.get_document(&caller(), "Task", Some("T1"), RawFilter::None, None)
            .await,
    );
    assert_eq!(stored.get_str("owner").unwrap(), "a@example.com");
}

#[tokio::test]
async fn set_value_accepts_a_mapping_of_updates() {
    let api = api();
    insert_task(&api, "T1", 1).await;

    let saved = success(
        api.set_field_value(&caller(), "Task", "T1", r#"{"status": "Closed", "subject": "Done"}"#, None)
            .await,
    );

    assert_eq!(saved.get_str("status").unwrap(), "Closed");
    assert_eq!(saved.get_str("subject").unwrap(), "Done");
    assert_eq!(saved.get_str("modified_by").unwrap(), "a@example.com");

    let cleared = success(
        api.set_field_value(&caller(), "Task", "T1", "subject", None)
            .await,
    );
    assert_eq!(cleared.get_str("subject").unwrap(), "");

    let typed = api
        .set_field_value(&caller(), "Task", "T1", "qty", Some(Bson::from("many")))
        .await;
    assert_eq!(failure(typed), ErrorKind::Validation);
}

#[tokio::test]
async fn save_updates_and_inserts() {
    let api = api();
    let created = success(
        api.save_document(&caller(), json!({ "doctype": "Task", "subject": "new" }))
            .await,
    );
    let name = created.get_str("name").unwrap().to_string();

    let updated = success(
        api.save_document(&caller(), json!({ "doctype": "Task", "name": name, "subject": "renamed" }))
            .await,
    );
    assert_eq!(updated.get_str("subject").unwrap(), "renamed");
    assert_eq!(updated.get_str("creation").ok(), created.get_str("creation").ok());

    let upserted = success(
        api.save_document(&caller(), json!({ "doctype": "Task", "name": "T7", "subject": "fresh" }))
            .await,
    );
    assert_eq!(upserted.get_str("name").unwrap(), "T7");
}

#[tokio::test]
async fn stale_saves_conflict() {
    let api = api();
    let stored = insert_task(&api, "T1", 1).await;

    let stale = api
        .save_document(
            &caller(),
            json!({ "doctype": "Task", "name": "T1", "subject": "x", "modified": "2000-01-01 00:00:00.000000" }),
        )
        .await;
    assert_eq!(failure(stale), ErrorKind::Conflict);

    let current = api
        .save_document(
            &caller(),
            json!({
                "doctype": "Task",
                "name": "T1",
                "subject": "x",
                "modified": stored.get_str("modified").unwrap(),
            }),
        )
        .await;
    assert_eq!(success(current).get_str("subject").unwrap(), "x");
}

#[tokio::test]
async fn single_kinds_save_without_a_name() {
    let api = api();
    success(
        api.save_document(&caller(), json!({ "doctype": "Settings", "currency": "EUR" }))
            .await,
    );
    success(
        api.save_document(&caller(), json!({ "doctype": "Settings", "currency": "USD" }))
            .await,
    );

    assert_eq!(
        success(api.get_single_value(&caller(), "Settings", "currency").await),
        Bson::from("USD")
    );
    assert_eq!(api.store().len("Settings").await, 1);
}

#[tokio::test]
async fn delete_then_get_is_not_found() {
    let api = api();
    insert_task(&api, "T1", 1).await;

    success(api.delete_document(&caller(), "Task", "T1").await);

    let response = api
        .get_document(&caller(), "Task", Some("T1"), RawFilter::None, None)
        .await;
    assert_eq!(failure(response), ErrorKind::NotFound);
    assert_eq!(failure(api.delete_document(&caller(), "Task", "T1").await), ErrorKind::NotFound);
}

#[tokio::test]
async fn submit_then_cancel() {
    let api = api();

    let submitted = success(
        api.submit_document(&caller(), json!({ "doctype": "Task", "name": "T1", "subject": "x" }))
            .await,
    );
    assert_eq!(submitted.get_i32("docstatus").unwrap(), 1);

    let edit = api
        .set_field_value(&caller(), "Task", "T1", "subject", Some(Bson::from("y")))
        .await;
    assert_eq!(failure(edit), ErrorKind::Validation);
    assert_eq!(failure(api.delete_document(&caller(), "Task", "T1").await), ErrorKind::Validation);

    let cancelled = success(api.cancel_document(&caller(), "Task", "T1").await);
    assert_eq!(cancelled.get_i32("docstatus").unwrap(), 2);
    assert_eq!(cancelled.get_str("subject").unwrap(), "x");

    assert_eq!(
        failure(api.submit_document(&caller(), json!({ "doctype": "Task", "name": "T1" })).await),
        ErrorKind::Validation
    );
    success(api.delete_document(&caller(), "Task", "T1").await);
}

#[tokio::test]
async fn submitting_a_stored_draft() {
    let api = api();
    insert_task(&api, "T1", 1).await;

    assert_eq!(failure(api.cancel_document(&caller(), "Task", "T1").await), ErrorKind::Validation);

    let submitted = success(
        api.submit_document(&caller(), json!({ "doctype": "Task", "name": "T1", "status": "Open" }))
            .await,
    );
    assert_eq!(submitted.get_i32("docstatus").unwrap(), 1);
    assert_eq!(submitted.get_str("status").unwrap(), "Open");
    assert_eq!(submitted.get_i64("qty").unwrap(), 1);

    let note = api
        .submit_document(&caller(), json!({ "doctype": "Note", "subject": "x" }))
        .await;
    assert_eq!(failure(note), ErrorKind::Validation);
}

#[tokio::test]
async fn cancelled_documents_cannot_be_inserted() {
    let api = api();

    let response = api
        .insert_document(&caller(), json!({ "doctype": "Task", "docstatus": 2 }))
        .await;
    assert_eq!(failure(response), ErrorKind::Validation);
}

#[tokio::test]
async fn rename_conflicts_and_merges() {
    let api = api();
    insert_task(&api, "T1", 1).await;
    insert_task(&api, "T2", 2).await;

    let taken = api
        .rename_document(&caller(), "Task", "T1", "T2", false)
        .await;
    assert_eq!(failure(taken), ErrorKind::Conflict);

    assert_eq!(
        success(api.rename_document(&caller(), "Task", "T1", "T9", false).await),
        "T9"
    );
    assert_eq!(
        failure(
            api.get_document(&caller(), "Task", Some("T1"), RawFilter::None, None)
                .await
        ),
        ErrorKind::NotFound
    );
    assert_eq!(
        success(
            api.get_document(&caller(), "Task", Some("T9"), RawFilter::None, None)
                .await
        )
        .get_i64("qty")
        .unwrap(),
        1
    );

    assert_eq!(
        success(api.rename_document(&caller(), "Task", "T9", "T2", true).await),
        "T2"
    );
    assert!(!api.store().exists("Task", "T9").await.unwrap());
    assert_eq!(
        success(api.rename_document(&caller(), "Task", "T2", "T2", false).await),
        "T2"
    );
}

#[tokio::test]
async fn rename_requires_a_renamable_kind() {
    let api = api();
    let note = success(
        api.insert_document(&caller(), doc! { "doctype": "Note", "subject": "x" })
            .await,
    );

    let response = api
        .rename_document(&caller(), "Note", note.get_str("name").unwrap(), "N2", false)
        .await;
    assert_eq!(failure(response), ErrorKind::Validation);
}

#[tokio::test]
async fn malformed_payloads_are_decode_errors() {
    let api = api();

    assert_eq!(failure(api.insert_document(&caller(), "{not json").await), ErrorKind::Decode);
    assert_eq!(failure(api.insert_document(&caller(), "[1, 2]").await), ErrorKind::Decode);
    assert_eq!(
        failure(api.insert_document(&caller(), json!({ "subject": "no kind" })).await),
        ErrorKind::Validation
    );
}

/// Reserves `status` on top of the usual standard fields.
#[derive(Debug)]
struct StatusReserved(InMemoryMetadata);

#[async_trait]
impl MetadataProvider for StatusReserved {
    async fn describe(&self, kind: &str) -> DocumentStoreResult<DocumentKind> {
        self.0.describe(kind).await
    }

    fn standard_field_names(&self) -> Vec<String> {
        let mut names = self.0.standard_field_names();
        names.push("status".to_string());
        names
    }
}

#[tokio::test]
async fn set_value_honors_provider_reserved_fields() {
    let api = DocumentApi::new(
        InMemoryStore::new(),
        StatusReserved(metadata()),
        StaticPermissionEngine::allow_all(),
    );
    success(
        api.insert_document(&caller(), json!({ "doctype": "Task", "name": "T1", "status": "Open" }))
            .await,
    );

    let response = api
        .set_field_value(&caller(), "Task", "T1", "status", Some(Bson::from("Closed")))
        .await;
    assert_eq!(failure(response), ErrorKind::Validation);

    let updated = success(
        api.set_field_value(&caller(), "Task", "T1", "subject", Some(Bson::from("Done")))
            .await,
    );
    assert_eq!(updated.get_str("subject").unwrap(), "Done");
    assert_eq!(updated.get_str("status").unwrap(), "Open");
}
