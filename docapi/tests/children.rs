mod common;

use common::{api, caller, child_payload, failure, insert_task, rows_of, success};
use docapi::{
    bson::{Bson, doc},
    prelude::*,
};
use pretty_assertions::assert_eq;
use serde_json::json;

#[tokio::test]
async fn inserting_a_child_saves_the_parent() {
    let api = api();
    insert_task(&api, "T1", 1).await;

    let parent = success(api.insert_document(&caller(), child_payload("T1", "a")).await);
    assert_eq!(parent.get_str("doctype").unwrap(), "Task");
    assert_eq!(parent.get_str("name").unwrap(), "T1");

    let parent = success(api.insert_document(&caller(), child_payload("T1", "b")).await);
    let rows = rows_of(&parent, "items");

    assert_eq!(rows.len(), 2);
    assert_eq!(rows[0].get_str("item").unwrap(), "a");
    assert_eq!(rows[1].get_str("item").unwrap(), "b");
    assert_eq!(rows[1].get("idx"), Some(&Bson::Int64(2)));
    assert_eq!(rows[1].get_str("parent").unwrap(), "T1");
    assert_eq!(rows[1].get_str("parenttype").unwrap(), "Task");
    assert_eq!(rows[1].get_str("parentfield").unwrap(), "items");
}

#[tokio::test]
async fn partial_linkage_is_a_top_level_insert() {
    let api = api();
    insert_task(&api, "T1", 1).await;

    let stray = success(
        api.insert_document(&caller(), json!({ "doctype": "Task Item", "parent": "T1", "item": "x" }))
            .await,
    );
    assert_eq!(stray.get_str("doctype").unwrap(), "Task Item");
    assert!(!stray.contains_key("parenttype"));

    let parent = success(
        api.get_document(&caller(), "Task", Some("T1"), RawFilter::None, None)
            .await,
    );
    assert!(rows_of(&parent, "items").is_empty());
}

#[tokio::test]
async fn children_need_a_matching_table_field() {
    let api = api();
    insert_task(&api, "T1", 1).await;

    let response = api
        .insert_document(
            &caller(),
            json!({ "doctype": "Task Item", "parent": "T1", "parenttype": "Task", "parentfield": "lines" }),
        )
        .await;
    assert_eq!(failure(response), ErrorKind::Validation);

    let orphan = api
        .insert_document(&caller(), child_payload("T9", "a"))
        .await;
    assert_eq!(failure(orphan), ErrorKind::NotFound);
}

#[tokio::test]
async fn payload_rows_are_linked_and_ordered_by_idx() {
    let api = api();

    let parent = success(
        api.insert_document(
            &caller(),
            json!({
                "doctype": "Task",
                "name": "T1",
                "items": [
                    { "item": "loose" },
                    { "item": "second", "idx": 2 },
                    { "item": "first", "idx": 1 },
                ],
            }),
        )
        .await,
    );

    let items: Vec<_> = rows_of(&parent, "items")
        .iter()
        .map(|row| row.get_str("item").unwrap().to_string())
        .collect();
    assert_eq!(items, vec!["first", "second", "loose"]);

    let rows = rows_of(&parent, "items");
    assert_eq!(rows[2].get("idx"), Some(&Bson::Int64(3)));
    assert_eq!(rows[2].get_str("doctype").unwrap(), "Task Item");
    assert!(rows.iter().all(|row| row.get_str("parent").ok() == Some("T1")));

    let wrong = api
        .insert_document(
            &caller(),
            json!({ "doctype": "Task", "items": [{ "doctype": "Note", "subject": "x" }] }),
        )
        .await;
    assert_eq!(failure(wrong), ErrorKind::Validation);
}

#[tokio::test]
async fn child_reads_require_a_parent_kind() {
    let api = api();
    insert_task(&api, "T1", 1).await;
    success(api.insert_document(&caller(), child_payload("T1", "a")).await);

    let without_parent = api
        .list_documents(&caller(), ListArgs::builder("Task Item").build())
        .await;
    assert_eq!(failure(without_parent), ErrorKind::Permission);

    let wrong_parent = api
        .list_documents(&caller(), ListArgs::builder("Task Item").parent("Note").build())
        .await;
    assert_eq!(failure(wrong_parent), ErrorKind::Permission);

    let rows = success(
        api.list_documents(
            &caller(),
            ListArgs::builder("Task Item")
                .fields(vec!["item", "parent"])
                .parent("Task")
                .build(),
        )
        .await,
    );
    assert_eq!(rows, Rows::Dicts(vec![doc! { "item": "a", "parent": "T1" }]));
}

#[tokio::test]
async fn child_records_are_updated_and_removed_through_the_parent() {
    let api = api();
    insert_task(&api, "T1", 1).await;
    success(api.insert_document(&caller(), child_payload("T1", "a")).await);
    let parent = success(api.insert_document(&caller(), child_payload("T1", "b")).await);
    let first = rows_of(&parent, "items")[0]
        .get_str("name")
        .unwrap()
        .to_string();

    let parent = success(
        api.set_field_value(&caller(), "Task Item", &first, "qty", Some(Bson::Int64(4)))
            .await,
    );
    assert_eq!(parent.get_str("doctype").unwrap(), "Task");
    assert_eq!(rows_of(&parent, "items")[0].get("qty"), Some(&Bson::Int64(4)));

    let row = success(
        api.get_document(&caller(), "Task Item", Some(first.as_str()), RawFilter::None, Some("Task"))
            .await,
    );
    assert_eq!(row.get_str("item").unwrap(), "a");

    success(api.delete_document(&caller(), "Task Item", &first).await);

    let parent = success(
        api.get_document(&caller(), "Task", Some("T1"), RawFilter::None, None)
            .await,
    );
    let rows = rows_of(&parent, "items");
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].get_str("item").unwrap(), "b");
    assert_eq!(rows[0].get("idx"), Some(&Bson::Int64(1)));
}

#[tokio::test]
async fn saving_a_child_upserts_it_inside_the_parent() {
    let api = api();
    insert_task(&api, "T1", 1).await;

    let mut payload = child_payload("T1", "a");
    payload["name"] = json!("row-1");
    let saved = success(api.save_document(&caller(), payload).await);
    assert_eq!(saved.get_str("doctype").unwrap(), "Task Item");
    assert_eq!(saved.get_str("name").unwrap(), "row-1");

    let mut payload = child_payload("T1", "renamed");
    payload["name"] = json!("row-1");
    success(api.save_document(&caller(), payload).await);

    let parent = success(
        api.get_document(&caller(), "Task", Some("T1"), RawFilter::None, None)
            .await,
    );
    let rows = rows_of(&parent, "items");
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].get_str("item").unwrap(), "renamed");
}

#[tokio::test]
async fn child_names_stay_unique_across_parents() {
    let api = api();
    insert_task(&api, "T1", 1).await;
    insert_task(&api, "T2", 2).await;

    let mut payload = child_payload("T1", "a");
    payload["name"] = json!("r1");
    success(api.insert_document(&caller(), payload.clone()).await);
    success(api.insert_document(&caller(), child_payload("T1", "b")).await);

    let again = api.insert_document(&caller(), payload).await;
    assert_eq!(failure(again), ErrorKind::Conflict);

    let mut elsewhere = child_payload("T2", "c");
    elsewhere["name"] = json!("r1");
    let elsewhere = api.insert_document(&caller(), elsewhere).await;
    assert_eq!(failure(elsewhere), ErrorKind::Conflict);

    success(api.delete_document(&caller(), "Task Item", "r1").await);

    let parent = success(
        api.get_document(&caller(), "Task", Some("T1"), RawFilter::None, None)
            .await,
    );
    let rows = rows_of(&parent, "items");
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].get_str("item").unwrap(), "b");
}
