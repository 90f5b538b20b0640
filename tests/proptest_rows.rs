//! Property-based tests using proptest
//!
//! These tests verify the row shape guarantees of flattening and projection
//! over randomized resource documents.

use anyhow::Result;
use async_trait::async_trait;
use cloudtab::collect::{
    Account, Collector, Connected, Page, ProviderKind, ResourceSource, ScopeContext, SubScopeKind,
};
use cloudtab::table::flatten::to_snake_case;
use cloudtab::table::{flatten, project, ColumnSchema, FlattenOptions};
use proptest::prelude::*;
use serde_json::{Map, Value};
use std::collections::BTreeSet;
use std::sync::Arc;

/// Arbitrary JSON value, nested up to three levels
fn arb_json() -> impl Strategy<Value = Value> {
    let leaf = prop_oneof![
        Just(Value::Null),
        any::<bool>().prop_map(Value::from),
        any::<i64>().prop_map(Value::from),
        "[a-zA-Z0-9 ]{0,8}".prop_map(Value::from),
    ];
    leaf.prop_recursive(3, 24, 4, |inner| {
        prop_oneof![
            prop::collection::vec(inner.clone(), 0..4).prop_map(Value::Array),
            prop::collection::btree_map("[a-zA-Z]{1,8}", inner, 0..4)
                .prop_map(|m| Value::Object(m.into_iter().collect())),
        ]
    })
}

/// Arbitrary resource: always a JSON object at the root
fn arb_resource() -> impl Strategy<Value = Value> {
    prop::collection::btree_map("[a-zA-Z]{1,8}", arb_json(), 0..6)
        .prop_map(|m| Value::Object(m.into_iter().collect::<Map<String, Value>>()))
}

fn arb_columns() -> impl Strategy<Value = BTreeSet<String>> {
    prop::collection::btree_set("[a-z][a-z_]{0,11}", 1..10)
}

fn azure_scope(subscription: &str, rg: &str) -> ScopeContext {
    ScopeContext::account(ProviderKind::Azure, subscription)
        .with_sub_scope(SubScopeKind::ResourceGroup, rg)
}

proptest! {
    /// A projected row has exactly the schema's columns, whatever the payload
    #[test]
    fn projected_keys_equal_schema(resource in arb_resource(), columns in arb_columns()) {
        let schema = ColumnSchema::new("t", columns.iter().cloned()).unwrap();
        let flat = flatten(&resource, &FlattenOptions::default());
        let row = project(&flat, &schema, &azure_scope("sub-1", "rg-1"));

        let keys: BTreeSet<String> = row.keys().cloned().collect();
        prop_assert_eq!(keys, columns);
    }

    /// Scope metadata overwrites same-named payload fields
    #[test]
    fn metadata_overlay_wins(
        resource in arb_resource(),
        payload_sub in "[a-z0-9-]{1,12}",
        subscription in "[a-z0-9-]{1,12}",
        rg in "[a-zA-Z0-9_-]{1,12}",
    ) {
        let mut resource = resource;
        if let Value::Object(map) = &mut resource {
            map.insert("subscriptionId".to_string(), Value::from(payload_sub));
            map.insert("resourceGroup".to_string(), Value::from("from-payload"));
        }
        let schema = ColumnSchema::new("t", ["subscription_id", "resource_group"]).unwrap();
        let flat = flatten(&resource, &FlattenOptions::default());
        let row = project(&flat, &schema, &azure_scope(&subscription, &rg));

        prop_assert_eq!(&row["subscription_id"], &subscription);
        prop_assert_eq!(&row["resource_group"], &rg);
    }

    /// Arrays become one JSON column and are never exploded into indexed keys
    #[test]
    fn arrays_stay_single_columns(items in prop::collection::vec(arb_resource(), 0..5)) {
        let resource = serde_json::json!({"pools": items});
        let row = flatten(&resource, &FlattenOptions::default());

        prop_assert_eq!(row.len(), 1);
        let decoded: Value = serde_json::from_str(&row["pools"]).unwrap();
        prop_assert_eq!(decoded, Value::Array(items));
    }

    /// A nested object is kept whole under its own key
    #[test]
    fn object_blob_decodes_to_original(inner in arb_resource()) {
        let resource = serde_json::json!({"sku": inner.clone()});
        let row = flatten(&resource, &FlattenOptions::default());

        let decoded: Value = serde_json::from_str(&row["sku"]).unwrap();
        prop_assert_eq!(decoded, inner);
        prop_assert!(row.keys().all(|k| k == "sku" || k.starts_with("sku_")));
    }

    /// Plain string leaves come through unchanged
    #[test]
    fn string_leaves_are_preserved(
        fields in prop::collection::btree_map("[a-z]{1,8}", "[a-zA-Z0-9 ]{0,16}", 0..8)
    ) {
        let resource = Value::Object(
            fields.iter().map(|(k, v)| (k.clone(), Value::from(v.as_str()))).collect(),
        );
        let row = flatten(&resource, &FlattenOptions::default());

        prop_assert_eq!(row.len(), fields.len());
        for (key, value) in &fields {
            prop_assert_eq!(&row[key], value);
        }
    }

    /// snake_case conversion is stable once applied
    #[test]
    fn snake_case_is_idempotent(key in "[a-zA-Z][a-zA-Z0-9]{0,20}") {
        let once = to_snake_case(&key);
        prop_assert_eq!(to_snake_case(&once), once.clone());
        prop_assert!(!once.chars().any(|c| c.is_uppercase()));
    }
}

/// Single-scope source serving one fixed page
struct OnePage(Vec<Value>);

#[async_trait]
impl ResourceSource for OnePage {
    type Session = ();

    async fn connect(&self, account: &Account) -> Result<Connected<()>> {
        Ok(Connected {
            scope: ScopeContext::account(ProviderKind::Gcp, account.label()),
            session: (),
        })
    }

    fn sub_scope_kind(&self) -> Option<SubScopeKind> {
        None
    }

    async fn list_sub_scopes(&self, _: &(), _: &ScopeContext) -> Result<Vec<ScopeContext>> {
        Ok(vec![])
    }

    async fn fetch_page(&self, _: &(), _: &ScopeContext, _: Option<String>) -> Result<Page> {
        Ok(Page::last(self.0.clone()))
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    /// Every object becomes a row and every non-object is reported, nothing else
    #[test]
    fn collector_accounts_for_every_item(items in prop::collection::vec(arb_json(), 0..20)) {
        let objects = items.iter().filter(|v| v.is_object()).count();
        let schema = Arc::new(ColumnSchema::new("t", ["project_id"]).unwrap());

        let source = Arc::new(OnePage(items.clone()));
        let result = tokio_test::block_on(
            Collector::default().collect(source, schema, &[Account::new("proj-1")]),
        );

        prop_assert_eq!(result.len(), objects);
        prop_assert_eq!(result.errors.len(), items.len() - objects);
        prop_assert_eq!(result.scopes_completed, 1);
        prop_assert!(result.rows.iter().all(|r| r["project_id"] == "proj-1"));
    }
}
