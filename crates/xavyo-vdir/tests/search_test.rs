//! Search tests over the groups/members/users test partition.

mod common;

use common::{dn, directory, dns};
use xavyo_vdir::{EngineConfig, EngineError, Session};
use xavyo_vdir_connector::prelude::*;
use xavyo_vdir_memory::{row, MemoryConnector};

async fn add_group(directory: &xavyo_vdir::Directory, name: &str, description: &str) {
    let request = AddRequest::new(
        dn(&format!("cn={name},ou=groups,dc=example,dc=com")),
        Attributes::new()
            .with("cn", name)
            .with("description", description),
    );
    directory.add(&Session::new(), &request).await.unwrap();
}

#[tokio::test]
async fn test_added_group_appears_one_level_below_groups() {
    let connector = MemoryConnector::new("test");
    let directory = directory(&connector, EngineConfig::default());

    add_group(&directory, "acme", "desc1").await;

    let mut response = BufferedResponse::new();
    directory
        .search(
            &Session::new(),
            &SearchRequest::new(dn("ou=groups,dc=example,dc=com"), Scope::One),
            &mut response,
        )
        .await
        .unwrap();

    assert_eq!(dns(&response), vec!["cn=acme,ou=groups,dc=example,dc=com"]);
    let entry = &response.results()[0].attributes;
    assert_eq!(entry.get_first("description"), Some("desc1"));
    assert_eq!(entry.get("objectClass").unwrap(), &["groupOfNames".to_string()]);
    assert_eq!(response.result_code(), Some(ResultCode::Success));
}

#[tokio::test]
async fn test_members_appear_once_member_rows_exist() {
    let connector = MemoryConnector::new("test");
    let directory = directory(&connector, EngineConfig::default());
    add_group(&directory, "acme", "desc1").await;

    let request = SearchRequest::new(dn("ou=groups,dc=example,dc=com"), Scope::Sub);

    let mut before = BufferedResponse::new();
    directory
        .search(&Session::new(), &request, &mut before)
        .await
        .unwrap();
    assert_eq!(
        dns(&before),
        vec![
            "ou=groups,dc=example,dc=com",
            "cn=acme,ou=groups,dc=example,dc=com",
        ],
        "no member entry without a member row"
    );

    connector
        .insert("members", row([("groupname", "acme"), ("member", "alice")]))
        .await;

    let mut after = BufferedResponse::new();
    directory
        .search(&Session::new(), &request, &mut after)
        .await
        .unwrap();
    assert_eq!(
        dns(&after),
        vec![
            "ou=groups,dc=example,dc=com",
            "cn=acme,ou=groups,dc=example,dc=com",
            "uid=alice,cn=acme,ou=groups,dc=example,dc=com",
        ]
    );
}

#[tokio::test]
async fn test_members_are_scoped_to_their_group() {
    let connector = MemoryConnector::new("test");
    let directory = directory(&connector, EngineConfig::default());
    add_group(&directory, "acme", "desc1").await;
    add_group(&directory, "apex", "desc2").await;
    connector
        .insert("members", row([("groupname", "acme"), ("member", "alice")]))
        .await;
    connector
        .insert("members", row([("groupname", "apex"), ("member", "bob")]))
        .await;

    let mut response = BufferedResponse::new();
    directory
        .search(
            &Session::new(),
            &SearchRequest::new(dn("cn=apex,ou=groups,dc=example,dc=com"), Scope::One),
            &mut response,
        )
        .await
        .unwrap();

    assert_eq!(dns(&response), vec!["uid=bob,cn=apex,ou=groups,dc=example,dc=com"]);
}

#[tokio::test]
async fn test_base_search_with_case_variant_dn_returns_backend_spelling() {
    let connector = MemoryConnector::new("test");
    let directory = directory(&connector, EngineConfig::default());
    add_group(&directory, "acme", "desc1").await;

    let mut response = BufferedResponse::new();
    directory
        .search(
            &Session::new(),
            &SearchRequest::new(dn("cn=ACME,ou=groups,dc=example,dc=com"), Scope::Base),
            &mut response,
        )
        .await
        .unwrap();

    assert_eq!(dns(&response), vec!["cn=acme,ou=groups,dc=example,dc=com"]);
    assert_eq!(
        response.results()[0].attributes.get("cn").unwrap(),
        &["acme".to_string()]
    );
}

#[tokio::test]
async fn test_static_entry_ignores_filter() {
    let connector = MemoryConnector::new("test");
    let directory = directory(&connector, EngineConfig::default());

    let request = SearchRequest::new(dn("ou=groups,dc=example,dc=com"), Scope::Base)
        .with_filter(Filter::eq("cn", "nothing"));
    let mut response = BufferedResponse::new();
    directory
        .search(&Session::new(), &request, &mut response)
        .await
        .unwrap();

    assert_eq!(dns(&response), vec!["ou=groups,dc=example,dc=com"]);
    let entry = &response.results()[0].attributes;
    assert_eq!(entry.get_first("ou"), Some("groups"));
    assert_eq!(entry.get_first("objectClass"), Some("organizationalUnit"));
}

#[tokio::test]
async fn test_filter_applies_to_dynamic_entries() {
    let connector = MemoryConnector::new("test");
    let directory = directory(&connector, EngineConfig::default());
    add_group(&directory, "acme", "desc1").await;
    add_group(&directory, "apex", "desc2").await;

    let request = SearchRequest::new(dn("ou=groups,dc=example,dc=com"), Scope::One)
        .with_filter(Filter::eq("description", "DESC2"));
    let mut response = BufferedResponse::new();
    directory
        .search(&Session::new(), &request, &mut response)
        .await
        .unwrap();

    assert_eq!(dns(&response), vec!["cn=apex,ou=groups,dc=example,dc=com"]);
}

#[tokio::test]
async fn test_requested_attributes_are_trimmed() {
    let connector = MemoryConnector::new("test");
    let directory = directory(&connector, EngineConfig::default());
    add_group(&directory, "acme", "desc1").await;

    let request = SearchRequest::new(dn("cn=acme,ou=groups,dc=example,dc=com"), Scope::Base)
        .with_attributes(vec!["description".to_string()]);
    let mut response = BufferedResponse::new();
    directory
        .search(&Session::new(), &request, &mut response)
        .await
        .unwrap();

    let names: Vec<&str> = response.results()[0].attributes.names().collect();
    assert_eq!(names, vec!["description"]);
}

#[tokio::test]
async fn test_repeated_search_is_identical() {
    let connector = MemoryConnector::new("test");
    let directory = directory(&connector, EngineConfig::default());
    add_group(&directory, "acme", "desc1").await;
    add_group(&directory, "apex", "desc2").await;
    connector
        .insert("members", row([("groupname", "acme"), ("member", "alice")]))
        .await;

    let request = SearchRequest::new(dn("dc=example,dc=com"), Scope::Sub);
    let mut runs = Vec::new();
    for _ in 0..2 {
        let mut response = BufferedResponse::new();
        directory
            .search(&Session::new(), &request, &mut response)
            .await
            .unwrap();
        runs.push(response.into_results());
    }

    assert_eq!(runs[0], runs[1]);
    assert_eq!(runs[0].len(), 6, "root, two ous, two groups, one member");
}

#[tokio::test]
async fn test_size_limit_boundary() {
    let connector = MemoryConnector::new("test");
    let directory = directory(&connector, EngineConfig::default());
    for name in ["acme", "apex", "umbrella"] {
        add_group(&directory, name, "desc").await;
    }
    let base = dn("ou=groups,dc=example,dc=com");

    let mut limited = BufferedResponse::new();
    let err = directory
        .search(
            &Session::new(),
            &SearchRequest::new(base.clone(), Scope::One).with_size_limit(2),
            &mut limited,
        )
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::SizeLimitExceeded { limit: 2 }));
    assert_eq!(limited.len(), 2, "delivered entries remain valid");
    assert_eq!(limited.result_code(), Some(ResultCode::SizeLimitExceeded));

    let mut exact = BufferedResponse::new();
    directory
        .search(
            &Session::new(),
            &SearchRequest::new(base, Scope::One).with_size_limit(3),
            &mut exact,
        )
        .await
        .unwrap();
    assert_eq!(exact.len(), 3);
    assert_eq!(exact.result_code(), Some(ResultCode::Success));
}

#[tokio::test]
async fn test_configured_size_limit_applies_without_request_limit() {
    let connector = MemoryConnector::new("test");
    let directory = directory(&connector, EngineConfig::default().with_default_size_limit(1));
    add_group(&directory, "acme", "desc1").await;
    add_group(&directory, "apex", "desc2").await;

    let mut response = BufferedResponse::new();
    let err = directory
        .search(
            &Session::new(),
            &SearchRequest::new(dn("ou=groups,dc=example,dc=com"), Scope::One),
            &mut response,
        )
        .await
        .unwrap_err();

    assert!(err.is_limit());
    assert_eq!(response.len(), 1);
}

#[tokio::test]
async fn test_unknown_base_is_no_such_entry() {
    let connector = MemoryConnector::new("test");
    let directory = directory(&connector, EngineConfig::default());

    let mut response = BufferedResponse::new();
    let err = directory
        .search(
            &Session::new(),
            &SearchRequest::new(dn("ou=printers,dc=example,dc=com"), Scope::Sub),
            &mut response,
        )
        .await
        .unwrap_err();

    assert!(matches!(err, EngineError::NoSuchEntry { .. }));
    assert_eq!(response.result_code(), Some(ResultCode::NoSuchObject));
    assert!(response.is_empty());
}
