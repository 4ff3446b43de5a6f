//! Common test utilities for xavyo-vdir integration tests.

#![allow(dead_code)]

use std::sync::{Arc, Once};

use xavyo_vdir::{Directory, Engine, EngineConfig, Partition};
use xavyo_vdir_connector::async_trait;
use xavyo_vdir_connector::prelude::*;
use xavyo_vdir_memory::MemoryConnector;

static LOGGING: Once = Once::new();

/// Install a tracing subscriber when `RUST_LOG` is set.
pub fn init_test_logging() {
    LOGGING.call_once(|| {
        if std::env::var("RUST_LOG").is_ok() {
            let _ = tracing_subscriber::fmt()
                .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
                .with_test_writer()
                .try_init();
        }
    });
}

/// Suffix of the test partition.
pub const SUFFIX: &str = "dc=example,dc=com";

/// Parse a DN, panicking on malformed test input.
pub fn dn(s: &str) -> Dn {
    Dn::parse(s).unwrap()
}

/// Entry mappings of the test partition:
///
/// ```text
/// dc=example,dc=com            root
///   ou=groups                  groups   (static)
///     cn=<g.groupname>         group    g: groups
///       uid=<m.member>         member   m: members (groupname = g.groupname)
///   ou=users                   users    (static)
///     uid=<u.uid>              user     u: users
/// ```
pub fn mappings() -> Vec<EntryMapping> {
    vec![
        EntryMapping::new("root")
            .with_object_class("domain")
            .with_attribute(AttributeMapping::constant("dc", "example")),
        EntryMapping::new("groups")
            .with_parent("root")
            .with_object_class("organizationalUnit")
            .with_attribute(AttributeMapping::constant("ou", "groups").rdn()),
        EntryMapping::new("group")
            .with_parent("groups")
            .with_object_class("groupOfNames")
            .with_source(
                SourceMapping::new("g", "groups")
                    .with_field(FieldMapping::variable("groupname", "cn"))
                    .with_field(FieldMapping::variable("description", "description")),
            )
            .with_attribute(AttributeMapping::variable("cn", "g.groupname").rdn())
            .with_attribute(AttributeMapping::variable("description", "g.description")),
        EntryMapping::new("member")
            .with_parent("group")
            .with_object_class("account")
            .with_source(
                SourceMapping::new("m", "members")
                    .with_field(FieldMapping::variable("groupname", "g.groupname"))
                    .with_field(FieldMapping::variable("member", "uid")),
            )
            .with_attribute(AttributeMapping::variable("uid", "m.member").rdn()),
        EntryMapping::new("users")
            .with_parent("root")
            .with_object_class("organizationalUnit")
            .with_attribute(AttributeMapping::constant("ou", "users").rdn()),
        EntryMapping::new("user")
            .with_parent("users")
            .with_object_class("inetOrgPerson")
            .with_source(
                SourceMapping::new("u", "users")
                    .with_field(FieldMapping::variable("uid", "uid"))
                    .with_field(FieldMapping::variable("cn", "cn"))
                    .with_field(FieldMapping::variable("password", "userPassword")),
            )
            .with_attribute(AttributeMapping::variable("uid", "u.uid").rdn())
            .with_attribute(AttributeMapping::variable("cn", "u.cn"))
            .with_attribute(AttributeMapping::variable("userPassword", "u.password")),
    ]
}

/// The test partition.
pub fn partition() -> Partition {
    Partition::new("example", dn(SUFFIX), mappings()).unwrap()
}

/// Registry serving every test source from one memory connector.
pub fn registry(connector: &MemoryConnector) -> ConnectorRegistry {
    let shared: BoxedConnector = Arc::new(connector.clone());
    ConnectorRegistry::new()
        .with("groups", shared.clone())
        .with("members", shared.clone())
        .with("users", shared)
}

/// A directory over the test partition backed by `connector`.
pub fn directory(connector: &MemoryConnector, config: EngineConfig) -> Directory {
    init_test_logging();
    let engine = Engine::new(registry(connector), config).unwrap();
    Directory::new(partition(), engine).unwrap()
}

/// DNs of the collected results, in arrival order.
pub fn dns(response: &BufferedResponse) -> Vec<String> {
    response
        .results()
        .iter()
        .map(|r| r.dn.to_string())
        .collect()
}

/// Connector whose every search fails.
#[derive(Debug)]
pub struct FailingConnector;

#[async_trait]
impl Connector for FailingConnector {
    fn display_name(&self) -> &str {
        "failing"
    }

    async fn search(
        &self,
        _ctx: &SourceContext<'_>,
        _request: &SearchRequest,
        _response: &mut dyn SearchResponse,
    ) -> ConnectorResult<()> {
        Err(ConnectorError::BackendUnavailable {
            message: "backend is down".to_string(),
        })
    }
}
