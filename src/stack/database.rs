// Copyright (c) 2025 - Cowboy AI, Inc.
//! Database Module
//!
//! The MySQL instance holding the Hive metastore, placed in the private
//! subnets, plus the relational objects inside it: the `hive` database, the
//! metastore user and that user's grant. The relational objects are managed
//! through a MySQL provider bound to the instance endpoint, so they are
//! created only once the instance reports one.

use serde_json::json;
use tracing::debug;

use crate::config::{RdsConfig, StackSecrets};
use crate::context::DeploymentContext;
use crate::errors::PlatformResult;
use crate::graph::{OutputRef, ResourceGraph, ResourceKind, ResourceRef, SecretRef};
use crate::stack::network::{GroupPurpose, NetworkOutputs};

/// Database the metastore lives in
pub const HIVE_DATABASE: &str = "hive";

/// Privileges granted to the metastore user
pub const HIVE_PRIVILEGES: [&str; 4] = ["select", "insert", "update", "delete"];

/// `appmpdwrds<env>`; RDS database names allow alphanumerics only
pub fn instance_name(env: &str) -> String {
    format!("appmpdwrds{}", env)
}

pub fn subnet_group_name(env: &str) -> String {
    format!("app-mpdw-dbsn-{}", env)
}

#[derive(Debug, Clone)]
pub struct DatabaseOutputs {
    pub subnet_group: ResourceRef,
    pub instance: ResourceRef,
    pub provider: ResourceRef,
    pub database: ResourceRef,
    pub user: ResourceRef,
    pub grant: ResourceRef,
    pub hive_username: String,
}

impl DatabaseOutputs {
    /// `host:port` of the instance
    pub fn endpoint(&self) -> OutputRef {
        self.instance.output("endpoint")
    }

    /// Host name of the instance
    pub fn address(&self) -> OutputRef {
        self.instance.output("address")
    }
}

/// Declare the subnet group, instance and metastore objects
pub fn configure_rds(
    graph: &mut ResourceGraph,
    ctx: &DeploymentContext,
    config: &RdsConfig,
    network: &NetworkOutputs,
) -> PlatformResult<DatabaseOutputs> {
    let env = ctx.env();
    let tags = ctx.tags("emr");

    let group_name = subnet_group_name(env);
    let subnet_group = graph.declare_with(
        ResourceKind::RdsSubnetGroup,
        &group_name,
        json!({
            "name": group_name,
            "subnetIds": network.private_subnet_ids(),
            "tags": tags,
        }),
        &[&network.vpc],
    )?;

    let name = instance_name(env);
    let mut depends_on = vec![&network.vpc];
    let mut security_groups = Vec::new();
    if let Some(group) = network.security_group(GroupPurpose::Rds) {
        depends_on.push(group);
        security_groups.push(group.id());
    }
    let instance = graph.declare_with(
        ResourceKind::RdsInstance,
        &name,
        json!({
            "identifier": name,
            "dbName": name,
            "engine": config.engine,
            "engineVersion": config.engine_version,
            "instanceClass": config.instance_class,
            "allocatedStorage": config.allocated_storage,
            "username": config.master_username,
            "password": SecretRef(StackSecrets::MASTER_PASSWORD.into()),
            "port": config.port,
            "iamDatabaseAuthenticationEnabled": config.iam_database_authentication_enabled,
            "dbSubnetGroupName": subnet_group.output("name"),
            "vpcSecurityGroupIds": security_groups,
            "publiclyAccessible": false,
            "tags": tags,
        }),
        &depends_on,
    )?;
    debug!(instance = %name, engine = %config.engine, "declared database instance");

    let provider = graph.declare(
        ResourceKind::MysqlProvider,
        format!("app-mpdw-mysql-{}", env),
        json!({
            "endpoint": instance.output("endpoint"),
            "username": config.master_username,
            "password": SecretRef(StackSecrets::MASTER_PASSWORD.into()),
        }),
    )?;

    let database = graph.declare_with(
        ResourceKind::MysqlDatabase,
        format!("app-mpdw-{}-{}", HIVE_DATABASE, env),
        json!({
            "name": HIVE_DATABASE,
            "provider": provider.output("urn"),
        }),
        &[&instance, &provider],
    )?;

    let user_name = format!("{}-{}", config.hive_username, env);
    let user = graph.declare_with(
        ResourceKind::MysqlUser,
        &user_name,
        json!({
            "user": config.hive_username,
            "host": "%",
            "plaintextPassword": SecretRef(StackSecrets::HIVE_PASSWORD.into()),
            "provider": provider.output("urn"),
        }),
        &[&instance, &database, &provider],
    )?;

    let grant = graph.declare_with(
        ResourceKind::MysqlGrant,
        &user_name,
        json!({
            "user": user.output("user"),
            "host": "%",
            "database": database.output("name"),
            "privileges": HIVE_PRIVILEGES,
            "provider": provider.output("urn"),
        }),
        &[&user, &instance, &database, &provider],
    )?;

    Ok(DatabaseOutputs {
        subnet_group,
        instance,
        provider,
        database,
        user,
        grant,
        hive_username: config.hive_username.clone(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::VpcConfig;
    use crate::domain::{Environment, Ipv4Cidr};
    use crate::graph::Token;
    use crate::stack::network::configure_vpc;

    fn rds_config() -> RdsConfig {
        RdsConfig {
            engine: "mysql".into(),
            engine_version: "8.0".into(),
            port: 3306,
            master_username: "admin".into(),
            hive_username: "hive".into(),
            iam_database_authentication_enabled: false,
            instance_class: "db.t3.medium".into(),
            allocated_storage: 20,
        }
    }

    fn declare() -> (ResourceGraph, NetworkOutputs, DatabaseOutputs) {
        let ctx = DeploymentContext::new(
            "data-platform",
            Environment::new("dev").unwrap(),
            "us-west-2",
        );
        let mut graph = ResourceGraph::new("data-platform", "dev");
        let vpc = VpcConfig {
            number_of_availability_zones: 2,
            number_of_nat_gateways: 1,
            cidr_block: Ipv4Cidr::new("10.1.0.0/16").unwrap(),
            public_subnet_mask: 20,
            private_subnet_mask: 19,
        };
        let network = configure_vpc(&mut graph, &ctx, &vpc, 3306).unwrap();
        let database = configure_rds(&mut graph, &ctx, &rds_config(), &network).unwrap();
        (graph, network, database)
    }

    #[test]
    fn test_instance_lives_in_private_subnets() {
        let (graph, network, database) = declare();
        let group = graph.node(&database.subnet_group).unwrap();
        assert_eq!(group.name(), "app-mpdw-dbsn-dev");
        assert_eq!(
            group.properties["subnetIds"],
            serde_json::to_value(network.private_subnet_ids()).unwrap()
        );

        let instance = graph.node(&database.instance).unwrap();
        assert_eq!(instance.properties["identifier"], "appmpdwrdsdev");
        assert!(instance
            .dependencies()
            .contains(network.security_groups[&GroupPurpose::Rds].key()));
    }

    #[test]
    fn test_passwords_are_secret_references() {
        let (graph, _, database) = declare();
        let user = graph.node(&database.user).unwrap();
        assert_eq!(
            crate::graph::reference::tokens_in(&user.properties["plaintextPassword"]),
            vec![Token::Secret("hivePassword".into())]
        );
    }

    #[test]
    fn test_grant_follows_user_and_database() {
        let (graph, _, database) = declare();
        let order: Vec<_> = graph
            .topological_order()
            .unwrap()
            .into_iter()
            .map(|n| n.key.clone())
            .collect();
        let position = |r: &ResourceRef| order.iter().position(|k| k == r.key()).unwrap();
        assert!(position(&database.instance) < position(&database.provider));
        assert!(position(&database.database) < position(&database.user));
        assert!(position(&database.user) < position(&database.grant));

        let grant = graph.node(&database.grant).unwrap();
        assert_eq!(
            grant.properties["privileges"],
            json!(["select", "insert", "update", "delete"])
        );
    }
}
