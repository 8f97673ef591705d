#![allow(
	clippy::dbg_macro,
	clippy::expect_used,
	clippy::missing_docs_in_private_items,
	clippy::print_stderr,
	clippy::print_stdout,
	clippy::unwrap_used
)]
use std::{error::Error, sync::Arc, time::Duration};

use ldap_realm::{
	config::{
		ConnectionConfig, GroupSearchConfig, LoadBalance, RealmConfig, SearchScope,
		ServerEndpoint, UserSearchConfig,
	},
	realm::StaticRoleMapper,
	Error as RealmError, LdapRealm, SessionFactory,
};
use serial_test::serial;
use tracing_subscriber::{filter::LevelFilter, EnvFilter};

mod common;

use common::{
	ldap_add_group, ldap_add_organizational_unit, ldap_add_posix_group, ldap_add_user,
	ldap_connect, ldap_delete_group, ldap_delete_organizational_unit, ldap_delete_user,
	GROUP_BASE, USER_BASE,
};

const PASSWORD: &str = "NickFuryHeartsES";

fn init_tracing() {
	let tracing_filter = EnvFilter::default().add_directive(LevelFilter::DEBUG.into());
	let _ = tracing_subscriber::fmt().with_env_filter(tracing_filter).try_init();
}

fn test_config() -> RealmConfig {
	RealmConfig {
		name: "oldap-test".to_owned(),
		servers: vec![ServerEndpoint::new("localhost", 1389)],
		user_dn_template: Some(format!("uid={{0}},{USER_BASE}")),
		user_search: None,
		group_search: GroupSearchConfig {
			base_dn: GROUP_BASE.to_owned(),
			scope: SearchScope::OneLevel,
			filter: None,
			user_attribute: None,
		},
		load_balance: LoadBalance::Failover,
		connection: ConnectionConfig::default(),
		ssl: None,
	}
}

fn factory(config: &RealmConfig) -> SessionFactory {
	SessionFactory::new(config, None).unwrap()
}

/// Seed the directory with the Avengers fixture: users with a common
/// password, a DN-membership group and a POSIX group.
async fn seed_directory(ldap: &mut ldap3::Ldap) -> Result<(), Box<dyn Error>> {
	let _ = cleanup_directory(ldap).await;
	ldap_add_organizational_unit(ldap, "users").await?;
	ldap_add_organizational_unit(ldap, "groups").await?;
	for uid in ["blackwidow", "cap", "hawkeye", "hulk", "ironman", "thor", "selvig"] {
		ldap_add_user(ldap, uid, PASSWORD).await?;
	}
	ldap_add_group(ldap, "Avengers", &["blackwidow", "cap", "hawkeye", "hulk", "ironman", "thor"])
		.await?;
	ldap_add_posix_group(ldap, "Geniuses", "16061", &["selvig"]).await?;
	Ok(())
}

async fn cleanup_directory(ldap: &mut ldap3::Ldap) -> Result<(), Box<dyn Error>> {
	let _ = ldap_delete_group(ldap, "Avengers").await;
	let _ = ldap_delete_group(ldap, "Geniuses").await;
	for uid in ["blackwidow", "cap", "hawkeye", "hulk", "ironman", "thor", "selvig"] {
		let _ = ldap_delete_user(ldap, uid).await;
	}
	let _ = ldap_delete_organizational_unit(ldap, "users").await;
	let _ = ldap_delete_organizational_unit(ldap, "groups").await;
	Ok(())
}

#[ignore = "docker"]
#[tokio::test]
#[serial]
async fn template_bind_resolves_avengers() -> Result<(), Box<dyn Error>> {
	init_tracing();
	let mut ldap = ldap_connect().await?;
	seed_directory(&mut ldap).await?;

	let factory = factory(&test_config());
	for user in ["blackwidow", "cap", "hawkeye", "hulk", "ironman", "thor"] {
		let mut session = factory.session(user, PASSWORD).await?;
		let groups = session.groups().await?;
		session.close().await;
		assert!(
			groups.iter().any(|dn| dn.contains("Avengers")),
			"{user} should be in Avengers, got {groups:?}"
		);
	}

	cleanup_directory(&mut ldap).await?;
	ldap.unbind().await?;
	Ok(())
}

#[ignore = "docker"]
#[tokio::test]
#[serial]
async fn base_scope_yields_at_most_one_group() -> Result<(), Box<dyn Error>> {
	let mut ldap = ldap_connect().await?;
	seed_directory(&mut ldap).await?;

	let mut config = test_config();
	config.group_search.base_dn = format!("cn=Avengers,{GROUP_BASE}");
	config.group_search.scope = SearchScope::Base;

	let factory = factory(&config);
	let mut session = factory.session("cap", PASSWORD).await?;
	let groups = session.groups().await?;
	session.close().await;
	assert_eq!(groups.len(), 1);
	assert!(groups[0].contains("Avengers"));

	cleanup_directory(&mut ldap).await?;
	ldap.unbind().await?;
	Ok(())
}

#[ignore = "docker"]
#[tokio::test]
#[serial]
async fn posix_member_uid_filter_resolves_geniuses() -> Result<(), Box<dyn Error>> {
	let mut ldap = ldap_connect().await?;
	seed_directory(&mut ldap).await?;

	let mut config = test_config();
	config.group_search.filter = Some("(&(objectclass=posixGroup)(memberUID={0}))".to_owned());
	config.group_search.user_attribute = Some("uid".to_owned());

	let factory = factory(&config);
	let mut session = factory.session("selvig", PASSWORD).await?;
	let groups = session.groups().await?;
	session.close().await;
	assert!(
		groups.iter().any(|dn| dn.contains("Geniuses")),
		"selvig should be in Geniuses, got {groups:?}"
	);

	cleanup_directory(&mut ldap).await?;
	ldap.unbind().await?;
	Ok(())
}

#[ignore = "docker"]
#[tokio::test]
#[serial]
async fn missing_user_attribute_resolves_no_groups() -> Result<(), Box<dyn Error>> {
	let mut ldap = ldap_connect().await?;
	seed_directory(&mut ldap).await?;

	let mut config = test_config();
	config.group_search.filter = Some("(&(objectclass=posixGroup)(memberUID={0}))".to_owned());
	// The test users carry no employeeNumber; the filter has nothing to
	// match against, so no groups may resolve. In particular the filter
	// must not silently fall back to matching the username.
	config.group_search.user_attribute = Some("employeeNumber".to_owned());

	let factory = factory(&config);
	let mut session = factory.session("selvig", PASSWORD).await?;
	let groups = session.groups().await?;
	session.close().await;
	assert!(groups.is_empty(), "got {groups:?}");

	cleanup_directory(&mut ldap).await?;
	ldap.unbind().await?;
	Ok(())
}

#[ignore = "docker"]
#[tokio::test]
#[serial]
async fn search_then_bind_locates_the_user() -> Result<(), Box<dyn Error>> {
	let mut ldap = ldap_connect().await?;
	seed_directory(&mut ldap).await?;

	let mut config = test_config();
	config.user_dn_template = None;
	config.user_search = Some(UserSearchConfig {
		base_dn: USER_BASE.to_owned(),
		attribute: "uid".to_owned(),
		bind_dn: Some("cn=admin,dc=example,dc=org".to_owned()),
		bind_password: Some("adminpassword".to_owned()),
	});

	let factory = factory(&config);
	let mut session = factory.session("hulk", PASSWORD).await?;
	assert_eq!(session.bound_dn(), format!("uid=hulk,{USER_BASE}"));
	let groups = session.groups().await?;
	session.close().await;
	assert!(groups.iter().any(|dn| dn.contains("Avengers")));

	let missing = factory.session("ultron", PASSWORD).await;
	assert!(matches!(missing, Err(RealmError::UserNotFound { .. })), "got {missing:?}");

	cleanup_directory(&mut ldap).await?;
	ldap.unbind().await?;
	Ok(())
}

#[ignore = "docker"]
#[tokio::test]
#[serial]
async fn wrong_password_is_an_authentication_failure() -> Result<(), Box<dyn Error>> {
	let mut ldap = ldap_connect().await?;
	seed_directory(&mut ldap).await?;

	let factory = factory(&test_config());
	let result = factory.session("thor", "not-the-password").await;
	assert!(matches!(result, Err(RealmError::AuthenticationFailed)), "got {result:?}");

	cleanup_directory(&mut ldap).await?;
	ldap.unbind().await?;
	Ok(())
}

#[ignore = "docker"]
#[tokio::test]
#[serial]
async fn failover_skips_unreachable_servers() -> Result<(), Box<dyn Error>> {
	let mut ldap = ldap_connect().await?;
	seed_directory(&mut ldap).await?;

	let mut config = test_config();
	// First two servers are dead; the realm must reach the third.
	config.servers = vec![
		ServerEndpoint::new("localhost", 1111),
		ServerEndpoint::new("localhost", 2222),
		ServerEndpoint::new("localhost", 1389),
	];
	config.connection.tcp_connect_timeout = Duration::from_millis(500);

	let factory = factory(&config);
	let mut session = factory.session("ironman", PASSWORD).await?;
	let groups = session.groups().await?;
	session.close().await;
	assert!(groups.iter().any(|dn| dn.contains("Avengers")));

	cleanup_directory(&mut ldap).await?;
	ldap.unbind().await?;
	Ok(())
}

#[ignore = "docker"]
#[tokio::test]
#[serial]
async fn tight_read_timeout_is_a_client_timeout() -> Result<(), Box<dyn Error>> {
	let mut ldap = ldap_connect().await?;
	seed_directory(&mut ldap).await?;

	let mut config = test_config();
	config.connection.tcp_read_timeout = Duration::from_nanos(1);

	let factory = factory(&config);
	// The bind or the group search must trip the timeout; neither may be
	// reported as bad credentials.
	let result = match factory.session("thor", PASSWORD).await {
		Ok(mut session) => {
			let groups = session.groups().await;
			session.close().await;
			groups.map(|_| ())
		}
		Err(err) => Err(err),
	};
	assert!(matches!(result, Err(RealmError::ClientTimeout)), "got {result:?}");

	cleanup_directory(&mut ldap).await?;
	ldap.unbind().await?;
	Ok(())
}

#[ignore = "docker"]
#[tokio::test]
#[serial]
async fn closing_a_session_twice_is_a_noop() -> Result<(), Box<dyn Error>> {
	let mut ldap = ldap_connect().await?;
	seed_directory(&mut ldap).await?;

	let factory = factory(&test_config());
	let mut session = factory.session("cap", PASSWORD).await?;
	session.close().await;
	session.close().await;

	cleanup_directory(&mut ldap).await?;
	ldap.unbind().await?;
	Ok(())
}

#[ignore = "docker"]
#[tokio::test]
#[serial]
async fn realm_maps_groups_to_roles() -> Result<(), Box<dyn Error>> {
	let mut ldap = ldap_connect().await?;
	seed_directory(&mut ldap).await?;

	let config = test_config();
	let factory = factory(&config);
	let mapper = Arc::new(StaticRoleMapper::new([(
		format!("cn=Avengers,{GROUP_BASE}"),
		vec!["avenger".to_owned()],
	)]));
	let realm = LdapRealm::new(Arc::new(config), factory, mapper);

	let principal = realm.authenticate("cap", PASSWORD).await?;
	assert_eq!(principal.username, "cap");
	assert!(principal.roles.contains("avenger"));

	// selvig is in no mapped group: authenticated, zero roles.
	let principal = realm.authenticate("selvig", PASSWORD).await?;
	assert!(principal.roles.is_empty());

	cleanup_directory(&mut ldap).await?;
	ldap.unbind().await?;
	Ok(())
}
