//! The realm: authentication orchestration and usage statistics.

use std::{collections::BTreeSet, sync::Arc};

use serde::Serialize;
use tracing::{debug, instrument, warn};

use crate::{config::RealmConfig, error::Error, factory::SessionFactory};

/// Maps resolved group identifiers to authorization roles.
///
/// This is an external boundary: the realm hands over the realm name and
/// the group DNs and receives role names back. Implementations must not
/// fail authentication; a user with no mapping simply authenticates with
/// zero roles.
pub trait RoleMapper: Send + Sync {
	/// Resolve role names for the given groups.
	fn resolve_roles(&self, realm: &str, groups: &[String]) -> BTreeSet<String>;
}

/// [`RoleMapper`] over a fixed in-memory table from group DN to roles.
/// Suitable for tests and small static deployments.
#[derive(Debug, Default)]
pub struct StaticRoleMapper {
	/// Group DN to role names.
	mappings: std::collections::HashMap<String, Vec<String>>,
}

impl StaticRoleMapper {
	/// Build a mapper from `(group DN, roles)` pairs.
	#[must_use]
	pub fn new(mappings: impl IntoIterator<Item = (String, Vec<String>)>) -> Self {
		StaticRoleMapper { mappings: mappings.into_iter().collect() }
	}
}

impl RoleMapper for StaticRoleMapper {
	fn resolve_roles(&self, _realm: &str, groups: &[String]) -> BTreeSet<String> {
		groups
			.iter()
			.filter_map(|group| self.mappings.get(group))
			.flatten()
			.cloned()
			.collect()
	}
}

/// An authenticated user with resolved roles.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Principal {
	/// The username as presented by the caller.
	pub username: String,
	/// Role names resolved from the user's groups.
	pub roles: BTreeSet<String>,
}

/// Diagnostic snapshot of a realm's configuration. Pure function of the
/// configuration; computing it performs no I/O.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct UsageStats {
	/// Bucketed server count descriptor.
	pub size: &'static str,
	/// Whether TLS material is configured.
	pub ssl: bool,
	/// Whether search-then-bind mode is active.
	pub user_search: bool,
	/// Name of the configured server selection strategy.
	pub load_balance_type: &'static str,
}

/// An LDAP-backed authentication realm.
pub struct LdapRealm {
	/// The realm configuration, shared with nothing else.
	config: Arc<RealmConfig>,
	/// Produces one bound session per authentication.
	factory: SessionFactory,
	/// Translates groups into roles.
	role_mapper: Arc<dyn RoleMapper>,
}

impl std::fmt::Debug for LdapRealm {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("LdapRealm")
			.field("name", &self.config.name)
			.field("factory", &self.factory)
			.finish()
	}
}

impl LdapRealm {
	/// Create a realm from a validated configuration, a session factory
	/// built for it, and a role mapper.
	#[must_use]
	pub fn new(
		config: Arc<RealmConfig>,
		factory: SessionFactory,
		role_mapper: Arc<dyn RoleMapper>,
	) -> Self {
		LdapRealm { config, factory, role_mapper }
	}

	/// The realm name.
	#[must_use]
	pub fn name(&self) -> &str {
		&self.config.name
	}

	/// Authenticate a user and resolve their roles.
	///
	/// Binds via the session factory, resolves groups on the session, and
	/// maps them to roles. The session is released on every exit path,
	/// including group resolution failures.
	#[instrument(skip(self, secret), fields(realm = %self.config.name))]
	pub async fn authenticate(&self, username: &str, secret: &str) -> Result<Principal, Error> {
		let mut session = self.factory.session(username, secret).await?;
		let groups = session.groups().await;
		session.close().await;
		let groups = groups?;
		debug!("resolved {} groups for {username}", groups.len());

		let roles = self.role_mapper.resolve_roles(&self.config.name, &groups);
		if roles.is_empty() && !groups.is_empty() {
			warn!("no roles mapped for {username} from {} groups", groups.len());
		}
		Ok(Principal { username: username.to_owned(), roles })
	}

	/// Snapshot diagnostic statistics about this realm's configuration.
	#[must_use]
	pub fn usage_stats(&self) -> UsageStats {
		UsageStats {
			size: server_count_bucket(self.config.servers.len()),
			ssl: self.config.tls_enabled(),
			user_search: self.config.user_search.is_some(),
			load_balance_type: self.config.load_balance.as_str(),
		}
	}
}

/// Descriptive bucket for the number of configured servers.
fn server_count_bucket(count: usize) -> &'static str {
	match count {
		0..=3 => "tiny",
		4..=10 => "small",
		_ => "large",
	}
}
