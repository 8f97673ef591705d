//! Realm configuration.
//!
//! All types here are plain data, deserializable with serde, and immutable
//! once handed to the realm. Validation happens when the session factory
//! is constructed, not lazily during authentication.

use std::{fmt, path::PathBuf, time::Duration};

use serde::{Deserialize, Serialize};

use crate::error::Error;

/// A single directory server address.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerEndpoint {
	/// Hostname or IP address of the server.
	pub host: String,
	/// Port, conventionally 389 for ldap and 636 for ldaps.
	pub port: u16,
}

impl ServerEndpoint {
	/// Create an endpoint from host and port.
	#[must_use]
	pub fn new(host: impl Into<String>, port: u16) -> Self {
		ServerEndpoint { host: host.into(), port }
	}

	/// Render the endpoint as an LDAP URL, `ldaps` when TLS is in use.
	#[must_use]
	pub fn url(&self, tls: bool) -> String {
		let scheme = if tls { "ldaps" } else { "ldap" };
		format!("{}://{}:{}", scheme, self.host, self.port)
	}
}

impl fmt::Display for ServerEndpoint {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "{}:{}", self.host, self.port)
	}
}

/// Search breadth for user and group searches.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SearchScope {
	/// The base entry only.
	Base,
	/// Direct children of the base entry.
	OneLevel,
	/// The entire subtree under the base entry.
	Subtree,
}

impl From<SearchScope> for ldap3::Scope {
	fn from(scope: SearchScope) -> Self {
		match scope {
			SearchScope::Base => ldap3::Scope::Base,
			SearchScope::OneLevel => ldap3::Scope::OneLevel,
			SearchScope::Subtree => ldap3::Scope::Subtree,
		}
	}
}

/// Server selection strategy for multi-server realms.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LoadBalance {
	/// Try servers strictly in configured order.
	Failover,
	/// Rotate the starting server across successive connections.
	RoundRobin,
}

impl LoadBalance {
	/// The configuration name of the strategy, as reported in usage stats.
	#[must_use]
	pub fn as_str(self) -> &'static str {
		match self {
			LoadBalance::Failover => "failover",
			LoadBalance::RoundRobin => "round_robin",
		}
	}
}

impl Default for LoadBalance {
	fn default() -> Self {
		LoadBalance::Failover
	}
}

/// Timeouts applied to directory I/O.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ConnectionConfig {
	/// Bound on establishing a TCP connection to one server.
	pub tcp_connect_timeout: Duration,
	/// Bound on each bind or search reply once connected.
	pub tcp_read_timeout: Duration,
}

impl Default for ConnectionConfig {
	fn default() -> Self {
		ConnectionConfig {
			tcp_connect_timeout: Duration::from_secs(5),
			tcp_read_timeout: Duration::from_secs(5),
		}
	}
}

/// References to TLS material consumed by the secure transport provider.
/// The realm itself never parses certificate files.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SslConfig {
	/// Path to a PEM file with the root certificates to trust.
	pub truststore: Option<PathBuf>,
	/// Path of the TLS client certificate to present, if any.
	pub client_certificate: Option<PathBuf>,
	/// Path of the TLS client key matching the certificate.
	pub client_key: Option<PathBuf>,
	/// Whether the server certificate must match the connected host.
	/// Defaults to on; turning it off is for test directories only.
	#[serde(default = "default_hostname_verification")]
	pub hostname_verification: bool,
}

impl Default for SslConfig {
	fn default() -> Self {
		SslConfig {
			truststore: None,
			client_certificate: None,
			client_key: None,
			hostname_verification: true,
		}
	}
}

/// Hostname verification is on unless explicitly disabled.
fn default_hostname_verification() -> bool {
	true
}

/// Settings for locating a user's entry by search instead of by template.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct UserSearchConfig {
	/// Base DN to search under. Empty means the directory root.
	pub base_dn: String,
	/// Attribute matched against the username. Defaults to `uid`.
	#[serde(default = "default_user_attribute")]
	pub attribute: String,
	/// DN of the system account used for the initial bind. Anonymous bind
	/// when absent.
	pub bind_dn: Option<String>,
	/// Password of the system account.
	pub bind_password: Option<String>,
}

/// Default attribute for user searches.
fn default_user_attribute() -> String {
	"uid".to_owned()
}

/// Settings for resolving the groups of a bound user.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct GroupSearchConfig {
	/// Base DN of the group search. With [`SearchScope::Base`] this is the
	/// group entry itself.
	pub base_dn: String,
	/// Search breadth. Defaults to the whole subtree.
	#[serde(default = "default_group_scope")]
	pub scope: SearchScope,
	/// Filter with a `{0}` placeholder. When absent, a membership filter
	/// matching both `member` and `uniqueMember` against the user DN is
	/// used.
	pub filter: Option<String>,
	/// When set, `{0}` in the filter is substituted with this attribute's
	/// value from the user's entry instead of the bound DN. This supports
	/// POSIX-style `memberUID` filters and is selected by configuration,
	/// never auto-detected. A user whose entry lacks the attribute
	/// resolves to zero groups.
	pub user_attribute: Option<String>,
}

/// Group searches default to subtree scope.
fn default_group_scope() -> SearchScope {
	SearchScope::Subtree
}

impl GroupSearchConfig {
	/// The effective filter, falling back to DN-based membership.
	#[must_use]
	pub fn filter(&self) -> &str {
		self.filter.as_deref().unwrap_or("(|(uniqueMember={0})(member={0}))")
	}
}

/// Complete configuration of one LDAP realm.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RealmConfig {
	/// Realm name, passed through to the role mapper and used in logs.
	pub name: String,
	/// Directory servers, in priority order. Must be non-empty.
	pub servers: Vec<ServerEndpoint>,
	/// DN template for template-bind mode, e.g.
	/// `uid={0},ou=people,dc=example,dc=org`.
	pub user_dn_template: Option<String>,
	/// User search settings. When present, search-then-bind mode is used
	/// even if a template is also configured.
	pub user_search: Option<UserSearchConfig>,
	/// Group resolution settings.
	pub group_search: GroupSearchConfig,
	/// Server selection strategy.
	#[serde(default)]
	pub load_balance: LoadBalance,
	/// Connect and read timeouts.
	#[serde(default)]
	pub connection: ConnectionConfig,
	/// TLS material. Plain `ldap://` is used when absent, which is meant
	/// for local test directories, not production.
	pub ssl: Option<SslConfig>,
}

impl RealmConfig {
	/// Check the invariants that do not depend on the directory contents.
	pub fn validate(&self) -> Result<(), Error> {
		if self.servers.is_empty() {
			return Err(Error::Configuration("at least one server must be configured".to_owned()));
		}
		if self.user_dn_template.is_none() && self.user_search.is_none() {
			return Err(Error::Configuration(
				"either user_dn_template or user_search must be configured".to_owned(),
			));
		}
		Ok(())
	}

	/// Whether connections use TLS.
	#[must_use]
	pub fn tls_enabled(&self) -> bool {
		self.ssl.is_some()
	}
}
