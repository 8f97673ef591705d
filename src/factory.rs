//! Producing bound sessions from credentials.
//!
//! Two connection strategies exist: template-bind renders the user's DN
//! from a configured pattern and binds directly; search-then-bind first
//! binds as a system account (or anonymously), locates the user's entry by
//! search, and rebinds as it. The strategy is chosen once, from the
//! configuration, when the factory is built.

use std::{sync::Arc, time::Duration};

use ldap3::{LdapResult, SearchEntry};
use tracing::debug;

use crate::{
	config::{GroupSearchConfig, RealmConfig, SearchScope, UserSearchConfig},
	dn::{self, DnTemplate},
	error::Error,
	pool::{LdapConn, ServerPool},
	session::LdapSession,
	transport::SecureTransport,
};

/// How a user's DN is established before binding with their secret.
enum BindStrategy {
	/// Render the DN from a template and bind directly as the user.
	Template(DnTemplate),
	/// Bind as a system account, search for the user's entry, rebind.
	Search(UserSearchConfig),
}

/// Produces an [`LdapSession`] per authentication attempt.
pub struct SessionFactory {
	/// Server pool shared by all sessions of this realm.
	pool: ServerPool,
	/// The configured bind strategy.
	strategy: BindStrategy,
	/// Group search settings handed to each session.
	group_search: Arc<GroupSearchConfig>,
	/// Read timeout for bind and search operations.
	read_timeout: Duration,
}

impl std::fmt::Debug for SessionFactory {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("SessionFactory")
			.field("pool", &self.pool)
			.field("user_search", &matches!(self.strategy, BindStrategy::Search(_)))
			.finish()
	}
}

impl SessionFactory {
	/// Build a factory from a validated configuration. Search-then-bind is
	/// selected whenever `user_search` is configured; an empty search base
	/// is permitted and means "search from the directory root".
	pub fn new(
		config: &RealmConfig,
		transport: Option<Arc<dyn SecureTransport>>,
	) -> Result<Self, Error> {
		config.validate()?;
		if config.tls_enabled() && transport.is_none() {
			return Err(Error::Configuration(
				"ssl is configured but no secure transport was provided".to_owned(),
			));
		}

		let strategy = match (&config.user_search, &config.user_dn_template) {
			(Some(search), _) => BindStrategy::Search(search.clone()),
			(None, Some(template)) => BindStrategy::Template(DnTemplate::new(template)?),
			(None, None) => unreachable!("validate() checked a bind mode exists"),
		};

		let pool = ServerPool::new(
			config.servers.clone(),
			config.load_balance,
			config.connection.clone(),
			transport,
		);

		Ok(SessionFactory {
			pool,
			strategy,
			group_search: Arc::new(config.group_search.clone()),
			read_timeout: config.connection.tcp_read_timeout,
		})
	}

	/// Authenticate `username` with `secret` and return a bound session.
	///
	/// The connection is torn down on every failure path; a session only
	/// exists after a successful bind as the user.
	pub async fn session(&self, username: &str, secret: &str) -> Result<LdapSession, Error> {
		let mut conn = self.pool.connect().await?;

		let bound_dn = match &self.strategy {
			BindStrategy::Template(template) => {
				let user_dn = template.render(username);
				match self.bind(&mut conn, &user_dn, secret).await {
					Ok(()) => user_dn,
					Err(err) => {
						release(conn).await;
						return Err(err);
					}
				}
			}
			BindStrategy::Search(search) => {
				match self.search_and_bind(&mut conn, search, username, secret).await {
					Ok(dn) => dn,
					Err(err) => {
						release(conn).await;
						return Err(err);
					}
				}
			}
		};

		debug!("bound as {bound_dn}");
		Ok(LdapSession::new(conn, bound_dn, Arc::clone(&self.group_search), self.read_timeout))
	}

	/// Simple bind under the read timeout, classifying rejections.
	async fn bind(&self, conn: &mut LdapConn, bind_dn: &str, secret: &str) -> Result<(), Error> {
		let result = conn
			.ldap
			.with_timeout(self.read_timeout)
			.simple_bind(bind_dn, secret)
			.await
			.map_err(Error::from_operation)?;
		check_bind(result)
	}

	/// The search-then-bind flow: system bind, locate exactly one user
	/// entry, rebind as it with the caller's secret.
	async fn search_and_bind(
		&self,
		conn: &mut LdapConn,
		search: &UserSearchConfig,
		username: &str,
		secret: &str,
	) -> Result<String, Error> {
		let (bind_dn, bind_password) = (
			search.bind_dn.as_deref().unwrap_or(""),
			search.bind_password.as_deref().unwrap_or(""),
		);
		self.bind(conn, bind_dn, bind_password).await?;

		let filter = format!("({}={})", search.attribute, dn::escape_filter_value(username));
		let (entries, _result) = conn
			.ldap
			.with_timeout(self.read_timeout)
			.search(&search.base_dn, SearchScope::Subtree.into(), &filter, vec!["1.1"])
			.await
			.map_err(Error::from_operation)?
			.success()
			.map_err(Error::from_operation)?;

		let mut dns: Vec<String> =
			entries.into_iter().map(|entry| SearchEntry::construct(entry).dn).collect();
		let user_dn = match dns.len() {
			0 => return Err(Error::UserNotFound { username: username.to_owned() }),
			1 => dns.remove(0),
			count => return Err(Error::AmbiguousUser { username: username.to_owned(), count }),
		};

		self.bind(conn, &user_dn, secret).await?;
		Ok(user_dn)
	}

	/// The pool backing this factory.
	#[must_use]
	pub fn pool(&self) -> &ServerPool {
		&self.pool
	}
}

/// LDAP resultCode 49, invalidCredentials.
const RC_INVALID_CREDENTIALS: u32 = 49;

/// Classify the outcome of a simple bind. A rejected bind is an
/// authentication failure, never a generic protocol error.
fn check_bind(result: LdapResult) -> Result<(), Error> {
	match result.rc {
		0 => Ok(()),
		RC_INVALID_CREDENTIALS => Err(Error::AuthenticationFailed),
		_ => result.success().map(|_| ()).map_err(Error::Ldap),
	}
}

/// Tear down a connection whose bind did not complete.
async fn release(mut conn: LdapConn) {
	let _ = conn.ldap.unbind().await;
	conn.driver.abort();
}
