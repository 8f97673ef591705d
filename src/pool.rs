//! Server selection and connection establishment.
//!
//! One pool instance belongs to one realm. The pool owns the server list,
//! the selection strategy and the rotation counter for round-robin; every
//! `connect` call walks the candidate servers in strategy order and
//! returns the first live connection.

use std::sync::{
	atomic::{AtomicUsize, Ordering},
	Arc,
};

use ldap3::{LdapConnAsync, LdapConnSettings};
use tracing::{debug, warn};
use url::Url;

use crate::{
	config::{ConnectionConfig, LoadBalance, ServerEndpoint},
	error::Error,
	transport::SecureTransport,
};

/// A live, not yet bound connection to one directory server.
pub struct LdapConn {
	/// Protocol handle for issuing operations.
	pub ldap: ldap3::Ldap,
	/// Task driving connection I/O. Aborted when the session is dropped.
	pub driver: tokio::task::JoinHandle<()>,
	/// The server this connection went to.
	pub endpoint: ServerEndpoint,
}

impl std::fmt::Debug for LdapConn {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("LdapConn").field("endpoint", &self.endpoint).finish()
	}
}

/// Selects a server per connection using the configured strategy and opens
/// TLS connections to it.
pub struct ServerPool {
	/// Directory servers in configured priority order.
	servers: Vec<ServerEndpoint>,
	/// Selection strategy.
	strategy: LoadBalance,
	/// Connect and read timeouts.
	timeouts: ConnectionConfig,
	/// TLS provider; plain `ldap://` when absent.
	transport: Option<Arc<dyn SecureTransport>>,
	/// Rotation start index for round-robin. Advances monotonically and is
	/// reduced modulo the server count at selection time.
	rotation: AtomicUsize,
}

impl std::fmt::Debug for ServerPool {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("ServerPool")
			.field("servers", &self.servers)
			.field("strategy", &self.strategy)
			.finish()
	}
}

impl ServerPool {
	/// Create a pool over the given servers. The server list must be
	/// non-empty; [`crate::config::RealmConfig::validate`] enforces this
	/// before a pool is built.
	#[must_use]
	pub fn new(
		servers: Vec<ServerEndpoint>,
		strategy: LoadBalance,
		timeouts: ConnectionConfig,
		transport: Option<Arc<dyn SecureTransport>>,
	) -> Self {
		ServerPool { servers, strategy, timeouts, transport, rotation: AtomicUsize::new(0) }
	}

	/// The order in which servers are tried for one connection attempt.
	fn candidate_order(&self) -> Vec<usize> {
		let n = self.servers.len();
		match self.strategy {
			LoadBalance::Failover => (0..n).collect(),
			LoadBalance::RoundRobin => {
				let start = self.rotation.fetch_add(1, Ordering::Relaxed) % n;
				(0..n).map(|i| (start + i) % n).collect()
			}
		}
	}

	/// Open a connection to the first reachable server in strategy order.
	///
	/// Per-server failures are logged and the next candidate is tried; the
	/// last failure surfaces in [`Error::AllServersUnreachable`] once all
	/// candidates are exhausted. A hostname verification failure aborts
	/// the walk immediately: falling over to another server would not make
	/// a mismatched certificate any more trustworthy.
	pub async fn connect(&self) -> Result<LdapConn, Error> {
		let mut last_error = None;
		let order = self.candidate_order();
		let attempts = order.len();

		for index in order {
			let endpoint = &self.servers[index];
			match self.connect_one(endpoint).await {
				Ok(conn) => return Ok(conn),
				Err(err @ Error::HostnameVerificationFailed { .. }) => return Err(err),
				Err(err) => {
					warn!("connection to {endpoint} failed: {err}");
					last_error = Some(err);
				}
			}
		}

		Err(Error::AllServersUnreachable {
			attempts,
			last: Box::new(last_error.unwrap_or_else(|| {
				Error::Configuration("no servers configured".to_owned())
			})),
		})
	}

	/// Open and drive a connection to a single server.
	async fn connect_one(&self, endpoint: &ServerEndpoint) -> Result<LdapConn, Error> {
		let mut settings = LdapConnSettings::new().set_conn_timeout(self.timeouts.tcp_connect_timeout);
		if let Some(transport) = &self.transport {
			// A fresh connector per attempt: verification state must not
			// carry over from a previously verified session.
			settings = settings.set_connector(transport.connector()?);
		}

		let url = Url::parse(&endpoint.url(self.transport.is_some()))
			.map_err(|err| Error::Configuration(format!("invalid server address {endpoint}: {err}")))?;

		debug!("connecting to {url}");
		let (conn, ldap) = match LdapConnAsync::from_url_with_settings(settings, &url).await {
			Ok(pair) => pair,
			Err(err) => return Err(self.classify_connect_error(endpoint, err)),
		};

		let driver = tokio::spawn(async move {
			if let Err(err) = conn.drive().await {
				warn!("LDAP connection error: {err}");
			}
		});

		Ok(LdapConn { ldap, driver, endpoint: endpoint.clone() })
	}

	/// Map a connection establishment error onto the realm taxonomy.
	fn classify_connect_error(&self, endpoint: &ServerEndpoint, err: ldap3::LdapError) -> Error {
		let verifying = self.transport.as_ref().is_some_and(|t| t.hostname_verification());
		if verifying && Error::is_certificate_mismatch(&err) {
			return Error::HostnameVerificationFailed { endpoint: endpoint.clone() };
		}
		Error::from_operation(err)
	}

	/// The servers this pool selects from.
	#[must_use]
	pub fn servers(&self) -> &[ServerEndpoint] {
		&self.servers
	}
}
