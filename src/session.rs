//! An authenticated, bound directory connection.

use std::{collections::HashSet, sync::Arc, time::Duration};

use ldap3::SearchEntry;
use tracing::{debug, warn};

use crate::{
	config::{GroupSearchConfig, SearchScope},
	dn,
	error::Error,
	pool::LdapConn,
};

/// One authenticated connection, produced by the session factory on a
/// successful bind.
///
/// A session belongs to a single authentication call and must not be
/// shared between callers. It must be released with [`LdapSession::close`]
/// when done; dropping it without closing still tears down the connection
/// driver, but skips the protocol-level unbind.
pub struct LdapSession {
	/// The live connection, taken on close.
	conn: Option<LdapConn>,
	/// The DN this session is bound as.
	bound_dn: String,
	/// Group search settings.
	group_search: Arc<GroupSearchConfig>,
	/// Read timeout applied to each search operation.
	read_timeout: Duration,
}

impl std::fmt::Debug for LdapSession {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("LdapSession")
			.field("bound_dn", &self.bound_dn)
			.field("closed", &self.conn.is_none())
			.finish()
	}
}

impl LdapSession {
	/// Wrap a connection that has been bound as `bound_dn`.
	pub(crate) fn new(
		conn: LdapConn,
		bound_dn: String,
		group_search: Arc<GroupSearchConfig>,
		read_timeout: Duration,
	) -> Self {
		LdapSession { conn: Some(conn), bound_dn, group_search, read_timeout }
	}

	/// The DN this session is bound as.
	#[must_use]
	pub fn bound_dn(&self) -> &str {
		&self.bound_dn
	}

	/// Resolve the groups the bound user belongs to.
	///
	/// Searches under the configured group base with the configured scope.
	/// The filter's `{0}` placeholder is substituted with the bound DN, or
	/// with the configured user attribute's value read from the user's own
	/// entry. The result is deduplicated by group DN with order preserved.
	/// Zero groups is a valid empty result, not an error. A user whose
	/// entry does not carry the configured user attribute has no value to
	/// match groups against and resolves to zero groups.
	pub async fn groups(&mut self) -> Result<Vec<String>, Error> {
		let value = match self.group_search.user_attribute.clone() {
			Some(attribute) => match self.user_attribute_value(&attribute).await? {
				Some(value) => value,
				None => {
					debug!("{} carries no {attribute} attribute, no groups", self.bound_dn);
					return Ok(Vec::new());
				}
			},
			None => self.bound_dn.clone(),
		};
		let filter = dn::render_filter(self.group_search.filter(), &value);
		let base = self.group_search.base_dn.clone();
		let scope = self.group_search.scope;
		let timeout = self.read_timeout;
		debug!("searching for groups under {base:?} with filter {filter}");

		let conn = self.conn_mut()?;
		let (entries, _result) = conn
			.ldap
			.with_timeout(timeout)
			.search(&base, scope.into(), &filter, vec!["cn"])
			.await
			.map_err(Error::from_operation)?
			.success()
			.map_err(Error::from_operation)?;

		let mut seen = HashSet::new();
		let mut groups = Vec::new();
		for entry in entries.into_iter().map(SearchEntry::construct) {
			if seen.insert(entry.dn.clone()) {
				groups.push(entry.dn);
			}
		}
		Ok(groups)
	}

	/// Read the configured attribute from the bound user's own entry, for
	/// POSIX-style membership filters that match an attribute value rather
	/// than the DN. `None` when the entry does not carry the attribute.
	async fn user_attribute_value(&mut self, attribute: &str) -> Result<Option<String>, Error> {
		let base = self.bound_dn.clone();
		let timeout = self.read_timeout;
		let conn = self.conn_mut()?;
		let (entries, _result) = conn
			.ldap
			.with_timeout(timeout)
			.search(&base, SearchScope::Base.into(), "(objectClass=*)", vec![attribute])
			.await
			.map_err(Error::from_operation)?
			.success()
			.map_err(Error::from_operation)?;

		Ok(entries
			.into_iter()
			.map(SearchEntry::construct)
			.find_map(|entry| entry.attrs.get(attribute)?.first().cloned()))
	}

	/// Release the connection. Idempotent; closing an already closed
	/// session, or one whose last operation failed, is a no-op.
	pub async fn close(&mut self) {
		if let Some(mut conn) = self.conn.take() {
			if let Err(err) = conn.ldap.unbind().await {
				warn!("unbind for {} failed: {err}", self.bound_dn);
			}
			conn.driver.abort();
		}
	}

	/// Access the connection, failing if the session was already closed.
	fn conn_mut(&mut self) -> Result<&mut LdapConn, Error> {
		self.conn
			.as_mut()
			.ok_or_else(|| Error::Configuration("session already closed".to_owned()))
	}
}

impl Drop for LdapSession {
	fn drop(&mut self) {
		// The unbind needs an await and cannot happen here, but the driver
		// task must not outlive the session.
		if let Some(conn) = self.conn.take() {
			conn.driver.abort();
		}
	}
}
