//! Error taxonomy for realm operations.
//!
//! Callers need to tell "could not reach the directory" apart from "bad
//! password" for correct lockout and audit behavior, so authentication
//! failures are never masked behind generic connection errors.

use crate::config::ServerEndpoint;

/// Errors that can occur while authenticating against the directory.
#[derive(thiserror::Error, Debug)]
pub enum Error {
	/// None of the configured servers could be reached. Per-server causes
	/// are logged as they occur; the last one is carried here.
	#[error("failed to connect to any LDAP servers ({attempts} attempted): {last}")]
	AllServersUnreachable {
		/// How many connection attempts were made.
		attempts: usize,
		/// The error from the last server tried.
		last: Box<Error>,
	},
	/// A connect or read exceeded its configured bound. Distinct from a
	/// connection refusal.
	#[error("a client-side timeout was encountered while waiting for the server")]
	ClientTimeout,
	/// The server certificate does not match the connected host. Fatal,
	/// never retried, never downgraded to an unverified connection.
	#[error("hostname verification failed for {endpoint}")]
	HostnameVerificationFailed {
		/// The endpoint whose certificate failed verification.
		endpoint: ServerEndpoint,
	},
	/// The bind was rejected: wrong credentials, or the rendered DN does
	/// not name an entry.
	#[error("authentication failed")]
	AuthenticationFailed,
	/// A user search matched no entry.
	#[error("no user entry found for {username:?}")]
	UserNotFound {
		/// The username that was searched for.
		username: String,
	},
	/// A user search matched more than one entry. An ambiguous match is an
	/// error, not a first-match pick.
	#[error("user search for {username:?} matched {count} entries")]
	AmbiguousUser {
		/// The username that was searched for.
		username: String,
		/// How many entries matched.
		count: usize,
	},
	/// The realm configuration is incomplete or contradictory.
	#[error("invalid realm configuration: {0}")]
	Configuration(String),
	/// Any other underlying protocol or I/O error.
	#[error(transparent)]
	Ldap(#[from] ldap3::LdapError),
}

impl Error {
	/// Classify an [`ldap3::LdapError`] raised by a bind or search
	/// operation.
	pub(crate) fn from_operation(err: ldap3::LdapError) -> Self {
		match err {
			ldap3::LdapError::Timeout { .. } => Error::ClientTimeout,
			other => Error::Ldap(other),
		}
	}

	/// Whether this error, raised during connection establishment, is a
	/// certificate identity mismatch. `ldap3` surfaces the TLS handshake
	/// failure through its transport layer, so this goes by the error text
	/// of the underlying native-tls cause. Only identity indicators count:
	/// trust failures such as an untrusted or expired chain are ordinary
	/// connection errors and must fall through to the next server.
	pub(crate) fn is_certificate_mismatch(err: &ldap3::LdapError) -> bool {
		let text = err.to_string().to_lowercase();
		text.contains("hostname mismatch")
			|| text.contains("notvalidforname")
			|| text.contains("name does not match")
	}
}
