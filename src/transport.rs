//! The secure transport boundary.
//!
//! The realm consumes TLS trust material as an opaque capability: anything
//! that can produce a [`native_tls::TlsConnector`] can back the realm's
//! connections. [`PemTransport`] is the default provider and reads PEM
//! files once, at construction, so no certificate parsing happens on the
//! authentication path.

use std::fmt;

use native_tls::{Certificate, Identity, TlsConnector};

use crate::{config::SslConfig, error::Error};

/// Provider of TLS contexts for outbound directory connections.
///
/// `connector` is called once per connection attempt and must return a
/// fresh [`TlsConnector`]. A context that has already established a
/// verified session to a host could allow a resumed session to skip
/// hostname verification, so contexts are never reused across
/// verification-sensitive sessions.
pub trait SecureTransport: Send + Sync {
	/// Build a TLS connector for one connection attempt.
	fn connector(&self) -> Result<TlsConnector, Error>;

	/// Whether the server certificate must match the connected host.
	fn hostname_verification(&self) -> bool;
}

impl fmt::Debug for dyn SecureTransport {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("SecureTransport")
			.field("hostname_verification", &self.hostname_verification())
			.finish()
	}
}

/// [`SecureTransport`] backed by PEM files on disk.
pub struct PemTransport {
	/// Root certificate to trust, if one was configured.
	root_certificate: Option<Certificate>,
	/// Client identity to present, if one was configured.
	identity: Option<Identity>,
	/// Whether to verify the server certificate against the host.
	hostname_verification: bool,
}

impl fmt::Debug for PemTransport {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("PemTransport")
			.field("root_certificate", &self.root_certificate.is_some())
			.field("identity", &self.identity.is_some())
			.field("hostname_verification", &self.hostname_verification)
			.finish()
	}
}

impl PemTransport {
	/// Load trust material from the paths in the given configuration.
	/// A client certificate and key must either both be present or both be
	/// absent.
	pub fn load(config: &SslConfig) -> Result<Self, Error> {
		let root_certificate = match &config.truststore {
			Some(path) => {
				let pem = std::fs::read(path)
					.map_err(|err| Error::Configuration(format!("could not read truststore {}: {err}", path.display())))?;
				Some(Certificate::from_pem(&pem).map_err(|_| {
					Error::Configuration(format!("could not parse root certificate {}", path.display()))
				})?)
			}
			None => None,
		};

		let identity = match (&config.client_certificate, &config.client_key) {
			(Some(cert_path), Some(key_path)) => {
				let cert = std::fs::read(cert_path)
					.map_err(|err| Error::Configuration(format!("could not read client certificate: {err}")))?;
				let key = std::fs::read(key_path)
					.map_err(|err| Error::Configuration(format!("could not read client key: {err}")))?;
				Some(Identity::from_pkcs8(&cert, &key).map_err(|_| {
					Error::Configuration("could not parse client certificate and key as PKCS8".to_owned())
				})?)
			}
			(None, None) => None,
			_ => {
				return Err(Error::Configuration(
					"both a client certificate and key file in PKCS8 format must be specified".to_owned(),
				))
			}
		};

		Ok(PemTransport {
			root_certificate,
			identity,
			hostname_verification: config.hostname_verification,
		})
	}
}

impl SecureTransport for PemTransport {
	fn connector(&self) -> Result<TlsConnector, Error> {
		let mut builder = TlsConnector::builder();
		if let Some(root) = &self.root_certificate {
			builder.add_root_certificate(root.clone());
		}
		if let Some(identity) = &self.identity {
			builder.identity(identity.clone());
		}
		builder.danger_accept_invalid_hostnames(!self.hostname_verification);
		builder
			.build()
			.map_err(|err| Error::Configuration(format!("could not build TLS connector: {err}")))
	}

	fn hostname_verification(&self) -> bool {
		self.hostname_verification
	}
}
