//! An LDAP-backed authentication realm.
//!
//! The realm binds a user's credentials against one or more directory
//! servers over TLS, resolves the user's group memberships, and maps those
//! groups to authorization roles. Two bind topologies are supported:
//! *template-bind*, where the user's DN is rendered from a configured
//! pattern, and *search-then-bind*, where a system account locates the
//! user's entry first. Multiple servers are balanced with failover or
//! round-robin selection.
//!
//! For a general primer on LDAP, the [introduction] in the `ldap3` crate
//! which is used here for the protocol is an excellent resource.
//!
//! [introduction]: https://github.com/inejge/ldap3/blob/master/LDAP-primer.md
//!
//! # Getting started
//! ```no_run
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! use std::sync::Arc;
//!
//! use ldap_realm::{
//!     config::{GroupSearchConfig, RealmConfig, SearchScope, ServerEndpoint, SslConfig},
//!     realm::{LdapRealm, StaticRoleMapper},
//!     factory::SessionFactory,
//!     transport::{PemTransport, SecureTransport},
//! };
//!
//! // Configuration can also be deserialized with serde. It's
//! // hand-constructed here for demonstration purposes.
//! let config = RealmConfig {
//!     name: "corporate".to_owned(),
//!     servers: vec![ServerEndpoint::new("ldap1.example.org", 636),
//!                   ServerEndpoint::new("ldap2.example.org", 636)],
//!     user_dn_template: Some("uid={0},ou=people,dc=example,dc=org".to_owned()),
//!     user_search: None,
//!     group_search: GroupSearchConfig {
//!         base_dn: "ou=groups,dc=example,dc=org".to_owned(),
//!         scope: SearchScope::Subtree,
//!         filter: None,
//!         user_attribute: None,
//!     },
//!     load_balance: Default::default(),
//!     connection: Default::default(),
//!     ssl: Some(SslConfig::default()),
//! };
//!
//! let transport: Arc<dyn SecureTransport> =
//!     Arc::new(PemTransport::load(config.ssl.as_ref().unwrap())?);
//! let factory = SessionFactory::new(&config, Some(transport))?;
//! let mapper = Arc::new(StaticRoleMapper::new([(
//!     "cn=admins,ou=groups,dc=example,dc=org".to_owned(),
//!     vec!["superuser".to_owned()],
//! )]));
//! let realm = LdapRealm::new(Arc::new(config), factory, mapper);
//!
//! let principal = realm.authenticate("jdoe", "letmein").await?;
//! println!("{} has roles {:?}", principal.username, principal.roles);
//! # Ok(())
//! # }
//! ```
//!
//! # Limitations
//! * Plaintext `ldap://` connections are supported for local test
//!   directories only; production deployments should always configure
//!   `ssl`.
//! * [secrecy](https://docs.rs/secrecy) is not used for storing the search
//!   account password, it probably should be.
//! * Retry policy after timeouts or rejected binds belongs to the caller;
//!   the realm never retries on its own.

pub mod config;
pub mod dn;
pub mod error;
pub mod factory;
pub mod pool;
pub mod realm;
pub mod session;
pub mod transport;

pub use ldap3::{self, SearchEntry};

pub use crate::{
	config::{LoadBalance, RealmConfig, SearchScope, ServerEndpoint},
	error::Error,
	factory::SessionFactory,
	realm::{LdapRealm, Principal, RoleMapper, StaticRoleMapper, UsageStats},
	session::LdapSession,
	transport::{PemTransport, SecureTransport},
};
