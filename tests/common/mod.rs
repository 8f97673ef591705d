use std::error::Error;

use ldap3::LdapConnAsync;

pub const BASE_DN: &str = "dc=example,dc=org";
pub const USER_BASE: &str = "ou=users,dc=example,dc=org";
pub const GROUP_BASE: &str = "ou=groups,dc=example,dc=org";

pub async fn ldap_connect() -> Result<ldap3::Ldap, Box<dyn Error>> {
	let (conn, mut ldap) = LdapConnAsync::new("ldap://localhost:1389").await?;
	let _handle = tokio::spawn(async move {
		if let Err(err) = conn.drive().await {
			panic!("Ldap connection error {err}");
		}
	});
	ldap.simple_bind(&format!("cn=admin,{BASE_DN}"), "adminpassword").await?;
	Ok(ldap)
}

pub async fn ldap_add_organizational_unit(
	ldap: &mut ldap3::Ldap,
	ou: &str,
) -> Result<(), Box<dyn Error>> {
	ldap.add(
		&format!("ou={ou},{BASE_DN}"),
		vec![("objectClass", ["organizationalUnit"].into())],
	)
	.await?
	.success()?;
	Ok(())
}

pub async fn ldap_delete_organizational_unit(
	ldap: &mut ldap3::Ldap,
	ou: &str,
) -> Result<(), Box<dyn Error>> {
	ldap.delete(&format!("ou={ou},{BASE_DN}")).await?.success()?;
	Ok(())
}

pub async fn ldap_add_user(
	ldap: &mut ldap3::Ldap,
	uid: &str,
	password: &str,
) -> Result<(), Box<dyn Error>> {
	ldap.add(
		&format!("uid={uid},{USER_BASE}"),
		vec![
			("objectClass", ["inetOrgPerson"].into()),
			("cn", [uid].into()),
			("sn", [uid].into()),
			("userPassword", [password].into()),
		],
	)
	.await?
	.success()?;
	Ok(())
}

pub async fn ldap_delete_user(ldap: &mut ldap3::Ldap, uid: &str) -> Result<(), Box<dyn Error>> {
	ldap.delete(&format!("uid={uid},{USER_BASE}")).await?.success()?;
	Ok(())
}

/// Add a `groupOfUniqueNames` whose members are the given user uids.
pub async fn ldap_add_group(
	ldap: &mut ldap3::Ldap,
	cn: &str,
	member_uids: &[&str],
) -> Result<(), Box<dyn Error>> {
	let members: Vec<String> =
		member_uids.iter().map(|uid| format!("uid={uid},{USER_BASE}")).collect();
	ldap.add(
		&format!("cn={cn},{GROUP_BASE}"),
		vec![
			("objectClass".to_owned(), ["groupOfUniqueNames".to_owned()].into()),
			("cn".to_owned(), [cn.to_owned()].into()),
			("uniqueMember".to_owned(), members.into_iter().collect()),
		],
	)
	.await?
	.success()?;
	Ok(())
}

/// Add a `posixGroup` carrying `memberUid` values instead of member DNs.
pub async fn ldap_add_posix_group(
	ldap: &mut ldap3::Ldap,
	cn: &str,
	gid: &str,
	member_uids: &[&str],
) -> Result<(), Box<dyn Error>> {
	let members: Vec<String> = member_uids.iter().map(|uid| (*uid).to_owned()).collect();
	ldap.add(
		&format!("cn={cn},{GROUP_BASE}"),
		vec![
			("objectClass".to_owned(), ["posixGroup".to_owned()].into()),
			("cn".to_owned(), [cn.to_owned()].into()),
			("gidNumber".to_owned(), [gid.to_owned()].into()),
			("memberUid".to_owned(), members.into_iter().collect()),
		],
	)
	.await?
	.success()?;
	Ok(())
}

pub async fn ldap_delete_group(ldap: &mut ldap3::Ldap, cn: &str) -> Result<(), Box<dyn Error>> {
	ldap.delete(&format!("cn={cn},{GROUP_BASE}")).await?.success()?;
	Ok(())
}
