use anyhow::Result;
use argon2::{password_hash::SaltString, Argon2, PasswordHash, PasswordHasher, PasswordVerifier};

use crate::error::{EscalaError, EscalaResult};
use crate::models::{Role, User};
use crate::roster_csv::name_key;

pub fn hash_password(password: &str) -> Result<String> {
    let salt = SaltString::generate(&mut rand::thread_rng());
    let argon2 = Argon2::default();
    let hash = argon2
        .hash_password(password.as_bytes(), &salt)
        .map_err(|e| anyhow::anyhow!("Failed to hash password: {}", e))?
        .to_string();
    Ok(hash)
}

pub fn verify_password(password_hash: &str, password: &str) -> bool {
    match PasswordHash::new(password_hash) {
        Ok(parsed) => Argon2::default()
            .verify_password(password.as_bytes(), &parsed)
            .is_ok(),
        Err(_) => false,
    }
}

/// Checks a login attempt. Unknown users and wrong passwords are
/// indistinguishable to the caller.
pub fn authenticate(user: Option<&User>, password: &str) -> EscalaResult<()> {
    let user = user.ok_or(EscalaError::InvalidCredentials)?;
    if !verify_password(&user.password_hash, password) {
        return Err(EscalaError::InvalidCredentials);
    }
    if !user.is_active() {
        return Err(EscalaError::InactiveUser(user.name.clone()));
    }
    Ok(())
}

/// An active actor may change an account only when their role outranks the
/// account's current and requested roles.
pub fn ensure_can_manage(actor: &User, current: Role, requested: Role) -> EscalaResult<()> {
    if !actor.is_active() || !actor.role.can_manage(current) || !actor.role.can_manage(requested) {
        return Err(EscalaError::NotAuthorized(actor.name.clone()));
    }
    Ok(())
}

/// Rejects a new account name that roster matching could not tell apart
/// from an existing one.
pub fn ensure_unique_name<'a>(
    name: &str,
    existing: impl IntoIterator<Item = &'a str>,
) -> EscalaResult<()> {
    let key = name_key(name);
    match existing.into_iter().find(|other| name_key(other) == key) {
        Some(other) => Err(EscalaError::DuplicateName {
            name: name.trim().to_string(),
            existing: other.to_string(),
        }),
        None => Ok(()),
    }
}

/// Role for a new account. On an empty database the first account is the
/// super_admin, otherwise nobody could ever manage the others.
pub fn role_for_new_account(first_account: bool, requested: Option<Role>) -> EscalaResult<Role> {
    match (first_account, requested) {
        (true, None) | (true, Some(Role::SuperAdmin)) => Ok(Role::SuperAdmin),
        (true, Some(other)) => Err(EscalaError::BootstrapRole(other)),
        (false, requested) => Ok(requested.unwrap_or(Role::Operador)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::UserStatus;
    use chrono::Utc;
    use uuid::Uuid;

    fn user(role: Role, status: UserStatus, password: &str) -> User {
        User {
            id: Uuid::new_v4(),
            name: "Ana Souza".to_string(),
            password_hash: hash_password(password).unwrap(),
            role,
            status,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn hashes_verify_and_differ_per_call() {
        let first = hash_password("bmi2025").unwrap();
        let second = hash_password("bmi2025").unwrap();
        assert_ne!(first, second);
        assert!(verify_password(&first, "bmi2025"));
        assert!(!verify_password(&first, "bmi2026"));
        assert!(!verify_password("plaintext", "plaintext"));
    }

    #[test]
    fn authentication_outcomes() {
        let active = user(Role::Operador, UserStatus::Ativo, "segredo");
        assert!(authenticate(Some(&active), "segredo").is_ok());
        assert_eq!(
            authenticate(Some(&active), "errado"),
            Err(EscalaError::InvalidCredentials)
        );
        assert_eq!(authenticate(None, "segredo"), Err(EscalaError::InvalidCredentials));

        let inactive = user(Role::Operador, UserStatus::Inativo, "segredo");
        assert_eq!(
            authenticate(Some(&inactive), "segredo"),
            Err(EscalaError::InactiveUser("Ana Souza".to_string()))
        );
    }

    #[test]
    fn admins_cannot_promote_to_admin() {
        let admin = user(Role::Administrador, UserStatus::Ativo, "x");
        assert!(ensure_can_manage(&admin, Role::Operador, Role::Operador).is_ok());
        assert!(ensure_can_manage(&admin, Role::Operador, Role::Administrador).is_err());

        let root = user(Role::SuperAdmin, UserStatus::Ativo, "x");
        assert!(ensure_can_manage(&root, Role::Operador, Role::SuperAdmin).is_ok());
    }

    #[test]
    fn names_clash_regardless_of_case_accents_and_spacing() {
        let existing = ["Ana Souza", "João Pereira"];
        assert_eq!(
            ensure_unique_name("ANA  SOUZA", existing),
            Err(EscalaError::DuplicateName {
                name: "ANA  SOUZA".to_string(),
                existing: "Ana Souza".to_string()
            })
        );
        assert!(ensure_unique_name("joao pereira", existing).is_err());
        assert!(ensure_unique_name("Ana Lima", existing).is_ok());
    }

    #[test]
    fn first_account_is_always_super_admin() {
        assert_eq!(role_for_new_account(true, None), Ok(Role::SuperAdmin));
        assert_eq!(
            role_for_new_account(true, Some(Role::SuperAdmin)),
            Ok(Role::SuperAdmin)
        );
        assert_eq!(
            role_for_new_account(true, Some(Role::Operador)),
            Err(EscalaError::BootstrapRole(Role::Operador))
        );
        assert_eq!(role_for_new_account(false, None), Ok(Role::Operador));
        assert_eq!(
            role_for_new_account(false, Some(Role::Administrador)),
            Ok(Role::Administrador)
        );
    }
}
