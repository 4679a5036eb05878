use serde_json::Value;
use tracing::info;
use uuid::Uuid;

use super::error::{DomainError, DomainResult};
use super::validation::{self, Body, FieldRules};
use crate::auth::password::{self, Credentials};
use crate::auth::Identity;
use crate::database::models::Breeder;
use crate::database::{AssetFilter, Scope, Store, StoreError};
use crate::types::Noun;

const REQUIRED: &[&str] = &["firstname", "lastname", "email", "password"];
const CREATABLE: &[&str] = &[
    "id", "firstname", "lastname", "city", "state", "email", "password", "superuser",
];
const UPDATABLE: &[&str] = &[
    "firstname", "lastname", "city", "state", "email", "password", "superuser",
];

/// Field values that survived validation
#[derive(Debug, Default)]
struct BreederPatch {
    firstname: Option<String>,
    lastname: Option<String>,
    city: Option<String>,
    state: Option<String>,
    email: Option<String>,
    password: Option<String>,
    /// Hash of `password`, filled in once every rule passed
    credentials: Option<Credentials>,
    superuser: Option<bool>,
}

impl BreederPatch {
    fn apply(&self, breeder: &mut Breeder) {
        if let Some(v) = &self.firstname {
            breeder.firstname = v.clone();
        }
        if let Some(v) = &self.lastname {
            breeder.lastname = v.clone();
        }
        if let Some(v) = &self.city {
            breeder.city = v.clone();
        }
        if let Some(v) = &self.state {
            breeder.state = v.clone();
        }
        if let Some(v) = &self.email {
            breeder.email = v.clone();
        }
        if let Some(credentials) = &self.credentials {
            breeder.salt = credentials.salt.clone();
            breeder.password = credentials.hash.clone();
        }
        if let Some(v) = self.superuser {
            breeder.superuser = v;
        }
    }
}

#[derive(Debug)]
pub enum Login {
    UnknownEmail,
    WrongPassword,
    Authenticated(Breeder),
}

#[derive(Clone)]
pub struct BreederService {
    store: Store,
}

impl BreederService {
    pub fn new(store: Store) -> Self {
        Self { store }
    }

    /// Public registration. Only a superuser may create another superuser.
    pub async fn create(&self, body: Value, requester: Option<&Identity>) -> DomainResult<Breeder> {
        let body = validation::into_body(body)?;
        validation::require_fields(&body, Noun::Breeder, REQUIRED)?;

        let id = validation::requested_id(&body)?;
        if let Some(id) = &id {
            if self.store.breeders.find_by_id(id, Scope::IncludeDeleted).await?.is_some() {
                return Err(DomainError::Conflict(format!(
                    "A breeder already exists with id {}",
                    id
                )));
            }
        }
        validation::reject_unknown_on_create(&body, Noun::Breeder, CREATABLE)?;

        let patch = self.check_fields(&body, None, requester).await?;

        let mut breeder = Breeder {
            id: id.unwrap_or_else(|| Uuid::new_v4().to_string()),
            firstname: String::new(),
            lastname: String::new(),
            city: String::new(),
            state: String::new(),
            email: String::new(),
            password: String::new(),
            salt: String::new(),
            superuser: false,
            deleted_at: None,
        };
        patch.apply(&mut breeder);

        let breeder = self.store.breeders.create(breeder).await.map_err(conflict)?;
        info!(breeder = %breeder.id, superuser = breeder.superuser, "Created breeder");
        Ok(breeder)
    }

    /// `current` has already passed the owner-or-superuser gate
    pub async fn update(
        &self,
        current: &Breeder,
        body: Value,
        requester: &Identity,
    ) -> DomainResult<(Vec<String>, Breeder)> {
        let body = validation::into_body(body)?;
        validation::reject_invalid_updates(&body, UPDATABLE)?;

        let patch = self.check_fields(&body, Some(&current.id), Some(requester)).await?;

        let updated = self
            .store
            .breeders
            .modify(&current.id, Scope::Active, &|breeder: &mut Breeder| patch.apply(breeder))
            .await
            .map_err(conflict)?
            .ok_or_else(|| DomainError::NotFound(format!("No breeder with ID {}", current.id)))?;

        let fields: Vec<String> = body.keys().cloned().collect();
        info!(breeder = %current.id, ?fields, "Updated breeder");
        Ok((fields, updated))
    }

    /// Credentials check for `/auth/login`
    pub async fn authenticate(&self, email: &str, password: &str) -> DomainResult<Login> {
        let Some(breeder) = self.find_by_email(email).await? else {
            return Ok(Login::UnknownEmail);
        };
        if !password::verify(password, &breeder.password) {
            return Ok(Login::WrongPassword);
        }
        Ok(Login::Authenticated(breeder))
    }

    async fn find_by_email(&self, email: &str) -> DomainResult<Option<Breeder>> {
        let email = email.trim().to_lowercase();
        Ok(self
            .store
            .breeders
            .find_all(&AssetFilter::field("email", email), Scope::Active)
            .await?
            .into_iter()
            .next())
    }

    /// Field rules for create (`self_id == None`) and update
    async fn check_fields(
        &self,
        body: &Body,
        self_id: Option<&str>,
        requester: Option<&Identity>,
    ) -> DomainResult<BreederPatch> {
        let mut rules = FieldRules::new();
        let mut patch = BreederPatch {
            firstname: rules.non_empty_string(body, "firstname"),
            lastname: rules.non_empty_string(body, "lastname"),
            city: rules.string(body, "city"),
            state: rules.string(body, "state"),
            email: None,
            password: rules.string(body, "password"),
            credentials: None,
            superuser: rules.boolean(body, "superuser"),
        };

        if let Some(email) = rules.string(body, "email") {
            let email = email.trim().to_lowercase();
            if !validation::is_valid_email(&email) {
                rules.fail("email", "must be a valid email address");
            } else if let Some(existing) = self.find_by_email(&email).await? {
                if Some(existing.id.as_str()) != self_id {
                    rules.fail("email", "is already in use");
                }
            }
            patch.email = Some(email);
        }

        if let Some(pw) = &patch.password {
            if !password::is_valid_length(pw) {
                rules.fail("password", "must be between 5 and 30 characters");
            }
        }

        rules.finish()?;

        if patch.superuser.is_some() && !requester.is_some_and(|r| r.superuser) {
            // Registering as a regular breeder is always allowed
            if self_id.is_some() || patch.superuser == Some(true) {
                return Err(DomainError::Forbidden(
                    "Only a superuser can set the superuser flag".to_string(),
                ));
            }
        }

        patch.credentials = patch.password.as_deref().map(password::hash).transpose()?;
        Ok(patch)
    }
}

/// Races lost to the store's own uniqueness checks
fn conflict(err: StoreError) -> DomainError {
    match err {
        StoreError::DuplicateId(id) => {
            DomainError::Conflict(format!("A breeder already exists with id {}", id))
        }
        StoreError::Constraint(_) => DomainError::Conflict("email is already in use".to_string()),
        other => other.into(),
    }
}
