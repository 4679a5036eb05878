use serde_json::Value;
use tracing::{info, warn};
use uuid::Uuid;

use super::association::{AssociationError, AssociationMaintainer};
use super::error::{DomainError, DomainResult};
use super::validation::{self, Body, FieldRules};
use crate::database::models::{Dog, Sex};
use crate::database::{Scope, Store, StoreError};
use crate::types::Noun;

const REQUIRED: &[&str] = &["name", "breederId"];
const CREATABLE: &[&str] = &[
    "id", "name", "breed", "color", "sex", "weight", "primaryImage", "breederId", "litterId",
];
const UPDATABLE: &[&str] = &[
    "name", "breed", "color", "sex", "weight", "primaryImage", "breederId", "litterId",
];

/// Plain field changes. `litterId` is not here: it only moves through the
/// association maintainer.
#[derive(Debug, Default)]
struct DogPatch {
    name: Option<String>,
    breed: Option<String>,
    color: Option<String>,
    sex: Option<Sex>,
    weight: Option<i64>,
    primary_image: Option<Option<String>>,
    breeder_id: Option<String>,
}

impl DogPatch {
    fn apply(&self, dog: &mut Dog) {
        if let Some(v) = &self.name {
            dog.name = v.clone();
        }
        if let Some(v) = &self.breed {
            dog.breed = v.clone();
        }
        if let Some(v) = &self.color {
            dog.color = v.clone();
        }
        if let Some(v) = self.sex {
            dog.sex = v;
        }
        if let Some(v) = self.weight {
            dog.weight = v;
        }
        if let Some(v) = &self.primary_image {
            dog.primary_image = v.clone();
        }
        if let Some(v) = &self.breeder_id {
            dog.breeder_id = v.clone();
        }
    }
}

#[derive(Clone)]
pub struct DogService {
    store: Store,
    associations: AssociationMaintainer,
}

impl DogService {
    pub fn new(store: Store, associations: AssociationMaintainer) -> Self {
        Self {
            store,
            associations,
        }
    }

    pub async fn create(&self, body: Value) -> DomainResult<Dog> {
        let body = validation::into_body(body)?;
        validation::require_fields(&body, Noun::Dog, REQUIRED)?;

        let id = validation::requested_id(&body)?;
        if let Some(id) = &id {
            if self.store.dogs.find_by_id(id, Scope::IncludeDeleted).await?.is_some() {
                return Err(DomainError::Conflict(format!("A dog already exists with id {}", id)));
            }
        }
        validation::reject_unknown_on_create(&body, Noun::Dog, CREATABLE)?;

        // Foreign keys
        let breeder_value = body.get("breederId").unwrap_or(&Value::Null);
        let breeder_id = match breeder_value.as_str() {
            Some(id) => self.breeder_exists(id).await?.then(|| id.to_string()),
            None => None,
        }
        .ok_or_else(|| {
            DomainError::Validation(format!("Invalid breederId: {}", display(breeder_value)))
        })?;
        let litter_id = self
            .requested_litter(&body, "Invalid litterId:", &breeder_id)
            .await?;

        let patch = check_fields(&body)?;

        let mut dog = Dog {
            id: id.unwrap_or_else(|| Uuid::new_v4().to_string()),
            name: String::new(),
            breed: String::new(),
            color: String::new(),
            sex: Sex::Unknown,
            weight: 0,
            primary_image: None,
            breeder_id,
            litter_id: String::new(),
            deleted_at: None,
        };
        patch.apply(&mut dog);

        let dog = self.store.dogs.create(dog).await.map_err(duplicate)?;

        if let Some(litter_id) = litter_id.filter(|l| !l.is_empty()) {
            if let Err(e) = self.associations.attach_pup_to_litter(&dog.id, &litter_id).await {
                // Undo the insert so a failed request leaves nothing behind
                warn!(dog = %dog.id, litter = %litter_id, "Attach failed during create: {}", e);
                self.store.dogs.purge(&dog.id).await?;
                return Err(e.into());
            }
        }

        info!(dog = %dog.id, breeder = %dog.breeder_id, "Created dog");
        self.reload(&dog.id).await
    }

    /// `current` has already passed the owner-or-superuser gate
    pub async fn update(&self, current: &Dog, body: Value) -> DomainResult<(Vec<String>, Dog)> {
        let body = validation::into_body(body)?;
        validation::reject_invalid_updates(&body, UPDATABLE)?;

        // Foreign keys
        let mut owner = current.breeder_id.clone();
        if let Some(value) = body.get("breederId") {
            let valid = match value {
                Value::String(id) => self.breeder_exists(id).await?,
                _ => false,
            };
            if !valid {
                return Err(DomainError::Validation(format!(
                    "Can't update breederId: No breeder with ID {}",
                    display(value)
                )));
            }
            owner = display(value);
        }
        let litter_id = self
            .requested_litter(&body, "Can't update litterId: No litter with ID", &owner)
            .await?;
        if litter_id.is_none() && owner != current.breeder_id && current.has_litter() {
            let litter = self.store.litters.find_by_id(&current.litter_id, Scope::Active).await?;
            if litter.is_some_and(|l| l.breeder_id != owner) {
                return Err(DomainError::Validation(format!(
                    "Can't update breederId: dog is in litter {} of another breeder",
                    current.litter_id
                )));
            }
        }

        let patch = check_fields(&body)?;

        // Association side effects. The maintainer works from the stored dog,
        // not from `current`, which may already be out of date.
        match litter_id.as_deref() {
            None => {}
            Some("") => self.associations.release_pup(&current.id).await?,
            Some(new_litter) => self
                .associations
                .attach_pup_to_litter(&current.id, new_litter)
                .await
                .map_err(|e| match e {
                    AssociationError::LitterNotFound(id) => DomainError::Validation(format!(
                        "Can't update litterId: No litter with ID {}",
                        id
                    )),
                    other => other.into(),
                })?,
        }

        let updated = self
            .store
            .dogs
            .modify(&current.id, Scope::Active, &|dog: &mut Dog| patch.apply(dog))
            .await?
            .ok_or_else(|| DomainError::NotFound(format!("No dog with ID {}", current.id)))?;

        let fields: Vec<String> = body.keys().cloned().collect();
        info!(dog = %current.id, ?fields, "Updated dog");
        Ok((fields, updated))
    }

    async fn breeder_exists(&self, id: &str) -> DomainResult<bool> {
        Ok(self.store.breeders.find_by_id(id, Scope::Active).await?.is_some())
    }

    /// `Some("")` clears the litter; any other id must be an active litter
    /// of `owner`
    async fn requested_litter(
        &self,
        body: &Body,
        message: &str,
        owner: &str,
    ) -> DomainResult<Option<String>> {
        let Some(value) = body.get("litterId") else {
            return Ok(None);
        };
        let invalid = || DomainError::Validation(format!("{} {}", message, display(value)));
        let id = value.as_str().ok_or_else(invalid)?;
        if id.is_empty() {
            return Ok(Some(String::new()));
        }
        match self.store.litters.find_by_id(id, Scope::Active).await? {
            None => Err(invalid()),
            Some(litter) if litter.breeder_id != owner => Err(DomainError::Validation(format!(
                "Litter {} belongs to another breeder",
                id
            ))),
            Some(_) => Ok(Some(id.to_string())),
        }
    }

    async fn reload(&self, id: &str) -> DomainResult<Dog> {
        self.store
            .dogs
            .find_by_id(id, Scope::Active)
            .await?
            .ok_or_else(|| DomainError::NotFound(format!("No dog with ID {}", id)))
    }
}

fn check_fields(body: &Body) -> DomainResult<DogPatch> {
    let mut rules = FieldRules::new();
    let mut patch = DogPatch {
        name: rules.non_empty_string(body, "name"),
        breed: rules.string(body, "breed"),
        color: rules.string(body, "color"),
        sex: None,
        weight: rules.non_negative_int(body, "weight"),
        primary_image: None,
        breeder_id: body.get("breederId").and_then(Value::as_str).map(str::to_string),
    };

    if let Some(sex) = rules.string(body, "sex") {
        match Sex::parse(&sex) {
            Some(sex) => patch.sex = Some(sex),
            None => rules.fail("sex", "must be one of 'm', 'f' or ''"),
        }
    }

    match body.get("primaryImage") {
        None => {}
        Some(Value::Null) => patch.primary_image = Some(None),
        Some(Value::String(path)) => patch.primary_image = Some(Some(path.clone())),
        Some(_) => rules.fail("primaryImage", "must be a string"),
    }

    rules.finish()?;
    Ok(patch)
}

fn display(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn duplicate(err: StoreError) -> DomainError {
    match err {
        StoreError::DuplicateId(id) => {
            DomainError::Conflict(format!("A dog already exists with id {}", id))
        }
        other => other.into(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::models::{Breeder, Litter, ParentRef};
    use serde_json::json;

    async fn setup() -> (Store, DogService) {
        let store = Store::memory();
        store
            .breeders
            .create(Breeder {
                id: "b1".into(),
                firstname: "Fred".into(),
                lastname: "Astaire".into(),
                city: String::new(),
                state: String::new(),
                email: "fred@astaire.com".into(),
                password: String::new(),
                salt: String::new(),
                superuser: false,
                deleted_at: None,
            })
            .await
            .unwrap();
        store
            .litters
            .create(Litter {
                id: "l1".into(),
                breeder_id: "b1".into(),
                count: 0,
                dam: ParentRef {
                    id: None,
                    name: Some("Bella".into()),
                },
                sire: None,
                pups: Vec::new(),
                deleted_at: None,
            })
            .await
            .unwrap();
        let service = DogService::new(store.clone(), AssociationMaintainer::new(store.clone()));
        (store, service)
    }

    #[tokio::test]
    async fn create_applies_defaults_and_attaches() {
        let (store, service) = setup().await;
        let dog = service
            .create(json!({"id": "rex", "name": "Rex", "breederId": "b1", "litterId": "l1"}))
            .await
            .unwrap();
        assert_eq!(dog.sex, Sex::Unknown);
        assert_eq!(dog.weight, 0);
        assert_eq!(dog.litter_id, "l1");
        let litter = store.litters.find_by_id("l1", Scope::Active).await.unwrap().unwrap();
        assert_eq!(litter.pups, vec!["rex"]);
    }

    #[tokio::test]
    async fn create_checks_in_order() {
        let (_store, service) = setup().await;
        let err = service.create(json!({"name": "Rex"})).await.unwrap_err();
        assert_eq!(err.to_string(), "dog not created. Missing required field(s): breederId");

        let err = service
            .create(json!({"name": "Rex", "breederId": "nobody", "sex": "x"}))
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "Invalid breederId: nobody");

        let err = service
            .create(json!({"name": "Rex", "breederId": "b1", "sex": "x", "weight": -2}))
            .await
            .unwrap_err();
        match err {
            DomainError::FieldRules { field_errors, .. } => {
                assert_eq!(field_errors.keys().collect::<Vec<_>>(), vec!["sex", "weight"]);
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn rejected_update_changes_nothing() {
        let (store, service) = setup().await;
        let dog = service
            .create(json!({"id": "rex", "name": "Rex", "breederId": "b1"}))
            .await
            .unwrap();

        let err = service
            .update(&dog, json!({"color": "brown", "id": "max"}))
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "Attempted to update invalid fields: id");

        let err = service
            .update(&dog, json!({"color": "brown", "litterId": "nope"}))
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "Can't update litterId: No litter with ID nope");

        let stored = store.dogs.find_by_id("rex", Scope::Active).await.unwrap().unwrap();
        assert_eq!(stored, dog);
    }

    #[tokio::test]
    async fn moving_between_litters_updates_both_sides() {
        let (store, service) = setup().await;
        let dog = service
            .create(json!({"id": "rex", "name": "Rex", "breederId": "b1", "litterId": "l1"}))
            .await
            .unwrap();

        let (fields, updated) = service.update(&dog, json!({"litterId": ""})).await.unwrap();
        assert_eq!(fields, vec!["litterId"]);
        assert_eq!(updated.litter_id, "");
        let litter = store.litters.find_by_id("l1", Scope::Active).await.unwrap().unwrap();
        assert!(litter.pups.is_empty());
    }

    async fn second_litter(store: &Store, id: &str, breeder_id: &str) {
        let mut litter = store.litters.find_by_id("l1", Scope::Active).await.unwrap().unwrap();
        litter.id = id.into();
        litter.breeder_id = breeder_id.into();
        litter.pups.clear();
        store.litters.create(litter).await.unwrap();
    }

    #[tokio::test]
    async fn moves_from_an_outdated_read_leave_one_litter() {
        let (store, service) = setup().await;
        second_litter(&store, "l2", "b1").await;
        let stale = service
            .create(json!({"id": "rex", "name": "Rex", "breederId": "b1"}))
            .await
            .unwrap();

        // Both requests passed the gate with the same snapshot
        service.update(&stale, json!({"litterId": "l1"})).await.unwrap();
        service.update(&stale, json!({"litterId": "l2"})).await.unwrap();

        let l1 = store.litters.find_by_id("l1", Scope::Active).await.unwrap().unwrap();
        let l2 = store.litters.find_by_id("l2", Scope::Active).await.unwrap().unwrap();
        assert!(l1.pups.is_empty());
        assert_eq!(l2.pups, vec!["rex"]);
        let rex = store.dogs.find_by_id("rex", Scope::Active).await.unwrap().unwrap();
        assert_eq!(rex.litter_id, "l2");

        // Clearing from the same snapshot empties the litter rex is really in
        service.update(&stale, json!({"litterId": ""})).await.unwrap();
        let l2 = store.litters.find_by_id("l2", Scope::Active).await.unwrap().unwrap();
        assert!(l2.pups.is_empty());
    }

    #[tokio::test]
    async fn litters_of_other_breeders_are_off_limits() {
        let (store, service) = setup().await;
        let mut ginger = store.breeders.find_by_id("b1", Scope::Active).await.unwrap().unwrap();
        ginger.id = "b2".into();
        ginger.email = "ginger@rogers.com".into();
        store.breeders.create(ginger).await.unwrap();
        second_litter(&store, "l2", "b2").await;

        let err = service
            .create(json!({"id": "rex", "name": "Rex", "breederId": "b1", "litterId": "l2"}))
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "Litter l2 belongs to another breeder");

        let dog = service
            .create(json!({"id": "rex", "name": "Rex", "breederId": "b1", "litterId": "l1"}))
            .await
            .unwrap();
        let err = service.update(&dog, json!({"litterId": "l2"})).await.unwrap_err();
        assert_eq!(err.to_string(), "Litter l2 belongs to another breeder");

        let err = service.update(&dog, json!({"breederId": "b2"})).await.unwrap_err();
        assert_eq!(
            err.to_string(),
            "Can't update breederId: dog is in litter l1 of another breeder"
        );

        // Moving dog and litter membership together is fine
        let (_, moved) = service
            .update(&dog, json!({"breederId": "b2", "litterId": "l2"}))
            .await
            .unwrap();
        assert_eq!(moved.breeder_id, "b2");
        assert_eq!(moved.litter_id, "l2");
        let l1 = store.litters.find_by_id("l1", Scope::Active).await.unwrap().unwrap();
        assert!(l1.pups.is_empty());
    }
}
