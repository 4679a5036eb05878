use serde_json::Value;
use std::collections::HashSet;
use tracing::{info, warn};
use uuid::Uuid;

use super::association::{AssociationError, AssociationMaintainer, ParentRole};
use super::error::{DomainError, DomainResult};
use super::validation::{self, Body, FieldRules};
use crate::database::models::{Litter, ParentRef};
use crate::database::{Scope, Store, StoreError};
use crate::types::Noun;

const REQUIRED: &[&str] = &["dam", "breederId"];
const CREATABLE: &[&str] = &["id", "breederId", "count", "dam", "sire", "pups"];
const UPDATABLE: &[&str] = &["breederId", "count", "dam", "sire", "pups"];

/// Plain field changes; `pups` is reconciled separately
#[derive(Debug, Default)]
struct LitterPatch {
    breeder_id: Option<String>,
    count: Option<i64>,
    dam: Option<ParentRef>,
    sire: Option<Option<ParentRef>>,
}

impl LitterPatch {
    fn apply(&self, litter: &mut Litter) {
        if let Some(v) = &self.breeder_id {
            litter.breeder_id = v.clone();
        }
        if let Some(v) = self.count {
            litter.count = v;
        }
        if let Some(v) = &self.dam {
            litter.dam = v.clone();
        }
        if let Some(v) = &self.sire {
            litter.sire = v.clone();
        }
    }
}

/// Everything a litter body carries once its references have been checked
struct CheckedLitter {
    patch: LitterPatch,
    pups: Option<Vec<String>>,
}

#[derive(Clone)]
pub struct LitterService {
    store: Store,
    associations: AssociationMaintainer,
}

impl LitterService {
    pub fn new(store: Store, associations: AssociationMaintainer) -> Self {
        Self {
            store,
            associations,
        }
    }

    pub async fn create(&self, body: Value) -> DomainResult<Litter> {
        let body = validation::into_body(body)?;
        validation::require_fields(&body, Noun::Litter, REQUIRED)?;

        let id = validation::requested_id(&body)?;
        if let Some(id) = &id {
            if self.store.litters.find_by_id(id, Scope::IncludeDeleted).await?.is_some() {
                return Err(DomainError::Conflict(format!(
                    "A litter already exists with id {}",
                    id
                )));
            }
        }
        validation::reject_unknown_on_create(&body, Noun::Litter, CREATABLE)?;

        let checked = self
            .check(&body, None, "Invalid breederId:")
            .await?;
        let CheckedLitter { patch, pups } = checked;

        let mut litter = Litter {
            id: id.unwrap_or_else(|| Uuid::new_v4().to_string()),
            breeder_id: String::new(),
            count: 0,
            dam: ParentRef::default(),
            sire: None,
            pups: Vec::new(),
            deleted_at: None,
        };
        patch.apply(&mut litter);

        let litter = self.store.litters.create(litter).await.map_err(duplicate)?;

        let mut attached: Vec<&str> = Vec::new();
        for pup in pups.iter().flatten() {
            if let Err(e) = self.associations.claim_pup(pup, &litter.id).await {
                warn!(litter = %litter.id, pup = %pup, "Attach failed during create: {}", e);
                for done in attached {
                    self.associations
                        .detach_pup_from_litter(done, &litter.id, true)
                        .await?;
                }
                self.store.litters.purge(&litter.id).await?;
                return Err(e.into());
            }
            attached.push(pup);
        }

        info!(litter = %litter.id, breeder = %litter.breeder_id, pups = attached.len(), "Created litter");
        self.reload(&litter.id).await
    }

    /// `current` has already passed the owner-or-superuser gate
    pub async fn update(
        &self,
        current: &Litter,
        body: Value,
    ) -> DomainResult<(Vec<String>, Litter)> {
        let body = validation::into_body(body)?;
        validation::reject_invalid_updates(&body, UPDATABLE)?;

        let CheckedLitter { patch, pups } = self
            .check(
                &body,
                Some(current),
                "Can't update breederId: No breeder with ID",
            )
            .await?;

        if let Some(pups) = &pups {
            let mut target = current.clone();
            if let Some(breeder_id) = &patch.breeder_id {
                target.breeder_id = breeder_id.clone();
            }
            self.associations.reconcile_pups(&target, pups).await?;
        }

        let updated = self
            .store
            .litters
            .modify(&current.id, Scope::Active, &|litter: &mut Litter| patch.apply(litter))
            .await?
            .ok_or_else(|| DomainError::NotFound(format!("No litter with ID {}", current.id)))?;

        let fields: Vec<String> = body.keys().cloned().collect();
        info!(litter = %current.id, ?fields, "Updated litter");
        Ok((fields, updated))
    }

    /// Foreign keys first, then field rules. Nothing is written here.
    async fn check(
        &self,
        body: &Body,
        current: Option<&Litter>,
        breeder_message: &str,
    ) -> DomainResult<CheckedLitter> {
        let mut rules = FieldRules::new();
        let mut patch = LitterPatch::default();

        if let Some(value) = body.get("breederId") {
            let exists = match value.as_str() {
                Some(id) => self.store.breeders.find_by_id(id, Scope::Active).await?.is_some(),
                None => false,
            };
            if !exists {
                let shown = value.as_str().map(str::to_string).unwrap_or_else(|| value.to_string());
                return Err(DomainError::Validation(format!("{} {}", breeder_message, shown)));
            }
            patch.breeder_id = value.as_str().map(str::to_string);
        }

        if let Some(value) = body.get("dam") {
            match validation::parse_parent(value) {
                Ok(dam) => {
                    self.associations
                        .validate_parent_reference(ParentRole::Dam, &dam)
                        .await?;
                    patch.dam = Some(dam);
                }
                Err(reason) => rules.fail("dam", reason),
            }
        }

        match body.get("sire") {
            None => {}
            Some(Value::Null) => patch.sire = Some(None),
            Some(value) => match validation::parse_parent(value) {
                Ok(sire) => {
                    self.associations
                        .validate_parent_reference(ParentRole::Sire, &sire)
                        .await?;
                    patch.sire = Some(Some(sire));
                }
                Err(reason) => rules.fail("sire", reason),
            },
        }

        // Pups must belong to the breeder the litter will have
        let owner = patch
            .breeder_id
            .clone()
            .or_else(|| current.map(|l| l.breeder_id.clone()))
            .unwrap_or_default();

        let mut pups = None;
        if let Some(value) = body.get("pups") {
            match validation::parse_id_list(value) {
                Ok(ids) => {
                    self.check_pups(&ids, current, &owner).await?;
                    pups = Some(ids);
                }
                Err(reason) => rules.fail("pups", reason),
            }
        } else if let Some(litter) = current.filter(|l| l.breeder_id != owner) {
            self.associations
                .validate_pups_array(&litter.pups, Some(&litter.id), &owner)
                .await?;
        }

        patch.count = rules.non_negative_int(body, "count");
        rules.finish()?;

        Ok(CheckedLitter { patch, pups })
    }

    /// On update only ids not already in the litter need checking
    async fn check_pups(
        &self,
        ids: &[String],
        current: Option<&Litter>,
        owner: &str,
    ) -> Result<(), AssociationError> {
        let Some(litter) = current else {
            return self.associations.validate_pups_array(ids, None, owner).await;
        };
        let mut seen = HashSet::new();
        if let Some(dup) = ids.iter().find(|id| !seen.insert(*id)) {
            return Err(AssociationError::InvalidPup {
                id: dup.clone(),
                reason: "listed more than once".to_string(),
            });
        }
        // Kept pups are re-checked only when the litter changes hands
        let changed_hands = litter.breeder_id != owner;
        let checked: Vec<String> = ids
            .iter()
            .filter(|id| changed_hands || !litter.has_pup(id))
            .cloned()
            .collect();
        self.associations
            .validate_pups_array(&checked, Some(&litter.id), owner)
            .await
    }

    async fn reload(&self, id: &str) -> DomainResult<Litter> {
        self.store
            .litters
            .find_by_id(id, Scope::Active)
            .await?
            .ok_or_else(|| DomainError::NotFound(format!("No litter with ID {}", id)))
    }
}

fn duplicate(err: StoreError) -> DomainError {
    match err {
        StoreError::DuplicateId(id) => {
            DomainError::Conflict(format!("A litter already exists with id {}", id))
        }
        other => other.into(),
    }
}
