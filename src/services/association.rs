use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::{Mutex, PoisonError};
use thiserror::Error;
use tracing::{debug, warn};

use super::error::DomainError;
use crate::database::models::{Dog, Litter, ParentRef, Sex};
use crate::database::{AssetFilter, Scope, Store, StoreError};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParentRole {
    Dam,
    Sire,
}

impl fmt::Display for ParentRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ParentRole::Dam => "dam",
            ParentRole::Sire => "sire",
        })
    }
}

/// What linking does with a dog that already belongs to another litter
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Takeover {
    Move,
    Refuse,
}

#[derive(Debug, Error)]
pub enum AssociationError {
    #[error("No litter with ID {0}")]
    LitterNotFound(String),

    #[error("No dog with ID {0}")]
    DogNotFound(String),

    #[error("Invalid {role}: {reason}")]
    InvalidParent { role: ParentRole, reason: String },

    #[error("Invalid pup {id}: {reason}")]
    InvalidPup { id: String, reason: String },

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl From<AssociationError> for DomainError {
    fn from(err: AssociationError) -> Self {
        match err {
            AssociationError::Store(e) => DomainError::Store(e),
            other => DomainError::Validation(other.to_string()),
        }
    }
}

/// Keeps `Litter.pups` and `Dog.litterId` pointing at each other.
///
/// Every change to either side goes through the repositories' atomic
/// `modify`, so concurrent attaches to one litter cannot drop an id.
#[derive(Clone)]
pub struct AssociationMaintainer {
    store: Store,
}

impl AssociationMaintainer {
    pub fn new(store: Store) -> Self {
        Self { store }
    }

    /// Add `dog_id` to the active litter's pups (once) and point the dog at
    /// it. A dog that sits in another litter moves: the litter it actually
    /// left is the one it gets detached from.
    pub async fn attach_pup_to_litter(
        &self,
        dog_id: &str,
        litter_id: &str,
    ) -> Result<(), AssociationError> {
        self.link(dog_id, litter_id, Takeover::Move).await
    }

    /// Like `attach_pup_to_litter`, but a dog held by another litter is an
    /// `InvalidPup` and nothing changes. Used when a litter lists its pups.
    pub async fn claim_pup(&self, dog_id: &str, litter_id: &str) -> Result<(), AssociationError> {
        self.link(dog_id, litter_id, Takeover::Refuse).await
    }

    /// Take the dog out of whichever litter it is in right now
    pub async fn release_pup(&self, dog_id: &str) -> Result<(), AssociationError> {
        let previous = Mutex::new(String::new());
        let released = self
            .store
            .dogs
            .modify(dog_id, Scope::Active, &|dog: &mut Dog| {
                let old = std::mem::take(&mut dog.litter_id);
                if let Ok(mut slot) = previous.lock() {
                    *slot = old;
                }
            })
            .await?;
        if released.is_none() {
            return Err(AssociationError::DogNotFound(dog_id.to_string()));
        }
        let previous = previous.into_inner().unwrap_or_else(PoisonError::into_inner);
        self.detach_pup_from_litter(dog_id, &previous, false).await
    }

    async fn link(
        &self,
        dog_id: &str,
        litter_id: &str,
        takeover: Takeover,
    ) -> Result<(), AssociationError> {
        let pushed = self
            .store
            .litters
            .modify(litter_id, Scope::Active, &|litter: &mut Litter| {
                if !litter.has_pup(dog_id) {
                    litter.pups.push(dog_id.to_string());
                }
            })
            .await?;
        if pushed.is_none() {
            return Err(AssociationError::LitterNotFound(litter_id.to_string()));
        }

        // The swap and the read of the old value happen under one write
        let previous = Mutex::new(String::new());
        let linked = self
            .store
            .dogs
            .modify(dog_id, Scope::Active, &|dog: &mut Dog| {
                let held_elsewhere = dog.has_litter() && dog.litter_id != litter_id;
                if let Ok(mut slot) = previous.lock() {
                    *slot = dog.litter_id.clone();
                }
                if !held_elsewhere || takeover == Takeover::Move {
                    dog.litter_id = litter_id.to_string();
                }
            })
            .await?;
        let previous = previous.into_inner().unwrap_or_else(PoisonError::into_inner);
        let held_elsewhere = !previous.is_empty() && previous != litter_id;

        if linked.is_none() || (held_elsewhere && takeover == Takeover::Refuse) {
            self.store
                .litters
                .modify(litter_id, Scope::IncludeDeleted, &|litter: &mut Litter| {
                    litter.pups.retain(|p| p != dog_id);
                })
                .await?;
            return Err(match linked {
                None => AssociationError::DogNotFound(dog_id.to_string()),
                Some(_) => AssociationError::InvalidPup {
                    id: dog_id.to_string(),
                    reason: format!("Dog with ID {} already belongs to litter {}", dog_id, previous),
                },
            });
        }

        if held_elsewhere {
            self.detach_pup_from_litter(dog_id, &previous, false).await?;
            debug!(dog = dog_id, from = %previous, to = litter_id, "Moved pup");
        } else {
            debug!(dog = dog_id, litter = litter_id, "Attached pup");
        }
        Ok(())
    }

    /// Remove `dog_id` from the litter's pups. A litter that is gone is
    /// left alone. `clear_dog` also resets the dog's `litterId`, but only if
    /// it still names this litter.
    pub async fn detach_pup_from_litter(
        &self,
        dog_id: &str,
        litter_id: &str,
        clear_dog: bool,
    ) -> Result<(), AssociationError> {
        if litter_id.is_empty() {
            return Ok(());
        }

        self.store
            .litters
            .modify(litter_id, Scope::Active, &|litter: &mut Litter| {
                litter.pups.retain(|p| p != dog_id);
            })
            .await?;

        if clear_dog {
            self.store
                .dogs
                .modify(dog_id, Scope::IncludeDeleted, &|dog: &mut Dog| {
                    if dog.litter_id == litter_id {
                        dog.litter_id.clear();
                    }
                })
                .await?;
        }

        debug!(dog = dog_id, litter = litter_id, clear_dog, "Detached pup");
        Ok(())
    }

    pub async fn validate_parent_reference(
        &self,
        role: ParentRole,
        parent: &ParentRef,
    ) -> Result<(), AssociationError> {
        let invalid = |reason: String| AssociationError::InvalidParent { role, reason };

        if parent.id.is_none() && parent.name.is_none() {
            return Err(invalid(format!(
                "{} must be an object with a name or a valid dog id",
                role
            )));
        }

        if let Some(name) = &parent.name {
            if name.chars().count() < 2 || name.trim().parse::<f64>().is_ok() {
                return Err(invalid(format!(
                    "{} name must be at least two characters and non-numeric",
                    role
                )));
            }
        }

        let Some(id) = &parent.id else {
            return Ok(());
        };

        let dog = self
            .store
            .dogs
            .find_by_id(id, Scope::Active)
            .await?
            .ok_or_else(|| invalid(format!("No dog found with ID {}", id)))?;

        match (role, dog.sex) {
            (ParentRole::Dam, Sex::Male) => {
                return Err(invalid(format!("Dog with ID {} is male", id)));
            }
            (ParentRole::Sire, Sex::Female) => {
                return Err(invalid(format!("Dog with ID {} is female", id)));
            }
            _ => {}
        }

        if let Some(name) = &parent.name {
            if &dog.name != name {
                return Err(invalid(format!(
                    "Dog with ID {} is named {}, not {}",
                    id, dog.name, name
                )));
            }
        }

        Ok(())
    }

    /// Every id must be an active dog of `breeder_id`, listed once, and not
    /// already in a litter other than `litter_id`. Reports the first offender.
    pub async fn validate_pups_array(
        &self,
        ids: &[String],
        litter_id: Option<&str>,
        breeder_id: &str,
    ) -> Result<(), AssociationError> {
        if ids.is_empty() {
            return Ok(());
        }

        let dogs: HashMap<String, Dog> = self
            .store
            .dogs
            .find_all(&AssetFilter::Ids(ids.to_vec()), Scope::Active)
            .await?
            .into_iter()
            .map(|dog| (dog.id.clone(), dog))
            .collect();

        let mut seen = HashSet::new();
        for id in ids {
            let invalid = |reason: String| AssociationError::InvalidPup {
                id: id.clone(),
                reason,
            };
            if !seen.insert(id.as_str()) {
                return Err(invalid("listed more than once".to_string()));
            }
            let dog = dogs
                .get(id)
                .ok_or_else(|| invalid(format!("No dog found with ID {}", id)))?;
            if dog.breeder_id != breeder_id {
                return Err(invalid(format!(
                    "Dog with ID {} belongs to another breeder",
                    id
                )));
            }
            if dog.has_litter() && Some(dog.litter_id.as_str()) != litter_id {
                return Err(invalid(format!(
                    "Dog with ID {} already belongs to litter {}",
                    id, dog.litter_id
                )));
            }
        }
        Ok(())
    }

    /// Make `litter.pups` equal `new_pups`, keeping both sides consistent.
    ///
    /// Added ids are validated before anything is written. Returns the
    /// stored pups list: `new_pups` order, followed by any ids a concurrent
    /// request attached in the meantime.
    pub async fn reconcile_pups(
        &self,
        litter: &Litter,
        new_pups: &[String],
    ) -> Result<Vec<String>, AssociationError> {
        let mut seen: HashSet<&String> = HashSet::new();
        if let Some(dup) = new_pups.iter().find(|id| !seen.insert(*id)) {
            return Err(AssociationError::InvalidPup {
                id: dup.clone(),
                reason: "listed more than once".to_string(),
            });
        }

        let added: Vec<String> = new_pups
            .iter()
            .filter(|id| !litter.has_pup(id))
            .cloned()
            .collect();
        let removed: Vec<String> = litter
            .pups
            .iter()
            .filter(|id| !new_pups.contains(id))
            .cloned()
            .collect();

        self.validate_pups_array(&added, Some(&litter.id), &litter.breeder_id)
            .await?;

        // A dog can still be taken by another litter after validation; the
        // claim refuses it and the pups claimed so far are handed back.
        for (done, id) in added.iter().enumerate() {
            if let Err(e) = self.claim_pup(id, &litter.id).await {
                for claimed in &added[..done] {
                    self.detach_pup_from_litter(claimed, &litter.id, true).await?;
                }
                return Err(e);
            }
        }
        for id in &removed {
            self.detach_pup_from_litter(id, &litter.id, true).await?;
        }

        let reordered = self
            .store
            .litters
            .modify(&litter.id, Scope::Active, &|stored: &mut Litter| {
                let mut pups: Vec<String> = new_pups
                    .iter()
                    .filter(|id| stored.has_pup(id))
                    .cloned()
                    .collect();
                for extra in &stored.pups {
                    if !pups.contains(extra) {
                        pups.push(extra.clone());
                    }
                }
                stored.pups = pups;
            })
            .await?
            .ok_or_else(|| AssociationError::LitterNotFound(litter.id.clone()))?;

        debug!(
            litter = %litter.id,
            added = added.len(),
            removed = removed.len(),
            "Reconciled pups"
        );
        Ok(reordered.pups)
    }

    /// After a litter comes back: re-point its pups that are active and
    /// unassigned, and drop the rest from `pups`.
    pub async fn relink_litter(&self, litter_id: &str) -> Result<(), AssociationError> {
        let Some(litter) = self.store.litters.find_by_id(litter_id, Scope::Active).await? else {
            return Ok(());
        };
        if litter.pups.is_empty() {
            return Ok(());
        }

        let linked: HashSet<String> = self
            .store
            .dogs
            .modify_all(
                &AssetFilter::Ids(litter.pups.clone()),
                Scope::Active,
                &|dog: &mut Dog| {
                    if dog.litter_id.is_empty() {
                        dog.litter_id = litter_id.to_string();
                    }
                },
            )
            .await?
            .into_iter()
            .filter(|dog| dog.litter_id == litter_id)
            .map(|dog| dog.id)
            .collect();

        self.store
            .litters
            .modify(litter_id, Scope::Active, &|stored: &mut Litter| {
                stored.pups.retain(|id| linked.contains(id));
            })
            .await?;

        debug!(litter = litter_id, pups = linked.len(), "Relinked litter");
        Ok(())
    }

    /// After a dog comes back: re-attach it to its litter if that litter is
    /// active, otherwise forget the litter.
    pub async fn relink_dog(&self, dog: &Dog) -> Result<(), AssociationError> {
        if !dog.has_litter() {
            return Ok(());
        }
        match self.attach_pup_to_litter(&dog.id, &dog.litter_id).await {
            Err(AssociationError::LitterNotFound(litter_id)) => {
                warn!(dog = %dog.id, litter = %litter_id, "Litter is gone, clearing litterId on restored dog");
                self.store
                    .dogs
                    .modify(&dog.id, Scope::Active, &|stored: &mut Dog| {
                        if stored.litter_id == litter_id {
                            stored.litter_id.clear();
                        }
                    })
                    .await?;
                Ok(())
            }
            other => other,
        }
    }
}
