use std::sync::Arc;

use hsc_core::model::{Card, CardId, CardSet, CardSetId, CardSetItem, CardSetSummary, SetName, UserId};
use storage::repository::CardSetRepository;
use tracing::info;

use crate::Clock;
use crate::error::SetServiceError;
use crate::retry::read_with_retry;

/// Personal card sets. Only the owner may change a set.
#[derive(Clone)]
pub struct SetService {
    clock: Clock,
    sets: Arc<dyn CardSetRepository>,
}

impl SetService {
    #[must_use]
    pub fn new(clock: Clock, sets: Arc<dyn CardSetRepository>) -> Self {
        Self { clock, sets }
    }

    /// # Errors
    ///
    /// Returns `SetServiceError::Set` for a blank or over-long name.
    pub async fn create_set(
        &self,
        owner: UserId,
        name: &str,
        description: Option<&str>,
    ) -> Result<CardSet, SetServiceError> {
        let name = SetName::new(name)?;
        let set = self
            .sets
            .create_set(owner, &name, description, self.clock.now())
            .await?;
        info!(set_id = %set.id(), "created card set");
        Ok(set)
    }

    /// Sets of `owner`, newest first, with live card counts.
    ///
    /// # Errors
    ///
    /// Returns `SetServiceError::Storage` if the store cannot be read.
    pub async fn list_sets(&self, owner: UserId) -> Result<Vec<CardSetSummary>, SetServiceError> {
        Ok(read_with_retry("list_sets", || self.sets.list_sets(owner)).await?)
    }

    /// Fetch a set and check that `user` owns it.
    ///
    /// # Errors
    ///
    /// Returns `SetServiceError::NotOwner` or `SetServiceError::Storage`
    /// (`NotFound` for an unknown set).
    pub async fn get_owned_set(
        &self,
        user: UserId,
        set_id: CardSetId,
    ) -> Result<CardSet, SetServiceError> {
        let set = read_with_retry("get_set", || self.sets.get_set(set_id)).await?;
        if !set.is_owned_by(user) {
            return Err(SetServiceError::NotOwner { set_id });
        }
        Ok(set)
    }

    /// # Errors
    ///
    /// Same as [`SetService::get_owned_set`].
    pub async fn delete_set(&self, user: UserId, set_id: CardSetId) -> Result<(), SetServiceError> {
        self.get_owned_set(user, set_id).await?;
        self.sets.delete_set(set_id).await?;
        info!(%set_id, "deleted card set");
        Ok(())
    }

    /// Add a card; adding an existing member returns the original item.
    ///
    /// # Errors
    ///
    /// Same as [`SetService::get_owned_set`]; an unknown card is `NotFound`.
    pub async fn add_card(
        &self,
        user: UserId,
        set_id: CardSetId,
        card_id: CardId,
    ) -> Result<CardSetItem, SetServiceError> {
        self.get_owned_set(user, set_id).await?;
        let item = self.sets.add_card(set_id, card_id, self.clock.now()).await?;
        info!(%set_id, %card_id, "added card to set");
        Ok(item)
    }

    /// Remove a card; succeeds when it was never a member.
    ///
    /// # Errors
    ///
    /// Same as [`SetService::get_owned_set`].
    pub async fn remove_card(
        &self,
        user: UserId,
        set_id: CardSetId,
        card_id: CardId,
    ) -> Result<(), SetServiceError> {
        self.get_owned_set(user, set_id).await?;
        self.sets
            .remove_card(set_id, card_id, self.clock.now())
            .await?;
        info!(%set_id, %card_id, "removed card from set");
        Ok(())
    }

    /// Members in the order they were added.
    ///
    /// # Errors
    ///
    /// Returns `SetServiceError::Storage` (`NotFound` for an unknown set).
    pub async fn list_cards_in_set(&self, set_id: CardSetId) -> Result<Vec<Card>, SetServiceError> {
        Ok(read_with_retry("list_cards_in_set", || self.sets.list_cards_in_set(set_id)).await?)
    }

    /// # Errors
    ///
    /// Returns `SetServiceError::Storage` (`NotFound` for an unknown set).
    pub async fn count_cards(&self, set_id: CardSetId) -> Result<u32, SetServiceError> {
        Ok(read_with_retry("count_cards", || self.sets.count_cards(set_id)).await?)
    }
}
