use super::{ListParams, Repository};
use crate::entity::Entity;
use crate::session::Session;
use crate::{FieldMap, RepositoryError, Value};

impl<T: Entity> Repository<T> {
    /// Look up one entity by its identifying key. `None` when absent.
    pub async fn get_by_key<S: Session>(
        &self,
        session: &mut S,
        key: impl Into<Value>,
    ) -> Result<Option<T>, RepositoryError> {
        let query = self.by_key(key.into())?;
        session.fetch_optional(query).await
    }

    /// Like [`get_by_key`](Self::get_by_key) but absence is an error.
    pub async fn require_by_key<S: Session>(
        &self,
        session: &mut S,
        key: impl Into<Value>,
    ) -> Result<T, RepositoryError> {
        let key = key.into();
        match self.get_by_key(session, key.clone()).await? {
            Some(item) => Ok(item),
            None => {
                self.log_missing(&key);
                Err(self.not_found(&key))
            }
        }
    }

    /// First entity matching every filter, or `None`.
    ///
    /// With several matches, which one comes back is up to the backend.
    pub async fn get_one<S: Session>(
        &self,
        session: &mut S,
        filters: &FieldMap,
    ) -> Result<Option<T>, RepositoryError> {
        let query = self.matching(filters)?;
        session.fetch_optional(query).await
    }

    /// One page of matching entities and the total match count.
    ///
    /// The count ignores `skip` and `limit`.
    #[tracing::instrument(level = "debug", skip_all, fields(entity = T::entity_name()))]
    pub async fn get_list<S: Session>(
        &self,
        session: &mut S,
        params: &ListParams,
        filters: &FieldMap,
    ) -> Result<(u64, Vec<T>), RepositoryError> {
        let plan = self.list_plan(params, filters)?;
        let total = session.count(plan.count).await?;
        let items = match plan.items {
            Some(query) => session.fetch(query).await?,
            None => Vec::new(),
        };
        tracing::debug!(total, returned = items.len(), "listed");
        Ok((total, items))
    }

    /// Insert a new entity from `fields`, commit, and return it as stored.
    pub async fn create<S: Session>(
        &self,
        session: &mut S,
        fields: &FieldMap,
    ) -> Result<T, RepositoryError> {
        let values = crate::cast::<T>(fields)?;
        let item = session.insert::<T>(values).await?;
        session.commit().await?;
        Ok(item)
    }

    /// Apply `fields` to the entity with `key`, commit, and return it refreshed.
    ///
    /// Returns `None` without committing when the key does not exist.
    pub async fn update<S: Session>(
        &self,
        session: &mut S,
        key: impl Into<Value>,
        fields: &FieldMap,
    ) -> Result<Option<T>, RepositoryError> {
        let key = key.into();
        let update = self.update_plan(key.clone(), fields)?;
        if update.assignments.is_empty() {
            return self.get_by_key(session, key).await;
        }

        match session.update(update).await? {
            Some(item) => {
                session.commit().await?;
                Ok(Some(item))
            }
            None => {
                self.log_missing(&key);
                Ok(None)
            }
        }
    }

    /// Remove the entity with `key`. `false` when it does not exist.
    ///
    /// The removal is not committed here.
    pub async fn delete<S: Session>(
        &self,
        session: &mut S,
        key: impl Into<Value>,
    ) -> Result<bool, RepositoryError> {
        let key = key.into();
        let deleted = session.delete(self.delete_plan(key.clone())?).await?;
        if deleted == 0 {
            self.log_missing(&key);
        }
        Ok(deleted > 0)
    }

    /// Stamp `deleted_at` on the entity with `key`.
    ///
    /// `false` when the key does not exist or the entity has no
    /// `deleted_at` field; in the latter case the row is left untouched.
    /// The change is not committed here.
    pub async fn soft_delete<S: Session>(
        &self,
        session: &mut S,
        key: impl Into<Value>,
    ) -> Result<bool, RepositoryError> {
        let key = key.into();
        if !T::supports_soft_delete() {
            if self.get_by_key(session, key.clone()).await?.is_none() {
                self.log_missing(&key);
            } else {
                self.log_no_soft_delete();
            }
            return Ok(false);
        }

        let update = self.soft_delete_plan(key.clone())?;
        if session.update(update).await?.is_none() {
            self.log_missing(&key);
            return Ok(false);
        }
        Ok(true)
    }
}
