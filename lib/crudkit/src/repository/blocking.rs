use super::{ListParams, Repository};
use crate::entity::Entity;
use crate::session::BlockingSession;
use crate::{FieldMap, RepositoryError, Value};

impl<T: Entity> Repository<T> {
    pub fn get_by_key_blocking<S: BlockingSession>(
        &self,
        session: &mut S,
        key: impl Into<Value>,
    ) -> Result<Option<T>, RepositoryError> {
        let query = self.by_key(key.into())?;
        session.fetch_optional(query)
    }

    pub fn require_by_key_blocking<S: BlockingSession>(
        &self,
        session: &mut S,
        key: impl Into<Value>,
    ) -> Result<T, RepositoryError> {
        let key = key.into();
        match self.get_by_key_blocking(session, key.clone())? {
            Some(item) => Ok(item),
            None => {
                self.log_missing(&key);
                Err(self.not_found(&key))
            }
        }
    }

    pub fn get_one_blocking<S: BlockingSession>(
        &self,
        session: &mut S,
        filters: &FieldMap,
    ) -> Result<Option<T>, RepositoryError> {
        let query = self.matching(filters)?;
        session.fetch_optional(query)
    }

    #[tracing::instrument(level = "debug", skip_all, fields(entity = T::entity_name()))]
    pub fn get_list_blocking<S: BlockingSession>(
        &self,
        session: &mut S,
        params: &ListParams,
        filters: &FieldMap,
    ) -> Result<(u64, Vec<T>), RepositoryError> {
        let plan = self.list_plan(params, filters)?;
        let total = session.count(plan.count)?;
        let items = match plan.items {
            Some(query) => session.fetch(query)?,
            None => Vec::new(),
        };
        tracing::debug!(total, returned = items.len(), "listed");
        Ok((total, items))
    }

    pub fn create_blocking<S: BlockingSession>(
        &self,
        session: &mut S,
        fields: &FieldMap,
    ) -> Result<T, RepositoryError> {
        let values = crate::cast::<T>(fields)?;
        let item = session.insert::<T>(values)?;
        session.commit()?;
        Ok(item)
    }

    pub fn update_blocking<S: BlockingSession>(
        &self,
        session: &mut S,
        key: impl Into<Value>,
        fields: &FieldMap,
    ) -> Result<Option<T>, RepositoryError> {
        let key = key.into();
        let update = self.update_plan(key.clone(), fields)?;
        if update.assignments.is_empty() {
            return self.get_by_key_blocking(session, key);
        }

        match session.update(update)? {
            Some(item) => {
                session.commit()?;
                Ok(Some(item))
            }
            None => {
                self.log_missing(&key);
                Ok(None)
            }
        }
    }

    pub fn delete_blocking<S: BlockingSession>(
        &self,
        session: &mut S,
        key: impl Into<Value>,
    ) -> Result<bool, RepositoryError> {
        let key = key.into();
        let deleted = session.delete(self.delete_plan(key.clone())?)?;
        if deleted == 0 {
            self.log_missing(&key);
        }
        Ok(deleted > 0)
    }

    pub fn soft_delete_blocking<S: BlockingSession>(
        &self,
        session: &mut S,
        key: impl Into<Value>,
    ) -> Result<bool, RepositoryError> {
        let key = key.into();
        if !T::supports_soft_delete() {
            if self.get_by_key_blocking(session, key.clone())?.is_none() {
                self.log_missing(&key);
            } else {
                self.log_no_soft_delete();
            }
            return Ok(false);
        }

        let update = self.soft_delete_plan(key.clone())?;
        if session.update(update)?.is_none() {
            self.log_missing(&key);
            return Ok(false);
        }
        Ok(true)
    }
}
