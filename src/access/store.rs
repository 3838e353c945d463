use async_trait::async_trait;
use sea_orm::{ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, QueryOrder, QuerySelect};

use crate::entities::{permission, role_permission, user_permission};
use crate::errors::DeskError;

/// Read side of the permission policy.
///
/// Every method is a plain lookup; precedence between the two layers is
/// decided by [`crate::access::AccessResolver`], not here.
#[async_trait]
pub trait PolicyStore: Send + Sync {
    /// Override for `(user_id, code)`, if one is stored.
    async fn user_override(&self, user_id: i32, code: &str) -> Result<Option<bool>, DeskError>;

    /// Role default for `(role, code)`, if one is stored.
    async fn role_grant(&self, role: &str, code: &str) -> Result<Option<bool>, DeskError>;

    /// `granted` flags of every override of `user_id` on any of `codes`.
    async fn user_overrides_for_codes(
        &self,
        user_id: i32,
        codes: &[String],
    ) -> Result<Vec<bool>, DeskError>;

    /// `granted` flags of every default of `role` on any of `codes`.
    async fn role_grants_for_codes(
        &self,
        role: &str,
        codes: &[String],
    ) -> Result<Vec<bool>, DeskError>;

    /// All `(code, granted)` overrides of a user.
    async fn user_overrides(&self, user_id: i32) -> Result<Vec<(String, bool)>, DeskError>;

    /// All `(code, granted)` defaults of a role.
    async fn role_grants(&self, role: &str) -> Result<Vec<(String, bool)>, DeskError>;

    /// Every permission code known to the system.
    async fn permission_codes(&self) -> Result<Vec<String>, DeskError>;
}

/// [`PolicyStore`] over the `permissions`, `role_permissions` and
/// `user_permissions` tables.
#[derive(Clone)]
pub struct DbPolicyStore {
    db: DatabaseConnection,
}

impl DbPolicyStore {
    pub fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }
}

#[async_trait]
impl PolicyStore for DbPolicyStore {
    async fn user_override(&self, user_id: i32, code: &str) -> Result<Option<bool>, DeskError> {
        use user_permission::{Column, Entity};

        let row = Entity::find()
            .inner_join(permission::Entity)
            .filter(Column::UserId.eq(user_id))
            .filter(permission::Column::Code.eq(code))
            .one(&self.db)
            .await?;

        Ok(row.map(|r| r.granted))
    }

    async fn role_grant(&self, role: &str, code: &str) -> Result<Option<bool>, DeskError> {
        use role_permission::{Column, Entity};

        let row = Entity::find()
            .inner_join(permission::Entity)
            .filter(Column::Role.eq(role))
            .filter(permission::Column::Code.eq(code))
            .one(&self.db)
            .await?;

        Ok(row.map(|r| r.granted))
    }

    async fn user_overrides_for_codes(
        &self,
        user_id: i32,
        codes: &[String],
    ) -> Result<Vec<bool>, DeskError> {
        use user_permission::{Column, Entity};

        if codes.is_empty() {
            return Ok(Vec::new());
        }

        let rows = Entity::find()
            .inner_join(permission::Entity)
            .filter(Column::UserId.eq(user_id))
            .filter(permission::Column::Code.is_in(codes.iter().cloned()))
            .all(&self.db)
            .await?;

        Ok(rows.into_iter().map(|r| r.granted).collect())
    }

    async fn role_grants_for_codes(
        &self,
        role: &str,
        codes: &[String],
    ) -> Result<Vec<bool>, DeskError> {
        use role_permission::{Column, Entity};

        if codes.is_empty() {
            return Ok(Vec::new());
        }

        let rows = Entity::find()
            .inner_join(permission::Entity)
            .filter(Column::Role.eq(role))
            .filter(permission::Column::Code.is_in(codes.iter().cloned()))
            .all(&self.db)
            .await?;

        Ok(rows.into_iter().map(|r| r.granted).collect())
    }

    async fn user_overrides(&self, user_id: i32) -> Result<Vec<(String, bool)>, DeskError> {
        use user_permission::{Column, Entity};

        let rows = Entity::find()
            .filter(Column::UserId.eq(user_id))
            .find_also_related(permission::Entity)
            .all(&self.db)
            .await?;

        Ok(rows
            .into_iter()
            .filter_map(|(row, perm)| perm.map(|p| (p.code, row.granted)))
            .collect())
    }

    async fn role_grants(&self, role: &str) -> Result<Vec<(String, bool)>, DeskError> {
        use role_permission::{Column, Entity};

        let rows = Entity::find()
            .filter(Column::Role.eq(role))
            .find_also_related(permission::Entity)
            .all(&self.db)
            .await?;

        Ok(rows
            .into_iter()
            .filter_map(|(row, perm)| perm.map(|p| (p.code, row.granted)))
            .collect())
    }

    async fn permission_codes(&self) -> Result<Vec<String>, DeskError> {
        use permission::{Column, Entity};

        let codes: Vec<String> = Entity::find()
            .select_only()
            .column(Column::Code)
            .order_by_asc(Column::Code)
            .into_tuple()
            .all(&self.db)
            .await?;

        Ok(codes)
    }
}
